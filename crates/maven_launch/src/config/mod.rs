//! Launch configuration, preferences and variable substitution

mod attributes;
mod preferences;
mod substitution;

pub use attributes::*;
pub use preferences::*;
pub use substitution::*;
