//! Maven runtimes and classpath contributions

pub mod components;
pub mod manager;
pub mod runtime;

pub use components::*;
pub use manager::*;
pub use runtime::*;
