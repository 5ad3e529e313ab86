//! Runtime components for process lifecycle and background work

pub mod events;
pub mod jobs;
pub mod process;
pub mod refresh;

pub use events::*;
pub use jobs::*;
pub use process::*;
pub use refresh::*;
