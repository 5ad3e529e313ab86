//! Maven launching: argument assembly, JVM startup and the launch delegate

pub mod arguments;
pub mod delegate;
pub mod java;

pub use arguments::*;
pub use delegate::*;
pub use java::*;
