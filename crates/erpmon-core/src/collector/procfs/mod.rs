//! Host metrics from the Linux `/proc` filesystem.

pub mod parser;
pub mod system;

pub use system::{CollectError, LoadAverage, SystemCollector, SystemSource, Usage};
