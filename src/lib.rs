#[cfg(feature = "cli")]
pub mod cli;
pub mod engine;
pub mod error;
pub mod input;
pub mod model;
pub mod net;
pub mod output;
pub mod scan;
pub mod tls;
pub mod util;

pub use error::{Result, ScanError};
