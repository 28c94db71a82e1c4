pub mod config;
pub mod error;
pub mod types;

pub use error::{RegError, RegResult};
pub use types::{FieldMap, StudentRecord};
