//! regvault-storage: OpenDAL-backed document store for student records

pub mod health;
pub mod operator;
pub mod store;

pub use health::check_health;
pub use operator::{build_from_core_config, build_operator, S3Credentials, StorageUri};
pub use store::{OpendalStore, StudentStore};
