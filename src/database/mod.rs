pub mod manager;
pub mod models;
pub mod retry;

pub use manager::{DatabaseError, DatabaseManager};
pub use retry::with_retry;
