pub mod error;
pub mod schema;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use store::Store;
