//! Object store abstraction and an in-memory implementation.

mod error;
mod memory;
mod traits;

pub use error::{Result, StoreError};
pub use memory::{MemoryStore, StoreCall, Verb};
pub use traits::{ObjectStore, create_typed, get_typed, update_status_typed, update_typed};
