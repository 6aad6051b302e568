//! Provider response cache.
//!
//! Entries live in the counter store under `<category>:<discriminators>` keys
//! and are removed only by the store's own expiry or an administrative clear.

mod category;
pub mod keys;
mod layer;

pub use category::{CacheCategory, CacheTtls};
pub use layer::Cache;
