//! Request orchestration between the cache and upstream providers.

pub mod crypto;
pub mod forex;

pub use crypto::CryptoService;
pub use forex::ForexService;
