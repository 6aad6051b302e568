//! Rate limiting logic over the shared counter store.

mod key;
mod limiter;
mod window;

pub use key::CounterKey;
pub use limiter::{Admission, ClientUsage, GlobalStats, RateLimiter, UsageInfo, WindowLimits, WindowUsage};
pub use window::WindowKind;
