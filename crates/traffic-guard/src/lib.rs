//! Traffic admission for the access core: per-second and per-minute rate limits
//! tiered by consent volume, and monthly operational quotas per consent.

pub mod counting;
pub mod quota;
pub mod rate_limit;
pub mod tiers;

pub use counting::{CountingBackend, CountingError, InMemoryCountingBackend};
pub use quota::{month_key, OperationalQuotaTracker, QuotaDecision, QuotaKey};
pub use rate_limit::{counter_key, RateDecision, RateLimiter, RateWindow};
pub use tiers::{tpm_ceiling, ConsentVolume, InMemoryConsentVolume};
