use async_trait::async_trait;
use dashmap::DashMap;
use gateway_core_types::OrganizationId;

const MILLION: u64 = 1_000_000;
const BLOCK: u64 = 2 * MILLION;
const TOP_FIXED_TIER: u64 = 6 * MILLION;
const TOP_FIXED_CEILING: u64 = 10_000;
const PER_BLOCK: u64 = 2_000;

/// Per-minute ceiling for an organisation holding `active_consents` consents.
pub fn tpm_ceiling(active_consents: u64) -> u64 {
    match active_consents {
        n if n <= MILLION => 2_500,
        n if n <= 2 * MILLION => 5_000,
        n if n <= 3 * MILLION => 8_000,
        n if n <= TOP_FIXED_TIER => TOP_FIXED_CEILING,
        n => {
            let blocks = (n - TOP_FIXED_TIER).div_ceil(BLOCK);
            TOP_FIXED_CEILING + blocks * PER_BLOCK
        }
    }
}

/// Source of an organisation's active consent count.
#[async_trait]
pub trait ConsentVolume: Send + Sync {
    /// `None` when the organisation is unknown.
    async fn active_consents(&self, org: &OrganizationId) -> Option<u64>;
}

#[derive(Default)]
pub struct InMemoryConsentVolume {
    counts: DashMap<OrganizationId, u64>,
}

impl InMemoryConsentVolume {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, org: impl Into<OrganizationId>, active_consents: u64) {
        self.counts.insert(org.into(), active_consents);
    }
}

#[async_trait]
impl ConsentVolume for InMemoryConsentVolume {
    async fn active_consents(&self, org: &OrganizationId) -> Option<u64> {
        self.counts.get(org).map(|count| *count)
    }
}
