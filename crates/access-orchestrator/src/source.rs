use std::time::Duration;

use async_trait::async_trait;
use consent_center::Consent;
use dashmap::DashMap;
use gateway_core_types::{CustomerId, GatewayError};
use parking_lot::Mutex;
use serde::Deserialize;
use thiserror::Error;

use crate::model::{
    AccountBalances, AccountRecord, AccountTransaction, BookingWindow, OverdraftLimits,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("account data unavailable: {0}")]
    Unavailable(String),
    #[error("account {0} not found for consent")]
    NotFound(String),
    #[error("operation not supported by the data source")]
    Unsupported,
}

impl From<FetchError> for GatewayError {
    fn from(value: FetchError) -> Self {
        GatewayError::new(value.to_string())
    }
}

/// Upstream account data owned by the institution's core systems.
///
/// Pages are zero-based here; the orchestrator converts from the 1-based API page.
#[async_trait]
pub trait AccountDataSource: Send + Sync {
    async fn fetch_accounts(
        &self,
        consent: &Consent,
        account_type: Option<&str>,
        page_zero_based: u32,
        page_size: u32,
    ) -> Result<Vec<AccountRecord>, FetchError>;

    /// Total matching accounts, when the source can tell cheaply.
    async fn count_accounts(
        &self,
        _consent: &Consent,
        _account_type: Option<&str>,
    ) -> Result<Option<u64>, FetchError> {
        Ok(None)
    }

    async fn fetch_account(
        &self,
        _consent: &Consent,
        _account_id: &str,
    ) -> Result<AccountRecord, FetchError> {
        Err(FetchError::Unsupported)
    }

    async fn fetch_balances(
        &self,
        _consent: &Consent,
        _account_id: &str,
    ) -> Result<AccountBalances, FetchError> {
        Err(FetchError::Unsupported)
    }

    async fn fetch_overdraft_limits(
        &self,
        _consent: &Consent,
        _account_id: &str,
    ) -> Result<OverdraftLimits, FetchError> {
        Err(FetchError::Unsupported)
    }

    async fn fetch_transactions(
        &self,
        _consent: &Consent,
        _account_id: &str,
        _window: &BookingWindow,
        _page_zero_based: u32,
        _page_size: u32,
    ) -> Result<Vec<AccountTransaction>, FetchError> {
        Err(FetchError::Unsupported)
    }

    async fn count_transactions(
        &self,
        _consent: &Consent,
        _account_id: &str,
        _window: &BookingWindow,
    ) -> Result<Option<u64>, FetchError> {
        Ok(None)
    }
}

/// Everything the in-memory source knows about one account.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountFixture {
    pub account: AccountRecord,
    #[serde(default)]
    pub balances: Option<AccountBalances>,
    #[serde(default)]
    pub overdraft_limits: Option<OverdraftLimits>,
    #[serde(default)]
    pub transactions: Vec<AccountTransaction>,
}

#[derive(Default)]
struct SourceFaults {
    latency: Option<Duration>,
    failure: Option<String>,
}

/// Account data keyed by customer, with injectable latency and failures.
pub struct InMemoryAccountSource {
    accounts: DashMap<CustomerId, Vec<AccountFixture>>,
    report_totals: bool,
    faults: Mutex<SourceFaults>,
}

impl Default for InMemoryAccountSource {
    fn default() -> Self {
        Self {
            accounts: DashMap::new(),
            report_totals: true,
            faults: Mutex::new(SourceFaults::default()),
        }
    }
}

impl InMemoryAccountSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop answering `count_*` so callers must infer totals.
    pub fn without_totals(mut self) -> Self {
        self.report_totals = false;
        self
    }

    pub fn insert(&self, customer: impl Into<CustomerId>, fixture: AccountFixture) {
        self.accounts.entry(customer.into()).or_default().push(fixture);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        self.faults.lock().latency = latency;
    }

    pub fn set_failure(&self, failure: Option<String>) {
        self.faults.lock().failure = failure;
    }

    async fn simulate_faults(&self) -> Result<(), FetchError> {
        let (latency, failure) = {
            let faults = self.faults.lock();
            (faults.latency, faults.failure.clone())
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(reason) => Err(FetchError::Unavailable(reason)),
            None => Ok(()),
        }
    }

    fn matching_accounts(&self, consent: &Consent, account_type: Option<&str>) -> Vec<AccountFixture> {
        self.accounts
            .get(&consent.customer_id)
            .map(|fixtures| {
                fixtures
                    .iter()
                    .filter(|fixture| {
                        account_type.map_or(true, |wanted| fixture.account.account_type == wanted)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn find(&self, consent: &Consent, account_id: &str) -> Result<AccountFixture, FetchError> {
        self.matching_accounts(consent, None)
            .into_iter()
            .find(|fixture| fixture.account.account_id == account_id)
            .ok_or_else(|| FetchError::NotFound(account_id.to_string()))
    }
}

fn page_slice<T: Clone>(items: &[T], page_zero_based: u32, page_size: u32) -> Vec<T> {
    let size = page_size.max(1) as usize;
    items
        .iter()
        .skip((page_zero_based as usize).saturating_mul(size))
        .take(size)
        .cloned()
        .collect()
}

#[async_trait]
impl AccountDataSource for InMemoryAccountSource {
    async fn fetch_accounts(
        &self,
        consent: &Consent,
        account_type: Option<&str>,
        page_zero_based: u32,
        page_size: u32,
    ) -> Result<Vec<AccountRecord>, FetchError> {
        self.simulate_faults().await?;
        let accounts: Vec<AccountRecord> = self
            .matching_accounts(consent, account_type)
            .into_iter()
            .map(|fixture| fixture.account)
            .collect();
        Ok(page_slice(&accounts, page_zero_based, page_size))
    }

    async fn count_accounts(
        &self,
        consent: &Consent,
        account_type: Option<&str>,
    ) -> Result<Option<u64>, FetchError> {
        if !self.report_totals {
            return Ok(None);
        }
        Ok(Some(self.matching_accounts(consent, account_type).len() as u64))
    }

    async fn fetch_account(
        &self,
        consent: &Consent,
        account_id: &str,
    ) -> Result<AccountRecord, FetchError> {
        self.simulate_faults().await?;
        Ok(self.find(consent, account_id)?.account)
    }

    async fn fetch_balances(
        &self,
        consent: &Consent,
        account_id: &str,
    ) -> Result<AccountBalances, FetchError> {
        self.simulate_faults().await?;
        self.find(consent, account_id)?
            .balances
            .ok_or(FetchError::Unsupported)
    }

    async fn fetch_overdraft_limits(
        &self,
        consent: &Consent,
        account_id: &str,
    ) -> Result<OverdraftLimits, FetchError> {
        self.simulate_faults().await?;
        Ok(self
            .find(consent, account_id)?
            .overdraft_limits
            .unwrap_or_default())
    }

    async fn fetch_transactions(
        &self,
        consent: &Consent,
        account_id: &str,
        window: &BookingWindow,
        page_zero_based: u32,
        page_size: u32,
    ) -> Result<Vec<AccountTransaction>, FetchError> {
        self.simulate_faults().await?;
        let booked: Vec<AccountTransaction> = self
            .find(consent, account_id)?
            .transactions
            .into_iter()
            .filter(|tx| window.contains(tx.transaction_date_time))
            .collect();
        Ok(page_slice(&booked, page_zero_based, page_size))
    }

    async fn count_transactions(
        &self,
        consent: &Consent,
        account_id: &str,
        window: &BookingWindow,
    ) -> Result<Option<u64>, FetchError> {
        if !self.report_totals {
            return Ok(None);
        }
        let fixture = self.find(consent, account_id)?;
        let booked = fixture
            .transactions
            .iter()
            .filter(|tx| window.contains(tx.transaction_date_time))
            .count();
        Ok(Some(booked as u64))
    }
}
