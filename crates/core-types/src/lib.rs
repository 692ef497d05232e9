use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Shared error type for the access core crates.
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    #[error("{message}")]
    Message { message: String },
}

impl GatewayError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(ConsentId);
string_id!(OrganizationId);
string_id!(CustomerId);
string_id!(CorrelationId);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

/// Read endpoints guarded by the access core.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Endpoint {
    ListAccounts,
    AccountDetail,
    Balances,
    OverdraftLimits,
    Transactions,
}

impl Endpoint {
    pub const ALL: [Endpoint; 5] = [
        Endpoint::ListAccounts,
        Endpoint::AccountDetail,
        Endpoint::Balances,
        Endpoint::OverdraftLimits,
        Endpoint::Transactions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::ListAccounts => "list-accounts",
            Endpoint::AccountDetail => "account-detail",
            Endpoint::Balances => "balances",
            Endpoint::OverdraftLimits => "overdraft-limits",
            Endpoint::Transactions => "transactions",
        }
    }

    /// Call frequency class used for TPS ceilings and SLA thresholds.
    pub fn frequency(&self) -> FrequencyClass {
        match self {
            Endpoint::ListAccounts => FrequencyClass::High,
            Endpoint::AccountDetail
            | Endpoint::Balances
            | Endpoint::OverdraftLimits
            | Endpoint::Transactions => FrequencyClass::Medium,
        }
    }

    /// Whether the endpoint returns a paged listing.
    pub fn is_listing(&self) -> bool {
        matches!(self, Endpoint::ListAccounts | Endpoint::Transactions)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Endpoint {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::ALL
            .iter()
            .copied()
            .find(|endpoint| endpoint.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| GatewayError::new(format!("unknown endpoint: {s}")))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyClass {
    High,
    Medium,
}

/// Time source shared by every time-dependent component.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type SharedClock = Arc<dyn Clock>;

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

/// Clock that only moves when told to. Used by tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(start),
        })
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.current.lock();
        *guard += by;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.current.lock() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock()
    }
}
