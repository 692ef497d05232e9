use std::sync::Arc;

use gateway_core_types::{ConsentId, Endpoint, SharedClock};
use permissions_broker::{FilterError, PermissionFilter};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{required_permissions, Consent};
use crate::store::{ConsentStore, ConsentStoreError};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Valid,
    Invalid,
    InsufficientPermissions,
    Expired,
    Error,
}

/// Requested vs honoured permissions for one consent evaluation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDelta {
    pub requested: Vec<String>,
    pub filtered: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub status: ValidationStatus,
    pub reason: String,
    /// Present once the consent was found.
    pub consent: Option<Consent>,
    /// Present once the permission filter ran.
    pub permissions: Option<PermissionDelta>,
}

impl ValidationOutcome {
    fn terminal(status: ValidationStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            consent: None,
            permissions: None,
        }
    }

    fn with_consent(mut self, consent: Consent) -> Self {
        self.consent = Some(consent);
        self
    }

    fn with_permissions(mut self, delta: PermissionDelta) -> Self {
        self.permissions = Some(delta);
        self
    }

    pub fn is_valid(&self) -> bool {
        self.status == ValidationStatus::Valid
    }
}

/// Decides whether a consent currently entitles its holder to an operation.
///
/// Never grants on missing or ambiguous data.
pub struct ConsentValidator {
    store: Arc<dyn ConsentStore>,
    filter: PermissionFilter,
    clock: SharedClock,
}

impl ConsentValidator {
    pub fn new(store: Arc<dyn ConsentStore>, filter: PermissionFilter, clock: SharedClock) -> Self {
        Self {
            store,
            filter,
            clock,
        }
    }

    pub async fn validate_for_operation(
        &self,
        consent_id: &ConsentId,
        operation: Endpoint,
    ) -> ValidationOutcome {
        let consent = match self.store.find_by_consent_id(consent_id).await {
            Ok(Some(consent)) => consent,
            Ok(None) => {
                return ValidationOutcome::terminal(
                    ValidationStatus::Invalid,
                    format!("consent {consent_id} not found"),
                )
            }
            Err(err) => {
                warn!(
                    target: "consent-center",
                    consent_id = %consent_id,
                    error = %err,
                    "consent lookup failed"
                );
                return ValidationOutcome::terminal(
                    ValidationStatus::Error,
                    format!("consent lookup failed: {err}"),
                );
            }
        };

        let outcome = self.evaluate(&consent, operation);
        debug!(
            target: "consent-center",
            consent_id = %consent_id,
            endpoint = %operation,
            status = ?outcome.status,
            "consent evaluated"
        );
        outcome.with_consent(consent)
    }

    fn evaluate(&self, consent: &Consent, operation: Endpoint) -> ValidationOutcome {
        let now = self.clock.now();

        if !consent.is_authorised() {
            return ValidationOutcome::terminal(
                ValidationStatus::Invalid,
                format!("consent status is {}", consent.status),
            );
        }
        if now > consent.expiration_date_time {
            return ValidationOutcome::terminal(
                ValidationStatus::Invalid,
                format!("consent expired at {}", consent.expiration_date_time),
            );
        }
        if let (Some(from), Some(to)) = (consent.transaction_from_date, consent.transaction_to_date)
        {
            if from > to {
                return ValidationOutcome::terminal(
                    ValidationStatus::Error,
                    "transaction window starts after it ends",
                );
            }
        }
        if consent.has_transaction_window() && !consent.within_transaction_window(now) {
            return ValidationOutcome::terminal(
                ValidationStatus::Expired,
                "outside the consent transaction window",
            );
        }

        let requested = consent.permissions.clone();
        let result = match self.filter.filter(requested.as_slice()) {
            Ok(result) => result,
            Err(err) => {
                let delta = PermissionDelta {
                    requested,
                    filtered: match &err {
                        FilterError::NoFunctionalPermissions { filtered, .. } => filtered.clone(),
                        FilterError::NoValidPermissions { .. } => Vec::new(),
                    },
                    removed: err.removed().to_vec(),
                };
                return ValidationOutcome::terminal(
                    ValidationStatus::InsufficientPermissions,
                    err.to_string(),
                )
                .with_permissions(delta);
            }
        };

        let required = required_permissions(operation);
        let granted = required.iter().any(|code| result.contains(*code));
        let delta = PermissionDelta {
            requested,
            filtered: result.filtered,
            removed: result.removed,
        };
        if !granted {
            let names: Vec<&str> = required.iter().map(|code| code.as_str()).collect();
            return ValidationOutcome::terminal(
                ValidationStatus::InsufficientPermissions,
                format!("{operation} requires one of {}", names.join(", ")),
            )
            .with_permissions(delta);
        }

        ValidationOutcome::terminal(ValidationStatus::Valid, "consent valid").with_permissions(delta)
    }

    /// Stamps `lastAccess` after a successful operation.
    pub async fn record_access(&self, consent_id: &ConsentId) -> Result<(), ConsentStoreError> {
        self.store
            .update_last_access(consent_id, self.clock.now())
            .await
    }
}
