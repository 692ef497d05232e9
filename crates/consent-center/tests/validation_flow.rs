use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use consent_center::{
    Consent, ConsentStore, ConsentStoreError, ConsentValidator, InMemoryConsentStore,
    ValidationStatus, STATUS_AUTHORISED,
};
use gateway_core_types::{ConsentId, Endpoint, ManualClock};
use permissions_broker::PermissionFilter;
use std::sync::Arc;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
}

fn consent(id: &str, status: &str, permissions: &[&str]) -> Consent {
    Consent {
        consent_id: id.into(),
        organization_id: "org-1".into(),
        customer_id: "76109277673".into(),
        status: status.into(),
        expiration_date_time: now() + Duration::days(90),
        transaction_from_date: None,
        transaction_to_date: None,
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
        last_access: None,
    }
}

fn validator(consents: Vec<Consent>) -> (ConsentValidator, Arc<InMemoryConsentStore>, Arc<ManualClock>) {
    let store = Arc::new(consents.into_iter().collect::<InMemoryConsentStore>());
    let clock = ManualClock::new(now());
    let validator = ConsentValidator::new(store.clone(), PermissionFilter::default(), clock.clone());
    (validator, store, clock)
}

#[tokio::test]
async fn authorised_consent_with_accounts_read_is_valid() {
    let (validator, _, _) = validator(vec![consent("C1", STATUS_AUTHORISED, &["ACCOUNTS_READ"])]);
    let outcome = validator
        .validate_for_operation(&"C1".into(), Endpoint::ListAccounts)
        .await;
    assert_eq!(outcome.status, ValidationStatus::Valid);
    let delta = outcome.permissions.unwrap();
    assert_eq!(delta.filtered, vec!["ACCOUNTS_READ".to_string()]);
    assert!(delta.removed.is_empty());
    assert_eq!(outcome.consent.unwrap().customer_id.as_str(), "76109277673");
}

#[tokio::test]
async fn missing_consent_is_invalid() {
    let (validator, _, _) = validator(vec![]);
    let outcome = validator
        .validate_for_operation(&"nope".into(), Endpoint::ListAccounts)
        .await;
    assert_eq!(outcome.status, ValidationStatus::Invalid);
    assert!(outcome.consent.is_none());
}

#[tokio::test]
async fn consumed_consent_is_invalid() {
    let (validator, _, _) = validator(vec![consent("C2", "CONSUMED", &["ACCOUNTS_READ"])]);
    let outcome = validator
        .validate_for_operation(&"C2".into(), Endpoint::ListAccounts)
        .await;
    assert_eq!(outcome.status, ValidationStatus::Invalid);
    assert!(outcome.reason.contains("CONSUMED"));
}

#[tokio::test]
async fn status_comparison_is_exact() {
    let (validator, _, _) = validator(vec![consent("C3", "authorised", &["ACCOUNTS_READ"])]);
    let outcome = validator
        .validate_for_operation(&"C3".into(), Endpoint::ListAccounts)
        .await;
    assert_eq!(outcome.status, ValidationStatus::Invalid);
}

#[tokio::test]
async fn past_expiration_is_invalid() {
    let (validator, _, clock) =
        validator(vec![consent("C4", STATUS_AUTHORISED, &["ACCOUNTS_READ"])]);
    clock.advance(Duration::days(91));
    let outcome = validator
        .validate_for_operation(&"C4".into(), Endpoint::ListAccounts)
        .await;
    assert_eq!(outcome.status, ValidationStatus::Invalid);
}

#[tokio::test]
async fn outside_transaction_window_is_expired() {
    let mut record = consent("C5", STATUS_AUTHORISED, &["ACCOUNTS_READ"]);
    record.transaction_from_date = Some(now() - Duration::days(30));
    record.transaction_to_date = Some(now() - Duration::days(1));
    let (validator, _, _) = validator(vec![record]);
    let outcome = validator
        .validate_for_operation(&"C5".into(), Endpoint::ListAccounts)
        .await;
    assert_eq!(outcome.status, ValidationStatus::Expired);
}

#[tokio::test]
async fn inverted_transaction_window_fails_closed() {
    let mut record = consent("C6", STATUS_AUTHORISED, &["ACCOUNTS_READ"]);
    record.transaction_from_date = Some(now() + Duration::days(1));
    record.transaction_to_date = Some(now() - Duration::days(1));
    let (validator, _, _) = validator(vec![record]);
    let outcome = validator
        .validate_for_operation(&"C6".into(), Endpoint::ListAccounts)
        .await;
    assert_eq!(outcome.status, ValidationStatus::Error);
}

#[tokio::test]
async fn missing_required_permission_is_insufficient() {
    let (validator, _, _) = validator(vec![consent(
        "C7",
        STATUS_AUTHORISED,
        &["ACCOUNTS_READ", "RESOURCES_READ"],
    )]);
    let outcome = validator
        .validate_for_operation(&"C7".into(), Endpoint::Balances)
        .await;
    assert_eq!(outcome.status, ValidationStatus::InsufficientPermissions);
    assert!(outcome.reason.contains("ACCOUNTS_BALANCES_READ"));
}

#[tokio::test]
async fn unsupported_only_consent_is_insufficient() {
    let (validator, _, _) = validator(vec![consent(
        "C8",
        STATUS_AUTHORISED,
        &["CREDIT_CARDS_ACCOUNTS_READ"],
    )]);
    let outcome = validator
        .validate_for_operation(&"C8".into(), Endpoint::ListAccounts)
        .await;
    assert_eq!(outcome.status, ValidationStatus::InsufficientPermissions);
    assert_eq!(
        outcome.permissions.unwrap().removed,
        vec!["CREDIT_CARDS_ACCOUNTS_READ".to_string()]
    );
}

struct BrokenStore;

#[async_trait]
impl ConsentStore for BrokenStore {
    async fn find_by_consent_id(
        &self,
        _id: &ConsentId,
    ) -> Result<Option<Consent>, ConsentStoreError> {
        Err(ConsentStoreError::Unavailable("connection refused".into()))
    }

    async fn update_last_access(
        &self,
        _id: &ConsentId,
        _at: DateTime<Utc>,
    ) -> Result<(), ConsentStoreError> {
        Err(ConsentStoreError::Unavailable("connection refused".into()))
    }
}

#[tokio::test]
async fn store_failure_maps_to_error() {
    let validator = ConsentValidator::new(
        Arc::new(BrokenStore),
        PermissionFilter::default(),
        ManualClock::new(now()),
    );
    let outcome = validator
        .validate_for_operation(&"C1".into(), Endpoint::ListAccounts)
        .await;
    assert_eq!(outcome.status, ValidationStatus::Error);
    assert!(!outcome.is_valid());
}

#[tokio::test]
async fn record_access_stamps_clock_time() {
    let (validator, store, clock) =
        validator(vec![consent("C1", STATUS_AUTHORISED, &["ACCOUNTS_READ"])]);
    clock.advance(Duration::minutes(5));
    validator.record_access(&"C1".into()).await.unwrap();
    assert_eq!(
        store.get(&"C1".into()).unwrap().last_access,
        Some(now() + Duration::minutes(5))
    );
    assert!(validator.record_access(&"missing".into()).await.is_err());
}
