use std::sync::Arc;
use std::time::Duration as StdDuration;

use access_orchestrator::{
    AccessError, AccessOrchestrator, AccessRequest, AccountBalances, AccountFixture,
    AccountRecord, AccountTransaction, Amount, InMemoryAccountSource, OrchestratorDeps,
};
use audit_trail::{AuditOutcome, InMemoryAuditSink};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use consent_center::{Consent, ConsentValidator, InMemoryConsentStore, STATUS_AUTHORISED};
use gateway_core_types::{Endpoint, ManualClock};
use gateway_policy_center::{
    default_snapshot, InMemoryPolicyCenter, PolicyCenter, PolicySnapshot, QuotaCategory,
    RuntimeOverrideSpec,
};
use pagination_keys::PaginationKeyManager;
use permissions_broker::PermissionFilter;
use traffic_guard::{
    counter_key, CountingBackend, InMemoryConsentVolume, InMemoryCountingBackend,
    OperationalQuotaTracker, RateLimiter, RateWindow,
};

const CUSTOMER: &str = "76109277673";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 10, 14, 0, 0).unwrap()
}

fn consent(id: &str, status: &str, permissions: &[&str]) -> Consent {
    Consent {
        consent_id: id.into(),
        organization_id: "org-1".into(),
        customer_id: CUSTOMER.into(),
        status: status.into(),
        expiration_date_time: now() + Duration::days(180),
        transaction_from_date: None,
        transaction_to_date: None,
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
        last_access: None,
    }
}

fn account(id: &str, account_type: &str) -> AccountFixture {
    AccountFixture {
        account: AccountRecord {
            account_id: id.into(),
            brand_name: "Banco Exemplo".into(),
            company_cnpj: "21128159000166".into(),
            account_type: account_type.into(),
            compe_code: "001".into(),
            branch_code: Some("6272".into()),
            number: format!("9483{id}"),
            check_digit: "7".into(),
        },
        balances: Some(AccountBalances {
            available_amount: Amount::brl("1500.00"),
            blocked_amount: Amount::brl("0.00"),
            automatically_invested_amount: Amount::brl("250.00"),
            update_date_time: now(),
        }),
        overdraft_limits: None,
        transactions: (0..5)
            .map(|n| AccountTransaction {
                transaction_id: format!("{id}-tx-{n}"),
                completed_authorised_payment_type: "TRANSACAO_EFETIVADA".into(),
                credit_debit_type: "DEBITO".into(),
                transaction_name: "PIX".into(),
                transaction_type: "PIX".into(),
                transaction_amount: Amount::brl("10.00"),
                transaction_date_time: now() - Duration::days(n),
            })
            .collect(),
    }
}

struct Harness {
    orchestrator: Arc<AccessOrchestrator>,
    consents: Arc<InMemoryConsentStore>,
    source: Arc<InMemoryAccountSource>,
    audit: Arc<InMemoryAuditSink>,
    backend: Arc<InMemoryCountingBackend>,
    pagination: Arc<PaginationKeyManager>,
}

fn harness(policy: PolicySnapshot) -> Harness {
    harness_with_source(policy, InMemoryAccountSource::new())
}

fn harness_with_source(mut policy: PolicySnapshot, source: InMemoryAccountSource) -> Harness {
    policy.pagination.signing_secret = Some("pipeline-secret".into());
    let clock = ManualClock::new(now());
    let consents = Arc::new(InMemoryConsentStore::from_iter([
        consent(
            "C1",
            STATUS_AUTHORISED,
            &[
                "ACCOUNTS_READ",
                "ACCOUNTS_BALANCES_READ",
                "ACCOUNTS_TRANSACTIONS_READ",
                "RESOURCES_READ",
            ],
        ),
        consent("C2", "CONSUMED", &["ACCOUNTS_READ"]),
        consent("C3", STATUS_AUTHORISED, &["CREDIT_CARDS_ACCOUNTS_READ"]),
        consent(
            "C4",
            STATUS_AUTHORISED,
            &["ACCOUNTS_READ", "INVESTMENTS_READ", "BANK_FIXED_INCOMES_READ"],
        ),
    ]));
    let source = Arc::new(source);
    for id in ["a1", "a2", "a3"] {
        source.insert(CUSTOMER, account(id, "CONTA_DEPOSITO_A_VISTA"));
    }
    source.insert(CUSTOMER, account("s1", "CONTA_POUPANCA"));

    let backend = Arc::new(InMemoryCountingBackend::new(clock.clone()));
    let audit = InMemoryAuditSink::new();
    let pagination = Arc::new(PaginationKeyManager::new(&policy.pagination, clock.clone()));
    let deps = OrchestratorDeps {
        rate_limiter: Arc::new(RateLimiter::new(
            backend.clone(),
            Arc::new(InMemoryConsentVolume::new()),
            policy.rate_limits.clone(),
        )),
        consent_validator: Arc::new(ConsentValidator::new(
            consents.clone(),
            PermissionFilter::default(),
            clock.clone(),
        )),
        pagination: pagination.clone(),
        quota: Arc::new(OperationalQuotaTracker::new(
            backend.clone(),
            clock.clone(),
            policy.quotas.clone(),
        )),
        data_source: source.clone(),
        audit: audit.clone(),
        clock,
        policy: Arc::new(policy),
    };
    Harness {
        orchestrator: Arc::new(AccessOrchestrator::new(deps)),
        consents,
        source,
        audit,
        backend,
        pagination,
    }
}

fn key_from(link: &str) -> String {
    let (_, tail) = link.split_once("pagination-key=").unwrap();
    tail.split('&').next().unwrap().to_string()
}

async fn rate_hits(h: &Harness, endpoint: Endpoint) -> u64 {
    let key = counter_key(RateWindow::PerMinute, &"org-1".into(), endpoint);
    h.backend.count(&key, Duration::minutes(1)).await.unwrap()
}

#[tokio::test]
async fn authorised_consent_lists_accounts_with_links() {
    let h = harness(default_snapshot());
    let result = h
        .orchestrator
        .get_accounts(AccessRequest::new("C1", "org-1").with_page(1, 2))
        .await
        .unwrap();

    let accounts = result.data.accounts().unwrap();
    assert_eq!(accounts.len(), 2);
    assert_eq!(result.meta.total_records, 4);
    assert_eq!(result.meta.total_pages, 2);
    assert_eq!(result.meta.request_date_time, now());
    assert!(result.links.first.is_none());
    let next = result.links.next.as_deref().unwrap();
    assert!(next.contains("page=2"));
    assert!(h.pagination.validate(&key_from(next)));

    let audit = h.audit.last().unwrap();
    assert_eq!(audit.outcome, AuditOutcome::Success);
    assert_eq!(audit.http_status, 200);
    assert!(audit.quota_counted);
    assert_eq!(audit.customer_id.as_ref().unwrap().as_str(), CUSTOMER);
    assert_eq!(h.audit.len(), 1);
    assert_eq!(rate_hits(&h, Endpoint::ListAccounts).await, 1);
    assert_eq!(
        h.consents.get(&"C1".into()).unwrap().last_access,
        Some(now())
    );
}

#[tokio::test]
async fn account_type_filter_narrows_listing() {
    let h = harness(default_snapshot());
    let result = h
        .orchestrator
        .get_accounts(AccessRequest::new("C1", "org-1").with_account_type("CONTA_POUPANCA"))
        .await
        .unwrap();
    assert_eq!(result.data.accounts().unwrap().len(), 1);
    assert_eq!(result.meta.total_pages, 1);
    assert!(result.links.next.is_none());
    assert!(result.links.self_link.contains("accountType=CONTA_POUPANCA"));
}

#[tokio::test]
async fn consumed_consent_short_circuits_before_fetch_and_recording() {
    let h = harness(default_snapshot());
    h.source.set_failure(Some("must not be called".into()));

    let err = h
        .orchestrator
        .get_accounts(AccessRequest::new("C2", "org-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::InvalidConsent(_)));
    assert_eq!(err.http_status(), 401);

    assert_eq!(rate_hits(&h, Endpoint::ListAccounts).await, 0);
    let audit = h.audit.last().unwrap();
    assert_eq!(audit.outcome, AuditOutcome::Failure);
    assert_eq!(audit.error_code.as_deref(), Some("INVALID_CONSENT"));
    assert!(!audit.quota_counted);
    assert_eq!(h.consents.get(&"C2".into()).unwrap().last_access, None);
}

#[tokio::test]
async fn unsupported_individual_permission_is_insufficient() {
    let h = harness(default_snapshot());
    let err = h
        .orchestrator
        .get_accounts(AccessRequest::new("C3", "org-1"))
        .await
        .unwrap_err();
    match &err {
        AccessError::InsufficientPermissions { removed, .. } => {
            assert_eq!(removed, &vec!["CREDIT_CARDS_ACCOUNTS_READ".to_string()]);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.http_status(), 403);
    let audit = h.audit.last().unwrap();
    assert_eq!(
        audit.permissions.unwrap().removed,
        vec!["CREDIT_CARDS_ACCOUNTS_READ".to_string()]
    );
}

#[tokio::test]
async fn grouped_investment_permissions_are_retained() {
    let h = harness(default_snapshot());
    let result = h
        .orchestrator
        .get_accounts(AccessRequest::new("C4", "org-1"))
        .await
        .unwrap();
    let filtered = result.permissions.unwrap().filtered;
    assert!(filtered.contains(&"INVESTMENTS_READ".to_string()));
    assert!(filtered.contains(&"BANK_FIXED_INCOMES_READ".to_string()));
}

#[tokio::test]
async fn consent_from_another_organisation_is_invalid() {
    let h = harness(default_snapshot());
    let err = h
        .orchestrator
        .get_accounts(AccessRequest::new("C1", "org-2"))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::InvalidConsent(_)));
}

#[tokio::test]
async fn rate_limit_rejects_and_flags_the_audit_record() {
    let mut policy = default_snapshot();
    policy.rate_limits.tps_high = 1;
    let h = harness(policy);

    h.orchestrator
        .get_accounts(AccessRequest::new("C1", "org-1"))
        .await
        .unwrap();
    let err = h
        .orchestrator
        .get_accounts(AccessRequest::new("C1", "org-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::RateLimitExceeded(_)));
    assert_eq!(err.code(), "RATE_LIMIT_EXCEEDED");

    let audit = h.audit.last().unwrap();
    assert!(audit.security.suspicious_activity);
    assert_eq!(audit.http_status, 429);
    assert_eq!(h.audit.len(), 2);
}

#[tokio::test]
async fn continuation_with_valid_key_is_quota_exempt() {
    let h = harness(default_snapshot());
    let first = h
        .orchestrator
        .get_accounts(AccessRequest::new("C1", "org-1").with_page(1, 1))
        .await
        .unwrap();
    let key = key_from(first.links.next.as_deref().unwrap());

    let second = h
        .orchestrator
        .get_accounts(
            AccessRequest::new("C1", "org-1")
                .with_page(2, 1)
                .with_pagination_key(key),
        )
        .await
        .unwrap();
    assert!(second.links.prev.is_some());
    let audit = h.audit.last().unwrap();
    assert_eq!(audit.pagination_key_valid, Some(true));
    assert!(!audit.quota_counted);
}

#[tokio::test]
async fn forged_or_replayed_keys_are_counted() {
    let h = harness(default_snapshot());
    let first = h
        .orchestrator
        .get_accounts(AccessRequest::new("C1", "org-1").with_page(1, 1))
        .await
        .unwrap();
    let key = key_from(first.links.next.as_deref().unwrap());

    // Replaying C1's key under another consent.
    h.orchestrator
        .get_accounts(
            AccessRequest::new("C4", "org-1")
                .with_page(2, 1)
                .with_pagination_key(key),
        )
        .await
        .unwrap();
    let audit = h.audit.last().unwrap();
    assert_eq!(audit.pagination_key_valid, Some(false));
    assert!(audit.quota_counted);
    assert!(audit.security.suspicious_activity);

    h.orchestrator
        .get_accounts(
            AccessRequest::new("C1", "org-1")
                .with_page(2, 1)
                .with_pagination_key("forged.key"),
        )
        .await
        .unwrap();
    assert!(h.audit.last().unwrap().quota_counted);
}

#[tokio::test]
async fn monthly_quota_is_enforced() {
    let mut policy = default_snapshot();
    policy.quotas.balances = QuotaCategory::Low;
    let h = harness(policy);
    let request = || AccessRequest::new("C1", "org-1").with_account("a1");

    for _ in 0..QuotaCategory::Low.monthly_limit() {
        h.orchestrator.get_balances(request()).await.unwrap();
    }
    let err = h.orchestrator.get_balances(request()).await.unwrap_err();
    assert!(matches!(err, AccessError::OperationalLimitExceeded(_)));
    assert_eq!(err.http_status(), 423);
}

#[tokio::test]
async fn continuation_keys_stop_once_quota_is_spent() {
    let mut policy = default_snapshot();
    policy.quotas.list_accounts = QuotaCategory::Low;
    let h = harness(policy);
    let first = h
        .orchestrator
        .get_accounts(AccessRequest::new("C1", "org-1").with_page(1, 1))
        .await
        .unwrap();
    let key = key_from(first.links.next.as_deref().unwrap());
    let continuation = || {
        AccessRequest::new("C1", "org-1")
            .with_page(2, 1)
            .with_pagination_key(key.clone())
    };

    h.orchestrator.get_accounts(continuation()).await.unwrap();
    for _ in 1..QuotaCategory::Low.monthly_limit() {
        h.orchestrator
            .get_accounts(AccessRequest::new("C1", "org-1"))
            .await
            .unwrap();
    }

    let err = h.orchestrator.get_accounts(continuation()).await.unwrap_err();
    assert!(matches!(err, AccessError::OperationalLimitExceeded(_)));
    assert!(!h.audit.last().unwrap().quota_counted);
}

#[tokio::test]
async fn slow_data_source_times_out() {
    let mut policy = default_snapshot();
    policy.fetch.timeout_ms = 20;
    let h = harness(policy);
    h.source.set_latency(Some(StdDuration::from_millis(500)));

    let err = h
        .orchestrator
        .get_accounts(AccessRequest::new("C1", "org-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::ExternalFetchFailed(_)));
    assert_eq!(rate_hits(&h, Endpoint::ListAccounts).await, 0);
    assert_eq!(
        h.audit.last().unwrap().error_code.as_deref(),
        Some("EXTERNAL_FETCH_FAILED")
    );
}

#[tokio::test]
async fn upstream_failure_is_external_fetch_failed() {
    let h = harness(default_snapshot());
    h.source.set_failure(Some("core banking down".into()));
    let err = h
        .orchestrator
        .get_accounts(AccessRequest::new("C1", "org-1"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "EXTERNAL_FETCH_FAILED");
    assert!(err.to_string().contains("core banking down"));
}

#[tokio::test]
async fn per_account_endpoints_require_an_account_id() {
    let h = harness(default_snapshot());
    let err = h
        .orchestrator
        .get_balances(AccessRequest::new("C1", "org-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::InvalidRequest(_)));
    assert_eq!(h.audit.len(), 1);

    let err = h
        .orchestrator
        .get_accounts(AccessRequest::new("C1", "org-1").with_page(0, 25))
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 400);

    let err = h
        .orchestrator
        .get_accounts(AccessRequest::new("C1", "org-1").with_correlation_id(" "))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::InvalidRequest(_)));
}

#[tokio::test]
async fn balances_and_detail_use_the_account_path() {
    let h = harness(default_snapshot());
    let balances = h
        .orchestrator
        .get_balances(AccessRequest::new("C1", "org-1").with_account("a2"))
        .await
        .unwrap();
    assert!(balances.links.self_link.ends_with("/accounts/a2/balances"));
    assert!(balances.links.next.is_none());
    assert_eq!(balances.meta.total_pages, 1);

    let detail = h
        .orchestrator
        .get_account(AccessRequest::new("C1", "org-1").with_account("a3"))
        .await
        .unwrap();
    assert_eq!(detail.data.record_count(), 1);

    let err = h
        .orchestrator
        .get_account(AccessRequest::new("C1", "org-1").with_account("someone-else"))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::ExternalFetchFailed(_)));
}

#[tokio::test]
async fn overdraft_requires_its_own_permission() {
    let h = harness(default_snapshot());
    let err = h
        .orchestrator
        .get_overdraft_limits(AccessRequest::new("C1", "org-1").with_account("a1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::InsufficientPermissions { .. }));
}

#[tokio::test]
async fn transactions_page_without_reported_totals() {
    let source = InMemoryAccountSource::new().without_totals();
    let h = harness_with_source(default_snapshot(), source);
    let first = h
        .orchestrator
        .get_transactions(
            AccessRequest::new("C1", "org-1")
                .with_account("a1")
                .with_page(1, 3),
        )
        .await
        .unwrap();
    assert_eq!(first.data.transactions().unwrap().len(), 3);
    assert!(first.meta.totals_inferred);
    assert_eq!(first.meta.total_pages, 2);
    let next = first.links.next.as_deref().unwrap();
    assert!(next.contains("/accounts/a1/transactions?"));

    let second = h
        .orchestrator
        .get_transactions(
            AccessRequest::new("C1", "org-1")
                .with_account("a1")
                .with_page(2, 3)
                .with_pagination_key(key_from(next)),
        )
        .await
        .unwrap();
    assert_eq!(second.data.transactions().unwrap().len(), 2);
    assert!(second.links.next.is_none());
    assert!(!h.audit.last().unwrap().quota_counted);
}

#[tokio::test]
async fn booking_window_narrows_transactions_and_auth_date_is_audited() {
    let h = harness(default_snapshot());
    let authenticated = now() - Duration::minutes(3);
    let from = NaiveDate::from_ymd_opt(2024, 7, 7);
    let to = NaiveDate::from_ymd_opt(2024, 7, 9);
    let result = h
        .orchestrator
        .get_transactions(
            AccessRequest::new("C1", "org-1")
                .with_account("a1")
                .with_booking_window(from, to)
                .with_auth_date(authenticated),
        )
        .await
        .unwrap();

    let booked = result.data.transactions().unwrap();
    assert_eq!(booked.len(), 3);
    assert!(booked
        .iter()
        .all(|tx| tx.transaction_id != "a1-tx-0" && tx.transaction_id != "a1-tx-4"));
    assert_eq!(result.meta.total_records, 3);
    assert!(result.links.self_link.contains("fromBookingDate=2024-07-07"));
    assert_eq!(h.audit.last().unwrap().auth_date, Some(authenticated));
}

#[tokio::test]
async fn inverted_booking_window_is_a_bad_request() {
    let h = harness(default_snapshot());
    let err = h
        .orchestrator
        .get_transactions(
            AccessRequest::new("C1", "org-1")
                .with_account("a1")
                .with_booking_window(
                    NaiveDate::from_ymd_opt(2024, 7, 9),
                    NaiveDate::from_ymd_opt(2024, 7, 1),
                ),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::InvalidRequest(_)));
    assert_eq!(err.http_status(), 400);
}

#[tokio::test]
async fn security_flags_do_not_change_the_outcome() {
    let mut policy = default_snapshot();
    policy.security.denied_ips = vec!["203.0.113.7".into()];
    let h = harness(policy);
    let result = h
        .orchestrator
        .get_accounts(
            AccessRequest::new("C1", "org-1")
                .with_page(2, 1)
                .with_client_ip("203.0.113.7"),
        )
        .await;
    assert!(result.is_ok());
    let flags = h.audit.last().unwrap().security;
    assert!(flags.disallowed_ip);
    assert!(flags.suspicious_activity);
}

#[tokio::test]
async fn audit_record_reports_sla() {
    let h = harness(default_snapshot());
    h.orchestrator
        .get_accounts(AccessRequest::new("C1", "org-1"))
        .await
        .unwrap();
    let sla = h.audit.last().unwrap().sla;
    assert_eq!(sla.threshold_ms, 1_500);
    assert!(sla.compliant);
}

#[tokio::test]
async fn orchestrator_follows_policy_updates() {
    let h = harness(default_snapshot());
    let center = InMemoryPolicyCenter::new(default_snapshot());
    let handle = h.orchestrator.follow_policy(center.subscribe());

    center
        .apply_override(RuntimeOverrideSpec {
            path: "rate_limits.tps_high".into(),
            value: serde_json::json!(1),
            owner: "ops".into(),
            reason: "incident".into(),
            ttl_seconds: 0,
        })
        .await
        .unwrap();

    tokio::time::timeout(StdDuration::from_secs(1), async {
        while h.orchestrator.policy().rate_limits.tps_high != 1 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    h.orchestrator
        .get_accounts(AccessRequest::new("C1", "org-1"))
        .await
        .unwrap();
    assert!(h
        .orchestrator
        .get_accounts(AccessRequest::new("C1", "org-1"))
        .await
        .is_err());
    drop(center);
    handle.await.unwrap();
}
