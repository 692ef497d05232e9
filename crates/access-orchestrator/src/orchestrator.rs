use std::sync::Arc;
use std::time::{Duration, Instant};

use audit_trail::{
    AccessAuditRecord, AuditOutcome, AuditSink, PermissionAudit, SecuritySignals, SlaReport,
};
use chrono::{DateTime, Utc};
use consent_center::{Consent, ConsentValidator, PermissionDelta, ValidationStatus};
use gateway_core_types::{CustomerId, Endpoint, SharedClock};
use gateway_policy_center::PolicySnapshot;
use pagination_keys::{build_links, KeyBinding, LinkContext, PageLinks, PaginationKeyManager};
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use traffic_guard::{OperationalQuotaTracker, QuotaDecision, QuotaKey, RateDecision, RateLimiter};

use crate::errors::AccessError;
use crate::model::{page_totals, AccessPayload, AccessRequest, AccessResult, PageMeta};
use crate::source::{AccountDataSource, FetchError};

/// Collaborators wired into an orchestrator.
pub struct OrchestratorDeps {
    pub rate_limiter: Arc<RateLimiter>,
    pub consent_validator: Arc<ConsentValidator>,
    pub pagination: Arc<PaginationKeyManager>,
    pub quota: Arc<OperationalQuotaTracker>,
    pub data_source: Arc<dyn AccountDataSource>,
    pub audit: Arc<dyn AuditSink>,
    pub clock: SharedClock,
    pub policy: Arc<PolicySnapshot>,
}

/// What a run observed, for the audit record.
#[derive(Default)]
struct RunTrace {
    customer_id: Option<CustomerId>,
    permissions: Option<PermissionDelta>,
    page_size: u32,
    key_presented: bool,
    key_valid: Option<bool>,
    rate_limited: bool,
    quota_counted: bool,
    degraded: bool,
    records_returned: usize,
}

/// Runs the consent-gated access pipeline for account endpoints.
pub struct AccessOrchestrator {
    rate_limiter: Arc<RateLimiter>,
    consent_validator: Arc<ConsentValidator>,
    pagination: Arc<PaginationKeyManager>,
    quota: Arc<OperationalQuotaTracker>,
    data_source: Arc<dyn AccountDataSource>,
    audit: Arc<dyn AuditSink>,
    clock: SharedClock,
    policy: RwLock<Arc<PolicySnapshot>>,
}

impl AccessOrchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            rate_limiter: deps.rate_limiter,
            consent_validator: deps.consent_validator,
            pagination: deps.pagination,
            quota: deps.quota,
            data_source: deps.data_source,
            audit: deps.audit,
            clock: deps.clock,
            policy: RwLock::new(deps.policy),
        }
    }

    pub fn policy(&self) -> Arc<PolicySnapshot> {
        self.policy.read().clone()
    }

    /// Pushes a new snapshot into every component holding a policy slice.
    pub fn apply_policy(&self, snapshot: Arc<PolicySnapshot>) {
        self.rate_limiter.update_policy(snapshot.rate_limits.clone());
        self.quota.update_policy(snapshot.quotas.clone());
        self.pagination.update_policy(&snapshot.pagination);
        debug!(target: "access-orchestrator", rev = snapshot.rev, "policy applied");
        *self.policy.write() = snapshot;
    }

    /// Applies every snapshot published on `updates` until the sender goes away.
    pub fn follow_policy(
        self: &Arc<Self>,
        mut updates: watch::Receiver<Arc<PolicySnapshot>>,
    ) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let snapshot = updates.borrow_and_update().clone();
                orchestrator.apply_policy(snapshot);
            }
        })
    }

    pub async fn get_accounts(&self, request: AccessRequest) -> Result<AccessResult, AccessError> {
        self.execute(Endpoint::ListAccounts, request).await
    }

    pub async fn get_account(&self, request: AccessRequest) -> Result<AccessResult, AccessError> {
        self.execute(Endpoint::AccountDetail, request).await
    }

    pub async fn get_balances(&self, request: AccessRequest) -> Result<AccessResult, AccessError> {
        self.execute(Endpoint::Balances, request).await
    }

    pub async fn get_overdraft_limits(
        &self,
        request: AccessRequest,
    ) -> Result<AccessResult, AccessError> {
        self.execute(Endpoint::OverdraftLimits, request).await
    }

    pub async fn get_transactions(
        &self,
        request: AccessRequest,
    ) -> Result<AccessResult, AccessError> {
        self.execute(Endpoint::Transactions, request).await
    }

    /// One full run; emits exactly one audit record whatever the outcome.
    pub async fn execute(
        &self,
        endpoint: Endpoint,
        request: AccessRequest,
    ) -> Result<AccessResult, AccessError> {
        let policy = self.policy();
        let started_at = self.clock.now();
        let timer = Instant::now();
        let span = info_span!(
            "access",
            correlation_id = %request.correlation_id,
            consent_id = %request.consent_id,
            organization_id = %request.organization_id,
            endpoint = %endpoint,
        );
        let mut trace = RunTrace {
            page_size: request.effective_page_size(),
            ..RunTrace::default()
        };

        let outcome = self
            .run(endpoint, &request, &policy, started_at, &mut trace)
            .instrument(span.clone())
            .await;

        let elapsed = timer.elapsed();
        match &outcome {
            Ok(result) => info!(
                target: "access-orchestrator",
                parent: &span,
                records = result.data.record_count(),
                elapsed_ms = elapsed.as_millis() as u64,
                "access served"
            ),
            Err(err) => warn!(
                target: "access-orchestrator",
                parent: &span,
                code = err.code(),
                error = %err,
                "access rejected"
            ),
        }

        let record = self.audit_record(
            endpoint, &request, &policy, trace, &outcome, started_at, elapsed,
        );
        if let Err(err) = self.audit.persist(record).instrument(span).await {
            warn!(target: "access-orchestrator", error = %err, "audit persist failed");
        }
        outcome
    }

    async fn run(
        &self,
        endpoint: Endpoint,
        request: &AccessRequest,
        policy: &PolicySnapshot,
        started_at: DateTime<Utc>,
        trace: &mut RunTrace,
    ) -> Result<AccessResult, AccessError> {
        validate_request(endpoint, request)?;
        let page = request.page;
        let page_size = trace.page_size;

        match self
            .rate_limiter
            .check_and_admit(&request.organization_id, endpoint)
            .await
        {
            RateDecision::Admitted { degraded } => trace.degraded |= degraded,
            RateDecision::Rejected {
                window,
                current,
                limit,
            } => {
                trace.rate_limited = true;
                return Err(AccessError::RateLimitExceeded(format!(
                    "{window} ceiling {limit} reached ({current})"
                )));
            }
            RateDecision::Unavailable { reason } => {
                return Err(AccessError::RateLimitExceeded(reason));
            }
        }

        let consent = self.validate_consent(endpoint, request, trace).await?;

        let binding = KeyBinding {
            consent_id: request.consent_id.clone(),
            organization_id: request.organization_id.clone(),
            account_id: request.account_id.clone(),
            account_type: request.account_type.clone(),
            page,
            page_size,
        };
        let is_continuation = match &request.pagination_key {
            Some(key) => {
                trace.key_presented = true;
                match self.pagination.validate_for(key, &binding) {
                    Ok(_) => {
                        trace.key_valid = Some(true);
                        true
                    }
                    Err(err) => {
                        warn!(
                            target: "access-orchestrator",
                            error = %err,
                            "pagination key rejected, call counts against quota"
                        );
                        trace.key_valid = Some(false);
                        false
                    }
                }
            }
            None => false,
        };

        let quota_key = QuotaKey::new(
            consent.consent_id.clone(),
            consent.customer_id.clone(),
            request.organization_id.clone(),
            endpoint,
        );
        match self.quota.check_monthly_quota(&quota_key).await {
            QuotaDecision::WithinQuota { degraded, .. } => trace.degraded |= degraded,
            QuotaDecision::Exceeded {
                used,
                limit,
                category,
            } => {
                return Err(AccessError::OperationalLimitExceeded(format!(
                    "{used} of {limit} monthly calls used ({category:?})"
                )));
            }
            QuotaDecision::Unavailable { reason } => {
                return Err(AccessError::OperationalLimitExceeded(reason));
            }
        }

        let timeout = Duration::from_millis(policy.fetch.timeout_ms.max(1));
        let fetch = self.fetch(endpoint, &consent, request, page, page_size);
        let (data, reported_total) = match tokio::time::timeout(timeout, fetch).await {
            Ok(Ok(fetched)) => fetched,
            Ok(Err(err)) => return Err(AccessError::ExternalFetchFailed(err.to_string())),
            Err(_) => {
                return Err(AccessError::ExternalFetchFailed(format!(
                    "data source timed out after {} ms",
                    timeout.as_millis()
                )))
            }
        };
        trace.records_returned = data.record_count();

        let (meta, links) = self.paginate(
            endpoint,
            request,
            policy,
            &binding,
            &data,
            reported_total,
            started_at,
        )?;

        if let Err(err) = self
            .rate_limiter
            .record(&request.organization_id, endpoint)
            .await
        {
            warn!(target: "access-orchestrator", error = %err, "rate record failed");
        }
        match self
            .quota
            .record_if_countable(&quota_key, is_continuation)
            .await
        {
            Ok(counted) => trace.quota_counted = counted,
            Err(err) => warn!(target: "access-orchestrator", error = %err, "quota record failed"),
        }
        if let Err(err) = self.consent_validator.record_access(&consent.consent_id).await {
            warn!(target: "access-orchestrator", error = %err, "last access update failed");
        }

        Ok(AccessResult {
            data,
            links,
            meta,
            permissions: trace.permissions.clone(),
            degraded: trace.degraded,
        })
    }

    async fn validate_consent(
        &self,
        endpoint: Endpoint,
        request: &AccessRequest,
        trace: &mut RunTrace,
    ) -> Result<Consent, AccessError> {
        let outcome = self
            .consent_validator
            .validate_for_operation(&request.consent_id, endpoint)
            .await;
        trace.permissions = outcome.permissions.clone();
        trace.customer_id = outcome.consent.as_ref().map(|c| c.customer_id.clone());
        match outcome.status {
            ValidationStatus::Valid => {}
            ValidationStatus::Invalid => return Err(AccessError::InvalidConsent(outcome.reason)),
            ValidationStatus::Expired => return Err(AccessError::ConsentExpired(outcome.reason)),
            ValidationStatus::InsufficientPermissions => {
                return Err(AccessError::InsufficientPermissions {
                    reason: outcome.reason,
                    removed: outcome
                        .permissions
                        .map(|delta| delta.removed)
                        .unwrap_or_default(),
                })
            }
            ValidationStatus::Error => {
                return Err(AccessError::ConsentValidationError(outcome.reason))
            }
        }
        let consent = outcome.consent.ok_or_else(|| {
            AccessError::ConsentValidationError("valid outcome without consent".into())
        })?;
        if consent.organization_id != request.organization_id {
            return Err(AccessError::InvalidConsent(format!(
                "consent {} was not granted to organisation {}",
                consent.consent_id, request.organization_id
            )));
        }
        Ok(consent)
    }

    async fn fetch(
        &self,
        endpoint: Endpoint,
        consent: &Consent,
        request: &AccessRequest,
        page: u32,
        page_size: u32,
    ) -> Result<(AccessPayload, Option<u64>), FetchError> {
        let source = &self.data_source;
        let account_id = request.account_id.as_deref().unwrap_or_default();
        let page_zero_based = page - 1;
        match endpoint {
            Endpoint::ListAccounts => {
                let account_type = request.account_type.as_deref();
                let accounts = source
                    .fetch_accounts(consent, account_type, page_zero_based, page_size)
                    .await?;
                let total = source.count_accounts(consent, account_type).await?;
                Ok((AccessPayload::Accounts(accounts), total))
            }
            Endpoint::AccountDetail => Ok((
                AccessPayload::Account(source.fetch_account(consent, account_id).await?),
                None,
            )),
            Endpoint::Balances => Ok((
                AccessPayload::Balances(source.fetch_balances(consent, account_id).await?),
                None,
            )),
            Endpoint::OverdraftLimits => Ok((
                AccessPayload::OverdraftLimits(
                    source.fetch_overdraft_limits(consent, account_id).await?,
                ),
                None,
            )),
            Endpoint::Transactions => {
                let window = request.booking_window();
                let transactions = source
                    .fetch_transactions(consent, account_id, &window, page_zero_based, page_size)
                    .await?;
                let total = source.count_transactions(consent, account_id, &window).await?;
                Ok((AccessPayload::Transactions(transactions), total))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn paginate(
        &self,
        endpoint: Endpoint,
        request: &AccessRequest,
        policy: &PolicySnapshot,
        binding: &KeyBinding,
        data: &AccessPayload,
        reported_total: Option<u64>,
        requested_at: DateTime<Utc>,
    ) -> Result<(PageMeta, PageLinks), AccessError> {
        let context = LinkContext {
            base_url: &policy.pagination.base_url,
            endpoint,
            account_id: request.account_id.as_deref(),
            account_type: request.account_type.as_deref(),
            from_booking_date: request.from_booking_date,
            to_booking_date: request.to_booking_date,
            page_size: binding.page_size,
        };
        if !endpoint.is_listing() {
            let self_link = context
                .resource_link()
                .map_err(|err| AccessError::Internal(err.to_string()))?;
            let meta = PageMeta {
                total_records: 1,
                total_pages: 1,
                totals_inferred: false,
                request_date_time: requested_at,
            };
            return Ok((
                meta,
                PageLinks {
                    self_link,
                    ..PageLinks::default()
                },
            ));
        }

        let (total_records, total_pages, totals_inferred) = page_totals(
            reported_total,
            binding.page,
            binding.page_size,
            data.record_count(),
        );
        let key = if binding.page < total_pages {
            match self.pagination.issue(binding.clone()) {
                Ok(key) => Some(key),
                Err(err) => {
                    warn!(target: "access-orchestrator", error = %err, "pagination key not issued");
                    None
                }
            }
        } else {
            None
        };
        let links = build_links(&context, binding.page, total_pages, key.as_deref())
            .map_err(|err| AccessError::Internal(err.to_string()))?;
        let meta = PageMeta {
            total_records,
            total_pages,
            totals_inferred,
            request_date_time: requested_at,
        };
        Ok((meta, links))
    }

    #[allow(clippy::too_many_arguments)]
    fn audit_record(
        &self,
        endpoint: Endpoint,
        request: &AccessRequest,
        policy: &PolicySnapshot,
        trace: RunTrace,
        outcome: &Result<AccessResult, AccessError>,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> AccessAuditRecord {
        let security = SecuritySignals {
            page: request.page,
            page_size: trace.page_size,
            small_page_threshold: policy.pagination.small_page_threshold,
            pagination_key_rejected: trace.key_valid == Some(false),
            rate_limited: trace.rate_limited,
            customer_ip: request.client.customer_ip.as_deref(),
            denied_ips: &policy.security.denied_ips,
        }
        .assess();
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let (audit_outcome, error_code, http_status) = match outcome {
            Ok(_) => (AuditOutcome::Success, None, 200),
            Err(err) => (
                AuditOutcome::Failure,
                Some(err.code().to_string()),
                err.http_status(),
            ),
        };
        AccessAuditRecord {
            audit_id: AccessAuditRecord::new_audit_id(),
            correlation_id: request.correlation_id.clone(),
            consent_id: request.consent_id.clone(),
            organization_id: request.organization_id.clone(),
            customer_id: trace.customer_id,
            endpoint,
            account_id: request.account_id.clone(),
            outcome: audit_outcome,
            error_code,
            http_status,
            permissions: trace.permissions.map(|delta| PermissionAudit {
                requested: delta.requested,
                filtered: delta.filtered,
                removed: delta.removed,
            }),
            page: request.page,
            page_size: trace.page_size,
            records_returned: trace.records_returned,
            pagination_key_presented: trace.key_presented,
            pagination_key_valid: trace.key_valid,
            quota_counted: trace.quota_counted,
            degraded: trace.degraded,
            client_ip: request.client.customer_ip.clone(),
            user_agent: request.client.user_agent.clone(),
            auth_date: request.client.auth_date,
            security,
            started_at,
            finished_at: self.clock.now(),
            sla: SlaReport::new(elapsed_ms, policy.sla.threshold_ms(endpoint)),
        }
    }
}

fn validate_request(endpoint: Endpoint, request: &AccessRequest) -> Result<(), AccessError> {
    if request.correlation_id.as_str().trim().is_empty() {
        return Err(AccessError::InvalidRequest("correlation id is required".into()));
    }
    if request.consent_id.as_str().trim().is_empty() {
        return Err(AccessError::InvalidRequest("consent id is required".into()));
    }
    if request.page == 0 {
        return Err(AccessError::InvalidRequest("page starts at 1".into()));
    }
    if request.booking_window().is_inverted() {
        return Err(AccessError::InvalidRequest(
            "fromBookingDate is after toBookingDate".into(),
        ));
    }
    let needs_account = endpoint != Endpoint::ListAccounts;
    let has_account = request
        .account_id
        .as_deref()
        .is_some_and(|id| !id.trim().is_empty());
    if needs_account && !has_account {
        return Err(AccessError::InvalidRequest(format!(
            "{endpoint} requires an account id"
        )));
    }
    Ok(())
}
