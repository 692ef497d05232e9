use chrono::{DateTime, Utc};
use gateway_core_types::{ConsentId, CustomerId, Endpoint, OrganizationId};
use permissions_broker::PermissionCode;
use serde::{Deserialize, Serialize};

pub const STATUS_AUTHORISED: &str = "AUTHORISED";

/// Consent record as persisted by the consent management system.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consent {
    pub consent_id: ConsentId,
    pub organization_id: OrganizationId,
    pub customer_id: CustomerId,
    pub status: String,
    pub expiration_date_time: DateTime<Utc>,
    #[serde(default)]
    pub transaction_from_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transaction_to_date: Option<DateTime<Utc>>,
    pub permissions: Vec<String>,
    #[serde(default)]
    pub last_access: Option<DateTime<Utc>>,
}

impl Consent {
    pub fn is_authorised(&self) -> bool {
        self.status == STATUS_AUTHORISED
    }

    pub fn has_transaction_window(&self) -> bool {
        self.transaction_from_date.is_some() || self.transaction_to_date.is_some()
    }

    pub fn within_transaction_window(&self, now: DateTime<Utc>) -> bool {
        let after_start = self.transaction_from_date.map_or(true, |from| now >= from);
        let before_end = self.transaction_to_date.map_or(true, |to| now <= to);
        after_start && before_end
    }
}

/// Minimum permissions an endpoint needs; any one of them is enough.
pub fn required_permissions(endpoint: Endpoint) -> &'static [PermissionCode] {
    match endpoint {
        Endpoint::ListAccounts | Endpoint::AccountDetail => &[PermissionCode::AccountsRead],
        Endpoint::Balances => &[PermissionCode::AccountsBalancesRead],
        Endpoint::Transactions => &[PermissionCode::AccountsTransactionsRead],
        Endpoint::OverdraftLimits => &[PermissionCode::AccountsOverdraftLimitsRead],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn consent() -> Consent {
        Consent {
            consent_id: "urn:bank:C1".into(),
            organization_id: "org-1".into(),
            customer_id: "76109277673".into(),
            status: STATUS_AUTHORISED.into(),
            expiration_date_time: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
            transaction_from_date: None,
            transaction_to_date: None,
            permissions: vec!["ACCOUNTS_READ".into()],
            last_access: None,
        }
    }

    #[test]
    fn open_window_always_applies() {
        let consent = consent();
        assert!(!consent.has_transaction_window());
        assert!(consent.within_transaction_window(Utc::now()));
    }

    #[test]
    fn half_open_window_checks_one_bound() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap();
        let mut consent = consent();
        consent.transaction_to_date = Some(now - Duration::days(1));
        assert!(consent.has_transaction_window());
        assert!(!consent.within_transaction_window(now));
        consent.transaction_to_date = None;
        consent.transaction_from_date = Some(now - Duration::days(1));
        assert!(consent.within_transaction_window(now));
    }

    #[test]
    fn deserializes_camel_case_records() {
        let raw = r#"{
            "consentId": "urn:bank:C9",
            "organizationId": "org-9",
            "customerId": "123",
            "status": "AUTHORISED",
            "expirationDateTime": "2030-01-01T00:00:00Z",
            "permissions": ["ACCOUNTS_READ", "RESOURCES_READ"]
        }"#;
        let consent: Consent = serde_json::from_str(raw).unwrap();
        assert_eq!(consent.consent_id.as_str(), "urn:bank:C9");
        assert!(consent.last_access.is_none());
        assert!(consent.is_authorised());
    }

    #[test]
    fn detail_and_listing_share_requirement() {
        assert_eq!(
            required_permissions(Endpoint::ListAccounts),
            required_permissions(Endpoint::AccountDetail)
        );
    }
}
