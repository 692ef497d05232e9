use chrono::{DateTime, NaiveDate, Utc};
use consent_center::PermissionDelta;
use gateway_core_types::{ConsentId, CorrelationId, OrganizationId};
use pagination_keys::PageLinks;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 25;
pub const MAX_PAGE_SIZE: u32 = 1_000;

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// Caller attributes used for security flags and audit only.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContext {
    #[serde(default)]
    pub customer_ip: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// When the customer authenticated with the institution.
    #[serde(default)]
    pub auth_date: Option<DateTime<Utc>>,
}

/// Inclusive booking-date range for a transaction listing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingWindow {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl BookingWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let day = at.date_naive();
        self.from.map_or(true, |from| day >= from) && self.to.map_or(true, |to| day <= to)
    }

    pub fn is_inverted(&self) -> bool {
        matches!((self.from, self.to), (Some(from), Some(to)) if from > to)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    #[serde(default)]
    pub correlation_id: CorrelationId,
    pub consent_id: ConsentId,
    pub organization_id: OrganizationId,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub account_type: Option<String>,
    /// 1-based.
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub pagination_key: Option<String>,
    /// Transactions only.
    #[serde(default)]
    pub from_booking_date: Option<NaiveDate>,
    #[serde(default)]
    pub to_booking_date: Option<NaiveDate>,
    #[serde(default)]
    pub client: ClientContext,
}

impl AccessRequest {
    pub fn new(consent_id: impl Into<ConsentId>, organization_id: impl Into<OrganizationId>) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            consent_id: consent_id.into(),
            organization_id: organization_id.into(),
            account_id: None,
            account_type: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            pagination_key: None,
            from_booking_date: None,
            to_booking_date: None,
            client: ClientContext::default(),
        }
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_account_type(mut self, account_type: impl Into<String>) -> Self {
        self.account_type = Some(account_type.into());
        self
    }

    pub fn with_page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    pub fn with_pagination_key(mut self, key: impl Into<String>) -> Self {
        self.pagination_key = Some(key.into());
        self
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client.customer_ip = Some(ip.into());
        self
    }

    pub fn with_booking_window(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.from_booking_date = from;
        self.to_booking_date = to;
        self
    }

    pub fn with_auth_date(mut self, at: DateTime<Utc>) -> Self {
        self.client.auth_date = Some(at);
        self
    }

    pub fn booking_window(&self) -> BookingWindow {
        BookingWindow {
            from: self.from_booking_date,
            to: self.to_booking_date,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<CorrelationId>) -> Self {
        self.correlation_id = id.into();
        self
    }

    /// Page size bounded to `1..=MAX_PAGE_SIZE`.
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Amount {
    pub amount: String,
    pub currency: String,
}

impl Amount {
    pub fn brl(amount: impl Into<String>) -> Self {
        Self {
            amount: amount.into(),
            currency: "BRL".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub account_id: String,
    pub brand_name: String,
    pub company_cnpj: String,
    #[serde(rename = "type")]
    pub account_type: String,
    pub compe_code: String,
    #[serde(default)]
    pub branch_code: Option<String>,
    pub number: String,
    pub check_digit: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalances {
    pub available_amount: Amount,
    pub blocked_amount: Amount,
    pub automatically_invested_amount: Amount,
    pub update_date_time: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverdraftLimits {
    #[serde(default)]
    pub overdraft_contracted_limit: Option<Amount>,
    #[serde(default)]
    pub overdraft_used_limit: Option<Amount>,
    #[serde(default)]
    pub unarranged_overdraft_amount: Option<Amount>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountTransaction {
    pub transaction_id: String,
    pub completed_authorised_payment_type: String,
    pub credit_debit_type: String,
    pub transaction_name: String,
    #[serde(rename = "type")]
    pub transaction_type: String,
    pub transaction_amount: Amount,
    pub transaction_date_time: DateTime<Utc>,
}

/// Data returned by one endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AccessPayload {
    Accounts(Vec<AccountRecord>),
    Account(AccountRecord),
    Balances(AccountBalances),
    OverdraftLimits(OverdraftLimits),
    Transactions(Vec<AccountTransaction>),
}

impl AccessPayload {
    pub fn record_count(&self) -> usize {
        match self {
            AccessPayload::Accounts(accounts) => accounts.len(),
            AccessPayload::Transactions(transactions) => transactions.len(),
            AccessPayload::Account(_)
            | AccessPayload::Balances(_)
            | AccessPayload::OverdraftLimits(_) => 1,
        }
    }

    pub fn accounts(&self) -> Option<&[AccountRecord]> {
        match self {
            AccessPayload::Accounts(accounts) => Some(accounts),
            _ => None,
        }
    }

    pub fn transactions(&self) -> Option<&[AccountTransaction]> {
        match self {
            AccessPayload::Transactions(transactions) => Some(transactions),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total_records: u64,
    pub total_pages: u32,
    /// Set when the data source could not report a total.
    pub totals_inferred: bool,
    pub request_date_time: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessResult {
    pub data: AccessPayload,
    pub links: PageLinks,
    pub meta: PageMeta,
    #[serde(skip)]
    pub permissions: Option<PermissionDelta>,
    /// A traffic guard answered without its backend.
    #[serde(skip)]
    pub degraded: bool,
}

/// Page count and total for a listing page.
///
/// Without a reported total a full page implies at least one more page.
pub fn page_totals(total: Option<u64>, page: u32, page_size: u32, returned: usize) -> (u64, u32, bool) {
    let size = u64::from(page_size.max(1));
    match total {
        Some(total) => {
            let pages = total.div_ceil(size);
            (total, u32::try_from(pages).unwrap_or(u32::MAX), false)
        }
        None => {
            let before = u64::from(page.saturating_sub(1)) * size;
            let seen = before + returned as u64;
            if returned == 0 && page == 1 {
                (0, 0, true)
            } else if returned as u64 >= size {
                (seen, page.saturating_add(1), true)
            } else {
                (seen, page, true)
            }
        }
    }
}
