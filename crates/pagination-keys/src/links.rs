use chrono::NaiveDate;
use gateway_core_types::Endpoint;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::PaginationError;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLinks {
    #[serde(rename = "self")]
    pub self_link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
}

/// Fixed parts of every link for one listing request.
#[derive(Clone, Debug)]
pub struct LinkContext<'a> {
    pub base_url: &'a str,
    pub endpoint: Endpoint,
    pub account_id: Option<&'a str>,
    pub account_type: Option<&'a str>,
    pub from_booking_date: Option<NaiveDate>,
    pub to_booking_date: Option<NaiveDate>,
    pub page_size: u32,
}

/// Path of `endpoint` below the API base url.
pub fn resource_path(endpoint: Endpoint, account_id: Option<&str>) -> String {
    let id = account_id.unwrap_or_default();
    match endpoint {
        Endpoint::ListAccounts => "accounts".to_string(),
        Endpoint::AccountDetail => format!("accounts/{id}"),
        Endpoint::Balances => format!("accounts/{id}/balances"),
        Endpoint::OverdraftLimits => format!("accounts/{id}/overdraft-limits"),
        Endpoint::Transactions => format!("accounts/{id}/transactions"),
    }
}

impl LinkContext<'_> {
    fn resource_url(&self) -> Result<Url, PaginationError> {
        let raw = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            resource_path(self.endpoint, self.account_id)
        );
        Url::parse(&raw).map_err(|err| PaginationError::InvalidBaseUrl(err.to_string()))
    }

    /// Link to the resource itself, without paging parameters.
    pub fn resource_link(&self) -> Result<String, PaginationError> {
        Ok(self.resource_url()?.to_string())
    }

    fn page_url(&self, base: &Url, page: u32, key: Option<&str>) -> String {
        let mut url = base.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("page", &page.to_string());
            query.append_pair("page-size", &self.page_size.to_string());
            if let Some(account_type) = self.account_type {
                query.append_pair("accountType", account_type);
            }
            if let Some(from) = self.from_booking_date {
                query.append_pair("fromBookingDate", &from.to_string());
            }
            if let Some(to) = self.to_booking_date {
                query.append_pair("toBookingDate", &to.to_string());
            }
            if let Some(key) = key {
                query.append_pair("pagination-key", key);
            }
        }
        url.to_string()
    }
}

/// Builds the navigation links for `page` of `total_pages`.
///
/// `first`/`prev` are omitted on page 1. `next`/`last` are omitted on the last
/// page or when there are no pages, and are the only links carrying `issued_key`.
pub fn build_links(
    context: &LinkContext<'_>,
    page: u32,
    total_pages: u32,
    issued_key: Option<&str>,
) -> Result<PageLinks, PaginationError> {
    let base = context.resource_url()?;
    let mut links = PageLinks {
        self_link: context.page_url(&base, page, None),
        ..PageLinks::default()
    };
    if page > 1 {
        links.first = Some(context.page_url(&base, 1, None));
        links.prev = Some(context.page_url(&base, page - 1, None));
    }
    if total_pages > 0 && page < total_pages {
        links.next = Some(context.page_url(&base, page + 1, issued_key));
        links.last = Some(context.page_url(&base, total_pages, issued_key));
    }
    Ok(links)
}
