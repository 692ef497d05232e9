//! Account access orchestration: rate limiting, consent validation, pagination
//! continuation, monthly quotas, the data source call and the audit record, in
//! that order, for every account read endpoint.

pub mod errors;
pub mod model;
pub mod orchestrator;
pub mod source;

pub use errors::{AccessError, ErrorBody};
pub use model::{
    page_totals, AccessPayload, AccessRequest, AccessResult, AccountBalances, AccountRecord,
    AccountTransaction, Amount, BookingWindow, ClientContext, OverdraftLimits, PageMeta,
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
pub use orchestrator::{AccessOrchestrator, OrchestratorDeps};
pub use source::{AccountDataSource, AccountFixture, FetchError, InMemoryAccountSource};
