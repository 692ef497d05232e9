//! Consent lookup and validation for the account access pipeline.

pub mod model;
pub mod store;
pub mod validator;

pub use model::{required_permissions, Consent, STATUS_AUTHORISED};
pub use store::{ConsentStore, ConsentStoreError, InMemoryConsentStore};
pub use validator::{ConsentValidator, PermissionDelta, ValidationOutcome, ValidationStatus};
