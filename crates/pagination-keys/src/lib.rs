//! Continuation keys for paged listings and the navigation links that carry them.

pub mod errors;
pub mod key;
pub mod links;

pub use errors::PaginationError;
pub use key::{KeyBinding, KeyClaims, PaginationKeyManager};
pub use links::{build_links, resource_path, LinkContext, PageLinks};
