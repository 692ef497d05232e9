//! Permission catalog and consent permission filtering.
//!
//! The catalog is a fixed table of permission codes with their category, product
//! bundle and whether this institution supports them. The filter turns the raw
//! permission list of a consent into the set the gateway will actually honour.

pub mod catalog;
pub mod config;
pub mod filter;

pub use crate::catalog::{
    CatalogError, Category, Permission, PermissionCatalog, PermissionCode, ProductGroup,
};
pub use crate::config::{
    load_overrides_from_path, load_overrides_from_reader, parse_overrides_str, CatalogOverrides,
    ConfigError,
};
pub use crate::filter::{FilterError, FilterResult, PermissionFilter, StatusHint};
