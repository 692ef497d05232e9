use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::catalog::{Permission, PermissionCatalog, PermissionCode, ProductGroup};

/// Hint for the caller's status mapping.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusHint {
    AllAccepted,
    PartiallyFiltered,
    Rejected,
}

impl StatusHint {
    /// HTTP analog used by the consent creation flow.
    pub fn http_status(&self) -> u16 {
        match self {
            StatusHint::AllAccepted | StatusHint::PartiallyFiltered => 201,
            StatusHint::Rejected => 422,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterResult {
    pub filtered: Vec<String>,
    /// Recognised codes that were requested but did not survive filtering.
    pub removed: Vec<String>,
    /// Codes the catalog does not know; dropped without failing.
    pub unrecognized: Vec<String>,
    /// Grouped siblings granted because their bundle is supported.
    pub expanded: Vec<String>,
    pub status_hint: StatusHint,
}

impl FilterResult {
    pub fn contains(&self, code: PermissionCode) -> bool {
        self.filtered.iter().any(|c| c == code.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("no valid permissions requested")]
    NoValidPermissions {
        removed: Vec<String>,
        unrecognized: Vec<String>,
    },
    #[error("no functional permissions remain after filtering")]
    NoFunctionalPermissions {
        filtered: Vec<String>,
        removed: Vec<String>,
    },
}

impl FilterError {
    pub fn status_hint(&self) -> StatusHint {
        StatusHint::Rejected
    }

    pub fn removed(&self) -> &[String] {
        match self {
            FilterError::NoValidPermissions { removed, .. }
            | FilterError::NoFunctionalPermissions { removed, .. } => removed,
        }
    }
}

/// Applies the grouped-vs-individual support rules to a requested permission list.
#[derive(Clone, Debug)]
pub struct PermissionFilter {
    catalog: Arc<PermissionCatalog>,
}

impl Default for PermissionFilter {
    fn default() -> Self {
        Self::new(PermissionCatalog::builtin())
    }
}

impl PermissionFilter {
    pub fn new(catalog: Arc<PermissionCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<PermissionCatalog> {
        &self.catalog
    }

    pub fn filter<S: AsRef<str>>(&self, requested: &[S]) -> Result<FilterResult, FilterError> {
        let mut valid: BTreeMap<PermissionCode, Permission> = BTreeMap::new();
        let mut unrecognized = BTreeSet::new();
        for raw in requested {
            let raw = raw.as_ref().trim();
            match self.catalog.lookup(raw) {
                Ok(permission) => {
                    valid.insert(permission.code, permission);
                }
                Err(_) => {
                    unrecognized.insert(raw.to_string());
                }
            }
        }
        let unrecognized: Vec<String> = unrecognized.into_iter().collect();

        if valid.is_empty() {
            return Err(FilterError::NoValidPermissions {
                removed: Vec::new(),
                unrecognized,
            });
        }

        let mut by_group: BTreeMap<ProductGroup, Vec<Permission>> = BTreeMap::new();
        for permission in valid.values() {
            by_group.entry(permission.group).or_default().push(*permission);
        }

        let mut kept: BTreeMap<PermissionCode, Permission> = BTreeMap::new();
        for (group, members) in &by_group {
            if group.is_grouped() {
                let bundle = self.catalog.by_product_group(*group);
                if bundle.iter().any(|p| p.supported) {
                    kept.extend(bundle.into_iter().map(|p| (p.code, p)));
                } else {
                    debug!(
                        target: "permissions-broker",
                        group = ?group,
                        "dropping unsupported product bundle"
                    );
                }
            } else {
                kept.extend(
                    members
                        .iter()
                        .filter(|p| p.supported)
                        .map(|p| (p.code, *p)),
                );
            }
        }

        let removed: Vec<String> = valid
            .keys()
            .filter(|code| !kept.contains_key(code))
            .map(|code| code.as_str().to_string())
            .collect();
        let filtered: Vec<String> = kept.keys().map(|c| c.as_str().to_string()).collect();

        if kept.is_empty() {
            return Err(FilterError::NoValidPermissions {
                removed,
                unrecognized,
            });
        }
        if !kept.values().any(Permission::is_functional) {
            return Err(FilterError::NoFunctionalPermissions { filtered, removed });
        }

        let expanded: Vec<String> = kept
            .keys()
            .filter(|code| !valid.contains_key(code))
            .map(|code| code.as_str().to_string())
            .collect();
        let status_hint = if removed.is_empty() && unrecognized.is_empty() {
            StatusHint::AllAccepted
        } else {
            StatusHint::PartiallyFiltered
        };

        Ok(FilterResult {
            filtered,
            removed,
            unrecognized,
            expanded,
            status_hint,
        })
    }
}
