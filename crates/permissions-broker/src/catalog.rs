//! Static registry of the permission codes recognised by the gateway.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CatalogOverrides;

/// Functional grouping used for reporting.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Resources,
    Registration,
    Accounts,
    CreditCards,
    CreditOperations,
    Investments,
    Exchanges,
}

/// Product bundle a permission belongs to.
///
/// Every group other than `Individual` is granted or denied as a unit.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductGroup {
    Individual,
    CreditOperationsGroup,
    InvestmentsGroup,
    ExchangesGroup,
}

impl ProductGroup {
    pub fn is_grouped(&self) -> bool {
        !matches!(self, ProductGroup::Individual)
    }
}

macro_rules! permission_table {
    ($( $variant:ident => ($code:literal, $category:ident, $group:ident, $supported:literal) ),+ $(,)?) => {
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum PermissionCode {
            $( $variant, )+
        }

        impl PermissionCode {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( PermissionCode::$variant => $code, )+
                }
            }
        }

        impl FromStr for PermissionCode {
            type Err = CatalogError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $code => Ok(PermissionCode::$variant), )+
                    other => Err(CatalogError::NotFound(other.to_string())),
                }
            }
        }

        const BUILTIN: &[Permission] = &[
            $( Permission {
                code: PermissionCode::$variant,
                category: Category::$category,
                group: ProductGroup::$group,
                supported: $supported,
            }, )+
        ];
    };
}

permission_table! {
    ResourcesRead => ("RESOURCES_READ", Resources, Individual, true),

    CustomersPersonalIdentificationsRead => ("CUSTOMERS_PERSONAL_IDENTIFICATIONS_READ", Registration, Individual, true),
    CustomersPersonalAdittionalinfoRead => ("CUSTOMERS_PERSONAL_ADITTIONALINFO_READ", Registration, Individual, true),
    CustomersBusinessIdentificationsRead => ("CUSTOMERS_BUSINESS_IDENTIFICATIONS_READ", Registration, Individual, false),
    CustomersBusinessAdittionalinfoRead => ("CUSTOMERS_BUSINESS_ADITTIONALINFO_READ", Registration, Individual, false),

    AccountsRead => ("ACCOUNTS_READ", Accounts, Individual, true),
    AccountsBalancesRead => ("ACCOUNTS_BALANCES_READ", Accounts, Individual, true),
    AccountsTransactionsRead => ("ACCOUNTS_TRANSACTIONS_READ", Accounts, Individual, true),
    AccountsOverdraftLimitsRead => ("ACCOUNTS_OVERDRAFT_LIMITS_READ", Accounts, Individual, true),

    CreditCardsAccountsRead => ("CREDIT_CARDS_ACCOUNTS_READ", CreditCards, Individual, false),
    CreditCardsAccountsBillsRead => ("CREDIT_CARDS_ACCOUNTS_BILLS_READ", CreditCards, Individual, false),
    CreditCardsAccountsBillsTransactionsRead => ("CREDIT_CARDS_ACCOUNTS_BILLS_TRANSACTIONS_READ", CreditCards, Individual, false),
    CreditCardsAccountsLimitsRead => ("CREDIT_CARDS_ACCOUNTS_LIMITS_READ", CreditCards, Individual, false),
    CreditCardsAccountsTransactionsRead => ("CREDIT_CARDS_ACCOUNTS_TRANSACTIONS_READ", CreditCards, Individual, false),

    LoansRead => ("LOANS_READ", CreditOperations, CreditOperationsGroup, true),
    LoansWarrantiesRead => ("LOANS_WARRANTIES_READ", CreditOperations, CreditOperationsGroup, true),
    LoansScheduledInstalmentsRead => ("LOANS_SCHEDULED_INSTALMENTS_READ", CreditOperations, CreditOperationsGroup, true),
    LoansPaymentsRead => ("LOANS_PAYMENTS_READ", CreditOperations, CreditOperationsGroup, true),
    FinancingsRead => ("FINANCINGS_READ", CreditOperations, CreditOperationsGroup, false),
    FinancingsWarrantiesRead => ("FINANCINGS_WARRANTIES_READ", CreditOperations, CreditOperationsGroup, false),
    FinancingsScheduledInstalmentsRead => ("FINANCINGS_SCHEDULED_INSTALMENTS_READ", CreditOperations, CreditOperationsGroup, false),
    FinancingsPaymentsRead => ("FINANCINGS_PAYMENTS_READ", CreditOperations, CreditOperationsGroup, false),
    UnarrangedAccountsOverdraftRead => ("UNARRANGED_ACCOUNTS_OVERDRAFT_READ", CreditOperations, CreditOperationsGroup, false),
    InvoiceFinancingsRead => ("INVOICE_FINANCINGS_READ", CreditOperations, CreditOperationsGroup, false),

    InvestmentsRead => ("INVESTMENTS_READ", Investments, InvestmentsGroup, false),
    BankFixedIncomesRead => ("BANK_FIXED_INCOMES_READ", Investments, InvestmentsGroup, true),
    CreditFixedIncomesRead => ("CREDIT_FIXED_INCOMES_READ", Investments, InvestmentsGroup, false),
    FundsRead => ("FUNDS_READ", Investments, InvestmentsGroup, false),
    VariableIncomesRead => ("VARIABLE_INCOMES_READ", Investments, InvestmentsGroup, false),
    TreasureTitlesRead => ("TREASURE_TITLES_READ", Investments, InvestmentsGroup, false),

    ExchangesRead => ("EXCHANGES_READ", Exchanges, ExchangesGroup, false),
}

impl fmt::Display for PermissionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub code: PermissionCode,
    pub category: Category,
    pub group: ProductGroup,
    pub supported: bool,
}

impl Permission {
    /// Resource listings alone do not let a client read anything useful.
    pub fn is_functional(&self) -> bool {
        self.category != Category::Resources
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("permission not found: {0}")]
    NotFound(String),
}

static BUILTIN_CATALOG: Lazy<Arc<PermissionCatalog>> =
    Lazy::new(|| Arc::new(PermissionCatalog::from_entries(BUILTIN.iter().copied())));

/// Immutable permission registry.
#[derive(Clone, Debug)]
pub struct PermissionCatalog {
    entries: BTreeMap<PermissionCode, Permission>,
}

impl PermissionCatalog {
    /// Shared catalog built from the compiled-in table.
    pub fn builtin() -> Arc<PermissionCatalog> {
        Arc::clone(&BUILTIN_CATALOG)
    }

    /// Builds a catalog whose `supported` flags are replaced by the override file.
    pub fn with_overrides(overrides: &CatalogOverrides) -> Result<Self, CatalogError> {
        let mut catalog = Self::from_entries(BUILTIN.iter().copied());
        for (raw, supported) in &overrides.supported {
            let code = raw.parse::<PermissionCode>()?;
            if let Some(entry) = catalog.entries.get_mut(&code) {
                entry.supported = *supported;
            }
        }
        Ok(catalog)
    }

    fn from_entries(entries: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            entries: entries.into_iter().map(|p| (p.code, p)).collect(),
        }
    }

    pub fn lookup(&self, code: &str) -> Result<Permission, CatalogError> {
        let parsed = code.trim().parse::<PermissionCode>()?;
        self.get(parsed)
            .ok_or_else(|| CatalogError::NotFound(code.to_string()))
    }

    pub fn get(&self, code: PermissionCode) -> Option<Permission> {
        self.entries.get(&code).copied()
    }

    pub fn supported_permissions(&self) -> Vec<Permission> {
        self.entries.values().filter(|p| p.supported).copied().collect()
    }

    pub fn by_category(&self, category: Category) -> Vec<Permission> {
        self.entries
            .values()
            .filter(|p| p.category == category)
            .copied()
            .collect()
    }

    pub fn by_product_group(&self, group: ProductGroup) -> Vec<Permission> {
        self.entries
            .values()
            .filter(|p| p.group == group)
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
