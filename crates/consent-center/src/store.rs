use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gateway_core_types::{ConsentId, GatewayError};
use thiserror::Error;

use crate::model::Consent;

#[derive(Debug, Error, Clone)]
pub enum ConsentStoreError {
    #[error("consent store unavailable: {0}")]
    Unavailable(String),
    #[error("consent not found: {0}")]
    NotFound(ConsentId),
}

impl From<ConsentStoreError> for GatewayError {
    fn from(value: ConsentStoreError) -> Self {
        GatewayError::new(value.to_string())
    }
}

/// Read side of the consent persistence owned by the consent management system.
#[async_trait]
pub trait ConsentStore: Send + Sync {
    async fn find_by_consent_id(&self, id: &ConsentId)
        -> Result<Option<Consent>, ConsentStoreError>;

    async fn update_last_access(
        &self,
        id: &ConsentId,
        at: DateTime<Utc>,
    ) -> Result<(), ConsentStoreError>;
}

/// Consent store backed by a concurrent map.
#[derive(Default)]
pub struct InMemoryConsentStore {
    consents: DashMap<ConsentId, Consent>,
}

impl InMemoryConsentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, consent: Consent) {
        self.consents.insert(consent.consent_id.clone(), consent);
    }

    pub fn get(&self, id: &ConsentId) -> Option<Consent> {
        self.consents.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.consents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consents.is_empty()
    }
}

impl FromIterator<Consent> for InMemoryConsentStore {
    fn from_iter<T: IntoIterator<Item = Consent>>(iter: T) -> Self {
        let store = Self::new();
        for consent in iter {
            store.insert(consent);
        }
        store
    }
}

#[async_trait]
impl ConsentStore for InMemoryConsentStore {
    async fn find_by_consent_id(
        &self,
        id: &ConsentId,
    ) -> Result<Option<Consent>, ConsentStoreError> {
        Ok(self.get(id))
    }

    async fn update_last_access(
        &self,
        id: &ConsentId,
        at: DateTime<Utc>,
    ) -> Result<(), ConsentStoreError> {
        match self.consents.get_mut(id) {
            Some(mut entry) => {
                entry.last_access = Some(at);
                Ok(())
            }
            None => Err(ConsentStoreError::NotFound(id.clone())),
        }
    }
}
