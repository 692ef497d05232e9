use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::errors::PolicyError;
use crate::loader::{load_snapshot_with_options, LoadOptions};
use crate::model::{PolicySnapshot, PolicySource, RuntimeOverrideSpec};
use crate::override_store::RuntimeOverrideStore;
use crate::paths::assign;

/// Source of the live policy snapshot shared by every guard in the gateway.
#[async_trait]
pub trait PolicyCenter: Send + Sync {
    async fn snapshot(&self) -> Arc<PolicySnapshot>;
    /// Re-reads the configured layers and reapplies live runtime overrides.
    async fn reload(&self) -> Result<(), PolicyError>;
    async fn apply_override(&self, override_spec: RuntimeOverrideSpec) -> Result<(), PolicyError>;
    fn subscribe(&self) -> watch::Receiver<Arc<PolicySnapshot>>;
}

/// Layered snapshot plus the runtime overrides stacked on top of it.
struct Layers {
    loaded: PolicySnapshot,
    current: Arc<PolicySnapshot>,
    overrides: RuntimeOverrideStore,
    last_rev: u64,
}

impl Layers {
    fn new(loaded: PolicySnapshot) -> Self {
        Self {
            last_rev: loaded.rev,
            current: Arc::new(loaded.clone()),
            loaded,
            overrides: RuntimeOverrideStore::default(),
        }
    }

    /// Recomputes `current` from `loaded` and bumps the revision.
    fn rebuild(&mut self) -> Result<Arc<PolicySnapshot>, PolicyError> {
        let mut next = self.loaded.clone();
        for (path, value) in self.overrides.active_entries() {
            assign(&mut next, &path, &value, PolicySource::RuntimeOverride)?;
        }
        self.last_rev += 1;
        next.rev = self.last_rev;
        self.current = Arc::new(next);
        Ok(Arc::clone(&self.current))
    }
}

/// Process-local policy center backed by a `watch` channel.
pub struct InMemoryPolicyCenter {
    layers: Arc<Mutex<Layers>>,
    updates: watch::Sender<Arc<PolicySnapshot>>,
    load_options: Option<LoadOptions>,
}

impl InMemoryPolicyCenter {
    pub fn new(snapshot: PolicySnapshot) -> Self {
        let layers = Layers::new(snapshot);
        let (updates, _) = watch::channel(Arc::clone(&layers.current));
        Self {
            layers: Arc::new(Mutex::new(layers)),
            updates,
            load_options: None,
        }
    }

    /// Loads the initial snapshot with `options` and remembers them for `reload`.
    pub fn from_options(options: LoadOptions) -> Result<Self, PolicyError> {
        let snapshot = load_snapshot_with_options(&options)?;
        Ok(Self {
            load_options: Some(options),
            ..Self::new(snapshot)
        })
    }

    fn publish(updates: &watch::Sender<Arc<PolicySnapshot>>, snapshot: Arc<PolicySnapshot>) {
        let rev = snapshot.rev;
        if updates.send(snapshot).is_err() {
            debug!(rev, "policy update has no subscribers");
        }
    }

    fn schedule_expiry(&self, path: String, generation: u64, ttl: Duration) {
        let layers = Arc::clone(&self.layers);
        let updates = self.updates.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let mut layers = layers.lock().await;
            if !layers.overrides.expire(&path, generation) {
                debug!(%path, generation, "runtime override replaced before expiry");
                return;
            }
            match layers.rebuild() {
                Ok(snapshot) => {
                    drop(layers);
                    info!(%path, "runtime policy override expired");
                    Self::publish(&updates, snapshot);
                }
                Err(err) => warn!(%path, %err, "failed to rebuild policy after override expiry"),
            }
        });
    }
}

#[async_trait]
impl PolicyCenter for InMemoryPolicyCenter {
    async fn snapshot(&self) -> Arc<PolicySnapshot> {
        Arc::clone(&self.layers.lock().await.current)
    }

    async fn reload(&self) -> Result<(), PolicyError> {
        let options = self.load_options.as_ref().ok_or_else(|| {
            PolicyError::NotImplemented("reload needs the options the center was built from".into())
        })?;
        let loaded = load_snapshot_with_options(options)?;
        let snapshot = {
            let mut layers = self.layers.lock().await;
            layers.loaded = loaded;
            layers.rebuild()?
        };
        info!(rev = snapshot.rev, "policy reloaded");
        Self::publish(&self.updates, snapshot);
        Ok(())
    }

    async fn apply_override(&self, override_spec: RuntimeOverrideSpec) -> Result<(), PolicyError> {
        let ttl = (override_spec.ttl_seconds > 0)
            .then(|| Duration::from_secs(override_spec.ttl_seconds));
        let (snapshot, generation) = {
            let mut layers = self.layers.lock().await;
            // Validate against a scratch copy so a bad value never reaches the store.
            let mut scratch = PolicySnapshot::clone(&layers.current);
            assign(
                &mut scratch,
                &override_spec.path,
                &override_spec.value,
                PolicySource::RuntimeOverride,
            )?;
            if let Some((owner, reason)) = layers.overrides.owner_of(&override_spec.path) {
                info!(
                    path = %override_spec.path,
                    previous_owner = owner,
                    previous_reason = reason,
                    "replacing runtime policy override"
                );
            }
            let generation = layers.overrides.insert(&override_spec, ttl);
            (layers.rebuild()?, generation)
        };
        info!(
            path = %override_spec.path,
            owner = %override_spec.owner,
            rev = snapshot.rev,
            "runtime policy override applied"
        );
        Self::publish(&self.updates, snapshot);

        if let Some(ttl) = ttl {
            self.schedule_expiry(override_spec.path, generation, ttl);
        }
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Arc<PolicySnapshot>> {
        self.updates.subscribe()
    }
}
