use crate::chain::ChainNode;
use crate::error::SessionError;
use dashmap::DashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};

fn lease_registry() -> &'static DashMap<String, Arc<Mutex<()>>> {
    static LEASES: OnceLock<DashMap<String, Arc<Mutex<()>>>> = OnceLock::new();
    LEASES.get_or_init(DashMap::new)
}

/// Exclusive use of a node's timeline (mempool, block clock) for the lifetime of the value.
///
/// Every scenario component reaches the node through a session, so two runs against the
/// same endpoint in one process are serialised instead of racing on time control.
pub struct NodeSession {
    node: Arc<dyn ChainNode>,
    endpoint: String,
    acquired_at: Instant,
    lease: Option<OwnedMutexGuard<()>>,
}

impl NodeSession {
    pub async fn acquire(node: Arc<dyn ChainNode>, wait: Duration) -> Result<Self, SessionError> {
        let endpoint = node.endpoint().to_string();
        let lock = Arc::clone(
            lease_registry()
                .entry(endpoint.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );

        let started = Instant::now();
        let lease = match Arc::clone(&lock).try_lock_owned() {
            Ok(lease) => lease,
            Err(_) => {
                tracing::info!("[SESSION] {endpoint} is leased; waiting up to {wait:?}");
                tokio::time::timeout(wait, lock.lock_owned())
                    .await
                    .map_err(|_| SessionError::Busy {
                        endpoint: endpoint.clone(),
                        waited_ms: started.elapsed().as_millis() as u64,
                    })?
            }
        };
        tracing::debug!("[SESSION] acquired {endpoint}");
        Ok(Self {
            node,
            endpoint,
            acquired_at: Instant::now(),
            lease: Some(lease),
        })
    }

    pub fn node(&self) -> &dyn ChainNode {
        self.node.as_ref()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl Drop for NodeSession {
    fn drop(&mut self) {
        drop(self.lease.take());
        // Waiters hold a clone of the lock; only forget the endpoint once nobody does.
        lease_registry().remove_if(&self.endpoint, |_, lock| Arc::strong_count(lock) == 1);
        tracing::debug!(
            "[SESSION] released {} after {}ms",
            self.endpoint,
            self.held_for().as_millis()
        );
    }
}
