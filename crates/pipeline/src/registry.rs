use std::collections::HashMap;
use std::sync::Arc;

use coverclip_core::session::Session;
use coverclip_core::types::SessionKey;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

/// One session plus the cancellation token of its current round.
#[derive(Debug, Default)]
pub struct SessionSlot {
    pub session: Session,
    pub cancel: CancellationToken,
    /// Set once the slot has been pruned from the map. A holder of a
    /// retired slot must look the key up again.
    retired: bool,
}

impl SessionSlot {
    pub fn is_retired(&self) -> bool {
        self.retired
    }
}

pub type SharedSlot = Arc<Mutex<SessionSlot>>;

/// Live sessions, keyed by requester.
///
/// The outer lock only guards the map. Each slot has its own lock, so
/// slow work on one session (allocating or checking its workspace) never
/// blocks another. Idle sessions are pruned, so the map only holds
/// requesters with a mode, a workspace or a round in flight.
#[derive(Default)]
pub struct SessionRegistry {
    slots: Mutex<HashMap<SessionKey, SharedSlot>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot for `key`, created idle on first use.
    pub async fn slot(&self, key: SessionKey) -> SharedSlot {
        Arc::clone(self.slots.lock().await.entry(key).or_default())
    }

    /// Lock the live slot for `key`, creating it idle on first use.
    pub async fn lock(&self, key: SessionKey) -> OwnedMutexGuard<SessionSlot> {
        loop {
            let guard = self.slot(key).await.lock_owned().await;
            if !guard.retired {
                return guard;
            }
        }
    }

    /// Lock the live slot for `key` without creating one.
    pub async fn lock_existing(&self, key: SessionKey) -> Option<OwnedMutexGuard<SessionSlot>> {
        loop {
            let guard = self.get(key).await?.lock_owned().await;
            if !guard.retired {
                return Some(guard);
            }
        }
    }

    /// Drop `key` if its session is idle with nothing left to clean up.
    ///
    /// Never waits on the slot: one locked elsewhere is left in place and
    /// pruned by whoever releases it.
    pub async fn prune(&self, key: SessionKey) -> bool {
        let mut slots = self.slots.lock().await;
        let Some(slot) = slots.get(&key).cloned() else {
            return false;
        };
        let Ok(mut guard) = slot.try_lock() else {
            return false;
        };
        if !guard.session.is_idle() {
            return false;
        }
        guard.retired = true;
        drop(guard);
        slots.remove(&key);
        true
    }

    /// The slot for `key`, if the session is live.
    pub async fn get(&self, key: SessionKey) -> Option<SharedSlot> {
        self.slots.lock().await.get(&key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }

    /// Remove and return every slot. Used during shutdown.
    pub async fn drain(&self) -> Vec<(SessionKey, SharedSlot)> {
        self.slots.lock().await.drain().collect()
    }
}
