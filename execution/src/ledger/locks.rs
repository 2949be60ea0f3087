use plinko_types::TransactionId;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::warn;

type Slots = HashMap<TransactionId, Arc<AsyncMutex<()>>>;

/// Serializes edits of the same transaction, whoever makes them.
///
/// Edits of different transactions proceed in parallel. Entries are dropped once no edit holds or
/// awaits them.
#[derive(Default)]
pub struct DocumentLocks {
    slots: Mutex<Slots>,
}

impl DocumentLocks {
    fn slots(&self) -> MutexGuard<'_, Slots> {
        match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => {
                warn!("document lock table poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }

    pub async fn lock(&self, id: TransactionId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots();
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            Arc::clone(slots.entry(id).or_default())
        };
        slot.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
