//! Push-based change feed.
//!
//! Events are published only after a batch commits. Subscribers pick either every event or the
//! events touching one account.

use futures::Stream;
use plinko_types::{
    Account, AccountId, BetRecord, Key, PaymentMethod, PaymentMethodId, TransactionId, Value,
    WalletTransaction,
};
use serde::Serialize;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};
use tokio::sync::broadcast;
use tracing::warn;

use crate::state::Status;

const DEFAULT_CAPACITY: usize = 1_024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChangeEvent {
    Account(Account),
    Transaction(WalletTransaction),
    #[serde(rename_all = "camelCase")]
    TransactionRemoved {
        id: TransactionId,
        account_id: AccountId,
    },
    #[serde(rename_all = "camelCase")]
    BetSettled {
        account_id: AccountId,
        record: BetRecord,
    },
    PaymentMethod(PaymentMethod),
    PaymentMethodRemoved {
        id: PaymentMethodId,
    },
}

impl ChangeEvent {
    /// Account this event belongs to, if any.
    pub fn account(&self) -> Option<&AccountId> {
        match self {
            ChangeEvent::Account(account) => Some(&account.id),
            ChangeEvent::Transaction(tx) => Some(&tx.account_id),
            ChangeEvent::TransactionRemoved { account_id, .. } => Some(account_id),
            ChangeEvent::BetSettled { account_id, .. } => Some(account_id),
            ChangeEvent::PaymentMethod(_) | ChangeEvent::PaymentMethodRemoved { .. } => None,
        }
    }

    /// Event describing a committed write, if it is externally visible.
    ///
    /// Transaction deletions carry no account in their key; callers publish those explicitly.
    pub fn from_change(key: &Key, status: &Status) -> Option<Self> {
        match (key, status) {
            (Key::Account(_), Status::Update(Value::Account(account))) => {
                Some(ChangeEvent::Account(account.clone()))
            }
            (Key::Transaction(_), Status::Update(Value::Transaction(tx))) => {
                Some(ChangeEvent::Transaction(tx.clone()))
            }
            (Key::History(account_id), Status::Update(Value::History(records))) => {
                records.first().map(|record| ChangeEvent::BetSettled {
                    account_id: account_id.clone(),
                    record: record.clone(),
                })
            }
            (Key::PaymentMethod(_), Status::Update(Value::PaymentMethod(method))) => {
                Some(ChangeEvent::PaymentMethod(method.clone()))
            }
            (Key::PaymentMethod(id), Status::Delete) => {
                Some(ChangeEvent::PaymentMethodRemoved { id: *id })
            }
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum UpdatesFilter {
    All,
    Account(AccountId),
}

impl UpdatesFilter {
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        match self {
            UpdatesFilter::All => true,
            UpdatesFilter::Account(account) => event.account() == Some(account),
        }
    }
}

#[derive(Default)]
struct SubscriptionTracker {
    all_count: usize,
    accounts: HashMap<AccountId, usize>,
}

impl SubscriptionTracker {
    fn register(&mut self, filter: &UpdatesFilter) {
        match filter {
            UpdatesFilter::All => {
                self.all_count = self.all_count.saturating_add(1);
            }
            UpdatesFilter::Account(account) => {
                *self.accounts.entry(account.clone()).or_insert(0) += 1;
            }
        }
    }

    fn unregister(&mut self, filter: &UpdatesFilter) {
        match filter {
            UpdatesFilter::All => {
                self.all_count = self.all_count.saturating_sub(1);
            }
            UpdatesFilter::Account(account) => {
                if let Some(count) = self.accounts.get_mut(account) {
                    if *count > 1 {
                        *count -= 1;
                    } else {
                        self.accounts.remove(account);
                    }
                }
            }
        }
    }

    /// Whether anyone would receive `event`.
    fn wants(&self, event: &ChangeEvent) -> bool {
        self.all_count > 0
            || event
                .account()
                .is_some_and(|account| self.accounts.contains_key(account))
    }
}

fn lock_tracker(tracker: &Mutex<SubscriptionTracker>) -> MutexGuard<'_, SubscriptionTracker> {
    match tracker.lock() {
        Ok(tracker) => tracker,
        Err(poisoned) => {
            warn!("subscription tracker lock poisoned; recovering");
            poisoned.into_inner()
        }
    }
}

struct SubscriptionGuard {
    tracker: Arc<Mutex<SubscriptionTracker>>,
    filter: UpdatesFilter,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        lock_tracker(&self.tracker).unregister(&self.filter);
    }
}

/// Broadcast hub for committed changes.
#[derive(Clone)]
pub struct Feed {
    sender: broadcast::Sender<Arc<ChangeEvent>>,
    subscriptions: Arc<Mutex<SubscriptionTracker>>,
}

impl Default for Feed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Feed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            subscriptions: Arc::default(),
        }
    }

    pub fn subscribe(&self, filter: UpdatesFilter) -> Subscription {
        // Create the receiver before registering so nothing published in between is missed.
        let receiver = self.sender.subscribe();
        lock_tracker(&self.subscriptions).register(&filter);
        Subscription {
            receiver,
            filter: filter.clone(),
            _guard: SubscriptionGuard {
                tracker: Arc::clone(&self.subscriptions),
                filter,
            },
        }
    }

    /// Publish events; returns how many were delivered to at least one interested subscriber.
    pub fn publish(&self, events: impl IntoIterator<Item = ChangeEvent>) -> usize {
        let mut delivered = 0;
        for event in events {
            if !lock_tracker(&self.subscriptions).wants(&event) {
                continue;
            }
            if self.sender.send(Arc::new(event)).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A filtered view of the feed.
pub struct Subscription {
    receiver: broadcast::Receiver<Arc<ChangeEvent>>,
    filter: UpdatesFilter,
    _guard: SubscriptionGuard,
}

impl Subscription {
    pub fn filter(&self) -> &UpdatesFilter {
        &self.filter
    }

    /// Next matching event, or `None` once the feed is gone.
    pub async fn recv(&mut self) -> Option<Arc<ChangeEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagged behind the change feed");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<ChangeEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagged behind the change feed");
                }
                Err(_) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Arc<ChangeEvent>> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|event| (event, subscription))
        })
    }
}
