use anyhow::anyhow;
use plinko_types::{
    Account, AccountId, BetId, BetRecord, Key, OpenBet, PaymentMethod, PaymentMethodId,
    TransactionId, Value, WalletTransaction,
};
use std::future::Future;
use tracing::{debug, warn};

use super::Error;
use crate::state::{CommitError, Staged, State, Status};

/// Attempts made before a conflict is surfaced to the caller.
pub const MAX_ATTEMPTS: usize = 8;

/// A read-compute-write step run against a fresh [`Staged`] view on every attempt.
///
/// `apply` must derive everything it writes from what it reads through `staged`, so that a retry
/// after a conflict recomputes against the freshly committed state.
pub trait Mutation<S: State>: Sync {
    type Output: Send;

    fn apply(
        &self,
        staged: &mut Staged<'_, S>,
    ) -> impl Future<Output = Result<Self::Output, Error>> + Send;
}

/// Output of a committed mutation and the writes it made.
#[derive(Debug)]
pub struct Committed<T> {
    pub output: T,
    pub changes: Vec<(Key, Status)>,
}

/// Run `mutation` until it commits without conflict.
pub async fn run_atomic<S: State, M: Mutation<S>>(
    state: &S,
    mutation: &M,
) -> Result<Committed<M::Output>, Error> {
    for attempt in 1..=MAX_ATTEMPTS {
        let mut staged = Staged::new(state);
        let output = mutation.apply(&mut staged).await?;
        let batch = staged.into_batch();
        if batch.is_empty() && batch.reads().is_empty() {
            return Ok(Committed {
                output,
                changes: Vec::new(),
            });
        }
        let changes: Vec<(Key, Status)> = batch
            .writes()
            .iter()
            .map(|(key, status)| (key.clone(), status.clone()))
            .collect();
        match state.commit(batch).await {
            Ok(()) => {
                debug!(attempt, writes = changes.len(), "batch committed");
                return Ok(Committed { output, changes });
            }
            Err(CommitError::Conflict(key)) => {
                warn!(attempt, ?key, "batch conflicted, retrying against fresh state");
            }
            Err(CommitError::Storage(err)) => return Err(Error::Storage(err)),
        }
    }
    Err(Error::Conflict {
        attempts: MAX_ATTEMPTS,
    })
}

pub(crate) fn unexpected(key: &Key, value: &Value) -> Error {
    Error::Storage(anyhow!("unexpected value {value:?} stored under {key:?}"))
}

pub(crate) async fn load_account<S: State>(
    staged: &mut Staged<'_, S>,
    id: &AccountId,
) -> Result<Option<Account>, Error> {
    let key = Key::Account(id.clone());
    match staged.get(&key).await? {
        None => Ok(None),
        Some(Value::Account(account)) => Ok(Some(account)),
        Some(other) => Err(unexpected(&key, &other)),
    }
}

/// Stage `account` under its next revision and return what was staged.
pub(crate) fn store_account<S: State>(staged: &mut Staged<'_, S>, mut account: Account) -> Account {
    account.revision += 1;
    staged.insert(
        Key::Account(account.id.clone()),
        Value::Account(account.clone()),
    );
    account
}

pub(crate) async fn load_transaction<S: State>(
    staged: &mut Staged<'_, S>,
    id: TransactionId,
) -> Result<Option<WalletTransaction>, Error> {
    let key = Key::Transaction(id);
    match staged.get(&key).await? {
        None => Ok(None),
        Some(Value::Transaction(tx)) => Ok(Some(tx)),
        Some(other) => Err(unexpected(&key, &other)),
    }
}

pub(crate) fn store_transaction<S: State>(staged: &mut Staged<'_, S>, tx: WalletTransaction) {
    staged.insert(Key::Transaction(tx.id), Value::Transaction(tx));
}

pub(crate) async fn load_bet<S: State>(
    staged: &mut Staged<'_, S>,
    id: BetId,
) -> Result<Option<OpenBet>, Error> {
    let key = Key::Bet(id);
    match staged.get(&key).await? {
        None => Ok(None),
        Some(Value::Bet(bet)) => Ok(Some(bet)),
        Some(other) => Err(unexpected(&key, &other)),
    }
}

pub(crate) async fn load_history<S: State>(
    staged: &mut Staged<'_, S>,
    id: &AccountId,
) -> Result<Vec<BetRecord>, Error> {
    let key = Key::History(id.clone());
    match staged.get(&key).await? {
        None => Ok(Vec::new()),
        Some(Value::History(records)) => Ok(records),
        Some(other) => Err(unexpected(&key, &other)),
    }
}

pub(crate) async fn load_payment_method<S: State>(
    staged: &mut Staged<'_, S>,
    id: PaymentMethodId,
) -> Result<Option<PaymentMethod>, Error> {
    let key = Key::PaymentMethod(id);
    match staged.get(&key).await? {
        None => Ok(None),
        Some(Value::PaymentMethod(method)) => Ok(Some(method)),
        Some(other) => Err(unexpected(&key, &other)),
    }
}

pub(crate) async fn payment_methods<S: State>(
    staged: &mut Staged<'_, S>,
) -> Result<Vec<PaymentMethod>, Error> {
    let mut methods = Vec::new();
    for (key, value) in staged.scan(plinko_types::KeyKind::PaymentMethod).await? {
        match value {
            Value::PaymentMethod(method) => methods.push(method),
            other => return Err(unexpected(&key, &other)),
        }
    }
    Ok(methods)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mocks::FlakyState, state::Memory};
    use plinko_types::SequenceKind;

    /// Read-modify-write of a single counter record.
    struct Bump;

    impl<S: State> Mutation<S> for Bump {
        type Output = u64;

        async fn apply(&self, staged: &mut Staged<'_, S>) -> Result<u64, Error> {
            let key = Key::Sequence(SequenceKind::Bet);
            let next = match staged.get(&key).await? {
                None => 1,
                Some(Value::Sequence(next)) => next,
                Some(other) => return Err(unexpected(&key, &other)),
            };
            staged.insert(key, Value::Sequence(next + 1));
            Ok(next)
        }
    }

    #[tokio::test]
    async fn retries_until_commit() {
        let state = FlakyState::new(Memory::new(), 3);
        let committed = run_atomic(&state, &Bump).await.unwrap();
        assert_eq!(committed.output, 1);
        assert_eq!(state.conflicts_injected(), 3);
        assert_eq!(committed.changes.len(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let state = FlakyState::new(Memory::new(), MAX_ATTEMPTS);
        let err = run_atomic(&state, &Bump).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { attempts } if attempts == MAX_ATTEMPTS));
        assert!(err.is_retryable());
        assert!(state.inner().get(&Key::Sequence(SequenceKind::Bet)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commits_build_on_each_other() {
        let state = Memory::new();
        for expected in 1..=3 {
            let committed = run_atomic(&state, &Bump).await.unwrap();
            assert_eq!(committed.output, expected);
        }
    }
}
