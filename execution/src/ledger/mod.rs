//! Settlement ledger.
//!
//! All balance changes flow through [`Ledger`]. Bets and payouts are immediately final; wallet
//! transactions move through a reversible status machine whose balance effect is recomputed from
//! the status read inside the same atomic batch that writes the new one. Every committed batch is
//! published on the [`Feed`].

mod admin;
mod atomic;
mod error;
mod locks;
mod mutations;

pub use admin::{Admin, LedgerStats};
pub use atomic::{run_atomic, Committed, Mutation, MAX_ATTEMPTS};
use atomic::unexpected;
pub use error::{Error, Missing};
pub use locks::DocumentLocks;
pub use mutations::{transition_delta, Settlement, StatusChange};

use plinko_types::{
    validation::{
        validate_external_ref, validate_method_name, validate_note, validate_phone, validate_stake,
        validate_wallet_amount,
    },
    Account, AccountId, Amount, BetHandle, BetId, BetRecord, BoardConfig, GameMode, Key, KeyKind,
    OutcomeEvent, PaymentMethod, SequenceKind, TransactionId, TransactionKind, ValidationError,
    Value, WalletRequest, WalletTransaction,
};
use std::{collections::BTreeSet, time::Duration};
use tracing::{debug, info, warn};

use crate::{
    clock::{Clock, SystemClock},
    feed::{ChangeEvent, Feed, Subscription, UpdatesFilter},
    state::State,
};
use mutations::{EnsureAccount, PlaceBet, ResetDemo, Settle, SubmitWallet};

const CONTENDED_BACKOFF_MIN: Duration = Duration::from_millis(1);
const CONTENDED_BACKOFF_MAX: Duration = Duration::from_millis(64);

pub struct Ledger<S: State, C: Clock = SystemClock> {
    state: S,
    clock: C,
    feed: Feed,
    locks: DocumentLocks,
    admins: BTreeSet<AccountId>,
}

impl<S: State> Ledger<S> {
    pub fn new(state: S) -> Self {
        Self::with_clock(state, SystemClock)
    }
}

impl<S: State, C: Clock> Ledger<S, C> {
    pub fn with_clock(state: S, clock: C) -> Self {
        Self {
            state,
            clock,
            feed: Feed::default(),
            locks: DocumentLocks::default(),
            admins: BTreeSet::new(),
        }
    }

    /// Accounts allowed to obtain an [`Admin`] handle.
    pub fn with_admins(mut self, admins: impl IntoIterator<Item = AccountId>) -> Self {
        self.admins.extend(admins);
        self
    }

    pub fn with_feed(mut self, feed: Feed) -> Self {
        self.feed = feed;
        self
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn feed(&self) -> &Feed {
        &self.feed
    }

    pub fn subscribe(&self, filter: UpdatesFilter) -> Subscription {
        self.feed.subscribe(filter)
    }

    pub fn is_admin(&self, id: &AccountId) -> bool {
        self.admins.contains(id)
    }

    pub(crate) fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    async fn allocate(&self, kind: SequenceKind) -> Result<u64, Error> {
        Ok(self.state.allocate(kind).await?)
    }

    /// Commit `mutation` and publish what it wrote.
    async fn execute<M: Mutation<S>>(&self, mutation: &M) -> Result<M::Output, Error> {
        let committed = run_atomic(&self.state, mutation).await?;
        self.feed.publish(
            committed
                .changes
                .iter()
                .filter_map(|(key, status)| ChangeEvent::from_change(key, status)),
        );
        Ok(committed.output)
    }

    /// [`Ledger::execute`] for stake and payout writes. A conflict that outlasts
    /// [`MAX_ATTEMPTS`] backs off and starts over instead of surfacing: each one means another
    /// write to the same account committed.
    async fn execute_contended<M: Mutation<S>>(
        &self,
        mutation: &M,
        op: &'static str,
    ) -> Result<M::Output, Error> {
        let mut backoff = CONTENDED_BACKOFF_MIN;
        loop {
            match self.execute(mutation).await {
                Err(Error::Conflict { attempts }) => {
                    warn!(
                        op,
                        attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "contended write, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(CONTENDED_BACKOFF_MAX);
                }
                result => return result,
            }
        }
    }

    /// Fetch an account, creating it with starting balances on first access.
    pub async fn account(&self, id: &AccountId) -> Result<Account, Error> {
        self.execute(&EnsureAccount {
            id: id.clone(),
            now: self.now(),
        })
        .await
    }

    /// Debit `stake` from the `mode` balance and open a bet on `board`.
    pub async fn place_bet(
        &self,
        account_id: &AccountId,
        stake: Amount,
        mode: GameMode,
        board: BoardConfig,
    ) -> Result<BetHandle, Error> {
        validate_stake(stake)?;
        let bet_id = BetId(self.allocate(SequenceKind::Bet).await?);
        let handle = self
            .execute_contended(
                &PlaceBet {
                    bet_id,
                    account_id: account_id.clone(),
                    stake,
                    mode,
                    board,
                    now: self.now(),
                },
                "place_bet",
            )
            .await?;
        debug!(
            account = %account_id,
            bet = %handle.bet_id,
            %stake,
            ?mode,
            balance = %handle.balance_after,
            "bet placed"
        );
        Ok(handle)
    }

    /// Credit the payout of a resolved drop. Settling the same bet twice is a no-op.
    ///
    /// Conflicts never surface: the stake is already debited, so settlement retries until the
    /// payout commits or the outcome is rejected.
    pub async fn settle(&self, event: &OutcomeEvent) -> Result<Settlement, Error> {
        let settlement = self
            .execute_contended(
                &Settle {
                    event: event.clone(),
                    now: self.now(),
                },
                "settle",
            )
            .await?;
        match &settlement {
            Settlement::Applied { record, balance } => debug!(
                account = %event.account_id,
                bet = %event.bet_id,
                bucket = event.bucket,
                multiplier = %record.multiplier,
                payout = %record.payout,
                balance = ?balance.map(|b| b.to_string()),
                "bet settled"
            ),
            Settlement::AlreadySettled => debug!(
                account = %event.account_id,
                bet = %event.bet_id,
                "duplicate outcome ignored"
            ),
        }
        Ok(settlement)
    }

    pub async fn reset_demo_balance(&self, account_id: &AccountId) -> Result<Account, Error> {
        self.execute(&ResetDemo {
            account_id: account_id.clone(),
            now: self.now(),
        })
        .await
    }

    /// Record a self-service deposit or withdrawal request.
    ///
    /// Withdrawals lock the requested funds immediately.
    pub async fn submit_wallet_transaction(
        &self,
        account_id: &AccountId,
        request: WalletRequest,
    ) -> Result<WalletTransaction, Error> {
        validate_wallet_amount(request.amount)?;
        validate_phone(&request.counterparty_phone)?;
        validate_method_name(&request.method)?;
        validate_note(request.note.as_deref())?;
        let external_ref = match (request.kind, request.external_ref.as_deref()) {
            (TransactionKind::Deposit, None) => {
                return Err(ValidationError::MissingExternalRef.into())
            }
            (_, Some(reference)) => Some(validate_external_ref(reference)?),
            (TransactionKind::Withdraw, None) => None,
        };

        let id = TransactionId(self.allocate(SequenceKind::Transaction).await?);
        let tx = self
            .execute(&SubmitWallet {
                id,
                account_id: account_id.clone(),
                kind: request.kind,
                amount: request.amount,
                method: request.method.trim().to_string(),
                counterparty_phone: request.counterparty_phone,
                external_ref,
                note: request.note,
                now: self.now(),
            })
            .await?;
        info!(
            account = %account_id,
            tx = %tx.id,
            kind = tx.kind.as_str(),
            amount = %tx.amount,
            method = %tx.method,
            "wallet transaction submitted"
        );
        Ok(tx)
    }

    /// The account's wallet transactions, newest first.
    pub async fn transactions_for(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<WalletTransaction>, Error> {
        let mut transactions: Vec<_> = self
            .all_transactions()
            .await?
            .into_iter()
            .filter(|tx| &tx.account_id == account_id)
            .collect();
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(transactions)
    }

    /// The account's settled bets, newest first.
    pub async fn bet_history(&self, account_id: &AccountId) -> Result<Vec<BetRecord>, Error> {
        let key = Key::History(account_id.clone());
        match self.state.get(&key).await? {
            None => Ok(Vec::new()),
            Some(record) => match record.value {
                Value::History(records) => Ok(records),
                other => Err(unexpected(&key, &other)),
            },
        }
    }

    pub async fn payment_methods(&self, enabled_only: bool) -> Result<Vec<PaymentMethod>, Error> {
        let mut methods = Vec::new();
        for (key, value) in self.scan(KeyKind::PaymentMethod).await? {
            match value {
                Value::PaymentMethod(method) if method.enabled || !enabled_only => {
                    methods.push(method)
                }
                Value::PaymentMethod(_) => {}
                other => return Err(unexpected(&key, &other)),
            }
        }
        Ok(methods)
    }

    /// Administrator capability for `caller`.
    pub fn admin(&self, caller: &AccountId) -> Result<Admin<'_, S, C>, Error> {
        if !self.is_admin(caller) {
            return Err(Error::Permission("caller is not an administrator"));
        }
        Ok(Admin::new(self, caller.clone()))
    }

    async fn scan(&self, kind: KeyKind) -> Result<Vec<(Key, Value)>, Error> {
        Ok(self
            .state
            .scan(kind)
            .await?
            .into_iter()
            .map(|(key, record)| (key, record.value))
            .collect())
    }

    async fn all_transactions(&self) -> Result<Vec<WalletTransaction>, Error> {
        let mut transactions = Vec::new();
        for (key, value) in self.scan(KeyKind::Transaction).await? {
            match value {
                Value::Transaction(tx) => transactions.push(tx),
                other => return Err(unexpected(&key, &other)),
            }
        }
        Ok(transactions)
    }

    async fn all_accounts(&self) -> Result<Vec<Account>, Error> {
        let mut accounts = Vec::new();
        for (key, value) in self.scan(KeyKind::Account).await? {
            match value {
                Value::Account(account) => accounts.push(account),
                other => return Err(unexpected(&key, &other)),
            }
        }
        Ok(accounts)
    }
}
