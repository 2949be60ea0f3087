//! Atomic ledger operations.
//!
//! Each mutation reads the records it depends on through [`Staged`] and writes its result into the
//! same batch, so a concurrent change to anything it read forces a recompute.

use plinko_types::{
    Account, AccountId, AdjustDirection, Amount, Balance, BetHandle, BetId, BetRecord,
    BoardConfig, GameMode, Key, OpenBet, OutcomeEvent, PaymentMethod, PaymentMethodId,
    PaymentMethodKind, TransactionId, TransactionKind, TransactionStatus,
    ValidationError, Value, WalletTransaction, ADMIN_CREDIT_NOTE, ADMIN_DEBIT_NOTE,
    ADMIN_METHOD, BET_HISTORY_LIMIT, STARTING_DEMO_BALANCE,
};
use tracing::{debug, warn};

use super::{
    atomic::{
        load_account, load_bet, load_history, load_payment_method, load_transaction,
        payment_methods, store_account, store_transaction, Mutation,
    },
    Error, Missing,
};
use crate::{
    curve::curve_for,
    state::{Staged, State},
};

/// Balance change caused by moving a transaction from `from` (`None` when it is being created)
/// to `to`.
pub fn transition_delta(
    tx: &WalletTransaction,
    from: Option<TransactionStatus>,
    to: TransactionStatus,
) -> i64 {
    tx.held_delta(to) - from.map_or(0, |status| tx.held_delta(status))
}

/// Apply `delta` to the account's real balance, if the account exists.
///
/// Returns the updated balance, or `None` when the account is missing and the balance change was
/// skipped.
async fn apply_real_delta<S: State>(
    staged: &mut Staged<'_, S>,
    account_id: &AccountId,
    delta: i64,
) -> Result<Option<Balance>, Error> {
    if delta == 0 {
        return Ok(load_account(staged, account_id)
            .await?
            .map(|account| account.real_balance));
    }
    let Some(mut account) = load_account(staged, account_id).await? else {
        warn!(account = %account_id, delta, "account missing, balance change skipped");
        return Ok(None);
    };
    account.real_balance = account.real_balance.apply(delta);
    let balance = account.real_balance;
    store_account(staged, account);
    Ok(Some(balance))
}

pub(crate) struct EnsureAccount {
    pub id: AccountId,
    pub now: u64,
}

impl<S: State> Mutation<S> for EnsureAccount {
    type Output = Account;

    async fn apply(&self, staged: &mut Staged<'_, S>) -> Result<Account, Error> {
        if let Some(account) = load_account(staged, &self.id).await? {
            return Ok(account);
        }
        let account = store_account(staged, Account::new(self.id.clone(), self.now));
        debug!(account = %self.id, "account created");
        Ok(account)
    }
}

pub(crate) struct PlaceBet {
    pub bet_id: BetId,
    pub account_id: AccountId,
    pub stake: Amount,
    pub mode: GameMode,
    pub board: BoardConfig,
    pub now: u64,
}

impl<S: State> Mutation<S> for PlaceBet {
    type Output = BetHandle;

    async fn apply(&self, staged: &mut Staged<'_, S>) -> Result<BetHandle, Error> {
        let mut account = load_account(staged, &self.account_id)
            .await?
            .unwrap_or_else(|| Account::new(self.account_id.clone(), self.now));
        if account.blocked {
            return Err(Error::Permission("account is blocked"));
        }
        let balance = account.balance(self.mode);
        if !balance.covers(self.stake) {
            return Err(Error::InsufficientFunds {
                balance,
                required: self.stake,
            });
        }
        let balance_after = balance.apply(-self.stake.signed());
        *account.balance_mut(self.mode) = balance_after;
        let account = store_account(staged, account);

        let bet = OpenBet {
            id: self.bet_id,
            account_id: self.account_id.clone(),
            stake: self.stake,
            mode: self.mode,
            board: self.board,
            placed_at: self.now,
            settled: false,
        };
        let handle = bet.handle(balance_after, account.revision);
        staged.insert(Key::Bet(bet.id), Value::Bet(bet));
        Ok(handle)
    }
}

/// Result of settling an outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Settlement {
    Applied {
        record: BetRecord,
        /// Balance after the payout, or `None` if the account vanished.
        balance: Option<Balance>,
    },
    /// The outcome had already been applied; nothing changed.
    AlreadySettled,
}

pub(crate) struct Settle {
    pub event: OutcomeEvent,
    pub now: u64,
}

impl<S: State> Mutation<S> for Settle {
    type Output = Settlement;

    async fn apply(&self, staged: &mut Staged<'_, S>) -> Result<Settlement, Error> {
        let event = &self.event;
        let mut bet = load_bet(staged, event.bet_id)
            .await?
            .ok_or(Error::NotFound(Missing::Bet(event.bet_id)))?;
        if bet.account_id != event.account_id {
            return Err(Error::Permission("outcome belongs to another account"));
        }
        if bet.settled {
            return Ok(Settlement::AlreadySettled);
        }
        if bet.stake != event.stake {
            return Err(ValidationError::StakeMismatch {
                expected: bet.stake,
                got: event.stake,
            }
            .into());
        }
        let curve = curve_for(bet.board)?;
        match curve.get(event.bucket) {
            None => {
                return Err(ValidationError::BucketOutOfRange {
                    index: event.bucket,
                    buckets: curve.buckets(),
                }
                .into())
            }
            Some(multiplier) if multiplier != event.multiplier => {
                return Err(ValidationError::MultiplierMismatch(event.bucket).into())
            }
            Some(_) => {}
        }

        let payout = event.payout();
        let balance = match load_account(staged, &bet.account_id).await? {
            Some(mut account) => {
                let balance = account.balance(bet.mode).apply(payout.signed());
                *account.balance_mut(bet.mode) = balance;
                store_account(staged, account);
                Some(balance)
            }
            None => {
                warn!(account = %bet.account_id, bet = %bet.id, "account missing, payout skipped");
                None
            }
        };

        let record = BetRecord::new(event, bet.mode, self.now);
        let mut history = load_history(staged, &bet.account_id).await?;
        history.insert(0, record.clone());
        history.truncate(BET_HISTORY_LIMIT);
        staged.insert(Key::History(bet.account_id.clone()), Value::History(history));

        bet.settled = true;
        staged.insert(Key::Bet(bet.id), Value::Bet(bet));
        Ok(Settlement::Applied { record, balance })
    }
}

pub(crate) struct ResetDemo {
    pub account_id: AccountId,
    pub now: u64,
}

impl<S: State> Mutation<S> for ResetDemo {
    type Output = Account;

    async fn apply(&self, staged: &mut Staged<'_, S>) -> Result<Account, Error> {
        let mut account = load_account(staged, &self.account_id)
            .await?
            .unwrap_or_else(|| Account::new(self.account_id.clone(), self.now));
        account.demo_balance = STARTING_DEMO_BALANCE;
        Ok(store_account(staged, account))
    }
}

/// A validated player submission.
pub(crate) struct SubmitWallet {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub kind: TransactionKind,
    pub amount: Amount,
    pub method: String,
    pub counterparty_phone: String,
    pub external_ref: Option<String>,
    pub note: Option<String>,
    pub now: u64,
}

impl<S: State> Mutation<S> for SubmitWallet {
    type Output = WalletTransaction;

    async fn apply(&self, staged: &mut Staged<'_, S>) -> Result<WalletTransaction, Error> {
        let methods = payment_methods(staged).await?;
        let method = methods
            .iter()
            .find(|method| method.matches(&self.method))
            .ok_or_else(|| ValidationError::UnknownPaymentMethod(self.method.clone()))?;
        if !method.enabled {
            return Err(ValidationError::PaymentMethodDisabled(method.name.clone()).into());
        }
        let method_name = method.name.clone();

        let account = load_account(staged, &self.account_id)
            .await?
            .unwrap_or_else(|| Account::new(self.account_id.clone(), self.now));
        if account.blocked {
            return Err(Error::Permission("account is blocked"));
        }
        if self.kind == TransactionKind::Withdraw && !account.real_balance.covers(self.amount) {
            return Err(Error::InsufficientFunds {
                balance: account.real_balance,
                required: self.amount,
            });
        }

        let tx = WalletTransaction {
            id: self.id,
            account_id: self.account_id.clone(),
            kind: self.kind,
            amount: self.amount,
            status: TransactionStatus::Pending,
            method: method_name,
            counterparty_phone: Some(self.counterparty_phone.clone()),
            external_ref: self.external_ref.clone(),
            created_at: self.now,
            note: self.note.clone(),
        };

        // Withdrawals lock their funds in the same batch that records them.
        let delta = transition_delta(&tx, None, tx.status);
        let mut account = account;
        account.real_balance = account.real_balance.apply(delta);
        store_account(staged, account);
        store_transaction(staged, tx.clone());
        Ok(tx)
    }
}

/// What a status edit did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusChange {
    pub transaction: WalletTransaction,
    pub previous: TransactionStatus,
    pub delta: i64,
    /// Real balance after the edit, or `None` if the account was missing and the delta skipped.
    pub balance: Option<Balance>,
}

pub(crate) struct SetStatus {
    pub id: TransactionId,
    pub status: TransactionStatus,
}

impl<S: State> Mutation<S> for SetStatus {
    type Output = StatusChange;

    async fn apply(&self, staged: &mut Staged<'_, S>) -> Result<StatusChange, Error> {
        let mut tx = load_transaction(staged, self.id)
            .await?
            .ok_or(Error::NotFound(Missing::Transaction(self.id)))?;
        let previous = tx.status;
        let delta = transition_delta(&tx, Some(previous), self.status);
        let balance = apply_real_delta(staged, &tx.account_id, delta).await?;
        if previous != self.status {
            tx.status = self.status;
            store_transaction(staged, tx.clone());
        }
        Ok(StatusChange {
            transaction: tx,
            previous,
            delta,
            balance,
        })
    }
}

pub(crate) struct Adjust {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub amount: Amount,
    pub direction: AdjustDirection,
    pub note: Option<String>,
    pub now: u64,
}

impl<S: State> Mutation<S> for Adjust {
    type Output = WalletTransaction;

    async fn apply(&self, staged: &mut Staged<'_, S>) -> Result<WalletTransaction, Error> {
        if load_account(staged, &self.account_id).await?.is_none() {
            return Err(Error::NotFound(Missing::Account(self.account_id.clone())));
        }
        let default_note = match self.direction {
            AdjustDirection::Credit => ADMIN_CREDIT_NOTE,
            AdjustDirection::Debit => ADMIN_DEBIT_NOTE,
        };
        let tx = WalletTransaction {
            id: self.id,
            account_id: self.account_id.clone(),
            kind: self.direction.kind(),
            amount: self.amount,
            status: TransactionStatus::Approved,
            method: ADMIN_METHOD.to_string(),
            counterparty_phone: None,
            external_ref: None,
            created_at: self.now,
            note: Some(self.note.clone().unwrap_or_else(|| default_note.to_string())),
        };
        let delta = transition_delta(&tx, None, tx.status);
        apply_real_delta(staged, &self.account_id, delta).await?;
        store_transaction(staged, tx.clone());
        Ok(tx)
    }
}

pub(crate) struct SetBlocked {
    pub account_id: AccountId,
    pub blocked: bool,
}

impl<S: State> Mutation<S> for SetBlocked {
    type Output = Account;

    async fn apply(&self, staged: &mut Staged<'_, S>) -> Result<Account, Error> {
        let mut account = load_account(staged, &self.account_id)
            .await?
            .ok_or_else(|| Error::NotFound(Missing::Account(self.account_id.clone())))?;
        if account.blocked != self.blocked {
            account.blocked = self.blocked;
            account = store_account(staged, account);
        }
        Ok(account)
    }
}

pub(crate) struct PurgeTransaction {
    pub id: TransactionId,
}

impl<S: State> Mutation<S> for PurgeTransaction {
    type Output = WalletTransaction;

    async fn apply(&self, staged: &mut Staged<'_, S>) -> Result<WalletTransaction, Error> {
        let tx = load_transaction(staged, self.id)
            .await?
            .ok_or(Error::NotFound(Missing::Transaction(self.id)))?;
        staged.delete(Key::Transaction(self.id));
        Ok(tx)
    }
}

pub(crate) struct AddPaymentMethod {
    pub id: PaymentMethodId,
    pub name: String,
    pub number: String,
    pub kind: PaymentMethodKind,
    pub enabled: bool,
}

impl<S: State> Mutation<S> for AddPaymentMethod {
    type Output = PaymentMethod;

    async fn apply(&self, staged: &mut Staged<'_, S>) -> Result<PaymentMethod, Error> {
        if payment_methods(staged)
            .await?
            .iter()
            .any(|method| method.matches(&self.name))
        {
            return Err(ValidationError::DuplicatePaymentMethod(self.name.clone()).into());
        }
        let method = PaymentMethod {
            id: self.id,
            name: self.name.clone(),
            number: self.number.clone(),
            enabled: self.enabled,
            kind: self.kind,
        };
        staged.insert(
            Key::PaymentMethod(method.id),
            Value::PaymentMethod(method.clone()),
        );
        Ok(method)
    }
}

/// Edit applied to an existing payment method.
pub(crate) enum MethodEdit {
    Toggle,
    Enabled(bool),
    Number(String),
}

pub(crate) struct EditPaymentMethod {
    pub id: PaymentMethodId,
    pub edit: MethodEdit,
}

impl<S: State> Mutation<S> for EditPaymentMethod {
    type Output = PaymentMethod;

    async fn apply(&self, staged: &mut Staged<'_, S>) -> Result<PaymentMethod, Error> {
        let mut method = load_payment_method(staged, self.id)
            .await?
            .ok_or(Error::NotFound(Missing::PaymentMethod(self.id)))?;
        match &self.edit {
            MethodEdit::Toggle => method.enabled = !method.enabled,
            MethodEdit::Enabled(enabled) => method.enabled = *enabled,
            MethodEdit::Number(number) => method.number = number.clone(),
        }
        staged.insert(
            Key::PaymentMethod(method.id),
            Value::PaymentMethod(method.clone()),
        );
        Ok(method)
    }
}

pub(crate) struct DeletePaymentMethod {
    pub id: PaymentMethodId,
}

impl<S: State> Mutation<S> for DeletePaymentMethod {
    type Output = PaymentMethod;

    async fn apply(&self, staged: &mut Staged<'_, S>) -> Result<PaymentMethod, Error> {
        let method = load_payment_method(staged, self.id)
            .await?
            .ok_or(Error::NotFound(Missing::PaymentMethod(self.id)))?;
        staged.delete(Key::PaymentMethod(self.id));
        Ok(method)
    }
}
