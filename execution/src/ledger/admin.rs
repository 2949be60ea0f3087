use plinko_types::{
    validation::{validate_method_name, validate_method_number, validate_note, validate_stake},
    Account, AccountId, AdjustDirection, Amount, Balance, PaymentMethod, PaymentMethodId,
    PaymentMethodKind, SequenceKind, SortKey, SortOrder, TransactionId, TransactionQuery, TransactionStatus,
    WalletTransaction,
};
use serde::Serialize;
use tracing::info;

use super::{
    mutations::{
        Adjust, AddPaymentMethod, DeletePaymentMethod, EditPaymentMethod, MethodEdit,
        PurgeTransaction, SetBlocked, SetStatus,
    },
    Error, Ledger, StatusChange,
};
use crate::{clock::Clock, feed::ChangeEvent, state::State};

/// Dashboard totals.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    pub accounts: usize,
    pub total_real_balance: Balance,
    pub pending: usize,
}

/// Administrator operations, obtained through [`Ledger::admin`].
pub struct Admin<'a, S: State, C: Clock> {
    ledger: &'a Ledger<S, C>,
    caller: AccountId,
}

impl<'a, S: State, C: Clock> Admin<'a, S, C> {
    pub(super) fn new(ledger: &'a Ledger<S, C>, caller: AccountId) -> Self {
        Self { ledger, caller }
    }

    pub fn caller(&self) -> &AccountId {
        &self.caller
    }

    /// Move a transaction to `status`, applying the balance delta implied by its current status.
    ///
    /// Edits of the same transaction are serialized; the status is re-read under the lock.
    pub async fn set_transaction_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<StatusChange, Error> {
        let _guard = self.ledger.locks.lock(id).await;
        let change = self.ledger.execute(&SetStatus { id, status }).await?;
        info!(
            admin = %self.caller,
            tx = %id,
            from = change.previous.as_str(),
            to = status.as_str(),
            delta = change.delta,
            "transaction status set"
        );
        Ok(change)
    }

    /// Credit or debit the real balance through a pre-approved synthetic transaction.
    ///
    /// Debits may take the balance below zero.
    pub async fn adjust_balance(
        &self,
        account_id: &AccountId,
        amount: Amount,
        direction: AdjustDirection,
        note: Option<String>,
    ) -> Result<WalletTransaction, Error> {
        validate_stake(amount)?;
        validate_note(note.as_deref())?;
        let id = TransactionId(self.ledger.allocate(SequenceKind::Transaction).await?);
        let tx = self
            .ledger
            .execute(&Adjust {
                id,
                account_id: account_id.clone(),
                amount,
                direction,
                note,
                now: self.ledger.now(),
            })
            .await?;
        info!(
            admin = %self.caller,
            account = %account_id,
            tx = %tx.id,
            ?direction,
            %amount,
            "balance adjusted"
        );
        Ok(tx)
    }

    pub async fn set_blocked(
        &self,
        account_id: &AccountId,
        blocked: bool,
    ) -> Result<Account, Error> {
        let account = self
            .ledger
            .execute(&SetBlocked {
                account_id: account_id.clone(),
                blocked,
            })
            .await?;
        info!(admin = %self.caller, account = %account_id, blocked, "account block set");
        Ok(account)
    }

    /// Delete a transaction record. Balances are left untouched.
    pub async fn purge_transaction(&self, id: TransactionId) -> Result<WalletTransaction, Error> {
        let _guard = self.ledger.locks.lock(id).await;
        let tx = self.ledger.execute(&PurgeTransaction { id }).await?;
        self.ledger.feed.publish([ChangeEvent::TransactionRemoved {
            id,
            account_id: tx.account_id.clone(),
        }]);
        info!(admin = %self.caller, tx = %id, "transaction purged");
        Ok(tx)
    }

    pub async fn add_payment_method(
        &self,
        name: &str,
        number: &str,
        kind: PaymentMethodKind,
        enabled: bool,
    ) -> Result<PaymentMethod, Error> {
        validate_method_name(name)?;
        validate_method_number(number)?;
        let id = PaymentMethodId(self.ledger.allocate(SequenceKind::PaymentMethod).await?);
        let method = self
            .ledger
            .execute(&AddPaymentMethod {
                id,
                name: name.trim().to_string(),
                number: number.trim().to_string(),
                kind,
                enabled,
            })
            .await?;
        info!(admin = %self.caller, method = %method.name, "payment method added");
        Ok(method)
    }

    pub async fn toggle_payment_method(&self, id: PaymentMethodId) -> Result<PaymentMethod, Error> {
        self.edit_payment_method(id, MethodEdit::Toggle).await
    }

    pub async fn set_payment_method_enabled(
        &self,
        id: PaymentMethodId,
        enabled: bool,
    ) -> Result<PaymentMethod, Error> {
        self.edit_payment_method(id, MethodEdit::Enabled(enabled)).await
    }

    pub async fn update_payment_method_number(
        &self,
        id: PaymentMethodId,
        number: &str,
    ) -> Result<PaymentMethod, Error> {
        validate_method_number(number)?;
        self.edit_payment_method(id, MethodEdit::Number(number.trim().to_string()))
            .await
    }

    async fn edit_payment_method(
        &self,
        id: PaymentMethodId,
        edit: MethodEdit,
    ) -> Result<PaymentMethod, Error> {
        let method = self
            .ledger
            .execute(&EditPaymentMethod { id, edit })
            .await?;
        info!(
            admin = %self.caller,
            method = %method.name,
            enabled = method.enabled,
            "payment method updated"
        );
        Ok(method)
    }

    pub async fn delete_payment_method(&self, id: PaymentMethodId) -> Result<PaymentMethod, Error> {
        let method = self.ledger.execute(&DeletePaymentMethod { id }).await?;
        info!(admin = %self.caller, method = %method.name, "payment method deleted");
        Ok(method)
    }

    /// Every transaction matching `query`, in the requested order.
    pub async fn transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<Vec<WalletTransaction>, Error> {
        let mut transactions: Vec<_> = self
            .ledger
            .all_transactions()
            .await?
            .into_iter()
            .filter(|tx| query.matches(tx))
            .collect();
        transactions.sort_by(|a, b| {
            let ordering = match query.sort {
                SortKey::Timestamp => a.created_at.cmp(&b.created_at),
                SortKey::Amount => a.amount.cmp(&b.amount),
                SortKey::Kind => a.kind.cmp(&b.kind),
            }
            .then(a.id.cmp(&b.id));
            match query.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
        Ok(transactions)
    }

    pub async fn accounts(&self) -> Result<Vec<Account>, Error> {
        self.ledger.all_accounts().await
    }

    pub async fn stats(&self) -> Result<LedgerStats, Error> {
        let accounts = self.ledger.all_accounts().await?;
        let pending = self
            .ledger
            .all_transactions()
            .await?
            .iter()
            .filter(|tx| tx.status == TransactionStatus::Pending)
            .count();
        Ok(LedgerStats {
            accounts: accounts.len(),
            total_real_balance: accounts.iter().fold(Balance::ZERO, |total, account| {
                total.apply(account.real_balance.minor())
            }),
            pending,
        })
    }
}
