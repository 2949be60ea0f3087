use axum::{
    extract::{Path, Query, State as AxumState},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use plinko_types::{
    AdjustDirection, Amount, Balance, PaymentMethodId, PaymentMethodKind, TransactionId,
    TransactionQuery, TransactionStatus, WalletTransaction,
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::Arc};

use super::http::{account_id, admin_caller, ApiError, ApiResult};
use crate::Backend;

#[derive(Deserialize)]
pub(super) struct StatusUpdate {
    status: TransactionStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusChangeResponse {
    transaction: WalletTransaction,
    previous: TransactionStatus,
    delta: Balance,
    #[serde(skip_serializing_if = "Option::is_none")]
    balance: Option<Balance>,
}

#[derive(Deserialize)]
pub(super) struct Adjustment {
    amount: Amount,
    direction: AdjustDirection,
    #[serde(default)]
    note: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct BlockUpdate {
    blocked: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Deserialize)]
pub(super) struct NewPaymentMethod {
    name: String,
    number: String,
    #[serde(default)]
    kind: PaymentMethodKind,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

#[derive(Deserialize)]
pub(super) struct PaymentMethodUpdate {
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    number: Option<String>,
}

#[derive(Serialize)]
struct SnapshotResponse {
    path: PathBuf,
}

pub(super) async fn transactions(
    headers: HeaderMap,
    AxumState(backend): AxumState<Arc<Backend>>,
    Query(query): Query<TransactionQuery>,
) -> ApiResult<Response> {
    let admin = backend.ledger().admin(&admin_caller(&headers)?)?;
    Ok(Json(admin.transactions(&query).await?).into_response())
}

pub(super) async fn set_status(
    headers: HeaderMap,
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(id): Path<u64>,
    Json(update): Json<StatusUpdate>,
) -> ApiResult<Response> {
    let admin = backend.ledger().admin(&admin_caller(&headers)?)?;
    let change = admin
        .set_transaction_status(TransactionId(id), update.status)
        .await?;
    Ok(Json(StatusChangeResponse {
        transaction: change.transaction,
        previous: change.previous,
        delta: Balance::from_minor(change.delta),
        balance: change.balance,
    })
    .into_response())
}

pub(super) async fn purge_transaction(
    headers: HeaderMap,
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(id): Path<u64>,
) -> ApiResult<Response> {
    let admin = backend.ledger().admin(&admin_caller(&headers)?)?;
    Ok(Json(admin.purge_transaction(TransactionId(id)).await?).into_response())
}

pub(super) async fn accounts(
    headers: HeaderMap,
    AxumState(backend): AxumState<Arc<Backend>>,
) -> ApiResult<Response> {
    let admin = backend.ledger().admin(&admin_caller(&headers)?)?;
    Ok(Json(admin.accounts().await?).into_response())
}

pub(super) async fn adjust_balance(
    headers: HeaderMap,
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(id): Path<String>,
    Json(adjustment): Json<Adjustment>,
) -> ApiResult<Response> {
    let admin = backend.ledger().admin(&admin_caller(&headers)?)?;
    let id = account_id(id)?;
    let tx = admin
        .adjust_balance(&id, adjustment.amount, adjustment.direction, adjustment.note)
        .await?;
    Ok((StatusCode::CREATED, Json(tx)).into_response())
}

pub(super) async fn set_blocked(
    headers: HeaderMap,
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(id): Path<String>,
    Json(update): Json<BlockUpdate>,
) -> ApiResult<Response> {
    let admin = backend.ledger().admin(&admin_caller(&headers)?)?;
    let id = account_id(id)?;
    Ok(Json(admin.set_blocked(&id, update.blocked).await?).into_response())
}

pub(super) async fn payment_methods(
    headers: HeaderMap,
    AxumState(backend): AxumState<Arc<Backend>>,
) -> ApiResult<Response> {
    backend.ledger().admin(&admin_caller(&headers)?)?;
    Ok(Json(backend.ledger().payment_methods(false).await?).into_response())
}

pub(super) async fn add_payment_method(
    headers: HeaderMap,
    AxumState(backend): AxumState<Arc<Backend>>,
    Json(method): Json<NewPaymentMethod>,
) -> ApiResult<Response> {
    let admin = backend.ledger().admin(&admin_caller(&headers)?)?;
    let method = admin
        .add_payment_method(&method.name, &method.number, method.kind, method.enabled)
        .await?;
    Ok((StatusCode::CREATED, Json(method)).into_response())
}

pub(super) async fn edit_payment_method(
    headers: HeaderMap,
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(id): Path<u64>,
    Json(update): Json<PaymentMethodUpdate>,
) -> ApiResult<Response> {
    let admin = backend.ledger().admin(&admin_caller(&headers)?)?;
    let id = PaymentMethodId(id);
    let mut updated = None;
    if let Some(number) = &update.number {
        updated = Some(admin.update_payment_method_number(id, number).await?);
    }
    if let Some(enabled) = update.enabled {
        updated = Some(admin.set_payment_method_enabled(id, enabled).await?);
    }
    let method = updated.ok_or(ApiError::EmptyUpdate)?;
    Ok(Json(method).into_response())
}

pub(super) async fn toggle_payment_method(
    headers: HeaderMap,
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(id): Path<u64>,
) -> ApiResult<Response> {
    let admin = backend.ledger().admin(&admin_caller(&headers)?)?;
    Ok(Json(admin.toggle_payment_method(PaymentMethodId(id)).await?).into_response())
}

pub(super) async fn delete_payment_method(
    headers: HeaderMap,
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(id): Path<u64>,
) -> ApiResult<Response> {
    let admin = backend.ledger().admin(&admin_caller(&headers)?)?;
    Ok(Json(admin.delete_payment_method(PaymentMethodId(id)).await?).into_response())
}

pub(super) async fn stats(
    headers: HeaderMap,
    AxumState(backend): AxumState<Arc<Backend>>,
) -> ApiResult<Response> {
    let admin = backend.ledger().admin(&admin_caller(&headers)?)?;
    Ok(Json(admin.stats().await?).into_response())
}

pub(super) async fn snapshot(
    headers: HeaderMap,
    AxumState(backend): AxumState<Arc<Backend>>,
) -> ApiResult<Response> {
    backend.ledger().admin(&admin_caller(&headers)?)?;
    let path = backend.save().await?.ok_or(ApiError::NoSnapshot)?;
    Ok(Json(SnapshotResponse { path }).into_response())
}
