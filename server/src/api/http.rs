use axum::{
    extract::{Path, State as AxumState},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use plinko_execution::{generate_curve, Error};
use plinko_types::{AccountId, RiskLevel, ValidationError, WalletRequest};
use serde::Serialize;
use std::sync::Arc;

use crate::{Backend, PlayRequest};

/// Header naming the administrator on `/admin` routes.
pub const ADMIN_HEADER: &str = "x-admin-id";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] Error),
    #[error("missing x-admin-id header")]
    MissingAdmin,
    #[error("request changes nothing")]
    EmptyUpdate,
    #[error("snapshot file not configured")]
    NoSnapshot,
    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Ledger(Error::Validation(err))
    }
}

impl ApiError {
    fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Ledger(Error::Validation(_)) | ApiError::EmptyUpdate => {
                (StatusCode::BAD_REQUEST, "validation")
            }
            ApiError::Ledger(Error::InsufficientFunds { .. }) => {
                (StatusCode::PAYMENT_REQUIRED, "insufficient_funds")
            }
            ApiError::Ledger(Error::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Ledger(Error::Conflict { .. }) => (StatusCode::CONFLICT, "conflict"),
            ApiError::Ledger(Error::Permission(_)) => (StatusCode::FORBIDDEN, "permission"),
            ApiError::MissingAdmin => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            ApiError::NoSnapshot => (StatusCode::NOT_FOUND, "not_configured"),
            ApiError::Ledger(Error::Storage(_)) | ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    retryable: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.status();
        if status.is_server_error() {
            tracing::error!(err = %self, "request failed");
        }
        let retryable = matches!(&self, ApiError::Ledger(err) if err.is_retryable());
        let body = ErrorBody {
            error,
            message: self.to_string(),
            retryable,
        };
        (status, Json(body)).into_response()
    }
}

pub(super) type ApiResult<T> = Result<T, ApiError>;

pub(super) fn account_id(raw: String) -> ApiResult<AccountId> {
    Ok(AccountId::new(raw)?)
}

/// Administrator named by the [`ADMIN_HEADER`] header.
pub(super) fn admin_caller(headers: &HeaderMap) -> ApiResult<AccountId> {
    let raw = headers
        .get(ADMIN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ApiError::MissingAdmin)?;
    account_id(raw.to_string())
}

#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
    subscribers: usize,
}

pub(super) async fn healthz(AxumState(backend): AxumState<Arc<Backend>>) -> Response {
    Json(HealthzResponse {
        ok: true,
        subscribers: backend.subscribers(),
    })
    .into_response()
}

pub(super) async fn config(AxumState(backend): AxumState<Arc<Backend>>) -> Response {
    Json(backend.config.clone()).into_response()
}

pub(super) async fn curve(Path((rows, risk)): Path<(u8, String)>) -> ApiResult<Response> {
    let risk: RiskLevel = risk.parse()?;
    Ok(Json(generate_curve(rows, risk)?).into_response())
}

pub(super) async fn account(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = account_id(id)?;
    Ok(Json(backend.ledger().account(&id).await?).into_response())
}

pub(super) async fn play(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(id): Path<String>,
    Json(request): Json<PlayRequest>,
) -> ApiResult<Response> {
    let id = account_id(id)?;
    Ok(Json(backend.play(&id, request).await?).into_response())
}

pub(super) async fn reset_demo(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = account_id(id)?;
    Ok(Json(backend.ledger().reset_demo_balance(&id).await?).into_response())
}

pub(super) async fn transactions(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = account_id(id)?;
    Ok(Json(backend.ledger().transactions_for(&id).await?).into_response())
}

pub(super) async fn submit_transaction(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(id): Path<String>,
    Json(request): Json<WalletRequest>,
) -> ApiResult<Response> {
    let id = account_id(id)?;
    let tx = backend
        .ledger()
        .submit_wallet_transaction(&id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(tx)).into_response())
}

pub(super) async fn history(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = account_id(id)?;
    Ok(Json(backend.ledger().bet_history(&id).await?).into_response())
}

pub(super) async fn payment_methods(
    AxumState(backend): AxumState<Arc<Backend>>,
) -> ApiResult<Response> {
    Ok(Json(backend.ledger().payment_methods(true).await?).into_response())
}
