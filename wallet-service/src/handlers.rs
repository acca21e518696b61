//! HTTP surface, wired through `Resilience::execute` so every state-changing
//! route gets the retry and degradation behavior for free.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use wallet_common::WalletResult;

use crate::dto::*;
use crate::query::QueryService;
use crate::repo_error::RepoError;
use crate::repository::WalletRepository;
use crate::resilience::Resilience;

#[derive(Clone)]
pub struct AppState {
    pub repository: WalletRepository,
    pub resilience: Arc<Resilience>,
    pub query_service: Arc<QueryService>,
}

pub async fn create_wallet(
    State(state): State<AppState>,
    Json(payload): Json<CreateWalletRequest>,
) -> WalletResult<(StatusCode, Json<WalletResponse>)> {
    tracing::info!(user_id = %payload.user_id, "creating wallet");

    let wallet = state
        .resilience
        .execute("create_wallet", &payload.user_id, || {
            let repo = state.repository.clone();
            let user_id = payload.user_id.clone();
            async move { repo.create_wallet(&user_id).await }
        })
        .await?;

    Ok((StatusCode::CREATED, Json(WalletResponse::from(wallet))))
}

pub async fn get_wallet(
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
) -> WalletResult<Json<WalletResponse>> {
    let wallet = state.query_service.get_wallet(&wallet_id).await?;
    Ok(Json(WalletResponse::from(wallet)))
}

pub async fn get_user_wallets(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> WalletResult<Json<Vec<WalletResponse>>> {
    let wallets = state
        .repository
        .find_by_user_id(&user_id)
        .await
        .map_err(map_repo_err)?;
    Ok(Json(wallets.into_iter().map(WalletResponse::from).collect()))
}

pub async fn deposit(
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
    Json(payload): Json<DepositRequest>,
) -> WalletResult<Json<TransactionResponse>> {
    tracing::info!(wallet_id = %wallet_id, amount = %payload.amount, reference_id = %payload.reference_id, "deposit");

    let amount = payload.amount.as_decimal();
    let transaction = state
        .resilience
        .execute("deposit", &wallet_id, || {
            let repo = state.repository.clone();
            let wallet_id = wallet_id.clone();
            let reference_id = payload.reference_id.clone();
            let description = payload.description.clone();
            async move {
                repo.deposit(&wallet_id, amount, &reference_id, description.as_deref())
                    .await
            }
        })
        .await?;

    Ok(Json(TransactionResponse::from(transaction)))
}

pub async fn withdraw(
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
    Json(payload): Json<WithdrawRequest>,
) -> WalletResult<Json<TransactionResponse>> {
    tracing::info!(wallet_id = %wallet_id, amount = %payload.amount, reference_id = %payload.reference_id, "withdraw");

    let amount = payload.amount.as_decimal();
    let transaction = state
        .resilience
        .execute("withdraw", &wallet_id, || {
            let repo = state.repository.clone();
            let wallet_id = wallet_id.clone();
            let reference_id = payload.reference_id.clone();
            let description = payload.description.clone();
            async move {
                repo.withdraw(&wallet_id, amount, &reference_id, description.as_deref())
                    .await
            }
        })
        .await?;

    Ok(Json(TransactionResponse::from(transaction)))
}

pub async fn transfer(
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
    Json(payload): Json<TransferRequest>,
) -> WalletResult<Json<TransactionResponse>> {
    tracing::info!(
        source_wallet_id = %wallet_id,
        destination_wallet_id = %payload.destination_wallet_id,
        amount = %payload.amount,
        reference_id = %payload.reference_id,
        "transfer"
    );

    let amount = payload.amount.as_decimal();
    let transaction = state
        .resilience
        .execute("transfer", &wallet_id, || {
            let repo = state.repository.clone();
            let source_id = wallet_id.clone();
            let destination_id = payload.destination_wallet_id.clone();
            let reference_id = payload.reference_id.clone();
            let description = payload.description.clone();
            async move {
                repo.transfer(&source_id, &destination_id, amount, &reference_id, description.as_deref())
                    .await
            }
        })
        .await?;

    Ok(Json(TransactionResponse::from(transaction)))
}

pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Helper for routes that bypass `Resilience::execute` (pure reads); kept
/// here rather than in `repo_error` so `From<RepoError>` stays the single
/// conversion path used throughout the crate.
pub(crate) fn map_repo_err(e: RepoError) -> wallet_common::WalletError {
    e.into()
}
