//! HTTP surface for the read side: wallet history, user activity, and the
//! historical-balance query.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use wallet_common::{WalletError, WalletResult};

use crate::dto::{HistoricalBalanceResponse, HistoryEntryResponse};
use crate::repository::HistoryRepository;

#[derive(Clone)]
pub struct AppState {
    pub repository: HistoryRepository,
}

pub async fn get_wallet_history(
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
) -> WalletResult<Json<Vec<HistoryEntryResponse>>> {
    let entries = state.repository.get_wallet_history(&wallet_id).await?;
    Ok(Json(entries.into_iter().map(HistoryEntryResponse::from).collect()))
}

pub async fn get_user_activity(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> WalletResult<Json<Vec<HistoryEntryResponse>>> {
    let entries = state.repository.get_user_activity(&user_id).await?;
    Ok(Json(entries.into_iter().map(HistoryEntryResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct HistoricalBalanceQuery {
    #[serde(rename = "asOf")]
    as_of: DateTime<Utc>,
}

/// Balance as of a point in time, derived from the last history entry at or
/// before `asOf` rather than the wallet's current balance.
pub async fn get_historical_balance(
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
    Query(params): Query<HistoricalBalanceQuery>,
) -> WalletResult<Json<HistoricalBalanceResponse>> {
    let balance = state
        .repository
        .get_historical_balance(&wallet_id, params.as_of)
        .await?
        .ok_or_else(|| WalletError::WalletNotFound(wallet_id.clone()))?;

    Ok(Json(HistoricalBalanceResponse {
        wallet_id,
        as_of: params.as_of,
        balance,
    }))
}

pub async fn health_check() -> &'static str {
    "OK"
}
