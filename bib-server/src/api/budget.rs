//! Budget guard RPC (service role)

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::api::ApiJson;
use crate::db::BudgetStatus;
use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct ConsumeBudgetRequest {
    pub scope: String,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct BudgetStatusRequest {
    pub scope: String,
}

/// POST /rpc/consume_budget
///
/// 200 with the new totals, or 429 with the unchanged totals when the debit
/// would exceed the hard limit.
pub async fn consume_budget(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ConsumeBudgetRequest>,
) -> ApiResult<Json<BudgetStatus>> {
    let status = state.budget.charge(&request.scope, request.amount).await?;
    Ok(Json(status))
}

/// POST /rpc/budget_status
pub async fn budget_status(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<BudgetStatusRequest>,
) -> ApiResult<Json<BudgetStatus>> {
    let status = state.budget.status(&request.scope).await?;
    Ok(Json(status))
}
