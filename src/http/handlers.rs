//! Route handlers for the public and admin endpoints.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::cache::CacheCategory;
use crate::models::{CoinQuotes, RateTable};
use crate::ratelimit::{ClientUsage, GlobalStats, UsageInfo};
use crate::services::{crypto, forex};
use crate::store::Availability;

/// Split a comma list, falling back to `defaults` when absent or blank.
fn symbol_list(raw: Option<&str>, defaults: &[&str]) -> Vec<String> {
    let parsed: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if parsed.is_empty() {
        defaults.iter().map(|s| s.to_string()).collect()
    } else {
        parsed
    }
}

fn parse_date(raw: Option<&str>) -> ApiResult<NaiveDate> {
    let raw = raw.ok_or_else(|| ApiError::BadRequest("date is required (YYYY-MM-DD)".into()))?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest("Invalid date format. Use YYYY-MM-DD".into()))
}

fn now_secs() -> i64 {
    Utc::now().timestamp()
}

fn available<T>(outcome: Availability<T>) -> ApiResult<T> {
    outcome.ok().ok_or(ApiError::StoreUnavailable)
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "Welcome to LiteForex",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "forex": {
                "latest": "/forex/latest",
                "convert": "/forex/convert",
                "historical": "/forex/historical",
                "list": "/forex/list"
            },
            "crypto": {
                "latest": "/crypto/latest",
                "historical": "/crypto/historical",
                "marketcap": "/crypto/marketcap",
                "list": "/crypto/list"
            }
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let store = if state.cache.ping().await.is_available() {
        "healthy"
    } else {
        "unhealthy"
    };
    Json(json!({
        "success": true,
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        "services": {
            "api": "healthy",
            "store": store
        }
    }))
}

// ==================== forex ====================

#[derive(Debug, Deserialize)]
pub struct ForexQuery {
    base: Option<String>,
    symbols: Option<String>,
    #[serde(alias = "date_str")]
    date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ForexLatestResponse {
    success: bool,
    base: String,
    date: String,
    timestamp: i64,
    rates: RateTable,
}

pub async fn forex_latest(
    State(state): State<AppState>,
    query: Result<Query<ForexQuery>, QueryRejection>,
) -> ApiResult<Json<ForexLatestResponse>> {
    let Query(q) = query?;
    let base = q.base.as_deref().unwrap_or("USD");
    let symbols = symbol_list(q.symbols.as_deref(), &forex::DEFAULT_SYMBOLS);

    let rates = state.forex.latest(base, &symbols).await;
    Ok(Json(ForexLatestResponse {
        success: true,
        base: rates.base,
        date: rates.date,
        timestamp: now_secs(),
        rates: rates.rates,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ConvertQuery {
    amount: Option<f64>,
    #[serde(alias = "from_currency")]
    from: Option<String>,
    #[serde(alias = "to_currency")]
    to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConvertResponse {
    success: bool,
    amount: f64,
    from_currency: String,
    to_currency: String,
    rate: f64,
    result: f64,
    date: String,
}

pub async fn forex_convert(
    State(state): State<AppState>,
    query: Result<Query<ConvertQuery>, QueryRejection>,
) -> ApiResult<Json<ConvertResponse>> {
    let Query(q) = query?;
    let amount = q.amount.ok_or_else(|| ApiError::BadRequest("amount is required".into()))?;
    let from = q.from.ok_or_else(|| ApiError::BadRequest("from is required".into()))?;
    let to = q.to.ok_or_else(|| ApiError::BadRequest("to is required".into()))?;

    let conversion = state.forex.convert(amount, &from, &to).await?;
    Ok(Json(ConvertResponse {
        success: true,
        amount: conversion.amount,
        from_currency: conversion.from,
        to_currency: conversion.to,
        rate: conversion.rate,
        result: conversion.result,
        date: conversion.date,
    }))
}

#[derive(Debug, Serialize)]
pub struct ForexHistoricalResponse {
    success: bool,
    base: String,
    date: String,
    rates: RateTable,
}

pub async fn forex_historical(
    State(state): State<AppState>,
    query: Result<Query<ForexQuery>, QueryRejection>,
) -> ApiResult<Json<ForexHistoricalResponse>> {
    let Query(q) = query?;
    let date = parse_date(q.date.as_deref())?;
    let base = q.base.as_deref().unwrap_or("USD");
    let symbols = symbol_list(q.symbols.as_deref(), &forex::DEFAULT_SYMBOLS);

    let rates = state.forex.historical(date, base, &symbols).await?;
    Ok(Json(ForexHistoricalResponse {
        success: true,
        base: rates.base,
        date: date.format("%Y-%m-%d").to_string(),
        rates: rates.rates,
    }))
}

pub async fn forex_list(State(state): State<AppState>) -> Json<Value> {
    let currencies = state.forex.currencies().await;
    Json(json!({
        "success": true,
        "count": currencies.len(),
        "currencies": currencies,
    }))
}

// ==================== crypto ====================

#[derive(Debug, Deserialize)]
pub struct CryptoQuery {
    symbols: Option<String>,
    #[serde(alias = "date_str")]
    date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CryptoQuotesResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    data: CoinQuotes,
}

pub async fn crypto_latest(
    State(state): State<AppState>,
    query: Result<Query<CryptoQuery>, QueryRejection>,
) -> ApiResult<Json<CryptoQuotesResponse>> {
    let Query(q) = query?;
    let symbols = symbol_list(q.symbols.as_deref(), &crypto::DEFAULT_SYMBOLS);

    let data = state.crypto.latest(&symbols).await;
    Ok(Json(CryptoQuotesResponse {
        success: true,
        timestamp: Some(now_secs()),
        date: None,
        data,
    }))
}

pub async fn crypto_historical(
    State(state): State<AppState>,
    query: Result<Query<CryptoQuery>, QueryRejection>,
) -> ApiResult<Json<CryptoQuotesResponse>> {
    let Query(q) = query?;
    let date = parse_date(q.date.as_deref())?;
    let symbols = symbol_list(q.symbols.as_deref(), &crypto::DEFAULT_HISTORICAL_SYMBOLS);

    let data = state.crypto.historical(date, &symbols).await;
    Ok(Json(CryptoQuotesResponse {
        success: true,
        timestamp: None,
        date: Some(date.format("%Y-%m-%d").to_string()),
        data,
    }))
}

pub async fn crypto_marketcap(
    State(state): State<AppState>,
    query: Result<Query<CryptoQuery>, QueryRejection>,
) -> ApiResult<Json<CryptoQuotesResponse>> {
    let Query(q) = query?;
    let symbols = symbol_list(q.symbols.as_deref(), &crypto::DEFAULT_SYMBOLS);

    let data = state.crypto.market_caps(&symbols).await;
    Ok(Json(CryptoQuotesResponse {
        success: true,
        timestamp: Some(now_secs()),
        date: None,
        data,
    }))
}

pub async fn crypto_list(State(state): State<AppState>) -> Json<Value> {
    let coins = state.crypto.coins().await;
    Json(json!({
        "success": true,
        "count": coins.len(),
        "cryptocurrencies": coins,
    }))
}

// ==================== admin ====================

#[derive(Debug, Deserialize)]
pub struct ClientQuery {
    client: Option<String>,
    endpoint: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    success: bool,
    client: String,
    endpoint: String,
    usage: UsageInfo,
}

pub async fn ratelimit_usage(
    State(state): State<AppState>,
    query: Result<Query<ClientQuery>, QueryRejection>,
) -> ApiResult<Json<UsageResponse>> {
    let Query(q) = query?;
    let client = q.client.ok_or_else(|| ApiError::BadRequest("client is required".into()))?;
    let endpoint = q.endpoint.ok_or_else(|| ApiError::BadRequest("endpoint is required".into()))?;

    let usage = available(state.limiter.get_usage_info(&client, &endpoint).await)?;
    Ok(Json(UsageResponse {
        success: true,
        client,
        endpoint,
        usage,
    }))
}

pub async fn ratelimit_client(
    State(state): State<AppState>,
    Path(client): Path<String>,
) -> ApiResult<Json<ClientUsage>> {
    let usage = available(state.limiter.get_client_usage(&client).await)?;
    if usage.endpoints.is_empty() {
        return Err(ApiError::NotFound(format!("no active counters for {}", client)));
    }
    Ok(Json(usage))
}

pub async fn ratelimit_reset(
    State(state): State<AppState>,
    query: Result<Query<ClientQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(q) = query?;
    let client = q.client.ok_or_else(|| ApiError::BadRequest("client is required".into()))?;

    let deleted = available(state.limiter.reset_limits(&client, q.endpoint.as_deref()).await)?;
    info!(client = %client, endpoint = ?q.endpoint, deleted, "Rate limits reset via admin API");
    Ok(Json(json!({
        "success": true,
        "client": client,
        "endpoint": q.endpoint,
        "deleted": deleted,
    })))
}

pub async fn ratelimit_stats(State(state): State<AppState>) -> ApiResult<Json<GlobalStats>> {
    Ok(Json(available(state.limiter.get_global_stats().await)?))
}

#[derive(Debug, Deserialize)]
pub struct ClearQuery {
    category: Option<String>,
}

pub async fn cache_clear(
    State(state): State<AppState>,
    query: Result<Query<ClearQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(q) = query?;
    let category = match q.category.as_deref() {
        None => None,
        Some(raw) => Some(
            CacheCategory::from_prefix(raw).ok_or_else(|| ApiError::BadRequest(format!("unknown cache category {}", raw)))?,
        ),
    };

    let removed = available(state.cache.clear(category).await)?;
    Ok(Json(json!({
        "success": true,
        "category": category.map(|c| c.prefix()),
        "removed": removed,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_list() {
        assert_eq!(symbol_list(Some("EUR, gbp,,"), &["X"]), vec!["EUR", "gbp"]);
        assert_eq!(symbol_list(Some(" , "), &["X"]), vec!["X"]);
        assert_eq!(symbol_list(None, &["X", "Y"]), vec!["X", "Y"]);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date(Some("2024-01-01")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
        assert!(parse_date(Some("01-01-2024")).is_err());
        assert!(parse_date(None).is_err());
    }
}
