//! HTTP request handlers: dashboard, history listings, retention settings
//! and manual triggers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use erpmon_core::dashboard::{self, Dashboard};
use erpmon_core::monitor::Action;
use erpmon_core::notice::Notice;
use erpmon_core::params::{self, ParamError, ThresholdChange};
use erpmon_core::retention::{self, RetentionConfig, RetentionError, RetentionSettings};
use erpmon_core::storage::{CronExecutionView, Row, StorageError, Table};

use crate::state::{ApiError, AppState, with_inner};

/// Rows returned by a history listing when no limit is given.
pub(crate) const DEFAULT_HISTORY_LIMIT: usize = 100;
/// Upper bound on a history listing.
pub(crate) const MAX_HISTORY_LIMIT: usize = 1000;

fn internal(e: StorageError) -> ApiError {
    error!(error = %e, "storage error");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

// ============================================================
// Health
// ============================================================

pub(crate) async fn handle_health() -> &'static str {
    "ok"
}

// ============================================================
// Dashboard
// ============================================================

pub(crate) async fn handle_dashboard(State(state): AppState) -> Result<Json<Dashboard>, ApiError> {
    with_inner(state, |inner| {
        dashboard::compute(inner.storage.as_mut()).map_err(internal)
    })
    .await
    .map(Json)
}

// ============================================================
// History
// ============================================================

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryQuery {
    limit: Option<usize>,
}

/// A listed history row. Cron executions carry their slow flag.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum HistoryEntry {
    Cron(CronExecutionView),
    Row(Row),
}

pub(crate) async fn handle_history(
    State(state): AppState,
    Path(table): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let table: Table = table
        .parse()
        .map_err(|e: String| (StatusCode::NOT_FOUND, e))?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);

    with_inner(state, move |inner| {
        let storage = inner.storage.as_mut();
        let rows = storage.list(table, limit).map_err(internal)?;
        if table != Table::CronLogs {
            return Ok(rows.into_iter().map(HistoryEntry::Row).collect());
        }
        let threshold = params::slow_cron_threshold(storage).map_err(internal)?;
        Ok(rows
            .into_iter()
            .map(|row| match row {
                Row::CronExecution(record) => HistoryEntry::Cron(record.into_view(threshold)),
                other => HistoryEntry::Row(other),
            })
            .collect())
    })
    .await
    .map(Json)
}

// ============================================================
// Configuration
// ============================================================

#[derive(Debug, Serialize)]
pub(crate) struct ConfigView {
    #[serde(flatten)]
    retention: RetentionConfig,
    slow_cron_threshold: f64,
    slow_query_threshold: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConfigUpdate {
    #[serde(flatten)]
    settings: RetentionSettings,
    slow_cron_threshold: Option<f64>,
    slow_query_threshold: Option<f64>,
}

fn load_config(inner: &mut crate::state::WebAppInner) -> Result<ConfigView, ApiError> {
    let storage = inner.storage.as_mut();
    Ok(ConfigView {
        retention: retention::get_or_create_config(storage).map_err(internal)?,
        slow_cron_threshold: params::slow_cron_threshold(storage).map_err(internal)?,
        slow_query_threshold: params::slow_query_threshold(storage).map_err(internal)?,
    })
}

impl ConfigUpdate {
    /// Validated threshold changes requested by the update.
    fn thresholds(&self) -> Result<Vec<ThresholdChange>, ParamError> {
        let mut changes = Vec::new();
        if let Some(seconds) = self.slow_cron_threshold {
            changes.push(ThresholdChange::slow_cron(seconds)?);
        }
        if let Some(seconds) = self.slow_query_threshold {
            changes.push(ThresholdChange::slow_query(seconds)?);
        }
        Ok(changes)
    }
}

fn retention_error(e: RetentionError) -> ApiError {
    match e {
        RetentionError::Storage(e) => internal(e),
        other => (StatusCode::BAD_REQUEST, other.to_string()),
    }
}

fn param_error(e: ParamError) -> ApiError {
    match e {
        ParamError::InvalidThreshold(_) => (StatusCode::BAD_REQUEST, e.to_string()),
        ParamError::Storage(e) => internal(e),
    }
}

pub(crate) async fn handle_get_config(State(state): AppState) -> Result<Json<ConfigView>, ApiError> {
    with_inner(state, load_config).await.map(Json)
}

pub(crate) async fn handle_put_config(
    State(state): AppState,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<ConfigView>, ApiError> {
    let thresholds = update.thresholds().map_err(param_error)?;
    update.settings.validate().map_err(retention_error)?;

    with_inner(state, move |inner| {
        retention::update_config_with_thresholds(
            inner.storage.as_mut(),
            update.settings,
            &thresholds,
        )
        .map_err(retention_error)?;
        info!("configuration updated");
        load_config(inner)
    })
    .await
    .map(Json)
}

// ============================================================
// Manual triggers
// ============================================================

pub(crate) async fn handle_action(
    State(state): AppState,
    Path(action): Path<String>,
) -> Result<Json<Notice>, ApiError> {
    let action: Action = action
        .parse()
        .map_err(|e: String| (StatusCode::NOT_FOUND, e))?;

    with_inner(state, move |inner| {
        let notice = inner.monitor.trigger(action, inner.storage.as_mut());
        info!(%action, success = notice.is_success(), "manual trigger");
        Ok(notice)
    })
    .await
    .map(Json)
}
