mod handlers;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;

use axum::Router;
use axum::routing::{get, post};
use clap::{Parser, ValueEnum};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use erpmon_core::monitor::{Monitor, MonitorConfig};
use erpmon_core::storage::{MemoryStorage, PgStorage, Storage};
use erpmon_core::util::print_pg_warning;

use state::{SharedState, new_state};

// ============================================================
// CLI
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StorageKind {
    Postgres,
    Memory,
}

#[derive(Parser, Debug)]
#[command(name = "erpmon-web", about = "ERP health monitor web API", version = erpmon_core::VERSION)]
struct Args {
    /// Listen address.
    #[arg(long, default_value = "0.0.0.0:8069", env = "ERPMON_LISTEN")]
    listen: String,

    /// Where history is stored.
    #[arg(long, env = "ERPMON_STORAGE", value_enum, default_value_t = StorageKind::Postgres)]
    storage: StorageKind,

    /// Application log file for manual log refreshes.
    #[arg(long, env = "ERPMON_LOG_FILE", value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Lines read from the end of the log file per refresh.
    #[arg(long, env = "ERPMON_LOG_LINES", default_value = "500")]
    log_lines: usize,

    /// Mount point reported as disk usage.
    #[arg(long, env = "ERPMON_DISK_PATH", default_value = "/")]
    disk_path: PathBuf,

    /// Path to /proc filesystem.
    #[arg(long, default_value = "/proc")]
    proc_path: String,
}

// ============================================================
// Router
// ============================================================

pub(crate) fn app(state: SharedState) -> Router {
    Router::new()
        .route("/api/v1/health", get(handlers::handle_health))
        .route("/api/v1/dashboard", get(handlers::handle_dashboard))
        .route("/api/v1/history/{table}", get(handlers::handle_history))
        .route(
            "/api/v1/config",
            get(handlers::handle_get_config).put(handlers::handle_put_config),
        )
        .route("/api/v1/actions/{action}", post(handlers::handle_action))
        .with_state(state)
}

// ============================================================
// Main
// ============================================================

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("erpmon_web=info,erpmon_core=info")),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(async_main(args)) {
        error!(error = %e, "server stopped");
        process::exit(1);
    }
}

fn open_storage(kind: StorageKind) -> Result<Box<dyn Storage>, String> {
    match kind {
        StorageKind::Memory => {
            warn!("using in-memory storage, history is lost on exit");
            Ok(Box::new(MemoryStorage::new()))
        }
        StorageKind::Postgres => {
            let mut storage = PgStorage::from_env().map_err(|e| e.to_string())?;
            storage.ensure_schema().map_err(|e| e.to_string())?;
            Ok(Box::new(storage))
        }
    }
}

async fn async_main(args: Args) -> std::io::Result<()> {
    info!(version = erpmon_core::VERSION, "starting");

    let kind = args.storage;
    let storage = match tokio::task::spawn_blocking(move || open_storage(kind)).await {
        Ok(Ok(storage)) => storage,
        Ok(Err(e)) => {
            error!(error = %e, "storage unavailable");
            print_pg_warning(&e);
            process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "storage initialization panicked");
            process::exit(1);
        }
    };

    let monitor = Monitor::from_config(&MonitorConfig {
        proc_path: args.proc_path.clone(),
        disk_path: args.disk_path.clone(),
        log_file: args.log_file.clone(),
        log_lines: args.log_lines,
        ..MonitorConfig::default()
    });

    let app = app(new_state(storage, monitor))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new());

    let addr: SocketAddr = args
        .listen
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use erpmon_core::collector::{RefreshStats, SampleError, Sampler};
    use erpmon_core::storage::{Row, ServerMetricSample};
    use serde_json::Value;
    use tower::ServiceExt;

    struct Appending;

    impl Sampler for Appending {
        fn name(&self) -> &'static str {
            "appending"
        }

        fn collect(&mut self, storage: &mut dyn Storage) -> Result<RefreshStats, SampleError> {
            let sample = ServerMetricSample {
                cpu_percent: 82.0,
                ..ServerMetricSample::empty(Utc::now())
            };
            storage.insert(Row::ServerMetrics(sample))?;
            Ok(RefreshStats {
                fetched: 1,
                appended: 1,
                trimmed: 0,
            })
        }
    }

    struct Broken;

    impl Sampler for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn collect(&mut self, _storage: &mut dyn Storage) -> Result<RefreshStats, SampleError> {
            Err(SampleError::Query("permission denied for pg_locks".to_string()))
        }
    }

    fn test_app() -> Router {
        test_app_with(MemoryStorage::new())
    }

    fn test_app_with(storage: MemoryStorage) -> Router {
        let monitor = Monitor::new(
            Box::new(Appending),
            Box::new(Broken),
            Box::new(Broken),
            Box::new(Broken),
        );
        app(new_state(Box::new(storage), monitor))
    }

    fn settings_json(system_logs: &str, cron_logs: &str) -> Value {
        serde_json::json!({
            "system_logs_retention": system_logs,
            "slow_queries_retention": "30",
            "server_metrics_retention": "30",
            "database_locks_retention": "15",
            "cron_logs_retention": cron_logs,
            "auto_cleanup": true
        })
    }

    fn with_field(mut body: Value, key: &str, value: Value) -> Value {
        body[key] = value;
        body
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&test_app(), "GET", "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String("ok".to_string()));
    }

    #[tokio::test]
    async fn test_trigger_then_dashboard() {
        let app = test_app();
        let (status, notice) =
            send(&app, "POST", "/api/v1/actions/collect-metrics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(notice["kind"], "success");
        assert_eq!(notice["sticky"], false);

        let (status, dashboard) = send(&app, "GET", "/api/v1/dashboard", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dashboard["cpu_percent"], 82.0);
        assert_eq!(dashboard["cpu_status"], "critical");
    }

    #[tokio::test]
    async fn test_failed_trigger_returns_danger_notice() {
        let (status, notice) =
            send(&test_app(), "POST", "/api/v1/actions/refresh-locks", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(notice["kind"], "danger");
        assert_eq!(notice["sticky"], true);
        assert!(
            notice["message"]
                .as_str()
                .unwrap()
                .contains("permission denied")
        );
    }

    #[tokio::test]
    async fn test_unknown_action_and_table_are_404() {
        let app = test_app();
        let (status, _) = send(&app, "POST", "/api/v1/actions/reboot", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "GET", "/api/v1/history/users", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_history_listing_respects_limit() {
        let app = test_app();
        for _ in 0..3 {
            send(&app, "POST", "/api/v1/actions/collect-metrics", None).await;
        }
        let (status, rows) =
            send(&app, "GET", "/api/v1/history/server-metrics?limit=2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rows.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_config_defaults_and_update() {
        let app = test_app();
        let (status, config) = send(&app, "GET", "/api/v1/config", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(config["database_locks_retention"], "15");
        assert_eq!(config["auto_cleanup"], true);
        assert_eq!(config["slow_cron_threshold"], 10.0);
        let id = config["id"].clone();

        let update = serde_json::json!({
            "system_logs_retention": "7",
            "slow_queries_retention": "all",
            "server_metrics_retention": "90",
            "database_locks_retention": "15",
            "cron_logs_retention": "30",
            "auto_cleanup": false,
            "slow_query_threshold": 5.0
        });
        let (status, config) = send(&app, "PUT", "/api/v1/config", Some(update)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(config["id"], id);
        assert_eq!(config["slow_queries_retention"], "all");
        assert_eq!(config["auto_cleanup"], false);
        assert_eq!(config["slow_query_threshold"], 5.0);
    }

    #[tokio::test]
    async fn test_invalid_threshold_changes_nothing() {
        let app = test_app();
        let update = with_field(
            settings_json("7", "30"),
            "slow_cron_threshold",
            serde_json::json!(-1.0),
        );
        let (status, _) = send(&app, "PUT", "/api/v1/config", Some(update)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, config) = send(&app, "GET", "/api/v1/config", None).await;
        assert_eq!(config["slow_cron_threshold"], 10.0);
        assert_eq!(config["system_logs_retention"], "30");
    }

    #[tokio::test]
    async fn test_invalid_retention_changes_nothing() {
        let app = test_app();
        let update = with_field(
            settings_json("30", "3"),
            "slow_query_threshold",
            serde_json::json!(9.0),
        );
        let (status, _) = send(&app, "PUT", "/api/v1/config", Some(update)).await;
        assert_ne!(status, StatusCode::OK);

        let (_, config) = send(&app, "GET", "/api/v1/config", None).await;
        assert_eq!(config["slow_query_threshold"], 2.0);
        assert_eq!(config["cron_logs_retention"], "30");
    }

    #[tokio::test]
    async fn test_cron_history_reports_slow_flag() {
        use chrono::TimeZone;
        use erpmon_core::storage::{CronExecutionRecord, CronStatus};

        let mut storage = MemoryStorage::new();
        for (minute, duration_seconds) in [(0, 12.0), (1, 0.5)] {
            storage
                .insert(Row::CronExecution(CronExecutionRecord {
                    id: 0,
                    cron_job_ref: "collect-metrics".to_string(),
                    cron_name: "Collect server metrics".to_string(),
                    execution_date: Utc.with_ymd_and_hms(2026, 1, 18, 12, minute, 0).unwrap(),
                    duration_seconds,
                    status: CronStatus::Success,
                    error_message: None,
                }))
                .unwrap();
        }
        let app = test_app_with(storage);

        let (status, rows) = send(&app, "GET", "/api/v1/history/cron-logs", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rows[0]["duration_seconds"], 0.5);
        assert_eq!(rows[0]["is_slow"], false);
        assert_eq!(rows[1]["duration_seconds"], 12.0);
        assert_eq!(rows[1]["is_slow"], true);

        let update = with_field(
            settings_json("30", "30"),
            "slow_cron_threshold",
            serde_json::json!(15.0),
        );
        let (status, _) = send(&app, "PUT", "/api/v1/config", Some(update)).await;
        assert_eq!(status, StatusCode::OK);

        let (_, rows) = send(&app, "GET", "/api/v1/history/cron-logs", None).await;
        assert_eq!(rows[1]["is_slow"], false);

        send(&app, "POST", "/api/v1/actions/collect-metrics", None).await;
        let (_, rows) = send(&app, "GET", "/api/v1/history/server-metrics", None).await;
        assert!(rows[0].get("is_slow").is_none());
    }
}
