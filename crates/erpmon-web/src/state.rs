//! Shared application state.

use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::State;
use axum::http::StatusCode;

use erpmon_core::monitor::Monitor;
use erpmon_core::storage::Storage;

pub(crate) struct WebAppInner {
    pub(crate) storage: Box<dyn Storage>,
    /// Samplers used by manual triggers.
    pub(crate) monitor: Monitor,
}

/// Requests are serialized through one lock: the storage backends hold a
/// single synchronous connection.
pub(crate) type SharedState = Arc<Mutex<WebAppInner>>;

pub(crate) type AppState = State<SharedState>;

pub(crate) type ApiError = (StatusCode, String);

pub(crate) fn new_state(storage: Box<dyn Storage>, monitor: Monitor) -> SharedState {
    Arc::new(Mutex::new(WebAppInner { storage, monitor }))
}

/// Runs `f` with the locked state on the blocking thread pool.
pub(crate) async fn with_inner<T, F>(state: SharedState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&mut WebAppInner) -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        // Poisoning is ignored: storage calls are self-contained.
        let mut inner = state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut inner)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
}
