//! HTTP control plane for a dual-write migration.
//!
//! Every response is HTTP 200 with an [`Envelope`]; the `code` field says
//! whether the operation went through.

pub mod interactive;

use axum::{
    Router,
    extract::{State, rejection::JsonRejection},
    response::Json,
    routing::{get, post},
};
use migrator_db::Record;
use migrator_reconcile::{ReconcileResult, Scheduler};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

pub const CODE_OK: i32 = 0;
pub const CODE_BAD_REQUEST: i32 = 4;
pub const CODE_SYSTEM_ERROR: i32 = 5;

/// Response body shared by every control endpoint.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Envelope<T> {
    pub code: i32,
    pub msg: String,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: CODE_OK,
            msg: "OK".to_string(),
            data: Some(data),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            code: CODE_BAD_REQUEST,
            msg: msg.into(),
            data: None,
        }
    }

    pub fn system_error() -> Self {
        Self {
            code: CODE_SYSTEM_ERROR,
            msg: "system error".to_string(),
            data: None,
        }
    }
}

/// Body of `POST /incr/start`. `interval` is in milliseconds; zero runs a
/// single pass.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct IncrStartRequest {
    pub utime: i64,
    pub interval: i64,
}

type Reply = Json<Envelope<String>>;

/// Builds the control router for `scheduler`, nested under `prefix`.
pub fn build_router<T: Record>(scheduler: Arc<Scheduler<T>>, prefix: &str) -> Router {
    let routes = Router::new()
        .route("/status", get(status::<T>))
        .route("/next", post(next::<T>))
        .route("/prev", post(prev::<T>))
        .route("/full/start", post(full_start::<T>))
        .route("/full/stop", post(full_stop::<T>))
        .route("/incr/start", post(incr_start::<T>))
        .route("/incr/stop", post(incr_stop::<T>))
        .with_state(scheduler);

    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        routes
    } else {
        Router::new().nest(&format!("/{prefix}"), routes)
    }
}

async fn status<T: Record>(State(scheduler): State<Arc<Scheduler<T>>>) -> Reply {
    Json(Envelope::ok(scheduler.pattern().to_string()))
}

async fn next<T: Record>(State(scheduler): State<Arc<Scheduler<T>>>) -> Reply {
    Json(Envelope::ok(scheduler.next().to_string()))
}

async fn prev<T: Record>(State(scheduler): State<Arc<Scheduler<T>>>) -> Reply {
    Json(Envelope::ok(scheduler.prev().to_string()))
}

async fn full_start<T: Record>(State(scheduler): State<Arc<Scheduler<T>>>) -> Reply {
    started("full", scheduler.start_full_validation().map(drop))
}

async fn full_stop<T: Record>(State(scheduler): State<Arc<Scheduler<T>>>) -> Reply {
    scheduler.stop_full_validation();
    success()
}

async fn incr_start<T: Record>(
    State(scheduler): State<Arc<Scheduler<T>>>,
    body: Result<Json<IncrStartRequest>, JsonRejection>,
) -> Reply {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            warn!(error = %rejection, "bad incremental validation request");
            return Json(Envelope::bad_request(rejection.body_text()));
        }
    };
    let Ok(interval) = u64::try_from(req.interval) else {
        return Json(Envelope::bad_request("interval must not be negative"));
    };
    let res = scheduler
        .start_increment_validation(req.utime, Duration::from_millis(interval))
        .map(drop);
    started("incremental", res)
}

async fn incr_stop<T: Record>(State(scheduler): State<Arc<Scheduler<T>>>) -> Reply {
    scheduler.stop_increment_validation();
    success()
}

fn started(kind: &'static str, res: ReconcileResult<()>) -> Reply {
    match res {
        Ok(()) => success(),
        Err(e) => {
            error!(kind, error = %e, "failed to start validation");
            Json(Envelope::system_error())
        }
    }
}

fn success() -> Reply {
    Json(Envelope::ok("success".to_string()))
}
