//! Interaction counters for a piece of content, the table being migrated.

use crate::Envelope;
use axum::{
    Router,
    extract::{State, rejection::JsonRejection},
    response::Json,
    routing::post,
};
use migrator_db::{ConnPool, DbResult, Record, Row, Value};
use migrator_types::Entity;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, warn};

pub const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS interactives (
    id INTEGER PRIMARY KEY,
    biz TEXT NOT NULL,
    biz_id INTEGER NOT NULL,
    read_cnt INTEGER NOT NULL DEFAULT 0,
    like_cnt INTEGER NOT NULL DEFAULT 0,
    collect_cnt INTEGER NOT NULL DEFAULT 0,
    ctime INTEGER NOT NULL,
    utime INTEGER NOT NULL,
    UNIQUE (biz_id, biz)
);";

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Interactive {
    pub id: i64,
    pub biz: String,
    pub biz_id: i64,
    pub read_cnt: i64,
    pub like_cnt: i64,
    pub collect_cnt: i64,
    pub ctime: i64,
    pub utime: i64,
}

impl Entity for Interactive {
    fn id(&self) -> i64 {
        self.id
    }

    fn equal(&self, other: &Self) -> bool {
        self == other
    }
}

impl Record for Interactive {
    const TABLE: &'static str = "interactives";

    fn from_row(row: &Row) -> DbResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            biz: row.get("biz")?,
            biz_id: row.get("biz_id")?,
            read_cnt: row.get("read_cnt")?,
            like_cnt: row.get("like_cnt")?,
            collect_cnt: row.get("collect_cnt")?,
            ctime: row.get("ctime")?,
            utime: row.get("utime")?,
        })
    }
}

/// Bumps the read counter of `(biz, biz_id)`, creating the row on first
/// read. `now` is stored as the update time (and creation time for new rows).
pub fn incr_read_cnt(pool: &dyn ConnPool, biz: &str, biz_id: i64, now: i64) -> DbResult<()> {
    pool.exec(
        "INSERT INTO interactives (biz, biz_id, read_cnt, ctime, utime)
         VALUES (?1, ?2, 1, ?3, ?3)
         ON CONFLICT (biz_id, biz) DO UPDATE SET
             read_cnt = read_cnt + 1,
             utime = excluded.utime",
        &[
            Value::Text(biz.to_string()),
            Value::Integer(biz_id),
            Value::Integer(now),
        ],
    )?;
    Ok(())
}

// ── Business endpoint ────────────────────────────────────────────

/// Body of `POST /interactive/read`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ReadRequest {
    pub biz: String,
    pub biz_id: i64,
}

/// Serves the interactive writes through `pool`, normally a
/// [`DualWritePool`](migrator_db::DualWritePool) so every write follows the
/// current migration stage.
pub fn build_router(pool: Arc<dyn ConnPool>) -> Router {
    Router::new()
        .route("/interactive/read", post(read))
        .with_state(pool)
}

async fn read(
    State(pool): State<Arc<dyn ConnPool>>,
    body: Result<Json<ReadRequest>, JsonRejection>,
) -> Json<Envelope<String>> {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            warn!(error = %rejection, "bad read request");
            return Json(Envelope::bad_request(rejection.body_text()));
        }
    };
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64);
    let res = tokio::task::spawn_blocking(move || {
        incr_read_cnt(&*pool, &req.biz, req.biz_id, now)
    })
    .await;
    match res {
        Ok(Ok(())) => Json(Envelope::ok("success".to_string())),
        Ok(Err(e)) => {
            error!(error = %e, "read count update failed");
            Json(Envelope::system_error())
        }
        Err(e) => {
            error!(error = %e, "read count task failed");
            Json(Envelope::system_error())
        }
    }
}
