use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Query params for `GET /api/traders` and the competition/comparison
/// views, scoping the result to one user's traders (§4.F user-scoping).
#[derive(Debug, Deserialize, Default)]
pub struct UserScopeQuery {
    pub user: Option<String>,
}

/// Query params for `GET /api/traders/:id/decisions` (§4.G "read by index
/// or time range"). `from`/`to` take precedence over `limit` when both are
/// present; `limit` defaults to the most recent 50 cycles.
#[derive(Debug, Deserialize)]
pub struct DecisionLogQuery {
    pub limit: Option<i64>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl Default for DecisionLogQuery {
    fn default() -> Self {
        Self { limit: Some(50), from: None, to: None }
    }
}
