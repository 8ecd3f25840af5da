//! The read-only dashboard: `GET /` serves a small polling page, `GET
//! /api/stats` and `GET /api/jobs` back it (and anything else that wants the
//! same data as JSON). Nothing here mutates a job — enqueue/cancel/retry
//! stay CLI-only.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use queuectl_core::{Job, JobManager};

struct ApiError(String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.0).into_response()
    }
}

impl From<queuectl_core::QueueError> for ApiError {
    fn from(err: queuectl_core::QueueError) -> Self {
        ApiError(err.to_string())
    }
}

pub fn router(manager: Arc<JobManager>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/jobs", get(jobs_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(manager)
}

pub async fn serve(manager: Arc<JobManager>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(manager);
    tracing::info!(%addr, "dashboard listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn stats_handler(
    State(manager): State<Arc<JobManager>>,
) -> Result<Json<queuectl_core::Stats>, ApiError> {
    Ok(Json(manager.get_stats().await?))
}

const RECENT_JOBS_LIMIT: usize = 50;

/// `Job` plus the two display-only facts the dashboard needs and the job
/// record itself doesn't carry: how old it is and whether it's done.
#[derive(Serialize)]
struct JobView {
    #[serde(flatten)]
    job: Job,
    age_seconds: f64,
    is_terminal: bool,
}

async fn jobs_handler(
    State(manager): State<Arc<JobManager>>,
) -> Result<Json<Vec<JobView>>, ApiError> {
    let now = Utc::now();
    let jobs = manager.list_jobs(None, RECENT_JOBS_LIMIT).await?;
    Ok(Json(
        jobs.into_iter()
            .map(|job| {
                let age_seconds = job.age(now).num_milliseconds() as f64 / 1000.0;
                let is_terminal = job.is_terminal();
                JobView { job, age_seconds, is_terminal }
            })
            .collect(),
    ))
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>queuectl dashboard</title>
    <style>
        body { font-family: system-ui, sans-serif; margin: 2rem; background: #111; color: #eee; }
        h1 { margin-bottom: 0.25rem; }
        table { border-collapse: collapse; width: 100%; margin-top: 1rem; }
        th, td { text-align: left; padding: 0.4rem 0.6rem; border-bottom: 1px solid #333; font-size: 0.9rem; }
        th { color: #888; font-weight: 600; }
        .stats { display: flex; gap: 1.5rem; margin-top: 0.5rem; color: #aaa; }
        .stats b { color: #eee; }
        code { background: #222; padding: 0.1rem 0.3rem; border-radius: 3px; }
    </style>
</head>
<body>
    <h1>queuectl</h1>
    <div class="stats" id="stats"></div>
    <table>
        <thead><tr><th>id</th><th>state</th><th>priority</th><th>command</th><th>age</th><th>updated_at</th></tr></thead>
        <tbody id="jobs"></tbody>
    </table>
    <script>
        async function refresh() {
            const [stats, jobs] = await Promise.all([
                fetch('/api/stats').then(r => r.json()),
                fetch('/api/jobs').then(r => r.json()),
            ]);
            document.getElementById('stats').innerHTML =
                `<span>pending <b>${stats.pending}</b></span>` +
                `<span>running <b>${stats.running}</b></span>` +
                `<span>completed <b>${stats.completed}</b></span>` +
                `<span>failed <b>${stats.failed}</b></span>` +
                `<span>dlq <b>${stats.dlq}</b></span>` +
                `<span>success rate <b>${stats.success_rate.toFixed(1)}%</b></span>`;
            document.getElementById('jobs').innerHTML = jobs.map(j =>
                `<tr><td><code>${j.id.slice(0, 8)}</code></td><td>${j.state}</td>` +
                `<td>${j.priority}</td><td><code>${j.command}</code></td>` +
                `<td>${j.age_seconds.toFixed(0)}s${j.is_terminal ? '' : ' (running)'}</td>` +
                `<td>${j.updated_at}</td></tr>`
            ).join('');
        }
        refresh();
        setInterval(refresh, 5000);
    </script>
</body>
</html>"#;

#[cfg(test)]
mod tests {
    use super::*;
    use queuectl_testing::{InMemoryStore, TestClock};

    #[tokio::test]
    async fn stats_endpoint_reflects_the_store() {
        let clock = Arc::new(TestClock::default());
        let store = Arc::new(InMemoryStore::new());
        let manager = Arc::new(JobManager::new(store, clock));
        manager
            .enqueue("echo hi".to_string(), 3, 0, None, None)
            .await
            .unwrap();

        let stats = stats_handler(State(manager)).await.unwrap().0;
        assert_eq!(stats.total, 1);
        assert_eq!(stats.pending, 1);
    }
}
