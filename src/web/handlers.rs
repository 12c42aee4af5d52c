use super::{Result, WebError};
use crate::canonical::canonicalize_uri;
use crate::core::QuestionSnapshot;
use crate::counter::CounterStore;
use crate::quiz::QuizManager;
use crate::rolling::RollingLog;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub counters: Arc<CounterStore>,
    pub quizzes: Arc<QuizManager>,
    pub recent: Arc<Mutex<RollingLog>>,
    /// Realm that `/log` reads and increments.
    pub hit_realm: String,
}

impl AppState {
    pub fn new(counters: Arc<CounterStore>, quizzes: Arc<QuizManager>, recent: RollingLog) -> Self {
        let hit_realm = counters
            .config()
            .auto_realm
            .clone()
            .unwrap_or_else(|| crate::config::DEFAULT_AUTO_REALM.to_string());
        Self {
            counters,
            quizzes,
            recent: Arc::new(Mutex::new(recent)),
            hit_realm,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/log", get(read_hit).post(record_hit))
        .route("/stats", get(stats))
        .route("/recent", get(recent))
        .route("/quiz", get(quiz_ids))
        .route("/quiz/submit", post(submit_answer))
        .route("/quiz/:id", get(quiz_results))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    uri: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisitResult {
    #[serde(rename = "CanonicalURI")]
    pub canonical_uri: String,
    #[serde(rename = "Count")]
    pub count: u64,
}

fn canonical_key(query: LogQuery) -> Result<String> {
    let uri = query
        .uri
        .filter(|uri| !uri.is_empty())
        .ok_or_else(|| WebError::Input("No Uri".to_string()))?;
    canonicalize_uri(&uri).map_err(|err| {
        warn!(uri = %uri, "bad uri");
        WebError::Input(format!("bad uri {:?}: {}", uri, err))
    })
}

async fn read_hit(State(state): State<AppState>, Query(query): Query<LogQuery>) -> Result<Json<VisitResult>> {
    let key = canonical_key(query)?;
    let count = state
        .counters
        .get(&state.hit_realm, &key)
        .await
        .map(|record| record.count)
        .unwrap_or(0);
    Ok(Json(VisitResult {
        canonical_uri: key,
        count,
    }))
}

async fn record_hit(State(state): State<AppState>, Query(query): Query<LogQuery>) -> Result<Json<VisitResult>> {
    let key = canonical_key(query)?;
    let record = state.counters.update(&state.hit_realm, &key).await;
    if !record.is_zero() {
        state.recent.lock().await.add_entry(&key);
    }
    info!(uri = %key, count = record.count, "hit");
    Ok(Json(VisitResult {
        canonical_uri: key,
        count: record.count,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    realm: Option<String>,
}

async fn stats(State(state): State<AppState>, Query(query): Query<StatsQuery>) -> Result<impl IntoResponse> {
    let realm = query.realm.unwrap_or_else(|| state.hit_realm.clone());
    let body = state.counters.dump_realm(&realm).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body))
}

async fn recent(State(state): State<AppState>) -> Json<BTreeMap<String, usize>> {
    Json(state.recent.lock().await.counts())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitRequest {
    #[serde(rename = "QuizID")]
    pub quiz_id: String,
    #[serde(rename = "Question")]
    pub question: i64,
    #[serde(rename = "AnswerID")]
    pub answer_id: String,
}

async fn submit_answer(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<QuestionSnapshot>> {
    let snapshot = state
        .quizzes
        .submit_answer(&request.quiz_id, request.question, &request.answer_id)
        .await?;
    Ok(Json(snapshot))
}

async fn quiz_ids(State(state): State<AppState>) -> Json<BTreeSet<String>> {
    Json(state.quizzes.quiz_ids().await)
}

async fn quiz_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<QuestionSnapshot>>> {
    Ok(Json(state.quizzes.results(&id).await?))
}
