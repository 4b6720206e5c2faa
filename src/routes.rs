use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::{headers::Cookie, TypedHeader};
use http::{header::SET_COOKIE, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::PathBuf, sync::Arc, time::Duration};
use tower_http::services::ServeDir;
use uuid::Uuid;

use crate::{
    error::AppError,
    render::{self, QuizRegion},
    session::{HistoryEntry, Outcome, Progress, SessionStore},
    storage::ObjectStore,
    workflow::WorkflowClient,
};

pub const SESSION_COOKIE: &str = "kbv_session";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub workflow: WorkflowClient,
    pub sessions: Arc<SessionStore>,
    pub presign_ttl: Duration,
}

pub fn router(state: AppState, static_dir: PathBuf) -> Router {
    Router::new()
        // page
        .route("/", get(index))
        .route("/search", get(search))
        // quiz interaction
        .route("/api/quiz/:item_id/answer", post(answer))
        .route("/api/quiz/:item_id/progress", get(progress))
        .route("/api/history", get(history))
        .nest_service("/static", ServeDir::new(static_dir))
        .with_state(state)
}

#[derive(Deserialize, Debug, Default)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct AnswerReq {
    pub question: usize,
    pub option: u32,
}

#[derive(Serialize, Debug)]
pub struct AnswerRes {
    pub outcome: Outcome,
    pub progress: Progress,
}

fn session_id(cookie: &Option<TypedHeader<Cookie>>) -> Option<Uuid> {
    cookie
        .as_ref()
        .and_then(|TypedHeader(c)| c.get(SESSION_COOKIE))
        .and_then(|v| Uuid::parse_str(v).ok())
}

fn with_session_cookie(
    mut res: Response,
    id: Uuid,
    created: bool,
) -> Result<Response, (StatusCode, String)> {
    if created {
        let v = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id);
        res.headers_mut()
            .insert(SET_COOKIE, HeaderValue::from_str(&v).map_err(e500)?);
    }
    Ok(res)
}

async fn index(
    State(st): State<AppState>,
    cookie: Option<TypedHeader<Cookie>>,
) -> Result<Response, (StatusCode, String)> {
    let (sid, created) = st.sessions.open(session_id(&cookie));
    let history = st
        .sessions
        .with(sid, |s| s.history().to_vec())
        .unwrap_or_default();
    let page = render::search_page(None, &history, "");
    with_session_cookie(Html(page).into_response(), sid, created)
}

async fn search(
    State(st): State<AppState>,
    cookie: Option<TypedHeader<Cookie>>,
    Query(params): Query<SearchParams>,
) -> Result<Response, (StatusCode, String)> {
    let (sid, created) = st.sessions.open(session_id(&cookie));
    let query = params.q.trim();

    let (status, content) = if query.is_empty() {
        (StatusCode::OK, String::new())
    } else {
        match st.workflow.run(query).await {
            Err(e) => {
                tracing::error!(error = %e, "workflow run failed");
                st.sessions.with(sid, |s| s.retain_quizzes(&HashSet::new()));
                (StatusCode::BAD_GATEWAY, render::error_banner(&e.to_string()))
            }
            Ok(items) => {
                tracing::info!(results = items.len(), "workflow run succeeded");
                let count = items.len();
                let mut prepared = Vec::with_capacity(count);
                for (item_id, item) in items.into_iter().enumerate() {
                    prepared.push(render::prepare_item(&*st.store, st.presign_ttl, item_id, item).await);
                }
                let body = st
                    .sessions
                    .with(sid, |s| {
                        let views: Vec<_> = prepared.into_iter().map(|p| p.attach(s)).collect();
                        let live: HashSet<usize> = views
                            .iter()
                            .filter(|v| matches!(v.quiz, QuizRegion::Ready(_)))
                            .map(|v| v.item_id)
                            .collect();
                        s.retain_quizzes(&live);
                        s.record_query(query, count);
                        views.iter().map(render::item_html).collect::<String>()
                    })
                    .ok_or_else(|| e500("session vanished"))?;
                (StatusCode::OK, body)
            }
        }
    };

    let history = st
        .sessions
        .with(sid, |s| s.history().to_vec())
        .unwrap_or_default();
    let page = render::search_page(Some(query), &history, &content);
    with_session_cookie((status, Html(page)).into_response(), sid, created)
}

async fn answer(
    State(st): State<AppState>,
    cookie: Option<TypedHeader<Cookie>>,
    Path(item_id): Path<usize>,
    Json(req): Json<AnswerReq>,
) -> Result<Json<AnswerRes>, (StatusCode, String)> {
    let sid = session_id(&cookie).ok_or(e404("no session"))?;
    let (outcome, progress) = st
        .sessions
        .with(sid, |s| s.select_option(item_id, req.question, req.option))
        .ok_or(e404("no session"))?
        .map_err(reject)?;
    Ok(Json(AnswerRes { outcome, progress }))
}

async fn progress(
    State(st): State<AppState>,
    cookie: Option<TypedHeader<Cookie>>,
    Path(item_id): Path<usize>,
) -> Result<Json<Progress>, (StatusCode, String)> {
    let sid = session_id(&cookie).ok_or(e404("no session"))?;
    st.sessions
        .with(sid, |s| s.progress(item_id))
        .ok_or(e404("no session"))?
        .map(Json)
        .map_err(reject)
}

async fn history(
    State(st): State<AppState>,
    cookie: Option<TypedHeader<Cookie>>,
) -> Json<Vec<HistoryEntry>> {
    let entries = session_id(&cookie)
        .and_then(|sid| st.sessions.with(sid, |s| s.history().to_vec()))
        .unwrap_or_default();
    Json(entries)
}

// --- helpers ---
fn reject(e: AppError) -> (StatusCode, String) {
    match e {
        AppError::QuizNotFound(_) => e404(e.to_string()),
        AppError::QuestionOutOfRange { .. } => e400(e.to_string()),
        other => e500(other),
    }
}

fn e400<T: Into<String>>(msg: T) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, msg.into())
}

fn e404<T: Into<String>>(msg: T) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, msg.into())
}

fn e500<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    tracing::error!(error=%e, "internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
