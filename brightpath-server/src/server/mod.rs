mod acl;
pub mod auth;
mod config;

use std::sync::Arc;

use crate::media::{MediaError, MediaHost};
use crate::server::auth::AuthCtx;
use crate::storage::{StorageError, models};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::response::Response as AxumResponse;
use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::{Method, StatusCode, header},
    routing::{get, post, put},
};
use bcrypt::verify;
use brightpath_shared::api;
use brightpath_shared::domain::{
    ChildId, MAX_XP_AWARD, ModuleId, ProgressStatus, TaskStatus, XpOutcome,
};
pub use config::{AppConfig, MediaConfig, Role, UserConfig};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Span, info_span};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: crate::storage::Store,
    pub media: Option<Arc<dyn MediaHost>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: crate::storage::Store,
        media: Option<Arc<dyn MediaHost>>,
    ) -> Self {
        Self {
            config,
            store,
            media,
        }
    }
}

#[derive(Clone, Debug)]
struct ReqId(pub String);

pub fn router(state: AppState) -> Router {
    let private = Router::new()
        .route("/api/v1/children", get(api_list_children))
        .route("/api/v1/children/link", post(api_link_child))
        .route("/api/v1/modules", get(api_list_modules))
        .route(
            "/api/v1/children/{id}/assignments",
            get(api_list_assignments).post(api_assign_module),
        )
        .route(
            "/api/v1/children/{id}/progress/{module_id}",
            put(api_save_progress),
        )
        .route(
            "/api/v1/children/{id}/tasks",
            get(api_list_tasks).post(api_create_task),
        )
        .route("/api/v1/children/{id}/tasks/{task_id}", put(api_toggle_task))
        .route("/api/v1/children/{id}/xp", post(api_award_xp))
        .route("/api/v1/children/{id}/avatar", post(api_upload_avatar))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            acl::enforce_acl,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ))
        .layer(middleware::from_fn(set_auth_span_fields));

    // Trace with request context (method, path, request_id)
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        let request_id = req
            .extensions()
            .get::<ReqId>()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = %request_id,
            username = tracing::field::Empty,
            role = tracing::field::Empty,
            child_id = tracing::field::Empty
        )
    });

    let app = Router::new()
        .route("/healthz", get(health))
        .route("/api/v1/auth/login", post(api_auth_login))
        .merge(private)
        .with_state(state.clone())
        .layer(trace)
        .layer(middleware::from_fn(add_security_headers))
        .layer(middleware::from_fn(add_request_id));

    // Optionally add CORS for dev if configured

    if let Some(origin) = &state.config.dev_cors_origin {
        let hv = header::HeaderValue::from_str(origin)
            .unwrap_or(header::HeaderValue::from_static("http://localhost:5173"));
        let cors = CorsLayer::new()
            .allow_origin(hv)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
        app.layer(cors)
    } else {
        app
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn add_request_id(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let hdr = HeaderName::from_static("x-request-id");
    // Use provided x-request-id if present, else generate
    let rid = req
        .headers()
        .get(&hdr)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    // Put into request extensions for trace layer & handlers
    req.extensions_mut().insert(ReqId(rid.clone()));
    let mut resp = next.run(req).await;
    if let Ok(hv) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert(hdr, hv);
    }
    Ok(resp)
}

async fn add_security_headers(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let path = req.uri().path().to_string();
    let mut resp = next.run(req).await;

    // General security headers for all responses
    let headers = resp.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("SAMEORIGIN"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );

    // Disable caching for API and health endpoints
    if path == "/healthz" || path.starts_with("/api/") {
        headers.insert(
            HeaderName::from_static("cache-control"),
            HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
        );
        headers.insert(
            HeaderName::from_static("pragma"),
            HeaderValue::from_static("no-cache"),
        );
    }

    Ok(resp)
}

async fn set_auth_span_fields(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    if let Some(auth) = req.extensions().get::<AuthCtx>() {
        let span = Span::current();
        span.record("username", tracing::field::display(&auth.claims.sub));
        span.record("role", tracing::field::debug(&auth.claims.role));
        if let Some(cid) = &auth.claims.child_id {
            span.record("child_id", tracing::field::display(cid));
        }
    }
    Ok(next.run(req).await)
}

async fn api_auth_login(
    State(state): State<AppState>,
    Json(body): Json<api::AuthReq>,
) -> Result<Json<api::AuthResp>, AppError> {
    // Find user in config
    let user = state
        .config
        .users
        .iter()
        .find(|u| u.username == body.username)
        .ok_or_else(|| {
            tracing::warn!(username=%body.username, "login: unknown username");
            AppError::unauthorized()
        })?;
    if !verify(&body.password, &user.password_hash).map_err(|e| {
        tracing::error!(username=%body.username, error=%e, "login: bcrypt verify failed");
        AppError::internal(e)
    })? {
        tracing::warn!(username=%body.username, "login: invalid password");
        return Err(AppError::unauthorized());
    }
    // For child role, ensure child_id provided
    if user.role == Role::Child && user.child_id.is_none() {
        tracing::error!(username=%body.username, "login: child user missing child_id in config");
        return Err(AppError::internal("child user missing child_id"));
    }
    let token =
        auth::issue_jwt_for_user(&state, &user.username, user.role, user.child_id.clone()).await?;
    Ok(Json(api::AuthResp { token }))
}

async fn api_list_children(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::ChildDto>>, AppError> {
    // ACL enforced by middleware; only linked children are listed
    let rows = state
        .store
        .list_children_for_parent(&auth.claims.sub)
        .await
        .map_err(AppError::internal)?;
    let items = rows.into_iter().map(child_dto).collect();
    Ok(Json(items))
}

async fn api_link_child(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::LinkChildReq>,
) -> Result<Json<api::LinkChildResp>, AppError> {
    let email = body.child_email.trim();
    if email.is_empty() {
        return Err(AppError::bad_request("child_email required"));
    }

    let child = state
        .store
        .find_child_by_email(email)
        .await
        .map_err(AppError::internal)?;
    let Some(child) = child else {
        // An email belonging to a non-child account is a distinct failure
        // from an unknown email
        if state
            .config
            .users
            .iter()
            .any(|u| u.email.as_deref() == Some(email))
        {
            return Err(AppError::invalid_role("account with that email is not a child"));
        }
        return Err(AppError::not_found(format!("no child with email: {}", email)));
    };

    let link = state.store.link_child(&auth.claims.sub, &child.id).await?;
    tracing::info!(parent=%auth.claims.sub, child=%link.child_id, "linked child");
    Ok(Json(api::LinkChildResp {
        child_id: ChildId(link.child_id),
    }))
}

async fn api_list_modules(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::ModuleDto>>, AppError> {
    let rows = state
        .store
        .list_published_modules()
        .await
        .map_err(AppError::internal)?;
    let items = rows
        .into_iter()
        .map(|m| api::ModuleDto {
            id: ModuleId(m.id),
            title: m.title,
            lesson_count: m.lesson_count,
        })
        .collect();
    Ok(Json(items))
}

async fn api_assign_module(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Json(body): Json<api::AssignModuleReq>,
) -> Result<Json<api::AssignModuleResp>, AppError> {
    if body.module_id.0.trim().is_empty() {
        return Err(AppError::bad_request("module_id required"));
    }
    let (assignment, progress) = state
        .store
        .assign_module(&auth.claims.sub, &id, &body.module_id.0)
        .await?;
    Ok(Json(api::AssignModuleResp {
        assignment: assignment_dto(assignment),
        progress: progress_dto(progress),
    }))
}

async fn api_list_assignments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<Vec<api::AssignmentWithProgressDto>>, AppError> {
    ensure_parent_link(&state, &auth, &id).await?;
    let rows = state
        .store
        .list_assignments_with_progress(&id)
        .await
        .map_err(AppError::internal)?;
    let items = rows
        .into_iter()
        .map(|(a, p)| api::AssignmentWithProgressDto {
            assignment: assignment_dto(a),
            progress: progress_dto(p),
        })
        .collect();
    Ok(Json(items))
}

async fn api_save_progress(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path((id, module_id)): Path<(String, String)>,
    Json(body): Json<api::SaveProgressReq>,
) -> Result<Json<api::ProgressDto>, AppError> {
    // ACL guarantees the caller is the child itself
    let completed: i32 = body
        .completed_lessons
        .try_into()
        .map_err(|_| AppError::bad_request("completed_lessons out of range"))?;
    let status = body.status.unwrap_or(ProgressStatus::InProgress);
    let progress = state
        .store
        .save_progress(&id, &module_id, completed, status)
        .await?;
    Ok(Json(progress_dto(progress)))
}

async fn api_list_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<Vec<api::TaskDto>>, AppError> {
    ensure_parent_link(&state, &auth, &id).await?;
    let rows = state
        .store
        .list_tasks_for_child(&id)
        .await
        .map_err(AppError::internal)?;
    let items = rows.into_iter().map(task_dto).collect();
    Ok(Json(items))
}

async fn api_create_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Json(body): Json<api::CreateTaskReq>,
) -> Result<Json<api::TaskDto>, AppError> {
    ensure_parent_link(&state, &auth, &id).await?;
    let title = body.title.trim();
    if title.is_empty() {
        return Err(AppError::bad_request("title required"));
    }
    let due = body
        .due_date
        .as_deref()
        .map(|s| {
            chrono::DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.naive_utc())
                .map_err(|e| AppError::bad_request(format!("invalid due_date: {}", e)))
        })
        .transpose()?;
    let task = state.store.create_task(&id, title, due).await?;
    Ok(Json(task_dto(task)))
}

async fn api_toggle_task(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path((id, task_id)): Path<(String, i32)>,
    Json(body): Json<api::ToggleTaskReq>,
) -> Result<Json<api::ToggleTaskResp>, AppError> {
    // ACL guarantees the caller is the child itself
    let (task, award) = state.store.toggle_task(&id, task_id, body.completed).await?;
    Ok(Json(api::ToggleTaskResp {
        task: task_dto(task),
        xp: award.map(xp_summary_dto),
    }))
}

async fn api_award_xp(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Json(body): Json<api::AwardXpReq>,
) -> Result<Json<api::XpSummaryDto>, AppError> {
    ensure_parent_link(&state, &auth, &id).await?;
    if body.amount <= 0 {
        return Err(AppError::bad_request("amount must be positive"));
    }
    if body.amount > MAX_XP_AWARD {
        return Err(AppError::bad_request("amount too large"));
    }
    let outcome = state.store.award_xp(&id, body.amount).await?;
    Ok(Json(xp_summary_dto(outcome)))
}

async fn api_upload_avatar(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<api::AvatarResp>, AppError> {
    ensure_parent_link(&state, &auth, &id).await?;
    if body.is_empty() {
        return Err(AppError::bad_request("empty upload"));
    }
    let media = state
        .media
        .as_ref()
        .ok_or_else(|| AppError::media("media host not configured"))?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let uploaded = media.upload(body.to_vec(), &content_type).await?;
    let previous = state
        .store
        .set_avatar(&id, &uploaded.url, &uploaded.public_id)
        .await?;
    // The new avatar is committed; a failed cleanup of the old object is
    // logged rather than reported as a request failure
    if let Some(old_id) = previous
        && let Err(e) = media.delete(&old_id).await
    {
        tracing::warn!(child=%id, public_id=%old_id, error=%e, "failed to delete replaced avatar");
    }
    Ok(Json(api::AvatarResp {
        url: uploaded.url,
        public_id: uploaded.public_id,
        format: uploaded.format,
    }))
}

/// Parents may only act on children linked to them; an unlinked child looks
/// exactly like a missing one. Child callers were already pinned to their own
/// id by the ACL.
async fn ensure_parent_link(
    state: &AppState,
    auth: &AuthCtx,
    child_id: &str,
) -> Result<(), AppError> {
    if auth.claims.role != Role::Parent {
        return Ok(());
    }
    let link = state
        .store
        .find_link(&auth.claims.sub, child_id)
        .await
        .map_err(AppError::internal)?;
    if link.is_none() {
        return Err(AppError::not_found(format!("child not found: {}", child_id)));
    }
    Ok(())
}

fn rfc3339(dt: chrono::NaiveDateTime) -> String {
    chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(dt, chrono::Utc).to_rfc3339()
}

fn child_dto(c: models::Child) -> api::ChildDto {
    api::ChildDto {
        id: ChildId(c.id),
        display_name: c.display_name,
        xp: c.xp,
        level: c.level,
        avatar_url: c.avatar_url,
    }
}

fn assignment_dto(a: models::Assignment) -> api::AssignmentDto {
    api::AssignmentDto {
        module_id: ModuleId(a.module_id),
        child_id: ChildId(a.child_id),
        assigned_by: a.assigned_by,
        assigned_at: rfc3339(a.assigned_at),
    }
}

fn progress_dto(p: models::Progress) -> api::ProgressDto {
    api::ProgressDto {
        status: p
            .status
            .parse::<ProgressStatus>()
            .unwrap_or(ProgressStatus::NotStarted),
        child_id: ChildId(p.child_id),
        module_id: ModuleId(p.module_id),
        completed_lessons: p.completed_lessons,
        last_updated: rfc3339(p.last_updated),
    }
}

fn task_dto(t: models::Task) -> api::TaskDto {
    api::TaskDto {
        status: t.status.parse::<TaskStatus>().unwrap_or(TaskStatus::Pending),
        id: t.id,
        child_id: ChildId(t.child_id),
        title: t.title,
        due_date: t.due_date.map(rfc3339),
        completed_at: t.completed_at.map(rfc3339),
    }
}

fn xp_summary_dto(o: XpOutcome) -> api::XpSummaryDto {
    api::XpSummaryDto {
        new_xp: o.new_xp,
        new_level: o.new_level,
        leveled_up: o.leveled_up,
        xp_to_next_level: o.xp_to_next_level,
        next_level: o.next_level,
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    InvalidRole(String),
    Unauthorized,
    Forbidden,
    NotFound(String),
    Conflict(String),
    AlreadyLinked,
    CapacityExceeded,
    Media(String),
    Internal(String),
}

impl AppError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        Self::BadRequest(msg.into())
    }
    fn invalid_role<T: Into<String>>(msg: T) -> Self {
        Self::InvalidRole(msg.into())
    }
    fn unauthorized() -> Self {
        Self::Unauthorized
    }
    fn forbidden() -> Self {
        Self::Forbidden
    }
    fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }
    fn media<T: Into<String>>(msg: T) -> Self {
        Self::Media(msg.into())
    }
    fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(m) => AppError::NotFound(m),
            StorageError::InvalidInput(m) => AppError::BadRequest(m),
            StorageError::AlreadyLinked => AppError::AlreadyLinked,
            StorageError::AlreadyAssigned => {
                AppError::Conflict("module already assigned to child".into())
            }
            StorageError::AssignmentLimit => AppError::CapacityExceeded,
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<MediaError> for AppError {
    fn from(e: MediaError) -> Self {
        AppError::Media(e.to_string())
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg, kind, detail) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m, "invalid_argument", None),
            AppError::InvalidRole(m) => (StatusCode::BAD_REQUEST, m, "invalid_role", None),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized".into(),
                "unauthorized",
                None,
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".into(), "forbidden", None),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m, "not_found", None),
            // Precondition failures share status 400 with invalid input;
            // the kind field is what clients dispatch on
            AppError::Conflict(m) => (StatusCode::BAD_REQUEST, m, "conflict", None),
            AppError::AlreadyLinked => (
                StatusCode::BAD_REQUEST,
                "child already linked to a parent".into(),
                "already_linked",
                None,
            ),
            AppError::CapacityExceeded => (
                StatusCode::BAD_REQUEST,
                "assignment limit reached".into(),
                "capacity_exceeded",
                None,
            ),
            // Upstream media failures keep their own kind so clients can
            // distinguish them from our own faults
            AppError::Media(m) => (StatusCode::BAD_GATEWAY, m, "media_service", None),
            // Do not leak internal error details to clients, but log them
            AppError::Internal(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".into(),
                "internal",
                Some(m),
            ),
        };
        // Log any error responses at ERROR level for troubleshooting
        if let Some(detail) = detail {
            tracing::error!(status = %status, kind = kind, message = %msg, detail = %detail, "request failed");
        } else {
            tracing::error!(status = %status, kind = kind, message = %msg, "request failed");
        }
        let body = axum::Json(ErrorBody { error: msg, kind });
        (status, body).into_response()
    }
}
