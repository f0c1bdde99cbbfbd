use axum::extract::rejection::PathRejection;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::ApiError;
use crate::store::AppState;
use crate::webhook::error::HookError;
use crate::webhook::model::{HookTask, Webhook};
use crate::webhook::payload::{CreateHookOption, EditHookOption, Hook};
use crate::webhook::store::ListWebhookOptions;

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Path parameters shared by the three hook route trees. The admin tree
/// has none on its collection routes.
#[derive(Debug, Default, Deserialize)]
pub struct HookPath {
    owner_id: Option<i64>,
    repo_id: Option<i64>,
    id: Option<i64>,
    uuid: Option<String>,
}

impl<S: Send + Sync> FromRequestParts<S> for HookPath {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<Self>::from_request_parts(parts, state).await {
            Ok(Path(path)) => Ok(path),
            Err(PathRejection::MissingPathParams(_)) => Ok(Self::default()),
            Err(e) => Err(ApiError::BadRequest(e.body_text())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    System,
    Owner(i64),
    Repo(i64),
}

impl HookPath {
    fn scope(&self) -> Scope {
        match (self.repo_id, self.owner_id) {
            (Some(repo_id), _) => Scope::Repo(repo_id),
            (None, Some(owner_id)) => Scope::Owner(owner_id),
            (None, None) => Scope::System,
        }
    }

    fn hook_id(&self) -> Result<i64, ApiError> {
        self.id
            .ok_or_else(|| ApiError::BadRequest("missing hook id".into()))
    }
}

impl Scope {
    fn list_options(self) -> Option<ListWebhookOptions> {
        match self {
            Self::System => None,
            Self::Owner(owner_id) => Some(ListWebhookOptions {
                repo_id: 0,
                owner_id,
                is_active: None,
            }),
            Self::Repo(repo_id) => Some(ListWebhookOptions {
                repo_id,
                owner_id: 0,
                is_active: None,
            }),
        }
    }

    fn contains(self, hook: &Webhook) -> bool {
        match self.list_options() {
            None => hook.is_system_webhook,
            Some(opts) => opts.matches(hook),
        }
    }

    /// Settings page the API `url` of a hook points into.
    fn link(self, app_url: &str) -> String {
        match self {
            Self::System => format!("{app_url}admin"),
            Self::Owner(id) => format!("{app_url}owners/{id}"),
            Self::Repo(id) => format!("{app_url}repos/{id}"),
        }
    }

    fn owner_and_repo(self) -> (i64, i64) {
        match self {
            Self::System => (0, 0),
            Self::Owner(id) => (id, 0),
            Self::Repo(id) => (0, id),
        }
    }
}

async fn load_hook(state: &AppState, scope: Scope, id: i64) -> Result<Webhook, ApiError> {
    let hook = state.hooks.get_by_id(id).await?;
    if !scope.contains(&hook) {
        return Err(HookError::WebhookNotExist { id }.into());
    }
    Ok(hook)
}

fn api_hook(state: &AppState, scope: Scope, hook: &Webhook) -> Result<Hook, ApiError> {
    Ok(state
        .manager
        .to_hook(&scope.link(&state.config.app_url), hook)?)
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

fn scoped_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_hooks).post(create_hook))
        .route("/{id}", get(get_hook).patch(edit_hook).delete(delete_hook))
        .route("/{id}/tasks", get(list_tasks))
        .route("/{id}/tasks/{uuid}/replay", post(replay_task))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1/admin/hooks", scoped_routes())
        .nest("/api/v1/owners/{owner_id}/hooks", scoped_routes())
        .nest("/api/v1/repos/{repo_id}/hooks", scoped_routes())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_hooks(
    State(state): State<AppState>,
    path: HookPath,
) -> Result<Json<Vec<Hook>>, ApiError> {
    let scope = path.scope();
    let hooks = match scope.list_options() {
        None => state.hooks.get_system_webhooks(None).await?,
        Some(opts) => state.hooks.list(opts).await?,
    };

    let items = hooks
        .iter()
        .map(|h| api_hook(&state, scope, h))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(items))
}

#[tracing::instrument(skip(state, body), fields(hook_type = %body.hook_type), err)]
async fn create_hook(
    State(state): State<AppState>,
    path: HookPath,
    Json(body): Json<CreateHookOption>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = path.scope();
    let (owner_id, repo_id) = scope.owner_and_repo();
    let hook = state.manager.add_hook(body, owner_id, repo_id).await?;

    Ok((StatusCode::CREATED, Json(api_hook(&state, scope, &hook)?)))
}

async fn get_hook(
    State(state): State<AppState>,
    path: HookPath,
) -> Result<Json<Hook>, ApiError> {
    let scope = path.scope();
    let hook = load_hook(&state, scope, path.hook_id()?).await?;
    Ok(Json(api_hook(&state, scope, &hook)?))
}

#[tracing::instrument(skip(state, body), fields(hook_id = ?path.id), err)]
async fn edit_hook(
    State(state): State<AppState>,
    path: HookPath,
    Json(body): Json<EditHookOption>,
) -> Result<Json<Hook>, ApiError> {
    let scope = path.scope();
    let id = path.hook_id()?;
    let mut hook = load_hook(&state, scope, id).await?;
    state.manager.edit_hook(body, &mut hook).await?;

    let updated = state.hooks.get_by_id(id).await?;
    Ok(Json(api_hook(&state, scope, &updated)?))
}

#[tracing::instrument(skip(state), fields(hook_id = ?path.id), err)]
async fn delete_hook(
    State(state): State<AppState>,
    path: HookPath,
) -> Result<StatusCode, ApiError> {
    let scope = path.scope();
    let hook = load_hook(&state, scope, path.hook_id()?).await?;
    state.hooks.delete(hook.id).await?;
    tracing::info!(hook_id = hook.id, "webhook deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct TaskListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

async fn list_tasks(
    State(state): State<AppState>,
    path: HookPath,
    Query(params): Query<TaskListParams>,
) -> Result<Json<Vec<HookTask>>, ApiError> {
    let hook = load_hook(&state, path.scope(), path.hook_id()?).await?;
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(20).clamp(1, 50);

    let tasks = state.tasks.list_by_hook(hook.id, page, limit).await?;
    Ok(Json(tasks))
}

#[tracing::instrument(skip(state), fields(hook_id = ?path.id, uuid = ?path.uuid), err)]
async fn replay_task(
    State(state): State<AppState>,
    path: HookPath,
) -> Result<StatusCode, ApiError> {
    let hook = load_hook(&state, path.scope(), path.hook_id()?).await?;
    let uuid = path
        .uuid
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("missing task uuid".into()))?;

    state.service.replay_hook_task(&hook, uuid).await?;
    Ok(StatusCode::NO_CONTENT)
}
