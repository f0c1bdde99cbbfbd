use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::ApiError;
use crate::store::AppState;
use crate::webhook::notifier::PackageDescriptor;
use crate::webhook::payload::{PackageAction, User};

/// Package lifecycle event reported by the package registry.
#[derive(Debug, Deserialize)]
pub struct PackageEvent {
    pub action: PackageAction,
    pub doer: User,
    pub package: PackageDescriptor,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/internal/package-events", post(package_event))
}

#[tracing::instrument(skip(state, body), fields(action = ?body.action, package = %body.package.name), err)]
async fn package_event(
    State(state): State<AppState>,
    Json(body): Json<PackageEvent>,
) -> Result<StatusCode, ApiError> {
    if body.package.name.is_empty() || body.package.version.is_empty() {
        return Err(ApiError::BadRequest("package name and version are required".into()));
    }

    match body.action {
        PackageAction::Created => state.notifiers.package_create(&body.doer, &body.package).await,
        PackageAction::Deleted => state.notifiers.package_delete(&body.doer, &body.package).await,
    }
    Ok(StatusCode::ACCEPTED)
}
