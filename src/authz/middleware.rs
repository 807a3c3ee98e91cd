use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum::Extension;

use super::Principal;
use crate::app::AppState;
use crate::dispatch::RouteBinding;
use crate::errors::AppError;
use crate::jwt::AuthUser;

/// Authenticates the caller and enforces the matched binding's grant.
///
/// Runs before the handler's own extractors, so a denied caller never reaches
/// a service method or opens a transaction. On success the loaded
/// [`Principal`] is attached to the request extensions.
pub async fn enforce_grant(
    State(state): State<AppState>,
    Extension(binding): Extension<Arc<RouteBinding>>,
    auth: AuthUser,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = Principal::load(&state.pool, auth.user_id).await?;

    if let Some(requirement) = &binding.required_grant {
        if !state.evaluator.can(&principal, requirement).await {
            tracing::warn!(
                user_id = principal.user_id,
                grant = %requirement,
                action = ?binding.action,
                path = %binding.path,
                "grant check failed"
            );
            return Err(AppError::forbidden(format!("missing grant {requirement}")));
        }
    }

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}
