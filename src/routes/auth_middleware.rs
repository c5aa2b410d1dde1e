use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::services::auth_service;

/// Validate the platform token and make the resolved identity available to
/// downstream handlers as an `AuthUser` extension.
pub async fn auth_middleware(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    // 1. Get the auth token from the request
    let token = match auth_service::get_auth_token(req.headers()) {
        Ok(token) => token,
        Err(_) => return Err(StatusCode::UNAUTHORIZED),
    };

    // 2. Validate it and resolve the identity
    let user = match auth_service::authenticate_token(&token) {
        Ok(user) => user,
        Err(e) => {
            warn!("Authentication failed: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    // 3. Expose the identity to handlers
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}
