use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
    body::Body,
};

use serde::Deserialize;

use shared_models::error::AppError;
use shared_config::AppConfig;

use crate::jwt::validate_token;

/// `?access_token=` is accepted in place of the `Authorization` header.
/// Browsers cannot attach headers to WebSocket upgrade requests.
#[derive(Debug, Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&request)?;

    let user = validate_token(&token, &config.supabase_jwt_secret)
        .map_err(|e| AppError::Auth(e.to_string()))?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

fn bearer_token<B>(request: &Request<B>) -> Result<String, AppError> {
    if let Some(auth_header) = request.headers().get(AUTHORIZATION) {
        let auth_value = auth_header
            .to_str()
            .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

        return auth_value
            .strip_prefix("Bearer ")
            .map(str::to_string)
            .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()));
    }

    Query::<TokenQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(query)| query.access_token)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))
}
