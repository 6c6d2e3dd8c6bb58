use axum::http::HeaderMap;

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::models::Actor;

const USER_HEADER: &str = "x-user-id";

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
}

fn user_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Identity comes from the upstream session layer: `X-User-Id` for users,
/// plus the admin bearer token for admins.
pub fn actor_from_headers(headers: &HeaderMap, config: &AppConfig) -> AppResult<Actor> {
    match bearer_token(headers) {
        Some(token) if !config.admin_token.is_empty() && token == config.admin_token => {
            Ok(Actor::admin(user_id(headers).unwrap_or("admin")))
        }
        Some(_) => Err(AppError::Unauthorized),
        None => user_id(headers)
            .map(Actor::organizer)
            .ok_or(AppError::Unauthorized),
    }
}

pub fn admin_from_headers(headers: &HeaderMap, config: &AppConfig) -> AppResult<Actor> {
    let actor = actor_from_headers(headers, config)?;
    if !actor.is_admin() {
        return Err(AppError::Forbidden);
    }
    Ok(actor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config() -> AppConfig {
        let mut config = AppConfig::from_env();
        config.admin_token = "secret".to_string();
        config
    }

    #[test]
    fn test_user_header() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, HeaderValue::from_static("u1"));
        let actor = actor_from_headers(&headers, &config()).unwrap();
        assert_eq!(actor.user_id, "u1");
        assert!(!actor.is_admin());
        assert!(matches!(admin_from_headers(&headers, &config()), Err(AppError::Forbidden)));
    }

    #[test]
    fn test_admin_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer secret"));
        let actor = admin_from_headers(&headers, &config()).unwrap();
        assert_eq!(actor.user_id, "admin");

        headers.insert("authorization", HeaderValue::from_static("Bearer wrong"));
        assert!(matches!(actor_from_headers(&headers, &config()), Err(AppError::Unauthorized)));
    }

    #[test]
    fn test_missing_identity() {
        let headers = HeaderMap::new();
        assert!(matches!(actor_from_headers(&headers, &config()), Err(AppError::Unauthorized)));
    }
}
