use axum::http::{self, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use moka::sync::Cache;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::info;

/// Identity resolved from a validated platform token.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: String,
    pub role: String,
}

/// Cache of already-validated tokens, to skip repeated signature checks on
/// chatty clients.
static TOKEN_CACHE: OnceLock<Cache<String, AuthUser>> = OnceLock::new();

/// Initialize the token cache.
/// Should be called once at startup.
pub fn init_token_cache() {
    TOKEN_CACHE.get_or_init(|| {
        Cache::builder()
            .max_capacity(100_000)
            .time_to_live(Duration::from_secs(5 * 60))
            .build()
    });
    info!("Token cache initialized");
}

fn get_token_cache() -> &'static Cache<String, AuthUser> {
    TOKEN_CACHE
        .get()
        .expect("Token cache not initialized. Call init_token_cache() first.")
}

// Get the auth token from request headers
pub fn get_auth_token(headers: &HeaderMap) -> Result<String, String> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = headers.get(http::header::AUTHORIZATION) {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| "Invalid Authorization header".to_string())?;
        Ok(auth_str
            .strip_prefix("Bearer ")
            .unwrap_or(auth_str)
            .to_string())
    }
    // 2. Try to get token from cookies
    else {
        let cookie_header = headers
            .get(http::header::COOKIE)
            .ok_or_else(|| "Missing Authorization header or Cookie".to_string())?
            .to_str()
            .map_err(|_| "Invalid Cookie header".to_string())?;

        for cookie in cookie::Cookie::split_parse(cookie_header) {
            if let Ok(c) = cookie {
                if c.name() == "auth_token" {
                    return Ok(c.value().to_string());
                }
            }
        }
        Err("auth_token cookie not found".to_string())
    }
}

// Validate a JWT token and return the token data
pub fn validate_jwt(
    token: &str,
    secret: &str,
) -> Result<TokenData<serde_json::Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<serde_json::Value>(token, &decoding_key, &validation)
}

/// Resolve a token into `{user_id, role}`, consulting the cache first.
/// The platform issues user tokens with `sub` and `role` claims.
pub fn authenticate_token(token: &str) -> Result<AuthUser, String> {
    let cache = get_token_cache();
    if let Some(user) = cache.get(token) {
        return Ok(user);
    }

    let config = crate::config::get_config();
    let secret = config
        .auth_jwt_secret
        .as_ref()
        .ok_or_else(|| "No JWT secret configured!".to_string())?;
    let token_data =
        validate_jwt(token, secret).map_err(|e| format!("JWT validation failed: {}", e))?;

    let user_id = token_data
        .claims
        .get("sub")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "Can't extract a UID from the JWT token".to_string())?
        .to_string();
    let role = token_data
        .claims
        .get("role")
        .and_then(|v| v.as_str())
        .unwrap_or("student")
        .to_string();
    info!("JWT token validated successfully for user: {}", user_id);

    let user = AuthUser { user_id, role };
    cache.insert(token.to_string(), user.clone());
    Ok(user)
}

/// Authenticate a WebSocket upgrade: prefer the explicit query-parameter
/// token, fall back to the header/cookie extraction used for REST.
pub fn authenticate(headers: &HeaderMap, query_token: Option<String>) -> Result<AuthUser, String> {
    let token = match query_token {
        Some(token) if !token.is_empty() => token,
        _ => get_auth_token(headers)?,
    };
    authenticate_token(&token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn make_token(secret: &str) -> String {
        let claims = json!({
            "sub": "u-17",
            "role": "ta",
            "exp": 4_102_444_800u64,
        });
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc123"),
        );
        headers.insert(
            http::header::COOKIE,
            HeaderValue::from_static("auth_token=other"),
        );
        assert_eq!(get_auth_token(&headers).unwrap(), "abc123");
    }

    #[test]
    fn cookie_is_used_when_no_authorization_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::COOKIE,
            HeaderValue::from_static("theme=dark; auth_token=xyz; lang=en"),
        );
        assert_eq!(get_auth_token(&headers).unwrap(), "xyz");
    }

    #[test]
    fn missing_token_is_an_error() {
        let headers = HeaderMap::new();
        assert!(get_auth_token(&headers).is_err());
    }

    #[test]
    fn valid_jwt_roundtrips_claims() {
        let token = make_token("s3cret");
        let data = validate_jwt(&token, "s3cret").unwrap();
        assert_eq!(data.claims["sub"], "u-17");
        assert_eq!(data.claims["role"], "ta");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = make_token("s3cret");
        assert!(validate_jwt(&token, "not-the-secret").is_err());
    }
}
