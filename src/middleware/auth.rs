use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::{header, request::Parts};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

/// Role Supabase assigns to backend/operator tokens.
pub const SERVICE_ROLE: &str = "service_role";

/// Claims of a Supabase access token that this service relies on.
/// Service-role keys carry no `sub`.
#[derive(Debug, Deserialize, Serialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub role: String,
    pub exp: usize,
}

/// Caller of a request. `user_id` is `None` only for service-role keys.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub role: String,
}

impl AuthUser {
    pub fn is(&self, user_id: Uuid) -> bool {
        self.user_id == Some(user_id)
    }

    pub fn email_matches(&self, email: &str) -> bool {
        self.email
            .as_deref()
            .is_some_and(|own| own.trim().eq_ignore_ascii_case(email.trim()))
    }
}

pub fn ensure_role(user: &AuthUser, role: &str) -> Result<(), AppError> {
    if user.role != role {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn ensure_operator(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, SERVICE_ROLE)
}

pub fn decode_token(token: &str, secret: &str) -> Result<AuthUser, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    // Supabase sets aud=authenticated on user tokens and omits it on service keys.
    validation.validate_aud = false;

    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|_| AppError::LoginRequired)?;

    let claims = decoded.claims;
    let user_id = match claims.sub.as_deref() {
        Some(sub) => Some(Uuid::parse_str(sub).map_err(|_| AppError::LoginRequired)?),
        None if claims.role == SERVICE_ROLE => None,
        None => return Err(AppError::LoginRequired),
    };

    Ok(AuthUser {
        user_id,
        email: claims.email.filter(|e| !e.is_empty()),
        role: claims.role,
    })
}

fn bearer_token(parts: &Parts) -> Result<Option<&str>, AppError> {
    let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| AppError::LoginRequired)?;

    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or(AppError::LoginRequired)?
        .trim();
    Ok(Some(token))
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?.ok_or(AppError::LoginRequired)?;
        decode_token(token, &state.config.jwt_secret)
    }
}

impl OptionalFromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        match bearer_token(parts)? {
            Some(token) => decode_token(token, &state.config.jwt_secret).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn sign(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn token(sub: &str, role: &str, secret: &str) -> String {
        let claims = Claims {
            sub: Some(sub.to_string()),
            email: Some("ayu@example.com".into()),
            role: role.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        sign(&claims, secret)
    }

    fn anonymous(role: &str) -> Claims {
        Claims {
            sub: None,
            email: None,
            role: role.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        }
    }

    #[test]
    fn decodes_supabase_claims() {
        let id = Uuid::new_v4();
        let user = decode_token(&token(&id.to_string(), "authenticated", "s3cret"), "s3cret").unwrap();
        assert_eq!(user.user_id, Some(id));
        assert!(user.is(id));
        assert!(user.email_matches("AYU@example.com"));
        assert!(ensure_operator(&user).is_err());
    }

    #[test]
    fn rejects_wrong_secret_and_bad_subject() {
        let id = Uuid::new_v4().to_string();
        assert!(matches!(
            decode_token(&token(&id, "authenticated", "one"), "two"),
            Err(AppError::LoginRequired)
        ));
        assert!(decode_token(&token("not-a-uuid", "authenticated", "k"), "k").is_err());
    }

    #[test]
    fn service_role_is_operator() {
        let id = Uuid::new_v4().to_string();
        let user = decode_token(&token(&id, SERVICE_ROLE, "k"), "k").unwrap();
        assert!(ensure_operator(&user).is_ok());
    }

    #[test]
    fn service_role_key_without_subject_is_an_operator() {
        let user = decode_token(&sign(&anonymous(SERVICE_ROLE), "k"), "k").unwrap();
        assert_eq!(user.user_id, None);
        assert!(ensure_operator(&user).is_ok());
    }

    #[test]
    fn user_token_without_subject_is_rejected() {
        assert!(matches!(
            decode_token(&sign(&anonymous("authenticated"), "k"), "k"),
            Err(AppError::LoginRequired)
        ));
    }
}
