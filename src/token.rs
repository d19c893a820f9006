use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::err::Error;

/// Identity recovered from a verified token. Handlers behind the gate read it
/// from the request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subject(pub Uuid);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Authenticated(Subject),
    Unauthenticated,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs and checks session tokens with one process-wide HMAC secret.
///
/// Tokens are never tracked server-side: a token stays valid until its `exp`
/// passes, and the only way to cut all of them short is a new secret.
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetime: Duration,
}

impl TokenAuthority {
    pub fn new(secret: &[u8], lifetime: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            lifetime,
        }
    }

    pub fn issue(&self, subject: Uuid) -> Result<IssuedToken, Error> {
        self.issue_at(subject, Utc::now())
    }

    pub fn issue_at(&self, subject: Uuid, now: DateTime<Utc>) -> Result<IssuedToken, Error> {
        // `exp` has whole-second resolution, so the reported expiry does too.
        let expires_at = now
            .checked_add_signed(self.lifetime)
            .and_then(|at| DateTime::from_timestamp(at.timestamp(), 0))
            .ok_or_else(|| Error::internal("TokenError", "token expiry is out of range"))?;
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok(IssuedToken { token, expires_at })
    }

    /// Any failure, whatever its cause, is reported as `Unauthenticated`.
    pub fn verify(&self, token: &str) -> AuthResult {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .ok()
            .and_then(|data| Uuid::parse_str(&data.claims.sub).ok())
            .map(|id| AuthResult::Authenticated(Subject(id)))
            .unwrap_or(AuthResult::Unauthenticated)
    }
}

/// Gate in front of every protected route. The `Authorization` header carries
/// the bare token, with no scheme prefix.
pub async fn require_session(
    State(tokens): State<Arc<TokenAuthority>>,
    mut request: Request,
    next: Next,
) -> Result<Response, Error> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .filter(|h| !h.is_empty());

    let result = match header {
        Some(token) => tokens.verify(token),
        None => AuthResult::Unauthenticated,
    };

    match result {
        AuthResult::Authenticated(subject) => {
            request.extensions_mut().insert(subject);
            Ok(next.run(request).await)
        }
        AuthResult::Unauthenticated => {
            log::debug!("Rejected unauthenticated request to {}", request.uri());
            Err(Error::unauthenticated())
        }
    }
}
