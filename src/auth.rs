use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{CredentialStore, Store};
use crate::models::Document;
use crate::token::TokenAuthority;
use crate::{proceeds, Error, Payload};

/// What `register` does when the username is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationPolicy {
    pub allow_duplicate_usernames: bool,
}

impl Default for RegistrationPolicy {
    fn default() -> Self {
        Self {
            allow_duplicate_usernames: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Verified(Uuid),
    NotFound,
    Mismatch,
}

pub fn hash_password(password: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Pbkdf2.hash_password(password.as_bytes(), &salt)?.to_string())
}

/// Hashes `password` with a fresh salt and stores the new credential.
pub async fn register_credentials<S>(
    store: &S,
    policy: RegistrationPolicy,
    username: &str,
    password: &str,
    profile: &Document,
) -> Result<Uuid, Error>
where
    S: CredentialStore + ?Sized,
{
    let password_hash = hash_password(password)?;
    if policy.allow_duplicate_usernames {
        return Ok(store.insert_user(username, &password_hash, profile).await?);
    }
    match store
        .insert_unique_user(username, &password_hash, profile)
        .await?
    {
        Some(id) => Ok(id),
        None => Err(Error::UserAlreadyExists {
            message: "User with provided username already exists!".to_string(),
        }),
    }
}

pub async fn verify_credentials<S>(
    store: &S,
    username: &str,
    password: &str,
) -> Result<Verification, Error>
where
    S: CredentialStore + ?Sized,
{
    let user = match store.find_user(username).await? {
        Some(user) => user,
        None => return Ok(Verification::NotFound),
    };
    let hash = PasswordHash::new(&user.password_hash)?;
    if Pbkdf2.verify_password(password.as_bytes(), &hash).is_ok() {
        Ok(Verification::Verified(user.id))
    } else {
        Ok(Verification::Mismatch)
    }
}

pub async fn register_user(
    Extension(store): Extension<Store>,
    Extension(policy): Extension<RegistrationPolicy>,
    body: Result<Json<RegisterUser>, JsonRejection>,
) -> Payload<RegisteredUser> {
    let Json(body) = body?;
    let user_id =
        register_credentials(&*store, policy, &body.username, &body.password, &body.profile)
            .await?;
    log::info!("Registered user `{}` as {}", body.username, user_id);
    proceeds(RegisteredUser {
        message: "Successfully Registered",
        user_id,
    })
}

pub async fn login_user(
    Extension(store): Extension<Store>,
    Extension(tokens): Extension<Arc<TokenAuthority>>,
    login: Result<Json<LoginUser>, JsonRejection>,
) -> Payload<LoggedInUser> {
    let Json(login) = login?;
    match verify_credentials(&*store, &login.username, &login.password).await? {
        Verification::Verified(user_id) => {
            let issued = tokens.issue(user_id)?;
            log::info!("User `{}` logged in", login.username);
            proceeds(LoggedInUser {
                message: "Successfully Logged In",
                token: issued.token,
                expires_at: issued.expires_at,
            })
        }
        Verification::NotFound => {
            log::info!("Login for unknown user `{}`", login.username);
            Err(Error::UserDoesNotExist {
                message: "User not found".to_string(),
            })
        }
        Verification::Mismatch => {
            log::info!("Wrong password for user `{}`", login.username);
            Err(Error::AuthenticationFailure {
                message: "Password is incorrect".to_string(),
            })
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterUser {
    pub username: String,
    pub password: String,
    #[serde(flatten)]
    pub profile: Document,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredUser {
    message: &'static str,
    user_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginUser {
    username: String,
    password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggedInUser {
    message: &'static str,
    token: String,
    expires_at: DateTime<Utc>,
}
