pub mod auth;
pub mod config;
pub mod db;
pub mod err;
pub mod memory;
pub mod models;
pub mod students;
pub mod token;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use crate::auth::RegistrationPolicy;
use crate::config::AppConfig;
use crate::db::{PgStore, Store};
use crate::err::{Error, Success};
use crate::memory::MemoryStore;
use crate::token::{require_session, TokenAuthority};

pub type Payload<T> = axum::response::Result<Json<Success<T>>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Json(Success::of(value)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = AppConfig::from_env()?;
    let store: Store = match &config.database_url {
        Some(url) => {
            let pg = db::connect(url, config.max_connections).await?;
            log::info!("Connected to PostgreSQL");
            Arc::new(PgStore::new(pg))
        }
        None => {
            log::warn!("DATABASE_URL not set, keeping all data in memory");
            Arc::new(MemoryStore::new())
        }
    };
    let tokens = Arc::new(TokenAuthority::new(
        config.token_secret.as_bytes(),
        config.token_lifetime,
    ));

    let app = app(store, tokens, config.registration);
    let addr = config.socket_addr();
    log::info!("Starting student records server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn app(store: Store, tokens: Arc<TokenAuthority>, policy: RegistrationPolicy) -> Router {
    let protected = Router::new()
        .route("/students", get(students::list_students))
        .route("/student", post(students::create_student))
        .route(
            "/student/:id",
            get(students::read_student)
                .put(students::update_student)
                .delete(students::delete_student),
        )
        .route_layer(middleware::from_fn_with_state(
            tokens.clone(),
            require_session,
        ));

    Router::new()
        .route("/register", post(auth::register_user))
        .route("/login", post(auth::login_user))
        .merge(protected)
        .fallback(err::handler404)
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(Extension(store))
                .layer(Extension(tokens))
                .layer(Extension(policy)),
        )
}
