//! # gatehouse: authentication and authorization for a multi-tenant admin backend
//!
//! `gatehouse` answers three questions for every request to the admin API: who is calling, are
//! they allowed to, and which organization do they act for. It also issues and revokes the
//! session tokens that answer the first question, and throttles login attempts per client
//! address.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for the HTTP layer and
//! PostgreSQL for persistence. The database is only reached through the
//! [`db::handlers::AuthRepository`] trait, so the whole request path runs against an in-memory
//! repository in tests.
//!
//! ### Request Flow
//!
//! A protected request carries `Authorization: Token <token>`. The
//! [`auth::middleware::AuthPipeline`] resolves the token to a user through the token cache,
//! checks that the account is active and the token has not expired, refreshes the last-login
//! stamp when it is stale, and evaluates the route's [`auth::authorization::Requirement`] against
//! the user's cached group and permission names. Superusers skip that evaluation. Finally the
//! caller's organization is resolved according to the configured
//! [`config::TenantPolicy`]. Handlers receive the result as a
//! [`auth::current_user::AuthContext`].
//!
//! ### Caching
//!
//! Identity, groups, permissions and organizations are cached in process without expiry (see
//! [`auth::caches::AuthCaches`]). Every mutation the API performs calls the matching
//! invalidation hook before it responds, so a revoked token or a removed group stops working on
//! the next request.
//!
//! ## Configuration
//!
//! Configuration is loaded from a YAML file (default `config.yaml`, overridable with `-f`) and
//! environment variables prefixed `GATEHOUSE_`, with `__` separating nested keys. See
//! [`config::Config`].
//!
//! ## Error Handling
//!
//! Handlers return [`errors::Error`], which maps to an HTTP status and a JSON body with a stable
//! `detail` summary. With `debug: true` the full error text is added under `error`.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod errors;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
};
use bon::Builder;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info, instrument, warn};

use crate::{
    api::handlers::{auth as auth_handlers, me, memberships},
    auth::{
        authorization::Requirement,
        caches::AuthCaches,
        middleware::{AuthPipeline, RouteAuth, require_auth},
        password,
        two_factor::TwoFactor,
    },
    cache::LoginThrottle,
    config::{AuthConfig, InitialSuperuser},
    db::{
        handlers::{AuthRepository, PgAuthRepository, Users},
        models::users::SuperuserSeedDBRequest,
    },
    errors::expose_error_details,
    types::{MANAGE_USERS_PERMISSION, ORGANIZATION_ADMIN_GROUP},
};

pub use config::Config;
pub use types::{GroupId, OrganizationId, UserId};

/// Application state shared across all request handlers.
///
/// # Example
///
/// ```ignore
/// let state = AppState::new(config, Arc::new(PgAuthRepository::new(pool)));
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub repo: Arc<dyn AuthRepository>,
    pub caches: Arc<AuthCaches>,
    pub throttle: Arc<LoginThrottle>,
    pub pipeline: AuthPipeline,
    pub two_factor: TwoFactor,
}

impl AppState {
    /// Wire the caches, throttle and pipeline for `config` over `repo`.
    pub fn new(config: Config, repo: Arc<dyn AuthRepository>) -> Self {
        let caches = Arc::new(AuthCaches::new());
        let pipeline = AuthPipeline::new(&config.auth, caches.clone(), repo.clone());

        Self::builder()
            .throttle(Arc::new(LoginThrottle::new(config.auth.login_throttle)))
            .two_factor(TwoFactor::new(config.auth.totp_issuer.clone()))
            .pipeline(pipeline)
            .caches(caches)
            .repo(repo)
            .config(config)
            .build()
    }
}

/// Get the gatehouse database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create or promote the configured superuser.
///
/// Idempotent: an existing account keeps its id and is promoted, and its password is reset only
/// when one is configured. When superuser 2FA is on and the account has no TOTP secret yet, one is
/// generated and its provisioning URI is logged once so it can be enrolled.
#[instrument(skip_all, fields(email = %seed.email))]
pub async fn create_initial_superuser(seed: &InitialSuperuser, auth: &AuthConfig, db: &PgPool) -> anyhow::Result<UserId> {
    let email = seed.email.trim().to_lowercase();

    let password_hash = match seed.password.clone() {
        Some(pwd) => Some(tokio::task::spawn_blocking(move || password::hash_string(&pwd)).await??),
        None => None,
    };

    let mut conn = db.acquire().await?;
    let mut users = Users::new(&mut conn);

    let existing = users.get_login_user_by_email(&email).await?;
    let two_factor_secret = if auth.superuser_2fa && existing.as_ref().is_none_or(|u| u.two_factor_secret.is_none()) {
        let secret = TwoFactor::generate_secret();
        let uri = TwoFactor::new(auth.totp_issuer.clone()).provisioning_uri(&secret, &email)?;
        warn!("Generated a TOTP secret for the initial superuser, enroll it now: {}", uri);
        Some(secret)
    } else {
        None
    };

    let id = users
        .upsert_superuser(&SuperuserSeedDBRequest {
            email,
            password_hash,
            two_factor_secret,
        })
        .await?;

    info!(user_id = %id, "Initial superuser ready");
    Ok(id)
}

/// Build the application router.
///
/// `/authentication/logout` and `/admin/api/v1/me` authenticate through the
/// [`CurrentUser`](auth::current_user::CurrentUser) extractor. Membership routes sit behind
/// [`require_auth`] and require the organization admin group or the user management permission.
/// Group permission edits are further limited to superusers by their handler.
pub fn build_router(state: AppState) -> Router {
    let manage_users = RouteAuth::new(
        state.pipeline.clone(),
        Requirement::group(ORGANIZATION_ADMIN_GROUP).or_permission(MANAGE_USERS_PERMISSION),
    );

    let auth_routes = Router::new()
        .route("/authentication/info", get(auth_handlers::get_login_info))
        .route("/authentication/login", post(auth_handlers::login))
        .route("/authentication/logout", post(auth_handlers::logout));

    let membership_routes = Router::new()
        .route("/users/{user_id}/groups", put(memberships::set_user_groups))
        .route("/users/{user_id}/permissions", put(memberships::set_user_permissions))
        .route("/groups/{group_id}/permissions", put(memberships::set_group_permissions))
        .route_layer(from_fn_with_state(manage_users, require_auth));

    let api_routes = Router::new().route("/me", get(me::get_me)).merge(membership_routes);

    let debug = state.config.debug;
    let mut router = Router::new()
        .merge(auth_routes)
        .nest("/admin/api/v1", api_routes)
        .with_state(state);

    if debug {
        debug!("Exposing full error details in responses");
        router = router.layer(from_fn(expose_error_details));
    }

    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("database_url is not set (config file, GATEHOUSE_DATABASE_URL or DATABASE_URL)"))?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(database_url)
        .await?;
    migrator().run(&pool).await?;

    if let Some(seed) = &config.auth.initial_superuser {
        create_initial_superuser(seed, &config.auth, &pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create initial superuser: {}", e))?;
    }

    Ok(pool)
}

pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Connect to the database, run migrations, seed the superuser and build the router
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting gatehouse with configuration: {:#?}", config);

        let pool = setup_database(&config).await?;
        let repo = Arc::new(PgAuthRepository::new(pool.clone()));
        let router = build_router(AppState::new(config.clone(), repo));

        Ok(Self { router, config, pool })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("gatehouse listening on http://{}", bind_addr);

        // Peer addresses key the login throttle
        axum::serve(listener, self.router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
