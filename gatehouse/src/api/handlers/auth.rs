use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, FromRequestParts, State},
    http::request::Parts,
};
use chrono::Utc;
use tracing::{debug, info};

use crate::{
    AppState,
    api::models::auth::{LoginInfo, LoginRequest, LoginResponse, LogoutResponse},
    auth::{current_user::CurrentUser, middleware::token_outlived, password, tenant::TenantPolicy},
    errors::Error,
    types::{ORGANIZATION_ADMIN_GROUP, abbrev_token},
};

/// Address the login throttle is keyed on.
///
/// With `auth.trust_proxy` set, the leftmost `X-Forwarded-For` entry wins, then `X-Real-IP`.
/// Otherwise, or when neither header is present, it is the peer IP, or `"unknown"` when the
/// server was not started with connect info.
#[derive(Debug, Clone)]
pub struct ClientAddress(pub String);

impl ClientAddress {
    fn from_parts(parts: &Parts, trust_proxy: bool) -> Self {
        let forwarded = if trust_proxy {
            parts
                .headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .or_else(|| parts.headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
                .map(str::to_string)
        } else {
            None
        };

        let address = forwarded
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());
        ClientAddress(address)
    }
}

impl FromRequestParts<AppState> for ClientAddress {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts, state.config.auth.trust_proxy))
    }
}

/// Get dashboard login information
#[tracing::instrument(skip_all)]
pub async fn get_login_info(State(state): State<AppState>) -> Json<LoginInfo> {
    Json(LoginInfo {
        tfa: state.config.auth.superuser_2fa,
    })
}

/// Log in with email and password
///
/// Every attempt counts against the caller's throttle, including successful ones. The token is
/// reused while it is still valid for a regular user, and replaced otherwise. Superusers get a
/// new token on every login.
#[tracing::instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    ClientAddress(address): ClientAddress,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, Error> {
    state.throttle.check(&address)?;

    let email = request.email.trim().to_lowercase();
    let login_user = state
        .repo
        .load_login_user_by_email(&email)
        .await?
        .ok_or(Error::InvalidCredentials)?;
    let password_hash = login_user.password_hash.clone().ok_or(Error::InvalidCredentials)?;

    // Hash verification is CPU-bound
    let password = request.password.clone();
    let valid = tokio::task::spawn_blocking(move || password::verify_string(&password, &password_hash))
        .await
        .map_err(|e| anyhow::anyhow!("spawn password verification task: {e}"))??;
    if !valid {
        debug!("Wrong password");
        return Err(Error::InvalidCredentials);
    }

    let user = login_user.user;
    if !user.is_active && !user.is_superuser {
        return Err(Error::InactiveUser);
    }

    if state.config.auth.superuser_2fa && user.is_superuser {
        let secret = login_user.two_factor_secret.as_deref().ok_or(Error::InvalidSecondFactor)?;
        if !state.two_factor.verify(secret, &request.twofakey, &user.email)? {
            return Err(Error::InvalidSecondFactor);
        }
    }

    let organization = state.pipeline.tenant().lookup(user.id).await?;
    if organization.is_none() && !user.is_superuser && state.pipeline.tenant().policy() == TenantPolicy::Required {
        return Err(Error::NoOrganization);
    }

    let groups = state.pipeline.authorization().group_names(user.id).await?;
    let is_organization_admin = groups.iter().any(|g| g == ORGANIZATION_ADMIN_GROUP);

    let now = Utc::now();
    let current_token = user.token.as_deref().filter(|t| !t.is_empty());
    let token = match current_token {
        Some(token) if !user.is_superuser && !token_outlived(&user, state.pipeline.user_validity(), now) => {
            token.to_string()
        }
        _ => {
            let new_token = password::generate_session_token();
            state.repo.rotate_token(user.id, &new_token, now).await?;
            if let Some(old) = current_token {
                state.caches.invalidate_token(old);
            }
            debug!(token = %abbrev_token(&new_token), "Issued new token");
            new_token
        }
    };

    info!(user_id = %user.id, superuser = user.is_superuser, "User logged in");
    Ok(Json(LoginResponse {
        token,
        email: user.email,
        is_superuser: user.is_superuser,
        is_organization_admin,
        organization_name: organization.as_ref().map(|o| o.organization_name.clone()),
        organization_id: organization.as_ref().map(|o| o.id),
    }))
}

/// Log out, revoking the caller's token
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, CurrentUser(context): CurrentUser) -> Result<Json<LogoutResponse>, Error> {
    state.repo.clear_token(context.user.id).await?;
    if let Some(token) = context.user.token.as_deref() {
        state.caches.invalidate_token(token);
    }

    Ok(Json(LogoutResponse {
        message: "Logged out".to_string(),
    }))
}
