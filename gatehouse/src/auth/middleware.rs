//! Per-request authentication pipeline and the axum middleware that runs it.
//!
//! The pipeline walks these states in order. Any failure ends the request and no context is
//! attached:
//!
//! 1. extract the token from the credential header
//! 2. resolve the user
//! 3. reject inactive non-superusers
//! 4. reject tokens older than the role's validity window
//! 5. check the route requirement
//! 6. persist `last_login` if the tracking window has passed, dropping the cached user
//! 7. resolve the organization of non-superusers
//! 8. attach the [`AuthContext`]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, instrument};

use crate::{
    auth::{
        authorization::{AuthorizationResolver, Requirement, superuser_bypass},
        caches::{AuthCaches, NameList},
        current_user::AuthContext,
        identity::IdentityResolver,
        tenant::TenantResolver,
    },
    config::AuthConfig,
    db::{handlers::AuthRepository, models::users::User},
    errors::{Error, Result},
};

fn window(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// `true` when `since + window` lies strictly before `now`. Overflow counts as "not yet".
fn elapsed(since: DateTime<Utc>, window: TimeDelta, now: DateTime<Utc>) -> bool {
    since.checked_add_signed(window).is_some_and(|deadline| deadline < now)
}

/// Whether `user`'s token is older than `validity` at `now`. A user without a token creation time
/// is always expired.
pub fn token_outlived(user: &User, validity: TimeDelta, now: DateTime<Utc>) -> bool {
    user.token_created_at.is_none_or(|created| elapsed(created, validity, now))
}

#[derive(Clone)]
pub struct AuthPipeline {
    caches: Arc<AuthCaches>,
    repo: Arc<dyn AuthRepository>,
    identity: IdentityResolver,
    authorization: AuthorizationResolver,
    tenant: TenantResolver,
    scheme_prefix: String,
    user_validity: TimeDelta,
    superuser_validity: TimeDelta,
    last_login_tracking: TimeDelta,
}

impl AuthPipeline {
    pub fn new(config: &AuthConfig, caches: Arc<AuthCaches>, repo: Arc<dyn AuthRepository>) -> Self {
        Self {
            identity: IdentityResolver::new(caches.clone(), repo.clone()),
            authorization: AuthorizationResolver::new(caches.clone(), repo.clone()),
            tenant: TenantResolver::new(caches.clone(), repo.clone(), config.tenant_policy, config.cache_organizations),
            caches,
            repo,
            scheme_prefix: format!("{} ", config.token_scheme),
            user_validity: window(config.user_token_validity),
            superuser_validity: window(config.superuser_token_validity),
            last_login_tracking: window(config.last_login_tracking),
        }
    }

    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    pub fn authorization(&self) -> &AuthorizationResolver {
        &self.authorization
    }

    pub fn tenant(&self) -> &TenantResolver {
        &self.tenant
    }

    /// Validity window of a regular user's token.
    pub fn user_validity(&self) -> TimeDelta {
        self.user_validity
    }

    /// Whether `user`'s token is past the validity window of their role.
    pub fn token_expired(&self, user: &User, now: DateTime<Utc>) -> bool {
        let validity = if superuser_bypass(user) {
            self.superuser_validity
        } else {
            self.user_validity
        };
        token_outlived(user, validity, now)
    }

    /// Pull the token out of `<scheme> <token>`. A missing header yields an empty token.
    pub fn extract_token<'h>(&self, headers: &'h HeaderMap) -> Result<&'h str> {
        let Some(value) = headers.get(AUTHORIZATION) else {
            return Ok("");
        };
        let value = value.to_str().map_err(|_| Error::InvalidToken {
            reason: "credential header is not valid ASCII".to_string(),
        })?;
        value.strip_prefix(self.scheme_prefix.as_str()).map(str::trim).ok_or_else(|| Error::InvalidToken {
            reason: format!("credential header does not use the '{}' scheme", self.scheme_prefix.trim_end()),
        })
    }

    pub async fn authenticate(&self, headers: &HeaderMap, requirement: &Requirement) -> Result<AuthContext> {
        let token = self.extract_token(headers)?;
        self.authenticate_at(token, requirement, Utc::now()).await
    }

    /// Run states 2 to 8 for an already extracted token as of `now`.
    #[instrument(skip_all, fields(requirement = %requirement, user_id = tracing::field::Empty), err)]
    pub async fn authenticate_at(&self, token: &str, requirement: &Requirement, now: DateTime<Utc>) -> Result<AuthContext> {
        let mut user = self.identity.resolve_by_token(token).await?;
        tracing::Span::current().record("user_id", tracing::field::display(user.id));

        if !user.is_active && !user.is_superuser {
            return Err(Error::InactiveUser);
        }

        if self.token_expired(&user, now) {
            info!(superuser = user.is_superuser, "Rejecting expired token");
            return Err(Error::TokenExpired {
                superuser: user.is_superuser,
            });
        }

        self.authorization.authorize(&user, requirement).await?;

        if user.last_login.is_none_or(|last| elapsed(last, self.last_login_tracking, now)) {
            user = self.repo.update_last_login(user.id, now).await?;
            self.caches.invalidate_token(token);
            debug!("Recorded last login");
        }

        let organization = self.tenant.resolve_organization(&user).await?;

        let (groups, permissions): (NameList, NameList) = if superuser_bypass(&user) {
            (Arc::default(), Arc::default())
        } else {
            (
                self.authorization.group_names(user.id).await?,
                self.authorization.permission_names(user.id).await?,
            )
        };

        Ok(AuthContext {
            user,
            organization,
            groups,
            permissions,
        })
    }
}

/// State for one protected route group: the pipeline plus what the routes require.
#[derive(Clone)]
pub struct RouteAuth {
    pub pipeline: AuthPipeline,
    pub requirement: Arc<Requirement>,
}

impl RouteAuth {
    pub fn new(pipeline: AuthPipeline, requirement: Requirement) -> Self {
        Self {
            pipeline,
            requirement: Arc::new(requirement),
        }
    }
}

/// Middleware guarding a route group. On success the handler finds an `Arc<AuthContext>` in the
/// request extensions (see [`CurrentUser`](crate::auth::current_user::CurrentUser)).
pub async fn require_auth(State(auth): State<RouteAuth>, mut request: Request, next: Next) -> Result<Response> {
    let context = auth.pipeline.authenticate(request.headers(), &auth.requirement).await?;
    request.extensions_mut().insert(Arc::new(context));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::tenant::TenantPolicy,
        test_utils::{MockRepository, create_test_user},
    };
    use axum::http::HeaderValue;

    fn pipeline(repo: &Arc<MockRepository>) -> (AuthPipeline, Arc<AuthCaches>) {
        pipeline_with(repo, AuthConfig::default())
    }

    fn pipeline_with(repo: &Arc<MockRepository>, config: AuthConfig) -> (AuthPipeline, Arc<AuthCaches>) {
        let caches = Arc::new(AuthCaches::new());
        (AuthPipeline::new(&config, caches.clone(), repo.clone()), caches)
    }

    fn token_of(user: &User) -> String {
        user.token.clone().unwrap()
    }

    #[test]
    fn test_extract_token() {
        let repo = Arc::new(MockRepository::new());
        let (pipeline, _) = pipeline(&repo);

        let mut headers = HeaderMap::new();
        assert_eq!(pipeline.extract_token(&headers).unwrap(), "");

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Token abc123"));
        assert_eq!(pipeline.extract_token(&headers).unwrap(), "abc123");

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Token "));
        assert_eq!(pipeline.extract_token(&headers).unwrap(), "");

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert!(matches!(pipeline.extract_token(&headers), Err(Error::InvalidToken { .. })));
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_header_is_blank_token() {
        let repo = Arc::new(MockRepository::new());
        let (pipeline, _) = pipeline(&repo);

        let err = pipeline
            .authenticate(&HeaderMap::new(), &Requirement::authenticated())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BlankToken));
        assert_eq!(repo.calls.user_by_token(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_inactive_user_rejected_but_inactive_superuser_allowed() {
        let repo = Arc::new(MockRepository::new());
        let mut user = create_test_user("alice@example.com", false);
        user.is_active = false;
        let mut root = create_test_user("root@example.com", true);
        root.is_active = false;
        repo.add_user(user.clone());
        repo.add_user(root.clone());
        let (pipeline, _) = pipeline(&repo);

        let err = pipeline
            .authenticate_at(&token_of(&user), &Requirement::authenticated(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InactiveUser));

        pipeline
            .authenticate_at(&token_of(&root), &Requirement::authenticated(), Utc::now())
            .await
            .unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn test_expiry_depends_on_role() {
        let repo = Arc::new(MockRepository::new());
        let issued = Utc::now();
        let mut user = create_test_user("alice@example.com", false);
        let mut root = create_test_user("root@example.com", true);
        user.token_created_at = Some(issued);
        root.token_created_at = Some(issued);
        repo.add_user(user.clone());
        repo.add_user(root.clone());

        let mut config = AuthConfig::default();
        config.user_token_validity = Duration::from_secs(30 * 60);
        config.superuser_token_validity = Duration::from_secs(120 * 60);
        let (pipeline, _) = pipeline_with(&repo, config);

        let later = issued + TimeDelta::minutes(31);
        let err = pipeline
            .authenticate_at(&token_of(&user), &Requirement::authenticated(), later)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TokenExpired { superuser: false }));

        pipeline
            .authenticate_at(&token_of(&root), &Requirement::authenticated(), later)
            .await
            .unwrap();

        let much_later = issued + TimeDelta::minutes(121);
        let err = pipeline
            .authenticate_at(&token_of(&root), &Requirement::authenticated(), much_later)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TokenExpired { superuser: true }));
    }

    #[test_log::test(tokio::test)]
    async fn test_token_at_exact_deadline_is_still_valid() {
        let repo = Arc::new(MockRepository::new());
        let user = create_test_user("alice@example.com", false);
        repo.add_user(user.clone());
        let (pipeline, _) = pipeline(&repo);

        let deadline = user.token_created_at.unwrap() + TimeDelta::minutes(30);
        assert!(!pipeline.token_expired(&user, deadline));
        assert!(pipeline.token_expired(&user, deadline + TimeDelta::seconds(1)));
    }

    #[test]
    fn test_missing_token_creation_time_is_expired() {
        let mut user = create_test_user("alice@example.com", false);
        let now = Utc::now();
        assert!(!token_outlived(&user, TimeDelta::minutes(30), now));

        user.token_created_at = None;
        assert!(token_outlived(&user, TimeDelta::MAX, now));
    }

    #[test_log::test(tokio::test)]
    async fn test_last_login_touch_is_rate_limited() {
        let repo = Arc::new(MockRepository::new());
        let user = create_test_user("alice@example.com", false);
        let token = token_of(&user);
        repo.add_user(user.clone());
        let (pipeline, caches) = pipeline(&repo);
        let start = user.last_login.unwrap();

        // Within the tracking window: nothing is written
        pipeline
            .authenticate_at(&token, &Requirement::authenticated(), start + TimeDelta::minutes(5))
            .await
            .unwrap();
        assert_eq!(repo.calls.update_last_login(), 0);
        assert_eq!(caches.users.len(), 1);

        // Past it: one write, and the cached row is dropped
        let touched_at = start + TimeDelta::minutes(11);
        let context = pipeline
            .authenticate_at(&token, &Requirement::authenticated(), touched_at)
            .await
            .unwrap();
        assert_eq!(repo.calls.update_last_login(), 1);
        assert_eq!(context.user.last_login, Some(touched_at));
        assert!(caches.users.is_empty());

        // The next request reloads the fresh row and does not write again
        pipeline
            .authenticate_at(&token, &Requirement::authenticated(), touched_at + TimeDelta::minutes(1))
            .await
            .unwrap();
        assert_eq!(repo.calls.update_last_login(), 1);
        assert_eq!(repo.calls.user_by_token(), 2);
    }

    #[test_log::test(tokio::test)]
    async fn test_superuser_context_skips_name_lookups() {
        let repo = Arc::new(MockRepository::new());
        let root = create_test_user("root@example.com", true);
        repo.add_user(root.clone());
        let (pipeline, _) = pipeline(&repo);

        let context = pipeline
            .authenticate_at(&token_of(&root), &Requirement::permission("can_control"), Utc::now())
            .await
            .unwrap();
        assert!(context.groups.is_empty());
        assert!(context.organization.is_none());
        assert_eq!(repo.calls.group_names() + repo.calls.permission_names() + repo.calls.organization(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_context_bundle_for_regular_user() {
        let repo = Arc::new(MockRepository::new());
        let user = create_test_user("alice@example.com", false);
        repo.add_user(user.clone());
        repo.add_group("organizationadmin", &["can_manage_users"]);
        repo.add_user_to_group(user.id, "organizationadmin");
        let organization = repo.link_organization(user.id, "Acme");
        let (pipeline, _) = pipeline(&repo);

        let context = pipeline
            .authenticate_at(&token_of(&user), &Requirement::permission("can_manage_users"), Utc::now())
            .await
            .unwrap();
        assert_eq!(context.user.id, user.id);
        assert_eq!(context.organization, Some(organization));
        assert_eq!(*context.groups, vec!["organizationadmin".to_string()]);
        assert_eq!(*context.permissions, vec!["can_manage_users".to_string()]);
        assert!(context.is_organization_admin());
    }

    #[test_log::test(tokio::test)]
    async fn test_required_tenant_policy_rejects_unlinked_user() {
        let repo = Arc::new(MockRepository::new());
        let user = create_test_user("alice@example.com", false);
        repo.add_user(user.clone());
        let mut config = AuthConfig::default();
        config.tenant_policy = TenantPolicy::Required;
        let (pipeline, _) = pipeline_with(&repo, config);

        let err = pipeline
            .authenticate_at(&token_of(&user), &Requirement::authenticated(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoOrganization));
    }

    #[test_log::test(tokio::test)]
    async fn test_grant_then_invalidate_takes_effect_immediately() {
        let repo = Arc::new(MockRepository::new());
        let user = create_test_user("alice@example.com", false);
        let token = token_of(&user);
        repo.add_user(user.clone());
        repo.add_permission("can_control");
        let (pipeline, caches) = pipeline(&repo);
        let requirement = Requirement::permission("can_control");

        let err = pipeline.authenticate_at(&token, &requirement, Utc::now()).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized { .. }));

        // Granted but not yet invalidated: the cached list still wins
        repo.grant_permission(user.id, "can_control");
        assert!(pipeline.authenticate_at(&token, &requirement, Utc::now()).await.is_err());

        caches.invalidate_user_groups_and_permissions(user.id);
        pipeline.authenticate_at(&token, &requirement, Utc::now()).await.unwrap();
    }
}
