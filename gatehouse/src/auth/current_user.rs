use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{instrument, trace};

use crate::{
    AppState,
    auth::{authorization::Requirement, caches::NameList},
    db::models::{organizations::Organization, users::User},
    errors::Error,
};

/// Identity bundle assembled once per request by the auth middleware. Immutable once attached.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    pub user: User,
    pub organization: Option<Organization>,
    /// Empty for superusers, whose names are never looked up
    pub groups: NameList,
    /// Empty for superusers, whose names are never looked up
    pub permissions: NameList,
}

impl AuthContext {
    pub fn is_organization_admin(&self) -> bool {
        self.groups.iter().any(|g| g == crate::types::ORGANIZATION_ADMIN_GROUP)
    }
}

/// Extractor for the caller's [`AuthContext`].
///
/// Behind `require_auth` this reads the context the middleware attached. On a route without the
/// middleware it runs the pipeline itself with the "any authenticated user" requirement.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Arc<AuthContext>);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip_all)]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(context) = parts.extensions.get::<Arc<AuthContext>>() {
            trace!("Using context attached by middleware");
            return Ok(CurrentUser(context.clone()));
        }

        let context = Arc::new(state.pipeline.authenticate(&parts.headers, &Requirement::authenticated()).await?);
        parts.extensions.insert(context.clone());
        Ok(CurrentUser(context))
    }
}
