//! Token to user resolution, read through the token cache.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::{
    auth::caches::AuthCaches,
    db::{handlers::AuthRepository, models::users::User},
    errors::{Error, Result},
    types::abbrev_token,
};

#[derive(Clone)]
pub struct IdentityResolver {
    caches: Arc<AuthCaches>,
    repo: Arc<dyn AuthRepository>,
}

impl IdentityResolver {
    pub fn new(caches: Arc<AuthCaches>, repo: Arc<dyn AuthRepository>) -> Self {
        Self { caches, repo }
    }

    /// Resolve `token` to the user it currently belongs to.
    ///
    /// A blank token fails before the cache or the database is consulted. A cached entry that no
    /// longer decodes as a [`User`] is ignored and replaced by a fresh database load. Lookup
    /// failures and unknown tokens are never cached.
    #[instrument(skip_all, fields(token = %abbrev_token(token)), err)]
    pub async fn resolve_by_token(&self, token: &str) -> Result<User> {
        if token.is_empty() {
            return Err(Error::BlankToken);
        }

        if let Some(cached) = self.caches.users.get(token) {
            match serde_json::from_value::<User>(cached) {
                Ok(user) => {
                    debug!(user_id = %user.id, "Token cache hit");
                    return Ok(user);
                }
                Err(e) => warn!("Discarding undecodable token cache entry: {}", e),
            }
        }

        let user = self
            .repo
            .load_user_by_token(token)
            .await
            .map_err(|e| Error::InvalidToken { reason: e.to_string() })?
            .ok_or_else(|| Error::InvalidToken {
                reason: "no user holds this token".to_string(),
            })?;

        let snapshot = serde_json::to_value(&user).map_err(anyhow::Error::from)?;
        self.caches.users.set(token.to_string(), snapshot);
        debug!(user_id = %user.id, "Token cache populated");
        Ok(user)
    }
}
