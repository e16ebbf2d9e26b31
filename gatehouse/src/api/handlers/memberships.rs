//! Membership mutations. Each one invalidates the caches it makes stale before responding.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::memberships::{GroupsUpdate, PermissionsUpdate},
    auth::{authorization::superuser_bypass, current_user::{AuthContext, CurrentUser}},
    errors::Error,
    types::{GroupId, UserId},
};

/// Non-superusers may only manage users of their own organization.
async fn ensure_same_organization(state: &AppState, caller: &AuthContext, target: UserId) -> Result<(), Error> {
    if superuser_bypass(&caller.user) {
        return Ok(());
    }

    let target_organization = state.pipeline.tenant().lookup(target).await?;
    match (&caller.organization, target_organization) {
        (Some(own), Some(theirs)) if own.id == theirs.id => Ok(()),
        _ => Err(Error::Unauthorized {
            requirement: "same organization".to_string(),
        }),
    }
}

/// Replace a user's groups
#[tracing::instrument(skip_all)]
pub async fn set_user_groups(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(user_id): Path<UserId>,
    Json(update): Json<GroupsUpdate>,
) -> Result<StatusCode, Error> {
    ensure_same_organization(&state, &caller, user_id).await?;
    state.repo.set_user_groups(user_id, &update.groups).await?;
    state.caches.invalidate_user_groups_and_permissions(user_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Replace a user's direct permissions
#[tracing::instrument(skip_all)]
pub async fn set_user_permissions(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(user_id): Path<UserId>,
    Json(update): Json<PermissionsUpdate>,
) -> Result<StatusCode, Error> {
    ensure_same_organization(&state, &caller, user_id).await?;
    state.repo.set_user_permissions(user_id, &update.permissions).await?;
    state.caches.invalidate_user_groups_and_permissions(user_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Replace the permissions a group grants
///
/// Groups are shared by every organization, so only superusers may edit them. Every member of the
/// group is affected, so both name caches are flushed.
#[tracing::instrument(skip_all)]
pub async fn set_group_permissions(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(group_id): Path<GroupId>,
    Json(update): Json<PermissionsUpdate>,
) -> Result<StatusCode, Error> {
    if !superuser_bypass(&caller.user) {
        return Err(Error::Unauthorized {
            requirement: "superuser".to_string(),
        });
    }

    state.repo.set_group_permissions(group_id, &update.permissions).await?;
    state.caches.flush_all_groups_and_permissions();
    Ok(StatusCode::NO_CONTENT)
}
