use axum::Json;

use crate::{api::models::users::MeResponse, auth::current_user::CurrentUser};

/// Get the caller's identity bundle
#[tracing::instrument(skip_all)]
pub async fn get_me(CurrentUser(context): CurrentUser) -> Json<MeResponse> {
    Json(MeResponse::from(context.as_ref()))
}
