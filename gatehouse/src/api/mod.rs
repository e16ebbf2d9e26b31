//! HTTP API: route handlers and their request/response models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: JSON bodies exchanged with clients
//!
//! # API Structure
//!
//! - **Authentication** (`/authentication/*`): login info, login, logout
//! - **Identity** (`/admin/api/v1/me`): the caller's user, organization, groups and permissions
//! - **Memberships** (`/admin/api/v1/users/{id}/*`): group and permission assignment within the
//!   caller's organization, restricted to organization admins and holders of `can_manage_users`
//! - **Group permissions** (`/admin/api/v1/groups/{id}/permissions`): superusers only, since
//!   groups are shared across organizations

pub mod handlers;
pub mod models;
