//! Authentication, authorization and tenant scoping.
//!
//! Every protected request runs through [`middleware::AuthPipeline`], which composes:
//!
//! - [`identity`]: token to user, read through the token cache
//! - [`authorization`]: group and permission names, read through their caches, plus the single
//!   superuser policy function
//! - [`tenant`]: the organization of non-superusers, governed by [`tenant::TenantPolicy`]
//!
//! The caches live in one [`caches::AuthCaches`] built at startup. They never expire; every
//! mutation of tokens, memberships or organization links must call the matching invalidation
//! hook on it.
//!
//! # Credentials
//!
//! Sessions are opaque random tokens sent as `Authorization: Token <token>` (the scheme is
//! configurable). Tokens are issued by `/authentication/login`, which is throttled per client
//! address through [`crate::cache::LoginThrottle`], and revoked by `/authentication/logout`.
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use gatehouse::auth::current_user::CurrentUser;
//!
//! async fn protected_handler(CurrentUser(context): CurrentUser) -> String {
//!     format!("Hello, {}!", context.user.username)
//! }
//! ```
//!
//! Routes with a group or permission requirement are wrapped in [`middleware::require_auth`]
//! with a [`middleware::RouteAuth`] state.

pub mod authorization;
pub mod caches;
pub mod current_user;
pub mod identity;
pub mod middleware;
pub mod password;
pub mod tenant;
pub mod two_factor;
