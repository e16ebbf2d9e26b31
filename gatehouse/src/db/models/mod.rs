//! Database record models matching table schemas.
//!
//! These structs correspond directly to rows returned by the repository queries and derive
//! `sqlx::FromRow`. They are distinct from the API response models in [`crate::api::models`].
//!
//! - [`users`]: User accounts, session token and login bookkeeping
//! - [`organizations`]: Tenants that non-superusers belong to

pub mod organizations;
pub mod users;
