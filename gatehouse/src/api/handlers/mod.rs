//! HTTP request handlers.
//!
//! - [`auth`]: login, logout and dashboard info
//! - [`me`]: the caller's identity bundle
//! - [`memberships`]: group and permission mutations, which call the cache invalidation hooks
//!
//! Handlers return [`crate::errors::Error`], which converts to a status code and a JSON body
//! carrying a stable summary.

pub mod auth;
pub mod me;
pub mod memberships;
