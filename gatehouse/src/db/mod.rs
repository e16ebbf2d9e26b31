//! Database layer for data persistence and access.
//!
//! ```text
//! ┌─────────────┐
//! │  Resolvers  │  (auth::identity, auth::authorization, auth::tenant)
//! └──────┬──────┘
//!        │  AuthRepository
//!        ↓
//! ┌─────────────┐
//! │ Repositories│  (db::handlers - queries)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │  PostgreSQL │
//! └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: Repository implementations and the [`handlers::AuthRepository`] trait
//! - [`models`]: Database record structures matching table schemas
//! - [`errors`]: Database-specific error types

pub mod errors;
pub mod handlers;
pub mod models;
