//! Repository implementations for database access.
//!
//! # Design Pattern
//!
//! Each entity repository ([`Users`], [`Groups`], [`Organizations`]) wraps a borrowed
//! `PgConnection` and exposes strongly-typed queries. [`PgAuthRepository`] stitches them together
//! behind the [`AuthRepository`] trait, which is what the auth layer is written against so that
//! tests can substitute an in-memory implementation.
//!
//! ```ignore
//! use gatehouse::db::handlers::{AuthRepository, PgAuthRepository};
//!
//! let repo = PgAuthRepository::new(pool);
//! let user = repo.load_user_by_token("...").await?;
//! ```

pub mod groups;
pub mod organizations;
pub mod postgres;
pub mod repository;
pub mod users;

pub use groups::Groups;
pub use organizations::Organizations;
pub use postgres::PgAuthRepository;
pub use repository::AuthRepository;
pub use users::Users;
