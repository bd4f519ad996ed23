//! Slate DB - Database abstractions
//!
//! SQLx-based persistence for the entitlement engine. Every store the engine
//! depends on is described by an async repository trait in [`repo`], with a
//! PostgreSQL implementation in [`pg`].
//!
//! # Example
//!
//! ```rust,ignore
//! use slate_db::{create_pool, run_migrations, Repositories};
//!
//! let pool = create_pool("postgres://localhost/slate").await?;
//! run_migrations(&pool).await?;
//! let repos = Repositories::new(pool);
//!
//! let row = repos.entitlements.find_by_id("firebase-uid").await?;
//! ```

pub mod error;
pub mod models;
pub mod pg;
pub mod pool;
pub mod repo;

pub use error::{DbError, DbResult};
pub use models::*;
pub use pg::Repositories;
pub use pool::{create_pool, create_pool_with_options, run_migrations, DbPool, PoolOptions};
pub use repo::*;
