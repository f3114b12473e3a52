//! Idempotent schema migrations for PostgreSQL.
//!
//! Given a *desired* schema expressed as DDL and the *current* schema of
//! a database (also expressed as DDL, usually a schema dump), this crate
//! computes the minimal ordered sequence of DDL statements that makes the
//! database structurally equal to the desired schema. Running the result
//! against an already-converged database produces nothing.
//!
//! The pipeline is a linear chain of pure steps over owned values:
//!
//! 1. [`pgdelta_sql::parse_sql`] - DDL text to a typed statement stream.
//! 2. [`schema`] + ingest - statements folded into a neutral model, with
//!    inline column constraints lifted into named constraints.
//! 3. [`diff()`] - structural comparison producing typed [`Change`]s.
//! 4. [`order`] - stable topological sort so every statement's
//!    preconditions hold when it runs.
//! 5. [`render`] - each change to a single DDL string.
//!
//! Nothing blocks, suspends or shares mutable state; calling
//! [`generate_migration`] concurrently from multiple threads is safe as
//! long as each call owns its inputs.
//!
//! # Example
//!
//! ```
//! let current = r#"CREATE TABLE users (id bigint NOT NULL, name text);"#;
//! let desired = r#"CREATE TABLE users (id bigint NOT NULL, name varchar(40));"#;
//!
//! let statements = pgdelta::generate_migration(current, desired).unwrap();
//! assert_eq!(
//!     statements,
//!     vec![r#"ALTER TABLE "public"."users" ALTER COLUMN "name" TYPE varchar(40);"#]
//! );
//!
//! // A converged database diffs to nothing.
//! assert!(pgdelta::generate_migration(desired, desired).unwrap().is_empty());
//! ```

pub mod diff;
mod error;
pub mod export;
mod ingest;
pub mod normalize;
pub mod order;
pub mod render;
pub mod schema;

pub use diff::{Change, TableRef, diff};
pub use error::Error;
pub use export::export_schema;
pub use order::{OrderedChanges, order_changes};
pub use render::render_change;
pub use schema::{
    Column, Constraint, ConstraintKind, ForeignKey, Identity, Index, Policy, Schema, Table,
    TypeDef, View,
};

/// Result type for pgdelta operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Generate the ordered DDL script that migrates `current_sql` to
/// `desired_sql`. Each element is a single statement.
pub fn generate_migration(current_sql: &str, desired_sql: &str) -> Result<Vec<String>> {
    let current = Schema::from_sql(current_sql)?;
    let desired = Schema::from_sql(desired_sql)?;
    let changes = diff(&current, &desired)?;
    let ordered = order_changes(changes, &current);
    Ok(ordered.changes.iter().map(render_change).collect())
}
