//! Database layer: error categorization, entity models and repositories.
//!
//! Repositories borrow a `&mut PgConnection`, so a caller composing a larger
//! atomic operation can hand in its own transaction connection (and keep
//! ownership of commit/rollback), while a caller passing a plain pool
//! connection lets the repository open and own its own transaction.

pub mod errors;
pub mod handlers;
pub mod models;
