//! # Gatehouse Core
//!
//! Transport-independent building blocks of the Gatehouse request pipeline.
//!
//! This crate provides:
//! - [`catalog`]: the static error catalog (key → code, status, template)
//! - [`RequestError`]: structured client-facing errors
//! - [`validation`]: declarative, typed body validation
//! - [`short_id`]: the compact textual form of account identifiers
//! - [`identity`]: verified identities and login methods
//! - [`database`]: the database collaborator traits ([`Database`], [`DbSession`])
//!
//! ## Architecture Principles
//!
//! - Immutable, process-wide configuration (the catalog is a `static`)
//! - Explicit context passing (no state attached to shared request objects)
//! - Typed `Result` propagation; failures are translated at one boundary
//!
//! ## Example
//!
//! ```
//! use gatehouse_core::validation::{self, casts, required};
//! use gatehouse_core::catalog;
//! use serde_json::json;
//!
//! let specs = (required("password", casts::password),);
//! let err = validation::parse(&json!({}), &specs).unwrap_err();
//! assert!(err.to_string().contains(catalog::MISSING_KEY));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod database;
pub mod error;
pub mod identity;
pub mod short_id;
pub mod validation;

// Re-export key types for convenience
pub use catalog::CatalogEntry;
pub use database::{Credentials, Database, DbError, DbFuture, DbSession, Procedure, SessionToken};
pub use error::RequestError;
pub use identity::{Identity, LoginMethod};
pub use validation::{FieldSet, FieldSpec, ValidationError};
