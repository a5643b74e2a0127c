//! # Gatehouse Accounts
//!
//! The account service: user creation, login and logout, served through the
//! [`gatehouse_web`] pipeline.
//!
//! | Route | Adapters | Result |
//! |---|---|---|
//! | `POST /users` | body | `{"user_id"}` |
//! | `POST /users/login` | body | `{"user_id", "token", "expires"}` |
//! | `DELETE /users/logout` | auth | `{"logged_out": true}` |
//! | `GET /health` | none | `ok` |
//! | `GET /health/ready` | none | `{"status"}` |

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod handlers;
pub mod router;

pub use config::{Config, ConfigError};
pub use handlers::Accounts;
pub use router::build_router;
