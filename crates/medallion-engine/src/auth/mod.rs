//! Warehouse authentication.
//!
//! BigQuery requests carry an OAuth bearer token obtained from Application
//! Default Credentials, or a pre-issued token supplied by the environment.

mod gcp;

pub use gcp::{GcpAuth, BIGQUERY_SCOPES, STATIC_TOKEN_ENV};
