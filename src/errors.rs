//! Application-level error taxonomy.
//!
//! Operation outcomes (rejections, server failures) are domain values in
//! `workflow`, not errors. `AppError` covers the faults that prevent an
//! operation from being attempted at all.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("failed to persist settings: {0}")]
    Persist(#[from] std::io::Error),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("no API key is stored; set one before submitting files")]
    MissingKey,
}
