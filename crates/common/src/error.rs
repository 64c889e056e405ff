//! Per-record normalization failures.
//!
//! These are counted into an [`crate::IngestReport`], never propagated as a
//! run failure: a malformed record is dropped, the batch or file continues.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NormalizeError {
    /// Malformed line or JSON that could not be decoded at all.
    #[error("parse failure: {0}")]
    Parse(String),
    /// Structurally valid record missing a required field.
    #[error("validation failure: {0}")]
    Validation(String),
}
