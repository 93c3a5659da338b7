//! Tessera Error - Request-Level Error Taxonomy
//!
//! Errors that cross the public boundary of the core. Access denial inside
//! a document is never one of these: it is folded into the value node tree.
//! Only the sole top-level resource escalates a denial into
//! `TesseraError::AccessDenied`.
//!
//! Key Features:
//! - One variant per response class (400, 403, 404, 409, 415, 422, 500)
//! - Validation failures carry every violation at once
//! - HTTP status and title classification helpers
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::cacheability::Cacheability;
use thiserror::Error;

// =============================================================================
// Violation
// =============================================================================

/// A single constraint violation found while validating a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON pointer into the request document, e.g. `/data/attributes/title`.
    pub pointer: String,
    pub detail: String,
}

impl Violation {
    pub fn new(pointer: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            pointer: pointer.into(),
            detail: detail.into(),
        }
    }
}

// =============================================================================
// Error Types
// =============================================================================

/// Unified error type for all Tessera operations.
#[derive(Error, Debug)]
pub enum TesseraError {
    // Request parsing errors
    #[error("parse error: {0}")]
    Parse(String),

    #[error("field resolution error: {0}")]
    FieldResolution(String),

    // Access errors
    #[error("access denied: {detail}")]
    AccessDenied {
        detail: String,
        pointer: String,
        cacheability: Cacheability,
    },

    // Write errors
    #[error("validation failed with {} violation(s)", .0.len())]
    Validation(Vec<Violation>),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    // Protocol errors
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Type Aliases
// =============================================================================

/// Result type alias for Tessera operations.
pub type Result<T> = std::result::Result<T, TesseraError>;

// =============================================================================
// Error Classification
// =============================================================================

impl TesseraError {
    /// Convenience constructor for a denial of the primary resource.
    pub fn access_denied(detail: impl Into<String>, cacheability: Cacheability) -> Self {
        TesseraError::AccessDenied {
            detail: detail.into(),
            pointer: "/data".to_string(),
            cacheability,
        }
    }

    /// HTTP status code this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            TesseraError::Parse(_) | TesseraError::FieldResolution(_) => 400,
            TesseraError::AccessDenied { .. } => 403,
            TesseraError::NotFound(_) => 404,
            TesseraError::MethodNotAllowed(_) => 405,
            TesseraError::Conflict(_) => 409,
            TesseraError::UnsupportedMediaType(_) => 415,
            TesseraError::Validation(_) => 422,
            TesseraError::Configuration(_) | TesseraError::Io(_) | TesseraError::Internal(_) => {
                500
            }
        }
    }

    /// Reason phrase used as the `title` of rendered error objects.
    pub fn title(&self) -> &'static str {
        match self.status_code() {
            400 => "Bad Request",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            409 => "Conflict",
            415 => "Unsupported Media Type",
            422 => "Unprocessable Entity",
            _ => "Internal Server Error",
        }
    }

    /// Returns true if this is a client error (vs system error).
    pub fn is_user_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Detail text that is safe to expose to clients. System errors never
    /// leak their message.
    pub fn public_detail(&self) -> Option<String> {
        match self {
            TesseraError::Parse(msg)
            | TesseraError::FieldResolution(msg)
            | TesseraError::Conflict(msg)
            | TesseraError::NotFound(msg)
            | TesseraError::UnsupportedMediaType(msg)
            | TesseraError::MethodNotAllowed(msg) => Some(msg.clone()),
            TesseraError::AccessDenied { detail, .. } => Some(detail.clone()),
            TesseraError::Validation(_) => None,
            TesseraError::Configuration(_) | TesseraError::Io(_) | TesseraError::Internal(_) => {
                None
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
