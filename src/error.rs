//! Error types for the issuance subsystem.
//!
//! Every failure of root generation or leaf issuance is terminal for that call: no partial key
//! or certificate bytes are ever returned alongside an error.

use openssl::error::ErrorStack;
use thiserror::Error;

/// Errors produced while generating, parsing, signing or verifying certificate material.
#[derive(Error, Debug)]
pub enum IssueError {
    /// Malformed or missing root material, or a domain rejected by the active policy
    #[error("Invalid input: {0}")]
    InputError(String),

    /// Key generation, certificate construction or signing failed
    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    /// Reading or writing key/certificate files failed
    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized Result type for issuance operations.
pub type Result<T> = std::result::Result<T, IssueError>;

/// Map an OpenSSL error stack into a [`IssueError::CryptoError`] tagged with the failing step.
///
/// ```
/// use localca::error::crypto;
/// # fn build() -> localca::error::Result<()> {
/// let rsa = openssl::rsa::Rsa::generate(2048).map_err(crypto("Failed to generate RSA keypair"))?;
/// # let _ = rsa;
/// # Ok(())
/// # }
/// ```
pub fn crypto(step: &'static str) -> impl FnOnce(ErrorStack) -> IssueError {
    move |e| IssueError::CryptoError(format!("{}: {}", step, e))
}

/// Same as [`crypto`] but for root material the caller handed in.
pub fn input(step: &'static str) -> impl FnOnce(ErrorStack) -> IssueError {
    move |e| IssueError::InputError(format!("{}: {}", step, e))
}
