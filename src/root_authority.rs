//! Parsed root material used to sign leaves.
//!
//! Loading fails fast: a leaf can only be issued against a certificate/key pair that parses,
//! carries an RSA key, and actually belongs together.

use crate::certified_key::CertifiedKeyPem;
use crate::error::{input, IssueError, Result};
use openssl::pkey::{Id, PKey, Private};
use openssl::x509::{X509Ref, X509};
use std::fmt;

pub struct RootAuthority {
    certificate: X509,
    private_key: PKey<Private>,
}

impl RootAuthority {
    /// Parse a PEM root certificate and its PEM private key.
    ///
    /// Accepts PKCS#1 (`RSA PRIVATE KEY`) as written by this tool as well as PKCS#8 keys.
    pub fn from_pem(certificate_pem: &[u8], private_key_pem: &[u8]) -> Result<Self> {
        if certificate_pem.is_empty() {
            return Err(IssueError::InputError(
                "Root certificate is empty".to_string(),
            ));
        }
        if private_key_pem.is_empty() {
            return Err(IssueError::InputError("Root private key is empty".to_string()));
        }

        let certificate =
            X509::from_pem(certificate_pem).map_err(input("Failed to parse root certificate"))?;
        let private_key = PKey::private_key_from_pem(private_key_pem)
            .map_err(input("Failed to parse root private key"))?;

        Self::new(certificate, private_key)
    }

    pub fn from_certified_key(root: &CertifiedKeyPem) -> Result<Self> {
        Self::from_pem(root.certificate_pem(), root.private_key_pem())
    }

    pub fn new(certificate: X509, private_key: PKey<Private>) -> Result<Self> {
        if private_key.id() != Id::RSA {
            return Err(IssueError::InputError(format!(
                "Root private key must be RSA, found {:?}",
                private_key.id()
            )));
        }

        let public_key = certificate
            .public_key()
            .map_err(input("Failed to read root certificate public key"))?;
        if !public_key.public_eq(&private_key) {
            return Err(IssueError::InputError(
                "Root private key does not match root certificate".to_string(),
            ));
        }

        Ok(Self {
            certificate,
            private_key,
        })
    }

    pub fn certificate(&self) -> &X509Ref {
        &self.certificate
    }

    pub(crate) fn private_key(&self) -> &PKey<Private> {
        &self.private_key
    }
}

impl fmt::Debug for RootAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootAuthority")
            .field("subject", &self.certificate.subject_name())
            .field("private_key", &"<securely stored>")
            .finish()
    }
}
