//! PEM-encoded certificate and private key pair.
//!
//! Both issuance operations return one of these. The private key is kept in a
//! [`SecretSlice`] so it is zeroized on drop and never shows up in `Debug` output.

use crate::error::{crypto, input, IssueError, Result};
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use secrecy::{ExposeSecret, SecretSlice};
use std::fmt;

pub const CERTIFICATE_PEM_LABEL: &str = "CERTIFICATE";
pub const RSA_PRIVATE_KEY_PEM_LABEL: &str = "RSA PRIVATE KEY";

pub struct CertifiedKeyPem {
    certificate: Vec<u8>,
    private_key: SecretSlice<u8>,
}

impl CertifiedKeyPem {
    /// Wrap PEM bytes that are already known to belong together.
    pub fn new(certificate: Vec<u8>, private_key: Vec<u8>) -> Self {
        Self {
            certificate,
            private_key: SecretSlice::from(private_key),
        }
    }

    /// Encode a freshly built certificate and its RSA key.
    ///
    /// The certificate is written as a `CERTIFICATE` block and the key as a PKCS#1
    /// `RSA PRIVATE KEY` block.
    pub fn encode(private_key: &PKey<Private>, certificate: &X509) -> Result<Self> {
        let certificate = certificate
            .to_pem()
            .map_err(crypto("Failed to encode certificate PEM"))?;
        let rsa = private_key
            .rsa()
            .map_err(crypto("Failed to access RSA key"))?;
        let private_key = rsa
            .private_key_to_pem()
            .map_err(crypto("Failed to encode private key PEM"))?;
        Ok(Self::new(certificate, private_key))
    }

    pub fn certificate_pem(&self) -> &[u8] {
        &self.certificate
    }

    pub fn private_key_pem(&self) -> &[u8] {
        self.private_key.expose_secret()
    }

    /// Parse the certificate half.
    pub fn certificate(&self) -> Result<X509> {
        X509::from_pem(&self.certificate).map_err(input("Failed to parse certificate PEM"))
    }

    /// Parse the private key half.
    pub fn private_key(&self) -> Result<PKey<Private>> {
        PKey::private_key_from_pem(self.private_key.expose_secret())
            .map_err(input("Failed to parse private key PEM"))
    }

    /// Check that the private key is the one whose public half the certificate carries.
    pub fn check_key_matches(&self) -> Result<()> {
        let certificate = self.certificate()?;
        let private_key = self.private_key()?;
        let public_key = certificate
            .public_key()
            .map_err(input("Failed to read certificate public key"))?;
        if public_key.public_eq(&private_key) {
            Ok(())
        } else {
            Err(IssueError::InputError(
                "Private key does not match certificate".to_string(),
            ))
        }
    }
}

impl Clone for CertifiedKeyPem {
    fn clone(&self) -> Self {
        Self::new(
            self.certificate.clone(),
            self.private_key.expose_secret().to_vec(),
        )
    }
}

impl fmt::Debug for CertifiedKeyPem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertifiedKeyPem")
            .field("certificate", &String::from_utf8_lossy(&self.certificate))
            .field("private_key", &"<redacted>")
            .finish()
    }
}
