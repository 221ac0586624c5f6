//! Root CA Certificate Generation Module
//!
//! Produces the self-signed trust anchor that every leaf issued by this tool chains to.
//!
//! # Certificate Properties
//! - **Self-signed**: Issuer and subject are the same, signed with the freshly generated key
//! - **Key Usage**: digitalSignature, keyCertSign (critical)
//! - **Extended Key Usage**: serverAuth, clientAuth
//! - **Basic Constraints**: CA=true (critical)
//! - **Key Size**: RSA 4096-bit
//! - **Validity**: now .. now + ~1000 years, a stand-in for "never expires" that still gives
//!   relying parties a concrete notAfter
//! - **Version**: X.509v3 with extensions
//!
//! Regenerating the root invalidates trust for every leaf issued under the previous one: they
//! stay parseable but no longer chain.
//!
//! # Example
//! ```rust,no_run
//! # fn example() -> localca::error::Result<()> {
//! let root = localca::generate_root_ca::generate_root_ca()?;
//! std::fs::write("ca.cer", root.certificate_pem())?;
//! std::fs::write("ca.key", root.private_key_pem())?;
//! # Ok(())
//! # }
//! ```

use crate::certified_key::CertifiedKeyPem;
use crate::error::{crypto, IssueError, Result};
use crate::serial::SerialSource;
use crate::subject::SubjectIdentity;
use openssl::asn1::Asn1Time;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectKeyIdentifier,
};
use openssl::x509::X509;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

pub(crate) const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
pub const ROOT_RSA_KEY_BITS: u32 = 4096;
/// Roughly 1000 years, counting leap days.
pub const FOREVER_VALIDITY_DAYS: u32 = 365_242;
const SECONDS_PER_DAY: i64 = 86_400;

/// Generate a root CA with the default identity and policy.
///
/// Returns the PEM certificate and the PEM (`RSA PRIVATE KEY`) private key. Nothing is written
/// to disk; persisting both halves is the caller's job.
pub fn generate_root_ca() -> Result<CertifiedKeyPem> {
    RsaRootCABuilder::new().build()
}

/// Builder for the RSA key pair and self-signed root CA certificate.
#[derive(Debug, Clone)]
pub struct RsaRootCABuilder {
    subject: SubjectIdentity,
    key_bits: u32,
    validity_days: u32,
    serial_source: SerialSource,
}

impl Default for RsaRootCABuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RsaRootCABuilder {
    pub fn new() -> Self {
        Self {
            subject: SubjectIdentity::root_default(),
            key_bits: ROOT_RSA_KEY_BITS,
            validity_days: FOREVER_VALIDITY_DAYS,
            serial_source: SerialSource::default(),
        }
    }

    /// Replace the CA's distinguished name.
    pub fn subject(mut self, subject: SubjectIdentity) -> Self {
        self.subject = subject;
        self
    }

    /// RSA modulus size. 4096 unless a test needs something faster.
    pub fn key_bits(mut self, bits: u32) -> Self {
        self.key_bits = bits;
        self
    }

    pub fn validity_days(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }

    pub fn serial_source(mut self, source: SerialSource) -> Self {
        self.serial_source = source;
        self
    }

    /// Generate the key pair and certificate and encode both as PEM.
    pub fn build(self) -> Result<CertifiedKeyPem> {
        let (private_key, certificate) = self.build_x509()?;
        CertifiedKeyPem::encode(&private_key, &certificate)
    }

    /// Generate the key pair and certificate without encoding them.
    pub fn build_x509(self) -> Result<(PKey<Private>, X509)> {
        let rsa = Rsa::generate(self.key_bits).map_err(crypto("Failed to generate RSA keypair"))?;
        let private_key = PKey::from_rsa(rsa).map_err(crypto("Failed to create private key"))?;

        let mut builder = X509::builder().map_err(crypto("Failed to create X509 builder"))?;
        builder
            .set_version(X509_VERSION_3)
            .map_err(crypto("Failed to set version"))?;

        let serial = self.serial_source.next_serial()?;
        debug!(serial = %serial, "root CA serial drawn");
        let asn1_serial = serial
            .to_asn1_integer()
            .map_err(crypto("Failed to convert serial"))?;
        builder
            .set_serial_number(&asn1_serial)
            .map_err(crypto("Failed to set serial number"))?;

        let name = self.subject.to_x509_name()?;
        builder
            .set_subject_name(&name)
            .map_err(crypto("Failed to set subject"))?;
        builder
            .set_issuer_name(&name)
            .map_err(crypto("Failed to set issuer"))?;

        let (not_before, not_after) = validity_window(self.validity_days)?;
        builder
            .set_not_before(&not_before)
            .map_err(crypto("Failed to set not_before"))?;
        builder
            .set_not_after(&not_after)
            .map_err(crypto("Failed to set not_after"))?;

        builder
            .set_pubkey(&private_key)
            .map_err(crypto("Failed to set public key"))?;

        let bc = BasicConstraints::new()
            .critical()
            .ca()
            .build()
            .map_err(crypto("Failed to build BasicConstraints"))?;
        builder
            .append_extension(bc)
            .map_err(crypto("Failed to add BasicConstraints"))?;

        let ku = KeyUsage::new()
            .critical()
            .digital_signature()
            .key_cert_sign()
            .build()
            .map_err(crypto("Failed to build KeyUsage"))?;
        builder
            .append_extension(ku)
            .map_err(crypto("Failed to add KeyUsage"))?;

        let eku = ExtendedKeyUsage::new()
            .server_auth()
            .client_auth()
            .build()
            .map_err(crypto("Failed to build ExtendedKeyUsage"))?;
        builder
            .append_extension(eku)
            .map_err(crypto("Failed to add ExtendedKeyUsage"))?;

        // Leaves reference this through their AuthorityKeyIdentifier
        let ski = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(None, None))
            .map_err(crypto("Failed to build SubjectKeyIdentifier"))?;
        builder
            .append_extension(ski)
            .map_err(crypto("Failed to add SubjectKeyIdentifier"))?;

        builder
            .sign(&private_key, MessageDigest::sha256())
            .map_err(crypto("Failed to sign certificate"))?;

        Ok((private_key, builder.build()))
    }
}

/// `(now, now + days)` as certificate times.
///
/// Computed from Unix seconds in 64-bit arithmetic, so a ~1000-year window does not overflow
/// where the C `long` is 32 bits.
pub(crate) fn validity_window(days: u32) -> Result<(Asn1Time, Asn1Time)> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| IssueError::CryptoError(format!("System clock before Unix epoch: {}", e)))?;
    let now = i64::try_from(now.as_secs())
        .map_err(|_| IssueError::CryptoError("System clock out of range".to_string()))?;
    let expiry = now
        .checked_add(i64::from(days) * SECONDS_PER_DAY)
        .ok_or_else(|| IssueError::CryptoError("Validity window out of range".to_string()))?;

    let not_before = Asn1Time::from_unix(to_time_t(now)?)
        .map_err(crypto("Failed to create not_before"))?;
    let not_after = Asn1Time::from_unix(to_time_t(expiry)?)
        .map_err(crypto("Failed to create not_after"))?;
    Ok((not_before, not_after))
}

fn to_time_t<T: TryFrom<i64>>(secs: i64) -> Result<T> {
    T::try_from(secs).map_err(|_| {
        IssueError::CryptoError(format!("Time {} does not fit the platform time_t", secs))
    })
}
