//! Leaf (server) certificate issuance.
//!
//! A leaf binds exactly one domain name: it is the subject common name and the only subject
//! alternative name. The leaf gets its own RSA-2048 key and is signed with the root's key, so
//! its issuer is the root's subject and its signature verifies under the root's public key.
//!
//! # Certificate Properties
//! - **Signed by**: the loaded root CA
//! - **Key Usage**: digitalSignature only (critical); no certificate signing right
//! - **Extended Key Usage**: serverAuth, clientAuth
//! - **Basic Constraints**: CA=false (critical)
//! - **Subject Alternative Name**: DNS:`<domain>`
//! - **Key Size**: RSA 2048-bit
//! - **Validity**: now .. now + ~1000 years
//!
//! Issuing twice for the same domain yields two independent, equally valid leaves. There is no
//! caching by domain.
//!
//! # Example
//! ```rust,no_run
//! # fn example() -> localca::error::Result<()> {
//! let root_cert = std::fs::read("ca.cer")?;
//! let root_key = std::fs::read("ca.key")?;
//! let leaf = localca::issue_leaf::issue_leaf("localhost", &root_cert, &root_key)?;
//! std::fs::write("localhost.key", leaf.private_key_pem())?;
//! std::fs::write("localhost.cer", leaf.certificate_pem())?;
//! # Ok(())
//! # }
//! ```

use crate::certified_key::CertifiedKeyPem;
use crate::domain_policy::DomainPolicy;
use crate::error::{crypto, IssueError, Result};
use crate::generate_root_ca::{validity_window, FOREVER_VALIDITY_DAYS, X509_VERSION_3};
use crate::root_authority::RootAuthority;
use crate::serial::SerialSource;
use crate::subject::{SubjectIdentity, DEFAULT_COUNTRY, DEFAULT_ORGANIZATION};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
};
use openssl::x509::X509;
use std::num::NonZeroUsize;
use std::thread;
use tracing::{debug, info};

pub const LEAF_RSA_KEY_BITS: u32 = 2048;

/// Issue one leaf for `domain` from PEM root material with the default policy.
///
/// Returns the leaf certificate and its private key, both PEM. Root material that does not
/// parse is an [`IssueError::InputError`] and nothing is produced.
pub fn issue_leaf(
    domain: &str,
    root_certificate_pem: &[u8],
    root_private_key_pem: &[u8],
) -> Result<CertifiedKeyPem> {
    let root = RootAuthority::from_pem(root_certificate_pem, root_private_key_pem)?;
    LeafIssuer::new(root).issue(domain)
}

/// Knobs for leaf issuance.
#[derive(Debug, Clone)]
pub struct LeafPolicy {
    pub domain_policy: DomainPolicy,
    pub serial_source: SerialSource,
    pub key_bits: u32,
    pub validity_days: u32,
    pub organization: String,
    pub country: String,
}

impl Default for LeafPolicy {
    fn default() -> Self {
        Self {
            domain_policy: DomainPolicy::default(),
            serial_source: SerialSource::default(),
            key_bits: LEAF_RSA_KEY_BITS,
            validity_days: FOREVER_VALIDITY_DAYS,
            organization: DEFAULT_ORGANIZATION.to_string(),
            country: DEFAULT_COUNTRY.to_string(),
        }
    }
}

/// Signs leaves with a borrowed-for-life root. Holds no mutable state, so one issuer can be
/// shared across threads.
#[derive(Debug)]
pub struct LeafIssuer {
    root: RootAuthority,
    policy: LeafPolicy,
}

impl LeafIssuer {
    pub fn new(root: RootAuthority) -> Self {
        Self::with_policy(root, LeafPolicy::default())
    }

    pub fn with_policy(root: RootAuthority, policy: LeafPolicy) -> Self {
        Self { root, policy }
    }

    pub fn root(&self) -> &RootAuthority {
        &self.root
    }

    pub fn policy(&self) -> &LeafPolicy {
        &self.policy
    }

    /// Issue a single leaf for `domain`.
    pub fn issue(&self, domain: &str) -> Result<CertifiedKeyPem> {
        let (private_key, certificate) = self.issue_x509(domain)?;
        let pair = CertifiedKeyPem::encode(&private_key, &certificate)?;
        info!(domain, "issued leaf certificate");
        Ok(pair)
    }

    /// Issue one leaf per domain, concurrently.
    ///
    /// Domains are split into contiguous chunks, one scoped thread per chunk, with no more
    /// threads than the machine's available parallelism. Results come back in input order and
    /// fail independently.
    pub fn issue_many<S: AsRef<str> + Sync>(&self, domains: &[S]) -> Vec<Result<CertifiedKeyPem>> {
        let workers = worker_count(domains.len());
        if workers == 0 {
            return Vec::new();
        }
        let chunk_size = domains.len().div_ceil(workers);

        thread::scope(|scope| {
            let handles: Vec<_> = domains
                .chunks(chunk_size)
                .map(|chunk| {
                    let handle = scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|domain| self.issue(domain.as_ref()))
                            .collect::<Vec<_>>()
                    });
                    (chunk.len(), handle)
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|(len, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        (0..len)
                            .map(|_| {
                                Err(IssueError::CryptoError(
                                    "Issuance thread panicked".to_string(),
                                ))
                            })
                            .collect()
                    })
                })
                .collect()
        })
    }

    /// Build and sign the leaf without encoding it.
    pub fn issue_x509(&self, domain: &str) -> Result<(PKey<Private>, X509)> {
        self.policy.domain_policy.check(domain)?;

        let rsa = Rsa::generate(self.policy.key_bits)
            .map_err(crypto("Failed to generate RSA keypair"))?;
        let private_key = PKey::from_rsa(rsa).map_err(crypto("Failed to create private key"))?;

        let signing_cert = self.root.certificate();

        let mut builder = X509::builder().map_err(crypto("Failed to create X509 builder"))?;
        builder
            .set_version(X509_VERSION_3)
            .map_err(crypto("Failed to set version"))?;

        let serial = self.policy.serial_source.next_serial()?;
        debug!(domain, serial = %serial, "leaf serial drawn");
        let asn1_serial = serial
            .to_asn1_integer()
            .map_err(crypto("Failed to convert serial"))?;
        builder
            .set_serial_number(&asn1_serial)
            .map_err(crypto("Failed to set serial number"))?;

        let subject =
            SubjectIdentity::leaf(&self.policy.organization, &self.policy.country, domain)
                .to_x509_name()?;
        builder
            .set_subject_name(&subject)
            .map_err(crypto("Failed to set subject"))?;
        builder
            .set_issuer_name(signing_cert.subject_name())
            .map_err(crypto("Failed to set issuer from root CA"))?;

        let (not_before, not_after) = validity_window(self.policy.validity_days)?;
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
            .build()
            .map_err(crypto("Failed to build BasicConstraints"))?;
        builder
            .append_extension(bc)
            .map_err(crypto("Failed to add BasicConstraints"))?;

        let ku = KeyUsage::new()
            .critical()
            .digital_signature()
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

        let san = SubjectAlternativeName::new()
            .dns(domain)
            .build(&builder.x509v3_context(Some(signing_cert), None))
            .map_err(crypto("Failed to build SubjectAlternativeName"))?;
        builder
            .append_extension(san)
            .map_err(crypto("Failed to add SubjectAlternativeName"))?;

        // keyid is copied only when the root carries a SubjectKeyIdentifier
        let aki = AuthorityKeyIdentifier::new()
            .keyid(false)
            .build(&builder.x509v3_context(Some(signing_cert), None))
            .map_err(crypto("Failed to build AuthorityKeyIdentifier"))?;
        builder
            .append_extension(aki)
            .map_err(crypto("Failed to add AuthorityKeyIdentifier"))?;

        builder
            .sign(self.root.private_key(), MessageDigest::sha256())
            .map_err(crypto("Failed to sign certificate"))?;

        Ok((private_key, builder.build()))
    }
}

/// Threads to use for `jobs` issuances: at most one per job and per available core.
fn worker_count(jobs: usize) -> usize {
    let cores = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    jobs.min(cores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_root_ca::RsaRootCABuilder;
    use openssl::nid::Nid;
    use openssl::x509::X509VerifyResult;

    fn quick_issuer(policy: LeafPolicy) -> LeafIssuer {
        let (key, cert) = RsaRootCABuilder::new().key_bits(2048).build_x509().unwrap();
        LeafIssuer::with_policy(RootAuthority::new(cert, key).unwrap(), policy)
    }

    fn san_dns_names(cert: &X509) -> Vec<String> {
        cert.subject_alt_names()
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| n.dnsname().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_leaf_signed_by_root() {
        let issuer = quick_issuer(LeafPolicy::default());
        let (_, leaf) = issuer.issue_x509("localhost").unwrap();
        let root = issuer.root().certificate();

        assert_eq!(root.issued(&leaf), X509VerifyResult::OK);
        assert!(leaf.verify(&root.public_key().unwrap()).unwrap());
    }

    #[test]
    fn test_leaf_binds_domain() {
        let issuer = quick_issuer(LeafPolicy::default());
        let (_, leaf) = issuer.issue_x509("dev.example.test").unwrap();

        assert_eq!(san_dns_names(&leaf), vec!["dev.example.test".to_string()]);
        let cn = leaf
            .subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .unwrap();
        assert_eq!(cn.data().as_utf8().unwrap().to_string(), "dev.example.test");
    }

    #[test]
    fn test_permissive_domain_embedded_verbatim() {
        let issuer = quick_issuer(LeafPolicy::default());
        let (_, leaf) = issuer.issue_x509("not a, host").unwrap();
        assert_eq!(san_dns_names(&leaf), vec!["not a, host".to_string()]);
    }

    #[test]
    fn test_strict_policy_rejects_before_keygen() {
        let issuer = quick_issuer(LeafPolicy {
            domain_policy: DomainPolicy::Strict,
            ..LeafPolicy::default()
        });
        assert!(matches!(
            issuer.issue("not a host"),
            Err(IssueError::InputError(_))
        ));
        assert!(issuer.issue("localhost").is_ok());
    }

    #[test]
    fn test_empty_domain_rejected() {
        let issuer = quick_issuer(LeafPolicy::default());
        assert!(matches!(issuer.issue(""), Err(IssueError::InputError(_))));
    }

    #[test]
    fn test_long_host_name_issued_under_strict_policy() {
        let issuer = quick_issuer(LeafPolicy {
            domain_policy: DomainPolicy::Strict,
            ..LeafPolicy::default()
        });
        let domain = "feature-branch-preview-1234.team-frontend.dev.internal.example.com";
        assert!(domain.len() > 64);

        let (_, leaf) = issuer.issue_x509(domain).unwrap();
        assert_eq!(san_dns_names(&leaf), vec![domain.to_string()]);
        let cn = leaf
            .subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .unwrap();
        assert_eq!(cn.data().as_utf8().unwrap().to_string(), domain);
    }

    #[test]
    fn test_key_generation_failure_is_crypto_error() {
        let issuer = quick_issuer(LeafPolicy {
            key_bits: 0,
            ..LeafPolicy::default()
        });
        assert!(matches!(
            issuer.issue("localhost"),
            Err(IssueError::CryptoError(_))
        ));
    }

    #[test]
    fn test_worker_count_is_bounded() {
        let cores = thread::available_parallelism().unwrap().get();
        assert_eq!(worker_count(0), 0);
        assert_eq!(worker_count(1), 1);
        assert_eq!(worker_count(10_000), cores);
    }

    #[test]
    fn test_issue_many_more_domains_than_workers() {
        let issuer = quick_issuer(LeafPolicy {
            key_bits: 1024,
            ..LeafPolicy::default()
        });
        let domains: Vec<String> = (0..worker_count(usize::MAX) * 2 + 1)
            .map(|i| format!("host{}.test", i))
            .collect();
        let results = issuer.issue_many(&domains);

        assert_eq!(results.len(), domains.len());
        for (domain, result) in domains.iter().zip(results) {
            let leaf = result.unwrap().certificate().unwrap();
            assert_eq!(san_dns_names(&leaf), vec![domain.clone()]);
        }
        assert!(issuer.issue_many::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_leaf_key_is_fresh_and_smaller() {
        let issuer = quick_issuer(LeafPolicy::default());
        let (leaf_key, leaf) = issuer.issue_x509("localhost").unwrap();

        assert_eq!(leaf_key.bits(), LEAF_RSA_KEY_BITS);
        assert!(!leaf_key.public_eq(issuer.root().private_key()));
        assert!(leaf.public_key().unwrap().public_eq(&leaf_key));
    }

    #[test]
    fn test_issue_many_preserves_order() {
        let issuer = quick_issuer(LeafPolicy {
            serial_source: SerialSource::Clock,
            ..LeafPolicy::default()
        });
        let domains = ["a.test", "", "c.test"];
        let results = issuer.issue_many(&domains);

        assert_eq!(results.len(), 3);
        assert!(results[1].is_err());

        let a = results[0].as_ref().unwrap().certificate().unwrap();
        let c = results[2].as_ref().unwrap().certificate().unwrap();
        assert_eq!(san_dns_names(&a), vec!["a.test".to_string()]);
        assert_eq!(san_dns_names(&c), vec!["c.test".to_string()]);

        let serial_a = a.serial_number().to_bn().unwrap();
        let serial_c = c.serial_number().to_bn().unwrap();
        assert_ne!(serial_a, serial_c);
    }

    #[test]
    fn test_issue_leaf_from_pem() {
        let root = RsaRootCABuilder::new().key_bits(2048).build().unwrap();
        let leaf = issue_leaf("localhost", root.certificate_pem(), root.private_key_pem()).unwrap();
        assert!(leaf.check_key_matches().is_ok());
    }

    #[test]
    fn test_issue_leaf_garbage_root() {
        let result = issue_leaf("localhost", b"garbage", b"garbage");
        assert!(matches!(result, Err(IssueError::InputError(_))));
    }
}
