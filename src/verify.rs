//! Relying-party checks on issued material.
//!
//! These are the checks a TLS client performs when it trusts the root: the root must verify
//! under its own key, and a leaf must name the root as issuer, verify under the root's key and
//! pass OpenSSL's full path validation with the root as the only trust anchor.

use crate::error::{input, IssueError, Result};
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509Ref, X509StoreContext, X509VerifyResult, X509};

/// Check that `certificate` is self-issued and its signature verifies under its own key.
pub fn verify_self_signed(certificate: &X509Ref) -> Result<()> {
    if certificate.issued(certificate) != X509VerifyResult::OK {
        return Err(IssueError::InputError(
            "Certificate is not self-issued".to_string(),
        ));
    }
    let public_key = certificate
        .public_key()
        .map_err(input("Failed to read certificate public key"))?;
    if !certificate
        .verify(&public_key)
        .map_err(input("Failed to verify self-signature"))?
    {
        return Err(IssueError::InputError(
            "Self-signature does not verify".to_string(),
        ));
    }
    Ok(())
}

/// Check that `leaf` chains to `root` as a relying party would see it.
pub fn verify_issued_by(root: &X509Ref, leaf: &X509Ref) -> Result<()> {
    let relation = root.issued(leaf);
    if relation != X509VerifyResult::OK {
        return Err(IssueError::InputError(format!(
            "Leaf was not issued by root: {}",
            relation.error_string()
        )));
    }

    let mut store = X509StoreBuilder::new().map_err(input("Failed to create X509 store"))?;
    store
        .add_cert(root.to_owned())
        .map_err(input("Failed to add root to store"))?;
    let store = store.build();

    let chain = Stack::new().map_err(input("Failed to create certificate stack"))?;
    let mut context = X509StoreContext::new().map_err(input("Failed to create store context"))?;
    let (valid, reason) = context
        .init(&store, leaf, &chain, |ctx| {
            let valid = ctx.verify_cert()?;
            Ok((valid, ctx.error()))
        })
        .map_err(input("Failed to run path validation"))?;

    if valid {
        Ok(())
    } else {
        Err(IssueError::InputError(format!(
            "Path validation failed: {}",
            reason.error_string()
        )))
    }
}

/// PEM convenience wrapper around [`verify_issued_by`].
pub fn verify_issued_by_pem(root_certificate_pem: &[u8], leaf_certificate_pem: &[u8]) -> Result<()> {
    let root = X509::from_pem(root_certificate_pem).map_err(input("Failed to parse root certificate"))?;
    let leaf = X509::from_pem(leaf_certificate_pem).map_err(input("Failed to parse leaf certificate"))?;
    verify_issued_by(&root, &leaf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_root_ca::RsaRootCABuilder;
    use crate::issue_leaf::LeafIssuer;
    use crate::root_authority::RootAuthority;

    fn root_and_issuer() -> (X509, LeafIssuer) {
        let (key, cert) = RsaRootCABuilder::new().key_bits(2048).build_x509().unwrap();
        let issuer = LeafIssuer::new(RootAuthority::new(cert.clone(), key).unwrap());
        (cert, issuer)
    }

    #[test]
    fn test_root_self_signed() {
        let (root, _) = root_and_issuer();
        assert!(verify_self_signed(&root).is_ok());
    }

    #[test]
    fn test_leaf_is_not_self_signed() {
        let (_, issuer) = root_and_issuer();
        let (_, leaf) = issuer.issue_x509("localhost").unwrap();
        assert!(verify_self_signed(&leaf).is_err());
    }

    #[test]
    fn test_leaf_chains_to_its_root() {
        let (root, issuer) = root_and_issuer();
        let (_, leaf) = issuer.issue_x509("localhost").unwrap();
        verify_issued_by(&root, &leaf).unwrap();
    }

    #[test]
    fn test_leaf_does_not_chain_to_regenerated_root() {
        let (_, issuer) = root_and_issuer();
        let (_, leaf) = issuer.issue_x509("localhost").unwrap();
        let (other_root, _) = root_and_issuer();
        assert!(verify_issued_by(&other_root, &leaf).is_err());
    }

    #[test]
    fn test_leaf_cannot_act_as_ca() {
        let (_, issuer) = root_and_issuer();
        let (leaf_key, leaf) = issuer.issue_x509("localhost").unwrap();
        let grandchild = LeafIssuer::new(RootAuthority::new(leaf.clone(), leaf_key).unwrap())
            .issue_x509("evil.test")
            .unwrap()
            .1;
        assert!(verify_issued_by(&leaf, &grandchild).is_err());
    }

    #[test]
    fn test_pem_wrapper_rejects_garbage() {
        assert!(verify_issued_by_pem(b"garbage", b"garbage").is_err());
    }
}
