//! localca - a minimal self-hosted certificate authority.
//!
//! Two operations make up the issuance subsystem:
//!
//! ```text
//! Root CA (self-signed, RSA 4096, CA:TRUE, keyCertSign)
//!   └── Leaf (signed by root, RSA 2048, CA:FALSE, SAN = CN = domain)
//! ```
//!
//! Both return a [`certified_key::CertifiedKeyPem`]: a `CERTIFICATE` PEM block and an
//! `RSA PRIVATE KEY` (PKCS#1) PEM block. Nothing is written to disk by the subsystem itself;
//! callers persist pairs with [`storage::write_pair`], which writes both files or neither.
//!
//! # Example
//!
//! ```no_run
//! use localca::generate_root_ca::generate_root_ca;
//! use localca::issue_leaf::issue_leaf;
//! use localca::verify::verify_issued_by_pem;
//!
//! let root = generate_root_ca()?;
//! let leaf = issue_leaf("localhost", root.certificate_pem(), root.private_key_pem())?;
//! verify_issued_by_pem(root.certificate_pem(), leaf.certificate_pem())?;
//! # Ok::<(), localca::error::IssueError>(())
//! ```
//!
//! Several leaves can be issued concurrently from one parsed root:
//!
//! ```no_run
//! use localca::generate_root_ca::generate_root_ca;
//! use localca::issue_leaf::LeafIssuer;
//! use localca::root_authority::RootAuthority;
//!
//! let root = RootAuthority::from_certified_key(&generate_root_ca()?)?;
//! let results = LeafIssuer::new(root).issue_many(&["a.test", "b.test"]);
//! assert!(results.iter().all(|r| r.is_ok()));
//! # Ok::<(), localca::error::IssueError>(())
//! ```
//!
//! # Modules
//!
//! - [`generate_root_ca`]: self-signed root builder
//! - [`issue_leaf`]: leaf issuance, single and concurrent
//! - [`serial`], [`domain_policy`], [`subject`]: knobs shared by both operations
//! - [`verify`]: relying-party checks
//! - [`storage`], [`configs`], [`material`], [`webserver`]: the `localca` tool around it

pub mod certified_key;
pub mod configs;
pub mod domain_policy;
pub mod error;
pub mod generate_root_ca;
pub mod issue_leaf;
pub mod material;
pub mod root_authority;
pub mod serial;
pub mod storage;
pub mod subject;
pub mod verify;
pub mod webserver;
