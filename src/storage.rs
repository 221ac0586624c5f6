//! File persistence for certificate/key pairs.
//!
//! A pair is written both-or-neither: the two halves are staged as temporary files next to
//! their targets, then moved into place. If the certificate cannot be moved after the key was,
//! the previous key is restored so the directory never holds a key and a certificate that do not
//! belong together. Files are created with mode 0600.

use crate::certified_key::CertifiedKeyPem;
use anyhow::{Context, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, warn};

pub const CERTIFICATE_EXTENSION: &str = "cer";
pub const PRIVATE_KEY_EXTENSION: &str = "key";

/// Write `pair` to `cert_path` and `key_path`.
pub fn write_pair(cert_path: &Path, key_path: &Path, pair: &CertifiedKeyPem) -> Result<()> {
    let key_tmp = stage(key_path, pair.private_key_pem())?;
    let cert_tmp = stage(cert_path, pair.certificate_pem())?;

    let previous_key = match fs::read(key_path) {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            return Err(e).context(format!("Failed to read existing key {}", key_path.display()))
        }
    };

    key_tmp
        .persist(key_path)
        .map_err(|e| e.error)
        .context(format!("Failed to write private key {}", key_path.display()))?;

    if let Err(e) = cert_tmp.persist(cert_path) {
        // Rollback key so the pair on disk stays consistent
        rollback_key(key_path, previous_key);
        return Err(e.error).context(format!("Failed to write certificate {}", cert_path.display()));
    }

    info!(
        certificate = %cert_path.display(),
        private_key = %key_path.display(),
        "wrote certificate and private key"
    );
    Ok(())
}

/// Read a pair previously written by [`write_pair`] (or by any other tool).
pub fn read_pair(cert_path: &Path, key_path: &Path) -> Result<CertifiedKeyPem> {
    let certificate = fs::read(cert_path)
        .context(format!("Failed to read certificate {}", cert_path.display()))?;
    let private_key = fs::read(key_path)
        .context(format!("Failed to read private key {}", key_path.display()))?;
    Ok(CertifiedKeyPem::new(certificate, private_key))
}

/// File stem used for a leaf's files. Path separators are replaced so a domain can never
/// address a file outside the output directory.
pub fn leaf_file_stem(domain: &str) -> String {
    domain
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect()
}

/// `(certificate, private key)` paths for a leaf: `<dir>/<domain>.cer`, `<dir>/<domain>.key`.
pub fn leaf_paths(dir: &Path, domain: &str) -> (PathBuf, PathBuf) {
    let stem = leaf_file_stem(domain);
    (
        dir.join(format!("{}.{}", stem, CERTIFICATE_EXTENSION)),
        dir.join(format!("{}.{}", stem, PRIVATE_KEY_EXTENSION)),
    )
}

fn stage(target: &Path, contents: &[u8]) -> Result<NamedTempFile> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    // NamedTempFile is created 0600 on unix
    let mut tmp = NamedTempFile::new_in(dir)
        .context(format!("Failed to create temporary file in {}", dir.display()))?;
    tmp.write_all(contents)
        .context(format!("Failed to stage {}", target.display()))?;
    tmp.as_file()
        .sync_all()
        .context(format!("Failed to flush {}", target.display()))?;
    Ok(tmp)
}

fn rollback_key(key_path: &Path, previous_key: Option<Vec<u8>>) {
    let restored = match previous_key {
        Some(bytes) => stage(key_path, &bytes).and_then(|tmp| {
            tmp.persist(key_path)
                .map(|_| ())
                .map_err(|e| anyhow::Error::from(e.error))
        }),
        None => fs::remove_file(key_path).map_err(anyhow::Error::from),
    };
    if let Err(e) = restored {
        warn!(
            private_key = %key_path.display(),
            error = %e,
            "failed to roll back private key; do not use it"
        );
    }
}
