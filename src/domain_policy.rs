//! Acceptance rules for the domain bound into a leaf certificate.
//!
//! The permissive policy embeds any non-empty string verbatim into the subject alternative
//! names, which is how existing callers have always used the tool. The strict policy checks
//! host name syntax first.

use crate::error::{IssueError, Result};
use serde::Deserialize;

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainPolicy {
    #[default]
    Permissive,
    Strict,
}

impl DomainPolicy {
    /// Check `domain` against the policy. The domain is never rewritten.
    pub fn check(&self, domain: &str) -> Result<()> {
        if domain.is_empty() {
            return Err(IssueError::InputError("Domain must not be empty".to_string()));
        }
        match self {
            DomainPolicy::Permissive => Ok(()),
            DomainPolicy::Strict => check_host_name(domain),
        }
    }
}

fn check_host_name(domain: &str) -> Result<()> {
    let name = domain.strip_suffix('.').unwrap_or(domain);
    if name.is_empty() || name.len() > MAX_DOMAIN_LEN {
        return Err(reject(domain, "length must be between 1 and 253"));
    }

    let name = name.strip_prefix("*.").unwrap_or(name);
    for label in name.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(reject(domain, "labels must be between 1 and 63 characters"));
        }
        if !label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return Err(reject(domain, "labels may only contain letters, digits and '-'"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(reject(domain, "labels must not start or end with '-'"));
        }
    }
    Ok(())
}

fn reject(domain: &str, reason: &str) -> IssueError {
    IssueError::InputError(format!("Domain {:?} rejected by strict policy: {}", domain, reason))
}
