use crate::domain_policy::DomainPolicy;
use crate::generate_root_ca::{FOREVER_VALIDITY_DAYS, ROOT_RSA_KEY_BITS};
use crate::issue_leaf::{LeafPolicy, LEAF_RSA_KEY_BITS};
use crate::serial::SerialSource;
use crate::subject::{self, SubjectIdentity};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "localca.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub ca: CaConfig,
    #[serde(default)]
    pub issuance: IssuanceConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub material: MaterialConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CaConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub key_bits: u32,
    pub validity_days: u32,
    pub serial: SerialSource,
    pub common_name: String,
    pub organization: String,
    pub organizational_unit: String,
    pub country: String,
    pub province: String,
    pub locality: String,
    pub street_address: String,
    pub postal_code: String,
}

impl Default for CaConfig {
    fn default() -> Self {
        let subject = SubjectIdentity::root_default();
        Self {
            cert_path: PathBuf::from("ca.cer"),
            key_path: PathBuf::from("ca.key"),
            key_bits: ROOT_RSA_KEY_BITS,
            validity_days: FOREVER_VALIDITY_DAYS,
            serial: SerialSource::default(),
            common_name: subject.common_name,
            organization: subject.organization,
            organizational_unit: subject.organizational_unit,
            country: subject.country,
            province: subject.province,
            locality: subject.locality,
            street_address: subject.street_address,
            postal_code: subject.postal_code,
        }
    }
}

impl CaConfig {
    pub fn subject(&self) -> SubjectIdentity {
        SubjectIdentity {
            common_name: self.common_name.clone(),
            organization: self.organization.clone(),
            organizational_unit: self.organizational_unit.clone(),
            country: self.country.clone(),
            province: self.province.clone(),
            locality: self.locality.clone(),
            street_address: self.street_address.clone(),
            postal_code: self.postal_code.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IssuanceConfig {
    pub output_dir: PathBuf,
    pub domain_policy: DomainPolicy,
    pub serial: SerialSource,
    pub key_bits: u32,
    pub validity_days: u32,
    pub organization: String,
    pub country: String,
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            domain_policy: DomainPolicy::default(),
            serial: SerialSource::default(),
            key_bits: LEAF_RSA_KEY_BITS,
            validity_days: FOREVER_VALIDITY_DAYS,
            organization: subject::DEFAULT_ORGANIZATION.to_string(),
            country: subject::DEFAULT_COUNTRY.to_string(),
        }
    }
}

impl IssuanceConfig {
    pub fn leaf_policy(&self) -> LeafPolicy {
        LeafPolicy {
            domain_policy: self.domain_policy,
            serial_source: self.serial,
            key_bits: self.key_bits,
            validity_days: self.validity_days,
            organization: self.organization.clone(),
            country: self.country.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub root: PathBuf,
    pub addr: Option<String>,
    pub expose_private_keys: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./static"),
            addr: None,
            expose_private_keys: true,
        }
    }
}

impl ServerConfig {
    pub const DEFAULT_ADDR: &'static str = ":8080";
    pub const DEFAULT_TLS_ADDR: &'static str = ":8443";

    /// Listen address for the chosen mode, falling back to the per-mode default.
    pub fn listen_addr(&self, tls: bool) -> &str {
        match &self.addr {
            Some(addr) if !addr.is_empty() => addr.as_str(),
            _ if tls => Self::DEFAULT_TLS_ADDR,
            _ => Self::DEFAULT_ADDR,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MaterialSource {
    #[default]
    Bundled,
    Files,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MaterialConfig {
    pub source: MaterialSource,
    pub ca_cert_path: PathBuf,
    pub ca_key_path: PathBuf,
    pub server_cert_path: PathBuf,
    pub server_key_path: PathBuf,
}

impl Default for MaterialConfig {
    fn default() -> Self {
        Self {
            source: MaterialSource::default(),
            ca_cert_path: PathBuf::from("ca.cer"),
            ca_key_path: PathBuf::from("ca.key"),
            server_cert_path: PathBuf::from("localhost.cer"),
            server_key_path: PathBuf::from("localhost.key"),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&config_str)
            .context(format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(config_str)?;
        Ok(config)
    }

    /// Load `path` if given, otherwise `localca.toml` when present, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}
