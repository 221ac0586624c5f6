//! localca - a minimal self-hosted certificate authority for development.
//!
//! Modes, in order of precedence:
//!
//! ```bash
//! localca --genca                          # write ca.cer / ca.key
//! localca --gencert --certname a.test,b.test   # write <name>.cer / <name>.key signed by ca.*
//! localca --tls                            # HTTPS static server, publishes /.ca/
//! localca                                  # plain HTTP static server
//! ```

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use localca::certified_key::CertifiedKeyPem;
use localca::configs::AppConfig;
use localca::generate_root_ca::RsaRootCABuilder;
use localca::issue_leaf::LeafIssuer;
use localca::material::{load_material, provider_from_config};
use localca::root_authority::RootAuthority;
use localca::storage::{leaf_paths, read_pair, write_pair};
use localca::verify::verify_issued_by_pem;
use localca::webserver::start_webserver;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "localca=info,tower_http=info";

#[derive(Parser)]
#[command(name = "localca")]
#[command(about = "Minimal local certificate authority and static file server", long_about = None)]
struct Cli {
    /// Configuration file (default: ./localca.toml if present)
    #[arg(long, env = "LOCALCA_CONFIG")]
    config: Option<PathBuf>,

    /// Generate a new root CA certificate and key
    #[arg(long, conflicts_with = "gencert")]
    genca: bool,

    /// Issue leaf certificates signed by the root CA
    #[arg(long)]
    gencert: bool,

    /// Domain names to issue for, comma separated
    #[arg(long, value_delimiter = ',', default_value = "localhost")]
    certname: Vec<String>,

    /// Serve over HTTPS and publish the CA under /.ca/
    #[arg(long, env = "TLS")]
    tls: bool,

    /// Directory to serve
    #[arg(long, env = "ROOT")]
    root: Option<PathBuf>,

    /// Listen address, e.g. ":8443" or "127.0.0.1:8080"
    #[arg(long, env = "ADDR")]
    addr: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(root) = cli.root {
        config.server.root = root;
    }
    if cli.addr.is_some() {
        config.server.addr = cli.addr;
    }

    if cli.genca {
        generate_ca(&config)
    } else if cli.gencert {
        generate_certs(&config, &cli.certname)
    } else if cli.tls {
        let provider = provider_from_config(&config.material);
        info!(material = %provider.describe(), "loading TLS material");
        let material = load_material(provider.as_ref())?;
        start_webserver(&config.server, Some(material))
    } else {
        start_webserver(&config.server, None)
    }
}

fn generate_ca(config: &AppConfig) -> Result<()> {
    let ca = &config.ca;
    let root = RsaRootCABuilder::new()
        .subject(ca.subject())
        .key_bits(ca.key_bits)
        .validity_days(ca.validity_days)
        .serial_source(ca.serial)
        .build()
        .context("Failed to generate root CA")?;

    write_pair(&ca.cert_path, &ca.key_path, &root).context("Failed to save root CA")?;
    info!(
        certificate = %ca.cert_path.display(),
        private_key = %ca.key_path.display(),
        "root CA generated"
    );
    Ok(())
}

fn generate_certs(config: &AppConfig, names: &[String]) -> Result<()> {
    let root_pair = read_pair(&config.ca.cert_path, &config.ca.key_path)
        .context("Failed to load root CA; run with --genca first")?;
    let root = RootAuthority::from_certified_key(&root_pair).context("Invalid root CA material")?;
    let issuer = LeafIssuer::with_policy(root, config.issuance.leaf_policy());

    let mut failures = 0usize;
    for (name, result) in names.iter().zip(issuer.issue_many(names)) {
        match save_leaf(config, root_pair.certificate_pem(), name, result) {
            Ok(()) => info!(domain = %name, "certificate issued"),
            Err(e) => {
                error!(domain = %name, error = %format!("{:#}", e), "certificate not issued");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(anyhow!("{} of {} certificates failed", failures, names.len()));
    }
    Ok(())
}

fn save_leaf(
    config: &AppConfig,
    root_certificate_pem: &[u8],
    name: &str,
    issued: localca::error::Result<CertifiedKeyPem>,
) -> Result<()> {
    let leaf = issued.context("Failed to issue certificate")?;
    verify_issued_by_pem(root_certificate_pem, leaf.certificate_pem())
        .context("Issued certificate does not verify against the root")?;

    let (cert_path, key_path) = leaf_paths(&config.issuance.output_dir, name);
    write_pair(&cert_path, &key_path, &leaf)
}
