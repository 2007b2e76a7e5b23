use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use pkiview::{
    config::AppConfig,
    observability::{init_logging, log_config_info},
    Certificate, CertificateClient, VaultRegistry, APP_NAME, VERSION,
};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "pkiview")]
#[command(about = "Certificate catalog over one or more Vault PKI backends")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Emit JSON instead of a table
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check every vault and report per-vault listing results
    Status {
        /// Deadline for the whole fan-out, in seconds
        #[arg(long, default_value_t = 10)]
        deadline_secs: u64,
    },

    /// List certificates across all vaults
    List {
        /// Drop the cached listings before reading
        #[arg(long)]
        refresh: bool,
    },

    /// Show the details of one certificate
    Show {
        /// Certificate id (`vault|mount:serial`)
        id: String,
    },

    /// Print the PEM of one certificate
    Pem {
        /// Certificate id (`vault|mount:serial`)
        id: String,
    },

    /// Revoke a certificate with a write-capable token
    Revoke {
        /// Certificate id (`vault|mount:serial`)
        id: String,

        /// Token allowed to revoke on the target mount
        #[arg(long, env = "VAULT_WRITE_TOKEN", hide_env_values = true)]
        token: String,
    },

    /// Print or rotate the CRL of one mount
    Crl {
        /// Vault id
        vault: String,

        /// PKI mount path
        mount: String,

        /// Rotate the CRL instead of printing it
        #[arg(long)]
        rotate: bool,
    },
}

#[derive(Serialize)]
struct VaultStatus {
    vault_id: String,
    display_name: String,
    certificates: usize,
    duration_ms: u128,
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (optional - won't fail if missing)
    if let Err(e) = dotenvy::dotenv() {
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let cli = Cli::parse();

    let mut config = AppConfig::from_env().context("Failed to load configuration")?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    init_logging(&config.logging)?;
    info!(app_name = APP_NAME, version = VERSION, "Starting certificate catalog");
    log_config_info(&config);

    let registry = VaultRegistry::from_config(&config);
    let outcome = run(cli.command, cli.json, &registry).await;
    registry.shutdown();
    outcome
}

async fn run(command: Commands, json: bool, registry: &VaultRegistry) -> Result<()> {
    let client = registry.client();
    match command {
        Commands::Status { deadline_secs } => status(registry, client, deadline_secs, json).await,
        Commands::List { refresh } => {
            if refresh {
                client.invalidate_cache();
            }
            let certificates = client.list_certificates().await?;
            if json {
                print_json(&certificates)
            } else {
                print_certificate_table(&certificates);
                Ok(())
            }
        }
        Commands::Show { id } => {
            let detail = client.get_certificate_details(&id).await?;
            print_json(&detail)
        }
        Commands::Pem { id } => {
            let pem = client.get_certificate_pem(&id).await?;
            if json {
                print_json(&pem)
            } else {
                print!("{}", pem.pem);
                Ok(())
            }
        }
        Commands::Revoke { id, token } => {
            client.revoke_certificate(&id, &token).await?;
            info!(certificate_id = %id, "Certificate revoked");
            println!("Revoked {}", id);
            Ok(())
        }
        Commands::Crl { vault, mount, rotate } => {
            let vault_client = registry
                .vault(&vault)
                .with_context(|| {
                    format!("vault '{}' is not configured or failed to start", vault)
                })?;
            if rotate {
                vault_client.rotate_crl(&mount).await?;
                println!("Rotated CRL for {}|{}", vault, mount);
            } else {
                print!("{}", vault_client.read_crl(&mount).await?);
            }
            Ok(())
        }
    }
}

async fn status(
    registry: &VaultRegistry,
    client: Arc<dyn CertificateClient>,
    deadline_secs: u64,
    json: bool,
) -> Result<()> {
    let Some(aggregator) = registry.aggregator() else {
        warn!("No vault configured");
        println!("No vault configured");
        return Ok(());
    };

    let connection = client.check_connection().await;
    let listings = aggregator
        .list_certificates_by_vault(Duration::from_secs(deadline_secs))
        .await;

    let rows: Vec<VaultStatus> = listings
        .into_iter()
        .map(|listing| VaultStatus {
            display_name: registry
                .display_name(&listing.vault_id)
                .unwrap_or(&listing.vault_id)
                .to_string(),
            certificates: listing.certificates.len(),
            duration_ms: listing.duration.as_millis(),
            error: listing.error.as_ref().map(ToString::to_string),
            vault_id: listing.vault_id,
        })
        .collect();

    if json {
        print_json(&rows)?;
    } else {
        match &connection {
            Ok(()) => println!("Connection: ok"),
            Err(e) => println!("Connection: {}", e),
        }
        println!("{:<20} {:<24} {:>8} {:>10}  ERROR", "VAULT", "NAME", "CERTS", "MS");
        for row in &rows {
            println!(
                "{:<20} {:<24} {:>8} {:>10}  {}",
                row.vault_id,
                row.display_name,
                row.certificates,
                row.duration_ms,
                row.error.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}

fn print_certificate_table(certificates: &[Certificate]) {
    println!("{:<48} {:<32} {:<18} {:>6} REVOKED", "ID", "COMMON NAME", "EXPIRES", "DAYS");
    let now = Utc::now();
    for certificate in certificates {
        println!("{}", certificate_row(certificate, now));
    }
}

fn certificate_row(certificate: &Certificate, now: DateTime<Utc>) -> String {
    format!(
        "{:<48} {:<32} {:<18} {:>6} {}",
        certificate.id,
        certificate.common_name,
        certificate.expires_at.format("%Y-%m-%d %H:%M"),
        certificate.days_until_expiry(now),
        if certificate.revoked { "yes" } else { "no" }
    )
}

fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}
