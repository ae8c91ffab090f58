//! Tollgate CLI - Issue and revoke OpenVPN client identities.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tollgate_lifecycle::{ClientSummary, Config, Lifecycle};
use tollgate_pki::IdentityStatus;

// ============================================================================
// CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "tollgate")]
#[command(about = "Tollgate - OpenVPN client certificate lifecycle")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults apply when omitted)
    #[arg(long, env = "TOLLGATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the PKI if it does not exist
    Init,
    /// Issue the next free client identity
    Issue,
    /// Revoke a client identity and publish the new CRL
    Revoke {
        /// Identity name
        name: String,
    },
    /// Show the identity the next issuance would receive
    Next,
    /// List identities currently connected to the daemon
    Connected,
    /// List exported client bundles
    List {
        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },
    /// Print the path of a client bundle
    Bundle {
        /// Identity name
        name: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Table,
    Json,
}

// ============================================================================
// Output Types
// ============================================================================

#[derive(Serialize)]
struct ClientRow {
    name: String,
    created: Option<u64>,
    status: &'static str,
    connected: bool,
}

impl From<&ClientSummary> for ClientRow {
    fn from(summary: &ClientSummary) -> Self {
        Self {
            name: summary.identity.name().to_string(),
            created: summary.created.and_then(unix_secs),
            status: status_label(summary.status),
            connected: summary.connected,
        }
    }
}

fn unix_secs(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

fn status_label(status: Option<IdentityStatus>) -> &'static str {
    match status {
        Some(IdentityStatus::Issued) => "issued",
        Some(IdentityStatus::Revoked) => "revoked",
        None => "incomplete",
    }
}

// ============================================================================
// Command Handlers
// ============================================================================

fn cmd_init(lifecycle: &Lifecycle) -> Result<()> {
    let pki = lifecycle.config().layout().pki_dir().display().to_string();
    if lifecycle.initialize().context("Failed to initialize PKI")? {
        println!("PKI created at {pki}");
    } else {
        println!("PKI already present at {pki}");
    }
    Ok(())
}

async fn cmd_issue(lifecycle: &Lifecycle) -> Result<()> {
    let issued = lifecycle.issue().await.context("Issuance failed")?;

    println!("Issued {}", issued.identity);
    println!("  Bundle:      {}", issued.bundle.display());
    println!("  Certificate: {}", issued.certificate.display());
    println!("  Key:         {}", issued.private_key.display());
    Ok(())
}

async fn cmd_revoke(lifecycle: &Lifecycle, name: &str) -> Result<()> {
    let report = lifecycle.revoke(name).await?;

    println!("Revoked {} (serial {})", report.identity, report.serial);
    println!(
        "  CRL:       {} -> {}",
        report.published.previous_digest.as_deref().unwrap_or("none"),
        report.published.digest
    );
    println!(
        "  Verified:  {}",
        if report.serial_verified { "serial found in CRL" } else { "serial NOT found in CRL" }
    );
    for path in &report.removed {
        println!("  Removed:   {}", path.display());
    }
    println!("  Audit log: {}", report.audit_log.display());
    Ok(())
}

fn cmd_next(lifecycle: &Lifecycle) -> Result<()> {
    println!("{}", lifecycle.next_identity()?);
    Ok(())
}

fn cmd_connected(lifecycle: &Lifecycle) -> Result<()> {
    let snapshot = lifecycle
        .connected()
        .context("Failed to read status report")?;
    if snapshot.is_empty() {
        println!("No clients connected");
    } else {
        for name in snapshot.iter() {
            println!("{name}");
        }
    }
    Ok(())
}

fn cmd_list(lifecycle: &Lifecycle, format: Format) -> Result<()> {
    let rows: Vec<ClientRow> = lifecycle.clients()?.iter().map(ClientRow::from).collect();

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        Format::Table => {
            if rows.is_empty() {
                println!("No client bundles found");
                return Ok(());
            }
            println!("{:<24} {:<12} {:<11} CONNECTED", "NAME", "CREATED", "STATUS");
            for row in &rows {
                let created = row.created.map(|s| s.to_string()).unwrap_or_else(|| "-".into());
                println!(
                    "{:<24} {:<12} {:<11} {}",
                    row.name,
                    created,
                    row.status,
                    if row.connected { "yes" } else { "no" }
                );
            }
        },
    }
    Ok(())
}

fn cmd_bundle(lifecycle: &Lifecycle, name: &str) -> Result<()> {
    println!("{}", lifecycle.bundle(name)?.display());
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::default(),
    };
    debug!(
        config = ?cli.config,
        pki = %config.layout().pki_dir().display(),
        unit = %config.service.unit,
        "Configuration loaded"
    );
    let lifecycle = Lifecycle::new(config);

    match cli.command {
        Commands::Init => cmd_init(&lifecycle),
        Commands::Issue => cmd_issue(&lifecycle).await,
        Commands::Revoke { name } => cmd_revoke(&lifecycle, &name).await,
        Commands::Next => cmd_next(&lifecycle),
        Commands::Connected => cmd_connected(&lifecycle),
        Commands::List { format } => cmd_list(&lifecycle, format),
        Commands::Bundle { name } => cmd_bundle(&lifecycle, &name),
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["tollgate", "revoke", "client_3"]).unwrap();
        assert!(matches!(cli.command, Commands::Revoke { ref name } if name == "client_3"));

        let cli = Cli::try_parse_from(["tollgate", "list", "--format", "json"]).unwrap();
        assert!(matches!(cli.command, Commands::List { format: Format::Json }));

        let cli = Cli::try_parse_from(["tollgate", "--config", "/etc/tollgate.toml", "next"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/tollgate.toml")));
    }

    #[test]
    fn test_revoke_requires_name() {
        assert!(Cli::try_parse_from(["tollgate", "revoke"]).is_err());
    }

    #[test]
    fn test_client_row_labels() {
        assert_eq!(status_label(Some(IdentityStatus::Revoked)), "revoked");
        assert_eq!(status_label(None), "incomplete");
        assert_eq!(unix_secs(UNIX_EPOCH + std::time::Duration::from_secs(42)), Some(42));
    }
}
