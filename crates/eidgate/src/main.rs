use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use eidgate::{initialize_gateway, GatewayConfig, GatewayError};
use eidgate_signer::DigestAlgorithm;

/// eidgate: eID card authentication, identification and document signing
/// service.
#[derive(Parser, Debug)]
#[command(name = "eidgate", version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a configuration file
    Init {
        /// Container offered for signing
        #[arg(long)]
        document: Option<PathBuf>,

        /// Where the signed container is written
        #[arg(long)]
        output: Option<PathBuf>,

        /// Digest algorithm for signatures (SHA-256, SHA-384, SHA-512)
        #[arg(long)]
        digest_algorithm: Option<DigestAlgorithm>,

        /// Offer authentication
        #[arg(long)]
        authentication: bool,
    },

    /// Serve the protocol on stdio, one JSON envelope per line
    Serve,

    /// Verify the signatures of a container
    Verify {
        /// Signed container
        path: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("eidgate=debug,eidgate_protocol=debug,eidgate_signer=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("eidgate=info,eidgate_protocol=info,eidgate_signer=info"))
    };

    // Logs go to stderr; stdout carries the protocol.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<GatewayConfig, GatewayError> {
    match path {
        Some(p) => GatewayConfig::load(p),
        None => GatewayConfig::load(&GatewayConfig::default_config_path()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(cli).await;
    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), GatewayError> {
    match cli.command {
        Commands::Init {
            document,
            output,
            digest_algorithm,
            authentication,
        } => cmd_init(
            cli.config.as_ref(),
            document,
            output,
            digest_algorithm,
            authentication,
        ),
        Commands::Serve => cmd_serve(cli.config.as_ref()).await,
        Commands::Verify { path } => cmd_verify(&path),
    }
}

fn cmd_init(
    config_path: Option<&PathBuf>,
    document: Option<PathBuf>,
    output: Option<PathBuf>,
    digest_algorithm: Option<DigestAlgorithm>,
    authentication: bool,
) -> Result<(), GatewayError> {
    let mut config = load_config(config_path)?;
    if let Some(document) = document {
        config.signer.document_path = Some(document);
    }
    if let Some(output) = output {
        config.signer.output_path = Some(output);
    }
    if let Some(algorithm) = digest_algorithm {
        config.signer.digest_algorithm = algorithm;
    }
    if authentication {
        config.authentication.enabled = true;
    }
    config.validate()?;

    let save_path = config_path
        .cloned()
        .unwrap_or_else(GatewayConfig::default_config_path);
    config.save(&save_path)?;
    info!(path = %save_path.display(), "configuration written");

    println!("eidgate configured.");
    println!("  Config:   {}", save_path.display());
    match &config.signer.document_path {
        Some(document) => println!("  Document: {}", document.display()),
        None => println!("  Document: (signing disabled)"),
    }
    println!(
        "  Authentication: {}",
        if config.authentication.enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

async fn cmd_serve(config_path: Option<&PathBuf>) -> Result<(), GatewayError> {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

    let config = load_config(config_path)?;
    let state = Arc::new(initialize_gateway(config)?);
    info!(server_name = %state.config.server.server_name, "serving on stdio");

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // Dispatch reads and writes documents synchronously.
        let mut reply = {
            let state = Arc::clone(&state);
            let line = line.to_string();
            tokio::task::spawn_blocking(move || state.handle_line(&line))
                .await
                .map_err(std::io::Error::other)?
        };
        reply.push('\n');
        stdout.write_all(reply.as_bytes()).await?;
        stdout.flush().await?;
    }
    info!("stdin closed, shutting down");
    Ok(())
}

fn cmd_verify(path: &Path) -> Result<(), GatewayError> {
    let bytes = std::fs::read(path)?;
    let reports = eidgate_signer::verify_container(&bytes)?;
    if reports.is_empty() {
        println!("{}: no signatures", path.display());
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&reports)?);
    if reports.iter().any(|r| !r.valid) {
        return Err(GatewayError::Verification(format!(
            "{}: {} of {} signatures invalid",
            path.display(),
            reports.iter().filter(|r| !r.valid).count(),
            reports.len()
        )));
    }
    Ok(())
}
