use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crosspost::config::Config;
use crosspost::media::MediaValidator;
use crosspost::models::MediaItem;
use crosspost::server::{PublishServer, ServerConfig};

#[derive(Parser)]
#[command(
    name = "crosspost",
    version,
    about = "Multi-platform social media publishing orchestrator",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the publish API server
    Serve {
        /// Address to bind
        #[arg(short, long, default_value = "0.0.0.0:8080")]
        bind: String,

        /// Configuration file path (TOML); environment wins otherwise
        #[arg(short, long)]
        config: Option<String>,

        /// Disable CORS
        #[arg(long, default_value = "false")]
        no_cors: bool,
    },

    /// Check a set of image URLs for carousel aspect-ratio compatibility
    CheckMedia {
        /// Image URLs to probe
        urls: Vec<String>,

        /// Absolute ratio tolerance
        #[arg(short, long, default_value = "0.02")]
        tolerance: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    match cli.command {
        Commands::Serve {
            bind,
            config,
            no_cors,
        } => {
            tracing::info!(bind = %bind, config = ?config, "Starting serve command");
            serve(bind, config, no_cors).await?;
        }

        Commands::CheckMedia { urls, tolerance } => {
            check_media(urls, tolerance).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("crosspost=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("crosspost=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

async fn serve(bind: String, config_path: Option<String>, no_cors: bool) -> Result<()> {
    let config = match config_path {
        Some(path) => Config::from_file(std::path::Path::new(&path))?,
        None => Config::from_env()?,
    };

    let server_config = ServerConfig::builder()
        .bind_address_str(&bind)?
        .enable_cors(!no_cors)
        .build();

    let server = PublishServer::new(server_config, config).await?;

    server
        .start_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

async fn check_media(urls: Vec<String>, tolerance: f64) -> Result<()> {
    if urls.is_empty() {
        anyhow::bail!("no URLs provided");
    }

    let items: Vec<MediaItem> = urls
        .iter()
        .enumerate()
        .map(|(idx, url)| MediaItem::image(url.clone(), idx as u32))
        .collect();

    let validator = MediaValidator::new(tolerance);
    let report = validator.validate(&items).await;

    println!("Valid: {}", report.valid);
    println!("Message: {}", report.message);
    if let Some(base) = report.base_ratio {
        println!("Base ratio: {base}:1");
    }
    for probe in &report.probes {
        match (probe.width, probe.height, probe.ratio) {
            (Some(w), Some(h), Some(r)) => {
                println!("  Item {}: {w}x{h} = {r}:1", probe.index + 1);
            }
            _ => {
                let note = probe.note.as_deref().unwrap_or("not measured");
                println!("  Item {}: {note}", probe.index + 1);
            }
        }
    }
    for mismatch in &report.mismatches {
        println!(
            "  Mismatch at item {}: expected {}:1, got {}:1 (delta {})",
            mismatch.index + 1,
            mismatch.expected,
            mismatch.actual,
            mismatch.delta
        );
    }

    Ok(())
}
