use std::path::PathBuf;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::info;

use waav_avatar::{
    AvatarSession, ClientConfig,
    config::{HostConfig, redact},
    host::InteractiveHost,
};

/// WaaV Avatar - Streaming talking-avatar session client
#[derive(Parser, Debug)]
#[command(name = "waav-avatar")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a session and drive it from stdin (default)
    Run,

    /// Print the resolved configuration with secrets redacted
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Logs go to stderr so they do not interleave with the interactive output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    // Load configuration from file or environment
    let config = if let Some(config_path) = cli.config {
        info!("Loading configuration from {}", config_path.display());
        ClientConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        ClientConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Check => {
            print_config(&config);
            Ok(())
        }
        Commands::Run => run(&config).await,
    }
}

async fn run(config: &ClientConfig) -> anyhow::Result<()> {
    let session = AvatarSession::with_livekit(config.session_config())?;
    info!(
        "Avatar {} ({} liveness)",
        config.avatar.avatar_id,
        config.liveness.name()
    );

    let host_config: HostConfig = config.host.clone();
    let mut host = InteractiveHost::new(session, host_config);
    host.run(BufReader::new(tokio::io::stdin())).await
}

fn print_config(config: &ClientConfig) {
    println!("api.url:              {}", config.api_url);
    println!("api.key:              {}", redact(&config.api_key));
    println!("avatar.id:            {}", config.avatar.avatar_id);
    println!(
        "avatar.voice_id:      {}",
        config.avatar.voice_id.as_deref().unwrap_or("<avatar default>")
    );
    println!("avatar.voice_rate:    {}", config.avatar.voice_rate);
    println!("avatar.quality:       {}", config.avatar.quality);
    println!("avatar.encoding:      {}", config.avatar.video_encoding);
    match config.avatar.idle_timeout_secs {
        Some(secs) => println!("avatar.idle_timeout:  {secs}s"),
        None => println!("avatar.idle_timeout:  <server default>"),
    }
    match config.liveness {
        waav_avatar::LivenessPolicy::Active { interval } => {
            println!("liveness:             active (every {}s)", interval.as_secs())
        }
        waav_avatar::LivenessPolicy::Passive => println!("liveness:             passive"),
    }
    println!("event_channel:        {}", config.event_channel);
    println!("host.prompts:         {}", config.host.prompts.len());
}
