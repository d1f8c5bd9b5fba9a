//! FileBridge Daemon
//!
//! Local agent exposing one directory to other processes over a Unix socket,
//! plus client subcommands for talking to a running agent.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use daemon::config::{default_config_path, Config};
use daemon::ipc::{IpcClient, DEFAULT_TIMEOUT_SECS};
use daemon::orchestrator::{BridgeOrchestrator, OrchestratorEvent};
use protocol::EntryKind;
use tokio_util::sync::CancellationToken;

/// FileBridge Daemon - token-gated local file access.
#[derive(Parser, Debug)]
#[command(name = "filebridge-daemon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Timeout in seconds for client requests
    #[arg(long, global = true, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the daemon.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the bridge and serve until SIGINT or SIGTERM
    Start,

    /// Obtain a token from the running bridge and print it
    Token,

    /// List a directory below the root
    Ls {
        /// Directory relative to the root (default: the root itself)
        #[arg(default_value = "")]
        path: String,
    },

    /// Print or save the content of a file
    Cat {
        /// File relative to the root
        path: String,

        /// Write the content to this local file instead of stdout
        #[arg(long, short, value_name = "LOCAL")]
        output: Option<PathBuf>,
    },

    /// Upload a local file
    Put {
        /// Destination relative to the root
        path: String,

        /// Local file to upload
        local: PathBuf,
    },

    /// Delete a file
    Rm {
        /// File relative to the root
        path: String,
    },

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    // Load configuration
    let mut config = Config::load(&config_path)?;

    // Apply environment variable overrides
    config.apply_env_overrides();

    // Validate configuration
    config.validate()?;

    // Initialize tracing
    let _log_guard = daemon::logging::init(&config.logging, cli.verbose)?;
    tracing::debug!("Using config file: {:?}", config_path);

    let timeout = Duration::from_secs(cli.timeout);

    match cli.command {
        Commands::Start => {
            let mut orchestrator = BridgeOrchestrator::new(config)?;
            run_headless(&mut orchestrator).await?;
        }
        Commands::Token => {
            let mut client = connect(&config, timeout).await?;
            let token = client.get_token().await?;
            println!("{}", token);
        }
        Commands::Ls { path } => {
            let mut client = authenticated_client(&config, timeout).await?;
            let entries = client.list_files(&path).await?;
            if entries.is_empty() {
                println!("(empty)");
            }
            for entry in entries {
                match entry.kind {
                    EntryKind::Directory => println!("{}/", entry.relative_path),
                    EntryKind::File => println!("{}", entry.relative_path),
                }
            }
        }
        Commands::Cat { path, output } => {
            let mut client = authenticated_client(&config, timeout).await?;
            let content = client.read_file(&path).await?;
            match output {
                Some(local) => {
                    std::fs::write(&local, &content)
                        .with_context(|| format!("Failed to write {}", local.display()))?;
                    println!("Saved {} bytes to {}", content.len(), local.display());
                }
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&content)?;
                    stdout.flush()?;
                }
            }
        }
        Commands::Put { path, local } => {
            let content = std::fs::read(&local)
                .with_context(|| format!("Failed to read {}", local.display()))?;
            let mut client = authenticated_client(&config, timeout).await?;
            println!("{}", client.create_file(&path, content).await?);
        }
        Commands::Rm { path } => {
            let mut client = authenticated_client(&config, timeout).await?;
            println!("{}", client.delete_file(&path).await?);
        }
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => {
                print!("{}", config.to_toml()?);
            }
            ConfigCommands::Init { force } => {
                init_config_file(&config_path, force)?;
                println!("Configuration written to {}", config_path.display());
            }
        },
    }

    Ok(())
}

/// Run the bridge until a shutdown signal arrives.
async fn run_headless(orchestrator: &mut BridgeOrchestrator) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    orchestrator.start(cancel.clone()).await?;

    println!("FileBridge listening on {}", orchestrator.socket_path().display());

    // Log client activity at debug level
    let mut events = orchestrator.subscribe();
    let event_cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = event_cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(OrchestratorEvent::ClientConnected { connection_id }) => {
                        tracing::debug!(%connection_id, "Client connected");
                    }
                    Ok(OrchestratorEvent::ClientDisconnected { connection_id }) => {
                        tracing::debug!(%connection_id, "Client disconnected");
                    }
                    Ok(OrchestratorEvent::StateChanged(state)) => {
                        tracing::debug!("Orchestrator state: {:?}", state);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });

    wait_for_shutdown_signal().await?;
    tracing::info!("Received shutdown signal");

    cancel.cancel();
    orchestrator.stop().await?;

    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }

    Ok(())
}

/// Connect to the running bridge.
async fn connect(config: &Config, timeout: Duration) -> anyhow::Result<IpcClient> {
    let socket_path = config.socket_path();
    IpcClient::connect_with_timeout(&socket_path, timeout)
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "Cannot connect to bridge at {}: {}",
                socket_path.display(),
                e
            )
        })
}

/// Connect to the running bridge and obtain a token.
async fn authenticated_client(config: &Config, timeout: Duration) -> anyhow::Result<IpcClient> {
    let mut client = connect(config, timeout).await?;
    client
        .get_token()
        .await
        .context("Failed to obtain a token")?;
    Ok(client)
}

/// Write the default configuration to `path`.
fn init_config_file(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }
    Config::default().save(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_debug_assert() {
        // Verify the CLI structure is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_start_command() {
        let cli = Cli::try_parse_from(["filebridge-daemon", "start"]).unwrap();
        assert!(matches!(cli.command, Commands::Start));
        assert!(!cli.verbose);
        assert_eq!(cli.timeout, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from([
            "filebridge-daemon",
            "-v",
            "-c",
            "/etc/filebridge.toml",
            "token",
            "--timeout",
            "30",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/filebridge.toml")));
        assert_eq!(cli.timeout, 30);
        assert!(matches!(cli.command, Commands::Token));
    }

    #[test]
    fn test_ls_defaults_to_root() {
        let cli = Cli::try_parse_from(["filebridge-daemon", "ls"]).unwrap();
        match cli.command {
            Commands::Ls { path } => assert_eq!(path, ""),
            _ => panic!("Expected Ls command"),
        }

        let cli = Cli::try_parse_from(["filebridge-daemon", "ls", "docs"]).unwrap();
        match cli.command {
            Commands::Ls { path } => assert_eq!(path, "docs"),
            _ => panic!("Expected Ls command"),
        }
    }

    #[test]
    fn test_cat_with_output() {
        let cli =
            Cli::try_parse_from(["filebridge-daemon", "cat", "a.txt", "-o", "/tmp/a.txt"]).unwrap();
        match cli.command {
            Commands::Cat { path, output } => {
                assert_eq!(path, "a.txt");
                assert_eq!(output, Some(PathBuf::from("/tmp/a.txt")));
            }
            _ => panic!("Expected Cat command"),
        }
    }

    #[test]
    fn test_put_requires_local_file() {
        assert!(Cli::try_parse_from(["filebridge-daemon", "put", "a.txt"]).is_err());

        let cli = Cli::try_parse_from(["filebridge-daemon", "put", "a.txt", "./a.txt"]).unwrap();
        match cli.command {
            Commands::Put { path, local } => {
                assert_eq!(path, "a.txt");
                assert_eq!(local, PathBuf::from("./a.txt"));
            }
            _ => panic!("Expected Put command"),
        }
    }

    #[test]
    fn test_rm_command() {
        let cli = Cli::try_parse_from(["filebridge-daemon", "rm", "old.txt"]).unwrap();
        match cli.command {
            Commands::Rm { path } => assert_eq!(path, "old.txt"),
            _ => panic!("Expected Rm command"),
        }
    }

    #[test]
    fn test_config_subcommands() {
        let cli = Cli::try_parse_from(["filebridge-daemon", "config", "show"]).unwrap();
        assert!(matches!(cli.command, Commands::Config(ConfigCommands::Show)));

        let cli = Cli::try_parse_from(["filebridge-daemon", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigCommands::Init { force: true })
        ));
    }

    #[test]
    fn test_init_config_file_refuses_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        init_config_file(&path, false).unwrap();
        assert!(path.exists());

        let err = init_config_file(&path, false).unwrap_err();
        assert!(err.to_string().contains("already exists"));

        init_config_file(&path, true).unwrap();
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }
}
