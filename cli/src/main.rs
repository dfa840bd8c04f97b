//! docview CLI - serve, preview and bundle local documentation builds.
//!
//! ```text
//! docview serve [ROOT]       -> embedded server until Ctrl-C
//! docview render <DOC>       -> ViewerBridge::show on a headless surface
//! docview bundle <DOC>       -> stage_bundle
//! ```
//!
//! Logs go to stderr (or the configured log file); stdout carries only URLs
//! and paths so the output can be piped.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use docview_config::{DocviewConfig, ViewerMode};
use docview_server::{ServerOptions, ServerSlot};
use docview_viewer::{
    DeploymentMode, RecordingHost, ViewerBridge, ViewerHost, default_bundle_dir, stage_bundle,
};

#[derive(Debug, Parser)]
#[command(name = "docview")]
#[command(about = "Serve and preview local documentation builds")]
struct Cli {
    /// Config file (defaults to ~/.docview/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve a documentation root on localhost until interrupted
    Serve {
        /// Document root
        #[arg(default_value = ".")]
        root: PathBuf,
        /// Port to bind; 0 picks a free one
        #[arg(long)]
        port: Option<u16>,
    },
    /// Show a document on a headless viewer surface and print its URL
    Render {
        /// Root HTML document
        document: PathBuf,
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        #[arg(long)]
        title: Option<String>,
        /// Write the HTML handed to the surface here
        #[arg(long)]
        out: Option<PathBuf>,
        /// Bundle directory (bundle mode)
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Exit after rendering instead of serving until interrupted
        #[arg(long)]
        no_wait: bool,
    },
    /// Stage a static bundle of a document and its `_static` assets
    Bundle {
        /// Root HTML document
        document: PathBuf,
        /// Output directory (defaults to <document dir>/_docview)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Server,
    Bundle,
}

impl From<ViewerMode> for ModeArg {
    fn from(mode: ViewerMode) -> Self {
        match mode {
            ViewerMode::Server => Self::Server,
            ViewerMode::Bundle => Self::Bundle,
        }
    }
}

fn init_tracing(config: &DocviewConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level()))
        .unwrap_or_else(|e| {
            warnings.push(format!("Invalid log level {:?}: {e}", config.log_level()));
            EnvFilter::new("info")
        });

    if let Some(path) = config.log_file() {
        if let Some(parent) = path.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!("Failed to create log dir {}: {e}", parent.display()));
        }
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => {
                tracing_subscriber::registry()
                    .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                    .with(env_filter)
                    .init();
                tracing::info!(path = %path.display(), "Logging initialized");
                return warnings;
            }
            Err(e) => {
                warnings.push(format!("Failed to open log file {}: {e}", path.display()));
            }
        }
    }

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
    warnings
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, config_error) = match DocviewConfig::load(cli.config.as_deref()) {
        Ok(config) => (config, None),
        Err(e) => (DocviewConfig::default(), Some(e)),
    };
    for warning in init_tracing(&config) {
        tracing::warn!("{warning}");
    }
    if let Some(e) = config_error {
        tracing::warn!("{e}; using defaults");
    }

    match cli.command {
        Commands::Serve { root, port } => serve(&root, port.unwrap_or(config.port())).await,
        Commands::Render {
            document,
            mode,
            title,
            out,
            dir,
            no_wait,
        } => {
            let mode = match mode.unwrap_or_else(|| config.mode().into()) {
                ModeArg::Server => DeploymentMode::Server {
                    port: config.port(),
                },
                ModeArg::Bundle => DeploymentMode::Bundle {
                    dir: dir.or_else(|| config.bundle_dir()),
                },
            };
            let title = title.unwrap_or_else(|| config.title());
            render(&document, &title, mode, out.as_deref(), !no_wait).await
        }
        Commands::Bundle { document, dir } => {
            let dir = dir
                .or_else(|| config.bundle_dir())
                .or_else(|| default_bundle_dir(&document))
                .context("cannot pick a bundle directory for a document without a parent")?;
            bundle(&document, &dir)
        }
    }
}

async fn serve(root: &Path, port: u16) -> Result<()> {
    let slot = ServerSlot::global();
    let server = slot
        .get_or_start(&ServerOptions::new(root).with_port(port))
        .await
        .with_context(|| format!("failed to serve {}", root.display()))?;

    println!("{}", server.connection_info().root_url(""));
    wait_for_interrupt().await;
    slot.shutdown().await;
    Ok(())
}

async fn render(
    document: &Path,
    title: &str,
    mode: DeploymentMode,
    out: Option<&Path>,
    wait: bool,
) -> Result<()> {
    let serving = matches!(mode, DeploymentMode::Server { .. });
    let host = Arc::new(RecordingHost::new());
    let dyn_host: Arc<dyn ViewerHost> = host.clone();
    let slot = ServerSlot::global();
    let bridge = ViewerBridge::new(dyn_host, slot.clone(), mode);

    let outcome = bridge
        .show(document, title)
        .await
        .with_context(|| format!("failed to render {}", document.display()))?;

    if let Some(out) = out {
        let html = host
            .surfaces()
            .first()
            .and_then(|surface| surface.html())
            .unwrap_or_default();
        docview_utils::atomic_write(out, html.as_bytes())
            .with_context(|| format!("failed to write {}", out.display()))?;
        tracing::info!(path = %out.display(), "Wrote rendered HTML");
    }
    println!("{}", outcome.url);

    if serving && wait {
        wait_for_interrupt().await;
    }
    slot.shutdown().await;
    Ok(())
}

fn bundle(document: &Path, dir: &Path) -> Result<()> {
    let manifest = stage_bundle(document, dir)
        .with_context(|| format!("failed to bundle {}", document.display()))?;
    for file in &manifest.files {
        println!("{}", manifest.dir.join(file).display());
    }
    Ok(())
}

async fn wait_for_interrupt() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_defaults_to_current_dir() {
        let cli = Cli::try_parse_from(["docview", "serve"]).expect("parse serve");
        match cli.command {
            Commands::Serve { root, port } => {
                assert_eq!(root, PathBuf::from("."));
                assert_eq!(port, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn render_accepts_mode_and_global_config() {
        let cli = Cli::try_parse_from([
            "docview",
            "render",
            "build/html/index.html",
            "--mode",
            "bundle",
            "--config",
            "/tmp/docview.toml",
            "--no-wait",
        ])
        .expect("parse render");
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/docview.toml")));
        match cli.command {
            Commands::Render { mode, no_wait, .. } => {
                assert_eq!(mode, Some(ModeArg::Bundle));
                assert!(no_wait);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn bundle_writes_manifest_files() {
        let temp = tempfile::tempdir().expect("temp dir");
        let doc = temp.path().join("page.html");
        fs::write(&doc, "<html><head></head></html>").expect("write page");
        let out = temp.path().join("out");

        bundle(&doc, &out).expect("bundle succeeds");
        assert!(out.join("index.html").is_file());
    }

    #[test]
    fn config_mode_maps_to_arg() {
        assert_eq!(ModeArg::from(ViewerMode::Bundle), ModeArg::Bundle);
        assert_eq!(ModeArg::from(ViewerMode::Server), ModeArg::Server);
    }
}
