//! Binary entrypoint for pi-gallery.
//!
//! Wires the shared slideshow to the web server, the background tasks and
//! the render loop, which owns the main thread.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use humantime::format_rfc3339;
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use pi_gallery::config::Configuration;
use pi_gallery::logs::LogBuffer;
use pi_gallery::navigation::{ItemSource, Navigator};
use pi_gallery::notify::Notifier;
use pi_gallery::platform::display_power::shell_runner;
use pi_gallery::render::LogRenderer;
use pi_gallery::scan::Library;
use pi_gallery::slideshow::{DisplaySignals, Slideshow};
use pi_gallery::tasks;
use pi_gallery::tasks::power::PowerControl;
use pi_gallery::weather::WeatherClient;
use pi_gallery::web::{self, AppState};

#[derive(Debug, Parser)]
#[command(name = "pi-gallery", version, about = "Photo frame slideshow with a local web control surface")]
struct Cli {
    /// Path to YAML config file
    #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
    config: PathBuf,

    /// Override the per-image delay
    #[arg(long, value_name = "SECONDS")]
    delay_seconds: Option<u64>,

    /// Deterministic RNG seed for shuffling
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Print the first N slides in display order without starting the frame
    #[arg(long = "dry-run", value_name = "ITERATIONS")]
    dry_run: Option<usize>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<LogBuffer> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(
            format!("pi_gallery={level}")
                .parse()
                .context("invalid log directive")?,
        );
    let logs = LogBuffer::default();
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .compact()
                .with_writer(logs.clone()),
        )
        .init();
    Ok(logs)
}

fn load_config(cli: &Cli) -> Result<Configuration> {
    let mut cfg = Configuration::from_yaml_file(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    if let Some(delay) = cli.delay_seconds {
        cfg.delay_seconds = delay;
    }
    if cli.seed.is_some() {
        cfg.navigation.shuffle_seed = cli.seed;
    }
    cfg.validated().context("invalid configuration values")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let logs = init_tracing(cli.verbose)?;
    let cfg = load_config(&cli)?;
    tracing::info!("Loaded configuration from {}:\n{:#?}", cli.config.display(), cfg);

    if let Some(iterations) = cli.dry_run {
        return run_dry_run(&cfg, iterations);
    }

    let cancel = CancellationToken::new();
    let signals = Arc::new(DisplaySignals::default());
    let power = PowerControl::new(Handle::current(), shell_runner(), Arc::clone(&signals));
    let slideshow = Arc::new(Slideshow::new(
        cfg.clone(),
        Some(cli.config.clone()),
        signals,
        power,
        cancel.clone(),
    ));

    let discovered = {
        let slideshow = Arc::clone(&slideshow);
        tokio::task::spawn_blocking(move || slideshow.rescan())
            .await
            .context("startup scan panicked")?
    };
    tracing::info!(
        discovered,
        root = %cfg.images_dir().display(),
        uploads = %cfg.upload_dir().display(),
        "startup scan complete"
    );

    spawn_signal_handlers(&cancel);

    let mut tasks = JoinSet::new();

    if cfg.web.enabled {
        let notifier = Notifier::from_config(cfg.telegram.as_ref())?;
        let state = AppState::new(Arc::clone(&slideshow), notifier).with_logs(logs);
        let server = web::spawn(state, cfg.web.socket_addr(), cancel.clone());
        tasks.spawn(async move { server.await.context("web server task failed") });
    } else {
        tracing::info!("web control surface disabled");
    }

    tasks.spawn({
        let slideshow = Arc::clone(&slideshow);
        let cancel = cancel.clone();
        let client = WeatherClient::new()?;
        async move {
            tasks::weather::run(slideshow, client, cancel)
                .await
                .context("weather task failed")
        }
    });

    tasks.spawn({
        let slideshow = Arc::clone(&slideshow);
        let cancel = cancel.clone();
        async move {
            tasks::files::run(slideshow, cancel)
                .await
                .context("files task failed")
        }
    });

    let (input_tx, input_rx) = crossbeam_channel::unbounded();
    let _input = tasks::input::spawn(input_tx)?;

    // The render loop owns the main thread until cancelled.
    let mut renderer = LogRenderer::default();
    if let Err(e) = tasks::slideshow::run(&slideshow, &mut renderer, &input_rx).context("render loop failed") {
        tracing::error!("{e:?}");
    }
    cancel.cancel();

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("task error: {e:?}"),
            Err(e) => tracing::error!("join error: {e}"),
        }
    }
    tracing::info!(frames = renderer.frames(), "shut down");
    Ok(())
}

fn spawn_signal_handlers(cancel: &CancellationToken) {
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = sigterm.recv() => {
                            tracing::info!("SIGTERM received; initiating shutdown");
                            cancel.cancel();
                        }
                    }
                }
                Err(err) => tracing::warn!("failed to register SIGTERM handler: {err}"),
            }
        });
    }
}

fn run_dry_run(cfg: &Configuration, iterations: usize) -> Result<()> {
    let library = Library::from_config(cfg);
    let items = library.scan();

    println!(
        "# slideshow dry run\n# now: {}\n# images: {}\n# uploads: {}\n# order: {}{}\n# iterations: {}\n# seed: {}\n",
        format_rfc3339(SystemTime::now()),
        library.images_root().display(),
        library.upload_root().display(),
        cfg.sort_order.as_str(),
        if cfg.sort_reverse { " (reversed)" } else { "" },
        iterations,
        cfg.navigation
            .shuffle_seed
            .map_or_else(|| "(random)".to_string(), |s| s.to_string())
    );

    if items.is_empty() {
        println!("(no images discovered)");
        return Ok(());
    }

    let navigator = Navigator::new(library.discovery_order(), cfg.navigation.shuffle_seed);
    navigator.discover(items);
    println!("# planned order:");
    for idx in 0..iterations {
        match navigator.advance(&library) {
            Some(id) => println!("  {:>4}: {}", idx + 1, id),
            None => break,
        }
    }
    Ok(())
}
