//! src/main.rs
//! `cb`: cut, copy and paste anything from the terminal

use std::{
    io::{self, Write},
    panic::PanicHookInfo,
    process::ExitCode,
    sync::Arc,
};

use anyhow::{Context, Result};
use cb_core::{
    App, LoggerBuilder, Terminal,
    app::{current_dir, write_summary},
    cli::{self, Parsed},
    config::Config,
    error::AppError,
};
use cb_store::ProgressTracker;
use tracing::{error, info, warn};

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> ExitCode {
    setup_panic_handler();

    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let code = e
                .downcast_ref::<AppError>()
                .map_or(1, AppError::exit_code);
            error!("{:#}", e);
            let _ = writeln!(io::stderr(), "cb: {e:#}");
            ExitCode::from(code as u8)
        }
    }
}

async fn run() -> Result<u8> {
    let mut config = match Config::load().await {
        Ok(config) => config,
        Err(e) => {
            let _ = writeln!(io::stderr(), "cb: using default configuration ({e:#})");
            Config::default()
        }
    };
    config.apply_env(env_var);

    let log_dir = match &config.logging.directory {
        Some(dir) => dir.clone(),
        None => Config::default_log_dir()
            .unwrap_or_else(|_| std::env::temp_dir().join("cb").join("logs")),
    };
    let _log_guard = LoggerBuilder::new(log_dir)
        .with_config(config.logging.clone())
        .build()
        .await
        .context("Failed to initialize logging")?;

    let terminal = Terminal::detect(env_var);
    let parsed = cli::parse_args(std::env::args().skip(1), terminal.streams())?;
    let invocation = match parsed {
        Parsed::Run(invocation) => invocation,
        Parsed::Help => {
            print!("{}", cli::USAGE);
            return Ok(0);
        }
    };

    let cwd = current_dir()?;
    let app = App::new(config, terminal);
    setup_cancel_handler(app.tracker());

    let report = tokio::task::spawn_blocking(move || {
        let mut stdout = io::stdout().lock();
        app.run(&invocation, &cwd, io::stdin(), &mut stdout)
    })
    .await
    .context("Worker thread failed")??;

    write_summary(&mut io::stderr().lock(), &report)?;
    info!(
        action = %report.action,
        slot = %report.slot,
        failed = report.failed.len(),
        outcome = ?report.outcome,
        "Action finished"
    );
    Ok(report.exit_code() as u8)
}

fn setup_cancel_handler(tracker: Arc<ProgressTracker>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let (mut sigterm, mut sigint) = match (
                signal(SignalKind::terminate()),
                signal(SignalKind::interrupt()),
            ) {
                (Ok(term), Ok(int)) => (term, int),
                _ => {
                    warn!("Failed to install signal handlers");
                    return;
                }
            };

            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = sigint.recv() => info!("Received SIGINT"),
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                return;
            }
            info!("Received Ctrl+C");
        }

        tracker.cancel();
    });
}

fn setup_panic_handler() {
    let original_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info: &PanicHookInfo<'_>| {
        error!("Application panicked: {}", panic_info);
        original_hook(panic_info);
    }));
}
