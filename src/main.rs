use anyhow::Context;
use clap::Parser;
use squeeze_dir::cli::{Args, Commands, CompressArgs};
use squeeze_dir::constants::{INFO_PREFIX, SUCCESS_PREFIX};
use squeeze_dir::logger::{init_tracing, set_quiet_mode, set_verbose_mode};
use squeeze_dir::{
    BatchCompressor, BatchOptions, CancelToken, CompressionParams, ConfigStore, OutputMode,
    RemoteSettings,
};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

/// Exit status after a second Ctrl-C.
const EXIT_INTERRUPTED: i32 = 130;

fn main() -> ExitCode {
    let args = Args::parse();

    set_quiet_mode(args.quiet);
    set_verbose_mode(args.verbose);
    init_tracing(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            squeeze_dir::error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let store = match &args.config {
        Some(path) => ConfigStore::at(path),
        None => ConfigStore::default_location()?,
    };

    match args.command {
        Some(Commands::Config { key, show }) => configure(&store, key, show),
        None => compress(&store, args.compress),
    }
}

fn configure(store: &ConfigStore, key: Option<String>, show: bool) -> anyhow::Result<()> {
    if let Some(key) = key {
        store.set_api_key(&key).context("Failed to save API key")?;
        squeeze_dir::info!("{} API key saved to {}", SUCCESS_PREFIX, store.path().display());
        return Ok(());
    }

    if show {
        let config = store.load().context("Failed to read config")?;
        match config.api_key {
            Some(key) => squeeze_dir::info!("{} API key: {}", INFO_PREFIX, key),
            None => squeeze_dir::warn!("No API key stored in {}", store.path().display()),
        }
    }

    Ok(())
}

fn compress(store: &ConfigStore, opts: CompressArgs) -> anyhow::Result<()> {
    let params = CompressionParams::new(Some(opts.quality), Some(opts.colors), Some(opts.lossy))?;
    let timeout = (opts.timeout > 0).then(|| Duration::from_secs(opts.timeout));

    // The flag or environment wins over the stored key.
    let remote = if opts.remote {
        let api_key = match opts.api_key {
            Some(key) => Some(key),
            None => store.load()?.api_key,
        };
        Some(RemoteSettings::new(opts.remote_endpoint, api_key, timeout))
    } else {
        None
    };

    let dir = match opts.dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Cannot determine the working directory")?,
    };

    let options = BatchOptions {
        params,
        output_mode: OutputMode::from_output_dir(opts.output_dir),
        jobs: opts.jobs.unwrap_or_else(num_cpus::get),
        timeout,
        scratch_dir: opts.scratch_dir,
        remote,
    };

    let cancel = CancelToken::new();
    install_interrupt_handler(cancel.clone());

    let batch = BatchCompressor::new(options, cancel)?;
    let report = batch.run(&dir)?;

    if !report.is_empty() {
        report.print_summary();
    }

    Ok(())
}

/// First Ctrl-C stops new files from starting; the second exits at once.
fn install_interrupt_handler(cancel: CancelToken) {
    let spawned = thread::Builder::new()
        .name("squeeze-signal".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    tracing::warn!(error = %err, "cannot listen for Ctrl-C");
                    return;
                }
            };

            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                cancel.cancel();
                squeeze_dir::warn!(
                    "Interrupted; finishing files already in progress. Press Ctrl-C again to abort"
                );

                if tokio::signal::ctrl_c().await.is_ok() {
                    squeeze_dir::error!("Aborted");
                    std::process::exit(EXIT_INTERRUPTED);
                }
            });
        });

    if let Err(err) = spawned {
        tracing::warn!(error = %err, "cannot spawn signal thread");
    }
}
