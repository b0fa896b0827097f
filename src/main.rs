//! RemotePut CLI - single-file SFTP upload

use clap::Parser;
use remoteput::config::{CliArgs, LogFormat, OutputFormat, RunConfig};
use remoteput::core::RemoteUploader;
use remoteput::error::Result;
use remoteput::progress::ProgressReporter;
use remoteput::trust::KnownHosts;
use tracing::warn;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    init_logging(&args);

    // Handle result
    if let Err(e) = run(&args) {
        eprintln!("Error: {} [{}]", e, e.phase());
        std::process::exit(e.phase().exit_code());
    }
}

/// RUST_LOG wins over -v/-q; logs go to stderr so stdout stays parseable
fn init_logging(args: &CliArgs) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match args.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn run(args: &CliArgs) -> Result<()> {
    // Build configuration
    let config = RunConfig::from_cli(args)?;

    // Print configuration if verbose
    if args.verbose > 0 {
        print_config(&config);
    }

    let known_hosts = match &config.known_hosts_path {
        Some(path) => KnownHosts::load(path)?,
        None => KnownHosts::new(),
    };

    let progress = if args.progress && !args.quiet {
        ProgressReporter::new()
    } else {
        ProgressReporter::disabled()
    };

    let uploader = RemoteUploader::new(config.options)
        .with_known_hosts(known_hosts)
        .with_progress(progress);

    let report = uploader.upload(&config.params, &config.request, &config.policy)?;

    match args.output_format {
        OutputFormat::Json => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => warn!("Cannot serialize report: {}", e),
        },
        OutputFormat::Text => {
            if !args.quiet {
                report.print_summary();
            }
        }
    }

    Ok(())
}

fn print_config(config: &RunConfig) {
    let timeouts = &config.options.timeouts;
    eprintln!("=== Upload Configuration ===");
    eprintln!("Local:        {:?}", config.request.local_path);
    eprintln!(
        "Destination:  {}@{}:{} (port {})",
        config.params.username, config.params.host, config.request.remote_path, config.params.port
    );
    eprintln!("Auth:         {}", config.params.credential.method());
    eprintln!("Trust:        {}", config.policy.name());
    match &config.known_hosts_path {
        Some(path) => eprintln!("Known hosts:  {:?}", path),
        None => eprintln!("Known hosts:  (none)"),
    }
    eprintln!(
        "Timeouts:     connect {}, session {}, transfer {}",
        humantime::format_duration(timeouts.connect),
        humantime::format_duration(timeouts.session),
        timeouts
            .transfer
            .map(|d| humantime::format_duration(d).to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    eprintln!("Overwrite:    {:?}", config.options.overwrite);
    eprintln!(
        "Buffer:       {}",
        humansize::format_size(config.options.buffer_size as u64, humansize::BINARY)
    );
    eprintln!();
}
