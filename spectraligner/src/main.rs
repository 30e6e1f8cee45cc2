use std::fs;
use std::io;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use spectraligner::{SpectralAligner, SpectralAlignerError};

#[cfg(feature = "mimalloc")]
use mimalloc::MiMalloc;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn log_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy()
}

/// Log to STDERR, and to `log_file` too if given. The returned guard must
/// outlive every log statement or the tail of the file is lost.
fn configure_log(log_file: Option<&Path>) -> io::Result<Option<WorkerGuard>> {
    tracing_log::LogTracer::init().map_err(io::Error::other)?;
    let stderr_layer = fmt::layer()
        .compact()
        .with_timer(fmt::time::ChronoLocal::rfc_3339())
        .with_writer(io::stderr)
        .with_filter(log_filter());

    match log_file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(fs::File::create(path)?);
            let file_layer = fmt::layer()
                .compact()
                .with_ansi(false)
                .with_timer(fmt::time::ChronoLocal::rfc_3339())
                .with_writer(writer)
                .with_filter(log_filter());
            let subscriber = tracing_subscriber::registry()
                .with(stderr_layer)
                .with(file_layer);
            tracing::subscriber::set_global_default(subscriber).map_err(io::Error::other)?;
            Ok(Some(guard))
        }
        None => {
            let subscriber = tracing_subscriber::registry().with(stderr_layer);
            tracing::subscriber::set_global_default(subscriber).map_err(io::Error::other)?;
            Ok(None)
        }
    }
}

fn load_configuration(args: SpectralAligner) -> Result<SpectralAligner, SpectralAlignerError> {
    let config_file = args.config_file.clone();
    let mut figment = Figment::from(Serialized::defaults(args)).merge(Toml::file("spectraligner.toml"));
    if let Some(config_file) = config_file {
        figment = figment.merge(Toml::file_exact(config_file));
    }
    Ok(figment.merge(Env::prefixed("SPECTRALIGNER_")).extract()?)
}

fn run(args: SpectralAligner) -> Result<(), SpectralAlignerError> {
    let args = load_configuration(args)?;
    let _guard = configure_log(args.log_file.as_deref())?;
    if tracing::enabled!(tracing::Level::DEBUG) {
        match toml::to_string_pretty(&args) {
            Ok(text) => debug!("Effective configuration:\n{text}"),
            Err(e) => debug!("Failed to render the configuration: {e}"),
        }
    }
    args.main()
}

fn main() -> ExitCode {
    let args = SpectralAligner::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
