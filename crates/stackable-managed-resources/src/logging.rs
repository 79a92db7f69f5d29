use std::path::PathBuf;

use snafu::{ResultExt, Snafu};
use tracing_appender::rolling::{InitError, RollingFileAppender};
use tracing_subscriber::{
    EnvFilter, Registry,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to initialize the rolling file appender in {}", directory.display()))]
    InitFileAppender {
        source: InitError,
        directory: PathBuf,
    },

    #[snafu(display("failed to set the global default subscriber"))]
    InitSubscriber { source: TryInitError },
}

/// Initializes `tracing` logging with options from the environment variable
/// given in the `env` parameter.
///
/// We force users to provide a variable name so it can be different per application.
/// We encourage it to be the application name plus `_LOG`, e.g. `RESOURCECTL_LOG`.
/// If the variable is not set, the maximum log level is set to INFO.
///
/// Log output can be copied to a file by setting `{env}_DIRECTORY` (e.g. `RESOURCECTL_LOG_DIRECTORY`)
/// to a directory path. This file will be rotated regularly.
pub fn initialize_logging(env: &str, app_name: &str) -> Result<(), Error> {
    let filter = EnvFilter::try_from_env(env)
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));

    let file_appender_directory = std::env::var_os(format!("{env}_DIRECTORY")).map(PathBuf::from);
    let file_appender = file_appender_directory
        .as_deref()
        .map(|log_dir| {
            RollingFileAppender::builder()
                .filename_suffix(format!("{app_name}.log"))
                .max_log_files(6)
                .build(log_dir)
                .with_context(|_| InitFileAppenderSnafu {
                    directory: log_dir.to_path_buf(),
                })
        })
        .transpose()?;

    let console = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let file = file_appender.map(|appender| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(appender)
    });
    Registry::default()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .context(InitSubscriberSnafu)?;

    // need to delay logging until after tracing is initialized
    match file_appender_directory {
        Some(dir) => tracing::info!(directory = %dir.display(), "file logging enabled"),
        None => tracing::debug!("file logging disabled, because no log directory set"),
    }

    Ok(())
}
