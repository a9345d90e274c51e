use std::{path::Path, str::FromStr};

use tracing::metadata::LevelFilter;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

use crate::error::LoggingError;

/// Number of rotated log files kept on disk.
const RETAINED_LOG_FILES: usize = 7;

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outgoing!(level = TRACE, $($msg),*)
    };
}

#[macro_export]
macro_rules! incoming {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "incoming", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::incoming!(level = TRACE, $($msg),*)
    };
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

/// Resolve the effective level: `LOG_LEVEL` from the environment wins over the
/// configured level.
fn effective_level(configured: LevelFilter) -> LevelFilter {
    std::env::var("LOG_LEVEL").map_or(configured, |level| {
        LevelFilter::from_str(level.as_str()).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {configured}");
            configured
        })
    })
}

/// Build a daily-rotated appender from a path such as `/var/log/mailgate/mailgate`.
/// The final component is the file prefix, the parent is the directory.
fn file_appender(path: &Path) -> Result<RollingFileAppender, LoggingError> {
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = path
        .file_name()
        .map_or_else(|| "mailgate".to_string(), |name| name.to_string_lossy().into_owned());

    Ok(RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(RETAINED_LOG_FILES)
        .build(directory)?)
}

fn is_mailgate(metadata: &tracing::Metadata<'_>) -> bool {
    metadata.target().starts_with("mailgate")
}

/// Install the global subscriber.
///
/// Events from `mailgate*` targets are written to stdout in compact form and,
/// when `log_file` is given, to a daily-rotated file as well.
///
/// # Errors
///
/// Fails if the log directory cannot be opened or a subscriber is already
/// installed.
pub fn init(log_file: Option<&Path>, configured: LevelFilter) -> Result<(), LoggingError> {
    let level = effective_level(configured);

    let file_layer = log_file
        .map(file_appender)
        .transpose()?
        .map(|appender| {
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .with_ansi(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_writer(appender)
                .with_filter(level)
                .with_filter(FilterFn::new(is_mailgate))
        });

    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(is_mailgate)),
        )
        .with(file_layer)
        .try_init()?;

    Ok(())
}
