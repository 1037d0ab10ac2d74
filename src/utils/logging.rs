//! Line-oriented log output with bracketed severity tags.
//!
//! Every event is printed as `[TAG] message` on stdout. `TAG` follows the
//! event level (`INFO`, `WARNING`, `ERROR`, ...) except for events sent to
//! [`SUCCESS_TARGET`], which print as `[SUCCESS]`. Use the [`success!`]
//! macro for those.

use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub const SUCCESS_TARGET: &str = "pg_r2_backup::success";

/// Logs at info level with the `[SUCCESS]` tag.
#[macro_export]
macro_rules! success {
    ($($arg:tt)+) => {
        tracing::info!(target: $crate::utils::logging::SUCCESS_TARGET, $($arg)+)
    };
}

/// Formats events as `[TAG] message` without timestamps or targets.
pub struct TaggedFormat;

pub fn tag_for(level: &Level, target: &str) -> &'static str {
    if target == SUCCESS_TARGET {
        return "SUCCESS";
    }
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

impl<S, N> FormatEvent<S, N> for TaggedFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(writer, "[{}] ", tag_for(metadata.level(), metadata.target()))?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides the default `info`
/// filter.
pub fn init() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(TaggedFormat)
                .with_writer(std::io::stdout),
        )
        .init();
}
