//! Compact console log format.
//!
//! `HH:MM:SS.mmm LEVEL stream: span1:span2: message key=value`
//!
//! The target comes first with the crate prefix dropped, so stream and
//! pipeline lines line up in a terminal.

use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

const CRATE_PREFIX: &str = "meshstream::";

#[derive(Debug, Clone, Copy)]
pub struct CompactTargetFormat {
    timestamps: bool,
}

impl CompactTargetFormat {
    pub fn new() -> Self {
        Self { timestamps: true }
    }

    pub fn without_timestamps(mut self) -> Self {
        self.timestamps = false;
        self
    }
}

impl Default for CompactTargetFormat {
    fn default() -> Self {
        Self::new()
    }
}

fn level_color(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "\x1b[31m",
        Level::WARN => "\x1b[33m",
        Level::INFO => "\x1b[32m",
        Level::DEBUG => "\x1b[34m",
        Level::TRACE => "\x1b[35m",
    }
}

/// Module path relative to this crate; foreign targets pass through
pub fn short_target(target: &str) -> &str {
    match target.strip_prefix(CRATE_PREFIX) {
        Some(rest) => rest,
        None if target == "meshstream" => "main",
        None => target,
    }
}

impl<S, N> FormatEvent<S, N> for CompactTargetFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        if self.timestamps {
            write!(writer, "{} ", chrono::Local::now().format("%H:%M:%S%.3f"))?;
        }

        let level = metadata.level();
        if writer.has_ansi_escapes() {
            write!(writer, "{}{:>5}\x1b[0m ", level_color(level), level)?;
        } else {
            write!(writer, "{:>5} ", level)?;
        }

        write!(writer, "{}: ", short_target(metadata.target()))?;

        if let Some(scope) = ctx.event_scope() {
            let names: Vec<&str> = scope.from_root().map(|span| span.name()).collect();
            if !names.is_empty() {
                write!(writer, "{}: ", names.join(":"))?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}
