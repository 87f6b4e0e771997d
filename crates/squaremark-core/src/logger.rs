//! Stderr logging for the `log` facade.
//!
//! Records from the `squaremark*` crates are shown down to the requested
//! level; records from dependencies only at `warn` and above, so `-vv`
//! does not drown the detector output in decoder chatter.
//!
//! Lines look like `[  0.412s DEBUG squaremark_aruco::detector] 3 candidates`.
//! With the `tracing` feature, [`init_tracing`] installs a
//! `tracing-subscriber` instead.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

const CRATE_PREFIX: &str = "squaremark";

struct StderrLogger {
    level: LevelFilter,
    started: Instant,
}

impl StderrLogger {
    fn limit_for(&self, target: &str) -> LevelFilter {
        if target.starts_with(CRATE_PREFIX) {
            self.level
        } else {
            self.level.min(LevelFilter::Warn)
        }
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.limit_for(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let secs = self.started.elapsed().as_secs_f64();
        let mut out = std::io::stderr().lock();
        let _ = match record.level() {
            Level::Info => writeln!(out, "[{secs:7.3}s] {}", record.args()),
            level => writeln!(
                out,
                "[{secs:7.3}s {level:>5} {}] {}",
                record.target(),
                record.args()
            ),
        };
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger; only the first call takes effect.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| StderrLogger {
        level,
        started: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

/// Install a `tracing` subscriber. `RUST_LOG` wins when set; otherwise the
/// workspace crates log at `level` and everything else at `warn` or below.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool, level: LevelFilter) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}

/// Filter directives mirroring [`StderrLogger`]'s per-target limits.
#[cfg(feature = "tracing")]
fn default_directives(level: LevelFilter) -> String {
    let ours = level.to_string().to_ascii_lowercase();
    let deps = level.min(LevelFilter::Warn).to_string().to_ascii_lowercase();
    ["squaremark", "squaremark_core", "squaremark_aruco", "squaremark_calib"]
        .iter()
        .fold(deps, |acc, krate| format!("{acc},{krate}={ours}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_are_capped_at_warn() {
        let logger = StderrLogger {
            level: LevelFilter::Trace,
            started: Instant::now(),
        };
        assert_eq!(logger.limit_for("squaremark_aruco::detector"), LevelFilter::Trace);
        assert_eq!(logger.limit_for("chess_corners"), LevelFilter::Warn);

        let quiet = StderrLogger {
            level: LevelFilter::Error,
            started: Instant::now(),
        };
        assert_eq!(quiet.limit_for("image"), LevelFilter::Error);
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn tracing_directives_follow_verbosity() {
        assert_eq!(
            default_directives(LevelFilter::Debug),
            "warn,squaremark=debug,squaremark_core=debug,squaremark_aruco=debug,squaremark_calib=debug"
        );
        assert!(default_directives(LevelFilter::Error).starts_with("error,squaremark=error"));
    }
}
