//! Structured logging built on `tracing` + `tracing-subscriber`.
//!
//! Levels map onto `tracing::Level` (`Error -> ERROR, Warning -> WARN,
//! Info -> INFO, Debug -> DEBUG`); `None` disables logging entirely. The
//! `[ISO-like timestamp] [LEVEL] message` format is produced by a custom
//! timestamp formatter so file output matches the documented format even
//! though the console sink uses `tracing-subscriber`'s compact formatting.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::Subscriber;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LogLevel;

/// Callback invoked once per log record, carrying the already-formatted
/// `[ISO-like timestamp] [LEVEL] message` line. Serialized behind a mutex
/// like the other callback sinks.
pub type UserLogSink = Arc<Mutex<Box<dyn Fn(&str) + Send>>>;

/// Where log output should go, mirroring `logging.*` config knobs.
#[derive(Default)]
pub struct LoggingOptions {
    pub level: LogLevel,
    pub log_to_console: bool,
    pub log_to_file: bool,
    pub log_file_path: Option<std::path::PathBuf>,
    pub user_sink: Option<UserLogSink>,
}

/// A timestamp formatter rendering `YYYY-MM-DDTHH:MM:SSZ` without pulling in
/// a full calendar calculation library; good enough for log correlation.
struct IsoLikeTime;

impl FormatTime for IsoLikeTime {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", format_iso_like(SystemTime::now()))
    }
}

fn format_iso_like(time: SystemTime) -> String {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    civil_from_unix(secs)
}

/// Converts a Unix timestamp (seconds) into a `YYYY-MM-DDTHH:MM:SSZ` string
/// using the proleptic Gregorian calendar (Howard Hinnant's days-from-civil
/// algorithm, inverted).
fn civil_from_unix(secs: u64) -> String {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (h, m, s) = (rem / 3600, (rem % 3600) / 60, rem % 60);

    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m_num = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m_num <= 2 { y + 1 } else { y };

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        y, m_num, d, h, m, s
    )
}

/// Handle returned by the file layer's `MakeWriter` closure; `io::Write`
/// writes through the shared mutex-guarded file.
struct FileWriterHandle(Arc<Mutex<std::fs::File>>);

impl std::io::Write for FileWriterHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("log file mutex poisoned").write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().expect("log file mutex poisoned").flush()
    }
}

/// Forwards each event to a user-supplied closure as a formatted
/// `[ISO-like timestamp] [LEVEL] message` line, the fourth ambient sink
/// beyond file/console. Serialized by the mutex inside `UserLogSink`
/// itself, same as the other callback sinks.
struct UserSinkLayer {
    sink: UserLogSink,
}

impl<S: Subscriber> Layer<S> for UserSinkLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        struct MessageVisitor<'a>(&'a mut String);
        impl tracing::field::Visit for MessageVisitor<'_> {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
                if field.name() == "message" {
                    use fmt::Write as _;
                    let _ = write!(self.0, "{:?}", value);
                }
            }
        }

        let mut message = String::new();
        event.record(&mut MessageVisitor(&mut message));
        let line = format_log_line(&event.metadata().level().to_string(), &message);
        if let Ok(sink) = self.sink.lock() {
            sink(&line);
        }
    }
}

fn level_filter(level: LogLevel) -> EnvFilter {
    match level {
        LogLevel::None => EnvFilter::new("off"),
        LogLevel::Error => EnvFilter::new("error"),
        LogLevel::Warning => EnvFilter::new("warn"),
        LogLevel::Info => EnvFilter::new("info"),
        LogLevel::Debug => EnvFilter::new("debug"),
    }
}

/// Installs the global `tracing` subscriber according to `opts`. Call once
/// at process start; a second call will fail (tracing only allows a single
/// global default subscriber) and is treated as a caller error.
pub fn init_logging(opts: LoggingOptions) -> anyhow::Result<()> {
    let filter = level_filter(opts.level);
    let registry = tracing_subscriber::registry().with(filter);

    let console_layer = if opts.log_to_console {
        Some(
            tracing_subscriber::fmt::layer()
                .with_timer(IsoLikeTime)
                .with_target(false),
        )
    } else {
        None
    };

    let file_layer = if opts.log_to_file {
        let path = opts
            .log_file_path
            .ok_or_else(|| anyhow::anyhow!("log_to_file set but no log_file_path configured"))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let file = Arc::new(Mutex::new(file));
        Some(
            tracing_subscriber::fmt::layer()
                .with_timer(IsoLikeTime)
                .with_target(false)
                .with_ansi(false)
                .with_writer(move || FileWriterHandle(Arc::clone(&file))),
        )
    } else {
        None
    };

    let user_layer = opts.user_sink.map(|sink| UserSinkLayer { sink });

    registry
        .with(console_layer)
        .with(file_layer)
        .with(user_layer)
        .try_init()?;
    Ok(())
}

/// Formats a single line in the documented `[ISO-like timestamp] [LEVEL] message`
/// shape, used to feed the user log sink independently of the `tracing` layers.
pub fn format_log_line(level: &str, message: &str) -> String {
    format!(
        "[{}] [{}] {}",
        format_iso_like(SystemTime::now()),
        level,
        message
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_from_unix_epoch() {
        assert_eq!(civil_from_unix(0), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn civil_from_unix_known_date() {
        // 2024-01-01T00:00:00Z
        assert_eq!(civil_from_unix(1_704_067_200), "2024-01-01T00:00:00Z");
    }

    #[test]
    fn format_log_line_shape() {
        let line = format_log_line("INFO", "hello");
        assert!(line.starts_with('['));
        assert!(line.contains("] [INFO] hello"));
    }

    #[test]
    fn user_sink_receives_formatted_events() {
        let received: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_lines = Arc::clone(&received);
        let sink: UserLogSink = Arc::new(Mutex::new(Box::new(move |line: &str| {
            sink_lines.lock().unwrap().push(line.to_string());
        })));

        let opts = LoggingOptions {
            level: LogLevel::Info,
            log_to_console: false,
            log_to_file: false,
            log_file_path: None,
            user_sink: Some(sink),
        };
        // Ignore the error from a second global subscriber if other test
        // binaries in this process already installed one; the sink closure
        // itself is what's under test.
        let _ = init_logging(opts);

        tracing::info!("hello from test");
        assert!(received
            .lock()
            .unwrap()
            .iter()
            .any(|l| l.contains("hello from test")));
    }
}
