use std::path::Path;
use tracing::{info, warn, Subscriber};
use tracing_appender::non_blocking;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Keeps the non-blocking writers flushing; hold it until the process exits.
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

/// Initialize logging for a service: console always, plus `{service}.log`
/// under `log_dir` when that directory is writable. The previous run's log is
/// moved aside first.
///
/// `RUST_LOG` wins over `default_level`.
pub fn init_service_logging(
    log_dir: &str,
    service_name: &str,
    default_level: &str,
) -> Result<LogGuards, anyhow::Error> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Logs go to stderr so command output on stdout stays machine readable
    let (non_blocking_console, console_guard) = non_blocking(std::io::stderr());

    if !can_write(log_dir) {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer(non_blocking_console))
            .try_init()?;

        info!("Logging initialized - console output only (could not create log directory)");
        return Ok(LogGuards {
            _guards: vec![console_guard],
        });
    }

    let rotation = rotate_logs_on_startup(log_dir, service_name);

    let (non_blocking_file, file_guard) = non_blocking(file_appender(log_dir, service_name));
    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer(non_blocking_console))
        .try_init()?;

    if let Err(e) = rotation {
        warn!("Failed to back up previous log file: {}", e);
    }
    info!("Logging initialized - logs will be written to {log_dir}/{service_name}.log");
    Ok(LogGuards {
        _guards: vec![file_guard, console_guard],
    })
}

fn console_layer<S>(writer: NonBlocking) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(writer)
        .with_ansi(true)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
}

/// One file per run, `{log_dir}/{service}.log`; older runs are kept as
/// timestamped backups by `rotate_logs_on_startup`.
fn file_appender(log_dir: &str, service_name: &str) -> RollingFileAppender {
    tracing_appender::rolling::never(log_dir, format!("{service_name}.log"))
}

fn can_write(log_dir: &str) -> bool {
    let probe = format!("{log_dir}/.test_write");
    std::fs::create_dir_all(log_dir)
        .and_then(|_| std::fs::File::create(&probe))
        .and_then(|_| std::fs::remove_file(&probe))
        .is_ok()
}

pub fn rotate_logs_on_startup(log_dir: &str, service_name: &str) -> Result<(), anyhow::Error> {
    let log_file = format!("{log_dir}/{service_name}.log");
    let log_path = Path::new(&log_file);

    if log_path.exists() {
        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let backup_file = format!("{log_dir}/{service_name}.{timestamp}.log");

        std::fs::rename(&log_file, &backup_file)?;
        info!("Previous log file backed up to: {backup_file}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_moves_previous_log() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().to_str().unwrap();
        std::fs::write(dir.path().join("tsbx_preview.log"), "old").unwrap();

        rotate_logs_on_startup(log_dir, "tsbx_preview").unwrap();

        assert!(!dir.path().join("tsbx_preview.log").exists());
        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("tsbx_preview."))
            .collect();
        assert_eq!(backups.len(), 1);
    }

    #[test]
    fn test_rotate_without_log_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        rotate_logs_on_startup(dir.path().to_str().unwrap(), "tsbx_preview").unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_rotate_moves_appender_output() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().to_str().unwrap();
        {
            let mut appender = file_appender(log_dir, "tsbx_preview");
            appender.write_all(b"previous run\n").unwrap();
            appender.flush().unwrap();
        }
        assert!(dir.path().join("tsbx_preview.log").exists());

        rotate_logs_on_startup(log_dir, "tsbx_preview").unwrap();

        assert!(!dir.path().join("tsbx_preview.log").exists());
        let backup = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .find(|e| e.file_name().to_string_lossy().starts_with("tsbx_preview."))
            .unwrap();
        assert_eq!(std::fs::read_to_string(backup.path()).unwrap(), "previous run\n");
    }

    #[test]
    fn test_console_layer_stacks_on_file_layer() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().to_str().unwrap();
        let (file_writer, file_guard) = non_blocking(file_appender(log_dir, "tsbx_preview"));
        let (console_writer, _console_guard) = non_blocking(std::io::sink());

        let subscriber = tracing_subscriber::registry()
            .with(EnvFilter::new("info"))
            .with(fmt::layer().with_writer(file_writer).with_ansi(false))
            .with(console_layer(console_writer));
        tracing::subscriber::with_default(subscriber, || info!("stacked layers"));
        drop(file_guard);

        let written = std::fs::read_to_string(dir.path().join("tsbx_preview.log")).unwrap();
        assert!(written.contains("stacked layers"));
    }

    #[test]
    fn test_can_write() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs");
        assert!(can_write(nested.to_str().unwrap()));
        assert!(nested.exists());
    }
}
