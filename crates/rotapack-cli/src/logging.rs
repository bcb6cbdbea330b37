use crate::error::Result;
use std::fs::File;
use std::path::Path;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*};

/// Initializes the global subscriber: a compact stderr layer filtered by
/// the verbosity flags, plus an optional verbose file layer.
pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let level_filter = if quiet {
        LevelFilter::ERROR
    } else {
        match verbosity {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let registry = tracing_subscriber::registry()
        .with(level_filter)
        .with(stderr_layer);

    match log_file {
        Some(path) => {
            let file = File::create(path)?;
            let file_layer = fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true);
            registry.with(file_layer).init();
        }
        None => registry.init(),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn ensure_global_logger() {
        INIT.call_once(|| {
            setup_logging(3, false, None).expect("logger setup");
        });
    }

    #[test]
    #[serial]
    fn macros_emit_through_the_global_logger() {
        ensure_global_logger();
        tracing::error!("error line");
        tracing::info!("info line");
        tracing::trace!("trace line");
    }

    #[test]
    #[serial]
    fn unwritable_log_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_file = dir.path().to_path_buf();
        assert!(setup_logging(0, false, Some(&not_a_file)).is_err());
    }
}
