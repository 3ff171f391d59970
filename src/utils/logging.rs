use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

/// Framework modules that are only interesting when tracing
const NOISY_MODULES: &[&str] = &["actix_server", "actix_http", "mio", "h2"];

/// Initialize the logger with custom formatting
pub fn init_logger(level: LevelFilter) {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level);

    if level < LevelFilter::Trace {
        for module in NOISY_MODULES {
            builder.filter_module(module, level.min(LevelFilter::Warn));
        }
    }

    // A second init (tests, embedding) keeps the first logger
    let _ = builder.try_init();
}

/// Get log level from string
pub fn get_log_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" | "warning" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        assert_eq!(get_log_level("DEBUG"), LevelFilter::Debug);
        assert_eq!(get_log_level("warning"), LevelFilter::Warn);
        assert_eq!(get_log_level("nonsense"), LevelFilter::Info);
    }
}
