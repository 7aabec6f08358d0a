use std::sync::Once;

use env_logger::Env;
use log::LevelFilter;

static LOG_ONCE: Once = Once::new();

fn env_level() -> LevelFilter {
    std::env::var("AQSENSOR_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .as_deref()
        .and_then(parse_level)
        .unwrap_or(LevelFilter::Info)
}

fn parse_level(input: &str) -> Option<LevelFilter> {
    input.trim().parse::<LevelFilter>().ok()
}

fn level_to_str(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}

/// Initialize stderr logging from `AQSENSOR_LOG`/`RUST_LOG`, or from an
/// explicit override (e.g. a `--log-level` flag). Only the first call has
/// any effect.
pub fn init_logging(level_override: Option<&str>) {
    let forced = level_override.and_then(parse_level);
    LOG_ONCE.call_once(|| {
        let mut builder = match forced {
            Some(level) => {
                let mut builder = env_logger::Builder::new();
                builder.filter_level(level);
                builder
            }
            None => env_logger::Builder::from_env(
                Env::new().filter_or("AQSENSOR_LOG", level_to_str(env_level())),
            ),
        };
        builder
            .format_timestamp_millis()
            .format_module_path(true)
            .format_target(false)
            .init();
    });
}
