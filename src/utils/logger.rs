use chrono::Local;
use eyre::Result;
use fern::Dispatch;
use log::LevelFilter;

/// Crates whose debug output drowns the bot's own
const NOISY_TARGETS: [&str; 4] = ["hyper", "reqwest", "alloy_transport_http", "alloy_rpc_client"];

/// Parses a `RUST_LOG`-style level, `Info` if unset or invalid
fn parse_level(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|level| level.trim().parse().ok())
        .unwrap_or(LevelFilter::Info)
}

/// Sets up the application logger on stdout.
///
/// The level comes from `RUST_LOG` (default `info`). HTTP and RPC client crates are
/// capped at `warn`.
///
/// # Errors
/// * If a global logger is already set
pub fn setup_logger() -> Result<()> {
    let level = parse_level(std::env::var("RUST_LOG").ok().as_deref());

    NOISY_TARGETS
        .iter()
        .fold(Dispatch::new().level(level), |dispatch, target| {
            dispatch.level_for(*target, level.min(LevelFilter::Warn))
        })
        .chain(std::io::stdout())
        // 2025-01-31 12:00:00 [INFO] hopper::bot: message
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ));
        })
        .apply()?;
    Ok(())
}
