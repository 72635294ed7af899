use tracing_subscriber::{prelude::*, EnvFilter, Registry};

/// Initialize tracing
///
/// `RUST_LOG` selects the filter (default `info`), `LOG_FORMAT=json` switches to json lines.
pub fn init() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    if json {
        let logger = tracing_subscriber::fmt::layer().json();
        let collector = Registry::default().with(logger).with(env_filter);
        tracing::subscriber::set_global_default(collector)?;
    } else {
        let logger = tracing_subscriber::fmt::layer().compact();
        let collector = Registry::default().with(logger).with(env_filter);
        tracing::subscriber::set_global_default(collector)?;
    }
    Ok(())
}
