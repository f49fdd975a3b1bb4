use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

impl From<&str> for LogFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

/// Initializes the tracing subscriber. `RUST_LOG` overrides `level`.
pub fn init_logging(level: &str, format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact())
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    tracing::info!("logging initialized at level {}", level);
}

/// Masks all but the first and last `visible_chars` characters, for logging
/// account numbers and similar identifiers. Counts characters, not bytes,
/// so caller-supplied lookup keys with multi-byte characters mask cleanly.
pub fn mask_sensitive(value: &str, visible_chars: usize) -> String {
    let total = value.chars().count();
    if total <= visible_chars * 2 {
        return "*".repeat(total);
    }

    let prefix: String = value.chars().take(visible_chars).collect();
    let suffix: String = value.chars().skip(total - visible_chars).collect();
    let masked_len = total - visible_chars * 2;

    format!("{}{}{}", prefix, "*".repeat(masked_len), suffix)
}
