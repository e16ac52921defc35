use std::sync::OnceLock;

use owo_colors::OwoColorize;
use supports_color::Stream;
use tracing_subscriber::EnvFilter;

static ANSI_ENABLED: OnceLock<bool> = OnceLock::new();

const DEFAULT_FILTER: &str = "warn";

/// Installs the global subscriber. `LITO_LOG` wins over `RUST_LOG`.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let ansi = ansi_enabled();
    let filter = EnvFilter::try_from_env("LITO_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|err| std::io::Error::other(err.to_string()))?;
    Ok(())
}

pub fn ansi_enabled() -> bool {
    *ANSI_ENABLED.get_or_init(detect_ansi)
}

pub fn banner(text: &str) -> String {
    if ansi_enabled() {
        format!("{}", text.bright_green().bold())
    } else {
        text.to_string()
    }
}

pub fn result_label(text: &str) -> String {
    if ansi_enabled() {
        format!("{}", text.bright_cyan())
    } else {
        text.to_string()
    }
}

fn detect_ansi() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }
    supports_color::on_cached(Stream::Stdout).is_some()
}
