//! Tracing bootstrap.

use mindflow_core::GeneralConfig;
use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber.
///
/// `RUST_LOG` wins over `general.log_level`. Returns `false` when a
/// subscriber was already installed, which is not an error.
pub fn init_tracing(general: &GeneralConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&general.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if general.log_json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_harmless() {
        let general = GeneralConfig::default();
        let _ = init_tracing(&general);
        assert!(!init_tracing(&general));
    }
}
