use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber for hosts that do not bring their own.
/// `RUST_LOG` takes precedence over the debug flag.
pub fn init(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("correos_cr_shipping={default_level}")));

    // A host may already have installed a global subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    #[test]
    fn repeated_init_is_harmless() {
        super::init(true);
        super::init(false);
        tracing::debug!("logging ready");
    }
}
