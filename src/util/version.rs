pub const APP_NAME: &str = "correos-cr-shipping";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User agent sent to the carrier and bank web services.
pub fn user_agent() -> String {
    format!("{APP_NAME}/{APP_VERSION}")
}
