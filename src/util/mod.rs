pub mod logging;
pub mod version;
pub mod xml;
