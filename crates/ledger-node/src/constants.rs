pub(crate) const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
pub(crate) const DEFAULT_DATA_DIR: &str = "./data";
pub(crate) const API_VERSION: &str = env!("CARGO_PKG_VERSION");
pub(crate) const SERVICE_NAME: &str = "ledger-node";
