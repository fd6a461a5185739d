//! Configuration for the server binary, separate from the engine's
//! per-operation arguments: host/port, the database file path, and the
//! mapped region size, all of which the `mmapkv-server` binary pins to
//! fixed defaults but a library embedder may want to vary.

use std::path::PathBuf;

use crate::store::FILE_SIZE;

/// The database file name the CLI entry point opens by default.
pub const DEFAULT_DB_FILE: &str = "store.db";

/// The TCP port the CLI entry point listens on by default.
pub const DEFAULT_PORT: u16 = 6379;

/// Address, database path, and mapped region size for the line-protocol
/// server.
///
/// The `mmapkv-server` binary takes no flags and reads no environment
/// variables; it constructs [`ServerConfig::default`] directly. This type
/// exists so the engine and server remain usable as a library against a
/// different path, port, or region size.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Path to the backing database file.
    pub db_path: PathBuf,
    /// Address to bind the TCP listener to, e.g. `"127.0.0.1:6379"`.
    pub bind_addr: String,
    /// Size in bytes of the mapped region backing the database file.
    pub region_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_FILE),
            bind_addr: format!("127.0.0.1:{DEFAULT_PORT}"),
            region_size: FILE_SIZE,
        }
    }
}

impl ServerConfig {
    /// Returns the default configuration: `store.db` in the working
    /// directory, bound to `127.0.0.1:6379`, with the default mapped
    /// region size.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_cli_contract() {
        let config = ServerConfig::default();
        assert_eq!(config.db_path, PathBuf::from("store.db"));
        assert_eq!(config.bind_addr, "127.0.0.1:6379");
        assert_eq!(config.region_size, FILE_SIZE);
    }
}
