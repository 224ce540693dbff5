use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "dosetrack";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// SQLite database filename inside the data directory.
pub const DB_FILE: &str = "dosetrack.db";

/// Default log filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> String {
    format!("info,{APP_NAME}=debug")
}

/// Get the application data directory.
///
/// `DOSETRACK_DATA_DIR` overrides the platform default for tests and
/// containerized deployments.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = env::var("DOSETRACK_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .map(|d| d.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn db_path() -> PathBuf {
    data_dir().join(DB_FILE)
}

/// Listen address, overridable via `DOSETRACK_BIND_ADDR`.
pub fn bind_addr() -> SocketAddr {
    env::var("DOSETRACK_BIND_ADDR")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8780)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_path_is_inside_data_dir() {
        let path = db_path();
        assert!(path.starts_with(data_dir()));
        assert!(path.ends_with(DB_FILE));
    }

    #[test]
    fn default_bind_addr_is_loopback() {
        // Without the env override the default applies
        if env::var("DOSETRACK_BIND_ADDR").is_err() {
            let addr = bind_addr();
            assert!(addr.ip().is_loopback());
            assert_eq!(addr.port(), 8780);
        }
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }
}
