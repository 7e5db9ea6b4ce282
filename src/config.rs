// ============================================================================
// Configuration
// ============================================================================
//
// Every knob can be overridden through the environment:
//
// | Variable           | Default     | Meaning                        |
// |--------------------|-------------|--------------------------------|
// | STORAGE_HOST       | 127.0.0.1   | Storage node address           |
// | STORAGE_PORT       | 9042        | Storage node port              |
// | STORAGE_KEYSPACE   | stage_sync  | Keyspace holding collections   |
// | METRICS_PORT       | 9090        | Prometheus /metrics HTTP port  |
//
// ============================================================================

/// Bridge configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Storage node address handed to the connection factory.
    pub storage_host: String,
    /// Storage node port.
    pub storage_port: u16,
    /// Keyspace that holds the nine entity collections.
    pub keyspace: String,
    /// Port the metrics HTTP server listens on.
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            storage_host: std::env::var("STORAGE_HOST")
                .unwrap_or_else(|_| "127.0.0.1".into()),
            storage_port: std::env::var("STORAGE_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(9042),
            keyspace: std::env::var("STORAGE_KEYSPACE")
                .unwrap_or_else(|_| "stage_sync".into()),
            metrics_port: std::env::var("METRICS_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(9090),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_host: "127.0.0.1".into(),
            storage_port: 9042,
            keyspace: "stage_sync".into(),
            metrics_port: 9090,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration() {
        let config = Config::default();
        assert_eq!(config.storage_host, "127.0.0.1");
        assert_eq!(config.storage_port, 9042);
        assert_eq!(config.keyspace, "stage_sync");
        assert_eq!(config.metrics_port, 9090);
    }
}
