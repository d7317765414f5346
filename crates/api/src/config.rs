use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Layered application configuration (spec.md §6 "Configuration Keys").
/// Mirrors the teacher's `ClusterConfig`: compile-time defaults, then TOML
/// files, then environment variables, each layer overriding the previous.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    pub server: ServerConfig,
    pub file: FileConfig,
    pub processing: ProcessingConfig,
    pub store: StoreConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

/// `app.file.*` (spec.md §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileConfig {
    pub max_size_bytes: u64,
    pub upload_dir: String,
}

/// `app.processing.*` (spec.md §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessingConfig {
    pub batch_size: usize,
    pub buffer_size: usize,
    pub thread_pool: ThreadPoolConfig,
    pub retention_days: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThreadPoolConfig {
    pub core_size: usize,
    pub max_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub data_dir: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Tantivy,
}

/// Caps from spec.md §4.7/§6 export rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    pub default_max_records: usize,
    pub max_records_ceiling: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl ApiConfig {
    /// Loads `ApiConfig` from compile-time defaults, then (in order)
    /// `/etc/logtrail/api.toml`, `config/api.toml`,
    /// `crates/api/config/api.toml`, then `LOGTRAIL__*` environment
    /// variables (spec.md §6).
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = config::Config::try_from(&ApiConfig::default()).context("failed to serialize default configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);

        for path in ["/etc/logtrail/api", "config/api", "crates/api/config/api"] {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(config::Environment::with_prefix("LOGTRAIL").separator("__").try_parsing(true));

        builder.build().context("failed to build configuration")?.try_deserialize().context("failed to deserialize configuration")
    }

    pub fn validate(&self) -> Result<()> {
        self.server.bind_address.parse::<std::net::SocketAddr>().context("invalid server.bind_address")?;

        if self.processing.batch_size == 0 {
            anyhow::bail!("processing.batch_size must be greater than zero");
        }
        if self.processing.buffer_size == 0 {
            anyhow::bail!("processing.buffer_size must be greater than zero");
        }
        if self.processing.thread_pool.core_size == 0 {
            anyhow::bail!("processing.thread_pool.core_size must be greater than zero");
        }
        if self.processing.thread_pool.max_size < self.processing.thread_pool.core_size {
            anyhow::bail!("processing.thread_pool.max_size must be >= core_size");
        }
        if self.file.max_size_bytes == 0 {
            anyhow::bail!("file.max_size_bytes must be greater than zero");
        }
        if self.export.default_max_records > self.export.max_records_ceiling {
            anyhow::bail!("export.default_max_records must not exceed export.max_records_ceiling");
        }

        Ok(())
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "0.0.0.0:8080".to_string(),
                read_timeout_secs: 30,
                write_timeout_secs: 60,
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
            file: FileConfig {
                max_size_bytes: 52_428_800,
                upload_dir: std::env::temp_dir().join("logtrail-uploads").to_string_lossy().into_owned(),
            },
            processing: ProcessingConfig {
                batch_size: logtrail_core::batch::DEFAULT_BATCH_SIZE,
                buffer_size: 8192,
                thread_pool: ThreadPoolConfig { core_size: 4, max_size: 10 },
                retention_days: 30,
            },
            store: StoreConfig {
                backend: StoreBackend::Memory,
                data_dir: std::env::temp_dir().join("logtrail-index").to_string_lossy().into_owned(),
            },
            export: ExportConfig {
                default_max_records: logtrail_core::export::DEFAULT_MAX_RECORDS,
                max_records_ceiling: logtrail_core::export::MAX_RECORDS_CEILING,
            },
            logging: LoggingConfig {
                level: "info,logtrail_api=debug,logtrail_core=debug".to_string(),
                format: LogFormat::Pretty,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(ApiConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_thread_pool_bounds() {
        let mut config = ApiConfig::default();
        config.processing.thread_pool.core_size = 10;
        config.processing.thread_pool.max_size = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_invalid_bind_address() {
        let mut config = ApiConfig::default();
        config.server.bind_address = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_export_default_above_ceiling() {
        let mut config = ApiConfig::default();
        config.export.default_max_records = config.export.max_records_ceiling + 1;
        assert!(config.validate().is_err());
    }
}
