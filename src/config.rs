use crate::services::storage_service::ServiceSettings;
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub max_upload_bytes: u64,
    pub max_request_bytes: u64,
    pub mirror_to_db: bool,
    pub operation_timeout_secs: u64,
}

/// What the binary should do once configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Serve,
    /// Apply the schema and exit.
    Migrate,
    /// Remove unregistered files from the storage directory and exit.
    SweepOrphans,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Content-addressed file storage API")]
pub struct Args {
    /// Host to bind to (overrides FILESTORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILESTORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where blobs are stored (overrides FILESTORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides FILESTORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Largest accepted file in bytes (overrides FILESTORE_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<u64>,

    /// Largest accepted upload request in bytes (overrides FILESTORE_MAX_REQUEST_BYTES)
    #[arg(long)]
    pub max_request_bytes: Option<u64>,

    /// Also keep a copy of every blob in the database (overrides FILESTORE_MIRROR_TO_DB)
    #[arg(long)]
    pub mirror_to_db: Option<bool>,

    /// Deadline in seconds for a single write operation (overrides FILESTORE_OPERATION_TIMEOUT_SECS)
    #[arg(long)]
    pub operation_timeout_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Remove blob files unknown to the database and exit
    #[arg(long, conflicts_with = "migrate")]
    pub sweep_orphans: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and run mode.
    pub fn from_env_and_args() -> Result<(Self, RunMode)> {
        Self::merge(Args::parse())
    }

    /// Merge already-parsed CLI args over the environment.
    pub fn merge(args: Args) -> Result<(Self, RunMode)> {
        // --- Environment fallback ---
        let env_host = env::var("FILESTORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("FILESTORE_PORT", 3000u16)?;
        let env_storage =
            env::var("FILESTORE_STORAGE_DIR").unwrap_or_else(|_| "./data/blobs".into());
        let env_db = env::var("FILESTORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/filestore.db".into());
        let env_max_upload = env_parse("FILESTORE_MAX_UPLOAD_BYTES", 2 * 1024 * 1024u64)?;
        let env_max_request = env_parse("FILESTORE_MAX_REQUEST_BYTES", 32 * 1024 * 1024u64)?;
        let env_mirror = env_parse("FILESTORE_MIRROR_TO_DB", false)?;
        let env_timeout = env_parse("FILESTORE_OPERATION_TIMEOUT_SECS", 30u64)?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
            max_request_bytes: args.max_request_bytes.unwrap_or(env_max_request),
            mirror_to_db: args.mirror_to_db.unwrap_or(env_mirror),
            operation_timeout_secs: args.operation_timeout_secs.unwrap_or(env_timeout),
        };

        if cfg.max_upload_bytes == 0 {
            anyhow::bail!("max upload size must be positive");
        }
        if cfg.max_request_bytes < cfg.max_upload_bytes {
            anyhow::bail!("max request size must be at least the max upload size");
        }
        if cfg.operation_timeout_secs == 0 {
            anyhow::bail!("operation timeout must be positive");
        }

        let mode = if args.migrate {
            RunMode::Migrate
        } else if args.sweep_orphans {
            RunMode::SweepOrphans
        } else {
            RunMode::Serve
        };

        Ok((cfg, mode))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            max_upload_size: self.max_upload_bytes,
            max_request_size: self.max_request_bytes,
            mirror_to_db: self.mirror_to_db,
            operation_timeout: Duration::from_secs(self.operation_timeout_secs),
        }
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_pick_the_run_mode() {
        let args = Args::parse_from(["filestore", "--migrate"]);
        assert_eq!(AppConfig::merge(args).unwrap().1, RunMode::Migrate);

        let args = Args::parse_from(["filestore", "--sweep-orphans"]);
        assert_eq!(AppConfig::merge(args).unwrap().1, RunMode::SweepOrphans);

        let args = Args::parse_from(["filestore"]);
        assert_eq!(AppConfig::merge(args).unwrap().1, RunMode::Serve);
    }

    #[test]
    fn cli_values_become_service_settings() {
        let args = Args::parse_from([
            "filestore",
            "--max-upload-bytes",
            "1024",
            "--mirror-to-db",
            "true",
            "--operation-timeout-secs",
            "5",
        ]);
        let (cfg, _) = AppConfig::merge(args).unwrap();
        let settings = cfg.service_settings();
        assert_eq!(settings.max_upload_size, 1024);
        assert!(settings.mirror_to_db);
        assert_eq!(settings.operation_timeout, Duration::from_secs(5));
    }

    #[test]
    fn request_limit_below_file_limit_is_rejected() {
        let args = Args::parse_from([
            "filestore",
            "--max-upload-bytes",
            "4096",
            "--max-request-bytes",
            "1024",
        ]);
        assert!(AppConfig::merge(args).is_err());
    }

    #[test]
    fn zero_upload_limit_is_rejected() {
        let args = Args::parse_from(["filestore", "--max-upload-bytes", "0"]);
        assert!(AppConfig::merge(args).is_err());
    }
}
