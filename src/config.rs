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
}

/// One-shot maintenance modes that run instead of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Serve,
    /// Create the schema and exit.
    Migrate,
    /// Reclaim orphaned blobs older than the grace period and exit.
    SweepOrphans { grace: Duration },
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Content-addressed recording store")]
pub struct Args {
    /// Host to bind to (overrides RECORDING_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides RECORDING_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where blobs are stored (overrides RECORDING_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides RECORDING_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Largest accepted upload in bytes (overrides RECORDING_STORE_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<u64>,

    /// Run migrations and exit
    #[arg(long, conflicts_with = "sweep_orphans")]
    pub migrate: bool,

    /// Delete blobs no recording references, then exit
    #[arg(long)]
    pub sweep_orphans: bool,

    /// Minimum age in seconds before an orphaned blob is reclaimed
    #[arg(long, default_value_t = 3600, requires = "sweep_orphans")]
    pub sweep_grace_secs: u64,
}

const DEFAULT_MAX_UPLOAD_BYTES: u64 = 2 * 1024 * 1024 * 1024;

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and run mode.
    pub fn from_env_and_args() -> Result<(Self, Mode)> {
        // Parse CLI once
        let args = Args::parse();
        Self::from_args(args)
    }

    fn from_args(args: Args) -> Result<(Self, Mode)> {
        // --- Environment fallback ---
        let env_host = env::var("RECORDING_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_or("RECORDING_STORE_PORT", 5000u16)?;
        let env_storage =
            env::var("RECORDING_STORE_STORAGE_DIR").unwrap_or_else(|_| "./data/blobs".into());
        let env_db = env::var("RECORDING_STORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/recordings.db".into());
        let env_max_upload = env_or("RECORDING_STORE_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
        };

        let mode = if args.migrate {
            Mode::Migrate
        } else if args.sweep_orphans {
            Mode::SweepOrphans {
                grace: Duration::from_secs(args.sweep_grace_secs),
            }
        } else {
            Mode::Serve
        };

        Ok((cfg, mode))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read and parse an environment variable, falling back to `default` when unset.
fn env_or<T>(key: &str, default: T) -> Result<T>
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

    fn parse(argv: &[&str]) -> (AppConfig, Mode) {
        let args = Args::try_parse_from(std::iter::once("recording-store").chain(argv.iter().copied()))
            .unwrap();
        AppConfig::from_args(args).unwrap()
    }

    #[test]
    fn cli_flags_override_defaults() {
        let (cfg, mode) = parse(&[
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
            "--storage-dir",
            "/tmp/blobs",
            "--max-upload-bytes",
            "1024",
        ]);

        assert_eq!(cfg.addr(), "127.0.0.1:8080");
        assert_eq!(cfg.storage_dir, "/tmp/blobs");
        assert_eq!(cfg.max_upload_bytes, 1024);
        assert_eq!(mode, Mode::Serve);
    }

    #[test]
    fn maintenance_modes() {
        assert_eq!(parse(&["--migrate"]).1, Mode::Migrate);
        assert_eq!(
            parse(&["--sweep-orphans", "--sweep-grace-secs", "60"]).1,
            Mode::SweepOrphans {
                grace: Duration::from_secs(60)
            }
        );
        assert!(Args::try_parse_from(["recording-store", "--migrate", "--sweep-orphans"]).is_err());
    }

    #[test]
    fn env_or_parses_or_defaults() {
        assert_eq!(
            env_or::<u16>("RECORDING_STORE_TEST_UNSET_VARIABLE", 7).unwrap(),
            7
        );
    }
}
