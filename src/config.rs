use crate::{
    services::gateway::GatewayConfig,
    uploader::{MIB, MIN_PART_SIZE},
};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::{env, fmt, path::PathBuf, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub admin_token: Secret,
    pub s3: S3Settings,
    pub gateway: GatewayConfig,
}

/// Connection settings for the S3-compatible bucket behind the gateway.
#[derive(Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for MinIO, R2 and friends.
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    /// Static credentials; when absent the default AWS provider chain is used.
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("force_path_style", &self.force_path_style)
            .field("access_key_id", &self.access_key_id.as_ref().map(|_| "<set>"))
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// A string that never shows up in logs.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Media catalog with resumable S3 multipart uploads")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Host to bind to (overrides CATALOG_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides CATALOG_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides CATALOG_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Publish a catalog entry from an external link or a local file.
    Publish(PublishArgs),
}

/// S3 caps a single part at 5 GiB.
const MAX_PART_SIZE_MIB: u64 = 5 * 1024;

#[derive(clap::Args, Debug, Clone)]
pub struct PublishArgs {
    /// Base URL of a running catalog server
    #[arg(long, env = "CATALOG_SERVER_URL", default_value = "http://127.0.0.1:3000")]
    pub server: String,

    /// Admin bearer token
    #[arg(long, env = "CATALOG_ADMIN_TOKEN", hide_env_values = true)]
    pub token: String,

    #[arg(long)]
    pub title: String,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub cover_url: Option<String>,

    /// Defaults to `movie`
    #[arg(long)]
    pub category: Option<String>,

    /// Publish an external URL (YouTube, Vimeo, Drive, direct stream)
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub link: Option<String>,

    /// Upload a local file through the gateway and publish its location
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Content type of the uploaded file; guessed from the extension by default
    #[arg(long)]
    pub content_type: Option<String>,

    /// Part size in MiB; S3 rejects non-final parts below 5 MiB
    #[arg(
        long,
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(MIN_PART_SIZE / MIB..=MAX_PART_SIZE_MIB)
    )]
    pub part_size_mib: u64,

    /// Parts uploaded at once
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Where to keep the resume token of an interrupted upload
    #[arg(long)]
    pub resume_file: Option<PathBuf>,
}

impl AppConfig {
    /// Merge CLI args with the process environment.
    pub fn from_env_and_args(args: &Args) -> Result<Self> {
        Self::resolve(args, |name| env::var(name).ok())
    }

    /// Merge CLI args with variables from `lookup`; CLI values win.
    pub fn resolve(args: &Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        // --- Environment fallback ---
        let env_host = non_empty("CATALOG_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = parse_var::<u16>(&lookup, "CATALOG_PORT")?.unwrap_or(3000);
        let env_db = non_empty("CATALOG_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./data/catalog.db".into());

        let admin_token = non_empty("CATALOG_ADMIN_TOKEN")
            .context("CATALOG_ADMIN_TOKEN must be set")?;

        let s3 = S3Settings {
            bucket: non_empty("AWS_S3_BUCKET").context("AWS_S3_BUCKET must be set")?,
            region: non_empty("AWS_S3_REGION").unwrap_or_else(|| "us-east-1".into()),
            endpoint_url: non_empty("AWS_S3_ENDPOINT_URL"),
            force_path_style: parse_var::<bool>(&lookup, "AWS_S3_FORCE_PATH_STYLE")?
                .unwrap_or(false),
            access_key_id: non_empty("AWS_ACCESS_KEY_ID"),
            secret_access_key: non_empty("AWS_SECRET_ACCESS_KEY"),
        };

        let defaults = GatewayConfig::default();
        let key_prefix = non_empty("CATALOG_UPLOAD_PREFIX").unwrap_or(defaults.key_prefix);
        if key_prefix.starts_with('/') || key_prefix.contains("..") || !key_prefix.ends_with('/') {
            bail!(
                "CATALOG_UPLOAD_PREFIX `{}` must be relative, end with `/` and not contain `..`",
                key_prefix
            );
        }
        let gateway = GatewayConfig {
            key_prefix,
            presign_ttl: parse_var::<u64>(&lookup, "CATALOG_PRESIGN_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.presign_ttl),
            public_base_url: non_empty("CATALOG_PUBLIC_BASE_URL"),
        };
        if gateway.presign_ttl.is_zero() || gateway.presign_ttl > Duration::from_secs(7 * 24 * 3600) {
            bail!("CATALOG_PRESIGN_TTL_SECS must be between 1 and 604800");
        }

        // --- Merge ---
        Ok(Self {
            host: args.host.clone().unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.clone().unwrap_or(env_db),
            admin_token: admin_token.into(),
            s3,
            gateway,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name).filter(|v| !v.trim().is_empty()) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        None => Ok(None),
    }
}
