//! Bridge configuration
//!
//! Command-line arguments with environment fallbacks, converted into a
//! validated [`BridgeConfig`].

use anyhow::{bail, Context, Result};
use clap::Parser;
use faxspool_protocol::defaults::{
    DEFAULT_DOCUMENT_EXTENSIONS, DEFAULT_HTTP_BIND_ADDR, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_QUEUE_DIR, DEFAULT_RETENTION_SECS, DEFAULT_SHUTDOWN_GRACE_SECS,
    DEFAULT_SUBMIT_TIMEOUT_SECS, DESCRIPTOR_EXTENSION,
};
use faxspool_protocol::CorrelationField;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "faxspool-bridge",
    version,
    about = "Bridges a HylaFax-style spool directory to a webhook fax transport"
)]
pub struct BridgeArgs {
    /// Root of the file-transfer area holding the spool directory
    #[arg(long, env = "FTP_ROOT")]
    pub ftp_root: PathBuf,

    /// Spool sub-directory under the root
    #[arg(long, env = "FAXSPOOL_QUEUE_DIR", default_value = DEFAULT_QUEUE_DIR)]
    pub queue_dir: String,

    /// Outbound webhook endpoint
    #[arg(long, env = "SEND_WEBHOOK_URL")]
    pub webhook_url: String,

    #[arg(long, env = "SEND_WEBHOOK_USER")]
    pub webhook_user: Option<String>,

    #[arg(long, env = "SEND_WEBHOOK_PASS", hide_env_values = true)]
    pub webhook_pass: Option<String>,

    /// Local fax number sent as the caller on every outbound fax
    #[arg(long, env = "FAX_NUMBER")]
    pub fax_number: String,

    /// Bind address for the callback listener
    #[arg(long, env = "FAXSPOOL_HTTP_BIND", default_value = DEFAULT_HTTP_BIND_ADDR)]
    pub http_bind: String,

    #[arg(long, env = "FAXSPOOL_POLL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_ms: u64,

    #[arg(long, env = "FAXSPOOL_SUBMIT_TIMEOUT_SECS", default_value_t = DEFAULT_SUBMIT_TIMEOUT_SECS)]
    pub submit_timeout_secs: u64,

    /// How long an unpaired descriptor or document is kept (0 = forever)
    #[arg(long, env = "FAXSPOOL_RETENTION_SECS", default_value_t = DEFAULT_RETENTION_SECS)]
    pub retention_secs: u64,

    #[arg(long, env = "FAXSPOOL_SHUTDOWN_GRACE_SECS", default_value_t = DEFAULT_SHUTDOWN_GRACE_SECS)]
    pub shutdown_grace_secs: u64,

    /// Prefix for `.sts` file names (HylaFax queues use `Q`)
    #[arg(long, env = "FAXSPOOL_STATUS_PREFIX", default_value = "")]
    pub status_prefix: String,

    /// Notification field that carries the submitted job id (uuid | call_uuid)
    #[arg(long, env = "FAXSPOOL_CORRELATION_FIELD", default_value = "uuid")]
    pub correlation_field: CorrelationField,

    /// Document extensions, comma separated
    #[arg(
        long,
        env = "FAXSPOOL_DOCUMENT_EXTENSIONS",
        value_delimiter = ',',
        default_value = "pdf"
    )]
    pub document_extensions: Vec<String>,

    /// Process files already in the spool at startup
    #[arg(long, env = "FAXSPOOL_SCAN_EXISTING")]
    pub scan_existing: bool,

    /// Log directory override
    #[arg(long, env = "FAXSPOOL_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Debug output on the console
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub spool_dir: PathBuf,
    pub webhook_url: String,
    pub webhook_user: Option<String>,
    pub webhook_pass: Option<String>,
    pub fax_number: String,
    pub http_bind: SocketAddr,
    pub poll_interval: Duration,
    pub submit_timeout: Duration,
    pub retention: Duration,
    pub shutdown_grace: Duration,
    pub status_prefix: String,
    pub correlation_field: CorrelationField,
    pub document_extensions: Vec<String>,
    pub scan_existing: bool,
}

impl BridgeConfig {
    /// Configuration with defaults for everything but the required values.
    pub fn new(spool_dir: impl Into<PathBuf>, webhook_url: impl Into<String>, fax_number: impl Into<String>) -> Self {
        Self {
            spool_dir: spool_dir.into(),
            webhook_url: webhook_url.into(),
            webhook_user: None,
            webhook_pass: None,
            fax_number: fax_number.into(),
            http_bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            submit_timeout: Duration::from_secs(DEFAULT_SUBMIT_TIMEOUT_SECS),
            retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
            status_prefix: String::new(),
            correlation_field: CorrelationField::default(),
            document_extensions: DEFAULT_DOCUMENT_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            scan_existing: false,
        }
    }
}

impl TryFrom<BridgeArgs> for BridgeConfig {
    type Error = anyhow::Error;

    fn try_from(args: BridgeArgs) -> Result<Self> {
        if args.webhook_url.trim().is_empty() {
            bail!("SEND_WEBHOOK_URL must not be empty");
        }
        if !args.webhook_url.starts_with("http://") && !args.webhook_url.starts_with("https://") {
            bail!("SEND_WEBHOOK_URL must be an http(s) URL: {}", args.webhook_url);
        }
        if args.fax_number.trim().is_empty() {
            bail!("FAX_NUMBER must not be empty");
        }
        if args.poll_ms == 0 {
            bail!("FAXSPOOL_POLL_MS must be greater than zero");
        }
        if args.submit_timeout_secs == 0 {
            bail!("FAXSPOOL_SUBMIT_TIMEOUT_SECS must be greater than zero");
        }
        if args.status_prefix.contains(['/', '\\']) {
            bail!("FAXSPOOL_STATUS_PREFIX must not contain path separators");
        }

        let http_bind: SocketAddr = args
            .http_bind
            .parse()
            .with_context(|| format!("Invalid FAXSPOOL_HTTP_BIND address: {}", args.http_bind))?;

        let document_extensions = normalize_extensions(&args.document_extensions)?;
        let queue_dir = args.queue_dir.trim_matches('/');

        Ok(Self {
            spool_dir: args.ftp_root.join(queue_dir),
            webhook_url: args.webhook_url,
            webhook_user: args.webhook_user.filter(|u| !u.is_empty()),
            webhook_pass: args.webhook_pass,
            fax_number: args.fax_number.trim().to_string(),
            http_bind,
            poll_interval: Duration::from_millis(args.poll_ms),
            submit_timeout: Duration::from_secs(args.submit_timeout_secs),
            retention: Duration::from_secs(args.retention_secs),
            shutdown_grace: Duration::from_secs(args.shutdown_grace_secs),
            status_prefix: args.status_prefix,
            correlation_field: args.correlation_field,
            document_extensions,
            scan_existing: args.scan_existing,
        })
    }
}

fn normalize_extensions(raw: &[String]) -> Result<Vec<String>> {
    let mut extensions: Vec<String> = raw
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect();
    extensions.dedup();
    if extensions.is_empty() {
        bail!("FAXSPOOL_DOCUMENT_EXTENSIONS must name at least one extension");
    }
    if extensions.iter().any(|e| e == DESCRIPTOR_EXTENSION) {
        bail!("'{}' is reserved for descriptors", DESCRIPTOR_EXTENSION);
    }
    Ok(extensions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<BridgeConfig> {
        let mut argv = vec![
            "faxspool-bridge",
            "--ftp-root",
            "/srv/ftp",
            "--webhook-url",
            "https://fax.example.com/send",
            "--fax-number",
            "+15550000000",
        ];
        argv.extend_from_slice(extra);
        BridgeConfig::try_from(BridgeArgs::try_parse_from(argv)?)
    }

    #[test]
    fn defaults_apply() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.spool_dir, PathBuf::from("/srv/ftp/synergyfaxq"));
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.submit_timeout, Duration::from_secs(60));
        assert_eq!(config.retention, Duration::from_secs(3600));
        assert_eq!(config.http_bind.port(), 8080);
        assert_eq!(config.correlation_field, CorrelationField::Uuid);
        assert_eq!(config.document_extensions, vec!["pdf".to_string()]);
        assert!(config.status_prefix.is_empty());
        assert!(!config.scan_existing);
    }

    #[test]
    fn overrides_parse() {
        let config = parse(&[
            "--queue-dir",
            "/faxq/",
            "--status-prefix",
            "Q",
            "--correlation-field",
            "call_uuid",
            "--document-extensions",
            ".PDF,tif",
            "--http-bind",
            "127.0.0.1:9090",
            "--retention-secs",
            "0",
        ])
        .unwrap();
        assert_eq!(config.spool_dir, PathBuf::from("/srv/ftp/faxq"));
        assert_eq!(config.status_prefix, "Q");
        assert_eq!(config.correlation_field, CorrelationField::CallUuid);
        assert_eq!(config.document_extensions, vec!["pdf", "tif"]);
        assert_eq!(config.http_bind, "127.0.0.1:9090".parse().unwrap());
        assert!(config.retention.is_zero());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse(&["--http-bind", "not-an-addr"]).is_err());
        assert!(parse(&["--poll-ms", "0"]).is_err());
        assert!(parse(&["--document-extensions", "sfc"]).is_err());
        assert!(parse(&["--correlation-field", "nope"]).is_err());
        assert!(parse(&["--status-prefix", "a/b"]).is_err());
    }
}
