use anyhow::{Context, Result, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::{env, path::PathBuf, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub bucket: String,
    pub region: String,
    /// Always ends with `/` unless empty.
    pub prefix: String,
    pub keep: i64,
    pub backup_dir: String,
    pub interval: Duration,
    pub initial_delay: Duration,
    pub grace: Duration,
    pub status_server: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Mirror and prune Hytale server backups")]
pub struct Args {
    /// Status server host (overrides HYTALE_BACKUP_HOST)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Status server port (overrides HYTALE_BACKUP_PORT)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Directory where object payloads are stored (overrides HYTALE_BACKUP_STORAGE_DIR)
    #[arg(long, global = true)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides HYTALE_BACKUP_DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Bucket holding the backups (overrides HYTALE_BACKUP_BUCKET)
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    /// Key prefix under which backups live (overrides HYTALE_BACKUP_PREFIX)
    #[arg(long, global = true)]
    pub prefix: Option<String>,

    /// Number of most recent backups to retain (overrides HYTALE_BACKUP_KEEP)
    #[arg(long, global = true, allow_negative_numbers = true)]
    pub keep: Option<i64>,

    /// Local directory the game server writes backups to (overrides HYTALE_BACKUP_DIR)
    #[arg(long, global = true)]
    pub backup_dir: Option<String>,

    /// Seconds between scheduled runs (overrides HYTALE_BACKUP_INTERVAL_SECS)
    #[arg(long, global = true)]
    pub interval_secs: Option<u64>,

    /// Seconds to wait before the first run (overrides HYTALE_BACKUP_INITIAL_DELAY_SECS)
    #[arg(long, global = true)]
    pub initial_delay_secs: Option<u64>,

    /// Backups touched within this many seconds are never pruned (overrides HYTALE_BACKUP_GRACE_SECS)
    #[arg(long, global = true)]
    pub grace_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the scheduler and status server (default)
    Serve,
    /// Run one mirror-then-prune pass and exit
    RunOnce,
    /// Apply the database schema and exit
    Migrate,
    /// Print the instance user-data script
    RenderUserData(UserDataArgs),
    /// Print the systemd service and timer units
    RenderUnits(UnitArgs),
}

#[derive(ClapArgs, Debug, Clone, PartialEq, Eq)]
pub struct UserDataArgs {
    #[arg(long)]
    pub bootstrap_bucket: String,
    #[arg(long)]
    pub bootstrap_key: String,
    #[arg(long)]
    pub downloader_bucket: String,
    #[arg(long)]
    pub downloader_key: String,
    #[arg(long)]
    pub webhook_secret_arn: Option<String>,
    #[arg(long)]
    pub data_volume_size_gib: Option<u32>,
}

#[derive(ClapArgs, Debug, Clone, PartialEq, Eq)]
pub struct UnitArgs {
    #[arg(long, default_value = "/usr/local/bin/hytale-backup")]
    pub binary_path: PathBuf,
    #[arg(long)]
    pub env_file: Option<PathBuf>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the
    /// selected command.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        let args = Args::parse();
        Self::resolve(args, |name| env::var(name).ok())
    }

    /// Merge `args` over the environment seen through `lookup`, then
    /// defaults.
    pub fn resolve(
        args: Args,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(Self, Command)> {
        let string = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.into());

        let env_port = parse_env(&lookup, "HYTALE_BACKUP_PORT", 8080u16)?;
        let env_keep = parse_env(&lookup, "HYTALE_BACKUP_KEEP", 5i64)?;
        let env_interval = parse_env(&lookup, "HYTALE_BACKUP_INTERVAL_SECS", 30 * 60u64)?;
        let env_delay = parse_env(&lookup, "HYTALE_BACKUP_INITIAL_DELAY_SECS", 120u64)?;
        let env_grace = parse_env(&lookup, "HYTALE_BACKUP_GRACE_SECS", 10 * 60u64)?;
        let status_server = lookup("HYTALE_BACKUP_STATUS_SERVER")
            .map(|raw| parse_bool_flag(&raw, true))
            .unwrap_or(true);

        let interval_secs = args.interval_secs.unwrap_or(env_interval);
        if interval_secs == 0 {
            bail!("backup interval must be at least one second");
        }

        let cfg = Self {
            host: args
                .host
                .unwrap_or_else(|| string("HYTALE_BACKUP_HOST", "127.0.0.1")),
            port: args.port.unwrap_or(env_port),
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| string("HYTALE_BACKUP_STORAGE_DIR", "./data/objects")),
            database_url: args.database_url.unwrap_or_else(|| {
                string(
                    "HYTALE_BACKUP_DATABASE_URL",
                    "sqlite://./data/meta/hytale_backup.db",
                )
            }),
            bucket: args
                .bucket
                .unwrap_or_else(|| string("HYTALE_BACKUP_BUCKET", "hytale-backups")),
            region: string("HYTALE_BACKUP_REGION", "local"),
            prefix: normalize_prefix(
                &args
                    .prefix
                    .unwrap_or_else(|| string("HYTALE_BACKUP_PREFIX", "hytale/backups/")),
            ),
            keep: args.keep.unwrap_or(env_keep),
            backup_dir: args
                .backup_dir
                .unwrap_or_else(|| string("HYTALE_BACKUP_DIR", "/opt/hytale/server/backups")),
            interval: Duration::from_secs(interval_secs),
            initial_delay: Duration::from_secs(args.initial_delay_secs.unwrap_or(env_delay)),
            grace: Duration::from_secs(args.grace_secs.unwrap_or(env_grace)),
            status_server,
        };

        Ok((cfg, args.command.unwrap_or(Command::Serve)))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        None => Ok(default),
    }
}

/// Lenient boolean parsing for environment flags. Unrecognised values fall
/// back to `default` instead of failing startup.
pub fn parse_bool_flag(raw: &str, default: bool) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => true,
        "0" | "false" | "no" | "n" | "off" => false,
        _ => default,
    }
}

/// Strip leading slashes and make sure a non-empty prefix ends with `/`, so
/// that the first segment after it is always a whole path component.
pub fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('/');
    if trimmed.is_empty() || trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn resolve(argv: &[&str], vars: &[(&str, &str)]) -> Result<(AppConfig, Command)> {
        let args = Args::try_parse_from(std::iter::once("hytale-backup").chain(argv.iter().copied()))?;
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::resolve(args, |name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_without_env_or_flags() {
        let (cfg, command) = resolve(&[], &[]).unwrap();

        assert_eq!(command, Command::Serve);
        assert_eq!(cfg.prefix, "hytale/backups/");
        assert_eq!(cfg.keep, 5);
        assert_eq!(cfg.interval, Duration::from_secs(1800));
        assert_eq!(cfg.initial_delay, Duration::from_secs(120));
        assert!(cfg.status_server);
        assert_eq!(cfg.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn flags_override_env() {
        let (cfg, command) = resolve(
            &["run-once", "--keep", "2", "--prefix", "/srv/backups"],
            &[("HYTALE_BACKUP_KEEP", "9"), ("HYTALE_BACKUP_BUCKET", "game-saves")],
        )
        .unwrap();

        assert_eq!(command, Command::RunOnce);
        assert_eq!(cfg.keep, 2);
        assert_eq!(cfg.prefix, "srv/backups/");
        assert_eq!(cfg.bucket, "game-saves");
    }

    #[test]
    fn negative_keep_is_accepted() {
        let (cfg, _) = resolve(&["--keep", "-1"], &[]).unwrap();
        assert_eq!(cfg.keep, -1);
    }

    #[test]
    fn malformed_env_number_is_an_error() {
        let err = resolve(&[], &[("HYTALE_BACKUP_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("HYTALE_BACKUP_PORT"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(resolve(&["--interval-secs", "0"], &[]).is_err());
    }

    #[rstest]
    #[case("yes", false, true)]
    #[case(" ON ", false, true)]
    #[case("0", true, false)]
    #[case("Off", true, false)]
    #[case("maybe", true, true)]
    #[case("", false, false)]
    fn bool_flags_are_lenient(#[case] raw: &str, #[case] default: bool, #[case] expected: bool) {
        assert_eq!(parse_bool_flag(raw, default), expected);
    }

    #[test]
    fn status_server_can_be_disabled_from_env() {
        let (cfg, _) = resolve(&[], &[("HYTALE_BACKUP_STATUS_SERVER", "false")]).unwrap();
        assert!(!cfg.status_server);
    }

    #[rstest]
    #[case("hytale/backups", "hytale/backups/")]
    #[case("hytale/backups/", "hytale/backups/")]
    #[case("/abs/path", "abs/path/")]
    #[case("", "")]
    fn prefixes_are_normalized(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_prefix(raw), expected);
    }
}
