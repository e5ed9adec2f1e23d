use std::fmt;

use services::{AppServices, Clock};
use therapy_core::model::UserId;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use crate::config::AppConfig;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidUserId { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
    ConflictingReport,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidUserId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::ConflictingReport => write!(f, "--client and --doctor are exclusive"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- migrate [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- seed    [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- report  [--db <sqlite_url>] [--client <id> | --doctor <id>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://therapy.sqlite3");
    eprintln!("  report without --client/--doctor prints the admin dashboard");
    eprintln!();
    eprintln!("Configuration:");
    eprintln!("  therapy.toml, then THERAPY_DATABASE_URL, THERAPY_LOG_FILTER,");
    eprintln!("  THERAPY_PASSING_SCORE, THERAPY_MEETING_BASE_URL, THERAPY_SEED_CATALOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Migrate,
    Seed,
    Report,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "migrate" => Some(Self::Migrate),
            "seed" => Some(Self::Seed),
            "report" => Some(Self::Report),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportTarget {
    Admin,
    Client(UserId),
    Doctor(UserId),
}

#[derive(Debug)]
struct Args {
    db_url: Option<String>,
    report: ReportTarget,
}

impl Args {
    fn parse(
        command: Command,
        args: &mut impl Iterator<Item = String>,
    ) -> Result<Self, ArgsError> {
        let mut db_url = None;
        let mut report = ReportTarget::Admin;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = Some(normalize_sqlite_url(value));
                }
                flag @ ("--client" | "--doctor") if command == Command::Report => {
                    let flag = if flag == "--client" { "--client" } else { "--doctor" };
                    let value = require_value(args, flag)?;
                    let id = value
                        .parse::<UserId>()
                        .map_err(|_| ArgsError::InvalidUserId { flag, raw: value })?;
                    report = match (report, flag) {
                        (ReportTarget::Admin, "--client") => ReportTarget::Client(id),
                        (ReportTarget::Admin, _) => ReportTarget::Doctor(id),
                        _ => return Err(ArgsError::ConflictingReport),
                    };
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self { db_url, report })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn init_tracing(filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let cmd = match argv.next().as_deref() {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let parsed = Args::parse(cmd, &mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let config = AppConfig::load()?;
    init_tracing(&config.log_filter);

    let db_url = parsed
        .db_url
        .unwrap_or_else(|| normalize_sqlite_url(config.database_url.clone()));
    let settings = config.service_settings()?;

    // Opening the storage runs pending migrations.
    prepare_sqlite_file(&db_url)?;
    let app = AppServices::new_sqlite(&db_url, Clock::default(), settings).await?;

    match cmd {
        Command::Migrate => {
            info!(db_url = %db_url, "database is up to date");
        }
        Command::Seed => {
            if config.seed_catalog {
                let added = app.certifications().seed_default_catalog().await?;
                info!(added, "certification catalog seeded");
            } else {
                info!("catalog seeding disabled by configuration");
            }
        }
        Command::Report => {
            let dashboards = app.dashboards();
            let json = match parsed.report {
                ReportTarget::Admin => serde_json::to_string_pretty(&dashboards.admin().await?)?,
                ReportTarget::Client(id) => {
                    serde_json::to_string_pretty(&dashboards.client(id).await?)?
                }
                ReportTarget::Doctor(id) => {
                    serde_json::to_string_pretty(&dashboards.doctor(id).await?)?
                }
            };
            println!("{json}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(command: Command, args: &[&str]) -> Result<Args, ArgsError> {
        let mut iter = args.iter().map(|s| (*s).to_string());
        Args::parse(command, &mut iter)
    }

    #[test]
    fn report_targets_one_role() {
        let args = parse(Command::Report, &["--client", "12"]).unwrap();
        assert_eq!(args.report, ReportTarget::Client(UserId::new(12)));

        let err = parse(Command::Report, &["--client", "1", "--doctor", "2"]).unwrap_err();
        assert!(matches!(err, ArgsError::ConflictingReport));

        let err = parse(Command::Seed, &["--client", "1"]).unwrap_err();
        assert!(matches!(err, ArgsError::UnknownArg(_)));
    }

    #[test]
    fn db_flag_is_normalized() {
        let args = parse(Command::Migrate, &["--db", "sqlite::memory:"]).unwrap();
        assert_eq!(args.db_url.as_deref(), Some("sqlite::memory:"));

        let args = parse(Command::Migrate, &["--db", "/tmp/t.sqlite3"]).unwrap();
        assert_eq!(args.db_url.as_deref(), Some("sqlite:///tmp/t.sqlite3"));

        assert!(matches!(
            parse(Command::Migrate, &["--db"]),
            Err(ArgsError::MissingValue { flag: "--db" })
        ));
    }
}
