//! knimin-md - metadata pulldown command line
//!
//! Pulls down formatted survey metadata for barcodes, explains barcodes
//! without metadata, and maintains the geocode and external survey data
//! the pulldown depends on.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use regex::Regex;
use sqlx::SqlitePool;
use tracing::info;

use knimin_common::config::{resolve_root_folder, TomlConfig, ROOT_FOLDER_ENV};
use knimin_md::db::surveys::{self, ExternalSurveyLoad};
use knimin_md::services::classifier;
use knimin_md::services::geocode_cache::GeocodeCache;
use knimin_md::services::geocoder::{Geocoder, GoogleGeocoder};
use knimin_md::services::survey_client::RedcapClient;
use knimin_md::{Pulldown, PulldownOptions};

/// Command-line arguments for knimin-md
#[derive(Parser, Debug)]
#[command(name = "knimin-md")]
#[command(about = "Metadata pulldown for American Gut sample barcodes")]
#[command(version)]
struct Args {
    /// Root folder holding the database
    #[arg(short, long)]
    root_folder: Option<String>,

    /// Explicit TOML config file (default: platform config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pull down formatted metadata for barcodes
    Pulldown {
        /// Barcodes to pull down
        barcodes: Vec<String>,

        /// File with one barcode per line
        #[arg(long, value_name = "FILE")]
        barcodes_file: Option<PathBuf>,

        /// Blank control name added to the Human table (repeatable)
        #[arg(long = "blank", value_name = "NAME")]
        blanks: Vec<String>,

        /// External survey joined onto Human rows (repeatable)
        #[arg(long = "external", value_name = "SURVEY")]
        external: Vec<String>,

        /// Keep identifying columns and full coordinate precision
        #[arg(long)]
        full: bool,

        /// Directory receiving one file per survey type plus failures.txt
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Report which barcodes have consent and why the others do not
    CheckConsent {
        barcodes: Vec<String>,

        #[arg(long, value_name = "FILE")]
        barcodes_file: Option<PathBuf>,
    },

    /// Geocode participant logins that have not been attempted yet
    GeocodeBackfill {
        /// Maximum number of logins to attempt
        #[arg(long)]
        limit: Option<usize>,

        /// Retry logins that previously failed
        #[arg(long)]
        retry: bool,
    },

    /// Show login geocoding coverage
    GeocodeStats,

    /// Manage third-party surveys
    #[command(subcommand)]
    ExternalSurvey(ExternalSurveyCommand),
}

#[derive(Subcommand, Debug)]
enum ExternalSurveyCommand {
    /// Register a new external survey
    Add {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        url: String,
    },

    /// List registered external surveys
    List,

    /// Load a delimited file of external survey answers
    Load {
        name: String,
        file: PathBuf,

        /// Field separator character
        #[arg(long, default_value = "\t")]
        separator: char,

        /// Header of the column holding survey ids
        #[arg(long, default_value = "survey_id")]
        survey_id_col: String,

        /// Regex removed from every survey id
        #[arg(long)]
        trim: Option<String>,

        /// Pulldown date, `YYYY-MM-DD HH:MM:SS` (default now)
        #[arg(long)]
        pulldown_date: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = match &args.config {
        Some(path) => TomlConfig::load(path)?,
        None => TomlConfig::load_default()?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&toml_config.logging.level)),
        )
        .init();

    let root_folder =
        resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, &toml_config);
    let db_path = toml_config.database_path(&root_folder);
    info!("Database: {}", db_path.display());

    let db = knimin_md::db::init_database(&db_path)
        .await
        .context("Failed to open lookup store")?;

    match args.command {
        Command::Pulldown {
            barcodes,
            barcodes_file,
            blanks,
            external,
            full,
            output_dir,
        } => {
            let barcodes = collect_barcodes(barcodes, barcodes_file.as_deref())?;
            let pulldown = build_pulldown(db, &toml_config)?;
            let options = PulldownOptions {
                blanks: (!blanks.is_empty()).then_some(blanks.as_slice()),
                external: (!external.is_empty()).then_some(external.as_slice()),
                full,
            };
            let result = pulldown.pulldown(&barcodes, options).await?;

            std::fs::create_dir_all(&output_dir)?;
            for (survey_type, tsv) in &result.tables {
                let path = output_dir.join(format!("{}.txt", survey_type));
                std::fs::write(&path, tsv)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("{}: {}", survey_type, path.display());
            }
            let failures: String = result
                .failures
                .iter()
                .map(|(barcode, reason)| format!("{}\t{}\n", barcode, reason))
                .collect();
            let path = output_dir.join("failures.txt");
            std::fs::write(&path, failures)?;
            println!("Failures ({}): {}", result.failures.len(), path.display());
        }

        Command::CheckConsent {
            barcodes,
            barcodes_file,
        } => {
            let barcodes = collect_barcodes(barcodes, barcodes_file.as_deref())?;
            let (consented, failures) = classifier::check_consent(&db, &barcodes).await?;
            for barcode in consented {
                println!("{}\tConsented", barcode);
            }
            for (barcode, reason) in failures {
                println!("{}\t{}", barcode, reason);
            }
        }

        Command::GeocodeBackfill { limit, retry } => {
            let cache = GeocodeCache::new(db, build_geocoder(&toml_config)?);
            let summary = cache.backfill(limit, retry).await?;
            println!(
                "Attempted {}, geocoded {}, failed {}{}",
                summary.attempted,
                summary.geocoded,
                summary.failed,
                if summary.halted_on_rate_limit {
                    " (stopped: geocoder quota exhausted)"
                } else {
                    ""
                }
            );
        }

        Command::GeocodeStats => {
            for (label, count) in knimin_md::db::logins::geocode_stats(&db).await? {
                println!("{}\t{}", label, count);
            }
        }

        Command::ExternalSurvey(command) => run_external_survey(&db, command).await?,
    }

    Ok(())
}

async fn run_external_survey(db: &SqlitePool, command: ExternalSurveyCommand) -> Result<()> {
    match command {
        ExternalSurveyCommand::Add {
            name,
            description,
            url,
        } => {
            let id = surveys::add_external_survey(db, &name, &description, &url).await?;
            println!("Added external survey {} (id {})", name, id);
        }
        ExternalSurveyCommand::List => {
            for name in surveys::list_external_surveys(db).await? {
                println!("{}", name);
            }
        }
        ExternalSurveyCommand::Load {
            name,
            file,
            separator,
            survey_id_col,
            trim,
            pulldown_date,
        } => {
            let separator = u8::try_from(separator)
                .context("Separator must be a single-byte character")?;
            let trim = trim
                .map(|pattern| Regex::new(&pattern))
                .transpose()
                .context("Invalid trim pattern")?;
            let pulldown_date = pulldown_date
                .map(|d| NaiveDateTime::parse_from_str(&d, "%Y-%m-%d %H:%M:%S"))
                .transpose()
                .context("Invalid pulldown date")?;

            let load = ExternalSurveyLoad {
                survey: &name,
                pulldown_date,
                separator,
                survey_id_col: &survey_id_col,
                trim: trim.as_ref(),
            };
            let reader = std::fs::File::open(&file)
                .with_context(|| format!("Failed to open {}", file.display()))?;
            let inserted = surveys::store_external_survey(db, reader, &load).await?;
            println!("Stored {} answer rows for {}", inserted, name);
        }
    }
    Ok(())
}

fn collect_barcodes(mut barcodes: Vec<String>, file: Option<&Path>) -> Result<Vec<String>> {
    if let Some(file) = file {
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        barcodes.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
        );
    }
    if barcodes.is_empty() {
        anyhow::bail!("No barcodes given");
    }
    Ok(barcodes)
}

fn build_geocoder(toml_config: &TomlConfig) -> Result<Arc<dyn Geocoder>> {
    let api_key = knimin_md::config::resolve_geocoder_api_key(toml_config)?;
    let geocoder = match &toml_config.geocoder.base_url {
        Some(base_url) => GoogleGeocoder::with_base_url(api_key, base_url.clone())?,
        None => GoogleGeocoder::new(api_key)?,
    };
    Ok(Arc::new(geocoder))
}

fn build_pulldown(db: SqlitePool, toml_config: &TomlConfig) -> Result<Pulldown> {
    let redcap = knimin_md::config::resolve_redcap(toml_config)?;
    let exporter = Arc::new(RedcapClient::new(redcap.url, redcap.api_key)?);
    let geocache = GeocodeCache::new(db.clone(), build_geocoder(toml_config)?);
    Ok(Pulldown::new(
        db,
        exporter,
        geocache,
        toml_config.pulldown.batch_size,
    ))
}
