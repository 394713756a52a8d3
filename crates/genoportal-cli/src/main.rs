//! genoportal: Submission sheet normaliser.
//! Entry point for the command-line binary.

mod config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use genoportal_common::{FileFormat, MemoryRepository, SubmissionType};
use genoportal_ingestion::{run_submission, SubmissionInput, SubmissionJob, SubmissionStatus};

#[derive(Parser, Debug)]
#[command(name = "genoportal")]
#[command(about = "Normalise case and family-history sheets into portal items")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalise and validate a sheet, and optionally commit it to the store.
    Submit(SubmitArgs),
}

#[derive(clap::Args, Debug)]
struct SubmitArgs {
    /// Delimited sheet (CSV or TSV).
    sheet: PathBuf,

    /// Sheet flavour: accessioning or family_history.
    #[arg(long = "type", value_parser = parse_submission_type)]
    submission_type: SubmissionType,

    /// Apply the plan to the store.
    #[arg(long)]
    commit: bool,

    /// Cell delimiter. Inferred from the file extension when omitted.
    #[arg(long, value_enum)]
    delimiter: Option<Delimiter>,

    #[arg(long, env = "GENOPORTAL_PROJECT")]
    project: Option<String>,

    #[arg(long, env = "GENOPORTAL_INSTITUTION")]
    institution: Option<String>,

    /// JSON snapshot store. Overrides `store.path`.
    #[arg(long)]
    store: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Delimiter {
    Tab,
    Comma,
}

impl Delimiter {
    fn infer(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") || ext.eq_ignore_ascii_case("txt") => Delimiter::Tab,
            _ => Delimiter::Comma,
        }
    }

    fn byte(self) -> u8 {
        match self {
            Delimiter::Tab => b'\t',
            Delimiter::Comma => b',',
        }
    }
}

fn parse_submission_type(raw: &str) -> Result<SubmissionType, String> {
    SubmissionType::parse(raw).ok_or_else(|| format!("unknown submission type: {} (accessioning, family_history)", raw))
}

/// Every record as raw cells; ragged rows are kept as they are.
fn read_sheet(path: &Path, delimiter: Delimiter) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter.byte())
        .from_path(path)
        .with_context(|| format!("Failed to open sheet {}", path.display()))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Failed to read sheet {}", path.display()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

/// Open the snapshot store. A new store, or one saved without a file-format
/// registry, gets the standard sequencing catalog.
fn open_store(path: &Path) -> Result<MemoryRepository> {
    let repo = if path.exists() {
        MemoryRepository::load(path).with_context(|| format!("Failed to load store {}", path.display()))?
    } else {
        warn!("Store {} not found, starting empty", path.display());
        MemoryRepository::default()
    };
    Ok(repo.with_default_file_formats(FileFormat::standard_catalog()))
}

async fn submit(args: SubmitArgs, config: &config::Config) -> Result<()> {
    let rules = config.submission_config().context("Failed to load submission rules")?;
    let delimiter = args.delimiter.unwrap_or_else(|| Delimiter::infer(&args.sheet));
    let rows = read_sheet(&args.sheet, delimiter)?;
    info!(rows = rows.len(), sheet = %args.sheet.display(), "Sheet read");

    let store_path = args.store.unwrap_or_else(|| PathBuf::from(&config.store.path));
    let repo = open_store(&store_path)?;

    let job = SubmissionJob {
        input: SubmissionInput {
            project: args.project.unwrap_or_else(|| config.portal.project.clone()),
            institution: args.institution.unwrap_or_else(|| config.portal.institution.clone()),
            submission_type: args.submission_type,
            ingestion_id: Uuid::new_v4().to_string(),
        },
        commit: args.commit,
    };

    let report = run_submission(rows, &job, &rules, &repo).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    for line in &report.messages {
        info!("{}", line);
    }
    for failure in &report.failures {
        warn!("{}", failure);
    }

    match report.status {
        SubmissionStatus::ValidationFailed => {
            anyhow::bail!("Submission has {} error(s); nothing was committed", report.errors.len())
        }
        SubmissionStatus::Validated => {
            info!("Submission is valid. Re-run with --commit to apply it.");
        }
        SubmissionStatus::Committed => {
            repo.save(&store_path)
                .await
                .with_context(|| format!("Failed to save store {}", store_path.display()))?;
            info!(store = %store_path.display(), "Store updated");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("genoportal=debug,info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::Config::load().context("Could not load genoportal.toml")?;
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Submit(args) => submit(args, &config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_delimiter_inferred_from_extension() {
        assert_eq!(Delimiter::infer(Path::new("sheet.tsv")), Delimiter::Tab);
        assert_eq!(Delimiter::infer(Path::new("sheet.CSV")), Delimiter::Comma);
        assert_eq!(Delimiter::infer(Path::new("sheet")), Delimiter::Comma);
    }

    #[test]
    fn test_submit_arguments() {
        let cli = Cli::try_parse_from([
            "genoportal", "submit", "case.tsv", "--type", "family history", "--commit", "--delimiter", "tab",
        ])
        .unwrap();
        let Command::Submit(args) = cli.command;
        assert_eq!(args.submission_type, SubmissionType::FamilyHistory);
        assert!(args.commit);
        assert_eq!(args.delimiter, Some(Delimiter::Tab));
    }

    #[tokio::test]
    async fn test_fresh_store_accepts_sequencing_files() {
        use genoportal_common::Repository;

        let repo = open_store(Path::new("/nonexistent/genoportal-store.json")).unwrap();
        let formats = repo.file_formats().await.unwrap();
        assert!(formats.iter().any(|f| f.is_fastq()));
        assert!(formats.iter().any(|f| f.accepts("bam")));
    }

    #[test]
    fn test_unknown_submission_type_is_rejected() {
        assert!(Cli::try_parse_from(["genoportal", "submit", "a.csv", "--type", "invoice"]).is_err());
    }
}
