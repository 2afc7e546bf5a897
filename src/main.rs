//! `fieldsurvey` - validate and score survey submissions from the command line.
//!
//! Reports are printed to stdout as JSON; logs go to stderr.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use fieldsurvey::{ConfigLoadError, SurveyConfig, init_tracing};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use validate::{
    CatalogError, QuestionCatalog, SubmissionPayload, SubmissionValidator, ValidationMode,
    ValidationReport, completion_percentage, parse_date,
};

#[derive(Parser)]
#[command(name = "fieldsurvey", version, about = "Field survey submission tooling")]
struct Cli {
    /// YAML configuration file; defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate one payload, or a JSON array of payloads, against a questionnaire
    Validate {
        /// Questionnaire definition (JSON)
        #[arg(long)]
        catalog: PathBuf,
        /// Submission payload (JSON object or array)
        #[arg(long)]
        payload: PathBuf,
        /// Validate in draft mode regardless of the payload's own flag
        #[arg(long)]
        draft: bool,
        /// Validation date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        as_of: Option<String>,
    },

    /// Print the completion percentage of a payload
    Score {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long)]
        payload: PathBuf,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid questionnaire {}: {source}", path.display())]
    Catalog { path: PathBuf, source: CatalogError },

    #[error("invalid payload {}: {source}", path.display())]
    Payload {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigLoadError),

    #[error("--as-of '{0}' is not a recognized date")]
    AsOf(String),

    #[error("failed to write report: {0}")]
    Output(#[from] serde_json::Error),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PayloadInput {
    One(Box<SubmissionPayload>),
    Many(Vec<SubmissionPayload>),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}

/// Returns whether every validated payload was valid.
fn run(cli: Cli) -> Result<bool, CliError> {
    let config = match &cli.config {
        Some(path) => SurveyConfig::from_file(path)?,
        None => SurveyConfig::default(),
    };
    if let Err(err) = init_tracing(&config.logging) {
        eprintln!("warning: logging disabled: {err}");
    }

    match cli.command {
        Commands::Validate {
            catalog,
            payload,
            draft,
            as_of,
        } => {
            let catalog = load_catalog(&catalog)?;
            let input = load_payload(&payload)?;
            let as_of = match as_of {
                Some(raw) => parse_date(&raw).ok_or(CliError::AsOf(raw))?,
                None => Utc::now().date_naive(),
            };
            validate_input(&config, &catalog, input, draft, as_of)
        }
        Commands::Score { catalog, payload } => {
            let catalog = load_catalog(&catalog)?;
            let payloads = match load_payload(&payload)? {
                PayloadInput::One(one) => vec![*one],
                PayloadInput::Many(many) => many,
            };
            for payload in &payloads {
                println!("{}", completion_percentage(&payload.answers, &catalog));
            }
            Ok(true)
        }
    }
}

fn validate_input(
    config: &SurveyConfig,
    catalog: &QuestionCatalog,
    input: PayloadInput,
    force_draft: bool,
    as_of: NaiveDate,
) -> Result<bool, CliError> {
    let validator = SubmissionValidator::new(config.validation.clone());
    let mode_for = |payload: &SubmissionPayload| {
        if force_draft {
            ValidationMode::Draft
        } else {
            payload.mode()
        }
    };

    let reports: Vec<ValidationReport> = match input {
        PayloadInput::One(payload) => {
            let payload = *payload;
            let report = validator.validate(&payload, catalog, mode_for(&payload), as_of);
            println!("{}", serde_json::to_string_pretty(&report)?);
            vec![report]
        }
        PayloadInput::Many(mut payloads) => {
            if force_draft {
                payloads.iter_mut().for_each(|payload| payload.is_draft = true);
            }
            let reports = validator.validate_batch(&payloads, catalog, as_of);
            println!("{}", serde_json::to_string_pretty(&reports)?);
            reports
        }
    };

    let invalid = reports.iter().filter(|report| !report.is_valid).count();
    if invalid > 0 {
        warn!(total = reports.len(), invalid, "validation_failed");
    } else {
        info!(total = reports.len(), "validation_passed");
    }
    Ok(invalid == 0)
}

fn load_catalog(path: &Path) -> Result<QuestionCatalog, CliError> {
    let raw = read(path)?;
    QuestionCatalog::from_json(&raw).map_err(|source| CliError::Catalog {
        path: path.to_path_buf(),
        source,
    })
}

fn load_payload(path: &Path) -> Result<PayloadInput, CliError> {
    let raw = read(path)?;
    serde_json::from_str(&raw).map_err(|source| CliError::Payload {
        path: path.to_path_buf(),
        source,
    })
}

fn read(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}
