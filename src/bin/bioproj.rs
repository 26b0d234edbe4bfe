//! bioproj - projection of BIO annotations across translations
//!
//! # Usage
//!
//! ```bash
//! # Translate-train: move the gold tags onto the translated sentences
//! bioproj project-tags train.jsonl train.translated.txt train.align out/train.jsonl --complete-source
//!
//! # Translate-test: pair the test records with their translations
//! bioproj prepare-test test.translated.txt test.jsonl test.align out/test.jsonl
//!
//! # Move the logits predicted on the translations back onto the test records
//! bioproj project-logits out/test.jsonl logits/translated.json logits/projected.json
//!
//! # Score the projected logits, ensembled with the logits of a model run on the test records
//! bioproj evaluate masakhaner test.jsonl out/score.txt logits/direct.json --second-logit-path logits/projected.json
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use bioproj::{
    evaluate_files, prepare_translate_test_files, project_logit_files, project_tag_files,
    DivByZeroStrat, EvaluationConfigBuilder, LabelMap, LogitProjectionConfigBuilder, RetryPolicy,
    TagProjectionConfigBuilder,
};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const MASAKHANER_LABELS: &str = include_str!("../../data/labels/masakhaner.json");
const XSID_LABELS: &str = include_str!("../../data/labels/xsid.json");

/// Projection of BIO annotations and model logits across translated sentences
#[derive(Parser)]
#[command(name = "bioproj", author, version, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Project the tags of annotated records onto their translations (translate-train)
    ProjectTags(ProjectTagsArgs),
    /// Pair clean records with their translations and alignments (translate-test)
    PrepareTest(PrepareTestArgs),
    /// Project the logits predicted on translations back onto the clean records
    ProjectLogits(ProjectLogitsArgs),
    /// Ensemble the logits of one or two models and score them
    Evaluate(EvaluateArgs),
}

#[derive(Args)]
struct Columns {
    /// Name of the tokens column
    #[arg(long, default_value = "tokens")]
    text_column: String,
    /// Name of the tags column
    #[arg(long, default_value = "ner_tags")]
    tag_name: String,
}

#[derive(Args)]
struct Completeness {
    /// Every token of a source entity must be aligned
    #[arg(long)]
    complete_source: bool,
    /// The aligned target tokens of an entity must be contiguous
    #[arg(long)]
    complete_target: bool,
}

#[derive(Args)]
struct Retry {
    /// Maximum number of attempts at loading a logit file
    #[arg(long, default_value_t = 30)]
    max_attempts: usize,
    /// Maximum number of seconds slept between two attempts
    #[arg(long, default_value_t = 30)]
    max_sleep: u64,
}

impl From<&Retry> for RetryPolicy {
    fn from(value: &Retry) -> Self {
        RetryPolicy::new(value.max_attempts, Duration::from_secs(value.max_sleep))
    }
}

#[derive(Args)]
struct ProjectTagsArgs {
    /// Annotated records in JSON lines format (usually clean English data)
    source_file: PathBuf,
    /// Translated sentences, one per line
    target_file: PathBuf,
    /// Word alignments from the source to the target, one sentence per line
    alignment_file: PathBuf,
    /// Output file (JSON lines format)
    out_file: PathBuf,
    #[command(flatten)]
    columns: Columns,
    #[command(flatten)]
    completeness: Completeness,
    /// Every source entity type must appear as many times in the projected tags
    #[arg(long)]
    complete_instance: bool,
    /// Process the sentences on multiple threads
    #[arg(long)]
    parallel: bool,
}

#[derive(Args)]
struct PrepareTestArgs {
    /// Translated sentences, one per line (usually English)
    source_file: PathBuf,
    /// Clean target language records in JSON lines format
    target_file: PathBuf,
    /// Word alignments from the translations to the clean records, one sentence per line
    alignment_file: PathBuf,
    /// Output file (JSON lines format)
    out_file: PathBuf,
    #[command(flatten)]
    columns: Columns,
}

#[derive(Args)]
struct ProjectLogitsArgs {
    /// Prepared records of the clean target language data
    target_data_path: PathBuf,
    /// Logits predicted on the translated data
    source_logit_path: PathBuf,
    /// Where to save the projected logits
    target_logit_path: PathBuf,
    /// Column with the input tokens
    #[arg(long, default_value = "tokens")]
    text_column: String,
    /// Column with the clean target language labels
    #[arg(long, default_value = "org_ner_tags")]
    label_column: String,
    /// Column with the alignments from the translation to the clean data
    #[arg(long, default_value = "alignment")]
    alignment_column: String,
    /// Number of tokens the logits were truncated to
    #[arg(long)]
    max_length: Option<usize>,
    #[command(flatten)]
    completeness: Completeness,
    /// Only the first target token of a single-token entity receives its logits
    #[arg(long)]
    restrict_target: bool,
    /// Process the sentences on multiple threads
    #[arg(long)]
    parallel: bool,
    #[command(flatten)]
    retry: Retry,
}

#[derive(Args)]
struct EvaluateArgs {
    /// Task name (`masakhaner`, `xsid`) or path to a JSON label table
    task: String,
    /// Test records in JSON lines format
    dataset_path: PathBuf,
    /// Where to save the F1 score
    out_score_path: PathBuf,
    /// Logits of the first model
    first_logit_path: PathBuf,
    /// Logits of the second model
    #[arg(long)]
    second_logit_path: Option<PathBuf>,
    /// Positions the second model did not predict take the logits of the first model
    #[arg(long, default_value = "true", action = ArgAction::Set, value_parser = parse_bool)]
    replace_second_logits: bool,
    /// Column with the gold labels
    #[arg(long, default_value = "org_ner_tags")]
    label_column: String,
    /// What to do on a division by zero (`replaceby0`, `replaceby1`, `returnerror`)
    #[arg(long, default_value = "replaceby0")]
    zero_division: DivByZeroStrat,
    /// Log the full classification report
    #[arg(long)]
    report: bool,
    #[command(flatten)]
    retry: Retry,
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "yes" | "true" | "t" | "y" | "1" => Ok(true),
        "no" | "false" | "f" | "n" | "0" => Ok(false),
        _ => Err(format!("Boolean value expected, got `{}`", value)),
    }
}

fn label_map(task: &str) -> bioproj::Result<LabelMap> {
    let labels = match task {
        "masakhaner" => LabelMap::from_json_str(MASAKHANER_LABELS)?,
        "xsid" => LabelMap::from_json_str(XSID_LABELS)?,
        path => LabelMap::from_path(Path::new(path))?,
    };
    Ok(labels)
}

fn run(cli: Cli) -> bioproj::Result<()> {
    match cli.command {
        Commands::ProjectTags(args) => {
            let config = TagProjectionConfigBuilder::default()
                .text_column(args.columns.text_column)
                .tag_column(args.columns.tag_name)
                .complete_source(args.completeness.complete_source)
                .complete_target(args.completeness.complete_target)
                .complete_instance(args.complete_instance)
                .parallel(args.parallel)
                .build();
            info!("Projecting tags with\n {}", config);
            project_tag_files(
                &args.source_file,
                &args.target_file,
                &args.alignment_file,
                &args.out_file,
                &config,
            )?;
        }
        Commands::PrepareTest(args) => {
            prepare_translate_test_files(
                &args.source_file,
                &args.target_file,
                &args.alignment_file,
                &args.out_file,
                &args.columns.text_column,
                &args.columns.tag_name,
            )?;
        }
        Commands::ProjectLogits(args) => {
            let config = LogitProjectionConfigBuilder::default()
                .text_column(args.text_column)
                .label_column(args.label_column)
                .alignment_column(args.alignment_column)
                .complete_source(args.completeness.complete_source)
                .complete_target(args.completeness.complete_target)
                .restrict_target(args.restrict_target)
                .max_length(args.max_length)
                .parallel(args.parallel)
                .retry(RetryPolicy::from(&args.retry))
                .build();
            info!("Projecting logits with\n {}", config);
            project_logit_files(
                &args.target_data_path,
                &args.source_logit_path,
                &args.target_logit_path,
                &config,
            )?;
        }
        Commands::Evaluate(args) => {
            let labels = label_map(&args.task)?;
            info!("Label table: {}", labels);
            let config = EvaluationConfigBuilder::default()
                .label_column(args.label_column)
                .replace_second_logits(args.replace_second_logits)
                .division_by_zero(args.zero_division)
                .report(args.report)
                .retry(RetryPolicy::from(&args.retry))
                .build();
            evaluate_files(
                &args.dataset_path,
                &labels,
                &args.out_score_path,
                &args.first_logit_path,
                args.second_logit_path.as_ref(),
                &config,
            )?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
