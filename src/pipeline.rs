/*!
The four steps of a translate-train / translate-test experiment:

1. [`project_tag_records`]: moves the gold tags of annotated records onto their translations.
2. [`prepare_translate_test`]: pairs clean records with their translations and alignments.
3. [`project_logit_records`]: moves the logits predicted on the translations back onto the clean
   records.
4. [`evaluate`]: ensembles one or two sets of logits and scores them against the gold tags.

Each step has a `*_files` counterpart reading its inputs from, and writing its outputs to, disk.
*/
use crate::alignment::{parse_alignment_line, AlignmentIndex, AlignmentPair, Direction};
use crate::config::{EvaluationConfig, LogitProjectionConfig, TagProjectionConfig};
use crate::ensemble::{ensemble, FIRST_MODEL, SECOND_MODEL};
use crate::entity::{segment, TagId, OUTSIDE};
use crate::error::{Error, InconsistentLengthError, RecordError, Result};
use crate::io::{
    load_jsonl, load_logits_with_retry, load_text_lines, save_jsonl, save_logits,
    save_text_lines, Record,
};
use crate::labels::LabelMap;
use crate::logits::SentenceLogits;
use crate::metrics::classification_report;
use crate::projection::SentenceProjection;
use crate::reporter::{OverallAverage, Reporter};
use crate::synthesis::{project_logits, project_tags};
use crate::validation::{check_reconstruction, validate_instance};
use rayon::prelude::*;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;
use tracing::{error, info};

fn field<'a>(record: &'a Record, column: &str) -> std::result::Result<&'a Value, RecordError> {
    record
        .get(column)
        .ok_or_else(|| RecordError::MissingField(column.to_string()))
}

fn array<'a>(
    record: &'a Record,
    column: &str,
    expected: &'static str,
) -> std::result::Result<&'a Vec<Value>, RecordError> {
    field(record, column)?
        .as_array()
        .ok_or_else(|| RecordError::WrongType {
            column: column.to_string(),
            expected,
        })
}

/// Tokens of `column`.
pub fn record_tokens(record: &Record, column: &str) -> std::result::Result<Vec<String>, RecordError> {
    const EXPECTED: &str = "an array of strings";
    array(record, column, EXPECTED)?
        .iter()
        .map(|v| {
            v.as_str().map(String::from).ok_or_else(|| RecordError::WrongType {
                column: column.to_string(),
                expected: EXPECTED,
            })
        })
        .collect()
}

/// Integer tags of `column`.
pub fn record_tags(record: &Record, column: &str) -> std::result::Result<Vec<TagId>, RecordError> {
    const EXPECTED: &str = "an array of non-negative integer tags";
    array(record, column, EXPECTED)?
        .iter()
        .map(|v| {
            v.as_u64()
                .and_then(|t| TagId::try_from(t).ok())
                .ok_or_else(|| RecordError::WrongType {
                    column: column.to_string(),
                    expected: EXPECTED,
                })
        })
        .collect()
}

/// Alignment pairs of `column`, stored as `[[source, target], ...]`.
pub fn record_alignment(
    record: &Record,
    column: &str,
) -> std::result::Result<Vec<AlignmentPair>, RecordError> {
    const EXPECTED: &str = "an array of [source, target] pairs";
    let wrong_type = || RecordError::WrongType {
        column: column.to_string(),
        expected: EXPECTED,
    };
    array(record, column, EXPECTED)?
        .iter()
        .map(|pair| match pair.as_array().map(Vec::as_slice) {
            Some([s, t]) => match (s.as_u64(), t.as_u64()) {
                (Some(s), Some(t)) => Ok((s as usize, t as usize)),
                _ => Err(wrong_type()),
            },
            _ => Err(wrong_type()),
        })
        .collect()
}

fn tags_value(tags: &[TagId]) -> Value {
    Value::from(tags.to_vec())
}

fn tokens_value(tokens: &[&str]) -> Value {
    Value::from(tokens.to_vec())
}

/// Counts of a tag projection run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProjectionSummary {
    pub total: usize,
    pub corrupted: usize,
    /// Share of the sentences that made it to the output, in `[0, 1]`.
    pub recovery_rate: f64,
    /// Positions, in the input, of the dropped sentences.
    pub corrupted_indices: Vec<usize>,
}

impl ProjectionSummary {
    pub fn new(total: usize, corrupted_indices: Vec<usize>) -> Self {
        let corrupted = corrupted_indices.len();
        let recovery_rate = if total == 0 {
            1.0
        } else {
            (total - corrupted) as f64 / total as f64
        };
        Self {
            total,
            corrupted,
            recovery_rate,
            corrupted_indices,
        }
    }

    fn log(&self) {
        info!("Processing complete:");
        info!("  Total items: {}", self.total);
        info!("  Corrupted items: {}", self.corrupted);
        info!("  Recovery rate: {:.2}%", self.recovery_rate * 100.0);
    }
}

impl Display for ProjectionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Total items: {}, Corrupted items: {}, Recovery rate: {:.2}%",
            self.total,
            self.corrupted,
            self.recovery_rate * 100.0
        )
    }
}

/// Records whose tags were projected, and what happened to the others.
#[derive(Debug, Clone, PartialEq)]
pub struct TagProjectionOutput {
    pub records: Vec<Record>,
    pub summary: ProjectionSummary,
}

/// `None` when the sentence is corrupted by the completeness policy.
fn project_tag_record(
    record: &Record,
    target_line: &str,
    alignment_line: &str,
    config: &TagProjectionConfig,
) -> Result<Option<Record>> {
    let source_tokens = field(record, &config.text_column)?;
    let source_tags = record_tags(record, &config.tag_column)?;
    InconsistentLengthError::check(
        "source tokens",
        array(record, &config.text_column, "an array of tokens")?.len(),
        "source tags",
        source_tags.len(),
    )?;
    let target_tokens: Vec<&str> = target_line.split_whitespace().collect();
    let pairs = parse_alignment_line(alignment_line)?;
    let index = AlignmentIndex::build(&pairs, Direction::Forward);

    let target_tags = match project_tags(&source_tags, &index, config.policy, target_tokens.len())?
    {
        SentenceProjection::Projected { output, .. } => output,
        SentenceProjection::Corrupted(_) => return Ok(None),
    };
    if config.complete_instance && !validate_instance(&segment(&source_tags).types(), &target_tags)
    {
        return Ok(None);
    }

    let mut output = record.clone();
    output.insert(format!("org_{}", config.text_column), source_tokens.clone());
    output.insert(config.text_column.clone(), tokens_value(&target_tokens));
    output.insert(format!("org_{}", config.tag_column), tags_value(&source_tags));
    output.insert(config.tag_column.clone(), tags_value(&target_tags));
    Ok(Some(output))
}

/// Projects the tags of every source record onto the matching translated line. The three inputs
/// are parallel: sentence `i` of each belongs together.
///
/// A sentence is dropped, and counted as corrupted, when one of its entities breaks the
/// completeness policy, when its projected tags fail the instance check, or when it cannot be
/// processed at all (malformed alignment, missing column, alignment pointing past the end of the
/// translation). The last case is logged with the index of the sentence.
pub fn project_tag_records<S: AsRef<str> + Sync>(
    sources: &[Record],
    targets: &[S],
    alignments: &[S],
    config: &TagProjectionConfig,
) -> Result<TagProjectionOutput> {
    InconsistentLengthError::check("source records", sources.len(), "target lines", targets.len())?;
    InconsistentLengthError::check(
        "source records",
        sources.len(),
        "alignment lines",
        alignments.len(),
    )?;
    let process = |i: usize| {
        project_tag_record(
            &sources[i],
            targets[i].as_ref(),
            alignments[i].as_ref(),
            config,
        )
    };
    let outcomes: Vec<Result<Option<Record>>> = if config.parallel {
        (0..sources.len()).into_par_iter().map(process).collect()
    } else {
        (0..sources.len()).map(process).collect()
    };

    let mut records = Vec::with_capacity(sources.len());
    let mut corrupted_indices = Vec::new();
    for (i, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(Some(record)) => records.push(record),
            Ok(None) => corrupted_indices.push(i),
            Err(e) => {
                error!("Error processing item {}: {}", i, e);
                corrupted_indices.push(i);
            }
        }
    }
    let summary = ProjectionSummary::new(sources.len(), corrupted_indices);
    summary.log();
    Ok(TagProjectionOutput { records, summary })
}

/// Reads the inputs of [`project_tag_records`] and writes the projected records to `out_path`.
pub fn project_tag_files<P: AsRef<Path>>(
    source_path: P,
    target_path: P,
    alignment_path: P,
    out_path: P,
    config: &TagProjectionConfig,
) -> Result<ProjectionSummary> {
    info!("Loading data files...");
    let sources = load_jsonl(source_path)?;
    let targets = load_text_lines(target_path)?;
    let alignments = load_text_lines(alignment_path)?;
    let output = project_tag_records(&sources, &targets, &alignments, config)?;
    info!("Saving results to {}", out_path.as_ref().display());
    save_jsonl(out_path, &output.records)?;
    Ok(output.summary)
}

fn prepare_record(
    source_line: &str,
    record: &Record,
    alignment_line: &str,
    text_column: &str,
    tag_column: &str,
) -> Result<Record> {
    let target_tokens = field(record, text_column)?;
    let target_tags = field(record, tag_column)?;
    let source_tokens: Vec<&str> = source_line.split_whitespace().collect();
    let pairs = parse_alignment_line(alignment_line)?;

    let mut output = record.clone();
    let pairs: Vec<Value> = pairs.iter().map(|&(s, t)| Value::from(vec![s, t])).collect();
    output.insert(String::from("alignment"), Value::from(pairs));
    output.insert(format!("org_{}", text_column), target_tokens.clone());
    output.insert(text_column.to_string(), tokens_value(&source_tokens));
    output.insert(format!("org_{}", tag_column), target_tags.clone());
    output.insert(
        tag_column.to_string(),
        Value::from(vec![OUTSIDE; source_tokens.len()]),
    );
    Ok(output)
}

/// Pairs every clean target record with its translation (`source_lines`) and the alignment from
/// the translation to the record. The translation becomes the text of the record, with dummy
/// all-`O` tags; the clean tokens and tags move to the `org_` columns. Any malformed sentence
/// aborts the run.
pub fn prepare_translate_test<S: AsRef<str>>(
    source_lines: &[S],
    targets: &[Record],
    alignments: &[S],
    text_column: &str,
    tag_column: &str,
) -> Result<Vec<Record>> {
    InconsistentLengthError::check(
        "source lines",
        source_lines.len(),
        "target records",
        targets.len(),
    )?;
    InconsistentLengthError::check(
        "source lines",
        source_lines.len(),
        "alignment lines",
        alignments.len(),
    )?;
    let records = source_lines
        .iter()
        .zip(targets.iter())
        .zip(alignments.iter())
        .enumerate()
        .map(|(i, ((source, record), alignment))| {
            prepare_record(
                source.as_ref(),
                record,
                alignment.as_ref(),
                text_column,
                tag_column,
            )
            .inspect_err(|e| error!("Error processing item {}: {}", i, e))
        })
        .collect::<Result<Vec<_>>>()?;
    info!("Processing complete:");
    info!("  Total items: {}", records.len());
    Ok(records)
}

/// Reads the inputs of [`prepare_translate_test`] and writes the prepared records to `out_path`.
pub fn prepare_translate_test_files<P: AsRef<Path>>(
    source_path: P,
    target_path: P,
    alignment_path: P,
    out_path: P,
    text_column: &str,
    tag_column: &str,
) -> Result<usize> {
    info!("Loading data files...");
    let sources = load_text_lines(source_path)?;
    let targets = load_jsonl(target_path)?;
    let alignments = load_text_lines(alignment_path)?;
    let records = prepare_translate_test(&sources, &targets, &alignments, text_column, tag_column)?;
    info!("Saving results to {}", out_path.as_ref().display());
    save_jsonl(out_path, &records)?;
    Ok(records.len())
}

/// Projected logits of every record, and the number of entities they predict.
#[derive(Debug, Clone, PartialEq)]
pub struct LogitProjectionOutput {
    pub logits: Vec<SentenceLogits>,
    pub total_entities: usize,
}

fn project_logit_record(
    record: &Record,
    source: &SentenceLogits,
    config: &LogitProjectionConfig,
) -> Result<SentenceLogits> {
    let tokens = array(record, &config.text_column, "an array of tokens")?;
    let expected_length = config
        .max_length
        .map_or(tokens.len(), |max| tokens.len().min(max));
    InconsistentLengthError::check("logit rows", source.len(), "tokens", expected_length)?;
    let len = array(record, &config.label_column, "an array of labels")?.len();
    let pairs = record_alignment(record, &config.alignment_column)?;
    let index = AlignmentIndex::build(&pairs, Direction::Forward);

    let predictions = source.predictions();
    check_reconstruction(&predictions, &segment(&predictions));

    let projected = match project_logits(source, &index, config.policy, config.restrict_target, len)? {
        SentenceProjection::Projected { output, .. } => output,
        SentenceProjection::Corrupted(_) => SentenceLogits::unfilled(len, source.num_labels()),
    };
    InconsistentLengthError::check("projected rows", projected.len(), "labels", len)?;
    Ok(projected)
}

/// Projects the logits predicted on the translation of every record back onto the record.
///
/// Every record carries its alignment from the translation (its text column) to the clean
/// sentence, whose labels give the number of projected vectors. Positions no entity reaches are
/// left unfilled. Every failure aborts the run.
pub fn project_logit_records(
    records: &[Record],
    source_logits: &[SentenceLogits],
    config: &LogitProjectionConfig,
) -> Result<LogitProjectionOutput> {
    InconsistentLengthError::check(
        "records",
        records.len(),
        "logit sentences",
        source_logits.len(),
    )?;
    let process = |(record, source): (&Record, &SentenceLogits)| {
        project_logit_record(record, source, config)
    };
    let logits: Vec<SentenceLogits> = if config.parallel {
        records
            .par_iter()
            .zip(source_logits.par_iter())
            .map(process)
            .collect::<Result<_>>()?
    } else {
        records
            .iter()
            .zip(source_logits.iter())
            .map(process)
            .collect::<Result<_>>()?
    };
    let total_entities = logits
        .iter()
        .map(|sentence| segment(&sentence.predictions()).len())
        .sum();
    info!("Projected {} entities total", total_entities);
    Ok(LogitProjectionOutput {
        logits,
        total_entities,
    })
}

/// Reads the inputs of [`project_logit_records`], waiting for the logit artifact if needed, and
/// writes the projected artifact to `out_path`.
pub fn project_logit_files<P: AsRef<Path>>(
    data_path: P,
    source_logit_path: P,
    out_path: P,
    config: &LogitProjectionConfig,
) -> Result<LogitProjectionOutput> {
    info!("Loading dataset from {}", data_path.as_ref().display());
    let records = load_jsonl(data_path)?;
    let source_logits = load_logits_with_retry(source_logit_path, &config.retry)?;
    let output = project_logit_records(&records, &source_logits, config)?;
    info!("Saving projected logits to {}", out_path.as_ref().display());
    save_logits(out_path, &output.logits)?;
    info!("Projection complete");
    Ok(output)
}

/// Score of an ensemble of models.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Overall micro F1 as a percentage, rounded to 2 decimals.
    pub f1: f64,
    pub report: Reporter,
}

/// Rounds a score in `[0, 1]` to a percentage with 2 decimals.
pub fn percentage(score: f32) -> f64 {
    (f64::from(score) * 10_000.0).round() / 100.0
}

/// Ensembles the logits of every model and scores the predictions against the gold tags of
/// `records`. Models are keyed by id; model [`FIRST_MODEL`] is required.
pub fn evaluate(
    records: &[Record],
    models: &BTreeMap<usize, Vec<SentenceLogits>>,
    labels: &LabelMap,
    config: &EvaluationConfig,
) -> Result<Evaluation> {
    let predictions = ensemble(models, config.replace_second_logits)?;
    let y_pred = predictions
        .iter()
        .map(|tags| labels.decode(tags))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let y_true = records
        .iter()
        .map(|record| {
            let tags = record_tags(record, &config.label_column)?;
            labels.decode(&tags).map_err(Error::from)
        })
        .collect::<Result<Vec<_>>>()?;
    InconsistentLengthError::check("predictions", y_pred.len(), "labels", y_true.len())?;

    let report = classification_report(&y_true, &y_pred, config.zero_division, false)?;
    let micro = report
        .overall(OverallAverage::Micro)
        .map_or(0.0, |metrics| metrics.fscore);
    let f1 = percentage(micro);
    info!("F1 Score: {}%", f1);
    if config.report {
        info!("Classification report:\n{}", report);
    }
    Ok(Evaluation { f1, report })
}

/// Reads the inputs of [`evaluate`], waiting for the logit artifacts if needed, and writes the F1
/// score to `out_score_path`.
pub fn evaluate_files<P: AsRef<Path>>(
    data_path: P,
    labels: &LabelMap,
    out_score_path: P,
    first_logit_path: P,
    second_logit_path: Option<P>,
    config: &EvaluationConfig,
) -> Result<Evaluation> {
    let records = load_jsonl(data_path)?;
    let mut models = BTreeMap::new();
    models.insert(
        FIRST_MODEL,
        load_logits_with_retry(first_logit_path, &config.retry)?,
    );
    if let Some(path) = second_logit_path {
        models.insert(SECOND_MODEL, load_logits_with_retry(path, &config.retry)?);
    }
    let evaluation = evaluate(&records, &models, labels, config)?;
    save_text_lines(&out_score_path, &[format!("{:.2}", evaluation.f1)])?;
    info!(
        "Evaluation complete. Results saved to {}",
        out_score_path.as_ref().display()
    );
    Ok(evaluation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EvaluationConfigBuilder, LogitProjectionConfigBuilder, TagProjectionConfigBuilder};
    use ndarray::array;
    use rstest::rstest;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn source_record(tokens: &[&str], tags: &[TagId]) -> Record {
        record(json!({"id": "s", "tokens": tokens, "ner_tags": tags}))
    }

    #[test]
    fn test_project_tag_records_output_columns() {
        let sources = vec![source_record(&["John", "lives", "here"], &[1, 0, 0])];
        let config = TagProjectionConfig::default();
        let output = project_tag_records(&sources, &["Hier wohnt John"], &["0-2 1-1 2-0"], &config)
            .unwrap();
        let projected = &output.records[0];
        assert_eq!(projected["id"], json!("s"));
        assert_eq!(projected["tokens"], json!(["Hier", "wohnt", "John"]));
        assert_eq!(projected["org_tokens"], json!(["John", "lives", "here"]));
        assert_eq!(projected["ner_tags"], json!([0, 0, 1]));
        assert_eq!(projected["org_ner_tags"], json!([1, 0, 0]));
        assert_eq!(output.summary, ProjectionSummary::new(1, vec![]));
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn test_project_tag_records_drops_corrupted_sentences(#[case] parallel: bool) {
        let sources = vec![
            source_record(&["a", "b"], &[1, 2]),
            source_record(&["c", "d"], &[1, 2]),
            source_record(&["e"], &[3]),
            record(json!({"tokens": ["f"]})),
            source_record(&["g"], &[1]),
        ];
        let targets = ["A B C", "D E", "F", "G", "H"];
        let alignments = ["0-0 1-2", "0-0", "0-0", "0-0", "0-x"];
        let config = TagProjectionConfigBuilder::default()
            .complete_source(true)
            .complete_target(true)
            .parallel(parallel)
            .build();
        let output = project_tag_records(&sources, &targets, &alignments, &config).unwrap();
        // 0: gap on the target side, 1: unaligned source token, 3: no tag column, 4: bad pair
        assert_eq!(output.summary.corrupted_indices, vec![0, 1, 3, 4]);
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0]["ner_tags"], json!([3]));
        assert!((output.summary.recovery_rate - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_project_tag_records_out_of_range_alignment_is_corrupted() {
        let sources = vec![source_record(&["a"], &[1])];
        let output = project_tag_records(&sources, &["A"], &["0-3"], &TagProjectionConfig::default())
            .unwrap();
        assert_eq!(output.summary.corrupted_indices, vec![0]);
    }

    #[rstest]
    #[case(&["a"], &[0, 1])]
    #[case(&["a", "b", "c"], &[1, 2])]
    fn test_project_tag_records_tokens_and_tags_must_be_parallel(
        #[case] tokens: &[&str],
        #[case] tags: &[TagId],
    ) {
        let sources = vec![source_record(tokens, tags), source_record(&["a"], &[1])];
        let output = project_tag_records(
            &sources,
            &["A B", "A"],
            &["0-0 1-1", "0-0"],
            &TagProjectionConfig::default(),
        )
        .unwrap();
        assert_eq!(output.summary.corrupted_indices, vec![0]);
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0]["org_ner_tags"], json!([1]));
    }

    #[test]
    fn test_project_tag_records_instance_check() {
        // both source entities collapse on the same target token
        let sources = vec![source_record(&["a", "b", "c"], &[1, 0, 1])];
        let config = TagProjectionConfigBuilder::default()
            .complete_instance(true)
            .build();
        let output = project_tag_records(&sources, &["A"], &["0-0 2-0"], &config).unwrap();
        assert_eq!(output.summary.corrupted, 1);
        let config = TagProjectionConfig::default();
        let output = project_tag_records(&sources, &["A"], &["0-0 2-0"], &config).unwrap();
        assert_eq!(output.summary.corrupted, 0);
    }

    #[test]
    fn test_project_tag_records_length_mismatch_is_fatal() {
        let sources = vec![source_record(&["a"], &[1])];
        let res = project_tag_records(&sources, &["A", "B"], &["0-0"], &TagProjectionConfig::default());
        assert!(matches!(res, Err(Error::InconsistentLength(_))));
    }

    #[rstest]
    #[case(0, 1.0)]
    #[case(4, 0.75)]
    fn test_summary_recovery_rate(#[case] total: usize, #[case] expected: f64) {
        let corrupted = if total == 0 { vec![] } else { vec![2] };
        let summary = ProjectionSummary::new(total, corrupted);
        assert_eq!(summary.recovery_rate, expected);
    }

    #[test]
    fn test_prepare_translate_test() {
        let targets = vec![record(json!({"tokens": ["Hier", "John"], "ner_tags": [0, 1]}))];
        let prepared =
            prepare_translate_test(&["John is here"], &targets, &["0-1 2-0"], "tokens", "ner_tags")
                .unwrap();
        let prepared = &prepared[0];
        assert_eq!(prepared["alignment"], json!([[0, 1], [2, 0]]));
        assert_eq!(prepared["tokens"], json!(["John", "is", "here"]));
        assert_eq!(prepared["org_tokens"], json!(["Hier", "John"]));
        assert_eq!(prepared["ner_tags"], json!([0, 0, 0]));
        assert_eq!(prepared["org_ner_tags"], json!([0, 1]));
        assert_eq!(record_alignment(prepared, "alignment").unwrap(), vec![(0, 1), (2, 0)]);
    }

    #[test]
    fn test_prepare_translate_test_fails_on_bad_sentence() {
        let targets = vec![record(json!({"tokens": ["Hier"]}))];
        let res = prepare_translate_test(&["here"], &targets, &["0-0"], "tokens", "ner_tags");
        assert!(matches!(res, Err(Error::Record(RecordError::MissingField(_)))));
    }

    fn prepared_record(tokens: &[&str], labels: &[TagId], alignment: Value) -> Record {
        record(json!({"tokens": tokens, "org_ner_tags": labels, "alignment": alignment}))
    }

    #[test]
    fn test_project_logit_records() {
        let records = vec![prepared_record(
            &["John", "is", "here"],
            &[0, 0, 1, 0],
            json!([[0, 2], [2, 0]]),
        )];
        let source = SentenceLogits::new(array![
            [0.0, 5.0, 1.0],
            [5.0, 0.0, 0.0],
            [5.0, 0.0, 0.0]
        ]);
        let config = LogitProjectionConfig::default();
        let output = project_logit_records(&records, &[source.clone()], &config).unwrap();
        let projected = &output.logits[0];
        assert_eq!(projected.len(), 4);
        assert!(projected.is_filled(2));
        assert_eq!(projected.row(2), source.row(0));
        assert_eq!(projected.filled_count(), 1);
        assert_eq!(output.total_entities, 1);
    }

    #[rstest]
    #[case(None, false)]
    #[case(Some(2), true)]
    fn test_project_logit_records_checks_token_count(
        #[case] max_length: Option<usize>,
        #[case] ok: bool,
    ) {
        let records = vec![prepared_record(&["a", "b", "c"], &[0, 0], json!([]))];
        let source = SentenceLogits::new(array![[1.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);
        let config = LogitProjectionConfigBuilder::default()
            .max_length(max_length)
            .build();
        let res = project_logit_records(&records, &[source], &config);
        assert_eq!(res.is_ok(), ok);
    }

    #[test]
    fn test_project_logit_records_parallel_matches_sequential() {
        let records: Vec<Record> = (0..8)
            .map(|i| prepared_record(&["a", "b"], &[0, 0, 0], json!([[0, i % 3], [1, 2]])))
            .collect();
        let logits: Vec<SentenceLogits> = (0..8)
            .map(|_| SentenceLogits::new(array![[0.0, 3.0, 1.0], [0.0, 1.0, 3.0]]))
            .collect();
        let sequential = LogitProjectionConfig::default();
        let parallel = LogitProjectionConfigBuilder::default().parallel(true).build();
        assert_eq!(
            project_logit_records(&records, &logits, &sequential).unwrap(),
            project_logit_records(&records, &logits, &parallel).unwrap()
        );
    }

    #[test]
    fn test_evaluate() {
        let labels = LabelMap::from_entity_types(&["PER"]);
        let records = vec![record(json!({"org_ner_tags": [1, 2, 0]}))];
        let first = SentenceLogits::new(array![
            [0.0, 4.0, 0.0],
            [0.0, 0.0, 4.0],
            [0.0, 4.0, 0.0]
        ]);
        let models = BTreeMap::from([(FIRST_MODEL, vec![first])]);
        let evaluation = evaluate(&records, &models, &labels, &EvaluationConfig::default()).unwrap();
        // one true positive, one false positive
        assert_eq!(evaluation.f1, 66.67);

        let mut second = SentenceLogits::unfilled(3, 3);
        second.set_row(2, array![9.0, 0.0, 0.0].view()).unwrap();
        let models = BTreeMap::from([
            (FIRST_MODEL, models[&FIRST_MODEL].clone()),
            (SECOND_MODEL, vec![second]),
        ]);
        let evaluation = evaluate(&records, &models, &labels, &EvaluationConfig::default()).unwrap();
        assert_eq!(evaluation.f1, 100.0);
    }

    #[test]
    fn test_evaluate_without_entities_scores_zero() {
        let labels = LabelMap::from_entity_types(&["PER"]);
        let records = vec![record(json!({"org_ner_tags": [0, 0]}))];
        let first = SentenceLogits::new(array![[4.0, 0.0, 0.0], [4.0, 0.0, 0.0]]);
        let models = BTreeMap::from([(FIRST_MODEL, vec![first])]);
        let evaluation = evaluate(&records, &models, &labels, &EvaluationConfig::default()).unwrap();
        assert_eq!(evaluation.f1, 0.0);
    }

    #[test]
    fn test_evaluate_rejects_unknown_tags() {
        let labels = LabelMap::from_entity_types(&["PER"]);
        let records = vec![record(json!({"org_ner_tags": [7]}))];
        let models = BTreeMap::from([(FIRST_MODEL, vec![SentenceLogits::new(array![[1.0, 0.0, 0.0]])])]);
        let config = EvaluationConfigBuilder::default().build();
        assert!(matches!(
            evaluate(&records, &models, &labels, &config),
            Err(Error::Labels(_))
        ));
    }

    #[rstest]
    #[case(0.666_666_7, 66.67)]
    #[case(1.0, 100.0)]
    #[case(0.0, 0.0)]
    fn test_percentage(#[case] score: f32, #[case] expected: f64) {
        assert_eq!(percentage(score), expected)
    }
}
