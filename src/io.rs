/*!
Reading and writing the files of the pipeline: JSON lines records, plain text lines and logit
artifacts.

A logit artifact is a JSON array of sentences, each an array of per-token score vectors:
`[[[f32; labels]; tokens]; sentences]`. Unfilled positions are written as placeholder rows (see
[`crate::logits`]).
*/
use crate::config::RetryPolicy;
use crate::error::{ArtifactLoadError, Error, Result};
use crate::logits::SentenceLogits;
use serde_json::{Map, Value};
use serde_jsonlines::{json_lines, write_json_lines};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::thread::sleep;
use tracing::{info, warn};

/// A JSON object read from a JSON lines file. Columns the pipeline does not know are kept as is.
pub type Record = Map<String, Value>;

fn create_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .map_err(|e| Error::io(format!("creating {}", parent.display()), e)),
        _ => Ok(()),
    }
}

/// Reads every record of a JSON lines file.
pub fn load_jsonl<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let context = || format!("reading {}", path.display());
    json_lines::<Record, _>(path)
        .map_err(|e| Error::io(context(), e))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| Error::io(context(), e))
}

/// Writes `records` as JSON lines, creating the parent directories.
pub fn save_jsonl<P: AsRef<Path>>(path: P, records: &[Record]) -> Result<()> {
    let path = path.as_ref();
    create_parent_dir(path)?;
    write_json_lines(path, records).map_err(|e| Error::io(format!("writing {}", path.display()), e))
}

/// Reads the lines of a text file, stripped of their surrounding whitespace. Blank lines are
/// kept.
pub fn load_text_lines<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let context = || format!("reading {}", path.display());
    let file = File::open(path).map_err(|e| Error::io(context(), e))?;
    BufReader::new(file)
        .lines()
        .map(|line| line.map(|l| l.trim().to_string()))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| Error::io(context(), e))
}

/// Writes one line per element of `lines`, creating the parent directories.
pub fn save_text_lines<P: AsRef<Path>, S: AsRef<str>>(path: P, lines: &[S]) -> Result<()> {
    let path = path.as_ref();
    create_parent_dir(path)?;
    let context = || format!("writing {}", path.display());
    let file = File::create(path).map_err(|e| Error::io(context(), e))?;
    let mut writer = BufWriter::new(file);
    for line in lines {
        writeln!(writer, "{}", line.as_ref()).map_err(|e| Error::io(context(), e))?;
    }
    writer.flush().map_err(|e| Error::io(context(), e))
}

/// Reads a logit artifact.
pub fn load_logits<P: AsRef<Path>>(path: P) -> Result<Vec<SentenceLogits>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::io(format!("reading {}", path.display()), e))?;
    let sentences: Vec<Vec<Vec<f32>>> = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| Error::json(format!("parsing {}", path.display()), e))?;
    sentences
        .iter()
        .map(|rows| SentenceLogits::from_rows(rows).map_err(Error::from))
        .collect()
}

/// Writes a logit artifact, creating the parent directories.
pub fn save_logits<P: AsRef<Path>>(path: P, logits: &[SentenceLogits]) -> Result<()> {
    let path = path.as_ref();
    create_parent_dir(path)?;
    let context = || format!("writing {}", path.display());
    let sentences: Vec<Vec<Vec<f32>>> = logits.iter().map(SentenceLogits::to_rows).collect();
    let file = File::create(path).map_err(|e| Error::io(context(), e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &sentences).map_err(|e| Error::json(context(), e))?;
    writer.flush().map_err(|e| Error::io(context(), e))
}

/// Calls `load` until it succeeds, at most `policy.max_attempts` times, sleeping a random delay
/// between two attempts.
fn load_with_retry<T, F>(path: &Path, policy: &RetryPolicy, mut load: F) -> Result<T>
where
    F: FnMut(&Path) -> Result<T>,
{
    let mut rng = rand::thread_rng();
    let mut last_error = String::new();
    for attempt in 1..=policy.max_attempts {
        info!(
            "Loading logits from {} (attempt {}/{})",
            path.display(),
            attempt,
            policy.max_attempts
        );
        match load(path) {
            Ok(loaded) => {
                info!("Successfully loaded logits from {}", path.display());
                return Ok(loaded);
            }
            Err(e) => {
                warn!("Failed to load {} on attempt {}: {}", path.display(), attempt, e);
                last_error = e.to_string();
                if attempt < policy.max_attempts {
                    let delay = policy.delay(&mut rng);
                    info!("Retrying in {} seconds...", delay.as_secs());
                    sleep(delay);
                }
            }
        }
    }
    Err(ArtifactLoadError {
        path: path.to_path_buf(),
        attempts: policy.max_attempts,
        last_error,
    }
    .into())
}

/// Reads a logit artifact produced by another job, which may not be written yet. Gives up with
/// an [`ArtifactLoadError`] once the attempts of `policy` are exhausted.
pub fn load_logits_with_retry<P: AsRef<Path>>(
    path: P,
    policy: &RetryPolicy,
) -> Result<Vec<SentenceLogits>> {
    load_with_retry(path.as_ref(), policy, |p| load_logits(p))
}
