/*!
This module computes the span-level metrics (precision, recall, f-score, support) of a ground-truth
sequence of string labels and a predicted one. Chunks are extracted leniently, as SeqEval does in
its default mode, and a chunk is a true positive only when its type, its sentence, its start and
its end all match.
*/
use crate::entity::{get_chunks_lenient, LabelChunk, LabelParsingError};
use crate::error::InconsistentLengthError;
use crate::reporter::{Average, ClassMetrics, OverallAverage, Reporter};
use ahash::{AHashMap, AHashSet};
use enum_iterator::all;
use itertools::multizip;
use ndarray::{prelude::*, ScalarOperand, Zip};
use ndarray_stats::{errors::MultiInputError, SummaryStatisticsExt};
use num::{Float, NumCast};
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
/// How do we handle cases with a division by zero? Do we replace the result by 1, return an
/// error, or replace the result with 0? SeqEval uses by default the `ReplaceBy0` strategy. The
/// `ReturnError` strategy stops the computation at the first zero denominator.
pub enum DivByZeroStrat {
    /// The result of a division by zero is `1`
    ReplaceBy1,
    /// Returns an error
    ReturnError,
    /// The result of a division by zero is `0`
    #[default]
    ReplaceBy0,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Could not parse `{0}` into a `DivByZeroStrat`")]
pub struct ParsingDivByZeroStratError(String);

impl FromStr for DivByZeroStrat {
    type Err = ParsingDivByZeroStratError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_ref() {
            "replaceby1" | "replacebyone" => Ok(DivByZeroStrat::ReplaceBy1),
            "replaceby0" | "replacebyzero" => Ok(DivByZeroStrat::ReplaceBy0),
            "returnerror" | "error" => Ok(DivByZeroStrat::ReturnError),
            _ => Err(ParsingDivByZeroStratError(String::from(s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
/// Enum error encompassing the failures that could happen when computing the precision, recall,
/// f-score and the support.
pub enum ComputationError {
    #[error("Beta value is not positive")]
    BetaNotPositive,
    #[error(transparent)]
    InconsistentLength(#[from] InconsistentLengthError),
    #[error(transparent)]
    Label(#[from] LabelParsingError),
    #[error("Encountered division by zero")]
    DivisionByZero,
    #[error(transparent)]
    InputError(#[from] MultiInputError),
    #[error("Found an empty array in {0}")]
    EmptyArray(String),
    #[error("Received an empty input {0}")]
    EmptyInput(String),
}

/// Internal extension trait for Num's Float trait
pub trait FloatExt: Float + Send + Sync + Clone + ScalarOperand + Debug {}

impl<T: Float + Send + Sync + Clone + Copy + ScalarOperand + Debug> FloatExt for T {}

/// Type alias for representing the output of `precision_recall_fscore_support`. The first array
/// contains the precision, the second the recall, the third the f-score and the last one the
/// support.
pub type PrecisionRecallFScoreTrueSum = (Array1<f32>, Array1<f32>, Array1<f32>, Array1<usize>);

fn check_for_empty_slices<T>(y_true: &[T], y_pred: &[T]) -> Result<(), ComputationError> {
    if y_true.is_empty() {
        return Err(ComputationError::EmptyInput(String::from("y_true")));
    };
    if y_pred.is_empty() {
        return Err(ComputationError::EmptyInput(String::from("y_pred")));
    };
    Ok(())
}

fn check_consistent_length<T>(
    y_true: &[Vec<T>],
    y_pred: &[Vec<T>],
) -> Result<(), InconsistentLengthError> {
    InconsistentLengthError::check("y_true", y_true.len(), "y_pred", y_pred.len())?;
    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        InconsistentLengthError::check("y_true sequence", t.len(), "y_pred sequence", p.len())?;
    }
    Ok(())
}

/// Chunks grouped by type. A chunk is identified by its sentence, its start and its end.
type ChunksByType<'a> = AHashMap<&'a str, AHashSet<(usize, usize, usize)>>;

fn group_by_type<'a>(chunks: &[Vec<LabelChunk<'a>>]) -> ChunksByType<'a> {
    let mut grouped: ChunksByType<'a> = AHashMap::default();
    for (sentence, sentence_chunks) in chunks.iter().enumerate() {
        for c in sentence_chunks {
            grouped
                .entry(c.tag)
                .or_default()
                .insert((sentence, c.start, c.end));
        }
    }
    grouped
}

/// Per-type counts, in the order of the sorted type names.
struct ChunkCounts<'a> {
    target_names: Vec<&'a str>,
    pred_sum: Array1<usize>,
    tp_sum: Array1<usize>,
    true_sum: Array1<usize>,
}

impl<'a> ChunkCounts<'a> {
    fn new(chunks_true: &[Vec<LabelChunk<'a>>], chunks_pred: &[Vec<LabelChunk<'a>>]) -> Self {
        let entities_true = group_by_type(chunks_true);
        let entities_pred = group_by_type(chunks_pred);
        let target_names: Vec<&str> = entities_true
            .keys()
            .chain(entities_pred.keys())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let empty = AHashSet::default();
        let mut tp_sum = Vec::with_capacity(target_names.len());
        let mut pred_sum = Vec::with_capacity(target_names.len());
        let mut true_sum = Vec::with_capacity(target_names.len());
        for type_name in target_names.iter() {
            let type_true = entities_true.get(type_name).unwrap_or(&empty);
            let type_pred = entities_pred.get(type_name).unwrap_or(&empty);
            tp_sum.push(type_true.intersection(type_pred).count());
            pred_sum.push(type_pred.len());
            true_sum.push(type_true.len());
        }
        Self {
            target_names,
            pred_sum: Array::from(pred_sum),
            tp_sum: Array::from(tp_sum),
            true_sum: Array::from(true_sum),
        }
    }
}

/// Divides `numerator` by `denominator` and applies `zero_division` where the denominator is
/// zero.
fn prf_divide(
    numerator: &Array1<f32>,
    denominator: &Array1<f32>,
    parallel: bool,
    zero_division: DivByZeroStrat,
) -> Result<Array1<f32>, ComputationError> {
    let zero_mask = denominator.mapv(|d| d == 0.0);
    if zero_division == DivByZeroStrat::ReturnError && zero_mask.iter().any(|&z| z) {
        return Err(ComputationError::DivisionByZero);
    }
    let replacement = match zero_division {
        DivByZeroStrat::ReplaceBy1 => 1.0,
        _ => 0.0,
    };
    let mut result = numerator.clone();
    if parallel {
        Zip::from(&mut result)
            .and(denominator)
            .and(&zero_mask)
            .par_for_each(|r, &d, &z| *r = if z { replacement } else { *r / d });
    } else {
        Zip::from(&mut result)
            .and(denominator)
            .and(&zero_mask)
            .for_each(|r, &d, &z| *r = if z { replacement } else { *r / d });
    }
    Ok(result)
}

/// F-beta score of every class. A class whose precision and recall are both zero scores zero.
fn fbeta<F: FloatExt>(precision: &Array1<f32>, recall: &Array1<f32>, beta: F) -> Array1<f32> {
    let beta2 = beta.powi(2);
    let beta2p1 = match <f32 as NumCast>::from(beta2 + F::one()) {
        Some(b) if b.is_finite() => b,
        _ => return recall.clone(),
    };
    Zip::from(precision)
        .and(recall)
        .map_collect(|&p, &r| {
            let denom = (beta2p1 - 1.0) * p + r;
            if denom == 0.0 {
                0.0
            } else {
                beta2p1 * p * r / denom
            }
        })
}

/// Average over no support at all, such as sequences without a single chunk.
fn undefined_average(
    zero_division: DivByZeroStrat,
) -> Result<PrecisionRecallFScoreTrueSum, ComputationError> {
    match zero_division {
        DivByZeroStrat::ReturnError => Err(ComputationError::DivisionByZero),
        DivByZeroStrat::ReplaceBy1 => Ok((array![1.0], array![1.0], array![1.0], array![0])),
        DivByZeroStrat::ReplaceBy0 => Ok((array![0.0], array![0.0], array![0.0], array![0])),
    }
}

fn prfs_from_counts<F: FloatExt>(
    counts: &ChunkCounts,
    beta: F,
    average: Average,
    zero_division: DivByZeroStrat,
    parallel: bool,
) -> Result<PrecisionRecallFScoreTrueSum, ComputationError> {
    if beta.is_sign_negative() || beta.is_nan() {
        return Err(ComputationError::BetaNotPositive);
    };
    let (tp_sum, pred_sum, true_sum) = if average == Average::Micro {
        (
            array![counts.tp_sum.sum()],
            array![counts.pred_sum.sum()],
            array![counts.true_sum.sum()],
        )
    } else {
        (
            counts.tp_sum.clone(),
            counts.pred_sum.clone(),
            counts.true_sum.clone(),
        )
    };
    let tp = tp_sum.mapv(|x| x as f32);
    let precision = prf_divide(&tp, &pred_sum.mapv(|x| x as f32), parallel, zero_division)?;
    let recall = prf_divide(&tp, &true_sum.mapv(|x| x as f32), parallel, zero_division)?;
    let f_score = fbeta(&precision, &recall, beta);
    match average {
        Average::None | Average::Micro => Ok((precision, recall, f_score, true_sum)),
        Average::Weighted => {
            let support = true_sum.sum();
            if support == 0 {
                return undefined_average(zero_division);
            };
            let weights = true_sum.mapv(|x| x as f32);
            Ok((
                array![precision.weighted_mean(&weights)?],
                array![recall.weighted_mean(&weights)?],
                array![f_score.weighted_mean(&weights)?],
                array![support],
            ))
        }
        Average::Macro => {
            if true_sum.is_empty() {
                return undefined_average(zero_division);
            }
            let mean = |a: &Array1<f32>, name: &str| {
                a.mean()
                    .ok_or_else(|| ComputationError::EmptyArray(String::from(name)))
            };
            Ok((
                array![mean(&precision, "precision")?],
                array![mean(&recall, "recall")?],
                array![mean(&f_score, "fscore")?],
                array![true_sum.sum()],
            ))
        }
    }
}

/// Computes the precision, recall, fscore and support of the true and predicted labels.
///
/// * `y_true`: True labels, one sequence per sentence
/// * `y_pred`: Predicted labels
/// * `beta`: Value of the `beta` parameter of the fscore. `beta=1` for F1 and `beta=0.5` for F0.5.
/// * `average`: What type of average to use.
/// * `zero_division`: What to do in case of division by zero.
/// * `parallel`: Can we use multiple cores for computations?
pub fn precision_recall_fscore_support<S: AsRef<str>, F: FloatExt>(
    y_true: &[Vec<S>],
    y_pred: &[Vec<S>],
    beta: F,
    average: Average,
    zero_division: DivByZeroStrat,
    parallel: bool,
) -> Result<PrecisionRecallFScoreTrueSum, ComputationError> {
    check_for_empty_slices(y_true, y_pred)?;
    check_consistent_length(y_true, y_pred)?;
    let chunks_true = get_chunks_lenient(y_true)?;
    let chunks_pred = get_chunks_lenient(y_pred)?;
    let counts = ChunkCounts::new(&chunks_true, &chunks_pred);
    prfs_from_counts(&counts, beta, average, zero_division, parallel)
}

/// Micro-averaged F1 score, with divisions by zero giving `0`.
///
/// ```rust
/// use bioproj::f1_score;
///
/// let y_true = vec![vec!["B-PER", "I-PER", "O", "B-LOC"]];
/// let y_pred = vec![vec!["B-PER", "I-PER", "O", "O"]];
/// let f1 = f1_score(&y_true, &y_pred).unwrap();
/// assert!((f1 - 2.0 / 3.0).abs() < 1e-6);
/// ```
pub fn f1_score<S: AsRef<str>>(y_true: &[Vec<S>], y_pred: &[Vec<S>]) -> Result<f32, ComputationError> {
    let (_, _, f, _) = precision_recall_fscore_support(
        y_true,
        y_pred,
        1.0f32,
        Average::Micro,
        DivByZeroStrat::ReplaceBy0,
        false,
    )?;
    f.first()
        .copied()
        .ok_or_else(|| ComputationError::EmptyArray(String::from("fscore")))
}

/// Computes the metrics of every class and the overall averages. The returned `Reporter` can be
/// displayed as a table.
pub fn classification_report<S: AsRef<str>>(
    y_true: &[Vec<S>],
    y_pred: &[Vec<S>],
    zero_division: DivByZeroStrat,
    parallel: bool,
) -> Result<Reporter, ComputationError> {
    check_for_empty_slices(y_true, y_pred)?;
    check_consistent_length(y_true, y_pred)?;
    let chunks_true = get_chunks_lenient(y_true)?;
    let chunks_pred = get_chunks_lenient(y_pred)?;
    let counts = ChunkCounts::new(&chunks_true, &chunks_pred);
    let (p, r, f1, s) = prfs_from_counts(&counts, 1.0f32, Average::None, zero_division, parallel)?;
    let mut reporter = Reporter::default();
    for (name, precision, recall, fscore, support) in multizip((
        counts.target_names.iter(),
        p.into_iter(),
        r.into_iter(),
        f1.into_iter(),
        s.into_iter(),
    )) {
        reporter.insert(ClassMetrics::new_class(name, precision, recall, fscore, support));
    }
    for avg in all::<OverallAverage>() {
        let (p, r, f1, s) = prfs_from_counts(&counts, 1.0f32, avg.into(), zero_division, parallel)?;
        match (p.first(), r.first(), f1.first(), s.first()) {
            (Some(&precision), Some(&recall), Some(&fscore), Some(&support)) => {
                reporter.insert(ClassMetrics::new_overall(avg, precision, recall, fscore, support));
            }
            _ => return Err(ComputationError::EmptyArray(avg.to_string())),
        }
    }
    Ok(reporter)
}
