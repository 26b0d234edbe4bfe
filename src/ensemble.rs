/*!
Ensembling of the predictions of several models by probability averaging.
*/
use crate::entity::TagId;
use crate::error::{Error, InconsistentLengthError, Result};
use crate::logits::{argmax, SentenceLogits};
use crate::projection::ProjectionError;
use ndarray::{Array2, ArrayView2, Axis, Zip};
use std::collections::BTreeMap;

/// Id of the model whose predictions fill the gaps of the secondary model.
pub const FIRST_MODEL: usize = 0;
/// Id of the secondary model.
pub const SECOND_MODEL: usize = 1;

/// Row-wise softmax. The maximum of each row is subtracted first, so that a placeholder row
/// (label-0 score of `f32::MAX`) puts all the mass on label 0.
pub fn softmax_rows(scores: ArrayView2<f32>) -> Array2<f32> {
    let mut probs = scores.to_owned();
    for mut row in probs.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
        row.mapv_inplace(|x| (x - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|x| x / sum);
        }
    }
    probs
}

/// Sentence of `model` ready to be averaged, in the serialized form.
fn resolved_scores(
    model: usize,
    sentence: &SentenceLogits,
    first: &SentenceLogits,
    replace_second_with_first: bool,
) -> Array2<f32> {
    if replace_second_with_first && model == SECOND_MODEL {
        let mut sentence = sentence.clone();
        sentence.backfill_from(first);
        sentence.to_sentinel()
    } else {
        sentence.to_sentinel()
    }
}

/// Combines the predictions of every model into a single tag per token.
///
/// For each sentence, the unfilled positions of model [`SECOND_MODEL`] are replaced by the
/// vectors of model [`FIRST_MODEL`] when `replace_second_with_first` is set. Every vector is
/// turned into a distribution with a softmax, the distributions are averaged across models and
/// the prediction is their argmax.
///
/// All models must have as many sentences, and as many tokens in each sentence, as model 0.
pub fn ensemble(
    models: &BTreeMap<usize, Vec<SentenceLogits>>,
    replace_second_with_first: bool,
) -> Result<Vec<Vec<TagId>>> {
    let first_model = models.get(&FIRST_MODEL).ok_or(Error::MissingFirstModel)?;
    for sentences in models.values() {
        InconsistentLengthError::check(
            "sentences of model 0",
            first_model.len(),
            "sentences of another model",
            sentences.len(),
        )?;
    }
    let num_models = models.len() as f32;
    let mut predictions = Vec::with_capacity(first_model.len());
    for (i, first) in first_model.iter().enumerate() {
        let mut total = Array2::<f32>::zeros((first.len(), first.num_labels()));
        for (&model, sentences) in models.iter() {
            let sentence = &sentences[i];
            InconsistentLengthError::check(
                "tokens of model 0",
                first.len(),
                "tokens of another model",
                sentence.len(),
            )?;
            if sentence.num_labels() != first.num_labels() {
                return Err(ProjectionError::LabelCountMismatch {
                    expected: first.num_labels(),
                    found: sentence.num_labels(),
                }
                .into());
            }
            let scores = resolved_scores(model, sentence, first, replace_second_with_first);
            let probs = softmax_rows(scores.view());
            Zip::from(&mut total).and(&probs).for_each(|t, &p| *t += p);
        }
        let mean = total / num_models;
        predictions.push(
            mean.axis_iter(Axis(0))
                .map(|row| argmax(row) as TagId)
                .collect(),
        );
    }
    Ok(predictions)
}
