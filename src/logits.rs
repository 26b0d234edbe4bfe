/*!
Per-token score vectors of a sentence.

A sentence is a `tokens x labels` matrix plus an explicit `filled` mask. A row that no projection
wrote is *unfilled*: it means "no prediction here" and is resolved when ensembling. On disk the
mask does not exist; an unfilled row is written as a placeholder whose label-0 score is
[`UNFILLED_SENTINEL`] and whose other scores are `0.0`.
*/
use crate::entity::TagId;
use crate::projection::ProjectionError;
use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Label-0 score of a placeholder row in the serialized form.
pub const UNFILLED_SENTINEL: f32 = f32::MAX;

/// Index of the first maximum of `row`. `NaN` scores never win. An empty row returns `0`.
pub fn argmax(row: ArrayView1<f32>) -> usize {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (i, &score) in row.iter().enumerate() {
        if score > best_score {
            best = i;
            best_score = score;
        }
    }
    best
}

/// Placeholder row of an unfilled position.
pub fn placeholder_row(num_labels: usize) -> Array1<f32> {
    let mut row = Array1::zeros(num_labels);
    if let Some(first) = row.get_mut(0) {
        *first = UNFILLED_SENTINEL;
    }
    row
}

/// Returns true if `row` is a placeholder in the serialized form.
#[inline]
pub fn is_sentinel_row(row: ArrayView1<f32>) -> bool {
    row.get(0).is_some_and(|&s| s == UNFILLED_SENTINEL)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentenceLogits {
    scores: Array2<f32>,
    filled: Vec<bool>,
}

impl SentenceLogits {
    /// Every row of `scores` is a real prediction.
    pub fn new(scores: Array2<f32>) -> Self {
        let filled = vec![true; scores.nrows()];
        Self { scores, filled }
    }

    /// `len` placeholder rows of `num_labels` scores.
    pub fn unfilled(len: usize, num_labels: usize) -> Self {
        let mut scores = Array2::zeros((len, num_labels));
        if num_labels > 0 {
            scores.column_mut(0).fill(UNFILLED_SENTINEL);
        }
        Self {
            scores,
            filled: vec![false; len],
        }
    }

    /// Reads the serialized form: rows whose label-0 score is the sentinel are unfilled.
    pub fn from_sentinel(scores: Array2<f32>) -> Self {
        let filled = scores
            .axis_iter(Axis(0))
            .map(|row| !is_sentinel_row(row))
            .collect();
        Self { scores, filled }
    }

    /// Builds the logits of a sentence from its rows, in the serialized form. All rows must have
    /// the same number of scores.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, ProjectionError> {
        let num_labels = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().find(|r| r.len() != num_labels) {
            return Err(ProjectionError::LabelCountMismatch {
                expected: num_labels,
                found: bad.len(),
            });
        }
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        let scores = Array2::from_shape_vec((rows.len(), num_labels), flat).map_err(|_| {
            ProjectionError::LabelCountMismatch {
                expected: num_labels,
                found: 0,
            }
        })?;
        Ok(Self::from_sentinel(scores))
    }

    /// The serialized form: unfilled rows are written as placeholders.
    pub fn to_sentinel(&self) -> Array2<f32> {
        let mut scores = self.scores.clone();
        let placeholder = placeholder_row(self.num_labels());
        for (mut row, &filled) in scores.axis_iter_mut(Axis(0)).zip(self.filled.iter()) {
            if !filled {
                row.assign(&placeholder);
            }
        }
        scores
    }

    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        self.to_sentinel()
            .axis_iter(Axis(0))
            .map(|row| row.to_vec())
            .collect()
    }

    /// Number of tokens.
    pub fn len(&self) -> usize {
        self.scores.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_labels(&self) -> usize {
        self.scores.ncols()
    }

    pub fn scores(&self) -> &Array2<f32> {
        &self.scores
    }

    #[inline]
    pub fn row(&self, position: usize) -> ArrayView1<f32> {
        self.scores.row(position)
    }

    #[inline]
    pub fn is_filled(&self, position: usize) -> bool {
        self.filled.get(position).copied().unwrap_or(false)
    }

    pub fn filled_count(&self) -> usize {
        self.filled.iter().filter(|&&f| f).count()
    }

    /// Writes `row` at `position` and marks it filled.
    pub fn set_row(&mut self, position: usize, row: ArrayView1<f32>) -> Result<(), ProjectionError> {
        if row.len() != self.num_labels() {
            return Err(ProjectionError::LabelCountMismatch {
                expected: self.num_labels(),
                found: row.len(),
            });
        }
        if position >= self.len() {
            return Err(ProjectionError::SpanOutOfBounds {
                start: position,
                end: position,
                len: self.len(),
            });
        }
        self.scores.row_mut(position).assign(&row);
        self.filled[position] = true;
        Ok(())
    }

    /// Replaces every unfilled row by the row of `other` at the same position.
    pub(crate) fn backfill_from(&mut self, other: &SentenceLogits) {
        for position in 0..self.len().min(other.len()) {
            if !self.filled[position] {
                self.scores.row_mut(position).assign(&other.row(position));
                self.filled[position] = other.is_filled(position);
            }
        }
    }

    /// Predicted tag of a position. A placeholder predicts `0`.
    #[inline]
    pub fn argmax(&self, position: usize) -> TagId {
        if self.is_filled(position) {
            argmax(self.row(position)) as TagId
        } else {
            0
        }
    }

    /// Predicted tags of the whole sentence.
    pub fn predictions(&self) -> Vec<TagId> {
        (0..self.len()).map(|i| self.argmax(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use rstest::rstest;

    #[rstest]
    #[case(vec![0.1, 0.5, 0.2], 1)]
    #[case(vec![0.5, 0.5, 0.2], 0)]
    #[case(vec![f32::NAN, 0.1, 0.3], 2)]
    #[case(vec![-3.0, -1.0, -2.0], 1)]
    #[case(vec![], 0)]
    fn test_argmax(#[case] row: Vec<f32>, #[case] expected: usize) {
        assert_eq!(argmax(ArrayView1::from(&row)), expected)
    }

    #[test]
    fn test_unfilled_and_sentinel_form() {
        let mut logits = SentenceLogits::unfilled(3, 4);
        assert_eq!(logits.len(), 3);
        assert_eq!(logits.num_labels(), 4);
        assert_eq!(logits.filled_count(), 0);
        assert_eq!(logits.predictions(), vec![0, 0, 0]);
        logits
            .set_row(1, array![0.0, 2.0, 1.0, 0.5].view())
            .unwrap();
        assert!(logits.is_filled(1));
        assert!(!logits.is_filled(0));
        assert_eq!(logits.predictions(), vec![0, 1, 0]);
        let rows = logits.to_rows();
        assert_eq!(rows[0], vec![UNFILLED_SENTINEL, 0.0, 0.0, 0.0]);
        assert_eq!(rows[1], vec![0.0, 2.0, 1.0, 0.5]);
        let back = SentenceLogits::from_rows(&rows).unwrap();
        assert_eq!(back, logits);
    }

    #[test]
    fn test_from_rows_rejects_ragged_rows() {
        let rows = vec![vec![0.0, 1.0], vec![1.0]];
        assert_eq!(
            SentenceLogits::from_rows(&rows),
            Err(ProjectionError::LabelCountMismatch {
                expected: 2,
                found: 1
            })
        );
        assert!(SentenceLogits::from_rows(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_set_row_errors() {
        let mut logits = SentenceLogits::unfilled(2, 3);
        assert!(matches!(
            logits.set_row(0, array![1.0, 2.0].view()),
            Err(ProjectionError::LabelCountMismatch { .. })
        ));
        assert!(matches!(
            logits.set_row(2, array![1.0, 2.0, 3.0].view()),
            Err(ProjectionError::SpanOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_backfill() {
        let first = SentenceLogits::new(Array2::from_elem((2, 3), 1.0));
        let mut second = SentenceLogits::unfilled(2, 3);
        second.set_row(0, array![0.0, 5.0, 0.0].view()).unwrap();
        second.backfill_from(&first);
        assert_eq!(second.row(0).to_vec(), vec![0.0, 5.0, 0.0]);
        assert_eq!(second.row(1).to_vec(), vec![1.0, 1.0, 1.0]);
        assert_eq!(second.filled_count(), 2);
    }
}
