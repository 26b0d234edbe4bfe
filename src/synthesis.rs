/*!
Writing projected entities on the destination side, either as integer BIO tags or as score
vectors.
*/
use crate::alignment::AlignmentIndex;
use crate::entity::{inside_of, segment, Entity, TagId, OUTSIDE};
use crate::logits::{argmax, SentenceLogits};
use crate::projection::{
    CompletenessPolicy, EntityMapping, FailureMode, ProjectionError, Projector, SentenceProjection,
    Span, SpanFill,
};
use ndarray::Array1;

/// Writes `tag` at the first position of `span` and its inside tag on the following ones.
fn write_span(tags: &mut [TagId], tag: TagId, span: Span) -> Result<(), ProjectionError> {
    span.check_bounds(tags.len())?;
    tags[span.start()] = tag;
    if !span.is_single() {
        let inside = inside_of(tag).ok_or(ProjectionError::LabelOutOfRange {
            label: tag as usize,
            num_labels: TagId::MAX as usize,
        })?;
        for position in span.continuation() {
            tags[position] = inside;
        }
    }
    Ok(())
}

/// Builds a tag sequence of length `len` from entity mappings. Positions outside of every mapping
/// are `0`. Mappings are written in order; a later mapping overwrites an earlier one on overlap.
///
/// ```rust
/// use bioproj::{synthesize, EntityMapping, Span};
///
/// let mapping = EntityMapping {
///     origin_indices: vec![0],
///     origin_type: 3,
///     destination: Span::new(1, 3).unwrap(),
/// };
/// assert_eq!(synthesize(&[mapping], 5).unwrap(), vec![0, 3, 4, 4, 0]);
/// ```
pub fn synthesize(mappings: &[EntityMapping], len: usize) -> Result<Vec<TagId>, ProjectionError> {
    let mut tags = vec![OUTSIDE; len];
    for mapping in mappings {
        write_span(&mut tags, mapping.origin_type, mapping.destination)?;
    }
    Ok(tags)
}

/// Fills accepted spans with BIO tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFill {
    tags: Vec<TagId>,
}

impl TagFill {
    /// All-outside destination of length `len`.
    pub fn new(len: usize) -> Self {
        Self {
            tags: vec![OUTSIDE; len],
        }
    }
}

impl SpanFill for TagFill {
    type Output = Vec<TagId>;

    fn fill(&mut self, entity: &Entity, span: Span) -> Result<(), ProjectionError> {
        write_span(&mut self.tags, entity.tag(), span)
    }

    fn finish(self) -> Self::Output {
        self.tags
    }
}

/// Score vector used on the positions of a destination span after the first one.
///
/// A multi-token entity continues with the vector of its last token. A single-token entity
/// predicting a begin tag `t` continues with a vector that is `0` everywhere except at `t` and
/// `t + 1`, where the two scores of the token are swapped, so that the inside tag wins. A
/// single-token entity predicting anything else continues with its own vector.
pub fn continuation_logits(
    source: &SentenceLogits,
    entity: &Entity,
) -> Result<Array1<f32>, ProjectionError> {
    let (Some(first), Some(last)) = (entity.first(), entity.last()) else {
        return Ok(Array1::zeros(source.num_labels()));
    };
    if entity.len() > 1 {
        return Ok(source.row(last).to_owned());
    }
    let row = source.row(first);
    let current = argmax(row);
    if current % 2 == 0 {
        return Ok(row.to_owned());
    }
    let inside = current + 1;
    if inside >= row.len() {
        return Err(ProjectionError::LabelOutOfRange {
            label: inside,
            num_labels: row.len(),
        });
    }
    let mut continuation = Array1::zeros(row.len());
    continuation[inside] = row[current];
    continuation[current] = row[inside];
    Ok(continuation)
}

/// Fills accepted spans with the score vectors of the origin sentence.
#[derive(Debug, Clone)]
pub struct LogitFill<'a> {
    source: &'a SentenceLogits,
    target: SentenceLogits,
    restrict_target: bool,
}

impl<'a> LogitFill<'a> {
    /// Destination of `len` unfilled positions, with as many labels as `source`. With
    /// `restrict_target`, a single-token entity only writes the first position of its span.
    pub fn new(source: &'a SentenceLogits, len: usize, restrict_target: bool) -> Self {
        Self {
            source,
            target: SentenceLogits::unfilled(len, source.num_labels()),
            restrict_target,
        }
    }
}

impl<'a> SpanFill for LogitFill<'a> {
    type Output = SentenceLogits;

    fn fill(&mut self, entity: &Entity, span: Span) -> Result<(), ProjectionError> {
        span.check_bounds(self.target.len())?;
        let Some(first) = entity.first() else {
            return Ok(());
        };
        self.target.set_row(span.start(), self.source.row(first))?;
        if self.restrict_target && entity.len() == 1 {
            return Ok(());
        }
        if !span.is_single() {
            let continuation = continuation_logits(self.source, entity)?;
            for position in span.continuation() {
                self.target.set_row(position, continuation.view())?;
            }
        }
        Ok(())
    }

    fn finish(self) -> Self::Output {
        self.target
    }
}

/// Projects a tag sequence onto a destination of length `len`. A completeness failure corrupts
/// the sentence; an entity with nothing to map is skipped.
pub fn project_tags(
    tags: &[TagId],
    index: &AlignmentIndex,
    policy: CompletenessPolicy,
    len: usize,
) -> Result<SentenceProjection<Vec<TagId>>, ProjectionError> {
    Projector::new(index, policy, FailureMode::Sentence).project_all(&segment(tags), TagFill::new(len))
}

/// Projects the predictions of `source` onto a destination of length `len`. Every entity fails
/// or succeeds on its own; positions no entity reaches stay unfilled.
pub fn project_logits(
    source: &SentenceLogits,
    index: &AlignmentIndex,
    policy: CompletenessPolicy,
    restrict_target: bool,
    len: usize,
) -> Result<SentenceProjection<SentenceLogits>, ProjectionError> {
    let entities = segment(&source.predictions());
    Projector::new(index, policy, FailureMode::Entity)
        .project_all(&entities, LogitFill::new(source, len, restrict_target))
}
