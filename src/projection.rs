/*!
Projection of entities through an alignment.

[`project_entity`] maps the positions of one entity to the closed span of aligned positions on the
other side and applies the completeness policy. [`Projector`] runs it over every entity of a
sentence and hands each accepted span to a [`SpanFill`] strategy: tags for training data
(`synthesis::TagFill`), score vectors for predictions (`synthesis::LogitFill`).
*/
use crate::alignment::AlignmentIndex;
use crate::entity::{Entities, Entity, TagId};
use ahash::AHashSet;
use std::fmt::Display;
use std::ops::RangeInclusive;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
/// Completeness constraints applied to every projected entity.
pub struct CompletenessPolicy {
    /// Every origin position of the entity must be aligned.
    pub complete_source: bool,
    /// The aligned positions must form a span without gaps.
    pub complete_target: bool,
}

impl CompletenessPolicy {
    pub fn new(complete_source: bool, complete_target: bool) -> Self {
        Self {
            complete_source,
            complete_target,
        }
    }
}

/// Closed interval `start..=end` of destination positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    start: usize,
    end: usize,
}

impl Span {
    /// Returns `None` when `end < start`.
    pub fn new(start: usize, end: usize) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of positions in the span, never zero.
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn is_single(&self) -> bool {
        self.start == self.end
    }

    pub fn positions(&self) -> RangeInclusive<usize> {
        self.start..=self.end
    }

    /// Positions after the first one.
    pub fn continuation(&self) -> RangeInclusive<usize> {
        self.start + 1..=self.end
    }

    pub(crate) fn check_bounds(&self, len: usize) -> Result<(), ProjectionError> {
        if self.end < len {
            Ok(())
        } else {
            Err(ProjectionError::SpanOutOfBounds {
                start: self.start,
                end: self.end,
                len,
            })
        }
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Why an entity could not be projected. This is an expected outcome, recorded in statistics,
/// not an error.
pub enum ProjectionFailure {
    /// The origin position `index` has no alignment and the source must be complete.
    IncompleteSource { index: usize },
    /// No origin position of the entity is aligned.
    NothingToMap,
    /// The aligned positions leave gaps and the target must be complete.
    IncompleteTarget { missing: Vec<usize> },
}

impl ProjectionFailure {
    /// Failures breaking a completeness constraint. `NothingToMap` is not one of them.
    pub fn breaks_completeness(&self) -> bool {
        !matches!(self, ProjectionFailure::NothingToMap)
    }
}

impl Display for ProjectionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IncompleteSource { index } => {
                write!(f, "origin position {} is not aligned", index)
            }
            Self::NothingToMap => write!(f, "no origin position is aligned"),
            Self::IncompleteTarget { missing } => {
                write!(f, "aligned span misses positions {:?}", missing)
            }
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// Hard failure while writing a projected span.
pub enum ProjectionError {
    #[error("Span [{start}, {end}] does not fit in a sequence of length {len}")]
    SpanOutOfBounds { start: usize, end: usize, len: usize },
    #[error("Label {label} is out of range for {num_labels} labels")]
    LabelOutOfRange { label: usize, num_labels: usize },
    #[error("Expected {expected} scores per token, found {found}")]
    LabelCountMismatch { expected: usize, found: usize },
}

/// Projects the positions of a single entity.
///
/// Every origin position is looked up in `index`; the aligned positions are accumulated. An
/// unaligned origin position is skipped, unless `policy.complete_source` is set. The result is
/// the closed span between the smallest and the largest aligned position; with
/// `policy.complete_target`, the aligned positions must cover that span exactly.
///
/// ```rust
/// use bioproj::{parse_alignment_line, project_entity, AlignmentIndex, CompletenessPolicy, Direction};
///
/// let pairs = parse_alignment_line("0-0 1-0 2-1").unwrap();
/// let index = AlignmentIndex::build(&pairs, Direction::Forward);
/// let span = project_entity(&[0, 1, 2], &index, CompletenessPolicy::new(true, true)).unwrap();
/// assert_eq!((span.start(), span.end()), (0, 1));
/// ```
pub fn project_entity(
    indices: &[usize],
    index: &AlignmentIndex,
    policy: CompletenessPolicy,
) -> Result<Span, ProjectionFailure> {
    let mut aligned: AHashSet<usize> = AHashSet::default();
    for &origin in indices {
        match index.get(origin) {
            Some(positions) => aligned.extend(positions.iter().copied()),
            None if policy.complete_source => {
                return Err(ProjectionFailure::IncompleteSource { index: origin })
            }
            None => {}
        }
    }
    let (Some(&start), Some(&end)) = (aligned.iter().min(), aligned.iter().max()) else {
        return Err(ProjectionFailure::NothingToMap);
    };
    // `aligned` is a subset of `start..=end`: equal sizes means no gap.
    if policy.complete_target && aligned.len() != end - start + 1 {
        let missing = (start..=end).filter(|p| !aligned.contains(p)).collect();
        return Err(ProjectionFailure::IncompleteTarget { missing });
    }
    Ok(Span { start, end })
}

/// Same as [`project_entity`], forgetting the reason of a failure.
pub fn project(
    indices: &[usize],
    index: &AlignmentIndex,
    policy: CompletenessPolicy,
) -> Option<Span> {
    project_entity(indices, index, policy).ok()
}

/// An origin entity and where it landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMapping {
    pub origin_indices: Vec<usize>,
    pub origin_type: TagId,
    pub destination: Span,
}

impl EntityMapping {
    pub fn new(entity: &Entity, destination: Span) -> Self {
        Self {
            origin_indices: entity.indices().to_vec(),
            origin_type: entity.tag(),
            destination,
        }
    }
}

/// How an accepted span is written on the destination side.
pub trait SpanFill {
    type Output;

    /// Writes the projection of `entity` over `span`.
    fn fill(&mut self, entity: &Entity, span: Span) -> Result<(), ProjectionError>;

    /// Consumes the strategy and returns the destination sequence.
    fn finish(self) -> Self::Output;
}

/// Collects the mappings themselves.
impl SpanFill for Vec<EntityMapping> {
    type Output = Vec<EntityMapping>;

    fn fill(&mut self, entity: &Entity, span: Span) -> Result<(), ProjectionError> {
        self.push(EntityMapping::new(entity, span));
        Ok(())
    }

    fn finish(self) -> Self::Output {
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
/// What a failed entity does to its sentence.
pub enum FailureMode {
    /// A completeness failure corrupts the whole sentence. An entity with nothing to map is
    /// skipped.
    #[default]
    Sentence,
    /// Every failure is local to its entity, which is skipped.
    Entity,
}

/// Result of projecting every entity of a sentence.
#[derive(Debug, Clone, PartialEq)]
pub enum SentenceProjection<T> {
    Projected {
        output: T,
        /// Number of entities written on the destination side
        mapped: usize,
        /// Number of entities that could not be projected
        skipped: usize,
    },
    /// The sentence was dropped because of the failure of one of its entities.
    Corrupted(ProjectionFailure),
}

impl<T> SentenceProjection<T> {
    pub fn output(self) -> Option<T> {
        match self {
            Self::Projected { output, .. } => Some(output),
            Self::Corrupted(_) => None,
        }
    }

    pub fn is_corrupted(&self) -> bool {
        matches!(self, Self::Corrupted(_))
    }
}

/// Projects all the entities of a sentence through the same alignment.
#[derive(Debug, Clone, Copy)]
pub struct Projector<'a> {
    index: &'a AlignmentIndex,
    policy: CompletenessPolicy,
    mode: FailureMode,
}

impl<'a> Projector<'a> {
    pub fn new(index: &'a AlignmentIndex, policy: CompletenessPolicy, mode: FailureMode) -> Self {
        Self {
            index,
            policy,
            mode,
        }
    }

    /// Projects every entity, in order, and fills the accepted spans with `fill`.
    pub fn project_all<F: SpanFill>(
        &self,
        entities: &Entities,
        mut fill: F,
    ) -> Result<SentenceProjection<F::Output>, ProjectionError> {
        let mut mapped = 0;
        let mut skipped = 0;
        for entity in entities.iter() {
            match project_entity(entity.indices(), self.index, self.policy) {
                Ok(span) => {
                    fill.fill(entity, span)?;
                    mapped += 1;
                }
                Err(failure)
                    if self.mode == FailureMode::Sentence && failure.breaks_completeness() =>
                {
                    debug!("Entity {} corrupts its sentence: {}", entity, failure);
                    return Ok(SentenceProjection::Corrupted(failure));
                }
                Err(failure) => {
                    debug!("Skipping entity {}: {}", entity, failure);
                    skipped += 1;
                }
            }
        }
        Ok(SentenceProjection::Projected {
            output: fill.finish(),
            mapped,
            skipped,
        })
    }
}

/// Maps the entities of a sentence. `None` when one of them breaks the completeness policy.
pub fn map_entities(
    entities: &Entities,
    index: &AlignmentIndex,
    policy: CompletenessPolicy,
) -> Option<Vec<EntityMapping>> {
    Projector::new(index, policy, FailureMode::Sentence)
        .project_all(entities, Vec::new())
        .ok()
        .and_then(SentenceProjection::output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::{parse_alignment_line, AlignmentPair, Direction};
    use crate::entity::segment;
    use quickcheck::{QuickCheck, TestResult};
    use rstest::rstest;

    fn build_index(line: &str) -> AlignmentIndex {
        AlignmentIndex::build(&parse_alignment_line(line).unwrap(), Direction::Forward)
    }

    fn span(start: usize, end: usize) -> Span {
        Span::new(start, end).unwrap()
    }

    #[rstest]
    #[case("0-0 1-1 2-2", vec![1, 2], false, false, Ok(span(1, 2)))]
    #[case("0-0 1-0 2-1", vec![0, 1, 2], true, true, Ok(span(0, 1)))]
    #[case("0-0 2-3", vec![0, 2], false, false, Ok(span(0, 3)))]
    #[case("0-0 2-3", vec![0, 2], false, true, Err(ProjectionFailure::IncompleteTarget { missing: vec![1, 2] }))]
    #[case("0-0", vec![0, 1], false, false, Ok(span(0, 0)))]
    #[case("0-0", vec![0, 1], true, false, Err(ProjectionFailure::IncompleteSource { index: 1 }))]
    #[case("0-0", vec![3, 4], false, false, Err(ProjectionFailure::NothingToMap))]
    #[case("", vec![0], false, false, Err(ProjectionFailure::NothingToMap))]
    #[case("0-4 0-2", vec![0], false, false, Ok(span(2, 4)))]
    fn test_project_entity(
        #[case] line: &str,
        #[case] indices: Vec<usize>,
        #[case] complete_source: bool,
        #[case] complete_target: bool,
        #[case] expected: Result<Span, ProjectionFailure>,
    ) {
        let index = build_index(line);
        let policy = CompletenessPolicy::new(complete_source, complete_target);
        assert_eq!(project_entity(&indices, &index, policy), expected)
    }

    #[test]
    fn test_empty_entity_never_projects() {
        let index = build_index("0-0 1-1");
        for (s, t) in [(false, false), (true, false), (false, true), (true, true)] {
            assert_eq!(project(&[], &index, CompletenessPolicy::new(s, t)), None);
        }
    }

    #[test]
    fn test_span() {
        let s = span(2, 4);
        assert_eq!(s.len(), 3);
        assert!(!s.is_single());
        assert_eq!(s.continuation().collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(s.to_string(), "[2, 4]");
        assert_eq!(Span::new(3, 2), None);
        assert!(s.check_bounds(5).is_ok());
        assert!(s.check_bounds(4).is_err());
    }

    #[test]
    fn test_sentence_mode_corrupts_on_completeness_failure() {
        let index = build_index("0-0 3-3");
        let entities = segment(&[1, 0, 0, 3]);
        let projector =
            Projector::new(&index, CompletenessPolicy::new(true, false), FailureMode::Sentence);
        let res = projector.project_all(&entities, Vec::new()).unwrap();
        assert_eq!(
            res,
            SentenceProjection::Projected {
                output: vec![
                    EntityMapping {
                        origin_indices: vec![0],
                        origin_type: 1,
                        destination: span(0, 0)
                    },
                    EntityMapping {
                        origin_indices: vec![3],
                        origin_type: 3,
                        destination: span(3, 3)
                    },
                ],
                mapped: 2,
                skipped: 0
            }
        );
        let entities = segment(&[1, 2, 0, 3]);
        let res = projector.project_all(&entities, Vec::new()).unwrap();
        assert_eq!(
            res,
            SentenceProjection::Corrupted(ProjectionFailure::IncompleteSource { index: 1 })
        );
        assert!(map_entities(&entities, &index, CompletenessPolicy::new(true, false)).is_none());
    }

    #[test]
    fn test_sentence_mode_skips_nothing_to_map() {
        let index = build_index("0-0");
        let entities = segment(&[1, 0, 3, 4]);
        let mappings =
            map_entities(&entities, &index, CompletenessPolicy::new(false, true)).unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].destination, span(0, 0));
    }

    #[test]
    fn test_entity_mode_skips_every_failure() {
        let index = build_index("0-0 3-3");
        let entities = segment(&[1, 2, 0, 3]);
        let projector =
            Projector::new(&index, CompletenessPolicy::new(true, false), FailureMode::Entity);
        match projector.project_all(&entities, Vec::new()).unwrap() {
            SentenceProjection::Projected {
                output,
                mapped,
                skipped,
            } => {
                assert_eq!(mapped, 1);
                assert_eq!(skipped, 1);
                assert_eq!(output[0].origin_type, 3);
            }
            SentenceProjection::Corrupted(_) => panic!("entity mode never corrupts"),
        }
    }

    fn to_pairs(pairs: Vec<(u8, u8)>) -> Vec<AlignmentPair> {
        pairs
            .into_iter()
            .map(|(a, b)| ((a % 16) as usize, (b % 16) as usize))
            .collect()
    }

    #[test]
    fn test_propertie_complete_target_spans_have_no_gap() {
        fn no_gap(pairs: Vec<(u8, u8)>, indices: Vec<u8>) -> TestResult {
            let pairs = to_pairs(pairs);
            let index = AlignmentIndex::build(&pairs, Direction::Forward);
            let indices: Vec<usize> = indices.into_iter().map(|i| (i % 16) as usize).collect();
            let policy = CompletenessPolicy::new(false, true);
            match project(&indices, &index, policy) {
                None => TestResult::discard(),
                Some(span) => {
                    let aligned: AHashSet<usize> = indices
                        .iter()
                        .filter_map(|&i| index.get(i))
                        .flatten()
                        .copied()
                        .collect();
                    TestResult::from_bool(span.positions().all(|p| aligned.contains(&p)))
                }
            }
        }
        let mut qc = QuickCheck::new().tests(1000);
        qc.quickcheck(no_gap as fn(Vec<(u8, u8)>, Vec<u8>) -> TestResult)
    }

    #[test]
    fn test_propertie_complete_source_rejects_unaligned_positions() {
        fn rejects(pairs: Vec<(u8, u8)>, indices: Vec<u8>) -> TestResult {
            let pairs = to_pairs(pairs);
            let index = AlignmentIndex::build(&pairs, Direction::Forward);
            let indices: Vec<usize> = indices.into_iter().map(|i| (i % 16) as usize).collect();
            if indices.iter().all(|&i| index.contains(i)) {
                return TestResult::discard();
            }
            let policy = CompletenessPolicy::new(true, false);
            TestResult::from_bool(project(&indices, &index, policy).is_none())
        }
        let mut qc = QuickCheck::new().tests(1000);
        qc.quickcheck(rejects as fn(Vec<(u8, u8)>, Vec<u8>) -> TestResult)
    }
}
