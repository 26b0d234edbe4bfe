/*!
This library projects BIO annotations across translated sentences, using word alignments between
a sentence and its translation. It covers the two directions of cross-lingual transfer:

* Translate-train: the gold tags of an annotated sentence are moved onto its translation, which
    becomes training data in the other language.
* Translate-test: a model tags the translation of a test sentence; its per-token logits are moved
    back onto the original sentence, optionally ensembled with the logits of a model run on the
    original sentence directly, and scored.

# Terminology
* A tag is an integer. `0` is `O`, an odd tag `t` begins an entity of type `t` and `t + 1`
    continues it. A `LabelMap` gives the name of every tag of a task.
* An entity is a run of positions sharing an entity type, found by `segment`. Stray inside tags
    are recovered leniently: they start an entity of their own.
* An alignment is a list of `(source, target)` position pairs, parsed from lines such as
    `0-0 1-2 2-1`. An `AlignmentIndex` maps every position of one side to the positions of the
    other side.
* Projecting an entity gives the span `[min, max]` of the positions its indices are aligned to.
    The `CompletenessPolicy` decides whether gaps on either side reject the projection.

# Example
```rust
use bioproj::{parse_alignment_line, project_tags, AlignmentIndex, CompletenessPolicy, Direction};

// "John lives in New York" -> "John wohnt in New York"
let tags = vec![1, 0, 0, 5, 6];
let pairs = parse_alignment_line("0-0 1-1 2-2 3-3 4-4").unwrap();
let index = AlignmentIndex::build(&pairs, Direction::Forward);
let projected = project_tags(&tags, &index, CompletenessPolicy::new(true, true), 5).unwrap();
assert_eq!(projected.output(), Some(tags));
```
*/

mod alignment;
mod config;
mod ensemble;
mod entity;
mod error;
mod io;
mod labels;
mod logits;
mod metrics;
mod pipeline;
mod projection;
mod reporter;
mod synthesis;
mod validation;

// The public api starts here
pub use alignment::{
    parse_alignment_line, swap_pairs, AlignmentIndex, AlignmentPair, AlignmentParseError,
    Direction,
};

pub use entity::{
    get_chunks_lenient, inside_of, segment, Entities, Entity, LabelChunk, LabelParsingError,
    SegmentIter, TagId, TagRole, OUTSIDE,
};

pub use projection::{
    map_entities, project, project_entity, CompletenessPolicy, EntityMapping, FailureMode,
    ProjectionError, ProjectionFailure, Projector, SentenceProjection, Span, SpanFill,
};

pub use synthesis::{
    continuation_logits, project_logits, project_tags, synthesize, LogitFill, TagFill,
};

pub use logits::{argmax, is_sentinel_row, placeholder_row, SentenceLogits, UNFILLED_SENTINEL};

pub use validation::{check_reconstruction, is_well_formed, reconstruct, validate_instance};

pub use ensemble::{ensemble, softmax_rows, FIRST_MODEL, SECOND_MODEL};

pub use labels::{LabelError, LabelMap};

pub use metrics::{
    classification_report, f1_score, precision_recall_fscore_support, ComputationError,
    DivByZeroStrat, ParsingDivByZeroStratError, PrecisionRecallFScoreTrueSum,
};

pub use reporter::{Average, AverageParsingError, ClassMetrics, OverallAverage, Reporter};

pub use config::{
    EvaluationConfig, EvaluationConfigBuilder, LogitProjectionConfig, LogitProjectionConfigBuilder,
    RetryPolicy, TagProjectionConfig, TagProjectionConfigBuilder,
};

pub use io::{
    load_jsonl, load_logits, load_logits_with_retry, load_text_lines, save_jsonl, save_logits,
    save_text_lines, Record,
};

pub use pipeline::{
    evaluate, evaluate_files, percentage, prepare_translate_test, prepare_translate_test_files,
    project_logit_files, project_logit_records, project_tag_files, project_tag_records,
    record_alignment, record_tags, record_tokens, Evaluation, LogitProjectionOutput,
    ProjectionSummary, TagProjectionOutput,
};

pub use error::{ArtifactLoadError, Error, InconsistentLengthError, RecordError, Result};
