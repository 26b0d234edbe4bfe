use bioproj::{
    classification_report, ensemble, project_logits, project_tags, AlignmentIndex,
    CompletenessPolicy, Direction, DivByZeroStrat, LabelMap, SentenceLogits, TagId, FIRST_MODEL,
    SECOND_MODEL,
};
use criterion::{criterion_group, criterion_main, Criterion};
use ndarray::Array2;
use pprof::criterion::{Output, PProfProfiler};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

const NUM_TYPES: TagId = 3;
const NUM_LABELS: usize = 1 + 2 * NUM_TYPES as usize;

struct Sentence {
    tags: Vec<TagId>,
    index: AlignmentIndex,
    target_len: usize,
}

/// Well formed BIO tags, and an alignment to a translation that shuffles nearby tokens.
fn build_corpus(size: usize, seed: u64) -> Vec<Sentence> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..size)
        .map(|_| {
            let len = rng.gen_range(5..40);
            let mut tags = Vec::with_capacity(len);
            while tags.len() < len {
                if rng.gen_bool(0.2) {
                    let begin = 2 * rng.gen_range(0..NUM_TYPES) + 1;
                    tags.push(begin);
                    for _ in 0..rng.gen_range(0..3) {
                        tags.push(begin + 1);
                    }
                } else {
                    tags.push(0);
                }
            }
            tags.truncate(len);
            let target_len = len + rng.gen_range(0..5);
            let pairs: Vec<(usize, usize)> = (0..len)
                .filter_map(|i| {
                    rng.gen_bool(0.9)
                        .then(|| (i, (i + rng.gen_range(0..3)).min(target_len - 1)))
                })
                .collect();
            let index = AlignmentIndex::build(&pairs, Direction::Forward);
            Sentence {
                tags,
                index,
                target_len,
            }
        })
        .collect()
}

fn logits_of(tags: &[TagId], rng: &mut StdRng) -> SentenceLogits {
    let mut scores = Array2::from_shape_fn((tags.len(), NUM_LABELS), |_| rng.gen_range(-1.0..1.0));
    for (i, &tag) in tags.iter().enumerate() {
        scores[[i, tag as usize]] += 4.0;
    }
    SentenceLogits::new(scores)
}

fn benchmark_tag_projection(c: &mut Criterion) {
    let corpus = build_corpus(10_000, 42);
    let policy = CompletenessPolicy::new(true, true);
    c.bench_function("tag_projection", |b| {
        b.iter(|| {
            corpus
                .iter()
                .map(|s| project_tags(&s.tags, &s.index, policy, s.target_len).unwrap())
                .filter(|p| !p.is_corrupted())
                .count()
        })
    });
}

fn benchmark_logit_projection(c: &mut Criterion) {
    let corpus = build_corpus(10_000, 43);
    let mut rng = StdRng::seed_from_u64(7);
    let logits: Vec<SentenceLogits> = corpus.iter().map(|s| logits_of(&s.tags, &mut rng)).collect();
    let policy = CompletenessPolicy::default();
    c.bench_function("logit_projection", |b| {
        b.iter(|| {
            corpus
                .iter()
                .zip(logits.iter())
                .map(|(s, l)| project_logits(l, &s.index, policy, true, s.target_len).unwrap())
                .count()
        })
    });
}

fn benchmark_ensemble_and_score(c: &mut Criterion) {
    let corpus = build_corpus(5_000, 44);
    let mut rng = StdRng::seed_from_u64(8);
    let first: Vec<SentenceLogits> = corpus.iter().map(|s| logits_of(&s.tags, &mut rng)).collect();
    let second: Vec<SentenceLogits> = corpus
        .iter()
        .map(|s| {
            let len = s.tags.len();
            // every other token of the translation is left unaligned
            let pairs: Vec<(usize, usize)> = (0..len).step_by(2).map(|i| (i, i)).collect();
            let index = AlignmentIndex::build(&pairs, Direction::Forward);
            let source = logits_of(&s.tags, &mut rng);
            project_logits(&source, &index, CompletenessPolicy::default(), false, len)
                .unwrap()
                .output()
                .unwrap()
        })
        .collect();
    let models = BTreeMap::from([(FIRST_MODEL, first), (SECOND_MODEL, second)]);
    let labels = LabelMap::from_entity_types(&["PER", "ORG", "LOC"]);
    let y_true: Vec<Vec<String>> = corpus.iter().map(|s| labels.decode(&s.tags).unwrap()).collect();
    c.bench_function("ensemble_and_score", |b| {
        b.iter(|| {
            let y_pred: Vec<Vec<String>> = ensemble(&models, true)
                .unwrap()
                .iter()
                .map(|p| labels.decode(p).unwrap())
                .collect();
            classification_report(&y_true, &y_pred, DivByZeroStrat::ReplaceBy0, false).unwrap()
        })
    });
}

criterion_group!(
    name=projection_benches;
    config = Criterion::default().sample_size(50).with_profiler(PProfProfiler::new(3000, Output::Flamegraph(None)));
    targets =
    benchmark_tag_projection,
    benchmark_logit_projection,
    benchmark_ensemble_and_score,
);
criterion_main!(projection_benches);
