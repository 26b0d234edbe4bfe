/*
 * This modules contains the configuration of the pipeline entry points. Every config implements
 * the default trait and comes with a builder, so that only the settings differing from the
 * defaults have to be given.
*/
use crate::metrics::DivByZeroStrat;
use crate::projection::CompletenessPolicy;
use either::Either as LeftOrRight;
use rand::Rng;
use std::fmt::Display;
use std::time::Duration;

/// How many times, and how patiently, an externally produced artifact is loaded before giving up.
/// Between two attempts, the loader sleeps a random whole number of seconds in
/// `1..=max_sleep`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub max_sleep: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, max_sleep: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            max_sleep,
        }
    }

    /// Single attempt, no sleeping.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Random delay before the next attempt.
    pub fn delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let max_secs = self.max_sleep.as_secs();
        if max_secs == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(rng.gen_range(1..=max_secs))
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(30, Duration::from_secs(30))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// Configuration of the projection of BIO tags from annotated source records onto their
/// translations.
pub struct TagProjectionConfig {
    /// Column holding the tokens of a record.
    pub text_column: String,
    /// Column holding the integer tags of a record.
    pub tag_column: String,
    pub policy: CompletenessPolicy,
    /// Drop the sentences whose projected tags do not count every entity type as many times as
    /// the source.
    pub complete_instance: bool,
    /// Process the sentences with multiple threads. The output order is preserved.
    pub parallel: bool,
}

impl Default for TagProjectionConfig {
    fn default() -> Self {
        Self {
            text_column: String::from("tokens"),
            tag_column: String::from("ner_tags"),
            policy: CompletenessPolicy::default(),
            complete_instance: false,
            parallel: false,
        }
    }
}

impl Display for TagProjectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let string = format!("Text column: {}\n Tag column: {}\n Complete source: {}\n Complete target: {}\n Complete instance: {}\n Using parallel computations: {}", self.text_column, self.tag_column, self.policy.complete_source, self.policy.complete_target, self.complete_instance, self.parallel);
        write!(f, "{}", string)
    }
}

/// This builder can be used to build and customize a `TagProjectionConfig` structure.
#[derive(Default)]
pub struct TagProjectionConfigBuilder {
    config: TagProjectionConfig,
}

impl TagProjectionConfigBuilder {
    pub fn text_column(mut self, column: impl Into<String>) -> Self {
        self.config.text_column = column.into();
        self
    }
    pub fn tag_column(mut self, column: impl Into<String>) -> Self {
        self.config.tag_column = column.into();
        self
    }
    pub fn complete_source(mut self, complete_source: bool) -> Self {
        self.config.policy.complete_source = complete_source;
        self
    }
    pub fn complete_target(mut self, complete_target: bool) -> Self {
        self.config.policy.complete_target = complete_target;
        self
    }
    pub fn complete_instance(mut self, complete_instance: bool) -> Self {
        self.config.complete_instance = complete_instance;
        self
    }
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }
    pub fn build(self) -> TagProjectionConfig {
        self.config
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// Configuration of the projection of model logits from translated sentences back onto the
/// original ones.
pub struct LogitProjectionConfig {
    /// Column holding the tokens the logits were predicted for.
    pub text_column: String,
    /// Column whose length gives the number of projected vectors of a record.
    pub label_column: String,
    /// Column holding the alignment pairs of a record.
    pub alignment_column: String,
    pub policy: CompletenessPolicy,
    /// An entity of a single origin token only writes the first position of its projected span.
    /// Longer entities still fill the rest of the span with a continuation vector.
    pub restrict_target: bool,
    /// Number of logit rows expected per record is at most `max_length`.
    pub max_length: Option<usize>,
    pub parallel: bool,
    pub retry: RetryPolicy,
}

impl Default for LogitProjectionConfig {
    fn default() -> Self {
        Self {
            text_column: String::from("tokens"),
            label_column: String::from("org_ner_tags"),
            alignment_column: String::from("alignment"),
            policy: CompletenessPolicy::default(),
            restrict_target: false,
            max_length: None,
            parallel: false,
            retry: RetryPolicy::default(),
        }
    }
}

impl Display for LogitProjectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let string = format!("Text column: {}\n Label column: {}\n Alignment column: {}\n Complete source: {}\n Complete target: {}\n Restrict target: {}\n Maximum length: {:?}\n Using parallel computations: {}\n Load attempts: {}", self.text_column, self.label_column, self.alignment_column, self.policy.complete_source, self.policy.complete_target, self.restrict_target, self.max_length, self.parallel, self.retry.max_attempts);
        write!(f, "{}", string)
    }
}

/// This builder can be used to build and customize a `LogitProjectionConfig` structure.
#[derive(Default)]
pub struct LogitProjectionConfigBuilder {
    config: LogitProjectionConfig,
}

impl LogitProjectionConfigBuilder {
    pub fn text_column(mut self, column: impl Into<String>) -> Self {
        self.config.text_column = column.into();
        self
    }
    pub fn label_column(mut self, column: impl Into<String>) -> Self {
        self.config.label_column = column.into();
        self
    }
    pub fn alignment_column(mut self, column: impl Into<String>) -> Self {
        self.config.alignment_column = column.into();
        self
    }
    pub fn complete_source(mut self, complete_source: bool) -> Self {
        self.config.policy.complete_source = complete_source;
        self
    }
    pub fn complete_target(mut self, complete_target: bool) -> Self {
        self.config.policy.complete_target = complete_target;
        self
    }
    pub fn restrict_target(mut self, restrict_target: bool) -> Self {
        self.config.restrict_target = restrict_target;
        self
    }
    pub fn max_length(mut self, max_length: Option<usize>) -> Self {
        self.config.max_length = max_length;
        self
    }
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }
    pub fn build(self) -> LogitProjectionConfig {
        self.config
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// Configuration of the evaluation of ensembled logits against gold labels.
pub struct EvaluationConfig {
    /// Column holding the gold integer tags.
    pub label_column: String,
    /// Positions the second model left unfilled take the vectors of the first model.
    pub replace_second_logits: bool,
    /// This parameter describe what to do when we encounter a division by zero when computing
    /// precision and recall.
    pub zero_division: DivByZeroStrat,
    /// Log the full classification report on top of the F1 score.
    pub report: bool,
    pub retry: RetryPolicy,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            label_column: String::from("org_ner_tags"),
            replace_second_logits: true,
            zero_division: DivByZeroStrat::ReplaceBy0,
            report: false,
            retry: RetryPolicy::default(),
        }
    }
}

impl Display for EvaluationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let string = format!("Label column: {}\n Replace second logits: {}\n Strategy when encountering a division by zero: {:?}\n Full report: {}\n Load attempts: {}", self.label_column, self.replace_second_logits, self.zero_division, self.report, self.retry.max_attempts);
        write!(f, "{}", string)
    }
}

/// This builder can be used to build and customize an `EvaluationConfig` structure.
pub struct EvaluationConfigBuilder<ZeroDiv>
where
    ZeroDiv: Into<DivByZeroStrat>,
{
    label_column: String,
    replace_second_logits: bool,
    zero_division: LeftOrRight<ZeroDiv, DivByZeroStrat>,
    report: bool,
    retry: RetryPolicy,
}

impl Default for EvaluationConfigBuilder<DivByZeroStrat> {
    fn default() -> Self {
        Self::new()
    }
}

impl<ZeroDiv> EvaluationConfigBuilder<ZeroDiv>
where
    ZeroDiv: Into<DivByZeroStrat>,
{
    pub fn label_column(mut self, column: impl Into<String>) -> Self {
        self.label_column = column.into();
        self
    }
    pub fn replace_second_logits(mut self, replace: bool) -> Self {
        self.replace_second_logits = replace;
        self
    }
    pub fn division_by_zero(mut self, division_by_zero: ZeroDiv) -> Self {
        self.zero_division = LeftOrRight::Left(division_by_zero);
        self
    }
    pub fn report(mut self, report: bool) -> Self {
        self.report = report;
        self
    }
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
    pub fn new() -> Self {
        let default = EvaluationConfig::default();
        Self {
            label_column: default.label_column,
            replace_second_logits: default.replace_second_logits,
            zero_division: LeftOrRight::Right(default.zero_division),
            report: default.report,
            retry: default.retry,
        }
    }
    pub fn build(self) -> EvaluationConfig {
        EvaluationConfig::from(self)
    }
}

impl<ZeroDiv> From<EvaluationConfigBuilder<ZeroDiv>> for EvaluationConfig
where
    ZeroDiv: Into<DivByZeroStrat>,
{
    fn from(value: EvaluationConfigBuilder<ZeroDiv>) -> Self {
        Self {
            label_column: value.label_column,
            replace_second_logits: value.replace_second_logits,
            zero_division: value.zero_division.either_into(),
            report: value.report,
            retry: value.retry,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ahash::AHashSet;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rstest::rstest;

    #[rstest]
    #[case(DivByZeroStrat::ReplaceBy1)]
    #[case(DivByZeroStrat::ReplaceBy0)]
    #[case(DivByZeroStrat::ReturnError)]
    fn test_builder_setters_division_by_zero(#[case] strat: DivByZeroStrat) {
        let builder = EvaluationConfigBuilder::default();
        let config = builder.division_by_zero(strat).build();
        assert_eq!(config.zero_division, strat)
    }

    #[test]
    fn test_evaluation_defaults() {
        let config = EvaluationConfigBuilder::default().build();
        assert_eq!(config, EvaluationConfig::default());
        assert!(config.replace_second_logits);
        assert_eq!(config.retry.max_attempts, 30);
    }

    #[test]
    fn test_evaluation_configs_are_hashable() {
        let strats = [
            DivByZeroStrat::ReplaceBy1,
            DivByZeroStrat::ReplaceBy0,
            DivByZeroStrat::ReturnError,
        ];
        let configs: AHashSet<EvaluationConfig> = strats
            .into_iter()
            .map(|strat| EvaluationConfigBuilder::default().division_by_zero(strat).build())
            .chain(std::iter::once(EvaluationConfig::default()))
            .collect();
        assert_eq!(configs.len(), 3);
    }

    #[rstest]
    #[case(true, false)]
    #[case(false, true)]
    #[case(true, true)]
    fn test_tag_builder_setters_policy(#[case] source: bool, #[case] target: bool) {
        let config = TagProjectionConfigBuilder::default()
            .complete_source(source)
            .complete_target(target)
            .build();
        assert_eq!(config.policy, CompletenessPolicy::new(source, target));
        assert_eq!(config.tag_column, "ner_tags");
    }

    #[test]
    fn test_logit_builder_setters() {
        let config = LogitProjectionConfigBuilder::default()
            .label_column("labels")
            .restrict_target(true)
            .max_length(Some(128))
            .retry(RetryPolicy::no_retry())
            .build();
        assert_eq!(config.label_column, "labels");
        assert_eq!(config.alignment_column, "alignment");
        assert!(config.restrict_target);
        assert_eq!(config.max_length, Some(128));
        assert_eq!(config.retry.max_attempts, 1);
    }

    #[test]
    fn test_retry_delay_is_bounded() {
        let mut rng = StdRng::seed_from_u64(7);
        let policy = RetryPolicy::default();
        for _ in 0..200 {
            let delay = policy.delay(&mut rng);
            assert!(delay >= Duration::from_secs(1) && delay <= Duration::from_secs(30));
        }
        assert_eq!(RetryPolicy::no_retry().delay(&mut rng), Duration::ZERO);
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
