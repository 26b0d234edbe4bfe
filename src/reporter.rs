/*!
This module gives a few tools to prettyprint the metrics of every class and the overall metrics.
*/
use enum_iterator::Sequence;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt::Display;
use std::hash::Hash;
use std::str::FromStr;
use thiserror::Error;

/// The reporter holds the metrics of every class and the overall metrics. It can be displayed as
/// if it were a dataframe. It is built with the `classification_report` function.
///
/// # Example
///
/// ```rust
/// use bioproj::{classification_report, DivByZeroStrat};
///
/// let y_true = vec![vec!["B-TEST", "B-NOTEST", "O", "B-TEST"]];
/// let y_pred = vec![vec!["O", "B-NOTEST", "B-OTHER", "B-TEST"]];
///
/// let reporter = classification_report(&y_true, &y_pred, DivByZeroStrat::ReplaceBy0, false).unwrap();
///
/// let report = reporter.to_string();
/// let mut lines = report.lines();
/// assert_eq!(lines.next(), Some("Class, Precision, Recall, Fscore, Support"));
/// assert!(lines.next().unwrap().starts_with("Overall_Weighted, 1, 0.6666667, 0.777777"));
/// assert_eq!(lines.next(), Some("Overall_Micro, 0.6666667, 0.6666667, 0.6666667, 3"));
/// assert_eq!(lines.next(), Some("Overall_Macro, 0.6666667, 0.5, 0.5555556, 3"));
/// assert_eq!(lines.next(), Some("NOTEST, 1, 1, 1, 1"));
/// assert_eq!(lines.next(), Some("OTHER, 0, 0, 0, 0"));
/// assert_eq!(lines.next(), Some("TEST, 1, 0.5, 0.6666667, 2"));
/// assert_eq!(lines.next(), None);
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Reporter {
    pub(crate) classes: BTreeSet<ClassMetrics>,
}

impl Reporter {
    pub(crate) fn insert(&mut self, metrics: ClassMetrics) -> bool {
        self.classes.insert(metrics)
    }

    /// Metrics of every class, overall averages first.
    pub fn iter(&self) -> impl Iterator<Item = &ClassMetrics> {
        self.classes.iter()
    }

    /// Overall metrics computed with `average`.
    pub fn overall(&self, average: OverallAverage) -> Option<&ClassMetrics> {
        let average = Average::from(average);
        self.classes.iter().find(|c| c.average == average)
    }

    /// Metrics of a single class.
    pub fn class(&self, class: &str) -> Option<&ClassMetrics> {
        self.classes
            .iter()
            .find(|c| c.average == Average::None && c.class == class)
    }
}

/// The Reporter struct acts as a dataframe when displayed.
impl Display for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Class, Precision, Recall, Fscore, Support")?;
        for v in self.classes.iter() {
            writeln!(f, "{}", v)?
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
/// Metrics of a single class, or of an overall average. They are identified by their class and
/// their average only, and they are displayed as the line of a dataframe.
pub struct ClassMetrics {
    /// The class, such as "PER", "LOC", or the name of the overall average
    pub class: String,
    /// The average used to compute this class' metrics
    pub average: Average,
    pub precision: f32,
    pub recall: f32,
    pub fscore: f32,
    pub support: usize,
}

impl ClassMetrics {
    pub(crate) fn new_class(
        class: &str,
        precision: f32,
        recall: f32,
        fscore: f32,
        support: usize,
    ) -> Self {
        ClassMetrics {
            class: String::from(class),
            average: Average::None,
            precision,
            recall,
            fscore,
            support,
        }
    }

    pub(crate) fn new_overall(
        average: OverallAverage,
        precision: f32,
        recall: f32,
        fscore: f32,
        support: usize,
    ) -> Self {
        ClassMetrics {
            class: average.to_string(),
            average: average.into(),
            precision,
            recall,
            fscore,
            support,
        }
    }
}

impl PartialEq for ClassMetrics {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class && self.average == other.average
    }
}
impl Eq for ClassMetrics {}

impl Hash for ClassMetrics {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.class.hash(state);
        self.average.hash(state)
    }
}

/// Overall averages come first (weighted, micro, macro), then the classes in alphabetical order.
impl Ord for ClassMetrics {
    fn cmp(&self, other: &Self) -> Ordering {
        self.average
            .rank()
            .cmp(&other.average.rank())
            .then_with(|| self.class.cmp(&other.class))
    }
}

impl PartialOrd for ClassMetrics {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The Classmetrics struct acts as a line in a dataframe when displayed.
impl Display for ClassMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}, {}",
            self.class, self.precision, self.recall, self.fscore, self.support
        )
    }
}

/// Enumeration of the different types of averaging supported by this crate. &str can be parsed
/// to create an `Average`.
#[derive(Debug, Hash, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum Average {
    None,
    Micro,
    Macro,
    Weighted,
}

impl Average {
    /// Position of the rows of this average in a report.
    fn rank(&self) -> u8 {
        match self {
            Average::Weighted => 0,
            Average::Micro => 1,
            Average::Macro => 2,
            Average::None => 3,
        }
    }
}

impl Display for Average {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Error)]
#[error("Impossible to parse the string ({0}) into an Average")]
pub struct AverageParsingError(String);

impl FromStr for Average {
    type Err = AverageParsingError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Average::None),
            "micro" => Ok(Average::Micro),
            "macro" => Ok(Average::Macro),
            "weighted" => Ok(Average::Weighted),
            _ => Err(AverageParsingError(String::from(s))),
        }
    }
}

#[derive(Debug, Hash, PartialEq, Eq, Copy, Clone, Serialize, Deserialize, Sequence)]
pub enum OverallAverage {
    Micro,
    Macro,
    Weighted,
}

impl Display for OverallAverage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let str_content = match self {
            Self::Micro => "Overall_Micro",
            Self::Macro => "Overall_Macro",
            Self::Weighted => "Overall_Weighted",
        };
        write!(f, "{}", str_content)
    }
}

impl From<OverallAverage> for Average {
    fn from(value: OverallAverage) -> Self {
        match value {
            OverallAverage::Micro => Average::Micro,
            OverallAverage::Macro => Average::Macro,
            OverallAverage::Weighted => Average::Weighted,
        }
    }
}
