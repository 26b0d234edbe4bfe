/*!
Word alignments between a source and a target sentence. An alignment line looks like
`"0-0 1-2 2-1"`: every whitespace separated token is a `source-target` pair of 0-based token
positions. Pairs are many-to-many and unordered.
*/
use ahash::AHashMap;
use enum_iterator::Sequence;
use std::num::ParseIntError;
use thiserror::Error;

/// A single `(source_position, target_position)` pair.
pub type AlignmentPair = (usize, usize);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// Could not parse an alignment token into a pair of positions.
pub enum AlignmentParseError {
    #[error("Alignment token `{0}` has no `-` delimiter")]
    MissingDelimiter(String),
    #[error("Alignment token `{token}` holds an invalid position: {source}")]
    InvalidIndex {
        token: String,
        #[source]
        source: ParseIntError,
    },
    #[error("Alignment token `{0}` does not contain exactly two positions")]
    TooManyParts(String),
}

/// Parses a single `a-b` token.
fn parse_pair(token: &str) -> Result<AlignmentPair, AlignmentParseError> {
    let mut parts = token.split('-');
    let (src, trg) = match (parts.next(), parts.next()) {
        (Some(src), Some(trg)) => (src, trg),
        _ => return Err(AlignmentParseError::MissingDelimiter(String::from(token))),
    };
    if parts.next().is_some() {
        return Err(AlignmentParseError::TooManyParts(String::from(token)));
    }
    let parse = |s: &str| {
        s.parse::<usize>()
            .map_err(|source| AlignmentParseError::InvalidIndex {
                token: String::from(token),
                source,
            })
    };
    Ok((parse(src)?, parse(trg)?))
}

/// Parses an alignment line into its pairs. A blank line is a sentence without any alignment and
/// yields an empty list.
///
/// ```rust
/// use bioproj::parse_alignment_line;
///
/// assert_eq!(parse_alignment_line("0-0 2-1").unwrap(), vec![(0, 0), (2, 1)]);
/// assert!(parse_alignment_line("   ").unwrap().is_empty());
/// assert!(parse_alignment_line("0-a").is_err());
/// ```
pub fn parse_alignment_line(line: &str) -> Result<Vec<AlignmentPair>, AlignmentParseError> {
    line.split_whitespace().map(parse_pair).collect()
}

/// Swaps the roles of source and target in every pair.
pub fn swap_pairs(pairs: &[AlignmentPair]) -> Vec<AlignmentPair> {
    pairs.iter().map(|&(src, trg)| (trg, src)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Sequence, Default)]
/// Which component of an alignment pair is used as the key of an `AlignmentIndex`.
pub enum Direction {
    /// source position -> target positions
    #[default]
    Forward,
    /// target position -> source positions
    Inverse,
}

impl Direction {
    #[inline]
    fn key_and_value(self, pair: AlignmentPair) -> (usize, usize) {
        match self {
            Direction::Forward => pair,
            Direction::Inverse => (pair.1, pair.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
/// Read-only lookup from the positions of one side to the sorted, deduplicated positions of the
/// other side. Built once per sentence pair.
pub struct AlignmentIndex {
    map: AHashMap<usize, Box<[usize]>>,
    direction: Direction,
}

impl AlignmentIndex {
    /// Groups the pairs by the side selected with `direction`. Both directions are built from
    /// the same pairs, never from one another.
    pub fn build(pairs: &[AlignmentPair], direction: Direction) -> Self {
        let mut grouped: AHashMap<usize, Vec<usize>> = AHashMap::default();
        for &pair in pairs {
            let (key, value) = direction.key_and_value(pair);
            grouped.entry(key).or_default().push(value);
        }
        let map = grouped
            .into_iter()
            .map(|(k, mut v)| {
                v.sort_unstable();
                v.dedup();
                (k, v.into_boxed_slice())
            })
            .collect();
        Self { map, direction }
    }

    /// Aligned positions of `position`. `None` means the position has no alignment at all.
    #[inline]
    pub fn get(&self, position: usize) -> Option<&[usize]> {
        self.map.get(&position).map(|v| v.as_ref())
    }

    pub fn contains(&self, position: usize) -> bool {
        self.map.contains_key(&position)
    }

    /// Number of aligned keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Aligned keys, in ascending order.
    pub fn keys(&self) -> Vec<usize> {
        let mut keys: Vec<usize> = self.map.keys().copied().collect();
        keys.sort_unstable();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enum_iterator::all;
    use quickcheck::{QuickCheck, TestResult};
    use rstest::rstest;

    #[rstest]
    #[case("0-0 1-1 2-2", vec![(0, 0), (1, 1), (2, 2)])]
    #[case("  3-1\t0-4 ", vec![(3, 1), (0, 4)])]
    #[case("", vec![])]
    #[case("   ", vec![])]
    #[case("1-0 1-0", vec![(1, 0), (1, 0)])]
    fn test_parse_alignment_line(#[case] line: &str, #[case] expected: Vec<AlignmentPair>) {
        assert_eq!(parse_alignment_line(line).unwrap(), expected)
    }

    #[test]
    fn test_parse_alignment_line_errors() {
        assert_eq!(
            parse_alignment_line("0-0 12"),
            Err(AlignmentParseError::MissingDelimiter(String::from("12")))
        );
        assert_eq!(
            parse_alignment_line("0-1-2"),
            Err(AlignmentParseError::TooManyParts(String::from("0-1-2")))
        );
        assert!(matches!(
            parse_alignment_line("0-x"),
            Err(AlignmentParseError::InvalidIndex { .. })
        ));
        // negative positions do not exist
        assert!(parse_alignment_line("-1-0").is_err());
        assert!(matches!(
            parse_alignment_line("0-"),
            Err(AlignmentParseError::InvalidIndex { .. })
        ));
    }

    #[test]
    fn test_build_sorts_and_deduplicates() {
        let pairs = vec![(0, 3), (0, 1), (0, 3), (2, 0), (1, 2)];
        let index = AlignmentIndex::build(&pairs, Direction::Forward);
        assert_eq!(index.get(0), Some(&[1, 3][..]));
        assert_eq!(index.get(1), Some(&[2][..]));
        assert_eq!(index.get(2), Some(&[0][..]));
        assert_eq!(index.get(3), None);
        assert_eq!(index.keys(), vec![0, 1, 2]);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_build_inverse() {
        let pairs = parse_alignment_line("0-0 1-0 2-1").unwrap();
        let index = AlignmentIndex::build(&pairs, Direction::Inverse);
        assert_eq!(index.direction(), Direction::Inverse);
        assert_eq!(index.get(0), Some(&[0, 1][..]));
        assert_eq!(index.get(1), Some(&[2][..]));
        assert!(!index.contains(2));
    }

    #[test]
    fn test_empty_alignment() {
        for direction in all::<Direction>() {
            let index = AlignmentIndex::build(&[], direction);
            assert!(index.is_empty());
            assert_eq!(index.get(0), None);
        }
    }

    #[test]
    fn test_propertie_direction_symmetry() {
        fn direction_symmetry(pairs: Vec<(u8, u8)>) -> TestResult {
            let pairs: Vec<AlignmentPair> = pairs
                .into_iter()
                .map(|(a, b)| (a as usize, b as usize))
                .collect();
            let inverse = AlignmentIndex::build(&pairs, Direction::Inverse);
            let swapped = AlignmentIndex::build(&swap_pairs(&pairs), Direction::Forward);
            TestResult::from_bool(inverse.map == swapped.map)
        }
        let mut qc = QuickCheck::new().tests(1000);
        qc.quickcheck(direction_symmetry as fn(Vec<(u8, u8)>) -> TestResult)
    }

    #[test]
    fn test_propertie_values_sorted_and_unique() {
        fn sorted_and_unique(pairs: Vec<(u8, u8)>) -> bool {
            let pairs: Vec<AlignmentPair> = pairs
                .into_iter()
                .map(|(a, b)| (a as usize, b as usize))
                .collect();
            let index = AlignmentIndex::build(&pairs, Direction::Forward);
            index
                .keys()
                .into_iter()
                .filter_map(|k| index.get(k))
                .all(|v| !v.is_empty() && v.windows(2).all(|w| w[0] < w[1]))
        }
        let mut qc = QuickCheck::new().tests(1000);
        qc.quickcheck(sorted_and_unique as fn(Vec<(u8, u8)>) -> bool)
    }
}
