/*!
Lenient chunking of *string* labels such as `"B-PER"`, the way seqeval does it in its default
mode. Used to score predicted label sequences against the reference ones.
*/
use enum_iterator::Sequence;
use std::fmt::Display;
use std::slice::Iter;
use thiserror::Error;

#[derive(Debug, PartialEq, Hash, Clone, Copy, Sequence, Eq)]
/// Prefix of a string label.
pub(crate) enum UserPrefix {
    I,
    O,
    B,
    E,
    S,
}

impl TryFrom<char> for UserPrefix {
    type Error = LabelParsingError;
    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value {
            'I' => Ok(Self::I),
            'O' => Ok(Self::O),
            'B' => Ok(Self::B),
            'E' => Ok(Self::E),
            'S' => Ok(Self::S),
            _ => Err(LabelParsingError::PrefixError(String::from(value))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Could not parse a string label into a prefix and a type.
pub enum LabelParsingError {
    #[error("Could not parse the following string into a Prefix: {0}")]
    PrefixError(String),
    #[error("Received an empty label")]
    EmptyLabel,
}

/// A label split into its prefix and its type. `"B-PER"` has the prefix `B` and the type `PER`.
/// A label without a type, such as `"O"`, gets the type `"_"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InnerLabel<'a> {
    prefix: UserPrefix,
    tag: &'a str,
}

impl<'a> InnerLabel<'a> {
    fn try_new(label: &'a str) -> Result<Self, LabelParsingError> {
        let mut chars = label.chars();
        let first = chars.next().ok_or(LabelParsingError::EmptyLabel)?;
        let prefix = UserPrefix::try_from(first)?;
        let rest = chars.as_str();
        let tag = match rest.split_once('-') {
            Some((_, tag)) => tag,
            None => rest,
        };
        let tag = if tag.is_empty() { "_" } else { tag };
        Ok(Self { prefix, tag })
    }
}

/// A chunk of a label sequence: positions `start..=end` share the type `tag`.
#[derive(Debug, Hash, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LabelChunk<'a> {
    pub start: usize,
    pub end: usize,
    pub tag: &'a str,
}

impl<'a> LabelChunk<'a> {
    pub(crate) fn new(start: usize, end: usize, tag: &'a str) -> Self {
        LabelChunk { start, end, tag }
    }
}

impl<'a> Display for LabelChunk<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.tag, self.start, self.end)
    }
}

/// Leniently retrieves the chunks of every sequence.
pub fn get_chunks_lenient<'a, S: AsRef<str>>(
    sequences: &'a [Vec<S>],
) -> Result<Vec<Vec<LabelChunk<'a>>>, LabelParsingError> {
    sequences
        .iter()
        .map(|seq| LenientChunkIter::new(seq).collect::<Result<Vec<_>, _>>())
        .collect()
}

/// This wrapper around the label iterator appends a single `"O"` at the end of its inner
/// iterator.
struct InnerLenientChunkIter<'a, S> {
    content: Iter<'a, S>,
    is_at_end: bool,
}

impl<'a, S: AsRef<str>> InnerLenientChunkIter<'a, S> {
    fn new(seq: &'a [S]) -> Self {
        InnerLenientChunkIter {
            content: seq.iter(),
            is_at_end: false,
        }
    }
}

impl<'a, S: AsRef<str>> Iterator for InnerLenientChunkIter<'a, S> {
    type Item = &'a str;
    fn next(&mut self) -> Option<Self::Item> {
        match self.content.next() {
            Some(v) => Some(v.as_ref()),
            None if self.is_at_end => None,
            None => {
                self.is_at_end = true;
                Some("O")
            }
        }
    }
}

/// This struct iterates over a *single* sequence and returns the chunks associated with it.
struct LenientChunkIter<'a, S> {
    /// The labels on which we are iterating
    inner: InnerLenientChunkIter<'a, S>,
    /// The prefix of the previous label (e.g. 'I')
    prev_prefix: UserPrefix,
    /// The type of the previous label (e.g. `"PER"`)
    prev_type: Option<&'a str>,
    begin_offset: usize,
    index: usize,
}

impl<'a, S: AsRef<str>> LenientChunkIter<'a, S> {
    fn new(sequence: &'a [S]) -> Self {
        LenientChunkIter {
            inner: InnerLenientChunkIter::new(sequence),
            prev_prefix: UserPrefix::O,
            prev_type: None,
            begin_offset: 0,
            index: 0,
        }
    }

    /// Checks if a chunk ended between the previous and current label.
    fn end_of_chunk(&self, current: &InnerLabel<'a>) -> bool {
        match (self.prev_prefix, current.prefix) {
            (UserPrefix::E, _) | (UserPrefix::S, _) => true,
            (UserPrefix::B, UserPrefix::B)
            | (UserPrefix::B, UserPrefix::S)
            | (UserPrefix::B, UserPrefix::O) => true,
            (UserPrefix::I, UserPrefix::B)
            | (UserPrefix::I, UserPrefix::S)
            | (UserPrefix::I, UserPrefix::O) => true,
            (prev_prefix, _) => {
                prev_prefix != UserPrefix::O && self.prev_type != Some(current.tag)
            }
        }
    }

    /// Checks if a chunk started between the previous and current label.
    fn start_of_chunk(&self, current: &InnerLabel<'a>) -> bool {
        match (self.prev_prefix, current.prefix) {
            (_, UserPrefix::B) | (_, UserPrefix::S) => true,
            (UserPrefix::E, UserPrefix::E) | (UserPrefix::E, UserPrefix::I) => true,
            (UserPrefix::S, UserPrefix::E) | (UserPrefix::S, UserPrefix::I) => true,
            (UserPrefix::O, UserPrefix::E) | (UserPrefix::O, UserPrefix::I) => true,
            (_, curr_prefix) => {
                curr_prefix != UserPrefix::O && self.prev_type != Some(current.tag)
            }
        }
    }
}

impl<'a, S: AsRef<str>> Iterator for LenientChunkIter<'a, S> {
    type Item = Result<LabelChunk<'a>, LabelParsingError>;
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let label = self.inner.next()?; // no more labels. We are done
            let current = match InnerLabel::try_new(label) {
                Ok(v) => v,
                Err(e) => {
                    self.index += 1;
                    return Some(Err(e));
                }
            };
            let mut ret = None;
            if self.end_of_chunk(&current) {
                if let Some(prev_type) = self.prev_type {
                    ret = Some(Ok(LabelChunk::new(
                        self.begin_offset,
                        self.index - 1,
                        prev_type,
                    )));
                }
            }
            if self.start_of_chunk(&current) {
                self.begin_offset = self.index;
            }
            self.prev_prefix = current.prefix;
            self.prev_type = Some(current.tag);
            self.index += 1;
            if ret.is_some() {
                return ret;
            }
        }
    }
}
