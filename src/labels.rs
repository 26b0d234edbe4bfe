/*!
Label tables: the name of every integer tag of a task.

A table is data, loaded from a JSON file holding either an array of names indexed by id, or an
object mapping ids to names:

```json
["O", "B-PER", "I-PER"]
{"0": "O", "1": "B-PER", "2": "I-PER"}
```

Tag `0` must be `O`, and every odd tag `B-T` must be followed by `I-T`.
*/
use crate::entity::TagId;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("Could not read the label table {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not parse the label table: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Label table is empty")]
    Empty,
    #[error("Label id `{0}` is not a non-negative integer")]
    InvalidId(String),
    #[error("Label ids are not contiguous: id {0} is missing")]
    MissingId(usize),
    #[error("Label 0 must be `O`, found `{0}`")]
    NotOutside(String),
    #[error("Label {id} must be a begin label `B-<type>`, found `{found}`")]
    NotBegin { id: usize, found: String },
    #[error("Label {id} must be `{expected}`, found `{found}`")]
    BrokenPair {
        id: usize,
        expected: String,
        found: String,
    },
    #[error("Tag {id} has no name in a table of {len} labels")]
    UnknownTag { id: TagId, len: usize },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LabelTableFile {
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl LabelTableFile {
    fn into_names(self) -> Result<Vec<String>, LabelError> {
        match self {
            LabelTableFile::List(names) => Ok(names),
            LabelTableFile::Map(map) => {
                let mut by_id = BTreeMap::new();
                for (id, name) in map {
                    let id = id
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| LabelError::InvalidId(id.clone()))?;
                    by_id.insert(id, name);
                }
                by_id
                    .into_iter()
                    .enumerate()
                    .map(|(expected, (id, name))| {
                        if expected == id {
                            Ok(name)
                        } else {
                            Err(LabelError::MissingId(expected))
                        }
                    })
                    .collect()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    names: Vec<String>,
}

impl LabelMap {
    /// Validates and wraps a list of names indexed by tag.
    pub fn new(names: Vec<String>) -> Result<Self, LabelError> {
        let first = names.first().ok_or(LabelError::Empty)?;
        if first != "O" {
            return Err(LabelError::NotOutside(first.clone()));
        }
        for begin_id in (1..names.len()).step_by(2) {
            let begin = &names[begin_id];
            let entity_type = match begin.strip_prefix("B-") {
                Some(t) if !t.is_empty() => t,
                _ => {
                    return Err(LabelError::NotBegin {
                        id: begin_id,
                        found: begin.clone(),
                    })
                }
            };
            let expected = format!("I-{}", entity_type);
            let found = names.get(begin_id + 1).cloned().unwrap_or_default();
            if found != expected {
                return Err(LabelError::BrokenPair {
                    id: begin_id + 1,
                    expected,
                    found,
                });
            }
        }
        Ok(Self { names })
    }

    /// Table `O, B-t0, I-t0, B-t1, I-t1, ...` of the given entity types.
    pub fn from_entity_types<S: AsRef<str>>(types: &[S]) -> Self {
        let mut names = Vec::with_capacity(1 + 2 * types.len());
        names.push(String::from("O"));
        for t in types {
            names.push(format!("B-{}", t.as_ref()));
            names.push(format!("I-{}", t.as_ref()));
        }
        Self { names }
    }

    pub fn from_json_str(content: &str) -> Result<Self, LabelError> {
        let file: LabelTableFile = serde_json::from_str(content)?;
        Self::new(file.into_names()?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, LabelError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| LabelError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Number of labels, including `O`.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name(&self, id: TagId) -> Result<&str, LabelError> {
        self.names
            .get(id as usize)
            .map(String::as_str)
            .ok_or(LabelError::UnknownTag {
                id,
                len: self.len(),
            })
    }

    pub fn id(&self, name: &str) -> Option<TagId> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| i as TagId)
    }

    /// Entity types, in the order of their begin tags.
    pub fn entity_types(&self) -> Vec<&str> {
        self.names
            .iter()
            .skip(1)
            .step_by(2)
            .filter_map(|n| n.strip_prefix("B-"))
            .collect()
    }

    /// Names of a sequence of tags.
    pub fn decode(&self, tags: &[TagId]) -> Result<Vec<String>, LabelError> {
        tags.iter()
            .map(|&t| self.name(t).map(String::from))
            .collect()
    }
}

impl Display for LabelMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} labels ({} entity types): {}",
            self.len(),
            self.entity_types().len(),
            self.names.join(", ")
        )
    }
}
