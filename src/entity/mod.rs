/*!
Entities of integer BIO tag sequences. A tag is a non-negative integer: `0` is outside any entity,
an odd tag `t` begins an entity of type `t` and `t + 1` continues it. The parity of a tag is
enough to know its role.
*/
use ahash::AHashSet;
use std::fmt::Display;
use std::iter::Enumerate;
use std::ops::{Deref, DerefMut};
use std::slice::Iter;

pub(crate) mod chunks;

pub use chunks::{get_chunks_lenient, LabelChunk, LabelParsingError};

/// Integer BIO tag.
pub type TagId = u32;

/// The outside tag.
pub const OUTSIDE: TagId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Role of a tag inside an entity, derived from its parity.
pub enum TagRole {
    Outside,
    Begin,
    Inside,
}

impl TagRole {
    #[inline]
    pub fn of(tag: TagId) -> Self {
        if tag == OUTSIDE {
            TagRole::Outside
        } else if tag % 2 == 1 {
            TagRole::Begin
        } else {
            TagRole::Inside
        }
    }
}

/// The inside tag continuing an entity begun by `begin`, `None` when `begin` is the largest tag.
#[inline]
pub fn inside_of(begin: TagId) -> Option<TagId> {
    begin.checked_add(1)
}

/// An entity is a run of token positions plus its type, which is the tag found at its first
/// position. The positions are strictly increasing.
#[derive(Debug, Hash, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Entity {
    pub(crate) indices: Vec<usize>,
    pub(crate) tag: TagId,
}

impl Entity {
    pub fn new(indices: Vec<usize>, tag: TagId) -> Self {
        Entity { indices, tag }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Type of the entity. Usually a begin tag; an entity opened by an orphaned inside tag keeps
    /// that inside tag as its type.
    pub fn tag(&self) -> TagId {
        self.tag
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn first(&self) -> Option<usize> {
        self.indices.first().copied()
    }

    pub fn last(&self) -> Option<usize> {
        self.indices.last().copied()
    }
}

impl Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {:?})", self.tag, self.indices)
    }
}

/// This struct iterates over a *single* sequence of tags and returns the entities found in it,
/// from left to right.
pub struct SegmentIter<'a> {
    /// The tags on which we are iterating
    tags: Enumerate<Iter<'a, TagId>>,
    /// The entity being built, if any
    current: Option<Entity>,
}

impl<'a> SegmentIter<'a> {
    pub fn new(tags: &'a [TagId]) -> Self {
        SegmentIter {
            tags: tags.iter().enumerate(),
            current: None,
        }
    }
}

impl<'a> Iterator for SegmentIter<'a> {
    type Item = Entity;
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Some((i, &tag)) = self.tags.next() else {
                // no more tags: flush the open entity, if any
                return self.current.take();
            };
            match TagRole::of(tag) {
                TagRole::Outside => {
                    if let Some(entity) = self.current.take() {
                        return Some(entity);
                    }
                }
                TagRole::Begin => {
                    let previous = self.current.replace(Entity::new(vec![i], tag));
                    if previous.is_some() {
                        return previous;
                    }
                }
                TagRole::Inside => match self.current.as_mut() {
                    Some(entity) => entity.indices.push(i),
                    // Orphaned inside tag: it opens an entity instead of failing.
                    None => self.current = Some(Entity::new(vec![i], tag)),
                },
            }
        }
    }
}

/// Splits a tag sequence into its entities. An inside tag continues the open entity whatever
/// its type; an inside tag without an open entity starts a new one.
///
/// ```rust
/// use bioproj::{segment, Entity};
///
/// let entities = segment(&[0, 1, 2, 0, 2, 2]);
/// assert_eq!(
///     entities.to_vec(),
///     vec![Entity::new(vec![1, 2], 1), Entity::new(vec![4, 5], 2)]
/// );
/// ```
pub fn segment(tags: &[TagId]) -> Entities {
    Entities(SegmentIter::new(tags).collect())
}

#[derive(Debug, PartialEq, Eq, Clone, Default)]
/// Entities of a single sequence, ordered by their first position.
pub struct Entities(Vec<Entity>);

impl Deref for Entities {
    type Target = Vec<Entity>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Entities {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl IntoIterator for Entities {
    type Item = Entity;
    type IntoIter = std::vec::IntoIter<Entity>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<Entity> for Entities {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        Entities(iter.into_iter().collect())
    }
}

impl Entities {
    pub fn new(entities: Vec<Entity>) -> Self {
        Entities(entities)
    }

    /// Types of the entities, in order.
    pub fn types(&self) -> Vec<TagId> {
        self.iter().map(|e| e.tag).collect()
    }

    /// Number of entities of a given type.
    pub fn filter_count(&self, tag: TagId) -> usize {
        self.iter().filter(|e| e.tag == tag).count()
    }

    pub fn unique_tags(&self) -> AHashSet<TagId> {
        self.iter().map(|e| e.tag).collect()
    }

    /// Every position covered by an entity.
    pub fn positions(&self) -> AHashSet<usize> {
        self.iter().flat_map(|e| e.indices.iter().copied()).collect()
    }
}
