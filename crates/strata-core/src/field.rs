//! Field tags, the [`FieldRegistry`] interner and the [`FieldSet`] bitset.

use crate::id::FieldId;
use crate::layout::FieldLayout;
use indexmap::IndexMap;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Identity of a field: a name together with its exact layout.
///
/// Two tags are equal iff both the name and the layout (dimension kinds and
/// extents) match. Cloning is cheap; the name is shared.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldTag {
    name: Arc<str>,
    layout: FieldLayout,
}

impl FieldTag {
    /// Create a tag.
    pub fn new(name: impl AsRef<str>, layout: FieldLayout) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            layout,
        }
    }

    /// The field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The field layout.
    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }
}

impl fmt::Display for FieldTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.layout)
    }
}

/// Interns [`FieldTag`]s into dense [`FieldId`]s.
///
/// Ids are issued in first-seen order, so interning the same sequence of
/// tags always yields the same ids.
#[derive(Clone, Debug, Default)]
pub struct FieldRegistry {
    tags: IndexMap<FieldTag, ()>,
}

impl FieldRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id of `tag`, assigning the next free id if unseen.
    pub fn intern(&mut self, tag: &FieldTag) -> FieldId {
        if let Some(idx) = self.tags.get_index_of(tag) {
            return FieldId(idx as u32);
        }
        let (idx, _) = self.tags.insert_full(tag.clone(), ());
        FieldId(idx as u32)
    }

    /// Look up the id of an already interned tag.
    pub fn get(&self, tag: &FieldTag) -> Option<FieldId> {
        self.tags.get_index_of(tag).map(|idx| FieldId(idx as u32))
    }

    /// The tag behind an id.
    pub fn tag(&self, id: FieldId) -> Option<&FieldTag> {
        self.tags.get_index(id.index()).map(|(tag, _)| tag)
    }

    /// Interned tags whose name is `name` but whose layout differs from
    /// `layout`. Used to explain unmet dependencies.
    pub fn near_misses(&self, name: &str, layout: &FieldLayout) -> Vec<FieldTag> {
        self.tags
            .keys()
            .filter(|t| t.name() == name && t.layout() != layout)
            .cloned()
            .collect()
    }

    /// Number of interned tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether no tag has been interned.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Iterate `(id, tag)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (FieldId, &FieldTag)> {
        self.tags
            .keys()
            .enumerate()
            .map(|(idx, tag)| (FieldId(idx as u32), tag))
    }
}

/// Bitset over [`FieldId`]s.
///
/// The graph builder uses it for root membership; ids are dense, so a
/// couple of inline words cover most graphs without allocating.
#[derive(Clone, Debug, Default)]
pub struct FieldSet {
    words: SmallVec<[u64; 2]>,
}

fn slot(id: FieldId) -> (usize, u64) {
    let i = id.index();
    (i / 64, 1u64 << (i % 64))
}

impl FieldSet {
    /// The empty set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add `id`.
    pub fn insert(&mut self, id: FieldId) {
        let (w, mask) = slot(id);
        if self.words.len() <= w {
            self.words.resize(w + 1, 0);
        }
        self.words[w] |= mask;
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: FieldId) -> bool {
        let (w, mask) = slot(id);
        self.words.get(w).is_some_and(|word| word & mask != 0)
    }

    fn word(&self, w: usize) -> u64 {
        self.words.get(w).copied().unwrap_or(0)
    }

    /// Word-wise combination of two sets; trailing empty words are dropped
    /// so equal sets have equal representations.
    fn combine(&self, other: &Self, op: impl Fn(u64, u64) -> u64) -> Self {
        let n = self.words.len().max(other.words.len());
        let mut words: SmallVec<[u64; 2]> = (0..n).map(|w| op(self.word(w), other.word(w))).collect();
        while words.last() == Some(&0) {
            words.pop();
        }
        Self { words }
    }

    /// `self ∪ other`.
    pub fn union(&self, other: &Self) -> Self {
        self.combine(other, |a, b| a | b)
    }

    /// `self ∩ other`.
    pub fn intersection(&self, other: &Self) -> Self {
        self.combine(other, |a, b| a & b)
    }

    /// Members of `self` that are not in `other`.
    pub fn difference(&self, other: &Self) -> Self {
        self.combine(other, |a, b| a & !b)
    }

    /// Whether every member of `self` is in `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        self.difference(other).is_empty()
    }

    /// Whether the set has no members.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Members in ascending id order.
    pub fn iter(&self) -> FieldSetIter<'_> {
        FieldSetIter {
            words: &self.words,
            index: 0,
            current: self.word(0),
        }
    }
}

impl PartialEq for FieldSet {
    fn eq(&self, other: &Self) -> bool {
        let n = self.words.len().max(other.words.len());
        (0..n).all(|w| self.word(w) == other.word(w))
    }
}

impl Eq for FieldSet {}

impl FromIterator<FieldId> for FieldSet {
    fn from_iter<I: IntoIterator<Item = FieldId>>(iter: I) -> Self {
        let mut set = Self::empty();
        iter.into_iter().for_each(|id| set.insert(id));
        set
    }
}

impl<'a> IntoIterator for &'a FieldSet {
    type Item = FieldId;
    type IntoIter = FieldSetIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Ascending iterator over a [`FieldSet`].
pub struct FieldSetIter<'a> {
    words: &'a [u64],
    index: usize,
    current: u64,
}

impl Iterator for FieldSetIter<'_> {
    type Item = FieldId;

    fn next(&mut self) -> Option<FieldId> {
        while self.current == 0 {
            self.index += 1;
            self.current = *self.words.get(self.index)?;
        }
        let bit = self.current.trailing_zeros() as usize;
        self.current &= self.current - 1;
        Some(FieldId((self.index * 64 + bit) as u32))
    }
}
