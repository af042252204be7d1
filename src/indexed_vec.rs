use std::{
    fmt::Debug,
    hash::Hash,
    marker::PhantomData,
    ops::{Index, IndexMut},
    slice::{Iter, IterMut},
};

/// A dense arena whose slots are addressed by typed indices.
/// An `Idx<T>` can only index an `IndexedVec<T>`, so particle indices
/// cannot be mixed up with reaction or species indices.
#[derive(Debug, Clone)]
pub struct IndexedVec<T> {
    data: Vec<T>,
}

impl<T> Default for IndexedVec<T> {
    fn default() -> Self {
        IndexedVec { data: Vec::new() }
    }
}

impl<T> IndexedVec<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: T) -> Idx<T> {
        let idx = Idx::new(self.data.len());
        self.data.push(value);
        idx
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, T> {
        self.data.iter()
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        self.data.iter_mut()
    }

    /// Iterates over all valid indices, in insertion order.
    pub fn indices(&self) -> impl Iterator<Item = Idx<T>> {
        (0..self.data.len()).map(Idx::new)
    }
}

impl<T> Index<Idx<T>> for IndexedVec<T> {
    type Output = T;

    fn index(&self, index: Idx<T>) -> &Self::Output {
        &self.data[index.index]
    }
}

impl<T> IndexMut<Idx<T>> for IndexedVec<T> {
    fn index_mut(&mut self, index: Idx<T>) -> &mut Self::Output {
        &mut self.data[index.index]
    }
}

impl<'t, T> IntoIterator for &'t IndexedVec<T> {
    type Item = &'t T;

    type IntoIter = Iter<'t, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A stable index into an `IndexedVec<T>`.
pub struct Idx<T> {
    index: usize,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Idx<T> {
    pub const fn new(index: usize) -> Idx<T> {
        Idx {
            index,
            _phantom: PhantomData,
        }
    }

    pub const fn index(self) -> usize {
        self.index
    }
}

// The impls below are written by hand since deriving them would require `T` to implement them.

impl<T> PartialEq for Idx<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Idx<T> {}

impl<T> PartialOrd for Idx<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Idx<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> Hash for Idx<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> Clone for Idx<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Idx<T> {}

impl<T> Debug for Idx<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Idx({})", self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_returns_sequential_indices() {
        let mut vec = IndexedVec::new();
        let a = vec.push("a");
        let b = vec.push("b");
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(vec[b], "b");
        assert_eq!(vec.indices().collect::<Vec<_>>(), vec![a, b]);
    }
}
