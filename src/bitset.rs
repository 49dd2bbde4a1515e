//! Compact bitset representation for taxon sets.
//!
//! # Overview
//! Every taxon of a supertree run gets a stable index, so any set of taxa
//! (a clade, the zeros of a character, one side of a cut) is a bitset.
//! Each bit position corresponds to a taxon index.
//!
//! # Example
//! For taxa [a, b, c, d] mapped to indices [0, 1, 2, 3]:
//! - Clade {a, c} → bitset `0b0101` (bits 0 and 2 set)
//! - Clade {b, c, d} → bitset `0b1110` (bits 1, 2, 3 set)

/// A compact bitset for representing a set of taxa.
///
/// Internally stores bits in `Vec<u64>` words to support arbitrarily many taxa.
/// Each u64 word holds 64 taxon indices. Two bitsets taking part in one
/// operation are expected to have the same number of words.
///
/// The derived `Ord` and `Hash` make bitsets usable as map keys, which is how
/// identical clades are merged into one character.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bitset(pub Vec<u64>);

impl Bitset {
    /// Creates a new bitset with all bits set to 0.
    ///
    /// # Parameters
    /// - `words`: Number of u64 words needed, see [`Bitset::words_for`]
    ///
    /// # Example
    /// ```
    /// # use rust_python_flipcut::bitset::Bitset;
    /// // For 100 taxa, need 2 words (128 bits)
    /// let bs = Bitset::zeros(2);
    /// assert_eq!(bs.0.len(), 2);
    /// assert!(bs.is_empty());
    /// ```
    pub fn zeros(words: usize) -> Self {
        Bitset(vec![0u64; words])
    }

    /// Number of words needed to hold `taxa` bits.
    ///
    /// ```
    /// # use rust_python_flipcut::bitset::Bitset;
    /// assert_eq!(Bitset::words_for(64), 1);
    /// assert_eq!(Bitset::words_for(65), 2);
    /// ```
    #[inline]
    pub fn words_for(taxa: usize) -> usize {
        taxa.div_ceil(64)
    }

    /// Builds a bitset from taxon indices.
    pub fn from_indices<I: IntoIterator<Item = usize>>(words: usize, indices: I) -> Self {
        let mut bs = Bitset::zeros(words);
        for idx in indices {
            bs.set(idx);
        }
        bs
    }

    /// Sets the bit at the given index to 1.
    ///
    /// # Example
    /// ```
    /// # use rust_python_flipcut::bitset::Bitset;
    /// let mut bs = Bitset::zeros(1);
    /// bs.set(0);
    /// bs.set(5);
    /// assert_eq!(bs.0[0], 0b00100001);
    /// ```
    #[inline]
    pub fn set(&mut self, idx: usize) {
        let word = idx >> 6;     // Equivalent to idx / 64
        let bit = idx & 63;      // Equivalent to idx % 64
        self.0[word] |= 1u64 << bit;
    }

    /// Clears the bit at the given index.
    #[inline]
    pub fn unset(&mut self, idx: usize) {
        self.0[idx >> 6] &= !(1u64 << (idx & 63));
    }

    /// Returns true if the taxon with index `idx` is in the set.
    ///
    /// ```
    /// # use rust_python_flipcut::bitset::Bitset;
    /// let bs = Bitset::from_indices(2, [3, 70]);
    /// assert!(bs.contains(70));
    /// assert!(!bs.contains(4));
    /// assert!(!bs.contains(500)); // out of range is simply absent
    /// ```
    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        self.0
            .get(idx >> 6)
            .is_some_and(|w| (w >> (idx & 63)) & 1 == 1)
    }

    /// Performs bitwise OR with another bitset (union operation).
    ///
    /// # Example
    /// ```
    /// # use rust_python_flipcut::bitset::Bitset;
    /// let mut left = Bitset::from_indices(1, [0]);
    /// let right = Bitset::from_indices(1, [1]);
    /// left.or_assign(&right);  // {0} ∪ {1} = {0, 1}
    /// assert_eq!(left.0[0], 0b11);
    /// ```
    #[inline]
    pub fn or_assign(&mut self, other: &Bitset) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a |= *b;
        }
    }

    /// Intersection in place: `self` becomes `self ∩ other`.
    #[inline]
    pub fn and_assign(&mut self, other: &Bitset) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a &= *b;
        }
    }

    /// Difference in place: `self` becomes `self \ other`.
    #[inline]
    pub fn and_not_assign(&mut self, other: &Bitset) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a &= !*b;
        }
    }

    /// Returns `self ∩ other` as a new bitset.
    pub fn intersection(&self, other: &Bitset) -> Bitset {
        let mut out = self.clone();
        out.and_assign(other);
        out
    }

    /// Returns `self \ other` as a new bitset.
    pub fn difference(&self, other: &Bitset) -> Bitset {
        let mut out = self.clone();
        out.and_not_assign(other);
        out
    }

    /// Returns true if both sets share at least one taxon.
    ///
    /// ```
    /// # use rust_python_flipcut::bitset::Bitset;
    /// let a = Bitset::from_indices(1, [0, 1]);
    /// let b = Bitset::from_indices(1, [1, 2]);
    /// let c = Bitset::from_indices(1, [3]);
    /// assert!(a.intersects(&b));
    /// assert!(!a.intersects(&c));
    /// ```
    #[inline]
    pub fn intersects(&self, other: &Bitset) -> bool {
        self.0.iter().zip(&other.0).any(|(a, b)| a & b != 0)
    }

    /// Returns true if every taxon of `self` is also in `other`.
    #[inline]
    pub fn is_subset(&self, other: &Bitset) -> bool {
        self.0.iter().zip(&other.0).all(|(a, b)| a & !b == 0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }

    /// Counts the number of set bits (population count).
    ///
    /// Returns how many taxa are in this set.
    ///
    /// # Example
    /// ```
    /// # use rust_python_flipcut::bitset::Bitset;
    /// let bs = Bitset::from_indices(1, [0, 2, 5]);
    /// assert_eq!(bs.count_ones(), 3);
    /// ```
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Lowest set index, if any.
    pub fn first_one(&self) -> Option<usize> {
        self.0
            .iter()
            .enumerate()
            .find(|(_, w)| **w != 0)
            .map(|(i, w)| (i << 6) + w.trailing_zeros() as usize)
    }

    /// Iterates over set indices in ascending order.
    ///
    /// ```
    /// # use rust_python_flipcut::bitset::Bitset;
    /// let bs = Bitset::from_indices(2, [64, 1, 3]);
    /// assert_eq!(bs.iter_ones().collect::<Vec<_>>(), vec![1, 3, 64]);
    /// ```
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(i, &word)| {
            let mut w = word;
            std::iter::from_fn(move || {
                if w == 0 {
                    return None;
                }
                let bit = w.trailing_zeros() as usize;
                w &= w - 1; // clear lowest set bit
                Some((i << 6) + bit)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_basic() {
        let mut bs = Bitset::zeros(1);
        bs.set(0);
        bs.set(2);
        assert_eq!(bs.0[0], 0b0101);
        bs.unset(0);
        assert_eq!(bs.0[0], 0b0100);
    }

    #[test]
    fn test_set_algebra() {
        let a = Bitset::from_indices(1, [0, 1, 2]);
        let b = Bitset::from_indices(1, [2, 3]);

        assert_eq!(a.intersection(&b), Bitset::from_indices(1, [2]));
        assert_eq!(a.difference(&b), Bitset::from_indices(1, [0, 1]));

        let mut u = a.clone();
        u.or_assign(&b);
        assert_eq!(u.count_ones(), 4);
        assert!(a.is_subset(&u));
        assert!(!u.is_subset(&a));
    }

    /// Visual example: the clades of a small input tree
    ///
    /// ```text
    ///           root
    ///          /    \
    ///        node1   d
    ///        /   \
    ///       a    node2
    ///            /   \
    ///           b     c
    /// ```
    ///
    /// Taxon mapping: a=0, b=1, c=2, d=3
    ///
    /// - node2: {b, c} → `0b0110`, zeros {a, d}
    /// - node1: {a, b, c} → `0b0111`, zeros {d}
    #[test]
    fn test_mini_tree_clades_and_zeros() {
        let tree_taxa = Bitset::from_indices(1, 0..4);

        let node2 = Bitset::from_indices(1, [1, 2]);
        let mut node1 = Bitset::from_indices(1, [0]);
        node1.or_assign(&node2);
        assert_eq!(node1.0[0], 0b0111);

        let zeros1 = tree_taxa.difference(&node1);
        assert_eq!(zeros1.iter_ones().collect::<Vec<_>>(), vec![3]);
        let zeros2 = tree_taxa.difference(&node2);
        assert_eq!(zeros2.iter_ones().collect::<Vec<_>>(), vec![0, 3]);
    }

    #[test]
    fn test_large_set() {
        let mut bs = Bitset::zeros(2);
        bs.set(0);
        bs.set(63);
        bs.set(64);
        bs.set(127);

        assert_eq!(bs.count_ones(), 4);
        assert_eq!(bs.first_one(), Some(0));
        assert_eq!(bs.iter_ones().collect::<Vec<_>>(), vec![0, 63, 64, 127]);

        bs.unset(0);
        bs.unset(63);
        assert_eq!(bs.first_one(), Some(64));
    }

    #[test]
    fn test_empty() {
        let bs = Bitset::zeros(3);
        assert!(bs.is_empty());
        assert_eq!(bs.first_one(), None);
        assert_eq!(bs.iter_ones().count(), 0);
    }
}
