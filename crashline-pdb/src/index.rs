//! Lookup of the address range enclosing an address.

use crate::error::{FormatError, FormatErrorKind};

/// An address range `offset..offset + size`.
pub trait Fragment {
    /// The start of the range.
    fn offset(&self) -> u32;

    /// The length of the range in bytes.
    fn size(&self) -> u32;

    /// The exclusive end of the range.
    fn end(&self) -> u64 {
        u64::from(self.offset()) + u64::from(self.size())
    }
}

/// How [`IntervalIndex::build`] treats fragments covering the same range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Duplicates {
    /// Duplicates are treated like any other overlap and rejected.
    Reject,
    /// Consecutive fragments with identical offset and size collapse into the first one.
    Collapse,
}

/// A sorted set of disjoint fragments, searchable by address.
///
/// # Example
///
/// ```
/// use crashline_pdb::{Duplicates, Fragment, IntervalIndex};
///
/// struct Range(u32, u32);
///
/// impl Fragment for Range {
///     fn offset(&self) -> u32 { self.0 }
///     fn size(&self) -> u32 { self.1 }
/// }
///
/// let index = IntervalIndex::build(vec![Range(0x20, 8), Range(0x10, 4)], Duplicates::Reject).unwrap();
/// assert_eq!(index.query(0x12).map(|r| r.0), Some(0x10));
/// assert!(index.query(0x14).is_none());
/// ```
#[derive(Clone, Debug)]
pub struct IntervalIndex<T> {
    fragments: Vec<T>,
}

impl<T> Default for IntervalIndex<T> {
    fn default() -> Self {
        Self {
            fragments: Vec::new(),
        }
    }
}

impl<T: Fragment> IntervalIndex<T> {
    /// Sorts `fragments` by offset and verifies that they do not overlap.
    pub fn build(mut fragments: Vec<T>, duplicates: Duplicates) -> Result<Self, FormatError> {
        fragments.sort_by_key(|fragment| fragment.offset());

        if duplicates == Duplicates::Collapse {
            fragments.dedup_by(|current, prev| {
                current.offset() == prev.offset() && current.size() == prev.size()
            });
        }

        let mut last_end = 0;
        for fragment in &fragments {
            if u64::from(fragment.offset()) < last_end {
                return Err(FormatErrorKind::OverlappingFragments.into());
            }
            last_end = fragment.end();
        }

        Ok(Self { fragments })
    }

    /// Returns the fragment containing `addr`, if any.
    pub fn query(&self, addr: u32) -> Option<&T> {
        let position = self
            .fragments
            .partition_point(|fragment| fragment.offset() <= addr);
        let fragment = self.fragments.get(position.checked_sub(1)?)?;
        (u64::from(addr) < fragment.end()).then_some(fragment)
    }

    /// The fragments in ascending order.
    pub fn fragments(&self) -> &[T] {
        &self.fragments
    }

    /// The number of fragments.
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Returns `true` if there are no fragments.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct Range {
        offset: u32,
        size: u32,
        tag: u8,
    }

    impl Fragment for Range {
        fn offset(&self) -> u32 {
            self.offset
        }

        fn size(&self) -> u32 {
            self.size
        }
    }

    fn range(offset: u32, size: u32, tag: u8) -> Range {
        Range { offset, size, tag }
    }

    fn tag_at(index: &IntervalIndex<Range>, addr: u32) -> Option<u8> {
        index.query(addr).map(|r| r.tag)
    }

    #[test]
    fn test_query() {
        let index = IntervalIndex::build(
            vec![range(0x30, 0x10, 3), range(0x10, 0x10, 1), range(0x20, 0x08, 2)],
            Duplicates::Reject,
        )
        .unwrap();

        assert_eq!(tag_at(&index, 0x0f), None);
        assert_eq!(tag_at(&index, 0x10), Some(1));
        assert_eq!(tag_at(&index, 0x1f), Some(1));
        assert_eq!(tag_at(&index, 0x20), Some(2));
        assert_eq!(tag_at(&index, 0x27), Some(2));
        assert_eq!(tag_at(&index, 0x28), None);
        assert_eq!(tag_at(&index, 0x2f), None);
        assert_eq!(tag_at(&index, 0x30), Some(3));
        assert_eq!(tag_at(&index, 0x3f), Some(3));
        assert_eq!(tag_at(&index, 0x40), None);
        assert_eq!(tag_at(&index, u32::MAX), None);
    }

    #[test]
    fn test_query_before_first() {
        let index = IntervalIndex::build(vec![range(0x100, 0x1000, 1)], Duplicates::Reject).unwrap();
        assert_eq!(tag_at(&index, 0), None);
        assert_eq!(tag_at(&index, 0xff), None);
        assert_eq!(tag_at(&index, 0x100), Some(1));
    }

    #[test]
    fn test_empty() {
        let index = IntervalIndex::<Range>::build(Vec::new(), Duplicates::Collapse).unwrap();
        assert!(index.is_empty());
        assert_eq!(tag_at(&index, 0), None);
    }

    #[test]
    fn test_zero_sized() {
        let index = IntervalIndex::build(
            vec![range(0x10, 0, 1), range(0x10, 4, 2)],
            Duplicates::Reject,
        )
        .unwrap();
        assert_eq!(tag_at(&index, 0x10), Some(2));
    }

    #[test]
    fn test_overlap() {
        let err = IntervalIndex::build(
            vec![range(0x10, 0x10, 1), range(0x18, 0x10, 2)],
            Duplicates::Collapse,
        )
        .unwrap_err();
        assert_eq!(err.kind(), FormatErrorKind::OverlappingFragments);
    }

    #[test]
    fn test_duplicates() {
        let fragments = vec![range(0x10, 0x10, 1), range(0x10, 0x10, 2), range(0x20, 4, 3)];

        let err = IntervalIndex::build(fragments.clone(), Duplicates::Reject).unwrap_err();
        assert_eq!(err.kind(), FormatErrorKind::OverlappingFragments);

        let index = IntervalIndex::build(fragments, Duplicates::Collapse).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(tag_at(&index, 0x15), Some(1));
        assert_eq!(tag_at(&index, 0x22), Some(3));
    }

    #[test]
    fn test_end_of_address_space() {
        let index = IntervalIndex::build(
            vec![range(0xFFFF_FF00, 0x100, 1)],
            Duplicates::Reject,
        )
        .unwrap();
        assert_eq!(tag_at(&index, u32::MAX), Some(1));
    }
}
