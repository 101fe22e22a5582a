//! Powersort is a stable, comparison-based slice sort that derives a
//! nearly-optimal merge tree from the *node powers* of adjacent natural runs.
//! Runs are detected left to right, short runs are extended by a stable
//! binary insertion sort, and adjacent runs are combined by a TimSort-style
//! galloping merge. Compared to TimSort's heuristic merge rule, the
//! power-driven schedule has provably near-optimal merge cost on arbitrary
//! run-length profiles while keeping the same stability guarantee and API
//! shape.
//!
//! The crate exposes plain functions mirroring the standard library
//! ([`sort`], [`sort_by`], [`sort_by_key`]) plus variants that reuse a
//! caller-provided merge workspace ([`sort_with_buffer`],
//! [`sort_with_buffer_by`]). The engine itself, [`powersort::PowerSort`], is
//! configurable through type parameters: the node power computation, the run
//! extension sort, the merging method and the minimum run length.
//!
//! All entry points panic (before touching the slice) on invalid
//! configuration combinations, and from inside a merge with
//! `"comparison method violates its general contract"` if the comparator is
//! detected to be inconsistent with a total order. If the comparator panics,
//! the slice is left as some permutation of its original content.

pub mod insertionsort;
pub mod merging;
pub mod powersort;
pub mod timsort;


/// A trait to simplify the algorithm definitions
pub trait Sort {
    /// Whether the sort preserves the order of equal elements
    const IS_STABLE: bool;

    /// Sort the given slice with the given comparator
    fn sort_by<T, F: FnMut(&T, &T) -> std::cmp::Ordering>(slice: &mut [T], cmp: F);

    /// Sort the given slice by its natural order
    fn sort<T: Ord>(slice: &mut [T]) {
        Self::sort_by(slice, T::cmp);
    }
}

/// Defines a Sort that expects slices with a first partition already sorted
pub trait PostfixSort {
    /// Whether the sort preserves the order of equal elements
    const IS_STABLE: bool;

    /// Sort the given slice under the assumption, that `slice[..split_point]`
    /// is already sorted
    fn sort_by<T, F: FnMut(&T, &T) -> std::cmp::Ordering>(
        slice: &mut [T],
        split_point: usize,
        cmp: F,
    );
}

impl<S: PostfixSort> Sort for S {
    const IS_STABLE: bool = <Self as PostfixSort>::IS_STABLE;

    fn sort_by<T, F: FnMut(&T, &T) -> std::cmp::Ordering>(slice: &mut [T], cmp: F) {
        if slice.is_empty() {
            return;
        }

        <Self as PostfixSort>::sort_by(slice, 1, cmp);
    }
}

/// The engine behind the crate level sorting functions
pub type DefaultPowerSort = powersort::PowerSort;

/// Sorts the slice, stably.
///
/// See [`slice::sort`].
pub fn sort<T: Ord>(v: &mut [T]) {
    DefaultPowerSort::sort(v);
}

/// Sorts the slice with a comparator, stably.
///
/// See [`slice::sort_by`].
pub fn sort_by<T, F: FnMut(&T, &T) -> std::cmp::Ordering>(v: &mut [T], cmp: F) {
    DefaultPowerSort::sort_by(v, cmp);
}

/// Sorts the slice with a key extraction function, stably.
///
/// See [`slice::sort_by_key`].
pub fn sort_by_key<T, K: Ord, F: FnMut(&T) -> K>(v: &mut [T], mut f: F) {
    DefaultPowerSort::sort_by(v, |a, b| f(a).cmp(&f(b)));
}

/// Like [`sort`], merging through `work` as long as it is large enough.
///
/// Merges need room for the smaller of the two runs being combined. When
/// `work` is too small for a particular merge the engine falls back to an
/// owned allocation for that merge, so any workspace size is sound; a
/// workspace of `v.len() / 2` elements prevents all allocation.
pub fn sort_with_buffer<T: Ord>(v: &mut [T], work: &mut [std::mem::MaybeUninit<T>]) {
    sort_with_buffer_by(v, work, T::cmp);
}

/// Like [`sort_by`], merging through `work` as long as it is large enough.
///
/// See [`sort_with_buffer`] for the workspace sizing rule.
pub fn sort_with_buffer_by<T, F: FnMut(&T, &T) -> std::cmp::Ordering>(
    v: &mut [T],
    work: &mut [std::mem::MaybeUninit<T>],
    cmp: F,
) {
    DefaultPowerSort::sort_by_with_workspace(v, work, cmp);
}
