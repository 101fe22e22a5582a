//! Run boundary scans, the merge workspace and the [`MergingMethod`]s for
//! combining adjacent sorted runs of a slice.

pub mod galloping;

/// The number of consecutive wins that switches a merge into galloping mode,
/// and the initial value of the adaptive threshold.
pub const MIN_GALLOP: usize = 7;

/// Owned workspace capacity allocated up front when no workspace is lent,
/// bounded by half the slice length.
const INITIAL_WORKSPACE_CAPACITY: usize = 256;

/// Iterates through `iter` and returns the first element `current` with the
/// proceeding element `next`, such that `f(current, next) == true` and
/// returns `Some(current)`
///
/// If `f(current, next)` is never true, returns `Ok(None)`.
///
/// # Errors
///
/// Returns `Err` if `iter` returns `None` at the start
fn find_first_sequentially<T>(
    mut iter: impl Iterator<Item = T>,
    mut f: impl FnMut(&T, &T) -> bool,
) -> Result<Option<T>, ()> {
    let mut current = iter.next().ok_or(())?;

    for next in iter {
        if f(&current, &next) {
            return Ok(Some(current));
        } else {
            current = next;
        }
    }

    Ok(None)
}

/// Returns the largest `index`, such that `slice[..index]` is weakly
/// increasing under `cmp`
pub fn weakly_increasing_prefix_index<T, F: FnMut(&T, &T) -> std::cmp::Ordering>(
    slice: &[T],
    cmp: &mut F,
) -> usize {
    let iter = slice.iter().enumerate();

    // Find the index of the first element breaking the sequence
    match find_first_sequentially(iter, |&(_, current), &(_, next)| cmp(next, current).is_lt()) {
        // Found the index
        Ok(Some((index, _))) => index + 1,
        // Sequence is not found, the whole slice is one run
        Ok(None) => slice.len(),
        // Slice is empty
        Err(()) => 0,
    }
}

/// Returns the largest `index`, such that `slice[..index]` is strictly
/// decreasing under `cmp`
pub fn strictly_decreasing_prefix_index<T, F: FnMut(&T, &T) -> std::cmp::Ordering>(
    slice: &[T],
    cmp: &mut F,
) -> usize {
    let iter = slice.iter().enumerate();

    // Find the index of the first element breaking the sequence
    match find_first_sequentially(iter, |&(_, current), &(_, next)| cmp(next, current).is_ge()) {
        // Found the index
        Ok(Some((index, _))) => index + 1,
        // Sequence is not found, the whole slice is one run
        Ok(None) => slice.len(),
        // Slice is empty
        Err(()) => 0,
    }
}

/// Returns `(index, descending)` for the maximal monotone prefix of `slice`:
/// the largest `index` such that `slice[..index]` is either weakly increasing
/// (`descending == false`) or strictly decreasing (`descending == true`).
///
/// Equal neighbors always continue an increasing run, never a decreasing one,
/// so reversing a decreasing prefix cannot reorder equal elements.
///
/// A full-slice run costs exactly `slice.len() - 1` comparisons: the pair
/// that decides the direction is not compared again by the scan.
pub fn weakly_increasing_or_strictly_decreasing_index<
    T,
    F: FnMut(&T, &T) -> std::cmp::Ordering,
>(
    slice: &[T],
    cmp: &mut F,
) -> (usize, bool) {
    if slice.len() < 2 {
        return (slice.len(), false);
    }

    if cmp(&slice[1], &slice[0]).is_lt() {
        (1 + strictly_decreasing_prefix_index(&slice[1..], cmp), true)
    } else {
        (1 + weakly_increasing_prefix_index(&slice[1..], cmp), false)
    }
}

/// A counter shared between all sorts of the process, readable by external
/// measurement harnesses
#[cfg(feature = "counters")]
#[derive(Debug)]
pub struct GlobalCounter(std::sync::atomic::AtomicU64);

#[cfg(feature = "counters")]
impl GlobalCounter {
    pub const fn new() -> Self {
        Self(std::sync::atomic::AtomicU64::new(0))
    }

    pub fn increase(&self, amount: u64) {
        self.0
            .fetch_add(amount, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn read_and_reset(&self) -> u64 {
        self.0.swap(0, std::sync::atomic::Ordering::Relaxed)
    }
}

/// Total merge cost, the summed length of all merged regions
#[cfg(feature = "counters")]
pub static MERGE_COST_COUNTER: GlobalCounter = GlobalCounter::new();

/// Total workspace capacity allocated by [`MergeBuffer`]s
#[cfg(feature = "counters")]
pub static ALLOC_COUNTER: GlobalCounter = GlobalCounter::new();

/// The merge workspace: an optional caller-lent slice of uninitialized
/// memory, backed by an owned allocation that grows on demand.
///
/// A request is served from the lent slice whenever it is large enough.
/// Otherwise the owned storage serves it, growing to the next power of two
/// bounded by `limit` (half the sorted range for the galloping merge); the
/// old storage is discarded, never copied, since every merge writes the
/// workspace before reading it.
pub struct MergeBuffer<'w, T> {
    lent: &'w mut [std::mem::MaybeUninit<T>],
    owned: Vec<T>,
    limit: usize,
}

impl<'w, T> MergeBuffer<'w, T> {
    fn owned_for(n: usize, limit: usize) -> Vec<T> {
        let initial = if n < 2 * INITIAL_WORKSPACE_CAPACITY {
            n / 2
        } else {
            INITIAL_WORKSPACE_CAPACITY
        }
        .min(limit);

        #[cfg(feature = "counters")]
        ALLOC_COUNTER.increase(initial as u64);

        Vec::with_capacity(initial)
    }

    /// Returns a workspace of at least `min_cap` elements, growing the owned
    /// storage if neither it nor the lent slice suffices
    pub fn ensure_capacity(&mut self, min_cap: usize) -> &mut [std::mem::MaybeUninit<T>] {
        if self.lent.len() >= min_cap {
            return &mut *self.lent;
        }

        if self.owned.capacity() < min_cap {
            let new_capacity = min_cap
                .checked_next_power_of_two()
                .unwrap_or(min_cap)
                .min(self.limit)
                .max(min_cap);

            #[cfg(feature = "counters")]
            ALLOC_COUNTER.increase(new_capacity as u64);

            self.owned = Vec::with_capacity(new_capacity);
        }

        self.owned.spare_capacity_mut()
    }
}

/// Merge state owned by the engine for the duration of one sort call: the
/// workspace and the adaptive galloping threshold, which is carried across
/// all merges of the call.
pub struct MergeState<'w, T> {
    /// The merge workspace
    pub buffer: MergeBuffer<'w, T>,
    /// Adaptive galloping threshold, see [`galloping::Galloping`]
    pub min_gallop: usize,
}

impl<'w, T> MergeState<'w, T> {
    /// Create a state for sorting a slice of length `n`, with workspace
    /// growth bounded by `limit` (see [`MergingMethod::required_capacity`])
    pub fn new(n: usize, limit: usize) -> Self {
        MergeState {
            buffer: MergeBuffer {
                lent: &mut [],
                owned: MergeBuffer::owned_for(n, limit),
                limit,
            },
            min_gallop: MIN_GALLOP,
        }
    }
}

impl<'w, T> MergeState<'w, T> {
    /// Create a state merging through the caller-lent `work` slice, falling
    /// back to owned storage for merges it is too small for
    pub fn with_workspace(work: &'w mut [std::mem::MaybeUninit<T>], limit: usize) -> Self {
        MergeState {
            buffer: MergeBuffer {
                lent: work,
                owned: Vec::new(),
                limit,
            },
            min_gallop: MIN_GALLOP,
        }
    }
}

/// Specifies ways to merge two adjacent sorted runs in a slice
pub trait MergingMethod {
    /// Whether the merging method is stable
    const IS_STABLE: bool;

    /// Merge the two sorted runs `0..run_length` and `run_length..slice.len()`
    fn merge<T, F: FnMut(&T, &T) -> std::cmp::Ordering>(
        slice: &mut [T],
        run_length: usize,
        state: &mut MergeState<'_, T>,
        cmp: &mut F,
    );

    /// The workspace capacity sufficient for any merge within a slice of
    /// length `size`; used as the growth bound of the [`MergeBuffer`]
    fn required_capacity(size: usize) -> usize {
        size
    }
}

/// A [`MergingMethod`] implementation via a simple merging procedure: both
/// runs are merged into the workspace and copied back.
///
/// Needs a workspace as large as the merged region, and never gallops. It
/// serves as the straightforward reference model for [`galloping::Galloping`].
#[derive(Debug, Clone, Copy)]
pub struct CopyBoth;

impl MergingMethod for CopyBoth {
    const IS_STABLE: bool = true;

    fn merge<T, F: FnMut(&T, &T) -> std::cmp::Ordering>(
        slice: &mut [T],
        run_length: usize,
        state: &mut MergeState<'_, T>,
        cmp: &mut F,
    ) {
        #[cfg(feature = "counters")]
        MERGE_COST_COUNTER.increase(slice.len() as u64);

        if slice.is_empty() {
            return;
        }

        assert!(
            (0..slice.len()).contains(&run_length),
            "Split point needs to be in bounds"
        );

        let buffer = state.buffer.ensure_capacity(slice.len());

        let mut output = buffer.as_mut_ptr();
        let (left, right) = slice.split_at(run_length);
        let std::ops::Range {
            start: mut left_start,
            end: left_end,
        } = left.as_ptr_range();
        let std::ops::Range {
            start: mut right_start,
            end: right_end,
        } = right.as_ptr_range();

        // NOTE: We copy after the merging as opposed to before, to prevent
        // inconsistent state which could occur when panicking on merging into
        // slice

        // SAFETY: All pointers from slice are kept in bounds of their
        // respective range. Since buffer.len() >= slice.len() and in total
        // slice.len() elements are written into buffer one by one, these
        // accesses are guaranteed to be in bounds as well. The writing is
        // valid since MaybeUninit<T> has the same layout, size and ABI as T
        // and elements in [T] are laid out sequentially in memory.
        //
        // Additionally each element is written into buffer exactly once, so
        // that buffer ends up as a permutation of slice.
        unsafe {
            // Repeatedly copy the smaller element of both runs into the buffer
            while left_start != left_end && right_start != right_end {
                if cmp(&*right_start, &*left_start).is_lt() {
                    output.copy_from_nonoverlapping(
                        right_start as *const std::mem::MaybeUninit<T>,
                        1,
                    );
                    right_start = right_start.add(1);
                } else {
                    output
                        .copy_from_nonoverlapping(left_start as *const std::mem::MaybeUninit<T>, 1);
                    left_start = left_start.add(1);
                }

                output = output.add(1);
            }

            // Copy the rest of the remaining run into the buffer
            while left_start < left_end {
                output.copy_from_nonoverlapping(left_start as *const std::mem::MaybeUninit<T>, 1);
                left_start = left_start.add(1);
                output = output.add(1);
            }
            while right_start < right_end {
                output.copy_from_nonoverlapping(right_start as *const std::mem::MaybeUninit<T>, 1);
                right_start = right_start.add(1);
                output = output.add(1);
            }
        }

        // SAFETY: Since buffer now contains a permutation of slice, we can
        // safely copy it over to slice, again regarding the same layout
        // invariant for T and MaybeUninit<T>. (see above)
        unsafe {
            std::ptr::copy_nonoverlapping(
                buffer.as_ptr() as *const T,
                slice.as_mut_ptr(),
                slice.len(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::galloping::Galloping;
    use super::*;

    use rand::{Rng as _, RngCore as _};

    /// How big the test arrays should be
    const TEST_SIZE: usize = 1000;
    /// How many times to run each test
    const TEST_RUNS: usize = 200;

    macro_rules! test_methods {
        ($($method:ident),*) => {
            $(
                paste::paste! {
                    mod [< $method:snake >] {
                        use super::*;

                        test_methods!(@single $method);
                    }
                }
            )*
        };
        (@single $method:ident) => {
            #[test]
            fn test_empty_merges() {
                test_empty_merge::<$method>();
            }

            #[test]
            fn test_correct_merges() {
                test_correct_merge::<$method>();
            }

            #[test]
            fn test_correct_stable_merges() {
                if <$method>::IS_STABLE {
                    test_correct_stable_merge::<$method>();
                }
            }

            #[test]
            fn test_soundness_merges() {
                test_soundness_merge::<$method>();
            }
        };
    }

    test_methods!(CopyBoth, Galloping);

    fn fresh_state<T>() -> MergeState<'static, T> {
        MergeState::new(TEST_SIZE, TEST_SIZE)
    }

    /// Test merging an empty slice
    fn test_empty_merge<M: MergingMethod>() {
        let mut elements: [u32; 0] = [];
        let mut state = fresh_state();

        // This should not panic nor cause UB
        M::merge(&mut elements, 0, &mut state, &mut u32::cmp);
    }

    /// Test that two runs are correctly merged
    fn test_correct_merge<M: MergingMethod>() {
        let mut rng = crate::test::test_rng();
        let mut state = fresh_state();

        let mut split_points: Vec<usize> = (0..TEST_RUNS)
            .map(|_| rng.random_range(0..TEST_SIZE))
            .collect();
        // Degenerate splits
        split_points.extend([0, 1, TEST_SIZE - 1]);

        for split in split_points {
            let mut elements: Box<[usize]> = (0..TEST_SIZE)
                .map(|_| rng.random_range(0..usize::MAX))
                .collect();
            elements[..split].sort();
            elements[split..].sort();

            let mut expected = elements.clone();
            expected.sort();

            M::merge(&mut elements, split, &mut state, &mut usize::cmp);

            assert_eq!(
                elements,
                expected,
                "Merge by {name} incorrect with split {split}",
                name = std::any::type_name::<M>(),
            );
        }
    }

    /// Test that two runs are correctly merged and the ordering of equal
    /// elements remains stable
    fn test_correct_stable_merge<M: MergingMethod>() {
        let mut rng = crate::test::test_rng();
        let mut state = fresh_state();

        let mut split_points: Vec<usize> = (0..TEST_RUNS)
            .map(|_| rng.random_range(0..TEST_SIZE))
            .collect();
        split_points.extend([0, 1, TEST_SIZE - 1]);

        for split in split_points {
            let mut elements: Box<[_]> = crate::test::IndexedOrdered::map_iter(
                (0..TEST_SIZE).map(|_| rng.random_range(0..TEST_SIZE / 4)),
            )
            .collect();
            elements[..split].sort();
            elements[split..].sort();

            M::merge(&mut elements, split, &mut state, &mut Ord::cmp);

            assert!(
                crate::test::IndexedOrdered::is_stable_sorted(&elements),
                "Merge by {name} unstable with split {split}\n{elements:?}",
                name = std::any::type_name::<M>(),
            );
        }
    }

    /// Run merging methods with [`crate::test::RandomOrdered`] elements and
    /// [`crate::test::MaybePanickingOrdered`] elements, mostly useful for
    /// running under miri
    fn test_soundness_merge<M: MergingMethod>() {
        let mut rng = crate::test::test_rng();

        for _ in 0..TEST_RUNS / 4 {
            // RandomOrdered elements, possibly tripping the comparator
            // contract detection
            let mut elements: Box<[crate::test::RandomOrdered]> =
                crate::test::RandomOrdered::new_iter(rng.next_u64())
                    .take(TEST_SIZE)
                    .collect();
            let split = rng.random_range(0..TEST_SIZE);

            let mut state = fresh_state();
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                M::merge(&mut elements, split, &mut state, &mut Ord::cmp);
            }));

            drop(elements);

            // MaybePanickingOrdered elements over presorted runs
            let mut values: Box<[u32]> = std::iter::repeat_with(|| rng.random())
                .take(TEST_SIZE)
                .collect();
            let split = rng.random_range(0..TEST_SIZE);
            values[..split].sort();
            values[split..].sort();

            let mut expected: Vec<u32> = values.to_vec();
            expected.sort();

            let mut elements: Box<[crate::test::MaybePanickingOrdered<TEST_SIZE, u32>]> =
                crate::test::MaybePanickingOrdered::map_iter(values.into_iter(), rng.next_u64())
                    .collect();

            let mut state = fresh_state();
            // The types are not actually unwind safe but must not trigger UB
            // anyway
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                M::merge(&mut elements, split, &mut state, &mut Ord::cmp);
            }));

            // Every element survives a comparator panic exactly once
            let mut survivors: Vec<u32> =
                elements.iter().map(|element| *element.inner()).collect();
            survivors.sort();
            assert_eq!(survivors, expected);

            drop(elements);
        }
    }

    #[test]
    fn run_scans() {
        let cmp = &mut u32::cmp;

        assert_eq!(weakly_increasing_prefix_index(&[], cmp), 0);
        assert_eq!(weakly_increasing_prefix_index(&[1], cmp), 1);
        assert_eq!(weakly_increasing_prefix_index(&[1, 1, 2, 1], cmp), 3);
        assert_eq!(weakly_increasing_prefix_index(&[2, 1], cmp), 1);

        assert_eq!(strictly_decreasing_prefix_index(&[3, 2, 2, 1], cmp), 2);
        assert_eq!(strictly_decreasing_prefix_index(&[3, 2, 1], cmp), 3);
    }

    #[test]
    fn combined_run_scan() {
        let cmp = &mut u32::cmp;

        assert_eq!(
            weakly_increasing_or_strictly_decreasing_index(&[], cmp),
            (0, false)
        );
        assert_eq!(
            weakly_increasing_or_strictly_decreasing_index(&[1], cmp),
            (1, false)
        );
        assert_eq!(
            weakly_increasing_or_strictly_decreasing_index(&[1, 1, 1], cmp),
            (3, false)
        );
        assert_eq!(
            weakly_increasing_or_strictly_decreasing_index(&[1, 2, 2, 3, 1], cmp),
            (4, false)
        );
        assert_eq!(
            weakly_increasing_or_strictly_decreasing_index(&[5, 4, 3, 3], cmp),
            (3, true)
        );
        // Equal neighbors never continue a decreasing run
        assert_eq!(
            weakly_increasing_or_strictly_decreasing_index(&[5, 5, 4], cmp),
            (2, false)
        );
    }

    #[test]
    fn combined_run_scan_comparison_count() {
        for size in [2usize, 3, 17, 100] {
            let elements = vec![1u32; size];
            let mut comparisons = 0usize;

            let (index, descending) = weakly_increasing_or_strictly_decreasing_index(
                &elements,
                &mut |a: &u32, b: &u32| {
                    comparisons += 1;
                    a.cmp(b)
                },
            );

            assert_eq!((index, descending), (size, false));
            assert_eq!(comparisons, size - 1);
        }
    }

    #[test]
    fn buffer_growth_is_capped() {
        let mut state: MergeState<'_, u32> = MergeState::new(1 << 20, (1 << 20) / 2);

        // Served by rounding up to the next power of two within the limit
        let workspace = state.buffer.ensure_capacity(300_000);
        assert!(workspace.len() >= 300_000);

        // Exceeds the growth limit, served with the exact request instead
        let workspace = state.buffer.ensure_capacity(600_000);
        assert!(workspace.len() >= 600_000);
    }

    #[test]
    fn lent_workspace_is_preferred() {
        let mut backing: Vec<u32> = Vec::with_capacity(64);
        let mut state = MergeState::with_workspace(backing.spare_capacity_mut(), 1024);

        assert!(state.buffer.ensure_capacity(64).len() >= 64);
        // Too small for this request, owned storage takes over
        assert!(state.buffer.ensure_capacity(65).len() >= 65);
    }
}
