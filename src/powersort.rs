//! The powersort implementation

pub mod node_power;

/// The default node power strategy to use
pub type DefaultNodePower = node_power::Msb;

/// The default insertion sort to use
pub type DefaultInsertionSort = crate::insertionsort::InsertionSort;

/// The default [`crate::merging::MergingMethod`] to use
pub type DefaultMergingMethod = crate::merging::galloping::Galloping;

/// The default `MIN_RUN_LENGTH` to use
pub const DEFAULT_MIN_RUN_LENGTH: usize = 24;

/// The default `ONLY_INCREASING_RUNS` to use
pub const DEFAULT_ONLY_INCREASING_RUNS: bool = false;

/// The powersort [`crate::Sort`].
///
/// Natural runs are detected left to right and extended to `MIN_RUN_LENGTH`
/// by `I` where needed. The power of the node between the current run and
/// its successor decides which pending runs merge before the current run is
/// parked: one stack level per power, drained top down to the new node's
/// level. `ONLY_INCREASING_RUNS` restricts detection to weakly increasing
/// runs (no reversal of descending ones), which requires `MIN_RUN_LENGTH`
/// of one and the constant time node power strategy.
///
/// # Panics
///
/// Sorting panics, before any element is moved, on an unsupported parameter
/// combination or a range longer than `N` supports, and mid-merge if the
/// comparator violates its contract (see
/// [`crate::merging::galloping::Galloping`]).
pub struct PowerSort<
    N: node_power::NodePower = DefaultNodePower,
    I: crate::PostfixSort = DefaultInsertionSort,
    M: crate::merging::MergingMethod = DefaultMergingMethod,
    const MIN_RUN_LENGTH: usize = DEFAULT_MIN_RUN_LENGTH,
    const ONLY_INCREASING_RUNS: bool = DEFAULT_ONLY_INCREASING_RUNS,
>(
    std::marker::PhantomData<N>,
    std::marker::PhantomData<I>,
    std::marker::PhantomData<M>,
);

impl<
    N: node_power::NodePower,
    I: crate::PostfixSort,
    M: crate::merging::MergingMethod,
    const MIN_RUN_LENGTH: usize,
    const ONLY_INCREASING_RUNS: bool,
> crate::Sort for PowerSort<N, I, M, MIN_RUN_LENGTH, ONLY_INCREASING_RUNS>
{
    const IS_STABLE: bool = I::IS_STABLE && M::IS_STABLE;

    fn sort_by<T, F: FnMut(&T, &T) -> std::cmp::Ordering>(slice: &mut [T], mut cmp: F) {
        Self::validate(slice.len());

        if std::mem::size_of::<T>() == 0 || slice.len() < 2 {
            return;
        }

        if slice.len() < MIN_RUN_LENGTH {
            Self::small_range_sort(slice, &mut cmp);
            return;
        }

        let mut state =
            crate::merging::MergeState::new(slice.len(), M::required_capacity(slice.len()));
        Self::powersort(slice, &mut state, &mut cmp);
    }
}

impl<
    N: node_power::NodePower,
    I: crate::PostfixSort,
    M: crate::merging::MergingMethod,
    const MIN_RUN_LENGTH: usize,
    const ONLY_INCREASING_RUNS: bool,
> PowerSort<N, I, M, MIN_RUN_LENGTH, ONLY_INCREASING_RUNS>
{
    /// Like [`crate::Sort::sort_by`], merging through `work` as long as it
    /// is large enough; merges it cannot hold fall back to owned storage
    pub fn sort_by_with_workspace<T, F: FnMut(&T, &T) -> std::cmp::Ordering>(
        slice: &mut [T],
        work: &mut [std::mem::MaybeUninit<T>],
        mut cmp: F,
    ) {
        Self::validate(slice.len());

        if std::mem::size_of::<T>() == 0 || slice.len() < 2 {
            return;
        }

        if slice.len() < MIN_RUN_LENGTH {
            Self::small_range_sort(slice, &mut cmp);
            return;
        }

        let mut state =
            crate::merging::MergeState::with_workspace(work, M::required_capacity(slice.len()));
        Self::powersort(slice, &mut state, &mut cmp);
    }

    /// Fail fast on parameter combinations the engine does not support
    fn validate(n: usize) {
        assert!(
            (1..=64).contains(&MIN_RUN_LENGTH),
            "Minimum run length must lie in 1..=64"
        );
        assert!(
            N::CONSTANT_TIME || !ONLY_INCREASING_RUNS,
            "Increasing-only run detection requires a constant time node power strategy"
        );
        assert!(
            MIN_RUN_LENGTH == 1 || (N::CONSTANT_TIME && !ONLY_INCREASING_RUNS),
            "Run extension requires a constant time node power strategy and descending run detection"
        );
        assert!(
            n <= N::MAX_LEN,
            "Range length exceeds the node power strategy's supported maximum"
        );
    }

    /// Ranges below the minimum run length need a single run detection and
    /// one insertion pass, no merges
    fn small_range_sort<T, F: FnMut(&T, &T) -> std::cmp::Ordering>(slice: &mut [T], cmp: &mut F) {
        let run_length = Self::extend_run(slice, cmp);
        I::sort_by(slice, run_length, &mut *cmp);
    }

    /// The actual powersort implementation
    fn powersort<T, F: FnMut(&T, &T) -> std::cmp::Ordering>(
        slice: &mut [T],
        state: &mut crate::merging::MergeState<'_, T>,
        cmp: &mut F,
    ) {
        // One level per possible node power, each holding at most one run
        let levels = slice.len().ilog2() as usize + 2;
        let mut stack: Box<[Option<std::ops::Range<usize>>]> =
            std::iter::repeat_n(None, levels).collect();
        let mut top = 0;

        let mut run_a = 0..Self::extend_run(slice, cmp);
        if run_a.len() < MIN_RUN_LENGTH {
            let end_a = std::cmp::min(slice.len(), MIN_RUN_LENGTH);
            I::sort_by(&mut slice[..end_a], run_a.len(), &mut *cmp);
            run_a.end = end_a;
        }

        while run_a.end != slice.len() {
            let mut run_b = run_a.end..run_a.end + Self::extend_run(&mut slice[run_a.end..], cmp);
            if run_b.len() < MIN_RUN_LENGTH {
                let end_b = std::cmp::min(slice.len(), run_b.start + MIN_RUN_LENGTH);
                I::sort_by(&mut slice[run_b.start..end_b], run_b.len(), &mut *cmp);
                run_b.end = end_b;
            }

            let node_power = N::node_power(slice.len(), run_a.clone(), run_b.clone());
            assert!(node_power != top);
            debug_assert!(node_power < levels);

            // Clear the new node's left subtree bottom-up: every pending run
            // at a strictly deeper level merges into the current run
            for level in (node_power + 1..=top).rev() {
                let Some(run) = stack[level].take() else {
                    continue;
                };

                debug_assert!(run.end == run_a.start);
                M::merge(&mut slice[run.start..run_a.end], run.len(), state, cmp);
                run_a.start = run.start;
            }

            // Store the left half of the merge between A and B
            stack[node_power] = Some(run_a);
            top = node_power;
            run_a = run_b;
        }

        debug_assert!(run_a.end == slice.len());
        for level in (1..=top).rev() {
            let Some(run) = stack[level].take() else {
                continue;
            };

            M::merge(&mut slice[run.start..], run.len(), state, cmp);
        }
    }

    /// Find the maximal monotone run at the start of `slice` and return its
    /// length; strictly decreasing runs are reversed in place
    fn extend_run<T, F: FnMut(&T, &T) -> std::cmp::Ordering>(slice: &mut [T], cmp: &mut F) -> usize {
        if ONLY_INCREASING_RUNS {
            crate::merging::weakly_increasing_prefix_index(slice, cmp)
        } else {
            match crate::merging::weakly_increasing_or_strictly_decreasing_index(slice, cmp) {
                (index, false) => index,
                (index, true) => {
                    slice[..index].reverse();
                    index
                }
            }
        }
    }
}
