//! Stable insertion sort over a presorted prefix, used to extend short
//! natural runs to the minimum run length.

// TODO: shift with a single rotation instead of pairwise swaps

/// The default `BINARY` parameter for `InsertionSort`
pub const DEFAULT_BINARY: bool = true;

/// The insertion [`crate::Sort`]
///
/// With `BINARY` the insertion position is located by a binary search over
/// the sorted prefix; otherwise by the backwards linear scan that also
/// performs the shifting.
pub struct InsertionSort<const BINARY: bool = DEFAULT_BINARY>;

impl<const BINARY: bool> crate::PostfixSort for InsertionSort<BINARY> {
    const IS_STABLE: bool = true;

    fn sort_by<T, F: FnMut(&T, &T) -> std::cmp::Ordering>(
        slice: &mut [T],
        split_point: usize,
        mut cmp: F,
    ) {
        if slice.len() < 2 {
            return;
        }

        if BINARY {
            Self::binary_insertion_sort_with_partition(slice, split_point, &mut cmp);
        } else {
            Self::insertion_sort_with_partition(slice, split_point, &mut cmp);
        }
    }
}

impl<const BINARY: bool> InsertionSort<BINARY> {
    /// Sort slice using insertion sort, assuming that `slice[..partition_point]`
    /// is already in order
    fn insertion_sort_with_partition<T, F: FnMut(&T, &T) -> std::cmp::Ordering>(
        slice: &mut [T],
        partition_point: usize,
        cmp: &mut F,
    ) {
        assert!(
            (0..=slice.len()).contains(&partition_point),
            "Partition point needs to be in bounds"
        );

        for i in partition_point..slice.len() {
            for j in (0..i).rev() {
                if cmp(&slice[j + 1], &slice[j]).is_lt() {
                    slice.swap(j + 1, j);
                } else {
                    break;
                }
            }
        }
    }

    /// Sort slice using binary insertion sort, assuming that
    /// `slice[..partition_point]` is already in order.
    ///
    /// The binary search locates the rightmost insertion index, keeping each
    /// inserted element behind its equals.
    fn binary_insertion_sort_with_partition<T, F: FnMut(&T, &T) -> std::cmp::Ordering>(
        slice: &mut [T],
        partition_point: usize,
        cmp: &mut F,
    ) {
        assert!(
            (0..=slice.len()).contains(&partition_point),
            "Partition point needs to be in bounds"
        );

        for i in partition_point..slice.len() {
            let j = slice[..i].partition_point(|element| cmp(element, &slice[i]).is_le());

            for p in (j..i).rev() {
                slice.swap(p, p + 1);
            }
        }
    }
}
