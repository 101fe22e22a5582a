//! The galloping merge: a stable in-place merge of two adjacent sorted runs
//! through a workspace holding only the smaller run, with exponential search
//! to bulk-move stretches where one run dominates.

use super::{MIN_GALLOP, MergeState, MergingMethod};

/// A [`MergingMethod`] implementation via a galloping merge procedure.
///
/// The merge first trims elements that are already in place: the left run's
/// prefix not exceeding the right run's first element, and the right run's
/// suffix not preceding the left run's last element. The smaller remaining
/// run is copied into the workspace and merged back in place, alternating
/// between a one-pair-at-a-time phase and a galloping phase. A run winning
/// [`MergeState::min_gallop`] comparisons in a row enters galloping; each
/// gallop moving at least [`MIN_GALLOP`] elements lowers the threshold by
/// one, leaving galloping raises it by two, and it never drops below one.
/// The threshold is carried across all merges of a sort call.
#[derive(Debug, Clone, Copy)]
pub struct Galloping;

impl MergingMethod for Galloping {
    const IS_STABLE: bool = true;

    fn merge<T, F: FnMut(&T, &T) -> std::cmp::Ordering>(
        slice: &mut [T],
        run_length: usize,
        state: &mut MergeState<'_, T>,
        cmp: &mut F,
    ) {
        #[cfg(feature = "counters")]
        super::MERGE_COST_COUNTER.increase(slice.len() as u64);

        if slice.len() < 2 || run_length == 0 {
            return;
        }

        assert!(
            run_length < slice.len(),
            "Split point needs to be in bounds"
        );

        // Trim the left run's prefix that precedes the whole right run
        let start = gallop::<_, _, false>(&slice[run_length], &slice[..run_length], 0, cmp);
        if start == run_length {
            return;
        }

        // Trim the right run's suffix that follows the whole left run
        let end = run_length
            + gallop::<_, _, true>(
                &slice[run_length - 1],
                &slice[run_length..],
                slice.len() - run_length - 1,
                cmp,
            );
        if end == run_length {
            return;
        }

        let len1 = run_length - start;
        let len2 = end - run_length;
        let buffer = state.buffer.ensure_capacity(len1.min(len2));

        if len1 <= len2 {
            merge_lo(
                &mut slice[start..end],
                len1,
                buffer,
                &mut state.min_gallop,
                cmp,
            );
        } else {
            merge_hi(
                &mut slice[start..end],
                len1,
                buffer,
                &mut state.min_gallop,
                cmp,
            );
        }
    }

    fn required_capacity(size: usize) -> usize {
        size / 2
    }
}

/// Return the insertion index of `key` in the sorted `slice`, galloping
/// outwards from `hint`: probe offsets grow exponentially until the key is
/// bracketed, then a binary search finishes the interval.
///
/// If `LEFT`, returns the leftmost insertion index (all elements before it
/// compare less than `key`), otherwise the rightmost (all elements before it
/// compare less than or equal).
fn gallop<T, F: FnMut(&T, &T) -> std::cmp::Ordering, const LEFT: bool>(
    key: &T,
    slice: &[T],
    hint: usize,
    cmp: &mut F,
) -> usize {
    assert!(hint < slice.len(), "Gallop hint needs to be in bounds");

    // The insertion index lies right of every element for which this holds
    let continues = |ordering: std::cmp::Ordering| if LEFT { ordering.is_gt() } else { ordering.is_ge() };

    let mut last_offset = 0;
    let mut offset = 1;

    // Check whether we're searching slice[..hint] or slice[hint..]
    if continues(cmp(key, &slice[hint])) {
        // Gallop right until slice[hint + last_offset] <~ key <~ slice[hint + offset]
        let max_offset = slice.len() - hint;
        while offset < max_offset && continues(cmp(key, &slice[hint + offset])) {
            last_offset = offset;
            offset = (offset << 1) + 1;
        }
        offset = std::cmp::min(offset, max_offset);

        // Since we searched slice[hint..] we have to add it as starting offset
        last_offset += hint + 1;
        offset += hint;
    } else {
        // Gallop left until slice[hint - offset] <~ key <~ slice[hint - last_offset]
        let max_offset = hint + 1;
        while offset < max_offset && !continues(cmp(key, &slice[hint - offset])) {
            last_offset = offset;
            offset = (offset << 1) + 1;
        }
        offset = std::cmp::min(offset, max_offset);

        // Since we searched slice[..hint] backwards, we reverse our offset
        let tmp = last_offset;
        last_offset = hint + 1 - offset;
        offset = hint - tmp;
    }
    debug_assert!(last_offset <= offset && offset <= slice.len());

    // Binary search in the bracketed interval
    last_offset + slice[last_offset..offset].partition_point(|element| continues(cmp(key, element)))
}

// When dropped, moves the elements `start..end` back into the hole at `dest`.
//
// Both merge directions keep the invariant that the unconsumed part of the
// buffered run is exactly `[start, end)` and that the unwritten gap inside
// the merged slice starts at `dest` and has the same length. Dropping the
// hole therefore completes the merge tail, and if the comparator panics
// mid-merge the slice still ends up holding every element exactly once.
struct MergeHole<T> {
    start: *mut T,
    end: *mut T,
    dest: *mut T,
}

impl<T> Drop for MergeHole<T> {
    fn drop(&mut self) {
        // SAFETY: `start..end` are initialized elements of the workspace and
        // `dest` is the start of an equally long gap inside the merged slice
        unsafe {
            let len = self.end.offset_from(self.start) as usize;
            std::ptr::copy_nonoverlapping(self.start, self.dest, len);
        }
    }
}

/// Merge `slice[..len1]` with `slice[len1..]` left to right, with the left
/// run staged in `buffer`. Called for `len1 <= len2` after trimming, so both
/// runs are non-empty, the right run's first element precedes the left run,
/// and the left run's last element follows the right run.
///
/// # Panics
///
/// Panics if the comparator is observed to be inconsistent with a total
/// order; the slice is left as a permutation of its input, as it is when the
/// comparator itself panics.
fn merge_lo<T, F: FnMut(&T, &T) -> std::cmp::Ordering>(
    slice: &mut [T],
    run_length: usize,
    buffer: &mut [std::mem::MaybeUninit<T>],
    min_gallop: &mut usize,
    cmp: &mut F,
) {
    let mut len1 = run_length;
    let mut len2 = slice.len() - run_length;
    debug_assert!(len1 >= 1 && len1 <= len2);
    assert!(
        buffer.len() >= len1,
        "We need workspace for the whole left run"
    );

    let a = slice.as_mut_ptr();
    let buf = buffer.as_mut_ptr().cast::<T>();

    // SAFETY: The left run is moved into the workspace and merged back one
    // element or gallop at a time. `hole` tracks the unconsumed workspace
    // elements `[hole.start, hole.end)` and the write position `hole.dest`;
    // the gap `[hole.dest, cursor2)` always has exactly `len1` slots, so
    // every write below lands in the gap and never clobbers an unconsumed
    // element. All cursor movements are guarded by the `len1`/`len2`
    // bookkeeping, which keeps them inside the merged region. Dropping
    // `hole` — on normal exit, on a comparator panic, or on the contract
    // violation panic — moves the unconsumed workspace elements into the
    // remaining gap, so `slice` always ends up a permutation of its input.
    unsafe {
        std::ptr::copy_nonoverlapping(a, buf, len1);
        let mut hole = MergeHole {
            start: buf,
            end: buf.add(len1),
            dest: a,
        };
        let mut cursor2 = a.add(len1);

        // The right run's first element precedes the whole left run
        std::ptr::copy_nonoverlapping(cursor2, hole.dest, 1);
        hole.dest = hole.dest.add(1);
        cursor2 = cursor2.add(1);
        len2 -= 1;
        if len2 == 0 {
            return;
        }
        if len1 == 1 {
            std::ptr::copy(cursor2, hole.dest, len2);
            hole.dest = hole.dest.add(len2);
            // The single left element follows the whole right run and is
            // placed by the hole
            return;
        }

        let mut gallop_threshold = *min_gallop;
        'outer: loop {
            let mut count1 = 0;
            let mut count2 = 0;

            // One pair at a time until one run keeps winning
            loop {
                debug_assert!(len1 > 1 && len2 > 0);
                if cmp(&*cursor2, &*hole.start).is_lt() {
                    std::ptr::copy_nonoverlapping(cursor2, hole.dest, 1);
                    hole.dest = hole.dest.add(1);
                    cursor2 = cursor2.add(1);
                    count2 += 1;
                    count1 = 0;
                    len2 -= 1;
                    if len2 == 0 {
                        break 'outer;
                    }
                } else {
                    std::ptr::copy_nonoverlapping(hole.start, hole.dest, 1);
                    hole.dest = hole.dest.add(1);
                    hole.start = hole.start.add(1);
                    count1 += 1;
                    count2 = 0;
                    len1 -= 1;
                    if len1 == 1 {
                        break 'outer;
                    }
                }
                if (count1 | count2) >= gallop_threshold {
                    break;
                }
            }

            // Gallop until neither run wins big enough anymore
            loop {
                debug_assert!(len1 > 1 && len2 > 0);
                count1 = gallop::<_, _, false>(
                    &*cursor2,
                    std::slice::from_raw_parts(hole.start, len1),
                    0,
                    cmp,
                );
                if count1 != 0 {
                    std::ptr::copy_nonoverlapping(hole.start, hole.dest, count1);
                    hole.dest = hole.dest.add(count1);
                    hole.start = hole.start.add(count1);
                    len1 -= count1;
                    if len1 <= 1 {
                        break 'outer;
                    }
                }
                std::ptr::copy_nonoverlapping(cursor2, hole.dest, 1);
                hole.dest = hole.dest.add(1);
                cursor2 = cursor2.add(1);
                len2 -= 1;
                if len2 == 0 {
                    break 'outer;
                }

                count2 = gallop::<_, _, true>(
                    &*hole.start,
                    std::slice::from_raw_parts(cursor2, len2),
                    0,
                    cmp,
                );
                if count2 != 0 {
                    // Source and destination may overlap within the slice
                    std::ptr::copy(cursor2, hole.dest, count2);
                    hole.dest = hole.dest.add(count2);
                    cursor2 = cursor2.add(count2);
                    len2 -= count2;
                    if len2 == 0 {
                        break 'outer;
                    }
                }
                std::ptr::copy_nonoverlapping(hole.start, hole.dest, 1);
                hole.dest = hole.dest.add(1);
                hole.start = hole.start.add(1);
                len1 -= 1;
                if len1 == 1 {
                    break 'outer;
                }

                gallop_threshold = gallop_threshold.saturating_sub(1);
                if count1 < MIN_GALLOP && count2 < MIN_GALLOP {
                    break;
                }
            }

            // Penalty for leaving galloping mode
            gallop_threshold += 2;
        }
        *min_gallop = std::cmp::max(gallop_threshold, 1);

        match len1 {
            1 => {
                debug_assert!(len2 > 0);
                std::ptr::copy(cursor2, hole.dest, len2);
                hole.dest = hole.dest.add(len2);
                // The single left element is placed last by the hole
            }
            // The left run's last element must outlast the right run
            0 => panic!("comparison method violates its general contract"),
            // The rest of the left run is placed by the hole
            _ => debug_assert!(len2 == 0),
        }
    }
}

/// Merge `slice[..len1]` with `slice[len1..]` right to left, with the right
/// run staged in `buffer`. Called for `len1 > len2` after trimming, under the
/// same preconditions as [`merge_lo`].
///
/// # Panics
///
/// See [`merge_lo`].
fn merge_hi<T, F: FnMut(&T, &T) -> std::cmp::Ordering>(
    slice: &mut [T],
    run_length: usize,
    buffer: &mut [std::mem::MaybeUninit<T>],
    min_gallop: &mut usize,
    cmp: &mut F,
) {
    let mut len1 = run_length;
    let mut len2 = slice.len() - run_length;
    debug_assert!(len2 >= 1 && len2 < len1);
    assert!(
        buffer.len() >= len2,
        "We need workspace for the whole right run"
    );

    let a = slice.as_mut_ptr();
    let buf = buffer.as_mut_ptr().cast::<T>();

    // SAFETY: Mirror image of `merge_lo`: the right run is staged in the
    // workspace and the merge fills the slice from the back. The gap
    // `[hole.dest, hole.dest + len2)` always matches the unconsumed
    // workspace elements `[hole.start, hole.end)`, the unconsumed left run
    // is `[a, hole.dest)`, and the next slot to write is
    // `hole.dest + len2 - 1`. All cursor movements are guarded by the
    // `len1`/`len2` bookkeeping. Dropping `hole` completes or unwinds the
    // merge so `slice` always holds every element exactly once.
    unsafe {
        std::ptr::copy_nonoverlapping(a.add(len1), buf, len2);
        let mut hole = MergeHole {
            start: buf,
            end: buf.add(len2),
            dest: a.add(len1),
        };

        // The left run's last element follows the whole right run
        std::ptr::copy_nonoverlapping(hole.dest.sub(1), hole.dest.add(len2 - 1), 1);
        hole.dest = hole.dest.sub(1);
        len1 -= 1;
        if len1 == 0 {
            return;
        }
        if len2 == 1 {
            // Shift the rest of the left run up; the single right element
            // precedes it all and is placed by the hole
            std::ptr::copy(hole.dest.sub(len1), hole.dest.sub(len1).add(1), len1);
            hole.dest = hole.dest.sub(len1);
            return;
        }

        let mut gallop_threshold = *min_gallop;
        'outer: loop {
            let mut count1 = 0;
            let mut count2 = 0;

            // One pair at a time until one run keeps winning
            loop {
                debug_assert!(len1 > 0 && len2 > 1);
                if cmp(&*hole.end.sub(1), &*hole.dest.sub(1)).is_lt() {
                    std::ptr::copy_nonoverlapping(hole.dest.sub(1), hole.dest.add(len2 - 1), 1);
                    hole.dest = hole.dest.sub(1);
                    count1 += 1;
                    count2 = 0;
                    len1 -= 1;
                    if len1 == 0 {
                        break 'outer;
                    }
                } else {
                    std::ptr::copy_nonoverlapping(hole.end.sub(1), hole.dest.add(len2 - 1), 1);
                    hole.end = hole.end.sub(1);
                    count2 += 1;
                    count1 = 0;
                    len2 -= 1;
                    if len2 == 1 {
                        break 'outer;
                    }
                }
                if (count1 | count2) >= gallop_threshold {
                    break;
                }
            }

            // Gallop until neither run wins big enough anymore
            loop {
                debug_assert!(len1 > 0 && len2 > 1);
                count1 = len1
                    - gallop::<_, _, false>(
                        &*hole.end.sub(1),
                        std::slice::from_raw_parts(hole.dest.sub(len1), len1),
                        len1 - 1,
                        cmp,
                    );
                if count1 != 0 {
                    // Source and destination may overlap within the slice
                    std::ptr::copy(
                        hole.dest.sub(count1),
                        hole.dest.add(len2).sub(count1),
                        count1,
                    );
                    hole.dest = hole.dest.sub(count1);
                    len1 -= count1;
                    if len1 == 0 {
                        break 'outer;
                    }
                }
                std::ptr::copy_nonoverlapping(hole.end.sub(1), hole.dest.add(len2 - 1), 1);
                hole.end = hole.end.sub(1);
                len2 -= 1;
                if len2 == 1 {
                    break 'outer;
                }

                count2 = len2
                    - gallop::<_, _, true>(
                        &*hole.dest.sub(1),
                        std::slice::from_raw_parts(hole.start, len2),
                        len2 - 1,
                        cmp,
                    );
                if count2 != 0 {
                    std::ptr::copy_nonoverlapping(
                        hole.end.sub(count2),
                        hole.dest.add(len2).sub(count2),
                        count2,
                    );
                    hole.end = hole.end.sub(count2);
                    len2 -= count2;
                    if len2 <= 1 {
                        break 'outer;
                    }
                }
                std::ptr::copy_nonoverlapping(hole.dest.sub(1), hole.dest.add(len2 - 1), 1);
                hole.dest = hole.dest.sub(1);
                len1 -= 1;
                if len1 == 0 {
                    break 'outer;
                }

                gallop_threshold = gallop_threshold.saturating_sub(1);
                if count1 < MIN_GALLOP && count2 < MIN_GALLOP {
                    break;
                }
            }

            // Penalty for leaving galloping mode
            gallop_threshold += 2;
        }
        *min_gallop = std::cmp::max(gallop_threshold, 1);

        match len2 {
            1 => {
                debug_assert!(len1 > 0);
                // Shift the rest of the left run up; the single right
                // element is placed first by the hole
                std::ptr::copy(hole.dest.sub(len1), hole.dest.sub(len1).add(1), len1);
                hole.dest = hole.dest.sub(len1);
            }
            // The right run's first element must outlast the left run
            0 => panic!("comparison method violates its general contract"),
            // The rest of the right run is placed by the hole
            _ => debug_assert!(len1 == 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merging::CopyBoth;

    use rand::Rng as _;

    const TEST_SIZE: usize = 1000;
    const TEST_RUNS: usize = 500;

    #[test]
    fn gallop_matches_partition_point() {
        let mut rng = crate::test::test_rng();

        for _ in 0..TEST_RUNS {
            let len = rng.random_range(1..200);
            let mut haystack: Vec<u32> = (0..len).map(|_| rng.random_range(0..30)).collect();
            haystack.sort();

            let key = rng.random_range(0..30u32);
            let hint = rng.random_range(0..len);

            assert_eq!(
                gallop::<_, _, true>(&key, &haystack, hint, &mut u32::cmp),
                haystack.partition_point(|element| *element < key),
                "Leftmost gallop diverged for key {key} hint {hint} in {haystack:?}"
            );
            assert_eq!(
                gallop::<_, _, false>(&key, &haystack, hint, &mut u32::cmp),
                haystack.partition_point(|element| *element <= key),
                "Rightmost gallop diverged for key {key} hint {hint} in {haystack:?}"
            );
        }
    }

    #[test]
    fn gallop_boundary_hints() {
        let haystack: Vec<u32> = (0..100).map(|i| i / 3).collect();

        for key in 0..=34u32 {
            for hint in [0, 1, haystack.len() / 2, haystack.len() - 1] {
                assert_eq!(
                    gallop::<_, _, true>(&key, &haystack, hint, &mut u32::cmp),
                    haystack.partition_point(|element| *element < key),
                );
                assert_eq!(
                    gallop::<_, _, false>(&key, &haystack, hint, &mut u32::cmp),
                    haystack.partition_point(|element| *element <= key),
                );
            }
        }
    }

    /// The galloping merge and the simple reference merge must produce
    /// identical results, including on heavily tied inputs
    #[test]
    fn matches_reference_merge() {
        let mut rng = crate::test::test_rng();

        for alphabet in [2usize, 4, 16, 1 << 30] {
            for _ in 0..TEST_RUNS / 10 {
                let mut elements: Vec<_> = crate::test::IndexedOrdered::map_iter(
                    (0..TEST_SIZE).map(|_| rng.random_range(0..alphabet)),
                )
                .collect();
                let split = rng.random_range(0..TEST_SIZE);
                elements[..split].sort();
                elements[split..].sort();

                let mut expected = elements.clone();

                let mut state = MergeState::new(TEST_SIZE, TEST_SIZE);
                CopyBoth::merge(&mut expected, split, &mut state, &mut Ord::cmp);

                let mut state = MergeState::new(TEST_SIZE, Galloping::required_capacity(TEST_SIZE));
                Galloping::merge(&mut elements, split, &mut state, &mut Ord::cmp);

                assert!(
                    elements
                        .iter()
                        .zip(expected.iter())
                        .all(|(a, b)| a.value == b.value && a.index == b.index)
                );
            }
        }
    }

    /// Merging one-sided runs must gallop through in long strides
    #[test]
    fn one_sided_runs() {
        let mut elements: Vec<u32> = (0..(TEST_SIZE as u32 - 1)).collect();
        elements.push(0);
        let split = TEST_SIZE - 1;

        let mut state = MergeState::new(TEST_SIZE, Galloping::required_capacity(TEST_SIZE));
        Galloping::merge(&mut elements, split, &mut state, &mut u32::cmp);
        assert!(elements.is_sorted());

        let mut elements: Vec<u32> = std::iter::once(u32::MAX)
            .chain(0..(TEST_SIZE as u32 - 1))
            .collect();
        let mut state = MergeState::new(TEST_SIZE, Galloping::required_capacity(TEST_SIZE));
        Galloping::merge(&mut elements, 1, &mut state, &mut u32::cmp);
        assert!(elements.is_sorted());
    }

    /// The adaptive threshold stays clamped and is carried between merges
    #[test]
    fn threshold_writeback() {
        let mut rng = crate::test::test_rng();
        let mut state = MergeState::new(TEST_SIZE, Galloping::required_capacity(TEST_SIZE));

        for _ in 0..20 {
            let mut elements: Vec<u32> = (0..TEST_SIZE).map(|_| rng.random()).collect();
            let split = rng.random_range(1..TEST_SIZE);
            elements[..split].sort();
            elements[split..].sort();

            Galloping::merge(&mut elements, split, &mut state, &mut u32::cmp);
            assert!(elements.is_sorted());
            assert!(state.min_gallop >= 1);
        }
    }
}
