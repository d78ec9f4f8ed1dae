//! Small numeric helpers shared by the filters.

/// Median of `data` in place using quickselect (O(n) average).
///
/// Even-length input averages the two middle values. Mutates the buffer
/// (partial sort). NaNs sort after every number.
#[inline]
pub fn median_f32_mut(data: &mut [f32]) -> f32 {
    debug_assert!(!data.is_empty());

    let len = data.len();
    let mid = len / 2;

    let (left_part, median, _) = data.select_nth_unstable_by(mid, f32::total_cmp);
    let right = *median;
    if len.is_multiple_of(2) {
        // Left median is the max of the left partition
        let left = left_part
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        (left + right) * 0.5
    } else {
        right
    }
}
