/// Median of `values`, sorting in place. Uses `sorted[len / 2]` rather
/// than averaging the two middle elements on even-length input — simple,
/// and arrays here are always small (band count or bucket population), so
/// a full sort is cheap enough that quickselect would only add complexity.
///
/// Panics if `values` is empty; callers must guard against that case since
/// "no data" and "median is some value" are different conditions upstream.
pub fn median_f32(values: &mut [f32]) -> f32 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    values[values.len() / 2]
}
