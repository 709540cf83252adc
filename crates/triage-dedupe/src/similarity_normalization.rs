/// Maps a judge-supplied similarity onto `[0, 1]`.
///
/// Models sometimes answer on a 0-100 scale: values above 1 are divided by
/// 100 before clamping. Non-finite values become 0.
pub fn normalize_judge_similarity(raw: f64) -> f64 {
    if !raw.is_finite() {
        return 0.0;
    }
    let scaled = if raw > 1.0 { raw / 100.0 } else { raw };
    scaled.clamp(0.0, 1.0)
}
