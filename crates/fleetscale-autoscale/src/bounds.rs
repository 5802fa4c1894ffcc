//! Min/max clamping of a raw replica target.

/// Clamp `raw` into `[min, max]` and report whether clamping happened.
///
/// Admission rejects `min > max`; if such a policy slips through anyway the
/// lower bound wins.
pub fn clamp(raw: u32, min: u32, max: u32) -> (u32, bool) {
    let clamped = raw.min(max).max(min);
    (clamped, clamped != raw)
}
