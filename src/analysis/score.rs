//! Measurement scoring.

use crate::models::Measurement;

/// Score ceiling for an instantaneous measurement.
pub const BASE_SCORE: f64 = 1000.0;

const LOAD_WEIGHT: f64 = 0.4;
const CPU_WEIGHT: f64 = 0.3;
const NETWORK_WEIGHT: f64 = 0.2;
const MEMORY_WEIGHT: f64 = 0.1;

/// Score a single measurement.
///
/// `max(0, round(1000 - weighted sum))`. Only the lower bound is clamped;
/// negative raw values could push a score above 1000.
pub fn score(m: &Measurement) -> u32 {
    let penalty = LOAD_WEIGHT * m.load_time
        + CPU_WEIGHT * m.cpu_time
        + NETWORK_WEIGHT * m.network_latency
        + MEMORY_WEIGHT * m.memory_usage;

    let raw = (BASE_SCORE - penalty).round();
    if raw.is_nan() || raw <= 0.0 {
        0
    } else {
        raw as u32
    }
}

/// Rounded mean of the per-measurement scores, 0 when empty.
///
/// This averages scores, not raw metrics: the clamp in [`score`] makes the two
/// differ.
pub fn average_score(measurements: &[Measurement]) -> u32 {
    if measurements.is_empty() {
        return 0;
    }

    let total: f64 = measurements.iter().map(|m| score(m) as f64).sum();
    (total / measurements.len() as f64).round() as u32
}
