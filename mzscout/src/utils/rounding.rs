/// Round to two decimal places (relative metrics, scores, rt spans).
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Round to four decimal places (precursor mass differences).
pub fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}
