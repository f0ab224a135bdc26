// Weights of the adjusted confidence, summing to 1.0
pub const BASE_WEIGHT: f64 = 0.6;
pub const PERFORMANCE_WEIGHT: f64 = 0.3;
pub const COMPLEXITY_WEIGHT: f64 = 0.1;

// Factor count at which the complexity term saturates
const COMPLEXITY_SATURATION: f64 = 10.0;

/// Adjusted confidence from the backend's own confidence, its tracked
/// performance and the number of risk factors behind the assessment.
/// Always within [0, 1].
pub fn calculate_confidence(base: f64, backend_performance: f64, factor_count: usize) -> f64 {
    let complexity = (factor_count as f64 / COMPLEXITY_SATURATION).min(1.0);

    let confidence = BASE_WEIGHT * base + PERFORMANCE_WEIGHT * backend_performance + COMPLEXITY_WEIGHT * complexity;

    if confidence.is_nan() {
        return 0.0;
    }
    confidence.clamp(0.0, 1.0)
}
