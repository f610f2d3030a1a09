use crate::models::RiskLevel;

/// Lowest probability classified as `Warning`
pub const WARNING_THRESHOLD: f64 = 0.5;

/// Lowest probability classified as `Critical`
pub const CRITICAL_THRESHOLD: f64 = 0.8;

/// Map a failure probability onto the three risk tiers.
///
/// Intervals are left-inclusive. Inputs are probabilities by construction;
/// nothing is clamped here.
pub fn classify(probability: f64) -> RiskLevel {
    if probability < WARNING_THRESHOLD {
        RiskLevel::Normal
    } else if probability < CRITICAL_THRESHOLD {
        RiskLevel::Warning
    } else {
        RiskLevel::Critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_boundaries() {
        assert_eq!(classify(0.0), RiskLevel::Normal);
        assert_eq!(classify(0.49), RiskLevel::Normal);
        assert_eq!(classify(0.5), RiskLevel::Warning);
        assert_eq!(classify(0.79), RiskLevel::Warning);
        assert_eq!(classify(0.8), RiskLevel::Critical);
        assert_eq!(classify(1.0), RiskLevel::Critical);
    }

    #[test]
    fn test_classification_is_monotone() {
        let levels: Vec<RiskLevel> = (0..=100).map(|i| classify(i as f64 / 100.0)).collect();
        assert!(levels.windows(2).all(|pair| pair[0] <= pair[1]));
    }
}
