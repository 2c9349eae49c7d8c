//! Risk aggregation for the behavioral pipeline

use crate::anomaly::{AnomalyFlag, Severity};
use crate::config::BehaviorThresholds;
use crate::temporal::TemporalPattern;
use crate::velocity::VelocityProfile;
use serde::{Deserialize, Serialize};

/// Weight of the sample-size term when temporal evidence is available
const SAMPLE_WEIGHT: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl From<Severity> for RiskLevel {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Low => RiskLevel::Low,
            Severity::Medium => RiskLevel::Medium,
            Severity::High => RiskLevel::High,
            Severity::Critical => RiskLevel::Critical,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
            RiskLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Behavioral analysis of one transaction window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternAnalysisResult {
    pub velocity_profile: VelocityProfile,
    pub temporal_patterns: Vec<TemporalPattern>,
    pub anomaly_flags: Vec<AnomalyFlag>,
    pub risk_level: RiskLevel,
    /// Within [-max_risk_reduction, +max_risk_increase]
    pub velocity_risk_adjustment: f64,
    /// Within [0, 1]
    pub confidence: f64,
    pub has_anomalies: bool,
    pub normal_behavior: bool,
    pub transaction_count: usize,
    pub window_fingerprint: String,
}

impl PatternAnalysisResult {
    /// Highest severity among raised flags
    pub fn highest_severity(&self) -> Option<Severity> {
        self.anomaly_flags.iter().map(|f| f.severity).max()
    }

    /// Export as JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Risk level follows the most severe flag; no flags means LOW
pub fn risk_level_for(flags: &[AnomalyFlag]) -> RiskLevel {
    flags
        .iter()
        .map(|f| f.severity)
        .max()
        .map(RiskLevel::from)
        .unwrap_or(RiskLevel::Low)
}

/// Continuous, monotonic adjustment from the hourly-to-baseline velocity ratio.
///
/// Quieter than baseline lowers risk down to `-max_risk_reduction`; busier raises it
/// linearly, saturating at `+max_risk_increase` once the critical multiple is reached.
pub fn velocity_risk_adjustment(
    profile: &VelocityProfile,
    transaction_count: usize,
    thresholds: &BehaviorThresholds,
) -> f64 {
    if transaction_count == 0 {
        return 0.0;
    }

    let ratio = profile.transactions_per_hour as f64 / thresholds.baseline_per_hour;
    let adjustment = if ratio < 1.0 {
        -thresholds.max_risk_reduction * (1.0 - ratio)
    } else {
        thresholds.max_risk_increase * (ratio - 1.0) / (thresholds.critical_multiplier - 1.0)
    };

    adjustment.clamp(-thresholds.max_risk_reduction, thresholds.max_risk_increase)
}

/// Confidence grows with sample size and never reaches 1 from sample size alone
pub fn analysis_confidence(
    transaction_count: usize,
    temporal_patterns: &[TemporalPattern],
    thresholds: &BehaviorThresholds,
) -> f64 {
    let n = transaction_count as f64;
    let sample = n / (n + thresholds.confidence_half_sample);

    let confidence = if temporal_patterns.is_empty() {
        sample
    } else {
        let mean = temporal_patterns.iter().map(|p| p.confidence).sum::<f64>()
            / temporal_patterns.len() as f64;
        SAMPLE_WEIGHT * sample + (1.0 - SAMPLE_WEIGHT) * mean
    };

    confidence.clamp(0.0, 1.0)
}

/// Complete the behavioral result from the upstream components
pub fn aggregate_risk(
    velocity_profile: VelocityProfile,
    temporal_patterns: Vec<TemporalPattern>,
    anomaly_flags: Vec<AnomalyFlag>,
    transaction_count: usize,
    window_fingerprint: String,
    thresholds: &BehaviorThresholds,
) -> PatternAnalysisResult {
    let risk_level = risk_level_for(&anomaly_flags);
    let velocity_risk_adjustment =
        velocity_risk_adjustment(&velocity_profile, transaction_count, thresholds);
    let confidence = analysis_confidence(transaction_count, &temporal_patterns, thresholds);
    let has_anomalies = !anomaly_flags.is_empty();
    let normal_behavior = !has_anomalies && risk_level == RiskLevel::Low;

    PatternAnalysisResult {
        velocity_profile,
        temporal_patterns,
        anomaly_flags,
        risk_level,
        velocity_risk_adjustment,
        confidence,
        has_anomalies,
        normal_behavior,
        transaction_count,
        window_fingerprint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::AnomalyEvidence;
    use crate::temporal::TemporalPatternType;

    fn profile_with_hourly(per_hour: usize) -> VelocityProfile {
        VelocityProfile {
            transactions_per_hour: per_hour,
            transactions_per_day: per_hour,
            transactions_per_week: per_hour,
            average_amount: 100.0,
            total_volume: 100.0 * per_hour as f64,
            average_magnitude: 100.0,
            peak_hour_of_day: Some(12),
            reference_instant: None,
        }
    }

    fn flag(severity: Severity) -> AnomalyFlag {
        AnomalyFlag {
            severity,
            evidence: AnomalyEvidence::RapidConsecutiveTransfers {
                count: 10,
                window_seconds: 300,
                first_transaction_id: "TXN-1".to_string(),
            },
            description: "test".to_string(),
        }
    }

    #[test]
    fn test_risk_level_from_highest_flag() {
        assert_eq!(risk_level_for(&[]), RiskLevel::Low);
        assert_eq!(risk_level_for(&[flag(Severity::Medium)]), RiskLevel::Medium);
        assert_eq!(
            risk_level_for(&[flag(Severity::Medium), flag(Severity::High)]),
            RiskLevel::High
        );
        assert_eq!(
            risk_level_for(&[flag(Severity::Low), flag(Severity::Critical), flag(Severity::High)]),
            RiskLevel::Critical
        );
    }

    #[test]
    fn test_adjustment_bounds() {
        let t = BehaviorThresholds::default();
        assert_eq!(velocity_risk_adjustment(&profile_with_hourly(0), 0, &t), 0.0);
        assert_eq!(velocity_risk_adjustment(&profile_with_hourly(0), 3, &t), -20.0);
        assert_eq!(velocity_risk_adjustment(&profile_with_hourly(5), 5, &t), 0.0);
        assert_eq!(velocity_risk_adjustment(&profile_with_hourly(50), 50, &t), 50.0);
        assert_eq!(
            velocity_risk_adjustment(&profile_with_hourly(100_000), 100_000, &t),
            50.0
        );
    }

    #[test]
    fn test_adjustment_is_monotonic() {
        let t = BehaviorThresholds::default();
        let mut previous = f64::NEG_INFINITY;
        for per_hour in 0..200 {
            let adj = velocity_risk_adjustment(&profile_with_hourly(per_hour), 200, &t);
            assert!(adj >= previous, "adjustment dropped at {}/h", per_hour);
            assert!((-20.0..=50.0).contains(&adj));
            previous = adj;
        }
    }

    #[test]
    fn test_confidence_grows_with_sample_size() {
        let t = BehaviorThresholds::default();
        assert_eq!(analysis_confidence(0, &[], &t), 0.0);
        let small = analysis_confidence(2, &[], &t);
        let large = analysis_confidence(2_000, &[], &t);
        assert!(small < large);
        assert!(large < 1.0);
    }

    #[test]
    fn test_confidence_blends_temporal_evidence() {
        let t = BehaviorThresholds::default();
        let patterns = vec![TemporalPattern {
            pattern_type: TemporalPatternType::Rhythmic,
            confidence: 1.0,
            transaction_ids: vec![],
        }];
        let with = analysis_confidence(10, &patterns, &t);
        assert!((with - (0.7 * 0.5 + 0.3)).abs() < 1e-12);
        assert!(with <= 1.0);
    }

    #[test]
    fn test_normal_behavior_derivation() {
        let t = BehaviorThresholds::default();
        let clean = aggregate_risk(profile_with_hourly(1), vec![], vec![], 4, String::new(), &t);
        assert!(clean.normal_behavior);
        assert!(!clean.has_anomalies);

        let low_flag = aggregate_risk(
            profile_with_hourly(1),
            vec![],
            vec![flag(Severity::Low)],
            4,
            String::new(),
            &t,
        );
        assert_eq!(low_flag.risk_level, RiskLevel::Low);
        assert!(low_flag.has_anomalies);
        assert!(!low_flag.normal_behavior);
        assert_eq!(low_flag.highest_severity(), Some(Severity::Low));
    }

    #[test]
    fn test_json_export() {
        let t = BehaviorThresholds::default();
        let result = aggregate_risk(
            profile_with_hourly(60),
            vec![],
            vec![flag(Severity::Critical)],
            60,
            "abc".to_string(),
            &t,
        );
        let json = result.to_json().unwrap();
        assert!(json.contains("\"CRITICAL\""));
        assert!(json.contains("RAPID_CONSECUTIVE_TRANSFERS"));
    }
}
