//! Detector thresholds and per-jurisdiction tuning

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Thresholds for the behavioral pipeline (velocity, timing, anomaly flags, risk)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorThresholds {
    /// Expected steady-state transactions per hour for the entity
    pub baseline_per_hour: f64,
    /// Hourly multiple of baseline raising a MEDIUM velocity spike
    pub elevated_multiplier: f64,
    /// Hourly multiple of baseline raising a HIGH velocity spike
    pub spike_multiplier: f64,
    /// Hourly multiple of baseline raising CRITICAL velocity
    pub critical_multiplier: f64,
    pub large_transfer_multiplier: f64,
    pub large_transfer_high_multiplier: f64,
    pub large_transfer_critical_multiplier: f64,
    pub rapid_window_seconds: i64,
    pub rapid_min_count: usize,
    pub concentration_min_transactions: usize,
    pub concentration_share: f64,
    pub concentration_high_share: f64,
    /// Gaps below this are "within seconds" of each other
    pub cluster_gap_seconds: i64,
    /// Gaps below this belong to a burst when looking for spikes
    pub burst_gap_seconds: i64,
    /// Gaps at or above this are idle periods between spikes
    pub idle_gap_seconds: i64,
    pub rhythmic_min_confidence: f64,
    /// Sample size at which classification confidence reaches 0.5
    pub confidence_half_sample: f64,
    pub max_risk_reduction: f64,
    pub max_risk_increase: f64,
}

impl Default for BehaviorThresholds {
    fn default() -> Self {
        Self {
            baseline_per_hour: 5.0,
            elevated_multiplier: 2.0,
            spike_multiplier: 3.0,
            critical_multiplier: 10.0,
            large_transfer_multiplier: 5.0,
            large_transfer_high_multiplier: 10.0,
            large_transfer_critical_multiplier: 20.0,
            rapid_window_seconds: 300,
            rapid_min_count: 10,
            concentration_min_transactions: 5,
            concentration_share: 0.5,
            concentration_high_share: 0.8,
            cluster_gap_seconds: 60,
            burst_gap_seconds: 300,
            idle_gap_seconds: 3600,
            rhythmic_min_confidence: 0.6,
            confidence_half_sample: 10.0,
            max_risk_reduction: 20.0,
            max_risk_increase: 50.0,
        }
    }
}

/// Per-pattern weights used when folding hawala confidences into one score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternWeights {
    pub structuring: f64,
    pub round_trip: f64,
    pub fan_out: f64,
    pub fan_in: f64,
    pub mirror_trading: f64,
}

impl Default for PatternWeights {
    fn default() -> Self {
        Self {
            structuring: 0.85,
            round_trip: 0.75,
            fan_out: 0.6,
            fan_in: 0.6,
            mirror_trading: 0.9,
        }
    }
}

/// Thresholds for the hawala layering detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HawalaThresholds {
    /// Mandatory reporting threshold (CTR level)
    pub reporting_threshold: f64,
    pub structuring_min_count: usize,
    pub structuring_window_hours: i64,
    /// Maximum relative difference between outbound and return legs
    pub round_trip_tolerance: f64,
    pub round_trip_window_hours: i64,
    pub fan_min_distinct: usize,
    pub fan_window_minutes: i64,
    pub mirror_tolerance: f64,
    pub mirror_window_hours: i64,
    /// Score strictly above this marks the window as flagged
    pub flag_threshold: f64,
    /// Score at or above this recommends STR/SAR filing
    pub filing_threshold: f64,
    pub weights: PatternWeights,
    /// Added per distinct pattern type beyond the first
    pub corroboration_bonus: f64,
}

impl Default for HawalaThresholds {
    fn default() -> Self {
        Self {
            reporting_threshold: 10_000.0,
            structuring_min_count: 5,
            structuring_window_hours: 24,
            round_trip_tolerance: 0.05,
            round_trip_window_hours: 48,
            fan_min_distinct: 5,
            fan_window_minutes: 60,
            mirror_tolerance: 0.01,
            mirror_window_hours: 24,
            flag_threshold: 40.0,
            filing_threshold: 80.0,
            weights: PatternWeights::default(),
            corroboration_bonus: 5.0,
        }
    }
}

/// Complete detector configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub behavior: BehaviorThresholds,
    pub hawala: HawalaThresholds,
    /// Reject windows larger than this many transactions
    pub max_window_size: Option<usize>,
}

impl DetectorConfig {
    /// Parse and validate a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: DetectorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Check that every threshold is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.behavior;
        let h = &self.hawala;

        positive("behavior.baseline_per_hour", b.baseline_per_hour)?;
        positive("behavior.confidence_half_sample", b.confidence_half_sample)?;
        positive("behavior.large_transfer_multiplier", b.large_transfer_multiplier)?;
        non_negative("behavior.max_risk_reduction", b.max_risk_reduction)?;
        non_negative("behavior.max_risk_increase", b.max_risk_increase)?;

        if !(b.elevated_multiplier <= b.spike_multiplier
            && b.spike_multiplier < b.critical_multiplier)
        {
            return Err(ConfigError::Invalid(
                "velocity multipliers must satisfy elevated <= spike < critical".to_string(),
            ));
        }
        if b.critical_multiplier <= 1.0 {
            return Err(ConfigError::Invalid(
                "behavior.critical_multiplier must exceed 1".to_string(),
            ));
        }
        if !(b.large_transfer_multiplier <= b.large_transfer_high_multiplier
            && b.large_transfer_high_multiplier <= b.large_transfer_critical_multiplier)
        {
            return Err(ConfigError::Invalid(
                "large transfer multipliers must be non-decreasing".to_string(),
            ));
        }
        fraction("behavior.concentration_share", b.concentration_share)?;
        fraction("behavior.concentration_high_share", b.concentration_high_share)?;
        fraction("behavior.rhythmic_min_confidence", b.rhythmic_min_confidence)?;
        span("behavior.rapid_window_seconds", b.rapid_window_seconds, SECONDS_PER_SECOND)?;
        if b.rapid_min_count < 2 {
            return Err(ConfigError::Invalid(
                "behavior.rapid_min_count must be at least 2".to_string(),
            ));
        }
        if b.cluster_gap_seconds <= 0
            || b.burst_gap_seconds <= 0
            || b.idle_gap_seconds <= b.burst_gap_seconds
        {
            return Err(ConfigError::Invalid(
                "gap thresholds must be positive with idle above burst".to_string(),
            ));
        }

        positive("hawala.reporting_threshold", h.reporting_threshold)?;
        fraction("hawala.round_trip_tolerance", h.round_trip_tolerance)?;
        fraction("hawala.mirror_tolerance", h.mirror_tolerance)?;
        if h.structuring_min_count < 2 || h.fan_min_distinct < 2 {
            return Err(ConfigError::Invalid(
                "structuring and fan counts must be at least 2".to_string(),
            ));
        }
        span("hawala.structuring_window_hours", h.structuring_window_hours, SECONDS_PER_HOUR)?;
        span("hawala.round_trip_window_hours", h.round_trip_window_hours, SECONDS_PER_HOUR)?;
        span("hawala.fan_window_minutes", h.fan_window_minutes, SECONDS_PER_MINUTE)?;
        span("hawala.mirror_window_hours", h.mirror_window_hours, SECONDS_PER_HOUR)?;
        if !(0.0..100.0).contains(&h.flag_threshold)
            || !(h.flag_threshold < h.filing_threshold && h.filing_threshold <= 100.0)
        {
            return Err(ConfigError::Invalid(format!(
                "filing threshold {} must exceed flag threshold {} within [0, 100]",
                h.filing_threshold, h.flag_threshold
            )));
        }
        for (name, weight) in [
            ("structuring", h.weights.structuring),
            ("round_trip", h.weights.round_trip),
            ("fan_out", h.weights.fan_out),
            ("fan_in", h.weights.fan_in),
            ("mirror_trading", h.weights.mirror_trading),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(ConfigError::Invalid(format!(
                    "hawala.weights.{} must be within [0, 1], got {}",
                    name, weight
                )));
            }
        }
        non_negative("hawala.corroboration_bonus", h.corroboration_bonus)?;

        if self.max_window_size == Some(0) {
            return Err(ConfigError::Invalid(
                "max_window_size must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Longest detection window accepted, ten years
const MAX_SPAN_SECONDS: i64 = 10 * 365 * 24 * 3600;
const SECONDS_PER_SECOND: i64 = 1;
const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 3600;

fn span(name: &str, value: i64, unit_seconds: i64) -> Result<(), ConfigError> {
    if value > 0 && value <= MAX_SPAN_SECONDS / unit_seconds {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{} must be within (0, {}], got {}",
            name,
            MAX_SPAN_SECONDS / unit_seconds,
            value
        )))
    }
}

fn positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{} must be positive, got {}", name, value)))
    }
}

fn non_negative(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{} must be non-negative, got {}", name, value)))
    }
}

fn fraction(name: &str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{} must be within (0, 1), got {}", name, value)))
    }
}

/// Default thresholds plus jurisdiction-specific overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdProfiles {
    pub default: DetectorConfig,
    /// Keyed by upper-case jurisdiction code
    pub jurisdictions: BTreeMap<String, DetectorConfig>,
}

impl ThresholdProfiles {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let profiles: ThresholdProfiles = serde_json::from_str(json)?;
        profiles.validate()?;
        Ok(profiles)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.default.validate()?;
        for (code, config) in &self.jurisdictions {
            config
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("jurisdiction {}: {}", code, e)))?;
        }
        Ok(())
    }

    /// Register an override for a jurisdiction
    pub fn insert(&mut self, jurisdiction: &str, config: DetectorConfig) {
        self.jurisdictions
            .insert(jurisdiction.to_ascii_uppercase(), config);
    }

    /// Thresholds for a jurisdiction, falling back to the default profile
    pub fn resolve(&self, jurisdiction: Option<&str>) -> &DetectorConfig {
        jurisdiction
            .and_then(|code| self.jurisdictions.get(&code.to_ascii_uppercase()))
            .unwrap_or(&self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        assert!(DetectorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = DetectorConfig::from_json_str(
            r#"{"behavior": {"baseline_per_hour": 12.5}, "hawala": {"reporting_threshold": 15000}}"#,
        )
        .unwrap();
        assert_eq!(config.behavior.baseline_per_hour, 12.5);
        assert_eq!(config.behavior.critical_multiplier, 10.0);
        assert_eq!(config.hawala.reporting_threshold, 15_000.0);
        assert_eq!(config.hawala.structuring_min_count, 5);
    }

    #[test]
    fn test_rejects_zero_baseline() {
        let err = DetectorConfig::from_json_str(r#"{"behavior": {"baseline_per_hour": 0}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_inverted_hawala_thresholds() {
        let mut config = DetectorConfig::default();
        config.hawala.filing_threshold = 30.0;
        assert!(config.validate().is_err());

        config.hawala.filing_threshold = f64::NAN;
        assert!(config.validate().is_err());

        config.hawala.filing_threshold = 100.5;
        assert!(config.validate().is_err());

        config.hawala.filing_threshold = 100.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_unbounded_windows() {
        let mut config = DetectorConfig::default();
        config.hawala.structuring_window_hours = i64::MAX / 2;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = DetectorConfig::default();
        config.hawala.fan_window_minutes = 0;
        assert!(config.validate().is_err());

        let mut config = DetectorConfig::default();
        config.behavior.rapid_window_seconds = i64::MAX;
        assert!(config.validate().is_err());

        let mut config = DetectorConfig::default();
        config.hawala.round_trip_window_hours = 87_600;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_weight() {
        let mut config = DetectorConfig::default();
        config.hawala.weights.fan_in = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"max_window_size": 5000}}"#).unwrap();

        let config = DetectorConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.max_window_size, Some(5000));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DetectorConfig::from_json_file(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_profiles_resolve_by_jurisdiction() {
        let mut profiles = ThresholdProfiles::default();
        let mut uae = DetectorConfig::default();
        uae.hawala.reporting_threshold = 55_000.0;
        profiles.insert("ae", uae);

        assert_eq!(
            profiles.resolve(Some("AE")).hawala.reporting_threshold,
            55_000.0
        );
        assert_eq!(
            profiles.resolve(Some("in")).hawala.reporting_threshold,
            10_000.0
        );
        assert_eq!(profiles.resolve(None).hawala.reporting_threshold, 10_000.0);
    }

    #[test]
    fn test_profiles_validate_overrides() {
        let json = r#"{"jurisdictions": {"IN": {"hawala": {"mirror_tolerance": 2.0}}}}"#;
        let err = ThresholdProfiles::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("IN"));
    }
}
