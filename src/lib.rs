//! # Hawala Pattern Core
//!
//! Stateless analytics over a bounded window of financial transfers attributable
//! to one entity. Two independent judgments come out of every window:
//!
//! - **Behavioral profile**: velocity, timing shape, typed anomaly flags and an
//!   overall risk level with a bounded velocity risk adjustment
//! - **Hawala detection**: structuring, round-trip, fan-out, fan-in and
//!   mirror-trading indicators folded into a 0-100 laundering-suspicion score
//!   with an STR/SAR filing recommendation
//!
//! ## Determinism
//!
//! Both entry points are pure functions of the supplied slice. The window is
//! re-sorted internally, nothing reads the wall clock unless the caller passes a
//! reference instant, and no state survives between calls. Shuffled input yields
//! identical output.
//!
//! ## Usage
//!
//! ```no_run
//! use hawala_pattern_core::{PatternAnalyzer, Transaction};
//! use chrono::Utc;
//!
//! let analyzer = PatternAnalyzer::new();
//! let window = vec![Transaction::transfer("TXN-1", "ACC-A", "ACC-B", 2_000.0, Utc::now())];
//!
//! let behavior = analyzer.analyze_patterns(&window, None).unwrap();
//! let hawala = analyzer.detect_hawala_patterns(&window).unwrap();
//! println!("{} / {:.1}", behavior.risk_level, hawala.hawala_score);
//! ```

pub mod anomaly;
pub mod config;
pub mod error;
pub mod hawala;
pub mod risk;
pub mod temporal;
pub mod timestamp;
pub mod velocity;
pub mod window;

pub use anomaly::{AnomalyEvidence, AnomalyFlag, AnomalyType, Severity};
pub use config::{BehaviorThresholds, DetectorConfig, HawalaThresholds, PatternWeights, ThresholdProfiles};
pub use error::{ConfigError, ValidationError};
pub use hawala::{HawalaAction, HawalaDetectionResult, HawalaPattern, HawalaPatternType};
pub use risk::{PatternAnalysisResult, RiskLevel};
pub use temporal::{TemporalPattern, TemporalPatternType};
pub use velocity::VelocityProfile;
pub use window::TransactionWindow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transaction type
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    #[default]
    Transfer,
    /// Reversal of an earlier transfer; nets against volume
    Return,
    Deposit,
    Withdrawal,
    Payment,
    #[serde(other)]
    Other,
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Transfer => write!(f, "transfer"),
            TransactionType::Return => write!(f, "return"),
            TransactionType::Deposit => write!(f, "deposit"),
            TransactionType::Withdrawal => write!(f, "withdrawal"),
            TransactionType::Payment => write!(f, "payment"),
            TransactionType::Other => write!(f, "other"),
        }
    }
}

/// Transaction record supplied by the caller; never mutated or persisted here
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub from_account: String,
    pub to_account: String,
    /// Signed; reversals may be negative or typed as [`TransactionType::Return`]
    pub amount: f64,
    /// Accepts epoch milliseconds or RFC 3339 on input
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub transaction_type: TransactionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
}

impl Transaction {
    /// Plain transfer without a jurisdiction tag
    pub fn transfer(
        transaction_id: &str,
        from_account: &str,
        to_account: &str,
        amount: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            transaction_id: transaction_id.to_string(),
            from_account: from_account.to_string(),
            to_account: to_account.to_string(),
            amount,
            timestamp,
            transaction_type: TransactionType::Transfer,
            jurisdiction: None,
        }
    }

    pub fn with_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = transaction_type;
        self
    }

    pub fn with_jurisdiction(mut self, jurisdiction: &str) -> Self {
        self.jurisdiction = Some(jurisdiction.to_string());
        self
    }

    /// Amount with returns forced negative so they net against transfers
    pub fn signed_amount(&self) -> f64 {
        match self.transaction_type {
            TransactionType::Return => -self.amount.abs(),
            _ => self.amount,
        }
    }

    pub fn is_reversal(&self) -> bool {
        self.transaction_type == TransactionType::Return || self.amount < 0.0
    }
}

/// Both judgments over one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowReport {
    pub behavior: PatternAnalysisResult,
    pub hawala: HawalaDetectionResult,
}

impl WindowReport {
    /// Export as JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Entry point for the upstream compliance-decision aggregator.
///
/// Holds only configuration; every call builds its own call-local state, so one
/// analyzer can be shared across request threads.
#[derive(Debug, Clone, Default)]
pub struct PatternAnalyzer {
    config: DetectorConfig,
}

impl PatternAnalyzer {
    /// Create an analyzer with default thresholds
    pub fn new() -> Self {
        Self {
            config: DetectorConfig::default(),
        }
    }

    /// Create an analyzer with custom thresholds.
    ///
    /// Thresholds are checked here, once, so analysis calls never meet an unusable
    /// window length or filing threshold. [`PatternAnalyzer::new`] stays infallible.
    pub fn with_config(config: DetectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Create an analyzer using the profile for a jurisdiction
    pub fn for_jurisdiction(
        profiles: &ThresholdProfiles,
        jurisdiction: Option<&str>,
    ) -> Result<Self, ConfigError> {
        Self::with_config(profiles.resolve(jurisdiction).clone())
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    fn window<'a>(
        &self,
        transactions: &'a [Transaction],
    ) -> Result<TransactionWindow<'a>, ValidationError> {
        TransactionWindow::with_limit(transactions, self.config.max_window_size).map_err(|e| {
            log::warn!("rejected transaction window: {}", e);
            e
        })
    }

    /// Behavioral profile of the window.
    ///
    /// `now` anchors the trailing velocity windows; without it the newest
    /// transaction is used. An anchor earlier than any transaction is rejected.
    pub fn analyze_patterns(
        &self,
        transactions: &[Transaction],
        now: Option<DateTime<Utc>>,
    ) -> Result<PatternAnalysisResult, ValidationError> {
        let window = self.window(transactions)?;
        self.analyze_window_patterns(&window, now)
    }

    /// Hawala layering indicators in the window
    pub fn detect_hawala_patterns(
        &self,
        transactions: &[Transaction],
    ) -> Result<HawalaDetectionResult, ValidationError> {
        let window = self.window(transactions)?;
        Ok(self.detect_window_hawala(&window))
    }

    /// Run both pipelines over a single validated window
    pub fn analyze_window(
        &self,
        transactions: &[Transaction],
        now: Option<DateTime<Utc>>,
    ) -> Result<WindowReport, ValidationError> {
        let window = self.window(transactions)?;
        Ok(WindowReport {
            behavior: self.analyze_window_patterns(&window, now)?,
            hawala: self.detect_window_hawala(&window),
        })
    }

    fn analyze_window_patterns(
        &self,
        window: &TransactionWindow<'_>,
        now: Option<DateTime<Utc>>,
    ) -> Result<PatternAnalysisResult, ValidationError> {
        let thresholds = &self.config.behavior;
        let reference = window.reference_instant(now).map_err(|e| {
            log::warn!("rejected reference instant: {}", e);
            e
        })?;

        let profile = velocity::profile_velocity(window, reference);
        let temporal = temporal::classify_temporal_patterns(window, thresholds);
        let flags = anomaly::detect_anomalies(&profile, window, thresholds);
        let result = risk::aggregate_risk(
            profile,
            temporal,
            flags,
            window.len(),
            window.fingerprint().to_string(),
            thresholds,
        );

        log::info!(
            "behavior analysis window={} txns={} risk={} adjustment={:.2} flags={}",
            &result.window_fingerprint[..12],
            result.transaction_count,
            result.risk_level,
            result.velocity_risk_adjustment,
            result.anomaly_flags.len()
        );
        Ok(result)
    }

    fn detect_window_hawala(&self, window: &TransactionWindow<'_>) -> HawalaDetectionResult {
        let result = hawala::detect_hawala(window, &self.config.hawala);
        log::info!(
            "hawala detection window={} txns={} score={:.2} flagged={} action={:?}",
            &result.window_fingerprint[..12],
            result.transaction_count,
            result.hawala_score,
            result.flagged,
            result.action
        );
        result
    }
}
