//! Hawala-style layering detection.
//!
//! Five independent sub-detectors run over the canonical window:
//! - **Structuring**: one sender splits a reportable sum into sub-threshold transfers
//! - **Round trip**: A→B followed by a comparable B→A return leg
//! - **Fan-out / Fan-in**: one party pays, or is paid by, many distinct parties in a burst
//! - **Mirror trading**: near-equal offsetting legs booked in different jurisdictions
//!
//! Their confidences fold into a single 0-100 score; corroborating pattern types
//! push the score above what any single pattern reaches.

use crate::config::HawalaThresholds;
use crate::window::TransactionWindow;
use crate::{Transaction, TransactionType};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Slack for relative-difference comparisons at the tolerance boundary
const TOLERANCE_EPSILON: f64 = 1e-9;
/// Share of threshold above which a split transfer counts as "just below"
const NEAR_THRESHOLD_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HawalaPatternType {
    Structuring,
    RoundTrip,
    FanOut,
    FanIn,
    MirrorTrading,
}

impl std::fmt::Display for HawalaPatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HawalaPatternType::Structuring => write!(f, "STRUCTURING"),
            HawalaPatternType::RoundTrip => write!(f, "ROUND_TRIP"),
            HawalaPatternType::FanOut => write!(f, "FAN_OUT"),
            HawalaPatternType::FanIn => write!(f, "FAN_IN"),
            HawalaPatternType::MirrorTrading => write!(f, "MIRROR_TRADING"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HawalaPattern {
    pub pattern_type: HawalaPatternType,
    /// Within [0, 1]
    pub confidence: f64,
    pub transaction_ids: Vec<String>,
    pub description: String,
}

/// Suggested next step for the filing subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HawalaAction {
    NoAction,
    Monitor,
    EnhancedReview,
    FileSuspiciousActivityReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HawalaDetectionResult {
    pub flagged: bool,
    /// Within [0, 100]
    pub hawala_score: f64,
    pub patterns: Vec<HawalaPattern>,
    pub action: HawalaAction,
    pub recommendation: String,
    pub transaction_count: usize,
    pub window_fingerprint: String,
}

impl HawalaDetectionResult {
    /// Whether the recommendation calls for an STR/SAR filing
    pub fn requires_filing(&self) -> bool {
        self.action == HawalaAction::FileSuspiciousActivityReport
    }

    pub fn patterns_of(&self, pattern_type: HawalaPatternType) -> Vec<&HawalaPattern> {
        self.patterns
            .iter()
            .filter(|p| p.pattern_type == pattern_type)
            .collect()
    }

    /// Export as JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Run every sub-detector and aggregate the result
pub fn detect_hawala(
    window: &TransactionWindow<'_>,
    thresholds: &HawalaThresholds,
) -> HawalaDetectionResult {
    if window.is_empty() {
        return HawalaDetectionResult {
            flagged: false,
            hawala_score: 0.0,
            patterns: Vec::new(),
            action: HawalaAction::NoAction,
            recommendation: "No transactions to analyze".to_string(),
            transaction_count: 0,
            window_fingerprint: window.fingerprint().to_string(),
        };
    }

    let (round_trips, mirrors) = detect_offsetting_pairs(window, thresholds);

    let mut patterns = detect_structuring(window, thresholds);
    patterns.extend(round_trips);
    patterns.extend(detect_fan(window, thresholds, FanDirection::Out));
    patterns.extend(detect_fan(window, thresholds, FanDirection::In));
    patterns.extend(mirrors);

    let hawala_score = hawala_score(&patterns, thresholds);
    let flagged = hawala_score > thresholds.flag_threshold;
    let (action, recommendation) = recommend(hawala_score, &patterns, thresholds);

    log::debug!(
        "hawala detector found {} pattern(s), score {:.2}",
        patterns.len(),
        hawala_score
    );

    HawalaDetectionResult {
        flagged,
        hawala_score,
        patterns,
        action,
        recommendation,
        transaction_count: window.len(),
        window_fingerprint: window.fingerprint().to_string(),
    }
}

fn is_outbound_transfer(txn: &Transaction) -> bool {
    txn.transaction_type != TransactionType::Return
        && txn.amount > 0.0
        && txn.from_account != txn.to_account
}

fn detect_structuring(
    window: &TransactionWindow<'_>,
    thresholds: &HawalaThresholds,
) -> Vec<HawalaPattern> {
    let reporting = thresholds.reporting_threshold;
    let span = Duration::hours(thresholds.structuring_window_hours);
    let min_count = thresholds.structuring_min_count;

    // Transfers at or above the threshold are reported anyway and never count here
    let mut by_sender: BTreeMap<&str, Vec<&Transaction>> = BTreeMap::new();
    for txn in window.transactions() {
        if is_outbound_transfer(txn) && txn.amount < reporting {
            by_sender
                .entry(txn.from_account.as_str())
                .or_default()
                .push(txn);
        }
    }

    let mut patterns = Vec::new();
    for (sender, txns) in by_sender {
        if txns.len() < min_count {
            continue;
        }

        let mut best: Option<(usize, usize, f64)> = None;
        let mut end = 0usize;
        for start in 0..txns.len() {
            if end < start {
                end = start;
            }
            while end < txns.len() && txns[end].timestamp - txns[start].timestamp <= span {
                end += 1;
            }
            let count = end - start;
            if count < min_count {
                continue;
            }
            let total: f64 = txns[start..end].iter().map(|t| t.amount).sum();
            if total < reporting {
                continue;
            }
            let better = match best {
                None => true,
                Some((s, e, best_total)) => {
                    count > e - s || (count == e - s && total > best_total)
                }
            };
            if better {
                best = Some((start, end, total));
            }
        }

        let Some((start, end, total)) = best else {
            continue;
        };
        let group = &txns[start..end];
        let count = group.len();
        let near = group
            .iter()
            .filter(|t| t.amount >= reporting * NEAR_THRESHOLD_RATIO)
            .count();
        let count_score = (count as f64 / (2 * min_count) as f64).min(1.0);
        let near_share = near as f64 / count as f64;
        let confidence = (0.4 + 0.4 * count_score + 0.2 * near_share).clamp(0.0, 1.0);

        patterns.push(HawalaPattern {
            pattern_type: HawalaPatternType::Structuring,
            confidence,
            transaction_ids: group.iter().map(|t| t.transaction_id.clone()).collect(),
            description: format!(
                "{} sent {} transfers below the {:.2} reporting threshold totalling {:.2} within {}h",
                sender, count, reporting, total, thresholds.structuring_window_hours
            ),
        });
    }

    patterns
}

/// Pair outbound legs with their reverse legs.
///
/// Each transaction joins at most one pair. A pair that qualifies as mirror trading
/// (different jurisdictions, tight tolerance) is reported only as mirror trading.
fn detect_offsetting_pairs(
    window: &TransactionWindow<'_>,
    thresholds: &HawalaThresholds,
) -> (Vec<HawalaPattern>, Vec<HawalaPattern>) {
    let txns = window.transactions();
    let round_trip_span = Duration::hours(thresholds.round_trip_window_hours);
    let mirror_span = Duration::hours(thresholds.mirror_window_hours);
    let horizon = round_trip_span.max(mirror_span);

    let mut used = vec![false; txns.len()];
    let mut round_trips = Vec::new();
    let mut mirrors = Vec::new();

    for i in 0..txns.len() {
        if used[i] {
            continue;
        }
        let outbound = txns[i];
        let original = outbound.amount.abs();
        if original <= 0.0 || outbound.from_account == outbound.to_account {
            continue;
        }

        for j in (i + 1)..txns.len() {
            let elapsed = txns[j].timestamp - outbound.timestamp;
            if elapsed > horizon {
                break;
            }
            if used[j] {
                continue;
            }
            let back = txns[j];
            if back.from_account != outbound.to_account || back.to_account != outbound.from_account
            {
                continue;
            }

            let difference = (original - back.amount.abs()).abs() / original;
            let elapsed_secs = elapsed.num_seconds() as f64;
            let cross_border = match (&outbound.jurisdiction, &back.jurisdiction) {
                (Some(a), Some(b)) => !a.eq_ignore_ascii_case(b),
                _ => false,
            };

            if cross_border
                && elapsed <= mirror_span
                && difference <= thresholds.mirror_tolerance + TOLERANCE_EPSILON
            {
                let closeness = (1.0 - difference / thresholds.mirror_tolerance).max(0.0);
                let speed = (1.0 - elapsed_secs / mirror_span.num_seconds() as f64).max(0.0);
                mirrors.push(HawalaPattern {
                    pattern_type: HawalaPatternType::MirrorTrading,
                    confidence: (0.7 + 0.2 * closeness + 0.1 * speed).clamp(0.0, 1.0),
                    transaction_ids: vec![
                        outbound.transaction_id.clone(),
                        back.transaction_id.clone(),
                    ],
                    description: format!(
                        "{:.2} from {} to {} in {} offset by {:.2} in {} after {}h",
                        outbound.amount,
                        outbound.from_account,
                        outbound.to_account,
                        outbound.jurisdiction.as_deref().unwrap_or("-"),
                        back.amount,
                        back.jurisdiction.as_deref().unwrap_or("-"),
                        elapsed.num_hours()
                    ),
                });
                used[i] = true;
                used[j] = true;
                break;
            }

            if elapsed <= round_trip_span
                && difference <= thresholds.round_trip_tolerance + TOLERANCE_EPSILON
            {
                let closeness = (1.0 - difference / thresholds.round_trip_tolerance).max(0.0);
                let speed = (1.0 - elapsed_secs / round_trip_span.num_seconds() as f64).max(0.0);
                round_trips.push(HawalaPattern {
                    pattern_type: HawalaPatternType::RoundTrip,
                    confidence: (0.6 + 0.25 * closeness + 0.15 * speed).clamp(0.0, 1.0),
                    transaction_ids: vec![
                        outbound.transaction_id.clone(),
                        back.transaction_id.clone(),
                    ],
                    description: format!(
                        "{:.2} sent from {} to {} returned as {:.2} after {}h",
                        outbound.amount,
                        outbound.from_account,
                        outbound.to_account,
                        back.amount,
                        elapsed.num_hours()
                    ),
                });
                used[i] = true;
                used[j] = true;
                break;
            }
        }
    }

    (round_trips, mirrors)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FanDirection {
    Out,
    In,
}

fn detect_fan(
    window: &TransactionWindow<'_>,
    thresholds: &HawalaThresholds,
    direction: FanDirection,
) -> Vec<HawalaPattern> {
    let span = Duration::minutes(thresholds.fan_window_minutes);
    let min_distinct = thresholds.fan_min_distinct;

    let hub_of = |t: &Transaction| match direction {
        FanDirection::Out => t.from_account.clone(),
        FanDirection::In => t.to_account.clone(),
    };
    let spoke_of = |t: &Transaction| match direction {
        FanDirection::Out => t.to_account.clone(),
        FanDirection::In => t.from_account.clone(),
    };

    let mut by_hub: BTreeMap<String, Vec<&Transaction>> = BTreeMap::new();
    for txn in window.transactions() {
        if is_outbound_transfer(txn) {
            by_hub.entry(hub_of(txn)).or_default().push(txn);
        }
    }

    let mut patterns = Vec::new();
    for (hub, txns) in by_hub {
        if txns.len() < min_distinct {
            continue;
        }

        let mut best: Option<(usize, usize, usize)> = None;
        let mut end = 0usize;
        for start in 0..txns.len() {
            if end < start {
                end = start;
            }
            while end < txns.len() && txns[end].timestamp - txns[start].timestamp <= span {
                end += 1;
            }
            let distinct = txns[start..end]
                .iter()
                .map(|t| spoke_of(t))
                .collect::<BTreeSet<_>>()
                .len();
            if best.map_or(true, |(_, _, d)| distinct > d) {
                best = Some((start, end, distinct));
            }
        }

        let Some((start, end, distinct)) = best else {
            continue;
        };
        if distinct < min_distinct {
            continue;
        }

        let excess = (distinct - min_distinct) as f64 / min_distinct as f64;
        let confidence = (0.5 + 0.5 * excess.min(1.0)).clamp(0.0, 1.0);
        let group = &txns[start..end];
        let (pattern_type, description) = match direction {
            FanDirection::Out => (
                HawalaPatternType::FanOut,
                format!(
                    "{} paid {} distinct recipients within {} minutes",
                    hub, distinct, thresholds.fan_window_minutes
                ),
            ),
            FanDirection::In => (
                HawalaPatternType::FanIn,
                format!(
                    "{} received from {} distinct senders within {} minutes",
                    hub, distinct, thresholds.fan_window_minutes
                ),
            ),
        };

        patterns.push(HawalaPattern {
            pattern_type,
            confidence,
            transaction_ids: group.iter().map(|t| t.transaction_id.clone()).collect(),
            description,
        });
    }

    patterns
}

fn weight_for(pattern_type: HawalaPatternType, thresholds: &HawalaThresholds) -> f64 {
    let w = &thresholds.weights;
    match pattern_type {
        HawalaPatternType::Structuring => w.structuring,
        HawalaPatternType::RoundTrip => w.round_trip,
        HawalaPatternType::FanOut => w.fan_out,
        HawalaPatternType::FanIn => w.fan_in,
        HawalaPatternType::MirrorTrading => w.mirror_trading,
    }
}

/// Fold pattern confidences into a 0-100 score.
///
/// Each pattern contributes `weight x confidence` as an independent probability
/// (noisy-OR); every distinct pattern type beyond the first adds the corroboration bonus.
pub fn hawala_score(patterns: &[HawalaPattern], thresholds: &HawalaThresholds) -> f64 {
    if patterns.is_empty() {
        return 0.0;
    }

    let miss = patterns.iter().fold(1.0f64, |acc, p| {
        let hit = (weight_for(p.pattern_type, thresholds) * p.confidence).clamp(0.0, 1.0);
        acc * (1.0 - hit)
    });

    let distinct_types = patterns
        .iter()
        .map(|p| p.pattern_type)
        .collect::<BTreeSet<_>>()
        .len();
    let bonus = thresholds.corroboration_bonus * distinct_types.saturating_sub(1) as f64;

    (100.0 * (1.0 - miss) + bonus).clamp(0.0, 100.0)
}

fn recommend(
    score: f64,
    patterns: &[HawalaPattern],
    thresholds: &HawalaThresholds,
) -> (HawalaAction, String) {
    let indicators = patterns
        .iter()
        .map(|p| p.pattern_type)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    if score >= thresholds.filing_threshold {
        (
            HawalaAction::FileSuspiciousActivityReport,
            format!(
                "File STR/SAR: hawala score {:.1} meets the filing threshold of {:.0}. Indicators: {}",
                score, thresholds.filing_threshold, indicators
            ),
        )
    } else if score > thresholds.flag_threshold {
        (
            HawalaAction::EnhancedReview,
            format!(
                "Escalate for enhanced due diligence: hawala score {:.1} exceeds the reporting threshold of {:.0}. Indicators: {}",
                score, thresholds.flag_threshold, indicators
            ),
        )
    } else if !patterns.is_empty() {
        (
            HawalaAction::Monitor,
            format!(
                "Continue monitoring: weak hawala indicators ({}) below the reporting threshold",
                indicators
            ),
        )
    } else {
        (
            HawalaAction::NoAction,
            "No hawala indicators detected".to_string(),
        )
    }
}
