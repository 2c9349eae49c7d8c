//! Inter-arrival timing classification.
//!
//! Looks only at the gaps between consecutive transactions in canonical order:
//! - **Clustering**: most gaps are a few seconds long
//! - **Spikes**: long idle periods broken by short bursts, few mid-range gaps
//! - **Rhythmic**: consistent spacing (low coefficient of variation)
//! - **Irregular**: none of the above clears its floor
//!
//! The first three are not exclusive; a rhythmic cadence made of tight bursts
//! reports both.

use crate::config::BehaviorThresholds;
use crate::window::TransactionWindow;
use serde::{Deserialize, Serialize};

/// Fraction of gaps that must fall in the idle or burst class for spikes
const SPIKE_BIMODAL_FLOOR: f64 = 0.8;
const SPIKE_MIN_GAPS: usize = 4;
const RHYTHMIC_MIN_GAPS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemporalPatternType {
    Clustering,
    Spikes,
    Rhythmic,
    Irregular,
}

impl std::fmt::Display for TemporalPatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemporalPatternType::Clustering => write!(f, "CLUSTERING"),
            TemporalPatternType::Spikes => write!(f, "SPIKES"),
            TemporalPatternType::Rhythmic => write!(f, "RHYTHMIC"),
            TemporalPatternType::Irregular => write!(f, "IRREGULAR"),
        }
    }
}

/// A timing shape with its supporting transactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalPattern {
    pub pattern_type: TemporalPatternType,
    /// Within [0, 1]
    pub confidence: f64,
    pub transaction_ids: Vec<String>,
}

/// Classify the timing of a window. Fewer than two transactions yields nothing.
pub fn classify_temporal_patterns(
    window: &TransactionWindow<'_>,
    thresholds: &BehaviorThresholds,
) -> Vec<TemporalPattern> {
    let txns = window.transactions();
    if txns.len() < 2 {
        return Vec::new();
    }

    let gaps: Vec<f64> = txns
        .windows(2)
        .map(|w| (w[1].timestamp - w[0].timestamp).num_milliseconds() as f64 / 1000.0)
        .collect();
    let gap_count = gaps.len() as f64;

    // Ids touching at least one gap that satisfies `pred`, in canonical order
    let ids_touching = |pred: &dyn Fn(f64) -> bool| -> Vec<String> {
        let mut marked = vec![false; txns.len()];
        for (i, &gap) in gaps.iter().enumerate() {
            if pred(gap) {
                marked[i] = true;
                marked[i + 1] = true;
            }
        }
        txns.iter()
            .zip(marked)
            .filter(|(_, m)| *m)
            .map(|(t, _)| t.transaction_id.clone())
            .collect()
    };
    let all_ids = || -> Vec<String> { txns.iter().map(|t| t.transaction_id.clone()).collect() };

    let mut patterns = Vec::new();

    // Clustering
    let cluster_gap = thresholds.cluster_gap_seconds as f64;
    let short = gaps.iter().filter(|&&g| g < cluster_gap).count() as f64;
    let cluster_score = short / gap_count;
    if cluster_score > 0.5 {
        patterns.push(TemporalPattern {
            pattern_type: TemporalPatternType::Clustering,
            confidence: cluster_score.clamp(0.0, 1.0),
            transaction_ids: ids_touching(&|g| g < cluster_gap),
        });
    }

    // Spikes
    let burst_gap = thresholds.burst_gap_seconds as f64;
    let idle_gap = thresholds.idle_gap_seconds as f64;
    let idle = gaps.iter().filter(|&&g| g >= idle_gap).count();
    let burst = gaps.iter().filter(|&&g| g < burst_gap).count();
    let bimodal = (idle + burst) as f64 / gap_count;
    let spike_score = if gaps.len() >= SPIKE_MIN_GAPS && idle >= 1 && burst >= 2 {
        let idle_factor = if idle >= 2 { 1.0 } else { 0.75 };
        bimodal * idle_factor
    } else {
        0.0
    };
    if spike_score > 0.0 && bimodal >= SPIKE_BIMODAL_FLOOR {
        patterns.push(TemporalPattern {
            pattern_type: TemporalPatternType::Spikes,
            confidence: spike_score.clamp(0.0, 1.0),
            transaction_ids: ids_touching(&|g| g < burst_gap),
        });
    }

    // Rhythmic
    let rhythm_score = if gaps.len() >= RHYTHMIC_MIN_GAPS {
        let mean = gaps.iter().sum::<f64>() / gap_count;
        if mean > 0.0 {
            let variance = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / gap_count;
            let cv = variance.sqrt() / mean;
            (1.0 - cv).max(0.0)
        } else {
            0.0
        }
    } else {
        0.0
    };
    if rhythm_score > thresholds.rhythmic_min_confidence {
        patterns.push(TemporalPattern {
            pattern_type: TemporalPatternType::Rhythmic,
            confidence: rhythm_score.clamp(0.0, 1.0),
            transaction_ids: all_ids(),
        });
    }

    if patterns.is_empty() {
        let best = cluster_score.max(spike_score).max(rhythm_score);
        patterns.push(TemporalPattern {
            pattern_type: TemporalPatternType::Irregular,
            confidence: (1.0 - best).clamp(0.0, 1.0),
            transaction_ids: all_ids(),
        });
    }

    log::debug!(
        "temporal classification over {} gaps: {:?}",
        gaps.len(),
        patterns.iter().map(|p| p.pattern_type).collect::<Vec<_>>()
    );

    patterns
}
