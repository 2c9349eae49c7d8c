//! Anomaly flag engine: velocity, outsized transfers, bursts, concentration

use crate::config::BehaviorThresholds;
use crate::velocity::VelocityProfile;
use crate::window::TransactionWindow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyType {
    VelocitySpike,
    CriticalVelocity,
    LargeTransfer,
    RapidConsecutiveTransfers,
    CounterpartyConcentration,
}

/// Metric values behind a flag, compared against their thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyEvidence {
    VelocitySpike {
        hourly_count: usize,
        baseline_per_hour: f64,
        multiple: f64,
    },
    CriticalVelocity {
        hourly_count: usize,
        baseline_per_hour: f64,
        multiple: f64,
    },
    LargeTransfer {
        transaction_id: String,
        amount: f64,
        baseline_amount: f64,
        multiple: f64,
    },
    RapidConsecutiveTransfers {
        count: usize,
        window_seconds: i64,
        first_transaction_id: String,
    },
    CounterpartyConcentration {
        counterparty: String,
        share: f64,
        transaction_count: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFlag {
    pub severity: Severity,
    pub evidence: AnomalyEvidence,
    pub description: String,
}

impl AnomalyFlag {
    pub fn flag_type(&self) -> AnomalyType {
        match self.evidence {
            AnomalyEvidence::VelocitySpike { .. } => AnomalyType::VelocitySpike,
            AnomalyEvidence::CriticalVelocity { .. } => AnomalyType::CriticalVelocity,
            AnomalyEvidence::LargeTransfer { .. } => AnomalyType::LargeTransfer,
            AnomalyEvidence::RapidConsecutiveTransfers { .. } => {
                AnomalyType::RapidConsecutiveTransfers
            }
            AnomalyEvidence::CounterpartyConcentration { .. } => {
                AnomalyType::CounterpartyConcentration
            }
        }
    }
}

/// Evaluate every anomaly rule over the window.
///
/// Windows with fewer than two transactions carry no baseline and raise nothing.
pub fn detect_anomalies(
    profile: &VelocityProfile,
    window: &TransactionWindow<'_>,
    thresholds: &BehaviorThresholds,
) -> Vec<AnomalyFlag> {
    if window.len() < 2 {
        return Vec::new();
    }

    let mut flags = Vec::new();

    if let Some(flag) = check_velocity(profile, thresholds) {
        flags.push(flag);
    }
    flags.extend(check_large_transfers(profile, window, thresholds));
    if let Some(flag) = check_rapid_consecutive(window, thresholds) {
        flags.push(flag);
    }
    if let Some(flag) = check_counterparty_concentration(window, thresholds) {
        flags.push(flag);
    }

    log::debug!(
        "anomaly engine raised {} flag(s) over {} transactions",
        flags.len(),
        window.len()
    );
    flags
}

fn check_velocity(
    profile: &VelocityProfile,
    thresholds: &BehaviorThresholds,
) -> Option<AnomalyFlag> {
    let hourly = profile.transactions_per_hour;
    let baseline = thresholds.baseline_per_hour;
    let multiple = hourly as f64 / baseline;

    if multiple >= thresholds.critical_multiplier {
        return Some(AnomalyFlag {
            severity: Severity::Critical,
            evidence: AnomalyEvidence::CriticalVelocity {
                hourly_count: hourly,
                baseline_per_hour: baseline,
                multiple,
            },
            description: format!(
                "{} transactions in the last hour is {:.1}x the baseline of {:.1}/h",
                hourly, multiple, baseline
            ),
        });
    }

    let severity = if multiple >= thresholds.spike_multiplier {
        Severity::High
    } else if multiple >= thresholds.elevated_multiplier {
        Severity::Medium
    } else {
        return None;
    };

    Some(AnomalyFlag {
        severity,
        evidence: AnomalyEvidence::VelocitySpike {
            hourly_count: hourly,
            baseline_per_hour: baseline,
            multiple,
        },
        description: format!(
            "Velocity spike: {} transactions in the last hour ({:.1}x baseline)",
            hourly, multiple
        ),
    })
}

fn check_large_transfers(
    profile: &VelocityProfile,
    window: &TransactionWindow<'_>,
    thresholds: &BehaviorThresholds,
) -> Vec<AnomalyFlag> {
    // Signed mean collapses when returns net out, so compare against magnitudes
    let average = profile.average_magnitude;
    if average <= f64::EPSILON {
        return Vec::new();
    }

    window
        .transactions()
        .iter()
        .filter_map(|txn| {
            let multiple = txn.amount.abs() / average;
            let severity = if multiple >= thresholds.large_transfer_critical_multiplier {
                Severity::Critical
            } else if multiple >= thresholds.large_transfer_high_multiplier {
                Severity::High
            } else if multiple >= thresholds.large_transfer_multiplier {
                Severity::Medium
            } else {
                return None;
            };

            Some(AnomalyFlag {
                severity,
                evidence: AnomalyEvidence::LargeTransfer {
                    transaction_id: txn.transaction_id.clone(),
                    amount: txn.amount,
                    baseline_amount: average,
                    multiple,
                },
                description: format!(
                    "Transaction {} of {:.2} is {:.1}x the average amount {:.2}",
                    txn.transaction_id, txn.amount, multiple, average
                ),
            })
        })
        .collect()
}

fn check_rapid_consecutive(
    window: &TransactionWindow<'_>,
    thresholds: &BehaviorThresholds,
) -> Option<AnomalyFlag> {
    let txns = window.transactions();
    let span = chrono::Duration::seconds(thresholds.rapid_window_seconds);

    let mut best_count = 0usize;
    let mut best_start = 0usize;
    let mut end = 0usize;
    for start in 0..txns.len() {
        if end < start {
            end = start;
        }
        while end < txns.len() && txns[end].timestamp - txns[start].timestamp <= span {
            end += 1;
        }
        let count = end - start;
        if count > best_count {
            best_count = count;
            best_start = start;
        }
    }

    if best_count < thresholds.rapid_min_count {
        return None;
    }

    let first_id = txns[best_start].transaction_id.clone();
    Some(AnomalyFlag {
        severity: Severity::High,
        evidence: AnomalyEvidence::RapidConsecutiveTransfers {
            count: best_count,
            window_seconds: thresholds.rapid_window_seconds,
            first_transaction_id: first_id.clone(),
        },
        description: format!(
            "{} transactions within {} seconds starting at {}",
            best_count, thresholds.rapid_window_seconds, first_id
        ),
    })
}

fn check_counterparty_concentration(
    window: &TransactionWindow<'_>,
    thresholds: &BehaviorThresholds,
) -> Option<AnomalyFlag> {
    if window.len() < thresholds.concentration_min_transactions {
        return None;
    }

    // The subject is whoever appears in the most transactions
    let mut participation: BTreeMap<&str, usize> = BTreeMap::new();
    for txn in window.transactions() {
        *participation.entry(txn.from_account.as_str()).or_default() += 1;
        if txn.to_account != txn.from_account {
            *participation.entry(txn.to_account.as_str()).or_default() += 1;
        }
    }
    let subject = participation
        .iter()
        .fold(None::<(&str, usize)>, |best, (&party, &count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((party, count)),
        })?
        .0;

    let mut per_counterparty: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
    let mut involved = 0usize;
    let mut involved_volume = 0.0f64;
    for txn in window.transactions() {
        let counterparty = if txn.from_account == subject && txn.to_account != subject {
            txn.to_account.as_str()
        } else if txn.to_account == subject && txn.from_account != subject {
            txn.from_account.as_str()
        } else {
            continue;
        };
        let entry = per_counterparty.entry(counterparty).or_default();
        entry.0 += 1;
        entry.1 += txn.amount.abs();
        involved += 1;
        involved_volume += txn.amount.abs();
    }
    if involved < thresholds.concentration_min_transactions {
        return None;
    }

    let (counterparty, count, share) = per_counterparty
        .iter()
        .map(|(&party, &(count, volume))| {
            let count_share = count as f64 / involved as f64;
            let volume_share = if involved_volume > 0.0 {
                volume / involved_volume
            } else {
                0.0
            };
            (party, count, count_share.max(volume_share))
        })
        .fold(None::<(&str, usize, f64)>, |best, candidate| match best {
            Some(b) if b.2 >= candidate.2 => Some(b),
            _ => Some(candidate),
        })?;

    let severity = if share >= thresholds.concentration_high_share {
        Severity::High
    } else if share >= thresholds.concentration_share {
        Severity::Medium
    } else {
        return None;
    };

    Some(AnomalyFlag {
        severity,
        evidence: AnomalyEvidence::CounterpartyConcentration {
            counterparty: counterparty.to_string(),
            share,
            transaction_count: count,
        },
        description: format!(
            "Counterparty {} accounts for {:.0}% of {}'s activity",
            counterparty,
            share * 100.0,
            subject
        ),
    })
}
