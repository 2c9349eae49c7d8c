//! Velocity profiling over trailing hour/day/week windows

use crate::window::TransactionWindow;
use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Windowed activity counts and amount statistics for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityProfile {
    pub transactions_per_hour: usize,
    pub transactions_per_day: usize,
    pub transactions_per_week: usize,
    /// Arithmetic mean of signed amounts over the whole window
    pub average_amount: f64,
    /// Signed sum; returns net against prior transfers
    pub total_volume: f64,
    /// Mean of absolute amounts, the baseline for outsized single transfers
    pub average_magnitude: f64,
    /// Most active UTC hour, `None` for an empty window
    pub peak_hour_of_day: Option<u32>,
    /// Instant the trailing windows were anchored at
    pub reference_instant: Option<DateTime<Utc>>,
}

impl VelocityProfile {
    /// Profile of an empty window
    pub fn empty(reference_instant: Option<DateTime<Utc>>) -> Self {
        Self {
            transactions_per_hour: 0,
            transactions_per_day: 0,
            transactions_per_week: 0,
            average_amount: 0.0,
            total_volume: 0.0,
            average_magnitude: 0.0,
            peak_hour_of_day: None,
            reference_instant,
        }
    }
}

/// Build the velocity profile for a window anchored at `reference`.
///
/// `reference` is expected to come from [`TransactionWindow::reference_instant`],
/// which guarantees no transaction lies after it.
pub fn profile_velocity(
    window: &TransactionWindow<'_>,
    reference: Option<DateTime<Utc>>,
) -> VelocityProfile {
    let Some(now) = reference else {
        return VelocityProfile::empty(None);
    };
    if window.is_empty() {
        return VelocityProfile::empty(Some(now));
    }

    // Anchors near the start of the representable range clamp their windows to it
    let window_start = |span: Duration| {
        now.checked_sub_signed(span)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    };
    let hour_start = window_start(Duration::hours(1));
    let day_start = window_start(Duration::hours(24));
    let week_start = window_start(Duration::days(7));

    let mut per_hour = 0usize;
    let mut per_day = 0usize;
    let mut per_week = 0usize;
    let mut total = 0.0f64;
    let mut magnitude = 0.0f64;
    let mut histogram = [0usize; 24];

    for txn in window.transactions() {
        if txn.timestamp >= hour_start {
            per_hour += 1;
        }
        if txn.timestamp >= day_start {
            per_day += 1;
        }
        if txn.timestamp >= week_start {
            per_week += 1;
        }
        total += txn.signed_amount();
        magnitude += txn.amount.abs();
        histogram[txn.timestamp.hour() as usize] += 1;
    }

    // Earliest hour wins ties
    let peak_hour = histogram
        .iter()
        .enumerate()
        .fold((0usize, 0usize), |best, (hour, &count)| {
            if count > best.1 {
                (hour, count)
            } else {
                best
            }
        })
        .0 as u32;

    let profile = VelocityProfile {
        transactions_per_hour: per_hour,
        transactions_per_day: per_day,
        transactions_per_week: per_week,
        average_amount: total / window.len() as f64,
        total_volume: total,
        average_magnitude: magnitude / window.len() as f64,
        peak_hour_of_day: Some(peak_hour),
        reference_instant: Some(now),
    };

    log::debug!(
        "velocity profile: {}/h {}/d {}/w avg={:.2} peak_hour={}",
        profile.transactions_per_hour,
        profile.transactions_per_day,
        profile.transactions_per_week,
        profile.average_amount,
        peak_hour
    );

    profile
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Transaction, TransactionType};
    use chrono::TimeZone;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn create_test_transaction(id: &str, amount: f64, at: DateTime<Utc>) -> Transaction {
        Transaction::transfer(id, "ACC-123", "ACC-456", amount, at)
    }

    #[test]
    fn test_empty_window() {
        let window = TransactionWindow::new(&[]).unwrap();
        let profile = profile_velocity(&window, None);
        assert_eq!(profile.transactions_per_hour, 0);
        assert_eq!(profile.transactions_per_week, 0);
        assert_eq!(profile.total_volume, 0.0);
        assert_eq!(profile.peak_hour_of_day, None);
    }

    #[test]
    fn test_trailing_window_counts() {
        let now = base_time();
        let txns = vec![
            create_test_transaction("TXN-1", 100.0, now),
            create_test_transaction("TXN-2", 100.0, now - Duration::minutes(30)),
            create_test_transaction("TXN-3", 100.0, now - Duration::hours(1)),
            create_test_transaction("TXN-4", 100.0, now - Duration::hours(5)),
            create_test_transaction("TXN-5", 100.0, now - Duration::days(3)),
            create_test_transaction("TXN-6", 100.0, now - Duration::days(10)),
        ];
        let window = TransactionWindow::new(&txns).unwrap();
        let profile = profile_velocity(&window, window.reference_instant(None).unwrap());

        // Boundary at exactly one hour is inclusive
        assert_eq!(profile.transactions_per_hour, 3);
        assert_eq!(profile.transactions_per_day, 4);
        assert_eq!(profile.transactions_per_week, 5);
    }

    #[test]
    fn test_amount_statistics_cover_whole_window() {
        let now = base_time();
        let txns = vec![
            create_test_transaction("TXN-1", 1000.0, now),
            create_test_transaction("TXN-2", 3000.0, now - Duration::days(30)),
        ];
        let window = TransactionWindow::new(&txns).unwrap();
        let profile = profile_velocity(&window, Some(now));
        assert_eq!(profile.total_volume, 4000.0);
        assert_eq!(profile.average_amount, 2000.0);
    }

    #[test]
    fn test_returns_net_against_transfers() {
        let now = base_time();
        let txns = vec![
            create_test_transaction("TXN-1", 1000.0, now - Duration::minutes(10)),
            create_test_transaction("TXN-2", 400.0, now)
                .with_type(TransactionType::Return),
            create_test_transaction("TXN-3", -100.0, now),
        ];
        let window = TransactionWindow::new(&txns).unwrap();
        let profile = profile_velocity(&window, Some(now));
        assert_eq!(profile.total_volume, 500.0);
    }

    #[test]
    fn test_refund_keeps_magnitude_baseline() {
        let now = base_time();
        let txns = vec![
            create_test_transaction("TXN-1", 1000.0, now - Duration::hours(60)),
            create_test_transaction("TXN-2", 990.0, now - Duration::hours(30))
                .with_type(TransactionType::Return),
            create_test_transaction("TXN-3", 40.0, now),
        ];
        let window = TransactionWindow::new(&txns).unwrap();
        let profile = profile_velocity(&window, Some(now));
        assert!((profile.average_amount - 50.0 / 3.0).abs() < 1e-9);
        assert!((profile.average_magnitude - 2030.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_earliest_representable_instant() {
        let earliest = DateTime::<Utc>::MIN_UTC;
        let txns = vec![
            create_test_transaction("TXN-1", 10.0, earliest),
            create_test_transaction("TXN-2", 10.0, earliest + Duration::minutes(5)),
        ];
        let window = TransactionWindow::new(&txns).unwrap();
        let profile = profile_velocity(&window, window.reference_instant(None).unwrap());
        assert_eq!(profile.transactions_per_hour, 2);
        assert_eq!(profile.transactions_per_week, 2);
    }

    #[test]
    fn test_peak_hour() {
        let day = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let txns = vec![
            create_test_transaction("TXN-1", 10.0, day + Duration::hours(9)),
            create_test_transaction("TXN-2", 10.0, day + Duration::minutes(14 * 60 + 5)),
            create_test_transaction("TXN-3", 10.0, day + Duration::minutes(14 * 60 + 45)),
            create_test_transaction("TXN-4", 10.0, day + Duration::hours(20)),
        ];
        let window = TransactionWindow::new(&txns).unwrap();
        let profile = profile_velocity(&window, window.reference_instant(None).unwrap());
        assert_eq!(profile.peak_hour_of_day, Some(14));
    }

    #[test]
    fn test_peak_hour_tie_prefers_earliest() {
        let day = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let txns = vec![
            create_test_transaction("TXN-1", 10.0, day + Duration::hours(22)),
            create_test_transaction("TXN-2", 10.0, day + Duration::hours(3)),
        ];
        let window = TransactionWindow::new(&txns).unwrap();
        let profile = profile_velocity(&window, window.reference_instant(None).unwrap());
        assert_eq!(profile.peak_hour_of_day, Some(3));
    }

    #[test]
    fn test_explicit_reference_shifts_windows() {
        let now = base_time();
        let txns = vec![create_test_transaction("TXN-1", 10.0, now)];
        let window = TransactionWindow::new(&txns).unwrap();
        let later = now + Duration::hours(2);
        let profile = profile_velocity(&window, window.reference_instant(Some(later)).unwrap());
        assert_eq!(profile.transactions_per_hour, 0);
        assert_eq!(profile.transactions_per_day, 1);
        assert_eq!(profile.reference_instant, Some(later));
    }
}
