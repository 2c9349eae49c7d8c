//! Validated, canonically ordered view over a caller-supplied transaction slice.
//!
//! Every detector reads transactions through a [`TransactionWindow`]. The window
//! sorts by `(timestamp, transaction_id)`, so floating-point sums and pairing
//! decisions happen in the same order however the caller arranged the slice.

use crate::error::ValidationError;
use crate::Transaction;
use chrono::{DateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::OnceLock;

fn jurisdiction_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // ISO 3166-1 alpha-2 with optional subdivision suffix, e.g. "AE" or "IN-MH"
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Z]{2}(-[A-Z0-9]{1,3})?$").expect("jurisdiction pattern compiles")
    })
}

/// Transactions sorted into canonical order, validated once per analysis
#[derive(Debug, Clone)]
pub struct TransactionWindow<'a> {
    transactions: Vec<&'a Transaction>,
    fingerprint: String,
}

impl<'a> TransactionWindow<'a> {
    /// Validate and sort a transaction slice without a size cap
    pub fn new(transactions: &'a [Transaction]) -> Result<Self, ValidationError> {
        Self::with_limit(transactions, None)
    }

    /// Validate and sort, rejecting windows above `limit` transactions
    pub fn with_limit(
        transactions: &'a [Transaction],
        limit: Option<usize>,
    ) -> Result<Self, ValidationError> {
        if let Some(limit) = limit {
            if transactions.len() > limit {
                return Err(ValidationError::WindowTooLarge {
                    size: transactions.len(),
                    limit,
                });
            }
        }

        let mut seen = HashSet::with_capacity(transactions.len());
        for txn in transactions {
            validate_transaction(txn)?;
            if !seen.insert(txn.transaction_id.as_str()) {
                return Err(ValidationError::DuplicateTransactionId(
                    txn.transaction_id.clone(),
                ));
            }
        }

        let mut sorted: Vec<&Transaction> = transactions.iter().collect();
        sorted.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.transaction_id.cmp(&b.transaction_id))
        });

        let fingerprint = fingerprint(&sorted);
        Ok(Self {
            transactions: sorted,
            fingerprint,
        })
    }

    pub fn transactions(&self) -> &[&'a Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn earliest(&self) -> Option<DateTime<Utc>> {
        self.transactions.first().map(|t| t.timestamp)
    }

    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.transactions.last().map(|t| t.timestamp)
    }

    /// SHA-256 over the canonical window, hex encoded
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Resolve the instant trailing windows are anchored at.
    ///
    /// An explicit override wins but may not precede the newest transaction.
    /// Without one, the newest transaction is used; an empty window has no anchor.
    pub fn reference_instant(
        &self,
        now: Option<DateTime<Utc>>,
    ) -> Result<Option<DateTime<Utc>>, ValidationError> {
        match (now, self.latest()) {
            (Some(reference), Some(latest)) if reference < latest => {
                Err(ValidationError::ReferenceBeforeTransaction { reference, latest })
            }
            (Some(reference), _) => Ok(Some(reference)),
            (None, latest) => Ok(latest),
        }
    }
}

fn validate_transaction(txn: &Transaction) -> Result<(), ValidationError> {
    for (field, value) in [
        ("transaction_id", &txn.transaction_id),
        ("from_account", &txn.from_account),
        ("to_account", &txn.to_account),
    ] {
        if value.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                transaction_id: txn.transaction_id.clone(),
                field: field.to_string(),
            });
        }
    }

    if !txn.amount.is_finite() {
        return Err(ValidationError::NonFiniteAmount {
            transaction_id: txn.transaction_id.clone(),
        });
    }

    if let Some(code) = &txn.jurisdiction {
        if !jurisdiction_pattern().is_match(&code.to_ascii_uppercase()) {
            return Err(ValidationError::InvalidJurisdiction {
                transaction_id: txn.transaction_id.clone(),
                code: code.clone(),
            });
        }
    }

    Ok(())
}

fn fingerprint(sorted: &[&Transaction]) -> String {
    let mut hasher = Sha256::new();
    for txn in sorted {
        hasher.update(txn.transaction_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(txn.from_account.as_bytes());
        hasher.update([0u8]);
        hasher.update(txn.to_account.as_bytes());
        hasher.update([0u8]);
        hasher.update(txn.amount.to_bits().to_be_bytes());
        hasher.update(txn.timestamp.timestamp_millis().to_be_bytes());
        hasher.update(txn.transaction_type.to_string().as_bytes());
        hasher.update([0u8]);
        if let Some(code) = &txn.jurisdiction {
            hasher.update(code.to_ascii_uppercase().as_bytes());
        }
        hasher.update([0xffu8]);
    }

    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn create_test_transaction(id: &str, minutes: i64) -> Transaction {
        Transaction::transfer(
            id,
            "ACC-A",
            "ACC-B",
            100.0,
            base_time() + Duration::minutes(minutes),
        )
    }

    #[test]
    fn test_sorts_by_timestamp_then_id() {
        let txns = vec![
            create_test_transaction("TXN-3", 10),
            create_test_transaction("TXN-2", 0),
            create_test_transaction("TXN-1", 0),
        ];
        let window = TransactionWindow::new(&txns).unwrap();
        let ids: Vec<&str> = window
            .transactions()
            .iter()
            .map(|t| t.transaction_id.as_str())
            .collect();
        assert_eq!(ids, vec!["TXN-1", "TXN-2", "TXN-3"]);
    }

    #[test]
    fn test_fingerprint_ignores_input_order() {
        let txns = vec![
            create_test_transaction("TXN-1", 0),
            create_test_transaction("TXN-2", 5),
            create_test_transaction("TXN-3", 10),
        ];
        let mut reversed = txns.clone();
        reversed.reverse();

        let a = TransactionWindow::new(&txns).unwrap();
        let b = TransactionWindow::new(&reversed).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
        assert!(a.fingerprint().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_empty_window_fingerprint() {
        let window = TransactionWindow::new(&[]).unwrap();
        assert_eq!(
            window.fingerprint(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_fingerprint_changes_with_amount() {
        let txns = vec![create_test_transaction("TXN-1", 0)];
        let mut altered = txns.clone();
        altered[0].amount = 100.01;
        assert_ne!(
            TransactionWindow::new(&txns).unwrap().fingerprint(),
            TransactionWindow::new(&altered).unwrap().fingerprint()
        );
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let txns = vec![
            create_test_transaction("TXN-1", 0),
            create_test_transaction("TXN-1", 5),
        ];
        let err = TransactionWindow::new(&txns).unwrap_err();
        assert_eq!(err, ValidationError::DuplicateTransactionId("TXN-1".to_string()));
    }

    #[test]
    fn test_rejects_empty_account() {
        let mut txn = create_test_transaction("TXN-1", 0);
        txn.to_account = "  ".to_string();
        let err = TransactionWindow::new(std::slice::from_ref(&txn)).unwrap_err();
        assert!(matches!(err, ValidationError::EmptyField { ref field, .. } if field == "to_account"));
    }

    #[test]
    fn test_rejects_nan_amount() {
        let mut txn = create_test_transaction("TXN-1", 0);
        txn.amount = f64::NAN;
        assert!(matches!(
            TransactionWindow::new(std::slice::from_ref(&txn)),
            Err(ValidationError::NonFiniteAmount { .. })
        ));
    }

    #[test]
    fn test_jurisdiction_codes() {
        let ok = create_test_transaction("TXN-1", 0).with_jurisdiction("in-mh");
        assert!(TransactionWindow::new(std::slice::from_ref(&ok)).is_ok());

        let bad = create_test_transaction("TXN-2", 0).with_jurisdiction("UAE1");
        assert!(matches!(
            TransactionWindow::new(std::slice::from_ref(&bad)),
            Err(ValidationError::InvalidJurisdiction { .. })
        ));
    }

    #[test]
    fn test_window_limit() {
        let txns: Vec<Transaction> = (0..4)
            .map(|i| create_test_transaction(&format!("TXN-{}", i), i))
            .collect();
        assert!(TransactionWindow::with_limit(&txns, Some(4)).is_ok());
        assert_eq!(
            TransactionWindow::with_limit(&txns, Some(3)).unwrap_err(),
            ValidationError::WindowTooLarge { size: 4, limit: 3 }
        );
    }

    #[test]
    fn test_reference_instant() {
        let txns = vec![
            create_test_transaction("TXN-1", 0),
            create_test_transaction("TXN-2", 30),
        ];
        let window = TransactionWindow::new(&txns).unwrap();
        let latest = base_time() + Duration::minutes(30);

        assert_eq!(window.reference_instant(None).unwrap(), Some(latest));
        assert_eq!(
            window.reference_instant(Some(latest + Duration::hours(1))).unwrap(),
            Some(latest + Duration::hours(1))
        );
        assert!(matches!(
            window.reference_instant(Some(base_time())),
            Err(ValidationError::ReferenceBeforeTransaction { .. })
        ));

        let empty = TransactionWindow::new(&[]).unwrap();
        assert_eq!(empty.reference_instant(None).unwrap(), None);
        assert_eq!(
            empty.reference_instant(Some(base_time())).unwrap(),
            Some(base_time())
        );
    }
}
