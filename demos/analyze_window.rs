//! Window analysis example
//!
//! Runs the behavioral profile and the hawala detector over a few
//! hand-built transaction windows and prints the findings.

use chrono::{Duration, TimeZone, Utc};
use hawala_pattern_core::{DetectorConfig, PatternAnalyzer, Transaction};

fn main() {
    env_logger::init();
    println!("=== Hawala Pattern Core ===\n");

    let analyzer = PatternAnalyzer::new();
    let start = Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap();

    // Example 1: ordinary activity
    println!("1. Ordinary Payroll Activity");
    let payroll: Vec<Transaction> = (0..4)
        .map(|i| {
            Transaction::transfer(
                &format!("PAY-{}", i),
                "ACC-EMPLOYER",
                "ACC-STAFF-01",
                3_200.0,
                start + Duration::days(7 * i),
            )
        })
        .collect();
    print_report(&analyzer, &payroll);

    // Example 2: a burst of transfers within the hour
    println!("2. Velocity Burst");
    let burst: Vec<Transaction> = (0..25)
        .map(|i| {
            Transaction::transfer(
                &format!("BUR-{:02}", i),
                "ACC-BURST",
                &format!("ACC-DEST-{:02}", i % 3),
                450.0,
                start + Duration::minutes(2 * i),
            )
        })
        .collect();
    print_report(&analyzer, &burst);

    // Example 3: structured transfers fanned out, plus a cross-border offset
    println!("3. Structuring, Fan-Out and Mirror Trading");
    let mut layering: Vec<Transaction> = (0..8)
        .map(|i| {
            Transaction::transfer(
                &format!("LAY-{}", i),
                "ACC-BROKER",
                &format!("ACC-COURIER-{}", i),
                9_400.0,
                start + Duration::minutes(6 * i),
            )
        })
        .collect();
    layering.push(
        Transaction::transfer("MIR-OUT", "ACC-BROKER", "ACC-PARTNER", 120_000.0, start)
            .with_jurisdiction("AE"),
    );
    layering.push(
        Transaction::transfer(
            "MIR-BACK",
            "ACC-PARTNER",
            "ACC-BROKER",
            119_400.0,
            start + Duration::hours(6),
        )
        .with_jurisdiction("IN"),
    );
    print_report(&analyzer, &layering);

    // Example 4: stricter thresholds from JSON
    println!("4. Custom Thresholds");
    let config = DetectorConfig::from_json_str(
        r#"{ "hawala": { "reporting_threshold": 3000.0 }, "max_window_size": 500 }"#,
    );
    match config.map(PatternAnalyzer::with_config) {
        Ok(Ok(strict)) => {
            let small: Vec<Transaction> = (0..5)
                .map(|i| {
                    Transaction::transfer(
                        &format!("SML-{}", i),
                        "ACC-SMALL",
                        "ACC-MULE",
                        900.0,
                        start + Duration::hours(i),
                    )
                })
                .collect();
            print_report(&strict, &small);
        }
        Ok(Err(e)) | Err(e) => println!("   Config error: {}\n", e),
    }

    // Example 5: rejected input
    println!("5. Duplicate Transaction IDs");
    let duplicated = vec![payroll[0].clone(), payroll[0].clone()];
    match analyzer.analyze_window(&duplicated, None) {
        Ok(_) => println!("   Unexpectedly accepted\n"),
        Err(e) => println!("   Rejected: {}\n", e),
    }

    println!("=== Example Complete ===");
}

fn print_report(analyzer: &PatternAnalyzer, transactions: &[Transaction]) {
    let report = match analyzer.analyze_window(transactions, None) {
        Ok(report) => report,
        Err(e) => {
            println!("   Rejected: {}\n", e);
            return;
        }
    };

    let behavior = &report.behavior;
    println!("   Transactions: {}", behavior.transaction_count);
    println!(
        "   Velocity: {}/h, {}/day, {}/week",
        behavior.velocity_profile.transactions_per_hour,
        behavior.velocity_profile.transactions_per_day,
        behavior.velocity_profile.transactions_per_week
    );
    println!("   Risk Level: {}", behavior.risk_level);
    println!(
        "   Velocity Adjustment: {:+.1}",
        behavior.velocity_risk_adjustment
    );
    for pattern in &behavior.temporal_patterns {
        println!(
            "   Timing: {} ({:.2})",
            pattern.pattern_type, pattern.confidence
        );
    }
    for flag in &behavior.anomaly_flags {
        println!("   Anomaly [{:?}]: {}", flag.severity, flag.description);
    }

    let hawala = &report.hawala;
    println!("   Hawala Score: {:.1}/100", hawala.hawala_score);
    for pattern in &hawala.patterns {
        println!("   Pattern {}: {}", pattern.pattern_type, pattern.description);
    }
    println!("   Recommendation: {}", hawala.recommendation);
    println!();
}
