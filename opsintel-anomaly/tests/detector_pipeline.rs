use chrono::{Duration, NaiveDate};
use opsintel_anomaly::{AnomalyDetector, CheckOutcome, MetricKind, Severity};
use opsintel_core::storage::StorageManager;
use opsintel_core::{DatabaseConfig, DetectorConfig};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

const HEADER: &str = "day,entity,product,price_tier,anticipation_method,payment_method,installments,amount_transacted,quantity_transactions,quantity_of_merchants";

fn day(offset: i64) -> String {
    let start = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
    (start + Duration::days(offset)).format("%Y-%m-%d").to_string()
}

/// 21 days of data:
/// - `pix`: two rows a day summing to 99 or 101, then 400 on the last day
/// - `pos`: a flat 20 a day
/// - `link`: a single row on the last day
fn fixture() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", HEADER).unwrap();

    for i in 0..21 {
        let half = if i == 20 {
            200.0
        } else if i % 2 == 0 {
            49.5
        } else {
            50.5
        };
        // mix of plain and timestamped day formats
        let d = if i % 3 == 0 {
            format!("{} 00:00:00", day(i))
        } else {
            day(i)
        };
        writeln!(file, "{},PJ,pix,normal,D+1,pix,1,{},1,1", d, half).unwrap();
        writeln!(file, "{},PF,pix,normal,D+1,pix,1,{},1,1", d, half).unwrap();
        writeln!(file, "{},PJ,pos,intermediary,D+30,credit,3,20.0,2,1", d).unwrap();
    }
    writeln!(file, "{},PF,link,aggressive,D+0,debit,,7.0,1,1", day(20)).unwrap();

    file.flush().unwrap();
    file
}

async fn loaded_store() -> Arc<StorageManager> {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        ..Default::default()
    };
    let storage = StorageManager::connect(&config).await.unwrap();
    let csv = fixture();
    let rows = storage.load_csv(csv.path()).await.unwrap();
    assert_eq!(rows, 64);
    Arc::new(storage)
}

#[tokio::test]
async fn test_pipeline_over_sqlite() {
    let storage = loaded_store().await;
    let detector = AnomalyDetector::new(storage, &DetectorConfig::default()).unwrap();

    let report = detector.run_all_checks().await;

    let tpv = report.total_tpv.alert().unwrap();
    assert_eq!(tpv.current_value, 427.0);
    assert_eq!(tpv.severity, Severity::Critical);
    assert!(tpv.message.starts_with("Total TPV spiked"));

    // flat 4 a day, then 5: no spread in the window
    let tx = report.transactions.alert().unwrap();
    assert_eq!(tx.metric, MetricKind::Transactions);
    assert_eq!(tx.expected_value, 4.0);
    assert_eq!(tx.change_pct, 25.0);
    assert_eq!(tx.z_score, 0.0);
    assert_eq!(tx.severity, Severity::Normal);

    let products: Vec<(&str, Severity)> = report
        .by_product
        .iter()
        .filter_map(CheckOutcome::alert)
        .map(|a| (a.dimension.as_str(), a.severity))
        .collect();
    assert_eq!(
        products,
        vec![
            ("link", Severity::Normal),
            ("pix", Severity::Critical),
            ("pos", Severity::Normal),
        ]
    );

    let link = report.by_product[0].alert().unwrap();
    assert_eq!(link.expected_value, 7.0);
    assert_eq!(link.change_pct, 0.0);

    assert_eq!(report.summary.total_alerts, 5);
    assert_eq!(report.summary.critical, 2);
    assert_eq!(report.summary.warning, 0);
    assert_eq!(report.summary.normal, 3);
    assert_eq!(report.summary.unavailable, 0);
}

#[tokio::test]
async fn test_display_feed_over_sqlite() {
    let storage = loaded_store().await;
    let detector = AnomalyDetector::new(storage, &DetectorConfig::default()).unwrap();

    let feed = detector.alert_feed().await;
    assert!(feed.unavailable.is_empty());

    let order: Vec<(MetricKind, &str)> = feed
        .alerts
        .iter()
        .map(|a| (a.metric, a.dimension.as_str()))
        .collect();
    assert_eq!(
        order,
        vec![
            (MetricKind::Tpv, "total"),
            (MetricKind::Tpv, "pix"),
            (MetricKind::Transactions, "total"),
            (MetricKind::Tpv, "link"),
            (MetricKind::Tpv, "pos"),
        ]
    );

    let json = serde_json::to_value(&feed.alerts[1]).unwrap();
    assert_eq!(json["severity"], "critical");
    assert_eq!(json["icon"], "[!!!]");
    assert_eq!(json["color"], "red");
    assert_eq!(json["metric"], "tpv");
}

#[tokio::test]
async fn test_empty_table_reports_unavailable_totals() {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        ..Default::default()
    };
    let storage = StorageManager::connect(&config).await.unwrap();
    let mut csv = NamedTempFile::new().unwrap();
    writeln!(csv, "{}", HEADER).unwrap();
    csv.flush().unwrap();
    assert_eq!(storage.load_csv(csv.path()).await.unwrap(), 0);

    let detector =
        AnomalyDetector::new(Arc::new(storage), &DetectorConfig::default()).unwrap();
    let report = detector.run_all_checks().await;

    assert!(report.total_tpv.failure().is_some());
    assert!(report.transactions.failure().is_some());
    assert!(report.by_product.is_empty());
    assert!(detector.alerts_for_display().await.is_empty());
}

#[tokio::test]
async fn test_missing_table_marks_every_check_unavailable() {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        ..Default::default()
    };
    let storage = StorageManager::connect(&config).await.unwrap();
    let detector =
        AnomalyDetector::new(Arc::new(storage), &DetectorConfig::default()).unwrap();

    let report = detector.run_all_checks().await;
    assert_eq!(report.summary.total_alerts, 0);
    assert_eq!(report.summary.unavailable, 3);
    assert_eq!(report.by_product[0].failure().unwrap().dimension, "*");
}
