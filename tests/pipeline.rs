use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;

use pledge_tracker::checkpoint::{Checkpoint, FileCheckpoint, MemoryCheckpoint};
use pledge_tracker::config::Config;
use pledge_tracker::identity::commitment_id;
use pledge_tracker::index::{build_index, build_index_with_files, scan_records};
use pledge_tracker::models::{CommitmentStatus, Document, RecordType};
use pledge_tracker::oracle::fake::{FakeOracle, FakeReply};
use pledge_tracker::oracle::{OracleTask, RetryPolicy};
use pledge_tracker::pipeline::{ExtractOptions, Pipeline};
use pledge_tracker::progress::NoProgress;
use pledge_tracker::record;
use pledge_tracker::store::memory::InMemoryStore;
use pledge_tracker::store::sqlite::SqliteStore;
use pledge_tracker::store::{CommitmentFilter, Store};

const PLEDGE_TEXT: &str = "政府承諾於2026年將再生能源占比提升至20%";
const PLEDGE_TITLE: &str = "再生能源占比提升至20%";

fn fast() -> RetryPolicy {
    RetryPolicy {
        max_retries: 1,
        base_delay: Duration::ZERO,
        timeout: Duration::from_millis(100),
    }
}

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn document(id: &str, meeting: u32, content: &str) -> Document {
    Document {
        id: id.to_string(),
        term: 11,
        session_period: 2,
        meeting_index: meeting,
        ey_number: Some(format!("院臺{}", meeting)),
        ly_number: None,
        subject: "行政院答復立法委員質詢".to_string(),
        content: content.to_string(),
        source_url: Some(format!("https://example.gov.tw/{}", id)),
        date: None,
    }
}

fn d1() -> Document {
    document("D1", 1, PLEDGE_TEXT)
}

fn d2() -> Document {
    document("D2", 2, "再生能源占比已達20%，目標達成")
}

fn extraction_reply() -> FakeReply {
    FakeReply::Json(json!({
        "commitments": [{
            "title": PLEDGE_TITLE,
            "short_name": "再生能源占比",
            "category": "環境能源",
            "text": PLEDGE_TEXT,
            "target_date": "2026",
            "target_value": "20%",
            "responsible_agency": "經濟部"
        }]
    }))
}

fn scripted_oracle() -> FakeOracle {
    let c1 = commitment_id(PLEDGE_TITLE, PLEDGE_TEXT);
    FakeOracle::new()
        .reply(OracleTask::Extract, Some(PLEDGE_TEXT), extraction_reply())
        .reply(
            OracleTask::Screen,
            Some("目標達成"),
            FakeReply::Json(json!({ "related_ids": [c1] })),
        )
        .reply(
            OracleTask::Verify,
            Some("目標達成"),
            FakeReply::Json(json!({
                "is_related": true,
                "relation_type": "fulfillment_evidence",
                "summary": "再生能源占比已達20%，目標達成",
                "is_fulfilled": true,
                "confidence": "high"
            })),
        )
}

#[tokio::test]
async fn renewable_energy_pledge_is_extracted_then_fulfilled() {
    let config = Config::minimal();
    let store = InMemoryStore::new();
    let oracle = scripted_oracle();
    let pipeline = Pipeline::new(&config, &store, &oracle, &NoProgress).with_policy(fast());
    let docs = vec![d1(), d2()];

    let extract_cp = MemoryCheckpoint::new();
    let summary = pipeline
        .extract(&docs, &extract_cp, ExtractOptions::default(), at(2025, 3, 4))
        .await
        .unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.created, 1);

    let id = commitment_id(PLEDGE_TITLE, PLEDGE_TEXT);
    let c1 = store.get(&id).await.unwrap().unwrap();
    assert_eq!(c1.status, CommitmentStatus::Tracking);
    assert_eq!(c1.target_value.as_deref(), Some("20%"));
    assert_eq!(c1.target_date, NaiveDate::from_ymd_opt(2026, 12, 31));
    assert_eq!(c1.source.document_id.as_deref(), Some("D1"));
    assert_eq!(c1.tracking_history.len(), 1);

    let track_cp = MemoryCheckpoint::new();
    let summary = pipeline
        .track(&docs, &track_cp, None, at(2025, 9, 1))
        .await
        .unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.updated, 1);

    let c1 = store.get(&id).await.unwrap().unwrap();
    assert_eq!(c1.status, CommitmentStatus::Fulfilled);
    assert_eq!(c1.tracking_history.len(), 2);
    let last = c1.tracking_history.last().unwrap();
    assert_eq!(last.record_type, RecordType::StatusChange);
    assert_eq!(last.source_ref.as_deref(), Some("D2"));

    // Past the target date, the sweep leaves a fulfilled commitment alone.
    let summary = pipeline.sweep(at(2027, 6, 1)).await.unwrap();
    assert_eq!(summary.updated, 0);
    let c1 = store.get(&id).await.unwrap().unwrap();
    assert_eq!(c1.status, CommitmentStatus::Fulfilled);
    assert_eq!(c1.tracking_history.len(), 2);

    let (replayed, last_date) = c1.tracking_history.replay().unwrap();
    assert_eq!(replayed, c1.status);
    assert_eq!(last_date, c1.last_updated.date_naive());
}

#[tokio::test]
async fn unfulfilled_pledge_goes_delayed_after_target() {
    let config = Config::minimal();
    let store = InMemoryStore::new();
    let oracle = scripted_oracle();
    let pipeline = Pipeline::new(&config, &store, &oracle, &NoProgress).with_policy(fast());

    pipeline
        .extract(&[d1()], &MemoryCheckpoint::new(), ExtractOptions::default(), at(2025, 3, 4))
        .await
        .unwrap();
    let summary = pipeline.sweep(at(2027, 1, 1)).await.unwrap();
    assert_eq!(summary.updated, 1);

    let open = store.list(&CommitmentFilter::open()).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].status, CommitmentStatus::Delayed);
    assert!(open[0]
        .tracking_history
        .last()
        .unwrap()
        .summary
        .contains("2026-12-31"));
}

#[tokio::test]
async fn interrupted_extraction_resumes_where_it_stopped() {
    let tmp = TempDir::new().unwrap();
    let config = Config::minimal();
    let store = InMemoryStore::new();
    // D2 fails transiently on both attempts of the first run, then answers.
    let oracle = FakeOracle::new()
        .reply(OracleTask::Extract, Some(PLEDGE_TEXT), extraction_reply())
        .reply_once(OracleTask::Extract, Some("目標達成"), FakeReply::Transient)
        .reply_once(OracleTask::Extract, Some("目標達成"), FakeReply::Transient);
    let pipeline = Pipeline::new(&config, &store, &oracle, &NoProgress).with_policy(fast());
    let docs = vec![d1(), d2()];

    {
        let cp = FileCheckpoint::open(tmp.path(), "extract").unwrap();
        let first = pipeline
            .extract(&docs, &cp, ExtractOptions::default(), at(2025, 3, 4))
            .await
            .unwrap();
        assert_eq!(first.processed, 1);
        assert_eq!(first.failed, 1);
        assert!(cp.is_done("D1"));
        assert!(!cp.is_done("D2"));
    }

    let extract_calls_before = oracle.calls_for(OracleTask::Extract);
    let cp = FileCheckpoint::open(tmp.path(), "extract").unwrap();
    let second = pipeline
        .extract(&docs, &cp, ExtractOptions::default(), at(2025, 3, 5))
        .await
        .unwrap();
    assert_eq!(second.skipped, 1);
    assert_eq!(second.processed, 1);
    assert_eq!(second.failed, 0);
    assert_eq!(oracle.calls_for(OracleTask::Extract), extract_calls_before + 1);
    assert!(cp.is_done("D2"));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn dry_run_never_calls_the_oracle() {
    let config = Config::minimal();
    let store = InMemoryStore::new();
    let oracle = scripted_oracle();
    let pipeline = Pipeline::new(&config, &store, &oracle, &NoProgress);
    let cp = MemoryCheckpoint::new();

    let options = ExtractOptions {
        dry_run: true,
        ..ExtractOptions::default()
    };
    let summary = pipeline
        .extract(&[d1(), d2()], &cp, options, at(2025, 3, 4))
        .await
        .unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(oracle.call_count(), 0);
    assert!(cp.is_empty());
    assert!(store.is_empty());
}

#[tokio::test]
async fn sqlite_store_records_and_index_agree() {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::minimal();
    config.db.path = tmp.path().join("pledge.sqlite");
    let store = SqliteStore::open(&config).await.unwrap();
    let oracle = scripted_oracle();
    let pipeline = Pipeline::new(&config, &store, &oracle, &NoProgress).with_policy(fast());
    let docs = vec![d1(), d2()];

    pipeline
        .extract(&docs, &MemoryCheckpoint::new(), ExtractOptions::default(), at(2025, 3, 4))
        .await
        .unwrap();
    pipeline
        .track(&docs, &MemoryCheckpoint::new(), None, at(2025, 9, 1))
        .await
        .unwrap();

    let stored = store.list(&CommitmentFilter::all()).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, CommitmentStatus::Fulfilled);

    let records_dir = tmp.path().join("records");
    let written = record::write_records(&records_dir, &stored).unwrap();
    assert_eq!(written.len(), 1);
    assert!(written[0].starts_with(records_dir.join("environment")));

    let scanned = scan_records(&records_dir).unwrap();
    assert_eq!(scanned[0].0, stored[0]);

    let now = at(2025, 10, 1);
    assert_eq!(
        build_index(&stored, now),
        build_index_with_files(&scanned, now)
    );

    store.close().await;
}

#[tokio::test]
async fn oversized_subject_fails_only_its_own_document() {
    let config = Config::minimal();
    let store = InMemoryStore::new();
    let oracle = scripted_oracle();
    let pipeline = Pipeline::new(&config, &store, &oracle, &NoProgress).with_policy(fast());

    let mut long = document("LONG", 1, PLEDGE_TEXT);
    long.subject = "主".repeat(3990);
    let docs = vec![long, d1()];

    let dry = pipeline
        .extract(
            &docs,
            &MemoryCheckpoint::new(),
            ExtractOptions {
                dry_run: true,
                ..ExtractOptions::default()
            },
            at(2025, 3, 4),
        )
        .await
        .unwrap();
    assert_eq!(dry.processed, 1);
    assert_eq!(dry.failed, 1);

    let cp = MemoryCheckpoint::new();
    let summary = pipeline
        .extract(&docs, &cp, ExtractOptions::default(), at(2025, 3, 4))
        .await
        .unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.created, 1);
    assert!(cp.is_done("D1"));
    assert!(!cp.is_done("LONG"));
    assert_eq!(store.len(), 1);
}

const LTC_TITLE: &str = "長照服務據點擴充至一千處";
const LTC_TEXT: &str = "長照2.0服務據點將於明年擴充至一千處";

#[tokio::test]
async fn interrupted_tracking_resumes_without_duplicate_records() {
    let tmp = TempDir::new().unwrap();
    let config = Config::minimal();
    let store = InMemoryStore::new();
    let c1 = commitment_id(PLEDGE_TITLE, PLEDGE_TEXT);
    let c2 = commitment_id(LTC_TITLE, LTC_TEXT);
    let progress = |summary: &str| {
        FakeReply::Json(json!({
            "is_related": true,
            "relation_type": "progress_update",
            "summary": summary,
            "is_fulfilled": false,
            "confidence": "medium"
        }))
    };

    // c2's verify times out on both attempts of the first run, then answers.
    let oracle = FakeOracle::new()
        .reply(
            OracleTask::Extract,
            Some(PLEDGE_TEXT),
            FakeReply::Json(json!({
                "commitments": [
                    {
                        "title": PLEDGE_TITLE,
                        "short_name": "再生能源占比",
                        "category": "環境能源",
                        "text": PLEDGE_TEXT,
                        "target_date": "2026",
                        "target_value": "20%"
                    },
                    {
                        "title": LTC_TITLE,
                        "short_name": "長照據點",
                        "category": "社會福利",
                        "text": LTC_TEXT,
                        "target_date": null,
                        "target_value": "一千處"
                    }
                ]
            })),
        )
        .reply(
            OracleTask::Screen,
            Some("均有進展"),
            FakeReply::Json(json!({ "related_ids": [c1, c2] })),
        )
        .reply(OracleTask::Verify, Some(PLEDGE_TITLE), progress("再生能源占比持續提升"))
        .reply_once(OracleTask::Verify, Some(LTC_TITLE), FakeReply::Hang)
        .reply_once(OracleTask::Verify, Some(LTC_TITLE), FakeReply::Hang)
        .reply(OracleTask::Verify, Some(LTC_TITLE), progress("長照據點已擴充至八百處"));
    let pipeline = Pipeline::new(&config, &store, &oracle, &NoProgress).with_policy(fast());

    pipeline
        .extract(&[d1()], &MemoryCheckpoint::new(), ExtractOptions::default(), at(2025, 3, 4))
        .await
        .unwrap();
    assert_eq!(store.len(), 2);

    let update = document("D3", 3, "再生能源與長照服務均有進展");
    let docs = vec![update];

    {
        let cp = FileCheckpoint::open(tmp.path(), "track").unwrap();
        let first = pipeline
            .track(&docs, &cp, None, at(2025, 9, 1))
            .await
            .unwrap();
        assert_eq!(first.processed, 0);
        assert_eq!(first.failed, 1);
        assert!(!cp.is_done("D3"));
    }
    // c1 was written before the document failed.
    assert_eq!(store.get(&c1).await.unwrap().unwrap().tracking_history.len(), 2);
    assert_eq!(store.get(&c2).await.unwrap().unwrap().tracking_history.len(), 1);

    let c1_verifies = oracle
        .calls()
        .iter()
        .filter(|r| r.task == OracleTask::Verify && r.user_text.contains(PLEDGE_TITLE))
        .count();

    let cp = FileCheckpoint::open(tmp.path(), "track").unwrap();
    let second = pipeline
        .track(&docs, &cp, None, at(2025, 9, 2))
        .await
        .unwrap();
    assert_eq!(second.processed, 1);
    assert_eq!(second.failed, 0);
    assert!(cp.is_done("D3"));

    let c1_after = store.get(&c1).await.unwrap().unwrap();
    let c2_after = store.get(&c2).await.unwrap().unwrap();
    assert_eq!(c1_after.tracking_history.len(), 2);
    assert_eq!(c2_after.tracking_history.len(), 2);
    assert_eq!(
        c2_after.tracking_history.last().unwrap().source_ref.as_deref(),
        Some("D3")
    );
    let c1_verifies_after = oracle
        .calls()
        .iter()
        .filter(|r| r.task == OracleTask::Verify && r.user_text.contains(PLEDGE_TITLE))
        .count();
    assert_eq!(c1_verifies_after, c1_verifies);
}
