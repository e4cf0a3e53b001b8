//! SQLite-backed [`Store`].
//!
//! Headers live in `commitments`, the log in `tracking_records` keyed by
//! `(commitment_id, seq)`. Timestamps are stored as microseconds since the
//! epoch, dates as `YYYY-MM-DD` text.

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{check_append_only, CommitmentFilter, Store};
use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::{
    Category, Commitment, CommitmentStatus, RecordType, SourceRef, TrackingLog, TrackingRecord,
};

const HEADER_COLUMNS: &str = "id, title, short_name, category, text, target_date, target_value, \
    responsible_agency, status, source_document_id, source_term, source_session_period, \
    source_ey_number, source_url, created_at, last_updated";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database, creating the schema if needed.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    async fn load_records(&self, id: &str) -> Result<Vec<TrackingRecord>> {
        let rows = sqlx::query(
            "SELECT commitment_id, date, record_type, summary, source_ref, new_status \
             FROM tracking_records WHERE commitment_id = ? ORDER BY seq ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_record).collect()
    }
}

fn micros_to_datetime(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| anyhow!("timestamp out of range: {}", micros))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("bad stored date: {}", s))
}

fn row_to_record(row: &SqliteRow) -> Result<TrackingRecord> {
    let date: String = row.get("date");
    let record_type: String = row.get("record_type");
    let new_status: Option<String> = row.get("new_status");

    Ok(TrackingRecord {
        date: parse_date(&date)?,
        record_type: RecordType::parse(&record_type)
            .ok_or_else(|| anyhow!("unknown record type: {}", record_type))?,
        summary: row.get("summary"),
        source_ref: row.get("source_ref"),
        new_status: match new_status {
            Some(s) => Some(
                CommitmentStatus::parse(&s).ok_or_else(|| anyhow!("unknown status: {}", s))?,
            ),
            None => None,
        },
    })
}

fn row_to_commitment(row: &SqliteRow, records: Vec<TrackingRecord>) -> Result<Commitment> {
    let category: String = row.get("category");
    let status: String = row.get("status");
    let target_date: Option<String> = row.get("target_date");
    let term: Option<i64> = row.get("source_term");
    let session_period: Option<i64> = row.get("source_session_period");

    Ok(Commitment {
        id: row.get("id"),
        title: row.get("title"),
        short_name: row.get("short_name"),
        category: Category::from_slug(&category)
            .ok_or_else(|| anyhow!("unknown category: {}", category))?,
        text: row.get("text"),
        target_date: target_date.as_deref().map(parse_date).transpose()?,
        target_value: row.get("target_value"),
        responsible_agency: row.get("responsible_agency"),
        status: CommitmentStatus::parse(&status)
            .ok_or_else(|| anyhow!("unknown status: {}", status))?,
        source: SourceRef {
            document_id: row.get("source_document_id"),
            term: term.map(|t| t as u32),
            session_period: session_period.map(|s| s as u32),
            ey_number: row.get("source_ey_number"),
            url: row.get("source_url"),
        },
        created_at: micros_to_datetime(row.get("created_at"))?,
        last_updated: micros_to_datetime(row.get("last_updated"))?,
        tracking_history: TrackingLog::from(records),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn get(&self, id: &str) -> Result<Option<Commitment>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM commitments WHERE id = ?",
            HEADER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let records = self.load_records(id).await?;
                Ok(Some(row_to_commitment(&row, records)?))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, commitment: &Commitment) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let stored_rows = sqlx::query(
            "SELECT commitment_id, date, record_type, summary, source_ref, new_status \
             FROM tracking_records WHERE commitment_id = ? ORDER BY seq ASC",
        )
        .bind(&commitment.id)
        .fetch_all(&mut *tx)
        .await?;
        let stored: Vec<TrackingRecord> =
            stored_rows.iter().map(row_to_record).collect::<Result<_>>()?;
        let incoming = commitment.tracking_history.entries();
        check_append_only(&commitment.id, &stored, incoming)?;

        sqlx::query(
            r#"
            INSERT INTO commitments (id, title, short_name, category, text, target_date, target_value,
                responsible_agency, status, source_document_id, source_term, source_session_period,
                source_ey_number, source_url, created_at, last_updated)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                short_name = excluded.short_name,
                category = excluded.category,
                text = excluded.text,
                target_date = excluded.target_date,
                target_value = excluded.target_value,
                responsible_agency = excluded.responsible_agency,
                status = excluded.status,
                source_document_id = excluded.source_document_id,
                source_term = excluded.source_term,
                source_session_period = excluded.source_session_period,
                source_ey_number = excluded.source_ey_number,
                source_url = excluded.source_url,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&commitment.id)
        .bind(&commitment.title)
        .bind(&commitment.short_name)
        .bind(commitment.category.slug())
        .bind(&commitment.text)
        .bind(commitment.target_date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(&commitment.target_value)
        .bind(&commitment.responsible_agency)
        .bind(commitment.status.as_str())
        .bind(&commitment.source.document_id)
        .bind(commitment.source.term.map(i64::from))
        .bind(commitment.source.session_period.map(i64::from))
        .bind(&commitment.source.ey_number)
        .bind(&commitment.source.url)
        .bind(commitment.created_at.timestamp_micros())
        .bind(commitment.last_updated.timestamp_micros())
        .execute(&mut *tx)
        .await?;

        for (seq, record) in incoming.iter().enumerate().skip(stored.len()) {
            sqlx::query(
                "INSERT INTO tracking_records (commitment_id, seq, date, record_type, summary, source_ref, new_status) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&commitment.id)
            .bind(seq as i64)
            .bind(record.date.format("%Y-%m-%d").to_string())
            .bind(record.record_type.as_str())
            .bind(&record.summary)
            .bind(&record.source_ref)
            .bind(record.new_status.map(|s| s.as_str()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list(&self, filter: &CommitmentFilter) -> Result<Vec<Commitment>> {
        let header_rows = sqlx::query(&format!(
            "SELECT {} FROM commitments ORDER BY created_at ASC, rowid ASC",
            HEADER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let record_rows = sqlx::query(
            "SELECT commitment_id, date, record_type, summary, source_ref, new_status \
             FROM tracking_records ORDER BY commitment_id, seq ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut logs: HashMap<String, Vec<TrackingRecord>> = HashMap::new();
        for row in &record_rows {
            let id: String = row.get("commitment_id");
            logs.entry(id).or_default().push(row_to_record(row)?);
        }

        let mut out = Vec::new();
        for row in &header_rows {
            let id: String = row.get("id");
            let records = logs.remove(&id).unwrap_or_default();
            let commitment = row_to_commitment(row, records)?;
            if filter.matches(&commitment) {
                out.push(commitment);
            }
        }
        Ok(out)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM tracking_records WHERE commitment_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM commitments WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}
