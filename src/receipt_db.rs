// src/receipt_db.rs

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, params};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::fields::ExtractedFields;

pub struct ReceiptStore {
    conn: Connection,
}

/// Metadata row for an uploaded receipt file. Created on ingest, mutated on
/// validate/process, never touched by the extractors themselves.
#[derive(Debug, Clone)]
pub struct ReceiptFileRow {
    pub id: i64,
    pub uid: String,
    pub file_name: String,
    pub file_path: String,
    pub is_valid: bool,
    pub invalid_reason: Option<String>,
    pub is_processed: bool,
}

/// A stored extraction result joined with its source file name.
#[derive(Debug, Clone)]
pub struct ReceiptRow {
    pub id: i64,
    pub receipt_file_id: i64,
    pub file_name: String,
    pub fields: ExtractedFields,
    pub created_at: String,
}

impl ReceiptStore {
    /// Open (or create) the receipt store with a SQLite backend.
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS receipt_files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                uid TEXT NOT NULL,
                file_name TEXT NOT NULL,
                file_path TEXT NOT NULL,
                is_valid INTEGER NOT NULL DEFAULT 1,
                invalid_reason TEXT,
                is_processed INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS receipts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                receipt_file_id INTEGER NOT NULL,
                merchant_name TEXT NOT NULL,
                total_amount TEXT NOT NULL,
                purchased_at TEXT NOT NULL,
                currency TEXT NOT NULL DEFAULT 'USD',
                tax_amount TEXT,
                subtotal_amount TEXT,
                payment_method TEXT,
                receipt_number TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (receipt_file_id) REFERENCES receipt_files(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_receipt_files_is_processed
             ON receipt_files(is_processed)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_receipts_receipt_file_id
             ON receipts(receipt_file_id)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_receipts_purchased_at
             ON receipts(purchased_at)",
            [],
        )?;

        Ok(Self { conn })
    }

    /// Content-addressed identifier for an uploaded file.
    pub fn generate_uid(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let hex = format!("{:x}", hasher.finalize());
        hex[..16].to_string()
    }

    pub fn insert_file(&self, uid: &str, file_name: &str, file_path: &str) -> SqliteResult<i64> {
        self.conn.execute(
            "INSERT INTO receipt_files (uid, file_name, file_path) VALUES (?1, ?2, ?3)",
            params![uid, file_name, file_path],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_file(&self, id: i64) -> SqliteResult<Option<ReceiptFileRow>> {
        self.conn
            .query_row(
                "SELECT id, uid, file_name, file_path, is_valid, invalid_reason, is_processed
                 FROM receipt_files WHERE id = ?1",
                params![id],
                row_to_file,
            )
            .optional()
    }

    /// Valid files that have not been processed yet, oldest first.
    pub fn get_unprocessed(&self) -> SqliteResult<Vec<ReceiptFileRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uid, file_name, file_path, is_valid, invalid_reason, is_processed
             FROM receipt_files
             WHERE is_processed = 0 AND is_valid = 1
             ORDER BY id",
        )?;
        let rows = stmt.query_map([], row_to_file)?;
        rows.collect()
    }

    pub fn set_validity(&self, id: i64, is_valid: bool, reason: Option<&str>) -> SqliteResult<()> {
        self.conn.execute(
            "UPDATE receipt_files
             SET is_valid = ?2, invalid_reason = ?3, updated_at = CURRENT_TIMESTAMP
             WHERE id = ?1",
            params![id, is_valid, reason],
        )?;
        Ok(())
    }

    pub fn mark_processed(&self, id: i64) -> SqliteResult<()> {
        self.conn.execute(
            "UPDATE receipt_files
             SET is_processed = 1, updated_at = CURRENT_TIMESTAMP
             WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    pub fn insert_receipt(&self, receipt_file_id: i64, fields: &ExtractedFields) -> SqliteResult<i64> {
        self.conn.execute(
            "INSERT INTO receipts (receipt_file_id, merchant_name, total_amount, purchased_at,
                                   currency, tax_amount, subtotal_amount, payment_method, receipt_number)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                receipt_file_id,
                fields.merchant_name,
                fields.total_amount.to_string(),
                fields.purchased_at.to_rfc3339(),
                fields.currency,
                fields.tax_amount.map(|a| a.to_string()),
                fields.subtotal_amount.map(|a| a.to_string()),
                fields.payment_method,
                fields.receipt_number,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Receipts from processed files, newest purchase first.
    pub fn list_receipts(&self) -> SqliteResult<Vec<ReceiptRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.id, r.receipt_file_id, r.merchant_name, r.total_amount, r.purchased_at,
                    r.currency, r.tax_amount, r.subtotal_amount, r.payment_method, r.receipt_number,
                    f.file_name, r.created_at
             FROM receipts r
             JOIN receipt_files f ON f.id = r.receipt_file_id
             WHERE f.is_processed = 1
             ORDER BY r.purchased_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_receipt)?;
        rows.collect()
    }

    pub fn get_receipt(&self, id: i64) -> SqliteResult<Option<ReceiptRow>> {
        self.conn
            .query_row(
                "SELECT r.id, r.receipt_file_id, r.merchant_name, r.total_amount, r.purchased_at,
                        r.currency, r.tax_amount, r.subtotal_amount, r.payment_method, r.receipt_number,
                        f.file_name, r.created_at
                 FROM receipts r
                 JOIN receipt_files f ON f.id = r.receipt_file_id
                 WHERE r.id = ?1",
                params![id],
                row_to_receipt,
            )
            .optional()
    }

    /// (files total, files processed, receipts total) for the summary log.
    pub fn get_counts(&self) -> SqliteResult<(i64, i64, i64)> {
        let files: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM receipt_files", [], |r| r.get(0))?;
        let processed: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM receipt_files WHERE is_processed = 1",
            [],
            |r| r.get(0),
        )?;
        let receipts: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM receipts", [], |r| r.get(0))?;
        Ok((files, processed, receipts))
    }
}

fn row_to_file(row: &rusqlite::Row) -> SqliteResult<ReceiptFileRow> {
    Ok(ReceiptFileRow {
        id: row.get(0)?,
        uid: row.get(1)?,
        file_name: row.get(2)?,
        file_path: row.get(3)?,
        is_valid: row.get(4)?,
        invalid_reason: row.get(5)?,
        is_processed: row.get(6)?,
    })
}

fn row_to_receipt(row: &rusqlite::Row) -> SqliteResult<ReceiptRow> {
    let total: String = row.get(3)?;
    let purchased: String = row.get(4)?;
    let tax: Option<String> = row.get(6)?;
    let subtotal: Option<String> = row.get(7)?;

    Ok(ReceiptRow {
        id: row.get(0)?,
        receipt_file_id: row.get(1)?,
        fields: ExtractedFields {
            merchant_name: row.get(2)?,
            total_amount: total.parse().unwrap_or_default(),
            purchased_at: DateTime::parse_from_rfc3339(&purchased)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            currency: row.get(5)?,
            tax_amount: tax.and_then(|s| s.parse().ok()),
            subtotal_amount: subtotal.and_then(|s| s.parse().ok()),
            payment_method: row.get(8)?,
            receipt_number: row.get(9)?,
        },
        file_name: row.get(10)?,
        created_at: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn sample_fields() -> ExtractedFields {
        ExtractedFields {
            merchant_name: "Joe's Diner".to_string(),
            total_amount: "45.67".parse().unwrap(),
            purchased_at: Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap(),
            currency: "USD".to_string(),
            tax_amount: Some("3.67".parse().unwrap()),
            subtotal_amount: None,
            payment_method: Some("VISA".to_string()),
            receipt_number: None,
        }
    }

    #[test]
    fn file_lifecycle_round_trips() {
        let store = ReceiptStore::new(":memory:").unwrap();
        let id = store
            .insert_file("abcd1234abcd1234", "receipt.pdf", "media/abcd_receipt.pdf")
            .unwrap();

        let row = store.get_file(id).unwrap().unwrap();
        assert!(row.is_valid);
        assert!(!row.is_processed);
        assert_eq!(row.file_name, "receipt.pdf");

        store.set_validity(id, false, Some("not a PDF file")).unwrap();
        let row = store.get_file(id).unwrap().unwrap();
        assert!(!row.is_valid);
        assert_eq!(row.invalid_reason.as_deref(), Some("not a PDF file"));

        store.set_validity(id, true, None).unwrap();
        assert_eq!(store.get_unprocessed().unwrap().len(), 1);

        store.mark_processed(id).unwrap();
        assert!(store.get_unprocessed().unwrap().is_empty());
    }

    #[test]
    fn receipts_round_trip_through_text_columns() {
        let store = ReceiptStore::new(":memory:").unwrap();
        let file_id = store
            .insert_file("abcd1234abcd1234", "receipt.pdf", "media/abcd_receipt.pdf")
            .unwrap();
        let receipt_id = store.insert_receipt(file_id, &sample_fields()).unwrap();
        store.mark_processed(file_id).unwrap();

        let row = store.get_receipt(receipt_id).unwrap().unwrap();
        assert_eq!(row.fields, sample_fields());
        assert_eq!(row.file_name, "receipt.pdf");

        let listed = store.list_receipts().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, receipt_id);
    }

    #[test]
    fn counts_track_processing() {
        let store = ReceiptStore::new(":memory:").unwrap();
        let a = store.insert_file("a", "a.pdf", "media/a.pdf").unwrap();
        store.insert_file("b", "b.pdf", "media/b.pdf").unwrap();

        store.insert_receipt(a, &sample_fields()).unwrap();
        store.mark_processed(a).unwrap();

        assert_eq!(store.get_counts().unwrap(), (2, 1, 1));
    }

    #[test]
    fn uid_is_stable_and_content_addressed() {
        let one = ReceiptStore::generate_uid(b"same bytes");
        let two = ReceiptStore::generate_uid(b"same bytes");
        let other = ReceiptStore::generate_uid(b"different bytes");
        assert_eq!(one, two);
        assert_ne!(one, other);
        assert_eq!(one.len(), 16);
    }
}
