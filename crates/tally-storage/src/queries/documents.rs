// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Document vault: insurance policies, statements, and other files whose
//! text has already been extracted.

use rusqlite::{OptionalExtension, params, params_from_iter};
use tally_core::TallyError;

use crate::database::{Database, map_tr_err, now_timestamp};
use crate::models::{Document, DocumentUpdate};

const COLUMNS: &str = "document_id, filename, original_filename, file_path, file_size, mime_type,
     document_type, provider, policy_number, extracted_text, summary, effective_date,
     expiration_date, tags, created_at, updated_at";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        document_id: row.get(0)?,
        filename: row.get(1)?,
        original_filename: row.get(2)?,
        file_path: row.get(3)?,
        file_size: row.get(4)?,
        mime_type: row.get(5)?,
        document_type: row.get(6)?,
        provider: row.get(7)?,
        policy_number: row.get(8)?,
        extracted_text: row.get(9)?,
        summary: row.get(10)?,
        effective_date: row.get(11)?,
        expiration_date: row.get(12)?,
        tags: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

/// Insert or replace a document by id.
pub async fn upsert_document(db: &Database, document: &Document) -> Result<(), TallyError> {
    let d = document.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO documents ({COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
                ),
                params![
                    d.document_id,
                    d.filename,
                    d.original_filename,
                    d.file_path,
                    d.file_size,
                    d.mime_type,
                    d.document_type,
                    d.provider,
                    d.policy_number,
                    d.extracted_text,
                    d.summary,
                    d.effective_date,
                    d.expiration_date,
                    d.tags,
                    d.created_at,
                    d.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Documents whose name, text, summary, provider, or tags contain `query`,
/// most recently updated first.
pub async fn search_documents(db: &Database, query: &str) -> Result<Vec<Document>, TallyError> {
    let pattern = format!("%{query}%");
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM documents
                 WHERE filename LIKE ?1
                    OR extracted_text LIKE ?1
                    OR summary LIKE ?1
                    OR provider LIKE ?1
                    OR tags LIKE ?1
                 ORDER BY updated_at DESC, document_id"
            ))?;
            let rows = stmt.query_map(params![pattern], from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Every document, or those of one type, ordered by type, provider, filename.
pub async fn list_documents(
    db: &Database,
    document_type: Option<&str>,
) -> Result<Vec<Document>, TallyError> {
    let document_type = document_type.map(str::to_string);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM documents
                 WHERE ?1 IS NULL OR document_type = ?1
                 ORDER BY document_type, provider, filename"
            ))?;
            let rows = stmt.query_map(params![document_type], from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_document(db: &Database, document_id: &str) -> Result<Option<Document>, TallyError> {
    let document_id = document_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM documents WHERE document_id = ?1"),
                params![document_id],
                from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Documents expiring in `[from, through]` (both `YYYY-MM-DD`), soonest first.
pub async fn expiring_documents(
    db: &Database,
    from: &str,
    through: &str,
) -> Result<Vec<Document>, TallyError> {
    let from = from.to_string();
    let through = through.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM documents
                 WHERE expiration_date IS NOT NULL
                   AND expiration_date BETWEEN ?1 AND ?2
                 ORDER BY expiration_date, filename"
            ))?;
            let rows = stmt.query_map(params![from, through], from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Apply the set fields of `update` and bump `updated_at`.
///
/// Returns whether the document exists. An update with no fields set
/// changes nothing.
pub async fn update_document(
    db: &Database,
    document_id: &str,
    update: &DocumentUpdate,
) -> Result<bool, TallyError> {
    let fields: Vec<(&'static str, String)> = update
        .fields()
        .into_iter()
        .map(|(column, value)| (column, value.to_string()))
        .collect();
    let document_id = document_id.to_string();
    let now = now_timestamp();
    db.connection()
        .call(move |conn| {
            if fields.is_empty() {
                let exists = conn
                    .query_row(
                        "SELECT 1 FROM documents WHERE document_id = ?1",
                        params![document_id],
                        |_| Ok(()),
                    )
                    .optional()?;
                return Ok(exists.is_some());
            }
            let assignments: Vec<String> = fields
                .iter()
                .enumerate()
                .map(|(i, (column, _))| format!("{column} = ?{}", i + 1))
                .collect();
            let sql = format!(
                "UPDATE documents SET {}, updated_at = ?{} WHERE document_id = ?{}",
                assignments.join(", "),
                fields.len() + 1,
                fields.len() + 2,
            );
            let values = fields
                .into_iter()
                .map(|(_, value)| value)
                .chain([now, document_id]);
            let n = conn.execute(&sql, params_from_iter(values))?;
            Ok(n > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Document count per type, most common first. Untyped documents count as
/// `unclassified`.
pub async fn document_type_counts(db: &Database) -> Result<Vec<(String, i64)>, TallyError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT COALESCE(document_type, 'unclassified') AS kind, COUNT(*) AS n
                 FROM documents
                 GROUP BY kind
                 ORDER BY n DESC, kind",
            )?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(id: &str, kind: Option<&str>, expires: Option<&str>) -> Document {
        Document {
            document_id: id.into(),
            filename: format!("{id}.pdf"),
            document_type: kind.map(str::to_string),
            provider: Some("Harbor Mutual".into()),
            extracted_text: Some(format!("policy text for {id}")),
            expiration_date: expires.map(str::to_string),
            created_at: "2026-01-01T00:00:00.000Z".into(),
            updated_at: format!("2026-01-0{}T00:00:00.000Z", id.len()),
            ..Document::default()
        }
    }

    async fn seeded() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        for d in [
            document("auto", Some("insurance"), Some("2026-11-01")),
            document("home", Some("insurance"), Some("2027-06-30")),
            document("w2", None, None),
        ] {
            upsert_document(&db, &d).await.unwrap();
        }
        db
    }

    #[tokio::test]
    async fn search_matches_text_and_provider() {
        let db = seeded().await;
        assert_eq!(search_documents(&db, "Harbor").await.unwrap().len(), 3);
        let hits = search_documents(&db, "text for home").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "home");
    }

    #[tokio::test]
    async fn list_filters_by_type() {
        let db = seeded().await;
        assert_eq!(list_documents(&db, None).await.unwrap().len(), 3);
        assert_eq!(list_documents(&db, Some("insurance")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn expiring_window_is_inclusive() {
        let db = seeded().await;
        let rows = expiring_documents(&db, "2026-10-15", "2026-11-01").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].document_id, "auto");
    }

    #[tokio::test]
    async fn update_touches_only_set_fields() {
        let db = seeded().await;
        let update = DocumentUpdate {
            policy_number: Some("HM-123".into()),
            ..DocumentUpdate::default()
        };
        assert!(update_document(&db, "auto", &update).await.unwrap());
        let doc = get_document(&db, "auto").await.unwrap().unwrap();
        assert_eq!(doc.policy_number.as_deref(), Some("HM-123"));
        assert_eq!(doc.document_type.as_deref(), Some("insurance"));
        assert_ne!(doc.updated_at, "2026-01-04T00:00:00.000Z");

        assert!(!update_document(&db, "missing", &update).await.unwrap());
    }

    #[tokio::test]
    async fn untyped_documents_count_as_unclassified() {
        let db = seeded().await;
        let counts = document_type_counts(&db).await.unwrap();
        assert_eq!(counts[0], ("insurance".to_string(), 2));
        assert_eq!(counts[1], ("unclassified".to_string(), 1));
    }
}
