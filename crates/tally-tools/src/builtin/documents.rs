// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Document vault tools.
//!
//! Documents (insurance policies, tax forms, statements) are stored with
//! their extracted text and a handful of metadata fields the assistant can
//! search, read, and correct.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};
use tally_core::TallyError;
use tally_storage::queries::documents;
use tally_storage::{Database, Document, DocumentUpdate};

use crate::tool::{Tool, parse_args};

const DATE_PATTERN: &str = "^[0-9]{4}-[0-9]{2}-[0-9]{2}$";

/// How much extracted text `get_document` returns.
const PREVIEW_CHARS: usize = 500;

fn not_found(tool: &str, document_id: &str) -> TallyError {
    TallyError::ToolExecution {
        tool: tool.to_string(),
        message: format!("document '{document_id}' not found"),
    }
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn listing(d: &Document) -> Value {
    json!({
        "document_id": d.document_id,
        "filename": d.filename,
        "document_type": d.document_type,
        "provider": d.provider,
        "policy_number": d.policy_number,
        "summary": d.summary,
        "expiration_date": d.expiration_date,
        "last_updated": d.updated_at,
    })
}

pub struct SearchDocuments {
    db: Database,
}

impl SearchDocuments {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
}

#[async_trait]
impl Tool for SearchDocuments {
    fn name(&self) -> &str {
        "search_documents"
    }

    fn description(&self) -> &str {
        "Search stored documents by filename, content, summary, provider, or tags."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Text to look for, e.g. 'auto insurance' or a provider name"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: SearchArgs = parse_args(self.name(), arguments)?;
        let rows = documents::search_documents(&self.db, &args.query).await?;
        let found: Vec<Value> = rows.iter().map(listing).collect();
        Ok(json!({
            "query": args.query,
            "count": found.len(),
            "documents": found,
        }))
    }
}

pub struct ListDocuments {
    db: Database,
}

impl ListDocuments {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct ListArgs {
    document_type: Option<String>,
}

#[async_trait]
impl Tool for ListDocuments {
    fn name(&self) -> &str {
        "list_documents"
    }

    fn description(&self) -> &str {
        "List stored documents, optionally only those of one type (insurance, tax, statement, ...)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "document_type": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Only list documents of this type"
                }
            },
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: ListArgs = parse_args(self.name(), arguments)?;
        let rows = documents::list_documents(&self.db, args.document_type.as_deref()).await?;
        let listed: Vec<Value> = rows.iter().map(listing).collect();
        Ok(json!({
            "filter": args.document_type,
            "count": listed.len(),
            "documents": listed,
        }))
    }
}

/// Full metadata of one document plus the start of its text.
pub struct GetDocument {
    db: Database,
}

impl GetDocument {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct GetArgs {
    document_id: String,
}

#[async_trait]
impl Tool for GetDocument {
    fn name(&self) -> &str {
        "get_document"
    }

    fn description(&self) -> &str {
        "Get one document's details and the beginning of its extracted text."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "document_id": { "type": "string", "minLength": 1 }
            },
            "required": ["document_id"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: GetArgs = parse_args(self.name(), arguments)?;
        let d = documents::get_document(&self.db, &args.document_id)
            .await?
            .ok_or_else(|| not_found(self.name(), &args.document_id))?;
        Ok(json!({
            "document_id": d.document_id,
            "filename": d.filename,
            "original_filename": d.original_filename,
            "mime_type": d.mime_type,
            "file_size": d.file_size,
            "document_type": d.document_type,
            "provider": d.provider,
            "policy_number": d.policy_number,
            "summary": d.summary,
            "effective_date": d.effective_date,
            "expiration_date": d.expiration_date,
            "tags": d.tags,
            "extracted_text": d.extracted_text.as_deref().map(preview),
            "created_at": d.created_at,
            "updated_at": d.updated_at,
        }))
    }
}

pub struct GetExpiringDocuments {
    db: Database,
}

impl GetExpiringDocuments {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct ExpiringArgs {
    #[serde(default = "default_days")]
    days: u32,
}

fn default_days() -> u32 {
    30
}

#[async_trait]
impl Tool for GetExpiringDocuments {
    fn name(&self) -> &str {
        "get_expiring_documents"
    }

    fn description(&self) -> &str {
        "Get documents (policies, IDs, warranties) that expire within the next N days, soonest first."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "days": {
                    "type": "integer",
                    "minimum": 0,
                    "maximum": 3650,
                    "default": 30,
                    "description": "How many days ahead to look"
                }
            },
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: ExpiringArgs = parse_args(self.name(), arguments)?;
        let today = crate::today();
        let until = today + chrono::Duration::days(i64::from(args.days));
        let rows = documents::expiring_documents(
            &self.db,
            &today.format("%Y-%m-%d").to_string(),
            &until.format("%Y-%m-%d").to_string(),
        )
        .await?;

        let expiring: Vec<Value> = rows
            .iter()
            .map(|d| {
                let days_left = d
                    .expiration_date
                    .as_deref()
                    .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
                    .map(|date| (date - today).num_days());
                json!({
                    "document_id": d.document_id,
                    "filename": d.filename,
                    "document_type": d.document_type,
                    "provider": d.provider,
                    "policy_number": d.policy_number,
                    "expiration_date": d.expiration_date,
                    "days_until_expiration": days_left,
                })
            })
            .collect();

        Ok(json!({
            "looking_ahead_days": args.days,
            "count": expiring.len(),
            "expiring_documents": expiring,
        }))
    }
}

/// Correct or fill in a document's metadata.
pub struct UpdateDocument {
    db: Database,
}

impl UpdateDocument {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct UpdateArgs {
    document_id: String,
    #[serde(flatten)]
    update: DocumentUpdate,
}

#[async_trait]
impl Tool for UpdateDocument {
    fn name(&self) -> &str {
        "update_document"
    }

    fn description(&self) -> &str {
        "Update a document's type, provider, policy number, summary, effective or expiration date, or tags."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "document_id": { "type": "string", "minLength": 1 },
                "document_type": { "type": "string", "minLength": 1 },
                "provider": { "type": "string" },
                "policy_number": { "type": "string" },
                "summary": { "type": "string" },
                "effective_date": {
                    "type": "string",
                    "pattern": DATE_PATTERN,
                    "description": "YYYY-MM-DD"
                },
                "expiration_date": {
                    "type": "string",
                    "pattern": DATE_PATTERN,
                    "description": "YYYY-MM-DD"
                },
                "tags": { "type": "string", "description": "Comma-separated tags" }
            },
            "required": ["document_id"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: UpdateArgs = parse_args(self.name(), arguments)?;
        let updated: Vec<&str> = args
            .update
            .fields()
            .into_iter()
            .map(|(column, _)| column)
            .collect();
        if updated.is_empty() {
            return Err(TallyError::ToolValidation {
                tool: self.name().to_string(),
                message: "no fields to update".into(),
            });
        }
        if !documents::update_document(&self.db, &args.document_id, &args.update).await? {
            return Err(not_found(self.name(), &args.document_id));
        }
        Ok(json!({
            "success": true,
            "document_id": args.document_id,
            "updated_fields": updated,
        }))
    }
}

pub struct GetDocumentTypes {
    db: Database,
}

impl GetDocumentTypes {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for GetDocumentTypes {
    fn name(&self) -> &str {
        "get_document_types"
    }

    fn description(&self) -> &str {
        "Count stored documents by type."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    async fn invoke(&self, _arguments: Value) -> Result<Value, TallyError> {
        let counts = documents::document_type_counts(&self.db).await?;
        let total: i64 = counts.iter().map(|(_, n)| n).sum();
        let types: Vec<Value> = counts
            .iter()
            .map(|(kind, n)| json!({ "type": kind, "count": n }))
            .collect();
        Ok(json!({
            "document_types": types,
            "total_documents": total,
        }))
    }
}
