// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory graph tools.
//!
//! The assistant records durable facts about the user (people, goals,
//! employers, accounts) as entities with observations and relations, and
//! reads them back in later conversations. Entities and observations can be
//! forgotten on request.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tally_core::TallyError;
use tally_storage::Database;
use tally_storage::queries::memory::{self, Linked};

use crate::tool::{Tool, parse_args};

fn not_found(tool: &str, name: &str) -> TallyError {
    TallyError::ToolExecution {
        tool: tool.to_string(),
        message: format!("entity '{name}' not found"),
    }
}

pub struct CreateEntity {
    db: Database,
}

impl CreateEntity {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct CreateEntityArgs {
    name: String,
    entity_type: String,
}

#[async_trait]
impl Tool for CreateEntity {
    fn name(&self) -> &str {
        "create_entity"
    }

    fn description(&self) -> &str {
        "Create a new entity in the knowledge graph (person, goal, employer, account, etc.)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "minLength": 1, "description": "Entity name (must be unique)" },
                "entity_type": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Type: person, goal, employer, account, institution, etc."
                }
            },
            "required": ["name", "entity_type"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: CreateEntityArgs = parse_args(self.name(), arguments)?;
        match memory::create_entity(&self.db, &args.name, &args.entity_type).await? {
            Some(entity) => Ok(json!({
                "success": true,
                "entity_id": entity.entity_id,
                "name": entity.name,
                "entity_type": entity.entity_type,
            })),
            None => Err(TallyError::ToolExecution {
                tool: self.name().to_string(),
                message: format!("entity '{}' already exists", args.name),
            }),
        }
    }
}

pub struct AddObservation {
    db: Database,
}

impl AddObservation {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct ObservationArgs {
    entity_name: String,
    observation: String,
    source: Option<String>,
}

#[async_trait]
impl Tool for AddObservation {
    fn name(&self) -> &str {
        "add_observation"
    }

    fn description(&self) -> &str {
        "Record a fact about an existing entity."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entity_name": { "type": "string", "minLength": 1, "description": "Name of the entity" },
                "observation": { "type": "string", "minLength": 1, "description": "The fact to remember" },
                "source": { "type": "string", "description": "Where the fact came from (e.g. conversation)" }
            },
            "required": ["entity_name", "observation"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: ObservationArgs = parse_args(self.name(), arguments)?;
        let linked = memory::add_observation(
            &self.db,
            &args.entity_name,
            &args.observation,
            args.source.as_deref(),
        )
        .await?;
        match linked {
            Linked::Done(observation_id) => Ok(json!({
                "success": true,
                "observation_id": observation_id,
                "entity_name": args.entity_name,
                "observation": args.observation,
            })),
            Linked::MissingEntity(name) => Err(not_found(self.name(), &name)),
        }
    }
}

pub struct CreateRelation {
    db: Database,
}

impl CreateRelation {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct RelationArgs {
    from_entity: String,
    to_entity: String,
    relation_type: String,
}

#[async_trait]
impl Tool for CreateRelation {
    fn name(&self) -> &str {
        "create_relation"
    }

    fn description(&self) -> &str {
        "Link two existing entities with a typed relation (e.g. works_at, saving_for)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "from_entity": { "type": "string", "minLength": 1 },
                "to_entity": { "type": "string", "minLength": 1 },
                "relation_type": { "type": "string", "minLength": 1, "description": "Relation label, in active voice" }
            },
            "required": ["from_entity", "to_entity", "relation_type"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: RelationArgs = parse_args(self.name(), arguments)?;
        let linked =
            memory::create_relation(&self.db, &args.from_entity, &args.to_entity, &args.relation_type)
                .await?;
        match linked {
            Linked::Done(()) => Ok(json!({
                "success": true,
                "from_entity": args.from_entity,
                "relation": args.relation_type,
                "to_entity": args.to_entity,
            })),
            Linked::MissingEntity(name) => Err(not_found(self.name(), &name)),
        }
    }
}

pub struct GetEntity {
    db: Database,
}

impl GetEntity {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct GetEntityArgs {
    entity_name: String,
}

#[async_trait]
impl Tool for GetEntity {
    fn name(&self) -> &str {
        "get_entity"
    }

    fn description(&self) -> &str {
        "Get an entity with all of its observations and relations."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entity_name": { "type": "string", "minLength": 1 }
            },
            "required": ["entity_name"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: GetEntityArgs = parse_args(self.name(), arguments)?;
        let detail = memory::get_entity(&self.db, &args.entity_name)
            .await?
            .ok_or_else(|| not_found(self.name(), &args.entity_name))?;
        serde_json::to_value(detail).map_err(|e| TallyError::Internal(e.to_string()))
    }
}

pub struct SearchMemories {
    db: Database,
}

impl SearchMemories {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
}

#[async_trait]
impl Tool for SearchMemories {
    fn name(&self) -> &str {
        "search_memories"
    }

    fn description(&self) -> &str {
        "Search remembered entities and observations by keyword."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "minLength": 1, "description": "Keyword to search for" }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: SearchArgs = parse_args(self.name(), arguments)?;
        let matches = memory::search_memories(&self.db, &args.query).await?;
        let entities: Vec<Value> = matches
            .entities
            .iter()
            .map(|(name, kind)| json!({ "name": name, "type": kind }))
            .collect();
        let observations: Vec<Value> = matches
            .observations
            .iter()
            .map(|(entity, content)| json!({ "entity": entity, "observation": content }))
            .collect();
        Ok(json!({
            "query": args.query,
            "entities": entities,
            "observations": observations,
        }))
    }
}

/// Everything remembered, grouped by entity.
pub struct GetAllMemories {
    db: Database,
}

impl GetAllMemories {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for GetAllMemories {
    fn name(&self) -> &str {
        "get_all_memories"
    }

    fn description(&self) -> &str {
        "Get every remembered entity with its observations."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    async fn invoke(&self, _arguments: Value) -> Result<Value, TallyError> {
        let all = memory::all_memories(&self.db).await?;
        let entities: Vec<Value> = all
            .iter()
            .map(|e| {
                json!({
                    "name": e.name,
                    "type": e.entity_type,
                    "observations": e.observations,
                })
            })
            .collect();
        Ok(json!({
            "entities": entities,
            "count": entities.len(),
        }))
    }
}

pub struct DeleteEntity {
    db: Database,
}

impl DeleteEntity {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for DeleteEntity {
    fn name(&self) -> &str {
        "delete_entity"
    }

    fn description(&self) -> &str {
        "Forget an entity, including all of its observations and relations."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entity_name": { "type": "string", "minLength": 1, "description": "Name of the entity to delete" }
            },
            "required": ["entity_name"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: GetEntityArgs = parse_args(self.name(), arguments)?;
        if !memory::delete_entity(&self.db, &args.entity_name).await? {
            return Err(not_found(self.name(), &args.entity_name));
        }
        Ok(json!({
            "success": true,
            "deleted": args.entity_name,
        }))
    }
}

pub struct DeleteObservation {
    db: Database,
}

impl DeleteObservation {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct DeleteObservationArgs {
    entity_name: String,
    observation: String,
}

#[async_trait]
impl Tool for DeleteObservation {
    fn name(&self) -> &str {
        "delete_observation"
    }

    fn description(&self) -> &str {
        "Forget one observation about an entity. The text must match exactly."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entity_name": { "type": "string", "minLength": 1 },
                "observation": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Exact text of the observation to delete"
                }
            },
            "required": ["entity_name", "observation"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: DeleteObservationArgs = parse_args(self.name(), arguments)?;
        let deleted = memory::delete_observation(&self.db, &args.entity_name, &args.observation).await?;
        Ok(json!({
            "success": deleted > 0,
            "deleted_count": deleted,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remember_and_recall() {
        let db = Database::open_in_memory().await.unwrap();
        CreateEntity::new(db.clone())
            .invoke(json!({"name": "Jordan", "entity_type": "person"}))
            .await
            .unwrap();
        CreateEntity::new(db.clone())
            .invoke(json!({"name": "Acme", "entity_type": "employer"}))
            .await
            .unwrap();
        AddObservation::new(db.clone())
            .invoke(json!({"entity_name": "Jordan", "observation": "Paid biweekly"}))
            .await
            .unwrap();
        CreateRelation::new(db.clone())
            .invoke(json!({"from_entity": "Jordan", "to_entity": "Acme", "relation_type": "works_at"}))
            .await
            .unwrap();

        let entity = GetEntity::new(db.clone())
            .invoke(json!({"entity_name": "Jordan"}))
            .await
            .unwrap();
        assert_eq!(entity["name"], "Jordan");
        assert_eq!(entity["observations"][0]["content"], "Paid biweekly");
        assert_eq!(entity["relations"][0]["entity"], "Acme");

        let hits = SearchMemories::new(db)
            .invoke(json!({"query": "biweekly"}))
            .await
            .unwrap();
        assert_eq!(hits["observations"][0]["entity"], "Jordan");
    }

    #[tokio::test]
    async fn missing_and_duplicate_entities_are_tool_errors() {
        let db = Database::open_in_memory().await.unwrap();
        let err = AddObservation::new(db.clone())
            .invoke(json!({"entity_name": "Nobody", "observation": "x"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "tool_execution");

        let create = CreateEntity::new(db.clone());
        create.invoke(json!({"name": "Jordan", "entity_type": "person"})).await.unwrap();
        let err = create
            .invoke(json!({"name": "Jordan", "entity_type": "person"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));

        let err = GetEntity::new(db).invoke(json!({"entity_name": "Nobody"})).await.unwrap_err();
        assert_eq!(err.code(), "tool_execution");
    }

    #[tokio::test]
    async fn forget_observations_and_entities() {
        let db = Database::open_in_memory().await.unwrap();
        CreateEntity::new(db.clone())
            .invoke(json!({"name": "Jordan", "entity_type": "person"}))
            .await
            .unwrap();
        for text in ["Paid biweekly", "Saving for a car"] {
            AddObservation::new(db.clone())
                .invoke(json!({"entity_name": "Jordan", "observation": text}))
                .await
                .unwrap();
        }

        let forget = DeleteObservation::new(db.clone());
        let out = forget
            .invoke(json!({"entity_name": "Jordan", "observation": "Saving for a car"}))
            .await
            .unwrap();
        assert_eq!(out["success"], true);
        let out = forget
            .invoke(json!({"entity_name": "Jordan", "observation": "Saving for a car"}))
            .await
            .unwrap();
        assert_eq!(out["deleted_count"], 0);

        let all = GetAllMemories::new(db.clone()).invoke(json!({})).await.unwrap();
        assert_eq!(all["count"], 1);
        assert_eq!(all["entities"][0]["observations"], json!(["Paid biweekly"]));

        let delete = DeleteEntity::new(db.clone());
        delete.invoke(json!({"entity_name": "Jordan"})).await.unwrap();
        let err = delete.invoke(json!({"entity_name": "Jordan"})).await.unwrap_err();
        assert_eq!(err.code(), "tool_execution");
        let all = GetAllMemories::new(db).invoke(json!({})).await.unwrap();
        assert_eq!(all["count"], 0);
    }
}
