// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory graph: named entities, free-text observations, typed relations.

use rusqlite::{OptionalExtension, params};
use tally_core::TallyError;

use crate::database::{Database, map_tr_err, now_timestamp};
use crate::models::{Entity, EntityDetail, EntityMemories, MemoryMatches, Observation, Relation};

/// Outcome of a write that names existing entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Linked<T> {
    Done(T),
    /// The named entity does not exist.
    MissingEntity(String),
}

fn entity_id(conn: &rusqlite::Connection, name: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT entity_id FROM entities WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )
    .optional()
}

/// Create an entity. Returns `None` when the name is already taken.
pub async fn create_entity(
    db: &Database,
    name: &str,
    entity_type: &str,
) -> Result<Option<Entity>, TallyError> {
    let name = name.to_string();
    let entity_type = entity_type.to_string();
    let now = now_timestamp();
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO entities (name, entity_type, created_at) VALUES (?1, ?2, ?3)",
                params![name, entity_type, now],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            Ok(Some(Entity {
                entity_id: conn.last_insert_rowid(),
                name,
                entity_type,
                created_at: now,
            }))
        })
        .await
        .map_err(map_tr_err)
}

/// Attach an observation to an entity; returns the observation id.
pub async fn add_observation(
    db: &Database,
    entity_name: &str,
    content: &str,
    source: Option<&str>,
) -> Result<Linked<i64>, TallyError> {
    let entity_name = entity_name.to_string();
    let content = content.to_string();
    let source = source.map(str::to_string);
    let now = now_timestamp();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let Some(id) = entity_id(&tx, &entity_name)? else {
                return Ok(Linked::MissingEntity(entity_name));
            };
            tx.execute(
                "INSERT INTO observations (entity_id, content, source, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, content, source, now],
            )?;
            let observation_id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(Linked::Done(observation_id))
        })
        .await
        .map_err(map_tr_err)
}

/// Link two entities with a typed relation.
pub async fn create_relation(
    db: &Database,
    from_entity: &str,
    to_entity: &str,
    relation_type: &str,
) -> Result<Linked<()>, TallyError> {
    let from = from_entity.to_string();
    let to = to_entity.to_string();
    let relation_type = relation_type.to_string();
    let now = now_timestamp();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let Some(from_id) = entity_id(&tx, &from)? else {
                return Ok(Linked::MissingEntity(from));
            };
            let Some(to_id) = entity_id(&tx, &to)? else {
                return Ok(Linked::MissingEntity(to));
            };
            tx.execute(
                "INSERT INTO relations (from_entity_id, to_entity_id, relation_type, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![from_id, to_id, relation_type, now],
            )?;
            tx.commit()?;
            Ok(Linked::Done(()))
        })
        .await
        .map_err(map_tr_err)
}

/// An entity with its observations (newest first) and relations in both directions.
pub async fn get_entity(db: &Database, name: &str) -> Result<Option<EntityDetail>, TallyError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            let entity = conn
                .query_row(
                    "SELECT entity_id, name, entity_type, created_at FROM entities WHERE name = ?1",
                    params![name],
                    |row| {
                        Ok(Entity {
                            entity_id: row.get(0)?,
                            name: row.get(1)?,
                            entity_type: row.get(2)?,
                            created_at: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            let Some(entity) = entity else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT content, source, created_at FROM observations
                 WHERE entity_id = ?1
                 ORDER BY created_at DESC, observation_id DESC",
            )?;
            let observations = stmt
                .query_map(params![entity.entity_id], |row| {
                    Ok(Observation {
                        content: row.get(0)?,
                        source: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut stmt = conn.prepare(
                "SELECT e.name, r.relation_type, 'outgoing'
                 FROM relations r JOIN entities e ON r.to_entity_id = e.entity_id
                 WHERE r.from_entity_id = ?1
                 UNION ALL
                 SELECT e.name, r.relation_type, 'incoming'
                 FROM relations r JOIN entities e ON r.from_entity_id = e.entity_id
                 WHERE r.to_entity_id = ?1",
            )?;
            let relations = stmt
                .query_map(params![entity.entity_id], |row| {
                    Ok(Relation {
                        entity: row.get(0)?,
                        relation: row.get(1)?,
                        direction: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(Some(EntityDetail {
                entity,
                observations,
                relations,
            }))
        })
        .await
        .map_err(map_tr_err)
}

/// Case-insensitive substring search over entity names and observations.
pub async fn search_memories(db: &Database, query: &str) -> Result<MemoryMatches, TallyError> {
    let pattern = format!("%{query}%");
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT name, entity_type FROM entities WHERE name LIKE ?1 ORDER BY name",
            )?;
            let entities = stmt
                .query_map(params![pattern], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;

            let mut stmt = conn.prepare(
                "SELECT e.name, o.content
                 FROM observations o JOIN entities e ON o.entity_id = e.entity_id
                 WHERE o.content LIKE ?1
                 ORDER BY o.observation_id",
            )?;
            let observations = stmt
                .query_map(params![pattern], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(MemoryMatches {
                entities,
                observations,
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Every entity with its observation text, ordered by type then name.
pub async fn all_memories(db: &Database) -> Result<Vec<EntityMemories>, TallyError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT e.name, e.entity_type, o.content
                 FROM entities e
                 LEFT JOIN observations o ON e.entity_id = o.entity_id
                 ORDER BY e.entity_type, e.name, o.created_at DESC, o.observation_id DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?;

            let mut out: Vec<EntityMemories> = Vec::new();
            for row in rows {
                let (name, entity_type, content) = row?;
                let same = out.last().is_some_and(|last| last.name == name);
                if !same {
                    out.push(EntityMemories {
                        name,
                        entity_type,
                        observations: Vec::new(),
                    });
                }
                if let (Some(content), Some(last)) = (content, out.last_mut()) {
                    last.observations.push(content);
                }
            }
            Ok(out)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete an entity with its observations and every relation touching it.
/// Returns whether the entity existed.
pub async fn delete_entity(db: &Database, name: &str) -> Result<bool, TallyError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let Some(id) = entity_id(&tx, &name)? else {
                return Ok(false);
            };
            tx.execute("DELETE FROM observations WHERE entity_id = ?1", params![id])?;
            tx.execute(
                "DELETE FROM relations WHERE from_entity_id = ?1 OR to_entity_id = ?1",
                params![id],
            )?;
            tx.execute("DELETE FROM entities WHERE entity_id = ?1", params![id])?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete observations on `entity_name` whose text is exactly `content`.
/// Returns how many were removed.
pub async fn delete_observation(
    db: &Database,
    entity_name: &str,
    content: &str,
) -> Result<usize, TallyError> {
    let entity_name = entity_name.to_string();
    let content = content.to_string();
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "DELETE FROM observations
                 WHERE entity_id = (SELECT entity_id FROM entities WHERE name = ?1)
                   AND content = ?2",
                params![entity_name, content],
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entity_names_are_unique() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(create_entity(&db, "Sam", "person").await.unwrap().is_some());
        assert!(create_entity(&db, "Sam", "person").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn graph_round_trip() {
        let db = Database::open_in_memory().await.unwrap();
        create_entity(&db, "Sam", "person").await.unwrap();
        create_entity(&db, "House fund", "goal").await.unwrap();
        assert!(matches!(
            add_observation(&db, "Sam", "Prefers index funds", Some("chat")).await.unwrap(),
            Linked::Done(_)
        ));
        assert_eq!(
            create_relation(&db, "Sam", "House fund", "has_goal").await.unwrap(),
            Linked::Done(())
        );

        let sam = get_entity(&db, "Sam").await.unwrap().unwrap();
        assert_eq!(sam.observations.len(), 1);
        assert_eq!(sam.relations[0].direction, "outgoing");

        let goal = get_entity(&db, "House fund").await.unwrap().unwrap();
        assert_eq!(goal.relations[0].entity, "Sam");
        assert_eq!(goal.relations[0].direction, "incoming");
    }

    #[tokio::test]
    async fn missing_entities_are_reported() {
        let db = Database::open_in_memory().await.unwrap();
        create_entity(&db, "Sam", "person").await.unwrap();
        assert_eq!(
            add_observation(&db, "Alex", "x", None).await.unwrap(),
            Linked::MissingEntity("Alex".into())
        );
        assert_eq!(
            create_relation(&db, "Sam", "Nobody", "knows").await.unwrap(),
            Linked::MissingEntity("Nobody".into())
        );
        assert!(get_entity(&db, "Alex").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_covers_names_and_observations() {
        let db = Database::open_in_memory().await.unwrap();
        create_entity(&db, "Emergency fund", "goal").await.unwrap();
        add_observation(&db, "Emergency fund", "Target is six months of expenses", None)
            .await
            .unwrap();
        let hits = search_memories(&db, "fund").await.unwrap();
        assert_eq!(hits.entities.len(), 1);
        let hits = search_memories(&db, "six months").await.unwrap();
        assert_eq!(hits.observations[0].0, "Emergency fund");
    }

    #[tokio::test]
    async fn all_memories_groups_observations() {
        let db = Database::open_in_memory().await.unwrap();
        create_entity(&db, "Sam", "person").await.unwrap();
        create_entity(&db, "Acme", "employer").await.unwrap();
        add_observation(&db, "Sam", "Paid biweekly", None).await.unwrap();
        add_observation(&db, "Sam", "Has a 401k match", None).await.unwrap();

        let all = all_memories(&db).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Acme");
        assert!(all[0].observations.is_empty());
        assert_eq!(all[1].observations.len(), 2);
    }

    #[tokio::test]
    async fn deleting_an_entity_removes_its_edges() {
        let db = Database::open_in_memory().await.unwrap();
        create_entity(&db, "Sam", "person").await.unwrap();
        create_entity(&db, "Acme", "employer").await.unwrap();
        add_observation(&db, "Sam", "Paid biweekly", None).await.unwrap();
        create_relation(&db, "Sam", "Acme", "works_at").await.unwrap();

        assert!(delete_entity(&db, "Sam").await.unwrap());
        assert!(!delete_entity(&db, "Sam").await.unwrap());
        let acme = get_entity(&db, "Acme").await.unwrap().unwrap();
        assert!(acme.relations.is_empty());
    }

    #[tokio::test]
    async fn delete_observation_needs_exact_text() {
        let db = Database::open_in_memory().await.unwrap();
        create_entity(&db, "Sam", "person").await.unwrap();
        add_observation(&db, "Sam", "Paid biweekly", None).await.unwrap();
        assert_eq!(delete_observation(&db, "Sam", "paid").await.unwrap(), 0);
        assert_eq!(delete_observation(&db, "Sam", "Paid biweekly").await.unwrap(), 1);
        assert!(get_entity(&db, "Sam").await.unwrap().unwrap().observations.is_empty());
    }
}
