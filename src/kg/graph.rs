//! Graph store backed by Neo4j.
//!
//! Holds the chunk-entity-relation graph: `Entity` nodes keyed by
//! `entity_id` with `entity_type`, `description` and `source_id` properties,
//! connected by undirected `RELATED` edges. The merge operation folds source
//! entities into a target inside a single transaction.

use std::collections::BTreeMap;
use std::str::FromStr;

use neo4rs::{query, ConfigBuilder, Graph, Node};
use tracing::{debug, info};

use super::chunker::FIELD_SEP;
use super::extractor::UNKNOWN_TYPE;
use crate::config::Config;
use crate::error::{Error, Result};

/// Per-field rule for combining entity attributes during a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// Join all values with the field separator, keeping duplicates
    Concatenate,
    /// Split on the field separator, deduplicate, rejoin
    JoinUnique,
    /// Keep the first non-empty value (the target's)
    KeepFirst,
    /// Keep the last non-empty value
    KeepLast,
}

impl FieldRule {
    /// Fold values in order (target first, then sources).
    pub fn fold(&self, values: &[&str]) -> String {
        let non_empty: Vec<&str> = values.iter().copied().filter(|v| !v.is_empty()).collect();
        match self {
            FieldRule::Concatenate => non_empty.join(FIELD_SEP),
            FieldRule::JoinUnique => {
                let mut seen = Vec::new();
                for value in non_empty {
                    for part in value.split(FIELD_SEP) {
                        if !part.is_empty() && !seen.contains(&part) {
                            seen.push(part);
                        }
                    }
                }
                seen.join(FIELD_SEP)
            }
            FieldRule::KeepFirst => non_empty.first().copied().unwrap_or_default().to_string(),
            FieldRule::KeepLast => non_empty.last().copied().unwrap_or_default().to_string(),
        }
    }
}

impl FromStr for FieldRule {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "concatenate" => Ok(FieldRule::Concatenate),
            "join_unique" => Ok(FieldRule::JoinUnique),
            "keep_first" => Ok(FieldRule::KeepFirst),
            "keep_last" => Ok(FieldRule::KeepLast),
            other => Err(Error::InvalidArgument(format!(
                "unknown merge rule '{}'",
                other
            ))),
        }
    }
}

/// Per-field merge strategy for `merge_entities`.
#[derive(Debug, Clone)]
pub struct MergeStrategy {
    rules: BTreeMap<String, FieldRule>,
}

impl MergeStrategy {
    pub fn new(rules: BTreeMap<String, FieldRule>) -> Self {
        Self { rules }
    }

    /// Rule for a field; unlisted fields keep the target's value.
    pub fn rule_for(&self, field: &str) -> FieldRule {
        self.rules.get(field).copied().unwrap_or(FieldRule::KeepFirst)
    }
}

impl Default for MergeStrategy {
    /// Descriptions concatenate, source-id lists join uniquely.
    fn default() -> Self {
        let mut rules = BTreeMap::new();
        rules.insert("description".to_string(), FieldRule::Concatenate);
        rules.insert("source_id".to_string(), FieldRule::JoinUnique);
        Self { rules }
    }
}

/// Entity node as read from the graph. Absent properties stay `None`;
/// callers use the accessor for the defaulted type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub entity_id: String,
    pub entity_type: Option<String>,
    pub description: Option<String>,
    pub source_id: Option<String>,
}

impl EntityRecord {
    /// Entity type with the explicit fallback category.
    pub fn entity_type_or_unknown(&self) -> &str {
        self.entity_type.as_deref().unwrap_or(UNKNOWN_TYPE)
    }
}

/// Undirected relation between two entities.
#[derive(Debug, Clone)]
pub struct EdgeRecord {
    pub from: String,
    pub to: String,
    pub description: Option<String>,
    pub weight: f64,
}

/// Graph statistics.
#[derive(Debug, Default)]
pub struct GraphStats {
    pub entity_count: u64,
    pub relation_count: u64,
}

/// Graph store backed by Neo4j.
pub struct GraphStore {
    graph: Graph,
}

impl GraphStore {
    /// Connect to Neo4j using the application config.
    pub async fn connect(config: &Config) -> Result<Self> {
        let neo_config = ConfigBuilder::default()
            .uri(config.neo4j_uri.as_str())
            .user(config.neo4j_username.as_str())
            .password(config.neo4j_password.as_str())
            .db(config.neo4j_database.as_str())
            .build()?;

        let graph = Graph::connect(neo_config).await?;
        Ok(Self { graph })
    }

    /// Initialize schema with constraints and indexes.
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing Neo4j schema...");

        let statements = [
            "CREATE CONSTRAINT entity_id IF NOT EXISTS FOR (e:Entity) REQUIRE e.entity_id IS UNIQUE",
            "CREATE INDEX entity_type IF NOT EXISTS FOR (e:Entity) ON (e.entity_type)",
        ];

        for statement in statements {
            self.graph.run(query(statement)).await?;
        }

        info!("Schema initialized successfully");
        Ok(())
    }

    /// Create or update an entity node. Re-ingesting appends the source id
    /// and keeps the longer description.
    pub async fn upsert_entity(
        &self,
        entity_id: &str,
        entity_type: &str,
        description: &str,
        source_id: &str,
    ) -> Result<()> {
        let q = query(
            "MERGE (e:Entity {entity_id: $entity_id})
             ON CREATE SET e.entity_type = $entity_type,
                           e.description = $description,
                           e.source_id = $source_id,
                           e.created_at = datetime()
             ON MATCH SET e.entity_type = $entity_type,
                          e.description = CASE
                              WHEN size(coalesce(e.description, '')) >= size($description)
                              THEN e.description ELSE $description END,
                          e.source_id = CASE
                              WHEN e.source_id IS NULL THEN $source_id
                              WHEN e.source_id CONTAINS $source_id THEN e.source_id
                              ELSE e.source_id + $sep + $source_id END,
                          e.updated_at = datetime()",
        )
        .param("entity_id", entity_id)
        .param("entity_type", entity_type)
        .param("description", description)
        .param("source_id", source_id)
        .param("sep", FIELD_SEP);

        self.graph.run(q).await?;
        debug!("Upserted entity: {} ({})", entity_id, entity_type);
        Ok(())
    }

    /// Create or strengthen an undirected relation between two entities.
    pub async fn upsert_relation(
        &self,
        from: &str,
        to: &str,
        description: &str,
        weight: f64,
    ) -> Result<()> {
        let q = query(
            "MATCH (a:Entity {entity_id: $from})
             MATCH (b:Entity {entity_id: $to})
             MERGE (a)-[r:RELATED]-(b)
             ON CREATE SET r.description = $description, r.weight = $weight
             ON MATCH SET r.weight = coalesce(r.weight, 0) + $weight",
        )
        .param("from", from)
        .param("to", to)
        .param("description", description)
        .param("weight", weight);

        self.graph.run(q).await?;
        Ok(())
    }

    /// All entity names, ordered for deterministic iteration.
    pub async fn get_all_entity_names(&self) -> Result<Vec<String>> {
        let q = query("MATCH (e:Entity) RETURN e.entity_id AS entity_id ORDER BY e.entity_id");

        let mut result = self.graph.execute(q).await?;
        let mut names = Vec::new();

        while let Some(row) = result.next().await? {
            if let Ok(name) = row.get::<String>("entity_id") {
                names.push(name);
            }
        }

        Ok(names)
    }

    /// Entity node by name, if present.
    pub async fn get_node(&self, entity_id: &str) -> Result<Option<EntityRecord>> {
        let q = query("MATCH (e:Entity {entity_id: $entity_id}) RETURN e")
            .param("entity_id", entity_id);

        let mut result = self.graph.execute(q).await?;

        if let Some(row) = result.next().await? {
            if let Ok(node) = row.get::<Node>("e") {
                return Ok(Some(node_to_record(&node)));
            }
        }

        Ok(None)
    }

    /// Entity type by name; `None` when the entity or its type is absent.
    pub async fn get_node_type(&self, entity_id: &str) -> Result<Option<String>> {
        Ok(self
            .get_node(entity_id)
            .await?
            .and_then(|record| record.entity_type))
    }

    /// All relations touching an entity.
    pub async fn get_node_edges(&self, entity_id: &str) -> Result<Vec<EdgeRecord>> {
        let q = query(
            "MATCH (e:Entity {entity_id: $entity_id})-[r:RELATED]-(o:Entity)
             RETURN e.entity_id AS from, o.entity_id AS to,
                    r.description AS description, r.weight AS weight",
        )
        .param("entity_id", entity_id);

        let mut result = self.graph.execute(q).await?;
        let mut edges = Vec::new();

        while let Some(row) = result.next().await? {
            edges.push(EdgeRecord {
                from: row.get::<String>("from").unwrap_or_default(),
                to: row.get::<String>("to").unwrap_or_default(),
                description: row.get::<String>("description").ok(),
                weight: row.get::<f64>("weight").unwrap_or(0.0),
            });
        }

        Ok(edges)
    }

    /// Fold `sources` into `target` in one transaction: combine properties
    /// per strategy, rewire every source edge onto the target, delete the
    /// sources. Fields in `target_data` override the folded values.
    pub async fn merge_entities(
        &self,
        sources: &[String],
        target: &str,
        strategy: &MergeStrategy,
        target_data: &BTreeMap<String, String>,
    ) -> Result<()> {
        let target_record = self.get_node(target).await?.ok_or_else(|| Error::Merge {
            source_name: sources.join(", "),
            target: target.to_string(),
            reason: "target entity not found".to_string(),
        })?;

        let mut source_records = Vec::with_capacity(sources.len());
        for source in sources {
            let record = self.get_node(source).await?.ok_or_else(|| Error::Merge {
                source_name: source.clone(),
                target: target.to_string(),
                reason: "source entity not found".to_string(),
            })?;
            source_records.push(record);
        }

        // Fold properties in Rust: target value first, then sources in order.
        let descriptions: Vec<&str> = std::iter::once(target_record.description.as_deref())
            .chain(source_records.iter().map(|r| r.description.as_deref()))
            .map(|d| d.unwrap_or_default())
            .collect();
        let source_ids: Vec<&str> = std::iter::once(target_record.source_id.as_deref())
            .chain(source_records.iter().map(|r| r.source_id.as_deref()))
            .map(|s| s.unwrap_or_default())
            .collect();

        let merged_description = strategy.rule_for("description").fold(&descriptions);
        let merged_source_id = strategy.rule_for("source_id").fold(&source_ids);
        let entity_type = target_data
            .get("entity_type")
            .cloned()
            .unwrap_or_else(|| target_record.entity_type_or_unknown().to_string());

        let mut txn = self.graph.start_txn().await?;

        txn.run(
            query(
                "MATCH (t:Entity {entity_id: $target})
                 SET t.description = $description,
                     t.source_id = $source_id,
                     t.entity_type = $entity_type,
                     t.updated_at = datetime()",
            )
            .param("target", target)
            .param("description", merged_description.as_str())
            .param("source_id", merged_source_id.as_str())
            .param("entity_type", entity_type.as_str()),
        )
        .await?;

        for source in sources {
            txn.run(
                query(
                    "MATCH (s:Entity {entity_id: $source})-[r:RELATED]-(o:Entity)
                     WHERE o.entity_id <> $target AND o.entity_id <> $source
                     MATCH (t:Entity {entity_id: $target})
                     MERGE (t)-[nr:RELATED]-(o)
                     ON CREATE SET nr.description = r.description,
                                   nr.weight = r.weight
                     ON MATCH SET nr.weight = coalesce(nr.weight, 0) + coalesce(r.weight, 0)",
                )
                .param("source", source.as_str())
                .param("target", target),
            )
            .await?;

            txn.run(
                query("MATCH (s:Entity {entity_id: $source}) DETACH DELETE s")
                    .param("source", source.as_str()),
            )
            .await?;
        }

        txn.commit().await?;
        info!("Merged {:?} into {}", sources, target);
        Ok(())
    }

    /// Get graph statistics.
    pub async fn stats(&self) -> Result<GraphStats> {
        let q = query(
            "MATCH (e:Entity) WITH count(e) AS entities
             OPTIONAL MATCH ()-[r:RELATED]->()
             RETURN entities, count(r) AS relations",
        );

        let mut result = self.graph.execute(q).await?;

        if let Some(row) = result.next().await? {
            return Ok(GraphStats {
                entity_count: row.get::<i64>("entities").unwrap_or(0) as u64,
                relation_count: row.get::<i64>("relations").unwrap_or(0) as u64,
            });
        }

        Ok(GraphStats::default())
    }
}

fn node_to_record(node: &Node) -> EntityRecord {
    EntityRecord {
        entity_id: node.get::<String>("entity_id").unwrap_or_default(),
        entity_type: node.get::<String>("entity_type").ok(),
        description: node.get::<String>("description").ok(),
        source_id: node.get::<String>("source_id").ok(),
    }
}
