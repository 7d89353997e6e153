//! SurrealDB-backed graph store
//!
//! Wraps `surrealdb::Surreal<Db>` behind an explicitly constructed client
//! owned by the composition root, with `connect`/`close` lifecycle calls at
//! process start and stop. Each `traverse` issues exactly one composite
//! query and borrows nothing across pipeline stages.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use surrealdb::engine::local::{Db, Mem, RocksDb};
use surrealdb::Surreal;

use loess_config::GraphConfig;
use loess_core::{
    ChunkRow, EdgeRow, GraphError, GraphResult, GraphStore, RelationType, TraversalParams,
    TraversalRows,
};

/// Comma-separated lowercase edge tables, one per whitelisted relation.
fn edge_tables() -> String {
    RelationType::ALL
        .iter()
        .map(|r| r.as_str().to_lowercase())
        .collect::<Vec<_>>()
        .join(", ")
}

/// One composite statement block covering node resolution, both hop
/// stages, evidentiary chunk collection, and the keyword fallback.
///
/// Statement layout (indices matter for result extraction):
///   0..=3  LET bindings (matched persons, matched events, hop frontiers)
///   4      stage-1 hop edges
///   5      stage-2 hop edges (empty when $second_hop is false)
///   6      evidentiary chunks reachable via SUPPORTED_BY
///   7      keyword-substring fallback chunks
fn traversal_query() -> String {
    let edges = edge_tables();
    format!(
        r#"
LET $p = (SELECT VALUE id FROM person WHERE name IN $persons OR aliases CONTAINSANY $persons);
LET $ev = (SELECT VALUE id FROM event WHERE name IN $events OR aliases CONTAINSANY $events);
LET $x = array::distinct((SELECT VALUE out FROM {edges} WHERE in IN $p));
LET $y = IF $second_hop THEN array::distinct((SELECT VALUE out FROM {edges} WHERE in IN $x)) ELSE [] END;
SELECT in.name ?? '' AS source, record::tb(id) AS relation, out.name ?? '' AS target FROM {edges} WHERE in IN $p;
SELECT in.name ?? '' AS source, record::tb(id) AS relation, out.name ?? '' AS target FROM {edges} WHERE $second_hop AND in IN $x;
SELECT out.chunk_id ?? '' AS chunk_id, out.chapter_id ?? '' AS chapter_id, out.text ?? '' AS text FROM supported_by WHERE in IN array::concat(array::concat($ev, $x), $y);
SELECT chunk_id, chapter_id ?? '' AS chapter_id, text FROM chunk WHERE
    (array::len($keywords) > 0 AND array::any($keywords, |$k| string::contains(text, $k)))
    OR (array::len($keywords) = 0 AND array::len($fallback) > 0 AND array::any($fallback, |$k| string::contains(text, $k)));
"#
    )
}

#[derive(Debug, Deserialize)]
struct SurrealEdgeRow {
    source: String,
    relation: String,
    target: String,
}

#[derive(Debug, Deserialize)]
struct SurrealChunkRow {
    chunk_id: String,
    chapter_id: String,
    text: String,
}

/// Process-wide graph database client.
///
/// Cheap to clone (Arc inside); created once at startup and closed once at
/// shutdown. Sessions are borrowed per query by the SDK.
#[derive(Clone)]
pub struct GraphClient {
    inner: Arc<GraphClientInner>,
}

struct GraphClientInner {
    db: Surreal<Db>,
    config: GraphConfig,
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("path", &self.inner.config.path)
            .field("namespace", &self.inner.config.namespace)
            .field("database", &self.inner.config.database)
            .finish()
    }
}

impl GraphClient {
    /// Open the graph database named by the config: in-memory for
    /// `:memory:`/empty paths, persistent RocksDB otherwise.
    pub async fn connect(config: &GraphConfig) -> GraphResult<Self> {
        let db = if config.is_memory() {
            Surreal::new::<Mem>(())
                .await
                .map_err(|e| GraphError::Connection(format!("in-memory open failed: {e}")))?
        } else {
            Surreal::new::<RocksDb>(config.path.as_str())
                .await
                .map_err(|e| {
                    GraphError::Connection(format!("open failed at {}: {e}", config.path))
                })?
        };

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                GraphError::Connection(format!(
                    "use {}/{} failed: {e}",
                    config.namespace, config.database
                ))
            })?;

        tracing::info!(path = %config.path, "Graph store connected");

        Ok(Self {
            inner: Arc::new(GraphClientInner {
                db,
                config: config.clone(),
            }),
        })
    }

    /// In-memory client for tests and local experiments.
    pub async fn memory() -> GraphResult<Self> {
        Self::connect(&GraphConfig::memory()).await
    }

    /// Invalidate the session at shutdown. The underlying engine is
    /// released when the last clone drops.
    pub async fn close(&self) -> GraphResult<()> {
        self.inner
            .db
            .invalidate()
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;
        tracing::info!("Graph store closed");
        Ok(())
    }
}

#[async_trait]
impl GraphStore for GraphClient {
    async fn traverse(&self, params: &TraversalParams) -> GraphResult<TraversalRows> {
        let mut response = self
            .inner
            .db
            .query(traversal_query())
            .bind(("persons", params.persons.clone()))
            .bind(("events", params.events.clone()))
            .bind(("keywords", params.keywords.clone()))
            .bind(("fallback", params.fallback_keywords.clone()))
            .bind(("second_hop", params.second_hop))
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;

        let hop1: Vec<SurrealEdgeRow> = response
            .take(4)
            .map_err(|e| GraphError::Query(format!("stage-1 edges: {e}")))?;
        let hop2: Vec<SurrealEdgeRow> = response
            .take(5)
            .map_err(|e| GraphError::Query(format!("stage-2 edges: {e}")))?;
        let evidentiary: Vec<SurrealChunkRow> = response
            .take(6)
            .map_err(|e| GraphError::Query(format!("evidentiary chunks: {e}")))?;
        let fallback: Vec<SurrealChunkRow> = response
            .take(7)
            .map_err(|e| GraphError::Query(format!("fallback chunks: {e}")))?;

        let edges = hop1
            .into_iter()
            .chain(hop2)
            .map(|row| EdgeRow {
                from: row.source,
                // Edge tables are lowercase; the whitelist speaks wire names.
                relation: row.relation.to_uppercase(),
                to: row.target,
            })
            .collect();

        let chunks = evidentiary
            .into_iter()
            .chain(fallback)
            .map(|row| ChunkRow {
                chunk_id: row.chunk_id,
                chapter_id: row.chapter_id,
                text: row.text,
            })
            .collect();

        Ok(TraversalRows { edges, chunks })
    }
}
