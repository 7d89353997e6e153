//! Retrieval evidence: relation edges and supporting text chunks

use serde::{Deserialize, Serialize};

/// Closed set of relation types allowed in traversal and rendered context.
///
/// Anything else coming back from the graph store is dropped at the
/// retrieval boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    FriendOf,
    FamilyOf,
    Loves,
    MarriedTo,
    WorksFor,
    StudiesAt,
    ParticipatesIn,
    HappensAt,
    Involves,
    MentionedIn,
    SupportedBy,
}

impl RelationType {
    pub const ALL: [RelationType; 11] = [
        RelationType::FriendOf,
        RelationType::FamilyOf,
        RelationType::Loves,
        RelationType::MarriedTo,
        RelationType::WorksFor,
        RelationType::StudiesAt,
        RelationType::ParticipatesIn,
        RelationType::HappensAt,
        RelationType::Involves,
        RelationType::MentionedIn,
        RelationType::SupportedBy,
    ];

    /// Wire name, as stored in the graph.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::FriendOf => "FRIEND_OF",
            RelationType::FamilyOf => "FAMILY_OF",
            RelationType::Loves => "LOVES",
            RelationType::MarriedTo => "MARRIED_TO",
            RelationType::WorksFor => "WORKS_FOR",
            RelationType::StudiesAt => "STUDIES_AT",
            RelationType::ParticipatesIn => "PARTICIPATES_IN",
            RelationType::HappensAt => "HAPPENS_AT",
            RelationType::Involves => "INVOLVES",
            RelationType::MentionedIn => "MENTIONED_IN",
            RelationType::SupportedBy => "SUPPORTED_BY",
        }
    }

    /// Parse a stored relation name; `None` for anything off the whitelist.
    pub fn parse(s: &str) -> Option<RelationType> {
        Self::ALL.iter().copied().find(|r| r.as_str() == s)
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One directed relation fact `(from) -[relation]-> (to)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    #[serde(rename = "rel")]
    pub relation: RelationType,
    pub to: String,
}

/// A unit of source text linked to a graph node as supporting evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub chapter_id: String,
    pub text: String,
}

/// Transient result of one retrieval call.
///
/// Edges are deduplicated by the full triple and capped; chunks are
/// deduplicated by `chunk_id` (first occurrence wins) and capped at the
/// caller-requested `top_k`. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub edges: Vec<Edge>,
    pub chunks: Vec<Chunk>,
}

impl Evidence {
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty() && self.chunks.is_empty()
    }

    /// Chunk ids in evidence order, for retrieval summaries and citations.
    pub fn chunk_ids(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.chunk_id.clone()).collect()
    }
}
