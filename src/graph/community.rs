//! Community Detection
//!
//! Partitions the entity graph into non-overlapping clusters by greedy
//! modularity optimization over the weighted undirected graph. The pass is
//! deterministic: nodes are visited in ascending entity id and ties in
//! modularity gain break toward the community containing the lowest entity
//! id. A detection pass operates on a snapshot and its output wholesale
//! replaces any previous partition; community ids restart at zero.

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use crate::domain::{Community, Entity, Relationship};

const GAIN_EPSILON: f64 = 1e-12;

/// Parameters for community detection.
#[derive(Debug, Clone)]
pub struct CommunityConfig {
    /// Resolution parameter (higher = smaller communities).
    pub resolution: f64,
    /// Maximum local-moving sweeps.
    pub max_iterations: usize,
    /// Minimum modularity improvement to accept a move.
    pub min_gain: f64,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            max_iterations: 20,
            min_gain: 0.0001,
        }
    }
}

/// Deterministic greedy modularity community detector.
#[derive(Debug, Default)]
pub struct CommunityDetector {
    config: CommunityConfig,
}

impl CommunityDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CommunityConfig) -> Self {
        Self { config }
    }

    /// Partition a graph snapshot into communities.
    ///
    /// Zero entities yield zero communities; a graph with zero edges yields
    /// one singleton community per entity. Summaries are synthesized here;
    /// summary embeddings are filled by the caller.
    pub fn detect(&self, entities: &[Entity], relationships: &[Relationship]) -> Vec<Community> {
        if entities.is_empty() {
            return Vec::new();
        }

        let graph = build_graph(entities, relationships);

        // Node strengths and total edge weight.
        let mut strength: HashMap<NodeIndex, f64> = HashMap::new();
        let mut total_weight = 0.0_f64;
        for edge in graph.edge_references() {
            let w = *edge.weight();
            *strength.entry(edge.source()).or_insert(0.0) += w;
            *strength.entry(edge.target()).or_insert(0.0) += w;
            total_weight += w;
        }

        // Visit order: ascending entity id.
        let mut order: Vec<NodeIndex> = graph.node_indices().collect();
        order.sort_by_key(|n| graph[*n]);

        // Each node starts in its own community.
        let mut comm_of: HashMap<NodeIndex, usize> = order
            .iter()
            .enumerate()
            .map(|(i, n)| (*n, i))
            .collect();
        let mut members: HashMap<usize, BTreeSet<NodeIndex>> = comm_of
            .iter()
            .map(|(n, c)| (*c, BTreeSet::from([*n])))
            .collect();

        let mut iterations = 0;
        if total_weight > 0.0 {
            let m2 = 2.0 * total_weight;
            loop {
                iterations += 1;
                let mut improved = false;

                for &node in &order {
                    let current = comm_of[&node];

                    // Candidate communities of neighbors, iterated in
                    // ascending min-entity-id order so equal gains resolve
                    // toward the lowest id.
                    let mut candidates: BTreeMap<u64, usize> = BTreeMap::new();
                    for edge in graph.edges(node) {
                        let comm = comm_of[&edge.target()];
                        if comm != current {
                            let min_id = members[&comm]
                                .iter()
                                .map(|n| graph[*n])
                                .min()
                                .unwrap_or(u64::MAX);
                            candidates.entry(min_id).or_insert(comm);
                        }
                    }

                    let ki = strength.get(&node).copied().unwrap_or(0.0);
                    let mut best_gain = self.config.min_gain;
                    let mut best_comm = current;

                    for (_, &comm) in &candidates {
                        let gain = modularity_gain(
                            &graph,
                            node,
                            &members[&current],
                            &members[&comm],
                            &strength,
                            ki,
                            m2,
                            self.config.resolution,
                        );
                        if gain > best_gain + GAIN_EPSILON {
                            best_gain = gain;
                            best_comm = comm;
                        }
                    }

                    if best_comm != current {
                        if let Some(set) = members.get_mut(&current) {
                            set.remove(&node);
                        }
                        if let Some(set) = members.get_mut(&best_comm) {
                            set.insert(node);
                        }
                        comm_of.insert(node, best_comm);
                        improved = true;
                    }
                }

                if !improved || iterations >= self.config.max_iterations {
                    break;
                }
            }
        }

        let communities = assemble(&graph, &members, entities, relationships);
        debug!(
            communities = communities.len(),
            iterations, "community detection pass complete"
        );
        communities
    }
}

// =============================================================================
// Graph Construction and Modularity
// =============================================================================

/// Build the weighted undirected graph; node weights are entity ids.
fn build_graph(entities: &[Entity], relationships: &[Relationship]) -> UnGraph<u64, f64> {
    let mut graph = UnGraph::new_undirected();
    let mut node_of = HashMap::new();

    for entity in entities {
        let node = graph.add_node(entity.id);
        node_of.insert(entity.id, node);
    }

    for rel in relationships {
        if let (Some(&a), Some(&b)) = (node_of.get(&rel.source_id), node_of.get(&rel.target_id)) {
            let weight = if rel.weight > 0.0 {
                f64::from(rel.weight)
            } else {
                1.0
            };
            graph.add_edge(a, b, weight);
        }
    }

    graph
}

/// Modularity gain of moving `node` from `from` into `to`.
#[allow(clippy::too_many_arguments)]
fn modularity_gain(
    graph: &UnGraph<u64, f64>,
    node: NodeIndex,
    from: &BTreeSet<NodeIndex>,
    to: &BTreeSet<NodeIndex>,
    strength: &HashMap<NodeIndex, f64>,
    ki: f64,
    m2: f64,
    resolution: f64,
) -> f64 {
    let mut ki_in = 0.0;
    let mut ki_out = 0.0;
    for edge in graph.edges(node) {
        let other = edge.target();
        if to.contains(&other) {
            ki_in += *edge.weight();
        }
        if other != node && from.contains(&other) {
            ki_out += *edge.weight();
        }
    }

    let sigma_in: f64 = to.iter().filter_map(|n| strength.get(n)).sum();
    let sigma_out: f64 = from
        .iter()
        .filter(|n| **n != node)
        .filter_map(|n| strength.get(n))
        .sum();

    (ki_in - ki_out) / m2 - resolution * ki * (sigma_in - sigma_out) / (m2 * m2)
}

// =============================================================================
// Community Assembly
// =============================================================================

/// Turn the final partition into `Community` records: members sorted by
/// entity id, communities ordered (and numbered) by their lowest member id.
fn assemble(
    graph: &UnGraph<u64, f64>,
    members: &HashMap<usize, BTreeSet<NodeIndex>>,
    entities: &[Entity],
    relationships: &[Relationship],
) -> Vec<Community> {
    let by_id: HashMap<u64, &Entity> = entities.iter().map(|e| (e.id, e)).collect();

    let mut groups: Vec<Vec<u64>> = members
        .values()
        .filter(|set| !set.is_empty())
        .map(|set| {
            let mut ids: Vec<u64> = set.iter().map(|n| graph[*n]).collect();
            ids.sort_unstable();
            ids
        })
        .collect();
    groups.sort_by_key(|ids| ids[0]);

    groups
        .into_iter()
        .enumerate()
        .map(|(idx, entity_ids)| {
            let id_set: BTreeSet<u64> = entity_ids.iter().copied().collect();
            let relationship_ids: Vec<u64> = relationships
                .iter()
                .filter(|r| id_set.contains(&r.source_id) && id_set.contains(&r.target_id))
                .map(|r| r.id)
                .collect();

            let member_entities: Vec<&Entity> = entity_ids
                .iter()
                .filter_map(|id| by_id.get(id).copied())
                .collect();

            Community {
                id: idx as u64,
                size: entity_ids.len(),
                summary: summarize(&member_entities),
                embedding: Vec::new(),
                entity_ids,
                relationship_ids,
            }
        })
        .collect()
}

/// Terse synthesis of a community from its member entities: leading titles
/// plus the first evidence line of the first few descriptions.
fn summarize(members: &[&Entity]) -> String {
    const MAX_TITLES: usize = 5;
    const MAX_FRAGMENTS: usize = 3;
    const MAX_LEN: usize = 320;

    let titles: Vec<&str> = members.iter().take(MAX_TITLES).map(|e| e.title.as_str()).collect();
    let mut summary = titles.join(", ");
    if members.len() > MAX_TITLES {
        summary.push_str(&format!(" (+{} more)", members.len() - MAX_TITLES));
    }

    let fragments: Vec<&str> = members
        .iter()
        .filter_map(|e| e.description.lines().next())
        .filter(|line| !line.is_empty())
        .take(MAX_FRAGMENTS)
        .collect();
    if !fragments.is_empty() {
        summary.push_str(": ");
        summary.push_str(&fragments.join("; "));
    }

    if summary.chars().count() > MAX_LEN {
        summary = summary.chars().take(MAX_LEN).collect();
    }
    summary
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntityType;

    fn entity(id: u64, title: &str) -> Entity {
        Entity {
            id,
            title: title.to_string(),
            entity_type: EntityType::Concept,
            description: format!("{title} is a test entity"),
            occurrence_count: 1,
            embedding: Vec::new(),
            embedding_samples: 0,
            source_text_unit_ids: Vec::new(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn relationship(id: u64, source: u64, target: u64, weight: f32) -> Relationship {
        Relationship {
            id,
            source_id: source,
            target_id: target,
            relationship_type: "related_to".to_string(),
            description: String::new(),
            weight,
            occurrence_count: 1,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_zero_entities_zero_communities() {
        let detector = CommunityDetector::new();
        assert!(detector.detect(&[], &[]).is_empty());
    }

    #[test]
    fn test_zero_edges_singletons() {
        let detector = CommunityDetector::new();
        let entities = vec![entity(1, "A"), entity(2, "B"), entity(3, "C")];
        let communities = detector.detect(&entities, &[]);

        assert_eq!(communities.len(), 3);
        for (i, community) in communities.iter().enumerate() {
            assert_eq!(community.id, i as u64);
            assert_eq!(community.size, 1);
        }
    }

    #[test]
    fn test_two_clusters_separate() {
        let detector = CommunityDetector::new();
        // Two triangles joined by nothing.
        let entities: Vec<Entity> = (1..=6).map(|i| entity(i, &format!("E{i}"))).collect();
        let relationships = vec![
            relationship(1, 1, 2, 2.0),
            relationship(2, 2, 3, 2.0),
            relationship(3, 1, 3, 2.0),
            relationship(4, 4, 5, 2.0),
            relationship(5, 5, 6, 2.0),
            relationship(6, 4, 6, 2.0),
        ];

        let communities = detector.detect(&entities, &relationships);
        assert_eq!(communities.len(), 2);
        assert_eq!(communities[0].entity_ids, vec![1, 2, 3]);
        assert_eq!(communities[1].entity_ids, vec![4, 5, 6]);

        // Intra-cluster relationships are attached.
        assert_eq!(communities[0].relationship_ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_deterministic_partition() {
        let detector = CommunityDetector::new();
        let entities: Vec<Entity> = (1..=8).map(|i| entity(i, &format!("E{i}"))).collect();
        let relationships = vec![
            relationship(1, 1, 2, 1.0),
            relationship(2, 2, 3, 1.0),
            relationship(3, 4, 5, 1.0),
            relationship(4, 6, 7, 1.0),
            relationship(5, 7, 8, 1.0),
        ];

        let first = detector.detect(&entities, &relationships);
        let second = detector.detect(&entities, &relationships);

        let ids = |cs: &[Community]| cs.iter().map(|c| c.entity_ids.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_summary_is_terse_and_bounded() {
        let members: Vec<Entity> = (1..=10).map(|i| entity(i, &format!("Entity{i}"))).collect();
        let refs: Vec<&Entity> = members.iter().collect();
        let summary = summarize(&refs);

        assert!(summary.contains("Entity1"));
        assert!(summary.contains("(+5 more)"));
        assert!(summary.chars().count() <= 320);
    }
}
