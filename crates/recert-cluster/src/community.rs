//! Graph-community strategy: Louvain modularity maximization over a
//! thresholded proximity graph.
//!
//! Nodes are employees; an edge (A, B) with weight P(A, B) exists only when
//! the proximity clears `graph_min_edge_weight`. Node visit order is
//! shuffled from the seeded RNG each level, so runs are deterministic for a
//! fixed seed. Employees with no qualifying edge end up in singleton
//! communities with zero confidence; they are not outliers.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rustc_hash::FxHashMap;
use tracing::info;

use recert_core::config::{ClusteringConfig, StrategyKind};

use crate::assignment::{relabel_by_first_appearance, ClusterAssignment, StrategyAssignments};
use crate::error::{ClusterError, ClusterResult};
use recert_proximity::ProximityMatrix;

const MAX_LEVELS: usize = 32;
const MAX_PASSES_PER_LEVEL: usize = 64;
const MIN_MODULARITY_GAIN: f64 = 1e-9;

pub fn cluster_graph_community(
    matrix: &ProximityMatrix,
    config: &ClusteringConfig,
    seed: u64,
) -> ClusterResult<StrategyAssignments> {
    let n = matrix.len();
    if n == 0 {
        return Err(ClusterError::Degenerate("no employees to cluster".into()));
    }

    let mut adjacency: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    for i in 0..n {
        for j in (i + 1)..n {
            let w = matrix.get(i, j);
            if w >= config.graph_min_edge_weight {
                adjacency[i].push((j, w));
                adjacency[j].push((i, w));
            }
        }
    }

    let membership = louvain(&adjacency, config.graph_resolution, seed);
    let labels = relabel_by_first_appearance(&membership);

    let n_communities = labels.iter().max().map(|&m| m + 1).unwrap_or(0);
    info!("Graph community detection found {n_communities} communities");

    let mut assignments = StrategyAssignments::new();
    for (i, id) in matrix.ids().iter().enumerate() {
        let co_community: Vec<f64> = adjacency[i]
            .iter()
            .filter(|(j, _)| labels[*j] == labels[i])
            .map(|&(_, w)| w)
            .collect();
        let confidence = if co_community.is_empty() {
            0.0
        } else {
            co_community.iter().sum::<f64>() / co_community.len() as f64
        };
        assignments.insert(
            id.clone(),
            ClusterAssignment {
                employee_id: id.clone(),
                strategy: StrategyKind::GraphCommunity,
                cluster_id: labels[i],
                confidence,
                is_outlier: false,
            },
        );
    }
    Ok(assignments)
}

/// Multi-level Louvain. Returns the top-level community index per node.
fn louvain(adjacency: &[Vec<(usize, f64)>], resolution: f64, seed: u64) -> Vec<usize> {
    let n = adjacency.len();
    // membership[i] tracks each original node's community across levels.
    let mut membership: Vec<usize> = (0..n).collect();
    let mut graph: Vec<Vec<(usize, f64)>> = adjacency.to_vec();
    let mut self_loops: Vec<f64> = vec![0.0; n];
    let mut rng = StdRng::seed_from_u64(seed);

    for _ in 0..MAX_LEVELS {
        let (local, improved) = one_level(&graph, &self_loops, resolution, &mut rng);
        if !improved {
            break;
        }

        // Renumber the level's communities compactly, in node order.
        let mut remap: FxHashMap<usize, usize> = FxHashMap::default();
        let mut compact: Vec<usize> = Vec::with_capacity(graph.len());
        for &community in &local {
            let next = remap.len();
            compact.push(*remap.entry(community).or_insert(next));
        }
        for m in membership.iter_mut() {
            *m = compact[*m];
        }

        let n_communities = remap.len();
        if n_communities == graph.len() {
            break;
        }

        // Aggregate: communities become super-nodes, intra-community weight
        // becomes a self-loop.
        let mut new_self_loops = vec![0.0f64; n_communities];
        let mut edge_accumulator: Vec<FxHashMap<usize, f64>> =
            vec![FxHashMap::default(); n_communities];
        for (node, neighbors) in graph.iter().enumerate() {
            let cu = compact[node];
            new_self_loops[cu] += self_loops[node];
            for &(neighbor, weight) in neighbors {
                let cv = compact[neighbor];
                if cu == cv {
                    // Each intra edge is seen from both endpoints.
                    new_self_loops[cu] += weight / 2.0;
                } else {
                    *edge_accumulator[cu].entry(cv).or_insert(0.0) += weight;
                }
            }
        }

        graph = edge_accumulator
            .into_iter()
            .map(|neighbors| {
                let mut list: Vec<(usize, f64)> = neighbors.into_iter().collect();
                list.sort_unstable_by(|a, b| a.0.cmp(&b.0));
                list
            })
            .collect();
        self_loops = new_self_loops;
    }

    membership
}

/// One Louvain level: greedy local moves until no move improves modularity.
/// Returns (community per node, whether anything moved).
fn one_level(
    graph: &[Vec<(usize, f64)>],
    self_loops: &[f64],
    resolution: f64,
    rng: &mut StdRng,
) -> (Vec<usize>, bool) {
    let n = graph.len();
    let degree: Vec<f64> = (0..n)
        .map(|i| graph[i].iter().map(|&(_, w)| w).sum::<f64>() + 2.0 * self_loops[i])
        .collect();
    let two_m: f64 = degree.iter().sum();
    let mut community: Vec<usize> = (0..n).collect();

    if two_m == 0.0 {
        return (community, false);
    }

    let mut community_total: Vec<f64> = degree.clone();
    let mut order: Vec<usize> = (0..n).collect();
    let mut improved_overall = false;

    for _ in 0..MAX_PASSES_PER_LEVEL {
        order.shuffle(rng);
        let mut moved = false;

        for &node in &order {
            let current = community[node];

            // Weight from node to each neighboring community.
            let mut links: FxHashMap<usize, f64> = FxHashMap::default();
            for &(neighbor, weight) in &graph[node] {
                *links.entry(community[neighbor]).or_insert(0.0) += weight;
            }

            community_total[current] -= degree[node];
            let base_link = links.get(&current).copied().unwrap_or(0.0);
            let base_gain = base_link - resolution * community_total[current] * degree[node] / two_m;

            // Best candidate; ties keep the smallest community id so the
            // result does not depend on hash-map iteration order.
            let mut best_community = current;
            let mut best_gain = base_gain;
            let mut candidates: Vec<(usize, f64)> = links.into_iter().collect();
            candidates.sort_unstable_by(|a, b| a.0.cmp(&b.0));
            for (candidate, link) in candidates {
                if candidate == current {
                    continue;
                }
                let gain = link - resolution * community_total[candidate] * degree[node] / two_m;
                if gain > best_gain + MIN_MODULARITY_GAIN {
                    best_gain = gain;
                    best_community = candidate;
                } else if (gain - best_gain).abs() <= MIN_MODULARITY_GAIN
                    && candidate < best_community
                {
                    best_community = candidate;
                }
            }

            community_total[best_community] += degree[node];
            if best_community != current {
                community[node] = best_community;
                moved = true;
                improved_overall = true;
            }
        }

        if !moved {
            break;
        }
    }

    (community, improved_overall)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_cliques() -> ProximityMatrix {
        let ids: Vec<String> = (0..6).map(|i| format!("e{i}")).collect();
        let mut m = ProximityMatrix::new(ids);
        for i in 0..6 {
            for j in (i + 1)..6 {
                let same = (i < 3) == (j < 3);
                // Cross-group proximity sits below the edge threshold.
                m.set_symmetric(i, j, if same { 0.8 } else { 0.05 });
            }
        }
        m
    }

    #[test]
    fn finds_the_two_cliques() {
        let assignments =
            cluster_graph_community(&two_cliques(), &ClusteringConfig::default(), 42).unwrap();

        let c0 = assignments["e0"].cluster_id;
        assert_eq!(assignments["e1"].cluster_id, c0);
        assert_eq!(assignments["e2"].cluster_id, c0);
        let c1 = assignments["e3"].cluster_id;
        assert_ne!(c0, c1);
        assert_eq!(assignments["e4"].cluster_id, c1);
        assert_eq!(assignments["e5"].cluster_id, c1);

        approx::assert_abs_diff_eq!(assignments["e0"].confidence, 0.8, epsilon = 1e-12);
    }

    #[test]
    fn isolated_node_is_singleton_with_zero_confidence() {
        let ids: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let mut m = ProximityMatrix::new(ids);
        m.set_symmetric(0, 1, 0.9);
        // "c" has no edge above the default 0.2 threshold.
        m.set_symmetric(0, 2, 0.1);
        m.set_symmetric(1, 2, 0.1);

        let assignments =
            cluster_graph_community(&m, &ClusteringConfig::default(), 42).unwrap();
        let c = &assignments["c"];
        assert!(!c.is_outlier);
        assert_eq!(c.confidence, 0.0);
        assert_ne!(c.cluster_id, assignments["a"].cluster_id);
        assert_eq!(assignments["a"].cluster_id, assignments["b"].cluster_id);
    }

    #[test]
    fn deterministic_for_fixed_seed() {
        let m = two_cliques();
        let a = cluster_graph_community(&m, &ClusteringConfig::default(), 9).unwrap();
        let b = cluster_graph_community(&m, &ClusteringConfig::default(), 9).unwrap();
        assert_eq!(a, b);
    }
}
