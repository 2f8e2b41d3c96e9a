//! Pure graph algorithms over id-keyed adjacency.
//!
//! Everything here operates on task ids and dependency pairs read inside the
//! caller's transaction; no durable state is touched.

use crate::error::{Error, Result};
use crate::types::{Dependency, OrderConflict};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Frontier entry for the topological sort.
///
/// BinaryHeap is a max-heap, so comparisons are reversed to pop the lowest
/// (manual_order, id) first. Ids break ties for deterministic output.
#[derive(Debug, Clone)]
struct FrontierEntry {
    manual_order: f64,
    task_id: i64,
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.task_id == other.task_id && self.manual_order == other.manual_order
    }
}

impl Eq for FrontierEntry {}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .manual_order
            .partial_cmp(&self.manual_order)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.task_id.cmp(&self.task_id))
    }
}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Check whether adding `task_id depends_on depends_on` would close a cycle.
///
/// Searches the existing edge set for a path from `depends_on` back to
/// `task_id`. On a hit, returns the ordered id sequence from `task_id`,
/// through the cycle, back to `task_id`. A self-edge is the degenerate
/// two-element path.
pub fn find_cycle(edges: &[Dependency], task_id: i64, depends_on: i64) -> Option<Vec<i64>> {
    if task_id == depends_on {
        return Some(vec![task_id, depends_on]);
    }

    let mut adjacency: HashMap<i64, Vec<i64>> = HashMap::new();
    for edge in edges {
        adjacency.entry(edge.task_id).or_default().push(edge.depends_on);
    }

    let mut visited = HashSet::new();
    let mut path = vec![task_id, depends_on];
    if probe(depends_on, task_id, &adjacency, &mut visited, &mut path) {
        Some(path)
    } else {
        None
    }
}

/// DFS for a path from `current` to `target`, recording visited ids in `path`.
fn probe(
    current: i64,
    target: i64,
    adjacency: &HashMap<i64, Vec<i64>>,
    visited: &mut HashSet<i64>,
    path: &mut Vec<i64>,
) -> bool {
    if !visited.insert(current) {
        return false;
    }

    if let Some(neighbors) = adjacency.get(&current) {
        for &next in neighbors {
            path.push(next);
            if next == target || probe(next, target, adjacency, visited, path) {
                return true;
            }
            path.pop();
        }
    }

    false
}

/// The transitive prerequisite closure of `target`, target included.
pub fn closure(edges: &[Dependency], target: i64) -> HashSet<i64> {
    let mut adjacency: HashMap<i64, Vec<i64>> = HashMap::new();
    for edge in edges {
        adjacency.entry(edge.task_id).or_default().push(edge.depends_on);
    }

    let mut reached = HashSet::new();
    let mut frontier = vec![target];
    while let Some(id) = frontier.pop() {
        if reached.insert(id) {
            if let Some(deps) = adjacency.get(&id) {
                frontier.extend(deps.iter().copied());
            }
        }
    }
    reached
}

/// Topological sort of a task subset, lowest (manual_order, id) first.
///
/// `tasks` maps each subset id to its manual_order. Edges with either
/// endpoint outside the subset are ignored: a dependency that was filtered
/// out (completed) is satisfied by construction. Every prerequisite in the
/// subset precedes its dependents in the result.
pub fn topo_sort(tasks: &HashMap<i64, f64>, edges: &[Dependency]) -> Result<Vec<i64>> {
    let mut in_degree: HashMap<i64, usize> = tasks.keys().map(|&id| (id, 0)).collect();
    let mut adjacency: HashMap<i64, Vec<i64>> = HashMap::new();

    for edge in edges {
        if tasks.contains_key(&edge.task_id) && tasks.contains_key(&edge.depends_on) {
            adjacency.entry(edge.depends_on).or_default().push(edge.task_id);
            *in_degree.entry(edge.task_id).or_insert(0) += 1;
        }
    }

    let mut frontier: BinaryHeap<FrontierEntry> = in_degree
        .iter()
        .filter(|&(_, &degree)| degree == 0)
        .map(|(&task_id, _)| FrontierEntry {
            manual_order: tasks[&task_id],
            task_id,
        })
        .collect();

    let mut result = Vec::with_capacity(tasks.len());
    while let Some(entry) = frontier.pop() {
        result.push(entry.task_id);

        if let Some(dependents) = adjacency.get(&entry.task_id) {
            for &dependent in dependents {
                if let Some(degree) = in_degree.get_mut(&dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        frontier.push(FrontierEntry {
                            manual_order: tasks[&dependent],
                            task_id: dependent,
                        });
                    }
                }
            }
        }
    }

    // Stored edges are checked before every insert, so an unsortable
    // remainder means the database itself holds a cycle. Fail loudly.
    if result.len() != tasks.len() {
        let mut remainder: Vec<i64> = tasks
            .keys()
            .filter(|id| !result.contains(id))
            .copied()
            .collect();
        remainder.sort_unstable();
        return Err(Error::CycleDetected { path: remainder });
    }

    Ok(result)
}

/// Flag tasks whose manual_order is lower than a prerequisite's.
///
/// Never alters the sort; callers surface these as non-fatal warnings.
pub fn order_conflicts(tasks: &HashMap<i64, f64>, edges: &[Dependency]) -> Vec<OrderConflict> {
    let mut conflicts = Vec::new();
    for edge in edges {
        let (Some(&task_order), Some(&dep_order)) =
            (tasks.get(&edge.task_id), tasks.get(&edge.depends_on))
        else {
            continue;
        };
        if task_order < dep_order {
            conflicts.push(OrderConflict {
                task_id: edge.task_id,
                task_order,
                dep_id: edge.depends_on,
                dep_order,
            });
        }
    }
    conflicts.sort_by_key(|c| (c.task_id, c.dep_id));
    conflicts
}
