use crate::graph::stage::StageId;
use anyhow::{bail, Result};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Debug;

/// Topological sort of `(node, dependencies)` pairs (Kahn's algorithm).
/// Ties are broken by node ordering so the result is deterministic.
pub fn topo_sort<K>(nodes: &[(K, &[K])]) -> Result<Vec<K>>
where
    K: Copy + Ord + Debug,
{
    let mut in_degree: BTreeMap<K, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<K, Vec<K>> = BTreeMap::new();

    for (node, _) in nodes {
        if in_degree.insert(*node, 0).is_some() {
            bail!("duplicate node in graph: {node:?}");
        }
        dependents.entry(*node).or_default();
    }

    for (node, deps) in nodes {
        for dep in deps.iter() {
            if !in_degree.contains_key(dep) {
                bail!("{node:?} depends on unknown node {dep:?}");
            }
            *in_degree.entry(*node).or_insert(0) += 1;
            dependents.entry(*dep).or_default().push(*node);
        }
    }

    // BTreeMap iteration is already sorted
    let mut queue: VecDeque<K> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut order = Vec::with_capacity(nodes.len());

    while let Some(id) = queue.pop_front() {
        order.push(id);
        if let Some(deps) = dependents.get(&id) {
            let mut next = Vec::new();
            for dep in deps {
                if let Some(deg) = in_degree.get_mut(dep) {
                    *deg -= 1;
                    if *deg == 0 {
                        next.push(*dep);
                    }
                }
            }
            next.sort();
            queue.extend(next);
        }
    }

    if order.len() != nodes.len() {
        let in_order: BTreeSet<K> = order.iter().copied().collect();
        let cycle_members: Vec<String> = nodes
            .iter()
            .map(|(n, _)| *n)
            .filter(|n| !in_order.contains(n))
            .map(|n| format!("{n:?}"))
            .collect();
        bail!(
            "dependency cycle detected among stages: [{}]",
            cycle_members.join(", ")
        );
    }

    Ok(order)
}

/// Execution order for a set of stages, from their declared dependencies.
pub fn stage_order(stages: &[StageId]) -> Result<Vec<StageId>> {
    let nodes: Vec<(StageId, &[StageId])> = stages.iter().map(|s| (*s, s.depends_on())).collect();
    topo_sort(&nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_pipeline_order_is_fixed() {
        let mut shuffled = StageId::ALL.to_vec();
        shuffled.reverse();
        let order = stage_order(&shuffled).unwrap();
        assert_eq!(order, StageId::ALL.to_vec());
    }

    #[test]
    fn missing_dependency_is_rejected() {
        let err = stage_order(&[StageId::RepoCloner, StageId::Summarizer]).unwrap_err();
        assert!(err.to_string().contains("unknown node"));
    }

    #[test]
    fn duplicate_stage_is_rejected() {
        let err = stage_order(&[StageId::RepoCloner, StageId::RepoCloner]).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    fn node<'a>(id: &'a str, deps: &'a [&'a str]) -> (&'a str, &'a [&'a str]) {
        (id, deps)
    }

    #[test]
    fn diamond_dependency() {
        let nodes = vec![
            node("d", &["b", "c"]),
            node("c", &["a"]),
            node("b", &["a"]),
            node("a", &[]),
        ];
        let order = topo_sort(&nodes).unwrap();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn cycle_detected() {
        let nodes = vec![node("a", &["c"]), node("b", &["a"]), node("c", &["b"])];
        let err = topo_sort(&nodes).unwrap_err();
        assert!(err.to_string().contains("cycle"));
        assert!(err.to_string().contains("\"a\""));
    }

    #[test]
    fn single_stage() {
        assert_eq!(
            stage_order(&[StageId::RepoCloner]).unwrap(),
            vec![StageId::RepoCloner]
        );
    }
}
