//! Dependency ordering: cycle detection via [`guardrails_dag::Dag`], then a
//! deterministic Kahn's-algorithm pass with a stable tie-break so identical
//! inputs always produce byte-identical orderings (required for the
//! Planner's plan digest to be reproducible).

use std::collections::{BTreeMap, HashMap};

use guardrails_dag::Dag;
use guardrails_domain::error::DepError;

use crate::ComponentRef;

/// Order `components` so every dependency precedes its dependents. Ties
/// among components with no remaining mutual ordering constraint break on
/// `(install_order asc, plugin_id asc, name asc)`.
pub fn resolve_order(
    components: &[(ComponentRef, u8, Vec<ComponentRef>)],
) -> Result<Vec<ComponentRef>, DepError> {
    let mut dag: Dag<String> = Dag::new();
    let mut indices = HashMap::new();
    for (component, _, _) in components {
        let key = component.qualified();
        let idx = dag.add_node_or_get_index(key.clone());
        indices.insert(key, idx);
    }
    for (component, _, deps) in components {
        let from = component.qualified();
        for dep in deps {
            let to = dep.qualified();
            let Some(&to_idx) = indices.get(&to) else {
                return Err(DepError::Missing {
                    component: from,
                    dependency: dep.name.clone(),
                });
            };
            dag.add_edge(to_idx, indices[&from]);
        }
    }

    if let Err(cycle) = dag.toposort() {
        return Err(DepError::Cycle {
            start: cycle.start,
            path: cycle.path,
        });
    }

    kahn_order(components)
}

fn kahn_order(components: &[(ComponentRef, u8, Vec<ComponentRef>)]) -> Result<Vec<ComponentRef>, DepError> {
    let by_key: BTreeMap<String, &(ComponentRef, u8, Vec<ComponentRef>)> =
        components.iter().map(|c| (c.0.qualified(), c)).collect();

    let mut in_degree: BTreeMap<String, usize> = by_key.keys().map(|k| (k.clone(), 0)).collect();
    let mut dependents: BTreeMap<String, Vec<String>> = by_key.keys().map(|k| (k.clone(), vec![])).collect();

    for (component, _, deps) in components {
        let key = component.qualified();
        for dep in deps {
            let dep_key = dep.qualified();
            if !by_key.contains_key(&dep_key) {
                return Err(DepError::Missing {
                    component: key.clone(),
                    dependency: dep.name.clone(),
                });
            }
            *in_degree.get_mut(&key).unwrap() += 1;
            dependents.get_mut(&dep_key).unwrap().push(key.clone());
        }
    }

    let mut ready: Vec<String> = in_degree.iter().filter(|(_, d)| **d == 0).map(|(k, _)| k.clone()).collect();
    let mut ordered = vec![];

    while !ready.is_empty() {
        ready.sort_by(|a, b| {
            let (ca, oa, _) = by_key[a];
            let (cb, ob, _) = by_key[b];
            oa.cmp(ob)
                .then_with(|| ca.plugin_id.cmp(&cb.plugin_id))
                .then_with(|| ca.name.cmp(&cb.name))
        });

        let key = ready.remove(0);
        ordered.push(by_key[&key].0.clone());

        for next in &dependents[&key] {
            let degree = in_degree.get_mut(next).unwrap();
            *degree -= 1;
            if *degree == 0 {
                ready.push(next.clone());
            }
        }
    }

    Ok(ordered)
}

#[cfg(test)]
mod test {
    use super::*;

    fn cref(name: &str) -> ComponentRef {
        ComponentRef {
            plugin_id: None,
            name: name.into(),
        }
    }

    #[test]
    fn dependencies_precede_dependents() {
        let components = vec![
            (cref("b"), 0, vec![cref("a")]),
            (cref("a"), 0, vec![]),
            (cref("c"), 0, vec![cref("b")]),
        ];

        let order = resolve_order(&components).unwrap();
        let names: Vec<&str> = order.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn ties_break_on_install_order_then_name() {
        let components = vec![(cref("z"), 1, vec![]), (cref("a"), 0, vec![]), (cref("m"), 0, vec![])];

        let order = resolve_order(&components).unwrap();
        let names: Vec<&str> = order.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "m", "z"]);
    }

    #[test]
    fn cycle_is_reported() {
        let components = vec![(cref("a"), 0, vec![cref("b")]), (cref("b"), 0, vec![cref("a")])];
        assert!(resolve_order(&components).is_err());
    }

    #[test]
    fn missing_dependency_is_reported() {
        let components = vec![(cref("a"), 0, vec![cref("ghost")])];
        assert!(matches!(resolve_order(&components), Err(DepError::Missing { .. })));
    }
}
