//! Generation order: dependencies before dependents, cycles condensed.

use crate::error::CycleWarning;
use crate::ir::{RelationKind, Relationship};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ordering {
    pub order: Vec<String>,
    pub cycles: Vec<CycleWarning>,
}

/// Order `entities` (given in declaration order) so that every many-to-one
/// or one-to-one target comes before its owner. Each strongly connected
/// component is kept together in declaration order and reported once.
/// Self references add no edge.
pub fn generation_order(entities: &[&str], relationships: &[Relationship]) -> Ordering {
    let mut positions: BTreeMap<&str, usize> = BTreeMap::new();
    for (i, name) in entities.iter().enumerate() {
        positions.entry(*name).or_insert(i);
    }
    let index = |name: &str| positions.get(name).copied();

    // owner -> targets it depends on
    let mut deps: Vec<Vec<usize>> = vec![Vec::new(); entities.len()];
    for rel in relationships {
        if !matches!(rel.kind, RelationKind::ManyToOne | RelationKind::OneToOne)
            || rel.is_self_reference()
        {
            continue;
        }
        if let (Some(owner), Some(target)) = (index(&rel.owner), index(&rel.target)) {
            if !deps[owner].contains(&target) {
                deps[owner].push(target);
            }
        }
    }
    for d in &mut deps {
        d.sort_unstable();
    }

    let components = Tarjan::run(&deps);
    let mut component_of = vec![0; entities.len()];
    for (c, members) in components.iter().enumerate() {
        for &m in members {
            component_of[m] = c;
        }
    }

    // Condensation: component -> components it waits on
    let mut waits_on: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); components.len()];
    let mut unblocks: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); components.len()];
    for (owner, targets) in deps.iter().enumerate() {
        for &target in targets {
            let (a, b) = (component_of[owner], component_of[target]);
            if a != b {
                waits_on[a].insert(b);
                unblocks[b].insert(a);
            }
        }
    }

    // Kahn with the earliest-declared member as tie-break
    let first_member = |c: usize| components[c].first().copied().unwrap_or(usize::MAX);
    let mut remaining: Vec<usize> = waits_on.iter().map(BTreeSet::len).collect();
    let mut ready: BTreeSet<(usize, usize)> = (0..components.len())
        .filter(|&c| remaining[c] == 0)
        .map(|c| (first_member(c), c))
        .collect();

    let mut ordering = Ordering::default();
    while let Some((_, c)) = ready.pop_first() {
        let members = &components[c];
        ordering
            .order
            .extend(members.iter().map(|&m| entities[m].to_string()));
        if members.len() > 1 {
            ordering.cycles.push(CycleWarning {
                tables: members.iter().map(|&m| entities[m].to_string()).collect(),
            });
        }
        for &next in &unblocks[c] {
            remaining[next] -= 1;
            if remaining[next] == 0 {
                ready.insert((first_member(next), next));
            }
        }
    }

    ordering
}

/// Tarjan's strongly connected components. Members are sorted ascending.
struct Tarjan<'a> {
    graph: &'a [Vec<usize>],
    counter: usize,
    index: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    components: Vec<Vec<usize>>,
}

impl<'a> Tarjan<'a> {
    fn run(graph: &'a [Vec<usize>]) -> Vec<Vec<usize>> {
        let n = graph.len();
        let mut t = Self {
            graph,
            counter: 0,
            index: vec![None; n],
            lowlink: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            components: Vec::new(),
        };
        for v in 0..n {
            if t.index[v].is_none() {
                t.visit(v);
            }
        }
        t.components
    }

    /// Depth-first walk from `root` on an explicit `(node, next edge)` stack.
    fn visit(&mut self, root: usize) {
        let mut frames = vec![(root, 0)];
        self.open(root);

        while let Some(frame) = frames.last_mut() {
            let v = frame.0;
            if let Some(&w) = self.graph[v].get(frame.1) {
                frame.1 += 1;
                match self.index[w] {
                    None => {
                        self.open(w);
                        frames.push((w, 0));
                    }
                    Some(wi) if self.on_stack[w] => {
                        self.lowlink[v] = self.lowlink[v].min(wi);
                    }
                    Some(_) => {}
                }
                continue;
            }

            frames.pop();
            if let Some(&(parent, _)) = frames.last() {
                self.lowlink[parent] = self.lowlink[parent].min(self.lowlink[v]);
            }
            if Some(self.lowlink[v]) == self.index[v] {
                self.close(v);
            }
        }
    }

    fn open(&mut self, v: usize) {
        self.index[v] = Some(self.counter);
        self.lowlink[v] = self.counter;
        self.counter += 1;
        self.stack.push(v);
        self.on_stack[v] = true;
    }

    /// Pop the component rooted at `v`.
    fn close(&mut self, v: usize) {
        let mut component = Vec::new();
        while let Some(w) = self.stack.pop() {
            self.on_stack[w] = false;
            component.push(w);
            if w == v {
                break;
            }
        }
        component.sort_unstable();
        self.components.push(component);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ReferentialAction;

    fn mto(owner: &str, target: &str) -> Relationship {
        Relationship {
            kind: RelationKind::ManyToOne,
            owner: owner.to_string(),
            target: target.to_string(),
            columns: vec![],
            target_columns: vec![],
            via: None,
            on_delete: ReferentialAction::NoAction,
        }
    }

    #[test]
    fn test_dependencies_first() {
        let ordering = generation_order(
            &["order_items", "orders", "customers"],
            &[mto("order_items", "orders"), mto("orders", "customers")],
        );
        assert_eq!(ordering.order, vec!["customers", "orders", "order_items"]);
        assert!(ordering.cycles.is_empty());
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let ordering = generation_order(&["b", "a", "c"], &[]);
        assert_eq!(ordering.order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_self_reference_is_not_a_cycle() {
        let ordering = generation_order(&["employees"], &[mto("employees", "employees")]);
        assert_eq!(ordering.order, vec!["employees"]);
        assert!(ordering.cycles.is_empty());
    }

    #[test]
    fn test_cycle_is_condensed() {
        let ordering = generation_order(
            &["root", "a", "b", "leaf"],
            &[
                mto("a", "b"),
                mto("b", "a"),
                mto("a", "root"),
                mto("leaf", "b"),
            ],
        );
        assert_eq!(ordering.order, vec!["root", "a", "b", "leaf"]);
        assert_eq!(
            ordering.cycles,
            vec![CycleWarning {
                tables: vec!["a".to_string(), "b".to_string()]
            }]
        );
    }

    #[test]
    fn test_long_chain_does_not_recurse() {
        let names: Vec<String> = (0..50_000).map(|i| format!("t{}", i)).collect();
        let entities: Vec<&str> = names.iter().map(String::as_str).collect();
        // each table points at the next one declared
        let relationships: Vec<Relationship> =
            names.windows(2).map(|pair| mto(&pair[0], &pair[1])).collect();

        let ordering = std::thread::scope(|scope| {
            std::thread::Builder::new()
                .stack_size(256 * 1024)
                .spawn_scoped(scope, || generation_order(&entities, &relationships))
                .unwrap()
                .join()
                .unwrap()
        });

        assert_eq!(ordering.order.len(), 50_000);
        assert_eq!(ordering.order.first().map(String::as_str), Some("t49999"));
        assert_eq!(ordering.order.last().map(String::as_str), Some("t0"));
        assert!(ordering.cycles.is_empty());
    }

    #[test]
    fn test_long_cycle_is_one_component() {
        let names: Vec<String> = (0..10_000).map(|i| format!("t{}", i)).collect();
        let entities: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut relationships: Vec<Relationship> =
            names.windows(2).map(|pair| mto(&pair[0], &pair[1])).collect();
        relationships.push(mto("t9999", "t0"));

        let ordering = generation_order(&entities, &relationships);
        assert_eq!(ordering.order, names);
        assert_eq!(ordering.cycles.len(), 1);
        assert_eq!(ordering.cycles[0].tables.len(), 10_000);
    }

    #[test]
    fn test_many_to_many_adds_no_edge() {
        let mut m2m = mto("tags", "products");
        m2m.kind = RelationKind::ManyToMany;
        let ordering = generation_order(&["tags", "products"], &[m2m]);
        assert_eq!(ordering.order, vec!["tags", "products"]);
    }
}
