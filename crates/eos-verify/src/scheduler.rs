//! Dependency resolution and execution ordering
//!
//! Tests form a graph with an edge from each dependency to its dependent.
//! `DEPENDS_ON` names resolve within the dependent's own `context-check`
//! first, then across the corpus when exactly one test carries the name.
//! Planning is static: it classifies tests that can never run (unknown
//! dependency, dependency cycle) and orders the rest in waves. Whether a
//! dependency *passed* is only known at run time and handled by the runner.

use eos_standards::TestDefinition;
use indexmap::IndexMap;
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use std::collections::{BTreeSet, VecDeque};
use std::ops::Range;

/// What the plan decided for one test
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Run once its dependencies settle
    Schedule,
    /// At least one `DEPENDS_ON` target does not exist
    MissingDependency {
        /// Unknown dependency names, declaration order
        missing: Vec<String>,
    },
    /// A `DEPENDS_ON` name matches tests in several other `context-check`s
    AmbiguousDependency {
        /// Ambiguous dependency names, declaration order
        ambiguous: Vec<String>,
    },
    /// Member of, or downstream of, a dependency cycle
    CircularDependency {
        /// Cycle members in document order
        via: Vec<String>,
    },
}

/// One test's place in the plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTest {
    /// Index into the planned test slice
    pub index: usize,
    /// Longest dependency depth, `None` for cycle-affected tests
    pub wave: Option<usize>,
    /// Static classification
    pub disposition: Disposition,
    /// Indices of known dependencies, declaration order
    pub dependencies: Vec<usize>,
}

/// Ordered plan for a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionPlan {
    order: Vec<PlannedTest>,
    waves: Vec<Range<usize>>,
}

impl ExecutionPlan {
    /// Every test: waves first, then cycle-affected tests in document order
    #[inline]
    #[must_use]
    pub fn order(&self) -> &[PlannedTest] {
        &self.order
    }

    /// Tests grouped by wave; every dependency sits in an earlier wave
    pub fn waves(&self) -> impl Iterator<Item = &[PlannedTest]> + '_ {
        self.waves.iter().map(|range| &self.order[range.clone()])
    }

    /// Number of waves
    #[inline]
    #[must_use]
    pub fn wave_count(&self) -> usize {
        self.waves.len()
    }

    /// Tests that can never be ordered because of a cycle
    #[must_use]
    pub fn unscheduled(&self) -> &[PlannedTest] {
        let start = self.waves.last().map_or(0, |r| r.end);
        &self.order[start..]
    }

    /// Number of planned tests
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the plan is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Builds execution plans from test definitions
#[derive(Debug, Default, Clone, Copy)]
pub struct DependencyResolver;

impl DependencyResolver {
    /// Create resolver
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Plan `tests`
    #[must_use]
    pub fn plan(&self, tests: &[TestDefinition]) -> ExecutionPlan {
        let mut by_name: IndexMap<&str, Vec<usize>> = IndexMap::new();
        for (i, test) in tests.iter().enumerate() {
            by_name.entry(test.name.as_str()).or_default().push(i);
        }

        let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
        let mut dependencies = vec![Vec::new(); tests.len()];
        let mut missing = vec![Vec::new(); tests.len()];
        let mut ambiguous = vec![Vec::new(); tests.len()];

        for (i, test) in tests.iter().enumerate() {
            graph.add_node(i);
            for dep in &test.depends_on {
                let candidates = by_name.get(dep.as_str()).map_or(&[][..], Vec::as_slice);
                let local = candidates.iter().copied().find(|&c| {
                    tests[c].origin.context_check_id == test.origin.context_check_id
                });
                let target = match (local, candidates) {
                    (Some(d), _) | (None, &[d]) => d,
                    (None, []) => {
                        missing[i].push(dep.clone());
                        continue;
                    }
                    (None, _) => {
                        ambiguous[i].push(dep.clone());
                        continue;
                    }
                };
                graph.add_edge(target, i, ());
                if !dependencies[i].contains(&target) {
                    dependencies[i].push(target);
                }
            }
        }

        let cyclic = cycle_membership(&graph, tests);
        let total = tests.len();
        let mut order = Vec::with_capacity(total);
        let mut waves = Vec::new();

        // Layered Kahn over the acyclic part. Cycle-affected nodes have no
        // acyclic dependents, so they are simply excluded.
        let mut in_degree: Vec<usize> = (0..total)
            .map(|i| graph.neighbors_directed(i, Direction::Incoming).count())
            .collect();
        let mut layer: Vec<usize> = (0..total)
            .filter(|&i| cyclic[i].is_none() && in_degree[i] == 0)
            .collect();

        while !layer.is_empty() {
            layer.sort_unstable();
            let wave = waves.len();
            let start = order.len();
            let mut next = Vec::new();

            for &i in &layer {
                order.push(PlannedTest {
                    index: i,
                    wave: Some(wave),
                    disposition: static_disposition(&missing[i], &ambiguous[i]),
                    dependencies: dependencies[i].clone(),
                });
                for dependent in graph.neighbors_directed(i, Direction::Outgoing) {
                    in_degree[dependent] -= 1;
                    if in_degree[dependent] == 0 && cyclic[dependent].is_none() {
                        next.push(dependent);
                    }
                }
            }

            waves.push(start..order.len());
            layer = next;
        }

        for (i, via) in cyclic.iter().enumerate() {
            if let Some(via) = via {
                order.push(PlannedTest {
                    index: i,
                    wave: None,
                    disposition: Disposition::CircularDependency { via: via.clone() },
                    dependencies: dependencies[i].clone(),
                });
            }
        }

        tracing::debug!(
            tests = total,
            waves = waves.len(),
            unscheduled = total - waves.last().map_or(0, |r: &Range<usize>| r.end),
            "execution plan built"
        );

        ExecutionPlan { order, waves }
    }
}

fn static_disposition(missing: &[String], ambiguous: &[String]) -> Disposition {
    if !missing.is_empty() {
        Disposition::MissingDependency {
            missing: missing.to_vec(),
        }
    } else if !ambiguous.is_empty() {
        Disposition::AmbiguousDependency {
            ambiguous: ambiguous.to_vec(),
        }
    } else {
        Disposition::Schedule
    }
}

/// For each test, the cycle it belongs to or descends from
fn cycle_membership(
    graph: &DiGraphMap<usize, ()>,
    tests: &[TestDefinition],
) -> Vec<Option<Vec<String>>> {
    let mut cycles: Vec<Vec<usize>> = tarjan_scc(graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .map(|mut scc| {
            scc.sort_unstable();
            scc
        })
        .collect();
    cycles.sort_unstable_by_key(|scc| scc[0]);

    let mut membership: Vec<Option<Vec<String>>> = vec![None; tests.len()];

    for scc in &cycles {
        let via: Vec<String> = scc.iter().map(|&i| tests[i].name.clone()).collect();
        let mut queue: VecDeque<usize> = scc.iter().copied().collect();
        let mut seen: BTreeSet<usize> = scc.iter().copied().collect();

        while let Some(node) = queue.pop_front() {
            if membership[node].is_none() {
                membership[node] = Some(via.clone());
            }
            for dependent in graph.neighbors_directed(node, Direction::Outgoing) {
                if seen.insert(dependent) {
                    queue.push_back(dependent);
                }
            }
        }
    }

    membership
}

#[cfg(test)]
mod tests {
    use super::*;
    use eos_standards::TestOrigin;
    use pretty_assertions::assert_eq;

    fn test(name: &str, deps: &[&str]) -> TestDefinition {
        TestDefinition::new(name, "exit 0").with_depends_on(deps.iter().copied())
    }

    fn in_block(context_check: &str, name: &str, deps: &[&str]) -> TestDefinition {
        test(name, deps).with_origin(TestOrigin {
            context_check_id: context_check.to_string(),
            ..TestOrigin::default()
        })
    }

    fn names<'a>(tests: &'a [TestDefinition], planned: &[PlannedTest]) -> Vec<&'a str> {
        planned.iter().map(|p| tests[p.index].name.as_str()).collect()
    }

    #[test]
    fn empty_graph() {
        let plan = DependencyResolver::new().plan(&[]);
        assert!(plan.is_empty());
        assert_eq!(plan.wave_count(), 0);
        assert!(plan.unscheduled().is_empty());
    }

    #[test]
    fn independent_tests_keep_document_order_in_one_wave() {
        let tests = vec![test("c", &[]), test("a", &[]), test("b", &[])];
        let plan = DependencyResolver::new().plan(&tests);
        assert_eq!(plan.wave_count(), 1);
        assert_eq!(names(&tests, plan.order()), vec!["c", "a", "b"]);
    }

    #[test]
    fn dependencies_come_first() {
        let tests = vec![
            test("deploy", &["build", "lint"]),
            test("lint", &[]),
            test("build", &["lint"]),
            test("docs", &[]),
        ];
        let plan = DependencyResolver::new().plan(&tests);

        let waves: Vec<Vec<&str>> = plan.waves().map(|w| names(&tests, w)).collect();
        assert_eq!(
            waves,
            vec![vec!["lint", "docs"], vec!["build"], vec!["deploy"]]
        );
        assert_eq!(plan.order()[3].dependencies, vec![2, 1]);
    }

    #[test]
    fn three_cycle_and_downstream_are_flagged() {
        let tests = vec![
            test("A", &["C"]),
            test("B", &["A"]),
            test("C", &["B"]),
            test("after", &["C"]),
            test("free", &[]),
        ];
        let plan = DependencyResolver::new().plan(&tests);

        assert_eq!(names(&tests, plan.order()), vec!["free", "A", "B", "C", "after"]);
        for planned in plan.unscheduled() {
            assert_eq!(planned.wave, None);
            assert_eq!(
                planned.disposition,
                Disposition::CircularDependency {
                    via: vec!["A".into(), "B".into(), "C".into()]
                }
            );
        }
        assert_eq!(plan.unscheduled().len(), 4);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let tests = vec![test("loop", &["loop"])];
        let plan = DependencyResolver::new().plan(&tests);
        assert_eq!(
            plan.order()[0].disposition,
            Disposition::CircularDependency {
                via: vec!["loop".into()]
            }
        );
    }

    #[test]
    fn unknown_dependency_is_classified_but_ordered() {
        let tests = vec![test("a", &["ghost", "b"]), test("b", &[]), test("c", &["a"])];
        let plan = DependencyResolver::new().plan(&tests);

        assert_eq!(names(&tests, plan.order()), vec!["b", "a", "c"]);
        assert_eq!(
            plan.order()[1].disposition,
            Disposition::MissingDependency {
                missing: vec!["ghost".into()]
            }
        );
        assert_eq!(plan.order()[2].disposition, Disposition::Schedule);
        assert!(plan.unscheduled().is_empty());
    }

    #[test]
    fn shared_names_resolve_within_the_dependent_block_first() {
        let tests = vec![
            in_block("arch", "lint", &[]),
            in_block("testing", "lint", &[]),
            in_block("testing", "coverage", &["lint"]),
            in_block("docs", "links", &["coverage"]),
        ];
        let plan = DependencyResolver::new().plan(&tests);

        let coverage = plan.order().iter().find(|p| p.index == 2).unwrap();
        assert_eq!(coverage.dependencies, vec![1]);
        assert_eq!(coverage.disposition, Disposition::Schedule);

        // unique across the corpus, so another block may reference it
        let links = plan.order().iter().find(|p| p.index == 3).unwrap();
        assert_eq!(links.dependencies, vec![2]);
        assert_eq!(links.disposition, Disposition::Schedule);
    }

    #[test]
    fn name_shared_by_other_blocks_is_ambiguous() {
        let tests = vec![
            in_block("arch", "lint", &[]),
            in_block("testing", "lint", &[]),
            in_block("release", "ship", &["lint"]),
        ];
        let plan = DependencyResolver::new().plan(&tests);

        let ship = plan.order().iter().find(|p| p.index == 2).unwrap();
        assert_eq!(
            ship.disposition,
            Disposition::AmbiguousDependency {
                ambiguous: vec!["lint".into()]
            }
        );
        assert!(ship.dependencies.is_empty());
        assert_eq!(ship.wave, Some(0));
    }
}
