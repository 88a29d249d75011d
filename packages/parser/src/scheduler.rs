//! Topological ordering of sections by their declared dependencies.

use std::collections::{BTreeMap, BTreeSet};

/// Errors raised while ordering sections.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// The dependency graph contains a cycle. Holds the path around it,
    /// starting and ending with the same section.
    #[error("Cyclic dependency: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    /// A section (or one of its dependencies) is not in the graph.
    #[error("Unknown section {0}")]
    UnknownSection(String),
}

/// Section name to prerequisite section names.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    dependencies: BTreeMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `section` with its prerequisites, replacing any previous
    /// declaration.
    pub fn add<S: AsRef<str>>(&mut self, section: &str, dependencies: &[S]) {
        self.dependencies.insert(
            section.to_owned(),
            dependencies.iter().map(|d| d.as_ref().to_owned()).collect(),
        );
    }

    /// Whether `section` is declared.
    #[must_use]
    pub fn contains(&self, section: &str) -> bool {
        self.dependencies.contains_key(section)
    }

    /// Declared prerequisites of `section`.
    #[must_use]
    pub fn dependencies(&self, section: &str) -> Option<&[String]> {
        self.dependencies.get(section).map(Vec::as_slice)
    }

    /// Number of declared sections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    /// Whether no section is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// All sections, every one after its prerequisites.
    ///
    /// Sections are visited in name order and prerequisites in declared
    /// order, so the result is deterministic.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::CyclicDependency`] if the graph has a
    /// cycle and [`SchedulerError::UnknownSection`] if a prerequisite is
    /// not declared.
    pub fn tsort(&self) -> Result<Vec<String>, SchedulerError> {
        let mut order = Vec::with_capacity(self.dependencies.len());
        let mut done = BTreeSet::new();
        let mut path = Vec::new();

        for section in self.dependencies.keys() {
            self.visit(section, &mut path, &mut done, &mut order)?;
        }

        Ok(order)
    }

    /// `section` and everything it transitively depends on, in the same
    /// relative order as [`DependencyGraph::tsort`].
    ///
    /// # Errors
    ///
    /// Same as [`DependencyGraph::tsort`], plus
    /// [`SchedulerError::UnknownSection`] if `section` is not declared.
    pub fn tsort_for(&self, section: &str) -> Result<Vec<String>, SchedulerError> {
        if !self.contains(section) {
            return Err(SchedulerError::UnknownSection(section.to_owned()));
        }

        let order = self.tsort()?;

        let mut closure = BTreeSet::new();
        let mut pending = vec![section];
        while let Some(current) = pending.pop() {
            if closure.insert(current) {
                pending.extend(self.dependencies[current].iter().map(String::as_str));
            }
        }

        Ok(order
            .into_iter()
            .filter(|s| closure.contains(s.as_str()))
            .collect())
    }

    fn visit(
        &self,
        section: &str,
        path: &mut Vec<String>,
        done: &mut BTreeSet<String>,
        order: &mut Vec<String>,
    ) -> Result<(), SchedulerError> {
        if done.contains(section) {
            return Ok(());
        }

        if let Some(start) = path.iter().position(|s| s == section) {
            let mut cycle = path[start..].to_vec();
            cycle.push(section.to_owned());
            return Err(SchedulerError::CyclicDependency(cycle));
        }

        let Some(dependencies) = self.dependencies.get(section) else {
            if let Some(parent) = path.last() {
                log::error!("Section {parent} depends on undeclared section {section}");
            }
            return Err(SchedulerError::UnknownSection(section.to_owned()));
        };

        path.push(section.to_owned());
        for dependency in dependencies {
            self.visit(dependency, path, done, order)?;
        }
        path.pop();

        done.insert(section.to_owned());
        order.push(section.to_owned());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for &(section, dependencies) in edges {
            graph.add(section, dependencies);
        }
        graph
    }

    fn position(order: &[String], section: &str) -> usize {
        order.iter().position(|s| s == section).unwrap()
    }

    #[test]
    fn orders_prerequisites_first() {
        let graph = graph(&[
            ("AD-2", &["ENR-4.1", "ENR-2.1"]),
            ("ENR-2.1", &[]),
            ("ENR-4.1", &["ENR-2.1"]),
            ("GEN-3.1", &[]),
        ]);

        let order = graph.tsort().unwrap();
        assert_eq!(order.len(), 4);
        for section in ["AD-2", "ENR-2.1", "ENR-4.1", "GEN-3.1"] {
            for dependency in graph.dependencies(section).unwrap() {
                assert!(position(&order, dependency) < position(&order, section));
            }
        }
        assert_eq!(order, ["ENR-2.1", "ENR-4.1", "AD-2", "GEN-3.1"]);
    }

    #[test]
    fn closure_is_a_subsequence_of_the_full_order() {
        let graph = graph(&[
            ("a", &[]),
            ("b", &["a"]),
            ("c", &["b"]),
            ("d", &["a"]),
            ("e", &[]),
        ]);

        let full = graph.tsort().unwrap();
        let partial = graph.tsort_for("c").unwrap();
        assert_eq!(partial, ["a", "b", "c"]);

        let mut remaining = full.iter();
        for section in &partial {
            assert!(remaining.any(|s| s == section));
        }

        assert_eq!(graph.tsort_for("e").unwrap(), ["e"]);
    }

    #[test]
    fn detects_cycles() {
        let graph = graph(&[("a", &["c"]), ("b", &["a"]), ("c", &["b"]), ("d", &[])]);

        assert_eq!(
            graph.tsort(),
            Err(SchedulerError::CyclicDependency(vec![
                "a".into(),
                "c".into(),
                "b".into(),
                "a".into()
            ]))
        );
        assert!(matches!(
            graph.tsort_for("d"),
            Err(SchedulerError::CyclicDependency(_))
        ));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let graph = graph(&[("a", &["a"])]);
        assert_eq!(
            graph.tsort(),
            Err(SchedulerError::CyclicDependency(vec!["a".into(), "a".into()]))
        );
    }

    #[test]
    fn unknown_sections_are_errors() {
        let graph = graph(&[("a", &["missing"])]);
        assert_eq!(
            graph.tsort(),
            Err(SchedulerError::UnknownSection("missing".into()))
        );
        assert_eq!(
            DependencyGraph::new().tsort_for("a"),
            Err(SchedulerError::UnknownSection("a".into()))
        );
    }

    #[test]
    fn empty_graph_sorts_to_nothing() {
        assert!(DependencyGraph::new().tsort().unwrap().is_empty());
    }
}
