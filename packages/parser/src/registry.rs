//! Explicit registry of section parsers per region and scope.
//!
//! Regions register a list of [`SectionDescriptor`]s under a
//! `(region, scope)` key. The runner looks the key up, builds a
//! [`DependencyGraph`] from the descriptors and instantiates each section's
//! parser through its factory when its turn comes.

use std::collections::BTreeMap;
use std::fmt;

use crate::patch::PatchSet;
use crate::scheduler::DependencyGraph;
use crate::{ParseError, SectionParser};

/// Static description of one section.
#[derive(Clone, Copy)]
pub struct SectionDescriptor {
    /// Section name, unique within its region and scope.
    pub name: &'static str,
    /// Sections that must be parsed first.
    pub dependencies: &'static [&'static str],
    /// Builds a fresh parser instance.
    pub factory: fn() -> Box<dyn SectionParser>,
    /// Builds the patches attached while this section is parsed.
    pub patches: fn() -> PatchSet,
}

impl SectionDescriptor {
    /// A descriptor without patches.
    #[must_use]
    pub const fn new(
        name: &'static str,
        dependencies: &'static [&'static str],
        factory: fn() -> Box<dyn SectionParser>,
    ) -> Self {
        Self {
            name,
            dependencies,
            factory,
            patches: PatchSet::new,
        }
    }

    /// Sets the patch builder.
    #[must_use]
    pub const fn with_patches(mut self, patches: fn() -> PatchSet) -> Self {
        self.patches = patches;
        self
    }
}

impl fmt::Debug for SectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectionDescriptor")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Section descriptors keyed by `(region, scope)`.
#[derive(Debug, Default)]
pub struct SectionRegistry {
    regions: BTreeMap<(String, String), Vec<SectionDescriptor>>,
}

impl SectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a section, replacing an earlier one of the same name.
    pub fn register(&mut self, region: &str, scope: &str, descriptor: SectionDescriptor) {
        let sections = self
            .regions
            .entry((region.to_owned(), scope.to_owned()))
            .or_default();

        if let Some(existing) = sections.iter_mut().find(|s| s.name == descriptor.name) {
            log::warn!(
                "Section {} registered twice for {region}/{scope}",
                descriptor.name
            );
            *existing = descriptor;
        } else {
            sections.push(descriptor);
        }
    }

    /// Registered `(region, scope)` keys in order.
    pub fn keys(&self) -> impl Iterator<Item = (&str, &str)> {
        self.regions
            .keys()
            .map(|(region, scope)| (region.as_str(), scope.as_str()))
    }

    /// Sections registered for `region` and `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::UnknownRegion`] if nothing is registered under
    /// that key.
    pub fn sections(&self, region: &str, scope: &str) -> Result<&[SectionDescriptor], ParseError> {
        self.regions
            .get(&(region.to_owned(), scope.to_owned()))
            .map(Vec::as_slice)
            .ok_or_else(|| ParseError::UnknownRegion {
                region: region.to_owned(),
                scope: scope.to_owned(),
            })
    }

    /// The descriptor of `section`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::UnknownRegion`] if nothing is registered under
    /// `(region, scope)`.
    pub fn section(
        &self,
        region: &str,
        scope: &str,
        section: &str,
    ) -> Result<Option<&SectionDescriptor>, ParseError> {
        Ok(self
            .sections(region, scope)?
            .iter()
            .find(|s| s.name == section))
    }

    /// Dependency graph of all sections of `region` and `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::UnknownRegion`] if nothing is registered under
    /// that key.
    pub fn dependency_graph(&self, region: &str, scope: &str) -> Result<DependencyGraph, ParseError> {
        let mut graph = DependencyGraph::new();
        for descriptor in self.sections(region, scope)? {
            graph.add(descriptor.name, descriptor.dependencies);
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParseContext;
    use crate::patch::{Override, Patch};

    struct Noop;

    #[async_trait::async_trait(?Send)]
    impl SectionParser for Noop {
        async fn parse(&mut self, _ctx: &mut ParseContext<'_>) -> Result<(), ParseError> {
            Ok(())
        }
    }

    fn noop() -> Box<dyn SectionParser> {
        Box::new(Noop)
    }

    fn one_patch() -> PatchSet {
        PatchSet::new().with(Patch::new("Airport", "name", |_, _, _| Override::Keep))
    }

    fn registry() -> SectionRegistry {
        let mut registry = SectionRegistry::new();
        registry.register("DEMO", "AIP", SectionDescriptor::new("services", &["airports"], noop));
        registry.register(
            "DEMO",
            "AIP",
            SectionDescriptor::new("airports", &[], noop).with_patches(one_patch),
        );
        registry.register("DEMO", "VFR", SectionDescriptor::new("airports", &[], noop));
        registry
    }

    #[test]
    fn looks_up_sections_by_region_and_scope() {
        let registry = registry();

        assert_eq!(registry.sections("DEMO", "AIP").unwrap().len(), 2);
        assert_eq!(
            registry.keys().collect::<Vec<_>>(),
            [("DEMO", "AIP"), ("DEMO", "VFR")]
        );

        let airports = registry.section("DEMO", "AIP", "airports").unwrap().unwrap();
        assert_eq!((airports.patches)().len(), 1);
        assert!(registry.section("DEMO", "AIP", "navaids").unwrap().is_none());

        assert!(matches!(
            registry.sections("XX", "AIP"),
            Err(ParseError::UnknownRegion { .. })
        ));
    }

    #[test]
    fn builds_dependency_graph() {
        let graph = registry().dependency_graph("DEMO", "AIP").unwrap();
        assert_eq!(graph.tsort().unwrap(), ["airports", "services"]);
    }

    #[test]
    fn registering_twice_replaces() {
        let mut registry = registry();
        registry.register("DEMO", "AIP", SectionDescriptor::new("airports", &[], noop));

        let sections = registry.sections("DEMO", "AIP").unwrap();
        assert_eq!(sections.len(), 2);
        let airports = sections.iter().find(|s| s.name == "airports").unwrap();
        assert!((airports.patches)().is_empty());
    }
}
