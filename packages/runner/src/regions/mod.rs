//! Built-in regions.
//!
//! Every region registers its sections here, keyed by region code and
//! scope. Region resources (fixtures, borders, local sources) live in the
//! regions directory, not in the crate.

pub mod demo;

use aip_parser::SectionRegistry;

/// Registry of all built-in regions.
#[must_use]
pub fn builtin() -> SectionRegistry {
    let mut registry = SectionRegistry::new();
    demo::register(&mut registry);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_region_schedules() {
        let registry = builtin();
        let keys: Vec<_> = registry.keys().collect();
        assert!(!keys.is_empty());

        for (region, scope) in keys {
            let graph = registry.dependency_graph(region, scope).unwrap();
            let order = graph.tsort().unwrap();
            assert_eq!(
                order.len(),
                registry.sections(region, scope).unwrap().len(),
                "{region}/{scope} has sections missing from its order"
            );
        }
    }
}
