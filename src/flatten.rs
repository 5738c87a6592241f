//! `allOf` flattening.
//!
//! A resource's flattened map is the union of the properties its `allOf`
//! ancestry contributes, in declaration order, with the first definition of
//! a name winning. Results are memoized per resource name.

use std::rc::Rc;

use tracing::trace;

use crate::context::ResolutionContext;
use crate::loader::last_segment;
use crate::schema::{PropertyMap, SchemaNode};

impl ResolutionContext {
    /// Properties contributed by the `allOf` ancestry of `resource`.
    ///
    /// Empty for resources without `allOf` and for unknown names. Cycles in
    /// the ancestry are cut: a resource reached again while it is being
    /// flattened contributes nothing.
    pub fn flatten(&mut self, resource: &str) -> Rc<PropertyMap> {
        if let Some(hit) = self.caches.flattened.get(resource) {
            return Rc::clone(hit);
        }
        // Mark as in progress before recursing
        self.caches
            .flattened
            .insert(resource.to_string(), Rc::new(PropertyMap::new()));

        let mut merged = PropertyMap::new();
        if let Some(definition) = self.definition(resource) {
            self.flatten_branches(&definition.all_of, &mut merged);
        }
        trace!(resource, properties = merged.len(), "flattened");

        let merged = Rc::new(merged);
        self.caches
            .flattened
            .insert(resource.to_string(), Rc::clone(&merged));
        merged
    }

    fn flatten_branches(&mut self, branches: &[SchemaNode], merged: &mut PropertyMap) {
        for branch in branches {
            if let Some(reference) = &branch.reference {
                let supertype = last_segment(reference);
                if let Some(definition) = self.definition(supertype) {
                    merged.merge(&definition.own_properties());
                }
                let inherited = self.flatten(supertype);
                merged.merge(&inherited);
            } else {
                if let Some(properties) = &branch.properties {
                    merged.merge(properties);
                }
                self.flatten_branches(&branch.all_of, merged);
            }
        }
    }

    /// Properties of `resource` as seen by node building: its own
    /// `properties`, plus the flattened ancestry when `flatten_inheritance` is
    /// set.
    pub fn property_map(&mut self, resource: &str) -> Rc<PropertyMap> {
        if let Some(hit) = self.caches.property_maps.get(resource) {
            return Rc::clone(hit);
        }

        let mut map = self
            .definition(resource)
            .map(|definition| definition.own_properties())
            .unwrap_or_default();
        if self.config.flatten_inheritance {
            let inherited = self.flatten(resource);
            map.merge(&inherited);
        }

        let map = Rc::new(map);
        self.caches
            .property_maps
            .insert(resource.to_string(), Rc::clone(&map));
        map
    }
}
