//! Per-run resolution state.
//!
//! A [`ResolutionContext`] owns the document store, the configuration, the
//! fetcher for external documents and every cache the engine keeps. The
//! operations themselves live next to the concern they implement
//! (`resolver`, `flatten`, `typing`) as further `impl` blocks.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::config::{GraphConfig, PrefixRule};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::document::DocumentStore;
use crate::error::ConfigError;
use crate::loader::{DefaultFetcher, Fetch};
use crate::resolver::ResolvedReference;
use crate::schema::{PropertyMap, SchemaNode};

/// Memo tables. Everything here can be dropped and rebuilt from the store.
#[derive(Debug, Default)]
pub(crate) struct Caches {
    /// Pointer as requested to its local pointer and normalized node.
    pub resolved: HashMap<String, ResolvedReference>,
    /// Definition name to its node, after following `$ref` chains.
    pub definitions: HashMap<String, Option<Rc<SchemaNode>>>,
    /// Flattened `allOf` ancestry per resource. An entry exists (empty) while
    /// the resource is being flattened.
    pub flattened: HashMap<String, Rc<PropertyMap>>,
    pub property_maps: HashMap<String, Rc<PropertyMap>>,
    /// `locator#fragment` of imported definitions to their local pointer.
    pub imported: HashMap<String, String>,
    /// Locators that could not be fetched.
    pub failed_fetches: HashSet<String>,
    /// Imports currently in progress.
    pub in_flight: HashSet<String>,
}

impl Caches {
    fn clear(&mut self) {
        self.resolved.clear();
        self.definitions.clear();
        self.flattened.clear();
        self.property_maps.clear();
        self.imported.clear();
        self.failed_fetches.clear();
        self.in_flight.clear();
    }
}

pub struct ResolutionContext {
    pub(crate) store: DocumentStore,
    pub(crate) config: GraphConfig,
    pub(crate) prefix: PrefixRule,
    pub(crate) fetcher: Box<dyn Fetch>,
    pub(crate) caches: Caches,
    pub(crate) diagnostics: Diagnostics,
}

impl fmt::Debug for ResolutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionContext")
            .field("locator", &self.store.locator())
            .field("config", &self.config)
            .field("diagnostics", &self.diagnostics.len())
            .finish_non_exhaustive()
    }
}

impl ResolutionContext {
    /// Create a context that fetches external documents from disk or HTTP.
    ///
    /// External references of the primary document are imported and
    /// rewritten to local pointers before this returns.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPrefixPattern` if the configured prefix is
    /// not a valid regex.
    pub fn new(store: DocumentStore, config: GraphConfig) -> Result<Self, ConfigError> {
        Self::with_fetcher(store, config, Box::new(DefaultFetcher))
    }

    /// Like [`ResolutionContext::new`], with a custom source for external
    /// documents.
    pub fn with_fetcher(
        store: DocumentStore,
        config: GraphConfig,
        fetcher: Box<dyn Fetch>,
    ) -> Result<Self, ConfigError> {
        let prefix = config.prefix_rule()?;
        let mut context = Self {
            store,
            config,
            prefix,
            fetcher,
            caches: Caches::default(),
            diagnostics: Diagnostics::new(),
        };
        context.localize_document();
        Ok(context)
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn prefix_rule(&self) -> &PrefixRule {
        &self.prefix
    }

    /// Type name with the configured prefix rule applied.
    pub fn strip_prefix(&self, name: &str) -> String {
        self.prefix.strip(name)
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.diagnostics.take()
    }

    /// Drop every memoized result. The store, including localized
    /// definitions and fetched documents, is kept.
    pub fn clear_caches(&mut self) {
        debug!("clearing resolution caches");
        self.caches.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticKind;
    use serde_json::json;

    #[test]
    fn invalid_prefix_is_rejected() {
        let store = DocumentStore::from_value(json!({"definitions": {}}), "api.json");
        let config = GraphConfig::default().prefix("[unclosed", "");
        let result = ResolutionContext::new(store, config);
        assert!(matches!(result, Err(ConfigError::InvalidPrefixPattern { .. })));
    }

    #[test]
    fn clear_caches_keeps_results_stable() {
        let store = DocumentStore::from_value(
            json!({"definitions": {"Pet": {"properties": {"id": {"type": "string"}}}}}),
            "api.json",
        );
        let mut ctx = ResolutionContext::new(store, GraphConfig::default()).unwrap();

        let before = ctx.resolve("#/definitions/Pet");
        ctx.clear_caches();
        let after = ctx.resolve("#/definitions/Pet");
        assert_eq!(before, after);
        assert_eq!(ctx.caches.resolved.len(), 1);
    }

    #[test]
    fn take_diagnostics_drains() {
        let store = DocumentStore::from_value(json!({"definitions": {}}), "api.json");
        let mut ctx = ResolutionContext::new(store, GraphConfig::default()).unwrap();
        ctx.resolve("#/definitions/Missing");
        assert_eq!(ctx.diagnostics().count(DiagnosticKind::MalformedReference), 1);

        let taken = ctx.take_diagnostics();
        assert_eq!(taken.len(), 1);
        assert!(ctx.diagnostics().is_empty());
    }
}
