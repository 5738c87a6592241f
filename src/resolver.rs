//! Reference resolution - turns `$ref` pointers into schema nodes.
//!
//! Local pointers are walked from the primary document root. External
//! pointers (`other.yaml#/X`, or a bare `Color.json`) are fetched through the
//! context's [`Fetch`](crate::Fetch) implementation, copied into the primary
//! document under the definitions pointer, and from then on addressed by
//! their local pointer. References inside an imported definition are
//! localized the same way, relative to the document they came from.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, trace};

use crate::context::ResolutionContext;
use crate::diagnostics::DiagnosticKind;
use crate::document::{collect_refs, rewrite_refs, InsertOutcome};
use crate::loader::{
    fragment_segments, is_external, navigate_fragment, relative_locator, split_pointer,
};
use crate::schema::{SchemaKind, SchemaNode};

/// A pointer together with the schema it resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedReference {
    /// Local pointer (`#/...`) the schema lives at. For an external pointer
    /// this is where it was imported to.
    pub pointer: String,
    pub node: Rc<SchemaNode>,
}

impl ResolutionContext {
    /// Resolve a pointer to its schema node.
    ///
    /// Never fails: a pointer that leads nowhere gives an empty node and a
    /// `MalformedReference` diagnostic, an unreachable external document an
    /// empty node and a `FetchFailed` diagnostic. Results are cached per
    /// pointer.
    pub fn resolve(&mut self, pointer: &str) -> Rc<SchemaNode> {
        self.resolve_reference(pointer).node
    }

    pub fn resolve_reference(&mut self, pointer: &str) -> ResolvedReference {
        if let Some(hit) = self.caches.resolved.get(pointer) {
            return hit.clone();
        }

        let local = if is_external(pointer) {
            let (locator, fragment) = canonical_target(self.store.locator(), pointer);
            if self.caches.in_flight.contains(&import_key(&locator, &fragment)) {
                trace!(pointer, "re-entrant resolution");
                return ResolvedReference {
                    pointer: pointer.to_string(),
                    node: Rc::new(SchemaNode::default()),
                };
            }
            match self.import(&locator, &fragment, pointer) {
                Some(local) => local,
                None => return self.remember(pointer, pointer.to_string(), SchemaNode::default()),
            }
        } else {
            pointer.to_string()
        };

        let node = match self.store.get(&local) {
            Some(value) => SchemaNode::from_value(value),
            None => {
                self.diagnostics.push(
                    DiagnosticKind::MalformedReference,
                    pointer,
                    "reference does not lead to a schema",
                );
                SchemaNode::default()
            }
        };
        trace!(pointer, local = %local, "resolved");
        self.remember(pointer, local, node)
    }

    fn remember(&mut self, pointer: &str, local: String, node: SchemaNode) -> ResolvedReference {
        let resolved = ResolvedReference {
            pointer: local,
            node: Rc::new(node),
        };
        self.caches
            .resolved
            .insert(pointer.to_string(), resolved.clone());
        resolved
    }

    /// The definition called `name`, following definitions that are
    /// themselves a bare `$ref`.
    ///
    /// Lookup falls back to promoted titled schemas and then to the
    /// prefix-stripped name. `None` when nothing matches.
    pub fn definition(&mut self, name: &str) -> Option<Rc<SchemaNode>> {
        if let Some(hit) = self.caches.definitions.get(name) {
            return hit.clone();
        }
        let found = self.lookup_definition(name);
        self.caches
            .definitions
            .insert(name.to_string(), found.clone());
        found
    }

    fn lookup_definition(&mut self, name: &str) -> Option<Rc<SchemaNode>> {
        let pointer = self.store.definition_pointer(name, &self.prefix)?;
        let mut node = self.resolve(&pointer);
        let mut visited = HashSet::from([pointer]);

        loop {
            let next = match node.kind() {
                SchemaKind::Reference(next) => next.to_string(),
                _ => break,
            };
            if !visited.insert(next.clone()) {
                trace!(name, "definition reference chain loops");
                return Some(Rc::new(SchemaNode::default()));
            }
            node = self.resolve(&next);
        }
        Some(node)
    }

    pub fn has_definition(&mut self, name: &str) -> bool {
        self.definition(name).is_some()
    }

    /// Import every external reference of the primary document and point it
    /// at the local copy. Running it again finds nothing left to do.
    pub(crate) fn localize_document(&mut self) {
        let mut references = Vec::new();
        collect_refs(self.store.document(), &mut references);

        let base = self.store.locator().to_string();
        let mut rewrite = HashMap::new();
        for reference in references {
            if !is_external(&reference) || rewrite.contains_key(&reference) {
                continue;
            }
            let (locator, fragment) = canonical_target(&base, &reference);
            if let Some(local) = self.import(&locator, &fragment, &reference) {
                rewrite.insert(reference, local);
            }
        }

        if !rewrite.is_empty() {
            debug!(count = rewrite.len(), "localized external references");
            self.store.rewrite_references(&rewrite);
        }
    }

    /// Copy the schema at `locator` + `fragment` into the primary document and
    /// return its local pointer.
    ///
    /// Nested references are imported first, relative to `locator`. A request
    /// for a target whose import is already under way returns the pointer it
    /// will be stored at without recursing.
    fn import(&mut self, locator: &str, fragment: &str, original: &str) -> Option<String> {
        if locator == self.store.locator() {
            return Some(if fragment.is_empty() { "#".to_string() } else { fragment.to_string() });
        }

        let key = import_key(locator, fragment);
        if let Some(local) = self.caches.imported.get(&key) {
            return Some(local.clone());
        }

        let name = import_name(locator, fragment);
        let local = self.store.pointer_for(&name);
        if self.caches.in_flight.contains(&key) {
            trace!(key = %key, "import already in progress");
            return Some(local);
        }

        let document = self.fetch_document(locator)?;
        let Some(raw) = navigate_fragment(&document, fragment) else {
            self.diagnostics.push(
                DiagnosticKind::MalformedReference,
                original,
                format!("{} not found in {}", fragment, locator),
            );
            return None;
        };
        let mut definition = raw.clone();

        self.caches.in_flight.insert(key.clone());
        let mut nested = Vec::new();
        collect_refs(&definition, &mut nested);
        let mut rewrite = HashMap::new();
        for reference in nested {
            if rewrite.contains_key(&reference) {
                continue;
            }
            let (target_locator, target_fragment) = canonical_target(locator, &reference);
            if let Some(target) = self.import(&target_locator, &target_fragment, &reference) {
                rewrite.insert(reference, target);
            }
        }
        rewrite_refs(&mut definition, &rewrite);
        self.caches.in_flight.remove(&key);

        match self.store.insert_definition(&name, definition) {
            InsertOutcome::Inserted => debug!(key = %key, local = %local, "imported definition"),
            InsertOutcome::Identical => trace!(key = %key, "definition already present"),
            InsertOutcome::Conflict => self.diagnostics.push(
                DiagnosticKind::DuplicateDefinition,
                &name,
                format!(
                    "{} differs from the existing definition {}; keeping the first",
                    key, name
                ),
            ),
        }
        self.caches.imported.insert(key, local.clone());
        Some(local)
    }

    fn fetch_document(&mut self, locator: &str) -> Option<Rc<Value>> {
        if let Some(document) = self.store.external(locator) {
            return Some(document);
        }
        if self.caches.failed_fetches.contains(locator) {
            return None;
        }

        debug!(locator, "fetching external document");
        match self.fetcher.fetch(locator) {
            Ok(document) => Some(self.store.add_external(locator, document)),
            Err(e) => {
                self.caches.failed_fetches.insert(locator.to_string());
                self.diagnostics
                    .push(DiagnosticKind::FetchFailed, locator, e.to_string());
                None
            }
        }
    }
}

/// Absolute locator and fragment (without a lone `#`) of `pointer` as seen
/// from the document at `base`.
fn canonical_target(base: &str, pointer: &str) -> (String, String) {
    let (locator, fragment) = split_pointer(pointer);
    let locator = if locator.is_empty() {
        base.to_string()
    } else {
        relative_locator(base, locator)
    };
    let fragment = match fragment {
        Some("#") | None => String::new(),
        Some(fragment) => fragment.to_string(),
    };
    (locator, fragment)
}

fn import_key(locator: &str, fragment: &str) -> String {
    format!("{}{}", locator, fragment)
}

/// Local definition name of an imported target: the last fragment segment,
/// or the file stem for a whole-document reference.
fn import_name(locator: &str, fragment: &str) -> String {
    if let Some(last) = fragment_segments(fragment).pop() {
        return last;
    }
    Path::new(locator)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(locator)
        .to_string()
}
