//! API Schema Graph
//!
//! Resolves the resource schemas of an OpenAPI (v2 or v3) document into a
//! type graph: one node per resource with its flattened properties, and
//! reference and inheritance edges between resources.
//!
//! Resolution follows local and external `$ref`s (files and HTTP URLs),
//! flattens `allOf` ancestry and normalizes types and cardinalities. Every
//! step terminates on cyclic schemas, and everything it can work around is
//! reported as a [`Diagnostic`] rather than an error.
//!
//! # Example
//!
//! ```
//! use api_schema_graph::{analyze_document, DocumentStore, GraphConfig, Visibility};
//! use serde_json::json;
//!
//! let store = DocumentStore::from_value(
//!     json!({
//!         "definitions": {
//!             "Animal": {
//!                 "type": "object",
//!                 "required": ["id"],
//!                 "properties": { "id": { "type": "string" } }
//!             },
//!             "Pet": {
//!                 "allOf": [
//!                     { "$ref": "#/definitions/Animal" },
//!                     { "type": "object", "properties": { "name": { "type": "string" } } }
//!                 ]
//!             }
//!         }
//!     }),
//!     "petstore.json",
//! );
//!
//! let analysis = analyze_document(store, GraphConfig::default(), &["Pet"]).unwrap();
//! let pet = analysis.graph.node("Pet").unwrap();
//!
//! assert_eq!(pet.inheritance(), ["Animal"]);
//! let id = pet.property("id").unwrap();
//! assert_eq!(id.visibility, Visibility::InheritedVisible);
//! assert_eq!(id.cardinality, "1");
//! assert_eq!(pet.property("name").unwrap().cardinality, "0..1");
//! ```
//!
//! # Configuration
//!
//! | Option | Default | Effect |
//! |--------|---------|--------|
//! | `include_inherited` | `true` | Supertype properties appear on the node |
//! | `expand_all_properties_from_allofs` | `true` | `$ref` branches of `allOf` are followed |
//! | `flatten_inheritance` | `false` | Own property map includes the flattened ancestry |
//! | `exclude_resources_from_discriminators` | `false` | Discriminator subtypes are not added |
//! | `compress_custom_types` | `true` | Simple type signatures inline their targets |
//! | `prefix_to_remove` | `""` | Regex stripped from type names |

mod config;
mod context;
mod diagnostics;
mod document;
mod error;
mod flatten;
mod graph;
mod loader;
mod node;
mod resolver;
mod schema;
mod typing;

use std::collections::BTreeMap;

use tracing::{debug, info};

pub use config::{CardinalityLabels, GraphConfig, PrefixRule};
pub use context::ResolutionContext;
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use document::{DocumentStore, InsertOutcome, OpenApiVersion};
pub use error::{AnalyzeError, ConfigError, LoadError};
pub use graph::{Edge, EdgeKind, GraphSummary, NodeSummary, TypeGraph};
pub use loader::{
    is_url, last_segment, load_document, load_document_file, load_document_str,
    navigate_fragment, DefaultFetcher, Fetch,
};
pub use node::{build_node, inline_type, Node, Property, Visibility};
pub use resolver::ResolvedReference;
pub use schema::{Discriminator, PropertyMap, SchemaKind, SchemaNode};
pub use typing::{range, UNKNOWN_TYPE};

#[cfg(feature = "remote")]
pub use loader::load_document_url;

/// Result of [`analyze`].
#[derive(Debug)]
pub struct Analysis {
    /// Roots the graph was built from, prefix-stripped.
    pub roots: Vec<String>,
    pub graph: TypeGraph,
    /// Referenced types without a node of their own, with their signature.
    pub simple_types: BTreeMap<String, String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Analysis {
    pub fn summary(&self) -> GraphSummary {
        self.graph
            .summary(self.simple_types.clone(), self.diagnostics.clone())
    }
}

/// Load `source` (file path or URL) and build its type graph.
///
/// With no `roots`, the graph starts from the document's core resources, or
/// from every definition when the document declares no paths.
///
/// # Errors
///
/// Fails only when the top-level document cannot be loaded or the
/// configuration is invalid. Problems inside the document end up in
/// [`Analysis::diagnostics`].
pub fn analyze(
    source: &str,
    config: GraphConfig,
    roots: &[String],
) -> Result<Analysis, AnalyzeError> {
    let store = DocumentStore::load(source)?;
    analyze_document(store, config, roots)
}

/// [`analyze`] for a document that is already loaded.
pub fn analyze_document<S: AsRef<str>>(
    store: DocumentStore,
    config: GraphConfig,
    roots: &[S],
) -> Result<Analysis, AnalyzeError> {
    let mut ctx = ResolutionContext::new(store, config)?;
    Ok(analyze_context(&mut ctx, roots))
}

/// Build the graph for an existing context, draining its diagnostics.
pub fn analyze_context<S: AsRef<str>>(ctx: &mut ResolutionContext, roots: &[S]) -> Analysis {
    let roots: Vec<String> = if roots.is_empty() {
        default_roots(ctx.store())
    } else {
        roots.iter().map(|root| root.as_ref().to_string()).collect()
    };
    let roots: Vec<String> = roots.iter().map(|root| ctx.strip_prefix(root)).collect();
    debug!(?roots, "graph roots");

    let graph = TypeGraph::build(ctx, &roots);
    let simple_types = graph.simple_types(ctx);
    let diagnostics = ctx.take_diagnostics();
    info!(
        locator = ctx.store().locator(),
        nodes = graph.len(),
        diagnostics = diagnostics.len(),
        "analysis complete"
    );

    Analysis {
        roots,
        graph,
        simple_types,
        diagnostics,
    }
}

fn default_roots(store: &DocumentStore) -> Vec<String> {
    let core = store.core_resources();
    if core.is_empty() {
        store.definition_names()
    } else {
        core
    }
}
