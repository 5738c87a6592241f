//! The type graph: every resource reachable from a set of roots, connected by
//! reference and inheritance edges.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::Path;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use tracing::{debug, trace};

use crate::context::ResolutionContext;
use crate::diagnostics::Diagnostic;
use crate::loader::{is_external, is_url, last_segment};
use crate::node::{build_node, Node, Property};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// `from` lists `to` as an `allOf` supertype.
    Inheritance,
    /// A property of `from` has type `to`.
    Reference,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

/// Nodes keyed by name, edges held by index.
#[derive(Debug, Default)]
pub struct TypeGraph {
    graph: DiGraph<Node, EdgeKind>,
    index: BTreeMap<String, NodeIndex>,
}

impl TypeGraph {
    /// Build the closure of `roots`.
    ///
    /// Starting from the roots, follows property types that are neither
    /// simple nor enums, the item type of named arrays, `allOf` supertypes
    /// and, unless `exclude_resources_from_discriminators` is set,
    /// discriminator-mapped subtypes. Cycle membership and inherited discriminator mappings are
    /// filled in once all nodes exist.
    pub fn build<S: AsRef<str>>(ctx: &mut ResolutionContext, roots: &[S]) -> Self {
        let mut graph = TypeGraph::default();
        let mut queue: VecDeque<String> = roots
            .iter()
            .map(|root| ctx.strip_prefix(root.as_ref()))
            .collect();
        let mut pending = Vec::new();

        while let Some(name) = queue.pop_front() {
            if graph.index.contains_key(&name) {
                continue;
            }
            let node = build_node(ctx, &name);

            for property in node.properties() {
                let target = &property.type_name;
                if ctx.is_enum_type(target) || ctx.is_simple_type(target) {
                    continue;
                }
                pending.push((name.clone(), target.clone(), EdgeKind::Reference));
                queue.push_back(target.clone());
            }
            if let Some(item) = array_item_target(ctx, &name) {
                if !ctx.is_enum_type(&item) && !ctx.is_simple_type(&item) {
                    pending.push((name.clone(), item.clone(), EdgeKind::Reference));
                    queue.push_back(item);
                }
            }
            for parent in node.inheritance() {
                pending.push((name.clone(), parent.clone(), EdgeKind::Inheritance));
                queue.push_back(parent.clone());
            }
            if !ctx.config.exclude_resources_from_discriminators {
                for subtype in discriminator_targets(ctx, &name) {
                    if subtype != name {
                        trace!(from = %name, subtype = %subtype, "discriminator subtype");
                        queue.push_back(subtype);
                    }
                }
            }

            let index = graph.graph.add_node(node);
            graph.index.insert(name, index);
        }

        for (from, to, kind) in pending {
            graph.add_edge(&from, &to, kind);
        }
        graph.mark_cycles();
        graph.propagate_discriminator_mappings();

        debug!(
            nodes = graph.graph.node_count(),
            edges = graph.graph.edge_count(),
            "type graph built"
        );
        graph
    }

    fn add_edge(&mut self, from: &str, to: &str, kind: EdgeKind) {
        let (Some(&a), Some(&b)) = (self.index.get(from), self.index.get(to)) else {
            return;
        };
        if self
            .graph
            .edges_connecting(a, b)
            .any(|edge| *edge.weight() == kind)
        {
            return;
        }
        self.graph.add_edge(a, b, kind);
    }

    /// Every node of a strongly connected component with more than one
    /// member, or with a self-loop, gets the component's names as its
    /// circle membership. All other nodes get an empty set.
    fn mark_cycles(&self) {
        for component in tarjan_scc(&self.graph) {
            let cyclic = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&index| self.graph.contains_edge(index, index));
            let members: BTreeSet<String> = if cyclic {
                component
                    .iter()
                    .map(|&index| self.graph[index].name().to_string())
                    .collect()
            } else {
                BTreeSet::new()
            };
            if cyclic {
                debug!(?members, "cycle");
            }
            for &index in &component {
                self.graph[index].set_circle_membership(members.clone());
            }
        }
    }

    fn propagate_discriminator_mappings(&self) {
        for index in self.graph.node_indices() {
            let mut mapping = BTreeSet::new();
            let mut visited = HashSet::new();
            let mut stack = vec![index];
            while let Some(current) = stack.pop() {
                let parents = self
                    .graph
                    .edges_directed(current, Direction::Outgoing)
                    .filter(|edge| *edge.weight() == EdgeKind::Inheritance)
                    .map(|edge| edge.target());
                for parent in parents {
                    if parent != index && visited.insert(parent) {
                        mapping.extend(self.graph[parent].discriminator_mapping().iter().cloned());
                        stack.push(parent);
                    }
                }
            }
            self.graph[index].set_inherited_discriminator_mapping(mapping);
        }
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.index.get(name).map(|&index| &self.graph[index])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Nodes in name order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.index.values().map(|&index| &self.graph[index])
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// All edges, sorted.
    pub fn edges(&self) -> Vec<Edge> {
        let mut edges: Vec<Edge> = self
            .graph
            .edge_references()
            .map(|edge| Edge {
                from: self.graph[edge.source()].name().to_string(),
                to: self.graph[edge.target()].name().to_string(),
                kind: *edge.weight(),
            })
            .collect();
        edges.sort();
        edges
    }

    /// Targets of `name`'s outgoing edges of the given kind.
    pub fn targets(&self, name: &str, kind: EdgeKind) -> Vec<&str> {
        let Some(&index) = self.index.get(name) else {
            return Vec::new();
        };
        let mut targets: Vec<&str> = self
            .graph
            .edges_directed(index, Direction::Outgoing)
            .filter(|edge| *edge.weight() == kind)
            .map(|edge| self.graph[edge.target()].name())
            .collect();
        targets.sort_unstable();
        targets
    }

    /// Property types of the graph's nodes that have a definition but no
    /// node, with their compact signature.
    pub fn simple_types(&self, ctx: &mut ResolutionContext) -> BTreeMap<String, String> {
        let mut simple = BTreeMap::new();
        for node in self.nodes() {
            for property in node.properties() {
                let name = &property.type_name;
                if self.contains(name) || simple.contains_key(name) {
                    continue;
                }
                if !ctx.has_definition(name) || ctx.is_enum_type(name) {
                    continue;
                }
                let signature = ctx.type_signature(name);
                simple.insert(name.clone(), signature);
            }
        }
        simple
    }

    pub fn summary(
        &self,
        simple_types: BTreeMap<String, String>,
        diagnostics: Vec<Diagnostic>,
    ) -> GraphSummary {
        GraphSummary {
            nodes: self.nodes().map(NodeSummary::from).collect(),
            edges: self.edges(),
            simple_types,
            diagnostics,
        }
    }
}

/// Item type of a resource that is a named array of another type.
fn array_item_target(ctx: &mut ResolutionContext, name: &str) -> Option<String> {
    let definition = ctx.definition(name)?;
    if !definition.is_array() {
        return None;
    }
    let reference = definition.items.as_ref()?.reference.as_deref()?;
    Some(ctx.strip_prefix(last_segment(reference)))
}

/// A mapping value is either a pointer (`#/...`, `other.json#/...`, a URL or
/// a file path) or a plain schema name.
fn is_mapping_pointer(value: &str) -> bool {
    if value.contains('#') || value.contains('/') || is_url(value) {
        return true;
    }
    Path::new(value)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext, "json" | "yaml" | "yml"))
}

/// Names of the types a resource's discriminator maps to. External mapping
/// targets are imported on the way.
fn discriminator_targets(ctx: &mut ResolutionContext, name: &str) -> Vec<String> {
    let Some(definition) = ctx.definition(name) else {
        return Vec::new();
    };
    let Some(discriminator) = &definition.discriminator else {
        return Vec::new();
    };

    let mut targets = Vec::new();
    for (_, pointer) in &discriminator.mapping {
        let local = if is_mapping_pointer(pointer) && is_external(pointer) {
            ctx.resolve_reference(pointer).pointer
        } else {
            pointer.clone()
        };
        let target = ctx.strip_prefix(last_segment(&local));
        if !targets.contains(&target) {
            targets.push(target);
        }
    }
    targets
}

/// Serializable form of a built graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSummary {
    pub nodes: Vec<NodeSummary>,
    pub edges: Vec<Edge>,
    pub simple_types: BTreeMap<String, String>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub inline: String,
    pub properties: Vec<Property>,
    pub enums: Vec<String>,
    pub inheritance: Vec<String>,
    pub discriminator_mapping: Vec<String>,
    pub external_discriminator_mapping: Vec<String>,
    pub inherited_discriminator_mapping: Vec<String>,
    pub circle_membership: Vec<String>,
}

impl From<&Node> for NodeSummary {
    fn from(node: &Node) -> Self {
        Self {
            name: node.name().to_string(),
            description: node.description().map(String::from),
            inline: node.inline().to_string(),
            properties: node.properties().to_vec(),
            enums: node.enums().to_vec(),
            inheritance: node.inheritance().to_vec(),
            discriminator_mapping: node.discriminator_mapping().to_vec(),
            external_discriminator_mapping: node.external_discriminator_mapping().to_vec(),
            inherited_discriminator_mapping: node
                .inherited_discriminator_mapping()
                .iter()
                .cloned()
                .collect(),
            circle_membership: node.circle_membership().iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentStore;
    use crate::GraphConfig;
    use serde_json::{json, Value};

    fn graph(definitions: Value, config: GraphConfig, roots: &[&str]) -> TypeGraph {
        let store = DocumentStore::from_value(json!({ "definitions": definitions }), "api.json");
        let mut ctx = ResolutionContext::new(store, config).unwrap();
        TypeGraph::build(&mut ctx, roots)
    }

    #[test]
    fn follows_complex_properties_only() {
        let g = graph(
            json!({
                "Order": {"properties": {
                    "id": {"type": "string"},
                    "customer": {"$ref": "#/definitions/Customer"},
                    "total": {"$ref": "#/definitions/Money"},
                    "state": {"$ref": "#/definitions/State"}
                }},
                "Customer": {"type": "object", "properties": {"name": {"type": "string"}}},
                "Money": {"type": "number"},
                "State": {"type": "string", "enum": ["open"]}
            }),
            GraphConfig::default(),
            &["Order"],
        );

        assert_eq!(g.node_names().collect::<Vec<_>>(), ["Customer", "Order"]);
        assert_eq!(
            g.edges(),
            [Edge {
                from: "Order".into(),
                to: "Customer".into(),
                kind: EdgeKind::Reference
            }]
        );
    }

    #[test]
    fn edges_are_deduplicated() {
        let g = graph(
            json!({
                "A": {"properties": {
                    "first": {"$ref": "#/definitions/B"},
                    "second": {"type": "array", "items": {"$ref": "#/definitions/B"}}
                }},
                "B": {"type": "object", "properties": {"x": {"type": "string"}}}
            }),
            GraphConfig::default(),
            &["A"],
        );
        assert_eq!(g.edges().len(), 1);
    }

    #[test]
    fn mutual_reference_cycle() {
        let g = graph(
            json!({
                "A": {"properties": {"b": {"$ref": "#/definitions/B"}, "c": {"$ref": "#/definitions/C"}}},
                "B": {"properties": {"a": {"$ref": "#/definitions/A"}, "x": {"type": "string"}}},
                "C": {"properties": {"x": {"type": "string"}, "y": {"type": "string"}}}
            }),
            GraphConfig::default(),
            &["A"],
        );

        let expected: BTreeSet<String> = ["A", "B"].iter().map(|s| s.to_string()).collect();
        assert_eq!(g.node("A").unwrap().circle_membership(), &expected);
        assert_eq!(g.node("B").unwrap().circle_membership(), &expected);
        assert!(g.node("C").unwrap().circle_membership().is_empty());
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let g = graph(
            json!({
                "Category": {"type": "object", "properties": {
                    "parent": {"$ref": "#/definitions/Category"},
                    "name": {"type": "string"}
                }}
            }),
            GraphConfig::default(),
            &["Category"],
        );
        let category = g.node("Category").unwrap();
        assert!(category.is_in_cycle());
        assert_eq!(category.circle_membership().len(), 1);
    }

    #[test]
    fn discriminator_subtypes_and_inherited_mapping() {
        let definitions = json!({
            "Resource": {
                "type": "object",
                "properties": {"id": {"type": "string"}},
                "discriminator": {"propertyName": "@type", "mapping": {
                    "Resource": "#/definitions/Resource",
                    "Logical": "#/definitions/Logical"
                }}
            },
            "Logical": {
                "allOf": [
                    {"$ref": "#/definitions/Resource"},
                    {"type": "object", "properties": {"value": {"type": "string"}}}
                ]
            }
        });

        let g = graph(definitions.clone(), GraphConfig::default(), &["Resource"]);
        assert!(g.contains("Logical"));
        assert_eq!(g.targets("Logical", EdgeKind::Inheritance), ["Resource"]);
        let logical = g.node("Logical").unwrap();
        let inherited: Vec<&str> = logical
            .inherited_discriminator_mapping()
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(inherited, ["Logical", "Resource"]);
        // Inheritance plus a discriminator back-reference is not a reference cycle
        assert!(!logical.is_in_cycle());

        let excluded = graph(
            definitions,
            GraphConfig::default().exclude_resources_from_discriminators(true),
            &["Resource"],
        );
        assert!(!excluded.contains("Logical"));
    }

    #[test]
    fn summary_serializes() {
        let store = DocumentStore::from_value(
            json!({"definitions": {
                "Pet": {"type": "object", "properties": {
                    "id": {"type": "string"},
                    "tags": {"$ref": "#/definitions/Tags"},
                    "owner": {"$ref": "#/definitions/Owner"},
                    "code": {"$ref": "#/definitions/Code"}
                }},
                "Code": {"type": "string", "maxLength": 8},
                "Tags":{"type": "array", "items": {"type": "string"}, "maxItems": 5},
                "Owner": {"$ref": "#/definitions/Person"},
                "Person": {"type": "object", "properties": {"name": {"type": "string"}}}
            }}),
            "api.json",
        );
        let mut ctx = ResolutionContext::new(store, GraphConfig::default()).unwrap();
        let g = TypeGraph::build(&mut ctx, &["Pet"]);
        let simple = g.simple_types(&mut ctx);
        let value = serde_json::to_value(g.summary(simple, ctx.take_diagnostics())).unwrap();

        assert_eq!(value["nodes"][0]["name"], "Owner");
        assert_eq!(value["nodes"][1]["name"], "Pet");
        assert_eq!(value["nodes"][1]["properties"][0]["type"], "string");
        assert_eq!(value["nodes"][1]["properties"][0]["visibility"], "own");
        assert_eq!(value["edges"][0]["kind"], "reference");
        assert_eq!(value["diagnostics"], json!([]));
        assert_eq!(value["simple_types"], json!({"Code": "string"}));
        assert_eq!(value["nodes"][2]["name"], "Tags");
        assert_eq!(value["nodes"][2]["inline"], "string [0..1] [0..5]");
    }

    #[test]
    fn named_array_leads_to_its_item_type() {
        let g = graph(
            json!({
                "Order": {"type": "object", "properties": {"pets": {"$ref": "#/definitions/Pets"}}},
                "Pets": {"type": "array", "items": {"$ref": "#/definitions/Pet"}},
                "Pet": {"type": "object", "properties": {"name": {"type": "string"}}},
                "Names": {"type": "array", "items": {"$ref": "#/definitions/Name"}},
                "Name": {"type": "string"}
            }),
            GraphConfig::default(),
            &["Order", "Names"],
        );

        assert_eq!(
            g.node_names().collect::<Vec<_>>(),
            ["Names", "Order", "Pet", "Pets"]
        );
        assert_eq!(g.targets("Pets", EdgeKind::Reference), ["Pet"]);
        assert!(g.targets("Names", EdgeKind::Reference).is_empty());
    }

    #[test]
    fn bare_mapping_names_are_schema_names() {
        let store = DocumentStore::from_value(
            json!({
                "openapi": "3.0.1",
                "components": {"schemas": {
                    "Animal": {
                        "type": "object",
                        "properties": {"kind": {"type": "string"}},
                        "discriminator": {"propertyName": "kind", "mapping": {
                            "Cat": "Cat",
                            "Dog": "#/components/schemas/Dog"
                        }}
                    },
                    "Cat": {"allOf": [
                        {"$ref": "#/components/schemas/Animal"},
                        {"type": "object", "properties": {"lives": {"type": "integer"}}}
                    ]},
                    "Dog": {"allOf": [
                        {"$ref": "#/components/schemas/Animal"},
                        {"type": "object", "properties": {"bark": {"type": "string"}}}
                    ]}
                }}
            }),
            "/specs/api.json",
        );
        let mut ctx = ResolutionContext::new(store, GraphConfig::default()).unwrap();
        let g = TypeGraph::build(&mut ctx, &["Animal"]);

        assert_eq!(g.node_names().collect::<Vec<_>>(), ["Animal", "Cat", "Dog"]);
        assert!(ctx.diagnostics().is_empty());
    }

    #[test]
    fn single_property_wrapper_is_a_value() {
        let g = graph(
            json!({
                "Order": {"type": "object", "properties": {
                    "amount": {"$ref": "#/definitions/Amount"},
                    "customer": {"$ref": "#/definitions/Customer"}
                }},
                "Amount": {"properties": {"value": {"type": "number"}}},
                "Customer": {"properties": {"name": {"type": "string"}, "email": {"type": "string"}}}
            }),
            GraphConfig::default(),
            &["Order"],
        );
        assert_eq!(g.node_names().collect::<Vec<_>>(), ["Customer", "Order"]);
    }

    #[test]
    fn mapping_pointer_detection() {
        assert!(is_mapping_pointer("#/components/schemas/Cat"));
        assert!(is_mapping_pointer("pets.yaml#/Cat"));
        assert!(is_mapping_pointer("schemas/Cat"));
        assert!(is_mapping_pointer("Cat.json"));
        assert!(is_mapping_pointer("https://example.com/Cat"));
        assert!(!is_mapping_pointer("Cat"));
        assert!(!is_mapping_pointer("Cat.v2"));
    }
}
