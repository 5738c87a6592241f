//! Resource nodes.
//!
//! A [`Node`] is the resolved view of one resource: its properties with
//! type, cardinality and visibility, the enums it uses, its direct
//! supertypes and its discriminator mapping. Resources that merely wrap
//! another type (a `$ref`, an array of scalars, a constrained string) get an
//! inline signature instead of properties.

use std::cell::OnceCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, trace};

use crate::context::ResolutionContext;
use crate::diagnostics::DiagnosticKind;
use crate::loader::last_segment;
use crate::schema::{SchemaKind, SchemaNode};

/// Where a property comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Declared by the resource itself.
    Own,
    /// Pulled in from an `allOf` supertype or inline branch.
    InheritedVisible,
    /// From an inline `allOf` branch while inherited properties are not
    /// included.
    InheritedHidden,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub cardinality: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub visibility: Visibility,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
}

static NO_NAMES: BTreeSet<String> = BTreeSet::new();

#[derive(Debug, Clone, Default)]
pub struct Node {
    name: String,
    description: Option<String>,
    properties: Vec<Property>,
    enums: Vec<String>,
    inheritance: Vec<String>,
    discriminator_mapping: Vec<String>,
    external_discriminator_mapping: Vec<String>,
    inline: String,
    inherited_discriminator_mapping: OnceCell<BTreeSet<String>>,
    circle_membership: OnceCell<BTreeSet<String>>,
}

impl Node {
    fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Own properties first, then those of each `allOf` branch in
    /// declaration order.
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Enum types referenced by properties, in first-use order.
    pub fn enums(&self) -> &[String] {
        &self.enums
    }

    /// Direct `allOf` supertypes.
    pub fn inheritance(&self) -> &[String] {
        &self.inheritance
    }

    pub fn discriminator_mapping(&self) -> &[String] {
        &self.discriminator_mapping
    }

    /// Discriminator mapping keys other than the node's own name.
    pub fn external_discriminator_mapping(&self) -> &[String] {
        &self.external_discriminator_mapping
    }

    /// Inline signature of a transparent alias; empty for real resources.
    pub fn inline(&self) -> &str {
        &self.inline
    }

    pub fn is_inline(&self) -> bool {
        !self.inline.is_empty()
    }

    /// Mapping keys of all supertypes. Empty until the graph is built.
    pub fn inherited_discriminator_mapping(&self) -> &BTreeSet<String> {
        self.inherited_discriminator_mapping.get().unwrap_or(&NO_NAMES)
    }

    /// Names of every node on a cycle through this one, itself included.
    /// Empty when the node is on no cycle or the graph is not built.
    pub fn circle_membership(&self) -> &BTreeSet<String> {
        self.circle_membership.get().unwrap_or(&NO_NAMES)
    }

    pub fn is_in_cycle(&self) -> bool {
        !self.circle_membership().is_empty()
    }

    /// Returns `false` if the mapping was already set.
    pub(crate) fn set_inherited_discriminator_mapping(&self, mapping: BTreeSet<String>) -> bool {
        self.inherited_discriminator_mapping.set(mapping).is_ok()
    }

    /// Returns `false` if the membership was already set.
    pub(crate) fn set_circle_membership(&self, members: BTreeSet<String>) -> bool {
        self.circle_membership.set(members).is_ok()
    }
}

/// Build the node for the resource called `name`.
///
/// An unknown name gives an empty node and a `MalformedReference`
/// diagnostic.
pub fn build_node(ctx: &mut ResolutionContext, name: &str) -> Node {
    let Some(definition) = ctx.definition(name) else {
        ctx.diagnostics.push(
            DiagnosticKind::MalformedReference,
            name,
            "no definition for this resource",
        );
        return Node::empty(name);
    };

    let inline = inline_type(ctx, &definition);
    if !inline.is_empty() {
        trace!(name, inline = %inline, "inline alias");
        return Node {
            name: name.to_string(),
            description: definition.description.clone(),
            inline,
            ..Node::default()
        };
    }

    let mut builder = NodeBuilder {
        ctx,
        name,
        seen: HashMap::new(),
        node: Node::empty(name),
    };
    builder.node.description = definition.description.clone();
    builder.add_own_properties(&definition);
    let mut visited = HashSet::from([name.to_string()]);
    builder.add_all_of(&definition.all_of, &definition, true, &mut visited);
    builder.add_discriminator(&definition);

    let node = builder.node;
    debug!(
        name,
        properties = node.properties.len(),
        inheritance = ?node.inheritance,
        "built node"
    );
    node
}

struct NodeBuilder<'a> {
    ctx: &'a mut ResolutionContext,
    name: &'a str,
    /// Schema each property name was first built from.
    seen: HashMap<String, SchemaNode>,
    node: Node,
}

impl NodeBuilder<'_> {
    fn add_own_properties(&mut self, definition: &SchemaNode) {
        let own = self.ctx.property_map(self.name);
        for (name, schema) in own.iter() {
            self.add_property(name, schema, definition.is_required(name), Visibility::Own);
        }
    }

    fn add_all_of(
        &mut self,
        branches: &[SchemaNode],
        resource: &SchemaNode,
        top_level: bool,
        visited: &mut HashSet<String>,
    ) {
        let include_inherited = self.ctx.config.include_inherited;
        let expand = self.ctx.config.expand_all_properties_from_allofs;
        // The flattened ancestry is already part of the own property map
        let flattened = self.ctx.config.flatten_inheritance;
        let inline_visibility = if include_inherited {
            Visibility::InheritedVisible
        } else {
            Visibility::InheritedHidden
        };

        for branch in branches {
            if let Some(reference) = &branch.reference {
                if !expand {
                    continue;
                }
                let parent = self.ctx.strip_prefix(last_segment(reference));
                if top_level && !self.node.inheritance.contains(&parent) {
                    self.node.inheritance.push(parent.clone());
                }
                if !include_inherited || flattened || !visited.insert(parent.clone()) {
                    continue;
                }
                let Some(supertype) = self.ctx.definition(&parent) else {
                    continue;
                };
                if let Some(properties) = &supertype.properties {
                    for (name, schema) in properties.iter() {
                        let required = resource.is_required(name) || supertype.is_required(name);
                        self.add_property(name, schema, required, Visibility::InheritedVisible);
                    }
                }
                self.add_all_of(&supertype.all_of, resource, false, visited);
            } else {
                if let Some(properties) = branch.properties.as_ref().filter(|_| !flattened) {
                    for (name, schema) in properties.iter() {
                        let required = resource.is_required(name) || branch.is_required(name);
                        self.add_property(name, schema, required, inline_visibility);
                    }
                }
                self.add_all_of(&branch.all_of, resource, top_level, visited);
            }
        }
    }

    fn add_property(
        &mut self,
        name: &str,
        schema: &SchemaNode,
        required: bool,
        visibility: Visibility,
    ) {
        if let Some(first) = self.seen.get(name) {
            let message = if first == schema {
                format!("property '{}' is declared again with the same schema; dropped", name)
            } else {
                format!("property '{}' is defined more than once; keeping the first", name)
            };
            self.ctx.diagnostics.push_once(
                DiagnosticKind::DuplicateProperty,
                format!("{}.{}", self.name, name),
                self.name,
                message,
            );
            return;
        }
        self.seen.insert(name.to_string(), schema.clone());

        let type_name = self.ctx.type_of(schema, Some(name));
        let is_enum_type = self.ctx.is_enum_type(&type_name);
        let enum_values = if schema.is_enum() {
            schema.enum_strings()
        } else if is_enum_type {
            self.ctx
                .definition(&type_name)
                .map(|d| d.enum_strings())
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        if is_enum_type && !self.node.enums.contains(&type_name) {
            self.node.enums.push(type_name.clone());
        }

        self.node.properties.push(Property {
            name: name.to_string(),
            cardinality: self.ctx.cardinality_of(schema, required, None, None),
            required,
            description: schema.description.clone(),
            visibility,
            nullable: self.ctx.is_nullable(schema),
            enum_values,
            type_name,
        });
    }

    fn add_discriminator(&mut self, definition: &SchemaNode) {
        let Some(discriminator) = &definition.discriminator else {
            return;
        };
        for (key, _) in &discriminator.mapping {
            if !self.node.discriminator_mapping.contains(key) {
                self.node.discriminator_mapping.push(key.clone());
            }
        }
        self.node.external_discriminator_mapping = self
            .node
            .discriminator_mapping
            .iter()
            .filter(|key| key.as_str() != self.name)
            .cloned()
            .collect();
    }
}

/// Inline signature of a schema, or empty if it describes a resource of its
/// own.
///
/// References are followed to their target. For `allOf` the first branch
/// with a signature wins. Arrays append their own `[min..max]` to the item
/// signature; scalars render as `"type [cardinality]"`.
pub fn inline_type(ctx: &mut ResolutionContext, schema: &SchemaNode) -> String {
    let mut visited = HashSet::new();
    classify_inline(ctx, schema, &mut visited)
}

fn classify_inline(
    ctx: &mut ResolutionContext,
    schema: &SchemaNode,
    visited: &mut HashSet<String>,
) -> String {
    match schema.kind() {
        SchemaKind::Compound | SchemaKind::Empty => String::new(),
        SchemaKind::Reference(reference) => {
            if !visited.insert(reference.to_string()) {
                return String::new();
            }
            let target: Rc<SchemaNode> = ctx.resolve(reference);
            classify_inline(ctx, &target, visited)
        }
        SchemaKind::AllOf(branches) => {
            for branch in branches {
                let inline = classify_inline(ctx, branch, visited);
                if !inline.is_empty() {
                    return inline;
                }
            }
            String::new()
        }
        SchemaKind::Array(items) => {
            let inline = classify_inline(ctx, items, visited);
            if inline.is_empty() {
                return inline;
            }
            format!("{} [{}]", inline, ctx.cardinality_of(schema, false, None, None))
        }
        SchemaKind::Scalar => {
            let raw = schema
                .schema_type
                .as_deref()
                .or(schema.format.as_deref())
                .unwrap_or_default();
            format!("{} [{}]", raw, ctx.cardinality_of(schema, false, None, None))
        }
    }
}
