//! Type names, cardinalities and compact type signatures.

use std::collections::HashSet;

use tracing::trace;

use crate::context::ResolutionContext;
use crate::diagnostics::DiagnosticKind;
use crate::loader::last_segment;
use crate::schema::{SchemaKind, SchemaNode};

/// Type name used when a schema carries no type information.
pub const UNKNOWN_TYPE: &str = "{}";

/// `"min..max"` with unbounded maximum rendered as `*`.
pub fn range(min: u64, max: Option<u64>) -> String {
    match max {
        Some(max) => format!("{}..{}", min, max),
        None => format!("{}..*", min),
    }
}

impl ResolutionContext {
    /// Canonical type name of a property schema.
    ///
    /// `name_hint` is the property name; it only decides whether a missing
    /// type is reported.
    pub fn type_of(&mut self, node: &SchemaNode, name_hint: Option<&str>) -> String {
        let raw = self.raw_type_of(node, name_hint);
        self.prefix.strip(&raw)
    }

    fn raw_type_of(&mut self, node: &SchemaNode, name_hint: Option<&str>) -> String {
        if let Some(format) = &node.format {
            if let Some(mapped) = self.config.format_to_type.get(format) {
                return mapped.clone();
            }
            let fallback = format!("{}/{}", node.schema_type.as_deref().unwrap_or(""), format);
            self.diagnostics.push_once(
                DiagnosticKind::UnmappedFormat,
                format.as_str(),
                name_hint.unwrap_or(format),
                format!("format '{}' has no mapping, using '{}'", format, fallback),
            );
            return fallback;
        }
        if let Some(reference) = &node.reference {
            return last_segment(reference).to_string();
        }
        if let Some(items) = &node.items {
            return self.raw_type_of(items, name_hint);
        }
        if let Some(schema_type) = &node.schema_type {
            return self
                .config
                .type_mapping
                .get(schema_type)
                .unwrap_or(schema_type)
                .clone();
        }

        let special = name_hint.is_some_and(|name| {
            self.config
                .special_properties
                .iter()
                .any(|special| special == name)
        });
        if !special {
            self.diagnostics.push_once(
                DiagnosticKind::MissingType,
                node.shape_key(),
                name_hint.unwrap_or("<schema>"),
                format!("no type information, using '{}'", UNKNOWN_TYPE),
            );
        }
        UNKNOWN_TYPE.to_string()
    }

    /// Cardinality of a property schema.
    ///
    /// Arrays render as `"min..max"`. Everything else uses the configured
    /// labels: exactly-one when the minimum resolves to 1, zero-or-one
    /// otherwise.
    pub fn cardinality_of(
        &self,
        node: &SchemaNode,
        required: bool,
        min_override: Option<u64>,
        max_override: Option<u64>,
    ) -> String {
        let min = min_override
            .or(node.min_items)
            .unwrap_or(if required { 1 } else { 0 });
        let max = max_override.or(node.max_items);

        if node.is_array() {
            range(min, max)
        } else if min == 1 {
            self.config.cardinality.exactly_one.clone()
        } else {
            self.config.cardinality.zero_or_one.clone()
        }
    }

    /// Nullable only when the enum lists `null` and `nullable` is set.
    pub fn is_nullable(&self, node: &SchemaNode) -> bool {
        node.nullable
            && node
                .enum_values
                .as_ref()
                .is_some_and(|values| values.iter().any(|v| v.is_null()))
    }

    pub fn is_enum_type(&mut self, type_name: &str) -> bool {
        self.definition(type_name).is_some_and(|d| d.is_enum())
    }

    /// Whether `type_name` is rendered as a plain value rather than a node of
    /// its own.
    pub fn is_simple_type(&mut self, type_name: &str) -> bool {
        let mut visiting = HashSet::new();
        self.is_simple_named(type_name, &mut visiting)
    }

    fn is_simple_named(&mut self, type_name: &str, visiting: &mut HashSet<String>) -> bool {
        let config = &self.config;
        if config.simple_types.iter().any(|t| t == type_name)
            || config
                .simple_endings
                .iter()
                .any(|ending| type_name.ends_with(ending.as_str()))
            || type_name.contains('/')
        {
            return true;
        }
        if !visiting.insert(type_name.to_string()) {
            return true;
        }
        let Some(definition) = self.definition(type_name) else {
            return true;
        };
        if definition.is_enum() {
            return true;
        }
        self.is_simple_definition(&definition, visiting)
    }

    fn is_simple_definition(
        &mut self,
        definition: &SchemaNode,
        visiting: &mut HashSet<String>,
    ) -> bool {
        if let Some(schema_type) = &definition.schema_type {
            return schema_type != "object" && schema_type != "array";
        }
        if definition.discriminator.is_some()
            || !definition.all_of.is_empty()
            || !definition.one_of.is_empty()
            || definition.properties.as_ref().is_some_and(|p| p.len() > 1)
        {
            return false;
        }

        let target = definition.items.as_deref().unwrap_or(definition);
        match &target.reference {
            Some(reference) => {
                let name = self.prefix.strip(last_segment(reference));
                self.is_simple_named(&name, visiting)
            }
            None => true,
        }
    }

    /// Compact signature of a simple custom type, e.g. `"string [1..3]"`.
    ///
    /// Arrays carry their bounds down to the item type. With
    /// `compress_custom_types`, referenced types are replaced by their own
    /// signature; otherwise they render as `"Name [min..max]"`.
    pub fn type_signature(&mut self, type_name: &str) -> String {
        let mut visiting = HashSet::new();
        self.named_signature(type_name, None, None, &mut visiting)
    }

    fn named_signature(
        &mut self,
        type_name: &str,
        min: Option<u64>,
        max: Option<u64>,
        visiting: &mut HashSet<String>,
    ) -> String {
        if let Some(mapped) = self.config.type_mapping.get(type_name) {
            return mapped.clone();
        }
        if !visiting.insert(type_name.to_string()) {
            trace!(type_name, "signature cycle");
            return type_name.to_string();
        }
        let signature = match self.definition(type_name) {
            Some(definition) => self.node_signature(&definition, min, max, visiting),
            None => String::new(),
        };
        visiting.remove(type_name);
        signature
    }

    fn node_signature(
        &mut self,
        node: &SchemaNode,
        min: Option<u64>,
        max: Option<u64>,
        visiting: &mut HashSet<String>,
    ) -> String {
        if let (true, Some(items)) = (node.is_array(), &node.items) {
            let min = min.or(node.min_items);
            let max = max.or(node.max_items);
            return self.node_signature(items, min, max, visiting);
        }

        match node.kind() {
            SchemaKind::Reference(reference) => {
                let referenced = self.prefix.strip(last_segment(reference));
                if self.config.compress_custom_types {
                    self.named_signature(&referenced, min, max, visiting)
                } else {
                    format!("{} [{}]", referenced, range(min.unwrap_or(0), max))
                }
            }
            _ if node.schema_type.is_some() => {
                let schema_type = node.schema_type.as_deref().unwrap_or_default();
                let mut signature = self
                    .config
                    .type_mapping
                    .get(schema_type)
                    .map(String::as_str)
                    .unwrap_or(schema_type)
                    .to_string();
                if min.is_some() || max.is_some() {
                    signature.push_str(&format!(" [{}]", range(min.unwrap_or(0), max)));
                }
                signature
            }
            SchemaKind::AllOf(branches) => {
                let (min, max) = bounds_in(node);
                let mut signature = String::new();
                for branch in branches {
                    let Some(reference) = &branch.reference else {
                        continue;
                    };
                    let referenced = self.prefix.strip(last_segment(reference));
                    if self.config.compress_custom_types {
                        signature.push_str(&self.named_signature(&referenced, min, max, visiting));
                    } else if let Some(definition) = self.definition(&referenced) {
                        signature.push_str(&self.node_signature(&definition, min, max, visiting));
                    }
                }
                signature
            }
            _ => String::new(),
        }
    }
}

/// First `minItems`/`maxItems` found on the node or, failing that, in its
/// `allOf` branches.
fn bounds_in(node: &SchemaNode) -> (Option<u64>, Option<u64>) {
    fn find(node: &SchemaNode, pick: fn(&SchemaNode) -> Option<u64>) -> Option<u64> {
        pick(node).or_else(|| node.all_of.iter().find_map(|branch| find(branch, pick)))
    }
    (find(node, |n| n.min_items), find(node, |n| n.max_items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentStore;
    use crate::GraphConfig;
    use serde_json::{json, Value};

    fn context(definitions: Value, config: GraphConfig) -> ResolutionContext {
        let store = DocumentStore::from_value(json!({ "definitions": definitions }), "api.json");
        ResolutionContext::new(store, config).unwrap()
    }

    fn node(value: Value) -> SchemaNode {
        SchemaNode::from_value(&value)
    }

    #[test]
    fn type_of_covers_each_source() {
        let mut ctx = context(json!({}), GraphConfig::default().map_type("integer", "Integer"));

        assert_eq!(
            ctx.type_of(&node(json!({"type": "string", "format": "date-time"})), None),
            "DateTime"
        );
        assert_eq!(ctx.type_of(&node(json!({"$ref": "#/definitions/Tag"})), None), "Tag");
        assert_eq!(
            ctx.type_of(
                &node(json!({"type": "array", "items": {"$ref": "#/definitions/Tag"}})),
                None
            ),
            "Tag"
        );
        assert_eq!(ctx.type_of(&node(json!({"type": "integer"})), None), "Integer");
        assert_eq!(ctx.type_of(&node(json!({"type": "boolean"})), None), "boolean");
    }

    #[test]
    fn unmapped_format_reported_once() {
        let mut ctx = context(json!({}), GraphConfig::default());
        let uuid = node(json!({"type": "string", "format": "uuid"}));
        assert_eq!(ctx.type_of(&uuid, Some("id")), "string/uuid");
        assert_eq!(ctx.type_of(&uuid, Some("other")), "string/uuid");
        assert_eq!(ctx.diagnostics().count(DiagnosticKind::UnmappedFormat), 1);
    }

    #[test]
    fn missing_type_reported_once_per_shape_unless_special() {
        let config = GraphConfig {
            special_properties: vec!["@baseType".to_string()],
            ..GraphConfig::default()
        };
        let mut ctx = context(json!({}), config);

        let bare = node(json!({"description": "anything"}));
        assert_eq!(ctx.type_of(&bare, Some("a")), UNKNOWN_TYPE);
        assert_eq!(ctx.type_of(&bare, Some("b")), UNKNOWN_TYPE);
        assert_eq!(ctx.diagnostics().count(DiagnosticKind::MissingType), 1);

        let special = node(json!({"description": "base"}));
        assert_eq!(ctx.type_of(&special, Some("@baseType")), UNKNOWN_TYPE);
        assert_eq!(ctx.diagnostics().count(DiagnosticKind::MissingType), 1);
    }

    #[test]
    fn type_of_strips_prefix() {
        let mut ctx = context(json!({}), GraphConfig::default().prefix("^TMF_", ""));
        assert_eq!(ctx.type_of(&node(json!({"$ref": "#/definitions/TMF_Party"})), None), "Party");
    }

    #[test]
    fn cardinality_examples() {
        let ctx = context(json!({}), GraphConfig::default());
        let tags = node(json!({"type": "array", "items": {"type": "string"}, "minItems": 2}));
        assert_eq!(ctx.cardinality_of(&tags, false, None, None), "2..*");

        let list = node(json!({"type": "array", "items": {"type": "string"}}));
        assert_eq!(ctx.cardinality_of(&list, false, None, None), "0..*");
        assert_eq!(ctx.cardinality_of(&list, true, None, None), "1..*");
        assert_eq!(ctx.cardinality_of(&list, false, Some(1), Some(5)), "1..5");

        let id = node(json!({"type": "string"}));
        assert_eq!(ctx.cardinality_of(&id, true, None, None), "1");
        assert_eq!(ctx.cardinality_of(&id, false, None, None), "0..1");
    }

    #[test]
    fn custom_cardinality_labels() {
        let ctx = context(json!({}), GraphConfig::default().cardinality_labels("1..1", "0..1"));
        let id = node(json!({"type": "string"}));
        assert_eq!(ctx.cardinality_of(&id, true, None, None), "1..1");
    }

    #[test]
    fn nullable_needs_both_markers() {
        let ctx = context(json!({}), GraphConfig::default());
        assert!(ctx.is_nullable(&node(json!({"enum": ["a", null], "nullable": true}))));
        assert!(!ctx.is_nullable(&node(json!({"enum": ["a", null]}))));
        assert!(!ctx.is_nullable(&node(json!({"type": "string", "nullable": true}))));
    }

    #[test]
    fn simple_type_classification() {
        let mut ctx = context(
            json!({
                "Money": {"type": "number"},
                "Status": {"type": "string", "enum": ["on", "off"]},
                "Pet": {"type": "object", "properties": {"id": {}}},
                "Tags": {"type": "array", "items": {"type": "string"}},
                "Single": {"properties": {"value": {}}},
                "Pair": {"properties": {"a": {}, "b": {}}},
                "Base": {"discriminator": {"propertyName": "@type"}},
                "AliasOfMoney": {"items": {"$ref": "#/definitions/Money"}},
                "AliasOfPet": {"items": {"$ref": "#/definitions/Pet"}},
                "LoopA": {"items": {"$ref": "#/definitions/LoopB"}},
                "LoopB": {"items": {"$ref": "#/definitions/LoopA"}},
                "Quantity": {"type": "object"}
            }),
            GraphConfig {
                simple_types: vec!["Quantity".to_string()],
                simple_endings: vec!["Ref".to_string()],
                ..GraphConfig::default()
            },
        );

        for simple in [
            "string",
            "Money",
            "Status",
            "AliasOfMoney",
            "Quantity",
            "PartyRef",
            "string/uuid",
            "LoopA",
            "Single",
        ] {
            assert!(ctx.is_simple_type(simple), "{} should be simple", simple);
        }
        for complex in ["Pet", "Tags", "Pair", "Base", "AliasOfPet"] {
            assert!(!ctx.is_simple_type(complex), "{} should not be simple", complex);
        }
        assert!(ctx.is_enum_type("Status"));
        assert!(!ctx.is_enum_type("Money"));
    }

    #[test]
    fn signatures_of_simple_types() {
        let definitions = json!({
            "Codes": {"type": "array", "items": {"type": "string"}, "minItems": 1, "maxItems": 3},
            "Amount": {"type": "number"},
            "Money": {"$ref": "#/definitions/Amount"},
            "Prices": {"type": "array", "items": {"$ref": "#/definitions/Amount"}, "minItems": 2},
            "Bounded": {"allOf": [{"$ref": "#/definitions/Amount"}, {"maxItems": 4}]}
        });

        let mut ctx = context(
            definitions.clone(),
            GraphConfig::default().map_type("number", "Decimal"),
        );
        assert_eq!(ctx.type_signature("Codes"), "string [1..3]");
        assert_eq!(ctx.type_signature("Amount"), "Decimal");
        assert_eq!(ctx.type_signature("Money"), "Decimal");
        assert_eq!(ctx.type_signature("Prices"), "Decimal [2..*]");
        assert_eq!(ctx.type_signature("Bounded"), "Decimal [0..4]");
        assert_eq!(ctx.type_signature("Missing"), "");

        let mut expanded =
            context(definitions, GraphConfig::default().compress_custom_types(false));
        assert_eq!(expanded.type_signature("Prices"), "Amount [2..*]");
    }

    #[test]
    fn range_rendering() {
        assert_eq!(range(0, None), "0..*");
        assert_eq!(range(1, Some(1)), "1..1");
    }
}
