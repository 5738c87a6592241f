//! Normalized schema nodes.
//!
//! Raw documents are loosely typed: what a schema *is* depends on which keys
//! are present. [`SchemaNode::from_value`] reads the keywords the engine cares
//! about once, and [`SchemaNode::kind`] classifies the result so callers can
//! match exhaustively instead of probing for keys.

use serde_json::Value;

/// Keywords read from a schema object.
pub mod keyword {
    pub const REF: &str = "$ref";
    pub const ALL_OF: &str = "allOf";
    pub const ONE_OF: &str = "oneOf";
    pub const PROPERTIES: &str = "properties";
    pub const REQUIRED: &str = "required";
    pub const ITEMS: &str = "items";
    pub const MIN_ITEMS: &str = "minItems";
    pub const MAX_ITEMS: &str = "maxItems";
    pub const ENUM: &str = "enum";
    pub const TYPE: &str = "type";
    pub const FORMAT: &str = "format";
    pub const DISCRIMINATOR: &str = "discriminator";
    pub const MAPPING: &str = "mapping";
    pub const PROPERTY_NAME: &str = "propertyName";
    pub const DESCRIPTION: &str = "description";
    pub const NULLABLE: &str = "nullable";
    pub const TITLE: &str = "title";
}

use keyword::*;

/// Ordered property map. Insertion order is discovery order and the first
/// insertion of a name wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyMap {
    entries: Vec<(String, SchemaNode)>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the name is already present. Returns whether it was added.
    pub fn insert_if_absent(&mut self, name: impl Into<String>, schema: SchemaNode) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.entries.push((name, schema));
        true
    }

    /// Merge another map; keys already present are kept.
    pub fn merge(&mut self, other: &PropertyMap) {
        for (name, schema) in other.iter() {
            self.insert_if_absent(name, schema.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&SchemaNode> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SchemaNode)> {
        self.entries.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `discriminator` keyword.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Discriminator {
    pub property_name: Option<String>,
    /// Mapping key to pointer, in declaration order.
    pub mapping: Vec<(String, String)>,
}

/// A schema object reduced to the keywords used for resource extraction.
///
/// Several facets may be present at once, e.g. an object with a
/// discriminator, or an `allOf` next to a `$ref`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaNode {
    pub reference: Option<String>,
    pub all_of: Vec<SchemaNode>,
    pub one_of: Vec<SchemaNode>,
    pub properties: Option<PropertyMap>,
    pub required: Vec<String>,
    pub items: Option<Box<SchemaNode>>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub enum_values: Option<Vec<Value>>,
    pub schema_type: Option<String>,
    pub format: Option<String>,
    pub discriminator: Option<Discriminator>,
    pub description: Option<String>,
    pub title: Option<String>,
    pub nullable: bool,
}

/// Classification of a [`SchemaNode`], in precedence order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SchemaKind<'a> {
    /// Has `enum`, `properties` or a `discriminator`.
    Compound,
    Reference(&'a str),
    AllOf(&'a [SchemaNode]),
    Array(&'a SchemaNode),
    /// Has a `type` or `format` and nothing above.
    Scalar,
    /// Nothing the engine recognizes.
    Empty,
}

impl SchemaNode {
    /// Normalize a raw schema value. Non-object values give an empty node.
    pub fn from_value(value: &Value) -> SchemaNode {
        let Some(obj) = value.as_object() else {
            return SchemaNode::default();
        };

        let str_field = |key: &str| obj.get(key).and_then(Value::as_str).map(String::from);
        let schema_list = |key: &str| -> Vec<SchemaNode> {
            obj.get(key)
                .and_then(Value::as_array)
                .map(|arr| arr.iter().map(SchemaNode::from_value).collect())
                .unwrap_or_default()
        };

        let properties = obj.get(PROPERTIES).and_then(Value::as_object).map(|props| {
            let mut map = PropertyMap::new();
            for (name, prop) in props {
                map.insert_if_absent(name.clone(), SchemaNode::from_value(prop));
            }
            map
        });

        // Tuple-style `items` arrays contribute their first object schema
        let items = match obj.get(ITEMS) {
            Some(Value::Array(arr)) => arr
                .iter()
                .find(|v| v.is_object())
                .map(|v| Box::new(SchemaNode::from_value(v))),
            Some(v @ Value::Object(_)) => Some(Box::new(SchemaNode::from_value(v))),
            _ => None,
        };

        let schema_type = match obj.get(TYPE) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Array(types)) => types
                .iter()
                .filter_map(Value::as_str)
                .find(|t| *t != "null")
                .map(String::from),
            _ => None,
        };

        let discriminator = obj.get(DISCRIMINATOR).and_then(Value::as_object).map(|d| {
            let mapping: Vec<(String, String)> = d
                .get(MAPPING)
                .and_then(Value::as_object)
                .map(|m| {
                    m.iter()
                        .filter_map(|(k, v)| v.as_str().map(|p| (k.clone(), p.to_string())))
                        .collect()
                })
                .unwrap_or_default();
            Discriminator {
                property_name: d.get(PROPERTY_NAME).and_then(Value::as_str).map(String::from),
                mapping,
            }
        });

        SchemaNode {
            reference: str_field(REF),
            all_of: schema_list(ALL_OF),
            one_of: schema_list(ONE_OF),
            properties,
            required: obj
                .get(REQUIRED)
                .and_then(Value::as_array)
                .map(|arr| arr.iter().filter_map(Value::as_str).map(String::from).collect())
                .unwrap_or_default(),
            items,
            min_items: obj.get(MIN_ITEMS).and_then(Value::as_u64),
            max_items: obj.get(MAX_ITEMS).and_then(Value::as_u64),
            enum_values: obj.get(ENUM).and_then(Value::as_array).cloned(),
            schema_type,
            format: str_field(FORMAT),
            discriminator,
            description: str_field(DESCRIPTION),
            title: str_field(TITLE),
            nullable: obj.get(NULLABLE).and_then(Value::as_bool).unwrap_or(false),
        }
    }

    pub fn kind(&self) -> SchemaKind<'_> {
        if self.enum_values.is_some() || self.properties.is_some() || self.discriminator.is_some()
        {
            SchemaKind::Compound
        } else if let Some(reference) = &self.reference {
            SchemaKind::Reference(reference)
        } else if !self.all_of.is_empty() {
            SchemaKind::AllOf(&self.all_of)
        } else if let Some(items) = &self.items {
            SchemaKind::Array(items)
        } else if self.schema_type.is_some() || self.format.is_some() {
            SchemaKind::Scalar
        } else {
            SchemaKind::Empty
        }
    }

    /// True when `type` is `array`.
    pub fn is_array(&self) -> bool {
        self.schema_type.as_deref() == Some("array")
    }

    pub fn is_enum(&self) -> bool {
        self.enum_values.is_some()
    }

    /// True when the node carries no recognized keyword at all.
    pub fn is_empty(&self) -> bool {
        *self == SchemaNode::default()
    }

    /// Own `properties`, or an empty map.
    pub fn own_properties(&self) -> PropertyMap {
        self.properties.clone().unwrap_or_default()
    }

    pub fn is_required(&self, property: &str) -> bool {
        self.required.iter().any(|r| r == property)
    }

    /// Stable textual key identifying the shape, used to report a problem
    /// once per distinct shape.
    pub fn shape_key(&self) -> String {
        format!("{:?}", self)
    }

    /// Enum members rendered as strings, `null` members skipped.
    pub fn enum_strings(&self) -> Vec<String> {
        self.enum_values
            .iter()
            .flatten()
            .filter(|v| !v.is_null())
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_value_reads_object_facets() {
        let node = SchemaNode::from_value(&json!({
            "type": "object",
            "description": "A pet",
            "required": ["id"],
            "properties": {
                "id": {"type": "string"},
                "tags": {"type": "array", "items": {"$ref": "#/definitions/Tag"}, "minItems": 2}
            },
            "discriminator": {
                "propertyName": "@type",
                "mapping": {"Cat": "#/definitions/Cat", "Dog": "#/definitions/Dog"}
            }
        }));

        assert_eq!(node.kind(), SchemaKind::Compound);
        assert!(node.is_required("id"));
        let props = node.properties.as_ref().unwrap();
        assert_eq!(props.names().collect::<Vec<_>>(), ["id", "tags"]);
        let tags = props.get("tags").unwrap();
        assert!(tags.is_array());
        assert_eq!(tags.min_items, Some(2));
        assert_eq!(
            tags.items.as_ref().unwrap().reference.as_deref(),
            Some("#/definitions/Tag")
        );
        let disc = node.discriminator.unwrap();
        assert_eq!(disc.property_name.as_deref(), Some("@type"));
        assert_eq!(disc.mapping.len(), 2);
        assert_eq!(disc.mapping[0].0, "Cat");
    }

    #[test]
    fn kind_follows_precedence() {
        let reference = SchemaNode::from_value(&json!({"$ref": "#/definitions/A", "allOf": []}));
        assert_eq!(reference.kind(), SchemaKind::Reference("#/definitions/A"));

        let all_of = SchemaNode::from_value(&json!({"allOf": [{"$ref": "#/definitions/A"}]}));
        assert!(matches!(all_of.kind(), SchemaKind::AllOf(branches) if branches.len() == 1));

        let array = SchemaNode::from_value(&json!({"type": "array", "items": {"type": "string"}}));
        assert!(matches!(array.kind(), SchemaKind::Array(_)));

        let scalar = SchemaNode::from_value(&json!({"type": "string", "format": "date-time"}));
        assert_eq!(scalar.kind(), SchemaKind::Scalar);

        let enumeration = SchemaNode::from_value(&json!({"type": "string", "enum": ["a"]}));
        assert_eq!(enumeration.kind(), SchemaKind::Compound);

        assert_eq!(SchemaNode::from_value(&json!({})).kind(), SchemaKind::Empty);
        assert_eq!(SchemaNode::from_value(&json!(true)).kind(), SchemaKind::Empty);
    }

    #[test]
    fn type_arrays_and_tuple_items() {
        let node = SchemaNode::from_value(&json!({
            "type": ["null", "array"],
            "items": [1, {"type": "integer"}]
        }));
        assert_eq!(node.schema_type.as_deref(), Some("array"));
        assert_eq!(
            node.items.unwrap().schema_type.as_deref(),
            Some("integer")
        );
    }

    #[test]
    fn property_map_first_insert_wins() {
        let mut map = PropertyMap::new();
        assert!(map.insert_if_absent("id", SchemaNode::from_value(&json!({"type": "string"}))));
        assert!(!map.insert_if_absent("id", SchemaNode::from_value(&json!({"type": "integer"}))));

        let mut other = PropertyMap::new();
        other.insert_if_absent("id", SchemaNode::from_value(&json!({"type": "boolean"})));
        other.insert_if_absent("name", SchemaNode::from_value(&json!({"type": "string"})));
        map.merge(&other);

        assert_eq!(map.len(), 2);
        assert_eq!(map.get("id").unwrap().schema_type.as_deref(), Some("string"));
    }

    #[test]
    fn enum_strings_skip_null() {
        let node = SchemaNode::from_value(&json!({"enum": ["on", null, 3]}));
        assert_eq!(node.enum_strings(), ["on", "3"]);
    }
}
