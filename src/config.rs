//! Options consumed by the resolution engine.
//!
//! The engine receives a [`GraphConfig`] by value and never reads
//! configuration files itself; [`GraphConfig::from_file`] exists for callers
//! such as the command-line tool.

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::loader::load_document_file;

/// Labels used for the cardinality of non-array properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardinalityLabels {
    pub exactly_one: String,
    pub zero_or_one: String,
}

impl Default for CardinalityLabels {
    fn default() -> Self {
        Self {
            exactly_one: "1".to_string(),
            zero_or_one: "0..1".to_string(),
        }
    }
}

/// Configuration for graph construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Pull properties of `allOf` supertypes into a node as visible
    /// inherited properties.
    pub include_inherited: bool,
    /// Follow `$ref` branches of `allOf` when building a node: records the
    /// inheritance and, with `include_inherited`, pulls supertype properties.
    pub expand_all_properties_from_allofs: bool,
    /// Merge the flattened `allOf` ancestry into the resource's own
    /// property map.
    pub flatten_inheritance: bool,
    /// Do not add discriminator-mapped subtypes to the graph.
    pub exclude_resources_from_discriminators: bool,
    /// Render `$ref`s in type signatures as the target's own signature rather
    /// than `"Type [min..max]"`.
    pub compress_custom_types: bool,
    /// Regex removed from type names. Empty disables stripping.
    pub prefix_to_remove: String,
    pub prefix_replacement: String,
    pub format_to_type: BTreeMap<String, String>,
    /// Rewrites for plain `type` values.
    pub type_mapping: BTreeMap<String, String>,
    pub cardinality: CardinalityLabels,
    /// Type names always treated as simple.
    pub simple_types: Vec<String>,
    /// Name suffixes that mark a type as simple.
    pub simple_endings: Vec<String>,
    /// Property names for which missing type information is not reported.
    pub special_properties: Vec<String>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            include_inherited: true,
            expand_all_properties_from_allofs: true,
            flatten_inheritance: false,
            exclude_resources_from_discriminators: false,
            compress_custom_types: true,
            prefix_to_remove: String::new(),
            prefix_replacement: String::new(),
            format_to_type: BTreeMap::from([
                ("date-time".to_string(), "DateTime".to_string()),
                ("date".to_string(), "Date".to_string()),
            ]),
            type_mapping: BTreeMap::new(),
            cardinality: CardinalityLabels::default(),
            simple_types: Vec::new(),
            simple_endings: Vec::new(),
            special_properties: Vec::new(),
        }
    }
}

impl GraphConfig {
    /// Read a configuration from a JSON or YAML file. Missing keys take their
    /// defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let value = load_document_file(path)?;
        serde_json::from_value(value).map_err(|source| ConfigError::InvalidConfig {
            locator: path.display().to_string(),
            source,
        })
    }

    pub fn include_inherited(mut self, include: bool) -> Self {
        self.include_inherited = include;
        self
    }

    pub fn expand_all_properties_from_allofs(mut self, expand: bool) -> Self {
        self.expand_all_properties_from_allofs = expand;
        self
    }

    pub fn flatten_inheritance(mut self, flatten: bool) -> Self {
        self.flatten_inheritance = flatten;
        self
    }

    pub fn exclude_resources_from_discriminators(mut self, exclude: bool) -> Self {
        self.exclude_resources_from_discriminators = exclude;
        self
    }

    pub fn compress_custom_types(mut self, compress: bool) -> Self {
        self.compress_custom_types = compress;
        self
    }

    /// Set the prefix regex and its replacement.
    pub fn prefix(mut self, pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.prefix_to_remove = pattern.into();
        self.prefix_replacement = replacement.into();
        self
    }

    pub fn map_format(mut self, format: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.format_to_type.insert(format.into(), type_name.into());
        self
    }

    pub fn map_type(mut self, json_type: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.type_mapping.insert(json_type.into(), type_name.into());
        self
    }

    pub fn cardinality_labels(
        mut self,
        exactly_one: impl Into<String>,
        zero_or_one: impl Into<String>,
    ) -> Self {
        self.cardinality = CardinalityLabels {
            exactly_one: exactly_one.into(),
            zero_or_one: zero_or_one.into(),
        };
        self
    }

    /// Compile the prefix rule.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPrefixPattern` if `prefix_to_remove` is not
    /// a valid regex.
    pub fn prefix_rule(&self) -> Result<PrefixRule, ConfigError> {
        if self.prefix_to_remove.is_empty() {
            return Ok(PrefixRule::default());
        }
        let regex =
            Regex::new(&self.prefix_to_remove).map_err(|source| ConfigError::InvalidPrefixPattern {
                pattern: self.prefix_to_remove.clone(),
                source,
            })?;
        Ok(PrefixRule {
            regex: Some(regex),
            replacement: self.prefix_replacement.clone(),
        })
    }
}

/// Compiled prefix-stripping rule.
#[derive(Debug, Clone, Default)]
pub struct PrefixRule {
    regex: Option<Regex>,
    replacement: String,
}

impl PrefixRule {
    pub fn is_active(&self) -> bool {
        self.regex.is_some()
    }

    pub fn strip(&self, name: &str) -> String {
        match &self.regex {
            Some(regex) => regex
                .replace_all(name, regex::NoExpand(&self.replacement))
                .into_owned(),
            None => name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults() {
        let config = GraphConfig::default();
        assert!(config.include_inherited);
        assert!(config.expand_all_properties_from_allofs);
        assert!(!config.flatten_inheritance);
        assert!(!config.exclude_resources_from_discriminators);
        assert_eq!(config.cardinality.exactly_one, "1");
        assert_eq!(config.cardinality.zero_or_one, "0..1");
        assert_eq!(config.format_to_type["date-time"], "DateTime");
    }

    #[test]
    fn builder_methods() {
        let config = GraphConfig::default()
            .include_inherited(false)
            .flatten_inheritance(true)
            .map_type("integer", "Integer")
            .cardinality_labels("1..1", "0..1");
        assert!(!config.include_inherited);
        assert!(config.flatten_inheritance);
        assert_eq!(config.type_mapping["integer"], "Integer");
        assert_eq!(config.cardinality.exactly_one, "1..1");
    }

    #[test]
    fn from_file_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "include_inherited: false\nprefix_to_remove: '^TMF'").unwrap();

        let config = GraphConfig::from_file(file.path()).unwrap();
        assert!(!config.include_inherited);
        assert_eq!(config.prefix_to_remove, "^TMF");
        assert!(config.expand_all_properties_from_allofs);
        assert_eq!(config.cardinality, CardinalityLabels::default());
    }

    #[test]
    fn from_file_rejects_wrong_types() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"include_inherited": "yes"}}"#).unwrap();

        let result = GraphConfig::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::InvalidConfig { .. })));
    }

    #[test]
    fn prefix_rule_strips_matches() {
        let rule = GraphConfig::default().prefix("^TMF\\d*_", "").prefix_rule().unwrap();
        assert!(rule.is_active());
        assert_eq!(rule.strip("TMF620_Catalog"), "Catalog");
        assert_eq!(rule.strip("Catalog"), "Catalog");

        let inactive = GraphConfig::default().prefix_rule().unwrap();
        assert_eq!(inactive.strip("TMF620_Catalog"), "TMF620_Catalog");
    }

    #[test]
    fn prefix_rule_invalid_pattern() {
        let result = GraphConfig::default().prefix("(", "").prefix_rule();
        assert!(matches!(result, Err(ConfigError::InvalidPrefixPattern { .. })));
    }
}
