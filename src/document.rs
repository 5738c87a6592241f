//! The document store: the primary document plus every external document
//! fetched while resolving it.
//!
//! The primary document is normalized once when the store is created:
//! definitions that only carry properties inside an `allOf` branch get them
//! hoisted, and titled inline schemas are promoted to `#/embedded/<title>`.
//! After that the only mutation is [`DocumentStore::insert_definition`], used
//! by the resolver to localize imported definitions.

use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use serde_json::{json, Map, Value};
use tracing::{debug, trace};

use crate::config::PrefixRule;
use crate::error::LoadError;
use crate::loader::{escape_segment, last_segment, load_document, navigate_fragment};
use crate::schema::keyword::{
    ALL_OF, DESCRIPTION, ITEMS, PROPERTIES, REF, REQUIRED, TITLE, TYPE,
};

/// Pointer prefix of promoted titled schemas.
pub const EMBEDDED_POINTER: &str = "#/embedded";

/// Which OpenAPI layout the primary document uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenApiVersion {
    /// Swagger 2.0: definitions under `definitions`.
    V2,
    /// OpenAPI 3.x: definitions under `components/schemas`.
    V3,
}

impl OpenApiVersion {
    /// Documents declaring `openapi` are v3, everything else is treated as v2.
    pub fn detect(document: &Value) -> Self {
        if document.get("openapi").is_some() {
            OpenApiVersion::V3
        } else {
            OpenApiVersion::V2
        }
    }

    pub fn definitions_pointer(&self) -> &'static str {
        match self {
            OpenApiVersion::V2 => "#/definitions",
            OpenApiVersion::V3 => "#/components/schemas",
        }
    }

    fn responses_pointer(&self) -> &'static str {
        match self {
            OpenApiVersion::V2 => "#/responses",
            OpenApiVersion::V3 => "#/components/responses",
        }
    }
}

/// Result of [`DocumentStore::insert_definition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A structurally equal definition already existed.
    Identical,
    /// A different definition already existed and was kept.
    Conflict,
}

#[derive(Debug)]
pub struct DocumentStore {
    document: Value,
    locator: String,
    version: OpenApiVersion,
    externals: HashMap<String, Rc<Value>>,
}

impl DocumentStore {
    /// Load and normalize the primary document from a file path or URL.
    ///
    /// # Errors
    ///
    /// Returns `LoadError` if the document cannot be read or parsed. This is
    /// the only fatal failure of a run.
    pub fn load(source: &str) -> Result<Self, LoadError> {
        let document = load_document(source)?;
        Ok(Self::from_value(document, source))
    }

    /// Build a store around an already parsed document.
    ///
    /// `locator` is the base against which relative external references
    /// are computed.
    pub fn from_value(document: Value, locator: impl Into<String>) -> Self {
        let version = OpenApiVersion::detect(&document);
        let mut store = Self {
            document,
            locator: locator.into(),
            version,
            externals: HashMap::new(),
        };
        store.rearrange_definitions();
        store.embed_titled_schemas();
        debug!(
            locator = %store.locator,
            ?version,
            definitions = store.definition_names().len(),
            "document loaded"
        );
        store
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn version(&self) -> OpenApiVersion {
        self.version
    }

    pub fn definitions_pointer(&self) -> &'static str {
        self.version.definitions_pointer()
    }

    /// Value at a local pointer (`#/...`) of the primary document.
    pub fn get(&self, pointer: &str) -> Option<&Value> {
        navigate_fragment(&self.document, pointer)
    }

    fn definitions(&self) -> Option<&Map<String, Value>> {
        self.get(self.definitions_pointer()).and_then(Value::as_object)
    }

    fn embedded(&self) -> Option<&Map<String, Value>> {
        self.get(EMBEDDED_POINTER).and_then(Value::as_object)
    }

    /// Names of all definitions, declared ones first, then promoted ones.
    pub fn definition_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.definitions()
            .into_iter()
            .chain(self.embedded())
            .flat_map(|defs| defs.keys())
            .filter(|name| seen.insert(name.as_str()))
            .cloned()
            .collect()
    }

    /// Local pointer of the definition called `name`.
    ///
    /// Exact names are tried first, then promoted schemas, then any
    /// definition whose prefix-stripped name equals `name`.
    pub fn definition_pointer(&self, name: &str, prefix: &PrefixRule) -> Option<String> {
        if self.definitions().is_some_and(|defs| defs.contains_key(name)) {
            return Some(self.pointer_for(name));
        }
        if self.embedded().is_some_and(|defs| defs.contains_key(name)) {
            return Some(format!("{}/{}", EMBEDDED_POINTER, escape_segment(name)));
        }
        if !prefix.is_active() {
            return None;
        }
        let actual = self
            .definitions()?
            .keys()
            .find(|candidate| prefix.strip(candidate) == name)?;
        trace!(name, actual = %actual, "definition found by prefix-stripped name");
        Some(self.pointer_for(actual))
    }

    /// Pointer a definition called `name` has (or would have) in this store.
    pub fn pointer_for(&self, name: &str) -> String {
        format!("{}/{}", self.definitions_pointer(), escape_segment(name))
    }

    /// Add a definition unless the name is taken.
    pub fn insert_definition(&mut self, name: &str, mut definition: Value) -> InsertOutcome {
        rearrange_definition(&mut definition);
        let Some(defs) = self.definitions_mut() else {
            return InsertOutcome::Conflict;
        };
        match defs.get(name) {
            Some(existing) if *existing == definition => InsertOutcome::Identical,
            Some(_) => InsertOutcome::Conflict,
            None => {
                defs.insert(name.to_string(), definition);
                InsertOutcome::Inserted
            }
        }
    }

    /// Definitions object, created when missing. `None` only if the path is
    /// occupied by something that is not an object.
    fn definitions_mut(&mut self) -> Option<&mut Map<String, Value>> {
        let segments: &[&str] = match self.version {
            OpenApiVersion::V2 => &["definitions"],
            OpenApiVersion::V3 => &["components", "schemas"],
        };
        let mut current = &mut self.document;
        for segment in segments {
            current = current
                .as_object_mut()?
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        current.as_object_mut()
    }

    /// Replace every `$ref` of the primary document that has an entry in
    /// `rewrite`.
    pub(crate) fn rewrite_references(&mut self, rewrite: &HashMap<String, String>) {
        rewrite_refs(&mut self.document, rewrite);
    }

    pub fn external(&self, locator: &str) -> Option<Rc<Value>> {
        self.externals.get(locator).cloned()
    }

    pub fn add_external(&mut self, locator: &str, document: Value) -> Rc<Value> {
        let document = Rc::new(document);
        self.externals
            .insert(locator.to_string(), Rc::clone(&document));
        document
    }

    pub fn external_count(&self) -> usize {
        self.externals.len()
    }

    /// Resources returned by successful (2xx) responses of the path
    /// operations, in discovery order.
    pub fn core_resources(&self) -> Vec<String> {
        let mut resources: Vec<String> = Vec::new();
        let Some(paths) = self.document.get("paths").and_then(Value::as_object) else {
            return resources;
        };

        let operations = paths
            .values()
            .filter_map(Value::as_object)
            .flat_map(|item| item.values())
            .filter_map(|op| op.get("responses").and_then(Value::as_object));

        for responses in operations {
            let successful = responses
                .iter()
                .filter(|(status, _)| status.starts_with('2'))
                .map(|(_, response)| response);
            for response in successful {
                let Some(name) = self.resource_of_response(response) else {
                    continue;
                };
                if !resources.contains(&name) {
                    resources.push(name);
                }
            }
        }
        resources
    }

    fn resource_of_response(&self, response: &Value) -> Option<String> {
        let response = match response.get(REF).and_then(Value::as_str) {
            Some(pointer) => self
                .get(pointer)
                .or_else(|| {
                    let fallback = format!(
                        "{}/{}",
                        self.version.responses_pointer(),
                        escape_segment(last_segment(pointer))
                    );
                    self.get(&fallback)
                })?,
            None => response,
        };

        let mut holder = response;
        if let Some(content) = holder.get("content").and_then(Value::as_object) {
            holder = content
                .iter()
                .find(|(media, _)| media.starts_with("application/json"))
                .map(|(_, media)| media)?;
        }
        let schema = holder.get("schema")?;

        schema
            .get(REF)
            .or_else(|| schema.get(ITEMS).and_then(|items| items.get(REF)))
            .and_then(Value::as_str)
            .map(|pointer| last_segment(pointer).to_string())
    }

    fn rearrange_definitions(&mut self) {
        let pointer = self.definitions_pointer();
        if let Some(Value::Object(defs)) = self.document.pointer_mut(&pointer[1..]) {
            for (name, definition) in defs.iter_mut() {
                if rearrange_definition(definition) {
                    trace!(name = %name, "hoisted allOf properties");
                }
            }
        }
    }

    /// Promote titled property schemas (and titled array items) to
    /// `#/embedded/<title>`, replacing them with a `$ref`.
    fn embed_titled_schemas(&mut self) {
        let defs_pointer = self.definitions_pointer();
        let mut queue: VecDeque<String> = self
            .definition_names()
            .iter()
            .map(|name| format!("{}/{}", defs_pointer, escape_segment(name)))
            .collect();
        let mut visited = HashSet::new();

        while let Some(pointer) = queue.pop_front() {
            if !visited.insert(pointer.clone()) {
                continue;
            }
            let promoted = match self.document.pointer_mut(&pointer[1..]) {
                Some(definition) => take_titled_properties(definition),
                None => continue,
            };
            if promoted.is_empty() {
                continue;
            }

            let Some(embedded) = self
                .document
                .as_object_mut()
                .map(|root| root.entry("embedded").or_insert_with(|| json!({})))
                .and_then(Value::as_object_mut)
            else {
                continue;
            };
            for (title, schema) in promoted {
                debug!(title = %title, from = %pointer, "promoted titled schema");
                embedded.entry(title.clone()).or_insert(schema);
                queue.push_back(format!("{}/{}", EMBEDDED_POINTER, escape_segment(&title)));
            }
        }
    }
}

/// Hoist the first inline `properties` branch of an `allOf` onto a
/// definition that has no `properties` of its own. Returns whether anything
/// changed.
fn rearrange_definition(definition: &mut Value) -> bool {
    let Some(obj) = definition.as_object_mut() else {
        return false;
    };
    if obj.contains_key(PROPERTIES) {
        return false;
    }
    let Some(Value::Array(branches)) = obj.get_mut(ALL_OF) else {
        return false;
    };
    let Some(position) = branches
        .iter()
        .position(|b| b.get(REF).is_none() && b.get(PROPERTIES).is_some())
    else {
        return false;
    };

    let Value::Object(mut branch) = branches.remove(position) else {
        return false;
    };
    if let Some(properties) = branch.remove(PROPERTIES) {
        obj.insert(PROPERTIES.to_string(), properties);
    }
    if let Some(required) = branch.remove(REQUIRED) {
        obj.insert(REQUIRED.to_string(), required);
    }
    if let Some(schema_type) = branch.remove(TYPE) {
        obj.insert(TYPE.to_string(), schema_type);
    }
    if let Some(description) = branch.remove(DESCRIPTION) {
        obj.entry(DESCRIPTION.to_string()).or_insert(description);
    }
    true
}

fn take_titled_properties(definition: &mut Value) -> Vec<(String, Value)> {
    let mut promoted = Vec::new();
    let Some(Value::Object(properties)) = definition.get_mut(PROPERTIES) else {
        return promoted;
    };

    for property in properties.values_mut() {
        let target = if property.get(TITLE).is_some() {
            property
        } else if property.get(TYPE).and_then(Value::as_str) == Some("array")
            && property.get(ITEMS).and_then(|i| i.get(TITLE)).is_some()
        {
            match property.get_mut(ITEMS) {
                Some(items) => items,
                None => continue,
            }
        } else {
            continue;
        };

        let Some(title) = target.get(TITLE).and_then(Value::as_str).map(String::from) else {
            continue;
        };
        let pointer = format!("{}/{}", EMBEDDED_POINTER, escape_segment(&title));
        let reference = json!({ "$ref": pointer });
        let schema = std::mem::replace(target, reference);
        promoted.push((title, schema));
    }
    promoted
}

pub(crate) fn rewrite_refs(value: &mut Value, rewrite: &HashMap<String, String>) {
    match value {
        Value::Object(obj) => {
            if let Some(Value::String(reference)) = obj.get_mut(REF) {
                if let Some(local) = rewrite.get(reference.as_str()) {
                    *reference = local.clone();
                }
            }
            for child in obj.values_mut() {
                rewrite_refs(child, rewrite);
            }
        }
        Value::Array(items) => {
            for child in items {
                rewrite_refs(child, rewrite);
            }
        }
        _ => {}
    }
}

/// Every `$ref` string in `value`, in document order.
pub(crate) fn collect_refs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(obj) => {
            if let Some(reference) = obj.get(REF).and_then(Value::as_str) {
                out.push(reference.to_string());
            }
            for (key, child) in obj {
                if key != REF {
                    collect_refs(child, out);
                }
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_refs(child, out);
            }
        }
        _ => {}
    }
}
