//! Compiled JSON schema graph.
//!
//! The Compose schema is compiled once at start-up into a [`SchemaGraph`]: an
//! arena of [`SchemaNode`]s addressed by [`SchemaId`]. The graph is immutable
//! and is passed by reference to everything that needs it.
//!
//! # Design Decisions
//!
//! - Every subschema is compiled once per JSON pointer, so a `$ref` is just a
//!   [`SchemaId`] and recursive references need no special handling.
//! - `$ref` is kept next to the node's own keywords and never flattened. The
//!   walker decides when to follow it, because a referencing node can carry
//!   constraints (notably `enum`) of its own.
//! - `patternProperties` keep document order (`serde_json` is built with
//!   `preserve_order`), and the first matching pattern wins.
//!
//! Only the keywords used for completion and hover are compiled; everything
//! else in the document is ignored.

pub mod walker;

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    fmt,
    path::Path,
};

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Compose schema document embedded in the binary.
pub const COMPOSE_SCHEMA: &str = include_str!("compose-spec.json");

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to read schema document: {0}")]
    Io(#[from] std::io::Error),
    #[error("schema document does not conform to the JSON Schema meta-schema")]
    InvalidDocument,
    #[error("unresolved schema reference `{0}`")]
    UnresolvedReference(String),
    #[error("invalid pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(usize);

/// Primitive JSON types; variants are in alphabetical order so sets of them
/// sort by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SchemaType {
    Array,
    Boolean,
    Integer,
    Null,
    Number,
    Object,
    String,
}

impl SchemaType {
    pub fn parse(name: &str) -> Option<SchemaType> {
        match name {
            "array" => Some(SchemaType::Array),
            "boolean" => Some(SchemaType::Boolean),
            "integer" => Some(SchemaType::Integer),
            "null" => Some(SchemaType::Null),
            "number" => Some(SchemaType::Number),
            "object" => Some(SchemaType::Object),
            "string" => Some(SchemaType::String),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::Array => "array",
            SchemaType::Boolean => "boolean",
            SchemaType::Integer => "integer",
            SchemaType::Null => "null",
            SchemaType::Number => "number",
            SchemaType::Object => "object",
            SchemaType::String => "string",
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
pub struct SchemaNode {
    pub properties: BTreeMap<String, SchemaId>,
    pub pattern_properties: Vec<(Regex, SchemaId)>,
    pub items: Option<SchemaId>,
    pub one_of: Vec<SchemaId>,
    pub reference: Option<SchemaId>,
    pub enum_values: Vec<String>,
    pub types: BTreeSet<SchemaType>,
    pub description: Option<String>,
}

#[derive(Debug)]
pub struct SchemaGraph {
    nodes: Vec<SchemaNode>,
    root: SchemaId,
}

impl SchemaGraph {
    /// Compiles the embedded Compose schema.
    pub fn compose() -> Result<SchemaGraph, SchemaError> {
        SchemaGraph::compile(COMPOSE_SCHEMA.as_bytes())
    }

    pub fn load(path: &Path) -> Result<SchemaGraph, SchemaError> {
        let bytes = std::fs::read(path)?;
        SchemaGraph::compile(&bytes)
    }

    pub fn compile(bytes: &[u8]) -> Result<SchemaGraph, SchemaError> {
        let document: Value = serde_json::from_slice(bytes)?;
        SchemaGraph::from_value(&document)
    }

    pub fn from_value(document: &Value) -> Result<SchemaGraph, SchemaError> {
        if !jsonschema::meta::is_valid(document) {
            return Err(SchemaError::InvalidDocument);
        }

        let mut compiler = Compiler {
            document,
            nodes: Vec::new(),
            by_pointer: HashMap::new(),
        };
        let root = compiler.compile_at("")?;

        Ok(SchemaGraph {
            nodes: compiler.nodes,
            root,
        })
    }

    pub fn root(&self) -> SchemaRef<'_> {
        self.get(self.root)
    }

    pub fn get(&self, id: SchemaId) -> SchemaRef<'_> {
        SchemaRef { graph: self, id }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

struct Compiler<'v> {
    document: &'v Value,
    nodes: Vec<SchemaNode>,
    by_pointer: HashMap<String, SchemaId>,
}

impl<'v> Compiler<'v> {
    fn compile_at(&mut self, pointer: &str) -> Result<SchemaId, SchemaError> {
        if let Some(id) = self.by_pointer.get(pointer) {
            return Ok(*id);
        }

        let value = self
            .document
            .pointer(pointer)
            .ok_or_else(|| SchemaError::UnresolvedReference(format!("#{pointer}")))?;

        // reserve the slot first so cycles through $ref find it
        let id = SchemaId(self.nodes.len());
        self.nodes.push(SchemaNode::default());
        self.by_pointer.insert(pointer.to_string(), id);

        let node = self.compile_node(value, pointer)?;
        self.nodes[id.0] = node;
        Ok(id)
    }

    fn compile_node(&mut self, value: &'v Value, pointer: &str) -> Result<SchemaNode, SchemaError> {
        let mut node = SchemaNode::default();
        let Some(object) = value.as_object() else {
            return Ok(node);
        };

        if let Some(properties) = object.get("properties").and_then(Value::as_object) {
            for name in properties.keys() {
                let id = self.compile_at(&child(pointer, &["properties", name]))?;
                node.properties.insert(name.clone(), id);
            }
        }

        if let Some(patterns) = object.get("patternProperties").and_then(Value::as_object) {
            for pattern in patterns.keys() {
                let regex = Regex::new(pattern).map_err(|source| SchemaError::Pattern {
                    pattern: pattern.clone(),
                    source,
                })?;
                let id = self.compile_at(&child(pointer, &["patternProperties", pattern]))?;
                node.pattern_properties.push((regex, id));
            }
        }

        if object.get("items").is_some_and(Value::is_object) {
            node.items = Some(self.compile_at(&child(pointer, &["items"]))?);
        }

        if let Some(alternatives) = object.get("oneOf").and_then(Value::as_array) {
            for index in 0..alternatives.len() {
                let id = self.compile_at(&child(pointer, &["oneOf", &index.to_string()]))?;
                node.one_of.push(id);
            }
        }

        if let Some(reference) = object.get("$ref").and_then(Value::as_str) {
            let target = reference
                .strip_prefix('#')
                .ok_or_else(|| SchemaError::UnresolvedReference(reference.to_string()))?;
            node.reference = Some(self.compile_at(target)?);
        }

        if let Some(values) = object.get("enum").and_then(Value::as_array) {
            node.enum_values = values.iter().map(literal).collect();
        }

        node.types = match object.get("type") {
            Some(Value::String(name)) => SchemaType::parse(name).into_iter().collect(),
            Some(Value::Array(names)) => names
                .iter()
                .filter_map(Value::as_str)
                .filter_map(SchemaType::parse)
                .collect(),
            _ => BTreeSet::new(),
        };

        node.description = object
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(node)
    }
}

/// Extends a JSON pointer with escaped reference tokens.
fn child(pointer: &str, tokens: &[&str]) -> String {
    let mut extended = pointer.to_string();
    for token in tokens {
        extended.push('/');
        extended.push_str(&token.replace('~', "~0").replace('/', "~1"));
    }
    extended
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

static NO_PROPERTIES: BTreeMap<String, SchemaId> = BTreeMap::new();

/// A node together with the graph it lives in.
#[derive(Clone, Copy)]
pub struct SchemaRef<'g> {
    graph: &'g SchemaGraph,
    id: SchemaId,
}

impl fmt::Debug for SchemaRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SchemaRef").field(&self.id).finish()
    }
}

impl PartialEq for SchemaRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.graph, other.graph) && self.id == other.id
    }
}

impl Eq for SchemaRef<'_> {}

impl<'g> SchemaRef<'g> {
    pub fn id(&self) -> SchemaId {
        self.id
    }

    pub fn node(&self) -> &'g SchemaNode {
        &self.graph.nodes[self.id.0]
    }

    fn at(&self, id: SchemaId) -> SchemaRef<'g> {
        self.graph.get(id)
    }

    pub fn properties(&self) -> PropertyMap<'g> {
        PropertyMap {
            graph: self.graph,
            map: &self.node().properties,
        }
    }

    pub fn property(&self, name: &str) -> Option<SchemaRef<'g>> {
        self.node().properties.get(name).map(|id| self.at(*id))
    }

    /// First `patternProperties` entry whose pattern matches `key`.
    pub fn pattern_property(&self, key: &str) -> Option<SchemaRef<'g>> {
        self.node()
            .pattern_properties
            .iter()
            .find(|(pattern, _)| pattern.is_match(key))
            .map(|(_, id)| self.at(*id))
    }

    /// `properties` first, then `patternProperties`.
    pub fn lookup(&self, key: &str) -> Option<SchemaRef<'g>> {
        self.property(key).or_else(|| self.pattern_property(key))
    }

    pub fn items(&self) -> Option<SchemaRef<'g>> {
        self.node().items.map(|id| self.at(id))
    }

    pub fn one_of(&self) -> impl Iterator<Item = SchemaRef<'g>> + 'g {
        let graph = self.graph;
        self.node().one_of.iter().map(move |id| graph.get(*id))
    }

    pub fn reference(&self) -> Option<SchemaRef<'g>> {
        self.node().reference.map(|id| self.at(id))
    }

    pub fn enum_values(&self) -> &'g [String] {
        &self.node().enum_values
    }

    pub fn types(&self) -> &'g BTreeSet<SchemaType> {
        &self.node().types
    }

    pub fn description(&self) -> Option<&'g str> {
        self.node().description.as_deref()
    }

    /// Follows `$ref` until reaching a node without one.
    pub fn resolved(&self) -> SchemaRef<'g> {
        let mut current = *self;
        // a chain longer than the graph can only be a cycle
        for _ in 0..self.graph.len() {
            match current.reference() {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    /// The nodes reached from this one by following `$ref`, itself included.
    fn reference_chain(&self) -> impl Iterator<Item = SchemaRef<'g>> {
        let limit = self.graph.len();
        std::iter::successors(Some(*self), SchemaRef::reference).take(limit)
    }

    /// The field's enum, looked up on the node itself before its references.
    pub fn field_enum(&self) -> Option<&'g [String]> {
        self.reference_chain()
            .map(|node| node.enum_values())
            .find(|values| !values.is_empty())
    }

    /// The field's description, looked up on the node itself before its
    /// references.
    pub fn field_description(&self) -> Option<&'g str> {
        self.reference_chain()
            .filter_map(|node| node.description())
            .find(|description| !description.trim().is_empty())
    }

    /// Whether the node, or what it references, declares `schema_type`.
    fn declares(&self, schema_type: SchemaType) -> bool {
        self.reference_chain()
            .any(|node| node.types().contains(&schema_type))
    }

    /// Primitive types of the field with `$ref` and `oneOf` flattened away.
    pub fn flattened_types(&self) -> BTreeSet<SchemaType> {
        let mut types = BTreeSet::new();
        let mut visited = HashSet::new();
        let mut stack = vec![*self];

        while let Some(node) = stack.pop() {
            if !visited.insert(node.id) {
                continue;
            }
            types.extend(node.types().iter().copied());
            stack.extend(node.reference());
            stack.extend(node.one_of());
        }

        types
    }

    /// The schema that lists the keys allowed inside this field's mapping.
    ///
    /// Follows `$ref`, and for a `oneOf` union picks the first alternative
    /// declaring `object`.
    pub fn object_branch(&self) -> Option<SchemaRef<'g>> {
        let mut current = self.resolved();
        for _ in 0..self.graph.len() {
            let node = current.node();
            if !node.properties.is_empty() || !node.pattern_properties.is_empty() {
                return Some(current);
            }
            let branch = current
                .one_of()
                .find(|alternative| alternative.declares(SchemaType::Object));
            match branch {
                Some(alternative) => current = alternative.resolved(),
                None if current.types().contains(&SchemaType::Object) => return Some(current),
                None => return None,
            }
        }
        None
    }

    /// Properties of [`Self::object_branch`], empty when there is none.
    pub fn object_properties(&self) -> PropertyMap<'g> {
        match self.object_branch() {
            Some(branch) => branch.properties(),
            None => PropertyMap::empty(self.graph),
        }
    }

    /// The item schema of this field's array form.
    pub fn array_items(&self) -> Option<SchemaRef<'g>> {
        let node = self.resolved();
        node.items().or_else(|| {
            node.one_of()
                .map(|alternative| alternative.resolved())
                .find_map(|alternative| alternative.items())
        })
    }
}

/// A `properties` table.
#[derive(Clone, Copy)]
pub struct PropertyMap<'g> {
    graph: &'g SchemaGraph,
    map: &'g BTreeMap<String, SchemaId>,
}

impl fmt::Debug for PropertyMap<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.map.keys()).finish()
    }
}

impl<'g> PropertyMap<'g> {
    pub fn empty(graph: &'g SchemaGraph) -> PropertyMap<'g> {
        PropertyMap {
            graph,
            map: &NO_PROPERTIES,
        }
    }

    pub fn get(&self, name: &str) -> Option<SchemaRef<'g>> {
        self.map.get(name).map(|id| self.graph.get(*id))
    }

    pub fn names(&self) -> impl Iterator<Item = &'g str> {
        self.map.keys().map(String::as_str)
    }

    /// Entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&'g str, SchemaRef<'g>)> + 'g {
        let graph = self.graph;
        self.map
            .iter()
            .map(move |(name, id)| (name.as_str(), graph.get(*id)))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
