//! Row payload types shared between sources, transports and the cursor.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single typed value inside a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Text(String),
    /// Nanoseconds since the unix epoch
    Timestamp(i64),
    Geometry(Geometry),
    Graph(Box<GraphObject>),
    List(Vec<Value>),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) | Value::Timestamp(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view used by comparisons. Integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) | Value::Timestamp(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Text(s) => write!(f, "'{s}'"),
            Value::Timestamp(ns) => write!(f, "@{ns}"),
            Value::Geometry(g) => write!(f, "{g}"),
            Value::Graph(g) => write!(f, "{g}"),
            Value::List(values) => {
                write!(f, "[")?;
                for (n, v) in values.iter().enumerate() {
                    if n > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Value {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i32 => Int,
    i64 => Int,
    f64 => Double,
    String => Text,
    &str => Text,
    Geometry => Geometry,
    Vec<Value> => List,
}

impl From<GraphObject> for Value {
    fn from(v: GraphObject) -> Value {
        Value::Graph(Box::new(v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "coordinates", rename_all = "snake_case")]
pub enum Geometry {
    Point(Point),
    Polyline(Vec<Point>),
    /// Rings, the first one is the exterior ring
    Polygon(Vec<Vec<Point>>),
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Geometry::Point(p) => match p.z {
                Some(z) => write!(f, "POINT({} {} {})", p.x, p.y, z),
                None => write!(f, "POINT({} {})", p.x, p.y),
            },
            Geometry::Polyline(points) => write!(f, "POLYLINE[{}]", points.len()),
            Geometry::Polygon(rings) => write!(f, "POLYGON[{}]", rings.len()),
        }
    }
}

/// A nested knowledge-graph object carried as a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "graph", rename_all = "snake_case")]
pub enum GraphObject {
    Entity {
        type_name: String,
        id: String,
        #[serde(default)]
        properties: BTreeMap<String, Value>,
    },
    Relationship {
        type_name: String,
        id: String,
        origin_id: String,
        destination_id: String,
        #[serde(default)]
        properties: BTreeMap<String, Value>,
    },
}

impl GraphObject {
    pub fn type_name(&self) -> &str {
        match self {
            GraphObject::Entity { type_name, .. } | GraphObject::Relationship { type_name, .. } => {
                type_name
            }
        }
    }

    pub fn id(&self) -> &str {
        match self {
            GraphObject::Entity { id, .. } | GraphObject::Relationship { id, .. } => id,
        }
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        match self {
            GraphObject::Entity { properties, .. }
            | GraphObject::Relationship { properties, .. } => properties.get(name),
        }
    }
}

impl fmt::Display for GraphObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphObject::Entity { type_name, id, .. } => write!(f, "({type_name}:{id})"),
            GraphObject::Relationship {
                type_name,
                origin_id,
                destination_id,
                ..
            } => write!(f, "({origin_id})-[{type_name}]->({destination_id})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: Value,
}

/// An untagged, ordered set of named values as carried on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Vec<Field>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field, keeping declaration order.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push(Field {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.value)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<Field> for Record {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Where a row came from relative to the moment the subscription started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Existed before the subscription and was replayed by a search
    PreExisting,
    Inserted,
    Deleted,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Origin::PreExisting => "pre_existing",
            Origin::Inserted => "inserted",
            Origin::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// A record tagged with its provenance.
///
/// A row is owned by the cursor that buffers it until the consumer takes it.
/// Anything attached to the row is released when the row is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    origin: Origin,
    record: Record,
}

impl Row {
    pub fn new(origin: Origin, record: Record) -> Self {
        Self { origin, record }
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.record.get(name)
    }

    /// Positional access in declaration order.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.record.fields().get(index).map(|f| &f.value)
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }
}

/// Rows delivered together by one poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBatch {
    sequence: u64,
    rows: Vec<Row>,
}

impl RowBatch {
    pub fn new(sequence: u64, rows: Vec<Row>) -> Self {
        Self { sequence, rows }
    }

    /// Tag every record of one upstream frame with the same origin.
    pub fn tagged(sequence: u64, origin: Origin, records: Vec<Record>) -> Self {
        Self {
            sequence,
            rows: records.into_iter().map(|r| Row::new(origin, r)).collect(),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl IntoIterator for RowBatch {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}
