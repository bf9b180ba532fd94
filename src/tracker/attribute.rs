//! Per-frame attribute records produced by segmentation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Conventional field holding an object's centroid as `[x, y]`.
pub const CENTROID: &str = "Centroid";
/// Conventional field holding the linear indices of an object's pixels.
pub const PIXEL_INDICES: &str = "PixelIndices";
/// Conventional field holding an object's area in pixels.
pub const AREA: &str = "Area";

/// A single attribute value for one frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    /// Placeholder for an attribute that was not supplied for a frame.
    #[default]
    Empty,
    Scalar(f64),
    Vector(Vec<f64>),
    /// Set of pixel (linear) indices.
    Indices(BTreeSet<u64>),
}

impl Value {
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Short name of the value's shape, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Empty => "empty",
            Value::Scalar(_) => "scalar",
            Value::Vector(_) => "vector",
            Value::Indices(_) => "index set",
        }
    }

    /// Numeric view of the value. Scalars are treated as 1-vectors.
    pub fn as_numeric(&self) -> Option<&[f64]> {
        match self {
            Value::Scalar(x) => Some(std::slice::from_ref(x)),
            Value::Vector(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_indices(&self) -> Option<&BTreeSet<u64>> {
        match self {
            Value::Indices(set) => Some(set),
            _ => None,
        }
    }

    /// Collect pixel indices into a set value.
    pub fn indices<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        Value::Indices(iter.into_iter().collect())
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Scalar(x)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Vector(v)
    }
}

impl<const N: usize> From<[f64; N]> for Value {
    fn from(v: [f64; N]) -> Self {
        Value::Vector(v.to_vec())
    }
}

impl From<BTreeSet<u64>> for Value {
    fn from(set: BTreeSet<u64>) -> Self {
        Value::Indices(set)
    }
}

/// One frame's observed object: a record of named attributes, no identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    attributes: BTreeMap<String, Value>,
}

impl Detection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an attribute, builder style.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(field.into(), value.into());
    }

    /// Value of `field`, or `None` if it is absent or empty.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field).filter(|v| !v.is_empty())
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl FromIterator<(String, Value)> for Detection {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}
