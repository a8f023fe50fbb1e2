//! Declarative index schema for the movie catalog.
//!
//! Each field of [`Movie`](crate::types::Movie) is described as data: the
//! storage column it maps to, how it is indexed, and, for the vector field,
//! the ANN algorithm, element type, dimension, and distance metric. The store
//! builds its tables from this value and the query translator checks every
//! predicate against it.

use serde::Serialize;

use crate::error::{MarqueeError, Result};

pub const TITLE: &str = "title";
pub const YEAR: &str = "year";
pub const CAST: &str = "cast";
pub const GENRES: &str = "genres";
pub const EXTRACT: &str = "extract";
pub const EMBEDDED_EXTRACT: &str = "embeddedExtract";

/// Distance metric used to compare vectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
}

/// ANN algorithm requested for a vector field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorAlgorithm {
    Hnsw,
    Flat,
}

/// Element type of a stored vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorElement {
    Float32,
}

/// Vector index parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct VectorSpec {
    pub algorithm: VectorAlgorithm,
    pub element: VectorElement,
    pub dimension: usize,
    pub distance: DistanceMetric,
    pub initial_capacity: usize,
}

/// Value type of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    StringList,
    Vector,
}

/// How a field is indexed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Stored and returned, not searchable.
    None,
    /// Substring (containment) search.
    Text,
    /// Exact and range comparison.
    Numeric { sortable: bool },
    /// Exact membership over a list of values.
    Tag,
    /// Nearest-neighbor search.
    Vector(VectorSpec),
}

/// One schema field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    /// Field name as it appears on the wire.
    pub name: &'static str,
    /// Storage column.
    pub column: &'static str,
    pub ty: FieldType,
    pub index: IndexKind,
    /// Whether values feed the autocomplete dictionary.
    pub autocomplete: bool,
}

impl FieldSpec {
    fn new(name: &'static str, column: &'static str, ty: FieldType, index: IndexKind) -> Self {
        Self {
            name,
            column,
            ty,
            index,
            autocomplete: false,
        }
    }

    fn with_autocomplete(mut self) -> Self {
        self.autocomplete = true;
        self
    }
}

/// The full field set of an index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Schema {
    pub index_name: &'static str,
    /// Primary key field.
    pub key: &'static str,
    pub fields: Vec<FieldSpec>,
}

impl Schema {
    /// The movie catalog schema with a vector field of the given dimension.
    pub fn movies(dimension: usize) -> Self {
        Self {
            index_name: "movieIdx",
            key: "id",
            fields: vec![
                FieldSpec::new("id", "id", FieldType::String, IndexKind::None),
                FieldSpec::new(TITLE, "title", FieldType::String, IndexKind::Text)
                    .with_autocomplete(),
                FieldSpec::new(
                    YEAR,
                    "year",
                    FieldType::Integer,
                    IndexKind::Numeric { sortable: true },
                ),
                FieldSpec::new(CAST, "cast_list", FieldType::StringList, IndexKind::Tag),
                FieldSpec::new(GENRES, "genre_list", FieldType::StringList, IndexKind::Tag),
                FieldSpec::new(EXTRACT, "extract", FieldType::String, IndexKind::Text),
                FieldSpec::new(
                    EMBEDDED_EXTRACT,
                    "embedded_extract",
                    FieldType::Vector,
                    IndexKind::Vector(VectorSpec {
                        algorithm: VectorAlgorithm::Hnsw,
                        element: VectorElement::Float32,
                        dimension,
                        distance: DistanceMetric::Cosine,
                        initial_capacity: 10,
                    }),
                ),
                FieldSpec::new("href", "href", FieldType::String, IndexKind::None),
                FieldSpec::new("thumbnail", "thumbnail", FieldType::String, IndexKind::None),
                FieldSpec::new(
                    "thumbnailWidth",
                    "thumbnail_width",
                    FieldType::Integer,
                    IndexKind::None,
                ),
                FieldSpec::new(
                    "thumbnailHeight",
                    "thumbnail_height",
                    FieldType::Integer,
                    IndexKind::None,
                ),
            ],
        }
    }

    /// Look up a field by wire name.
    pub fn field(&self, name: &str) -> Result<&FieldSpec> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| MarqueeError::Schema(format!("Unknown field '{}'", name)))
    }

    /// The vector field and its parameters.
    pub fn vector_field(&self) -> Result<(&FieldSpec, VectorSpec)> {
        self.fields
            .iter()
            .find_map(|f| match f.index {
                IndexKind::Vector(spec) => Some((f, spec)),
                _ => None,
            })
            .ok_or_else(|| MarqueeError::Schema("Schema has no vector field".to_string()))
    }

    /// Fields indexed as tags.
    pub fn tag_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.index == IndexKind::Tag)
    }

    /// Fields feeding the autocomplete dictionary.
    pub fn autocomplete_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.autocomplete)
    }
}
