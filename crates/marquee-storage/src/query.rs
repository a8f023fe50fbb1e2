//! Predicate query builder and its translation to SQL.
//!
//! Callers compose a [`MovieQuery`] from field predicates, an optional KNN
//! clause, and a sort field. [`translate`] is the only place that turns a
//! query into SQL; it checks every predicate against the [`Schema`] so a
//! substring filter on a tag field or a KNN on a plain column is rejected
//! before any SQL runs.

use rusqlite::types::Value;

use marquee_core::error::MarqueeError;
use marquee_core::schema::{FieldType, IndexKind, Schema};

use crate::migrations::{folded_column, MOVIES_TABLE, TAGS_TABLE};

/// A structured filter on one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Case-insensitive substring match on a text field.
    Contains { field: String, value: String },
    /// Every value must be present on a tag field.
    TagsEq { field: String, values: Vec<String> },
    /// Exact match on a numeric field.
    NumericEq { field: String, value: i64 },
}

/// Nearest-neighbor clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Knn {
    pub field: String,
    pub vector: Vec<f32>,
    pub k: usize,
}

/// A conjunction of predicates with optional KNN ranking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovieQuery {
    pub predicates: Vec<Predicate>,
    pub knn: Option<Knn>,
    pub sort_by: Option<String>,
}

impl MovieQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Substring filter. Absent or blank values add nothing.
    pub fn containing(mut self, field: &str, value: Option<&str>) -> Self {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.predicates.push(Predicate::Contains {
                field: field.to_string(),
                value: value.to_string(),
            });
        }
        self
    }

    /// Tag membership filter. Blank values are dropped; an empty list adds
    /// nothing.
    pub fn tags_eq(mut self, field: &str, values: &[String]) -> Self {
        let values: Vec<String> = values
            .iter()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        if !values.is_empty() {
            self.predicates.push(Predicate::TagsEq {
                field: field.to_string(),
                values,
            });
        }
        self
    }

    /// Exact numeric filter.
    pub fn numeric_eq(mut self, field: &str, value: Option<i64>) -> Self {
        if let Some(value) = value {
            self.predicates.push(Predicate::NumericEq {
                field: field.to_string(),
                value,
            });
        }
        self
    }

    /// Rank by distance to `vector`, keeping the `k` nearest.
    pub fn nearest(mut self, field: &str, vector: Vec<f32>, k: usize) -> Self {
        self.knn = Some(Knn {
            field: field.to_string(),
            vector,
            k,
        });
        self
    }

    /// Ascending sort used when no KNN clause is present.
    pub fn sorted_by(mut self, field: &str) -> Self {
        self.sort_by = Some(field.to_string());
        self
    }
}

/// A translated query ready to execute.
#[derive(Debug, Clone)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<Value>,
    /// Column holding the vector blob, selected last, when KNN applies.
    pub vector_column: Option<&'static str>,
}

/// Translate a query into SQL over the catalog tables.
pub fn translate(query: &MovieQuery, schema: &Schema) -> Result<SqlQuery, MarqueeError> {
    let mut columns: Vec<String> = schema
        .fields
        .iter()
        .filter(|f| f.ty != FieldType::Vector)
        .map(|f| format!("m.{}", f.column))
        .collect();

    let mut clauses = Vec::new();
    let mut params = Vec::new();

    for predicate in &query.predicates {
        match predicate {
            Predicate::Contains { field, value } => {
                let spec = schema.field(field)?;
                if spec.index != IndexKind::Text {
                    return Err(wrong_index(field, "a text"));
                }
                clauses.push(format!("instr(m.{}, ?) > 0", folded_column(spec.column)));
                params.push(Value::Text(value.to_lowercase()));
            }
            Predicate::TagsEq { field, values } => {
                let spec = schema.field(field)?;
                if spec.index != IndexKind::Tag {
                    return Err(wrong_index(field, "a tag"));
                }
                for value in values {
                    clauses.push(format!(
                        "EXISTS (SELECT 1 FROM {tags} t WHERE t.movie_id = m.{key} \
                         AND t.field = ? AND t.value = ?)",
                        tags = TAGS_TABLE,
                        key = schema.key
                    ));
                    params.push(Value::Text(spec.name.to_string()));
                    params.push(Value::Text(value.clone()));
                }
            }
            Predicate::NumericEq { field, value } => {
                let spec = schema.field(field)?;
                if !matches!(spec.index, IndexKind::Numeric { .. }) {
                    return Err(wrong_index(field, "a numeric"));
                }
                clauses.push(format!("m.{} = ?", spec.column));
                params.push(Value::Integer(*value));
            }
        }
    }

    let mut vector_column = None;
    if let Some(knn) = &query.knn {
        let spec = schema.field(&knn.field)?;
        let vector = match spec.index {
            IndexKind::Vector(vector) => vector,
            _ => return Err(wrong_index(&knn.field, "a vector")),
        };
        if knn.vector.len() != vector.dimension {
            return Err(MarqueeError::Validation(format!(
                "Query vector has dimension {}, field '{}' expects {}",
                knn.vector.len(),
                knn.field,
                vector.dimension
            )));
        }
        if knn.k == 0 {
            return Err(MarqueeError::Validation(
                "Number of nearest neighbors must be at least 1".to_string(),
            ));
        }
        clauses.push(format!("m.{} IS NOT NULL", spec.column));
        columns.push(format!("m.{}", spec.column));
        vector_column = Some(spec.column);
    }

    let order = match (&query.knn, &query.sort_by) {
        (None, Some(field)) => {
            let spec = schema.field(field)?;
            if spec.index != (IndexKind::Numeric { sortable: true }) {
                return Err(wrong_index(field, "a sortable"));
            }
            format!("m.{} ASC, m.{} ASC", spec.column, schema.key)
        }
        _ => format!("m.{} ASC", schema.key),
    };

    let mut sql = format!("SELECT {} FROM {} m", columns.join(", "), MOVIES_TABLE);
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY ");
    sql.push_str(&order);

    Ok(SqlQuery {
        sql,
        params,
        vector_column,
    })
}

fn wrong_index(field: &str, kind: &str) -> MarqueeError {
    MarqueeError::Schema(format!("Field '{}' is not {} field", field, kind))
}
