//! Dataset rule model
//!
//! A [`DatasetSpec`] describes one dataset: where its staged rows live, where
//! the promoted rows go, how each field is cast, and which rules a row must
//! satisfy. Specs are plain data and can be built without a store, so the same
//! spec drives both the transform run and the schema synthesizer.
//!
//! ```ignore
//! let spec = DatasetSpec::new("people", "main.stage_people", "main.people_typed")
//!     .field(FieldRule::new("person_id", "person_id", CastKind::Integer).required())
//!     .field(FieldRule::new("full_name", "full_name", CastKind::Text).required())
//!     .index(IndexSpec::new("IX_people_typed_person_id", ["person_id"]).unique());
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::GateError;
use crate::ident::QualifiedName;
use crate::row::TypedRow;

/// How a raw staging value is converted into a typed value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastKind {
    Text,
    Integer,
    Float,
    Money,
    Date,
}

impl fmt::Display for CastKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::Money => write!(f, "money"),
            Self::Date => write!(f, "date"),
        }
    }
}

impl FromStr for CastKind {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "str" | "string" => Ok(Self::Text),
            "integer" | "int" => Ok(Self::Integer),
            "float" | "floating" | "double" => Ok(Self::Float),
            "money" | "decimal" => Ok(Self::Money),
            "date" => Ok(Self::Date),
            _ => Err(GateError::UnknownCastKind(s.to_string())),
        }
    }
}

/// One destination field and the staging column it is cast from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    pub field: String,
    pub source: String,
    pub cast: CastKind,
    pub required: bool,
}

impl FieldRule {
    pub fn new(field: impl Into<String>, source: impl Into<String>, cast: CastKind) -> Self {
        Self {
            field: field.into(),
            source: source.into(),
            cast,
            required: false,
        }
    }

    /// Mark the field as required (null after casting is a reject)
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Inclusive numeric bounds for a field
#[derive(Debug, Clone, PartialEq)]
pub struct RangeRule {
    pub field: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl RangeRule {
    pub fn new(field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            field: field.into(),
            min,
            max,
        }
    }
}

/// Permitted values for a field, matched case-insensitively
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedRule {
    pub field: String,
    pub allowed: BTreeSet<String>,
}

impl AllowedRule {
    pub fn new<I, S>(field: impl Into<String>, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field: field.into(),
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `value` is in the set, ignoring case and surrounding whitespace
    pub fn permits(&self, value: &str) -> bool {
        let needle = value.trim().to_lowercase();
        self.allowed.iter().any(|a| a.to_lowercase() == needle)
    }
}

/// Predicate signature for cross-field rules; `Ok(true)` means the row passes
pub type CrossPredicate = dyn Fn(&TypedRow) -> eyre::Result<bool> + Send + Sync;

/// A named predicate over the whole typed row
#[derive(Clone)]
pub struct CrossRule {
    pub name: String,
    predicate: Arc<CrossPredicate>,
}

impl CrossRule {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&TypedRow) -> eyre::Result<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn predicate(&self) -> &CrossPredicate {
        self.predicate.as_ref()
    }
}

impl fmt::Debug for CrossRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrossRule").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Index to maintain on the destination table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IndexSpec {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default, rename = "where")]
    pub filter: Option<String>,
    #[serde(default = "default_if_not_exists")]
    pub if_not_exists: bool,
}

fn default_if_not_exists() -> bool {
    true
}

impl IndexSpec {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
            include: Vec::new(),
            filter: None,
            if_not_exists: default_if_not_exists(),
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn include<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, predicate: impl Into<String>) -> Self {
        self.filter = Some(predicate.into());
        self
    }

    /// Always issue CREATE INDEX, even if the name already exists
    pub fn always_create(mut self) -> Self {
        self.if_not_exists = false;
        self
    }
}

/// Full description of one dataset
#[derive(Debug, Clone)]
pub struct DatasetSpec {
    /// Dataset identifier, used to tag rejects
    pub name: String,
    /// Staging table holding raw text rows
    pub stg_table: String,
    /// Destination table for promoted rows
    pub final_table: String,
    /// Ordered fields; the first one is the primary key
    pub fields: Vec<FieldRule>,
    /// Extra required fields beyond `FieldRule::required`
    pub required: Vec<String>,
    pub ranges: Vec<RangeRule>,
    pub allowed: Vec<AllowedRule>,
    pub cross: Vec<CrossRule>,
    pub indexes: Vec<IndexSpec>,
}

impl DatasetSpec {
    pub fn new(name: impl Into<String>, stg_table: impl Into<String>, final_table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stg_table: stg_table.into(),
            final_table: final_table.into(),
            fields: Vec::new(),
            required: Vec::new(),
            ranges: Vec::new(),
            allowed: Vec::new(),
            cross: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn field(mut self, rule: FieldRule) -> Self {
        self.fields.push(rule);
        self
    }

    pub fn require(mut self, field: impl Into<String>) -> Self {
        self.required.push(field.into());
        self
    }

    pub fn range(mut self, rule: RangeRule) -> Self {
        self.ranges.push(rule);
        self
    }

    pub fn allow(mut self, rule: AllowedRule) -> Self {
        self.allowed.push(rule);
        self
    }

    pub fn cross(mut self, rule: CrossRule) -> Self {
        self.cross.push(rule);
        self
    }

    pub fn index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    /// The field promotion keys on (first declared field)
    pub fn primary_key(&self) -> Option<&FieldRule> {
        self.fields.first()
    }

    /// Staging columns read by the scan, in field order
    pub fn source_columns(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.source.as_str()).collect()
    }

    /// Destination columns written by the promoter, in field order
    pub fn destination_columns(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.field.as_str()).collect()
    }

    /// Configuration checks run before any row or table is touched
    pub fn check(&self) -> Result<(), GateError> {
        if self.fields.is_empty() {
            return Err(GateError::NoFields(self.name.clone()));
        }
        QualifiedName::parse(&self.stg_table)?;
        QualifiedName::parse(&self.final_table)?;
        for index in &self.indexes {
            if index.name.trim().is_empty() {
                return Err(GateError::EmptyIndexName);
            }
            if index.columns.is_empty() {
                return Err(GateError::InvalidDefinition(format!("index '{}' has no columns", index.name)));
            }
        }
        Ok(())
    }
}
