//! YAML dataset definitions
//!
//! A [`DatasetDef`] is the on-disk form of a [`DatasetSpec`]. Cross rules are
//! limited to comparisons between two fields, since arbitrary predicates can
//! only be built in code.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GateError, Result};
use crate::spec::{AllowedRule, CastKind, CrossRule, DatasetSpec, FieldRule, IndexSpec, RangeRule};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldDef {
    pub field: String,
    /// Staging column; defaults to `field`
    #[serde(default)]
    pub source: Option<String>,
    pub cast: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RangeDef {
    pub field: String,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AllowedDef {
    pub field: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
}

impl CompareOp {
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Ge => ordering != Ordering::Less,
            Self::Gt => ordering == Ordering::Greater,
        }
    }
}

/// `left <op> right` over two typed fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrossDef {
    pub name: String,
    pub left: String,
    pub op: CompareOp,
    pub right: String,
}

impl CrossDef {
    /// Compile into a predicate; a null or incomparable operand is an error
    pub fn compile(&self) -> CrossRule {
        let CrossDef { name, left, op, right } = self.clone();
        let label = name.clone();
        CrossRule::new(name, move |row| {
            let (Some(l), Some(r)) = (row.get(&left), row.get(&right)) else {
                eyre::bail!("{}: {} or {} is null", label, left, right);
            };
            let ordering = l
                .compare(r)
                .ok_or_else(|| eyre::eyre!("{}: cannot compare {} with {}", label, left, right))?;
            Ok(op.holds(ordering))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DatasetDef {
    pub name: String,
    pub stg_table: String,
    pub final_table: String,
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub ranges: Vec<RangeDef>,
    #[serde(default)]
    pub allowed: Vec<AllowedDef>,
    #[serde(default)]
    pub cross: Vec<CrossDef>,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

impl DatasetDef {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Build the spec, rejecting unknown cast kinds and dangling field references
    pub fn into_spec(self) -> Result<DatasetSpec> {
        debug!(name = %self.name, "DatasetDef::into_spec: called");
        let mut spec = DatasetSpec::new(&self.name, &self.stg_table, &self.final_table);

        for def in &self.fields {
            let cast: CastKind = def.cast.parse()?;
            let source = def.source.clone().unwrap_or_else(|| def.field.clone());
            let mut rule = FieldRule::new(&def.field, source, cast);
            if def.required {
                rule = rule.required();
            }
            spec = spec.field(rule);
        }

        let known: BTreeSet<&str> = self.fields.iter().map(|f| f.field.as_str()).collect();
        let check = |field: &str, what: &str| -> Result<()> {
            if known.contains(field) {
                Ok(())
            } else {
                Err(GateError::InvalidDefinition(format!(
                    "{}: {} refers to unknown field '{}'",
                    self.name, what, field
                )))
            }
        };

        for field in &self.required {
            check(field, "required")?;
            spec = spec.require(field);
        }
        for range in &self.ranges {
            check(&range.field, "range")?;
            spec = spec.range(RangeRule::new(&range.field, range.min, range.max));
        }
        for allowed in &self.allowed {
            check(&allowed.field, "allowed")?;
            spec = spec.allow(AllowedRule::new(&allowed.field, allowed.values.iter().cloned()));
        }
        for cross in &self.cross {
            check(&cross.left, "cross")?;
            check(&cross.right, "cross")?;
            spec = spec.cross(cross.compile());
        }
        for index in &self.indexes {
            spec = spec.index(index.clone());
        }

        spec.check()?;
        Ok(spec)
    }
}

impl TryFrom<DatasetDef> for DatasetSpec {
    type Error = GateError;

    fn try_from(def: DatasetDef) -> Result<Self> {
        def.into_spec()
    }
}
