//! Row validator
//!
//! A [`RowValidator`] is compiled once per [`DatasetSpec`] into an ordered list
//! of [`Directive`]s. Validating a row casts every field, then runs each
//! directive in order; every directive contributes its own reasons, so a row
//! that breaks three rules carries three reasons.

use std::cmp::Ordering;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, warn};

use crate::cast::cast;
use crate::row::{RawRow, TypedRow, Value};
use crate::spec::{AllowedRule, CrossRule, DatasetSpec, FieldRule, RangeRule};

/// Why a row was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    Required(String),
    RangeMin(String),
    RangeMax(String),
    Allowed(String),
    Cross(String),
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required(field) => write!(f, "required:{}", field),
            Self::RangeMin(field) => write!(f, "range_min:{}", field),
            Self::RangeMax(field) => write!(f, "range_max:{}", field),
            Self::Allowed(field) => write!(f, "allowed:{}", field),
            Self::Cross(name) => write!(f, "cross:{}", name),
        }
    }
}

/// Join reasons the way the reject store keeps them
pub fn join_reasons(reasons: &[Reason]) -> String {
    reasons.iter().map(ToString::to_string).collect::<Vec<_>>().join("|")
}

/// One validation step over a typed row
#[derive(Debug, Clone)]
pub enum Directive {
    Required(String),
    Range(RangeRule),
    Allowed(AllowedRule),
    Cross(CrossRule),
}

impl Directive {
    pub fn evaluate(&self, row: &TypedRow) -> Vec<Reason> {
        match self {
            Self::Required(field) => {
                if row.is_null(field) {
                    vec![Reason::Required(field.clone())]
                } else {
                    Vec::new()
                }
            }
            Self::Range(rule) => evaluate_range(rule, row),
            Self::Allowed(rule) => match row.get(&rule.field) {
                Some(value) if !rule.permits(&allowed_text(value)) => vec![Reason::Allowed(rule.field.clone())],
                _ => Vec::new(),
            },
            Self::Cross(rule) => {
                if evaluate_cross(rule, row) {
                    Vec::new()
                } else {
                    vec![Reason::Cross(rule.name.clone())]
                }
            }
        }
    }
}

/// Text compared against an allowed set; floats keep their fractional part
fn allowed_text(value: &Value) -> String {
    match value {
        Value::Float(f) => format!("{:?}", f),
        other => other.to_string(),
    }
}

fn evaluate_range(rule: &RangeRule, row: &TypedRow) -> Vec<Reason> {
    let Some(value) = row.get(&rule.field) else {
        return Vec::new();
    };
    if value.as_f64().is_none() {
        debug!(field = %rule.field, "evaluate_range: non-numeric value, skipping");
        return Vec::new();
    }

    let mut reasons = Vec::new();
    if let Some(min) = rule.min
        && value.compare_bound(min) == Some(Ordering::Less)
    {
        reasons.push(Reason::RangeMin(rule.field.clone()));
    }
    if let Some(max) = rule.max
        && value.compare_bound(max) == Some(Ordering::Greater)
    {
        reasons.push(Reason::RangeMax(rule.field.clone()));
    }
    reasons
}

/// Run a cross predicate; errors and panics both count as a failed check
fn evaluate_cross(rule: &CrossRule, row: &TypedRow) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| (rule.predicate())(row))) {
        Ok(Ok(passed)) => passed,
        Ok(Err(e)) => {
            debug!(rule = %rule.name, error = %e, "evaluate_cross: predicate returned error");
            false
        }
        Err(_) => {
            warn!(rule = %rule.name, "evaluate_cross: predicate panicked");
            false
        }
    }
}

/// Typed row plus every reason it failed
#[derive(Debug, Clone)]
pub struct Validation {
    pub typed: TypedRow,
    pub reasons: Vec<Reason>,
}

impl Validation {
    pub fn is_good(&self) -> bool {
        self.reasons.is_empty()
    }
}

/// Validator compiled from a dataset spec
#[derive(Debug, Clone)]
pub struct RowValidator {
    fields: Vec<FieldRule>,
    directives: Vec<Directive>,
}

impl RowValidator {
    pub fn new(spec: &DatasetSpec) -> Self {
        debug!(dataset = %spec.name, "RowValidator::new: called");
        let mut directives = Vec::new();
        let mut covered: Vec<&str> = Vec::new();

        for rule in spec.fields.iter().filter(|f| f.required) {
            directives.push(Directive::Required(rule.field.clone()));
            covered.push(&rule.field);
        }
        for field in &spec.required {
            if !covered.contains(&field.as_str()) {
                directives.push(Directive::Required(field.clone()));
                covered.push(field);
            }
        }
        directives.extend(spec.ranges.iter().cloned().map(Directive::Range));
        directives.extend(spec.allowed.iter().cloned().map(Directive::Allowed));
        directives.extend(spec.cross.iter().cloned().map(Directive::Cross));

        debug!(directives = directives.len(), "RowValidator::new: complete");
        Self {
            fields: spec.fields.clone(),
            directives,
        }
    }

    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    /// Cast every field of `raw`; this is the only RawRow -> TypedRow path
    pub fn cast_row(&self, raw: &RawRow) -> TypedRow {
        let mut typed = TypedRow::new();
        for rule in &self.fields {
            typed.insert(rule.field.clone(), cast(rule.cast, raw.get(&rule.source)));
        }
        typed
    }

    pub fn validate(&self, raw: &RawRow) -> Validation {
        let typed = self.cast_row(raw);
        let reasons = self.directives.iter().flat_map(|d| d.evaluate(&typed)).collect();
        Validation { typed, reasons }
    }
}

/// One-shot validation for callers that do not keep a validator around
pub fn validate(raw: &RawRow, spec: &DatasetSpec) -> Validation {
    RowValidator::new(spec).validate(raw)
}
