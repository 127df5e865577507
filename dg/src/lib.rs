//! DataGate - rule-driven validation and promotion of staged rows
//!
//! Staged rows arrive as untyped text. A [`DatasetSpec`] says how each column
//! is cast and which rules a row must satisfy; a transform pass then promotes
//! the good rows into a typed destination table and records every bad row,
//! with its reasons and original content, in a shared reject table.
//!
//! # Flow
//!
//! ```text
//! staging (text) -> cast -> validate -+-> good -> Promoter -> destination
//!                                     +-> bad  -> RejectRecorder -> dataset_rejects
//! ```
//!
//! # Example
//!
//! ```ignore
//! use datagate::{CastKind, DatasetSpec, FieldRule, Session, TransformOptions};
//!
//! let spec = DatasetSpec::new("people", "main.stage_people", "main.people_typed")
//!     .field(FieldRule::new("person_id", "person_id", CastKind::Integer).required())
//!     .field(FieldRule::new("full_name", "full_name", CastKind::Text).required());
//!
//! let mut session = Session::open("ops.db")?;
//! datagate::ensure_table(&mut session, &spec, false, None)?;
//! let summary = datagate::transform_dataset(&mut session, &spec, &TransformOptions::default())?;
//! println!("{}", summary);
//! ```

pub mod cast;
pub mod definition;
pub mod error;
pub mod ident;
pub mod loader;
pub mod promote;
pub mod reject;
pub mod row;
pub mod schema;
pub mod session;
pub mod spec;
pub mod stage;
pub mod transform;
pub mod validate;

pub use cast::cast;
pub use definition::{CompareOp, CrossDef, DatasetDef, FieldDef};
pub use error::{GateError, Result};
pub use ident::{QualifiedName, require_confirmation};
pub use loader::DatasetLoader;
pub use promote::{PromoteStats, Promoter, PromotionPolicy, promote};
pub use reject::{
    RejectRecord, RejectRecorder, StoredReject, clear_rejects, content_digest, count_rejects, ensure_rejects_table,
    list_rejects,
};
pub use row::{RawRow, TypedRow, Value};
pub use schema::{EnsureReport, IndexOutcome, TableOutcome, ensure_index, ensure_table, sql_type};
pub use session::Session;
pub use spec::{AllowedRule, CastKind, CrossRule, DatasetSpec, FieldRule, IndexSpec, RangeRule};
pub use transform::{RunSummary, TransformOptions, transform_dataset};
pub use validate::{Reason, RowValidator, Validation, validate};

/// Default rows per batch for promotion, rejects and staging pages
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Shared table holding rejected rows of every dataset
pub const REJECTS_TABLE: &str = "dataset_rejects";
