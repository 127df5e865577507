//! Transform runner
//!
//! One pass over a staging table: scan, cast, validate, then promote good rows
//! and record rejects. Configuration is checked before anything is written.

use std::fmt;

use tracing::{debug, info};

use crate::DEFAULT_BATCH_SIZE;
use crate::error::Result;
use crate::promote::{PromotionPolicy, Promoter};
use crate::reject::{RejectRecorder, clear_rejects, ensure_rejects_table};
use crate::session::Session;
use crate::spec::DatasetSpec;
use crate::stage::StagePager;
use crate::validate::RowValidator;

/// Knobs for a single transform pass
#[derive(Debug, Clone)]
pub struct TransformOptions {
    /// Label stored with every reject
    pub source_file: Option<String>,
    pub policy: PromotionPolicy,
    /// Remove this dataset's earlier rejects before the pass
    pub clear_rejects: bool,
    /// Rows per destination batch, also the staging page size
    pub batch_size: usize,
    pub reject_batch_size: usize,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            source_file: None,
            policy: PromotionPolicy::Incremental,
            clear_rejects: false,
            batch_size: DEFAULT_BATCH_SIZE,
            reject_batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl TransformOptions {
    pub fn source_file(mut self, label: impl Into<String>) -> Self {
        self.source_file = Some(label.into());
        self
    }

    pub fn policy(mut self, policy: PromotionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn clear_rejects(mut self, clear: bool) -> Self {
        self.clear_rejects = clear;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn reject_batch_size(mut self, size: usize) -> Self {
        self.reject_batch_size = size;
        self
    }
}

/// Counts reported at the end of a pass
///
/// `accepted` counts rows that passed validation; `inserted` counts rows that
/// actually landed in the destination, which is lower when an incremental
/// pass meets keys that already exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub scanned: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub inserted: u64,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} good={} bad={} inserted={}",
            self.scanned, self.accepted, self.rejected, self.inserted
        )
    }
}

/// Run one transform pass for `spec`
pub fn transform_dataset(session: &mut Session, spec: &DatasetSpec, options: &TransformOptions) -> Result<RunSummary> {
    debug!(dataset = %spec.name, ?options, "transform_dataset: called");
    spec.check()?;

    let page_size = if options.batch_size == 0 { DEFAULT_BATCH_SIZE } else { options.batch_size };
    let mut pager = StagePager::new(session, &spec.stg_table, &spec.source_columns(), page_size)?;
    let validator = RowValidator::new(spec);

    ensure_rejects_table(session)?;
    let mut promoter = Promoter::begin(session, spec, options.policy, page_size)?;
    if options.clear_rejects {
        clear_rejects(session, &spec.name)?;
    }
    let mut recorder = RejectRecorder::new(&spec.name, options.source_file.clone(), options.reject_batch_size);

    let mut summary = RunSummary::default();
    loop {
        let page = pager.next_page(session)?;
        if page.is_empty() {
            break;
        }
        for raw in page {
            summary.scanned += 1;
            let validation = validator.validate(&raw);
            if validation.is_good() {
                summary.accepted += 1;
                promoter.push(session, validation.typed)?;
            } else {
                summary.rejected += 1;
                recorder.record(session, &raw, summary.scanned, &validation.reasons)?;
            }
        }
    }

    summary.inserted = promoter.finish(session)?.inserted;
    recorder.finish(session)?;

    info!(
        dataset = %spec.name,
        scanned = summary.scanned,
        accepted = summary.accepted,
        rejected = summary.rejected,
        inserted = summary.inserted,
        "Transform complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reject::{count_rejects, list_rejects};
    use crate::schema::ensure_table;
    use crate::spec::{CastKind, FieldRule};

    fn spec() -> DatasetSpec {
        DatasetSpec::new("people", "main.stage_people", "main.people_typed")
            .field(FieldRule::new("person_id", "person_id", CastKind::Integer).required())
            .field(FieldRule::new("full_name", "full_name", CastKind::Text).required())
            .field(FieldRule::new("created_at", "created_at", CastKind::Date))
    }

    fn staged(rows: &[(&str, &str, &str)]) -> Session {
        let mut session = Session::open_in_memory().unwrap();
        session
            .conn()
            .execute_batch("CREATE TABLE stage_people (person_id TEXT, full_name TEXT, created_at TEXT)")
            .unwrap();
        for (id, name, created) in rows {
            session
                .conn()
                .execute("INSERT INTO stage_people VALUES (?1, ?2, ?3)", [id, name, created])
                .unwrap();
        }
        ensure_table(&mut session, &spec(), false, None).unwrap();
        session
    }

    #[test]
    fn test_good_and_bad_rows_split() {
        let mut session = staged(&[
            ("12", "  Jane Doe ", "2016-01-01 00:00:00"),
            ("abc", "John", ""),
            ("13", "", "2016-01-02"),
        ]);

        let options = TransformOptions::default().source_file("people.csv").batch_size(2);
        let summary = transform_dataset(&mut session, &spec(), &options).unwrap();
        assert_eq!(
            summary,
            RunSummary {
                scanned: 3,
                accepted: 1,
                rejected: 2,
                inserted: 1
            }
        );

        let rejects = list_rejects(&session, "people", None).unwrap();
        assert_eq!(rejects.len(), 2);
        assert_eq!(rejects[0].row_num, 3);
        assert_eq!(rejects[0].reject_reasons, "required:full_name");
        assert_eq!(rejects[1].row_num, 2);
        assert_eq!(rejects[1].reject_reasons, "required:person_id");
        assert_eq!(rejects[1].raw["person_id"], "abc");
        assert_eq!(rejects[1].source_file.as_deref(), Some("people.csv"));
    }

    #[test]
    fn test_clear_rejects_before_pass() {
        let mut session = staged(&[("x", "a", "")]);
        let options = TransformOptions::default();

        transform_dataset(&mut session, &spec(), &options).unwrap();
        transform_dataset(&mut session, &spec(), &options).unwrap();
        assert_eq!(count_rejects(&session, "people").unwrap(), 2);

        transform_dataset(&mut session, &spec(), &options.clone().clear_rejects(true)).unwrap();
        assert_eq!(count_rejects(&session, "people").unwrap(), 1);
    }

    #[test]
    fn test_missing_staging_column_fails_before_writes() {
        let mut session = staged(&[("1", "a", "")]);
        let spec = spec().field(FieldRule::new("age", "age", CastKind::Integer));

        let err = transform_dataset(&mut session, &spec, &TransformOptions::default()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_summary_display() {
        let summary = RunSummary {
            scanned: 3,
            accepted: 2,
            rejected: 1,
            inserted: 2,
        };
        assert_eq!(summary.to_string(), "total=3 good=2 bad=1 inserted=2");
    }
}
