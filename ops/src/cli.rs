//! CLI argument parsing for stageops

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::loader::MatchMode;

#[derive(Parser, Debug)]
#[command(name = "ops")]
#[command(author, version, about = "Stage, validate and promote tabular data in SQLite", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check the CLI is alive
    Ping,

    /// Print the effective configuration as YAML
    ShowConfig,

    /// Open the database and report the SQLite version
    DbPing,

    /// Apply pending SQL migrations
    Migrate {
        /// Migrations directory (default from config)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Count rows in a table
    CountTable {
        #[arg(long)]
        table: String,
    },

    /// Delete every row of a table
    TruncateTable {
        #[arg(long)]
        table: String,

        /// Must be exactly "TRUNCATE <schema.table>"
        #[arg(long = "require-confirm")]
        require_confirm: Option<String>,
    },

    /// Load a CSV file into an all-text staging table
    LoadCsv {
        #[arg(long)]
        csv: PathBuf,

        #[arg(long)]
        table: String,

        /// Rows per committed batch (default from config)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Drop and recreate the table from the CSV header
        #[arg(long)]
        drop_create: bool,

        /// Empty the existing table before loading
        #[arg(long, conflicts_with = "drop_create")]
        truncate: bool,

        #[arg(long, default_value = ",")]
        delimiter: char,

        #[arg(long, default_value = "\"")]
        quotechar: char,

        /// Rows to skip before the header
        #[arg(long, default_value = "0")]
        skiprows: usize,

        #[arg(long, value_enum, default_value = "strict")]
        match_mode: MatchMode,

        /// "DROP_CREATE <schema.table>" or "TRUNCATE <schema.table>"
        #[arg(long = "require-confirm")]
        require_confirm: Option<String>,
    },

    /// Empty a staging table
    ClearStage {
        #[arg(long)]
        table: String,
    },

    /// List registered datasets
    Datasets,

    /// Create the destination table and indexes of a dataset
    EnsureFinal {
        #[arg(long)]
        dataset: String,

        /// Drop and recreate the destination table
        #[arg(long)]
        drop_create: bool,

        /// Must be exactly "DROP_CREATE <schema.table>"
        #[arg(long = "require-confirm")]
        require_confirm: Option<String>,
    },

    /// Validate staged rows and promote the good ones
    Transform {
        #[arg(long)]
        dataset: String,

        /// Label stored with each reject
        #[arg(long)]
        source_file: Option<String>,

        /// Clear the destination before inserting (full reload)
        #[arg(long)]
        truncate_final: bool,

        /// Remove this dataset's earlier rejects first
        #[arg(long)]
        truncate_rejects: bool,

        /// Rows per batch (default from config)
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Count rejects of a dataset
    RejectsCount {
        #[arg(long)]
        dataset: String,
    },

    /// Show the newest rejects of a dataset
    RejectsShow {
        #[arg(long)]
        dataset: String,

        #[arg(long, default_value = "20")]
        top: usize,
    },

    /// Export rejects as JSON lines
    RejectsExport {
        #[arg(long)]
        dataset: String,

        #[arg(long)]
        out: PathBuf,

        #[arg(long)]
        top: Option<usize>,
    },

    /// Export rejects as CSV
    RejectsExportCsv {
        #[arg(long)]
        dataset: String,

        #[arg(long)]
        out: PathBuf,

        #[arg(long)]
        top: Option<usize>,
    },

    /// Add a person
    AddPerson {
        #[arg(long)]
        name: String,
    },

    /// List people, newest first
    ListPeople {
        #[arg(long, default_value = "20")]
        top: usize,
    },

    /// Find people whose name contains a substring
    FindPerson {
        #[arg(long)]
        like: String,

        #[arg(long, default_value = "20")]
        top: usize,
    },

    /// Show one person
    GetPerson {
        #[arg(long)]
        id: i64,
    },

    /// Rename a person
    UpdatePerson {
        #[arg(long)]
        id: i64,

        #[arg(long)]
        name: String,
    },

    /// Delete a person
    DeletePerson {
        #[arg(long)]
        id: i64,
    },

    /// Export people to CSV
    ExportPeople {
        #[arg(long)]
        out: PathBuf,

        #[arg(long)]
        top: Option<usize>,
    },

    /// Import people from a CSV with a full_name column
    ImportPeople {
        #[arg(long = "in")]
        input: PathBuf,
    },
}
