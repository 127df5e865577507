//! StageOps - staging, validation and promotion CLI
//!
//! CLI entry point. Logs go to stderr, results to stdout.

use std::path::Path;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info};

use datagate::{PromotionPolicy, QualifiedName, Session, TransformOptions};
use stageops::cli::{Cli, Command};
use stageops::config::Config;
use stageops::datasets::load_registry;
use stageops::loader::{LoadOptions, load_csv};
use stageops::migrations::apply_migrations;
use stageops::people::PeopleRepo;
use stageops::rejects_export;

fn parse_level(s: &str) -> tracing::Level {
    match s.to_uppercase().as_str() {
        "TRACE" => tracing::Level::TRACE,
        "DEBUG" => tracing::Level::DEBUG,
        "INFO" => tracing::Level::INFO,
        "WARN" | "WARNING" => tracing::Level::WARN,
        "ERROR" => tracing::Level::ERROR,
        _ => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
            tracing::Level::INFO
        }
    }
}

fn setup_logging(cli_log_level: Option<&str>, verbose: bool, config_log_level: Option<&str>) -> Result<()> {
    // Priority: --log-level > --verbose > config file > INFO
    let level = match (cli_log_level, verbose, config_log_level) {
        (Some(s), _, _) => parse_level(s),
        (None, true, _) => tracing::Level::DEBUG,
        (None, false, Some(s)) => parse_level(s),
        (None, false, None) => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to install subscriber: {}", e))?;

    debug!("Logging initialized (level: {:?})", level);
    Ok(())
}

fn open_session(config: &Config) -> Result<Session> {
    Session::open(&config.database).context(format!("Failed to open database {}", config.database.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), cli.verbose, config_log_level.as_deref())
        .context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref())
        .context("Failed to load configuration")?
        .with_database(cli.database.clone());

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Ping => println!("{} pong", "✓".green()),
        Command::ShowConfig => print!("{}", config.to_yaml()?),
        Command::DbPing => cmd_db_ping(&config)?,
        Command::Migrate { dir } => cmd_migrate(&config, dir.as_deref())?,
        Command::CountTable { table } => cmd_count_table(&config, &table)?,
        Command::TruncateTable { table, require_confirm } => {
            let mut session = open_session(&config)?;
            let removed = session.truncate_table(&table, require_confirm.as_deref())?;
            println!("{} truncated {} removed={}", "✓".green(), table.cyan(), removed);
        }
        Command::LoadCsv {
            csv,
            table,
            batch_size,
            drop_create,
            truncate,
            delimiter,
            quotechar,
            skiprows,
            match_mode,
            require_confirm,
        } => {
            let options = LoadOptions {
                batch_size: batch_size.unwrap_or(config.load.batch_size),
                drop_create,
                truncate,
                delimiter: single_byte("delimiter", delimiter)?,
                quote: single_byte("quotechar", quotechar)?,
                skip_rows: skiprows,
                match_mode,
                confirm: require_confirm,
            };
            let mut session = open_session(&config)?;
            let report = load_csv(&mut session, &csv, &table, &options)?;
            println!(
                "{} loaded {} rows={} columns={}",
                "✓".green(),
                report.table.to_string().cyan(),
                report.rows,
                report.columns
            );
        }
        Command::ClearStage { table } => {
            let name = QualifiedName::parse(&table)?;
            let mut session = open_session(&config)?;
            let removed = session.clear_table(&name)?;
            println!("{} cleared {} removed={}", "✓".green(), name.to_string().cyan(), removed);
        }
        Command::Datasets => cmd_datasets(&config)?,
        Command::EnsureFinal {
            dataset,
            drop_create,
            require_confirm,
        } => cmd_ensure_final(&config, &dataset, drop_create, require_confirm.as_deref())?,
        Command::Transform {
            dataset,
            source_file,
            truncate_final,
            truncate_rejects,
            batch_size,
        } => {
            let policy = if truncate_final {
                PromotionPolicy::FullReload
            } else {
                PromotionPolicy::Incremental
            };
            let mut options = TransformOptions::default()
                .policy(policy)
                .clear_rejects(truncate_rejects)
                .batch_size(batch_size.unwrap_or(config.transform.batch_size))
                .reject_batch_size(config.transform.reject_batch_size);
            if let Some(label) = source_file {
                options = options.source_file(label);
            }
            cmd_transform(&config, &dataset, &options)?;
        }
        Command::RejectsCount { dataset } => {
            let session = open_session(&config)?;
            let count = datagate::count_rejects(&session, &dataset)?;
            println!("{} rejects {} count={}", "✓".green(), dataset.cyan(), count);
        }
        Command::RejectsShow { dataset, top } => cmd_rejects_show(&config, &dataset, top)?,
        Command::RejectsExport { dataset, out, top } => {
            let session = open_session(&config)?;
            let rows = rejects_export::export_jsonl(&session, &dataset, &out, top)?;
            println!("{} exported {} rejects to {}", "✓".green(), rows, out.display());
        }
        Command::RejectsExportCsv { dataset, out, top } => {
            let session = open_session(&config)?;
            let rows = rejects_export::export_csv(&session, &dataset, &out, top)?;
            println!("{} exported {} rejects to {}", "✓".green(), rows, out.display());
        }
        Command::AddPerson { name } => {
            let mut session = open_session(&config)?;
            let id = PeopleRepo::new(&mut session)?.add(&name)?;
            println!("{} person_id={}", "✓".green(), id);
        }
        Command::ListPeople { top } => {
            let mut session = open_session(&config)?;
            let people = PeopleRepo::new(&mut session)?.list(top)?;
            print_people(&people);
        }
        Command::FindPerson { like, top } => {
            let mut session = open_session(&config)?;
            let people = PeopleRepo::new(&mut session)?.find(&like, top)?;
            print_people(&people);
        }
        Command::GetPerson { id } => {
            let mut session = open_session(&config)?;
            match PeopleRepo::new(&mut session)?.get(id)? {
                Some(person) => print_people(&[person]),
                None => eyre::bail!("Person not found: {}", id),
            }
        }
        Command::UpdatePerson { id, name } => {
            let mut session = open_session(&config)?;
            let updated = PeopleRepo::new(&mut session)?.update_name(id, &name)?;
            println!("{} updated={}", "✓".green(), updated);
        }
        Command::DeletePerson { id } => {
            let mut session = open_session(&config)?;
            let deleted = PeopleRepo::new(&mut session)?.delete(id)?;
            println!("{} deleted={}", "✓".green(), deleted);
        }
        Command::ExportPeople { out, top } => {
            let mut session = open_session(&config)?;
            let rows = PeopleRepo::new(&mut session)?.export_csv(&out, top)?;
            println!("{} exported {} people to {}", "✓".green(), rows, out.display());
        }
        Command::ImportPeople { input } => {
            let mut session = open_session(&config)?;
            let stats = PeopleRepo::new(&mut session)?.import_csv(&input)?;
            println!(
                "{} read={} inserted={} skipped={}",
                "✓".green(),
                stats.read,
                stats.inserted,
                stats.skipped
            );
        }
    }

    Ok(())
}

fn single_byte(flag: &str, c: char) -> Result<u8> {
    if c.is_ascii() {
        Ok(c as u8)
    } else {
        eyre::bail!("--{} must be a single ASCII character, got '{}'", flag, c)
    }
}

fn cmd_db_ping(config: &Config) -> Result<()> {
    let session = open_session(config)?;
    let version = session.ping()?;
    println!("{} db ok (sqlite {}) {}", "✓".green(), version, config.database.display());
    Ok(())
}

fn cmd_migrate(config: &Config, dir: Option<&Path>) -> Result<()> {
    let dir = dir.unwrap_or(config.migrations.dir.as_path());
    let mut session = open_session(config)?;
    let applied = apply_migrations(&mut session, dir)?;
    for name in &applied {
        println!("  {}", name.dimmed());
    }
    println!("{} migrate applied={}", "✓".green(), applied.len());
    Ok(())
}

fn cmd_count_table(config: &Config, table: &str) -> Result<()> {
    let name = QualifiedName::parse(table)?;
    let session = open_session(config)?;
    if !session.table_exists(&name)? {
        eyre::bail!("Table does not exist: {}", name);
    }
    let count = session.count_rows(&name)?;
    println!("{} table {} count={}", "✓".green(), name.to_string().cyan(), count);
    Ok(())
}

fn cmd_datasets(config: &Config) -> Result<()> {
    let registry = load_registry(config)?;
    if registry.is_empty() {
        println!("No datasets registered");
        return Ok(());
    }
    for spec in registry.specs() {
        println!(
            "{} {} -> {} ({} fields, {} indexes)",
            spec.name.cyan(),
            spec.stg_table,
            spec.final_table,
            spec.fields.len(),
            spec.indexes.len()
        );
    }
    Ok(())
}

fn cmd_ensure_final(config: &Config, dataset: &str, drop_create: bool, confirm: Option<&str>) -> Result<()> {
    let registry = load_registry(config)?;
    let spec = registry.get(dataset)?;
    let mut session = open_session(config)?;
    let report = datagate::ensure_table(&mut session, spec, drop_create, confirm)?;
    println!(
        "{} final {} {}",
        "✓".green(),
        report.table.to_string().cyan(),
        report.outcome
    );
    for (name, outcome) in &report.indexes {
        println!("  index {} {}", name, outcome);
    }
    Ok(())
}

fn cmd_transform(config: &Config, dataset: &str, options: &TransformOptions) -> Result<()> {
    let registry = load_registry(config)?;
    let spec = registry.get(dataset)?;
    let mut session = open_session(config)?;
    let summary = datagate::transform_dataset(&mut session, spec, options)
        .context(format!("Transform of {} failed", dataset))?;
    info!(dataset, %summary, "transform finished");
    println!("{} transform {} {}", "✓".green(), dataset.cyan(), summary);
    Ok(())
}

fn cmd_rejects_show(config: &Config, dataset: &str, top: usize) -> Result<()> {
    let session = open_session(config)?;
    let rejects = datagate::list_rejects(&session, dataset, Some(top))?;
    if rejects.is_empty() {
        println!("No rejects for {}", dataset);
        return Ok(());
    }
    for reject in rejects {
        println!(
            "{} row={} {} {}",
            reject.reject_id.to_string().yellow(),
            reject.row_num,
            reject.reject_reasons.red(),
            serde_json::to_string(&reject.raw)?
        );
    }
    Ok(())
}

fn print_people(people: &[stageops::people::Person]) {
    if people.is_empty() {
        println!("No people found");
        return;
    }
    for person in people {
        println!(
            "{} {} {}",
            person.person_id.to_string().yellow(),
            person.full_name,
            person.created_at.as_deref().unwrap_or("").dimmed()
        );
    }
}
