//! Command-line front-end.
//!
//! Reads the desired schema from a file and the current schema from a
//! dump file (or treats it as empty), prints the migration script, and
//! implements the presentation flags: `--dry-run`, `--skip-drop` and
//! `--export`. Database connectivity is deliberately not here: the
//! current schema arrives as text, and the printed script is applied by
//! whatever owns the connection.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use pgdelta::{Schema, export_schema, generate_migration};

/// Idempotent schema migrations for PostgreSQL.
#[derive(Parser, Debug)]
#[command(name = "pgdelta", version, about)]
struct Cli {
    /// Desired schema DDL file.
    #[arg(required_unless_present = "export")]
    desired: Option<PathBuf>,

    /// Current schema dump; an empty schema when omitted.
    #[arg(long)]
    current: Option<PathBuf>,

    /// Print the script with a dry-run header instead of the apply header.
    #[arg(long)]
    dry_run: bool,

    /// Comment out DROP statements instead of emitting them.
    #[arg(long)]
    skip_drop: bool,

    /// Dump the current schema in canonical order and exit.
    #[arg(long)]
    export: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("pgdelta: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let current_sql = match &cli.current {
        Some(path) => std::fs::read_to_string(path)?,
        None => String::new(),
    };

    if cli.export {
        let schema = Schema::from_sql(&current_sql)?;
        print!("{}", export_schema(&schema));
        return Ok(());
    }

    let Some(desired) = cli.desired.as_ref() else {
        return Err("a desired schema file is required".into());
    };
    let desired_sql = std::fs::read_to_string(desired)?;

    let mut statements = generate_migration(&current_sql, &desired_sql)?;
    debug!(count = statements.len(), "generated migration statements");

    if cli.skip_drop {
        statements = statements.into_iter().map(skip_drop).collect();
    }

    if statements.is_empty() {
        println!("-- Nothing is modified --");
        return Ok(());
    }

    let header = if cli.dry_run { "-- dry run --" } else { "-- Apply --" };
    println!("{header}");
    for statement in &statements {
        println!("{statement}");
    }
    Ok(())
}

/// Rewrite a leading `DROP` token into a comment marker.
fn skip_drop(statement: String) -> String {
    if statement.starts_with("DROP") {
        format!("-- Skipped: {statement}")
    } else {
        statement
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_drop_rewrites_leading_drop() {
        assert_eq!(
            skip_drop("DROP TABLE \"public\".\"bigdata\";".to_string()),
            "-- Skipped: DROP TABLE \"public\".\"bigdata\";"
        );
    }

    #[test]
    fn test_skip_drop_leaves_other_statements() {
        let statement = "ALTER TABLE \"public\".\"users\" DROP COLUMN \"id\";".to_string();
        assert_eq!(skip_drop(statement.clone()), statement);
    }
}
