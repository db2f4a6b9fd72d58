//! Tabular CLI
//!
//! Command-line tool for validating, diffing and merging tab-separated
//! record files (manifests, curation status tables).

use clap::{Args, Parser, Subcommand, ValueEnum};
use tabular_core::{
    CellValue, CurationStatus, Manifest, RecordBatch, SaveOptions, Schema, Table,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "tabular")]
#[command(about = "Validate, diff and merge tabular record files", long_about = None)]
#[command(version)]
struct Cli {
    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Which schema a file follows
#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Manifest,
    CurationStatus,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a table
    Show {
        #[arg(short, long, value_enum)]
        kind: Kind,

        /// Path to the tab-separated file
        #[arg(short, long)]
        file: PathBuf,

        /// Maximum number of rows to display
        #[arg(short, long)]
        limit: Option<usize>,

        /// Show the file as-is, without schema validation
        #[arg(long)]
        raw: bool,
    },

    /// Validate a file against its schema and index key
    Validate {
        #[arg(short, long, value_enum)]
        kind: Kind,

        #[arg(short, long)]
        file: PathBuf,
    },

    /// List rows sharing the same key
    Duplicates {
        #[arg(short, long, value_enum)]
        kind: Kind,

        #[arg(short, long)]
        file: PathBuf,

        /// Columns to compare (comma-separated, default: index key)
        #[arg(short, long)]
        columns: Option<String>,
    },

    /// Rows of LEFT whose key does not appear in RIGHT
    Diff {
        #[arg(short, long, value_enum)]
        kind: Kind,

        #[arg(long)]
        left: PathBuf,

        #[arg(long)]
        right: PathBuf,

        /// Columns to compare (comma-separated, default: index key)
        #[arg(short, long)]
        columns: Option<String>,
    },

    /// Add or update records from a JSON batch file, then save
    Upsert {
        #[arg(short, long, value_enum)]
        kind: Kind,

        /// File to update (created if missing)
        #[arg(short, long)]
        file: PathBuf,

        /// JSON batch of records
        #[arg(short, long)]
        records: PathBuf,

        /// Skip schema validation of the incoming records
        #[arg(long)]
        no_validate: bool,

        #[command(flatten)]
        save: SaveArgs,
    },

    /// Concatenate two files into OUTPUT
    Concat {
        #[arg(short, long, value_enum)]
        kind: Kind,

        #[arg(long)]
        left: PathBuf,

        #[arg(long)]
        right: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Skip re-validation of the union
        #[arg(long)]
        no_validate: bool,

        #[command(flatten)]
        save: SaveArgs,
    },

    /// Rewrite a file in sorted order
    Sort {
        #[arg(short, long, value_enum)]
        kind: Kind,

        #[arg(short, long)]
        file: PathBuf,

        /// Columns to sort on (comma-separated, default: index key)
        #[arg(short, long)]
        columns: Option<String>,

        /// Sort in descending order
        #[arg(long)]
        descending: bool,

        #[command(flatten)]
        save: SaveArgs,
    },

    /// Create a record batch template
    CreateBatch {
        #[arg(short, long, value_enum)]
        kind: Kind,

        /// Output path for the batch file
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Flags controlling how files are written
#[derive(Args)]
struct SaveArgs {
    /// JSON file with save options
    #[arg(long)]
    config: Option<PathBuf>,

    /// Backup directory name, next to the target file
    #[arg(long)]
    backup_dir: Option<String>,

    /// Report what would be written without touching any file
    #[arg(long)]
    dry_run: bool,

    /// Link the target to its backup with an absolute path
    #[arg(long)]
    absolute_links: bool,

    /// Fail if the existing file cannot be read for comparison
    #[arg(long)]
    strict: bool,
}

impl SaveArgs {
    fn options(&self) -> tabular_core::Result<SaveOptions> {
        let mut options = match &self.config {
            Some(path) => SaveOptions::load(path)?,
            None => SaveOptions::default(),
        };
        if self.backup_dir.is_some() {
            options.backup_dir = self.backup_dir.clone();
        }
        options.dry_run |= self.dry_run;
        options.use_relative_path &= !self.absolute_links;
        options.strict_existing_check |= self.strict;
        Ok(options)
    }
}

/// Call a generic command function with the schema selected by `kind`
macro_rules! with_schema {
    ($kind:expr, $func:ident($($arg:expr),* $(,)?)) => {
        match $kind {
            Kind::Manifest => $func::<Manifest>($($arg),*),
            Kind::CurationStatus => $func::<CurationStatus>($($arg),*),
        }
    };
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .format_timestamp(None)
        .init();

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> tabular_core::Result<()> {
    match command {
        Commands::Show {
            kind,
            file,
            limit,
            raw,
        } => with_schema!(kind, cmd_show(&file, limit, raw)),
        Commands::Validate { kind, file } => with_schema!(kind, cmd_validate(&file)),
        Commands::Duplicates {
            kind,
            file,
            columns,
        } => with_schema!(kind, cmd_duplicates(&file, columns.as_deref())),
        Commands::Diff {
            kind,
            left,
            right,
            columns,
        } => with_schema!(kind, cmd_diff(&left, &right, columns.as_deref())),
        Commands::Upsert {
            kind,
            file,
            records,
            no_validate,
            save,
        } => with_schema!(kind, cmd_upsert(&file, &records, !no_validate, &save.options()?)),
        Commands::Concat {
            kind,
            left,
            right,
            output,
            no_validate,
            save,
        } => with_schema!(
            kind,
            cmd_concat(&left, &right, &output, !no_validate, &save.options()?)
        ),
        Commands::Sort {
            kind,
            file,
            columns,
            descending,
            save,
        } => with_schema!(
            kind,
            cmd_sort(&file, columns.as_deref(), !descending, &save.options()?)
        ),
        Commands::CreateBatch { kind, output } => with_schema!(kind, cmd_create_batch(&output)),
    }
}

fn split_columns(columns: Option<&str>) -> Option<Vec<&str>> {
    columns.map(|c| c.split(',').map(str::trim).collect())
}

fn print_table<S: Schema>(table: &Table<S>, limit: Option<usize>) {
    let header = table.columns().join("\t");
    println!("{}", header);
    println!("{}", "-".repeat(table.columns().len() * 12));

    let row_limit = limit.unwrap_or(table.len());
    for record in table.records().take(row_limit) {
        let values: Vec<String> = record.iter().map(|(_, v)| v.to_string_value()).collect();
        println!("{}", values.join("\t"));
    }

    if table.len() > row_limit {
        println!("... ({} more rows)", table.len() - row_limit);
    }
}

fn cmd_show<S: Schema>(file: &Path, limit: Option<usize>, raw: bool) -> tabular_core::Result<()> {
    let table = Table::<S>::load(file, !raw)?;

    println!("File: {}", file.display());
    println!("Columns: {}", table.columns().len());
    println!("Rows: {}", table.len());
    println!();
    print_table(&table, limit);

    Ok(())
}

fn cmd_validate<S: Schema>(file: &Path) -> tabular_core::Result<()> {
    let table = Table::<S>::load(file, true)?;
    println!(
        "{} is a valid {} file ({} rows, index key {:?})",
        file.display(),
        table.name(),
        table.len(),
        S::INDEX_COLS
    );
    Ok(())
}

fn cmd_duplicates<S: Schema>(file: &Path, columns: Option<&str>) -> tabular_core::Result<()> {
    let table = Table::<S>::load(file, false)?;
    let cols = split_columns(columns);
    let duplicates = table.find_duplicates(cols.as_deref())?;

    if duplicates.is_empty() {
        println!("No duplicate records in {}", file.display());
    } else {
        println!("{} duplicate records in {}:", duplicates.len(), file.display());
        println!();
        print_table(&duplicates, None);
    }
    Ok(())
}

fn cmd_diff<S: Schema>(left: &Path, right: &Path, columns: Option<&str>) -> tabular_core::Result<()> {
    let left_table = Table::<S>::load(left, true)?;
    let right_table = Table::<S>::load(right, true)?;
    let cols = split_columns(columns);
    let diff = left_table.get_diff(&right_table, cols.as_deref())?;

    println!(
        "{} of {} rows in {} are not in {}",
        diff.len(),
        left_table.len(),
        left.display(),
        right.display()
    );
    if !diff.is_empty() {
        println!();
        print_table(&diff, None);
    }
    Ok(())
}

fn report_save(target: &Path, written: Option<PathBuf>, options: &SaveOptions) {
    match written {
        Some(path) if options.dry_run => {
            println!("[dry run] would write {} via {}", target.display(), path.display())
        }
        Some(path) => println!("Saved {} (backup: {})", target.display(), path.display()),
        None => println!("{} is unchanged, nothing written", target.display()),
    }
}

fn cmd_upsert<S: Schema>(
    file: &Path,
    records: &Path,
    validate: bool,
    options: &SaveOptions,
) -> tabular_core::Result<()> {
    let batch = RecordBatch::load(records)?;
    println!("Loaded {} records from {}", batch.records.len(), records.display());

    let mut table = if file.exists() {
        Table::<S>::load(file, true)?
    } else {
        Table::<S>::new()
    };
    let before = table.len();

    table.add_or_update_records(batch.records, validate)?;
    println!(
        "{} rows added, {} rows in total",
        table.len() - before,
        table.len()
    );

    let written = table.save_with_backup(file, options)?;
    report_save(file, written, options);
    Ok(())
}

fn cmd_concat<S: Schema>(
    left: &Path,
    right: &Path,
    output: &Path,
    validate: bool,
    options: &SaveOptions,
) -> tabular_core::Result<()> {
    let left_table = Table::<S>::load(left, validate)?;
    let right_table = Table::<S>::load(right, validate)?;
    let combined = left_table.concatenate(&right_table, validate)?;
    println!(
        "Concatenated {} + {} rows",
        left_table.len(),
        right_table.len()
    );

    let written = combined.save_with_backup(output, options)?;
    report_save(output, written, options);
    Ok(())
}

fn cmd_sort<S: Schema>(
    file: &Path,
    columns: Option<&str>,
    ascending: bool,
    options: &SaveOptions,
) -> tabular_core::Result<()> {
    let table = Table::<S>::load(file, true)?;
    let cols = split_columns(columns).unwrap_or_else(|| S::INDEX_COLS.to_vec());
    let sorted = table.sort_by(&cols, ascending)?;

    // keep the requested order instead of the canonical one
    let options = SaveOptions {
        sort: false,
        order_sensitive: true,
        ..options.clone()
    };
    let written = sorted.save_with_backup(file, &options)?;
    report_save(file, written, &options);
    Ok(())
}

fn cmd_create_batch<S: Schema>(output: &Path) -> tabular_core::Result<()> {
    let mut batch = RecordBatch::new(S::TABLE_NAME);
    let template = S::FIELDS
        .iter()
        .map(|field| {
            let placeholder = if field.is_required() {
                CellValue::from(field.name.to_uppercase())
            } else {
                CellValue::Empty
            };
            (field.name.to_string(), placeholder)
        })
        .collect();
    batch.add_record(template);

    batch.save(output)?;
    println!("Created batch file: {}", output.display());
    println!("Fields: {}", S::field_names().join(", "));
    println!();
    println!("Edit the file to add your records, then run:");
    println!(
        "  tabular upsert --kind <kind> --file <file.tsv> --records {}",
        output.display()
    );

    Ok(())
}
