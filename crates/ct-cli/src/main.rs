//! CSV Transfer CLI
//!
//! Command-line tool for merging CSV sources that share key columns.

mod logging;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use ct_core::{
    load_config, merge_sources, read_rows, write_json, write_table, CollectingSink, ConfigFile,
    CsvUnmatchedSink, LoadedConfig, MergeOutcome, RunReport, UnmatchedSink, WriteMode,
};
use logging::{init_logging, LogConfig, LogFormat};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "csv-transfer")]
#[command(about = "Merge CSV sources by shared key columns", long_about = None)]
#[command(version)]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Less log output
    #[arg(short, long, action = ArgAction::Count, global = true)]
    quiet: u8,

    /// Log format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge every source in a config and write the output
    Run {
        /// Path to the merge config (TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Only the first source may add rows that match nothing
        #[arg(long)]
        strict: bool,

        /// Replace an existing output file without asking
        #[arg(long)]
        force: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,

        /// Also write a JSON run report here
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Load and validate a config without merging
    Check {
        /// Path to the merge config (TOML)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Parse and display a single CSV file
    Parse {
        /// Path to CSV file
        #[arg(short, long)]
        file: PathBuf,

        /// Record holding the column names
        #[arg(long, default_value_t = 0)]
        header_row: usize,

        /// Records to skip (comma-separated)
        #[arg(long, value_delimiter = ',')]
        ignore: Vec<usize>,
    },

    /// Create a config template
    Init {
        /// Output path for the config file
        #[arg(short, long)]
        output: PathBuf,

        /// Sources to include (name=path)
        #[arg(short, long, value_parser = parse_source_arg)]
        source: Vec<(String, String)>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_verbosity(cli.verbose, cli.quiet)
        .with_format(cli.log_format)
        .with_ansi(io::stderr().is_terminal());
    init_logging(&log_config);

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> ct_core::Result<()> {
    match command {
        Commands::Run {
            config,
            strict,
            force,
            format,
            report,
        } => {
            let options = RunOptions {
                strict,
                force,
                format,
                report: report.as_deref(),
            };
            cmd_run(&config, &options, &mut io::stdin().lock(), &mut io::stdout())
        }
        Commands::Check { config } => cmd_check(&config),
        Commands::Parse {
            file,
            header_row,
            ignore,
        } => cmd_parse(&file, header_row, &ignore),
        Commands::Init { output, source } => cmd_init(&output, &source),
    }
}

struct RunOptions<'a> {
    strict: bool,
    force: bool,
    format: OutputFormat,
    report: Option<&'a Path>,
}

/// Merge and write. The overwrite prompt reads from `input`; everything
/// meant for the user goes to `out`.
fn cmd_run<R: BufRead, W: Write>(
    config_path: &Path,
    options: &RunOptions<'_>,
    input: &mut R,
    out: &mut W,
) -> ct_core::Result<()> {
    let mut config = load_config(config_path)?;
    if options.strict {
        config.plan.strict = true;
    }

    // Ask before anything is written, including unmatched output
    let output = config.output.file.clone();
    let mode = if !output.exists() {
        WriteMode::CreateNew
    } else if options.force || confirm_overwrite(&output, input, out)? {
        WriteMode::Overwrite
    } else {
        writeln!(out, "Exiting")?;
        return Ok(());
    };

    let mut sink: Box<dyn UnmatchedSink> = match &config.output.unmatched_file {
        Some(path) => Box::new(CsvUnmatchedSink::new(path, config.output.dialect)),
        None => Box::new(CollectingSink::new()),
    };

    let outcome = merge_sources(&config.plan, sink.as_mut())?;

    let written = match options.format {
        OutputFormat::Csv => write_table(&output, &outcome.table, config.output.dialect, mode)?,
        OutputFormat::Json => {
            write_json(&output, &outcome.table, mode)?;
            outcome.table.row_count()
        }
    };
    info!(path = %output.display(), rows = written, "wrote merged output");

    print_summary(&config, &outcome, out)?;

    if let Some(path) = options.report {
        RunReport::new(&config, &outcome).save(path)?;
        writeln!(out, "Report written to {}", path.display())?;
    }

    Ok(())
}

/// Only "y" or "yes" (any case) accepts
fn confirm_overwrite<R: BufRead, W: Write>(path: &Path, input: &mut R, out: &mut W) -> ct_core::Result<bool> {
    write!(out, "{} already exists. Overwrite it (y/N)? ", path.display())?;
    out.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    let answer = answer.trim().to_lowercase();
    debug!(answer = %answer, "overwrite prompt");

    Ok(answer == "y" || answer == "yes")
}

fn print_summary<W: Write>(config: &LoadedConfig, outcome: &MergeOutcome, out: &mut W) -> io::Result<()> {
    writeln!(
        out,
        "Merged {} sources into {} rows and {} columns ({} with source rules broken)",
        outcome.stats.len(),
        outcome.table.row_count(),
        outcome.table.column_count(),
        outcome.flagged_rows
    )?;
    writeln!(out)?;

    for stats in &outcome.stats {
        writeln!(
            out,
            "  {}: {} read, {} appended, {} matched, {} rejected",
            stats.source,
            stats.rows_read,
            stats.appended,
            stats.matched,
            stats.rejected()
        )?;
    }
    writeln!(out)?;

    writeln!(out, "Output written to {}", config.output.file.display())?;
    match &config.output.unmatched_file {
        Some(path) => writeln!(out, "Unmatched rows written to {}", path.display())?,
        None if outcome.rejected() > 0 => writeln!(
            out,
            "{} rows rejected (set output.unmatched_file_name to keep them)",
            outcome.rejected()
        )?,
        None => {}
    }
    Ok(())
}

fn cmd_check(config_path: &Path) -> ct_core::Result<()> {
    let config = load_config(config_path)?;

    println!("Config: {}", config_path.display());
    println!("Strict: {}", config.plan.strict);
    println!("Output: {} ({})", config.output.file.display(), config.output.dialect);
    if let Some(path) = &config.output.unmatched_file {
        println!("Unmatched: {}", path.display());
    }
    println!();

    println!("Output columns:");
    for header in config.plan.output_headers() {
        println!("  {}", header);
    }
    println!();

    println!("Sources ({}):", config.plan.sources.len());
    for source in &config.plan.sources {
        let key = source.match_key();
        let key = if key.is_empty() {
            "(none)".to_string()
        } else {
            key.join(", ")
        };
        println!("  {} ({} rows) matched by: {}", source.name, source.rows.len(), key);
        println!("    {}", source.path.display());
    }
    println!();
    println!("Config is valid");

    Ok(())
}

fn cmd_parse(file: &Path, header_row: usize, ignored: &[usize]) -> ct_core::Result<()> {
    let table = read_rows(file, header_row, ignored)?;

    println!("File: {}", file.display());
    println!("Columns: {}", table.column_count());
    println!("Rows: {}", table.row_count());
    println!();

    println!("{}", table.headers.join("\t"));
    println!("{}", "-".repeat(table.headers.len() * 12));

    // Print first 10 rows
    for row in table.rows.iter().take(10) {
        let values: Vec<&str> = table.headers.iter().map(|h| row.value_or_empty(h)).collect();
        println!("{}", values.join("\t"));
    }

    if table.row_count() > 10 {
        println!("... ({} more rows)", table.row_count() - 10);
    }

    Ok(())
}

fn cmd_init(output: &Path, sources: &[(String, String)]) -> ct_core::Result<()> {
    let template = ConfigFile::template(sources);
    template.save(output)?;

    println!("Created config template: {}", output.display());
    println!();
    println!("Edit match_by and target_columns for each source, then run:");
    println!("  csv-transfer check --config {}", output.display());

    Ok(())
}

fn parse_source_arg(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, path)) if !name.trim().is_empty() && !path.trim().is_empty() => {
            Ok((name.trim().to_string(), path.trim().to_string()))
        }
        _ => Err(format!("expected name=path, got '{}'", s)),
    }
}
