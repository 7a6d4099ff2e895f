// calcgrid CLI - headless spreadsheet operations
//
// Loads CSV data from stdin into a workbook (cells may contain formulas),
// then either evaluates one formula against it or prints the whole
// recomputed grid.

use std::io::{self, Read};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use calcgrid_engine::workbook::Workbook;

#[derive(Parser)]
#[command(name = "calcgrid")]
#[command(about = "Headless spreadsheet engine (CSV in, computed values out)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a spreadsheet formula against data read from stdin
    #[command(after_help = "\
Examples:
  cat sales.csv | calcgrid calc '=SUM(B1:B100)'
  echo '1,2,3' | calcgrid calc '=SUM(A1:C1)'
  cat data.csv | calcgrid calc '=AVERAGE(A1:A50)' --headers --json")]
    Calc {
        /// Formula to evaluate (must start with =)
        formula: String,

        /// CSV delimiter
        #[arg(long, short = 'd', default_value = ",")]
        delimiter: char,

        /// First row is headers (excluded from the data)
        #[arg(long)]
        headers: bool,

        /// Emit the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Recompute a CSV of raw cell inputs (formulas included) and print
    /// the computed grid as CSV
    #[command(after_help = "\
Example:
  printf '1,=A1*2\\n3,=A2*2\\n' | calcgrid recalc")]
    Recalc {
        /// CSV delimiter
        #[arg(long, short = 'd', default_value = ",")]
        delimiter: char,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Calc {
            formula,
            delimiter,
            headers,
            json,
        } => calc(&formula, delimiter, headers, json),
        Commands::Recalc { delimiter } => recalc(delimiter),
    }
}

/// Load stdin CSV into a fresh workbook. Returns the workbook plus the
/// populated grid dimensions.
fn load_stdin_csv(delimiter: char, headers: bool) -> Result<(Workbook, usize, usize)> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("reading stdin")?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(headers)
        .delimiter(delimiter as u8)
        .flexible(true)
        .from_reader(input.as_bytes());

    let mut cells = Vec::new();
    let mut rows = 0;
    let mut cols = 0;
    for (row, record) in reader.records().enumerate() {
        let record = record.context("parsing CSV")?;
        for (col, field) in record.iter().enumerate() {
            if !field.trim().is_empty() {
                cells.push((row, col, field.to_string()));
            }
            cols = cols.max(col + 1);
        }
        rows = row + 1;
    }

    let mut wb = Workbook::new();
    let sheet = wb.primary_sheet_id();
    wb.bulk_import(sheet, cells).context("loading cells")?;
    Ok((wb, rows, cols))
}

fn calc(formula: &str, delimiter: char, headers: bool, json: bool) -> Result<()> {
    let (wb, _, _) = load_stdin_csv(delimiter, headers)?;
    let sheet = wb.primary_sheet_id();
    let value = wb.evaluate_formula_in(sheet, formula);

    if json {
        let out = serde_json::json!({
            "result": value.to_display(),
            "is_error": value.is_error(),
        });
        println!("{}", out);
    } else {
        println!("{}", value.to_display());
    }
    Ok(())
}

fn recalc(delimiter: char) -> Result<()> {
    let (wb, rows, cols) = load_stdin_csv(delimiter, false)?;
    let sheet = wb.primary_sheet_id();

    let stdout = io::stdout();
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter as u8)
        .from_writer(stdout.lock());

    for row in 0..rows {
        let record: Vec<String> = (0..cols).map(|col| wb.display(sheet, row, col)).collect();
        writer.write_record(&record).context("writing CSV")?;
    }
    writer.flush().context("flushing stdout")?;
    Ok(())
}
