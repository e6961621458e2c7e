//! Rowwise CLI - apply one instruction to every row of a CSV column
//!
//! # Main Commands
//!
//! ```bash
//! rowwise run notes.csv --column B --instruction "Summarize"   # Writes notes_results.csv
//! rowwise serve                                                # Start HTTP server (port 3000)
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! rowwise columns notes.csv       # List columns with their letters
//! rowwise parse notes.csv         # Parse CSV to JSON records
//! ```

use clap::{Parser, Subcommand};
use rowwise::{
    column_letter, parse_csv_file, parse_csv_file_auto, run_csv, write_output, BatchOptions, BatchProcessor,
    FailureRendering, GeneratorConfig, PreconditionError, RowTransformer, RunRequest, DEFAULT_RESULT_COLUMN,
    MAX_CONCURRENCY,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "rowwise")]
#[command(about = "Apply an AI instruction to every row of a CSV column", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an instruction over one column and append the results
    Run {
        /// Input CSV file
        input: PathBuf,

        /// Column letter (A, B, ...) or exact header name (prompted if missing)
        #[arg(short, long)]
        column: Option<String>,

        /// Instruction applied to each row (prompted if missing)
        #[arg(short, long)]
        instruction: Option<String>,

        /// Output file (default: <input>_results.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Maximum calls in flight
        #[arg(long, default_value = "1", value_parser = parse_concurrency)]
        concurrency: usize,

        /// Model name (default: ROWWISE_MODEL or gpt-4o)
        #[arg(long)]
        model: Option<String>,

        /// Chat-completions endpoint URL
        #[arg(long)]
        endpoint: Option<String>,

        /// Per-call timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Extra attempts for transient failures
        #[arg(long, default_value = "0")]
        retries: u32,

        /// Header of the appended column
        #[arg(long, default_value = DEFAULT_RESULT_COLUMN)]
        result_column: String,

        /// Leave failed rows empty instead of writing "Error: ..."
        #[arg(long)]
        empty_failures: bool,

        /// Send numeric cells as text instead of skipping them
        #[arg(long)]
        coerce_numbers: bool,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,
    },

    /// List the columns of a CSV file
    Columns {
        /// Input CSV file
        input: PathBuf,
    },

    /// Parse a CSV file and output JSON
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

/// Arguments of the `run` subcommand
struct RunArgs {
    input: PathBuf,
    column: Option<String>,
    instruction: Option<String>,
    output: Option<PathBuf>,
    concurrency: usize,
    model: Option<String>,
    endpoint: Option<String>,
    timeout: Option<u64>,
    retries: u32,
    result_column: String,
    empty_failures: bool,
    coerce_numbers: bool,
    delimiter: Option<char>,
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            input,
            column,
            instruction,
            output,
            concurrency,
            model,
            endpoint,
            timeout,
            retries,
            result_column,
            empty_failures,
            coerce_numbers,
            delimiter,
        } => {
            cmd_run(RunArgs {
                input,
                column,
                instruction,
                output,
                concurrency,
                model,
                endpoint,
                timeout,
                retries,
                result_column,
                empty_failures,
                coerce_numbers,
                delimiter,
            })
            .await
        }

        Commands::Columns { input } => cmd_columns(&input),

        Commands::Parse {
            input,
            delimiter,
            output,
        } => cmd_parse(&input, delimiter, output.as_deref()),

        Commands::Serve { port } => cmd_serve(port).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn cmd_run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Processing: {}", args.input.display());

    // One reader for every prompt so piped answers are not lost to buffering
    let mut stdin = BufReader::new(tokio::io::stdin());
    let column = match args.column {
        Some(c) => c,
        None => {
            prompt(
                &mut stdin,
                "Enter the column letter or name to process: ",
                PreconditionError::MissingColumn,
            )
            .await?
        }
    };
    let instruction = match args.instruction {
        Some(i) => i,
        None => {
            prompt(
                &mut stdin,
                "Enter the instruction for the AI: ",
                PreconditionError::MissingInstruction,
            )
            .await?
        }
    };
    let request = RunRequest::new(column, instruction);
    request.validate()?;

    let mut config = GeneratorConfig::from_env()?.with_max_attempts(args.retries.saturating_add(1));
    if let Some(ref model) = args.model {
        config = config.with_model(model);
    }
    if let Some(ref endpoint) = args.endpoint {
        config = config.with_endpoint(endpoint);
    }
    if let Some(secs) = args.timeout {
        config = config.with_timeout(Duration::from_secs(secs));
    }

    let transformer = RowTransformer::from_config(&config)?.with_number_coercion(args.coerce_numbers);
    let options = BatchOptions {
        concurrency: args.concurrency.clamp(1, MAX_CONCURRENCY),
        result_column: args.result_column,
        failure_rendering: if args.empty_failures {
            FailureRendering::Empty
        } else {
            FailureRendering::Message
        },
    };
    let processor = BatchProcessor::new(transformer, options);

    let output = run_csv(&args.input, &request, &processor, args.delimiter).await?;

    let output_path = args.output.unwrap_or_else(|| default_output_path(&args.input));
    let delimiter = args.delimiter.unwrap_or(output.csv_info.delimiter);
    write_output(&output.dataset, &output_path, delimiter)?;

    let summary = &output.summary;
    eprintln!("\n📊 Summary:");
    eprintln!("   Column:    {} ({})", output.column.name(), output.column.letter());
    eprintln!("   Rows:      {}", summary.total);
    eprintln!("   ✅ Success: {}", summary.succeeded);
    eprintln!("   ⏭️  Skipped: {}", summary.skipped);
    if summary.failed > 0 {
        eprintln!("   ❌ Failed:  {}", summary.failed);
    }
    eprintln!("   Results in column \"{}\" of {}", summary.result_column, output_path.display());

    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_columns(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let result = parse_csv_file_auto(input)?;

    eprintln!("📋 {} has {} columns, {} rows:", input.display(), result.headers().len(), result.dataset.row_count());
    for (i, name) in result.headers().iter().enumerate() {
        println!("  [{}] {}", column_letter(i), name);
    }
    Ok(())
}

fn cmd_parse(
    input: &Path,
    delimiter: Option<char>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing CSV: {}", input.display());

    let result = match delimiter {
        Some(d) => parse_csv_file(input, d)?,
        None => parse_csv_file_auto(input)?,
    };

    eprintln!("   Encoding: {}", result.encoding);
    eprintln!(
        "   Delimiter: '{}'{}",
        rowwise::parser::format_delimiter(result.delimiter),
        if delimiter.is_none() { " (auto-detected)" } else { "" }
    );
    eprintln!("   Columns: {}", result.headers().join(", "));
    eprintln!("✅ Parsed {} records", result.dataset.row_count());

    let json = serde_json::to_string_pretty(&result.dataset.to_records())?;
    match output {
        Some(p) => {
            fs::write(p, json)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}

async fn cmd_serve(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    rowwise::server::start_server(port).await
}

/// Ask on stderr, read one line from `reader`. A blank answer is `missing`.
///
/// Only the line ending is removed; the answer is otherwise kept as typed.
async fn prompt<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    question: &str,
    missing: PreconditionError,
) -> Result<String, Box<dyn std::error::Error>> {
    eprint!("{}", question);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let answer = line.trim_end_matches(['\r', '\n']);
    if answer.trim().is_empty() {
        return Err(missing.into());
    }
    Ok(answer.to_string())
}

fn parse_concurrency(value: &str) -> Result<usize, String> {
    let n: usize = value.parse().map_err(|_| format!("invalid number: {}", value))?;
    if n > MAX_CONCURRENCY {
        return Err(format!("at most {} calls can be in flight", MAX_CONCURRENCY));
    }
    Ok(n)
}

/// `<dir>/<stem>_results.csv` next to the input.
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    input.with_file_name(format!("{}_results.csv", stem))
}
