use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use dotenvy::dotenv;
use fix_book::render::{self, Format};
use fix_book::{BookSet, Message, MessageSource, UpdateOutcome};
use time::macros::format_description;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::UtcTime;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl From<OutputFormat> for Format {
    fn from(f: OutputFormat) -> Self {
        match f {
            OutputFormat::Text => Format::Text,
            OutputFormat::Json => Format::Json,
        }
    }
}

#[derive(Debug, Parser)]
#[command(version, about = "Replay FIX market data and print the reconstructed books")]
struct Args {
    /// Capture file with one message per line (`-` for stdin)
    #[arg(env = "FIX_INPUT")]
    input: PathBuf,

    /// Field delimiter: a single character, `SOH`, or a hex byte such as `0x01`
    #[arg(long, env = "FIX_SOH", default_value = "0x01", value_parser = parse_soh)]
    soh: u8,

    /// Number of levels to print per side
    #[arg(long, env = "FIX_LEVELS", default_value_t = 5)]
    levels: usize,

    /// Output format for changed books
    #[arg(long, env = "FIX_FORMAT", value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Log and drop messages that fail instead of stopping
    #[arg(long, env = "FIX_SKIP_INVALID", default_value_t = false)]
    skip_invalid: bool,

    /// Apply messages without printing books; print a summary at the end
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

fn parse_soh(s: &str) -> std::result::Result<u8, String> {
    if s.eq_ignore_ascii_case("soh") {
        return Ok(0x01);
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u8::from_str_radix(hex, 16).map_err(|e| format!("invalid hex byte {s:?}: {e}"));
    }
    match s.as_bytes() {
        [b] if *b != b'\n' && *b != b'\r' && *b != b'=' => Ok(*b),
        _ => Err(format!("delimiter must be one byte other than '=' or a line ending, got {s:?}")),
    }
}

#[derive(Debug, Default)]
struct Summary {
    read: u64,
    applied: u64,
    ignored: u64,
    skipped: u64,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let timer = UtcTime::new(format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    ));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(timer)
        .with_writer(io::stderr)
        .init();
}

fn run(args: &Args) -> Result<Summary> {
    let mut source =
        MessageSource::open(&args.input).with_context(|| format!("open {:?}", args.input))?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let format = Format::from(args.format);
    let mut books = BookSet::new();
    let mut summary = Summary::default();

    while let Some(line) = source.next_message().context("read message")? {
        summary.read += 1;
        let rev = books.revision();
        let applied = Message::parse(args.soh, line).and_then(|msg| books.update(&msg));
        match applied {
            Ok(UpdateOutcome::Applied { .. }) => summary.applied += 1,
            Ok(UpdateOutcome::Ignored(_)) => summary.ignored += 1,
            Err(e) if args.skip_invalid => {
                warn!(line = source.line_no(), error = %e, "message skipped");
                summary.skipped += 1;
            }
            Err(e) => bail!("line {}: {e}", source.line_no()),
        }
        if args.quiet || rev >= books.revision() {
            continue;
        }
        render::write_changed(&mut out, &books, books.revision(), args.levels, format)?;
    }
    out.flush()?;

    info!(symbols = books.len(), revision = books.revision(), "input exhausted");
    if args.quiet {
        println!(
            "Read {} messages: {} applied, {} ignored, {} skipped. {} symbols, revision {}.",
            summary.read,
            summary.applied,
            summary.ignored,
            summary.skipped,
            books.len(),
            books.revision()
        );
    }
    Ok(summary)
}

fn main() {
    // Load environment variables from .env if present
    let _ = dotenv();
    let args = Args::parse();
    init_logging();

    if let Err(e) = run(&args) {
        eprintln!("Fatal error: \"{e:#}\".");
        std::process::exit(1);
    }
}
