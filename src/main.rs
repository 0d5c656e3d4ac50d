//! # Charbridge CLI - Wire-Boundary Character Set Converter
//!
//! Command-line front end for converting byte streams between named external
//! encodings and internal UTF-8, resolving encoding labels, and inspecting
//! text the way the runtime sees it.

#[cfg(feature = "cli")]
use std::fs;
#[cfg(feature = "cli")]
use std::io::{self, Read, Write};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
use anyhow::{Context, Result};
#[cfg(feature = "cli")]
use clap::{Args, Parser, Subcommand, ValueEnum};
#[cfg(feature = "cli")]
use serde::Serialize;

#[cfg(feature = "cli")]
use charbridge::codec::WhatwgCodec;
#[cfg(feature = "cli")]
use charbridge::codepoints::str_to_codepoints;
#[cfg(feature = "cli")]
use charbridge::{display_width, registry, ConversionEngine, RecoveryPolicy, OUT_OF_BAND_MARKER};

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI features disabled. Enable with --features cli");
    std::process::exit(1);
}

/// Charbridge: wire-boundary character set converter
#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "charbridge")]
#[command(version, about, long_about = None)]
#[command(author = "Charbridge Contributors")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Convert data between a named encoding and internal UTF-8
    Convert(ConvertArgs),

    /// Resolve an encoding label and describe it
    Info(InfoArgs),

    /// Estimate the display width of text
    Width(TextArgs),

    /// Show the Unicode scalar values of text
    Codepoints(TextArgs),
}

#[cfg(feature = "cli")]
#[derive(Args)]
struct ConvertArgs {
    /// Encoding name (WHATWG label, e.g. windows-1252, Shift_JIS)
    #[arg(short, long)]
    encoding: String,

    /// Conversion direction relative to the runtime
    #[arg(short, long, default_value = "incoming")]
    direction: Direction,

    /// Input file (stdin if not specified)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Fail instead of writing a truncated result
    #[arg(long)]
    strict: bool,

    /// Skip embedded out-of-band markers (0xFF 0xF9) instead of stopping
    #[arg(long)]
    skip_markers: bool,
}

#[cfg(feature = "cli")]
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Direction {
    /// External bytes → internal UTF-8
    Incoming,
    /// Internal UTF-8 → external bytes
    Outgoing,
}

#[cfg(feature = "cli")]
#[derive(Args)]
struct InfoArgs {
    /// Encoding label to resolve
    label: String,
}

#[cfg(feature = "cli")]
#[derive(Args)]
struct TextArgs {
    /// Text to inspect (stdin if not specified)
    text: Option<String>,
}

#[cfg(feature = "cli")]
#[derive(Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[cfg(feature = "cli")]
#[derive(Serialize)]
struct ConversionReport {
    encoding: String,
    direction: String,
    bytes_in: usize,
    bytes_out: usize,
    complete: bool,
    processing_time_ms: u64,
}

#[cfg(feature = "cli")]
fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Convert(ref args) => convert_command(args, &cli)?,
        Commands::Info(ref args) => info_command(args, &cli)?,
        Commands::Width(ref args) => width_command(args, &cli)?,
        Commands::Codepoints(ref args) => codepoints_command(args, &cli)?,
    }

    Ok(())
}

#[cfg(feature = "cli")]
fn read_input(input: &Option<PathBuf>) -> Result<Vec<u8>> {
    if let Some(path) = input {
        fs::read(path).with_context(|| format!("Failed to read input file: {}", path.display()))
    } else {
        let mut buffer = Vec::new();
        io::stdin()
            .read_to_end(&mut buffer)
            .context("Failed to read from stdin")?;
        Ok(buffer)
    }
}

#[cfg(feature = "cli")]
fn read_text(args: &TextArgs) -> Result<String> {
    if let Some(ref text) = args.text {
        return Ok(text.clone());
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read from stdin")?;
    Ok(buffer)
}

#[cfg(feature = "cli")]
fn convert_command(args: &ConvertArgs, cli: &Cli) -> Result<()> {
    let start_time = std::time::Instant::now();

    if cli.verbose {
        eprintln!("Converting {:?} via {}", args.direction, args.encoding);
    }

    let translator = registry()
        .get(&args.encoding)
        .with_context(|| format!("Failed to open encoding {}", args.encoding))?;

    let input_data = read_input(&args.input)?;

    let mut engine = ConversionEngine::new();
    if args.skip_markers {
        engine = engine.with_recovery(RecoveryPolicy::SkipMarker(OUT_OF_BAND_MARKER));
    }

    let handle = match args.direction {
        Direction::Incoming => translator.incoming(),
        Direction::Outgoing => translator.outgoing(),
    };
    let result = engine.translate(Some(handle), &input_data);

    if !result.is_complete() {
        if args.strict {
            anyhow::bail!(
                "input could not be fully converted (stopped after {} output bytes)",
                result.len()
            );
        }
        if cli.verbose {
            eprintln!("Conversion stopped early: {:?}", result.status);
        }
    }

    if let Some(ref output_path) = args.output {
        fs::write(output_path, result.as_bytes())
            .with_context(|| format!("Failed to write output file: {}", output_path.display()))?;
        if cli.verbose {
            eprintln!("Wrote to: {}", output_path.display());
        }
    } else {
        io::stdout()
            .write_all(result.as_bytes())
            .context("Failed to write to stdout")?;
    }

    let processing_time = start_time.elapsed();

    if cli.verbose {
        eprintln!(
            "Processed {} bytes -> {} bytes in {:?}",
            input_data.len(),
            result.len(),
            processing_time
        );
    }

    if let OutputFormat::Json = cli.format {
        let report = ConversionReport {
            encoding: args.encoding.clone(),
            direction: format!("{:?}", args.direction).to_lowercase(),
            bytes_in: input_data.len(),
            bytes_out: result.len(),
            complete: result.is_complete(),
            processing_time_ms: processing_time.as_millis() as u64,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

#[cfg(feature = "cli")]
fn info_command(args: &InfoArgs, cli: &Cli) -> Result<()> {
    let info = WhatwgCodec::resolve(&args.label)
        .with_context(|| format!("unknown encoding: {}", args.label))?;

    match cli.format {
        OutputFormat::Json => {
            let result = serde_json::json!({
                "label": args.label,
                "canonical": info.canonical,
                "encoder_available": info.encoder_available,
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Text => {
            println!("Label:     {}", args.label);
            println!("Canonical: {}", info.canonical);
            println!(
                "Outgoing:  {}",
                if info.encoder_available {
                    "available"
                } else {
                    "decode-only"
                }
            );
        }
    }

    Ok(())
}

#[cfg(feature = "cli")]
fn width_command(args: &TextArgs, cli: &Cli) -> Result<()> {
    let text = read_text(args)?;
    let width = display_width(&text);

    match cli.format {
        OutputFormat::Json => {
            let result = serde_json::json!({
                "bytes": text.len(),
                "width": width,
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Text => {
            println!("{}", width);
        }
    }

    Ok(())
}

#[cfg(feature = "cli")]
fn codepoints_command(args: &TextArgs, cli: &Cli) -> Result<()> {
    let text = read_text(args)?;
    let values = str_to_codepoints(&text);

    match cli.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&values)?);
        }
        OutputFormat::Text => {
            for value in values {
                print!("U+{:04X} ", value);
            }
            println!();
        }
    }

    Ok(())
}
