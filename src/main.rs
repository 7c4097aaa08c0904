// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Command-line interface for tg2mm.
//!
//! This binary provides the `tg2mm` command for converting Telegram Desktop
//! chat exports into Mattermost bulk-import JSONL files.

use lexopt::prelude::*;
use snafu::{OptionExt, ensure, prelude::*};
use std::path::{Path, PathBuf};
use tg2mm::{config, import, parser};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use walkdir::WalkDir;

/// File name Telegram Desktop gives the JSON export.
const EXPORT_FILE_NAME: &str = "result.json";

/// Where to write the converted output.
#[derive(Clone)]
enum OutputTarget {
    /// Write one `.jsonl` per export into the specified directory.
    Directory(PathBuf),
    /// Write to stdout.
    Stdout,
}

struct Cli {
    input: Vec<PathBuf>,
    output: OutputTarget,
    config: PathBuf,
    attachment_base: Option<PathBuf>,
    verbose: u8,
    quiet: bool,
    dry_run: bool,
    force: bool,
}

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to parse arguments: {source}"))]
    ParseArgs { source: lexopt::Error },

    #[snafu(display("at least one export file or directory is required"))]
    NoInputFiles,

    #[snafu(display("no {EXPORT_FILE_NAME} found in the given inputs"))]
    NoExportsFound,

    #[snafu(display("cannot output multiple exports to stdout"))]
    MultipleExportsToStdout,

    #[snafu(display("failed to load {}: {source}", path.display()))]
    LoadConfig {
        path: PathBuf,
        source: config::ConfigError,
    },

    #[snafu(display("failed to create output directory: {source}"))]
    CreateOutputDir { source: std::io::Error },

    #[snafu(display("failed to read {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse {}: {source}", path.display()))]
    ParseFile {
        path: PathBuf,
        source: parser::ParseError,
    },

    #[snafu(display("failed to convert {}: {source}", path.display()))]
    Convert {
        path: PathBuf,
        source: import::ConvertError,
    },

    #[snafu(display("invalid export path: cannot derive an output name"))]
    InvalidFilename,

    #[snafu(display("failed to write {}: {source}", path.display()))]
    WriteOutput {
        path: PathBuf,
        source: import::WriteError,
    },

    #[snafu(display("failed to write {}: {source}", path.display()))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn print_help() {
    println!(
        "\
{name} {version}
Convert Telegram chat exports to Mattermost bulk-import JSONL

Usage: {name} [OPTIONS] -c <CONFIG> -o <OUTPUT> <EXPORT>...

Arguments:
  <EXPORT>...  {EXPORT_FILE_NAME} files or directories containing exports

Options:
  -c, --config <CONFIG>       Settings file (TOML)
  -o, --output <OUTPUT>       Output directory (or - for stdout)
      --attachment-base <DIR> Prefix for attachment paths (default: export directory)

Other options:
  -v, --verbose               Log more (repeat for debug output)
  -q, --quiet                 Suppress progress messages
  -n, --dry-run               Show what would be processed without writing
  -f, --force                 Overwrite existing output files
  -h, --help                  Print help
  -V, --version               Print version",
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
    );
}

fn parse_args() -> Result<Cli, lexopt::Error> {
    // Show help if no arguments provided
    if std::env::args().len() == 1 {
        print_help();
        std::process::exit(0);
    }

    let mut input = Vec::new();
    let mut output: Option<OutputTarget> = None;
    let mut config: Option<PathBuf> = None;
    let mut attachment_base: Option<PathBuf> = None;
    let mut verbose: u8 = 0;
    let mut quiet = false;
    let mut dry_run = false;
    let mut force = false;

    let mut parser = lexopt::Parser::from_env();
    while let Some(arg) = parser.next()? {
        match arg {
            Short('o') | Long("output") => {
                let val: PathBuf = parser.value()?.parse()?;
                output = Some(if val == Path::new("-") {
                    OutputTarget::Stdout
                } else {
                    OutputTarget::Directory(val)
                });
            }
            Short('c') | Long("config") => config = Some(parser.value()?.parse()?),
            Long("attachment-base") => attachment_base = Some(parser.value()?.parse()?),
            Short('v') | Long("verbose") => verbose = verbose.saturating_add(1),
            Short('q') | Long("quiet") => quiet = true,
            Short('n') | Long("dry-run") => dry_run = true,
            Short('f') | Long("force") => force = true,
            Short('h') | Long("help") => {
                print_help();
                std::process::exit(0);
            }
            Short('V') | Long("version") => {
                println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            Value(val) => input.push(val.parse()?),
            _ => return Err(arg.unexpected()),
        }
    }

    Ok(Cli {
        input,
        output: output.ok_or("missing required option: --output")?,
        config: config.ok_or("missing required option: --config")?,
        attachment_base,
        verbose,
        quiet,
        dry_run,
        force,
    })
}

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

fn main() -> Result<(), Error> {
    let cli = parse_args().context(ParseArgsSnafu)?;
    setup_logging(cli.verbose);

    ensure!(!cli.input.is_empty(), NoInputFilesSnafu);

    let settings = config::Config::load(&cli.config).context(LoadConfigSnafu { path: &cli.config })?;

    let exports = collect_exports(&cli.input);
    ensure!(!exports.is_empty(), NoExportsFoundSnafu);

    match &cli.output {
        OutputTarget::Stdout => {
            ensure!(exports.len() == 1, MultipleExportsToStdoutSnafu);
            process_to_stdout(&exports[0], &settings, &cli)?;
        }
        OutputTarget::Directory(dir) => {
            if !cli.dry_run {
                std::fs::create_dir_all(dir).context(CreateOutputDirSnafu)?;
            }
            for export in &exports {
                process_export(export, dir, &settings, &cli)?;
            }
        }
    }

    Ok(())
}

/// Collects export files from the given inputs (files and directories).
fn collect_exports(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            for entry in WalkDir::new(input)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file() && e.file_name() == EXPORT_FILE_NAME)
            {
                files.push(entry.path().to_path_buf());
            }
        } else {
            files.push(input.clone());
        }
    }
    files
}

/// The directory holding an export, which Telegram also fills with media.
fn export_dir(export: &Path) -> &Path {
    export.parent().unwrap_or_else(|| Path::new(""))
}

/// Output base name: the export directory's name, else the file stem.
fn output_name(export: &Path) -> Option<String> {
    export_dir(export)
        .file_name()
        .or_else(|| export.file_stem())
        .map(|name| name.to_string_lossy().into_owned())
}

/// Reads, parses and converts one export.
fn convert_export(
    export: &Path,
    settings: &config::Config,
    cli: &Cli,
) -> Result<import::Conversion, Error> {
    let base = cli
        .attachment_base
        .clone()
        .unwrap_or_else(|| export_dir(export).to_path_buf());
    let settings = settings.clone().with_attachment_base_dir(base);

    let json = std::fs::read_to_string(export).context(ReadFileSnafu { path: export })?;
    let chat = parser::parse_export(&json).context(ParseFileSnafu { path: export })?;
    tracing::debug!(
        path = %export.display(),
        chat = chat.name.as_deref().unwrap_or("<unnamed>"),
        messages = chat.messages.len(),
        "Parsed export"
    );

    import::convert(&settings, &chat.messages).context(ConvertSnafu { path: export })
}

/// Converts a single export and writes the stream to stdout.
fn process_to_stdout(export: &Path, settings: &config::Config, cli: &Cli) -> Result<(), Error> {
    if cli.dry_run {
        eprintln!("Would output {}", export.display());
        return Ok(());
    }

    let conversion = convert_export(export, settings, cli)?;
    conversion
        .write_jsonl(std::io::stdout().lock())
        .context(WriteOutputSnafu { path: "-" })
}

/// Converts a single export into the output directory.
fn process_export(
    export: &Path,
    out_dir: &Path,
    settings: &config::Config,
    cli: &Cli,
) -> Result<(), Error> {
    let name = output_name(export).context(InvalidFilenameSnafu)?;
    let out_path = out_dir.join(format!("{name}.jsonl"));
    let list_path = out_dir.join(format!("{name}.attachments"));

    // Handle dry-run mode
    if cli.dry_run {
        eprintln!("Would write {}", out_path.display());
        return Ok(());
    }

    // Check if output exists and handle overwrite
    if out_path.exists() && !cli.force {
        eprintln!(
            "Skipping {} (already exists, use --force to overwrite)",
            out_path.display()
        );
        return Ok(());
    }

    let conversion = convert_export(export, settings, cli)?;

    let file = std::fs::File::create(&out_path).context(WriteFileSnafu { path: &out_path })?;
    conversion
        .write_jsonl(std::io::BufWriter::new(file))
        .context(WriteOutputSnafu { path: &out_path })?;

    let mut list = conversion.attachments.join("\n");
    if !list.is_empty() {
        list.push('\n');
    }
    std::fs::write(&list_path, list).context(WriteFileSnafu { path: &list_path })?;

    if !cli.quiet {
        eprintln!("{}", progress_line(&out_path, &conversion));
    }
    Ok(())
}

/// One-line report of what a conversion wrote.
fn progress_line(out_path: &Path, conversion: &import::Conversion) -> String {
    let summary = &conversion.summary;
    format!(
        "Wrote {} ({} posts, {} replies, {} attachments, {} dropped, {} orphaned)",
        out_path.display(),
        summary.posts,
        summary.replies,
        conversion.attachments.len(),
        summary.dropped,
        summary.orphaned
    )
}
