// Command-line interface for svndelta.
//
// Subcommands reconstruct a revision from a chain of svndiff files, collapse
// a chain into one delta, produce a delta between two files, and print the
// windows of a delta.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};

use crate::combine::DEFAULT_MAX_DEPTH;
use crate::generator::{
    DEFAULT_BLOCK_SIZE, DEFAULT_MIN_RUN, DEFAULT_WINDOW_SIZE, GeneratorOptions,
};
use crate::io::{self as fileio, FileOptions, IoError};
use crate::svndiff::compression::{DEFAULT_COMPRESSION_LEVEL, MIN_COMPRESS_LEN};
use crate::svndiff::reader::DEFAULT_MAX_SECTION_LEN;
use crate::svndiff::{Version, WindowReader, WriterOptions};

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Byte size parsing (supports K, M, G suffixes)
// ---------------------------------------------------------------------------

fn parse_byte_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }
    let (num_part, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1024u64),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1024 * 1024),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1u64),
    };
    let num: u64 = num_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: '{s}'"))
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// svndiff delta combiner.
#[derive(Parser, Debug)]
#[command(
    name = "svndelta",
    version,
    about = "Combine, apply and produce svndiff deltas",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Reconstruct a revision from a base and a chain of deltas.
    Apply(ApplyArgs),
    /// Collapse a chain of deltas into one delta against the base.
    Combine(CombineArgs),
    /// Produce a delta turning a source file into a target file.
    Diff(DiffArgs),
    /// Print the windows of a delta.
    Inspect(InspectArgs),
    /// Print build/configuration details.
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    /// svndiff version 0 (raw segments).
    #[value(name = "0")]
    V0,
    /// svndiff version 1 (zlib-compressed segments).
    #[value(name = "1")]
    V1,
}

impl FormatArg {
    fn version(self) -> Version {
        match self {
            Self::V0 => Version::V0,
            Self::V1 => Version::V1,
        }
    }
}

#[derive(Args, Debug)]
struct ReadTuningArgs {
    /// Largest instructions + data section accepted per window (K/M/G suffix).
    #[arg(long = "max-section-size", value_parser = parse_byte_size, default_value_t = DEFAULT_MAX_SECTION_LEN as u64)]
    max_section_len: u64,

    /// Bound on nested pattern resolution while combining.
    #[arg(long = "max-depth", default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,
}

#[derive(Args, Debug)]
struct WriteTuningArgs {
    /// Output svndiff format version.
    #[arg(long = "format", value_enum, default_value_t = FormatArg::V0)]
    format: FormatArg,

    /// zlib level for version 1 segments (0-9).
    #[arg(long, short = 'l', value_parser = clap::value_parser!(u32).range(0..=9), default_value_t = DEFAULT_COMPRESSION_LEVEL)]
    level: u32,

    /// Segments shorter than this are stored uncompressed (K/M/G suffix).
    #[arg(long = "min-compress-size", value_parser = parse_byte_size, default_value_t = MIN_COMPRESS_LEN as u64)]
    min_compress_len: u64,
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Base text the oldest delta applies to (default: empty).
    #[arg(long, short = 'b', value_hint = ValueHint::FilePath)]
    base: Option<PathBuf>,

    /// Output file (default: stdout).
    #[arg(long, short = 'o', value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Write output to stdout.
    #[arg(short = 'c', long)]
    stdout: bool,

    /// Reconstruct and report stats without writing output.
    #[arg(long)]
    check_only: bool,

    #[command(flatten)]
    tuning: ReadTuningArgs,

    /// Delta files, oldest first.
    #[arg(value_hint = ValueHint::FilePath, required = true)]
    deltas: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct CombineArgs {
    /// Output delta file (default: stdout).
    #[arg(long, short = 'o', value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Write output to stdout.
    #[arg(short = 'c', long)]
    stdout: bool,

    #[command(flatten)]
    read: ReadTuningArgs,

    #[command(flatten)]
    write: WriteTuningArgs,

    /// Delta files, oldest first.
    #[arg(value_hint = ValueHint::FilePath, required = true)]
    deltas: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct DiffArgs {
    /// Source file to copy from (default: empty).
    #[arg(long, short = 's', value_hint = ValueHint::FilePath)]
    source: Option<PathBuf>,

    /// Target window size (K/M/G suffix).
    #[arg(long = "window-size", value_parser = parse_byte_size, default_value_t = DEFAULT_WINDOW_SIZE as u64)]
    window_size: u64,

    /// Width of the hashed source blocks.
    #[arg(long = "block-size", default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Shortest run of equal bytes encoded as a target copy.
    #[arg(long = "min-run", default_value_t = DEFAULT_MIN_RUN)]
    min_run: usize,

    #[command(flatten)]
    write: WriteTuningArgs,

    /// Write output to stdout.
    #[arg(short = 'c', long)]
    stdout: bool,

    /// Target file.
    #[arg(value_hint = ValueHint::FilePath)]
    target: PathBuf,

    /// Output delta file (default: stdout).
    #[arg(value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Print every instruction, not only window headers.
    #[arg(long, short = 'i')]
    instructions: bool,

    /// Delta file.
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,
}

// ---------------------------------------------------------------------------
// Resolved command + options (flattened from Cli)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Apply,
    Combine,
    Diff,
    Inspect,
    Config,
}

struct Options {
    command: Command,
    use_stdout: bool,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
    check_only: bool,
    print_instructions: bool,
    file: FileOptions,
    /// Base for `apply`, source for `diff`.
    source_file: Option<PathBuf>,
    /// Deltas for `apply`/`combine` (oldest first), target for `diff`,
    /// delta for `inspect`.
    input_files: Vec<PathBuf>,
    output_file: Option<PathBuf>,
}

impl Options {
    fn new(command: Command, cli: &Cli) -> Self {
        Self {
            command,
            use_stdout: false,
            force: cli.force,
            quiet: cli.quiet,
            verbose: cli.verbose.min(2),
            json_output: cli.json_output,
            check_only: false,
            print_instructions: false,
            file: FileOptions::default(),
            source_file: None,
            input_files: Vec::new(),
            output_file: None,
        }
    }
}

fn read_options(file: &mut FileOptions, args: &ReadTuningArgs) {
    file.max_section_len = usize::try_from(args.max_section_len).unwrap_or(usize::MAX);
    file.max_depth = args.max_depth;
}

fn writer_options(args: &WriteTuningArgs) -> WriterOptions {
    WriterOptions {
        version: args.format.version(),
        compression_level: args.level,
        min_compress_len: usize::try_from(args.min_compress_len).unwrap_or(usize::MAX),
    }
}

fn resolve_options(cli: Cli) -> Options {
    match cli.command {
        Cmd::Apply(ref args) => {
            let mut opts = Options::new(Command::Apply, &cli);
            read_options(&mut opts.file, &args.tuning);
            opts.use_stdout = args.stdout;
            opts.check_only = args.check_only;
            opts.source_file = args.base.clone();
            opts.input_files = args.deltas.clone();
            opts.output_file = args.output.clone();
            opts
        }
        Cmd::Combine(ref args) => {
            let mut opts = Options::new(Command::Combine, &cli);
            read_options(&mut opts.file, &args.read);
            opts.file.writer = writer_options(&args.write);
            opts.use_stdout = args.stdout;
            opts.input_files = args.deltas.clone();
            opts.output_file = args.output.clone();
            opts
        }
        Cmd::Diff(ref args) => {
            let mut opts = Options::new(Command::Diff, &cli);
            opts.file.writer = writer_options(&args.write);
            opts.file.generator = GeneratorOptions {
                window_size: usize::try_from(args.window_size).unwrap_or(usize::MAX),
                block_size: args.block_size,
                min_run: args.min_run,
            };
            opts.use_stdout = args.stdout;
            opts.source_file = args.source.clone();
            opts.input_files = vec![args.target.clone()];
            opts.output_file = args.output.clone();
            opts
        }
        Cmd::Inspect(ref args) => {
            let mut opts = Options::new(Command::Inspect, &cli);
            opts.print_instructions = args.instructions;
            opts.input_files = vec![args.input.clone()];
            opts
        }
        Cmd::Config => Options::new(Command::Config, &cli),
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("svndelta".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn hex(digest: &[u8; 32]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn read_optional(path: Option<&Path>, what: &str) -> Result<Vec<u8>, i32> {
    match path {
        Some(path) => std::fs::read(path).map_err(|e| {
            eprintln!("svndelta: {what}: {}: {e}", path.display());
            1
        }),
        None => Ok(Vec::new()),
    }
}

/// Open the output sink, or `None` when output goes to stdout.
fn open_output(opts: &Options) -> Result<Option<BufWriter<File>>, i32> {
    let path = match (opts.use_stdout, &opts.output_file) {
        (true, _) | (_, None) => return Ok(None),
        (false, Some(path)) => path,
    };
    if path.exists() && !opts.force {
        eprintln!(
            "svndelta: output file exists, use -f to overwrite: {}",
            path.display()
        );
        return Err(1);
    }
    match File::create(path) {
        Ok(f) => Ok(Some(BufWriter::with_capacity(BUF_SIZE, f))),
        Err(e) => {
            eprintln!("svndelta: output file: {}: {e}", path.display());
            Err(1)
        }
    }
}

/// Run `f` against the selected output and flush it.
fn with_output<T>(
    opts: &Options,
    f: impl FnOnce(&mut dyn Write) -> Result<T, IoError>,
) -> Result<T, i32> {
    let report = |e: &dyn std::fmt::Display| {
        eprintln!("svndelta: {e}");
        1
    };
    match open_output(opts)? {
        Some(mut file) => {
            let value = f(&mut file).map_err(|e| report(&e))?;
            file.flush().map_err(|e| report(&e))?;
            Ok(value)
        }
        None => {
            let mut stdout = BufWriter::with_capacity(BUF_SIZE, io::stdout().lock());
            let value = f(&mut stdout).map_err(|e| report(&e))?;
            stdout.flush().map_err(|e| report(&e))?;
            Ok(value)
        }
    }
}

fn print_json(json: &serde_json::Value) {
    match serde_json::to_string_pretty(json) {
        Ok(s) => eprintln!("{s}"),
        Err(e) => eprintln!("svndelta: json output: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("svndelta version {version}");

    let zlib = cfg!(feature = "zlib") as u8;
    let file_io = cfg!(feature = "file-io") as u8;
    let parallel = cfg!(feature = "parallel") as u8;
    let ptr_size = std::mem::size_of::<*const ()>();

    eprintln!("ZLIB={zlib}");
    eprintln!("FILE_IO={file_io}");
    eprintln!("PARALLEL={parallel}");
    eprintln!("DEFAULT_WINDOW_SIZE={DEFAULT_WINDOW_SIZE}");
    eprintln!("DEFAULT_BLOCK_SIZE={DEFAULT_BLOCK_SIZE}");
    eprintln!("DEFAULT_MIN_RUN={DEFAULT_MIN_RUN}");
    eprintln!("DEFAULT_MAX_SECTION_LEN={DEFAULT_MAX_SECTION_LEN}");
    eprintln!("DEFAULT_MAX_DEPTH={DEFAULT_MAX_DEPTH}");
    eprintln!("DEFAULT_COMPRESSION_LEVEL={DEFAULT_COMPRESSION_LEVEL}");
    eprintln!("MIN_COMPRESS_LEN={MIN_COMPRESS_LEN}");
    eprintln!("sizeof(usize)={ptr_size}");

    0
}

// ---------------------------------------------------------------------------
// Apply command
// ---------------------------------------------------------------------------

fn cmd_apply(opts: &Options) -> i32 {
    let base = match read_optional(opts.source_file.as_deref(), "base file") {
        Ok(data) => data,
        Err(code) => return code,
    };

    let result = if opts.check_only {
        fileio::reconstruct_to(&base, &opts.input_files, &mut io::sink(), &opts.file)
            .map_err(|e| {
                eprintln!("svndelta: {e}");
                1
            })
    } else {
        with_output(opts, |out| {
            fileio::reconstruct_to(&base, &opts.input_files, out, &opts.file)
        })
    };
    let stats = match result {
        Ok(stats) => stats,
        Err(code) => return code,
    };

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "svndelta: apply: base size: {}, deltas: {}, output size: {}, chunks: {}",
            stats.base_size, stats.chain_length, stats.output_size, stats.chunks
        );
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": "apply",
            "base_size": stats.base_size,
            "chain_length": stats.chain_length,
            "delta_size": stats.delta_size,
            "output_size": stats.output_size,
            "chunks": stats.chunks,
            "output_sha256": stats.output_sha256.as_ref().map(hex),
        });
        print_json(&json);
    }

    0
}

// ---------------------------------------------------------------------------
// Combine command
// ---------------------------------------------------------------------------

fn cmd_combine(opts: &Options) -> i32 {
    let stats = match with_output(opts, |out| {
        fileio::combine_to(&opts.input_files, out, &opts.file)
    }) {
        Ok(stats) => stats,
        Err(code) => return code,
    };

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "svndelta: combine: deltas: {}, input size: {}, output size: {}, windows: {}",
            stats.chain_length, stats.input_size, stats.delta_size, stats.windows
        );
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": "combine",
            "chain_length": stats.chain_length,
            "input_size": stats.input_size,
            "delta_size": stats.delta_size,
            "windows": stats.windows,
            "target_size": stats.target_size,
            "format": opts.file.writer.version.as_byte(),
        });
        print_json(&json);
    }

    0
}

// ---------------------------------------------------------------------------
// Diff command
// ---------------------------------------------------------------------------

fn cmd_diff(opts: &Options) -> i32 {
    let source = match read_optional(opts.source_file.as_deref(), "source file") {
        Ok(data) => data,
        Err(code) => return code,
    };
    let Some(target_path) = opts.input_files.first() else {
        eprintln!("svndelta: diff requires a target file");
        return 1;
    };
    let target = match std::fs::read(target_path) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("svndelta: target file: {}: {e}", target_path.display());
            return 1;
        }
    };

    let stats = match with_output(opts, |out| {
        fileio::diff_to(&source, &target, out, &opts.file)
    }) {
        Ok(stats) => stats,
        Err(code) => return code,
    };

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "svndelta: diff: source size: {}, target size: {}, delta size: {}, windows: {}",
            stats.source_size, stats.target_size, stats.delta_size, stats.windows
        );
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": "diff",
            "source_size": stats.source_size,
            "target_size": stats.target_size,
            "delta_size": stats.delta_size,
            "windows": stats.windows,
            "window_size": opts.file.generator.window_size,
            "source_sha256": stats.source_sha256.as_ref().map(hex),
            "target_sha256": stats.target_sha256.as_ref().map(hex),
        });
        print_json(&json);
    }

    0
}

// ---------------------------------------------------------------------------
// Inspect command
// ---------------------------------------------------------------------------

fn cmd_inspect(opts: &Options) -> i32 {
    let Some(input_file) = opts.input_files.first() else {
        eprintln!("svndelta: inspect requires an input file");
        return 1;
    };
    let file = match File::open(input_file) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("svndelta: {}: {e}", input_file.display());
            return 1;
        }
    };
    let mut reader = match WindowReader::from_stream(BufReader::with_capacity(BUF_SIZE, file)) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("svndelta: {}: {e}", input_file.display());
            return 1;
        }
    };

    println!("svndiff version:      {}", reader.version().as_byte());

    let mut window_num: u64 = 0;
    let mut target_offset: u64 = 0;
    loop {
        let window = match reader.next_window() {
            Ok(Some(w)) => w,
            Ok(None) => break,
            Err(e) => {
                eprintln!("svndelta: window {window_num}: {e}");
                return 1;
            }
        };

        println!();
        println!("window number:        {window_num}");
        println!("target offset:        {target_offset}");
        println!("source view offset:   {}", window.source_view_offset());
        println!("source view length:   {}", window.source_view_len());
        println!("target view length:   {}", window.target_view_len());
        println!("instructions:         {}", window.instructions().len());
        println!("new data length:      {}", window.new_data().len());
        println!(
            "self-contained:       {}",
            if window.is_self_contained() { "yes" } else { "no" }
        );

        if opts.print_instructions {
            let mut pos: u64 = 0;
            for inst in window.instructions() {
                println!(
                    "  {pos:>10}  {:<6} {:>10} @ {}",
                    inst.kind.name(),
                    inst.length,
                    inst.offset
                );
                pos += u64::from(inst.length);
            }
        }

        target_offset += u64::from(window.target_view_len());
        window_num += 1;
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": "inspect",
            "version": reader.version().as_byte(),
            "windows": window_num,
            "target_size": target_offset,
        });
        print_json(&json);
    }

    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();

    let default_filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let mut opts = resolve_options(cli);

    if opts.use_stdout && opts.output_file.is_some() && !opts.quiet {
        if let Some(path) = &opts.output_file {
            eprintln!(
                "svndelta: warning: -c option overrides output filename: {}",
                path.display()
            );
        }
        opts.output_file = None;
    }

    let exit_code = match opts.command {
        Command::Apply => cmd_apply(&opts),
        Command::Combine => cmd_combine(&opts),
        Command::Diff => cmd_diff(&opts),
        Command::Inspect => cmd_inspect(&opts),
        Command::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
