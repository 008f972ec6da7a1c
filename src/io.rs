// File-level helpers around the chain driver and the generator.
//
// `reconstruct_file()` rebuilds a revision from a base file and a chain of
// svndiff files, `combine_files()` collapses such a chain into a single
// delta against the base, and `diff_files()` produces a delta between two
// files. Bases and sources are read fully into memory; deltas are streamed
// through buffered readers. SHA-256 checksums are computed incrementally
// when the `file-io` feature is enabled.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[cfg(feature = "file-io")]
use sha2::Digest;
use thiserror::Error;

use crate::chain::DeltaChain;
use crate::combine::{Combiner, DEFAULT_MAX_DEPTH};
use crate::error::DeltaError;
use crate::generator::{DeltaGenerator, GeneratorOptions};
use crate::svndiff::reader::DEFAULT_MAX_SECTION_LEN;
use crate::svndiff::{ReaderOptions, WindowReader, WindowWriter, WriterOptions};

// ---------------------------------------------------------------------------
// Options and stats
// ---------------------------------------------------------------------------

/// Settings shared by the file helpers.
#[derive(Debug, Clone)]
pub struct FileOptions {
    /// Per-window segment limit applied to every delta read.
    pub max_section_len: usize,
    /// Bound on nested pattern resolution while combining.
    pub max_depth: usize,
    /// Output format of written deltas.
    pub writer: WriterOptions,
    /// Settings for `diff_files()`.
    pub generator: GeneratorOptions,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            max_section_len: DEFAULT_MAX_SECTION_LEN,
            max_depth: DEFAULT_MAX_DEPTH,
            writer: WriterOptions::default(),
            generator: GeneratorOptions::default(),
        }
    }
}

/// Statistics returned by `reconstruct_file()`.
#[derive(Debug, Clone)]
pub struct ReconstructStats {
    /// Base file size in bytes.
    pub base_size: u64,
    /// Number of deltas in the chain.
    pub chain_length: usize,
    /// Combined size of the delta files.
    pub delta_size: u64,
    /// Reconstructed output size in bytes.
    pub output_size: u64,
    /// Number of chunks reconstructed.
    pub chunks: u64,
    /// SHA-256 of the output (if `file-io` feature is enabled).
    pub output_sha256: Option<[u8; 32]>,
}

/// Statistics returned by `combine_files()`.
#[derive(Debug, Clone)]
pub struct CombineStats {
    pub chain_length: usize,
    /// Combined size of the input deltas.
    pub input_size: u64,
    /// Size of the combined delta.
    pub delta_size: u64,
    /// Windows written.
    pub windows: u64,
    /// Target bytes the combined delta produces.
    pub target_size: u64,
}

/// Statistics returned by `diff_files()`.
#[derive(Debug, Clone)]
pub struct DiffStats {
    pub source_size: u64,
    pub target_size: u64,
    pub delta_size: u64,
    pub windows: u64,
    /// SHA-256 of the source (if `file-io` feature is enabled).
    pub source_sha256: Option<[u8; 32]>,
    /// SHA-256 of the target (if `file-io` feature is enabled).
    pub target_sha256: Option<[u8; 32]>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for file operations.
#[derive(Debug, Error)]
pub enum IoError {
    /// Opening, reading or writing a file failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A delta was malformed or could not be applied.
    #[error("delta error: {0}")]
    Delta(#[from] DeltaError),
    /// No delta files were given.
    #[error("delta chain is empty")]
    EmptyChain,
}

impl IoError {
    /// True for malformed or inapplicable delta data.
    pub fn is_corrupt_window(&self) -> bool {
        matches!(self, Self::Delta(e) if e.is_corrupt_window())
    }
}

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

type FileReader = WindowReader<BufReader<File>>;

/// Open `deltas` (oldest first) as chain members (newest first).
fn open_chain(
    deltas: &[PathBuf],
    opts: &FileOptions,
) -> Result<(Vec<FileReader>, u64), IoError> {
    if deltas.is_empty() {
        return Err(IoError::EmptyChain);
    }
    let mut members = Vec::with_capacity(deltas.len());
    let mut total = 0u64;
    for path in deltas.iter().rev() {
        let file = File::open(path)?;
        total += file.metadata()?.len();
        let reader = WindowReader::from_stream_with_options(
            BufReader::with_capacity(BUF_SIZE, file),
            ReaderOptions {
                max_section_len: opts.max_section_len,
                ..Default::default()
            },
        )?;
        members.push(reader);
    }
    Ok((members, total))
}

// ---------------------------------------------------------------------------
// reconstruct_file
// ---------------------------------------------------------------------------

/// Rebuild the revision produced by `deltas` (oldest first) on top of
/// `base_path`, writing it to `output_path`.
pub fn reconstruct_file(
    base_path: &Path,
    deltas: &[PathBuf],
    output_path: &Path,
    opts: &FileOptions,
) -> Result<ReconstructStats, IoError> {
    let base = std::fs::read(base_path)?;
    let output_file = File::create(output_path)?;
    let mut output_writer = BufWriter::with_capacity(BUF_SIZE, output_file);
    let stats = reconstruct_to(&base, deltas, &mut output_writer, opts)?;
    output_writer.flush()?;
    Ok(stats)
}

/// Like [`reconstruct_file`] with the base already in memory and an
/// arbitrary output. An empty base suits chains whose oldest delta is
/// self-contained.
pub fn reconstruct_to<W: Write + ?Sized>(
    base: &[u8],
    deltas: &[PathBuf],
    output: &mut W,
    opts: &FileOptions,
) -> Result<ReconstructStats, IoError> {
    let (members, delta_size) = open_chain(deltas, opts)?;
    let mut chain =
        DeltaChain::with_combiner(members, base, Combiner::with_max_depth(opts.max_depth));

    #[cfg(feature = "file-io")]
    let mut output_hasher = sha2::Sha256::new();

    #[cfg(feature = "file-io")]
    let output_size = {
        let mut hashing_writer = HashingWriter {
            inner: output,
            hasher: &mut output_hasher,
        };
        chain.read_to_end(&mut hashing_writer)?
    };
    #[cfg(not(feature = "file-io"))]
    let output_size = chain.read_to_end(output)?;

    #[cfg(feature = "file-io")]
    let output_sha256 = Some(output_hasher.finalize().into());
    #[cfg(not(feature = "file-io"))]
    let output_sha256: Option<[u8; 32]> = None;

    Ok(ReconstructStats {
        base_size: base.len() as u64,
        chain_length: deltas.len(),
        delta_size,
        output_size,
        chunks: chain.chunks(),
        output_sha256,
    })
}

// ---------------------------------------------------------------------------
// combine_files
// ---------------------------------------------------------------------------

/// Collapse `deltas` (oldest first) into one delta against the base of the
/// oldest, written to `output_path`.
pub fn combine_files(
    deltas: &[PathBuf],
    output_path: &Path,
    opts: &FileOptions,
) -> Result<CombineStats, IoError> {
    let output_file = File::create(output_path)?;
    let mut output_writer = BufWriter::with_capacity(BUF_SIZE, output_file);
    let stats = combine_to(deltas, &mut output_writer, opts)?;
    output_writer.flush()?;
    Ok(stats)
}

/// Like [`combine_files`] with an arbitrary output.
pub fn combine_to<W: Write + ?Sized>(
    deltas: &[PathBuf],
    output: &mut W,
    opts: &FileOptions,
) -> Result<CombineStats, IoError> {
    let (members, input_size) = open_chain(deltas, opts)?;
    let mut writer = WindowWriter::with_header(output, opts.writer.clone())?;

    // Combining never reads the base text.
    let mut chain =
        DeltaChain::with_combiner(members, &[], Combiner::with_max_depth(opts.max_depth));
    let windows = chain.combine_to(&mut writer)?;
    writer.flush()?;

    Ok(CombineStats {
        chain_length: deltas.len(),
        input_size,
        delta_size: writer.bytes_written(),
        windows,
        target_size: chain.bytes_reconstructed(),
    })
}

// ---------------------------------------------------------------------------
// diff_files
// ---------------------------------------------------------------------------

/// Write a delta turning `source_path` into `target_path`.
pub fn diff_files(
    source_path: &Path,
    target_path: &Path,
    delta_path: &Path,
    opts: &FileOptions,
) -> Result<DiffStats, IoError> {
    let source = std::fs::read(source_path)?;
    let target = std::fs::read(target_path)?;
    let delta_file = File::create(delta_path)?;
    let mut output_writer = BufWriter::with_capacity(BUF_SIZE, delta_file);
    let stats = diff_to(&source, &target, &mut output_writer, opts)?;
    output_writer.flush()?;
    Ok(stats)
}

/// Like [`diff_files`] with both texts in memory and an arbitrary output.
pub fn diff_to<W: Write + ?Sized>(
    source: &[u8],
    target: &[u8],
    output: &mut W,
    opts: &FileOptions,
) -> Result<DiffStats, IoError> {
    let mut writer = WindowWriter::with_header(output, opts.writer.clone())?;
    let mut generator = DeltaGenerator::new(opts.generator.clone())?;
    let windows = generator.write_delta(source, target, &mut writer)?;
    writer.flush()?;

    Ok(DiffStats {
        source_size: source.len() as u64,
        target_size: target.len() as u64,
        delta_size: writer.bytes_written(),
        windows,
        source_sha256: sha256(source),
        target_sha256: sha256(target),
    })
}

#[cfg(feature = "file-io")]
fn sha256(data: &[u8]) -> Option<[u8; 32]> {
    Some(sha2::Sha256::digest(data).into())
}

#[cfg(not(feature = "file-io"))]
fn sha256(_data: &[u8]) -> Option<[u8; 32]> {
    None
}

// ---------------------------------------------------------------------------
// Batch reconstruction (parallel feature)
// ---------------------------------------------------------------------------

/// One reconstruction for [`reconstruct_many`].
#[derive(Debug, Clone)]
pub struct ReconstructJob {
    pub base: PathBuf,
    /// Oldest first.
    pub deltas: Vec<PathBuf>,
    pub output: PathBuf,
}

/// Run independent reconstructions concurrently, one combiner per job.
/// Results are in job order.
#[cfg(feature = "parallel")]
pub fn reconstruct_many(
    jobs: &[ReconstructJob],
    opts: &FileOptions,
) -> Vec<Result<ReconstructStats, IoError>> {
    use rayon::prelude::*;

    jobs.par_iter()
        .map(|job| reconstruct_file(&job.base, &job.deltas, &job.output, opts))
        .collect()
}

// ---------------------------------------------------------------------------
// Hashing writer (used with file-io feature)
// ---------------------------------------------------------------------------

#[cfg(feature = "file-io")]
struct HashingWriter<'a, W: Write + ?Sized> {
    inner: &'a mut W,
    hasher: &'a mut sha2::Sha256,
}

#[cfg(feature = "file-io")]
impl<W: Write + ?Sized> Write for HashingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
