// Delta generation: produce svndiff windows turning a source into a target.
//
// The target is cut into fixed-size windows. Window k reads the source
// chunk at the same offset, which is the layout chained representations
// rely on: the k-th window of a newer delta reads exactly what the k-th
// window of the delta below it produces.
//
// Within a window the scan is greedy:
//   1. runs of equal bytes become one literal byte plus an overlapping
//      target copy
//   2. block hashes locate source matches, extended in both directions
//   3. anything else is literal new data

pub mod hash;

use std::io::Write;

use log::debug;

use crate::combine::builder::WindowBuilder;
use crate::error::{DeltaError, Result};
use crate::svndiff::{DiffWindow, WindowWriter};
use hash::{BlockTable, RollingHash, match_forward, run_length};

/// Window size used by repository deltas (100 KiB).
pub const DEFAULT_WINDOW_SIZE: usize = 100 * 1024;

/// Width of the hashed source blocks.
pub const DEFAULT_BLOCK_SIZE: usize = 16;

/// Shortest run encoded as a target copy.
pub const DEFAULT_MIN_RUN: usize = 8;

/// Generator configuration.
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub window_size: usize,
    pub block_size: usize,
    pub min_run: usize,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            min_run: DEFAULT_MIN_RUN,
        }
    }
}

impl GeneratorOptions {
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 || u32::try_from(self.window_size).is_err() {
            return Err(DeltaError::InvalidOptions(format!(
                "window size {} must be between 1 and {}",
                self.window_size,
                u32::MAX
            )));
        }
        if self.block_size < 4 {
            return Err(DeltaError::InvalidOptions(format!(
                "block size {} is below 4",
                self.block_size
            )));
        }
        if self.min_run < 2 {
            return Err(DeltaError::InvalidOptions(format!(
                "minimum run {} is below 2",
                self.min_run
            )));
        }
        Ok(())
    }
}

/// Reusable delta generator.
#[derive(Debug)]
pub struct DeltaGenerator {
    opts: GeneratorOptions,
    hash: RollingHash,
    table: BlockTable,
    builder: WindowBuilder,
}

impl DeltaGenerator {
    pub fn new(opts: GeneratorOptions) -> Result<Self> {
        opts.validate()?;
        Ok(Self {
            hash: RollingHash::new(opts.block_size),
            opts,
            table: BlockTable::new(),
            builder: WindowBuilder::new(),
        })
    }

    #[inline]
    pub fn options(&self) -> &GeneratorOptions {
        &self.opts
    }

    /// All windows turning `source` into `target`. An empty target has no
    /// windows.
    pub fn generate(&mut self, source: &[u8], target: &[u8]) -> Result<Vec<DiffWindow>> {
        let ws = self.opts.window_size;
        let mut windows = Vec::with_capacity(target.len().div_ceil(ws));
        for (k, chunk) in target.chunks(ws).enumerate() {
            let (view_offset, view) = source_chunk(source, k, ws);
            windows.push(self.generate_window(view, view_offset, chunk)?);
        }
        debug!(
            "generated {} windows for {} -> {} bytes",
            windows.len(),
            source.len(),
            target.len()
        );
        Ok(windows)
    }

    /// Generate and serialize in one pass. Returns the number of windows.
    pub fn write_delta<W: Write>(
        &mut self,
        source: &[u8],
        target: &[u8],
        writer: &mut WindowWriter<W>,
    ) -> Result<u64> {
        let ws = self.opts.window_size;
        let mut count = 0u64;
        for (k, chunk) in target.chunks(ws).enumerate() {
            let (view_offset, view) = source_chunk(source, k, ws);
            let window = self.generate_window(view, view_offset, chunk)?;
            writer.write_window(&window)?;
            count += 1;
        }
        Ok(count)
    }

    /// One window producing `target` from `view`, which sits at
    /// `view_offset` of the full source.
    pub fn generate_window(
        &mut self,
        view: &[u8],
        view_offset: u64,
        target: &[u8],
    ) -> Result<DiffWindow> {
        let target_len = u32::try_from(target.len())
            .map_err(|_| DeltaError::InvalidOptions("target window exceeds 4 GiB".into()))?;
        let view_len = u32::try_from(view.len())
            .map_err(|_| DeltaError::InvalidOptions("source view exceeds 4 GiB".into()))?;

        let block = self.opts.block_size;
        self.table.index(&self.hash, view);
        self.builder.clear();

        let n = target.len();
        let mut p = 0usize;
        let mut literal_start = 0usize;
        let mut cksum: Option<u32> = None;

        while p < n {
            let run = run_length(&target[p..]);
            if run >= self.opts.min_run {
                self.builder.push_new_data(&target[literal_start..=p])?;
                self.builder.push_target(p as u64, (run - 1) as u64)?;
                p += run;
                literal_start = p;
                cksum = None;
                continue;
            }

            if p + block <= n {
                let ck = match cksum {
                    Some(ck) => ck,
                    None => self.hash.checksum(&target[p..]),
                };
                cksum = Some(ck);

                if let Some(s) = self.table.lookup(ck)
                    && view[s..s + block] == target[p..p + block]
                {
                    let len = block + match_forward(&view[s + block..], &target[p + block..]);
                    let mut back = 0usize;
                    while back < p - literal_start
                        && back < s
                        && view[s - back - 1] == target[p - back - 1]
                    {
                        back += 1;
                    }
                    self.builder
                        .push_new_data(&target[literal_start..p - back])?;
                    self.builder
                        .push_source((s - back) as u64, (len + back) as u64)?;
                    p += len;
                    literal_start = p;
                    cksum = None;
                    continue;
                }
            }

            cksum = match cksum {
                Some(ck) if p + block < n => {
                    Some(self.hash.update(ck, target[p], target[p + block]))
                }
                _ => None,
            };
            p += 1;
        }
        self.builder.push_new_data(&target[literal_start..])?;

        let sview_offset = if view.is_empty() { 0 } else { view_offset };
        self.builder.finish(sview_offset, view_len, target_len)
    }
}

/// The source chunk window `k` reads, with its offset.
fn source_chunk(source: &[u8], k: usize, window_size: usize) -> (u64, &[u8]) {
    let start = k.saturating_mul(window_size).min(source.len());
    let end = start.saturating_add(window_size).min(source.len());
    (start as u64, &source[start..end])
}

/// Generate windows with default-constructed state.
pub fn generate(source: &[u8], target: &[u8], opts: GeneratorOptions) -> Result<Vec<DiffWindow>> {
    DeltaGenerator::new(opts)?.generate(source, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::svndiff::{Instruction, InstructionKind};

    fn apply_all(windows: &[DiffWindow], source: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for w in windows {
            out.extend(w.apply(source).unwrap());
        }
        out
    }

    fn small() -> GeneratorOptions {
        GeneratorOptions {
            window_size: 64,
            ..Default::default()
        }
    }

    #[test]
    fn identical_input_is_one_source_copy() {
        let data: Vec<u8> = (0..60u8).collect();
        let windows = generate(&data, &data, small()).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].instructions(), &[Instruction::source(0, 60)]);
    }

    #[test]
    fn runs_become_overlapping_target_copies() {
        let mut target = b"head".to_vec();
        target.extend(std::iter::repeat_n(b'z', 40));
        let windows = generate(b"", &target, small()).unwrap();
        let w = &windows[0];
        assert!(w.is_self_contained());
        assert_eq!(
            w.instructions(),
            &[Instruction::new_data(0, 5), Instruction::target(4, 39)]
        );
        assert_eq!(w.apply(&[]).unwrap(), target);
    }

    #[test]
    fn windows_follow_source_chunks() {
        let source: Vec<u8> = (0..200u32).map(|i| (i * 7 % 256) as u8).collect();
        let mut target = source.clone();
        target[70] ^= 0xFF;
        target.extend_from_slice(b"tail");
        let windows = generate(&source, &target, small()).unwrap();
        assert_eq!(windows.len(), 4);
        assert_eq!(windows[1].source_view_offset(), 64);
        assert_eq!(windows[3].source_view_len(), 8);
        assert_eq!(apply_all(&windows, &source), target);
    }

    #[test]
    fn edits_mix_literals_and_copies() {
        let source: Vec<u8> = (0..1000u32).map(|i| (i * 13 % 253) as u8).collect();
        let mut target = source[..400].to_vec();
        target.extend_from_slice(b"-- inserted text --");
        target.extend_from_slice(&source[500..]);
        let windows = generate(&source, &target, GeneratorOptions::default()).unwrap();
        assert_eq!(windows.len(), 1);
        let w = &windows[0];
        assert!(
            w.instructions()
                .iter()
                .any(|i| i.kind == InstructionKind::CopyFromSource)
        );
        assert!(w.new_data().len() < 64);
        assert_eq!(w.apply(&source).unwrap(), target);
    }

    #[test]
    fn empty_target_has_no_windows() {
        assert!(generate(b"abc", b"", small()).unwrap().is_empty());
    }

    #[test]
    fn invalid_options_rejected() {
        let opts = GeneratorOptions {
            block_size: 2,
            ..Default::default()
        };
        assert!(matches!(
            DeltaGenerator::new(opts),
            Err(DeltaError::InvalidOptions(_))
        ));
    }
}
