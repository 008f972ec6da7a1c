// Delta chain reconstruction.
//
// A revision stored as a chain of deltas is rebuilt chunk by chunk. The
// members are ordered newest first; chunk k is produced by window k of the
// newest member, whose source is chunk k of the next member's target, and
// so on down to the base text.
//
// For each chunk the windows are fed into a Combiner. A window that needs
// no source ends the walk early, otherwise the combined window is applied
// to the base. Members that were not needed for a chunk are advanced lazily
// the next time they are read, by skipping windows without decoding them.

use std::io::{Read, Write};

use log::{debug, warn};

use crate::combine::Combiner;
use crate::error::{DeltaError, Result};
use crate::svndiff::{DiffWindow, WindowReader, WindowWriter};

struct ChainMember<R: Read> {
    reader: WindowReader<R>,
    /// Windows consumed (read or skipped) so far.
    position: u64,
}

impl<R: Read> ChainMember<R> {
    /// Window `chunk`, skipping any earlier windows not read yet.
    fn window_at(&mut self, chunk: u64) -> Result<Option<DiffWindow>> {
        if self.position > chunk {
            return Err(DeltaError::corrupt(format!(
                "chunk {chunk} requested after window {} was consumed",
                self.position
            )));
        }
        while self.position < chunk {
            self.reader.skip_window()?;
            self.position += 1;
        }
        let window = self.reader.next_window()?;
        if window.is_some() {
            self.position += 1;
        }
        Ok(window)
    }
}

/// Chain of delta readers over a base text.
pub struct DeltaChain<'a, R: Read> {
    members: Vec<ChainMember<R>>,
    base: &'a [u8],
    combiner: Combiner,
    chunks: u64,
    bytes_reconstructed: u64,
}

impl<'a, R: Read> DeltaChain<'a, R> {
    /// `members` are ordered newest first; the last one applies to `base`.
    pub fn new(members: Vec<WindowReader<R>>, base: &'a [u8]) -> Self {
        Self::with_combiner(members, base, Combiner::new())
    }

    pub fn with_combiner(
        members: Vec<WindowReader<R>>,
        base: &'a [u8],
        combiner: Combiner,
    ) -> Self {
        Self {
            members: members
                .into_iter()
                .map(|reader| ChainMember {
                    reader,
                    position: 0,
                })
                .collect(),
            base,
            combiner,
            chunks: 0,
            bytes_reconstructed: 0,
        }
    }

    /// Chunks produced so far.
    #[inline]
    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    #[inline]
    pub fn bytes_reconstructed(&self) -> u64 {
        self.bytes_reconstructed
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Reconstruct the next chunk, or `None` once the newest delta has no
    /// more windows.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let chunk = self.chunks;
        match self.reconstruct_chunk(chunk) {
            Ok(Some(bytes)) => {
                self.chunks += 1;
                self.bytes_reconstructed += bytes.len() as u64;
                debug!("chunk {chunk}: {} bytes", bytes.len());
                Ok(Some(bytes))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!("reconstruction aborted at chunk {chunk}: {e}");
                self.combiner.reset();
                Err(e)
            }
        }
    }

    fn reconstruct_chunk(&mut self, chunk: u64) -> Result<Option<Vec<u8>>> {
        self.combiner.reset();
        for (depth, member) in self.members.iter_mut().enumerate() {
            let Some(window) = member.window_at(chunk)? else {
                if depth == 0 {
                    return Ok(None);
                }
                return Err(DeltaError::corrupt(format!(
                    "delta {depth} of the chain ends before chunk {chunk}"
                )));
            };
            if let Some(bytes) = self.combiner.add_window(&window)? {
                return Ok(Some(bytes));
            }
        }
        if self.members.is_empty() {
            return Ok(None);
        }
        self.combiner.finish(self.base).map(Some)
    }

    /// Write every remaining chunk to `out`. Returns the bytes written.
    pub fn read_to_end<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<u64> {
        let mut total = 0u64;
        while let Some(bytes) = self.next_chunk()? {
            out.write_all(&bytes)?;
            total += bytes.len() as u64;
        }
        Ok(total)
    }

    /// Write one combined window per remaining chunk instead of bytes. The
    /// resulting delta applies directly to the base. Returns the number of
    /// windows written.
    pub fn combine_to<W: Write>(&mut self, writer: &mut WindowWriter<W>) -> Result<u64> {
        let mut written = 0u64;
        loop {
            let chunk = self.chunks;
            match self.combine_chunk(chunk) {
                Ok(Some(window)) => {
                    writer.write_window(&window)?;
                    self.chunks += 1;
                    self.bytes_reconstructed += u64::from(window.target_view_len());
                    written += 1;
                }
                Ok(None) => return Ok(written),
                Err(e) => {
                    warn!("combination aborted at chunk {chunk}: {e}");
                    self.combiner.reset();
                    return Err(e);
                }
            }
        }
    }

    fn combine_chunk(&mut self, chunk: u64) -> Result<Option<DiffWindow>> {
        self.combiner.reset();
        for (depth, member) in self.members.iter_mut().enumerate() {
            let Some(window) = member.window_at(chunk)? else {
                if depth == 0 {
                    return Ok(None);
                }
                return Err(DeltaError::corrupt(format!(
                    "delta {depth} of the chain ends before chunk {chunk}"
                )));
            };
            self.combiner.accumulate(&window)?;
            if self
                .combiner
                .accumulated()
                .is_some_and(DiffWindow::is_self_contained)
            {
                break;
            }
        }
        Ok(self.combiner.take_accumulated())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::generator::{self, GeneratorOptions};
    use crate::svndiff::{Version, encode_stream, writer::WriterOptions};

    fn opts() -> GeneratorOptions {
        GeneratorOptions {
            window_size: 32,
            ..Default::default()
        }
    }

    fn delta(source: &[u8], target: &[u8]) -> Vec<u8> {
        let windows = generator::generate(source, target, opts()).unwrap();
        encode_stream(&windows, WriterOptions::default()).unwrap()
    }

    fn readers(deltas: &[Vec<u8>]) -> Vec<WindowReader<Cursor<Vec<u8>>>> {
        deltas
            .iter()
            .rev()
            .map(|d| WindowReader::from_stream(Cursor::new(d.clone())).unwrap())
            .collect()
    }

    fn revisions() -> Vec<Vec<u8>> {
        let r0: Vec<u8> = (0..100u32).map(|i| (i * 17 % 251) as u8).collect();
        let mut r1 = r0.clone();
        r1[10..20].copy_from_slice(b"0123456789");
        let mut r2 = r1.clone();
        r2.truncate(70);
        r2.extend_from_slice(&[b'x'; 30]);
        let mut r3 = r2.clone();
        r3.splice(40..40, b"insert".iter().copied());
        vec![r0, r1, r2, r3]
    }

    #[test]
    fn reconstructs_each_revision() {
        let revs = revisions();
        let deltas: Vec<Vec<u8>> = revs.windows(2).map(|p| delta(&p[0], &p[1])).collect();

        for upto in 1..=deltas.len() {
            let mut chain = DeltaChain::new(readers(&deltas[..upto]), &revs[0]);
            let mut out = Vec::new();
            let n = chain.read_to_end(&mut out).unwrap();
            assert_eq!(out, revs[upto], "revision {upto}");
            assert_eq!(n, revs[upto].len() as u64);
            assert_eq!(chain.bytes_reconstructed(), n);
        }
    }

    #[test]
    fn combined_delta_applies_to_base() {
        let revs = revisions();
        let deltas: Vec<Vec<u8>> = revs.windows(2).map(|p| delta(&p[0], &p[1])).collect();

        let mut chain = DeltaChain::new(readers(&deltas), &revs[0]);
        let mut writer = WindowWriter::with_header(Vec::new(), WriterOptions::default()).unwrap();
        let windows = chain.combine_to(&mut writer).unwrap();
        assert_eq!(windows, revs[3].len().div_ceil(32) as u64);

        let combined = writer.into_inner();
        let mut single = DeltaChain::new(
            vec![WindowReader::from_stream(Cursor::new(combined)).unwrap()],
            &revs[0],
        );
        let mut out = Vec::new();
        single.read_to_end(&mut out).unwrap();
        assert_eq!(out, revs[3]);
    }

    #[test]
    fn self_contained_newest_skips_older_members() {
        let base = b"base text that is long enough";
        let older = delta(base, b"first revision text!");
        let newest = delta(b"", b"entirely new content");
        let mut chain = DeltaChain::new(readers(&[older, newest]), base);
        assert_eq!(chain.next_chunk().unwrap().unwrap(), b"entirely new content");
        assert!(chain.next_chunk().unwrap().is_none());
        assert_eq!(chain.chunks(), 1);
    }

    #[test]
    fn truncated_older_member_is_corrupt() {
        let base = vec![b'a'; 64];
        let r1: Vec<u8> = (0..64u8).collect();
        let mut r2 = r1.clone();
        r2[5] = 0;
        let d1 = delta(&base, &r1);
        let d2 = delta(&r1, &r2);

        // Keep only the first window of the older delta.
        let mut reader = WindowReader::from_stream(Cursor::new(d1)).unwrap();
        let first = reader.read_window().unwrap();
        let short = encode_stream(&[first], WriterOptions::default()).unwrap();

        let mut chain = DeltaChain::new(readers(&[short, d2]), &base);
        assert!(chain.next_chunk().unwrap().is_some());
        assert!(chain.next_chunk().unwrap_err().is_corrupt_window());
    }

    #[test]
    fn version_one_members_mix_with_version_zero() {
        let revs = revisions();
        let w1 = generator::generate(&revs[0], &revs[1], opts()).unwrap();
        let v1 = encode_stream(
            &w1,
            WriterOptions {
                version: Version::V1,
                ..Default::default()
            },
        )
        .unwrap();
        let v0 = delta(&revs[1], &revs[2]);
        let mut chain = DeltaChain::new(readers(&[v1, v0]), &revs[0]);
        let mut out = Vec::new();
        chain.read_to_end(&mut out).unwrap();
        assert_eq!(out, revs[2]);
    }
}
