// Window combination.
//
// `combine(window, accumulated)` rewrites `accumulated`, whose source view is
// the target of `window`, into a single window over `window`'s source view.
// Copies `accumulated` makes from its source are resolved against the
// instructions of `window`; ranges resolved once are remembered in the
// RangeIndex so later copies of the same bytes become target copies.

use log::debug;

use super::builder::WindowBuilder;
use super::offsets::OffsetIndex;
use super::range_index::{RangeIndex, RangeKind, RangeListNode};
use crate::error::{DeltaError, Result};
use crate::svndiff::{DiffWindow, Instruction, InstructionKind};

/// Default bound on nested pattern resolution.
pub const DEFAULT_MAX_DEPTH: usize = 4096;

/// Composes a chain of windows, newest first.
///
/// Windows are added from the newest delta towards the base. Each one is
/// folded into the accumulated window until a window that needs no source
/// bytes ends the chain, or the caller applies the result to the base text
/// with [`Combiner::finish`].
#[derive(Debug)]
pub struct Combiner {
    accumulated: Option<DiffWindow>,
    index: RangeIndex,
    offsets: OffsetIndex,
    builder: WindowBuilder,
    pieces: Vec<RangeListNode>,
    tasks: Vec<Task>,
    scratch: Vec<u8>,
    max_depth: usize,
    windows_combined: u64,
}

impl Default for Combiner {
    fn default() -> Self {
        Self::new()
    }
}

impl Combiner {
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            accumulated: None,
            index: RangeIndex::new(),
            offsets: OffsetIndex::new(),
            builder: WindowBuilder::new(),
            pieces: Vec::new(),
            tasks: Vec::new(),
            scratch: Vec::new(),
            max_depth,
            windows_combined: 0,
        }
    }

    #[inline]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// The window accumulated so far.
    #[inline]
    pub fn accumulated(&self) -> Option<&DiffWindow> {
        self.accumulated.as_ref()
    }

    pub fn take_accumulated(&mut self) -> Option<DiffWindow> {
        self.accumulated.take()
    }

    /// Number of `combine` calls performed over the combiner's lifetime.
    #[inline]
    pub fn windows_combined(&self) -> u64 {
        self.windows_combined
    }

    /// Feed the next (older) window of the chain.
    ///
    /// Returns the reconstructed bytes when `window` needs no source, which
    /// completes the chain and resets the combiner. Otherwise the window is
    /// folded into the accumulated one and `None` is returned.
    pub fn add_window(&mut self, window: &DiffWindow) -> Result<Option<Vec<u8>>> {
        if window.is_self_contained() {
            window.apply_view_into(&[], &mut self.scratch)?;
            let out = match self.accumulated.take() {
                Some(acc) => acc.apply_view(&self.scratch)?,
                None => std::mem::take(&mut self.scratch),
            };
            self.reset();
            return Ok(Some(out));
        }
        self.accumulate(window)?;
        Ok(None)
    }

    /// Fold `window` into the accumulated window without the self-contained
    /// shortcut.
    pub fn accumulate(&mut self, window: &DiffWindow) -> Result<()> {
        let combined = match self.accumulated.take() {
            Some(acc) => self.combine(window, &acc)?,
            None => window.clone(),
        };
        self.accumulated = Some(combined);
        Ok(())
    }

    /// Apply the accumulated window to the base text and reset.
    ///
    /// With nothing accumulated the result is empty.
    pub fn finish(&mut self, base: &[u8]) -> Result<Vec<u8>> {
        let out = match self.accumulated.take() {
            Some(acc) => acc.apply(base)?,
            None => Vec::new(),
        };
        self.reset();
        Ok(out)
    }

    /// Return to the initial state, keeping scratch capacity.
    pub fn reset(&mut self) {
        self.accumulated = None;
        self.index.dispose();
        self.builder.clear();
        self.pieces.clear();
        self.tasks.clear();
        self.scratch.clear();
    }

    /// Compose `accumulated` (whose source is `window`'s target) with
    /// `window`.
    ///
    /// The result reads `window`'s source view and produces `accumulated`'s
    /// target.
    pub fn combine(
        &mut self,
        window: &DiffWindow,
        accumulated: &DiffWindow,
    ) -> Result<DiffWindow> {
        window.validate()?;
        accumulated.validate()?;

        self.offsets.rebuild(window);
        self.index.dispose();
        self.builder.clear();

        let result = self.combine_instructions(window, accumulated);
        self.index.dispose();
        result?;

        let combined = self.builder.finish(
            window.source_view_offset(),
            window.source_view_len(),
            accumulated.target_view_len(),
        )?;
        self.windows_combined += 1;
        debug!(
            "combined window: {} + {} instructions -> {} ({} bytes new data)",
            window.instructions().len(),
            accumulated.instructions().len(),
            combined.instructions().len(),
            combined.new_data().len()
        );
        Ok(combined)
    }

    fn combine_instructions(
        &mut self,
        window: &DiffWindow,
        accumulated: &DiffWindow,
    ) -> Result<()> {
        let mut target_offset = 0u64;
        for inst in accumulated.instructions() {
            match inst.kind {
                InstructionKind::CopyFromTarget => {
                    self.builder
                        .push_target(u64::from(inst.offset), u64::from(inst.length))?;
                }
                InstructionKind::CopyFromNewData => {
                    let bytes = new_data_slice(accumulated, inst, 0, u64::from(inst.length))?;
                    self.builder.push_new_data(bytes)?;
                }
                InstructionKind::CopyFromSource => {
                    self.resolve_source_copy(window, inst, target_offset)?;
                }
            }
            target_offset += u64::from(inst.length);
        }
        Ok(())
    }

    /// Resolve a source copy of the accumulated window against `window`.
    fn resolve_source_copy(
        &mut self,
        window: &DiffWindow,
        inst: &Instruction,
        target_offset: u64,
    ) -> Result<()> {
        let start = inst.offset;
        let end = start + inst.length;

        let list = self.index.query(start, end);
        self.pieces.clear();
        self.pieces.extend(self.index.iter_list(&list).copied());
        self.index.release(list);

        let mut resolver = Resolver {
            window,
            offsets: &self.offsets,
            builder: &mut self.builder,
            tasks: &mut self.tasks,
            max_depth: self.max_depth,
        };
        let mut tgt = target_offset;
        for piece in &self.pieces {
            let len = u64::from(piece.limit - piece.offset);
            match piece.kind {
                RangeKind::FromTarget => resolver
                    .builder
                    .push_target(u64::from(piece.target_offset), len)?,
                RangeKind::FromSource => resolver.copy_source_ops(
                    u64::from(piece.offset),
                    u64::from(piece.limit),
                    tgt,
                )?,
            }
            tgt += len;
        }
        debug_assert_eq!(tgt, target_offset + u64::from(inst.length));

        let mapped = u32::try_from(target_offset)
            .map_err(|_| DeltaError::corrupt("target offset exceeds 32 bits"))?;
        self.index.insert(start, end, mapped);
        Ok(())
    }
}

/// Compose two windows with a throwaway combiner.
pub fn combine(window: &DiffWindow, accumulated: &DiffWindow) -> Result<DiffWindow> {
    Combiner::new().combine(window, accumulated)
}

fn new_data_slice<'w>(
    w: &'w DiffWindow,
    inst: &Instruction,
    skip: u64,
    len: u64,
) -> Result<&'w [u8]> {
    let start = (u64::from(inst.offset) + skip) as usize;
    w.new_data()
        .get(start..start + len as usize)
        .ok_or_else(|| DeltaError::corrupt("new data copy outside the new data"))
}

/// Pending work of [`Resolver::copy_source_ops`], kept on a heap stack so
/// nesting depth is not bounded by the thread stack.
#[derive(Debug, Clone, Copy)]
enum Task {
    /// Produce `[offset, limit)` of the older target at `target_offset`.
    Range {
        offset: u64,
        limit: u64,
        target_offset: u64,
        hint: usize,
        depth: usize,
    },
    /// Continue a range from instruction `i` of the older window.
    Resume {
        offset: u64,
        limit: u64,
        target_offset: u64,
        i: usize,
        depth: usize,
    },
    /// Repeat `len` bytes of already combined output starting at `offset`.
    Repeat { offset: u64, len: u64 },
}

/// Translates ranges of the older window's target into instructions over
/// its source view.
struct Resolver<'a> {
    window: &'a DiffWindow,
    offsets: &'a OffsetIndex,
    builder: &'a mut WindowBuilder,
    tasks: &'a mut Vec<Task>,
    max_depth: usize,
}

impl Resolver<'_> {
    /// Emit instructions producing `[offset, limit)` of the older target,
    /// placed at `target_offset` of the combined target.
    ///
    /// Tasks are popped in output order, so each expansion pushes its parts
    /// last-first. A failed call may leave tasks behind; the next call
    /// starts from a cleared stack.
    fn copy_source_ops(&mut self, offset: u64, limit: u64, target_offset: u64) -> Result<()> {
        self.tasks.clear();
        self.tasks.push(Task::Range {
            offset,
            limit,
            target_offset,
            hint: 0,
            depth: 0,
        });

        while let Some(task) = self.tasks.pop() {
            match task {
                Task::Range {
                    offset,
                    limit,
                    target_offset,
                    hint,
                    depth,
                } => {
                    if depth > self.max_depth {
                        return Err(DeltaError::corrupt(format!(
                            "target copy references nest deeper than {}",
                            self.max_depth
                        )));
                    }
                    if limit > self.offsets.total() {
                        return Err(DeltaError::corrupt(format!(
                            "copy of {offset}..{limit} reaches past the older target of {} bytes",
                            self.offsets.total()
                        )));
                    }
                    let i = self.offsets.locate(offset, hint).ok_or_else(|| {
                        DeltaError::corrupt(format!(
                            "offset {offset} is not covered by any instruction"
                        ))
                    })?;
                    self.scan(offset, limit, target_offset, i, depth)?;
                }
                Task::Resume {
                    offset,
                    limit,
                    target_offset,
                    i,
                    depth,
                } => self.scan(offset, limit, target_offset, i, depth)?,
                Task::Repeat { offset, len } => self.builder.push_target(offset, len)?,
            }
        }
        Ok(())
    }

    /// Walk the older window's instructions from `i` over `[offset, limit)`.
    /// Stops early at the first target copy that needs resolving, leaving
    /// the rest of the walk on the task stack.
    fn scan(
        &mut self,
        offset: u64,
        limit: u64,
        mut target_offset: u64,
        mut i: usize,
        depth: usize,
    ) -> Result<()> {
        let window = self.window;
        let ops = window.instructions();
        while i < ops.len() && self.offsets.start(i) < limit {
            let op = &ops[i];
            let (off0, off1) = (self.offsets.start(i), self.offsets.end(i));
            let op_off = u64::from(op.offset);
            let op_len = u64::from(op.length);
            let fix_offset = offset.saturating_sub(off0);
            let fix_limit = off1.saturating_sub(limit);
            if fix_offset + fix_limit >= op_len {
                return Err(DeltaError::corrupt(format!(
                    "instruction {i} narrowed to nothing"
                )));
            }
            let len = op_len - fix_offset - fix_limit;

            match op.kind {
                InstructionKind::CopyFromSource => {
                    self.builder.push_source(op_off + fix_offset, len)?;
                }
                InstructionKind::CopyFromNewData => {
                    let bytes = new_data_slice(window, op, fix_offset, len)?;
                    self.builder.push_new_data(bytes)?;
                }
                InstructionKind::CopyFromTarget => {
                    if op_off >= off0 {
                        return Err(DeltaError::corrupt(format!(
                            "target copy {i} starts at or after its own position"
                        )));
                    }
                    self.tasks.push(Task::Resume {
                        offset,
                        limit,
                        target_offset: target_offset + len,
                        i: i + 1,
                        depth,
                    });
                    if op_off + op_len - fix_limit <= off0 {
                        self.tasks.push(Task::Range {
                            offset: op_off + fix_offset,
                            limit: op_off + op_len - fix_limit,
                            target_offset,
                            hint: i,
                            depth: depth + 1,
                        });
                    } else {
                        self.push_pattern(op_off, off0, len, fix_offset, target_offset, i, depth);
                    }
                    return Ok(());
                }
            }

            target_offset += len;
            i += 1;
        }
        Ok(())
    }

    /// Queue an overlapping target copy of `len` bytes. Its output repeats
    /// the period `off0 - op_off`: the first period (rotated to the
    /// requested phase) is resolved as nested ranges, the rest becomes one
    /// target copy of the combined output.
    #[allow(clippy::too_many_arguments)]
    fn push_pattern(
        &mut self,
        op_off: u64,
        off0: u64,
        len: u64,
        fix_offset: u64,
        target_offset: u64,
        hint: usize,
        depth: usize,
    ) {
        let ptn_len = off0 - op_off;
        let ptn_overlap = fix_offset % ptn_len;
        let first = len.min(ptn_len - ptn_overlap);
        let second = (len - first).min(ptn_overlap);
        let rest = len - first - second;

        if rest > 0 {
            log::trace!("pattern of {ptn_len} bytes tiled over {rest} bytes");
            self.tasks.push(Task::Repeat {
                offset: target_offset + first + second - ptn_len,
                len: rest,
            });
        }
        if second > 0 {
            self.tasks.push(Task::Range {
                offset: op_off,
                limit: op_off + second,
                target_offset: target_offset + first,
                hint,
                depth: depth + 1,
            });
        }
        self.tasks.push(Task::Range {
            offset: op_off + ptn_overlap,
            limit: op_off + ptn_overlap + first,
            target_offset,
            hint,
            depth: depth + 1,
        });
    }
}
