// Prefix sums of instruction lengths: where each instruction of a window
// starts in that window's target.

use crate::svndiff::DiffWindow;

#[derive(Debug, Default, Clone)]
pub struct OffsetIndex {
    // offs[i] is the target position of instruction i; the last entry is
    // the target length.
    offs: Vec<u64>,
}

impl OffsetIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild for `window`, keeping the allocation.
    pub fn rebuild(&mut self, window: &DiffWindow) {
        self.offs.clear();
        self.offs.reserve(window.instructions().len() + 1);
        let mut pos = 0u64;
        for inst in window.instructions() {
            self.offs.push(pos);
            pos += u64::from(inst.length);
        }
        self.offs.push(pos);
    }

    /// Number of indexed instructions.
    #[inline]
    pub fn len(&self) -> usize {
        self.offs.len().saturating_sub(1)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start of instruction `i` in the target.
    #[inline]
    pub fn start(&self, i: usize) -> u64 {
        self.offs[i]
    }

    /// End of instruction `i` in the target.
    #[inline]
    pub fn end(&self, i: usize) -> u64 {
        self.offs[i + 1]
    }

    /// Total target length covered.
    #[inline]
    pub fn total(&self) -> u64 {
        self.offs.last().copied().unwrap_or(0)
    }

    /// Index of the instruction covering `offset`. `hint` is a guess,
    /// usually the instruction that led here; `None` if `offset` is past the
    /// end.
    pub fn locate(&self, offset: u64, hint: usize) -> Option<usize> {
        let n = self.len();
        if offset >= self.total() {
            return None;
        }
        let (lo, hi) = if hint < n {
            if offset < self.offs[hint] {
                (0, hint)
            } else if offset < self.offs[hint + 1] {
                return Some(hint);
            } else {
                (hint + 1, n)
            }
        } else {
            (0, n)
        };
        let found = self.offs[lo..hi].partition_point(|&o| o <= offset);
        found.checked_sub(1).map(|i| lo + i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::svndiff::Instruction;

    fn index() -> OffsetIndex {
        let w = DiffWindow::new(
            0,
            10,
            9,
            vec![
                Instruction::source(0, 4),
                Instruction::new_data(0, 2),
                Instruction::target(0, 3),
            ],
            b"ab".to_vec(),
        );
        let mut idx = OffsetIndex::new();
        idx.rebuild(&w);
        idx
    }

    #[test]
    fn prefix_sums() {
        let idx = index();
        assert_eq!(idx.len(), 3);
        assert_eq!((idx.start(1), idx.end(1)), (4, 6));
        assert_eq!(idx.total(), 9);
    }

    #[test]
    fn locate_finds_covering_instruction() {
        let idx = index();
        assert_eq!(idx.locate(0, 0), Some(0));
        assert_eq!(idx.locate(3, 0), Some(0));
        assert_eq!(idx.locate(4, 0), Some(1));
        assert_eq!(idx.locate(8, 0), Some(2));
        assert_eq!(idx.locate(8, 2), Some(2));
        assert_eq!(idx.locate(9, 0), None);
        assert_eq!(idx.locate(1, 2), Some(0));
        assert_eq!(idx.locate(5, 0), Some(1));
    }
}
