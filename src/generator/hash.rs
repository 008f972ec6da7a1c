// Block hashing for the delta generator.
//
// `RollingHash` is an Adler-style checksum over a fixed-width block that
// can slide forward one byte at a time. `BlockTable` maps checksums of
// block-aligned source positions to those positions; last write wins, and
// a stored 0 means an empty bucket.

/// LCG multiplier used to spread checksums over buckets.
const HASH_MULT_32: u32 = 1_597_334_677;

/// Added to stored positions so 0 can mark an empty bucket.
const POS_OFFSET: u32 = 1;

#[derive(Debug, Clone, Copy)]
pub struct RollingHash {
    look: usize,
}

impl RollingHash {
    pub fn new(look: usize) -> Self {
        Self { look }
    }

    #[inline]
    pub fn look(&self) -> usize {
        self.look
    }

    /// Checksum of `block[..look]`.
    #[inline]
    pub fn checksum(&self, block: &[u8]) -> u32 {
        debug_assert!(block.len() >= self.look);
        let mut low: u32 = 0;
        let mut high: u32 = 0;
        for &b in &block[..self.look] {
            low = low.wrapping_add(u32::from(b) + 1);
            high = high.wrapping_add(low);
        }
        ((high & 0xFFFF) << 16) | (low & 0xFFFF)
    }

    /// Slide the window one byte: drop `old`, append `new`.
    #[inline]
    pub fn update(&self, cksum: u32, old: u8, new: u8) -> u32 {
        let old_c = u32::from(old) + 1;
        let new_c = u32::from(new) + 1;
        let low = cksum.wrapping_sub(old_c).wrapping_add(new_c) & 0xFFFF;
        let high = (cksum >> 16)
            .wrapping_sub(old_c.wrapping_mul(self.look as u32))
            .wrapping_add(low)
            & 0xFFFF;
        (high << 16) | low
    }
}

/// Source block positions keyed by checksum.
#[derive(Debug, Default)]
pub struct BlockTable {
    buckets: Vec<u32>,
    shift: u32,
}

impl BlockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every block-aligned position of `source`, replacing the
    /// previous contents.
    pub fn index(&mut self, hash: &RollingHash, source: &[u8]) {
        let look = hash.look();
        let blocks = source.len() / look;
        let bits = (blocks.max(8) * 2).next_power_of_two().trailing_zeros().min(31);
        self.shift = 32 - bits;
        self.buckets.clear();
        self.buckets.resize(1usize << bits, 0);

        for pos in (0..blocks).map(|b| b * look) {
            let cksum = hash.checksum(&source[pos..]);
            let bucket = self.bucket(cksum);
            self.buckets[bucket] = pos as u32 + POS_OFFSET;
        }
    }

    #[inline]
    fn bucket(&self, cksum: u32) -> usize {
        (cksum.wrapping_mul(HASH_MULT_32) >> self.shift) as usize
    }

    #[inline]
    pub fn lookup(&self, cksum: u32) -> Option<usize> {
        if self.buckets.is_empty() {
            return None;
        }
        match self.buckets[self.bucket(cksum)] {
            0 => None,
            stored => Some((stored - POS_OFFSET) as usize),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|&b| b == 0)
    }
}

/// Length of the common prefix of `a` and `b`.
#[inline]
pub fn match_forward(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Number of leading bytes of `data` equal to `data[0]`.
#[inline]
pub fn run_length(data: &[u8]) -> usize {
    match data.first() {
        Some(&first) => data.iter().take_while(|&&b| b == first).count(),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_update_matches_full_checksum() {
        let data: Vec<u8> = (0..200u32).map(|i| (i * 31 % 251) as u8).collect();
        let hash = RollingHash::new(16);
        let mut ck = hash.checksum(&data);
        for p in 1..data.len() - 16 {
            ck = hash.update(ck, data[p - 1], data[p + 15]);
            assert_eq!(ck, hash.checksum(&data[p..]), "position {p}");
        }
    }

    #[test]
    fn table_finds_indexed_blocks() {
        let hash = RollingHash::new(16);
        let mut table = BlockTable::new();
        let single: Vec<u8> = (100..120u8).collect();
        table.index(&hash, &single);
        assert!(!table.is_empty());
        assert_eq!(table.lookup(hash.checksum(&single)), Some(0));

        let source: Vec<u8> = (0..64u8).collect();
        table.index(&hash, &source);
        let found = table.lookup(hash.checksum(&source[32..])).unwrap();
        assert_eq!(found % 16, 0);
    }

    #[test]
    fn empty_source_has_no_entries() {
        let mut table = BlockTable::new();
        table.index(&RollingHash::new(16), &[]);
        assert!(table.is_empty());
    }

    #[test]
    fn scanners() {
        assert_eq!(match_forward(b"abcdef", b"abcxef"), 3);
        assert_eq!(run_length(b"aaaab"), 4);
        assert_eq!(run_length(b""), 0);
    }
}
