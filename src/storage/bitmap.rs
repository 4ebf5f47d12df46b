// Null bitmap
// One bit per row, kept apart from the value array; a set bit means "no value"

/// Dense bit-per-row null flags packed into 64-bit words.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NullBitmap {
    words: Vec<u64>,
    len: usize,
}

impl NullBitmap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bitmap of `len` rows, none of them null.
    pub fn with_len(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, row: usize) -> bool {
        debug_assert!(row < self.len, "row {} out of bounds ({})", row, self.len);
        (self.words[row / 64] >> (row % 64)) & 1 == 1
    }

    #[inline]
    pub fn set(&mut self, row: usize, null: bool) {
        debug_assert!(row < self.len, "row {} out of bounds ({})", row, self.len);
        let mask = 1u64 << (row % 64);
        if null {
            self.words[row / 64] |= mask;
        } else {
            self.words[row / 64] &= !mask;
        }
    }

    /// Sets every row in `start..end` to `null`.
    pub fn set_range(&mut self, start: usize, end: usize, null: bool) {
        for row in start..end.min(self.len) {
            self.set(row, null);
        }
    }

    /// Grows or truncates to `len` rows. Added rows start out not null.
    pub fn resize(&mut self, len: usize) {
        if len < self.len {
            // Clear the bits past the new end so a later grow sees zeros.
            let tail = len % 64;
            self.words.truncate(len.div_ceil(64));
            if tail != 0 {
                if let Some(last) = self.words.last_mut() {
                    *last &= (1u64 << tail) - 1;
                }
            }
        } else {
            self.words.resize(len.div_ceil(64), 0);
        }
        self.len = len;
    }

    pub fn copy_bit(&mut self, src: usize, dst: usize) {
        let null = self.get(src);
        self.set(dst, null);
    }

    /// How many of `rows` are not null.
    pub fn count_not_null(&self, rows: &[usize]) -> usize {
        rows.iter().filter(|&&row| !self.get(row)).count()
    }

    /// Total number of null rows.
    pub fn count_null(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}
