use crate::decompress::DecompressError;

/// Total number of table slots (13-bit codes)
pub const NUM_CODES: usize = 8192;
/// Escape marker, introduces a control sequence
pub const ESCAPE_CODE: u16 = 256;
/// First slot that can be allocated dynamically
pub const FIRST_DYNAMIC_CODE: u16 = 257;

/// Parent sentinel
///
/// Roots always carry it, dynamic slots carrying it are free.
const INVALID_CODE: u16 = ESCAPE_CODE;

/// Longest possible parent chain
pub const MAX_CHAIN_LEN: usize = NUM_CODES - FIRST_DYNAMIC_CODE as usize + 1;

#[derive(Debug, Clone, Copy)]
struct Entry {
    parent: u16,
    value: u8,
    has_child: bool,
}

/// Shrink dictionary
///
/// This is a trie stored as parent back-pointers in a flat array.
/// Unlike classic LZW, slots are reused after a partial clear, so the next
/// free slot is found by scanning rather than by counting.
pub struct CodeTable {
    ct: [Entry; NUM_CODES],
    free_search_start: u16,
    highest_used: u16,
    last_added: u16,
    scratch: [u8; MAX_CHAIN_LEN],
}
impl CodeTable {
    pub fn new() -> Self {
        let mut ret = Self {
            ct: [Entry {
                parent: INVALID_CODE,
                value: 0,
                has_child: false,
            }; NUM_CODES],
            free_search_start: FIRST_DYNAMIC_CODE,
            highest_used: 0,
            last_added: 0,
            scratch: [0; MAX_CHAIN_LEN],
        };
        ret.reset();
        ret
    }

    /// Populate roots, free all dynamic slots
    pub fn reset(&mut self) {
        for (i, e) in self.ct.iter_mut().enumerate() {
            e.parent = INVALID_CODE;
            e.value = if i < 256 { i as u8 } else { 0 };
            e.has_child = false;
        }
        self.free_search_start = FIRST_DYNAMIC_CODE;
        self.highest_used = 0;
        self.last_added = 0;
    }

    /// Whether `code` can be resolved without a pending insertion
    pub fn contains(&self, code: u16) -> bool {
        code < ESCAPE_CODE
            || ((code as usize) < NUM_CODES
                && code != ESCAPE_CODE
                && self.ct[code as usize].parent != INVALID_CODE)
    }

    pub fn highest_used(&self) -> u16 {
        self.highest_used
    }

    pub fn last_added(&self) -> u16 {
        self.last_added
    }

    /// Add `parent` + `value` in the first free slot at or after the cursor
    ///
    /// Running out of slots is a stream error: encoders must clear first.
    pub fn insert(&mut self, parent: u16, value: u8) -> Result<u16, DecompressError> {
        let start = self.free_search_start as usize;
        let newpos = self.ct[start..]
            .iter()
            .position(|e| e.parent == INVALID_CODE)
            .map(|off| (start + off) as u16)
            .ok_or(DecompressError::BadData)?;

        let e = &mut self.ct[newpos as usize];
        e.parent = parent;
        e.value = value;
        self.last_added = newpos;
        self.free_search_start = newpos + 1;
        self.highest_used = u16::max(self.highest_used, newpos);
        Ok(newpos)
    }

    /// Expand `code` to its byte run
    ///
    /// `prev_code` and `last_value` stand in for a free slot met on the way,
    /// and `last_value` is updated to the first byte of the run.
    pub fn resolve(
        &mut self,
        code: u16,
        prev_code: u16,
        last_value: &mut u8,
    ) -> Result<&[u8], DecompressError> {
        // scratch is filled back to front
        let mut pos = MAX_CHAIN_LEN;
        let mut code = code;

        loop {
            if code as usize >= NUM_CODES {
                return Err(DecompressError::GenericError);
            }
            if pos == 0 {
                // cycle
                return Err(DecompressError::GenericError);
            }
            pos -= 1;

            let e = self.ct[code as usize];
            if code >= FIRST_DYNAMIC_CODE && e.parent == INVALID_CODE {
                self.scratch[pos] = *last_value;
                code = prev_code;
                continue;
            }

            self.scratch[pos] = e.value;
            if code < FIRST_DYNAMIC_CODE {
                if code == ESCAPE_CODE {
                    return Err(DecompressError::GenericError);
                }
                *last_value = e.value;
                break;
            }
            code = e.parent;
        }

        Ok(&self.scratch[pos..])
    }

    /// Free every dynamic slot that no other slot points at
    ///
    /// Returns the number of slots that were freed.
    pub fn partial_clear(&mut self) -> usize {
        let lo = FIRST_DYNAMIC_CODE as usize;
        let hi = self.highest_used as usize;
        let mut freed = 0;

        if hi >= lo {
            for i in lo..=hi {
                let parent = self.ct[i].parent;
                if parent != INVALID_CODE && parent >= FIRST_DYNAMIC_CODE {
                    self.ct[parent as usize].has_child = true;
                }
            }

            // marks on slots above `hi` are left set, as the legacy decoder does
            for e in &mut self.ct[lo..=hi] {
                if e.has_child {
                    e.has_child = false;
                } else {
                    if e.parent != INVALID_CODE {
                        freed += 1;
                    }
                    e.parent = INVALID_CODE;
                    e.value = 0;
                }
            }
        }

        self.free_search_start = FIRST_DYNAMIC_CODE;
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve_vec(t: &mut CodeTable, code: u16) -> Result<([u8; 8], usize), DecompressError> {
        let mut lv = 0;
        let run = t.resolve(code, 0, &mut lv)?;
        let mut out = [0u8; 8];
        out[..run.len()].copy_from_slice(run);
        Ok((out, run.len()))
    }

    #[test]
    fn test_roots() {
        let mut t = CodeTable::new();
        for c in 0..256u16 {
            let mut lv = 0;
            assert_eq!(t.resolve(c, 0, &mut lv).unwrap(), [c as u8]);
            assert_eq!(lv, c as u8);
            assert!(t.contains(c));
        }
        assert!(!t.contains(ESCAPE_CODE));
        assert!(!t.contains(FIRST_DYNAMIC_CODE));
        assert!(!t.contains(NUM_CODES as u16));
    }

    #[test]
    fn test_insert_and_resolve() {
        let mut t = CodeTable::new();
        assert_eq!(t.insert(b'a' as u16, b'b'), Ok(257));
        assert_eq!(t.insert(257, b'c'), Ok(258));
        assert_eq!(t.highest_used(), 258);
        assert_eq!(t.last_added(), 258);

        let mut lv = 0;
        assert_eq!(t.resolve(258, 0, &mut lv).unwrap(), b"abc");
        assert_eq!(lv, b'a');
    }

    #[test]
    fn test_escape_not_resolvable() {
        let mut t = CodeTable::new();
        assert_eq!(
            resolve_vec(&mut t, ESCAPE_CODE),
            Err(DecompressError::GenericError)
        );
        assert_eq!(resolve_vec(&mut t, 8192), Err(DecompressError::GenericError));
        assert_eq!(resolve_vec(&mut t, 0xffff), Err(DecompressError::GenericError));
    }

    #[test]
    fn test_cycle_detected() {
        let mut t = CodeTable::new();
        // 257 -> 258 -> 257
        assert_eq!(t.insert(258, 1), Ok(257));
        assert_eq!(t.insert(257, 2), Ok(258));
        assert_eq!(resolve_vec(&mut t, 257), Err(DecompressError::GenericError));
    }

    #[test]
    fn test_exhaustion() {
        let mut t = CodeTable::new();
        for i in FIRST_DYNAMIC_CODE as usize..NUM_CODES {
            assert_eq!(t.insert(0, 0), Ok(i as u16));
        }
        assert_eq!(t.insert(0, 0), Err(DecompressError::BadData));
        assert_eq!(t.highest_used(), (NUM_CODES - 1) as u16);
    }

    #[test]
    fn test_longest_chain() {
        let mut t = CodeTable::new();
        let mut prev = 7;
        for _ in FIRST_DYNAMIC_CODE as usize..NUM_CODES {
            prev = t.insert(prev, 9).unwrap();
        }
        let mut lv = 0;
        let run = t.resolve(prev, 0, &mut lv).unwrap();
        assert_eq!(run.len(), MAX_CHAIN_LEN);
        assert_eq!(run[0], 7);
        assert!(run[1..].iter().all(|&b| b == 9));
    }

    #[test]
    fn test_partial_clear() {
        let mut t = CodeTable::new();
        assert_eq!(t.insert(b'a' as u16, b'b'), Ok(257)); // ab
        assert_eq!(t.insert(257, b'c'), Ok(258)); // abc
        assert_eq!(t.insert(b'x' as u16, b'y'), Ok(259)); // xy
        assert_eq!(t.insert(257, b'd'), Ok(260)); // abd

        assert_eq!(t.partial_clear(), 3);

        // 257 is a parent and survives, the leaves are gone
        assert!(t.contains(257));
        assert!(!t.contains(258));
        assert!(!t.contains(259));
        assert!(!t.contains(260));
        let mut lv = 0;
        assert_eq!(t.resolve(257, 0, &mut lv).unwrap(), b"ab");

        // cursor restarts at the bottom, filling the holes
        assert_eq!(t.insert(b'q' as u16, b'r'), Ok(258));
        assert_eq!(t.highest_used(), 260);

        // survivors lose their mark, so a second clear frees them
        assert_eq!(t.partial_clear(), 2);
        assert!(!t.contains(257));
    }

    #[test]
    fn test_partial_clear_keeps_chains() {
        let mut t = CodeTable::new();
        let mut prev = b'z' as u16;
        for i in 0..100u8 {
            prev = t.insert(prev, i).unwrap();
        }
        t.insert(b'k' as u16, 1).unwrap();
        t.partial_clear();

        // every surviving entry still resolves to a root
        for code in FIRST_DYNAMIC_CODE..=t.highest_used() {
            if t.contains(code) {
                let mut lv = 0;
                let run = t.resolve(code, 0, &mut lv).unwrap();
                assert_eq!(run[0], b'z');
            }
        }
        assert!(!t.contains(prev));
    }

    #[test]
    fn test_free_slot_fallback() {
        let mut t = CodeTable::new();
        // 257 refers to 300 which is free
        t.insert(300, b'q').unwrap();
        let mut lv = b'w';
        assert_eq!(t.resolve(257, b'e' as u16, &mut lv).unwrap(), b"ewq");
        assert_eq!(lv, b'e');
    }
}
