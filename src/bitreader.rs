use crate::decompress::DecompressError;
use crate::util::ByteSource;

/// Size of each refill requested from the host
pub const INBUF_SIZE: usize = 1024;

/// LSB-first code reader over a host [ByteSource]
///
/// Never reads past `limit` bytes of compressed input.
pub struct BitReader {
    limit: u64,
    consumed: u64,
    inbuf: [u8; INBUF_SIZE],
    inbuf_pos: usize,
    inbuf_len: usize,
    acc: u32,
    nbits: u32,
}
impl BitReader {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            consumed: 0,
            inbuf: [0; INBUF_SIZE],
            inbuf_pos: 0,
            inbuf_len: 0,
            acc: 0,
            nbits: 0,
        }
    }

    /// Compressed bytes taken from the host so far
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    fn refill(&mut self, src: &mut impl ByteSource) -> Result<(), DecompressError> {
        self.inbuf_pos = 0;
        self.inbuf_len = 0;

        let remaining = self.limit - self.consumed;
        let want = usize::try_from(remaining).map_or(INBUF_SIZE, |r| r.min(INBUF_SIZE));
        if want == 0 {
            return Err(DecompressError::GenericError);
        }

        log::trace!("refilling {} bytes at offset {}", want, self.consumed);
        if src.fill(&mut self.inbuf[..want]) != want {
            return Err(DecompressError::ReadFailure);
        }
        self.inbuf_len = want;
        Ok(())
    }

    fn next_byte(&mut self, src: &mut impl ByteSource) -> Result<u8, DecompressError> {
        if self.consumed >= self.limit {
            return Err(DecompressError::InsufficientInput);
        }
        if self.inbuf_pos >= self.inbuf_len {
            self.refill(src)?;
        }

        let b = self.inbuf[self.inbuf_pos];
        self.inbuf_pos += 1;
        self.consumed += 1;
        Ok(b)
    }

    /// Read the next `width`-bit code (9 to 13 bits)
    pub fn next_code(
        &mut self,
        src: &mut impl ByteSource,
        width: u32,
    ) -> Result<u16, DecompressError> {
        debug_assert!(width <= 16);

        while self.nbits < width {
            let b = self.next_byte(src)?;
            self.acc |= (b as u32) << self.nbits;
            self.nbits += 8;
        }

        let code = self.acc & ((1 << width) - 1);
        self.acc >>= width;
        self.nbits -= width;
        Ok(code as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Source that hands out at most `max` bytes per fill
    struct Stingy<'a> {
        data: &'a [u8],
        max: usize,
    }
    impl<'a> ByteSource for Stingy<'a> {
        fn fill(&mut self, buf: &mut [u8]) -> usize {
            let len = usize::min(usize::min(buf.len(), self.max), self.data.len());
            buf[..len].copy_from_slice(&self.data[..len]);
            self.data = &self.data[len..];
            len
        }
    }

    #[test]
    fn test_lsb_first_packing() {
        // 9-bit codes 0x041, 0x100, 0x1ff
        // bits (LSB first): 0x041 | 0x100 << 9 | 0x1ff << 18
        let v: u32 = 0x041 | (0x100 << 9) | (0x1ff << 18);
        let data = v.to_le_bytes();
        let mut src = &data[..];
        let mut br = BitReader::new(4);
        assert_eq!(br.next_code(&mut src, 9), Ok(0x041));
        assert_eq!(br.next_code(&mut src, 9), Ok(0x100));
        assert_eq!(br.next_code(&mut src, 9), Ok(0x1ff));
        assert_eq!(br.consumed(), 4);
    }

    #[test]
    fn test_mixed_widths() {
        let v: u32 = 0x155 | (0x1aaa << 9);
        let data = v.to_le_bytes();
        let mut src = &data[..];
        let mut br = BitReader::new(3);
        assert_eq!(br.next_code(&mut src, 9), Ok(0x155));
        assert_eq!(br.next_code(&mut src, 13), Ok(0x1aaa));
        assert_eq!(br.consumed(), 3);
    }

    #[test]
    fn test_limit_reached() {
        let data = [0xffu8; 8];
        let mut src = &data[..];
        // only one byte is declared, a 9-bit code needs two
        let mut br = BitReader::new(1);
        assert_eq!(
            br.next_code(&mut src, 9),
            Err(DecompressError::InsufficientInput)
        );
        assert_eq!(br.consumed(), 1);
    }

    #[test]
    fn test_short_refill() {
        let data = [0u8; 4];
        let mut src = Stingy {
            data: &data,
            max: 1,
        };
        let mut br = BitReader::new(4);
        assert_eq!(br.next_code(&mut src, 9), Err(DecompressError::ReadFailure));
    }

    #[test]
    fn test_refill_in_chunks() {
        // 120 groups of 8 codes * 9 bits, spans two refills
        let data = [0u8; 9 * 120];
        let mut src = &data[..];
        let mut br = BitReader::new(data.len() as u64);
        for _ in 0..8 * 120 {
            assert_eq!(br.next_code(&mut src, 9), Ok(0));
        }
        assert_eq!(br.consumed(), data.len() as u64);
        assert_eq!(src.len(), 0);
    }
}
