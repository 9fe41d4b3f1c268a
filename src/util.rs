/// Host-side supplier of compressed bytes
///
/// Note: the decoder always asks for exactly as many bytes as it still
/// expects, so a short fill is never retried.
pub trait ByteSource {
    /// Fill `buf` completely and return the number of bytes written.
    ///
    /// Returning anything other than `buf.len()` fails the session with
    /// [ReadFailure](crate::DecompressError::ReadFailure).
    fn fill(&mut self, buf: &mut [u8]) -> usize;
}

impl ByteSource for &[u8] {
    fn fill(&mut self, buf: &mut [u8]) -> usize {
        let len = usize::min(buf.len(), self.len());
        buf[..len].copy_from_slice(&self[..len]);
        *self = &self[len..];
        len
    }
}

/// Host-side consumer of decompressed bytes
pub trait ByteSink {
    /// Consume `bytes` and return how many were accepted.
    ///
    /// Returning anything other than `bytes.len()` fails the session with
    /// [WriteFailure](crate::DecompressError::WriteFailure).
    fn put_bytes(&mut self, bytes: &[u8]) -> usize;
}

/// Optional host bookkeeping hooks
///
/// Both methods default to doing nothing.
pub trait ShrinkObserver {
    /// Called after the code width has grown to `new_width` bits
    fn on_width_grow(&mut self, new_width: u32) {
        let _ = new_width;
    }
    /// Called right before a partial clear is applied to the code table
    fn on_before_partial_clear(&mut self) {}
}

/// Observer that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoObserver;
impl ShrinkObserver for NoObserver {}

pub struct BufOutput<'a> {
    pub pos: usize,
    pub buf: &'a mut [u8],
}
impl<'a> From<&'a mut [u8]> for BufOutput<'a> {
    fn from(buf: &'a mut [u8]) -> Self {
        Self { pos: 0, buf }
    }
}
impl<'a> ByteSink for BufOutput<'a> {
    fn put_bytes(&mut self, bytes: &[u8]) -> usize {
        // short-consume when full, but still write up to the limit
        let len = usize::min(bytes.len(), self.buf.len() - self.pos);
        self.buf[self.pos..self.pos + len].copy_from_slice(&bytes[..len]);
        self.pos += len;
        len
    }
}

#[cfg(feature = "alloc")]
pub struct VecOutput {
    pub vec: alloc::vec::Vec<u8>,
}
#[cfg(feature = "alloc")]
impl From<alloc::vec::Vec<u8>> for VecOutput {
    fn from(vec: alloc::vec::Vec<u8>) -> Self {
        Self { vec }
    }
}
#[cfg(feature = "alloc")]
impl ByteSink for VecOutput {
    fn put_bytes(&mut self, bytes: &[u8]) -> usize {
        self.vec.extend_from_slice(bytes);
        bytes.len()
    }
}

/// Adapts any [Read](std::io::Read) into a [ByteSource]
#[cfg(feature = "std")]
pub struct IoSource<R>(pub R);
#[cfg(feature = "std")]
impl<R: std::io::Read> ByteSource for IoSource<R> {
    fn fill(&mut self, buf: &mut [u8]) -> usize {
        let mut filled = 0;
        while filled < buf.len() {
            match self.0.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    log::debug!("source read failed: {}", e);
                    break;
                }
            }
        }
        filled
    }
}

/// Adapts any [Write](std::io::Write) into a [ByteSink]
#[cfg(feature = "std")]
pub struct IoSink<W>(pub W);
#[cfg(feature = "std")]
impl<W: std::io::Write> ByteSink for IoSink<W> {
    fn put_bytes(&mut self, bytes: &[u8]) -> usize {
        match self.0.write_all(bytes) {
            Ok(()) => bytes.len(),
            Err(e) => {
                log::debug!("sink write failed: {}", e);
                0
            }
        }
    }
}
