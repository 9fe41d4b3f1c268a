use core::fmt;

use crate::bitreader::BitReader;
use crate::table::{CodeTable, ESCAPE_CODE, NUM_CODES};
use crate::util::*;

/// Code width at the start of every stream
pub const INITIAL_CODE_WIDTH: u32 = 9;
/// Code width can never grow past this
pub const MAX_CODE_WIDTH: u32 = 13;
/// Capacity of the output staging buffer
pub const OUTBUF_SIZE: usize = 1024;

/// Second code after an escape that grows the code width
const CTRL_GROW_WIDTH: u16 = 1;
/// Second code after an escape that requests a partial clear
const CTRL_PARTIAL_CLEAR: u16 = 2;

/// Decompression errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecompressError {
    /// The source returned fewer bytes than were requested
    ReadFailure,
    /// The declared compressed size ran out before a full code was read
    InsufficientInput,
    /// The stream broke the escape protocol or overflowed the code table
    BadData,
    /// The sink accepted fewer bytes than were offered
    WriteFailure,
    /// Internal inconsistency, such as a cycle in the code table
    GenericError,
}

impl fmt::Display for DecompressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecompressError::ReadFailure => write!(f, "read from input failed"),
            DecompressError::InsufficientInput => write!(f, "input was truncated"),
            DecompressError::BadData => write!(f, "invalid compressed data"),
            DecompressError::WriteFailure => write!(f, "write to output failed"),
            DecompressError::GenericError => write!(f, "internal decoder error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecompressError {}

/// Size limits for one decompression session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShrinkParams {
    /// Number of compressed bytes available from the source
    pub compressed_size: u64,
    /// Number of bytes to produce; decoding stops exactly here
    pub uncompressed_size: u64,
}
impl ShrinkParams {
    pub fn new(compressed_size: u64, uncompressed_size: u64) -> Self {
        Self {
            compressed_size,
            uncompressed_size,
        }
    }
}

/// What a session did, handed back to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOutcome {
    /// First error encountered, if any
    pub error: Option<DecompressError>,
    /// Compressed bytes consumed
    pub consumed: u64,
    /// Decompressed bytes delivered to the sink
    pub produced: u64,
}
impl DecodeOutcome {
    /// Returns the number of bytes produced, or the recorded error
    pub fn into_result(self) -> Result<u64, DecompressError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.produced),
        }
    }
}

/// Staging buffer in front of the host sink
///
/// Never lets more than `target` bytes through.
struct OutputBuffer {
    buf: [u8; OUTBUF_SIZE],
    used: usize,
    flushed: u64,
    target: u64,
}

fn put_all(
    sink: &mut impl ByteSink,
    bytes: &[u8],
    flushed: &mut u64,
) -> Result<(), DecompressError> {
    if bytes.is_empty() {
        return Ok(());
    }
    if sink.put_bytes(bytes) != bytes.len() {
        return Err(DecompressError::WriteFailure);
    }
    *flushed += bytes.len() as u64;
    Ok(())
}

impl OutputBuffer {
    fn new(target: u64) -> Self {
        Self {
            buf: [0; OUTBUF_SIZE],
            used: 0,
            flushed: 0,
            target,
        }
    }

    /// Flushed plus buffered
    fn total(&self) -> u64 {
        self.flushed + self.used as u64
    }

    fn flush(&mut self, sink: &mut impl ByteSink) -> Result<(), DecompressError> {
        let used = core::mem::replace(&mut self.used, 0);
        put_all(sink, &self.buf[..used], &mut self.flushed)
    }

    fn write(&mut self, sink: &mut impl ByteSink, bytes: &[u8]) -> Result<(), DecompressError> {
        let room = usize::try_from(self.target - self.total()).unwrap_or(usize::MAX);
        let bytes = &bytes[..usize::min(bytes.len(), room)];

        if self.used + bytes.len() <= OUTBUF_SIZE {
            self.buf[self.used..self.used + bytes.len()].copy_from_slice(bytes);
            self.used += bytes.len();
            return Ok(());
        }

        self.flush(sink)?;

        if bytes.len() > OUTBUF_SIZE {
            put_all(sink, bytes, &mut self.flushed)
        } else {
            self.buf[..bytes.len()].copy_from_slice(bytes);
            self.used = bytes.len();
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitFirstCode,
    SteadyState,
    Done,
}

/// Holds all state for one Shrink decompression session
///
/// This is a few tens of KiB. [ShrinkDecoder::new_boxed] keeps it on the heap
/// for the rest of its life, but it is still built on the stack first.
pub struct ShrinkDecoder {
    params: ShrinkParams,
    state: State,
    width: u32,
    prev_code: u16,
    last_value: u8,
    table: CodeTable,
    bits: BitReader,
    out: OutputBuffer,
}
impl ShrinkDecoder {
    /// Allocate a new session
    pub fn new(params: ShrinkParams) -> Self {
        Self {
            params,
            state: State::AwaitFirstCode,
            width: INITIAL_CODE_WIDTH,
            prev_code: 0,
            last_value: 0,
            table: CodeTable::new(),
            bits: BitReader::new(params.compressed_size),
            out: OutputBuffer::new(params.uncompressed_size),
        }
    }
    #[cfg(feature = "alloc")]
    /// Allocate a new session and move it to the heap
    ///
    /// Note: this does not avoid the temporary on the stack in [ShrinkDecoder::new].
    pub fn new_boxed(params: ShrinkParams) -> alloc::boxed::Box<Self> {
        alloc::boxed::Box::new(Self::new(params))
    }

    fn reset(&mut self) {
        self.state = State::AwaitFirstCode;
        self.width = INITIAL_CODE_WIDTH;
        self.prev_code = 0;
        self.last_value = 0;
        self.table.reset();
        self.bits = BitReader::new(self.params.compressed_size);
        self.out = OutputBuffer::new(self.params.uncompressed_size);
    }

    /// Current code width in bits
    pub fn code_width(&self) -> u32 {
        self.width
    }

    fn emit(&mut self, code: u16, sink: &mut impl ByteSink) -> Result<(), DecompressError> {
        let run = self
            .table
            .resolve(code, self.prev_code, &mut self.last_value)?;
        self.out.write(sink, run)
    }

    fn process_data_code(
        &mut self,
        code: u16,
        sink: &mut impl ByteSink,
    ) -> Result<(), DecompressError> {
        if code as usize >= NUM_CODES {
            return Err(DecompressError::GenericError);
        }

        match self.state {
            State::AwaitFirstCode => {
                self.emit(code, sink)?;
                self.prev_code = code;
                self.last_value = code as u8;
                self.state = State::SteadyState;
            }
            State::SteadyState => {
                if self.table.contains(code) {
                    // emit, then add <prev> + first byte of this run
                    self.emit(code, sink)?;
                    self.table.insert(self.prev_code, self.last_value)?;
                } else {
                    // KwKwK: the entry must exist before it can be emitted
                    self.table.insert(self.prev_code, self.last_value)?;
                    self.emit(self.table.last_added(), sink)?;
                }
                self.prev_code = code;
            }
            State::Done => return Err(DecompressError::GenericError),
        }

        Ok(())
    }

    fn process_control_code(
        &mut self,
        src: &mut impl ByteSource,
        observer: &mut impl ShrinkObserver,
    ) -> Result<(), DecompressError> {
        let n = self.bits.next_code(src, self.width)?;
        match n {
            CTRL_GROW_WIDTH if self.width < MAX_CODE_WIDTH => {
                self.width += 1;
                log::debug!("code width now {} bits", self.width);
                observer.on_width_grow(self.width);
            }
            CTRL_PARTIAL_CLEAR => {
                observer.on_before_partial_clear();
                let freed = self.table.partial_clear();
                log::debug!(
                    "partial clear freed {} codes (highest used {})",
                    freed,
                    self.table.highest_used()
                );
            }
            _ => {
                log::debug!("bad control code {} at width {}", n, self.width);
                return Err(DecompressError::BadData);
            }
        }
        Ok(())
    }

    fn decode_loop(
        &mut self,
        src: &mut impl ByteSource,
        sink: &mut impl ByteSink,
        observer: &mut impl ShrinkObserver,
    ) -> Result<(), DecompressError> {
        while self.out.total() < self.params.uncompressed_size {
            let code = self.bits.next_code(src, self.width)?;
            if code == ESCAPE_CODE {
                self.process_control_code(src, observer)?;
            } else {
                self.process_data_code(code, sink)?;
            }
        }
        Ok(())
    }

    /// Run the session to completion
    ///
    /// Output produced before an error is still delivered to `sink`, unless
    /// the sink itself failed.
    pub fn run(
        &mut self,
        src: &mut impl ByteSource,
        sink: &mut impl ByteSink,
        observer: &mut impl ShrinkObserver,
    ) -> DecodeOutcome {
        self.reset();

        let mut error = self.decode_loop(src, sink, observer).err();
        if error != Some(DecompressError::WriteFailure) {
            if let Err(e) = self.out.flush(sink) {
                error.get_or_insert(e);
            }
        }
        self.state = State::Done;

        let ret = DecodeOutcome {
            error,
            consumed: self.bits.consumed(),
            produced: self.out.flushed,
        };
        if let Some(e) = ret.error {
            log::warn!(
                "shrink decode failed: {} (consumed {}, produced {})",
                e,
                ret.consumed,
                ret.produced
            );
        }
        ret
    }
}

/// Decompress the input into a preallocated buffer
///
/// The whole buffer is the declared uncompressed size.
/// Returns the decompressed size on success, or an error otherwise.
pub fn decompress_to_buf(inp: &[u8], outp: &mut [u8]) -> Result<usize, DecompressError> {
    let params = ShrinkParams::new(inp.len() as u64, outp.len() as u64);
    let mut src = inp;
    let mut outp: BufOutput = outp.into();

    #[cfg(feature = "alloc")]
    let mut dec = ShrinkDecoder::new_boxed(params);
    #[cfg(not(feature = "alloc"))]
    let mut dec = ShrinkDecoder::new(params);

    dec.run(&mut src, &mut outp, &mut NoObserver).into_result()?;
    Ok(outp.pos)
}

#[cfg(feature = "alloc")]
/// Decompress the input into a [Vec](alloc::vec::Vec)
///
/// Returns the result on success, or an error otherwise
pub fn decompress_to_vec(
    inp: &[u8],
    uncompressed_size: usize,
) -> Result<alloc::vec::Vec<u8>, DecompressError> {
    let params = ShrinkParams::new(inp.len() as u64, uncompressed_size as u64);
    let mut src = inp;
    // the declared size comes from untrusted headers, only use it as a hint
    let capacity_hint = usize::min(uncompressed_size, inp.len().saturating_mul(8));
    let mut ret: VecOutput = alloc::vec::Vec::with_capacity(capacity_hint).into();
    ShrinkDecoder::new_boxed(params)
        .run(&mut src, &mut ret, &mut NoObserver)
        .into_result()?;
    Ok(ret.vec)
}

#[cfg(feature = "std")]
/// Decompress `compressed_size` bytes from a reader into a writer
///
/// Returns the number of bytes written on success, or an error otherwise
pub fn decompress_stream<R: std::io::Read, W: std::io::Write>(
    reader: R,
    compressed_size: u64,
    writer: W,
    uncompressed_size: u64,
) -> Result<u64, DecompressError> {
    let params = ShrinkParams::new(compressed_size, uncompressed_size);
    let mut src = IoSource(reader);
    let mut sink = IoSink(writer);
    ShrinkDecoder::new_boxed(params)
        .run(&mut src, &mut sink, &mut NoObserver)
        .into_result()
}
