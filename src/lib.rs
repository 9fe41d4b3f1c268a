#![no_std]

mod bitreader;
mod decompress;
mod table;
mod util;

#[cfg(feature = "alloc")]
pub use decompress::decompress_to_vec;
#[cfg(feature = "std")]
pub use decompress::decompress_stream;
pub use decompress::{
    decompress_to_buf, DecodeOutcome, DecompressError, ShrinkDecoder, ShrinkParams,
    INITIAL_CODE_WIDTH, MAX_CODE_WIDTH,
};
pub use table::{ESCAPE_CODE, FIRST_DYNAMIC_CODE, NUM_CODES};
#[cfg(feature = "alloc")]
pub use util::VecOutput;
pub use util::{BufOutput, ByteSink, ByteSource, NoObserver, ShrinkObserver};
#[cfg(feature = "std")]
pub use util::{IoSink, IoSource};

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;
