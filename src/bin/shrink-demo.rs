use std::{
    env,
    error::Error,
    ffi::OsString,
    fs::File,
    io::{BufReader, BufWriter, Write},
};

use shrink_rs::*;

#[cfg(feature = "std")]
fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<OsString> = env::args_os().collect();

    if args.len() < 4 {
        println!(
            "Usage: {} input output uncompressed_size",
            args[0].to_string_lossy()
        );
        return Ok(());
    }

    let inp_fn = &args[1];
    let outp_fn = &args[2];
    let uncompressed_size: u64 = match args[3].to_str().map(str::parse) {
        Some(Ok(n)) => n,
        _ => {
            println!("Invalid size {}", args[3].to_string_lossy());
            return Ok(());
        }
    };

    let inp_f = File::open(inp_fn)?;
    let compressed_size = inp_f.metadata()?.len();
    let mut src = IoSource(BufReader::new(inp_f));
    let mut sink = IoSink(BufWriter::new(File::create(outp_fn)?));

    let outcome = ShrinkDecoder::new_boxed(ShrinkParams::new(compressed_size, uncompressed_size))
        .run(&mut src, &mut sink, &mut NoObserver);
    sink.0.flush()?;

    println!(
        "consumed {} bytes, produced {} bytes",
        outcome.consumed, outcome.produced
    );
    outcome.into_result()?;

    Ok(())
}

#[cfg(not(feature = "std"))]
fn main() {
    println!("Demo requires std feature");
}
