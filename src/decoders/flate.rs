//! FlateDecode (zlib/deflate) for xref and object-stream containers.

use crate::error::{Error, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Decompress a FlateDecode payload.
///
/// Tries standard zlib first, then raw deflate. Some producers emit
/// streams with a corrupt or missing zlib wrapper but valid deflate data.
pub fn inflate(input: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    let mut decoder = ZlibDecoder::new(input);
    match decoder.read_to_end(&mut output) {
        Ok(_) => Ok(output),
        Err(zlib_err) => {
            log::debug!("zlib decode failed ({}), trying raw deflate", zlib_err);
            output.clear();
            let mut decoder = DeflateDecoder::new(input);
            match decoder.read_to_end(&mut output) {
                Ok(_) => Ok(output),
                Err(deflate_err) => Err(Error::CorruptStream(format!(
                    "FlateDecode failed (zlib: {}, deflate: {})",
                    zlib_err, deflate_err
                ))),
            }
        },
    }
}

/// Compress a payload for a `/Filter /FlateDecode` stream.
pub fn deflate(input: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(input)?;
    Ok(encoder.finish()?)
}
