//! LZMA compression helpers backing the frame codec's `data` field.
//!
//! Any LZMA variant is acceptable as long as both ends agree; this
//! implementation uses the legacy ".lzma" (LZMA1) stream format with
//! encoder defaults, via the pure-Rust `lzma-rs` crate.

use std::io::{self, Cursor};

pub fn compress(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut output = Vec::new();
    lzma_rs::lzma_compress(&mut Cursor::new(bytes), &mut output)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(output)
}

pub fn decompress(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut output = Vec::new();
    lzma_rs::lzma_decompress(&mut Cursor::new(bytes), &mut output)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_decompress_round_trips() {
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(100);
        let compressed = compress(&payload).unwrap();
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(decompressed, payload);
    }

    #[test]
    fn empty_input_round_trips() {
        let compressed = compress(&[]).unwrap();
        let decompressed = decompress(&compressed).unwrap();
        assert!(decompressed.is_empty());
    }
}
