//! Gzip helpers for frame payloads

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::{Error, Result};

/// Gzip-compress a payload
///
/// # Errors
///
/// Returns error if the encoder fails to write
pub fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2 + 32), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompress a gzip payload
///
/// # Errors
///
/// Returns `MalformedFrame` if the payload is not valid gzip
pub fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::MalformedFrame(format!("gzip: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_empty_payload() {
        let packed = gzip(&[]).unwrap();
        // Gzip always emits a header, even for empty input
        assert!(!packed.is_empty());
        assert!(gunzip(&packed).unwrap().is_empty());
    }

    #[test]
    fn test_gunzip_rejects_garbage() {
        let err = gunzip(b"definitely not gzip").unwrap_err();
        assert!(err.is_decode_error());
    }
}
