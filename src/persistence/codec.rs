//! Byte codecs applied between the JSON snapshot and the storage medium.

use crate::error::Result;

// == Codec ==
/// Transforms snapshot bytes on their way to and from the medium.
pub trait Codec: Send + Sync {
    fn compress(&self, bytes: &[u8]) -> Vec<u8>;
    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>>;
}

/// Passes bytes through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl Codec for IdentityCodec {
    fn compress(&self, bytes: &[u8]) -> Vec<u8> {
        bytes.to_vec()
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_codec_passthrough() {
        let codec = IdentityCodec;
        let data = br#"{"entries":{}}"#;
        assert_eq!(codec.compress(data), data.to_vec());
        assert_eq!(codec.decompress(data).unwrap(), data.to_vec());
    }
}
