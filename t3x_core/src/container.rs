//! The `.t3x` container envelope.
//!
//! A container is three segments separated by the first two colons:
//!
//! ```text
//! <md5 hex of decompressed payload>:<compression tag>:<payload>
//! ```
//!
//! The payload is taken verbatim after the second colon and may itself
//! contain colons. Once decompressed it holds a serialized manifest (see
//! [`crate::serialize`]) whose root is a mapping.

use crate::error::{Error, Result};
use crate::serialize;
use crate::value::{Mapping, ValueNode};
use flate2::Compression as Level;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use md5::{Digest, Md5};
use std::io::{Read, Write};

/// Segment delimiter.
pub const DELIMITER: u8 = b':';

/// Supported payload compression methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Payload stored as-is.
    Identity,
    /// zlib-wrapped DEFLATE, as produced by PHP's `gzcompress()`.
    Zlib,
}

impl Compression {
    /// The tag written into new containers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::Identity => "",
            Compression::Zlib => "gzcompress",
        }
    }

    /// Look up a tag read from a container.
    pub fn parse(tag: &[u8]) -> Result<Self> {
        match tag {
            b"" | b"none" => Ok(Compression::Identity),
            b"gzcompress" | b"compress" => Ok(Compression::Zlib),
            _ => Err(Error::unsupported_compression(
                String::from_utf8_lossy(tag).into_owned(),
            )),
        }
    }

    /// Decompress a payload.
    pub fn decompress(&self, payload: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::Identity => Ok(payload.to_vec()),
            Compression::Zlib => {
                let mut out = Vec::new();
                ZlibDecoder::new(payload)
                    .read_to_end(&mut out)
                    .map_err(|e| Error::corrupt_archive(format!("zlib payload: {}", e)))?;
                Ok(out)
            }
        }
    }

    /// Compress a payload.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::Identity => Ok(data.to_vec()),
            Compression::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Level::default());
                encoder.write_all(data)?;
                Ok(encoder.finish()?)
            }
        }
    }
}

/// Lowercase hex MD5 digest of `data`.
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// A container split into its three segments, borrowing the input buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container<'a> {
    /// Declared checksum of the decompressed payload.
    pub checksum: &'a [u8],
    /// Raw compression tag.
    pub tag: &'a [u8],
    /// Possibly compressed payload.
    pub payload: &'a [u8],
}

impl<'a> Container<'a> {
    /// Split raw container bytes on the first two delimiters.
    pub fn split(bytes: &'a [u8]) -> Result<Self> {
        let mut parts = bytes.splitn(3, |&b| b == DELIMITER);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(checksum), Some(tag), Some(payload)) => Ok(Self {
                checksum,
                tag,
                payload,
            }),
            _ => Err(Error::corrupt_archive(
                "expected <checksum>:<compression>:<payload>",
            )),
        }
    }

    /// Validate, decompress and deserialize the payload.
    pub fn open(&self) -> Result<Mapping> {
        let compression = Compression::parse(self.tag)?;
        let content = compression.decompress(self.payload)?;

        let actual = checksum(&content);
        if actual.as_bytes() != self.checksum {
            return Err(Error::checksum_mismatch(
                String::from_utf8_lossy(self.checksum),
                actual,
            ));
        }

        match serialize::from_bytes(&content)? {
            ValueNode::Mapping(root) => Ok(root),
            other => Err(Error::malformed_manifest(format!(
                "root must be a mapping, found {}",
                other.kind()
            ))),
        }
    }
}

/// Decode raw container bytes into the manifest's root mapping.
pub fn decode(bytes: &[u8]) -> Result<Mapping> {
    let root = Container::split(bytes)?.open()?;
    log::debug!("Decoded manifest with {} top-level entries", root.len());
    Ok(root)
}

/// Build container bytes for a manifest.
pub fn encode(manifest: &Mapping, compression: Compression) -> Result<Vec<u8>> {
    let content = serialize::to_bytes(&ValueNode::Mapping(manifest.clone()));
    let payload = compression.compress(&content)?;

    let mut out = Vec::with_capacity(32 + payload.len() + 16);
    out.extend_from_slice(checksum(&content).as_bytes());
    out.push(DELIMITER);
    out.extend_from_slice(compression.as_str().as_bytes());
    out.push(DELIMITER);
    out.extend_from_slice(&payload);
    Ok(out)
}
