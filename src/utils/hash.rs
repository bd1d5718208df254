//! Hash and byte-statistics calculation.
//!
//! All digests and the byte histogram are fed from the same chunks, so a file
//! is only ever read once.

use crate::core::error::{Error, Result};
use crate::core::types::HashDigests;
use md5::{Digest, Md5};
use sha1::Sha1;
use sha2::Sha256;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Chunk size for streaming reads and in-memory hashing (8KB).
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Running state for md5/sha1/sha256 and the byte-value histogram.
#[derive(Clone)]
pub struct ContentDigest {
    md5: Md5,
    sha1: Sha1,
    sha256: Sha256,
    histogram: [u64; 256],
    len: u64,
}

impl Default for ContentDigest {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentDigest {
    pub fn new() -> Self {
        Self {
            md5: Md5::new(),
            sha1: Sha1::new(),
            sha256: Sha256::new(),
            histogram: [0u64; 256],
            len: 0,
        }
    }

    /// Feed one chunk to every accumulator.
    pub fn update(&mut self, chunk: &[u8]) {
        self.md5.update(chunk);
        self.sha1.update(chunk);
        self.sha256.update(chunk);
        for &byte in chunk {
            self.histogram[byte as usize] += 1;
        }
        self.len += chunk.len() as u64;
    }

    /// Number of bytes fed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte-value histogram of everything fed so far.
    pub fn histogram(&self) -> &[u64; 256] {
        &self.histogram
    }

    /// Finalize the digests and return them with the histogram.
    pub fn finalize(self) -> (HashDigests, [u64; 256]) {
        let digests = HashDigests {
            md5: hex::encode(self.md5.finalize()),
            sha1: hex::encode(self.sha1.finalize()),
            sha256: hex::encode(self.sha256.finalize()),
        };
        (digests, self.histogram)
    }
}

/// A file read in a single pass, with everything derived from that pass.
#[derive(Debug, Clone)]
pub struct DigestedFile {
    /// Full content, for the classification and matching stages
    pub content: Vec<u8>,
    pub hashes: HashDigests,
    /// Byte-value histogram of `content`
    pub histogram: [u64; 256],
}

/// Hash calculator for files and buffers.
pub struct HashCalculator;

impl HashCalculator {
    /// Compute md5/sha1/sha256 of a buffer, in fixed-size chunks.
    pub fn compute_hashes(data: &[u8]) -> HashDigests {
        Self::digest_bytes(data).finalize().0
    }

    /// Run a buffer through a fresh [`ContentDigest`].
    pub fn digest_bytes(data: &[u8]) -> ContentDigest {
        let mut digest = ContentDigest::new();
        for chunk in data.chunks(CHUNK_SIZE) {
            digest.update(chunk);
        }
        digest
    }

    /// Read a file once, hashing and histogramming as it streams in.
    ///
    /// With `limit` set, files larger than `limit` bytes are refused before the
    /// read and again if they grow while being read.
    pub fn digest_file(path: &Path, limit: Option<u64>) -> Result<DigestedFile> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::PathNotFound(path.to_path_buf())
            } else {
                Error::file_read(path, e)
            }
        })?;
        let metadata = file.metadata().map_err(|e| Error::file_read(path, e))?;
        if metadata.is_dir() {
            return Err(Error::file_read(
                path,
                std::io::Error::new(std::io::ErrorKind::Other, "path is a directory"),
            ));
        }

        let size = metadata.len();
        if let Some(limit) = limit {
            if size > limit {
                return Err(Error::FileTooLarge {
                    path: path.to_path_buf(),
                    size,
                    limit,
                });
            }
        }

        let mut reader = BufReader::with_capacity(CHUNK_SIZE, file);
        let mut digest = ContentDigest::new();
        let mut content = Vec::with_capacity(size as usize);
        let mut buffer = [0u8; CHUNK_SIZE];

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .map_err(|e| Error::file_read(path, e))?;
            if bytes_read == 0 {
                break;
            }
            digest.update(&buffer[..bytes_read]);
            content.extend_from_slice(&buffer[..bytes_read]);

            if let Some(limit) = limit {
                if digest.len() > limit {
                    return Err(Error::FileTooLarge {
                        path: path.to_path_buf(),
                        size: digest.len(),
                        limit,
                    });
                }
            }
        }

        let (hashes, histogram) = digest.finalize();
        Ok(DigestedFile {
            content,
            hashes,
            histogram,
        })
    }
}
