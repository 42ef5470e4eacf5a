// Content hashing module
// Streaming SHA-256 digests used to decide whether two files hold the same bytes

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};

/// Length of a hex-encoded SHA-256 digest
pub const HASH_HEX_LEN: usize = 64;

const BUFFER_SIZE: usize = 64 * 1024;

/// Hash a file by streaming it through SHA-256 in fixed-size chunks
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).map_err(|e| Error::from_io_error(e, "opening for hash", path))?;
    hash_reader(&mut file).map_err(|e| Error::from_io_error(e, "hashing", path))
}

/// Hash everything a reader yields
pub fn hash_reader(reader: &mut impl Read) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(bytes_to_hex(&hasher.finalize()))
}

/// Hash an in-memory buffer
pub fn hash_bytes(data: &[u8]) -> String {
    bytes_to_hex(&Sha256::digest(data))
}

fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
