//! Versioned artifact envelopes and atomic artifact files.
//!
//! Layout, all integers little-endian:
//!
//! | bytes | field                    |
//! |-------|--------------------------|
//! | 4     | magic, one per kind      |
//! | 2     | format version           |
//! | 8     | payload length           |
//! | 4     | CRC-32 of the payload    |
//! | n     | bincode payload          |

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Current artifact format version
pub const FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = 4 + 2 + 8 + 4;

/// The kinds of persisted artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Output of the metadata pass
    Metadata,

    /// A complete model bundle
    Bundle,
}

impl ArtifactKind {
    /// Magic bytes identifying this kind
    pub fn magic(self) -> [u8; 4] {
        match self {
            ArtifactKind::Metadata => *b"FSMD",
            ArtifactKind::Bundle => *b"FSBN",
        }
    }

    fn from_magic(magic: &[u8]) -> Option<Self> {
        [ArtifactKind::Metadata, ArtifactKind::Bundle]
            .into_iter()
            .find(|k| k.magic() == magic)
    }
}

/// Serialize `value` into an envelope
pub fn encode_artifact<T: Serialize>(kind: ArtifactKind, value: &T) -> Result<Vec<u8>> {
    let payload = bincode::serialize(value)?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&kind.magic());
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Check an envelope and deserialize its payload
pub fn decode_artifact<T: DeserializeOwned>(kind: ArtifactKind, bytes: &[u8]) -> Result<T> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::ArtifactLoad(format!(
            "truncated header: {} bytes",
            bytes.len()
        )));
    }
    let (header, payload) = bytes.split_at(HEADER_LEN);

    let magic = &header[0..4];
    if magic != kind.magic() {
        return Err(Error::ArtifactLoad(match ArtifactKind::from_magic(magic) {
            Some(found) => format!("expected a {kind:?} artifact, found {found:?}"),
            None => "not a flowsense artifact".to_string(),
        }));
    }

    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != FORMAT_VERSION {
        return Err(Error::ArtifactLoad(format!(
            "unsupported format version {version}, expected {FORMAT_VERSION}"
        )));
    }

    let mut len = [0u8; 8];
    len.copy_from_slice(&header[6..14]);
    let len = u64::from_le_bytes(len);
    if len != payload.len() as u64 {
        return Err(Error::ArtifactLoad(format!(
            "payload length {} does not match recorded length {len}",
            payload.len()
        )));
    }

    let mut crc = [0u8; 4];
    crc.copy_from_slice(&header[14..18]);
    if crc32fast::hash(payload) != u32::from_le_bytes(crc) {
        return Err(Error::ArtifactLoad("checksum mismatch".into()));
    }

    bincode::deserialize(payload)
        .map_err(|e| Error::ArtifactLoad(format!("payload does not decode: {e}")))
}

/// Write an artifact atomically: a sibling temp file is written, synced and
/// renamed over `path`
pub fn write_artifact<T: Serialize, P: AsRef<Path>>(path: P, kind: ArtifactKind, value: &T) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode_artifact(kind, value)?;
    let temp = temp_path(path);

    let written = (|| -> Result<()> {
        let file = File::create(&temp)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&bytes)?;
        let file = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        file.sync_all()?;
        fs::rename(&temp, path)?;
        Ok(())
    })();

    if written.is_err() {
        let _ = fs::remove_file(&temp);
    }
    written
}

/// Read and check an artifact written by [`write_artifact`]
pub fn read_artifact<T: DeserializeOwned, P: AsRef<Path>>(path: P, kind: ArtifactKind) -> Result<T> {
    let path = path.as_ref();
    let bytes = fs::read(path)
        .map_err(|e| Error::ArtifactLoad(format!("{}: {e}", path.display())))?;
    decode_artifact(kind, &bytes).map_err(|e| match e {
        Error::ArtifactLoad(msg) => Error::ArtifactLoad(format!("{}: {msg}", path.display())),
        other => other,
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "artifact".into(), |n| n.to_string_lossy().into_owned());
    path.with_file_name(format!(".{name}.{}.tmp", std::process::id()))
}
