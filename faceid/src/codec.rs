//! Gallery file format.
//!
//! ```text
//! [4B magic "FGAL"] [4B version=1]
//! For each record:
//!   [1B personLen] [personLen bytes person ID]
//!   [1B faceLen]   [faceLen bytes face ID]
//!   [4B dim]       [dim x 4B float32 feature]
//! ```
//!
//! All multi-byte values are little-endian. The header carries no record
//! count, so incremental saves only ever append to the end of the file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{FaceIdError, Result};
use crate::types::{FaceId, MAX_ID_LEN, PersonId, Record};

const GALLERY_MAGIC: [u8; 4] = *b"FGAL";
const GALLERY_VERSION: u32 = 1;
const HEADER_LEN: u64 = 8;

/// Largest feature dimension accepted when decoding.
pub const MAX_DIMENSION: usize = 1 << 16;

/// Decoding failure independent of any file path.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("read: {0}")]
    Io(io::Error),

    #[error("corrupt: {0}")]
    Corrupt(String),

    #[error("allocation failed: {0}")]
    Alloc(String),
}

impl DecodeError {
    fn into_file_error(self, path: &Path) -> FaceIdError {
        match self {
            Self::Io(source) => FaceIdError::FileRead {
                path: path.to_path_buf(),
                source,
            },
            Self::Corrupt(reason) => FaceIdError::corrupt(path, reason),
            Self::Alloc(msg) => FaceIdError::AllocationFailure(msg),
        }
    }
}

fn truncated(e: io::Error, what: &str) -> DecodeError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        DecodeError::Corrupt(format!("truncated {what}"))
    } else {
        DecodeError::Io(e)
    }
}

/// Writes the magic and version.
pub fn write_header(w: &mut dyn Write) -> io::Result<()> {
    w.write_all(&GALLERY_MAGIC)?;
    w.write_all(&GALLERY_VERSION.to_le_bytes())
}

/// Writes one record.
pub fn write_record(w: &mut dyn Write, record: &Record) -> io::Result<()> {
    for id in [record.person_id.as_str(), record.face_id.as_str()] {
        // Identifiers are validated to at most MAX_ID_LEN bytes.
        w.write_all(&[id.len() as u8])?;
        w.write_all(id.as_bytes())?;
    }
    let feature = record.feature.as_slice();
    w.write_all(&(feature.len() as u32).to_le_bytes())?;
    for v in feature {
        w.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

/// Reads and checks the magic and version.
pub fn read_header(r: &mut dyn Read) -> std::result::Result<(), DecodeError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(|e| truncated(e, "header"))?;
    if buf != GALLERY_MAGIC {
        return Err(DecodeError::Corrupt(format!("invalid magic {buf:?}")));
    }
    r.read_exact(&mut buf).map_err(|e| truncated(e, "header"))?;
    let version = u32::from_le_bytes(buf);
    if version != GALLERY_VERSION {
        return Err(DecodeError::Corrupt(format!(
            "unsupported version {version} (want {GALLERY_VERSION})"
        )));
    }
    Ok(())
}

/// Reads a header followed by records until a clean end of stream.
pub fn read_records(r: &mut dyn Read) -> std::result::Result<Vec<Record>, DecodeError> {
    read_header(r)?;
    let mut records = Vec::new();
    while let Some(person_len) = read_first_byte(r)? {
        records.push(read_record_body(r, person_len)?);
    }
    Ok(records)
}

// Returns None at end of stream.
fn read_first_byte(r: &mut dyn Read) -> std::result::Result<Option<u8>, DecodeError> {
    let mut b = [0u8; 1];
    loop {
        match r.read(&mut b) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(b[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(DecodeError::Io(e)),
        }
    }
}

fn read_id(r: &mut dyn Read, len: u8, what: &str) -> std::result::Result<String, DecodeError> {
    let len = len as usize;
    if len == 0 || len > MAX_ID_LEN {
        return Err(DecodeError::Corrupt(format!("invalid {what} length {len}")));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).map_err(|e| truncated(e, "record"))?;
    String::from_utf8(buf).map_err(|e| DecodeError::Corrupt(format!("{what}: {e}")))
}

fn read_record_body(r: &mut dyn Read, person_len: u8) -> std::result::Result<Record, DecodeError> {
    let person = read_id(r, person_len, "person id")?;

    let mut len = [0u8; 1];
    r.read_exact(&mut len).map_err(|e| truncated(e, "record"))?;
    let face = read_id(r, len[0], "face id")?;

    let mut buf4 = [0u8; 4];
    r.read_exact(&mut buf4).map_err(|e| truncated(e, "record"))?;
    let dim = u32::from_le_bytes(buf4) as usize;
    if dim == 0 || dim > MAX_DIMENSION {
        return Err(DecodeError::Corrupt(format!("invalid feature dimension {dim}")));
    }

    let mut raw = Vec::new();
    raw.try_reserve_exact(dim * 4)
        .map_err(|e| DecodeError::Alloc(format!("feature of dim {dim}: {e}")))?;
    raw.resize(dim * 4, 0);
    r.read_exact(&mut raw).map_err(|e| truncated(e, "record"))?;
    let feature: Vec<f32> = raw
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    let person_id = PersonId::new(person).map_err(|e| DecodeError::Corrupt(e.to_string()))?;
    let face_id = FaceId::new(face).map_err(|e| DecodeError::Corrupt(e.to_string()))?;
    Ok(Record::new(person_id, face_id, feature))
}

/// Creates (or replaces) `path` with an empty gallery.
pub fn create_empty(path: &Path) -> Result<()> {
    rewrite_all(path, &[])
}

/// Reads every record from the gallery file at `path`.
pub fn load_all(path: &Path) -> Result<Vec<Record>> {
    let file = File::open(path).map_err(|source| FaceIdError::FileOpen {
        path: path.to_path_buf(),
        source,
    })?;
    let mut br = BufReader::new(file);
    let records = read_records(&mut br).map_err(|e| e.into_file_error(path))?;
    debug!(path = %path.display(), records = records.len(), "gallery loaded");
    Ok(records)
}

/// Replaces `path` with exactly `records`.
///
/// The content is written to a temporary file in the same directory and
/// renamed over `path` only after it is fully flushed, so a failed rewrite
/// leaves the previous file intact. An existing file keeps its permissions.
pub fn rewrite_all(path: &Path, records: &[Record]) -> Result<()> {
    rewrite_with(path, |w| {
        write_header(w)?;
        for record in records {
            write_record(w, record)?;
        }
        Ok(())
    })?;
    debug!(path = %path.display(), records = records.len(), "gallery rewritten");
    Ok(())
}

fn rewrite_with<F>(path: &Path, body: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|source| FaceIdError::FileOpen {
        path: path.to_path_buf(),
        source,
    })?;

    let write_err = |source: io::Error| FaceIdError::FileWrite {
        path: path.to_path_buf(),
        source,
    };

    {
        let mut bw = BufWriter::new(tmp.as_file_mut());
        body(&mut bw).map_err(write_err)?;
        bw.flush().map_err(write_err)?;
    }
    // NamedTempFile is created 0600.
    if let Ok(meta) = fs::metadata(path) {
        tmp.as_file()
            .set_permissions(meta.permissions())
            .map_err(write_err)?;
    }
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Appends `records` after the existing content of `path`.
///
/// A missing or empty file is initialized with a header first. An existing
/// file must start with a valid header. If writing fails part-way, the file
/// is truncated back to its previous length.
pub fn append_all(path: &Path, records: &[Record]) -> Result<()> {
    append_with(path, |w| {
        for record in records {
            write_record(w, record)?;
        }
        Ok(())
    })?;
    debug!(path = %path.display(), records = records.len(), "gallery appended");
    Ok(())
}

fn append_with<F>(path: &Path, body: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
        .map_err(|source| FaceIdError::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;

    let read_err = |source: io::Error| FaceIdError::FileRead {
        path: path.to_path_buf(),
        source,
    };

    let orig_len = file.metadata().map_err(read_err)?.len();
    if orig_len > 0 {
        if orig_len < HEADER_LEN {
            return Err(FaceIdError::corrupt(path, "truncated header"));
        }
        file.seek(SeekFrom::Start(0)).map_err(read_err)?;
        read_header(&mut file).map_err(|e| e.into_file_error(path))?;
    }

    let result = (|| -> io::Result<()> {
        let mut bw = BufWriter::new(&mut file);
        if orig_len == 0 {
            write_header(&mut bw)?;
        }
        body(&mut bw)?;
        bw.flush()?;
        drop(bw);
        file.sync_data()
    })();

    if let Err(source) = result {
        if let Err(e) = file.set_len(orig_len) {
            warn!(path = %path.display(), error = %e, "failed to roll back partial append");
        }
        return Err(FaceIdError::FileWrite {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}
