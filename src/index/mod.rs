//! Side-file indexes for report lookup.
//!
//! A store at path `f` carries two companion files, rebuilt wholesale every
//! time the store is closed after writing. All integers are big-endian.
//!
//! `f.ridx`, one 72-byte record per report:
//!
//! ```text
//! [ id: u32 | name: 50 B, NUL-padded | metadata_offset: u64
//!   | pages_per_container: u16 | cidx_offset: u64 ]
//! ```
//!
//! `f.cidx`, one 12-byte record per page container, grouped by report in
//! ascending id order:
//!
//! ```text
//! [ id: u32 | container_offset: u64 ]
//! ```
//!
//! `cidx_offset` is the byte position of the report's first container
//! record inside `f.cidx`, so a reader can jump straight to a report's
//! container list.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

/// Bytes reserved for a report name in a `.ridx` record.
pub const NAME_SIZE: usize = 50;

const REPORT_RECORD_SIZE: usize = 72;
const CONTAINER_RECORD_SIZE: usize = 12;

/// One report as recorded in the side files.
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub id: u32,
    /// Stored form of the name: at most [`NAME_SIZE`] bytes.
    pub name: String,
    /// Offset of the report's metadata block in the store.
    pub metadata_offset: u64,
    pub pages_per_container: u16,
    /// Position of this report's first record in the `.cidx` file, as
    /// recorded on disk. Recomputed on every write.
    pub cidx_offset: u64,
    /// Offsets of the report's page-container blocks, in page order.
    pub containers: Vec<u64>,
}

#[derive(Debug, Default)]
pub struct Index {
    entries: BTreeMap<u32, ReportEntry>,
}

impl Index {
    /// Register a new report and return its id. Ids are sequential from 1.
    pub fn add_report(&mut self, name: &str, metadata_offset: u64, pages_per_container: u16) -> u32 {
        let id = self.entries.keys().next_back().map_or(1, |last| last + 1);
        self.entries.insert(
            id,
            ReportEntry {
                id,
                name: truncate_name(name).to_owned(),
                metadata_offset,
                pages_per_container,
                cidx_offset: 0,
                containers: Vec::new(),
            },
        );
        id
    }

    /// Record a flushed page container for `id`.
    pub fn add_container(&mut self, id: u32, offset: u64) -> Result<(), IndexError> {
        self.entries
            .get_mut(&id)
            .ok_or(IndexError::UnknownReport(id))?
            .containers
            .push(offset);
        Ok(())
    }

    /// Look a report up by name. The query is truncated to the stored
    /// 50-byte form first, so names that collide after truncation resolve
    /// to the earliest entry.
    pub fn find_by_name(&self, name: &str) -> Option<u32> {
        let key = truncate_name(name);
        self.entries.values().find(|e| e.name == key).map(|e| e.id)
    }

    pub fn get(&self, id: u32) -> Option<&ReportEntry> {
        self.entries.get(&id)
    }

    /// Entries in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load both side files of the store at `db_path`.
    pub fn read(db_path: &Path) -> Result<Self, IndexError> {
        let ridx = ridx_path(db_path);
        let mut entries = BTreeMap::new();
        let mut reader = BufReader::new(File::open(&ridx)?);
        loop {
            let id = match reader.read_u32::<BigEndian>() {
                Ok(id) => id,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };
            let mut record = [0u8; REPORT_RECORD_SIZE - 4];
            if let Err(e) = reader.read_exact(&mut record) {
                return Err(if e.kind() == io::ErrorKind::UnexpectedEof {
                    IndexError::Malformed {
                        file: ridx,
                        detail: format!("truncated record for report {id}"),
                    }
                } else {
                    e.into()
                });
            }
            let mut fields = &record[..];
            let mut name_buf = [0u8; NAME_SIZE];
            fields.read_exact(&mut name_buf)?;
            let metadata_offset = fields.read_u64::<BigEndian>()?;
            let pages_per_container = fields.read_u16::<BigEndian>()?;
            let cidx_offset = fields.read_u64::<BigEndian>()?;

            let end = name_buf.iter().position(|&b| b == 0).unwrap_or(NAME_SIZE);
            let name = std::str::from_utf8(&name_buf[..end])
                .map_err(|_| IndexError::Malformed {
                    file: ridx.clone(),
                    detail: format!("name of report {id} is not valid UTF-8"),
                })?
                .to_owned();

            entries.insert(
                id,
                ReportEntry {
                    id,
                    name,
                    metadata_offset,
                    pages_per_container,
                    cidx_offset,
                    containers: Vec::new(),
                },
            );
        }

        let cidx = cidx_path(db_path);
        let mut reader = BufReader::new(File::open(&cidx)?);
        loop {
            let id = match reader.read_u32::<BigEndian>() {
                Ok(id) => id,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };
            let offset = match reader.read_u64::<BigEndian>() {
                Ok(offset) => offset,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(IndexError::Malformed {
                        file: cidx,
                        detail: format!("truncated container record for report {id}"),
                    })
                }
                Err(e) => return Err(e.into()),
            };
            entries
                .get_mut(&id)
                .ok_or_else(|| IndexError::Malformed {
                    file: cidx.clone(),
                    detail: format!("container record references unknown report {id}"),
                })?
                .containers
                .push(offset);
        }

        Ok(Index { entries })
    }

    /// Rewrite both side files from scratch.
    pub fn write(&self, db_path: &Path) -> Result<(), IndexError> {
        let mut ridx = BufWriter::new(File::create(ridx_path(db_path))?);
        let mut cursor = 0u64;
        for entry in self.entries.values() {
            ridx.write_u32::<BigEndian>(entry.id)?;
            let mut name_buf = [0u8; NAME_SIZE];
            let name = truncate_name(&entry.name);
            name_buf[..name.len()].copy_from_slice(name.as_bytes());
            ridx.write_all(&name_buf)?;
            ridx.write_u64::<BigEndian>(entry.metadata_offset)?;
            ridx.write_u16::<BigEndian>(entry.pages_per_container)?;
            ridx.write_u64::<BigEndian>(cursor)?;
            cursor += (entry.containers.len() * CONTAINER_RECORD_SIZE) as u64;
        }
        ridx.flush()?;

        let mut cidx = BufWriter::new(File::create(cidx_path(db_path))?);
        for entry in self.entries.values() {
            for &offset in &entry.containers {
                cidx.write_u32::<BigEndian>(entry.id)?;
                cidx.write_u64::<BigEndian>(offset)?;
            }
        }
        cidx.flush()?;
        Ok(())
    }
}

/// Cut a name down to the stored form: at most [`NAME_SIZE`] bytes, never
/// splitting a character.
fn truncate_name(name: &str) -> &str {
    if name.len() <= NAME_SIZE {
        return name;
    }
    let mut end = NAME_SIZE;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

fn ridx_path(db_path: &Path) -> PathBuf {
    side_path(db_path, "ridx")
}

fn cidx_path(db_path: &Path) -> PathBuf {
    side_path(db_path, "cidx")
}

/// `data.oerm` maps to `data.oerm.ridx`, keeping the original extension.
fn side_path(db_path: &Path, ext: &str) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push(format!(".{ext}"));
    PathBuf::from(name)
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Unknown report id {0} in index")]
    UnknownReport(u32),
    #[error("Malformed index file {}: {detail}", .file.display())]
    Malformed { file: PathBuf, detail: String },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
