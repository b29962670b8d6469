//! Write path: create or extend a store, one report at a time.
//!
//! A store is a 5-byte file header (`oerm` plus a version byte) followed by
//! a flat sequence of blocks. Reports are written strictly append-only:
//! a metadata block when the report is registered, then one page-container
//! block every time the in-memory container fills or the report changes.
//! The side-file indexes live only in memory until [`Database::close`],
//! which rewrites them wholesale.
//!
//! ```no_run
//! use oerm::database::{Database, Mode, StoreOptions};
//! use oerm::metadata::Metadata;
//!
//! # fn main() -> Result<(), oerm::database::DatabaseError> {
//! let mut db = Database::open("informes.oerm", Mode::Create, StoreOptions::default())?;
//! db.add_report(&Metadata::new("Caja diaria", "Tesoreria", "CD001", "Casa central"))?;
//! db.add_page("PRIMERA HOJA DEL LISTADO...")?;
//! db.close()?;
//! # Ok(())
//! # }
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::ReadBytesExt;
use thiserror::Error;

use crate::block::{encode_block, BlockError, BlockKind};
use crate::codec::Compressor;
use crate::container::{ContainerError, PageContainer};
use crate::crypto::{CipherSuite, CryptoError};
use crate::index::{Index, IndexError};
use crate::metadata::Metadata;
use crate::report::{Reports, TextMatch};

pub const MAGIC: &[u8; 4] = b"oerm";
pub const VERSION: u8 = 1;
/// Bytes before the first block: magic plus version.
pub const FILE_HEADER_LEN: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Start a fresh store, truncating anything already at the path.
    Create,
    /// Extend an existing store; a missing file degrades to [`Mode::Create`].
    Append,
    Read,
}

impl Mode {
    pub fn writes(self) -> bool {
        !matches!(self, Mode::Read)
    }
}

/// Knobs applied to every block this handle writes.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Compression wire id; unknown ids degrade to store-uncompressed.
    pub compression: u8,
    /// Abstract level 0..=2; out-of-range values normalize to 1.
    pub level: u8,
    /// Cipher wire id; unknown ids degrade to plain.
    pub cipher: u8,
    /// `None` uses the built-in passphrase.
    pub passphrase: Option<String>,
    pub pages_per_container: u16,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            compression: 1,
            level: 1,
            cipher: 0,
            passphrase: None,
            pages_per_container: 10,
        }
    }
}

#[derive(Debug)]
pub struct Database {
    path: PathBuf,
    file: File,
    mode: Mode,
    index: Index,
    compressor: Compressor,
    cipher: CipherSuite,
    pages_per_container: u16,
    container: PageContainer,
    current_report: Option<u32>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(
        path: P,
        mode: Mode,
        options: StoreOptions,
    ) -> Result<Self, DatabaseError> {
        let path = path.as_ref().to_path_buf();
        let compressor = Compressor::new(options.compression, options.level);
        let cipher = CipherSuite::new(options.cipher, options.passphrase.as_deref())?;
        let pages_per_container = options.pages_per_container.max(1);

        let mut mode = mode;
        if mode == Mode::Append && !path.exists() {
            log::info!("{} does not exist, creating it", path.display());
            mode = Mode::Create;
        }

        let (file, index) = match mode {
            Mode::Create => {
                let mut file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&path)?;
                file.write_all(MAGIC)?;
                file.write_all(&[VERSION])?;
                (file, Index::default())
            }
            Mode::Append => {
                let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
                validate_header(&mut file)?;
                file.seek(SeekFrom::End(0))?;
                let index = Index::read(&path)?;
                (file, index)
            }
            Mode::Read => {
                let mut file = File::open(&path)?;
                validate_header(&mut file)?;
                let index = Index::read(&path)?;
                (file, index)
            }
        };

        log::debug!(
            "opened {} in {mode:?} mode with {} report(s), writing {}",
            path.display(),
            index.len(),
            compressor.describe()
        );

        Ok(Database {
            path,
            file,
            mode,
            index,
            compressor,
            cipher,
            pages_per_container,
            container: PageContainer::new(pages_per_container),
            current_report: None,
        })
    }

    /// Register a new report and make it current. Pending pages of the
    /// previous report are flushed first. Returns the new report's id.
    pub fn add_report(&mut self, metadata: &Metadata) -> Result<u32, DatabaseError> {
        self.ensure_writable()?;
        self.flush()?;
        let bytes = metadata.dump()?;
        let block = encode_block(
            BlockKind::Metadata,
            &self.compressor,
            &mut self.cipher,
            &bytes,
            &[],
        )?;
        let offset = self.file.stream_position()?;
        self.file.write_all(&block)?;
        let id = self
            .index
            .add_report(metadata.report(), offset, self.pages_per_container);
        self.current_report = Some(id);
        log::debug!(
            "report {id} ({}) registered at offset {offset}",
            metadata.report()
        );
        Ok(id)
    }

    /// Look up a report id by name, truncation rules included.
    pub fn get_report(&self, name: &str) -> Option<u32> {
        self.index.find_by_name(name)
    }

    /// Switch the page cursor to an existing report, flushing pending pages
    /// of the one it replaces.
    pub fn set_report(&mut self, id: u32) -> Result<(), DatabaseError> {
        self.ensure_writable()?;
        if self.index.get(id).is_none() {
            return Err(DatabaseError::ReportNotFound(id));
        }
        self.flush()?;
        self.current_report = Some(id);
        Ok(())
    }

    /// Append one page to the current report, flushing the container to a
    /// block when it is full.
    pub fn add_page(&mut self, page: &str) -> Result<(), DatabaseError> {
        self.ensure_writable()?;
        if self.current_report.is_none() {
            return Err(DatabaseError::NoCurrentReport);
        }
        if let Err(ContainerError::Full { .. }) = self.container.add(page) {
            self.flush()?;
            self.container.add(page)?;
        }
        Ok(())
    }

    /// Write the pending container as a pages block. Empty containers write
    /// nothing.
    pub fn flush(&mut self) -> Result<(), DatabaseError> {
        if self.container.is_empty() {
            return Ok(());
        }
        let id = self.current_report.ok_or(DatabaseError::NoCurrentReport)?;
        let (data, shape) = self.container.dump()?;
        let block = encode_block(
            BlockKind::Pages,
            &self.compressor,
            &mut self.cipher,
            &data,
            &shape,
        )?;
        let offset = self.file.stream_position()?;
        self.file.write_all(&block)?;
        self.index.add_container(id, offset)?;
        log::debug!(
            "container with {} page(s) for report {id} written at offset {offset}",
            self.container.len()
        );
        self.container.clear();
        Ok(())
    }

    /// Flush pending pages and, in the writing modes, rewrite both index
    /// side files. Consumes the handle.
    pub fn close(mut self) -> Result<(), DatabaseError> {
        if self.mode.writes() {
            self.flush()?;
            self.index.write(&self.path)?;
            self.file.sync_all()?;
            log::info!(
                "{} closed with {} report(s)",
                self.path.display(),
                self.index.len()
            );
        }
        Ok(())
    }

    /// A read view over everything flushed so far.
    pub fn reports(&self) -> Reports {
        Reports::from_entries(
            self.path.clone(),
            self.cipher.clone(),
            self.index.iter().cloned().collect(),
        )
    }

    /// Search every report (or just `reports`) for a substring.
    pub fn find_text(
        &self,
        text: &str,
        reports: Option<&[u32]>,
    ) -> Result<Vec<TextMatch>, DatabaseError> {
        self.reports().find_text(text, reports)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn report_count(&self) -> usize {
        self.index.len()
    }

    fn ensure_writable(&self) -> Result<(), DatabaseError> {
        if self.mode.writes() {
            Ok(())
        } else {
            Err(DatabaseError::ReadOnly)
        }
    }
}

/// Check the 5-byte file header, leaving the reader positioned after it.
pub(crate) fn validate_header<R: Read>(reader: &mut R) -> Result<(), DatabaseError> {
    let mut magic = [0u8; 4];
    match reader.read_exact(&mut magic) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(DatabaseError::InvalidMagic)
        }
        Err(e) => return Err(e.into()),
    }
    if &magic != MAGIC {
        return Err(DatabaseError::InvalidMagic);
    }
    let version = match reader.read_u8() {
        Ok(version) => version,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(DatabaseError::InvalidMagic)
        }
        Err(e) => return Err(e.into()),
    };
    if version != VERSION {
        return Err(DatabaseError::UnsupportedVersion(version));
    }
    Ok(())
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Not an oerm store (bad magic)")]
    InvalidMagic,
    #[error("Unsupported format version {0}")]
    UnsupportedVersion(u8),
    #[error("Report {0} does not exist")]
    ReportNotFound(u32),
    #[error("No current report; call add_report or set_report first")]
    NoCurrentReport,
    #[error("Store is open read-only")]
    ReadOnly,
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("Metadata encoding failed: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn create_writes_file_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vacio.oerm");
        let db = Database::open(&path, Mode::Create, StoreOptions::default()).unwrap();
        db.close().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"oerm\x01");
        // close writes the side files even for an empty store
        assert!(dir.path().join("vacio.oerm.ridx").exists());
        assert!(dir.path().join("vacio.oerm.cidx").exists());
    }

    #[test]
    fn read_mode_requires_an_existing_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inexistente.oerm");
        let err = Database::open(&path, Mode::Read, StoreOptions::default()).unwrap_err();
        assert!(matches!(err, DatabaseError::Io(_)));
    }

    #[test]
    fn append_on_missing_file_creates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nuevo.oerm");
        let db = Database::open(&path, Mode::Append, StoreOptions::default()).unwrap();
        assert_eq!(db.mode(), Mode::Create);
        db.close().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn bad_magic_and_version_are_rejected() {
        let dir = tempfile::tempdir().unwrap();

        let path = dir.path().join("basura.oerm");
        fs::write(&path, b"zip!\x01algo mas").unwrap();
        assert!(matches!(
            Database::open(&path, Mode::Read, StoreOptions::default()),
            Err(DatabaseError::InvalidMagic)
        ));

        let path = dir.path().join("futuro.oerm");
        fs::write(&path, b"oerm\x09").unwrap();
        assert!(matches!(
            Database::open(&path, Mode::Read, StoreOptions::default()),
            Err(DatabaseError::UnsupportedVersion(9))
        ));

        let path = dir.path().join("corto.oerm");
        fs::write(&path, b"oer").unwrap();
        assert!(matches!(
            Database::open(&path, Mode::Read, StoreOptions::default()),
            Err(DatabaseError::InvalidMagic)
        ));
    }

    #[test]
    fn pages_need_a_current_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sin-reporte.oerm");
        let mut db = Database::open(&path, Mode::Create, StoreOptions::default()).unwrap();
        assert!(matches!(
            db.add_page("hoja suelta"),
            Err(DatabaseError::NoCurrentReport)
        ));
    }

    #[test]
    fn set_report_validates_the_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uno.oerm");
        let mut db = Database::open(&path, Mode::Create, StoreOptions::default()).unwrap();
        db.add_report(&Metadata::new("r", "s", "a", "d")).unwrap();
        assert!(matches!(
            db.set_report(99),
            Err(DatabaseError::ReportNotFound(99))
        ));
        db.set_report(1).unwrap();
    }

    #[test]
    fn read_mode_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("solo-lectura.oerm");
        let mut db = Database::open(&path, Mode::Create, StoreOptions::default()).unwrap();
        db.add_report(&Metadata::new("r", "s", "a", "d")).unwrap();
        db.add_page("hoja 1").unwrap();
        db.close().unwrap();

        let mut db = Database::open(&path, Mode::Read, StoreOptions::default()).unwrap();
        assert_eq!(db.report_count(), 1);
        assert!(matches!(
            db.add_report(&Metadata::new("x", "s", "a", "d")),
            Err(DatabaseError::ReadOnly)
        ));
        assert!(matches!(db.add_page("hoja"), Err(DatabaseError::ReadOnly)));
        assert!(matches!(db.set_report(1), Err(DatabaseError::ReadOnly)));
    }

    #[test]
    fn zero_pages_per_container_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clamp.oerm");
        let options = StoreOptions {
            pages_per_container: 0,
            ..StoreOptions::default()
        };
        let mut db = Database::open(&path, Mode::Create, options).unwrap();
        db.add_report(&Metadata::new("r", "s", "a", "d")).unwrap();
        // stored as one page per container
        db.add_page("hoja 1").unwrap();
        db.add_page("hoja 2").unwrap();
        db.close().unwrap();
    }
}
