//! Default region handle, a single file addressed in whole sectors.
//!
//! Nothing here knows how entries are laid out inside a region, it only moves
//! sector sized buffers in and out of the file.

use bytes::{Buf, Bytes, BytesMut};
use std::convert::TryFrom;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::num::TryFromIntError;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::region_handle::{RegionFactory, RegionHandle};
use super::region_key::RegionKey;
use crate::constants::DEFAULT_SECTOR_SIZE;

#[derive(Debug)]
pub struct RegionFile {
    path: PathBuf,
    file: File,
    entries_per_region: usize,
    sector_size: usize,
}

impl RegionFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries_per_region(&self) -> usize {
        self.entries_per_region
    }

    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    /// Number of complete sectors currently in the file.
    pub fn sector_count(&self) -> Result<usize, RegionFileError> {
        let file_len = usize::try_from(self.file.metadata()?.len())?;
        Ok(file_len / self.sector_size)
    }

    /// Reads one sector, `None` if the file does not reach that far yet.
    pub fn read_sector(&mut self, sector: usize) -> Result<Option<Bytes>, RegionFileError> {
        if sector >= self.sector_count()? {
            return Ok(None);
        }

        let seek = self.sector_seek(sector)?;
        self.file.seek(SeekFrom::Start(seek))?;

        let mut buffer = BytesMut::zeroed(self.sector_size);
        let mut filled = 0;
        while filled != self.sector_size {
            let readamt = self.file.read(&mut buffer[filled..])?;
            if readamt == 0 {
                return Err(RegionFileError::IncompleteRead(filled, self.sector_size));
            }
            filled += readamt;
        }

        Ok(Some(buffer.freeze()))
    }

    /// Writes one sector, growing the file if it is too short.
    pub fn write_sector(&mut self, sector: usize, buffer: Bytes) -> Result<(), RegionFileError> {
        if buffer.len() != self.sector_size {
            return Err(RegionFileError::WrongBufferSize(
                buffer.len(),
                self.sector_size,
            ));
        }

        let seek = self.sector_seek(sector)?;
        self.file.seek(SeekFrom::Start(seek))?;

        let mut reader = buffer.reader();
        io::copy(&mut reader, &mut self.file)?;

        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), RegionFileError> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    fn sector_seek(&self, sector: usize) -> Result<u64, RegionFileError> {
        let offset = sector
            .checked_mul(self.sector_size)
            .ok_or(RegionFileError::SectorOutOfRange(sector))?;
        Ok(u64::try_from(offset)?)
    }
}

impl RegionHandle for RegionFile {
    fn close(self) -> io::Result<()> {
        debug!("Closing region file {}", self.path.display());
        self.file.sync_all()
    }
}

/// Named, validated settings for opening a [`RegionFile`].
#[derive(Clone, Debug)]
pub struct RegionFileBuilder {
    path: Option<PathBuf>,
    entries_per_region: usize,
    sector_size: usize,
}

impl RegionFileBuilder {
    pub fn new() -> RegionFileBuilder {
        RegionFileBuilder {
            path: None,
            entries_per_region: 0,
            sector_size: DEFAULT_SECTOR_SIZE,
        }
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn entries_per_region(mut self, entries_per_region: usize) -> Self {
        self.entries_per_region = entries_per_region;
        self
    }

    pub fn sector_size(mut self, sector_size: usize) -> Self {
        self.sector_size = sector_size;
        self
    }

    /// Opens the file, creating it when missing.
    pub fn build(self) -> Result<RegionFile, RegionFileError> {
        let path = self.path.ok_or(RegionFileError::MissingPath())?;

        if self.entries_per_region == 0 {
            return Err(RegionFileError::InvalidEntryCount(self.entries_per_region));
        }
        if !self.sector_size.is_power_of_two() {
            return Err(RegionFileError::InvalidSectorSize(self.sector_size));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        Ok(RegionFile {
            path,
            file,
            entries_per_region: self.entries_per_region,
            sector_size: self.sector_size,
        })
    }
}

impl Default for RegionFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Factory the cache uses by default, every region gets the same sector size.
#[derive(Clone, Copy, Debug)]
pub struct RegionFileFactory {
    sector_size: usize,
}

impl RegionFileFactory {
    pub fn new(sector_size: usize) -> RegionFileFactory {
        RegionFileFactory { sector_size }
    }

    pub fn sector_size(&self) -> usize {
        self.sector_size
    }
}

impl Default for RegionFileFactory {
    fn default() -> Self {
        Self::new(DEFAULT_SECTOR_SIZE)
    }
}

impl<K: RegionKey> RegionFactory<K> for RegionFileFactory {
    type Handle = RegionFile;

    fn create(&self, path: &Path, key: &K) -> io::Result<RegionFile> {
        let region = RegionFileBuilder::new()
            .path(path)
            .entries_per_region(key.entries_per_region())
            .sector_size(self.sector_size)
            .build()?;
        Ok(region)
    }
}

#[derive(Debug, Error)]
pub enum RegionFileError {
    #[error("Read {0} bytes instead of a sector of {1}")]
    IncompleteRead(usize, usize),
    #[error("A region must hold at least one entry, got {0}")]
    InvalidEntryCount(usize),
    #[error("Sector size must be a power of two, got {0}")]
    InvalidSectorSize(usize),
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error("No path was given for the region file")]
    MissingPath(),
    #[error("Sector {0} is past the addressable end of a region file")]
    SectorOutOfRange(usize),
    #[error(transparent)]
    TryFromIntError(#[from] TryFromIntError),
    #[error("Buffer of {0} bytes does not match the sector size of {1}")]
    WrongBufferSize(usize, usize),
}

impl From<RegionFileError> for io::Error {
    fn from(e: RegionFileError) -> Self {
        match e {
            RegionFileError::IOError(inner) => inner,
            read @ RegionFileError::IncompleteRead(_, _) => {
                io::Error::new(io::ErrorKind::UnexpectedEof, read)
            }
            other => io::Error::new(io::ErrorKind::InvalidInput, other),
        }
    }
}
