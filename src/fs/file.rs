use std::io::{self, SeekFrom};

use log::debug;

use super::block::BlockStore;
use super::error::{Error, Result};
use super::inode::Inode;
use super::superblock::Geometry;

/// Lazily reads the blocks covering a byte range of a file, one chunk per
/// block. Stops after the first failed block read.
pub struct FileChunks<'a> {
  store: &'a dyn BlockStore,
  file: u64,
  first_block: u64,
  block_size: u64,
  position: u64,
  end: u64,
  failed: bool,
}

impl<'a> FileChunks<'a> {
  /// Bytes left to yield.
  pub fn remaining(&self) -> u64 {
    self.end - self.position
  }
}

impl<'a> Iterator for FileChunks<'a> {
  type Item = Result<Vec<u8>>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.failed || self.position >= self.end {
      return None;
    }

    let in_block = self.position % self.block_size;
    let take = (self.block_size - in_block).min(self.end - self.position);
    let block = match self.first_block.checked_add(self.position / self.block_size) {
      Some(block) => block,
      None => {
        self.failed = true;
        return Some(Err(Error::Corrupt(format!("inode {} data runs past the last block", self.file))));
      },
    };

    debug!("inode {}: byte {} maps to block {block}", self.file, self.position);
    match self.store.read_block(block) {
      Ok(data) => {
        self.position += take;
        Some(Ok(data[in_block as usize..(in_block + take) as usize].to_vec()))
      },
      Err(error) => {
        self.failed = true;
        Some(Err(error))
      },
    }
  }
}

/// Chunks covering `min(size - offset, length)` bytes of `file` starting
/// at `offset`. Empty when `offset` is at or past the end of the file.
pub fn chunks<'a>(
  store: &'a dyn BlockStore,
  geometry: &Geometry,
  file: &Inode,
  offset: u64,
  length: u64,
) -> Result<FileChunks<'a>> {
  let size = file.file_size()?;
  let count = if offset >= size { 0 } else { (size - offset).min(length) };

  Ok(FileChunks {
    store,
    file: file.number,
    first_block: file.data_block,
    block_size: geometry.block_size,
    position: offset,
    end: offset + count,
    failed: false,
  })
}

/// Reads up to `length` bytes of `file` from `offset`, clipped to the file
/// size. All or nothing: any failed block read fails the whole call.
pub fn read(store: &dyn BlockStore, geometry: &Geometry, file: &Inode, offset: u64, length: u64) -> Result<Vec<u8>> {
  let chunks = chunks(store, geometry, file, offset, length)?;
  let mut bytes = Vec::new();
  for chunk in chunks {
    bytes.extend_from_slice(&chunk?);
  }
  Ok(bytes)
}

/// A file plus the caller's read position.
pub struct OpenFile<'a> {
  store: &'a dyn BlockStore,
  geometry: Geometry,
  inode: Inode,
  position: u64,
}

impl<'a> OpenFile<'a> {
  pub fn new(store: &'a dyn BlockStore, geometry: Geometry, inode: Inode) -> Result<Self> {
    inode.file_size()?;

    Ok(Self {
      store,
      geometry,
      inode,
      position: 0,
    })
  }

  pub fn position(&self) -> u64 {
    self.position
  }

  /// Reads at the current position and advances past the returned bytes.
  pub fn read_next(&mut self, length: u64) -> Result<Vec<u8>> {
    let bytes = read(self.store, &self.geometry, &self.inode, self.position, length)?;
    self.position += bytes.len() as u64;
    Ok(bytes)
  }

  pub fn read_rest(&mut self) -> Result<Vec<u8>> {
    let size = self.inode.file_size()?;
    self.read_next(size.saturating_sub(self.position))
  }
}

fn into_io(error: Error) -> io::Error {
  match error {
    Error::Io(error) => error,
    other => io::Error::new(io::ErrorKind::Other, other),
  }
}

impl<'a> io::Read for OpenFile<'a> {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    let bytes = self.read_next(buf.len() as u64).map_err(into_io)?;
    buf[..bytes.len()].copy_from_slice(&bytes);
    Ok(bytes.len())
  }
}

impl<'a> io::Seek for OpenFile<'a> {
  fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
    let size = self.inode.file_size().map_err(into_io)? as i128;
    let target = match pos {
      SeekFrom::Start(offset) => offset as i128,
      SeekFrom::Current(delta) => self.position as i128 + delta as i128,
      SeekFrom::End(delta) => size + delta as i128,
    };

    if target < 0 || target > u64::MAX as i128 {
      return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek to an invalid position"));
    }
    self.position = target as u64;
    Ok(self.position)
  }
}


// vim:ts=2 sw=2
