use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace};

use super::error::{Error, Result};
use super::layout::{Superblock, MFS_MAGIC, SUPERBLOCK_SIZE};

pub type BlockId = u64;

/// Upper bound accepted when probing a block size from an image header.
pub const MAX_BLOCK_SIZE: u64 = 1 << 20;

/// Fixed-size random-access storage addressed by logical block number.
///
/// Implementations own capacity detection and any caching. Reads take
/// `&self`, so a store can serve independent resolutions from several
/// threads at once.
pub trait BlockStore: Send + Sync {
  fn block_size(&self) -> u64;

  /// Device capacity in blocks.
  fn block_count(&self) -> u64;

  /// Returns exactly `block_size()` bytes.
  fn read_block(&self, block: BlockId) -> Result<Vec<u8>>;

  /// Number of `read_block` calls served so far.
  fn reads(&self) -> u64 {
    0
  }
}

fn check_range(block: BlockId, capacity: u64) -> Result<()> {
  if block >= capacity {
    return Err(Error::OutOfRange { block, capacity });
  }
  Ok(())
}

/// Image file on the host filesystem.
#[derive(Debug)]
pub struct FileBlockStore {
  file: File,
  block_size: u64,
  len: u64,
  reads: AtomicU64,
}

impl FileBlockStore {
  pub fn open(path: impl AsRef<Path>, block_size: u64) -> Result<Self> {
    if block_size == 0 || block_size > MAX_BLOCK_SIZE {
      return Err(Error::InvalidGeometry(format!("unsupported block size {block_size}")));
    }

    let file = File::open(path.as_ref())?;
    let len = file.metadata()?.len();
    debug!("opened image {} ({len} bytes, block size {block_size})", path.as_ref().display());

    Ok(Self {
      file,
      block_size,
      len,
      reads: AtomicU64::new(0),
    })
  }

  /// Opens an image using the block size recorded in its own superblock.
  pub fn open_probed(path: impl AsRef<Path>) -> Result<Self> {
    let file = File::open(path.as_ref())?;
    let mut header = [0u8; SUPERBLOCK_SIZE];
    file.read_exact_at(&mut header, 0)?;

    let superblock = Superblock::decode(&header)?;
    if superblock.magic != MFS_MAGIC {
      return Err(Error::BadMagic { expected: MFS_MAGIC, found: superblock.magic });
    }

    Self::open(path, superblock.block_size)
  }
}

impl BlockStore for FileBlockStore {
  fn block_size(&self) -> u64 {
    self.block_size
  }

  /// A trailing partial block still counts and reads back zero-padded.
  fn block_count(&self) -> u64 {
    self.len / self.block_size + if self.len % self.block_size > 0 { 1 } else { 0 }
  }

  fn read_block(&self, block: BlockId) -> Result<Vec<u8>> {
    check_range(block, self.block_count())?;
    self.reads.fetch_add(1, Ordering::Relaxed);

    let offset = block * self.block_size;
    let available = (self.len - offset).min(self.block_size) as usize;
    let mut data = vec![0u8; self.block_size as usize];
    self.file.read_exact_at(&mut data[..available], offset)?;

    trace!("read block {block} at byte {offset}");
    Ok(data)
  }

  fn reads(&self) -> u64 {
    self.reads.load(Ordering::Relaxed)
  }
}

/// Image held in memory. Used for fixtures and by callers that already
/// have the whole image loaded.
#[derive(Debug)]
pub struct MemBlockStore {
  data: Vec<u8>,
  block_size: u64,
  reads: AtomicU64,
}

impl MemBlockStore {
  pub fn new(data: Vec<u8>, block_size: u64) -> Result<Self> {
    if block_size == 0 || block_size > MAX_BLOCK_SIZE {
      return Err(Error::InvalidGeometry(format!("unsupported block size {block_size}")));
    }

    Ok(Self {
      data,
      block_size,
      reads: AtomicU64::new(0),
    })
  }
}

impl BlockStore for MemBlockStore {
  fn block_size(&self) -> u64 {
    self.block_size
  }

  fn block_count(&self) -> u64 {
    let len = self.data.len() as u64;
    len / self.block_size + if len % self.block_size > 0 { 1 } else { 0 }
  }

  fn read_block(&self, block: BlockId) -> Result<Vec<u8>> {
    check_range(block, self.block_count())?;
    self.reads.fetch_add(1, Ordering::Relaxed);

    let start = (block * self.block_size) as usize;
    let end = (start + self.block_size as usize).min(self.data.len());
    let mut data = vec![0u8; self.block_size as usize];
    data[..end - start].copy_from_slice(&self.data[start..end]);
    Ok(data)
  }

  fn reads(&self) -> u64 {
    self.reads.load(Ordering::Relaxed)
  }
}


// vim:ts=2 sw=2
