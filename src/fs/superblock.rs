use log::{debug, error, info};

use super::block::BlockStore;
use super::error::{Error, Result};
use super::layout::{records_per_block, Superblock, DIR_RECORD_SIZE, INODE_SIZE, MFS_MAGIC};

/// Immutable description of a mounted image, computed once from block 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
  pub version: u64,
  pub magic: u64,
  pub block_size: u64,
  pub inodes_block: u64,
}

impl Geometry {
  /// Inode records per table block.
  pub fn inodes_per_block(&self) -> u64 {
    records_per_block(self.block_size, INODE_SIZE)
  }

  /// Maximum children a directory can hold, since its records share one block.
  pub fn dir_records_per_block(&self) -> u64 {
    records_per_block(self.block_size, DIR_RECORD_SIZE)
  }
}

impl From<Superblock> for Geometry {
  fn from(superblock: Superblock) -> Self {
    Self {
      version: superblock.version,
      magic: superblock.magic,
      block_size: superblock.block_size,
      inodes_block: superblock.inodes_block,
    }
  }
}

pub fn load_superblock(store: &dyn BlockStore) -> Result<Geometry> {
  let block = store.read_block(0)?;
  let superblock = Superblock::decode(&block)?;

  debug!("verifying superblock magic: {:#x}", superblock.magic);
  if superblock.magic != MFS_MAGIC {
    error!("failed to match superblock magic: {:#x}", superblock.magic);
    return Err(Error::BadMagic { expected: MFS_MAGIC, found: superblock.magic });
  }

  match superblock.block_size {
    0 => return Err(Error::InvalidGeometry("zero block size".to_owned())),
    size if size < DIR_RECORD_SIZE as u64 => {
      return Err(Error::InvalidGeometry(format!("block size {size} cannot hold a directory record")))
    },
    size if size % INODE_SIZE as u64 != 0 => {
      return Err(Error::InvalidGeometry(format!("block size {size} is not a multiple of {INODE_SIZE}")))
    },
    size if size != store.block_size() => {
      return Err(Error::InvalidGeometry(format!(
        "superblock block size {size} differs from device block size {}",
        store.block_size()
      )))
    },
    _ => (),
  }

  // Block 0 is the superblock itself
  if superblock.inodes_block == 0 {
    return Err(Error::InvalidGeometry("inode table overlaps the superblock".to_owned()));
  }

  info!(
    "mfs filesystem with version [{}] and block size [{}] detected",
    superblock.version, superblock.block_size
  );

  Ok(superblock.into())
}


// vim:ts=2 sw=2
