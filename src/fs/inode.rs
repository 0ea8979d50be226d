use std::fmt;

use log::debug;

use super::block::{BlockId, BlockStore};
use super::error::{Error, Result};
use super::layout::{InodeRecord, INODE_SIZE};
use super::superblock::Geometry;

pub const S_IFMT: u32 = 0o170_000;
pub const S_IFDIR: u32 = 0o040_000;
pub const S_IFREG: u32 = 0o100_000;

/// Read and execute for everyone, the permissions images are built with.
pub const DEFAULT_PERMISSIONS: u32 = 0o555;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
  File,
  Dir,
}

/// Stored mode word: Unix file type bits plus permission bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMode(pub u32);

impl FileMode {
  pub fn new(raw: u32) -> Self {
    Self(raw)
  }

  pub fn dir(permissions: u32) -> Self {
    Self(S_IFDIR | (permissions & 0o7777))
  }

  pub fn file(permissions: u32) -> Self {
    Self(S_IFREG | (permissions & 0o7777))
  }

  pub fn raw(&self) -> u32 {
    self.0
  }

  /// `None` for zeroed slots and file types mfs does not store.
  pub fn file_type(&self) -> Option<FileType> {
    match self.0 & S_IFMT {
      S_IFDIR => Some(FileType::Dir),
      S_IFREG => Some(FileType::File),
      _ => None,
    }
  }

  pub fn permissions(&self) -> u32 {
    self.0 & 0o7777
  }

  pub fn is_dir(&self) -> bool {
    self.file_type() == Some(FileType::Dir)
  }
}

/// `ls -l` style rendering, e.g. `dr-xr-xr-x`.
impl fmt::Display for FileMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let kind = if self.is_dir() { 'd' } else { '-' };
    let bits = "rwxrwxrwx"
      .chars()
      .enumerate()
      .map(|(i, c)| if self.0 & (0o400 >> i) != 0 { c } else { '-' })
      .collect::<String>();
    write!(f, "{kind}{bits}")
  }
}

/// The size field read the only way the mode allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
  Directory { child_count: u64 },
  File { size: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
  pub number: u64,
  pub mode: FileMode,
  pub data_block: BlockId,
  pub kind: InodeKind,
}

impl Inode {
  pub fn from_record(record: InodeRecord, number: u64) -> Result<Self> {
    let mode = FileMode::new(record.mode);
    let kind = match mode.file_type() {
      Some(FileType::Dir) => InodeKind::Directory { child_count: record.size },
      Some(FileType::File) => InodeKind::File { size: record.size },
      None => return Err(Error::NotFound(format!("inode {number} (mode {:#o})", record.mode))),
    };

    if record.inode_no != number {
      return Err(Error::Corrupt(format!(
        "inode slot {number} holds inode number {}",
        record.inode_no
      )));
    }

    Ok(Self {
      number,
      mode,
      data_block: record.data_block_number,
      kind,
    })
  }

  pub fn to_record(&self) -> InodeRecord {
    let size = match self.kind {
      InodeKind::Directory { child_count } => child_count,
      InodeKind::File { size } => size,
    };

    InodeRecord {
      mode: self.mode.raw(),
      inode_no: self.number,
      data_block_number: self.data_block,
      size,
    }
  }

  pub fn is_dir(&self) -> bool {
    matches!(self.kind, InodeKind::Directory { .. })
  }

  pub fn file_type(&self) -> FileType {
    match self.kind {
      InodeKind::Directory { .. } => FileType::Dir,
      InodeKind::File { .. } => FileType::File,
    }
  }

  pub fn child_count(&self) -> Result<u64> {
    match self.kind {
      InodeKind::Directory { child_count } => Ok(child_count),
      InodeKind::File { .. } => Err(Error::NotADirectory(self.number)),
    }
  }

  pub fn file_size(&self) -> Result<u64> {
    match self.kind {
      InodeKind::File { size } => Ok(size),
      InodeKind::Directory { .. } => Err(Error::NotAFile(self.number)),
    }
  }
}

/// Block and in-block byte offset holding inode `number`. The table may
/// span several blocks; block sizes are multiples of `INODE_SIZE`, so a
/// record never straddles two blocks.
pub fn inode_location(geometry: &Geometry, number: u64) -> Result<(BlockId, usize)> {
  if number == 0 {
    return Err(Error::NotFound("inode 0".to_owned()));
  }

  let offset = (number - 1)
    .checked_mul(INODE_SIZE as u64)
    .ok_or_else(|| Error::NotFound(format!("inode {number}")))?;
  let block = geometry
    .inodes_block
    .checked_add(offset / geometry.block_size)
    .ok_or_else(|| Error::NotFound(format!("inode {number}")))?;

  Ok((block, (offset % geometry.block_size) as usize))
}

/// Reads inode `number` from the table. Nothing is cached, every call
/// goes back to the block store.
pub fn resolve_inode(store: &dyn BlockStore, geometry: &Geometry, number: u64) -> Result<Inode> {
  let (block, offset) = inode_location(geometry, number)?;
  debug!("resolving inode {number} at block {block} offset {offset}");

  let data = store.read_block(block)?;
  let record = InodeRecord::decode(&data[offset..])?;

  Inode::from_record(record, number)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fs::builder::ImageBuilder;
  use crate::fs::superblock::load_superblock;

  fn geometry(block_size: u64) -> Geometry {
    Geometry {
      version: 1,
      magic: crate::fs::layout::MFS_MAGIC,
      block_size,
      inodes_block: 1,
    }
  }

  #[test]
  fn file_mode_works() {
    let mode = FileMode::file(0o640);

    assert_eq!(mode.raw(), 0o100_640);
    assert_eq!(mode.file_type(), Some(FileType::File));
    assert_eq!(mode.permissions(), 0o640);
    assert_eq!(mode.to_string(), "-rw-r-----");
    assert_eq!(FileMode::dir(0o755).to_string(), "drwxr-xr-x");
    assert_eq!(FileMode::new(0).file_type(), None);
    assert_eq!(FileMode::new(0o120_777).file_type(), None);
  }

  #[test]
  fn location_spans_table_blocks() {
    let geometry = geometry(4096);

    assert_eq!(inode_location(&geometry, 1).unwrap(), (1, 0));
    assert_eq!(inode_location(&geometry, 2).unwrap(), (1, 32));
    assert_eq!(inode_location(&geometry, 128).unwrap(), (1, 4064));
    assert_eq!(inode_location(&geometry, 129).unwrap(), (2, 0));
    assert_eq!(inode_location(&geometry, 300).unwrap(), (3, 43 * 32));
  }

  #[test]
  fn location_handles_small_blocks() {
    let geometry = geometry(128);

    assert_eq!(inode_location(&geometry, 4).unwrap(), (1, 96));
    assert_eq!(inode_location(&geometry, 5).unwrap(), (2, 0));
    assert!(matches!(inode_location(&geometry, u64::MAX), Err(Error::NotFound(_))));
  }

  #[test]
  fn inode_zero_is_not_found() {
    assert!(matches!(inode_location(&geometry(4096), 0), Err(Error::NotFound(_))));
  }

  #[test]
  fn resolves_tagged_inodes() {
    let store = ImageBuilder::hello_world().into_store().unwrap();
    let geometry = load_superblock(&store).unwrap();

    let root = resolve_inode(&store, &geometry, 1).unwrap();
    assert_eq!(root.kind, InodeKind::Directory { child_count: 1 });
    assert_eq!(root.data_block, 2);
    assert!(matches!(root.file_size(), Err(Error::NotAFile(1))));

    let file = resolve_inode(&store, &geometry, 2).unwrap();
    assert_eq!(file.kind, InodeKind::File { size: 11 });
    assert_eq!(file.data_block, 3);
    assert!(matches!(file.child_count(), Err(Error::NotADirectory(2))));
  }

  #[test]
  fn resolution_is_deterministic() {
    let store = ImageBuilder::hello_world().into_store().unwrap();
    let geometry = load_superblock(&store).unwrap();

    for number in 1..=2 {
      let first = resolve_inode(&store, &geometry, number).unwrap();
      let second = resolve_inode(&store, &geometry, number).unwrap();
      assert_eq!(first.to_record().encode(), second.to_record().encode());
    }
  }

  #[test]
  fn empty_slots_are_not_found() {
    let store = ImageBuilder::hello_world().into_store().unwrap();
    let geometry = load_superblock(&store).unwrap();

    assert!(matches!(resolve_inode(&store, &geometry, 0), Err(Error::NotFound(_))));
    assert!(matches!(resolve_inode(&store, &geometry, 3), Err(Error::NotFound(_))));
  }

  #[test]
  fn mismatched_inode_number_is_corrupt() {
    let record = InodeRecord {
      mode: FileMode::file(0o444).raw(),
      inode_no: 9,
      data_block_number: 3,
      size: 1,
    };

    assert!(matches!(Inode::from_record(record, 2), Err(Error::Corrupt(_))));
  }
}

// vim:ts=2 sw=2
