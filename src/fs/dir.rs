use log::debug;
use uuid::Uuid;

use super::block::BlockStore;
use super::error::{Error, Result};
use super::inode::Inode;
use super::layout::{DirRecord, DIR_RECORD_SIZE};
use super::superblock::Geometry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
  pub name: Vec<u8>,
  pub inode_number: u64,
}

impl DirEntry {
  pub fn name_lossy(&self) -> String {
    String::from_utf8_lossy(&self.name).into_owned()
  }
}

impl From<DirRecord> for DirEntry {
  fn from(record: DirRecord) -> Self {
    Self {
      name: record.name,
      inode_number: record.inode_no,
    }
  }
}

/// Resume point of a directory listing: the index of the next record to
/// emit, bound to the directory it was issued for. Cursors handed out
/// through a mount table also carry the id of the mount, since every
/// volume numbers its root inode 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirCursor {
  dir: u64,
  index: u64,
  mount: Option<Uuid>,
}

impl DirCursor {
  /// Rebuilds a cursor from a position a host kept between calls.
  /// It is validated when used, not here.
  pub fn resume(dir: u64, position: u64) -> Self {
    Self { dir, index: position, mount: None }
  }

  pub fn position(&self) -> u64 {
    self.index
  }

  pub fn mount(&self) -> Option<Uuid> {
    self.mount
  }

  pub fn on_mount(self, mount: Uuid) -> Self {
    Self { mount: Some(mount), ..self }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirPage {
  pub entries: Vec<DirEntry>,
  /// `None` once every record has been emitted.
  pub next: Option<DirCursor>,
}

/// Decodes all `child_count` records of `dir`, free slots included.
fn dir_records(store: &dyn BlockStore, geometry: &Geometry, dir: &Inode) -> Result<Vec<DirRecord>> {
  let child_count = dir.child_count()?;
  if child_count == 0 {
    return Ok(Vec::new());
  }

  let capacity = geometry.dir_records_per_block();
  if child_count > capacity {
    return Err(Error::Corrupt(format!(
      "directory inode {} claims {child_count} children, a block holds {capacity}",
      dir.number
    )));
  }

  debug!("reading {child_count} records of inode {} from block {}", dir.number, dir.data_block);
  let block = store.read_block(dir.data_block)?;

  (0..child_count as usize)
    .map(|index| DirRecord::decode(&block[index * DIR_RECORD_SIZE..]))
    .collect()
}

/// A record pointing at inode 0 is an unused slot.
fn is_free(record: &DirRecord) -> bool {
  record.inode_no == 0
}

/// Children of `dir` in on-disk order.
pub fn list_children(store: &dyn BlockStore, geometry: &Geometry, dir: &Inode) -> Result<Vec<DirEntry>> {
  Ok(dir_records(store, geometry, dir)?
    .into_iter()
    .filter(|record| !is_free(record))
    .map(DirEntry::from)
    .collect())
}

/// Inode number of the first child whose name equals `name` byte for byte.
pub fn lookup_child(store: &dyn BlockStore, geometry: &Geometry, dir: &Inode, name: &[u8]) -> Result<u64> {
  dir_records(store, geometry, dir)?
    .into_iter()
    .find(|record| !is_free(record) && record.name == name)
    .map(|record| record.inode_no)
    .ok_or_else(|| {
      Error::NotFound(format!("{} in inode {}", String::from_utf8_lossy(name), dir.number))
    })
}

/// Up to `max` children starting at `cursor` (`None` starts from the
/// first record). A zero `max` is treated as one.
pub fn read_dir(
  store: &dyn BlockStore,
  geometry: &Geometry,
  dir: &Inode,
  cursor: Option<DirCursor>,
  max: usize,
) -> Result<DirPage> {
  let child_count = dir.child_count()?;
  let start = match cursor {
    None => 0,
    Some(cursor) if cursor.dir != dir.number => {
      return Err(Error::InvalidCursor(format!(
        "cursor issued for inode {} used on inode {}",
        cursor.dir, dir.number
      )))
    },
    Some(cursor) if cursor.index > child_count => {
      return Err(Error::InvalidCursor(format!(
        "position {} past {child_count} records",
        cursor.index
      )))
    },
    Some(cursor) => cursor.index,
  };

  let records = dir_records(store, geometry, dir)?;
  let mut entries = Vec::new();
  let mut index = start;
  while index < child_count && entries.len() < max.max(1) {
    let record = &records[index as usize];
    if !is_free(record) {
      entries.push(DirEntry::from(record.clone()));
    }
    index += 1;
  }

  let next = if index < child_count {
    Some(DirCursor { dir: dir.number, index, mount: None })
  } else {
    None
  };

  Ok(DirPage { entries, next })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fs::block::MemBlockStore;
  use crate::fs::builder::ImageBuilder;
  use crate::fs::inode::{resolve_inode, FileMode, InodeKind};
  use crate::fs::superblock::load_superblock;

  fn fixture() -> (MemBlockStore, Geometry) {
    let mut builder = ImageBuilder::new(4096).unwrap();
    for name in ["zeta", "alpha", "Alpha", "mid"] {
      builder.add_file(1, name, name.as_bytes(), 0o444).unwrap();
    }
    builder.add_dir(1, "sub", 0o555).unwrap();
    let store = builder.into_store().unwrap();
    let geometry = load_superblock(&store).unwrap();
    (store, geometry)
  }

  fn names(entries: &[DirEntry]) -> Vec<String> {
    entries.iter().map(DirEntry::name_lossy).collect()
  }

  #[test]
  fn lists_children_in_disk_order() {
    let (store, geometry) = fixture();
    let root = resolve_inode(&store, &geometry, 1).unwrap();

    let children = list_children(&store, &geometry, &root).unwrap();
    assert_eq!(names(&children), ["zeta", "alpha", "Alpha", "mid", "sub"]);
    assert_eq!(children.iter().map(|entry| entry.inode_number).collect::<Vec<_>>(), [2, 3, 4, 5, 6]);
  }

  #[test]
  fn empty_directory_reads_nothing() {
    let (store, geometry) = fixture();
    let sub = resolve_inode(&store, &geometry, 6).unwrap();
    let reads = store.reads();

    assert!(list_children(&store, &geometry, &sub).unwrap().is_empty());
    assert_eq!(store.reads(), reads);
  }

  #[test]
  fn lookup_is_exact() {
    let (store, geometry) = fixture();
    let root = resolve_inode(&store, &geometry, 1).unwrap();

    assert_eq!(lookup_child(&store, &geometry, &root, b"alpha").unwrap(), 3);
    assert_eq!(lookup_child(&store, &geometry, &root, b"Alpha").unwrap(), 4);
    assert!(matches!(lookup_child(&store, &geometry, &root, b"ALPHA"), Err(Error::NotFound(_))));
    assert!(matches!(lookup_child(&store, &geometry, &root, b"alph"), Err(Error::NotFound(_))));
  }

  #[test]
  fn file_inodes_are_not_directories() {
    let (store, geometry) = fixture();
    let file = resolve_inode(&store, &geometry, 2).unwrap();

    assert!(matches!(list_children(&store, &geometry, &file), Err(Error::NotADirectory(2))));
    assert!(matches!(lookup_child(&store, &geometry, &file, b"x"), Err(Error::NotADirectory(2))));
    assert!(matches!(read_dir(&store, &geometry, &file, None, 10), Err(Error::NotADirectory(2))));
  }

  #[test]
  fn oversized_child_count_is_corrupt() {
    let (store, geometry) = fixture();
    let bogus = Inode {
      number: 1,
      mode: FileMode::dir(0o555),
      data_block: 2,
      kind: InodeKind::Directory { child_count: 57 },
    };

    assert!(matches!(list_children(&store, &geometry, &bogus), Err(Error::Corrupt(_))));
  }

  #[test]
  fn read_dir_resumes_by_record_index() {
    let (store, geometry) = fixture();
    let root = resolve_inode(&store, &geometry, 1).unwrap();

    let first = read_dir(&store, &geometry, &root, None, 2).unwrap();
    assert_eq!(names(&first.entries), ["zeta", "alpha"]);
    let cursor = first.next.unwrap();
    assert_eq!(cursor.position(), 2);

    let second = read_dir(&store, &geometry, &root, Some(cursor), 2).unwrap();
    assert_eq!(names(&second.entries), ["Alpha", "mid"]);

    let third = read_dir(&store, &geometry, &root, second.next, 2).unwrap();
    assert_eq!(names(&third.entries), ["sub"]);
    assert_eq!(third.next, None);
  }

  #[test]
  fn read_dir_positions_are_record_indices() {
    let (store, geometry) = fixture();
    let root = resolve_inode(&store, &geometry, 1).unwrap();

    // No `.` or `..` ahead of the records: position 0 is the first record
    let page = read_dir(&store, &geometry, &root, Some(DirCursor::resume(1, 0)), 1).unwrap();
    assert_eq!(names(&page.entries), ["zeta"]);
    let page = read_dir(&store, &geometry, &root, Some(DirCursor::resume(1, 4)), 10).unwrap();
    assert_eq!(names(&page.entries), ["sub"]);
  }

  #[test]
  fn read_dir_validates_cursors() {
    let (store, geometry) = fixture();
    let root = resolve_inode(&store, &geometry, 1).unwrap();
    let sub = resolve_inode(&store, &geometry, 6).unwrap();

    let cursor = read_dir(&store, &geometry, &root, None, 1).unwrap().next.unwrap();
    assert!(matches!(read_dir(&store, &geometry, &sub, Some(cursor), 1), Err(Error::InvalidCursor(_))));

    let past_end = DirCursor::resume(1, 6);
    assert!(matches!(read_dir(&store, &geometry, &root, Some(past_end), 1), Err(Error::InvalidCursor(_))));

    let at_end = DirCursor::resume(1, 5);
    let page = read_dir(&store, &geometry, &root, Some(at_end), 1).unwrap();
    assert!(page.entries.is_empty());
    assert_eq!(page.next, None);
  }

  #[test]
  fn free_slots_are_skipped() {
    let (store, geometry) = fixture();
    let mut image = (0..store.block_count())
      .flat_map(|block| store.read_block(block).unwrap())
      .collect::<Vec<u8>>();
    // Zero the record of "alpha" (second record of the root block)
    let offset = 2 * 4096 + DIR_RECORD_SIZE;
    image[offset..offset + DIR_RECORD_SIZE].fill(0);
    let store = MemBlockStore::new(image, 4096).unwrap();
    let root = resolve_inode(&store, &geometry, 1).unwrap();

    assert_eq!(names(&list_children(&store, &geometry, &root).unwrap()), ["zeta", "Alpha", "mid", "sub"]);
    assert!(matches!(lookup_child(&store, &geometry, &root, b""), Err(Error::NotFound(_))));
  }
}

// vim:ts=2 sw=2
