//! Offline image encoder.
//!
//! Layout produced by `build`: superblock in block 0, inode table from
//! block 1, then data blocks in inode order (one block per directory,
//! as many as the contents need per file). Mounted images are never
//! touched by this module.

use super::block::{MemBlockStore, MAX_BLOCK_SIZE};
use super::error::{Error, Result};
use super::inode::{FileMode, DEFAULT_PERMISSIONS};
use super::layout::{
  blocks_needed, records_per_block, validate_name, DirRecord, InodeRecord, Superblock,
  DIR_RECORD_SIZE, INODE_SIZE, ROOT_INODE_NUMBER, SUPERBLOCK_SIZE,
};

#[derive(Debug, Clone)]
enum NodeContent {
  Dir(Vec<DirRecord>),
  File(Vec<u8>),
}

#[derive(Debug, Clone)]
struct Node {
  mode: FileMode,
  content: NodeContent,
}

#[derive(Debug, Clone)]
pub struct ImageBuilder {
  block_size: u64,
  nodes: Vec<Node>,
}

impl ImageBuilder {
  /// Starts an image holding only an empty root directory.
  pub fn new(block_size: u64) -> Result<Self> {
    if block_size < DIR_RECORD_SIZE as u64 || block_size % INODE_SIZE as u64 != 0 || block_size > MAX_BLOCK_SIZE {
      return Err(Error::InvalidGeometry(format!("unsupported block size {block_size}")));
    }

    Ok(Self {
      block_size,
      nodes: vec![Node {
        mode: FileMode::dir(DEFAULT_PERMISSIONS),
        content: NodeContent::Dir(Vec::new()),
      }],
    })
  }

  pub fn add_dir(&mut self, parent: u64, name: &str, permissions: u32) -> Result<u64> {
    self.add_node(parent, name, Node {
      mode: FileMode::dir(permissions),
      content: NodeContent::Dir(Vec::new()),
    })
  }

  pub fn add_file(&mut self, parent: u64, name: &str, contents: &[u8], permissions: u32) -> Result<u64> {
    self.add_node(parent, name, Node {
      mode: FileMode::file(permissions),
      content: NodeContent::File(contents.to_vec()),
    })
  }

  fn add_node(&mut self, parent: u64, name: &str, node: Node) -> Result<u64> {
    validate_name(name.as_bytes())?;

    let number = self.nodes.len() as u64 + ROOT_INODE_NUMBER;
    let capacity = records_per_block(self.block_size, DIR_RECORD_SIZE) as usize;

    let parent_node = parent
      .checked_sub(1)
      .and_then(|index| self.nodes.get_mut(index as usize))
      .ok_or_else(|| Error::NotFound(format!("inode {parent}")))?;

    match &mut parent_node.content {
      NodeContent::File(_) => return Err(Error::NotADirectory(parent)),
      NodeContent::Dir(records) => {
        if records.iter().any(|record| record.name == name.as_bytes()) {
          return Err(Error::InvalidName(format!("{name} already exists in inode {parent}")));
        }
        if records.len() >= capacity {
          return Err(Error::Corrupt(format!(
            "directory inode {parent} is full ({capacity} records per block)"
          )));
        }
        records.push(DirRecord::new(name.as_bytes(), number)?);
      },
    }

    self.nodes.push(node);
    Ok(number)
  }

  pub fn build(&self) -> Result<Vec<u8>> {
    let block_size = self.block_size;
    let inode_count = self.nodes.len() as u64;
    let table_blocks = blocks_needed(block_size, inode_count * INODE_SIZE as u64);
    let inodes_block = 1;

    // Assign data blocks in inode order
    let mut next_block = inodes_block + table_blocks;
    let mut records = Vec::with_capacity(self.nodes.len());
    for (index, node) in self.nodes.iter().enumerate() {
      let (size, blocks) = match &node.content {
        NodeContent::Dir(children) => (children.len() as u64, 1),
        NodeContent::File(contents) => {
          let size = contents.len() as u64;
          (size, blocks_needed(block_size, size))
        },
      };
      let data_block_number = if blocks == 0 { 0 } else { next_block };
      next_block += blocks;

      records.push(InodeRecord {
        mode: node.mode.raw(),
        inode_no: index as u64 + ROOT_INODE_NUMBER,
        data_block_number,
        size,
      });
    }

    let mut image = vec![0u8; (next_block * block_size) as usize];
    image[..SUPERBLOCK_SIZE].copy_from_slice(&Superblock::new(block_size, inodes_block).encode());

    for (index, (node, record)) in self.nodes.iter().zip(records.iter()).enumerate() {
      let slot = (inodes_block * block_size) as usize + index * INODE_SIZE;
      image[slot..slot + INODE_SIZE].copy_from_slice(&record.encode());

      let data = (record.data_block_number * block_size) as usize;
      match &node.content {
        NodeContent::Dir(children) => {
          for (position, child) in children.iter().enumerate() {
            let offset = data + position * DIR_RECORD_SIZE;
            image[offset..offset + DIR_RECORD_SIZE].copy_from_slice(&child.encode()?);
          }
        },
        NodeContent::File(contents) if !contents.is_empty() => {
          image[data..data + contents.len()].copy_from_slice(contents);
        },
        NodeContent::File(_) => (),
      }
    }

    Ok(image)
  }

  pub fn into_store(self) -> Result<MemBlockStore> {
    let image = self.build()?;
    MemBlockStore::new(image, self.block_size)
  }
}

#[cfg(test)]
impl ImageBuilder {
  /// Root (inode 1, block 2) holding `hello.txt` (inode 2, block 3).
  pub fn hello_world() -> Self {
    let mut builder = Self::new(4096).unwrap();
    builder.add_file(ROOT_INODE_NUMBER, "hello.txt", b"hello world", 0o444).unwrap();
    builder
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fs::layout::MFS_MAGIC;

  #[test]
  fn hello_world_layout() {
    let image = ImageBuilder::hello_world().build().unwrap();
    assert_eq!(image.len(), 4 * 4096);

    let superblock = Superblock::decode(&image).unwrap();
    assert_eq!(superblock.magic, MFS_MAGIC);
    assert_eq!(superblock.inodes_block, 1);

    let root = InodeRecord::decode(&image[4096..]).unwrap();
    assert_eq!((root.inode_no, root.data_block_number, root.size), (1, 2, 1));

    let file = InodeRecord::decode(&image[4096 + INODE_SIZE..]).unwrap();
    assert_eq!((file.inode_no, file.data_block_number, file.size), (2, 3, 11));

    assert_eq!(DirRecord::decode(&image[2 * 4096..]).unwrap(), DirRecord::new(b"hello.txt", 2).unwrap());
    assert_eq!(&image[3 * 4096..3 * 4096 + 11], b"hello world");
  }

  #[test]
  fn large_files_take_consecutive_blocks() {
    // 160-byte blocks: two directory records per block, 300 bytes span two blocks
    let mut builder = ImageBuilder::new(160).unwrap();
    let contents = (0..300u32).map(|i| i as u8).collect::<Vec<u8>>();
    builder.add_file(1, "big", &contents, 0o444).unwrap();
    builder.add_file(1, "empty", b"", 0o444).unwrap();
    let image = builder.build().unwrap();

    let root = InodeRecord::decode(&image[160..]).unwrap();
    assert_eq!((root.data_block_number, root.size), (2, 2));

    let big = InodeRecord::decode(&image[160 + INODE_SIZE..]).unwrap();
    assert_eq!((big.data_block_number, big.size), (3, 300));
    assert_eq!(&image[3 * 160..3 * 160 + 300], contents.as_slice());

    let empty = InodeRecord::decode(&image[160 + 2 * INODE_SIZE..]).unwrap();
    assert_eq!((empty.data_block_number, empty.size), (0, 0));
    assert_eq!(image.len(), 5 * 160);
  }

  #[test]
  fn rejects_bad_children() {
    let mut builder = ImageBuilder::new(4096).unwrap();
    let file = builder.add_file(1, "f", b"x", 0o444).unwrap();

    assert!(matches!(builder.add_file(file, "g", b"", 0o444), Err(Error::NotADirectory(2))));
    assert!(matches!(builder.add_dir(1, "f", 0o555), Err(Error::InvalidName(_))));
    assert!(matches!(builder.add_dir(9, "d", 0o555), Err(Error::NotFound(_))));
    assert!(matches!(builder.add_dir(0, "d", 0o555), Err(Error::NotFound(_))));
  }

  #[test]
  fn directories_are_limited_to_one_block() {
    let mut builder = ImageBuilder::new(160).unwrap();
    builder.add_dir(1, "a", 0o555).unwrap();
    builder.add_dir(1, "b", 0o555).unwrap();

    assert!(matches!(builder.add_dir(1, "c", 0o555), Err(Error::Corrupt(_))));
  }
}

// vim:ts=2 sw=2
