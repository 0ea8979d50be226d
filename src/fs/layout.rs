//! On-disk records of an mfs image.
//!
//! All integers are little-endian. Offsets below are from the start of the
//! record; everything after the last field of a block is padding.
//!
//! ```text
//! Superblock (block 0)       Inode record              Directory record
//! 0  version      u64        0  mode        u32        0  filename [u8; 64]
//! 8  magic        u64        4  (padding)   [u8; 4]    64 inode_no u64
//! 16 block_size   u64        8  inode_no    u64
//! 24 inodes_block u64        16 data_block  u64
//!                            24 size        u64
//! ```

use super::error::{Error, Result};

pub const MFS_MAGIC: u64 = 0xDEAD_BEEF;
pub const MFS_VERSION: u64 = 1;
pub const ROOT_INODE_NUMBER: u64 = 1;

pub const FILENAME_FIELD_SIZE: usize = 64;
/// Longest name a directory record holds, leaving room for the NUL
pub const FILENAME_MAXLEN: usize = FILENAME_FIELD_SIZE - 1;

pub const SUPERBLOCK_SIZE: usize = 32;
pub const INODE_SIZE: usize = 32;
pub const DIR_RECORD_SIZE: usize = FILENAME_FIELD_SIZE + 8;

fn ensure_len(bytes: &[u8], record: &'static str, expected: usize) -> Result<()> {
  if bytes.len() < expected {
    return Err(Error::TruncatedRecord { record, expected, actual: bytes.len() });
  }
  Ok(())
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
  let mut raw = [0u8; 4];
  raw.copy_from_slice(&bytes[offset..offset + 4]);
  u32::from_le_bytes(raw)
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
  let mut raw = [0u8; 8];
  raw.copy_from_slice(&bytes[offset..offset + 8]);
  u64::from_le_bytes(raw)
}

fn write_u64(bytes: &mut [u8], offset: usize, value: u64) {
  bytes[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// How many records of `record_size` fit in one block.
pub fn records_per_block(block_size: u64, record_size: usize) -> u64 {
  block_size / record_size as u64
}

/// Blocks needed to hold `bytes` bytes, rounding up.
pub fn blocks_needed(block_size: u64, bytes: u64) -> u64 {
  bytes / block_size + if bytes % block_size > 0 { 1 } else { 0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
  pub version: u64,
  pub magic: u64,
  pub block_size: u64,
  pub inodes_block: u64,
}

impl Superblock {
  pub fn new(block_size: u64, inodes_block: u64) -> Self {
    Self {
      version: MFS_VERSION,
      magic: MFS_MAGIC,
      block_size,
      inodes_block,
    }
  }

  pub fn decode(bytes: &[u8]) -> Result<Self> {
    ensure_len(bytes, "superblock", SUPERBLOCK_SIZE)?;

    Ok(Self {
      version: read_u64(bytes, 0),
      magic: read_u64(bytes, 8),
      block_size: read_u64(bytes, 16),
      inodes_block: read_u64(bytes, 24),
    })
  }

  pub fn encode(&self) -> [u8; SUPERBLOCK_SIZE] {
    let mut bytes = [0u8; SUPERBLOCK_SIZE];
    write_u64(&mut bytes, 0, self.version);
    write_u64(&mut bytes, 8, self.magic);
    write_u64(&mut bytes, 16, self.block_size);
    write_u64(&mut bytes, 24, self.inodes_block);
    bytes
  }
}

/// Raw inode table entry. `size` is a child count for directories and a
/// byte length for regular files; see `inode::Inode` for the typed view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InodeRecord {
  pub mode: u32,
  pub inode_no: u64,
  pub data_block_number: u64,
  pub size: u64,
}

impl InodeRecord {
  pub fn decode(bytes: &[u8]) -> Result<Self> {
    ensure_len(bytes, "inode record", INODE_SIZE)?;

    Ok(Self {
      mode: read_u32(bytes, 0),
      inode_no: read_u64(bytes, 8),
      data_block_number: read_u64(bytes, 16),
      size: read_u64(bytes, 24),
    })
  }

  pub fn encode(&self) -> [u8; INODE_SIZE] {
    let mut bytes = [0u8; INODE_SIZE];
    bytes[0..4].copy_from_slice(&self.mode.to_le_bytes());
    write_u64(&mut bytes, 8, self.inode_no);
    write_u64(&mut bytes, 16, self.data_block_number);
    write_u64(&mut bytes, 24, self.size);
    bytes
  }
}

/// Directory entry as stored: name bytes without the terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirRecord {
  pub name: Vec<u8>,
  pub inode_no: u64,
}

impl DirRecord {
  pub fn new(name: &[u8], inode_no: u64) -> Result<Self> {
    validate_name(name)?;

    Ok(Self {
      name: name.to_vec(),
      inode_no,
    })
  }

  /// Never reads past the 64-byte name field. A field without a NUL
  /// is rejected instead of being truncated.
  pub fn decode(bytes: &[u8]) -> Result<Self> {
    ensure_len(bytes, "directory record", DIR_RECORD_SIZE)?;

    let field = &bytes[..FILENAME_FIELD_SIZE];
    let name_len = field
      .iter()
      .position(|&byte| byte == 0)
      .ok_or_else(|| Error::Corrupt("directory record name is not NUL-terminated".to_owned()))?;

    Ok(Self {
      name: field[..name_len].to_vec(),
      inode_no: read_u64(bytes, FILENAME_FIELD_SIZE),
    })
  }

  pub fn encode(&self) -> Result<[u8; DIR_RECORD_SIZE]> {
    validate_name(&self.name)?;

    let mut bytes = [0u8; DIR_RECORD_SIZE];
    bytes[..self.name.len()].copy_from_slice(&self.name);
    write_u64(&mut bytes, FILENAME_FIELD_SIZE, self.inode_no);
    Ok(bytes)
  }
}

pub fn validate_name(name: &[u8]) -> Result<()> {
  if name.len() > FILENAME_MAXLEN {
    return Err(Error::NameTooLong(name.len()));
  }
  if name.is_empty() || name.contains(&0) || name.contains(&b'/') {
    return Err(Error::InvalidName(String::from_utf8_lossy(name).into_owned()));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn superblock_layout_is_bit_exact() {
    let superblock = Superblock::new(4096, 1);
    let bytes = superblock.encode();

    assert_eq!(&bytes[0..8], &1u64.to_le_bytes());
    assert_eq!(&bytes[8..16], &0xDEADBEEFu64.to_le_bytes());
    assert_eq!(&bytes[16..24], &4096u64.to_le_bytes());
    assert_eq!(&bytes[24..32], &1u64.to_le_bytes());
    assert_eq!(Superblock::decode(&bytes).unwrap(), superblock);
  }

  #[test]
  fn inode_record_round_trip() {
    let record = InodeRecord {
      mode: 0o100_644,
      inode_no: 7,
      data_block_number: 42,
      size: 12345,
    };
    let bytes = record.encode();

    assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
    assert_eq!(InodeRecord::decode(&bytes).unwrap(), record);
  }

  #[test]
  fn dir_record_round_trip() {
    let record = DirRecord::new(b"hello.txt", 2).unwrap();
    let bytes = record.encode().unwrap();

    assert_eq!(&bytes[..10], b"hello.txt\0");
    assert_eq!(&bytes[64..72], &2u64.to_le_bytes());
    assert_eq!(DirRecord::decode(&bytes).unwrap(), record);
  }

  #[test]
  fn short_buffers_are_truncated_records() {
    assert!(matches!(
      Superblock::decode(&[0u8; 31]),
      Err(Error::TruncatedRecord { expected: SUPERBLOCK_SIZE, actual: 31, .. })
    ));
    assert!(matches!(InodeRecord::decode(&[0u8; 8]), Err(Error::TruncatedRecord { .. })));
    assert!(matches!(DirRecord::decode(&[0u8; 71]), Err(Error::TruncatedRecord { .. })));
  }

  #[test]
  fn unterminated_name_is_rejected() {
    let mut bytes = [b'a'; DIR_RECORD_SIZE];
    bytes[64..72].copy_from_slice(&3u64.to_le_bytes());

    assert!(matches!(DirRecord::decode(&bytes), Err(Error::Corrupt(_))));
  }

  #[test]
  fn name_stops_at_first_nul() {
    let mut bytes = [0u8; DIR_RECORD_SIZE];
    bytes[..7].copy_from_slice(b"abc\0def");

    assert_eq!(DirRecord::decode(&bytes).unwrap().name, b"abc".to_vec());
  }

  #[test]
  fn names_are_validated() {
    let longest = vec![b'x'; FILENAME_MAXLEN];
    assert!(DirRecord::new(&longest, 1).is_ok());
    assert!(matches!(DirRecord::new(&[b'x'; 64], 1), Err(Error::NameTooLong(64))));
    assert!(matches!(DirRecord::new(b"", 1), Err(Error::InvalidName(_))));
    assert!(matches!(DirRecord::new(b"a\0b", 1), Err(Error::InvalidName(_))));
    assert!(matches!(DirRecord::new(b"a/b", 1), Err(Error::InvalidName(_))));
  }

  #[test]
  fn block_accounting() {
    assert_eq!(records_per_block(4096, INODE_SIZE), 128);
    assert_eq!(records_per_block(4096, DIR_RECORD_SIZE), 56);
    assert_eq!(blocks_needed(4096, 0), 0);
    assert_eq!(blocks_needed(4096, 1), 1);
    assert_eq!(blocks_needed(4096, 4096), 1);
    assert_eq!(blocks_needed(4096, 4097), 2);
  }
}

// vim:ts=2 sw=2
