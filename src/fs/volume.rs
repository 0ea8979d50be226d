use std::any::Any;
use std::fmt;
use std::path::Path;

use log::{debug, info};

use super::block::{BlockStore, FileBlockStore};
use super::dir::{self, DirCursor, DirEntry, DirPage};
use super::error::{Error, Result};
use super::file::{self, OpenFile};
use super::inode::{resolve_inode, Inode};
use super::layout::ROOT_INODE_NUMBER;
use super::superblock::{load_superblock, Geometry};
use super::vfs::{FileStat, Filesystem};
use crate::util::normalize_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MountFlags {
  pub read_only: bool,
}

impl MountFlags {
  pub fn read_only() -> Self {
    Self { read_only: true }
  }
}

/// A mounted mfs image: the block store, the geometry read from its
/// superblock at mount time, and the resolved root directory.
pub struct Volume {
  store: Box<dyn BlockStore>,
  geometry: Geometry,
  root: Inode,
}

impl fmt::Debug for Volume {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Volume")
      .field("geometry", &self.geometry)
      .field("root", &self.root)
      .finish()
  }
}

impl Volume {
  /// Only read-only mounts are accepted; anything else is refused before
  /// the store is read.
  pub fn mount(store: Box<dyn BlockStore>, flags: MountFlags) -> Result<Self> {
    if !flags.read_only {
      return Err(Error::PermissionDenied("mfs can only be mounted read-only"));
    }

    let geometry = load_superblock(store.as_ref())?;
    let root = resolve_inode(store.as_ref(), &geometry, ROOT_INODE_NUMBER)?;
    if !root.is_dir() {
      return Err(Error::NotADirectory(root.number));
    }

    debug!("root inode: {root:?}, permissions {}", root.mode);
    info!("mounted mfs volume ({} byte blocks)", geometry.block_size);

    Ok(Self { store, geometry, root })
  }

  /// Opens and mounts an image file, taking the block size from its header.
  pub fn open_image(path: impl AsRef<Path>, flags: MountFlags) -> Result<Self> {
    if !flags.read_only {
      return Err(Error::PermissionDenied("mfs can only be mounted read-only"));
    }

    let store = FileBlockStore::open_probed(path.as_ref())?;
    info!("mounting {}", path.as_ref().display());
    Self::mount(Box::new(store), flags)
  }

  /// Nothing is written back; dropping the store is all there is to do.
  pub fn unmount(self) {
    info!("unmounted mfs volume after {} block reads", self.store.reads());
  }

  pub fn root(&self) -> &Inode {
    &self.root
  }

  pub fn store(&self) -> &dyn BlockStore {
    self.store.as_ref()
  }

  pub fn resolve(&self, number: u64) -> Result<Inode> {
    resolve_inode(self.store(), &self.geometry, number)
  }

  pub fn list(&self, dir: &Inode) -> Result<Vec<DirEntry>> {
    dir::list_children(self.store(), &self.geometry, dir)
  }

  pub fn lookup(&self, dir: &Inode, name: &[u8]) -> Result<Inode> {
    let number = dir::lookup_child(self.store(), &self.geometry, dir, name)?;
    self.resolve(number)
  }

  pub fn read(&self, file: &Inode, offset: u64, length: u64) -> Result<Vec<u8>> {
    file::read(self.store(), &self.geometry, file, offset, length)
  }

  pub fn open(&self, pathname: &str) -> Result<OpenFile<'_>> {
    let inode = self.lookup_path(pathname)?;
    OpenFile::new(self.store(), self.geometry, inode)
  }
}

impl Filesystem for Volume {
  fn lookup_path(&self, pathname: &str) -> Result<Inode> {
    normalize_path(pathname)?
      .iter()
      .try_fold(self.root, |dir, component| self.lookup(&dir, component.as_bytes()))
  }

  fn stat(&self, pathname: &str) -> Result<FileStat> {
    let inode = self.lookup_path(pathname)?;
    Ok(FileStat::new(&inode, &self.geometry))
  }

  fn read_file(&self, pathname: &str, offset: u64, count: u64) -> Result<Vec<u8>> {
    let inode = self.lookup_path(pathname)?;
    self.read(&inode, offset, count)
  }

  fn read_dir(&self, pathname: &str, cursor: Option<DirCursor>, max: usize) -> Result<DirPage> {
    let inode = self.lookup_path(pathname)?;
    dir::read_dir(self.store(), &self.geometry, &inode, cursor, max)
  }

  fn name(&self) -> &'static str {
    "mfs"
  }

  fn as_any(&self) -> &dyn Any {
    self
  }

  fn release(self: Box<Self>) {
    (*self).unmount();
  }
}


// vim:ts=2 sw=2
