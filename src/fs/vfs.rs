use std::any::Any;
use std::collections::BTreeMap;
use core::fmt::Debug;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use log::info;
use uuid::Uuid;

use super::dir::{DirCursor, DirPage};
use super::error::{Error, Result};
use super::inode::{FileMode, FileType, Inode, InodeKind};
use super::layout::blocks_needed;
use super::superblock::Geometry;
use crate::util::normalize_path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
  pub inode_number: u64,
  pub mode: FileMode,
  pub file_type: FileType,
  /// Byte length for files, child count for directories
  pub size: u64,
  pub data_block: u64,
  pub block_size: u64,
  pub blocks: u64,
}

impl FileStat {
  pub fn new(inode: &Inode, geometry: &Geometry) -> Self {
    let (size, blocks) = match inode.kind {
      InodeKind::Directory { child_count } => (child_count, 1),
      InodeKind::File { size } => (size, blocks_needed(geometry.block_size, size)),
    };

    Self {
      inode_number: inode.number,
      mode: inode.mode,
      file_type: inode.file_type(),
      size,
      data_block: inode.data_block,
      block_size: geometry.block_size,
      blocks,
    }
  }
}

/// Operations a host wires into its own VFS. Handed over per mount, so
/// nothing about the host lives in module-global tables.
pub trait Filesystem: Send + Sync {
  /// Resolves an absolute path, relative to this filesystem's root.
  fn lookup_path(&self, pathname: &str) -> Result<Inode>;

  fn stat(&self, pathname: &str) -> Result<FileStat>;

  fn read_file(&self, pathname: &str, offset: u64, count: u64) -> Result<Vec<u8>>;

  /// Resumable listing, see `dir::read_dir`.
  fn read_dir(&self, pathname: &str, cursor: Option<DirCursor>, max: usize) -> Result<DirPage>;

  fn name(&self) -> &'static str;
  fn as_any(&self) -> &dyn Any;

  /// Runs once the filesystem has been detached from its mount point.
  fn release(self: Box<Self>) {}
}

impl Debug for dyn Filesystem {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    write!(f, "Filesystem {{ {} }}", self.name())
  }
}

#[derive(Debug)]
pub struct MountedFilesystem {
  pub id: Uuid,
  pub source: String,
  pub mounted_at: DateTime<Utc>,
  pub driver: Box<dyn Filesystem>,
}

impl MountedFilesystem {
  pub fn release(self) {
    info!("releasing {} ({})", self.source, self.id);
    self.driver.release();
  }
}

/// Mount table: absolute mount point -> mounted driver.
#[derive(Debug, Default)]
pub struct Vfs {
  pub mount_points: BTreeMap<String, MountedFilesystem>,
}

impl Vfs {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn mount(&mut self, target: &str, source: &str, driver: Box<dyn Filesystem>) -> Result<Uuid> {
    let target = format!("/{}", normalize_path(target)?.join("/"));
    if self.mount_points.contains_key(&target) {
      return Err(Error::InvalidPath(format!("mount point {target} already taken")));
    }

    let id = Uuid::new_v4();
    info!("mounted {source} ({}) on {target} as {id}", driver.name());
    self.mount_points.insert(target, MountedFilesystem {
      id,
      source: source.to_owned(),
      mounted_at: Utc::now(),
      driver,
    });

    Ok(id)
  }

  /// Detaches the filesystem at `target` and hands it back to the caller.
  pub fn umount(&mut self, target: &str) -> Result<MountedFilesystem> {
    let target = format!("/{}", normalize_path(target)?.join("/"));
    let mounted = self
      .mount_points
      .remove(&target)
      .ok_or_else(|| Error::NotFound(format!("no mount point at {target}")))?;

    info!("unmounted {} from {target}", mounted.source);
    Ok(mounted)
  }

  /// Longest mount point containing `pathname`, and the path inside it.
  pub fn match_mount_point(&self, pathname: &str) -> Result<(String, String)> {
    let components = normalize_path(pathname)?;
    let absolute = format!("/{}", components.join("/"));

    let mount_point = self
      .mount_points
      .keys()
      .sorted_by(|key1, key2| key2.len().cmp(&key1.len()))
      .find(|mount_point| {
        mount_point.as_str() == "/"
          || absolute == **mount_point
          || absolute.starts_with(&format!("{mount_point}/"))
      })
      .ok_or_else(|| Error::NotFound(format!("{absolute}: no mount point")))?;

    let internal = match mount_point.as_str() {
      "/" => absolute.clone(),
      prefix => format!("/{}", absolute[prefix.len()..].trim_start_matches('/')),
    };

    Ok((mount_point.to_owned(), internal))
  }

  fn mounted_at(&self, pathname: &str) -> Result<(&MountedFilesystem, String)> {
    let (mount_point, internal) = self.match_mount_point(pathname)?;
    let mounted = self
      .mount_points
      .get(&mount_point)
      .ok_or_else(|| Error::NotFound(format!("no mount point at {mount_point}")))?;
    Ok((mounted, internal))
  }

  fn driver_for(&self, pathname: &str) -> Result<(&dyn Filesystem, String)> {
    let (mounted, internal) = self.mounted_at(pathname)?;
    Ok((mounted.driver.as_ref(), internal))
  }
}

impl Filesystem for Vfs {
  fn lookup_path(&self, pathname: &str) -> Result<Inode> {
    let (driver, internal) = self.driver_for(pathname)?;
    driver.lookup_path(&internal)
  }

  fn stat(&self, pathname: &str) -> Result<FileStat> {
    let (driver, internal) = self.driver_for(pathname)?;
    driver.stat(&internal)
  }

  fn read_file(&self, pathname: &str, offset: u64, count: u64) -> Result<Vec<u8>> {
    let (driver, internal) = self.driver_for(pathname)?;
    driver.read_file(&internal, offset, count)
  }

  /// Cursors are tagged with the mount that issued them and refused
  /// anywhere else.
  fn read_dir(&self, pathname: &str, cursor: Option<DirCursor>, max: usize) -> Result<DirPage> {
    let (mounted, internal) = self.mounted_at(pathname)?;
    if let Some(cursor) = cursor {
      if cursor.mount() != Some(mounted.id) {
        return Err(Error::InvalidCursor(format!("cursor was not issued by the mount at {pathname}")));
      }
    }

    let mut page = mounted.driver.read_dir(&internal, cursor, max)?;
    page.next = page.next.map(|next| next.on_mount(mounted.id));
    Ok(page)
  }

  fn name(&self) -> &'static str {
    "vfs"
  }

  fn as_any(&self) -> &dyn Any {
    self
  }

  fn release(self: Box<Self>) {
    for (_, mounted) in self.mount_points {
      mounted.release();
    }
  }
}


// vim:ts=2 sw=2
