use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::fs::block::FileBlockStore;
use crate::fs::error::{Error, Result};
use crate::fs::vfs::Vfs;
use crate::fs::volume::{MountFlags, Volume};

/// Mount table file, e.g.
///
/// ```yaml
/// log_level: info
/// mounts:
///   - image: images/root.img
///     target: /
///   - image: images/usb.img
///     target: /mnt/usb
///     block_size: 4096
/// ```
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigSchema {
  #[serde(default)]
  pub log_level: Option<String>,
  pub mounts: Vec<MountSchema>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct MountSchema {
  pub image: String,
  pub target: String,
  #[serde(default = "default_read_only")]
  pub read_only: bool,
  /// Taken from the image's superblock when absent
  #[serde(default)]
  pub block_size: Option<u64>,
}

fn default_read_only() -> bool {
  true
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountConfig {
  pub image: PathBuf,
  pub target: String,
  pub flags: MountFlags,
  pub block_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  pub log_level: Option<String>,
  pub mounts: Vec<MountConfig>,
}

impl Config {
  /// Image paths are resolved against the config file's directory.
  pub fn from_path(config_path: &Path) -> Result<Self> {
    let reader = std::fs::File::open(config_path)?;
    let schema = serde_yaml::from_reader::<_, ConfigSchema>(reader)?;
    let base = config_path.parent().unwrap_or_else(|| Path::new("."));

    debug!("loaded {} mounts from {}", schema.mounts.len(), config_path.display());
    Self::from_schema(schema, base)
  }

  pub fn from_yaml(yaml: &str, base: &Path) -> Result<Self> {
    Self::from_schema(serde_yaml::from_str::<ConfigSchema>(yaml)?, base)
  }

  fn from_schema(schema: ConfigSchema, base: &Path) -> Result<Self> {
    if schema.mounts.is_empty() {
      return Err(Error::Config("no mounts configured".to_owned()));
    }

    let mounts = schema
      .mounts
      .into_iter()
      .map(|mount| MountConfig {
        image: base.join(&mount.image),
        target: mount.target,
        flags: MountFlags { read_only: mount.read_only },
        block_size: mount.block_size,
      })
      .collect();

    Ok(Self {
      log_level: schema.log_level,
      mounts,
    })
  }

  /// One image mounted read-only at `/`.
  pub fn single_image(image: PathBuf) -> Self {
    Self {
      log_level: None,
      mounts: vec![MountConfig {
        image,
        target: "/".to_owned(),
        flags: MountFlags::read_only(),
        block_size: None,
      }],
    }
  }

  pub fn mount_all(&self) -> Result<Vfs> {
    let mut vfs = Vfs::new();

    for mount in &self.mounts {
      let volume = match mount.block_size {
        Some(block_size) if mount.flags.read_only => {
          let store = FileBlockStore::open(&mount.image, block_size)?;
          Volume::mount(Box::new(store), mount.flags)?
        },
        _ => Volume::open_image(&mount.image, mount.flags)?,
      };

      vfs.mount(&mount.target, &mount.image.display().to_string(), Box::new(volume))?;
    }

    Ok(vfs)
  }
}


// vim:ts=2 sw=2
