use std::collections::BTreeSet;
use std::io::Write;

use clap::Parser;
use fancy_regex::Regex;
use itertools::Itertools;
use sha2::{Digest, Sha256};

use mfs::fs::dir::DirCursor;
use mfs::fs::error::{Error, Result};
use mfs::fs::inode::FileType;
use mfs::fs::vfs::{Filesystem, Vfs};

pub type Args = Vec<String>;
pub type ExitCode = u32;

pub const EXIT_ENOENT: ExitCode = 127;
pub const EXIT_SUCCESS: ExitCode = 0;
pub const EXIT_FAILURE: ExitCode = 1;

/// Directory entries fetched per `read_dir` call
const LISTING_PAGE: usize = 16;
/// Bytes fetched per `read_file` call when streaming a file
const READ_CHUNK: u64 = 64 * 1024;

pub fn run(args: Args, vfs: &mut Vfs, out: &mut dyn Write) -> ExitCode {
  match args.get(0).map(String::as_str) {
    Some("ls") => ls(args, vfs, out),
    Some("cat") => cat(args, vfs, out),
    Some("stat") => stat(args, vfs, out),
    Some("find") => find(args, vfs, out),
    Some("sha256sum") => sha256sum(args, vfs, out),
    Some("xxd") => xxd(args, vfs, out),
    Some("mounts") => mounts(args, vfs, out),
    Some("umount") => umount(args, vfs, out),
    Some("help") => {
      let _ = writeln!(out, "commands: ls cat stat find sha256sum xxd mounts umount exit");
      EXIT_SUCCESS
    },
    Some(command) => {
      let _ = writeln!(out, "{command}: command not found");
      EXIT_ENOENT
    },
    None => EXIT_SUCCESS,
  }
}

/// Prints the error the way each command reports it and picks the exit code.
fn finish(command: &str, pathname: &str, result: Result<()>, out: &mut dyn Write) -> ExitCode {
  let (message, code) = match result {
    Ok(()) => return EXIT_SUCCESS,
    Err(Error::NotFound(_)) => (format!("{pathname}: No such file or directory"), EXIT_ENOENT),
    Err(Error::NotADirectory(_)) => (format!("{pathname}: Not a directory"), EXIT_FAILURE),
    Err(Error::NotAFile(_)) => (format!("{pathname}: Is a directory"), EXIT_FAILURE),
    Err(Error::InvalidPath(message)) => (format!("invalid path: {message}"), EXIT_FAILURE),
    Err(error) => (format!("unexpected error ({}): {error}", error.errno()), EXIT_FAILURE),
  };

  let _ = writeln!(out, "{command}: {message}");
  code
}

fn join_path(dir: &str, name: &str) -> String {
  if dir.ends_with('/') {
    format!("{dir}{name}")
  } else {
    format!("{dir}/{name}")
  }
}

/// Visits every child of `pathname`, one `read_dir` page at a time.
fn for_each_child(
  vfs: &Vfs,
  pathname: &str,
  mut visit: impl FnMut(&str, u64) -> Result<()>,
) -> Result<()> {
  let mut cursor: Option<DirCursor> = None;
  loop {
    let page = vfs.read_dir(pathname, cursor, LISTING_PAGE)?;
    for entry in &page.entries {
      visit(&entry.name_lossy(), entry.inode_number)?;
    }
    match page.next {
      Some(next) => cursor = Some(next),
      None => return Ok(()),
    }
  }
}

// FS reading stuff

pub fn ls(args: Args, vfs: &mut Vfs, out: &mut dyn Write) -> ExitCode {
  #[derive(Debug, Parser)]
  struct BinArgs {
    /// Show mode, inode, and size
    #[clap(short, long)]
    long: bool,

    #[clap(default_value = "/")]
    pathname: String,
  }

  match BinArgs::try_parse_from(args.iter()) {
    Err(message) => {
      let _ = writeln!(out, "ls: invalid arguments: {message}");
      EXIT_FAILURE
    },
    Ok(BinArgs { long, pathname }) => {
      let result = for_each_child(vfs, &pathname, |name, inode_number| {
        if long {
          let stat = vfs.stat(&join_path(&pathname, name))?;
          writeln!(out, "{} {:>6} {:>10} {name}", stat.mode, inode_number, stat.size)?;
        } else {
          writeln!(out, "{name}")?;
        }
        Ok(())
      });
      finish("ls", &pathname, result, out)
    },
  }
}

pub fn cat(args: Args, vfs: &mut Vfs, out: &mut dyn Write) -> ExitCode {
  #[derive(Debug, Parser)]
  struct BinArgs {
    #[clap(required = true)]
    pathnames: Vec<String>,
  }

  match BinArgs::try_parse_from(args.iter()) {
    Err(message) => {
      let _ = writeln!(out, "cat: invalid arguments: {message}");
      EXIT_FAILURE
    },
    Ok(BinArgs { pathnames }) => {
      for pathname in pathnames {
        let result = vfs
          .read_file(&pathname, 0, u64::MAX)
          .and_then(|bytes| Ok(out.write_all(&bytes)?));
        match finish("cat", &pathname, result, out) {
          EXIT_SUCCESS => (),
          code => return code,
        }
      }
      EXIT_SUCCESS
    },
  }
}

pub fn stat(args: Args, vfs: &mut Vfs, out: &mut dyn Write) -> ExitCode {
  #[derive(Debug, Parser)]
  struct BinArgs {
    pathname: String,
  }

  match BinArgs::try_parse_from(args.iter()) {
    Err(message) => {
      let _ = writeln!(out, "stat: invalid arguments: {message}");
      EXIT_FAILURE
    },
    Ok(BinArgs { pathname }) => {
      let result = vfs.stat(&pathname).and_then(|stat| {
        let (kind, size_label) = match stat.file_type {
          FileType::Dir => ("directory", "Children"),
          FileType::File => ("regular file", "Size"),
        };
        writeln!(out, "  File: {pathname}")?;
        writeln!(
          out,
          "  {size_label}: {:<10} Blocks: {:<6} IO Block: {:<6} {kind}",
          stat.size, stat.blocks, stat.block_size
        )?;
        writeln!(out, " Inode: {:<10} Data block: {}", stat.inode_number, stat.data_block)?;
        writeln!(out, "Access: ({:04o}/{})", stat.mode.permissions(), stat.mode)?;
        Ok(())
      });
      finish("stat", &pathname, result, out)
    },
  }
}

pub fn find(args: Args, vfs: &mut Vfs, out: &mut dyn Write) -> ExitCode {
  #[derive(Debug, Parser)]
  struct BinArgs {
    /// Only print paths whose final component matches this pattern
    #[clap(short, long)]
    name: Option<String>,

    #[clap(default_value = "/")]
    pathname: String,
  }

  /// Inode numbers repeat across volumes, so directories are keyed by
  /// the mount point they live under as well.
  fn directory_key(vfs: &Vfs, pathname: &str, inode_number: u64) -> Result<(String, u64)> {
    let (mount_point, _) = vfs.match_mount_point(pathname)?;
    Ok((mount_point, inode_number))
  }

  fn walk(
    vfs: &Vfs,
    pathname: &str,
    pattern: Option<&Regex>,
    visited: &mut BTreeSet<(String, u64)>,
    out: &mut dyn Write,
  ) -> Result<()> {
    let mut subdirs = Vec::new();
    for_each_child(vfs, pathname, |name, _| {
      let child = join_path(pathname, name);
      if pattern.map_or(true, |pattern| matches!(pattern.is_match(name), Ok(true))) {
        writeln!(out, "{child}")?;
      }
      // Stat through the mount table: a mount point resolves to the mounted root
      let stat = vfs.stat(&child)?;
      if stat.file_type == FileType::Dir {
        subdirs.push((child, stat.inode_number));
      }
      Ok(())
    })?;

    for (child, inode_number) in subdirs {
      // Images are trees; a directory seen twice means a corrupt image
      if !visited.insert(directory_key(vfs, &child, inode_number)?) {
        log::warn!("find: {child}: directory inode {inode_number} already visited, skipping");
        continue;
      }
      walk(vfs, &child, pattern, visited, out)?;
    }
    Ok(())
  }

  match BinArgs::try_parse_from(args.iter()) {
    Err(message) => {
      let _ = writeln!(out, "find: invalid arguments: {message}");
      EXIT_FAILURE
    },
    Ok(BinArgs { name, pathname }) => {
      let pattern = match name.as_deref().map(Regex::new).transpose() {
        Ok(pattern) => pattern,
        Err(error) => {
          let _ = writeln!(out, "find: invalid pattern: {error}");
          return EXIT_FAILURE;
        },
      };

      let result = vfs.lookup_path(&pathname).and_then(|start| {
        let mut visited = BTreeSet::from([directory_key(vfs, &pathname, start.number)?]);
        walk(vfs, &pathname, pattern.as_ref(), &mut visited, out)
      });
      finish("find", &pathname, result, out)
    },
  }
}

pub fn sha256sum(args: Args, vfs: &mut Vfs, out: &mut dyn Write) -> ExitCode {
  #[derive(Debug, Parser)]
  struct BinArgs {
    #[clap(required = true)]
    pathnames: Vec<String>,
  }

  match BinArgs::try_parse_from(args.iter()) {
    Err(message) => {
      let _ = writeln!(out, "sha256sum: invalid arguments: {message}");
      EXIT_FAILURE
    },
    Ok(BinArgs { pathnames }) => {
      for pathname in pathnames {
        let result = (|| -> Result<()> {
          let mut hasher = Sha256::new();
          let mut offset = 0;
          loop {
            let chunk = vfs.read_file(&pathname, offset, READ_CHUNK)?;
            if chunk.is_empty() {
              break;
            }
            offset += chunk.len() as u64;
            hasher.update(&chunk);
          }
          writeln!(out, "{}  {pathname}", hex::encode(hasher.finalize()))?;
          Ok(())
        })();
        match finish("sha256sum", &pathname, result, out) {
          EXIT_SUCCESS => (),
          code => return code,
        }
      }
      EXIT_SUCCESS
    },
  }
}

pub fn xxd(args: Args, vfs: &mut Vfs, out: &mut dyn Write) -> ExitCode {
  #[derive(Debug, Parser)]
  struct BinArgs {
    /// Start at this byte offset
    #[clap(short, long, default_value_t = 0)]
    seek: u64,

    /// Stop after this many bytes
    #[clap(short, long, default_value_t = 256)]
    len: u64,

    pathname: String,
  }

  match BinArgs::try_parse_from(args.iter()) {
    Err(message) => {
      let _ = writeln!(out, "xxd: invalid arguments: {message}");
      EXIT_FAILURE
    },
    Ok(BinArgs { seek, len, pathname }) => {
      let result = vfs.read_file(&pathname, seek, len).and_then(|bytes| {
        for (line_number, line) in bytes.chunks(16).enumerate() {
          let words = line.chunks(2).map(hex::encode).join(" ");
          let ascii = line
            .iter()
            .map(|&byte| if byte.is_ascii_graphic() || byte == b' ' { byte as char } else { '.' })
            .collect::<String>();
          writeln!(out, "{:08x}: {words:<39}  {ascii}", seek + line_number as u64 * 16)?;
        }
        Ok(())
      });
      finish("xxd", &pathname, result, out)
    },
  }
}

// Mount table stuff

pub fn mounts(args: Args, vfs: &mut Vfs, out: &mut dyn Write) -> ExitCode {
  #[derive(Debug, Parser)]
  struct BinArgs {}

  match BinArgs::try_parse_from(args.iter()) {
    Err(message) => {
      let _ = writeln!(out, "mounts: invalid arguments: {message}");
      EXIT_FAILURE
    },
    Ok(BinArgs {}) => {
      for (mount_point, mounted) in &vfs.mount_points {
        let _ = writeln!(
          out,
          "{} on {mount_point} type {} (ro) id={} since {}",
          mounted.source,
          mounted.driver.name(),
          mounted.id,
          mounted.mounted_at.format("%Y-%m-%d %H:%M:%S UTC"),
        );
      }
      EXIT_SUCCESS
    },
  }
}

pub fn umount(args: Args, vfs: &mut Vfs, out: &mut dyn Write) -> ExitCode {
  #[derive(Debug, Parser)]
  struct BinArgs {
    target: String,
  }

  match BinArgs::try_parse_from(args.iter()) {
    Err(message) => {
      let _ = writeln!(out, "umount: invalid arguments: {message}");
      EXIT_FAILURE
    },
    Ok(BinArgs { target }) => match vfs.umount(&target) {
      Ok(mounted) => {
        mounted.release();
        EXIT_SUCCESS
      },
      Err(Error::NotFound(_)) => {
        let _ = writeln!(out, "umount: {target}: not mounted");
        EXIT_FAILURE
      },
      Err(error) => finish("umount", &target, Err(error), out),
    },
  }
}


// vim:ts=2 sw=2
