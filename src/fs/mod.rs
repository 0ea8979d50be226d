//! Read-only mfs filesystem: on-disk records, inode resolution,
//! directory walking and file reads over a `BlockStore`.

pub mod block;
pub mod builder;
pub mod dir;
pub mod error;
pub mod file;
pub mod inode;
pub mod layout;
pub mod superblock;
pub mod vfs;
pub mod volume;

pub use block::{BlockId, BlockStore, FileBlockStore, MemBlockStore};
pub use builder::ImageBuilder;
pub use dir::{list_children, lookup_child, read_dir, DirCursor, DirEntry, DirPage};
pub use error::{Error, Result};
pub use file::{chunks, read, FileChunks, OpenFile};
pub use inode::{resolve_inode, FileMode, FileType, Inode, InodeKind};
pub use superblock::{load_superblock, Geometry};
pub use vfs::{FileStat, Filesystem, MountedFilesystem, Vfs};
pub use volume::{MountFlags, Volume};

// vim:ts=2 sw=2
