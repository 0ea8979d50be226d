use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure an mfs operation can surface. Nothing is retried and
/// nothing is partially applied: the first error ends the call.
#[derive(Debug, Error)]
pub enum Error {
  /// Superblock magic mismatch, mount aborts
  #[error("bad magic: expected {expected:#x}, found {found:#x}")]
  BadMagic { expected: u64, found: u64 },
  /// Underlying block read failed
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
  /// Block number past the device capacity
  #[error("block {block} out of range (device has {capacity} blocks)")]
  OutOfRange { block: u64, capacity: u64 },
  #[error("not found: {0}")]
  NotFound(String),
  #[error("not a directory: inode {0}")]
  NotADirectory(u64),
  #[error("not a file: inode {0}")]
  NotAFile(u64),
  /// Buffer shorter than the fixed record size
  #[error("truncated {record}: need {expected} bytes, got {actual}")]
  TruncatedRecord { record: &'static str, expected: usize, actual: usize },
  #[error("corrupt image: {0}")]
  Corrupt(String),
  #[error("invalid geometry: {0}")]
  InvalidGeometry(String),
  #[error("invalid directory cursor: {0}")]
  InvalidCursor(String),
  #[error("permission denied: {0}")]
  PermissionDenied(&'static str),
  #[error("name too long: {0} bytes")]
  NameTooLong(usize),
  #[error("invalid name: {0:?}")]
  InvalidName(String),
  #[error("invalid path: {0}")]
  InvalidPath(String),
  #[error("config: {0}")]
  Config(String),
}

impl Error {
  /// Errno name a host VFS would report for this error.
  pub fn errno(&self) -> &'static str {
    match self {
      Error::BadMagic { .. } => "EINVAL",
      Error::Io(_) => "EIO",
      Error::OutOfRange { .. } => "EIO",
      Error::NotFound(_) => "ENOENT",
      Error::NotADirectory(_) => "ENOTDIR",
      Error::NotAFile(_) => "EISDIR",
      Error::TruncatedRecord { .. } => "EIO",
      Error::Corrupt(_) => "EUCLEAN",
      Error::InvalidGeometry(_) => "EINVAL",
      Error::InvalidCursor(_) => "EINVAL",
      Error::PermissionDenied(_) => "EACCES",
      Error::NameTooLong(_) => "ENAMETOOLONG",
      Error::InvalidName(_) => "EINVAL",
      Error::InvalidPath(_) => "EINVAL",
      Error::Config(_) => "EINVAL",
    }
  }
}

impl From<serde_yaml::Error> for Error {
  fn from(error: serde_yaml::Error) -> Self {
    Error::Config(error.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn errno_names_match_host_conventions() {
    assert_eq!(Error::NotFound("x".to_owned()).errno(), "ENOENT");
    assert_eq!(Error::NotADirectory(2).errno(), "ENOTDIR");
    assert_eq!(Error::PermissionDenied("rw").errno(), "EACCES");
    assert_eq!(Error::from(std::io::Error::from(std::io::ErrorKind::Other)).errno(), "EIO");
  }
}

// vim:ts=2 sw=2
