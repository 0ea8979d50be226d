use crate::fs::error::{Error, Result};

/// Applies `f` until the value stops changing.
pub fn fixedpoint<T: PartialEq + Clone>(f: impl Fn(T) -> T, initial: T) -> T {
  let mut current = initial;
  loop {
    let next = f(current.clone());
    if next == current {
      return current;
    }
    current = next;
  }
}

/// Splits an absolute path into its components, resolving `.` and `..`
/// lexically (`..` at the root stays at the root).
pub fn normalize_path(pathname: &str) -> Result<Vec<String>> {
  // Guard for empty or relative `pathname`
  match pathname.chars().next() {
    None => return Err(Error::InvalidPath("zero-length path".to_owned())),
    Some(first) if first != '/' => {
      return Err(Error::InvalidPath(format!("{pathname}: path must start with '/'")))
    },
    _ => (),
  }

  // Replace all adjacent slashes
  let pathname = fixedpoint(|pathname: String| pathname.replace("//", "/"), pathname.to_owned());

  let mut components: Vec<String> = Vec::new();
  for piece in pathname.split('/') {
    match piece {
      "" | "." => (),
      ".." => {
        components.pop();
      },
      name => components.push(name.to_owned()),
    }
  }

  Ok(components)
}


// vim:ts=2 sw=2
