//! Path-safety helpers for `file` model sources.
//!
//! A caller-supplied relative path must resolve inside one of the
//! configured permitted roots, so `..` escapes and absolute paths outside
//! those roots are rejected before any filesystem access happens.

use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Result};

/// Join `name` onto whichever root in `permitted` it resolves under,
/// rejecting `name`s that climb out via `..` or an absolute path that
/// escapes every root.
pub fn build_path(permitted: &[PathBuf], name: &str) -> Result<PathBuf> {
    let requested = Path::new(name);

    if requested
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(anyhow!("path `{name}` is not permitted (contains `..`)"));
    }

    for root in permitted {
        let candidate = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            root.join(requested)
        };

        if check_path_permitted(root, &candidate) {
            return Ok(candidate);
        }
    }

    Err(anyhow!(
        "path `{name}` is not permitted (no configured root contains it)"
    ))
}

/// Whether `candidate`, once its components are normalized, still lives
/// under `root`.
fn check_path_permitted(root: &Path, candidate: &Path) -> bool {
    let normalized: PathBuf = candidate
        .components()
        .fold(PathBuf::new(), |mut acc, c| {
            match c {
                Component::ParentDir => {
                    acc.pop();
                }
                Component::CurDir => {}
                other => acc.push(other.as_os_str()),
            }
            acc
        });

    normalized.starts_with(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_plain_relative_name_under_the_root() {
        let root = PathBuf::from("/srv/models");
        let resolved = build_path(&[root.clone()], "resnet.tflite").unwrap();
        assert_eq!(resolved, root.join("resnet.tflite"));
    }

    #[test]
    fn rejects_parent_dir_escape() {
        let root = PathBuf::from("/srv/models");
        let err = build_path(&[root], "../../etc/passwd");
        assert!(err.is_err());
    }

    #[test]
    fn rejects_a_name_with_no_matching_root() {
        let root = PathBuf::from("/srv/models");
        let err = build_path(&[root], "/etc/passwd");
        assert!(err.is_err());
    }
}
