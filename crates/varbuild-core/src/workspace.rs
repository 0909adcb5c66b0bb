//! Per-variant working directories
//!
//! Each variant gets `<root>/<run_id>/variant_<id>/`, optionally seeded with
//! a copy of the project. Tree copies run on the blocking pool.

use crate::types::{RunId, VariantId};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directory names never copied from a project
pub const SKIPPED_DIRS: &[&str] = &[".git"];

/// Isolated working directory of one variant
#[must_use]
pub fn variant_dir(root: &Path, run_id: RunId, id: VariantId) -> PathBuf {
    root.join(run_id.to_string()).join(id.dir_name())
}

/// Create `dest` and copy the project into it
///
/// `workspace_root` is skipped when it lies inside the project.
///
/// # Errors
/// Any I/O failure while creating directories or copying files
pub async fn prepare(
    project_dir: Option<&Path>,
    dest: &Path,
    workspace_root: &Path,
) -> io::Result<()> {
    tokio::fs::create_dir_all(dest).await?;
    let Some(project) = project_dir else {
        return Ok(());
    };
    let src = project.to_path_buf();
    let dst = dest.to_path_buf();
    let skip = workspace_root.to_path_buf();
    tokio::task::spawn_blocking(move || copy_tree(&src, &dst, &skip))
        .await
        .map_err(io::Error::other)?
}

/// Remove a variant directory; a missing directory is not an error
///
/// # Errors
/// I/O failure other than `NotFound`
pub async fn remove(dir: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Copy the contents of `src` into `dst`, skipping `.git` and `skip`
///
/// # Errors
/// Any I/O failure, including unreadable directory entries
pub fn copy_tree(src: &Path, dst: &Path, skip: &Path) -> io::Result<()> {
    let src = fs::canonicalize(src)?;
    let skip = fs::canonicalize(skip).unwrap_or_else(|_| skip.to_path_buf());

    let walker = WalkDir::new(&src).into_iter().filter_entry(|entry| {
        let path = entry.path();
        if path == src {
            return true;
        }
        let hidden = entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name));
        !hidden && !path.starts_with(&skip)
    });

    for entry in walker {
        let entry = entry?;
        let Ok(rel) = entry.path().strip_prefix(&src) else {
            continue;
        };
        if rel.as_os_str().is_empty() {
            continue;
        }
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn variant_dir_layout() {
        let run = RunId::new();
        let dir = variant_dir(Path::new("/ws"), run, VariantId(7));
        assert_eq!(dir, PathBuf::from(format!("/ws/{run}/variant_7")));
    }

    #[test]
    fn copy_skips_git_and_workspace() {
        let project = tempdir().unwrap();
        fs::create_dir_all(project.path().join("src")).unwrap();
        fs::create_dir_all(project.path().join(".git")).unwrap();
        fs::create_dir_all(project.path().join("ws/old")).unwrap();
        fs::write(project.path().join("src/main.cpp"), "int main() {}").unwrap();
        fs::write(project.path().join(".git/HEAD"), "ref").unwrap();
        fs::write(project.path().join("ws/old/x"), "stale").unwrap();

        let dest = tempdir().unwrap();
        copy_tree(project.path(), dest.path(), &project.path().join("ws")).unwrap();

        assert!(dest.path().join("src/main.cpp").exists());
        assert!(!dest.path().join(".git").exists());
        assert!(!dest.path().join("ws").exists());
    }

    #[tokio::test]
    async fn prepare_without_project_creates_empty_dir() {
        let root = tempdir().unwrap();
        let dest = root.path().join("a/b");
        prepare(None, &dest, root.path()).await.unwrap();
        assert!(dest.is_dir());
        remove(&dest).await.unwrap();
        assert!(!dest.exists());
        remove(&dest).await.unwrap();
    }
}
