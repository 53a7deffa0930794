//! Best-effort copy of the image directory that travels with an export file.
//!
//! For `<dir>/<stem>.<ext>` the companion directory is `<dir>/<stem>.assets`.
//! Failures here are reported to the caller for logging only; they never
//! abort the structural merge.

use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Outcome of the asset phase, kept on the import report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetCopyStatus {
    /// No target directory configured.
    Disabled,
    /// The import file has no companion asset directory.
    NotPresent,
    /// Number of files copied.
    Copied(u64),
    /// Copy failed; message is the I/O error text.
    Failed(String),
}

/// Returns the companion asset directory path for an import file.
pub fn asset_dir_for(import_path: &Path) -> Option<PathBuf> {
    let stem = import_path.file_stem()?.to_str()?;
    let parent = import_path.parent().unwrap_or_else(|| Path::new(""));
    Some(parent.join(format!("{stem}.assets")))
}

/// Recursively copies `source` into `target`, overwriting same-named files.
///
/// Symlinks are not followed while walking. A link to a regular file is
/// copied as that file's contents; any other link is skipped.
///
/// Returns the number of files copied.
pub fn copy_dir_recursive(source: &Path, target: &Path) -> io::Result<u64> {
    fs::create_dir_all(target)?;
    let mut copied = 0;
    for entry in WalkDir::new(source).follow_links(false).min_depth(1) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let destination = target.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&destination)?;
            continue;
        }
        if file_type.is_symlink() && !entry.path().is_file() {
            debug!(
                "event=import_assets module=import status=skip reason=non_file_link path={}",
                relative.display()
            );
            continue;
        }
        fs::copy(entry.path(), &destination)?;
        copied += 1;
    }
    Ok(copied)
}

/// Copies the companion asset directory of `import_path` into `target`, if
/// both exist.
pub fn copy_import_assets(import_path: &Path, target: Option<&Path>) -> AssetCopyStatus {
    let Some(target) = target else {
        return AssetCopyStatus::Disabled;
    };
    let Some(source) = asset_dir_for(import_path).filter(|dir| dir.is_dir()) else {
        return AssetCopyStatus::NotPresent;
    };
    match copy_dir_recursive(&source, target) {
        Ok(files) => AssetCopyStatus::Copied(files),
        Err(err) => AssetCopyStatus::Failed(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{asset_dir_for, copy_import_assets, AssetCopyStatus};
    use std::path::{Path, PathBuf};

    #[test]
    fn asset_dir_uses_file_stem() {
        assert_eq!(
            asset_dir_for(Path::new("/exports/notebooks.json")),
            Some(PathBuf::from("/exports/notebooks.assets"))
        );
    }

    #[test]
    fn copies_nested_asset_tree() {
        let dir = tempfile::tempdir().expect("tempdir");
        let import_file = dir.path().join("backup.json");
        std::fs::write(&import_file, "{}").expect("write import file");
        let assets = dir.path().join("backup.assets");
        std::fs::create_dir_all(assets.join("nested")).expect("create assets");
        std::fs::write(assets.join("a.png"), b"a").expect("write a");
        std::fs::write(assets.join("nested").join("b.png"), b"b").expect("write b");

        let target = dir.path().join("images");
        let status = copy_import_assets(&import_file, Some(&target));

        assert_eq!(status, AssetCopyStatus::Copied(2));
        assert!(target.join("nested").join("b.png").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn linked_directory_is_skipped_and_linked_file_is_copied() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outside = dir.path().join("outside");
        std::fs::create_dir_all(&outside).expect("create outside dir");
        std::fs::write(outside.join("c.png"), b"c").expect("write c");

        let import_file = dir.path().join("backup.json");
        let assets = dir.path().join("backup.assets");
        std::fs::create_dir_all(&assets).expect("create assets");
        std::fs::write(assets.join("a.png"), b"a").expect("write a");
        std::os::unix::fs::symlink(&outside, assets.join("linked_dir")).expect("dir link");
        std::os::unix::fs::symlink(outside.join("c.png"), assets.join("linked.png"))
            .expect("file link");

        let target = dir.path().join("images");
        let status = copy_import_assets(&import_file, Some(&target));

        assert_eq!(status, AssetCopyStatus::Copied(2));
        assert!(target.join("a.png").is_file());
        assert_eq!(std::fs::read(target.join("linked.png")).expect("read copy"), b"c");
        assert!(!target.join("linked_dir").exists());
    }

    #[test]
    fn missing_asset_dir_is_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let status = copy_import_assets(&dir.path().join("x.json"), Some(dir.path()));
        assert_eq!(status, AssetCopyStatus::NotPresent);
    }
}
