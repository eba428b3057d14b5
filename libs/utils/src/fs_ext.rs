//! Extensions to `std::fs` used by the agent's data-directory surgery.

use std::{fs, io};

use camino::Utf8Path;

/// Recursively copy `src` to `dst`. `src` may be a single file or a
/// directory tree; file contents are preserved bit-for-bit and directory
/// entries are recreated on the target side. Symbolic links inside the tree
/// are recreated with their original target.
pub fn copy_tree(src: &Utf8Path, dst: &Utf8Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(src)?;

    if meta.is_symlink() {
        let target = fs::read_link(src)?;
        std::os::unix::fs::symlink(target, dst)?;
        return Ok(());
    }

    if meta.is_file() {
        fs::copy(src, dst)?;
        return Ok(());
    }

    fs::create_dir_all(dst)?;
    for entry in src.read_dir_utf8()? {
        let entry = entry?;
        copy_tree(entry.path(), &dst.join(entry.file_name()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn copies_nested_tree() {
        let dir = tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        let src = root.join("src");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("top.conf"), b"top").unwrap();
        fs::write(src.join("sub/nested"), b"nested").unwrap();

        let dst = root.join("dst");
        copy_tree(&src, &dst).unwrap();

        assert_eq!(fs::read(dst.join("top.conf")).unwrap(), b"top");
        assert_eq!(fs::read(dst.join("sub/nested")).unwrap(), b"nested");
    }

    #[test]
    fn copies_single_file() {
        let dir = tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        fs::write(root.join("gp_dbid"), b"2").unwrap();
        copy_tree(&root.join("gp_dbid"), &root.join("copy")).unwrap();
        assert_eq!(fs::read(root.join("copy")).unwrap(), b"2");
    }

    #[test]
    fn missing_source_is_an_error() {
        let dir = tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        let err = copy_tree(&root.join("nope"), &root.join("dst")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
