use serde::Serialize;
use std::{
    fs::{self, File, ReadDir},
    path::Path,
};

pub mod error {
    use std::{io, path::PathBuf};

    pub type Result<T> = std::result::Result<T, self::Error>;

    type Msg = &'static str;

    #[derive(Debug, thiserror::Error)]
    pub enum Error {
        #[error("{0} ({1}): {2}")]
        SingleIO(Msg, PathBuf, #[source] io::Error),

        #[error("Cannot serialize to JSON (dest='{0}'): {1}")]
        SerializeToJson(PathBuf, #[source] serde_json::Error),
    }
}
pub use error::{Error, Result};

#[must_use]
pub fn mkdir_all(path: impl AsRef<Path>) -> Result<()> {
    let dir = path.as_ref();
    fs::create_dir_all(dir).map_err(|e| Error::SingleIO("Cannot create dir", dir.to_owned(), e))
}

#[must_use]
pub fn write<P, C>(filepath: P, contents: C) -> Result<()>
where
    P: AsRef<Path>,
    C: AsRef<[u8]>,
{
    fs::write(&filepath, contents)
        .map_err(|e| Error::SingleIO("Cannot write file", filepath.as_ref().to_owned(), e))
}

#[must_use]
pub fn write_with_mkdir<P, C>(filepath: P, contents: C) -> Result<()>
where
    P: AsRef<Path>,
    C: AsRef<[u8]>,
{
    if let Some(dir) = filepath.as_ref().parent() {
        self::mkdir_all(dir)?;
    }
    self::write(filepath, contents)
}

#[must_use]
pub fn read(filepath: impl AsRef<Path>) -> Result<Vec<u8>> {
    fs::read(&filepath)
        .map_err(|e| Error::SingleIO("Cannot read file", filepath.as_ref().to_owned(), e))
}

#[must_use]
pub fn open_file(filepath: impl AsRef<Path>) -> Result<File> {
    File::open(&filepath)
        .map_err(|e| Error::SingleIO("Cannot open file", filepath.as_ref().to_owned(), e))
}

/// Create (or truncate) a file for writing.
#[must_use]
pub fn create_file(filepath: impl AsRef<Path>) -> Result<File> {
    File::create(&filepath)
        .map_err(|e| Error::SingleIO("Cannot create file", filepath.as_ref().to_owned(), e))
}

#[must_use]
pub fn remove_file(filepath: impl AsRef<Path>) -> Result<()> {
    fs::remove_file(&filepath)
        .map_err(|e| Error::SingleIO("Cannot remove file", filepath.as_ref().to_owned(), e))
}

#[must_use]
pub fn write_json_with_mkdir<P, T>(filepath: P, data: &T) -> Result<()>
where
    P: AsRef<Path>,
    T: Serialize,
{
    let s = serde_json::to_string_pretty(data)
        .map_err(|e| Error::SerializeToJson(filepath.as_ref().to_owned(), e))?;
    write_with_mkdir(filepath, &s)
}

#[must_use]
pub fn read_dir(dir: impl AsRef<Path>) -> Result<ReadDir> {
    fs::read_dir(&dir).map_err(|e| Error::SingleIO("Cannot read dir", dir.as_ref().to_owned(), e))
}

/// Remove every entry inside `dir`, keeping `dir` itself.
///
/// The directory is created when missing. An entry that cannot be removed is
/// logged and skipped; only failing to list `dir` is an error.
pub fn clear_dir_contents(dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return self::mkdir_all(dir);
    }
    for entry in self::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Failed to access an entry of {:?}: {}", dir, e);
                continue;
            }
        };
        let path = entry.path();
        // file_type() does not follow symlinks, so a symlinked dir is unlinked, not emptied.
        let res = match entry.file_type() {
            Ok(ft) if ft.is_dir() => fs::remove_dir_all(&path),
            Ok(_) => fs::remove_file(&path),
            Err(e) => Err(e),
        };
        if let Err(e) = res {
            log::warn!("Failed to delete {:?}. Reason: {}", path, e);
        }
    }
    Ok(())
}

/// Total byte size of regular files under `dir`, recursively.
///
/// Symlinks and special files count as zero and are never followed.
pub fn dir_size(dir: impl AsRef<Path>) -> Result<u64> {
    let dir = dir.as_ref();
    let mut total = 0;
    for entry in self::read_dir(dir)? {
        let entry =
            entry.map_err(|e| Error::SingleIO("Cannot access dir entry", dir.to_owned(), e))?;
        let path = entry.path();
        let ft = entry
            .file_type()
            .map_err(|e| Error::SingleIO("Cannot get filetype", path.clone(), e))?;
        if ft.is_file() {
            let meta = entry
                .metadata()
                .map_err(|e| Error::SingleIO("Cannot get metadata", path, e))?;
            total += meta.len();
        } else if ft.is_dir() {
            total += self::dir_size(&path)?;
        }
    }
    Ok(total)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dir_size_should_sum_nested_regular_files() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        write(root.join("a.bin"), vec![0u8; 100]).unwrap();
        write_with_mkdir(root.join("sub/deeper/b.bin"), vec![0u8; 250]).unwrap();
        mkdir_all(root.join("empty")).unwrap();

        assert_eq!(dir_size(root).unwrap(), 350);
    }

    #[test]
    #[cfg(unix)]
    fn dir_size_should_not_follow_symlinks() {
        let tmp = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        write(outside.path().join("huge.bin"), vec![0u8; 4096]).unwrap();
        write(tmp.path().join("small.bin"), vec![0u8; 10]).unwrap();
        std::os::unix::fs::symlink(outside.path(), tmp.path().join("link")).unwrap();

        assert_eq!(dir_size(tmp.path()).unwrap(), 10);
    }

    #[test]
    fn dir_size_of_missing_dir_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let res = dir_size(tmp.path().join("nope"));
        assert!(matches!(res, Err(Error::SingleIO(..))));
    }

    #[test]
    fn clear_dir_contents_should_keep_the_dir_itself() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = tmp.path().join("scratch");
        write_with_mkdir(scratch.join("x.out"), "x").unwrap();
        write_with_mkdir(scratch.join("nested/y.out"), "y").unwrap();

        clear_dir_contents(&scratch).unwrap();

        assert!(scratch.is_dir());
        assert_eq!(read_dir(&scratch).unwrap().count(), 0);
    }

    #[test]
    fn clear_dir_contents_should_create_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = tmp.path().join("not/yet/there");

        clear_dir_contents(&scratch).unwrap();

        assert!(scratch.is_dir());
    }
}
