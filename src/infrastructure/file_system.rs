use crate::utils::Result;
use std::fs;
use std::path::{Component, Path, PathBuf};

pub fn file_exists(path: &Path) -> bool {
    path.is_file()
}

pub fn directory_exists(path: &Path) -> bool {
    path.is_dir()
}

pub fn read_file(path: &Path) -> Result<String> {
    Ok(fs::read_to_string(path)?)
}

/// Write `content`, creating parent directories as needed
pub fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, content)?;
    Ok(())
}

/// Lexically normalize a path: drop `.` and fold `..` without touching the disk
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() && !result.has_root() {
                    result.push("..");
                }
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
}

/// Make `path` absolute against the current directory and normalize it
pub fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        normalize(&cwd.join(path))
    }
}

/// Append a suffix to the last component, e.g. `foo` -> `foo.js`
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_operations() {
        let temp_dir = tempdir().unwrap();
        let test_file = temp_dir.path().join("nested/dir/test.txt");

        write_file(&test_file, "Hello, linker!").unwrap();
        assert_eq!(read_file(&test_file).unwrap(), "Hello, linker!");
        assert!(file_exists(&test_file));
        assert!(directory_exists(&temp_dir.path().join("nested")));
        assert!(!file_exists(&temp_dir.path().join("nested")));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/b/./c/../d")), PathBuf::from("/a/b/d"));
        assert_eq!(normalize(Path::new("/a/../../b")), PathBuf::from("/b"));
    }

    #[test]
    fn test_with_suffix_keeps_existing_dots() {
        assert_eq!(with_suffix(Path::new("/x/foo.bar"), ".js"), PathBuf::from("/x/foo.bar.js"));
    }
}
