//! Small filesystem helpers shared by the runners and dataset tooling.

use crate::error::{EvalError, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// True when `path` is a directory with at least one entry.
pub fn is_non_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

pub fn remove_dir_if_exists(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_dir_all(path).map_err(|e| EvalError::io(path, e))?;
    Ok(true)
}

/// Copies `file` into `dir`, keeping its file name.
pub fn copy_into(file: &Path, dir: &Path) -> Result<PathBuf> {
    let name = file
        .file_name()
        .ok_or_else(|| EvalError::MissingFile(file.to_path_buf()))?;
    let target = dir.join(name);
    fs::copy(file, &target).map_err(|e| EvalError::io(file, e))?;
    Ok(target)
}

/// Moves a directory tree, falling back to copy-and-delete across filesystems.
pub fn move_dir(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_dir(from, to)?;
    fs::remove_dir_all(from).map_err(|e| EvalError::io(from, e))
}

fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to).map_err(|e| EvalError::io(to, e))?;
    for entry in fs::read_dir(from).map_err(|e| EvalError::io(from, e))? {
        let entry = entry.map_err(|e| EvalError::io(from, e))?;
        let src = entry.path();
        let dst = to.join(entry.file_name());
        if src.is_dir() {
            copy_dir(&src, &dst)?;
        } else {
            fs::copy(&src, &dst).map_err(|e| EvalError::io(&src, e))?;
        }
    }
    Ok(())
}

/// Writes `value` as JSON indented with four spaces.
pub fn write_json_pretty<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = fs::File::create(path).map_err(|e| EvalError::io(path, e))?;
    let mut writer = std::io::BufWriter::new(file);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut writer, formatter);
    value.serialize(&mut ser)?;
    writer.flush().map_err(|e| EvalError::io(path, e))
}

/// Sorted names of the entries in `dir` accepted by `keep`.
pub fn list_names<F>(dir: &Path, mut keep: F) -> Result<Vec<String>>
where
    F: FnMut(&Path) -> bool,
{
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| EvalError::io(dir, e))? {
        let entry = entry.map_err(|e| EvalError::io(dir, e))?;
        if keep(&entry.path()) {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}
