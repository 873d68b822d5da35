use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use filetime::FileTime;

/// Writes `(relative path, bytes)` pairs below `root`, creating directories.
pub fn write_class_tree(root: &Path, files: &[(&str, Vec<u8>)]) -> Vec<PathBuf> {
    files
        .iter()
        .map(|(rel, bytes)| {
            let path = root.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("create fixture directory");
            }
            fs::write(&path, bytes).expect("write fixture file");
            path
        })
        .collect()
}

/// Writes a deflated jar at `path` holding the given entries.
pub fn write_jar(path: &Path, entries: &[(&str, Vec<u8>)]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create jar directory");
    }
    let file = fs::File::create(path).expect("create jar");
    let mut zip = zip::ZipWriter::new(file);
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, bytes) in entries {
        zip.start_file(*name, options).expect("start jar entry");
        zip.write_all(bytes).expect("write jar entry");
    }
    zip.finish().expect("finish jar");
}

/// Moves the mtime of `path` forward by `secs` so coarse filesystem clocks
/// still register a change.
pub fn bump_mtime(path: &Path, secs: i64) {
    let meta = fs::metadata(path).expect("stat fixture");
    let mtime = FileTime::from_last_modification_time(&meta);
    let bumped = FileTime::from_unix_time(mtime.unix_seconds() + secs, mtime.nanoseconds());
    filetime::set_file_mtime(path, bumped).expect("set mtime");
}
