//! Snapshot archive writer.
//!
//! Walks the source tree and writes every regular file into a single zip
//! archive, rooted at `<tree_id>/` with forward-slash separators. The host's
//! lock marker file is never archived: it would interfere with lock detection
//! if the archive were ever restored. Output names are timestamped and
//! disambiguated so an existing file is never overwritten.

use crate::error::Result;
use crate::snapshot::SnapshotDescriptor;
use chrono::{Local, TimeZone};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Create one zip snapshot of `source_root` inside `output_dir`.
///
/// `now_ms` (epoch milliseconds) determines the timestamp in the file name.
/// Fails on any I/O error during the walk or write; the partially written
/// file is left behind and its name is never reused by a later run.
pub fn create_snapshot(
    source_root: &Path,
    tree_id: &str,
    output_dir: &Path,
    lock_marker: &str,
    now_ms: i64,
) -> Result<SnapshotDescriptor> {
    ensure_output_dir(output_dir)?;

    let base = format!("{}_{}", tree_id, timestamp_name(now_ms));
    let (path, file) = create_available_file(output_dir, &base)?;
    debug!(archive = %path.display(), "Writing snapshot");

    let mut zip = ZipWriter::new(BufWriter::new(file));
    let entry_options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    if let Err(e) = write_entries(&mut zip, source_root, tree_id, lock_marker, entry_options) {
        // Best-effort close so the partial file is at least well-formed on
        // disk; the walk error is the one that matters.
        if let Err(close_err) = zip.finish() {
            error!(archive = %path.display(), error = %close_err, "Failed to close archive after write error");
        }
        return Err(e);
    }

    let mut inner = zip.finish()?;
    inner.flush()?;
    drop(inner);

    Ok(SnapshotDescriptor::from_path(&path)?)
}

/// Create the output directory if needed, tolerating an already-existing
/// directory reached through a symlink.
fn ensure_output_dir(dir: &Path) -> io::Result<()> {
    if dir.exists() {
        let real = dir.canonicalize()?;
        std::fs::create_dir_all(real)
    } else {
        std::fs::create_dir_all(dir)
    }
}

/// Timestamp portion of the archive name, local time.
fn timestamp_name(now_ms: i64) -> String {
    let stamp = Local
        .timestamp_millis_opt(now_ms)
        .earliest()
        .unwrap_or_else(Local::now);
    stamp.format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Open `<base>.zip`, or `<base>.<n>.zip` for the first free `n`, with
/// `create_new` so two concurrent or same-second runs can never clobber
/// each other's archive.
fn create_available_file(dir: &Path, base: &str) -> io::Result<(PathBuf, File)> {
    let mut counter = 0u32;
    loop {
        let name = if counter == 0 {
            format!("{base}.zip")
        } else {
            format!("{base}.{counter}.zip")
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => counter += 1,
            Err(e) => return Err(e),
        }
    }
}

fn write_entries<W: Write + io::Seek>(
    zip: &mut ZipWriter<W>,
    source_root: &Path,
    tree_id: &str,
    lock_marker: &str,
    entry_options: SimpleFileOptions,
) -> Result<()> {
    for entry in WalkDir::new(source_root) {
        let entry = entry.map_err(io::Error::from)?;

        // One entry per regular file; no directory-only entries
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy() == lock_marker {
            continue;
        }

        let relative = entry.path().strip_prefix(source_root).unwrap_or(entry.path());
        zip.start_file(entry_name(tree_id, relative), entry_options)?;
        let mut reader = File::open(entry.path())?;
        io::copy(&mut reader, zip)?;
    }

    Ok(())
}

/// `<tree_id>/<relative path>` with forward slashes on every platform.
fn entry_name(tree_id: &str, relative: &Path) -> String {
    let mut name = String::from(tree_id);
    for component in relative.components() {
        name.push('/');
        name.push_str(&component.as_os_str().to_string_lossy());
    }
    name
}
