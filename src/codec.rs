//! Zip codec backend.
//!
//! This module is the only place that talks to the `zip` crate. It exposes
//! three operations over a backing archive file: listing entries, appending
//! sources, and filtered extraction. All data moves through fixed-size
//! chunks so progress can be reported and cancellation observed between
//! chunks; a canceled or failed file extraction removes its partial output.

use std::fs;
use std::io::{self, BufReader, Read, Write};
use std::time::SystemTime;

use filetime::FileTime;
use log::{debug, warn};
use zip::read::ZipArchive;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::entry::{is_directory_path, ArchiveEntry, EntrySet};
use crate::node::{Node, NodeType};
use crate::path::NodePath;
use crate::progress::ProgressTracker;
use crate::timestamp;
use crate::{Error, Result, READ_BUFFER_SIZE};

/// Progress callback: overall fraction plus the entry being processed.
/// Returning `false` cancels the operation.
pub(crate) type ProgressFn<'a> = dyn FnMut(f64, &str) -> bool + 'a;

/// One source scheduled for appending: a resolved node plus its name inside
/// the archive.
#[derive(Debug)]
pub(crate) struct AddItem {
    pub node: Node,
    pub entry_name: String,
}

/// Lists the entries of the archive at `path`.
///
/// Returns the total uncompressed size alongside the entry set.
pub(crate) fn list_entries(path: &NodePath) -> Result<(u64, EntrySet)> {
    let file = fs::File::open(path.full_path()).map_err(|e| Error::from_fs(e, path.full_path()))?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;

    let mut entries = EntrySet::new();
    let mut total = 0u64;
    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        let is_directory = entry.is_dir();
        if !is_directory {
            total += entry.size();
        }
        let modified = entry.last_modified().and_then(|dt| {
            timestamp::from_date_time(
                dt.year(),
                dt.month(),
                dt.day(),
                dt.hour(),
                dt.minute(),
                dt.second(),
            )
        });
        entries.insert(ArchiveEntry {
            name: entry.name().to_string(),
            size: entry.size(),
            compressed_size: entry.compressed_size(),
            modified,
            is_directory,
        });
    }

    debug!("listed {} entries in {}", entries.len(), path);
    Ok((total, entries))
}

/// Appends `items` to the archive at `path`, creating the container if the
/// backing file is still empty.
pub(crate) fn append(path: &NodePath, items: &[AddItem], progress: &mut ProgressFn<'_>) -> Result<()> {
    let file = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path.full_path())
        .map_err(|e| Error::from_fs(e, path.full_path()))?;

    // A zero-byte backing file has no central directory yet; it gets a fresh
    // container instead of an append.
    let mut writer = if file.metadata()?.len() == 0 {
        ZipWriter::new(file)
    } else {
        ZipWriter::new_append(file)?
    };

    let total_bytes: u64 = items
        .iter()
        .filter(|item| item.node.node_type() == NodeType::File)
        .map(|item| item.node.size().unwrap_or(0))
        .sum();
    let mut tracker = ProgressTracker::new(items.len() as u64, total_bytes);

    for item in items {
        let options = file_options(&item.node);
        match item.node.node_type() {
            NodeType::Directory => {
                tracker.start_entry(0);
                writer.add_directory(item.entry_name.as_str(), options)?;
            }
            NodeType::File => {
                tracker.start_entry(item.node.size().unwrap_or(0));
                writer.start_file(item.entry_name.as_str(), options)?;
                let source = fs::File::open(item.node.path().full_path())
                    .map_err(|e| Error::from_fs(e, item.node.path().full_path()))?;
                copy_chunked(source, &mut writer, &item.entry_name, &mut tracker, progress)?;
            }
        }
        tracker.finish_entry();
        if !progress(tracker.overall_progress(), &item.entry_name) {
            return Err(Error::Canceled);
        }
    }

    writer.finish()?;
    Ok(())
}

/// Extracts entries of the archive at `path` into `destination`.
///
/// `filter` selects what to extract: `None` extracts everything, a file name
/// extracts exactly that entry, and a directory name (trailing separator)
/// extracts every entry sharing the prefix. `strip_base` is removed from the
/// front of stored names before they are joined below the destination.
///
/// Returns the number of entries extracted.
pub(crate) fn extract(
    path: &NodePath,
    destination: &NodePath,
    filter: Option<&str>,
    strip_base: &str,
    overwrite: bool,
    progress: &mut ProgressFn<'_>,
) -> Result<u64> {
    let file = fs::File::open(path.full_path()).map_err(|e| Error::from_fs(e, path.full_path()))?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;

    // First pass: totals for the progress denominator.
    let mut matched = 0u64;
    let mut total_bytes = 0u64;
    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        if !name_matches(entry.name(), filter) {
            continue;
        }
        matched += 1;
        if !entry.is_dir() {
            total_bytes += entry.size();
        }
    }
    let mut tracker = ProgressTracker::new(matched, total_bytes);

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        if !name_matches(&name, filter) {
            continue;
        }

        let output = output_path(destination, &name, strip_base);
        let modified = entry.last_modified().and_then(|dt| {
            timestamp::from_date_time(
                dt.year(),
                dt.month(),
                dt.day(),
                dt.hour(),
                dt.minute(),
                dt.second(),
            )
        });

        if entry.is_dir() || is_directory_path(&name) {
            tracker.start_entry(0);
            extract_directory_entry(&output, overwrite)?;
        } else {
            tracker.start_entry(entry.size());
            extract_file_entry(&mut entry, &output, overwrite, &name, &mut tracker, progress)?;
        }

        if let Some(time) = modified {
            restore_mtime(&output, time);
        }

        tracker.finish_entry();
        if !progress(tracker.overall_progress(), &name) {
            return Err(Error::Canceled);
        }
    }

    Ok(matched)
}

/// Builds the per-entry write options, carrying the source's mtime when the
/// DOS range can represent it.
fn file_options(node: &Node) -> SimpleFileOptions {
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let fields = node
        .modified()
        .ok()
        .and_then(timestamp::to_date_time)
        .and_then(|(y, mo, d, h, mi, s)| zip::DateTime::from_date_and_time(y, mo, d, h, mi, s).ok());
    match fields {
        Some(dt) => options.last_modified_time(dt),
        None => options,
    }
}

/// Applies the filter rule: exact match for file names, prefix match for
/// directory names.
fn name_matches(name: &str, filter: Option<&str>) -> bool {
    match filter {
        None => true,
        Some(wanted) if is_directory_path(wanted) => name.starts_with(wanted),
        Some(wanted) => name == wanted,
    }
}

/// Joins a stored entry name below the destination, minus the strip base.
fn output_path(destination: &NodePath, name: &str, strip_base: &str) -> NodePath {
    let relative = if strip_base.is_empty() {
        name
    } else if let Some(stripped) = name.strip_prefix(strip_base) {
        stripped
    } else {
        warn!("strip base {:?} is not a prefix of entry {:?}", strip_base, name);
        name
    };
    destination.append(relative)
}

fn extract_directory_entry(output: &NodePath, overwrite: bool) -> Result<()> {
    match fs::symlink_metadata(output.full_path()) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => {
            // A file sits where the directory should go.
            if !overwrite {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("file with the same name exists at {}", output),
                )));
            }
            fs::remove_file(output.full_path())?;
            fs::create_dir_all(output.full_path()).map_err(Error::Io)
        }
        Err(_) => fs::create_dir_all(output.full_path()).map_err(Error::Io),
    }
}

fn extract_file_entry(
    entry: &mut impl Read,
    output: &NodePath,
    overwrite: bool,
    name: &str,
    tracker: &mut ProgressTracker,
    progress: &mut ProgressFn<'_>,
) -> Result<()> {
    match fs::symlink_metadata(output.full_path()) {
        Ok(meta) if meta.is_dir() => {
            return Err(Error::Io(io::Error::other(format!(
                "output path {} is a directory",
                output
            ))));
        }
        Ok(_) if !overwrite => {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("file already exists at {}", output),
            )));
        }
        _ => {}
    }

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent.full_path())?;
    }

    let out_file = fs::File::create(output.full_path())?;
    let result = copy_chunked(entry, out_file, name, tracker, progress);
    if result.is_err() {
        // Partial output must not survive a failed or canceled extraction.
        if let Err(e) = fs::remove_file(output.full_path()) {
            warn!("could not remove partial output {}: {}", output, e);
        }
    }
    result
}

/// Copies `reader` into `writer` in [`READ_BUFFER_SIZE`] chunks, advancing
/// the tracker and invoking the progress callback after each chunk.
fn copy_chunked(
    mut reader: impl Read,
    mut writer: impl Write,
    name: &str,
    tracker: &mut ProgressTracker,
    progress: &mut ProgressFn<'_>,
) -> Result<()> {
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        writer.write_all(&buffer[..read])?;
        tracker.advance(read as u64);
        if !progress(tracker.overall_progress(), name) {
            return Err(Error::Canceled);
        }
    }
    writer.flush()?;
    Ok(())
}

fn restore_mtime(output: &NodePath, time: SystemTime) {
    let mtime = FileTime::from_system_time(time);
    if let Err(e) = filetime::set_file_mtime(output.full_path(), mtime) {
        warn!("could not set mtime on {}: {}", output, e);
    }
}
