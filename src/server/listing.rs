//! Directory listings
// (c) 2025 Ross Younger

use std::{fmt::Write as _, path::Path};

use walkdir::WalkDir;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// Abbreviates a file size for a listing: whole MB above 1 MiB, whole KB above 1 KiB, else bytes.
pub(crate) fn format_size(size: u64) -> String {
    if size > MIB {
        format!("{}MB", size / MIB)
    } else if size > KIB {
        format!("{}KB", size / KIB)
    } else {
        size.to_string()
    }
}

/// Produces the listing text for a directory, entries sorted by name.
///
/// This does blocking I/O; callers on the reactor should use `spawn_blocking`.
pub(crate) fn list_directory(path: &Path) -> std::io::Result<String> {
    let meta = std::fs::metadata(path)?;
    if !meta.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "not a directory",
        ));
    }
    let mut out = String::from("Directory Contents:\n");
    for entry in WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                let name = e
                    .path()
                    .and_then(Path::file_name)
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let reason = e
                    .io_error()
                    .map_or_else(|| e.to_string(), ToString::to_string);
                let _ = writeln!(out, "\t{name} [{reason}]");
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy();
        let ft = entry.file_type();
        if ft.is_dir() {
            let _ = writeln!(out, "\t{name}/");
        } else if ft.is_file() {
            match entry.metadata() {
                Ok(m) => {
                    let _ = writeln!(out, "{}\t{name}", format_size(m.len()));
                }
                Err(e) => {
                    let _ = writeln!(out, "\t{name} [{e}]");
                }
            }
        } else {
            let _ = writeln!(out, "\t{name} [other]");
        }
    }
    Ok(out)
}
