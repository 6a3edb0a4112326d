//! Naming and recovery rules for writer-managed log files.
//!
//! Files are named `appCode_version_x-y.log` where `x` is the run index
//! (bumped at session start) and `y` is the file index within the run
//! (bumped on rotation). Both indices are recovered by scanning the
//! application's log directory, so no counter has to survive restarts.

use std::path::Path;

/// Replace characters that are unsafe in filenames; empty versions become
/// "unknown"
pub fn sanitize_version(version: &str) -> String {
    if version.is_empty() {
        return "unknown".to_string();
    }
    version
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

/// Build the file name for a run/file index pair
pub fn file_name(app_code: &str, version: &str, run_index: u32, file_index: u32) -> String {
    format!("{}_{}_{}-{}.log", app_code, version, run_index, file_index)
}

/// Parse the `x-y` part out of a file name with the given `appCode_version_`
/// prefix. Malformed names yield `None` and are skipped by the scans.
fn parse_indices(name: &str, prefix: &str) -> Option<(u32, u32)> {
    let rest = name.strip_prefix(prefix)?.strip_suffix(".log")?;
    let (run, file) = rest.split_once('-')?;
    Some((run.parse().ok()?, file.parse().ok()?))
}

/// Highest run index found on disk for `appCode` + `version`, or 0 if no
/// matching files exist. Scan failures are treated as "no prior files".
pub fn max_run_index(dir: &Path, app_code: &str, version: &str) -> u32 {
    let prefix = format!("{}_{}_", app_code, version);
    let mut max_run = 0;

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some((run, _)) = parse_indices(name, &prefix) {
            max_run = max_run.max(run);
        }
    }

    max_run
}

/// Determine the `(runIndex, fileIndex)` to append to after a version change.
///
/// Takes the highest run index on disk and, within it, the highest file
/// index. If that file is already at or over the size ceiling, the next file
/// index is used; otherwise writing resumes in it. With no matching files the
/// indices start at `(1, 1)`.
pub fn next_run_and_file_index(
    dir: &Path,
    app_code: &str,
    version: &str,
    max_file_size: u64,
) -> (u32, u32) {
    let prefix = format!("{}_{}_", app_code, version);
    let mut max_run = 0;
    let mut max_file = 0;

    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some((run, file)) = parse_indices(name, &prefix) else {
                continue;
            };

            if run > max_run {
                max_run = run;
                max_file = file;
            } else if run == max_run && file > max_file {
                max_file = file;
            }
        }
    }

    if max_run == 0 {
        return (1, 1);
    }

    // Resume the newest file unless it is already full
    let last = dir.join(file_name(app_code, version, max_run, max_file));
    match std::fs::metadata(&last) {
        Ok(meta) if meta.len() >= max_file_size => (max_run, max_file + 1),
        _ => (max_run, max_file),
    }
}
