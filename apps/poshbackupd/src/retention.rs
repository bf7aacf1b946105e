use std::fs;
use std::path::Path;
use std::time::SystemTime;

use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("failed to list directory '{0}': {1}")]
    ListFailed(String, std::io::Error),
    #[error("failed to delete archive '{0}': {1}")]
    DeleteFailed(String, std::io::Error),
}

#[derive(Debug, Clone)]
struct CandidateArchive {
    path: String,
    modified: SystemTime,
}

/// Enforces a `KeepCount` retention policy against archives in a
/// directory that share a job's base name: list, sort newest-first by
/// modified time, delete everything past the keep count. Grounded on the
/// same group-then-sort-then-trim shape used for local backup rotation,
/// but synchronous and keyed off mtime instead of a parsed filename
/// timestamp, since PoSh-Backup's archive names are not as rigidly
/// structured as a single job-type/vm-name pair.
pub fn apply_local_retention(
    directory: &str,
    base_name_prefix: &str,
    keep_count: u32,
) -> Result<Vec<String>, RetentionError> {
    let mut candidates = Vec::new();

    let entries = fs::read_dir(directory)
        .map_err(|e| RetentionError::ListFailed(directory.to_string(), e))?;

    for entry in entries {
        let entry = entry.map_err(|e| RetentionError::ListFailed(directory.to_string(), e))?;
        let path = entry.path();
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        if !file_name.starts_with(base_name_prefix) {
            continue;
        }
        if !path.is_file() {
            continue;
        }
        let metadata = entry
            .metadata()
            .map_err(|e| RetentionError::ListFailed(directory.to_string(), e))?;
        let modified = metadata
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH);
        candidates.push(CandidateArchive { path: path.to_string_lossy().to_string(), modified });
    }

    candidates.sort_by(|a, b| b.modified.cmp(&a.modified));

    let mut deleted = Vec::new();
    if candidates.len() > keep_count as usize {
        for candidate in &candidates[keep_count as usize..] {
            fs::remove_file(&candidate.path)
                .map_err(|e| RetentionError::DeleteFailed(candidate.path.clone(), e))?;
            info!(path = %candidate.path, "removed archive past retention count");
            deleted.push(candidate.path.clone());
        }
    } else {
        warn!(directory, base_name_prefix, count = candidates.len(), keep_count, "nothing past retention count");
    }

    Ok(deleted)
}

pub fn archive_exists(path: &str) -> bool {
    Path::new(path).is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn keeps_newest_n_and_deletes_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            let path = dir.path().join(format!("Docs_2024-01-0{i}.7z"));
            let mut f = File::create(&path).unwrap();
            writeln!(f, "data").unwrap();
            sleep(Duration::from_millis(5));
        }

        let deleted = apply_local_retention(dir.path().to_str().unwrap(), "Docs_", 2).unwrap();
        assert_eq!(deleted.len(), 3);

        let remaining: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(remaining.len(), 2);
    }

    #[test]
    fn under_keep_count_deletes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("Docs_1.7z")).unwrap();

        let deleted = apply_local_retention(dir.path().to_str().unwrap(), "Docs_", 5).unwrap();
        assert!(deleted.is_empty());
    }

    #[test]
    fn unrelated_files_are_not_touched() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("Other_1.7z")).unwrap();
        File::create(dir.path().join("Docs_1.7z")).unwrap();

        let deleted = apply_local_retention(dir.path().to_str().unwrap(), "Docs_", 0).unwrap();
        assert_eq!(deleted, vec![dir.path().join("Docs_1.7z").to_string_lossy().to_string()]);
        assert!(dir.path().join("Other_1.7z").exists());
    }
}
