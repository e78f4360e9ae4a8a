//! The copy-verify-delete pass for clients without native moves.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use walkdir::WalkDir;

use crate::error::MoveError;

const COPY_CHUNK: usize = 1024 * 1024;

/// Progress callback payload emitted while bytes move.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveProgress {
    /// Bytes copied so far across all files.
    pub bytes_moved: u64,
    /// Files fully copied so far.
    pub files_moved: u64,
    /// Total files to copy.
    pub files_total: u64,
    /// File currently being copied.
    pub current_file: Option<String>,
}

fn io_error(path: &Path, source: std::io::Error) -> MoveError {
    MoveError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// List the files under `source` (a file or a directory), relative paths
/// paired with sizes.
async fn list_files(source: &Path) -> Result<Vec<(PathBuf, u64)>, MoveError> {
    let source = source.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let metadata = std::fs::metadata(&source).map_err(|err| io_error(&source, err))?;
        if metadata.is_file() {
            return Ok(vec![(PathBuf::new(), metadata.len())]);
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(&source) {
            let entry = entry.map_err(|err| MoveError::Io {
                path: source.display().to_string(),
                source: err.into(),
            })?;
            if entry.file_type().is_file() {
                let relative = entry
                    .path()
                    .strip_prefix(&source)
                    .unwrap_or(entry.path())
                    .to_path_buf();
                let size = entry
                    .metadata()
                    .map_err(|err| MoveError::Io {
                        path: entry.path().display().to_string(),
                        source: err.into(),
                    })?
                    .len();
                files.push((relative, size));
            }
        }
        files.sort();
        Ok(files)
    })
    .await
    .map_err(|err| MoveError::Other(err.into()))?
}

async fn copy_one(
    source: &Path,
    dest: &Path,
    mut on_chunk: impl FnMut(u64),
) -> Result<u64, MoveError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|err| io_error(parent, err))?;
    }
    let mut reader = fs::File::open(source)
        .await
        .map_err(|err| io_error(source, err))?;
    let mut writer = fs::File::create(dest)
        .await
        .map_err(|err| io_error(dest, err))?;
    let mut buffer = vec![0_u8; COPY_CHUNK];
    let mut copied = 0_u64;
    loop {
        let read = reader
            .read(&mut buffer)
            .await
            .map_err(|err| io_error(source, err))?;
        if read == 0 {
            break;
        }
        writer
            .write_all(&buffer[..read])
            .await
            .map_err(|err| io_error(dest, err))?;
        copied += read as u64;
        on_chunk(read as u64);
    }
    writer.flush().await.map_err(|err| io_error(dest, err))?;
    Ok(copied)
}

/// Copy `source` (file or directory) under `dest`, reporting progress after
/// every chunk and file. Returns the total byte count; the source is left
/// in place for the caller to remove after verification.
///
/// # Errors
///
/// Fails on any filesystem error; partial copies are left for the retry to
/// overwrite.
pub async fn copy_with_progress(
    source: &Path,
    dest: &Path,
    mut report: impl FnMut(&MoveProgress) + Send,
) -> Result<u64, MoveError> {
    let files = list_files(source).await?;
    let files_total = files.len() as u64;
    let mut progress = MoveProgress {
        files_total,
        ..MoveProgress::default()
    };

    let mut total = 0_u64;
    for (relative, _size) in &files {
        let (from, to) = if relative.as_os_str().is_empty() {
            (source.to_path_buf(), dest.to_path_buf())
        } else {
            (source.join(relative), dest.join(relative))
        };
        let label = relative
            .to_str()
            .filter(|rel| !rel.is_empty())
            .map_or_else(|| from.display().to_string(), str::to_string);
        progress.current_file = Some(label);
        let copied = copy_one(&from, &to, |chunk| {
            progress.bytes_moved += chunk;
            report(&progress);
        })
        .await?;
        progress.files_moved += 1;
        total += copied;
        report(&progress);
    }
    Ok(total)
}

/// Verify that `dest` holds the same byte count as the copy reported.
///
/// # Errors
///
/// Returns [`MoveError::VerificationFailed`] on mismatch.
pub(crate) async fn verify_copy(dest: &Path, expected: u64) -> Result<(), MoveError> {
    let found = total_size(dest).await?;
    if found == expected {
        Ok(())
    } else {
        Err(MoveError::VerificationFailed {
            path: dest.display().to_string(),
            expected,
            found,
        })
    }
}

/// Total byte size of a file or directory tree.
pub(crate) async fn total_size(path: &Path) -> Result<u64, MoveError> {
    Ok(list_files(path).await?.iter().map(|(_, size)| size).sum())
}

/// Remove the source after a verified copy.
pub(crate) async fn remove_source(source: &Path) -> Result<(), MoveError> {
    let metadata = fs::metadata(source)
        .await
        .map_err(|err| io_error(source, err))?;
    if metadata.is_dir() {
        fs::remove_dir_all(source)
            .await
            .map_err(|err| io_error(source, err))
    } else {
        fs::remove_file(source)
            .await
            .map_err(|err| io_error(source, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn copies_single_file_with_progress() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src/Film.iso");
        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        std::fs::write(&source, vec![7_u8; 3000]).unwrap();
        let dest = dir.path().join("dst/Film.iso");

        let mut reports = Vec::new();
        let copied = copy_with_progress(&source, &dest, |progress| {
            reports.push(progress.clone());
        })
        .await
        .unwrap();

        assert_eq!(copied, 3000);
        assert_eq!(std::fs::read(&dest).unwrap().len(), 3000);
        assert_eq!(reports.last().unwrap().files_moved, 1);
        assert_eq!(reports.last().unwrap().files_total, 1);

        verify_copy(&dest, 3000).await.unwrap();
        assert!(verify_copy(&dest, 2999).await.is_err());

        remove_source(&source).await.unwrap();
        assert!(!source.exists());
    }

    #[tokio::test]
    async fn copies_directory_trees() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src/album");
        std::fs::create_dir_all(source.join("disc2")).unwrap();
        std::fs::write(source.join("track1.flac"), vec![1_u8; 100]).unwrap();
        std::fs::write(source.join("disc2/track2.flac"), vec![2_u8; 200]).unwrap();
        let dest = dir.path().join("dst/album");

        let mut last = MoveProgress::default();
        let copied = copy_with_progress(&source, &dest, |progress| {
            last = progress.clone();
        })
        .await
        .unwrap();

        assert_eq!(copied, 300);
        assert_eq!(last.files_total, 2);
        assert_eq!(last.files_moved, 2);
        assert!(dest.join("disc2/track2.flac").exists());
        assert_eq!(total_size(&dest).await.unwrap(), 300);
    }

    #[tokio::test]
    async fn missing_source_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = copy_with_progress(
            &dir.path().join("nope"),
            &dir.path().join("out"),
            |_| {},
        )
        .await;
        assert!(matches!(result, Err(MoveError::Io { .. })));
    }
}
