//! Filesystem permission probes behind the `checkDeletePermissions` and
//! `checkMovePermissions` actions. Every probe yields a per-item result
//! code; the batch as a whole always succeeds.

use std::path::Path;

use serde::Serialize;

/// Inputs to one delete probe.
#[derive(Debug, Clone, Default)]
pub struct DeleteProbe {
    /// Whether the item was found in the current batch.
    pub item_found: bool,
    /// Whether the caller may see the item at all.
    pub visible: bool,
    /// Whether the caller may mutate the item.
    pub may_edit: bool,
    /// Whether the owning client's API deletes payload files itself.
    pub client_deletes_files: bool,
    /// App-local payload path, when known.
    pub local_path: Option<String>,
}

/// Inputs to one move probe.
#[derive(Debug, Clone, Default)]
pub struct MoveProbe {
    /// Whether the item was found in the current batch.
    pub item_found: bool,
    /// App-local source path, when known.
    pub source_path: Option<String>,
    /// Resolved destination path, when the category yields one.
    pub dest_path: Option<String>,
}

/// Result codes shared with the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum ProbeOutcome {
    Ok,
    Managed,
    NotVisible,
    NoPermission,
    NotFound,
    NoPath,
    Error,
    SamePath,
    DestError,
    SourceError,
    NoDestPath,
}

impl ProbeOutcome {
    const fn code(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Managed => "managed",
            Self::NotVisible => "not_visible",
            Self::NoPermission => "no_permission",
            Self::NotFound => "not_found",
            Self::NoPath => "no_path",
            Self::Error => "error",
            Self::SamePath => "same_path",
            Self::DestError => "dest_error",
            Self::SourceError => "source_error",
            Self::NoDestPath => "no_dest_path",
        }
    }
}

/// Whether a path's parent directory accepts writes (creation/removal).
#[must_use]
pub fn path_is_writable(path: &Path) -> bool {
    let target = if path.is_dir() {
        path
    } else {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => return false,
        }
    };
    let marker = target.join(".peerdeck-probe");
    match std::fs::File::create(&marker) {
        Ok(_) => {
            let _ = std::fs::remove_file(&marker);
            true
        }
        Err(_) => false,
    }
}

/// Evaluate one delete probe into its result code:
/// `ok | managed | not_visible | no_permission | not_found | no_path | error`.
#[must_use]
pub fn delete_probe_code(probe: &DeleteProbe) -> &'static str {
    let outcome = if !probe.item_found {
        ProbeOutcome::NotFound
    } else if !probe.visible {
        ProbeOutcome::NotVisible
    } else if !probe.may_edit {
        ProbeOutcome::NoPermission
    } else if probe.client_deletes_files {
        // The client removes the payload through its own API.
        ProbeOutcome::Managed
    } else {
        match probe.local_path.as_deref() {
            None => ProbeOutcome::NoPath,
            Some(path) => {
                let path = Path::new(path);
                if !path.exists() {
                    ProbeOutcome::Error
                } else if path_is_writable(path) {
                    ProbeOutcome::Ok
                } else {
                    ProbeOutcome::NoPermission
                }
            }
        }
    };
    outcome.code()
}

/// Evaluate one move probe into its result code:
/// `ok | same_path | dest_error | source_error | no_dest_path | no_path |
/// not_found`.
#[must_use]
pub fn move_probe_code(probe: &MoveProbe) -> &'static str {
    let outcome = if !probe.item_found {
        ProbeOutcome::NotFound
    } else {
        match (probe.source_path.as_deref(), probe.dest_path.as_deref()) {
            (None, _) => ProbeOutcome::NoPath,
            (_, None) => ProbeOutcome::NoDestPath,
            (Some(source), Some(dest)) => {
                let source_dir = Path::new(source);
                let dest_dir = Path::new(dest);
                if source_dir == dest_dir
                    || source_dir.parent().is_some_and(|parent| parent == dest_dir)
                {
                    ProbeOutcome::SamePath
                } else if !source_dir.exists() || !path_is_writable(source_dir) {
                    ProbeOutcome::SourceError
                } else if !dest_dir.exists() || !path_is_writable(dest_dir) {
                    ProbeOutcome::DestError
                } else {
                    ProbeOutcome::Ok
                }
            }
        }
    };
    outcome.code()
}
