//! The closed capability vocabulary and the action → capability table.
//!
//! Admins implicitly hold every capability; the table below is only
//! consulted for non-admin users. `edit_all_downloads` implies
//! `view_all_downloads`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Closed set of grantable capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Run interactive searches.
    Search,
    /// Add downloads (links, magnets, torrent files, search results).
    AddDownloads,
    /// Remove downloads.
    RemoveDownloads,
    /// Pause, resume, and stop transfers.
    PauseResume,
    /// Assign categories to items.
    AssignCategories,
    /// Queue move operations.
    MoveFiles,
    /// Create, edit, and delete categories.
    ManageCategories,
    /// Read download history.
    ViewHistory,
    /// Clear download history.
    ClearHistory,
    /// See shared files.
    ViewShared,
    /// See active uploads.
    ViewUploads,
    /// See statistics trees and metrics.
    ViewStatistics,
    /// Read client logs.
    ViewLogs,
    /// See and act on server lists.
    ViewServers,
    /// See every user's downloads.
    ViewAllDownloads,
    /// Mutate every user's downloads (implies `view_all_downloads`).
    EditAllDownloads,
}

impl Capability {
    /// Stable label stored in the database and used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::AddDownloads => "add_downloads",
            Self::RemoveDownloads => "remove_downloads",
            Self::PauseResume => "pause_resume",
            Self::AssignCategories => "assign_categories",
            Self::MoveFiles => "move_files",
            Self::ManageCategories => "manage_categories",
            Self::ViewHistory => "view_history",
            Self::ClearHistory => "clear_history",
            Self::ViewShared => "view_shared",
            Self::ViewUploads => "view_uploads",
            Self::ViewStatistics => "view_statistics",
            Self::ViewLogs => "view_logs",
            Self::ViewServers => "view_servers",
            Self::ViewAllDownloads => "view_all_downloads",
            Self::EditAllDownloads => "edit_all_downloads",
        }
    }

    /// Parse a stored label; unknown labels are ignored by callers.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "search" => Some(Self::Search),
            "add_downloads" => Some(Self::AddDownloads),
            "remove_downloads" => Some(Self::RemoveDownloads),
            "pause_resume" => Some(Self::PauseResume),
            "assign_categories" => Some(Self::AssignCategories),
            "move_files" => Some(Self::MoveFiles),
            "manage_categories" => Some(Self::ManageCategories),
            "view_history" => Some(Self::ViewHistory),
            "clear_history" => Some(Self::ClearHistory),
            "view_shared" => Some(Self::ViewShared),
            "view_uploads" => Some(Self::ViewUploads),
            "view_statistics" => Some(Self::ViewStatistics),
            "view_logs" => Some(Self::ViewLogs),
            "view_servers" => Some(Self::ViewServers),
            "view_all_downloads" => Some(Self::ViewAllDownloads),
            "edit_all_downloads" => Some(Self::EditAllDownloads),
            _ => None,
        }
    }
}

/// Capabilities required before dispatching a WebSocket action. Actions not
/// listed here require none.
#[must_use]
pub fn required_capabilities(action: &str) -> &'static [Capability] {
    match action {
        "search" | "searchMore" | "stopSearch" => &[Capability::Search],
        "addEd2kLinks" | "addMagnetLinks" | "addTorrentFile" | "batchDownloadSearchResults" => {
            &[Capability::AddDownloads]
        }
        "batchDelete" | "checkDeletePermissions" => &[Capability::RemoveDownloads],
        "batchPause" | "batchResume" | "batchStop" => &[Capability::PauseResume],
        "batchSetFileCategory" => &[Capability::AssignCategories],
        "checkMovePermissions" => &[Capability::MoveFiles],
        "createCategory" | "updateCategory" | "deleteCategory" | "renameCategory" => {
            &[Capability::ManageCategories]
        }
        "getHistory" => &[Capability::ViewHistory],
        "clearHistory" => &[Capability::ClearHistory],
        "refreshSharedFiles" => &[Capability::ViewShared],
        "getServersList" | "serverDoAction" | "getServerInfo" => &[Capability::ViewServers],
        "getStatsTree" => &[Capability::ViewStatistics],
        "getLog" | "getAppLog" => &[Capability::ViewLogs],
        _ => &[],
    }
}

/// The authenticated principal attached to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthedUser {
    /// User row id; `None` only in auth-disabled mode.
    pub user_id: Option<i64>,
    /// Username shown in logs and the UI.
    pub username: String,
    /// Whether the principal is an administrator.
    pub is_admin: bool,
    /// Granted capabilities (non-admins only; ignored for admins).
    pub capabilities: HashSet<Capability>,
}

impl AuthedUser {
    /// The implicit principal used when authentication is disabled.
    #[must_use]
    pub fn auth_disabled() -> Self {
        Self {
            user_id: None,
            username: "anonymous".to_string(),
            is_admin: true,
            capabilities: HashSet::new(),
        }
    }

    /// Whether the principal holds one capability, honouring the admin
    /// override and the `edit_all_downloads ⇒ view_all_downloads` rule.
    #[must_use]
    pub fn has_capability(&self, capability: Capability) -> bool {
        if self.is_admin {
            return true;
        }
        if self.capabilities.contains(&capability) {
            return true;
        }
        capability == Capability::ViewAllDownloads
            && self.capabilities.contains(&Capability::EditAllDownloads)
    }

    /// Whether the principal may invoke an action.
    #[must_use]
    pub fn can_invoke(&self, action: &str) -> bool {
        required_capabilities(action)
            .iter()
            .all(|capability| self.has_capability(*capability))
    }

    /// Whether the principal may see items it does not own.
    #[must_use]
    pub fn sees_all_items(&self) -> bool {
        self.has_capability(Capability::ViewAllDownloads)
    }

    /// Whether the principal may mutate items it does not own.
    #[must_use]
    pub fn edits_all_items(&self) -> bool {
        self.is_admin || self.capabilities.contains(&Capability::EditAllDownloads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with(capabilities: &[Capability]) -> AuthedUser {
        AuthedUser {
            user_id: Some(1),
            username: "alice".to_string(),
            is_admin: false,
            capabilities: capabilities.iter().copied().collect(),
        }
    }

    #[test]
    fn labels_round_trip() {
        for capability in [
            Capability::Search,
            Capability::AddDownloads,
            Capability::RemoveDownloads,
            Capability::PauseResume,
            Capability::AssignCategories,
            Capability::MoveFiles,
            Capability::ManageCategories,
            Capability::ViewHistory,
            Capability::ClearHistory,
            Capability::ViewShared,
            Capability::ViewUploads,
            Capability::ViewStatistics,
            Capability::ViewLogs,
            Capability::ViewServers,
            Capability::ViewAllDownloads,
            Capability::EditAllDownloads,
        ] {
            assert_eq!(Capability::parse(capability.as_str()), Some(capability));
        }
        assert!(Capability::parse("sudo").is_none());
    }

    #[test]
    fn admin_holds_everything() {
        let admin = AuthedUser {
            user_id: Some(1),
            username: "root".to_string(),
            is_admin: true,
            capabilities: HashSet::new(),
        };
        assert!(admin.has_capability(Capability::ClearHistory));
        assert!(admin.can_invoke("batchDelete"));
        assert!(admin.sees_all_items());
        assert!(admin.edits_all_items());
    }

    #[test]
    fn edit_all_implies_view_all_only() {
        let editor = user_with(&[Capability::EditAllDownloads]);
        assert!(editor.has_capability(Capability::ViewAllDownloads));
        assert!(editor.edits_all_items());
        assert!(!editor.has_capability(Capability::Search));

        let viewer = user_with(&[Capability::ViewAllDownloads]);
        assert!(!viewer.edits_all_items());
    }

    #[test]
    fn search_only_user_cannot_batch_pause() {
        let user = user_with(&[Capability::Search]);
        assert!(user.can_invoke("search"));
        assert!(!user.can_invoke("batchPause"));
    }

    #[test]
    fn unlisted_actions_require_nothing() {
        let user = user_with(&[]);
        assert!(user.can_invoke("getCategories"));
        assert!(user.can_invoke("ping"));
    }
}
