//! Published copy of the ensemble database.

use super::{Database, DatabaseUpdater, MiscInfo};

/// Holds the database snapshot that consumers read, separate from the live
/// database the control stream keeps mutating.
#[derive(Debug, Clone, Default)]
pub struct DatabaseManager {
    database: Database,
    misc_info: MiscInfo,
    revision: u64,
}

impl DatabaseManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn misc_info(&self) -> &MiscInfo {
        &self.misc_info
    }

    /// Number of times a changed database was published.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn on_misc_info(&mut self, misc_info: &MiscInfo) {
        self.misc_info = *misc_info;
    }

    /// Commit `updater` into `live` and publish the result if anything
    /// changed. Returns whether a new database was published.
    pub fn on_database_updater(&mut self, live: &mut Database, updater: &mut DatabaseUpdater) -> bool {
        let changes = updater.commit(live);
        if changes == 0 {
            return false;
        }
        self.database = live.clone();
        self.revision += 1;
        tracing::debug!(changes, revision = self.revision, "database updated");
        true
    }

    /// Forget everything published so far.
    pub fn reset_all(&mut self) {
        self.database.clear();
        self.misc_info = MiscInfo::default();
    }
}
