//! Storage for the saved tunnel profile.

use std::path::{Path, PathBuf};

use tracing::debug;
use tunneler_models::TunnelProfile;

use crate::atomic::{atomic_write_json, read_json_optional};
use crate::error::Result;

/// File name of the profile inside the state directory.
pub const PROFILE_FILE: &str = "profile.json";

/// Loads and saves `profile.json` in a state directory.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    /// Creates a store for `state_dir`. The directory is created on first save.
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            path: state_dir.as_ref().join(PROFILE_FILE),
        }
    }

    /// Path of the profile file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the profile, or the default one if none was saved yet.
    pub fn load(&self) -> Result<TunnelProfile> {
        let profile = read_json_optional(&self.path)?;
        debug!(path = %self.path.display(), found = profile.is_some(), "loaded profile");
        Ok(profile.unwrap_or_default())
    }

    /// Saves the profile.
    pub fn save(&self, profile: &TunnelProfile) -> Result<()> {
        atomic_write_json(&self.path, profile)?;
        debug!(path = %self.path.display(), "saved profile");
        Ok(())
    }

    /// Records a newly chosen monitor port, keeping the rest of the profile.
    pub fn save_monitor_port(&self, port: u16) -> Result<TunnelProfile> {
        let mut profile = self.load()?;
        profile.monitor_port = Some(port);
        self.save(&profile)?;
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn profile() -> TunnelProfile {
        TunnelProfile {
            server_address: "example.org".to_string(),
            username: "alice".to_string(),
            identity_file: Some("~/.ssh/id_ed25519".to_string()),
            auto_connect: true,
            ..TunnelProfile::default()
        }
    }

    #[test]
    fn test_load_missing_gives_default() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::new(dir.path());

        assert_eq!(store.load().unwrap(), TunnelProfile::default());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("state"));

        store.save(&profile()).unwrap();
        assert_eq!(store.load().unwrap(), profile());
        assert!(store.path().ends_with("state/profile.json"));
    }

    #[test]
    fn test_save_monitor_port_keeps_fields() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::new(dir.path());
        store.save(&profile()).unwrap();

        let updated = store.save_monitor_port(23456).unwrap();
        assert_eq!(updated.monitor_port, Some(23456));
        assert_eq!(store.load().unwrap(), updated);
        assert_eq!(updated.username, "alice");
    }

    #[test]
    fn test_profile_file_has_no_password_field() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::new(dir.path());
        store.save(&profile()).unwrap();

        let text = std::fs::read_to_string(store.path()).unwrap();
        assert!(!text.contains("password"));
        assert!(text.contains("\"server_address\": \"example.org\""));
    }
}
