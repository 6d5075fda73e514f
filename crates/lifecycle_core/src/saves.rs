//! Save folder resolution for cloud-synced assets.

use std::path::{Path, PathBuf};

use serde::Serialize;
use shared::domain::{AssetDescriptor, AssetSettings, CompatLayer};

const PROTON_USER: &str = "steamuser";
const FALLBACK_USER: &str = "user";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaveSyncState {
    pub auto_sync_enabled: bool,
    pub resolved_save_path: String,
    pub sync_in_flight: bool,
}

impl SaveSyncState {
    /// Resolves the install dir token against `install_path`. Returns whether the path changed.
    pub fn reapply_install_dir(&mut self, token: &str, install_path: Option<&Path>) -> bool {
        let Some(install_path) = install_path else {
            return false;
        };
        let resolved = substitute_install_dir(&self.resolved_save_path, token, install_path);
        if resolved == self.resolved_save_path {
            return false;
        }
        self.resolved_save_path = resolved;
        true
    }
}

/// Windows-style user folders a save template can point into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDirs {
    pub profile: PathBuf,
    pub app_data: PathBuf,
    pub local_app_data: PathBuf,
    pub documents: PathBuf,
    pub saved_games: PathBuf,
}

impl UserDirs {
    /// Folders inside a compatibility-layer prefix.
    pub fn in_compat_layer(layer: &CompatLayer) -> Self {
        let user = if layer.is_proton() {
            PROTON_USER.to_string()
        } else {
            std::env::var("USER").unwrap_or_else(|_| FALLBACK_USER.to_string())
        };
        let profile = layer.prefix.join("drive_c").join("users").join(user);
        Self {
            app_data: profile.join("AppData").join("Roaming"),
            local_app_data: profile.join("AppData").join("Local"),
            documents: profile.join("Documents"),
            saved_games: profile.join("Saved Games"),
            profile,
        }
    }

    /// Folders of the user running this process.
    pub fn host() -> Option<Self> {
        let profile = dirs::home_dir()?;
        Some(Self {
            app_data: dirs::data_dir().unwrap_or_else(|| profile.join("AppData").join("Roaming")),
            local_app_data: dirs::data_local_dir()
                .unwrap_or_else(|| profile.join("AppData").join("Local")),
            documents: dirs::document_dir().unwrap_or_else(|| profile.join("Documents")),
            saved_games: profile.join("Saved Games"),
            profile,
        })
    }

    fn tokens(&self) -> [(&'static str, &Path); 5] {
        [
            ("{AppData}", &self.app_data),
            ("{LocalAppData}", &self.local_app_data),
            ("{UserDir}", &self.documents),
            ("{UserSavedGames}", &self.saved_games),
            ("{UserProfile}", &self.profile),
        ]
    }
}

/// Replaces every occurrence of `token` with `install_path`. Idempotent.
pub fn substitute_install_dir(path: &str, token: &str, install_path: &Path) -> String {
    replace_token(path, token, &install_path.to_string_lossy())
}

/// Expands user-folder tokens of a save template. The install dir token is left in place.
pub fn default_save_folder(template: &str, user_dirs: Option<&UserDirs>) -> String {
    let Some(user_dirs) = user_dirs else {
        return template.to_string();
    };
    let mut folder = template.replace('\\', "/");
    for (token, dir) in user_dirs.tokens() {
        folder = replace_token(&folder, token, &dir.to_string_lossy());
    }
    folder
}

/// Effective save path: the explicit override, else the descriptor's template expanded for the
/// asset's compatibility layer (or the host user), with the install dir resolved when known.
pub fn resolve_save_path(
    descriptor: &AssetDescriptor,
    settings: &AssetSettings,
    install_dir_token: &str,
) -> String {
    let path = match settings.save_path_override.as_deref() {
        Some(path) if !path.trim().is_empty() => path.to_string(),
        _ => {
            let template = descriptor.save_folder.as_deref().unwrap_or_default();
            let user_dirs = match &settings.compat_layer {
                Some(layer) => Some(UserDirs::in_compat_layer(layer)),
                None => UserDirs::host(),
            };
            default_save_folder(template, user_dirs.as_ref())
        }
    };

    match descriptor.install_path.as_deref() {
        Some(install_path) => substitute_install_dir(&path, install_dir_token, install_path),
        None => path,
    }
}

/// ASCII case-insensitive replace; save templates are not consistent about token casing.
fn replace_token(haystack: &str, token: &str, value: &str) -> String {
    if token.is_empty() {
        return haystack.to_string();
    }
    let lower_haystack = haystack.to_ascii_lowercase();
    let lower_token = token.to_ascii_lowercase();

    let mut out = String::with_capacity(haystack.len());
    let mut last = 0;
    for (idx, _) in lower_haystack.match_indices(&lower_token) {
        out.push_str(&haystack[last..idx]);
        out.push_str(value);
        last = idx + token.len();
    }
    out.push_str(&haystack[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "{InstallDir}";

    fn proton() -> CompatLayer {
        CompatLayer {
            name: "Proton 8.0".into(),
            prefix: PathBuf::from("/pfx"),
        }
    }

    #[test]
    fn install_dir_substitution_is_idempotent() {
        let once = substitute_install_dir("{InstallDir}/saves", TOKEN, Path::new("/games/AppX"));
        let twice = substitute_install_dir(&once, TOKEN, Path::new("/games/AppX"));
        assert_eq!(once, "/games/AppX/saves");
        assert_eq!(once, twice);
    }

    #[test]
    fn substitution_ignores_token_case() {
        let resolved = substitute_install_dir("{installdir}/Saved", TOKEN, Path::new("/g"));
        assert_eq!(resolved, "/g/Saved");
    }

    #[test]
    fn proton_prefix_uses_steamuser() {
        let folder = default_save_folder(
            "{AppData}\\Studio\\Saves",
            Some(&UserDirs::in_compat_layer(&proton())),
        );
        assert_eq!(
            folder,
            "/pfx/drive_c/users/steamuser/AppData/Roaming/Studio/Saves"
        );
    }

    #[test]
    fn default_folder_keeps_install_dir_token() {
        let layer = UserDirs::in_compat_layer(&proton());
        assert_eq!(
            default_save_folder("{InstallDir}/Saved", Some(&layer)),
            "{InstallDir}/Saved"
        );
        assert_eq!(
            default_save_folder("{UserSavedGames}/Studio", Some(&layer)),
            "/pfx/drive_c/users/steamuser/Saved Games/Studio"
        );
    }

    #[test]
    fn override_wins_over_template() {
        let descriptor = AssetDescriptor {
            save_folder: Some("{AppData}/x".into()),
            install_path: Some(PathBuf::from("/games/AppX")),
            ..AssetDescriptor::default()
        };
        let settings = AssetSettings {
            save_path_override: Some("{InstallDir}/custom".into()),
            compat_layer: Some(proton()),
            ..AssetSettings::default()
        };
        assert_eq!(
            resolve_save_path(&descriptor, &settings, TOKEN),
            "/games/AppX/custom"
        );
    }

    #[test]
    fn token_survives_until_install_path_is_known() {
        let mut descriptor = AssetDescriptor {
            save_folder: Some("{InstallDir}/Saved".into()),
            ..AssetDescriptor::default()
        };
        let settings = AssetSettings {
            compat_layer: Some(proton()),
            ..AssetSettings::default()
        };

        let mut state = SaveSyncState {
            resolved_save_path: resolve_save_path(&descriptor, &settings, TOKEN),
            ..SaveSyncState::default()
        };
        assert_eq!(state.resolved_save_path, "{InstallDir}/Saved");
        assert!(!state.reapply_install_dir(TOKEN, None));

        descriptor.install_path = Some(PathBuf::from("/games/AppX"));
        assert!(state.reapply_install_dir(TOKEN, descriptor.install_path.as_deref()));
        assert_eq!(state.resolved_save_path, "/games/AppX/Saved");
        assert!(!state.reapply_install_dir(TOKEN, descriptor.install_path.as_deref()));
    }
}
