//! Remote account configuration.
//!
//! Reads/writes TOML at `~/.config/skylift/remotes.toml`. Each remote
//! holds one OAuth client pair and its current token set; the file is
//! written back whenever a refresh rotates the tokens.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use skylift_graph::{Credential, CredentialError};

/// One configured drive account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub access_token: String,
    pub refresh_token: String,
    /// RFC 3339 expiry of `access_token`.
    pub expires_at: String,
    /// Provider drive identifier; the client addresses the default drive,
    /// so this is informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_id: Option<String>,
    /// Folder all uploads land under; empty for the drive root.
    #[serde(default)]
    pub root_folder: String,
    /// Public site serving the drive content, for share links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<String>,
}

impl RemoteConfig {
    /// Builds the credential this remote authenticates with.
    pub fn credential(&self) -> Result<Credential, CredentialError> {
        Credential::new(
            &self.client_id,
            &self.client_secret,
            &self.access_token,
            &self.refresh_token,
            &self.expires_at,
        )
    }
}

/// On-disk config: a table of remotes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remotes: BTreeMap<String, RemoteConfig>,
    #[serde(skip)]
    loaded_from: PathBuf,
}

impl Config {
    /// Loads configuration from `path` when given, else the per-user
    /// location. A missing file is an empty config.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file_path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };

        let mut config = Config {
            loaded_from: file_path.clone(),
            ..Default::default()
        };
        if file_path.exists() {
            let content = std::fs::read_to_string(&file_path)?;
            match toml::from_str::<Config>(&content) {
                Ok(parsed) => config.remotes = parsed.remotes,
                Err(e) => anyhow::bail!("failed to parse {}: {e}", file_path.display()),
            }
        }
        Ok(config)
    }

    /// Picks a remote by name, or the sole configured one.
    pub fn resolve_remote(&self, name: Option<&str>) -> anyhow::Result<(&str, &RemoteConfig)> {
        match name {
            Some(name) => match self.remotes.get_key_value(name) {
                Some((name, remote)) => Ok((name.as_str(), remote)),
                None => anyhow::bail!(
                    "remote '{name}' not found; configured remotes: {}",
                    self.remote_names().join(", ")
                ),
            },
            None => {
                let mut iter = self.remotes.iter();
                match (iter.next(), iter.next()) {
                    (Some((name, remote)), None) => Ok((name.as_str(), remote)),
                    (None, _) => anyhow::bail!(
                        "no remotes configured; add one to {}",
                        self.loaded_from.display()
                    ),
                    _ => anyhow::bail!(
                        "several remotes configured, pick one: {}",
                        self.remote_names().join(", ")
                    ),
                }
            }
        }
    }

    pub fn remote_names(&self) -> Vec<String> {
        self.remotes.keys().cloned().collect()
    }

    pub fn path(&self) -> &Path {
        &self.loaded_from
    }

    /// Saves configuration to its load location.
    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.loaded_from.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let text = toml::to_string_pretty(self)?;
        std::fs::write(&self.loaded_from, &text)?;
        set_permissions_0600(&self.loaded_from)?;

        tracing::debug!(path = %self.loaded_from.display(), "configuration saved");
        Ok(())
    }

    /// Writes the token set a refresh rotated back to disk.
    pub fn persist_tokens(&mut self, name: &str, credential: &Credential) -> anyhow::Result<()> {
        let Some(remote) = self.remotes.get_mut(name) else {
            anyhow::bail!("remote '{name}' not found");
        };
        remote.access_token = credential.access_token.clone();
        remote.refresh_token = credential.refresh_token.clone();
        remote.expires_at = credential.expires_at.to_rfc3339();
        self.save()
    }
}

fn set_permissions_0600(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

pub fn config_path() -> anyhow::Result<PathBuf> {
    let config_dir = config_base_dir()?;
    Ok(config_dir.join("skylift").join("remotes.toml"))
}

fn config_base_dir() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home).join(".config"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home).join(".config"))
    }
}
