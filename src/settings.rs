use std::{
    fs,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
};

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::secrets::Sealer;

pub const DEFAULT_FREQUENCY_MINUTES: u32 = 100;

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("frequency must be a whole number of minutes greater than zero, got {0:?}")]
    InvalidFrequency(String),
    #[error("failed to persist settings to {path}: {reason}")]
    Persist { path: String, reason: String },
}

/// Outgoing mail server. Defaults target Gmail with STARTTLS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MailSettings {
    pub host: String,
    pub port: u16,
    pub subject: String,
    pub timeout_secs: u64,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".into(),
            port: 587,
            subject: "Accountability Mail".into(),
            timeout_secs: 30,
        }
    }
}

/// How the next capture delay is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScheduleSettings {
    /// Uniform in `[0, multiplier × frequency)` when true, exactly `frequency` otherwise.
    pub randomized: bool,
    pub multiplier: u32,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            randomized: true,
            multiplier: 2,
        }
    }
}

/// In-memory configuration. The password is held in clear only here; on disk it
/// is sealed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub frequency_minutes: u32,
    pub destination_email: String,
    pub smtp_username: String,
    pub smtp_password: String,
    pub is_active: bool,
    pub thread_id: String,
    pub mail: MailSettings,
    pub schedule: ScheduleSettings,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            frequency_minutes: DEFAULT_FREQUENCY_MINUTES,
            destination_email: String::new(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            is_active: false,
            thread_id: String::new(),
            mail: MailSettings::default(),
            schedule: ScheduleSettings::default(),
        }
    }
}

impl Configuration {
    /// Username, password and destination are all present.
    pub fn is_complete(&self) -> bool {
        !self.smtp_username.trim().is_empty()
            && !self.smtp_password.trim().is_empty()
            && !self.destination_email.trim().is_empty()
    }

    /// Complete and flagged active: startup may go straight to monitoring.
    pub fn can_resume(&self) -> bool {
        self.is_active && self.is_complete()
    }

    fn ensure_thread_id(&mut self) {
        if self.thread_id.trim().is_empty() {
            self.thread_id = new_thread_id();
        }
    }
}

pub fn new_thread_id() -> String {
    format!("<thread-{}@simpleaccountability>", Uuid::new_v4())
}

/// Values proposed by the presentation layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationUpdate {
    pub smtp_username: String,
    /// `None` keeps the stored password.
    pub smtp_password: Option<String>,
    pub destination_email: String,
    /// Raw text from the frequency field.
    pub frequency: String,
}

impl ConfigurationUpdate {
    pub fn parse_frequency(&self) -> Result<u32, ConfigurationError> {
        match self.frequency.trim().parse::<u32>() {
            Ok(minutes) if minutes > 0 => Ok(minutes),
            _ => Err(ConfigurationError::InvalidFrequency(self.frequency.clone())),
        }
    }

    pub fn apply(&self, frequency_minutes: u32, config: &mut Configuration) {
        config.smtp_username = self.smtp_username.trim().to_string();
        config.destination_email = self.destination_email.trim().to_string();
        if let Some(password) = &self.smtp_password {
            config.smtp_password = password.clone();
        }
        config.frequency_minutes = frequency_minutes;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PersistedConfiguration {
    frequency_minutes: u32,
    destination_email: String,
    smtp_username: String,
    smtp_password_encrypted: String,
    is_active: bool,
    thread_id: String,
    mail: MailSettings,
    schedule: ScheduleSettings,
}

impl Default for PersistedConfiguration {
    fn default() -> Self {
        let config = Configuration::default();
        Self {
            frequency_minutes: config.frequency_minutes,
            destination_email: config.destination_email,
            smtp_username: config.smtp_username,
            smtp_password_encrypted: String::new(),
            is_active: config.is_active,
            thread_id: config.thread_id,
            mail: config.mail,
            schedule: config.schedule,
        }
    }
}

/// Single owner of the configuration. Reads hand out clones; writes go through
/// [`SettingsStore::commit`], which persists before returning.
pub struct SettingsStore {
    path: PathBuf,
    sealer: Sealer,
    data: RwLock<Configuration>,
}

impl SettingsStore {
    /// Load from `path`. Missing, unreadable or corrupt files yield defaults.
    pub fn open(path: PathBuf, sealer: Sealer) -> Self {
        let mut config = Self::load(&path, &sealer);
        config.ensure_thread_id();

        Self {
            path,
            sealer,
            data: RwLock::new(config),
        }
    }

    fn load(path: &Path, sealer: &Sealer) -> Configuration {
        if !path.exists() {
            return Configuration::default();
        }

        let persisted = match fs::read_to_string(path)
            .map_err(|err| err.to_string())
            .and_then(|contents| {
                serde_json::from_str::<PersistedConfiguration>(&contents)
                    .map_err(|err| err.to_string())
            }) {
            Ok(persisted) => persisted,
            Err(err) => {
                warn!(
                    "Settings at {} unreadable ({err}); starting from defaults",
                    path.display()
                );
                return Configuration::default();
            }
        };

        let smtp_password = if persisted.smtp_password_encrypted.is_empty() {
            String::new()
        } else {
            sealer
                .open_text(&persisted.smtp_password_encrypted)
                .unwrap_or_else(|err| {
                    warn!("Stored SMTP password could not be decrypted: {err}");
                    String::new()
                })
        };

        Configuration {
            frequency_minutes: if persisted.frequency_minutes > 0 {
                persisted.frequency_minutes
            } else {
                DEFAULT_FREQUENCY_MINUTES
            },
            destination_email: persisted.destination_email,
            smtp_username: persisted.smtp_username,
            smtp_password,
            is_active: persisted.is_active,
            thread_id: persisted.thread_id,
            mail: persisted.mail,
            schedule: ScheduleSettings {
                multiplier: persisted.schedule.multiplier.max(1),
                ..persisted.schedule
            },
        }
    }

    /// Copy of the current configuration.
    pub fn snapshot(&self) -> Configuration {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply `mutate`, persist, and return the committed value. On a write failure
    /// the in-memory value is left unchanged.
    pub fn commit<F>(&self, mutate: F) -> Result<Configuration, ConfigurationError>
    where
        F: FnOnce(&mut Configuration),
    {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        mutate(&mut next);
        next.ensure_thread_id();
        next.schedule.multiplier = next.schedule.multiplier.max(1);

        self.persist(&next)?;
        *guard = next.clone();
        Ok(next)
    }

    pub fn set_active(&self, active: bool) -> Result<Configuration, ConfigurationError> {
        self.commit(|config| config.is_active = active)
    }

    fn persist(&self, config: &Configuration) -> Result<(), ConfigurationError> {
        let persist_err = |reason: String| ConfigurationError::Persist {
            path: self.path.display().to_string(),
            reason,
        };

        let smtp_password_encrypted = if config.smtp_password.is_empty() {
            String::new()
        } else {
            self.sealer
                .seal_text(&config.smtp_password)
                .map_err(|err| persist_err(err.to_string()))?
        };

        let persisted = PersistedConfiguration {
            frequency_minutes: config.frequency_minutes,
            destination_email: config.destination_email.clone(),
            smtp_username: config.smtp_username.clone(),
            smtp_password_encrypted,
            is_active: config.is_active,
            thread_id: config.thread_id.clone(),
            mail: config.mail.clone(),
            schedule: config.schedule,
        };

        let serialized =
            serde_json::to_string_pretty(&persisted).map_err(|err| persist_err(err.to_string()))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| persist_err(err.to_string()))?;
        }
        // Replace atomically so a crash never leaves a truncated file behind.
        let staging = staging_path(&self.path);
        fs::write(&staging, serialized).map_err(|err| persist_err(err.to_string()))?;
        fs::rename(&staging, &self.path).map_err(|err| persist_err(err.to_string()))
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::tests::test_sealer;
    use tempfile::tempdir;

    fn complete(config: &mut Configuration) {
        config.smtp_username = "me@example.com".into();
        config.smtp_password = "app-password".into();
        config.destination_email = "partner@example.com".into();
    }

    #[test]
    fn interrupted_save_keeps_previous_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::open(path.clone(), test_sealer());
        let saved = store.commit(complete).unwrap();

        // A crash mid-save leaves only a partial staging file.
        fs::write(dir.path().join("settings.json.tmp"), b"{\"frequencyMin").unwrap();

        let reloaded = SettingsStore::open(path.clone(), test_sealer()).snapshot();
        assert_eq!(reloaded.thread_id, saved.thread_id);
        assert!(reloaded.is_complete());

        store.set_active(true).unwrap();
        assert!(!dir.path().join("settings.json.tmp").exists());
        assert!(SettingsStore::open(path, test_sealer()).snapshot().is_active);
    }

    #[test]
    fn missing_file_yields_defaults_with_thread_id() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::open(dir.path().join("settings.json"), test_sealer());
        let config = store.snapshot();

        assert_eq!(config.frequency_minutes, DEFAULT_FREQUENCY_MINUTES);
        assert!(!config.is_active);
        assert!(config.thread_id.starts_with("<thread-"));
        assert!(!config.is_complete());
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ this is not json").unwrap();

        let config = SettingsStore::open(path, test_sealer()).snapshot();

        assert_eq!(config.frequency_minutes, DEFAULT_FREQUENCY_MINUTES);
        assert!(!config.is_active);
        assert!(config.destination_email.is_empty());
        assert!(!config.thread_id.is_empty());
    }

    #[test]
    fn commit_persists_and_seals_password() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::open(path.clone(), test_sealer());

        let committed = store
            .commit(|config| {
                complete(config);
                config.is_active = true;
            })
            .unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"smtpPasswordEncrypted\""));
        assert!(raw.contains("\"threadId\""));
        assert!(!raw.contains("app-password"));

        let reloaded = SettingsStore::open(path, test_sealer()).snapshot();
        assert_eq!(reloaded, committed);
        assert!(reloaded.can_resume());
    }

    #[test]
    fn thread_id_survives_reload_and_commits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::open(path.clone(), test_sealer());
        let original = store.snapshot().thread_id;

        store.set_active(true).unwrap();
        store.set_active(false).unwrap();
        let reloaded = SettingsStore::open(path, test_sealer()).snapshot();

        assert_eq!(reloaded.thread_id, original);
    }

    #[test]
    fn partial_file_keeps_present_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "frequencyMinutes": 15, "destinationEmail": "partner@example.com", "schedule": { "multiplier": 0 } }"#,
        )
        .unwrap();

        let config = SettingsStore::open(path, test_sealer()).snapshot();
        assert_eq!(config.frequency_minutes, 15);
        assert_eq!(config.destination_email, "partner@example.com");
        assert_eq!(config.mail, MailSettings::default());
        assert_eq!(config.schedule.multiplier, 1);
        assert!(config.schedule.randomized);
    }

    #[test]
    fn unreadable_password_becomes_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        {
            let store = SettingsStore::open(path.clone(), test_sealer());
            store.commit(complete).unwrap();
        }

        let other = crate::secrets::Sealer::new([9u8; 32]);
        let config = SettingsStore::open(path, other).snapshot();
        assert!(config.smtp_password.is_empty());
        assert_eq!(config.smtp_username, "me@example.com");
    }

    #[test]
    fn frequency_input_is_validated() {
        let mut update = ConfigurationUpdate {
            frequency: " 15 ".into(),
            ..Default::default()
        };
        assert_eq!(update.parse_frequency().unwrap(), 15);

        for bad in ["0", "-3", "ten", ""] {
            update.frequency = bad.into();
            assert!(matches!(
                update.parse_frequency(),
                Err(ConfigurationError::InvalidFrequency(_))
            ));
        }
    }

    #[test]
    fn update_keeps_password_when_not_supplied() {
        let mut config = Configuration::default();
        complete(&mut config);

        let update = ConfigurationUpdate {
            smtp_username: "  new@example.com ".into(),
            smtp_password: None,
            destination_email: "other@example.com".into(),
            frequency: "5".into(),
        };
        update.apply(5, &mut config);

        assert_eq!(config.smtp_username, "new@example.com");
        assert_eq!(config.smtp_password, "app-password");
        assert_eq!(config.frequency_minutes, 5);
    }
}
