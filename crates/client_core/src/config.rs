use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::mutations::{MembershipReconcile, QuestionReconcile};

pub const SETTINGS_FILE: &str = "dashboard.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub server_url: String,
    pub request_timeout_secs: u64,
    pub question_reconcile: QuestionReconcile,
    pub membership_reconcile: MembershipReconcile,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".into(),
            request_timeout_secs: 10,
            question_reconcile: QuestionReconcile::Refresh,
            membership_reconcile: MembershipReconcile::Refetch,
        }
    }
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn validated_server_url(&self) -> Result<Url> {
        let url = Url::parse(&self.server_url)
            .with_context(|| format!("invalid server url '{}'", self.server_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("server url must start with http:// or https://");
        }
        Ok(url)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    request_timeout_secs: Option<u64>,
    question_reconcile: Option<QuestionReconcile>,
    membership_reconcile: Option<MembershipReconcile>,
}

pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the settings file, then environment overrides.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.server_url {
                    settings.server_url = v;
                }
                if let Some(v) = file_cfg.request_timeout_secs {
                    settings.request_timeout_secs = v;
                }
                if let Some(v) = file_cfg.question_reconcile {
                    settings.question_reconcile = v;
                }
                if let Some(v) = file_cfg.membership_reconcile {
                    settings.membership_reconcile = v;
                }
            }
            Err(err) => warn!("config: ignoring unreadable {}: {err}", path.display()),
        }
    }

    if let Some(v) = env("DASHBOARD_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = env("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        match v.parse::<u64>() {
            Ok(parsed) => settings.request_timeout_secs = parsed,
            Err(err) => warn!("config: ignoring APP__REQUEST_TIMEOUT_SECS={v}: {err}"),
        }
    }

    if let Some(v) = env("APP__QUESTION_RECONCILE") {
        match v.parse() {
            Ok(parsed) => settings.question_reconcile = parsed,
            Err(err) => warn!("config: {err}"),
        }
    }
    if let Some(v) = env("APP__MEMBERSHIP_RECONCILE") {
        match v.parse() {
            Ok(parsed) => settings.membership_reconcile = parsed,
            Err(err) => warn!("config: {err}"),
        }
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
