//! GUI settings: defaults, optional `reconstruct.toml`, `APP__*` env
//! overrides, in that precedence order.

use serde::Deserialize;

use shared::domain::{Configuration, Detail, FeatureSensitivity, SampleOrdering};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub detail: Detail,
    pub feature_sensitivity: FeatureSensitivity,
    pub sample_ordering: SampleOrdering,
    pub simulated_step_millis: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            detail: Detail::Full,
            feature_sensitivity: FeatureSensitivity::High,
            sample_ordering: SampleOrdering::Unordered,
            simulated_step_millis: 150,
        }
    }
}

impl Settings {
    pub fn configuration(&self) -> Configuration {
        Configuration {
            feature_sensitivity: self.feature_sensitivity,
            sample_ordering: self.sample_ordering,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    detail: Option<Detail>,
    feature_sensitivity: Option<FeatureSensitivity>,
    sample_ordering: Option<SampleOrdering>,
    simulated_step_millis: Option<u64>,
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = std::fs::read_to_string("reconstruct.toml") {
        match toml::from_str::<SettingsFile>(&raw) {
            Ok(file) => apply_file(&mut settings, file),
            Err(err) => tracing::warn!(%err, "ignoring malformed reconstruct.toml"),
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file(settings: &mut Settings, file: SettingsFile) {
    if let Some(v) = file.detail {
        settings.detail = v;
    }
    if let Some(v) = file.feature_sensitivity {
        settings.feature_sensitivity = v;
    }
    if let Some(v) = file.sample_ordering {
        settings.sample_ordering = v;
    }
    if let Some(v) = file.simulated_step_millis {
        settings.simulated_step_millis = v;
    }
}

fn apply_env(settings: &mut Settings, get: impl Fn(&str) -> Option<String>) {
    if let Some(v) = get("APP__DETAIL").and_then(|v| v.parse().ok()) {
        settings.detail = v;
    }
    if let Some(v) = get("APP__FEATURE_SENSITIVITY").and_then(|v| v.parse().ok()) {
        settings.feature_sensitivity = v;
    }
    if let Some(v) = get("APP__SAMPLE_ORDERING").and_then(|v| v.parse().ok()) {
        settings.sample_ordering = v;
    }
    if let Some(v) = get("APP__SIMULATED_STEP_MILLIS").and_then(|v| v.parse().ok()) {
        settings.simulated_step_millis = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_values_override_defaults() {
        let mut settings = Settings::default();
        let file: SettingsFile =
            toml::from_str("detail = \"medium\"\nsample_ordering = \"sequential\"")
                .expect("parse");
        apply_file(&mut settings, file);
        assert_eq!(settings.detail, Detail::Medium);
        assert_eq!(settings.sample_ordering, SampleOrdering::Sequential);
        assert_eq!(settings.feature_sensitivity, FeatureSensitivity::High);
    }

    #[test]
    fn env_values_override_file_values() {
        let mut settings = Settings::default();
        apply_file(
            &mut settings,
            SettingsFile {
                detail: Some(Detail::Preview),
                ..SettingsFile::default()
            },
        );
        apply_env(&mut settings, |key| match key {
            "APP__DETAIL" => Some("raw".to_string()),
            "APP__SIMULATED_STEP_MILLIS" => Some("25".to_string()),
            _ => None,
        });
        assert_eq!(settings.detail, Detail::Raw);
        assert_eq!(settings.simulated_step_millis, 25);
    }

    #[test]
    fn unparsable_env_values_are_ignored() {
        let mut settings = Settings::default();
        apply_env(&mut settings, |key| match key {
            "APP__FEATURE_SENSITIVITY" => Some("extreme".to_string()),
            _ => None,
        });
        assert_eq!(settings.feature_sensitivity, FeatureSensitivity::High);
    }
}
