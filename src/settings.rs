//! Flat settings object exchanged with the web UI, mapped onto [`Configuration`].
//!
//! Browsers send a mix of JSON booleans, numbers and their string forms, so
//! every field of [`SettingsUpdate`] accepts both.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{Configuration, SortOrder, clock};
use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsView {
    pub show_time: bool,
    pub show_date: bool,
    pub show_temperature: bool,
    pub show_weather_code: bool,
    pub show_filename: bool,
    pub show_caption: bool,
    pub delay_seconds: u64,
    pub display_off_time: String,
    pub display_on_time: String,
    pub location_city_suburb: String,
    pub display_correction_horizontal: f32,
    pub display_correction_vertical: f32,
    pub ui_text_alpha: u8,
    pub weather_update_seconds: u64,
    pub upload_directory: String,
    pub images_directory: String,
    pub shutdown_on_display_off: bool,
    pub shutdown_countdown_seconds: u64,
    pub sort_order: String,
    pub sort_reverse: bool,
}

impl From<&Configuration> for SettingsView {
    fn from(cfg: &Configuration) -> Self {
        Self {
            show_time: cfg.overlay.show_time,
            show_date: cfg.overlay.show_date,
            show_temperature: cfg.overlay.show_temperature,
            show_weather_code: cfg.overlay.show_weather_code,
            show_filename: cfg.overlay.show_filename,
            show_caption: cfg.overlay.show_caption,
            delay_seconds: cfg.delay_seconds,
            display_off_time: clock::format(&cfg.display.off_time),
            display_on_time: clock::format(&cfg.display.on_time),
            location_city_suburb: cfg.weather.location.clone(),
            display_correction_horizontal: cfg.display.correction_horizontal,
            display_correction_vertical: cfg.display.correction_vertical,
            ui_text_alpha: cfg.overlay.text_alpha,
            weather_update_seconds: cfg.weather.update_interval.as_secs(),
            upload_directory: cfg
                .upload_directory
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            images_directory: cfg.images_directory.display().to_string(),
            shutdown_on_display_off: cfg.display.shutdown_on_display_off,
            shutdown_countdown_seconds: cfg.display.shutdown_countdown_seconds,
            sort_order: cfg.sort_order.as_str().to_string(),
            sort_reverse: cfg.sort_reverse,
        }
    }
}

/// Partial update; absent fields are left alone and unknown keys ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default, deserialize_with = "flex::flag")]
    pub show_time: Option<bool>,
    #[serde(default, deserialize_with = "flex::flag")]
    pub show_date: Option<bool>,
    #[serde(default, deserialize_with = "flex::flag")]
    pub show_temperature: Option<bool>,
    #[serde(default, deserialize_with = "flex::flag")]
    pub show_weather_code: Option<bool>,
    #[serde(default, deserialize_with = "flex::flag")]
    pub show_filename: Option<bool>,
    #[serde(default, deserialize_with = "flex::flag")]
    pub show_caption: Option<bool>,
    #[serde(default, deserialize_with = "flex::number")]
    pub delay_seconds: Option<u64>,
    #[serde(default)]
    pub display_off_time: Option<String>,
    #[serde(default)]
    pub display_on_time: Option<String>,
    #[serde(default)]
    pub location_city_suburb: Option<String>,
    #[serde(default, deserialize_with = "flex::number")]
    pub display_correction_horizontal: Option<f32>,
    #[serde(default, deserialize_with = "flex::number")]
    pub display_correction_vertical: Option<f32>,
    #[serde(default, deserialize_with = "flex::number")]
    pub ui_text_alpha: Option<u8>,
    #[serde(default, deserialize_with = "flex::number")]
    pub weather_update_seconds: Option<u64>,
    #[serde(default)]
    pub upload_directory: Option<String>,
    #[serde(default)]
    pub images_directory: Option<String>,
    #[serde(default, deserialize_with = "flex::flag")]
    pub shutdown_on_display_off: Option<bool>,
    #[serde(default, deserialize_with = "flex::number")]
    pub shutdown_countdown_seconds: Option<u64>,
    #[serde(default)]
    pub sort_order: Option<String>,
    #[serde(default, deserialize_with = "flex::flag")]
    pub sort_reverse: Option<bool>,
    #[serde(default, deserialize_with = "flex::flag")]
    pub save_to_config: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingChange {
    pub key: &'static str,
    pub old: String,
    pub new: String,
}

impl SettingChange {
    /// Changes that invalidate the discovered item set.
    pub fn affects_library(&self) -> bool {
        matches!(
            self.key,
            "images_directory" | "upload_directory" | "sort_order" | "sort_reverse"
        )
    }

    pub fn affects_weather(&self) -> bool {
        matches!(self.key, "location_city_suburb" | "weather_update_seconds")
    }
}

fn record<T: PartialEq>(
    changes: &mut Vec<SettingChange>,
    key: &'static str,
    slot: &mut T,
    value: T,
    show: impl Fn(&T) -> String,
) {
    if *slot != value {
        changes.push(SettingChange {
            key,
            old: show(slot),
            new: show(&value),
        });
        *slot = value;
    }
}

fn plain<T: ToString>(value: &T) -> String {
    value.to_string()
}

/// Apply `update` to `cfg`, returning what actually changed. The caller is
/// expected to run [`Configuration::validated`] on the result.
pub fn apply(cfg: &mut Configuration, update: &SettingsUpdate) -> Result<Vec<SettingChange>, Error> {
    let mut changes = Vec::new();
    let c = &mut changes;

    let toggles = [
        ("show_time", update.show_time, &mut cfg.overlay.show_time),
        ("show_date", update.show_date, &mut cfg.overlay.show_date),
        ("show_temperature", update.show_temperature, &mut cfg.overlay.show_temperature),
        ("show_weather_code", update.show_weather_code, &mut cfg.overlay.show_weather_code),
        ("show_filename", update.show_filename, &mut cfg.overlay.show_filename),
        ("show_caption", update.show_caption, &mut cfg.overlay.show_caption),
        (
            "shutdown_on_display_off",
            update.shutdown_on_display_off,
            &mut cfg.display.shutdown_on_display_off,
        ),
        ("sort_reverse", update.sort_reverse, &mut cfg.sort_reverse),
    ];
    for (key, value, slot) in toggles {
        if let Some(value) = value {
            record(c, key, slot, value, plain);
        }
    }

    if let Some(v) = update.delay_seconds {
        record(c, "delay_seconds", &mut cfg.delay_seconds, v, plain);
    }
    if let Some(v) = update.shutdown_countdown_seconds {
        record(
            c,
            "shutdown_countdown_seconds",
            &mut cfg.display.shutdown_countdown_seconds,
            v,
            plain,
        );
    }
    if let Some(v) = update.ui_text_alpha {
        record(c, "ui_text_alpha", &mut cfg.overlay.text_alpha, v, plain);
    }
    if let Some(v) = update.display_correction_horizontal {
        record(
            c,
            "display_correction_horizontal",
            &mut cfg.display.correction_horizontal,
            v,
            plain,
        );
    }
    if let Some(v) = update.display_correction_vertical {
        record(
            c,
            "display_correction_vertical",
            &mut cfg.display.correction_vertical,
            v,
            plain,
        );
    }
    if let Some(v) = update.weather_update_seconds {
        record(
            c,
            "weather_update_seconds",
            &mut cfg.weather.update_interval,
            Duration::from_secs(v),
            |d| d.as_secs().to_string(),
        );
    }
    for (key, raw, slot) in [
        ("display_off_time", &update.display_off_time, &mut cfg.display.off_time),
        ("display_on_time", &update.display_on_time, &mut cfg.display.on_time),
    ] {
        if let Some(raw) = raw {
            let time = clock::parse(raw).ok_or_else(|| {
                Error::InvalidSettings(format!("{key} must be HH:MM, got {raw:?}"))
            })?;
            record(c, key, slot, time, clock::format);
        }
    }
    if let Some(location) = &update.location_city_suburb {
        let location = location.trim().to_string();
        if location != cfg.weather.location {
            // a new place name supersedes explicit coordinates
            cfg.weather.latitude = None;
            cfg.weather.longitude = None;
        }
        record(c, "location_city_suburb", &mut cfg.weather.location, location, plain);
    }
    if let Some(raw) = &update.sort_order {
        let order = SortOrder::parse(raw)
            .ok_or_else(|| Error::InvalidSettings(format!("unknown sort_order {raw:?}")))?;
        record(c, "sort_order", &mut cfg.sort_order, order, |o| o.as_str().to_string());
    }
    if let Some(raw) = &update.images_directory {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::BadDir("images_directory must not be empty".into()));
        }
        let dir = PathBuf::from(raw);
        let expanded = crate::config::expand_home(&dir);
        if !expanded.is_dir() {
            return Err(Error::BadDir(expanded.display().to_string()));
        }
        record(c, "images_directory", &mut cfg.images_directory, dir, |p| {
            p.display().to_string()
        });
    }
    if let Some(raw) = &update.upload_directory {
        let raw = raw.trim();
        let dir = (!raw.is_empty()).then(|| PathBuf::from(raw));
        record(c, "upload_directory", &mut cfg.upload_directory, dir, |p| {
            p.as_ref().map(|p| p.display().to_string()).unwrap_or_default()
        });
    }
    Ok(changes)
}

mod flex {
    use std::fmt::Display;
    use std::str::FromStr;

    use serde::de::{self, Deserializer};
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw<T> {
        Value(T),
        Text(String),
    }

    pub fn flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Raw<bool>>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Value(b)) => Ok(Some(b)),
            Some(Raw::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(Some(true)),
                "false" | "0" | "no" | "off" | "" => Ok(Some(false)),
                _ => Err(de::Error::invalid_value(
                    de::Unexpected::Str(&s),
                    &"a boolean",
                )),
            },
        }
    }

    pub fn number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + FromStr,
        T::Err: Display,
    {
        match Option::<Raw<T>>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Value(v)) => Ok(Some(v)),
            Some(Raw::Text(s)) => s
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|err| de::Error::custom(format!("invalid number {s:?}: {err}"))),
        }
    }
}
