use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::navigation::DiscoveryOrder;

/// Sub-directory of the images directory used for uploads when no explicit
/// upload directory is configured.
pub const DEFAULT_UPLOAD_SUBDIR: &str = "uploaded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    #[default]
    Random,
    Name,
    Date,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Name => "name",
            Self::Date => "date",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "random" => Some(Self::Random),
            "name" => Some(Self::Name),
            "date" => Some(Self::Date),
            _ => None,
        }
    }

    /// Random libraries are shuffled as they are discovered; sorted ones keep scanner order.
    pub fn discovery_order(&self) -> DiscoveryOrder {
        match self {
            Self::Random => DiscoveryOrder::Shuffle,
            Self::Name | Self::Date => DiscoveryOrder::Preserve,
        }
    }
}

/// Which text elements are drawn over the photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct OverlayOptions {
    pub show_time: bool,
    pub show_date: bool,
    pub show_temperature: bool,
    pub show_weather_code: bool,
    pub show_filename: bool,
    pub show_caption: bool,
    /// Opacity of all overlay text (0 transparent, 255 opaque).
    pub text_alpha: u8,
}

impl Default for OverlayOptions {
    fn default() -> Self {
        Self {
            show_time: true,
            show_date: true,
            show_temperature: true,
            show_weather_code: true,
            show_filename: false,
            show_caption: true,
            text_alpha: 192,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct DisplayOptions {
    /// Screen size in pixels.
    pub width: u32,
    pub height: u32,
    /// Stretch factors compensating for panels with non-square pixels.
    pub correction_horizontal: f32,
    pub correction_vertical: f32,
    #[serde(with = "clock")]
    pub on_time: NaiveTime,
    #[serde(with = "clock")]
    pub off_time: NaiveTime,
    /// Zone the on/off times are expressed in; the system zone when unset.
    pub timezone: Option<Tz>,
    pub sleep_command: Option<String>,
    pub wake_command: Option<String>,
    pub shutdown_on_display_off: bool,
    pub shutdown_countdown_seconds: u64,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            correction_horizontal: 1.0,
            correction_vertical: 1.0,
            on_time: NaiveTime::from_hms_opt(5, 0, 0).unwrap_or_default(),
            off_time: NaiveTime::from_hms_opt(23, 0, 0).unwrap_or_default(),
            timezone: None,
            sleep_command: None,
            wake_command: None,
            shutdown_on_display_off: false,
            shutdown_countdown_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct NavigationOptions {
    /// How often the render loop wakes up when idle.
    #[serde(with = "humantime_serde")]
    pub idle_tick: Duration,
    /// Unreadable items skipped in a row before the placeholder is shown.
    pub max_missing_retries: usize,
    /// Optional deterministic seed for shuffling.
    pub shuffle_seed: Option<u64>,
}

impl Default for NavigationOptions {
    fn default() -> Self {
        Self {
            idle_tick: Duration::from_millis(50),
            max_missing_retries: 10,
            shuffle_seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct WeatherOptions {
    pub enabled: bool,
    /// Free-form place name, geocoded when no coordinates are given.
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(with = "humantime_serde")]
    pub update_interval: Duration,
}

impl Default for WeatherOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            location: String::new(),
            latitude: None,
            longitude: None,
            update_interval: Duration::from_secs(15 * 60),
        }
    }
}

impl WeatherOptions {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct WebOptions {
    pub enabled: bool,
    pub bind_address: IpAddr,
    pub port: u16,
    /// Reject requests from peers outside loopback and private ranges.
    pub local_only: bool,
    pub max_upload_bytes: usize,
}

impl Default for WebOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5000,
            local_only: true,
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

impl WebOptions {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PowerOptions {
    pub shutdown_command: String,
    pub restart_command: String,
}

impl Default for PowerOptions {
    fn default() -> Self {
        Self {
            shutdown_command: "sudo shutdown -h now".into(),
            restart_command: "sudo reboot".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TelegramOptions {
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Root directory scanned recursively for images.
    pub images_directory: PathBuf,
    /// Where uploads are stored; `<images-directory>/uploaded` when unset.
    pub upload_directory: Option<PathBuf>,
    /// Accepted file extensions (lowercase, without dot).
    pub extensions: Vec<String>,
    /// Seconds each photo stays on screen.
    pub delay_seconds: u64,
    pub sort_order: SortOrder,
    pub sort_reverse: bool,
    pub overlay: OverlayOptions,
    pub display: DisplayOptions,
    pub navigation: NavigationOptions,
    pub weather: WeatherOptions,
    pub web: WebOptions,
    pub power: PowerOptions,
    pub telegram: Option<TelegramOptions>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            images_directory: PathBuf::new(),
            upload_directory: None,
            extensions: vec!["jpg".into(), "jpeg".into(), "png".into()],
            delay_seconds: 30,
            sort_order: SortOrder::default(),
            sort_reverse: false,
            overlay: OverlayOptions::default(),
            display: DisplayOptions::default(),
            navigation: NavigationOptions::default(),
            weather: WeatherOptions::default(),
            web: WebOptions::default(),
            power: PowerOptions::default(),
            telegram: None,
        }
    }
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Write the configuration back as YAML, replacing `path` atomically.
    pub fn save_yaml_file(&self, path: impl AsRef<Path>) -> Result<(), crate::Error> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self)?;
        let tmp = path.with_extension("yaml.tmp");
        std::fs::write(&tmp, yaml)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.images_directory.as_os_str().is_empty(),
            "images-directory must be set"
        );
        ensure!(
            self.delay_seconds > 0,
            "delay-seconds must be greater than zero"
        );
        ensure!(
            !self.extensions.is_empty(),
            "extensions must list at least one file type"
        );
        ensure!(
            self.extensions
                .iter()
                .all(|e| !e.is_empty() && !e.starts_with('.')),
            "extensions must be given without a leading dot"
        );
        ensure!(
            self.display.width > 0 && self.display.height > 0,
            "display width and height must be greater than zero"
        );
        for (name, factor) in [
            ("correction-horizontal", self.display.correction_horizontal),
            ("correction-vertical", self.display.correction_vertical),
        ] {
            ensure!(
                factor.is_finite() && factor > 0.0 && factor <= 4.0,
                "display {name} must be within (0, 4]"
            );
        }
        ensure!(
            (1..=50).contains(&self.navigation.max_missing_retries),
            "navigation max-missing-retries must be between 1 and 50"
        );
        ensure!(
            self.navigation.idle_tick >= Duration::from_millis(1)
                && self.navigation.idle_tick <= Duration::from_secs(1),
            "navigation idle-tick must be between 1ms and 1s"
        );
        ensure!(
            self.weather.update_interval >= Duration::from_secs(60),
            "weather update-interval must be at least one minute"
        );
        ensure!(
            self.weather.latitude.is_some() == self.weather.longitude.is_some(),
            "weather latitude and longitude must be given together"
        );
        if let Some((lat, lon)) = self.weather.coordinates() {
            ensure!(
                (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon),
                "weather coordinates out of range"
            );
        }
        ensure!(self.web.port > 0, "web port must be non-zero");
        ensure!(
            self.web.max_upload_bytes > 0,
            "web max-upload-bytes must be greater than zero"
        );
        for (label, cmd) in [
            ("power shutdown-command", &self.power.shutdown_command),
            ("power restart-command", &self.power.restart_command),
        ] {
            ensure!(!cmd.trim().is_empty(), "{label} must not be blank");
        }
        for (label, cmd) in [
            ("display sleep-command", &self.display.sleep_command),
            ("display wake-command", &self.display.wake_command),
        ] {
            if let Some(cmd) = cmd {
                ensure!(!cmd.trim().is_empty(), "{label} must not be blank");
            }
        }
        if let Some(telegram) = &self.telegram {
            ensure!(
                !telegram.bot_token.trim().is_empty() && !telegram.chat_id.trim().is_empty(),
                "telegram bot-token and chat-id must not be blank"
            );
        }
        Ok(self)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_seconds)
    }

    pub fn images_dir(&self) -> PathBuf {
        expand_home(&self.images_directory)
    }

    pub fn upload_dir(&self) -> PathBuf {
        match &self.upload_directory {
            Some(dir) if !dir.as_os_str().is_empty() => expand_home(dir),
            _ => self.images_dir().join(DEFAULT_UPLOAD_SUBDIR),
        }
    }
}

/// Expand a leading `~` to the current user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

/// Serde adapter for wall-clock times written as `HH:MM` (seconds optional).
pub mod clock {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn parse(raw: &str) -> Option<NaiveTime> {
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .ok()
    }

    pub fn format(time: &NaiveTime) -> String {
        time.format("%H:%M").to_string()
    }

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(time))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| {
            de::Error::invalid_value(de::Unexpected::Str(&raw), &"a time formatted as HH:MM")
        })
    }
}
