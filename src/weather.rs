//! Current-weather lookups against open-meteo, with Nominatim geocoding for
//! free-form place names.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
const GEOCODE_URL: &str = "https://nominatim.openstreetmap.org/search";

/// Human readable text for a WMO weather interpretation code.
pub fn describe(code: u16) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Fog",
        48 => "Rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        56 => "Light freezing drizzle",
        57 => "Dense freezing drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        66 => "Light freezing rain",
        67 => "Heavy freezing rain",
        71 => "Slight snow fall",
        73 => "Moderate snow fall",
        75 => "Heavy snow fall",
        77 => "Snow grains",
        80 => "Slight rain showers",
        81 => "Moderate rain showers",
        82 => "Violent rain showers",
        85 => "Slight snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with slight hail",
        99 => "Thunderstorm with heavy hail",
        _ => "Unknown",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherReport {
    pub temperature_c: f64,
    pub wind_kmh: f64,
    pub code: u16,
    pub description: String,
    pub fetched_at: DateTime<Utc>,
}

impl WeatherReport {
    pub fn temperature_label(&self) -> String {
        format!("{}°C", self.temperature_c)
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current_weather: CurrentWeather,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    temperature: f64,
    windspeed: f64,
    weathercode: u16,
}

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

/// Parse an open-meteo forecast body requested with `current_weather=true`.
pub fn parse_forecast(body: &str, fetched_at: DateTime<Utc>) -> Result<WeatherReport> {
    let response: ForecastResponse =
        serde_json::from_str(body).context("unexpected open-meteo response")?;
    let current = response.current_weather;
    Ok(WeatherReport {
        temperature_c: current.temperature,
        wind_kmh: current.windspeed,
        code: current.weathercode,
        description: describe(current.weathercode).to_string(),
        fetched_at,
    })
}

/// Parse a Nominatim search body; `None` when nothing matched.
pub fn parse_geocode(body: &str) -> Result<Option<Coordinates>> {
    let places: Vec<Place> =
        serde_json::from_str(body).context("unexpected nominatim response")?;
    let Some(place) = places.into_iter().next() else {
        return Ok(None);
    };
    let latitude = place.lat.parse().context("invalid latitude in geocode result")?;
    let longitude = place.lon.parse().context("invalid longitude in geocode result")?;
    Ok(Some(Coordinates {
        latitude,
        longitude,
    }))
}

#[derive(Debug, Clone)]
pub struct WeatherClient {
    http: reqwest::Client,
}

impl WeatherClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("pi-gallery/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self { http })
    }

    pub async fn geocode(&self, place: &str) -> Result<Option<Coordinates>> {
        if place.trim().is_empty() {
            bail!("no location configured");
        }
        let body = self
            .http
            .get(GEOCODE_URL)
            .query(&[("q", place), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .context("failed to query nominatim")?
            .error_for_status()
            .context("nominatim returned an error")?
            .text()
            .await
            .context("failed to read nominatim response")?;
        parse_geocode(&body)
    }

    pub async fn current(&self, at: Coordinates) -> Result<WeatherReport> {
        let body = self
            .http
            .get(FORECAST_URL)
            .query(&[
                ("latitude", at.latitude.to_string()),
                ("longitude", at.longitude.to_string()),
                ("current_weather", "true".to_string()),
            ])
            .send()
            .await
            .context("failed to query open-meteo")?
            .error_for_status()
            .context("open-meteo returned an error")?
            .text()
            .await
            .context("failed to read open-meteo response")?;
        parse_forecast(&body, Utc::now())
    }
}
