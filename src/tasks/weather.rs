use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WeatherOptions;
use crate::slideshow::Slideshow;
use crate::weather::{Coordinates, WeatherClient};

#[derive(Debug, Clone, PartialEq)]
enum Lookup {
    Known(Coordinates),
    Geocode(String),
    Unconfigured,
}

/// Geocoded location kept between refreshes.
#[derive(Debug, Default)]
struct PlaceCache {
    place: String,
    at: Option<Coordinates>,
}

impl PlaceCache {
    fn lookup(&self, opts: &WeatherOptions) -> Lookup {
        if let Some((latitude, longitude)) = opts.coordinates() {
            return Lookup::Known(Coordinates {
                latitude,
                longitude,
            });
        }
        let place = opts.location.trim();
        if place.is_empty() {
            return Lookup::Unconfigured;
        }
        match self.at {
            Some(at) if self.place == place => Lookup::Known(at),
            _ => Lookup::Geocode(place.to_string()),
        }
    }

    fn remember(&mut self, place: String, at: Coordinates) {
        self.place = place;
        self.at = Some(at);
    }
}

async fn refresh(
    client: &WeatherClient,
    opts: &WeatherOptions,
    cache: &mut PlaceCache,
    slideshow: &Slideshow,
) -> Result<()> {
    let at = match cache.lookup(opts) {
        Lookup::Known(at) => at,
        Lookup::Unconfigured => {
            debug!("no weather location configured");
            return Ok(());
        }
        Lookup::Geocode(place) => {
            let Some(at) = client
                .geocode(&place)
                .await
                .with_context(|| format!("failed to geocode {place:?}"))?
            else {
                warn!(place = %place, "location not found");
                return Ok(());
            };
            info!(place = %place, latitude = at.latitude, longitude = at.longitude, "location geocoded");
            cache.remember(place, at);
            at
        }
    };
    let report = client.current(at).await?;
    debug!(
        temperature = report.temperature_c,
        code = report.code,
        description = %report.description,
        "weather updated"
    );
    slideshow.set_weather(report);
    Ok(())
}

/// Refresh the weather every update interval, or right away when the
/// location changes. The previous report stays up when a refresh fails.
pub async fn run(slideshow: Arc<Slideshow>, client: WeatherClient, cancel: CancellationToken) -> Result<()> {
    let mut cache = PlaceCache::default();
    loop {
        let opts = slideshow.with_settings(|cfg| cfg.weather.clone());
        if opts.enabled {
            if let Err(err) = refresh(&client, &opts, &mut cache, &slideshow).await {
                warn!(error = ?err, "weather refresh failed");
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting weather task");
                break;
            }
            _ = sleep(opts.update_interval) => {}
            _ = slideshow.weather_changed().notified() => {
                debug!("weather settings changed; refreshing now");
            }
        }
    }
    Ok(())
}
