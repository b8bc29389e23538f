use chrono::NaiveDateTime;
use serde::Serialize;

use crate::config::OverlayOptions;
use crate::render::ResolvedImage;
use crate::weather::WeatherReport;

/// Screen position an overlay line is drawn at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Time,
    Date,
    Temperature,
    Weather,
    Filename,
    Caption,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlayText {
    pub slot: Slot,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Overlay {
    pub alpha: u8,
    pub texts: Vec<OverlayText>,
}

impl Overlay {
    pub fn text(&self, slot: Slot) -> Option<&str> {
        self.texts
            .iter()
            .find(|t| t.slot == slot)
            .map(|t| t.text.as_str())
    }
}

/// Build the overlay lines for one frame. Lines whose toggle is off, or whose
/// data is not available yet, are left out.
pub fn compose(
    opts: &OverlayOptions,
    now: NaiveDateTime,
    weather: Option<&WeatherReport>,
    image: Option<&ResolvedImage>,
) -> Overlay {
    let mut texts = Vec::new();
    let mut push = |slot, text: String| {
        if !text.is_empty() {
            texts.push(OverlayText { slot, text });
        }
    };
    if opts.show_time {
        push(Slot::Time, now.format("%I:%M").to_string());
    }
    if opts.show_date {
        push(Slot::Date, now.format("%d %b %y").to_string());
    }
    if let Some(report) = weather {
        if opts.show_temperature {
            push(Slot::Temperature, report.temperature_label());
        }
        if opts.show_weather_code {
            push(Slot::Weather, report.description.clone());
        }
    }
    if let Some(image) = image {
        if opts.show_filename {
            push(
                Slot::Filename,
                format!(
                    "{} ({}x{})",
                    image.id, image.placement.width, image.placement.height
                ),
            );
        }
        if opts.show_caption {
            if let Some(caption) = &image.caption {
                push(Slot::Caption, caption.clone());
            }
        }
    }
    Overlay {
        alpha: opts.text_alpha,
        texts,
    }
}
