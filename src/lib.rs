pub mod caption;
pub mod config;
pub mod error;
pub mod events;
pub mod logs;
pub mod navigation;
pub mod notify;
pub mod platform;
pub mod render;
pub mod scan;
pub mod schedule;
pub mod settings;
pub mod slideshow;
pub mod system;
pub mod uploads;
pub mod weather;
pub mod web;
pub mod tasks {
    pub mod files;
    pub mod input;
    pub mod power;
    pub mod slideshow;
    pub mod weather;
}

pub use error::Error;
