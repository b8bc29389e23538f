use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use pi_gallery::config::{Configuration, SortOrder};
use pi_gallery::events::InputEvent;
use pi_gallery::navigation::{DiscoveryOrder, ItemId, Navigator};
use pi_gallery::platform::display_power::CommandRunner;
use pi_gallery::render::{Frame, Renderer, resolve_image};
use pi_gallery::scan::Library;
use pi_gallery::slideshow::{DisplaySignals, Slideshow};
use pi_gallery::tasks::power::PowerControl;
use pi_gallery::tasks::slideshow::{resolve_with_retry, run};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Recording {
    frames: Vec<Frame>,
}

impl Renderer for Recording {
    fn render(&mut self, frame: &Frame) -> anyhow::Result<()> {
        self.frames.push(frame.clone());
        Ok(())
    }
}

fn write_png(dir: &Path, name: &str, w: u32, h: u32) {
    image::RgbImage::new(w, h).save(dir.join(name)).unwrap();
}

fn config(images: &Path) -> Configuration {
    let mut cfg = Configuration {
        images_directory: images.to_path_buf(),
        sort_order: SortOrder::Name,
        ..Configuration::default()
    };
    cfg.weather.enabled = false;
    cfg.overlay.show_time = false;
    cfg.overlay.show_date = false;
    // equal on/off times keep the display on around the clock
    cfg.display.on_time = NaiveTime::MIN;
    cfg.display.off_time = NaiveTime::MIN;
    cfg.navigation.idle_tick = Duration::from_millis(5);
    cfg.validated().unwrap()
}

fn slideshow(rt: &tokio::runtime::Runtime, cfg: Configuration) -> Slideshow {
    let runner: CommandRunner = Arc::new(|_: &str| Ok(()));
    let signals = Arc::new(DisplaySignals::default());
    let power = PowerControl::new(rt.handle().clone(), runner, Arc::clone(&signals));
    Slideshow::new(cfg, None, signals, power, CancellationToken::new())
}

fn shown_ids(frames: &[Frame]) -> Vec<String> {
    frames
        .iter()
        .map(|f| match f {
            Frame::Photo { image, .. } => image.id.to_string(),
            Frame::Placeholder(_) => "<placeholder>".into(),
            Frame::Notice(text) => format!("<notice {text}>"),
            Frame::Blank => "<blank>".into(),
        })
        .collect()
}

#[test]
fn keyboard_navigation_drives_frames() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    write_png(dir.path(), "a.png", 40, 30);
    write_png(dir.path(), "b.png", 30, 40);
    let show = slideshow(&rt, config(dir.path()));
    show.rescan();

    let (tx, rx) = crossbeam_channel::unbounded();
    for event in [
        InputEvent::Next,
        InputEvent::Next,
        InputEvent::Previous,
        InputEvent::Quit,
    ] {
        tx.send(event).unwrap();
    }
    let mut renderer = Recording::default();
    run(&show, &mut renderer, &rx).unwrap();

    assert_eq!(shown_ids(&renderer.frames), vec!["a.png", "b.png", "a.png"]);
    assert!(show.cancel_token().is_cancelled());
    if let Frame::Photo { image, .. } = &renderer.frames[1] {
        assert_eq!((image.width, image.height), (30, 40));
    }
}

#[test]
fn empty_library_shows_placeholder() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let show = slideshow(&rt, config(dir.path()));
    let (tx, rx) = crossbeam_channel::unbounded();
    tx.send(InputEvent::Next).unwrap();
    tx.send(InputEvent::Quit).unwrap();
    let mut renderer = Recording::default();
    run(&show, &mut renderer, &rx).unwrap();
    assert_eq!(shown_ids(&renderer.frames), vec!["<placeholder>"]);
}

#[test]
fn vanished_file_gives_up_after_ceiling() {
    let dir = tempfile::tempdir().unwrap();
    write_png(dir.path(), "x.png", 10, 10);
    let cfg = config(dir.path());
    let library = Library::from_config(&cfg);
    let nav = Navigator::new(DiscoveryOrder::Preserve, None);
    nav.discover(vec![ItemId::from("x.png")]);
    std::fs::remove_file(dir.path().join("x.png")).unwrap();

    let first = nav.advance(&library);
    assert_eq!(first, Some(ItemId::from("x.png")));
    let resolution = resolve_with_retry(
        first,
        5,
        || nav.advance(&library),
        |id| resolve_image(&library, &cfg, id),
    );
    assert!(resolution.shown.is_none());
    assert_eq!(resolution.attempts, 5);
    assert_eq!(nav.snapshot().history, 1);
}

#[test]
fn exhausted_retries_leave_nothing_current() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    write_png(dir.path(), "x.png", 10, 10);
    let mut cfg = config(dir.path());
    cfg.navigation.max_missing_retries = 5;
    let show = slideshow(&rt, cfg);
    show.rescan();
    std::fs::remove_file(dir.path().join("x.png")).unwrap();

    let (tx, rx) = crossbeam_channel::unbounded();
    tx.send(InputEvent::Next).unwrap();
    tx.send(InputEvent::Quit).unwrap();
    let mut renderer = Recording::default();
    run(&show, &mut renderer, &rx).unwrap();

    assert_eq!(shown_ids(&renderer.frames), vec!["<placeholder>"]);
    assert_eq!(show.current(), None);
    let snapshot = show.snapshot();
    assert_eq!(snapshot.cursor, None);
    assert_eq!(snapshot.history, 1);
    assert_eq!(snapshot.seen, 1);
}

#[test]
fn missing_current_is_skipped_to_the_next_readable() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    for name in ["a.png", "b.png", "c.png"] {
        write_png(dir.path(), name, 20, 10);
    }
    let show = slideshow(&rt, config(dir.path()));
    show.rescan();
    std::fs::remove_file(dir.path().join("a.png")).unwrap();

    let (tx, rx) = crossbeam_channel::unbounded();
    tx.send(InputEvent::Next).unwrap();
    tx.send(InputEvent::Quit).unwrap();
    let mut renderer = Recording::default();
    run(&show, &mut renderer, &rx).unwrap();
    assert_eq!(shown_ids(&renderer.frames), vec!["b.png"]);
}
