use chrono::NaiveTime;
use pi_gallery::config::{Configuration, SortOrder};
use pi_gallery::navigation::DiscoveryOrder;
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn parse_kebab_case_config() {
    let yaml = r#"
images-directory: "/photos"
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.images_directory, PathBuf::from("/photos"));
    assert_eq!(cfg.delay_seconds, 30);
    assert_eq!(cfg.sort_order, SortOrder::Random);
    assert_eq!(cfg.upload_dir(), PathBuf::from("/photos/uploaded"));
    assert_eq!(cfg.navigation.max_missing_retries, 10);
    assert_eq!(cfg.navigation.idle_tick, Duration::from_millis(50));
}

#[test]
fn parse_nested_sections() {
    let yaml = r#"
images-directory: "/photos"
upload-directory: "/srv/uploads"
delay-seconds: 12
sort-order: date
sort-reverse: true
overlay:
  show-filename: true
  text-alpha: 128
display:
  on-time: "06:30"
  off-time: "22:15"
  timezone: Australia/Sydney
  correction-horizontal: 1.1
  sleep-command: "vcgencmd display_power 0"
navigation:
  idle-tick: 20ms
  max-missing-retries: 3
  shuffle-seed: 7
weather:
  location: "Newtown, Sydney"
  update-interval: 30m
web:
  port: 8080
  local-only: false
"#;
    let cfg = serde_yaml::from_str::<Configuration>(yaml)
        .unwrap()
        .validated()
        .unwrap();
    assert_eq!(cfg.upload_dir(), PathBuf::from("/srv/uploads"));
    assert_eq!(cfg.delay(), Duration::from_secs(12));
    assert_eq!(cfg.sort_order.discovery_order(), DiscoveryOrder::Preserve);
    assert!(cfg.sort_reverse);
    assert!(cfg.overlay.show_filename);
    assert_eq!(cfg.overlay.text_alpha, 128);
    assert_eq!(cfg.display.on_time, NaiveTime::from_hms_opt(6, 30, 0).unwrap());
    assert_eq!(cfg.display.off_time, NaiveTime::from_hms_opt(22, 15, 0).unwrap());
    assert_eq!(cfg.display.timezone, Some(chrono_tz::Australia::Sydney));
    assert_eq!(cfg.navigation.shuffle_seed, Some(7));
    assert_eq!(cfg.weather.update_interval, Duration::from_secs(30 * 60));
    assert_eq!(cfg.web.socket_addr().port(), 8080);
    assert!(!cfg.web.local_only);
}

#[test]
fn unknown_keys_are_rejected() {
    let yaml = r#"
images-directory: "/photos"
photo-library-path: "/old"
"#;
    assert!(serde_yaml::from_str::<Configuration>(yaml).is_err());
}

#[test]
fn bad_clock_values_fail_to_parse() {
    let yaml = r#"
images-directory: "/photos"
display:
  on-time: "7am"
"#;
    assert!(serde_yaml::from_str::<Configuration>(yaml).is_err());
}

#[test]
fn validation_catches_out_of_range_values() {
    let base = Configuration {
        images_directory: PathBuf::from("/photos"),
        ..Configuration::default()
    };
    assert!(base.clone().validated().is_ok());

    let mut cfg = base.clone();
    cfg.delay_seconds = 0;
    assert!(cfg.validated().is_err());

    let mut cfg = base.clone();
    cfg.navigation.max_missing_retries = 0;
    assert!(cfg.validated().is_err());

    let mut cfg = base.clone();
    cfg.navigation.max_missing_retries = 51;
    assert!(cfg.validated().is_err());

    let mut cfg = base.clone();
    cfg.weather.latitude = Some(10.0);
    assert!(cfg.validated().is_err());

    let mut cfg = base.clone();
    cfg.display.correction_vertical = 0.0;
    assert!(cfg.validated().is_err());

    assert!(Configuration::default().validated().is_err());
}

#[test]
fn saved_yaml_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    let mut cfg = Configuration {
        images_directory: PathBuf::from("/photos"),
        ..Configuration::default()
    };
    cfg.delay_seconds = 45;
    cfg.sort_order = SortOrder::Name;
    cfg.display.off_time = NaiveTime::from_hms_opt(21, 0, 0).unwrap();
    cfg.save_yaml_file(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("delay-seconds: 45"));

    let loaded = Configuration::from_yaml_file(&path).unwrap();
    assert_eq!(loaded, cfg);
}
