use std::path::PathBuf;
use std::time::Duration;

use slow_movie::Error;
use slow_movie::config::{Configuration, DisplayConfig, PanelGeometry};
use slow_movie::engine::PlaybackMode;

#[test]
fn parse_kebab_case_config() {
    let yaml = r#"
video-library-path: "/srv/videos"
state-path: "/var/lib/slow-movie"
refresh-delay: 2m 30s
increment: 4
mode: random
random-seed: 9
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.video_library_path, PathBuf::from("/srv/videos"));
    assert_eq!(cfg.state_path, PathBuf::from("/var/lib/slow-movie"));
    assert_eq!(cfg.refresh_delay, Duration::from_secs(150));
    assert_eq!(cfg.increment, 4);
    assert_eq!(cfg.mode, PlaybackMode::Random);
    assert_eq!(cfg.random_seed, Some(9));
    assert!(cfg.validated().is_ok());
}

#[test]
fn empty_document_uses_defaults() {
    let cfg: Configuration = serde_yaml::from_str("{}").unwrap();
    assert_eq!(cfg.video_library_path, PathBuf::from("Videos"));
    assert_eq!(cfg.refresh_delay, Duration::from_secs(180));
    assert_eq!(cfg.increment, 10);
    assert_eq!(cfg.mode, PlaybackMode::Sequential);
    assert!(cfg.convert_mkv);
    assert!((cfg.frame_duration_ms - 41.666_666).abs() < 1e-9);
    assert_eq!(
        cfg.display,
        DisplayConfig::Preview {
            path: PathBuf::from("dither_tmp.png")
        }
    );
}

#[test]
fn parse_command_display() {
    let yaml = r#"
panel:
  width: 800
  height: 480
display:
  kind: command
  init-command: "epd init"
  display-command: "epd show"
  sleep-command: "epd sleep"
  preview-path: "/tmp/frame.png"
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(
        cfg.panel,
        PanelGeometry {
            width: 800,
            height: 480
        }
    );
    match &cfg.display {
        DisplayConfig::Command {
            init_command,
            clear_command,
            display_command,
            sleep_command,
            preview_path,
        } => {
            assert_eq!(init_command.as_deref(), Some("epd init"));
            assert_eq!(clear_command, &None);
            assert_eq!(display_command, "epd show");
            assert_eq!(sleep_command.as_deref(), Some("epd sleep"));
            assert_eq!(preview_path.as_deref(), Some(PathBuf::from("/tmp/frame.png").as_path()));
        }
        other => panic!("expected command display, got {other:?}"),
    }
    assert!(cfg.validated().is_ok());
}

#[test]
fn unknown_keys_are_rejected() {
    let yaml = r#"
video-library-path: "/v"
refresh-dealy: 10s
"#;
    assert!(serde_yaml::from_str::<Configuration>(yaml).is_err());
}

#[test]
fn unknown_mode_is_rejected() {
    assert!(serde_yaml::from_str::<Configuration>("mode: shuffle").is_err());
}

#[test]
fn zero_delay_fails_validation() {
    let cfg: Configuration = serde_yaml::from_str("refresh-delay: 0s").unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(err.to_string().contains("refresh-delay"));
}

#[test]
fn config_file_round_trip_from_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.yaml");
    std::fs::write(&path, "increment: 3\n").unwrap();
    let cfg = Configuration::from_yaml_file(&path).unwrap();
    assert_eq!(cfg.increment, 3);
}

#[test]
fn malformed_file_reports_a_config_error() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.yaml");
    std::fs::write(&path, "increment: [not, a, number]\n").unwrap();
    assert!(matches!(
        Configuration::from_yaml_file(&path),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        Configuration::from_yaml_file(tmp.path().join("missing.yaml")),
        Err(Error::Io(_))
    ));
}
