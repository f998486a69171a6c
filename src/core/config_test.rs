#[cfg(test)]
mod tests {

    use std::path::PathBuf;
    use crate::core::{EditorConfig, ScrubConfig, SyncConfig};

    #[test]
    fn test_editor_config_default() {
        let config = EditorConfig::default();
        assert!(config.playback.frame_skip);
        assert_eq!(config.playback.sync_threshold_frames, 2);
        assert_eq!(config.scrub.resize_debounce_ms, 300);
        assert_eq!(config.scrub.thumbnail_cap, 48);
        assert_eq!(config.waveform.sample_rate, 200);
        assert_eq!(config.waveform.exponent, 0.85);
        assert!(config.ffmpeg_path.is_none());
    }

    #[test]
    fn test_drift_threshold_in_expected_band() {
        let sync = SyncConfig::default();
        assert!((120..=160).contains(&sync.drift_threshold_ms));
        assert!(!sync.pause_during_generation);
    }

    #[test]
    fn test_editor_config_serialization() {
        let mut config = EditorConfig::default();
        config.playback.frame_skip = false;
        config.sync.drift_threshold_ms = 150;
        config.ffmpeg_path = Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));

        let serialized = serde_json::to_string(&config).expect("Failed to serialize config");
        let deserialized: EditorConfig = serde_json::from_str(&serialized).expect("Failed to deserialize config");

        assert_eq!(config.playback.frame_skip, deserialized.playback.frame_skip);
        assert_eq!(config.sync.drift_threshold_ms, deserialized.sync.drift_threshold_ms);
        assert_eq!(config.ffmpeg_path, deserialized.ffmpeg_path);
    }

    #[test]
    fn test_config_backward_compatibility() {
        // Older files only carried the playback section
        let old_config_json = r#"{
            "playback": { "frame_skip": false },
            "ffmpeg_path": null
        }"#;

        let config: EditorConfig = serde_json::from_str(old_config_json).expect("Failed to parse old config");

        assert!(!config.playback.frame_skip);
        assert_eq!(config.playback.default_fps, 24.0);
        assert_eq!(config.scrub.max_thumbnails, 12);
        assert_eq!(config.sync.drift_threshold_ms, 140);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("clipdozer").join("config.json");

        let config = EditorConfig::load_from(&path).expect("load");
        assert!(path.exists());
        assert!(config.playback.frame_skip);
    }

    #[test]
    fn test_load_replaces_broken_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").expect("write");

        let config = EditorConfig::load_from(&path).expect("load");
        assert_eq!(config.scrub.cancel_wait_ms, 50);

        let rewritten = std::fs::read_to_string(&path).expect("read");
        assert!(serde_json::from_str::<EditorConfig>(&rewritten).is_ok());
    }

    #[test]
    fn test_scrub_durations() {
        let scrub = ScrubConfig::default();
        assert_eq!(scrub.resize_debounce().as_millis(), 300);
        assert_eq!(scrub.cancel_wait().as_millis(), 50);
    }

    #[test]
    fn test_binary_paths_fall_back_to_path_lookup() {
        let mut config = EditorConfig::default();
        assert_eq!(config.ffmpeg_binary(), PathBuf::from("ffmpeg"));
        assert_eq!(config.ffprobe_binary(), PathBuf::from("ffprobe"));
        config.ffprobe_path = Some(PathBuf::from("/usr/local/bin/ffprobe"));
        assert_eq!(config.ffprobe_binary(), PathBuf::from("/usr/local/bin/ffprobe"));
    }
}
