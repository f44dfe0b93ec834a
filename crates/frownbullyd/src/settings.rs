//! Derives per-component settings from the shared [`Config`].

use crate::pipeline::PipelineSettings;
use frownbully_core::Config;
use frownbully_hw::CaptureSettings;

pub fn capture_settings(config: &Config) -> CaptureSettings {
    CaptureSettings {
        device: config.camera_device.clone(),
        output_dir: config.captures_dir(),
        max_attempts: config.capture_retries,
        backoff: config.capture_backoff,
        warmup_frames: config.warmup_frames,
    }
}

pub fn pipeline_settings(config: &Config) -> PipelineSettings {
    PipelineSettings {
        interval: config.interval,
        confidence_threshold: config.confidence_threshold,
        alert_threshold: config.alert_threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frownbully_core::config::FileConfig;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_settings_follow_config() {
        let file = FileConfig {
            data_dir: Some(PathBuf::from("/srv/fb")),
            camera_device: Some("/dev/video3".into()),
            capture_retries: Some(5),
            alert_threshold: Some(0.8),
            ..Default::default()
        };
        let config = Config::from_sources(file, |_| None).unwrap();

        let capture = capture_settings(&config);
        assert_eq!(capture.device, "/dev/video3");
        assert_eq!(capture.output_dir, PathBuf::from("/srv/fb/captures"));
        assert_eq!(capture.max_attempts, 5);
        assert_eq!(capture.backoff, Duration::from_secs(1));

        let pipeline = pipeline_settings(&config);
        assert_eq!(pipeline.alert_threshold, 0.8);
        assert_eq!(pipeline.confidence_threshold, 0.3);
        assert_eq!(pipeline.interval, Duration::from_secs(5));
    }
}
