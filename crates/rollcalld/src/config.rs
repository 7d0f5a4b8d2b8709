use std::path::PathBuf;

/// Station configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// MJPEG video stream URL.
    pub stream_url: String,
    /// Seconds to wait for the stream connection at startup.
    pub stream_connect_timeout_secs: u64,
    /// Remote relay trigger URL, hit after each recorded attendance.
    pub relay_url: String,
    /// Timeout in seconds for one relay trigger call.
    pub relay_timeout_secs: u64,
    /// Directory containing the pinned ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the operator-provided 68-point landmark model.
    pub landmark_model: PathBuf,
    /// Maximum embedding distance accepted as a match. Calibrated for
    /// L2-normalized ArcFace embeddings; recalibrate when changing the
    /// recognition model.
    pub match_tolerance: f32,
    /// EAR below this value counts as a closed eye.
    pub ear_threshold: f32,
    /// Consecutive closed-eye frames required before a reopen confirms a blink.
    pub ear_consec_frames: u32,
    /// Minimum IoU for a detection to continue an existing face track.
    pub track_min_iou: f32,
    /// Frames a track survives without a detection before it is retired.
    pub track_grace_frames: u32,
    /// Entries kept in the recent check-ins panel.
    pub feed_capacity: usize,
    /// Station window width in pixels.
    pub window_width: u32,
    /// Station window height in pixels.
    pub window_height: u32,
    /// Width of the full-roster side panel.
    pub roster_panel_width: u32,
    /// Height of the recent check-ins bottom panel.
    pub feed_panel_height: u32,
    /// TTF font used for overlay text.
    pub font_path: PathBuf,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        let model_dir = std::env::var("ROLLCALL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| rollcall_models::default_model_dir());

        let landmark_model = std::env::var("ROLLCALL_LANDMARK_MODEL")
            .map(PathBuf::from)
            .unwrap_or_else(|_| model_dir.join(rollcall_models::LANDMARK_MODEL_FILE));

        Self {
            db_path,
            stream_url: std::env::var("ROLLCALL_STREAM_URL")
                .unwrap_or_else(|_| "http://192.168.10.1:8000/video".to_string()),
            stream_connect_timeout_secs: env_u64("ROLLCALL_STREAM_CONNECT_TIMEOUT_SECS", 10),
            relay_url: std::env::var("ROLLCALL_RELAY_URL")
                .unwrap_or_else(|_| "http://192.168.10.1:5000/trigger-relay".to_string()),
            relay_timeout_secs: env_u64("ROLLCALL_RELAY_TIMEOUT_SECS", 5),
            model_dir,
            landmark_model,
            match_tolerance: env_f32("ROLLCALL_MATCH_TOLERANCE", 0.45),
            ear_threshold: env_f32("ROLLCALL_EAR_THRESHOLD", 0.25),
            ear_consec_frames: env_u32("ROLLCALL_EAR_CONSEC_FRAMES", 2),
            track_min_iou: env_f32("ROLLCALL_TRACK_MIN_IOU", 0.3),
            track_grace_frames: env_u32("ROLLCALL_TRACK_GRACE_FRAMES", 2),
            feed_capacity: env_usize("ROLLCALL_FEED_CAPACITY", 7),
            window_width: env_u32("ROLLCALL_WINDOW_WIDTH", 1600),
            window_height: env_u32("ROLLCALL_WINDOW_HEIGHT", 900),
            roster_panel_width: env_u32("ROLLCALL_ROSTER_PANEL_WIDTH", 500),
            feed_panel_height: env_u32("ROLLCALL_FEED_PANEL_HEIGHT", 200),
            font_path: std::env::var("ROLLCALL_FONT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf")
                }),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detection_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }

    /// Path to the ArcFace recognition model.
    pub fn recognition_model_path(&self) -> PathBuf {
        self.model_dir.join("w600k_r50.onnx")
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
