//! Recorder settings stored in djconfig
//!
//! [`RecorderConfigExt`] adds typed getters for the `recorder` section of
//! the configuration to [`djconfig::Config`], and collects them into a
//! [`RecorderSettings`] for the recorder and its clients.
//!
//! ```no_run
//! use djconfig::get_config;
//! use djrecorder::RecorderConfigExt;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = get_config();
//! let settings = config.recorder_settings()?;
//! println!("Recording into {}", settings.output_dir.display());
//! # Ok(())
//! # }
//! ```

use crate::recorder::{MetadataSource, RecorderSettings, DEFAULT_RECONNECT_DELAY};
use crate::status::{
    DEFAULT_IDLE_DJ, DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_STATUS_URL,
    DEFAULT_USER_AGENT,
};
use crate::stream::DEFAULT_STREAM_URL;
use anyhow::{anyhow, Result};
use djconfig::Config;
use serde_yaml::Value;
use std::path::PathBuf;
use std::time::Duration;

/// Default output directory, relative to the configuration directory
pub const DEFAULT_OUTPUT_DIR: &str = "recordings";

const SECTION: &str = "recorder";

/// Recorder section of the configuration
///
/// Getters fall back to the built-in default when a key is missing or has
/// the wrong type.
pub trait RecorderConfigExt {
    // ========================================================================
    // Endpoints
    // ========================================================================

    fn get_recorder_status_url(&self) -> Result<String>;
    fn get_recorder_stream_url(&self) -> Result<String>;

    /// DJ name the station reports when nobody is live
    fn get_recorder_idle_dj(&self) -> Result<String>;

    fn get_recorder_user_agent(&self) -> Result<String>;

    // ========================================================================
    // Timing
    // ========================================================================

    fn get_recorder_poll_interval(&self) -> Result<Duration>;

    /// Stored in whole seconds
    fn set_recorder_poll_interval(&self, interval: Duration) -> Result<()>;

    fn get_recorder_reconnect_delay(&self) -> Result<Duration>;
    fn get_recorder_request_timeout(&self) -> Result<Duration>;

    // ========================================================================
    // Session
    // ========================================================================

    /// Where track boundaries come from
    ///
    /// An unknown value is an error rather than a silent fallback.
    fn get_recorder_metadata_source(&self) -> Result<MetadataSource>;

    fn set_recorder_metadata_source(&self, source: MetadataSource) -> Result<()>;

    /// Output directory, resolved against the configuration directory and created
    fn get_recorder_output_dir(&self) -> Result<PathBuf>;

    /// Hook script, `None` when unset or empty
    fn get_recorder_hook(&self) -> Result<Option<PathBuf>>;

    /// Every recorder setting at once
    fn recorder_settings(&self) -> Result<RecorderSettings>;
}

impl RecorderConfigExt for Config {
    fn get_recorder_status_url(&self) -> Result<String> {
        Ok(string_or(self, "status_url", DEFAULT_STATUS_URL))
    }

    fn get_recorder_stream_url(&self) -> Result<String> {
        Ok(string_or(self, "stream_url", DEFAULT_STREAM_URL))
    }

    fn get_recorder_idle_dj(&self) -> Result<String> {
        Ok(string_or(self, "idle_dj", DEFAULT_IDLE_DJ))
    }

    fn get_recorder_user_agent(&self) -> Result<String> {
        Ok(string_or(self, "user_agent", DEFAULT_USER_AGENT))
    }

    fn get_recorder_poll_interval(&self) -> Result<Duration> {
        let secs = u64_or(self, "poll_interval_secs", DEFAULT_POLL_INTERVAL.as_secs());
        Ok(Duration::from_secs(secs.max(1)))
    }

    fn set_recorder_poll_interval(&self, interval: Duration) -> Result<()> {
        self.set_number(&[SECTION, "poll_interval_secs"], interval.as_secs())
    }

    fn get_recorder_reconnect_delay(&self) -> Result<Duration> {
        let millis = u64_or(
            self,
            "reconnect_delay_ms",
            DEFAULT_RECONNECT_DELAY.as_millis() as u64,
        );
        Ok(Duration::from_millis(millis))
    }

    fn get_recorder_request_timeout(&self) -> Result<Duration> {
        let secs = u64_or(self, "request_timeout_secs", DEFAULT_REQUEST_TIMEOUT_SECS);
        Ok(Duration::from_secs(secs.max(1)))
    }

    fn get_recorder_metadata_source(&self) -> Result<MetadataSource> {
        match self.get_value(&[SECTION, "metadata_source"]) {
            Ok(Value::String(s)) => s.parse().map_err(|e| anyhow!("recorder.metadata_source: {}", e)),
            _ => Ok(MetadataSource::default()),
        }
    }

    fn set_recorder_metadata_source(&self, source: MetadataSource) -> Result<()> {
        self.set_value(
            &[SECTION, "metadata_source"],
            Value::String(source.to_string()),
        )
    }

    fn get_recorder_output_dir(&self) -> Result<PathBuf> {
        let dir = self.get_managed_dir(&[SECTION, "output_dir"], DEFAULT_OUTPUT_DIR)?;
        Ok(PathBuf::from(dir))
    }

    fn get_recorder_hook(&self) -> Result<Option<PathBuf>> {
        match self.get_value(&[SECTION, "hook"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => Ok(Some(PathBuf::from(s.trim()))),
            _ => Ok(None),
        }
    }

    fn recorder_settings(&self) -> Result<RecorderSettings> {
        Ok(RecorderSettings {
            status_url: self.get_recorder_status_url()?,
            stream_url: self.get_recorder_stream_url()?,
            idle_dj: self.get_recorder_idle_dj()?,
            poll_interval: self.get_recorder_poll_interval()?,
            metadata_source: self.get_recorder_metadata_source()?,
            reconnect_delay: self.get_recorder_reconnect_delay()?,
            request_timeout: self.get_recorder_request_timeout()?,
            user_agent: self.get_recorder_user_agent()?,
            output_dir: self.get_recorder_output_dir()?,
            hook: self.get_recorder_hook()?,
        })
    }
}

fn string_or(config: &Config, key: &str, default: &str) -> String {
    match config.get_value(&[SECTION, key]) {
        Ok(Value::String(s)) if !s.is_empty() => s,
        _ => default.to_string(),
    }
}

fn u64_or(config: &Config, key: &str, default: u64) -> u64 {
    match config.get_value(&[SECTION, key]) {
        Ok(Value::Number(n)) => n.as_u64().unwrap_or(default),
        Ok(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}
