//! Recording sessions
//!
//! [`Recorder`] consumes statuses, runs them through
//! [`transition`](crate::machine::transition) and carries out the
//! resulting effects: it opens the stream and the output files when a
//! session starts, appends polled tracks to the cue sheet, and tears the
//! session down when the DJ changes or signs off.
//!
//! A session writes two files into the output directory, sharing the same
//! basename: `<start time>-<dj>.mp3` and `<start time>-<dj>.cue`.

use crate::copier::{CopyLoop, CopyOutcome, SharedCue, TitleSink};
use crate::cue::CueWriter;
use crate::error::{Error, Result};
use crate::hook::{HookEvent, Notifier};
use crate::machine::{transition, Effect, State};
use crate::models::Status;
use crate::status::{
    DEFAULT_IDLE_DJ, DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_STATUS_URL,
    DEFAULT_USER_AGENT,
};
use crate::stream::{AudioStream, StreamSource, DEFAULT_STREAM_URL};
use chrono::{DateTime, Local, SecondsFormat, TimeZone};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default pause between two stream connection attempts
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Where track boundaries come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataSource {
    /// `now playing` changes reported by the status endpoint
    #[default]
    Polled,
    /// `StreamTitle` blocks interleaved with the audio
    InBand,
}

impl FromStr for MetadataSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "polled" | "status" => Ok(Self::Polled),
            "inband" | "in-band" | "icy" => Ok(Self::InBand),
            other => Err(Error::other(format!(
                "unknown metadata source {:?} (expected polled or inband)",
                other
            ))),
        }
    }
}

impl fmt::Display for MetadataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Polled => f.write_str("polled"),
            Self::InBand => f.write_str("inband"),
        }
    }
}

/// Everything the recorder and its clients need from the configuration
#[derive(Debug, Clone)]
pub struct RecorderSettings {
    pub status_url: String,
    pub stream_url: String,
    pub idle_dj: String,
    pub poll_interval: Duration,
    pub metadata_source: MetadataSource,
    pub reconnect_delay: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub output_dir: PathBuf,
    /// Script notified of session start and end; `None` only logs
    pub hook: Option<PathBuf>,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            status_url: DEFAULT_STATUS_URL.to_string(),
            stream_url: DEFAULT_STREAM_URL.to_string(),
            idle_dj: DEFAULT_IDLE_DJ.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            metadata_source: MetadataSource::default(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            output_dir: PathBuf::from("recordings"),
            hook: None,
        }
    }
}

/// Basename shared by a session's audio file and cue sheet
///
/// `<RFC 3339 start time>-<dj>`, with path separators and control
/// characters in the DJ name replaced by `_`.
pub fn session_basename<Tz>(started_at: &DateTime<Tz>, dj: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let stamp = started_at.to_rfc3339_opts(SecondsFormat::Secs, false);
    let dj: String = dj
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    format!("{}-{}", stamp, dj)
}

/// A session in progress
struct RecordingSession {
    dj: String,
    audio_path: PathBuf,
    cue_path: PathBuf,
    start: Instant,
    /// Effective track source, decided when the first stream was acquired
    track_source: MetadataSource,
    cue: SharedCue<File>,
    cancel: CancellationToken,
    copier: JoinHandle<CopyOutcome<File>>,
}

/// Applies statuses to the session state machine
pub struct Recorder {
    settings: RecorderSettings,
    streams: Arc<dyn StreamSource>,
    notifier: Box<dyn Notifier>,
    state: State,
    session: Option<RecordingSession>,
    /// Fired by `run`'s shutdown token; aborts a pending stream acquisition
    stop: CancellationToken,
}

impl Recorder {
    pub fn new(
        settings: RecorderSettings,
        streams: Arc<dyn StreamSource>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            settings,
            streams,
            notifier,
            state: State::Waiting,
            session: None,
            stop: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn settings(&self) -> &RecorderSettings {
        &self.settings
    }

    /// Audio and cue paths of the running session
    pub fn session_paths(&self) -> Option<(&Path, &Path)> {
        self.session
            .as_ref()
            .map(|s| (s.audio_path.as_path(), s.cue_path.as_path()))
    }

    /// Consume statuses until the channel closes or `shutdown` fires
    ///
    /// The running session, if any, is torn down before returning. Only
    /// fatal errors are returned; the session is torn down first as well.
    pub async fn run(
        &mut self,
        statuses: &mut mpsc::Receiver<Status>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        self.stop = shutdown.clone();

        let result = loop {
            let status = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break Ok(()),
                status = statuses.recv() => status,
            };

            let Some(status) = status else {
                tracing::info!("Status channel closed");
                break Ok(());
            };

            if let Err(e) = self.handle_status(status).await {
                tracing::error!("Recorder stopped: {}", e);
                break Err(e);
            }
        };

        self.shutdown().await;
        result
    }

    /// Apply one status
    ///
    /// A session that cannot start because the stream is unreachable is
    /// abandoned: the recorder notifies `done` and goes back to waiting.
    /// Failing to create an output file is fatal and returned.
    pub async fn handle_status(&mut self, status: Status) -> Result<()> {
        let state = std::mem::take(&mut self.state);
        let (next, effects) = transition(state, &status);
        self.state = next;

        for effect in effects {
            match effect {
                Effect::Notify(event) => self.notifier.notify(event),
                Effect::StopSession => self.stop_session().await,
                Effect::AppendTrack { title } => self.append_track(&title).await,
                Effect::StartSession { dj, track } => {
                    if let Err(e) = self.start_session(&dj, &track).await {
                        self.state = State::Waiting;
                        self.notifier.notify(HookEvent::Done);
                        if e.is_fatal() {
                            return Err(e);
                        }
                        tracing::warn!(dj = %dj, "Cannot start recording: {}", e);
                    }
                }
            }
        }

        Ok(())
    }

    /// Tear the running session down and notify `done`
    ///
    /// Does nothing while waiting.
    pub async fn shutdown(&mut self) {
        if !self.state.is_recording() && self.session.is_none() {
            return;
        }

        self.stop_session().await;
        self.state = State::Waiting;
        self.notifier.notify(HookEvent::Done);
    }

    async fn start_session(&mut self, dj: &str, track: &str) -> Result<()> {
        let configured = self.settings.metadata_source;
        let stream = self.acquire_stream(configured == MetadataSource::InBand).await?;

        let track_source = match (configured, stream.metaint()) {
            (MetadataSource::InBand, Some(_)) => MetadataSource::InBand,
            (MetadataSource::InBand, None) => {
                tracing::info!("No in-band metadata on the stream, using polled titles");
                MetadataSource::Polled
            }
            (MetadataSource::Polled, _) => MetadataSource::Polled,
        };

        let dir = &self.settings.output_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::sink(dir, e))?;

        let basename = session_basename(&Local::now(), dj);
        let audio_name = format!("{}.mp3", basename);
        let audio_path = dir.join(&audio_name);
        let cue_path = dir.join(format!("{}.cue", basename));

        let audio = File::create(&audio_path)
            .await
            .map_err(|e| Error::sink(&audio_path, e))?;
        let cue_file = File::create(&cue_path)
            .await
            .map_err(|e| Error::sink(&cue_path, e))?;
        let mut cue = CueWriter::create(cue_file, &audio_name)
            .await
            .map_err(|e| Error::sink(&cue_path, e))?;

        let start = Instant::now();
        if track_source == MetadataSource::Polled {
            if let Err(e) = cue.write_track(track, Duration::ZERO).await {
                tracing::warn!(path = %cue_path.display(), "Cannot write cue entry: {}", e);
            }
        }

        let cue: SharedCue<File> = Arc::new(Mutex::new(Some(cue)));
        let titles = (track_source == MetadataSource::InBand)
            .then(|| TitleSink::new(cue.clone(), start));

        let cancel = CancellationToken::new();
        let copy = CopyLoop::new(
            self.streams.clone(),
            audio,
            titles,
            self.settings.reconnect_delay,
            cancel.clone(),
        );
        let copier = tokio::spawn(copy.run(stream));

        tracing::info!(
            dj = %dj,
            path = %audio_path.display(),
            tracks = %track_source,
            "Recording started"
        );

        self.session = Some(RecordingSession {
            dj: dj.to_string(),
            audio_path,
            cue_path,
            start,
            track_source,
            cue,
            cancel,
            copier,
        });
        Ok(())
    }

    /// First connection of a session, bounded by the request timeout and
    /// abandoned when the recorder is stopped
    async fn acquire_stream(&self, request_metadata: bool) -> Result<AudioStream> {
        let timeout = self.settings.request_timeout;
        let opened = tokio::select! {
            biased;
            _ = self.stop.cancelled() => {
                return Err(Error::Stream("stopped while connecting".into()));
            }
            opened = tokio::time::timeout(timeout, self.streams.open(request_metadata)) => opened,
        };

        opened.map_err(|_| {
            Error::Stream(format!("no response within {}s", timeout.as_secs_f32()))
        })?
    }

    async fn append_track(&mut self, title: &str) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.track_source != MetadataSource::Polled {
            tracing::debug!("Ignoring polled title in an in-band session: {}", title);
            return;
        }

        let elapsed = session.start.elapsed();
        let mut guard = session.cue.lock().await;
        let Some(cue) = guard.as_mut() else {
            return;
        };

        match cue.write_track(title, elapsed).await {
            Ok(entry) => {
                tracing::debug!(index = entry.index, offset = %entry.offset, "Track: {}", title)
            }
            Err(e) => tracing::warn!(
                path = %session.cue_path.display(),
                "Cannot write cue entry for {:?}: {}",
                title,
                e
            ),
        }
    }

    /// Cancel the copy task, then close the cue sheet, the audio file and
    /// the stream, in that order
    async fn stop_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        session.cancel.cancel();
        let outcome = match session.copier.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!(dj = %session.dj, "Copy task failed: {}", e);
                None
            }
        };

        let cue = session.cue.lock().await.take();
        let tracks = cue.as_ref().map_or(0, |cue| cue.track_count());
        if let Some(cue) = cue {
            if let Err(e) = cue.close().await {
                tracing::warn!(path = %session.cue_path.display(), "Cannot close cue sheet: {}", e);
            }
        }

        let Some(outcome) = outcome else {
            return;
        };

        let CopyOutcome {
            mut audio,
            stream,
            bytes_written,
            connections,
        } = outcome;
        if let Err(e) = audio.shutdown().await {
            tracing::warn!(path = %session.audio_path.display(), "Cannot close audio file: {}", e);
        }
        drop(audio);
        drop(stream);

        tracing::info!(
            dj = %session.dj,
            path = %session.audio_path.display(),
            bytes = bytes_written,
            tracks,
            connections,
            "Recording finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn test_session_basename() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let started = tz.with_ymd_and_hms(2024, 5, 1, 21, 0, 0).unwrap();

        assert_eq!(
            session_basename(&started, "SomeDJ"),
            "2024-05-01T21:00:00+02:00-SomeDJ"
        );
        assert_eq!(
            session_basename(&started, "a/b\\c\0d\ne"),
            "2024-05-01T21:00:00+02:00-a_b_c_d_e"
        );
    }

    #[test]
    fn test_metadata_source_parsing() {
        assert_eq!("polled".parse::<MetadataSource>().unwrap(), MetadataSource::Polled);
        assert_eq!("InBand".parse::<MetadataSource>().unwrap(), MetadataSource::InBand);
        assert_eq!(" icy ".parse::<MetadataSource>().unwrap(), MetadataSource::InBand);
        assert!("xml".parse::<MetadataSource>().is_err());
        assert_eq!(MetadataSource::InBand.to_string(), "inband");
    }

    #[test]
    fn test_default_settings() {
        let settings = RecorderSettings::default();
        assert_eq!(settings.poll_interval, Duration::from_secs(10));
        assert_eq!(settings.metadata_source, MetadataSource::Polled);
        assert_eq!(settings.idle_dj, "Hanyuu-sama");
        assert!(settings.hook.is_none());
    }
}
