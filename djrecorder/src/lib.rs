//! Live DJ session recorder
//!
//! This crate watches a radio station's status endpoint and, while a DJ is
//! live, records the station's audio stream to disk together with a cue
//! sheet listing the tracks played.
//!
//! # Features
//!
//! - **Status polling**: `now playing` and DJ identity fetched periodically
//!   ([`StatusClient`], [`spawn_status_poller`])
//! - **Session state machine**: one recording per continuous DJ appearance
//!   ([`transition`])
//! - **Reconnecting stream copy**: network drops never end a session
//!   ([`CopyLoop`])
//! - **In-band metadata**: optional `StreamTitle` decoding ([`IcyDecoder`])
//! - **Cue sheets**: `MM:SS:FF` offsets at 75 frames per second ([`CueWriter`])
//! - **Hooks**: an external script notified with `record <dj>` and `done`
//!   ([`ScriptNotifier`])
//!
//! # Example
//!
//! ```no_run
//! use djrecorder::{
//!     notifier_for, spawn_status_poller, Recorder, RecorderSettings, StatusClient,
//!     StreamClient,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = RecorderSettings::default();
//!     let status = Arc::new(
//!         StatusClient::builder()
//!             .url(&settings.status_url)
//!             .idle_dj(&settings.idle_dj)
//!             .build()
//!             .await?,
//!     );
//!     let stream = Arc::new(StreamClient::new(&settings.stream_url)?);
//!
//!     let cancel = CancellationToken::new();
//!     let (mut statuses, _poller) =
//!         spawn_status_poller(status, settings.poll_interval, cancel.clone());
//!
//!     let notifier = notifier_for(settings.hook.clone());
//!     let mut recorder = Recorder::new(settings, stream, notifier);
//!     recorder.run(&mut statuses, cancel).await?;
//!     Ok(())
//! }
//! ```

pub mod config_ext;
pub mod copier;
pub mod cue;
pub mod error;
pub mod hook;
pub mod icy;
pub mod machine;
pub mod models;
pub mod recorder;
pub mod status;
pub mod stream;

pub use config_ext::RecorderConfigExt;
pub use copier::{CopyLoop, CopyOutcome, SharedCue, TitleSink};
pub use cue::{CueTime, CueTrackEntry, CueWriter, FRAMES_PER_SECOND};
pub use error::{Error, Result};
pub use hook::{notifier_for, HookEvent, LogNotifier, Notifier, ScriptNotifier};
pub use icy::{parse_stream_title, IcyDecoder, IcyEvent, MetadataError};
pub use machine::{transition, Effect, State};
pub use models::{is_live, Status, StatusResponse};
pub use recorder::{session_basename, MetadataSource, Recorder, RecorderSettings};
pub use status::{spawn_status_poller, StatusClient, StatusClientBuilder, StatusSource};
pub use stream::{parse_metaint, AudioStream, StreamClient, StreamSource};
