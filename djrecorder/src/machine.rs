//! Session state machine
//!
//! [`transition`] is a pure function from the current [`State`] and one
//! polled [`Status`] to the next state plus the [`Effect`]s the recorder
//! must carry out, in order. It performs no I/O, so every wait/record
//! decision can be checked without a network or a disk.

use crate::hook::HookEvent;
use crate::models::Status;

/// Recorder state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum State {
    /// Nobody is live, nothing is being recorded
    #[default]
    Waiting,
    /// A session is being recorded for `dj`; `track` is the last polled title
    Recording { dj: String, track: String },
}

impl State {
    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording { .. })
    }

    /// DJ of the running session
    pub fn dj(&self) -> Option<&str> {
        match self {
            Self::Recording { dj, .. } => Some(dj),
            Self::Waiting => None,
        }
    }
}

/// Side effect requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Open the stream and output files for a new session
    StartSession { dj: String, track: String },
    /// Tear the running session down
    StopSession,
    /// Add a cue entry at the current offset
    AppendTrack { title: String },
    /// Fire the hook notifier
    Notify(HookEvent),
}

/// Compute the next state for one status
///
/// - `Waiting` + live status: start a session.
/// - `Recording` + other DJ or not live: stop the session, then either start
///   one for the new DJ right away or go back to `Waiting` and notify `done`.
/// - `Recording` + same DJ, new title: append a track.
/// - anything else: no-op.
///
/// An explicit "not live" ends the session even when the DJ name did not
/// change.
pub fn transition(state: State, status: &Status) -> (State, Vec<Effect>) {
    match state {
        State::Waiting if status.live => start(Vec::new(), status),
        State::Waiting => (State::Waiting, Vec::new()),
        State::Recording { dj, .. } if dj != status.dj || !status.live => {
            let effects = vec![Effect::StopSession];
            if status.live {
                start(effects, status)
            } else {
                let mut effects = effects;
                effects.push(Effect::Notify(HookEvent::Done));
                (State::Waiting, effects)
            }
        }
        State::Recording { dj, track } if track != status.now_playing => (
            State::Recording {
                dj,
                track: status.now_playing.clone(),
            },
            vec![Effect::AppendTrack {
                title: status.now_playing.clone(),
            }],
        ),
        recording => (recording, Vec::new()),
    }
}

fn start(mut effects: Vec<Effect>, status: &Status) -> (State, Vec<Effect>) {
    effects.push(Effect::Notify(HookEvent::Record {
        dj: status.dj.clone(),
    }));
    effects.push(Effect::StartSession {
        dj: status.dj.clone(),
        track: status.now_playing.clone(),
    });

    (
        State::Recording {
            dj: status.dj.clone(),
            track: status.now_playing.clone(),
        },
        effects,
    )
}
