//! Cue sheet writer
//!
//! A session's cue sheet lists the tracks played during the recording:
//!
//! ```text
//! FILE "2024-05-01T21:00:00+02:00-SomeDJ.mp3" MP3
//!   TRACK 01 AUDIO
//!     TITLE "Artist - First"
//!     INDEX 01 00:00:00
//!   TRACK 02 AUDIO
//!     TITLE "Artist - Second"
//!     INDEX 01 03:27:41
//! ```
//!
//! Offsets are `MM:SS:FF` with 75 frames per second, truncated from the
//! wall-clock time elapsed since the session started. They drift from the
//! real audio position whenever the stream stalls or reconnects.

use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Cue sheet sub-second unit
pub const FRAMES_PER_SECOND: u32 = 75;

/// A cue sheet offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct CueTime {
    pub minutes: u64,
    pub seconds: u8,
    pub frames: u8,
}

impl CueTime {
    /// Truncate an elapsed duration to whole minutes, seconds and frames
    pub fn from_elapsed(elapsed: Duration) -> Self {
        let secs = elapsed.as_secs();
        let frames = u64::from(elapsed.subsec_nanos()) * u64::from(FRAMES_PER_SECOND)
            / 1_000_000_000;

        Self {
            minutes: secs / 60,
            seconds: (secs % 60) as u8,
            frames: frames as u8,
        }
    }
}

impl fmt::Display for CueTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.minutes, self.seconds, self.frames
        )
    }
}

/// One track block of a cue sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueTrackEntry {
    /// 1-based, strictly increasing within a sheet
    pub index: u32,
    pub title: String,
    pub offset: CueTime,
}

/// Append-only cue sheet emitter
///
/// Every write is flushed so an interrupted process still leaves a valid
/// sheet covering the tracks announced so far.
#[derive(Debug)]
pub struct CueWriter<W> {
    sink: W,
    next_index: u32,
    last_offset: Duration,
}

impl<W: AsyncWrite + Unpin> CueWriter<W> {
    /// Start a sheet for `audio_file`, writing its `FILE` header line
    pub async fn create(mut sink: W, audio_file: &str) -> io::Result<Self> {
        let header = format!("FILE {:?} MP3\n", audio_file);
        sink.write_all(header.as_bytes()).await?;
        sink.flush().await?;

        Ok(Self {
            sink,
            next_index: 1,
            last_offset: Duration::ZERO,
        })
    }

    /// Append a track announced `elapsed` after the session start
    ///
    /// Offsets never go backwards: an `elapsed` earlier than the previous
    /// entry is clamped to it.
    pub async fn write_track(
        &mut self,
        title: &str,
        elapsed: Duration,
    ) -> io::Result<CueTrackEntry> {
        let elapsed = elapsed.max(self.last_offset);
        let entry = CueTrackEntry {
            index: self.next_index,
            title: title.to_string(),
            offset: CueTime::from_elapsed(elapsed),
        };

        let block = format!(
            "  TRACK {:02} AUDIO\n    TITLE {:?}\n    INDEX 01 {}\n",
            entry.index, entry.title, entry.offset
        );
        self.sink.write_all(block.as_bytes()).await?;
        self.sink.flush().await?;

        self.next_index += 1;
        self.last_offset = elapsed;
        Ok(entry)
    }

    /// Number of tracks written so far
    pub fn track_count(&self) -> u32 {
        self.next_index - 1
    }

    /// Flush and shut the sink down, handing it back
    pub async fn close(mut self) -> io::Result<W> {
        self.sink.flush().await?;
        self.sink.shutdown().await?;
        Ok(self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cue_time_truncates() {
        let time = CueTime::from_elapsed(Duration::from_millis(90_500));
        assert_eq!(
            time,
            CueTime {
                minutes: 1,
                seconds: 30,
                frames: 37
            }
        );
        assert_eq!(time.to_string(), "01:30:37");

        assert_eq!(CueTime::from_elapsed(Duration::ZERO).to_string(), "00:00:00");
        // 74.99 frames is still frame 74
        assert_eq!(
            CueTime::from_elapsed(Duration::from_nanos(59_999_999_999)).to_string(),
            "00:59:74"
        );
        assert_eq!(
            CueTime::from_elapsed(Duration::from_secs(3 * 3600 + 5)).to_string(),
            "180:05:00"
        );
    }

    #[tokio::test]
    async fn test_sheet_layout() {
        let mut cue = CueWriter::create(Vec::new(), "2024-01-01T20:00:00+00:00-A.mp3")
            .await
            .unwrap();

        let first = cue.write_track("X", Duration::ZERO).await.unwrap();
        let second = cue
            .write_track("Say \"hi\"", Duration::from_millis(90_500))
            .await
            .unwrap();

        assert_eq!(first.index, 1);
        assert_eq!(second.index, 2);
        assert_eq!(cue.track_count(), 2);

        let text = String::from_utf8(cue.close().await.unwrap()).unwrap();
        assert_eq!(
            text,
            "FILE \"2024-01-01T20:00:00+00:00-A.mp3\" MP3\n\
             \x20 TRACK 01 AUDIO\n\
             \x20   TITLE \"X\"\n\
             \x20   INDEX 01 00:00:00\n\
             \x20 TRACK 02 AUDIO\n\
             \x20   TITLE \"Say \\\"hi\\\"\"\n\
             \x20   INDEX 01 01:30:37\n"
        );
    }

    #[tokio::test]
    async fn test_offsets_never_decrease() {
        let mut cue = CueWriter::create(Vec::new(), "a.mp3").await.unwrap();

        let a = cue.write_track("a", Duration::from_secs(10)).await.unwrap();
        let b = cue.write_track("b", Duration::from_secs(4)).await.unwrap();
        let c = cue.write_track("c", Duration::from_secs(11)).await.unwrap();

        assert_eq!(b.offset, a.offset);
        assert!(c.offset > b.offset);
        assert_eq!(
            [a.index, b.index, c.index],
            [1, 2, 3],
            "indices are contiguous"
        );
    }
}
