//! Stream reconnect loop
//!
//! For the lifetime of one session, [`CopyLoop`] keeps audio flowing from
//! the stream source into the session's audio file: it copies the current
//! connection until it ends or fails, then opens a fresh one, until the
//! session's cancellation token fires.
//!
//! Cancellation is checked before every connection attempt and raced,
//! with priority, against every read. A chunk already handed to the
//! audio sink when the token fires is still written in full; nothing is
//! read after that.

use crate::cue::CueWriter;
use crate::error::{Error, Result};
use crate::icy::{IcyDecoder, IcyEvent};
use crate::stream::{AudioStream, StreamSource};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Cue sheet shared between the copy task and the recorder
///
/// `None` once the recorder has closed it.
pub type SharedCue<C> = Arc<Mutex<Option<CueWriter<C>>>>;

/// Writes in-band titles to the session's cue sheet
pub struct TitleSink<C> {
    cue: SharedCue<C>,
    start: Instant,
    last_title: Option<String>,
}

impl<C: AsyncWrite + Unpin> TitleSink<C> {
    pub fn new(cue: SharedCue<C>, start: Instant) -> Self {
        Self {
            cue,
            start,
            last_title: None,
        }
    }

    /// Append a cue entry unless the title is empty or repeats the previous one
    pub async fn announce(&mut self, title: String) {
        if title.is_empty() {
            tracing::debug!("Skipping empty stream title");
            return;
        }
        if self.last_title.as_deref() == Some(title.as_str()) {
            return;
        }

        let elapsed = self.start.elapsed();
        let mut guard = self.cue.lock().await;
        let Some(cue) = guard.as_mut() else {
            return;
        };

        match cue.write_track(&title, elapsed).await {
            Ok(entry) => {
                tracing::debug!(index = entry.index, offset = %entry.offset, "Track: {}", title);
                self.last_title = Some(title);
            }
            Err(e) => tracing::warn!("Cannot write cue entry for {:?}: {}", title, e),
        }
    }
}

/// Why the copy of one connection stopped
#[derive(Debug)]
enum CopyEnd {
    Cancelled,
    Ended,
    Failed(Error),
}

/// What the loop hands back to the recorder once cancelled
#[derive(Debug)]
pub struct CopyOutcome<A> {
    /// The audio sink, still open
    pub audio: A,
    /// The connection that was live when cancellation fired
    pub stream: Option<AudioStream>,
    pub bytes_written: u64,
    /// Successful stream acquisitions, the first one included
    pub connections: u32,
}

/// Reconnecting copy of the live stream into one audio sink
pub struct CopyLoop<A, C> {
    source: Arc<dyn StreamSource>,
    audio: A,
    titles: Option<TitleSink<C>>,
    reconnect_delay: Duration,
    cancel: CancellationToken,
    bytes_written: u64,
    connections: u32,
}

impl<A, C> CopyLoop<A, C>
where
    A: AsyncWrite + Unpin + Send,
    C: AsyncWrite + Unpin + Send,
{
    /// `titles` selects the in-band mode: metadata is requested on every
    /// reconnect and decoded titles go to the cue sheet.
    pub fn new(
        source: Arc<dyn StreamSource>,
        audio: A,
        titles: Option<TitleSink<C>>,
        reconnect_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            audio,
            titles,
            reconnect_delay,
            cancel,
            bytes_written: 0,
            connections: 0,
        }
    }

    /// Copy `first`, then reconnect as needed until cancelled
    pub async fn run(mut self, first: AudioStream) -> CopyOutcome<A> {
        let request_metadata = self.titles.is_some();
        let mut next = Some(first);
        self.connections = 1;

        let live = loop {
            let stream = match next.take() {
                Some(stream) => stream,
                None => {
                    if self.cancel.is_cancelled() {
                        break None;
                    }

                    let opened = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => break None,
                        opened = self.source.open(request_metadata) => opened,
                    };

                    match opened {
                        Ok(stream) => {
                            self.connections += 1;
                            tracing::info!(connection = self.connections, "Stream reconnected");
                            stream
                        }
                        Err(e) => {
                            tracing::warn!("Stream reconnection failed: {}", e);
                            if !self.pause().await {
                                break None;
                            }
                            continue;
                        }
                    }
                }
            };

            let (end, stream) = self.copy(stream).await;
            match end {
                CopyEnd::Cancelled => break Some(stream),
                CopyEnd::Ended => tracing::warn!("Stream ended, reconnecting"),
                CopyEnd::Failed(e) => tracing::warn!("Stream interrupted, reconnecting: {}", e),
            }
            drop(stream);

            if !self.pause().await {
                break None;
            }
        };

        tracing::debug!(
            bytes = self.bytes_written,
            connections = self.connections,
            "Copy loop stopped"
        );

        CopyOutcome {
            audio: self.audio,
            stream: live,
            bytes_written: self.bytes_written,
            connections: self.connections,
        }
    }

    /// Wait before the next attempt; false when cancelled meanwhile
    async fn pause(&self) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.reconnect_delay) => true,
        }
    }

    async fn copy(&mut self, mut stream: AudioStream) -> (CopyEnd, AudioStream) {
        let mut decoder = match (&self.titles, stream.metaint()) {
            (Some(_), Some(metaint)) => Some(IcyDecoder::new(metaint)),
            (Some(_), None) => {
                tracing::warn!("Server did not grant in-band metadata, copying plain audio");
                None
            }
            (None, _) => None,
        };

        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return (CopyEnd::Cancelled, stream),
                chunk = stream.next_chunk() => chunk,
            };

            let bytes = match chunk {
                None => return (CopyEnd::Ended, stream),
                Some(Err(e)) => return (CopyEnd::Failed(e), stream),
                Some(Ok(bytes)) => bytes,
            };

            let written = match decoder.as_mut() {
                None => self.write_audio(&bytes).await,
                Some(decoder) => self.forward(decoder.decode(&bytes)).await,
            };

            if let Err(e) = written {
                return (CopyEnd::Failed(e), stream);
            }
        }
    }

    async fn forward(&mut self, events: Vec<IcyEvent>) -> Result<()> {
        for event in events {
            match event {
                IcyEvent::Audio(bytes) => self.write_audio(&bytes).await?,
                IcyEvent::Title(title) => {
                    if let Some(titles) = self.titles.as_mut() {
                        titles.announce(title).await;
                    }
                }
            }
        }
        Ok(())
    }

    async fn write_audio(&mut self, bytes: &Bytes) -> Result<()> {
        self.audio.write_all(bytes).await?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Serves short streams of `chunk` then ends each connection
    struct CountingSource {
        opens: AtomicU32,
        chunk: &'static [u8],
        fail: bool,
    }

    #[async_trait]
    impl StreamSource for CountingSource {
        async fn open(&self, _request_metadata: bool) -> Result<AudioStream> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Stream("HTTP 503".into()));
            }
            Ok(AudioStream::from_chunks(
                None,
                vec![Bytes::from_static(self.chunk)],
            ))
        }
    }

    /// A connection that never yields and never ends
    fn stalled() -> AudioStream {
        AudioStream::new(None, futures::stream::pending())
    }

    #[tokio::test]
    async fn test_reconnects_after_stream_end() {
        let source = Arc::new(CountingSource {
            opens: AtomicU32::new(0),
            chunk: b"abc",
            fail: false,
        });
        let cancel = CancellationToken::new();
        let copy: CopyLoop<Vec<u8>, Vec<u8>> = CopyLoop::new(
            source.clone(),
            Vec::new(),
            None,
            Duration::from_millis(1),
            cancel.clone(),
        );
        let task = tokio::spawn(copy.run(AudioStream::from_chunks(
            None,
            vec![Bytes::from_static(b"first")],
        )));

        while source.opens.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        cancel.cancel();
        let outcome = task.await.unwrap();

        assert!(outcome.audio.starts_with(b"firstabcabc"));
        assert_eq!(outcome.bytes_written, outcome.audio.len() as u64);
        assert!(outcome.connections >= 3);
    }

    #[tokio::test]
    async fn test_no_acquisition_after_cancellation() {
        let source = Arc::new(CountingSource {
            opens: AtomicU32::new(0),
            chunk: b"",
            fail: true,
        });
        let cancel = CancellationToken::new();
        let copy: CopyLoop<Vec<u8>, Vec<u8>> = CopyLoop::new(
            source.clone(),
            Vec::new(),
            None,
            Duration::from_millis(1),
            cancel.clone(),
        );
        let task = tokio::spawn(copy.run(AudioStream::from_chunks(None, Vec::new())));

        while source.opens.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        cancel.cancel();
        let outcome = task.await.unwrap();
        let opens = source.opens.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(source.opens.load(Ordering::SeqCst), opens);
        assert!(outcome.stream.is_none());
        assert_eq!(outcome.connections, 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_stalled_stream() {
        let source = Arc::new(CountingSource {
            opens: AtomicU32::new(0),
            chunk: b"",
            fail: false,
        });
        let cancel = CancellationToken::new();
        let copy: CopyLoop<Vec<u8>, Vec<u8>> = CopyLoop::new(
            source.clone(),
            Vec::new(),
            None,
            Duration::from_millis(1),
            cancel.clone(),
        );
        let task = tokio::spawn(copy.run(stalled()));

        cancel.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("copy loop should stop promptly")
            .unwrap();

        // The live connection is handed back for the recorder to close
        assert!(outcome.stream.is_some());
        assert_eq!(source.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_in_band_titles_reach_the_cue_sheet() {
        let source = Arc::new(CountingSource {
            opens: AtomicU32::new(0),
            chunk: b"",
            fail: true,
        });

        let mut block = b"StreamTitle='One';".to_vec();
        block.resize(32, 0);

        let mut body = vec![1u8; 4];
        body.push(2);
        body.extend_from_slice(&block);
        body.extend_from_slice(&[2u8; 4]);
        // Same title again: no new entry
        body.push(2);
        body.extend_from_slice(&block);
        body.extend_from_slice(&[3u8; 4]);

        let cue = CueWriter::create(Vec::new(), "s.mp3").await.unwrap();
        let shared: SharedCue<Vec<u8>> = Arc::new(Mutex::new(Some(cue)));
        let titles = TitleSink::new(shared.clone(), Instant::now());

        let cancel = CancellationToken::new();
        let copy = CopyLoop::new(
            source,
            Vec::new(),
            Some(titles),
            Duration::from_millis(1),
            cancel.clone(),
        );
        let first = AudioStream::new(
            Some(4),
            futures::stream::iter(vec![Ok(Bytes::from(body))]).chain(futures::stream::pending()),
        );
        let task = tokio::spawn(copy.run(first));

        loop {
            if shared.lock().await.as_ref().unwrap().track_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        // Let the rest of the chunk through before stopping
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let outcome = task.await.unwrap();

        assert_eq!(outcome.audio, [[1u8; 4], [2u8; 4], [3u8; 4]].concat());

        let cue = shared.lock().await.take().unwrap();
        assert_eq!(cue.track_count(), 1);
        let text = String::from_utf8(cue.close().await.unwrap()).unwrap();
        assert!(text.contains("TRACK 01 AUDIO\n    TITLE \"One\"\n    INDEX 01 00:00:"));
    }
}
