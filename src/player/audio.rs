// ==========================================
// AUDIO PLAYBACK ENGINE
// ==========================================
// rodio-backed implementation of the PlaybackEngine contract.
//
// Each load() gets its own Sink:
// - a fetch task streams the track from the StreamProvider into a growing
//   buffer and appends a decoder reading from that buffer to the sink
// - a monitor task polls the sink and reports Playing (first time audio is
//   queued and unpaused) and Ended (sink drained after that)
//
// The sink starts paused, so nothing is heard until play() is called.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rodio::decoder::DecoderError;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::player::buffer::{self, BufferReader};
use crate::player::engine::{EngineFactory, PlaybackEngine};
use crate::player::events::{EngineEvent, EngineEvents, EngineState};
use crate::youtube::StreamProvider;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

// ==========================================
// ENGINE FACTORY
// ==========================================
// Opens the default output device once. Every engine instance shares the
// device handle and gets fresh sinks from it.
pub struct AudioEngineFactory {
    handle: OutputStreamHandle,
    provider: Arc<dyn StreamProvider>,
}

impl AudioEngineFactory {
    pub fn new(provider: Arc<dyn StreamProvider>) -> Result<Self> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| Error::AudioOutput(e.to_string()))?;

        // OutputStream is !Send and must outlive every sink; keep it for the
        // whole program
        std::mem::forget(stream);

        Ok(AudioEngineFactory { handle, provider })
    }
}

impl EngineFactory for AudioEngineFactory {
    fn create(&mut self, video_id: &str, events: EngineEvents) -> Result<Box<dyn PlaybackEngine>> {
        let mut engine = AudioEngine::new(self.handle.clone(), self.provider.clone(), events.clone());
        engine.load(video_id, events.clone())?;
        events.emit(EngineEvent::Ready);
        Ok(Box::new(engine))
    }
}

// ==========================================
// AUDIO ENGINE STRUCT
// ==========================================
// events: EngineEvents
//   - Reporting handle of the current load; replaced by every load()
//
// sink: Option<Arc<Sink>>
//   - The sink for the currently loaded track, None before the first load
//     and after stop()
//   - Shared with the fetch and monitor tasks
//
// fetch / monitor: Option<JoinHandle<()>>
//   - Background tasks for the current sink; aborted whenever the sink is
//     replaced or the engine is destroyed
//
// started: Arc<AtomicBool>
//   - Set by the monitor once it has reported Playing for this load
//
// paused: bool
//   - pause() was called and play() has not been called since
//
// destroyed: bool
//   - Set by destroy(); every command after that fails
pub struct AudioEngine {
    handle: OutputStreamHandle,
    provider: Arc<dyn StreamProvider>,
    events: EngineEvents,
    sink: Option<Arc<Sink>>,
    fetch: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
    started: Arc<AtomicBool>,
    paused: bool,
    destroyed: bool,
}

impl AudioEngine {
    fn new(handle: OutputStreamHandle, provider: Arc<dyn StreamProvider>, events: EngineEvents) -> Self {
        AudioEngine {
            handle,
            provider,
            events,
            sink: None,
            fetch: None,
            monitor: None,
            started: Arc::new(AtomicBool::new(false)),
            paused: false,
            destroyed: false,
        }
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.destroyed {
            Err(Error::EngineDestroyed(self.events.instance()))
        } else {
            Ok(())
        }
    }

    // Aborts the background tasks and silences the current sink
    fn release_sink(&mut self) {
        if let Some(task) = self.fetch.take() {
            task.abort();
        }
        if let Some(task) = self.monitor.take() {
            task.abort();
        }
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }
}

impl PlaybackEngine for AudioEngine {
    fn load(&mut self, video_id: &str, events: EngineEvents) -> Result<()> {
        self.ensure_usable()?;
        self.release_sink();

        let sink = Sink::try_new(&self.handle).map_err(|e| Error::AudioOutput(e.to_string()))?;
        sink.pause();
        let sink = Arc::new(sink);

        self.events = events;
        self.started = Arc::new(AtomicBool::new(false));
        self.paused = false;

        debug!(
            instance = self.events.instance(),
            load = self.events.load(),
            video_id,
            "Loading track"
        );
        self.fetch = Some(tokio::spawn(fetch_track(
            self.provider.clone(),
            video_id.to_string(),
            sink.clone(),
            self.events.clone(),
        )));
        self.monitor = Some(tokio::spawn(watch_sink(
            sink.clone(),
            self.events.clone(),
            self.started.clone(),
        )));
        self.sink = Some(sink);

        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.ensure_usable()?;
        if let Some(sink) = &self.sink {
            sink.play();
        }
        // Before audio first starts the monitor does the reporting
        if self.paused {
            self.paused = false;
            if self.started.load(Ordering::SeqCst) {
                self.events.emit(EngineEvent::StateChanged(EngineState::Playing));
            }
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.ensure_usable()?;
        if let Some(sink) = &self.sink {
            sink.pause();
            self.paused = true;
            self.events.emit(EngineEvent::StateChanged(EngineState::Paused));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.ensure_usable()?;
        self.release_sink();
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        self.ensure_usable()?;
        self.release_sink();
        self.destroyed = true;
        debug!(instance = self.events.instance(), "Engine destroyed");
        Ok(())
    }

    fn is_usable(&self) -> bool {
        !self.destroyed
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.release_sink();
    }
}

// Streams the track into the sink. Any failure is reported as an engine
// error.
async fn fetch_track(
    provider: Arc<dyn StreamProvider>,
    video_id: String,
    sink: Arc<Sink>,
    events: EngineEvents,
) {
    match stream_into_sink(provider.as_ref(), &video_id, &sink).await {
        Ok(size) => info!(instance = events.instance(), %video_id, bytes = size, "Track downloaded"),
        Err(e) => events.emit(EngineEvent::Error(e.to_string())),
    }
}

// Bytes go into a streaming buffer as they arrive while a blocking task
// detects the format from the front of it. The decoded source is appended as
// soon as detection succeeds, so playback starts with the first chunks and the
// decoder keeps reading from the buffer while the rest downloads.
async fn stream_into_sink(provider: &dyn StreamProvider, video_id: &str, sink: &Sink) -> Result<usize> {
    let mut stream = provider.open(video_id).await?;

    let (writer, reader) = buffer::channel();
    let mut detect = tokio::task::spawn_blocking(move || Decoder::new(reader));
    let mut detecting = true;

    loop {
        tokio::select! {
            decoded = &mut detect, if detecting => {
                detecting = false;
                sink.append(into_source(decoded)?);
                debug!(video_id, buffered = writer.len(), "Audio ready, playback can start");
            }
            chunk = stream.next() => match chunk {
                Some(Ok(bytes)) => writer.write(&bytes),
                Some(Err(e)) => {
                    writer.fail(e.to_string());
                    return Err(e.into());
                }
                None => {
                    writer.finish();
                    break;
                }
            },
        }
    }

    if detecting {
        sink.append(into_source(detect.await)?);
    }

    Ok(writer.len())
}

fn into_source(
    decoded: std::result::Result<std::result::Result<Decoder<BufferReader>, DecoderError>, JoinError>,
) -> Result<Decoder<BufferReader>> {
    decoded
        .map_err(|e| Error::Decode(format!("Task join error: {}", e)))?
        .map_err(|e| Error::Decode(e.to_string()))
}

// Reports Playing the first time the sink has audio and is unpaused, then
// Ended once it drains.
async fn watch_sink(sink: Arc<Sink>, events: EngineEvents, started: Arc<AtomicBool>) {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);

    loop {
        ticker.tick().await;

        if !started.load(Ordering::SeqCst) {
            if !sink.empty() && !sink.is_paused() {
                started.store(true, Ordering::SeqCst);
                events.emit(EngineEvent::StateChanged(EngineState::Playing));
            }
        } else if sink.empty() {
            events.emit(EngineEvent::StateChanged(EngineState::Ended));
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::player::events::{self, Event};
    use crate::player::watchdog::DEFAULT_TIMEOUT;
    use crate::youtube::AudioStream;

    const CHUNK_DELAY: Duration = Duration::from_millis(400);

    struct FailingProvider;

    #[async_trait]
    impl StreamProvider for FailingProvider {
        async fn open(&self, _video_id: &str) -> Result<AudioStream> {
            Err(Error::Stream("upstream down".to_string()))
        }
    }

    struct GarbageProvider;

    #[async_trait]
    impl StreamProvider for GarbageProvider {
        async fn open(&self, _video_id: &str) -> Result<AudioStream> {
            let chunks: Vec<std::io::Result<Bytes>> = vec![Ok(Bytes::from_static(b"definitely not audio"))];
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    // A valid track that trickles in: ten chunks, 400 ms apart
    struct SlowWavProvider;

    #[async_trait]
    impl StreamProvider for SlowWavProvider {
        async fn open(&self, _video_id: &str) -> Result<AudioStream> {
            let wav = silent_wav(30);
            let chunks: Vec<Bytes> = wav.chunks(wav.len() / 10).map(Bytes::copy_from_slice).collect();

            Ok(Box::pin(async_stream::stream! {
                for (i, chunk) in chunks.into_iter().enumerate() {
                    if i > 0 {
                        tokio::time::sleep(CHUNK_DELAY).await;
                    }
                    yield Ok::<Bytes, io::Error>(chunk);
                }
            }))
        }
    }

    // 8 kHz mono 16-bit PCM
    fn silent_wav(seconds: u32) -> Vec<u8> {
        let data_len = seconds * 8_000 * 2;
        let mut wav = Vec::with_capacity(44 + data_len as usize);
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(36 + data_len).to_le_bytes());
        wav.extend_from_slice(b"WAVEfmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes());
        wav.extend_from_slice(&8_000u32.to_le_bytes());
        wav.extend_from_slice(&16_000u32.to_le_bytes());
        wav.extend_from_slice(&2u16.to_le_bytes());
        wav.extend_from_slice(&16u16.to_le_bytes());
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&data_len.to_le_bytes());
        wav.resize(44 + data_len as usize, 0);
        wav
    }

    // Sink::new_idle() gives a sink that needs no output device
    async fn run_fetch(provider: Arc<dyn StreamProvider>) -> Option<Event> {
        let (tx, mut rx) = events::channel();
        let (sink, _output) = Sink::new_idle();
        fetch_track(provider, "abc".to_string(), Arc::new(sink), EngineEvents::new(7, 1, tx)).await;
        rx.try_recv().ok()
    }

    #[tokio::test]
    async fn fetch_failure_reports_engine_error() {
        let event = run_fetch(Arc::new(FailingProvider)).await;
        assert!(matches!(
            event,
            Some(Event::Engine { instance: 7, load: 1, event: EngineEvent::Error(_) })
        ));
    }

    #[tokio::test]
    async fn undecodable_audio_reports_engine_error() {
        let event = run_fetch(Arc::new(GarbageProvider)).await;
        match event {
            Some(Event::Engine { event: EngineEvent::Error(message), .. }) => {
                assert!(message.contains("decode"), "unexpected message: {message}");
            }
            other => panic!("expected engine error, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn playing_is_reported_before_download_finishes() {
        let (tx, mut rx) = events::channel();
        let (sink, _output) = Sink::new_idle();
        let sink = Arc::new(sink);
        sink.play();
        let events = EngineEvents::new(1, 1, tx);

        let started = tokio::time::Instant::now();
        let fetch = tokio::spawn(fetch_track(
            Arc::new(SlowWavProvider),
            "abc".to_string(),
            sink.clone(),
            events.clone(),
        ));
        let monitor = tokio::spawn(watch_sink(sink.clone(), events, Arc::new(AtomicBool::new(false))));

        let event = rx.recv().await.unwrap();
        let waited = started.elapsed();

        assert_eq!(
            event,
            Event::Engine {
                instance: 1,
                load: 1,
                event: EngineEvent::StateChanged(EngineState::Playing),
            }
        );
        assert!(waited < DEFAULT_TIMEOUT, "playing reported after {:?}", waited);
        assert!(!fetch.is_finished());

        fetch.abort();
        monitor.abort();
    }
}
