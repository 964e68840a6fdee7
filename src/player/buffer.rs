// ==========================================
// STREAMING BUFFER
// ==========================================
// Read + Seek view over audio bytes that are still arriving.
//
// The fetch task owns the BufferWriter and appends chunks as the proxy
// sends them. The decoder owns a BufferReader; reads past the end of what
// has arrived block until more bytes come in or the writer is done, so
// decoding (and playback) can start with the first chunk.
//
// The total length is unknown until the writer finishes, so seeking
// relative to the end waits for the whole track.
//
// Dropping the writer without finish() (aborted fetch) ends the stream for
// readers; nothing is ever left blocked on a dead download.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Inner {
    data: Vec<u8>,
    finished: bool,
    error: Option<String>,
}

type Shared = Arc<(Mutex<Inner>, Condvar)>;

fn lock(shared: &Shared) -> MutexGuard<'_, Inner> {
    shared.0.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn channel() -> (BufferWriter, BufferReader) {
    let shared: Shared = Arc::new((Mutex::new(Inner::default()), Condvar::new()));
    (
        BufferWriter {
            shared: shared.clone(),
        },
        BufferReader { shared, pos: 0 },
    )
}

pub struct BufferWriter {
    shared: Shared,
}

impl BufferWriter {
    pub fn write(&self, bytes: &[u8]) {
        let mut inner = lock(&self.shared);
        inner.data.extend_from_slice(bytes);
        self.shared.1.notify_all();
    }

    pub fn finish(&self) {
        let mut inner = lock(&self.shared);
        inner.finished = true;
        self.shared.1.notify_all();
    }

    /// Readers get `message` as an io error once they reach the end of
    /// the bytes that did arrive.
    pub fn fail(&self, message: String) {
        let mut inner = lock(&self.shared);
        inner.error = Some(message);
        inner.finished = true;
        self.shared.1.notify_all();
    }

    pub fn len(&self) -> usize {
        lock(&self.shared).data.len()
    }
}

impl Drop for BufferWriter {
    fn drop(&mut self) {
        let mut inner = lock(&self.shared);
        if !inner.finished {
            inner.finished = true;
            inner.error = Some("download cancelled".to_string());
            self.shared.1.notify_all();
        }
    }
}

pub struct BufferReader {
    shared: Shared,
    pos: u64,
}

impl BufferReader {
    // Blocks until the writer is done, returning the final length
    fn wait_for_end(&self) -> io::Result<u64> {
        let (_, cvar) = &*self.shared;
        let mut inner = lock(&self.shared);
        while !inner.finished {
            inner = cvar.wait(inner).unwrap_or_else(PoisonError::into_inner);
        }
        match &inner.error {
            Some(message) => Err(io::Error::new(io::ErrorKind::Other, message.clone())),
            None => Ok(inner.data.len() as u64),
        }
    }
}

impl Read for BufferReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let (_, cvar) = &*self.shared;
        let mut inner = lock(&self.shared);

        loop {
            let available = inner.data.len() as u64;
            if self.pos < available {
                let start = self.pos as usize;
                let end = inner.data.len().min(start + buf.len());
                let n = end - start;
                buf[..n].copy_from_slice(&inner.data[start..end]);
                self.pos += n as u64;
                return Ok(n);
            }

            if inner.finished {
                return match &inner.error {
                    Some(message) => Err(io::Error::new(io::ErrorKind::Other, message.clone())),
                    None => Ok(0),
                };
            }

            inner = cvar.wait(inner).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Seek for BufferReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(offset) => self.pos.checked_add_signed(offset),
            SeekFrom::End(offset) => self.wait_for_end()?.checked_add_signed(offset),
        };

        match target {
            Some(target) => {
                self.pos = target;
                Ok(target)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative position",
            )),
        }
    }
}
