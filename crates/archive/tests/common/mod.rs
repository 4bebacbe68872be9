#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use coffer_storage::{ByteStream, ObjectStore, StorageError, StorageResult};
use std::collections::HashMap;
use std::io::Cursor;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

/// What a key yields when opened.
#[derive(Clone)]
pub enum Script {
    Chunks(Vec<Bytes>),
    /// Yields the chunks, then a read error.
    FailAfter(Vec<Bytes>, &'static str),
    Unavailable(&'static str),
}

/// Read-only store with scripted objects. Tracks how many opened streams are
/// still alive so tests can check that the orchestrator releases them.
#[derive(Default)]
pub struct ScriptedStore {
    objects: HashMap<String, Script>,
    pub opened: Arc<AtomicUsize>,
    pub live: Arc<AtomicUsize>,
}

impl ScriptedStore {
    pub fn with(mut self, key: &str, script: Script) -> Self {
        self.objects.insert(key.to_string(), script);
        self
    }

    pub fn with_bytes(self, key: &str, data: &'static [u8]) -> Self {
        self.with(key, Script::Chunks(vec![Bytes::from_static(data)]))
    }
}

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for ScriptedStore {
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let script = self
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        let (chunks, failure) = match script {
            Script::Chunks(chunks) => (chunks, None),
            Script::FailAfter(chunks, msg) => (chunks, Some(msg)),
            Script::Unavailable(msg) => {
                return Err(StorageError::Io(std::io::Error::other(msg)));
            }
        };

        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        let guard = LiveGuard(self.live.clone());

        Ok(Box::pin(async_stream::stream! {
            let _guard = guard;
            for chunk in chunks {
                yield Ok(chunk);
            }
            if let Some(msg) = failure {
                yield Err(StorageError::Io(std::io::Error::other(msg)));
            }
        }))
    }

    async fn put(&self, _key: &str, _data: Bytes) -> StorageResult<()> {
        Err(StorageError::InvalidKey("scripted store is read-only".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

/// Sink that accepts `capacity` bytes and then fails every write, like a
/// response body whose client went away.
pub struct FailingSink {
    pub data: Vec<u8>,
    capacity: usize,
}

impl FailingSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::new(),
            capacity,
        }
    }
}

impl AsyncWrite for FailingSink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let room = self.capacity - self.data.len();
        if room == 0 {
            return Poll::Ready(Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe)));
        }
        let n = buf.len().min(room);
        self.data.extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Read every entry back with the `zip` crate: (name, contents) in order.
pub fn read_entries(archive: &[u8]) -> Vec<(String, Vec<u8>)> {
    use std::io::Read;

    let mut zip = zip::ZipArchive::new(Cursor::new(archive)).expect("valid zip archive");
    (0..zip.len())
        .map(|i| {
            let mut file = zip.by_index(i).expect("entry readable");
            let mut contents = Vec::new();
            file.read_to_end(&mut contents).expect("entry contents readable");
            (file.name().to_string(), contents)
        })
        .collect()
}

pub fn u16_at(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

pub fn u32_at(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}
