//! Random-access byte sources feeding the demuxer.
//!
//! [`ByteSource`] is the four-primitive capability the session needs. Every
//! seek request from the container parser is resolved through those primitives
//! by [`resolve_seek`]; [`SourceStream`] exposes the result to Symphonia as a
//! [`MediaSource`].

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use symphonia::core::io::MediaSource;

/// Random-access byte input.
pub trait ByteSource {
    /// Read up to `buf.len()` bytes at the current position and advance by the
    /// amount read. `Ok(0)` means end of data (or an empty `buf`).
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Current read position, `None` if unknown.
    fn position(&self) -> Option<i64>;

    /// Move the read position. Returns `false` (and leaves the position alone)
    /// if `position` is negative or past the end of the data.
    fn set_position(&mut self, position: i64) -> bool;

    /// Total size in bytes, `None` for unknown-length (streaming) sources.
    fn size(&self) -> Option<i64>;
}

/// Seek request as issued by a container parser.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Whence {
    /// Absolute offset from the beginning.
    Start(i64),
    /// Offset relative to the current position.
    Current(i64),
    /// Offset relative to the end; requires a known size.
    End(i64),
    /// Query the total size without moving.
    Size,
}

/// Resolve `whence` against `source`.
///
/// Returns the resulting absolute position (or the size for [`Whence::Size`]).
/// `None` if any primitive involved fails.
pub fn resolve_seek<S: ByteSource + ?Sized>(source: &mut S, whence: Whence) -> Option<i64> {
    let target = match whence {
        Whence::Size => return source.size(),
        Whence::Start(offset) => offset,
        Whence::Current(offset) => source.position()?.checked_add(offset)?,
        Whence::End(offset) => source.size()?.checked_add(offset)?,
    };

    if !source.set_position(target) {
        return None;
    }
    source.position()
}

/// In-memory source over an owned byte vector.
#[derive(Clone, Debug)]
pub struct MemorySource {
    data: Vec<u8>,
    position: i64,
    streaming: bool,
}

impl MemorySource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            position: 0,
            streaming: false,
        }
    }

    /// Source that reports an unknown size.
    ///
    /// Reads are still bounded by the bytes actually held, so a parser can
    /// consume everything but cannot seek relative to the end.
    pub fn streaming(data: impl Into<Vec<u8>>) -> Self {
        Self {
            streaming: true,
            ..Self::new(data)
        }
    }

    fn held(&self) -> i64 {
        self.data.len() as i64
    }
}

impl ByteSource for MemorySource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let start = self.position.clamp(0, self.held()) as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.position += n as i64;
        Ok(n)
    }

    fn position(&self) -> Option<i64> {
        Some(self.position)
    }

    fn set_position(&mut self, position: i64) -> bool {
        if position < 0 || position > self.held() {
            return false;
        }
        self.position = position;
        true
    }

    fn size(&self) -> Option<i64> {
        if self.streaming {
            None
        } else {
            Some(self.held())
        }
    }
}

/// File-backed source with a size captured at open time.
#[derive(Debug)]
pub struct FileSource {
    file: File,
    size: i64,
    position: i64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        Self::from_file(file)
    }

    pub fn from_file(file: File) -> io::Result<Self> {
        let size = i64::try_from(file.metadata()?.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "file too large"))?;
        Ok(Self {
            file,
            size,
            position: 0,
        })
    }
}

impl ByteSource for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = self.file.read(buf)?;
        self.position += n as i64;
        Ok(n)
    }

    fn position(&self) -> Option<i64> {
        Some(self.position)
    }

    fn set_position(&mut self, position: i64) -> bool {
        if position < 0 || position > self.size {
            return false;
        }
        match self.file.seek(SeekFrom::Start(position as u64)) {
            Ok(_) => {
                self.position = position;
                true
            }
            Err(e) => {
                tracing::warn!(position, error = %e, "file seek failed");
                false
            }
        }
    }

    fn size(&self) -> Option<i64> {
        Some(self.size)
    }
}

/// Adapts any [`ByteSource`] to the std I/O traits and Symphonia's [`MediaSource`].
pub struct SourceStream<S> {
    inner: S,
}

impl<S: ByteSource> SourceStream<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: ByteSource> Read for SourceStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<S: ByteSource> Seek for SourceStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let whence = match pos {
            SeekFrom::Start(offset) => Whence::Start(i64::try_from(offset).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, "seek offset overflow")
            })?),
            SeekFrom::Current(delta) => Whence::Current(delta),
            SeekFrom::End(delta) => Whence::End(delta),
        };

        match resolve_seek(&mut self.inner, whence) {
            Some(position) => Ok(position as u64),
            None => {
                tracing::debug!(?whence, "seek rejected by source");
                Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("seek {whence:?} failed"),
                ))
            }
        }
    }
}

impl<S: ByteSource + Send + Sync> MediaSource for SourceStream<S> {
    fn is_seekable(&self) -> bool {
        self.inner.size().is_some()
    }

    fn byte_len(&self) -> Option<u64> {
        self.inner.size().map(|size| size as u64)
    }
}
