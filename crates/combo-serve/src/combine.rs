//! File combination.
//!
//! Combining happens in two phases. [`Combination::open`] stats every file
//! and yields a [`StatsBundle`] so headers can be computed before any body
//! byte is sent. [`Combination::into_stream`] then produces the
//! concatenated content as a pull-based stream that opens files lazily and
//! buffers at most one chunk.

use crate::error::StreamError;
use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Instant, SystemTime};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Default read chunk size (64KB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Size and modification time of one combined file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    /// File path
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub mtime: SystemTime,
}

impl FileStat {
    async fn load(path: &Path) -> Result<Self, StreamError> {
        let open_failed = |source| StreamError::Open {
            path: path.to_path_buf(),
            source,
        };

        let metadata = tokio::fs::metadata(path).await.map_err(open_failed)?;
        let mtime = metadata.modified().map_err(open_failed)?;

        Ok(Self {
            path: path.to_path_buf(),
            size: metadata.len(),
            mtime,
        })
    }
}

/// Stats for every file of a combination, in combination order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsBundle {
    /// One entry per file
    pub stats: Vec<FileStat>,
}

impl StatsBundle {
    /// Sum of all file sizes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.stats.iter().map(|stat| stat.size).sum()
    }

    /// The most recently modified file; the first one wins on ties.
    #[must_use]
    pub fn last_modified(&self) -> Option<&FileStat> {
        self.stats
            .iter()
            .reduce(|latest, stat| if stat.mtime > latest.mtime { stat } else { latest })
    }
}

/// A combination whose stats are known and whose content is not yet read.
#[derive(Debug)]
pub struct Combination {
    stats: StatsBundle,
    chunk_size: usize,
}

impl Combination {
    /// Stat every file in `files`.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Empty` for an empty list and
    /// `StreamError::Open` if any file cannot be stat'ed.
    pub async fn open(files: &[PathBuf], chunk_size: usize) -> Result<Self, StreamError> {
        if files.is_empty() {
            return Err(StreamError::Empty);
        }

        let stats = futures::future::try_join_all(files.iter().map(|path| FileStat::load(path)))
            .await?;

        Ok(Self {
            stats: StatsBundle { stats },
            chunk_size: chunk_size.max(1),
        })
    }

    /// Stats gathered by [`Combination::open`].
    #[must_use]
    pub const fn stats(&self) -> &StatsBundle {
        &self.stats
    }

    /// Start streaming the concatenated content.
    #[must_use]
    pub fn into_stream(self) -> ComboStream {
        let state = ReadState {
            pending: self.stats.stats.into(),
            current: None,
            chunk_size: self.chunk_size,
            sent: 0,
            started_at: Instant::now(),
        };

        ComboStream {
            inner: stream::try_unfold(state, ReadState::next_chunk).boxed(),
        }
    }
}

struct OpenFile {
    file: File,
    path: PathBuf,
    expected: u64,
    remaining: u64,
}

struct ReadState {
    pending: VecDeque<FileStat>,
    current: Option<OpenFile>,
    chunk_size: usize,
    sent: u64,
    started_at: Instant,
}

impl ReadState {
    async fn next_chunk(mut self) -> Result<Option<(Bytes, Self)>, StreamError> {
        loop {
            let Some(open) = self.current.as_mut() else {
                let Some(stat) = self.pending.pop_front() else {
                    tracing::debug!(
                        "Combo sent {} bytes in {}ms",
                        self.sent,
                        self.started_at.elapsed().as_millis()
                    );
                    return Ok(None);
                };
                self.current = Some(Self::open(stat).await?);
                continue;
            };

            if open.remaining == 0 {
                self.current = None;
                continue;
            }

            let want = usize::try_from(open.remaining)
                .map_or(self.chunk_size, |remaining| remaining.min(self.chunk_size));
            let mut buf = vec![0u8; want];
            let read = open
                .file
                .read(&mut buf)
                .await
                .map_err(|source| StreamError::Read {
                    path: open.path.clone(),
                    source,
                })?;

            if read == 0 {
                return Err(StreamError::Truncated {
                    path: open.path.clone(),
                    expected: open.expected,
                    actual: open.expected - open.remaining,
                });
            }

            buf.truncate(read);
            open.remaining -= read as u64;
            self.sent += read as u64;
            return Ok(Some((Bytes::from(buf), self)));
        }
    }

    async fn open(stat: FileStat) -> Result<OpenFile, StreamError> {
        tracing::trace!("Opening {:?}", stat.path);
        let file = File::open(&stat.path)
            .await
            .map_err(|source| StreamError::Open {
                path: stat.path.clone(),
                source,
            })?;

        Ok(OpenFile {
            file,
            path: stat.path,
            expected: stat.size,
            remaining: stat.size,
        })
    }
}

/// Concatenated file content. Dropping the stream closes the open file
/// and stops any further reads.
pub struct ComboStream {
    inner: BoxStream<'static, Result<Bytes, StreamError>>,
}

impl std::fmt::Debug for ComboStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComboStream").finish_non_exhaustive()
    }
}

impl Stream for ComboStream {
    type Item = Result<Bytes, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// Stat `files` and stream their concatenation.
///
/// # Errors
///
/// Returns `StreamError` if stats cannot be gathered.
pub async fn combine(
    files: &[PathBuf],
    chunk_size: usize,
) -> Result<(StatsBundle, ComboStream), StreamError> {
    let combination = Combination::open(files, chunk_size).await?;
    let stats = combination.stats().clone();
    Ok((stats, combination.into_stream()))
}
