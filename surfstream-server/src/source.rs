//! Replays raw frames from a file.
//!
//! The file is a plain concatenation of `width * height` byte frames.
//! A trailing partial frame is ignored.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};

use surfstream_core::error::StreamError;
use surfstream_core::frame::{Frame, FrameDimensions};
use surfstream_core::source::FrameSource;

/// [`FrameSource`] backed by a raw frame file.
pub struct RawFileSource {
    path: PathBuf,
    file: File,
    dimensions: FrameDimensions,
    looping: bool,
    frames_read: u64,
}

impl RawFileSource {
    pub async fn open(
        path: &Path,
        dimensions: FrameDimensions,
        looping: bool,
    ) -> Result<Self, StreamError> {
        let file = File::open(path).await?;
        let len = file.metadata().await?.len();
        let frame_len = dimensions.byte_len() as u64;
        if len < frame_len {
            return Err(StreamError::FrameSize {
                expected: dimensions.byte_len(),
                actual: len as usize,
            });
        }
        info!(
            path = %path.display(),
            frames = len / frame_len,
            looping,
            "raw frame file opened"
        );
        Ok(Self {
            path: path.to_path_buf(),
            file,
            dimensions,
            looping,
            frames_read: 0,
        })
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Fill `buf` completely, or report `false` at end of file.
    async fn read_frame(&mut self, buf: &mut [u8]) -> Result<bool, StreamError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Ok(false);
            }
            filled += n;
        }
        Ok(true)
    }
}

#[async_trait]
impl FrameSource for RawFileSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>, StreamError> {
        let mut buf = vec![0u8; self.dimensions.byte_len()];
        if !self.read_frame(&mut buf).await? {
            if !self.looping {
                debug!(path = %self.path.display(), "raw frame file finished");
                return Ok(None);
            }
            self.file.seek(SeekFrom::Start(0)).await?;
            if !self.read_frame(&mut buf).await? {
                return Ok(None);
            }
        }
        self.frames_read += 1;
        Frame::new(self.dimensions, buf).map(Some)
    }
}
