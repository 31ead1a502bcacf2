//! Destinations for streamed frames.

use async_trait::async_trait;
use codebox_protocol::StreamFrame;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::{ExecError, Result};

/// Receives frames in the order they are produced.
///
/// The relay awaits each `send` before reading more output, so a slow sink
/// slows the run down instead of buffering without bound.
#[async_trait]
pub trait OutputSink: Send {
    async fn send(&mut self, frame: StreamFrame) -> Result<()>;
}

#[async_trait]
impl OutputSink for mpsc::Sender<StreamFrame> {
    async fn send(&mut self, frame: StreamFrame) -> Result<()> {
        mpsc::Sender::send(self, frame)
            .await
            .map_err(|_| ExecError::SinkClosed)
    }
}

#[async_trait]
impl OutputSink for Vec<StreamFrame> {
    async fn send(&mut self, frame: StreamFrame) -> Result<()> {
        self.push(frame);
        Ok(())
    }
}

/// Writes each frame as one JSON line.
#[derive(Debug)]
pub struct FrameWriter<W> {
    writer: W,
}

impl<W> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W> OutputSink for FrameWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, frame: StreamFrame) -> Result<()> {
        let line = frame.to_line()?;
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}
