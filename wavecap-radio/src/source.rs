//! Frame source abstraction
//!
//! A `FrameSource` is anything that can deliver bare 802.11 frames with
//! their channel and arrival time: a live monitor interface, a recorded
//! capture, or a canned list of frames in tests.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

use crate::{RadioError, Result, MAX_FRAME_SIZE};

/// A frame as delivered by a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    /// 802.11 frame, starting at the frame control field
    pub data: Bytes,
    /// Channel the frame was received on (0 when unknown)
    pub channel: u8,
    /// Arrival time, relative to the UNIX epoch for recorded captures
    pub timestamp: Duration,
    /// Signal strength in dBm, when the source reports it
    pub signal_dbm: Option<i8>,
}

impl CapturedFrame {
    /// Create a new frame, rejecting anything larger than `MAX_FRAME_SIZE`
    pub fn new(data: Bytes, channel: u8, timestamp: Duration) -> Result<Self> {
        if data.len() > MAX_FRAME_SIZE {
            return Err(RadioError::FrameTooLarge {
                size: data.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        Ok(Self {
            data,
            channel,
            timestamp,
            signal_dbm: None,
        })
    }

    /// Attach a signal strength reading
    pub fn with_signal(mut self, signal_dbm: Option<i8>) -> Self {
        self.signal_dbm = signal_dbm;
        self
    }
}

/// Statistics kept by a frame source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceStatistics {
    /// Frames handed to the consumer
    pub frames_delivered: u64,
    /// Bytes handed to the consumer
    pub bytes_delivered: u64,
    /// Records skipped because they could not be decoded
    pub frames_skipped: u64,
}

impl SourceStatistics {
    /// Record a delivered frame
    pub fn record_delivered(&mut self, bytes: usize) {
        self.frames_delivered += 1;
        self.bytes_delivered += bytes as u64;
    }

    /// Record a skipped record
    pub fn record_skipped(&mut self) {
        self.frames_skipped += 1;
    }
}

/// Main trait for frame source implementations
#[async_trait]
pub trait FrameSource: Send {
    /// Human readable description of the source
    fn describe(&self) -> String;

    /// Next frame, or `None` once the source is exhausted
    async fn next_frame(&mut self) -> Result<Option<CapturedFrame>>;

    /// Source statistics so far
    fn statistics(&self) -> SourceStatistics;
}

/// In-memory source replaying a fixed list of frames
#[derive(Debug, Default)]
pub struct MockSource {
    frames: VecDeque<CapturedFrame>,
    stats: SourceStatistics,
}

impl MockSource {
    pub fn new(frames: impl IntoIterator<Item = CapturedFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            stats: SourceStatistics::default(),
        }
    }

    /// Queue one more frame
    pub fn push(&mut self, frame: CapturedFrame) {
        self.frames.push_back(frame);
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

#[async_trait]
impl FrameSource for MockSource {
    fn describe(&self) -> String {
        format!("mock source ({} frames queued)", self.frames.len())
    }

    async fn next_frame(&mut self) -> Result<Option<CapturedFrame>> {
        let frame = self.frames.pop_front();
        if let Some(frame) = &frame {
            self.stats.record_delivered(frame.data.len());
        }
        Ok(frame)
    }

    fn statistics(&self) -> SourceStatistics {
        self.stats.clone()
    }
}
