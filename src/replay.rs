//! Feeding frame sources into the engine

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use wavecap_radio::FrameSource;

use crate::engine::{CaptureEngine, FrameResult, RawFrame};
use crate::Result;

const YIELD_INTERVAL: u64 = 256;

/// Per-source replay totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySummary {
    pub frames: u64,
    pub recorded: u64,
    pub handshakes: u64,
    pub duplicates: u64,
    pub pmkids: u64,
    pub dropped: u64,
    pub rotations: u64,
}

impl ReplaySummary {
    pub fn merge(&mut self, other: &ReplaySummary) {
        self.frames += other.frames;
        self.recorded += other.recorded;
        self.handshakes += other.handshakes;
        self.duplicates += other.duplicates;
        self.pmkids += other.pmkids;
        self.dropped += other.dropped;
        self.rotations += other.rotations;
    }
}

/// Dispatch every frame of `source` until it is exhausted, keeping the
/// frame timestamps the source reports
pub async fn replay_source<S>(source: &mut S, engine: &mut CaptureEngine) -> Result<ReplaySummary>
where
    S: FrameSource + ?Sized,
{
    let mut summary = ReplaySummary::default();
    info!("Replaying {}", source.describe());

    while let Some(frame) = source.next_frame().await? {
        let outcome = engine.dispatch(RawFrame::new(&frame.data, frame.channel, frame.timestamp));

        summary.frames += 1;
        summary.recorded += outcome.recorded as u64;
        summary.rotations += outcome.rotated as u64;
        match outcome.result {
            FrameResult::Handshake { .. } => summary.handshakes += 1,
            FrameResult::Duplicate(_) => summary.duplicates += 1,
            FrameResult::Pmkid { .. } => summary.pmkids += 1,
            FrameResult::Dropped => summary.dropped += 1,
            FrameResult::NotApplicable | FrameResult::Ignored => {}
        }

        // file sources never block, so give shutdown signals a chance
        if summary.frames % YIELD_INTERVAL == 0 {
            tokio::task::yield_now().await;
        }
    }

    let stats = source.statistics();
    debug!(
        "Source finished: {} frames delivered, {} skipped",
        stats.frames_delivered, stats.frames_skipped
    );
    engine.flush()?;
    Ok(summary)
}
