//! # wavecap-radio
//!
//! The radio-facing side of the wavecap capture engine. Everything that
//! knows where frames come from lives here:
//!
//! - `source`: the `FrameSource` abstraction and an in-memory source
//! - `radiotap`: radiotap header parsing and frequency/channel mapping
//! - `pcap`: classic pcap reader used to replay recorded captures
//!
//! Sources hand out bare 802.11 frames (radiotap already stripped, FCS
//! trimmed) together with the channel and arrival timestamp, which is the
//! tuple the engine's dispatcher consumes.

pub mod error;
pub mod pcap;
pub mod radiotap;
pub mod source;

pub use error::{RadioError, Result};
pub use pcap::{LinkType, PcapFileSource};
pub use radiotap::{frequency_to_channel, RadiotapHeader};
pub use source::{CapturedFrame, FrameSource, MockSource};

/// Current version of the radio layer
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Largest 802.11 frame a source will hand out (radiotap header excluded)
pub const MAX_FRAME_SIZE: usize = 4096;
