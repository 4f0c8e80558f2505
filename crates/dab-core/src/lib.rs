//! # DAB Decode Core
//!
//! The layer of a DAB/DAB+ receiver that sits after the OFDM demodulator.
//! It takes one transmission frame of soft decisions at a time and turns it
//! into an ensemble database and a set of decoded program sub-channels.
//!
//! ## Signal Flow
//!
//! ```text
//!              ┌─ FIC ─▶ depuncture ─▶ Viterbi ─▶ descramble ─▶ FIBs ─▶ FIGs ─▶ database
//!  frame ──────┤
//!              └─ MSC ─▶ per sub-channel: deinterleave ─▶ depuncture ─▶ Viterbi ─▶ descramble ─▶ logical frames
//! ```
//!
//! [`BasicRadio`] dispatches the control stream and every registered
//! program channel onto a worker pool once per frame and registers new
//! DAB+ sub-channels as the database reveals them.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dab_core::prelude::*;
//! use dab_core::sim::EnsembleBuilder;
//!
//! let params = DabParameters::new(TransmissionMode::I);
//! let radio = BasicRadio::new(params, 0, ViterbiBackend::detect(), Arc::new(RadioMetrics::new()))?;
//! radio.on_channel_registered(Box::new(|id, channel| {
//!     println!("sub-channel {} at {} kbit/s", id, channel.subchannel().bitrate);
//! }));
//!
//! let mut tx = EnsembleBuilder::new(params)
//!     .dab_plus_service(0xC221, 1, 0, 72)
//!     .transmitter();
//! for _ in 0..8 {
//!     radio.process(&tx.next_frame());
//! }
//! # Ok::<(), dab_core::DabError>(())
//! ```

pub mod bit_packing;
pub mod config;
pub mod database;
pub mod fec;
pub mod fic;
pub mod msc;
pub mod observe;
pub mod observer;
pub mod params;
pub mod radio;
pub mod sim;
pub mod slideshow;
pub mod types;

pub use config::{ConfigError, RadioConfig};
pub use database::{Database, DatabaseManager, DatabaseUpdater, MiscInfo};
pub use fec::{ViterbiBackend, ViterbiDecoder, ViterbiError};
pub use fic::FicRunner;
pub use msc::ProgramChannel;
pub use observe::{LogConfig, RadioMetrics};
pub use params::{DabParameters, TransmissionMode};
pub use radio::{BasicRadio, ChannelGuard};
pub use slideshow::{NotificationCache, SlideshowManager};
pub use types::{DabError, DabResult, SoftBit, SubchannelId};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::database::{Database, Subchannel};
    pub use crate::fec::{ViterbiBackend, ViterbiDecoder};
    pub use crate::msc::ProgramChannel;
    pub use crate::observe::RadioMetrics;
    pub use crate::params::{DabParameters, TransmissionMode};
    pub use crate::radio::BasicRadio;
    pub use crate::types::{DabError, DabResult, SoftBit, SubchannelId};
}
