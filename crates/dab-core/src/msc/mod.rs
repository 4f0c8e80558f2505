//! Main Service Channel
//!
//! ```text
//!  MSC soft bits ──▶ CIF ──▶ sub-channel CUs ──▶ TimeDeinterleaver ──▶ depuncture
//!                                                      ──▶ Viterbi ──▶ descramble ──▶ logical frame
//! ```
//!
//! One [`ProgramChannel`] per registered sub-channel, each with its own
//! decoder state.

pub mod channel;
pub mod deinterleaver;
pub mod protection;

pub use channel::{LogicalFrameCallback, ProgramChannel};
pub use deinterleaver::TimeDeinterleaver;
pub use protection::{bitrate, eep_schedule, subchannel_size, uep_entry, UepEntry, UEP_TABLE};
