//! Fast Information Channel
//!
//! ```text
//!  FIC soft bits ──▶ FicDecoder ──▶ FIBs ──▶ FigProcessor ──▶ DatabaseUpdater
//!                      (decoder)              (fig)             (runner)
//! ```
//!
//! [`FicRunner`] ties the pieces together and owns the live database.

pub mod decoder;
pub mod fig;
pub mod runner;

pub use decoder::FicDecoder;
pub use fig::{FigHandler, FigProcessor, FigStats};
pub use runner::FicRunner;
