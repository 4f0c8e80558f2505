//! Decode a simulated ensemble end to end.
//!
//! Run with: cargo run -p dab-core --example simulated_ensemble
//!
//! Set `DAB_CORE_CONFIG` to a YAML file to override the defaults; `RUST_LOG`
//! controls log verbosity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dab_core::config::RadioConfig;
use dab_core::observe;
use dab_core::params::DabParameters;
use dab_core::radio::BasicRadio;
use dab_core::sim::EnsembleBuilder;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = RadioConfig::load()?;
    let metrics = observe::init(&config.logging);
    let radio = BasicRadio::from_config(&config, metrics.clone())?;

    let bytes = Arc::new(AtomicU64::new(0));
    let counter = bytes.clone();
    radio.on_channel_registered(Box::new(move |id, channel| {
        tracing::info!(subchannel = id, bitrate = channel.subchannel().bitrate, "new channel");
        let counter = counter.clone();
        channel.on_logical_frame(Box::new(move |_, frame| {
            counter.fetch_add(frame.len() as u64, Ordering::Relaxed);
        }));
    }));

    let params = DabParameters::new(config.transmission_mode);
    let mut tx = EnsembleBuilder::new(params)
        .ensemble_label("Simulated Mux")
        .dab_plus_service(0xC221, 1, 0, 72)
        .service_label(0xC221, "Radio One")
        .dab_plus_service(0xC222, 2, 72, 48)
        .service_label(0xC222, "Radio Two")
        .transmitter();

    for _ in 0..50 {
        radio.process(&tx.next_frame());
    }

    radio.with_database(|db| {
        for service in &db.services {
            println!(
                "{:#06x} {}",
                service.id,
                service.label.as_deref().unwrap_or("(no label)")
            );
        }
    });
    println!("decoded {} bytes of audio superframes", bytes.load(Ordering::Relaxed));
    print!("{}", metrics.to_prometheus());
    Ok(())
}
