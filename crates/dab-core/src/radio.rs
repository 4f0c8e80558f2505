//! Channel registry and per-frame dispatch.
//!
//! [`BasicRadio`] takes one transmission frame at a time and fans the work
//! out over a fixed worker pool: one task for the control stream and one per
//! registered program channel. The calling thread waits for every task before
//! any shared state changes.
//!
//! ```text
//!  process(frame)
//!    ├─ length check ─────────────────────────────── reject, nothing changes
//!    ├─ lock registry, consume reset request
//!    ├─ pool.scope ─┬─ FicRunner::process(fic)
//!    │              ├─ ProgramChannel::process(msc)   (channel 1)
//!    │              └─ ProgramChannel::process(msc)   (channel n)
//!    │                 ── barrier ──
//!    └─ publish database, register new sub-channels, notify observers
//! ```
//!
//! Channels are only ever added. They go away all at once on reset.

use std::collections::{BTreeMap, HashSet};
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::config::RadioConfig;
use crate::database::{
    AudioServiceType, Database, DatabaseManager, MiscInfo, TransportMode,
};
use crate::fec::viterbi::ViterbiBackend;
use crate::fic::FicRunner;
use crate::msc::ProgramChannel;
use crate::observe::RadioMetrics;
use crate::observer::{Observable, SubscriptionId};
use crate::params::DabParameters;
use crate::types::{DabError, DabResult, SoftBit, SubchannelId};

/// Subscriber to newly registered program channels.
pub type ChannelCallback = dyn Fn(SubchannelId, &ProgramChannel) + Send + Sync;

/// Everything guarded by the registry lock.
#[derive(Debug)]
struct RadioState {
    control: FicRunner,
    db_manager: DatabaseManager,
    channels: BTreeMap<SubchannelId, ProgramChannel>,
    /// Sub-channels that can never be decoded, until the next reset.
    refused: HashSet<SubchannelId>,
}

/// Read access to one registered channel. Holds the registry lock.
pub struct ChannelGuard<'a> {
    state: MutexGuard<'a, RadioState>,
    id: SubchannelId,
}

impl Deref for ChannelGuard<'_> {
    type Target = ProgramChannel;

    fn deref(&self) -> &ProgramChannel {
        // Presence was checked under this very lock and channels are never
        // removed while it is held.
        &self.state.channels[&self.id]
    }
}

/// Frame dispatcher and owner of every decoder.
pub struct BasicRadio {
    params: DabParameters,
    backend: ViterbiBackend,
    pool: rayon::ThreadPool,
    state: Mutex<RadioState>,
    reset_requested: AtomicBool,
    on_channel: Observable<ChannelCallback>,
    metrics: Arc<RadioMetrics>,
}

impl BasicRadio {
    /// Create a radio with `worker_threads` decode threads, 0 for one per
    /// CPU.
    pub fn new(
        params: DabParameters,
        worker_threads: usize,
        backend: ViterbiBackend,
        metrics: Arc<RadioMetrics>,
    ) -> DabResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_threads)
            .thread_name(|i| format!("dab-worker-{}", i))
            .build()
            .map_err(|e| DabError::WorkerPool(e.to_string()))?;

        let control = FicRunner::new(&params, backend, metrics.clone())?;
        tracing::info!(
            mode = %params.mode,
            threads = pool.current_num_threads(),
            %backend,
            "radio created"
        );

        Ok(Self {
            params,
            backend,
            pool,
            state: Mutex::new(RadioState {
                control,
                db_manager: DatabaseManager::new(),
                channels: BTreeMap::new(),
                refused: HashSet::new(),
            }),
            reset_requested: AtomicBool::new(false),
            on_channel: Observable::new(),
            metrics,
        })
    }

    /// Build a radio from a validated configuration.
    pub fn from_config(config: &RadioConfig, metrics: Arc<RadioMetrics>) -> DabResult<Self> {
        config.validate()?;
        let backend = config.viterbi.resolve()?;
        Self::new(
            DabParameters::new(config.transmission_mode),
            config.worker_threads,
            backend,
            metrics,
        )
    }

    pub fn params(&self) -> &DabParameters {
        &self.params
    }

    pub fn backend(&self) -> ViterbiBackend {
        self.backend
    }

    pub fn metrics(&self) -> &Arc<RadioMetrics> {
        &self.metrics
    }

    /// Decode one transmission frame.
    ///
    /// A frame of the wrong length is dropped without touching any state.
    /// Failures of individual streams are logged and counted; nothing is
    /// returned to the caller.
    pub fn process(&self, frame: &[SoftBit]) {
        if frame.len() != self.params.nb_frame_bits {
            tracing::error!(
                expected = self.params.nb_frame_bits,
                actual = frame.len(),
                "frame has wrong number of soft bits"
            );
            self.metrics.frames_rejected.inc();
            return;
        }
        let started = Instant::now();
        let (fic, msc) = frame.split_at(self.params.nb_fic_bits);

        let mut guard = self.lock_state();
        let state = &mut *guard;

        if self.reset_requested.swap(false, Ordering::AcqRel) {
            tracing::info!(channels = state.channels.len(), "resetting radio");
            state.db_manager.reset_all();
            state.control.reset();
            state.control.live_database_mut().clear();
            state.channels.clear();
            state.refused.clear();
            self.metrics.channels_registered.set(0);
        }

        let metrics: &RadioMetrics = &self.metrics;
        let control = &mut state.control;
        let streams: Vec<(SubchannelId, &mut ProgramChannel)> = state
            .channels
            .iter_mut()
            .map(|(&id, channel)| (id, channel))
            .collect();
        self.pool.scope(move |scope| {
            scope.spawn(move |_| run_isolated(metrics, None, || control.process(fic)));
            for (id, channel) in streams {
                scope.spawn(move |_| run_isolated(metrics, Some(id), || channel.process(msc)));
            }
        });

        self.update_database(state);

        self.metrics.frames_processed.inc();
        self.metrics
            .frame_latency_us
            .observe(started.elapsed().as_micros() as f64);
    }

    /// Ask for a full reset. It takes effect at the start of the next
    /// [`process`](Self::process) call.
    pub fn request_reset(&self) {
        self.reset_requested.store(true, Ordering::Release);
    }

    pub fn is_reset_pending(&self) -> bool {
        self.reset_requested.load(Ordering::Acquire)
    }

    /// Borrow a registered channel. The registry stays locked, and frame
    /// processing blocked, while the guard lives.
    pub fn channel(&self, id: SubchannelId) -> Option<ChannelGuard<'_>> {
        let state = self.lock_state();
        if !state.channels.contains_key(&id) {
            return None;
        }
        Some(ChannelGuard { state, id })
    }

    /// Ids of all registered channels, ascending.
    pub fn channel_ids(&self) -> Vec<SubchannelId> {
        self.lock_state().channels.keys().copied().collect()
    }

    /// Snapshot of the published database.
    pub fn database(&self) -> Database {
        self.lock_state().db_manager.database().clone()
    }

    /// Run `f` on the published database under the registry lock.
    pub fn with_database<R>(&self, f: impl FnOnce(&Database) -> R) -> R {
        f(self.lock_state().db_manager.database())
    }

    pub fn misc_info(&self) -> MiscInfo {
        *self.lock_state().db_manager.misc_info()
    }

    /// Subscribe to channel registrations.
    ///
    /// Callbacks run with the registry locked and must not call back into
    /// the radio.
    pub fn on_channel_registered(&self, callback: Box<ChannelCallback>) -> SubscriptionId {
        self.on_channel.attach(callback)
    }

    pub fn detach(&self, id: SubscriptionId) -> bool {
        self.on_channel.detach(id)
    }

    /// Try to register sub-channel `id` from the published database.
    ///
    /// Returns `true` if a new channel was created. Already registered or
    /// refused ids are a no-op.
    pub fn register_subchannel(&self, id: SubchannelId) -> bool {
        let mut state = self.lock_state();
        self.add_subchannel(&mut state, id)
    }

    fn lock_state(&self) -> MutexGuard<'_, RadioState> {
        // Stream tasks never panic while holding the lock
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update_database(&self, state: &mut RadioState) {
        state.db_manager.on_misc_info(state.control.misc_info());
        let (live, updater) = state.control.database_parts();
        if !state.db_manager.on_database_updater(live, updater) {
            return;
        }
        self.metrics.database_updates.inc();

        let ids: Vec<SubchannelId> = state
            .db_manager
            .database()
            .subchannels
            .iter()
            .map(|s| s.id)
            .collect();
        for id in ids {
            self.add_subchannel(state, id);
        }
    }

    fn add_subchannel(&self, state: &mut RadioState, id: SubchannelId) -> bool {
        if state.channels.contains_key(&id) || state.refused.contains(&id) {
            return false;
        }

        let db = state.db_manager.database();
        let Some(subchannel) = db.get_subchannel(id) else {
            tracing::debug!(subchannel = id, "sub-channel not in database yet");
            return false;
        };
        let Some(component) = db.get_service_component_by_subchannel(id) else {
            tracing::debug!(subchannel = id, "sub-channel has no service component yet");
            return false;
        };

        let refusal = if component.transport_mode != TransportMode::StreamAudio {
            Some("not an audio stream")
        } else if component.audio_service_type != Some(AudioServiceType::DabPlus) {
            Some("not a DAB+ stream")
        } else if !subchannel.protection.is_eep() {
            Some("not EEP protected")
        } else {
            None
        };
        if let Some(reason) = refusal {
            tracing::warn!(subchannel = id, reason, "sub-channel refused");
            state.refused.insert(id);
            self.metrics.registrations_refused.inc();
            return false;
        }

        let channel =
            match ProgramChannel::new(&self.params, subchannel, self.backend, self.metrics.clone()) {
                Ok(channel) => channel,
                Err(e) => {
                    tracing::warn!(subchannel = id, error = %e, "sub-channel refused");
                    state.refused.insert(id);
                    self.metrics.registrations_refused.inc();
                    return false;
                }
            };

        tracing::info!(
            subchannel = id,
            bitrate = subchannel.bitrate,
            start = subchannel.start_address,
            length = subchannel.length,
            "channel registered"
        );
        state.channels.insert(id, channel);
        self.metrics
            .channels_registered
            .set(state.channels.len() as i64);

        let channel = &state.channels[&id];
        self.on_channel.notify(|f| {
            if panic::catch_unwind(AssertUnwindSafe(|| f(id, channel))).is_err() {
                self.metrics.observer_failures.inc();
                tracing::error!(subchannel = id, "channel registration subscriber panicked");
            }
        });
        true
    }
}

impl std::fmt::Debug for BasicRadio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicRadio")
            .field("mode", &self.params.mode)
            .field("backend", &self.backend)
            .field("threads", &self.pool.current_num_threads())
            .field("reset_pending", &self.is_reset_pending())
            .finish()
    }
}

/// Run one stream task, absorbing its errors and panics.
fn run_isolated(metrics: &RadioMetrics, channel: Option<SubchannelId>, task: impl FnOnce() -> DabResult<()>) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(task));
    let stream = match channel {
        Some(id) => format!("channel {}", id),
        None => "FIC".to_string(),
    };
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            metrics.channel_task_failures.inc();
            tracing::warn!(%stream, error = %e, "stream task failed");
        }
        Err(_) => {
            metrics.channel_task_failures.inc();
            tracing::error!(%stream, "stream task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendPreference;
    use crate::database::{EepProfile, Protection};
    use crate::params::TransmissionMode;
    use crate::sim::{fig0_1_long, EnsembleBuilder, Transmitter};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn params() -> DabParameters {
        DabParameters::new(TransmissionMode::I)
    }

    fn radio() -> BasicRadio {
        BasicRadio::new(params(), 4, ViterbiBackend::detect(), Arc::new(RadioMetrics::new())).unwrap()
    }

    fn single_service() -> Transmitter {
        EnsembleBuilder::new(params())
            .ensemble_label("Test Mux")
            .dab_plus_service(0xC221, 1, 0, 12)
            .service_label(0xC221, "Radio One")
            .transmitter()
    }

    fn count_registrations(radio: &BasicRadio) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        radio.on_channel_registered(Box::new(move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        count
    }

    #[test]
    fn test_panicking_registration_subscriber_is_contained() {
        let radio = radio();
        radio.on_channel_registered(Box::new(|_, _| panic!("subscriber failure")));
        let registrations = count_registrations(&radio);
        let mut tx = single_service();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| radio.process(&tx.next_frame())));
        assert!(outcome.is_ok());

        assert_eq!(radio.channel_ids(), vec![1]);
        assert_eq!(radio.metrics().channels_registered.get(), 1);
        assert_eq!(radio.metrics().frames_processed.get(), 1);
        assert_eq!(radio.metrics().observer_failures.get(), 1);
        // Later subscribers are still notified
        assert_eq!(registrations.load(Ordering::SeqCst), 1);

        radio.process(&tx.next_frame());
        assert_eq!(radio.metrics().frames_processed.get(), 2);
    }

    #[test]
    fn test_first_frame_registers_channel() {
        let radio = radio();
        let mut tx = single_service();
        radio.process(&tx.next_frame());

        assert_eq!(radio.channel_ids(), vec![1]);
        let db = radio.database();
        assert_eq!(db.ensemble.label.as_deref(), Some("Test Mux"));
        assert_eq!(db.get_service(0xC221).unwrap().label.as_deref(), Some("Radio One"));
        assert_eq!(radio.channel(1).unwrap().subchannel().bitrate, 16);
        assert!(radio.channel(2).is_none());
        assert_eq!(radio.metrics().fib_crc_failures.get(), 0);
        assert_eq!(radio.metrics().channels_registered.get(), 1);
    }

    #[test]
    fn test_wrong_frame_length_changes_nothing() {
        let radio = radio();
        let mut tx = single_service();
        for _ in 0..2 {
            radio.process(&tx.next_frame());
        }
        let db_before = radio.database();
        let misc_before = radio.misc_info();
        let decoded_before = radio.channel(1).unwrap().frames_decoded();

        let mut frame = tx.next_frame();
        frame.pop();
        radio.process(&frame);
        radio.process(&[]);

        assert_eq!(radio.database(), db_before);
        assert_eq!(radio.misc_info(), misc_before);
        assert_eq!(radio.channel_ids(), vec![1]);
        assert_eq!(radio.channel(1).unwrap().frames_decoded(), decoded_before);
        assert_eq!(radio.metrics().frames_rejected.get(), 2);
        assert_eq!(radio.metrics().frames_processed.get(), 2);
    }

    #[test]
    fn test_registration_is_idempotent() {
        let radio = radio();
        let registrations = count_registrations(&radio);
        let mut tx = single_service();

        radio.process(&tx.next_frame());
        assert_eq!(registrations.load(Ordering::SeqCst), 1);

        assert!(!radio.register_subchannel(1));
        radio.process(&tx.next_frame());
        assert_eq!(radio.channel_ids(), vec![1]);
        assert_eq!(registrations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reset_empties_registry_and_database() {
        let radio = radio();
        let registrations = count_registrations(&radio);
        let mut tx = single_service();
        radio.process(&tx.next_frame());
        assert!(!radio.database().is_empty());

        radio.request_reset();
        assert!(radio.is_reset_pending());
        // Reset is deferred to the next frame
        assert_eq!(radio.channel_ids(), vec![1]);

        // A frame without a decodable FIC leaves nothing behind
        radio.process(&vec![0; params().nb_frame_bits]);
        assert!(!radio.is_reset_pending());
        assert!(radio.channel_ids().is_empty());
        assert!(radio.database().is_empty());
        assert_eq!(radio.misc_info(), MiscInfo::default());
        assert_eq!(radio.metrics().channels_registered.get(), 0);

        // The next real frame starts from scratch
        radio.process(&tx.next_frame());
        assert_eq!(radio.channel_ids(), vec![1]);
        assert_eq!(registrations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_refuses_unsupported_subchannels() {
        let radio = radio();
        let mut tx = EnsembleBuilder::new(params())
            .dab_plus_service(0xC221, 1, 0, 12)
            // Classic DAB audio
            .audio_service(
                0xC222,
                0,
                2,
                12,
                12,
                Protection::Eep {
                    profile: EepProfile::A,
                    level: 3,
                },
            )
            // DAB+ signalled with UEP
            .audio_service(0xC223, 63, 3, 24, 16, Protection::Uep { table_index: 0 })
            // Sub-channel without any service
            .raw_fig(fig0_1_long(4, 40, EepProfile::A, 3, 12))
            .transmitter();

        radio.process(&tx.next_frame());
        assert_eq!(radio.channel_ids(), vec![1]);
        assert_eq!(radio.metrics().registrations_refused.get(), 2);
        assert!(radio.database().get_subchannel(4).is_some());

        // Refusals are remembered and not logged or counted again
        assert!(!radio.register_subchannel(2));
        assert!(!radio.register_subchannel(3));
        assert!(!radio.register_subchannel(4));
        radio.process(&tx.next_frame());
        assert_eq!(radio.metrics().registrations_refused.get(), 2);
        assert_eq!(radio.channel_ids(), vec![1]);

        // A full reset forgets the refusals, so 2 and 3 are evaluated again
        radio.request_reset();
        radio.process(&tx.next_frame());
        assert_eq!(radio.metrics().registrations_refused.get(), 4);
        assert_eq!(radio.channel_ids(), vec![1]);
        assert!(!radio.register_subchannel(2));
        assert_eq!(radio.metrics().registrations_refused.get(), 4);
    }

    fn three_services() -> Transmitter {
        EnsembleBuilder::new(params())
            .dab_plus_service(0xC221, 1, 0, 12)
            .dab_plus_service(0xC222, 2, 12, 12)
            .dab_plus_service(0xC223, 3, 24, 12)
            .transmitter()
    }

    #[test]
    fn test_barrier_waits_for_slow_channel() {
        let radio = radio();
        let received: Arc<StdMutex<Vec<(SubchannelId, Vec<u8>)>>> = Arc::default();
        let slow_done = Arc::new(AtomicUsize::new(0));

        let sink = received.clone();
        let done = slow_done.clone();
        radio.on_channel_registered(Box::new(move |id, channel| {
            let sink = sink.clone();
            let done = done.clone();
            channel.on_logical_frame(Box::new(move |id, frame| {
                if id == 2 {
                    std::thread::sleep(Duration::from_millis(20));
                    done.fetch_add(1, Ordering::SeqCst);
                }
                sink.lock().unwrap().push((id, frame.to_vec()));
            }));
            assert!((1..=3).contains(&id));
        }));

        let mut tx = three_services();
        // Registration after frame 1, deinterleaver primed after 4 more
        for _ in 0..5 {
            radio.process(&tx.next_frame());
        }
        assert_eq!(radio.channel_ids(), vec![1, 2, 3]);
        assert_eq!(slow_done.load(Ordering::SeqCst), 1);
        assert_eq!(received.lock().unwrap().len(), 3);

        radio.process(&tx.next_frame());
        // Every slow callback of this frame finished before process returned
        assert_eq!(slow_done.load(Ordering::SeqCst), 5);

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 15);
        for id in 1..=3u8 {
            let frames: Vec<&Vec<u8>> = received
                .iter()
                .filter(|(i, _)| *i == id)
                .map(|(_, f)| f)
                .collect();
            assert_eq!(frames.len(), 5);
            for (k, frame) in frames.into_iter().enumerate() {
                // First CIF seen by the channels is CIF 4
                assert_eq!(frame, &tx.msc().logical_frame(id, 4 + k));
            }
        }
        for id in 1..=3 {
            assert_eq!(radio.channel(id).unwrap().frames_decoded(), 5);
        }
        assert_eq!(radio.metrics().channel_task_failures.get(), 0);
    }

    #[test]
    fn test_panicking_channel_is_isolated() {
        let radio = radio();
        radio.on_channel_registered(Box::new(|id, channel| {
            if id == 3 {
                channel.on_logical_frame(Box::new(|_, _| panic!("consumer failure")));
            }
        }));

        let mut tx = three_services();
        for _ in 0..6 {
            radio.process(&tx.next_frame());
        }

        // Channel 3 fails in frames 5 and 6, the others are unaffected
        assert_eq!(radio.metrics().channel_task_failures.get(), 2);
        assert_eq!(radio.channel(1).unwrap().frames_decoded(), 5);
        assert_eq!(radio.channel(2).unwrap().frames_decoded(), 5);
        assert_eq!(radio.channel_ids(), vec![1, 2, 3]);
        assert_eq!(radio.metrics().frames_processed.get(), 6);
    }

    #[test]
    fn test_from_config() {
        let mut config = RadioConfig::default();
        config.worker_threads = 2;
        config.viterbi.backend = BackendPreference::Scalar;
        let radio = BasicRadio::from_config(&config, Arc::new(RadioMetrics::new())).unwrap();
        assert_eq!(radio.backend(), ViterbiBackend::Scalar);
        assert_eq!(radio.params().nb_frame_bits, 230_400);

        config.worker_threads = 1000;
        assert!(matches!(
            BasicRadio::from_config(&config, Arc::new(RadioMetrics::new())),
            Err(DabError::Config(_))
        ));
    }
}
