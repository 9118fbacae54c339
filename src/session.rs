//! Collection session state machine.
//!
//! One [`CollectionService`] owns the whole pipeline: the assembler and its
//! tick, the transfer buffer, the dispatcher tick, and the companion link.
//! Session state, the buffer, and the timer handles live behind a single
//! mutex. Every session start bumps an epoch; ticks carry the epoch they
//! were scheduled with and do nothing once it is stale, so a tick racing a
//! stop can never append to a buffer the stop has already cleared.

use crate::assembler::{FrameAssembler, SessionConfig, SessionMode};
use crate::buffer::TransferBuffer;
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, ConfigError};
use crate::detector::RepDetector;
use crate::dispatcher::Dispatcher;
use crate::frame::SensorFrame;
use crate::link::{LinkError, LinkMessage, LinkTransport};
use crate::scheduler::{Scheduler, ThreadScheduler, TimerHandle};
use crate::sources::SensorSources;
use crate::stats::SharedStats;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use uuid::Uuid;

const ASSEMBLER_TIMER: &str = "assembler";
const DISPATCHER_TIMER: &str = "dispatcher";

/// Process-wide collection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionState {
    Idle,
    Collecting { session_id: Uuid, mode: SessionMode },
}

impl CollectionState {
    pub fn is_collecting(&self) -> bool {
        matches!(self, CollectionState::Collecting { .. })
    }

    pub fn mode(&self) -> Option<SessionMode> {
        match self {
            CollectionState::Collecting { mode, .. } => Some(*mode),
            CollectionState::Idle => None,
        }
    }
}

/// Notifications for the host UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    CollectionStarted { session_id: Uuid, mode: SessionMode },
    CollectionStopped { session_id: Uuid },
}

struct Inner {
    state: CollectionState,
    epoch: u64,
    assembler: FrameAssembler,
    buffer: TransferBuffer,
    detector: RepDetector,
    timers: Vec<TimerHandle>,
    subscribers: Vec<Sender<SessionEvent>>,
}

impl Inner {
    fn notify(&mut self, event: SessionEvent) {
        self.subscribers
            .retain(|tx| tx.try_send(event.clone()).is_ok());
    }
}

struct Shared {
    inner: Mutex<Inner>,
    // Serializes start/stop so one transition finishes (timers joined,
    // link notified) before the next begins. Ticks never take it.
    transition: Mutex<()>,
    sources: SensorSources,
    link: LinkTransport,
    dispatcher: Dispatcher,
    scheduler: Arc<dyn Scheduler>,
    stats: SharedStats,
    config: Config,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn assembler_tick(&self, epoch: u64) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.epoch != epoch || !inner.state.is_collecting() {
            return;
        }

        let Some(frame) = inner.assembler.capture() else {
            return;
        };
        inner.buffer.append(frame);
        self.stats.record_frame_captured();

        if let Some(frame) = inner.buffer.last() {
            if inner.detector.inspect(frame).is_some() {
                self.stats.record_potential_rep();
            }
        }
    }

    fn dispatcher_tick(&self, epoch: u64) {
        let batch = {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                return;
            }
            inner.buffer.flush()
        };
        self.dispatcher.dispatch(batch);
    }
}

/// Owner of the collection pipeline. Clones share the same session.
#[derive(Clone)]
pub struct CollectionService {
    shared: Arc<Shared>,
}

/// Builder for [`CollectionService`].
pub struct CollectionServiceBuilder {
    sources: SensorSources,
    link: LinkTransport,
    config: Config,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
}

impl CollectionServiceBuilder {
    /// Use `config` instead of the defaults. Checked by [`build`](Self::build).
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Clock used to stamp frames.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Scheduler that drives the assembler and dispatcher ticks.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Build the service and register it as the link's inbound handler.
    ///
    /// Fails when the config does not pass [`Config::validate`].
    pub fn build(self) -> Result<CollectionService, ConfigError> {
        self.config.validate()?;

        let stats = self.link.stats();
        let assembler = FrameAssembler::new(
            self.sources.clone(),
            self.clock,
            self.config.sample_interval,
        );

        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                state: CollectionState::Idle,
                epoch: 0,
                assembler,
                buffer: TransferBuffer::new(),
                detector: RepDetector::new(self.config.detector.clone()),
                timers: Vec::new(),
                subscribers: Vec::new(),
            }),
            transition: Mutex::new(()),
            sources: self.sources,
            dispatcher: Dispatcher::new(
                self.link.clone(),
                stats.clone(),
                self.config.target_batch_size,
            ),
            link: self.link,
            scheduler: self.scheduler,
            stats,
            config: self.config,
        });

        let weak = Arc::downgrade(&shared);
        shared.link.on_message(Box::new(move |message| {
            if let Some(shared) = weak.upgrade() {
                CollectionService { shared }.handle_message(message);
            }
        }));

        Ok(CollectionService { shared })
    }
}

impl CollectionService {
    /// Start building a service with the system clock and threaded timers.
    pub fn builder(sources: SensorSources, link: LinkTransport) -> CollectionServiceBuilder {
        CollectionServiceBuilder {
            sources,
            link,
            config: Config::default(),
            clock: Arc::new(SystemClock),
            scheduler: Arc::new(ThreadScheduler),
        }
    }

    /// Activate the companion link. Safe to call more than once.
    pub fn activate_link(&self) -> Result<(), LinkError> {
        self.shared.link.activate()
    }

    /// Start a session that also records audio peaks.
    pub fn start_mapping_session(&self) {
        self.start_session(SessionMode::Mapping);
    }

    /// Start a session without audio.
    pub fn start_normal_session(&self) {
        self.start_session(SessionMode::Normal);
    }

    /// Enter Collecting(mode). Ignored with a warning while collecting.
    pub fn start_session(&self, mode: SessionMode) {
        let _transition = self
            .shared
            .transition
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        let session_id = {
            let mut inner = self.shared.lock();
            if let CollectionState::Collecting {
                mode: current,
                session_id,
            } = inner.state
            {
                tracing::warn!(
                    requested = %mode,
                    current = %current,
                    %session_id,
                    "already collecting, start ignored"
                );
                return;
            }

            inner.epoch += 1;
            let epoch = inner.epoch;
            let session_id = Uuid::new_v4();

            inner.assembler.start(SessionConfig { mode });
            if mode.captures_audio() {
                if let Err(e) = self.shared.sources.audio.activate() {
                    tracing::warn!(error = %e, "audio unavailable, recording zero peaks");
                }
            }
            inner.detector.reset();
            inner.buffer.clear();
            inner.state = CollectionState::Collecting { session_id, mode };

            let config = &self.shared.config;
            let assembler_timer = self.schedule(
                ASSEMBLER_TIMER,
                config.sample_interval,
                epoch,
                Shared::assembler_tick,
            );
            let dispatcher_timer = self.schedule(
                DISPATCHER_TIMER,
                config.dispatch_interval,
                epoch,
                Shared::dispatcher_tick,
            );
            inner.timers = vec![assembler_timer, dispatcher_timer];

            self.shared.stats.record_session_started();
            inner.notify(SessionEvent::CollectionStarted { session_id, mode });
            session_id
        };

        let command = match mode {
            SessionMode::Mapping => LinkMessage::StartMapping,
            SessionMode::Normal => LinkMessage::StartNormal,
        };
        self.shared.link.send_message(&command);
        tracing::info!(%session_id, %mode, "collection started");
    }

    /// Return to Idle, discarding any unsent frames. No-op while Idle.
    ///
    /// Both timers have fully stopped by the time this returns.
    pub fn stop_session(&self) {
        let _transition = self
            .shared
            .transition
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        let (session_id, timers, discarded) = {
            let mut inner = self.shared.lock();
            let CollectionState::Collecting { session_id, mode } = inner.state else {
                tracing::warn!("not collecting, stop ignored");
                return;
            };

            inner.state = CollectionState::Idle;
            inner.epoch += 1;
            let timers = std::mem::take(&mut inner.timers);

            inner.assembler.stop();
            if mode.captures_audio() {
                self.shared.sources.audio.deactivate();
            }
            let discarded = inner.buffer.clear();
            self.shared.stats.record_frames_discarded(discarded);

            inner.notify(SessionEvent::CollectionStopped { session_id });
            (session_id, timers, discarded)
        };

        // Outside the lock: an in-flight tick may be waiting for it.
        for timer in timers {
            timer.cancel();
        }

        self.shared.link.send_message(&LinkMessage::StopSession);
        tracing::info!(%session_id, discarded, "collection stopped");
    }

    /// Route an inbound companion message.
    pub fn handle_message(&self, message: LinkMessage) {
        match message {
            LinkMessage::StartMapping => self.start_mapping_session(),
            LinkMessage::StartNormal => self.start_normal_session(),
            LinkMessage::StopSession => self.stop_session(),
            LinkMessage::SensorData(frames) => tracing::warn!(
                frames = frames.len(),
                "ignoring inbound sensor data"
            ),
        }
    }

    /// Current session state.
    pub fn state(&self) -> CollectionState {
        self.shared.lock().state
    }

    /// Check if a session is running.
    pub fn is_collecting(&self) -> bool {
        self.state().is_collecting()
    }

    /// Check if the running session is a mapping session.
    pub fn is_in_mapping_mode(&self) -> bool {
        self.state().mode() == Some(SessionMode::Mapping)
    }

    /// Receive session notifications. Sending never blocks the session.
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = unbounded();
        self.shared.lock().subscribers.push(tx);
        rx
    }

    /// Drain the transfer buffer without sending.
    pub fn flush_buffer(&self) -> Vec<SensorFrame> {
        self.shared.lock().buffer.flush()
    }

    /// Number of frames waiting for the next dispatcher tick.
    pub fn buffered_frames(&self) -> usize {
        self.shared.lock().buffer.len()
    }

    /// Counters shared with the link transport.
    pub fn stats(&self) -> SharedStats {
        self.shared.stats.clone()
    }

    /// The validated config this service was built with.
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    fn schedule(
        &self,
        label: &'static str,
        interval: Duration,
        epoch: u64,
        tick: fn(&Shared, u64),
    ) -> TimerHandle {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        self.shared.scheduler.schedule_repeating(
            label,
            interval,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    tick(&shared, epoch);
                }
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::link::MemoryChannel;
    use crate::scheduler::ManualScheduler;
    use crate::sources::{AudioPeakMeter, HeartRateSubscription, PushedMotion};

    fn service() -> (CollectionService, ManualScheduler, MemoryChannel) {
        let clock = ManualClock::starting_at(1_700_000_000.0);
        let scheduler = ManualScheduler::new(clock.clone());
        let channel = MemoryChannel::new();
        let sources = SensorSources::new(
            Arc::new(PushedMotion::available()),
            Arc::new(HeartRateSubscription::available()),
            Arc::new(AudioPeakMeter::available()),
        );
        let service =
            CollectionService::builder(sources, LinkTransport::new(Arc::new(channel.clone())))
                .clock(Arc::new(clock))
                .scheduler(Arc::new(scheduler.clone()))
                .build()
                .unwrap();
        (service, scheduler, channel)
    }

    #[test]
    fn test_starts_idle() {
        let (service, scheduler, _) = service();
        assert_eq!(service.state(), CollectionState::Idle);
        assert!(!service.is_in_mapping_mode());
        assert_eq!(scheduler.active_timers(), 0);
    }

    #[test]
    fn test_redundant_start_keeps_session() {
        let (service, scheduler, channel) = service();
        service.start_mapping_session();
        let first = service.state();

        service.start_normal_session();
        service.start_mapping_session();

        assert_eq!(service.state(), first);
        assert!(service.is_in_mapping_mode());
        assert_eq!(scheduler.active_timers(), 2);
        assert_eq!(channel.sent_messages(), vec![LinkMessage::StartMapping]);
    }

    #[test]
    fn test_stop_cancels_timers() {
        let (service, scheduler, _) = service();
        service.start_normal_session();
        scheduler.advance(Duration::from_millis(50));
        service.stop_session();

        assert_eq!(scheduler.active_timers(), 0);
        let captured = service.stats().snapshot().frames_captured;
        scheduler.advance(Duration::from_secs(1));
        assert_eq!(service.stats().snapshot().frames_captured, captured);
    }

    #[test]
    fn test_events_are_published() {
        let (service, _, _) = service();
        let events = service.subscribe();
        service.start_normal_session();
        service.stop_session();

        let started = events.try_recv().unwrap();
        let SessionEvent::CollectionStarted { session_id, mode } = started else {
            panic!("expected start event, got {started:?}");
        };
        assert_eq!(mode, SessionMode::Normal);
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::CollectionStopped { session_id }
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let sources = SensorSources::new(
            Arc::new(PushedMotion::available()),
            Arc::new(HeartRateSubscription::available()),
            Arc::new(AudioPeakMeter::available()),
        );
        let config = Config {
            sample_interval: Duration::ZERO,
            ..Config::default()
        };
        let result = CollectionService::builder(
            sources,
            LinkTransport::new(Arc::new(MemoryChannel::new())),
        )
        .config(config)
        .build();

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_redundant_stop_logs_warning() {
        let (service, _, channel) = service();
        let logs = LogCapture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();

        tracing::subscriber::with_default(subscriber, || service.stop_session());

        let output = logs.contents();
        assert!(output.contains("WARN"), "got: {output}");
        assert!(output.contains("not collecting, stop ignored"));
        assert!(channel.sent().is_empty());
    }

    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl LogCapture {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
        type Writer = LogCapture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let (service, _, _) = service();
        drop(service.subscribe());
        service.start_normal_session();
        assert!(service.is_collecting());
        assert!(service.shared.lock().subscribers.is_empty());
    }
}
