//! Device session: the single owner of a controller's HID channel
//!
//! All channel I/O happens under one mutex. Blocking commands either read
//! their reply directly (no capture running) or, while the capture thread owns
//! the reads, wait for it to route the matching reply back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::byte_codec;
use crate::channel::HidChannel;
use crate::config::SessionConfig;
use crate::error::TransportError;
use crate::packet::{InputPacket, OutputPacket};
use crate::protocol::{cmd, subcmd, timing, SEQUENCE_MASK};
use crate::reply_router::{Expectation, ReplyRouter, Routed, WaitOutcome};
use crate::rumble::Rumble;
use crate::types::{DeviceStrings, ReportHandler, SessionState, TimestampedReport};

struct ChannelState {
    channel: Box<dyn HidChannel>,
    sequence: u8,
}

/// State shared with the capture thread
struct Shared {
    channel: Mutex<ChannelState>,
    router: ReplyRouter,
    /// Cleared to stop the capture loop
    alive: AtomicBool,
    capturing: AtomicBool,
    report_tx: broadcast::Sender<TimestampedReport>,
    config: SessionConfig,
}

/// Command/response session over one [`HidChannel`]
pub struct DeviceSession {
    shared: Arc<Shared>,
    /// Serializes blocking exchanges with each other and with capture
    /// start/stop, so only one expectation is pending
    query_lock: Mutex<()>,
    poll_thread: Mutex<Option<JoinHandle<()>>>,
    state: Mutex<SessionState>,
}

impl DeviceSession {
    /// Take ownership of an open channel and put it in non-blocking mode
    ///
    /// On failure the channel is closed before the error is returned.
    pub fn new(
        channel: impl HidChannel + 'static,
        config: SessionConfig,
    ) -> Result<Self, TransportError> {
        let mut channel: Box<dyn HidChannel> = Box::new(channel);
        if let Err(e) = channel.set_nonblocking(true) {
            channel.close();
            return Err(e);
        }

        let (report_tx, _) = broadcast::channel(config.report_channel_capacity.max(1));
        let shared = Arc::new(Shared {
            channel: Mutex::new(ChannelState {
                channel,
                sequence: 0,
            }),
            router: ReplyRouter::new(
                config.max_queued_replies,
                Duration::from_millis(timing::QUEUED_REPLY_TTL_MS),
            ),
            alive: AtomicBool::new(true),
            capturing: AtomicBool::new(false),
            report_tx,
            config,
        });

        info!("Device session opened");
        Ok(Self {
            shared,
            query_lock: Mutex::new(()),
            poll_thread: Mutex::new(None),
            state: Mutex::new(SessionState::Open),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// True while capture is running
    pub fn is_capturing(&self) -> bool {
        self.shared.capturing.load(Ordering::SeqCst)
    }

    /// Sequence value the next command will carry
    pub fn sequence(&self) -> u8 {
        self.shared.channel.lock().sequence
    }

    /// Allocate an input buffer sized for this session
    pub fn new_input_packet(&self) -> InputPacket {
        InputPacket::new(self.shared.config.nfc_ir_enabled)
    }

    /// Send one command
    ///
    /// With `blocking`, returns the matching reply: a 0x21 report echoing
    /// `subcommand` for command 0x01, otherwise the next report. Without it,
    /// returns an empty packet. The sequence counter advances once per call,
    /// whether or not the exchange succeeds.
    pub fn send_command(
        &self,
        command: u8,
        subcommand: u8,
        payload: &[u8],
        rumble: Rumble,
        blocking: bool,
    ) -> Result<InputPacket, TransportError> {
        self.ensure_open()?;

        let mut packet = OutputPacket::new(payload.len())?;
        packet
            .set_command(command)
            .set_subcommand(subcommand)
            .set_rumble_left(rumble)
            .set_rumble_right(rumble)
            .set_payload(payload)?;

        if !blocking {
            let mut guard = self.shared.channel.lock();
            let result = Self::write_packet(&mut guard, &mut packet);
            return result.map(|_| self.new_input_packet());
        }

        let expectation = if command == cmd::SUBCOMMAND {
            Expectation::Subcommand(subcommand)
        } else {
            Expectation::AnyReport
        };

        let _query = self.query_lock.lock();
        if self.is_capturing() {
            self.exchange_routed(&mut packet, expectation)
        } else {
            self.exchange_direct(&mut packet, expectation)
        }
    }

    /// Send a subcommand (command 0x01) with neutral rumble
    pub fn send_subcommand(
        &self,
        subcommand: u8,
        payload: &[u8],
        blocking: bool,
    ) -> Result<InputPacket, TransportError> {
        self.send_command(cmd::SUBCOMMAND, subcommand, payload, Rumble::NEUTRAL, blocking)
    }

    /// Send rumble data only (command 0x10)
    pub fn send_rumble(&self, left: Rumble, right: Rumble) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut packet = OutputPacket::new(0)?;
        packet
            .set_command(cmd::RUMBLE_ONLY)
            .set_rumble_left(left)
            .set_rumble_right(right);
        let mut guard = self.shared.channel.lock();
        Self::write_packet(&mut guard, &mut packet)
    }

    /// Start the background poll loop
    ///
    /// Every non-empty report that is not a reply to a pending command goes
    /// to `handler` and to [`subscribe_reports`](Self::subscribe_reports).
    pub fn capture(&self, handler: impl ReportHandler) -> Result<(), TransportError> {
        self.ensure_open()?;
        let _query = self.query_lock.lock();
        let mut thread = self.poll_thread.lock();
        if let Some(handle) = thread.take() {
            if self.is_capturing() && !handle.is_finished() {
                *thread = Some(handle);
                return Err(TransportError::InvalidArgument(
                    "capture is already running".into(),
                ));
            }
            // loop gave up on its own (read errors); reap it
            if handle.join().is_err() {
                warn!("Poll thread panicked");
            }
        }

        self.shared.capturing.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("joycon-poll".into())
            .spawn(move || run_poll_loop(shared, handler));

        match spawned {
            Ok(handle) => {
                *thread = Some(handle);
                info!("Capture started");
                Ok(())
            }
            Err(e) => {
                self.shared.capturing.store(false, Ordering::SeqCst);
                Err(TransportError::Internal(format!(
                    "failed to spawn poll thread: {e}"
                )))
            }
        }
    }

    /// Start capture with no handler; reports only go to subscribers
    pub fn capture_to_subscribers(&self) -> Result<(), TransportError> {
        self.capture(|_: &InputPacket| {})
    }

    /// Stop the poll loop and wait for it to exit
    ///
    /// A blocking command already waiting on the poll loop gets its reply
    /// before the loop is stopped.
    pub fn stop_capture(&self) {
        let _query = self.query_lock.lock();
        self.shared.capturing.store(false, Ordering::SeqCst);
        let handle = self.poll_thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Poll thread panicked");
            }
            info!("Capture stopped");
        }
    }

    /// Subscribe to captured reports
    pub fn subscribe_reports(&self) -> broadcast::Receiver<TimestampedReport> {
        self.shared.report_tx.subscribe()
    }

    /// Take a parked subcommand reply that no blocking command claimed
    pub fn take_unmatched_reply(&self, subcommand: u8) -> Option<InputPacket> {
        self.shared.router.take_queued(subcommand)
    }

    /// Manufacturer, product and serial strings
    pub fn device_strings(&self) -> Result<DeviceStrings, TransportError> {
        self.ensure_open()?;
        let guard = self.shared.channel.lock();
        Ok(DeviceStrings {
            manufacturer: guard.channel.manufacturer_string()?,
            product: guard.channel.product_string()?,
            serial_number: guard.channel.serial_number_string()?,
        })
    }

    /// Stop capture and close the channel; idempotent
    pub fn close(&self) {
        let mut state = self.state.lock();
        if *state == SessionState::Closed {
            return;
        }
        self.shared.alive.store(false, Ordering::SeqCst);
        // wake a routed waiter so it releases the query lock
        self.shared.router.cancel();
        self.stop_capture();
        self.shared.channel.lock().channel.close();
        *state = SessionState::Closed;
        info!("Device session closed");
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.shared.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }

    /// Stamp, write and advance the sequence counter
    fn write_packet(
        state: &mut ChannelState,
        packet: &mut OutputPacket,
    ) -> Result<(), TransportError> {
        packet.set_sequence(state.sequence);
        state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
        debug!(
            "TX {} {} seq={}: {}",
            cmd::name(packet.command()),
            subcmd::name(packet.subcommand()),
            packet.sequence(),
            byte_codec::hex_dump(packet.as_bytes())
        );
        state.channel.write(packet.as_bytes())?;
        Ok(())
    }

    /// Write, then read replies ourselves until one matches
    fn exchange_direct(
        &self,
        packet: &mut OutputPacket,
        expectation: Expectation,
    ) -> Result<InputPacket, TransportError> {
        let mut guard = self.shared.channel.lock();
        Self::write_packet(&mut guard, packet)?;
        self.read_blocking(&mut guard, expectation)
    }

    /// Switch to blocking reads for one exchange, restoring non-blocking mode
    fn read_blocking(
        &self,
        guard: &mut ChannelState,
        expectation: Expectation,
    ) -> Result<InputPacket, TransportError> {
        guard.channel.set_nonblocking(false)?;
        let result = self.read_matching(guard, expectation);
        let restored = guard.channel.set_nonblocking(true);

        let reply = result?;
        restored?;
        Ok(reply)
    }

    fn read_matching(
        &self,
        guard: &mut ChannelState,
        expectation: Expectation,
    ) -> Result<InputPacket, TransportError> {
        let config = &self.shared.config;
        let mut reply = self.new_input_packet();
        for _ in 0..config.reply_read_attempts {
            self.ensure_open()?;
            reply.clear();
            let n = guard
                .channel
                .read_timeout(reply.as_mut_bytes(), config.reply_timeout())?;
            if n == 0 || reply.is_empty_report() {
                continue;
            }
            debug!("RX {}", byte_codec::hex_dump(&reply.as_bytes()[..n]));

            if expectation.matches(&reply) {
                return Ok(reply);
            }
            // Not ours; keep it visible to everyone else
            self.shared.router.park_reply(&reply);
            let _ = self.shared.report_tx.send(TimestampedReport::new(reply.clone()));
        }
        warn!("No reply matching {:?} after {} reads", expectation, config.reply_read_attempts);
        Err(TransportError::Timeout)
    }

    /// Register the expectation, write, then wait for the poll loop
    ///
    /// If the poll loop exits before the reply arrives, the reply is read
    /// directly instead.
    fn exchange_routed(
        &self,
        packet: &mut OutputPacket,
        expectation: Expectation,
    ) -> Result<InputPacket, TransportError> {
        {
            let mut guard = self.shared.channel.lock();
            self.shared.router.expect(guard.sequence, expectation);
            if let Err(e) = Self::write_packet(&mut guard, packet) {
                self.shared.router.cancel();
                return Err(e);
            }
        }

        let router = &self.shared.router;
        let deadline = Instant::now() + self.shared.config.reply_timeout();
        let slice = Duration::from_millis(timing::ROUTED_WAIT_SLICE_MS);
        loop {
            match router.wait_until((Instant::now() + slice).min(deadline)) {
                WaitOutcome::Delivered(reply) => return Ok(reply),
                WaitOutcome::Cancelled => {
                    self.ensure_open()?;
                    return Err(TransportError::Timeout);
                }
                WaitOutcome::Pending => {}
            }

            if let Err(e) = self.ensure_open() {
                router.cancel();
                return Err(e);
            }
            if !self.is_capturing() {
                return self.finish_direct(expectation);
            }
            if Instant::now() >= deadline {
                if let Some(reply) = router.cancel() {
                    return Ok(reply);
                }
                warn!(
                    "Timed out waiting for {:?} (seq {})",
                    expectation,
                    packet.sequence()
                );
                return Err(TransportError::Timeout);
            }
        }
    }

    /// Capture ended mid-exchange; collect the outstanding reply ourselves
    fn finish_direct(&self, expectation: Expectation) -> Result<InputPacket, TransportError> {
        let mut guard = self.shared.channel.lock();
        if let Some(reply) = self.shared.router.cancel() {
            return Ok(reply);
        }
        debug!("Capture ended while waiting for {:?}, reading directly", expectation);
        self.read_blocking(&mut guard, expectation)
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Background poll loop
///
/// Runs until the session is closed or capture is stopped. Empty reads are
/// skipped; read errors are logged and retried after a pause, and after too
/// many in a row the loop gives up.
fn run_poll_loop<H: ReportHandler>(shared: Arc<Shared>, mut handler: H) {
    debug!("Poll thread started");
    let config = &shared.config;
    let mut packet = InputPacket::new(config.nfc_ir_enabled);
    let mut consecutive_errors = 0u32;

    while shared.alive.load(Ordering::SeqCst) && shared.capturing.load(Ordering::SeqCst) {
        packet.clear();
        let read = {
            let mut guard = shared.channel.lock();
            guard.channel.read(packet.as_mut_bytes())
        };

        match read {
            Ok(n) if n > 0 && !packet.is_empty_report() => {
                consecutive_errors = 0;
                trace!("RX {}", byte_codec::hex_dump(&packet.as_bytes()[..n]));
                if shared.router.offer(&packet) == Routed::Delivered {
                    continue;
                }
                handler.on_report(&packet);
                // Ignore if no receivers
                let _ = shared.report_tx.send(TimestampedReport::new(packet.clone()));
            }
            Ok(_) => {
                trace!("Poll read empty");
                std::thread::sleep(config.poll_interval());
            }
            Err(e) => {
                consecutive_errors += 1;
                warn!("Poll read error ({}): {}", consecutive_errors, e);
                if consecutive_errors >= config.max_consecutive_read_errors {
                    warn!("Too many consecutive read errors, stopping capture");
                    shared.capturing.store(false, Ordering::SeqCst);
                    break;
                }
                std::thread::sleep(config.read_error_sleep());
            }
        }
    }

    debug!("Poll thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{self, MockChannel};
    use crate::protocol::report;
    use std::sync::mpsc;
    use std::time::Instant;

    fn fast_config() -> SessionConfig {
        SessionConfig {
            reply_timeout_ms: 500,
            read_error_sleep_ms: 1,
            ..SessionConfig::default()
        }
    }

    fn open(channel: &MockChannel) -> DeviceSession {
        DeviceSession::new(channel.clone(), fast_config()).unwrap()
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_new_sets_nonblocking() {
        let channel = MockChannel::new();
        let session = open(&channel);
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(channel.mode_changes(), vec![true]);
    }

    #[test]
    fn test_new_closes_channel_on_failure() {
        let channel = MockChannel::new();
        channel.fail_set_mode(true);
        assert!(DeviceSession::new(channel.clone(), fast_config()).is_err());
        assert!(channel.is_closed());
    }

    #[test]
    fn test_blocking_direct_exchange() {
        let channel = MockChannel::acking();
        let session = open(&channel);

        let reply = session
            .send_subcommand(subcmd::ENABLE_IMU, &[0x01], true)
            .unwrap();
        assert_eq!(reply.report_id(), report::SUBCOMMAND_REPLY);
        assert_eq!(reply.subcommand_id_reply().unwrap(), subcmd::ENABLE_IMU);

        let writes = channel.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(
            writes[0],
            vec![0x01, 0x00, 0x00, 0x01, 0x40, 0x40, 0x00, 0x01, 0x40, 0x40, 0x40, 0x01]
        );
        // blocking for the read, non-blocking restored afterwards
        assert_eq!(channel.mode_changes(), vec![true, false, true]);
    }

    #[test]
    fn test_sequence_wraps_and_advances_on_failure() {
        let channel = MockChannel::new();
        let session = open(&channel);

        for _ in 0..17 {
            session.send_subcommand(0x30, &[0x01], false).unwrap();
        }
        let seqs: Vec<u8> = channel.writes().iter().map(|w| w[1]).collect();
        assert_eq!(&seqs[..3], &[0, 1, 2]);
        assert_eq!(seqs[15], 15);
        assert_eq!(seqs[16], 0);
        assert_eq!(session.sequence(), 1);

        channel.fail_writes(true);
        assert!(session.send_subcommand(0x30, &[0x01], false).is_err());
        assert_eq!(session.sequence(), 2);
    }

    #[test]
    fn test_nonblocking_returns_empty_packet() {
        let channel = MockChannel::acking();
        let session = open(&channel);
        let reply = session.send_subcommand(0x48, &[0x01], false).unwrap();
        assert!(reply.is_empty_report());
        assert_eq!(reply.size(), 50);
        // no mode switch for non-blocking sends
        assert_eq!(channel.mode_changes(), vec![true]);
    }

    #[test]
    fn test_direct_skips_unrelated_reports() {
        let channel = MockChannel::new();
        channel.set_responder(|packet: &[u8]| {
            vec![
                mock::input_report(0x30, 1),
                mock::subcommand_reply(0x48, 0x80, &[]),
                mock::subcommand_reply(packet[10], 0x90, &[0xAA]),
            ]
        });
        let session = open(&channel);
        let mut rx = session.subscribe_reports();

        let reply = session.send_subcommand(0x10, &[0; 5], true).unwrap();
        assert_eq!(reply.ack().unwrap(), 0x90);
        assert_eq!(reply.reply_data_at(0).unwrap(), 0xAA);

        // skipped reports reach subscribers and the unmatched queue
        assert_eq!(rx.try_recv().unwrap().packet.report_id(), 0x30);
        assert_eq!(rx.try_recv().unwrap().packet.report_id(), 0x21);
        assert!(session.take_unmatched_reply(0x48).is_some());
    }

    #[test]
    fn test_direct_timeout_restores_mode() {
        let channel = MockChannel::new();
        let session = open(&channel);
        let err = session.send_subcommand(0x02, &[], true).unwrap_err();
        assert_eq!(err, TransportError::Timeout);
        assert_eq!(channel.mode_changes(), vec![true, false, true]);
        assert!(channel.is_nonblocking());
        // every direct read is bounded by the reply timeout
        let timeouts = channel.read_timeouts();
        assert_eq!(timeouts.len(), session.config().reply_read_attempts);
        assert!(timeouts.iter().all(|t| *t == Duration::from_millis(500)));
    }

    #[test]
    fn test_direct_read_error_restores_mode() {
        let channel = MockChannel::new();
        let session = open(&channel);
        channel.fail_next_reads(1);
        assert!(matches!(
            session.send_subcommand(0x02, &[], true),
            Err(TransportError::HidError(_))
        ));
        assert!(channel.is_nonblocking());
    }

    #[test]
    fn test_non_subcommand_takes_next_report() {
        let channel = MockChannel::new();
        channel.set_responder(|_: &[u8]| vec![mock::input_report(0x31, 9)]);
        let session = open(&channel);
        let reply = session
            .send_command(cmd::MCU_REQUEST, 0x01, &[], Rumble::NEUTRAL, true)
            .unwrap();
        assert_eq!(reply.report_id(), 0x31);
        assert_eq!(reply.timer(), 9);
    }

    #[test]
    fn test_capture_dispatches_reports() {
        let channel = MockChannel::new();
        let session = open(&channel);
        let (tx, rx) = mpsc::channel();
        session
            .capture(move |p: &InputPacket| {
                let _ = tx.send(p.timer());
            })
            .unwrap();

        channel.push_read(vec![0u8; 50]);
        channel.push_read(mock::input_report(0x30, 1));
        channel.push_read(mock::input_report(0x30, 2));

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 1);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 2);
        session.stop_capture();
        assert!(!session.is_capturing());
    }

    #[test]
    fn test_capture_twice_fails() {
        let channel = MockChannel::new();
        let session = open(&channel);
        session.capture_to_subscribers().unwrap();
        assert!(matches!(
            session.capture_to_subscribers(),
            Err(TransportError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_routed_exchange_during_capture() {
        let channel = MockChannel::new();
        channel.set_responder(|packet: &[u8]| {
            // a sensor report races ahead of the reply
            vec![
                mock::input_report(0x30, 7),
                mock::subcommand_reply(packet[10], 0xD0, &[0x18, 0x06]),
            ]
        });
        let session = open(&channel);
        let (tx, rx) = mpsc::channel();
        session
            .capture(move |p: &InputPacket| {
                let _ = tx.send(p.report_id());
            })
            .unwrap();

        let reply = session.send_subcommand(0x50, &[], true).unwrap();
        assert_eq!(reply.ack().unwrap(), 0xD0);
        assert_eq!(reply.reply_int(0, 2).unwrap(), 0x0618);

        // the sensor report went to the handler, the reply did not
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 0x30);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        // capture never switches to blocking mode
        assert_eq!(channel.mode_changes(), vec![true]);
    }

    #[test]
    fn test_routed_timeout() {
        let channel = MockChannel::new();
        let session = DeviceSession::new(
            channel.clone(),
            SessionConfig {
                reply_timeout_ms: 20,
                ..fast_config()
            },
        )
        .unwrap();
        session.capture_to_subscribers().unwrap();
        assert_eq!(
            session.send_subcommand(0x02, &[], true).unwrap_err(),
            TransportError::Timeout
        );
    }

    #[test]
    fn test_poll_loop_stops_after_read_errors() {
        let channel = MockChannel::new();
        let session = DeviceSession::new(
            channel.clone(),
            SessionConfig {
                max_consecutive_read_errors: 3,
                ..fast_config()
            },
        )
        .unwrap();
        channel.fail_next_reads(10);
        session.capture_to_subscribers().unwrap();
        assert!(wait_until(|| !session.is_capturing()));

        // a dead loop can be restarted
        channel.fail_next_reads(0);
        session.capture_to_subscribers().unwrap();
        assert!(session.is_capturing());
    }

    #[test]
    fn test_close_is_idempotent() {
        let channel = MockChannel::new();
        let session = open(&channel);
        session.capture_to_subscribers().unwrap();
        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(channel.is_closed());
        assert_eq!(channel.close_calls(), 1);
        assert_eq!(
            session.send_subcommand(0x30, &[1], false).unwrap_err(),
            TransportError::Closed
        );
        drop(session);
        assert_eq!(channel.close_calls(), 1);
    }

    #[test]
    fn test_drop_closes_channel() {
        let channel = MockChannel::new();
        {
            let session = open(&channel);
            session.capture_to_subscribers().unwrap();
        }
        assert!(channel.is_closed());
    }

    #[test]
    fn test_rumble_only_packet() {
        let channel = MockChannel::new();
        let session = open(&channel);
        let left = Rumble::new(160.0, 0.0).unwrap();
        session.send_rumble(left, Rumble::NEUTRAL).unwrap();
        let w = &channel.writes()[0];
        assert_eq!(w[0], cmd::RUMBLE_ONLY);
        assert_eq!(&w[2..6], &[0x80, 0x00, 0x40, 0x40]);
        assert_eq!(&w[6..10], &Rumble::NEUTRAL.0);
        assert_eq!(w.len(), 11);
    }

    #[test]
    fn test_device_strings() {
        let channel = MockChannel::new();
        let session = open(&channel);
        let strings = session.device_strings().unwrap();
        assert_eq!(strings.manufacturer.as_deref(), Some("Nintendo"));
        assert_eq!(strings.serial_number.as_deref(), Some("MOCK0001"));
    }

    /// Responder that echoes the first payload byte back as reply data
    fn echo_responder(packet: &[u8]) -> Vec<Vec<u8>> {
        vec![mock::subcommand_reply(packet[10], 0x80, &packet[11..12])]
    }

    #[test]
    fn test_stop_capture_waits_for_routed_reply() {
        let channel = MockChannel::new();
        channel.set_responder(echo_responder);
        let session = DeviceSession::new(
            channel.clone(),
            SessionConfig {
                reply_timeout_ms: 2000,
                read_error_sleep_ms: 100,
                ..fast_config()
            },
        )
        .unwrap();
        // poll thread fails its first read and backs off
        channel.fail_next_reads(1);
        session.capture_to_subscribers().unwrap();
        std::thread::sleep(Duration::from_millis(10));

        std::thread::scope(|s| {
            let pending = s.spawn(|| session.send_subcommand(0x40, &[0x01], true));
            std::thread::sleep(Duration::from_millis(20));
            session.stop_capture();
            let reply = pending.join().unwrap().unwrap();
            assert_eq!(reply.reply_data_at(0).unwrap(), 0x01);
        });
        assert!(!session.is_capturing());
        assert_eq!(channel.pending_reads(), 0);

        // the next exchange gets its own reply, not a leftover
        let reply = session.send_subcommand(0x40, &[0x00], true).unwrap();
        assert_eq!(reply.reply_data_at(0).unwrap(), 0x00);
    }

    #[test]
    fn test_routed_reads_directly_after_poll_loop_gives_up() {
        let channel = MockChannel::new();
        channel.set_responder(echo_responder);
        let session = DeviceSession::new(
            channel.clone(),
            SessionConfig {
                reply_timeout_ms: 2000,
                read_error_sleep_ms: 60,
                max_consecutive_read_errors: 2,
                ..fast_config()
            },
        )
        .unwrap();
        channel.fail_next_reads(2);
        session.capture_to_subscribers().unwrap();
        std::thread::sleep(Duration::from_millis(10));

        let started = Instant::now();
        let reply = session.send_subcommand(0x40, &[0x07], true).unwrap();
        assert_eq!(reply.reply_data_at(0).unwrap(), 0x07);
        assert!(started.elapsed() < Duration::from_millis(1000));
        assert!(!session.is_capturing());
        assert_eq!(channel.mode_changes(), vec![true, false, true]);
        assert_eq!(channel.pending_reads(), 0);
    }

    #[test]
    fn test_close_wakes_routed_waiter() {
        let channel = MockChannel::new();
        let session = DeviceSession::new(
            channel.clone(),
            SessionConfig {
                reply_timeout_ms: 5000,
                ..fast_config()
            },
        )
        .unwrap();
        session.capture_to_subscribers().unwrap();

        let started = Instant::now();
        std::thread::scope(|s| {
            let pending = s.spawn(|| session.send_subcommand(0x02, &[], true));
            std::thread::sleep(Duration::from_millis(30));
            session.close();
            assert_eq!(pending.join().unwrap().unwrap_err(), TransportError::Closed);
        });
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(channel.is_closed());
    }

    #[test]
    fn test_concurrent_blocking_commands_get_own_replies() {
        for capture in [false, true] {
            let channel = MockChannel::new();
            channel.set_responder(echo_responder);
            let session = open(&channel);
            if capture {
                session.capture_to_subscribers().unwrap();
            }

            std::thread::scope(|s| {
                let handles: Vec<_> = (0u8..8)
                    .map(|n| {
                        let session = &session;
                        s.spawn(move || (n, session.send_subcommand(0x40, &[n], true)))
                    })
                    .collect();
                for handle in handles {
                    let (n, reply) = handle.join().unwrap();
                    assert_eq!(reply.unwrap().reply_data_at(0).unwrap(), n);
                }
            });

            let mut sequences: Vec<u8> = channel.writes().iter().map(|w| w[1]).collect();
            sequences.sort_unstable();
            assert_eq!(sequences, (0u8..8).collect::<Vec<_>>());
            session.close();
        }
    }
}
