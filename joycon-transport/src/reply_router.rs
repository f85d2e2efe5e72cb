//! Reply correlation between blocking commands and the capture loop
//!
//! While capture is running, the poll thread owns every read. A blocking
//! command registers what it expects before writing; the poll thread hands
//! over the first matching report and parks unmatched subcommand replies in
//! a small queue so they are not lost.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::packet::InputPacket;
use crate::protocol::{report, subcmd};

/// What a blocking command is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// A 0x21 reply echoing this subcommand ID
    Subcommand(u8),
    /// The next non-empty report of any kind
    AnyReport,
}

impl Expectation {
    pub fn matches(&self, packet: &InputPacket) -> bool {
        match *self {
            Expectation::Subcommand(id) => {
                packet.report_id() == report::SUBCOMMAND_REPLY
                    && packet.subcommand_id_reply().ok() == Some(id)
            }
            Expectation::AnyReport => !packet.is_empty_report(),
        }
    }
}

/// Outcome of offering a received report to the router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// Handed to the waiting command
    Delivered,
    /// Unmatched subcommand reply, parked in the queue
    Queued,
    /// Not a reply anyone asked for
    Unclaimed,
}

/// Result of [`ReplyRouter::wait_until`]
#[derive(Debug)]
pub(crate) enum WaitOutcome {
    Delivered(InputPacket),
    /// Deadline passed; the expectation is still registered
    Pending,
    /// Expectation was cancelled (session closing or write failed)
    Cancelled,
}

struct Pending {
    sequence: u8,
    expectation: Expectation,
    reply: Option<InputPacket>,
}

struct QueuedReply {
    subcommand: u8,
    packet: InputPacket,
    received_at: Instant,
}

#[derive(Default)]
struct RouterState {
    pending: Option<Pending>,
    queued: VecDeque<QueuedReply>,
}

pub(crate) struct ReplyRouter {
    state: Mutex<RouterState>,
    ready: Condvar,
    max_queued: usize,
    ttl: Duration,
}

impl ReplyRouter {
    pub(crate) fn new(max_queued: usize, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(RouterState::default()),
            ready: Condvar::new(),
            max_queued,
            ttl,
        }
    }

    /// Register the expectation for the packet about to be written
    ///
    /// Queued replies for the same subcommand predate this request and are
    /// dropped.
    pub(crate) fn expect(&self, sequence: u8, expectation: Expectation) {
        let mut state = self.state.lock();
        if let Expectation::Subcommand(id) = expectation {
            state.queued.retain(|q| q.subcommand != id);
        }
        state.pending = Some(Pending {
            sequence,
            expectation,
            reply: None,
        });
    }

    /// Drop the registered expectation and wake its waiter
    ///
    /// Returns the reply if one was delivered but not yet collected.
    pub(crate) fn cancel(&self) -> Option<InputPacket> {
        let reply = self.state.lock().pending.take().and_then(|p| p.reply);
        self.ready.notify_all();
        reply
    }

    /// Offer a received report
    pub(crate) fn offer(&self, packet: &InputPacket) -> Routed {
        let mut state = self.state.lock();
        if let Some(pending) = state.pending.as_mut() {
            if pending.reply.is_none() && pending.expectation.matches(packet) {
                debug!(
                    "Routed {} reply to command seq {}",
                    report::name(packet.report_id()),
                    pending.sequence
                );
                pending.reply = Some(packet.clone());
                self.ready.notify_all();
                return Routed::Delivered;
            }
        }

        match packet.subcommand_id_reply() {
            Ok(id) => {
                Self::park(&mut state.queued, id, packet, self.max_queued, self.ttl);
                Routed::Queued
            }
            Err(_) => Routed::Unclaimed,
        }
    }

    /// Park an unmatched subcommand reply read outside the capture loop
    pub(crate) fn park_reply(&self, packet: &InputPacket) {
        if let Ok(id) = packet.subcommand_id_reply() {
            let mut state = self.state.lock();
            Self::park(&mut state.queued, id, packet, self.max_queued, self.ttl);
        }
    }

    /// Block until a reply arrives, the expectation is cancelled or
    /// `deadline` passes; on expiry the expectation stays registered
    pub(crate) fn wait_until(&self, deadline: Instant) -> WaitOutcome {
        let mut state = self.state.lock();
        loop {
            if let Some(reply) = state.pending.as_mut().and_then(|p| p.reply.take()) {
                state.pending = None;
                return WaitOutcome::Delivered(reply);
            }
            if state.pending.is_none() {
                return WaitOutcome::Cancelled;
            }
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                if let Some(reply) = state.pending.as_mut().and_then(|p| p.reply.take()) {
                    state.pending = None;
                    return WaitOutcome::Delivered(reply);
                }
                return if state.pending.is_some() {
                    WaitOutcome::Pending
                } else {
                    WaitOutcome::Cancelled
                };
            }
        }
    }

    /// Take the most recent parked reply for `subcommand`
    pub(crate) fn take_queued(&self, subcommand: u8) -> Option<InputPacket> {
        let mut state = self.state.lock();
        Self::expire(&mut state.queued, self.ttl);
        let pos = state.queued.iter().rposition(|q| q.subcommand == subcommand)?;
        state.queued.remove(pos).map(|q| q.packet)
    }

    pub(crate) fn queued_len(&self) -> usize {
        let mut state = self.state.lock();
        Self::expire(&mut state.queued, self.ttl);
        state.queued.len()
    }

    fn park(
        queued: &mut VecDeque<QueuedReply>,
        subcommand: u8,
        packet: &InputPacket,
        max_queued: usize,
        ttl: Duration,
    ) {
        Self::expire(queued, ttl);
        if max_queued == 0 {
            return;
        }
        if queued.len() >= max_queued {
            queued.pop_front();
        }
        debug!(
            "Queued unmatched reply for {} (0x{:02X})",
            subcmd::name(subcommand),
            subcommand
        );
        queued.push_back(QueuedReply {
            subcommand,
            packet: packet.clone(),
            received_at: Instant::now(),
        });
    }

    fn expire(queued: &mut VecDeque<QueuedReply>, ttl: Duration) {
        let now = Instant::now();
        queued.retain(|q| now.duration_since(q.received_at) < ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock;
    use std::sync::Arc;

    fn reply(subcommand: u8) -> InputPacket {
        InputPacket::from_bytes(&mock::subcommand_reply(subcommand, 0x80, &[])).unwrap()
    }

    fn report(id: u8) -> InputPacket {
        InputPacket::from_bytes(&mock::input_report(id, 0)).unwrap()
    }

    fn router() -> ReplyRouter {
        ReplyRouter::new(4, Duration::from_secs(60))
    }

    fn soon(ms: u64) -> Instant {
        Instant::now() + Duration::from_millis(ms)
    }

    fn delivered(outcome: WaitOutcome) -> InputPacket {
        match outcome {
            WaitOutcome::Delivered(reply) => reply,
            other => panic!("expected a delivered reply, got {other:?}"),
        }
    }

    #[test]
    fn test_expectation_matching() {
        assert!(Expectation::Subcommand(0x10).matches(&reply(0x10)));
        assert!(!Expectation::Subcommand(0x10).matches(&reply(0x02)));
        assert!(!Expectation::Subcommand(0x10).matches(&report(0x30)));
        assert!(Expectation::AnyReport.matches(&report(0x30)));
        assert!(!Expectation::AnyReport.matches(&InputPacket::new(false)));
    }

    #[test]
    fn test_deliver_to_waiter() {
        let r = router();
        r.expect(3, Expectation::Subcommand(0x02));
        assert_eq!(r.offer(&report(0x30)), Routed::Unclaimed);
        assert_eq!(r.offer(&reply(0x48)), Routed::Queued);
        assert_eq!(r.offer(&reply(0x02)), Routed::Delivered);

        let got = delivered(r.wait_until(soon(10)));
        assert_eq!(got.subcommand_id_reply().unwrap(), 0x02);
        // expectation cleared after delivery
        assert_eq!(r.offer(&reply(0x02)), Routed::Queued);
    }

    #[test]
    fn test_wait_expiry_keeps_expectation() {
        let r = router();
        r.expect(0, Expectation::Subcommand(0x10));
        assert!(matches!(r.wait_until(soon(5)), WaitOutcome::Pending));
        // a late reply still reaches the same expectation
        assert_eq!(r.offer(&reply(0x10)), Routed::Delivered);
        delivered(r.wait_until(soon(5)));
        r.cancel();
        assert_eq!(r.offer(&reply(0x10)), Routed::Queued);
    }

    #[test]
    fn test_cancel_wakes_waiter() {
        let r = Arc::new(router());
        r.expect(2, Expectation::Subcommand(0x02));
        let canceller = Arc::clone(&r);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });
        let started = Instant::now();
        assert!(matches!(r.wait_until(soon(5000)), WaitOutcome::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_across_threads() {
        let r = Arc::new(router());
        r.expect(7, Expectation::Subcommand(0x50));
        let offerer = Arc::clone(&r);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            offerer.offer(&reply(0x50))
        });
        let got = delivered(r.wait_until(soon(2000)));
        assert_eq!(handle.join().unwrap(), Routed::Delivered);
        assert_eq!(got.subcommand_id_reply().unwrap(), 0x50);
    }

    #[test]
    fn test_queue_bounded_and_keyed() {
        let r = router();
        for id in [0x30, 0x38, 0x48, 0x30, 0x40] {
            r.offer(&reply(id));
        }
        // capacity 4: oldest 0x30 evicted
        assert_eq!(r.queued_len(), 4);
        assert!(r.take_queued(0x38).is_some());
        assert!(r.take_queued(0x38).is_none());
        assert!(r.take_queued(0x30).is_some());
        assert!(r.take_queued(0x30).is_none());
        assert_eq!(r.queued_len(), 2);
    }

    #[test]
    fn test_expect_discards_stale_replies() {
        let r = router();
        r.offer(&reply(0x10));
        r.offer(&reply(0x02));
        r.expect(1, Expectation::Subcommand(0x10));
        r.cancel();
        assert!(r.take_queued(0x10).is_none());
        assert!(r.take_queued(0x02).is_some());
    }

    #[test]
    fn test_queue_expires() {
        let r = ReplyRouter::new(4, Duration::from_millis(1));
        r.offer(&reply(0x10));
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(r.queued_len(), 0);
    }
}
