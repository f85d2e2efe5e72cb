//! Scripted in-memory [`HidChannel`] for tests
//!
//! Clones share state, so a test keeps one handle for inspection while the
//! session owns the other.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::channel::HidChannel;
use crate::error::TransportError;
use crate::protocol::{ack, cmd, layout, report};

/// Produces the reports the device sends back after a write
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

#[derive(Default)]
struct MockState {
    reads: VecDeque<Vec<u8>>,
    writes: Vec<Vec<u8>>,
    mode_changes: Vec<bool>,
    read_timeouts: Vec<Duration>,
    nonblocking: bool,
    closed: bool,
    close_calls: usize,
    responder: Option<Responder>,
    failing_reads: usize,
    fail_writes: bool,
    fail_set_mode: bool,
    manufacturer: Option<String>,
    product: Option<String>,
    serial_number: Option<String>,
}

/// In-memory HID device
#[derive(Clone, Default)]
pub struct MockChannel {
    state: Arc<Mutex<MockState>>,
}

impl MockChannel {
    pub fn new() -> Self {
        let channel = Self::default();
        channel.set_strings(
            Some("Nintendo"),
            Some("Wireless Gamepad"),
            Some("MOCK0001"),
        );
        channel
    }

    /// Channel whose responder acks every subcommand with an empty 0x21 reply
    pub fn acking() -> Self {
        let channel = Self::new();
        channel.set_responder(ack_responder());
        channel
    }

    /// Queue a report for the next read
    pub fn push_read(&self, bytes: Vec<u8>) {
        self.state.lock().reads.push_back(bytes);
    }

    pub fn set_responder(
        &self,
        responder: impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    ) {
        self.state.lock().responder = Some(Box::new(responder));
    }

    pub fn clear_responder(&self) {
        self.state.lock().responder = None;
    }

    /// Make the next `n` reads fail
    pub fn fail_next_reads(&self, n: usize) {
        self.state.lock().failing_reads = n;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    pub fn fail_set_mode(&self, fail: bool) {
        self.state.lock().fail_set_mode = fail;
    }

    pub fn set_strings(
        &self,
        manufacturer: Option<&str>,
        product: Option<&str>,
        serial_number: Option<&str>,
    ) {
        let mut state = self.state.lock();
        state.manufacturer = manufacturer.map(str::to_string);
        state.product = product.map(str::to_string);
        state.serial_number = serial_number.map(str::to_string);
    }

    /// Every packet written so far
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().writes.clone()
    }

    pub fn take_writes(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.state.lock().writes)
    }

    /// Every `set_nonblocking` argument in call order
    pub fn mode_changes(&self) -> Vec<bool> {
        self.state.lock().mode_changes.clone()
    }

    /// Every timeout passed to `read_timeout`, in call order
    pub fn read_timeouts(&self) -> Vec<Duration> {
        self.state.lock().read_timeouts.clone()
    }

    pub fn is_nonblocking(&self) -> bool {
        self.state.lock().nonblocking
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().close_calls
    }

    pub fn pending_reads(&self) -> usize {
        self.state.lock().reads.len()
    }

    fn check_open(state: &MockState) -> Result<(), TransportError> {
        if state.closed {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

impl HidChannel for MockChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(TransportError::HidError("mock read failure".into()));
        }
        match state.reads.pop_front() {
            Some(report) => {
                let n = report.len().min(buf.len());
                buf[..n].copy_from_slice(&report[..n]);
                Ok(n)
            }
            None => Ok(0),
        }
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        self.state.lock().read_timeouts.push(timeout);
        self.read(buf)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;
        if state.fail_writes {
            return Err(TransportError::HidError("mock write failure".into()));
        }
        state.writes.push(data.to_vec());
        if let Some(responder) = state.responder.as_mut() {
            let replies = responder(data);
            state.reads.extend(replies);
        }
        Ok(data.len())
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;
        state.mode_changes.push(nonblocking);
        if state.fail_set_mode {
            return Err(TransportError::HidError("mock mode failure".into()));
        }
        state.nonblocking = nonblocking;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.close_calls += 1;
    }

    fn manufacturer_string(&self) -> Result<Option<String>, TransportError> {
        Ok(self.state.lock().manufacturer.clone())
    }

    fn product_string(&self) -> Result<Option<String>, TransportError> {
        Ok(self.state.lock().product.clone())
    }

    fn serial_number_string(&self) -> Result<Option<String>, TransportError> {
        Ok(self.state.lock().serial_number.clone())
    }
}

/// Build a 50-byte 0x21 reply for `subcommand`
pub fn subcommand_reply(subcommand: u8, ack_byte: u8, data: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0u8; layout::INPUT_STANDARD_LEN];
    bytes[layout::INPUT_REPORT_ID] = report::SUBCOMMAND_REPLY;
    bytes[layout::INPUT_BATTERY] = 0x8E;
    bytes[layout::INPUT_ACK] = ack_byte;
    bytes[layout::INPUT_SUBCMD_REPLY] = subcommand;
    let n = data.len().min(layout::REPLY_DATA_LEN);
    bytes[layout::REPLY_DATA_START..layout::REPLY_DATA_START + n].copy_from_slice(&data[..n]);
    bytes
}

/// Build a 50-byte report with only the report ID and timer set
pub fn input_report(report_id: u8, timer: u8) -> Vec<u8> {
    let mut bytes = vec![0u8; layout::INPUT_STANDARD_LEN];
    bytes[layout::INPUT_REPORT_ID] = report_id;
    bytes[layout::INPUT_TIMER] = timer;
    bytes
}

/// Responder that acks every subcommand packet with no reply data
pub fn ack_responder() -> impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static {
    |packet: &[u8]| {
        if packet.first() == Some(&cmd::SUBCOMMAND) && packet.len() > layout::OUTPUT_SUBCOMMAND {
            vec![subcommand_reply(
                packet[layout::OUTPUT_SUBCOMMAND],
                ack::ACK_FLAG,
                &[],
            )]
        } else {
            Vec::new()
        }
    }
}
