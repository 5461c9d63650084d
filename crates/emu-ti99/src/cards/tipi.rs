//! Serial-bridge card.
//!
//! A Raspberry-Pi-style sidecar at CRU base 0x1000 that tunnels
//! length-prefixed messages over four one-byte registers: TD/TC carry
//! data and control from the TI side, RD/RC answer from the bridge side.
//! Each accepted byte is acknowledged by echoing the control value into
//! RC; the TI driver alternates the low control bit so repeated polls of
//! an already-acknowledged value stay no-ops.
//!
//! The transport behind the card is abstract. Losing it suspends the CPU
//! (the driver would otherwise spin against a dead handshake) and the
//! card retries the connection on a fixed backoff until it returns.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use emu_core::Stateful;
use serde_json::{Value, json};

use crate::cards::{DsrCard, PeripheralCard};

const TD_OUT: u16 = 0x5FFE;
const TC_OUT: u16 = 0x5FFC;
const RD_IN: u16 = 0x5FFA;
const RC_IN: u16 = 0x5FF8;

// Control values. Write-byte and read-byte alternate their low bit.
const TSRSET: u8 = 0xF1;
const TSWB: u8 = 0x02;
const TSRB: u8 = 0x06;

// Single-byte payload diverted to a locally generated reply instead of a
// round trip over the transport.
const MOUSE_SENTINEL: u8 = 0x20;

// Reconnect attempt interval, two seconds of scanlines.
const RECONNECT_SCANLINES: u32 = 31_440;

/// Message transport behind the bridge card.
pub trait BridgeTransport {
    /// Whether the remote side is reachable.
    fn is_connected(&self) -> bool;

    /// Attempt to (re)establish the connection.
    fn connect(&mut self) -> bool;

    /// Ship one outbound message. Returns false if the transport is down.
    fn send(&mut self, message: &[u8]) -> bool;

    /// Fetch the next inbound message, if one has arrived.
    fn poll(&mut self) -> Option<Vec<u8>>;

    /// Ask the remote side to re-synchronize its session.
    fn signal_reset(&mut self) {}
}

#[derive(Default)]
struct LoopbackInner {
    connected: bool,
    inbound: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    resets: u32,
}

/// In-process transport that records outbound messages and echoes them
/// back as inbound. Clones share one endpoint, so a test or embedder can
/// keep a handle to inject messages and toggle connectivity.
#[derive(Clone)]
pub struct LoopbackTransport {
    inner: Arc<Mutex<LoopbackInner>>,
}

impl LoopbackTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LoopbackInner {
                connected: true,
                ..LoopbackInner::default()
            })),
        }
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, LoopbackInner> {
        self.inner.lock().expect("loopback endpoint lock poisoned")
    }

    pub fn set_connected(&self, connected: bool) {
        self.locked().connected = connected;
    }

    /// Queue a message for the card to receive.
    pub fn push_inbound(&self, message: Vec<u8>) {
        self.locked().inbound.push_back(message);
    }

    /// Every message dispatched over this transport, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.locked().sent.clone()
    }

    /// How many session resets the remote side was asked for.
    #[must_use]
    pub fn reset_signals(&self) -> u32 {
        self.locked().resets
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeTransport for LoopbackTransport {
    fn is_connected(&self) -> bool {
        self.locked().connected
    }

    fn connect(&mut self) -> bool {
        self.locked().connected
    }

    fn send(&mut self, message: &[u8]) -> bool {
        let mut inner = self.locked();
        if !inner.connected {
            return false;
        }
        inner.sent.push(message.to_vec());
        inner.inbound.push_back(message.to_vec());
        true
    }

    fn poll(&mut self) -> Option<Vec<u8>> {
        let mut inner = self.locked();
        if !inner.connected {
            return None;
        }
        inner.inbound.pop_front()
    }

    fn signal_reset(&mut self) {
        self.locked().resets += 1;
    }
}

/// The bridge card and its handshake session.
pub struct TipiCard {
    dsr: Vec<u8>,
    rom_enabled: bool,
    transport: Box<dyn BridgeTransport>,
    td: u8,
    tc: u8,
    rd: u8,
    rc: u8,
    write_idx: i32,
    write_len: usize,
    partial: Vec<u8>,
    read_idx: i32,
    incoming: VecDeque<Vec<u8>>,
    synthetic: Option<Vec<u8>>,
    mouse_buttons: u8,
    mouse_dx: i16,
    mouse_dy: i16,
    protocol_errors: u64,
    reconnect_countdown: u32,
}

impl TipiCard {
    /// CRU base address of the card.
    pub const CRU_BASE: u16 = 0x1000;

    #[must_use]
    pub fn new(dsr: Vec<u8>, transport: Box<dyn BridgeTransport>) -> Self {
        Self {
            dsr,
            rom_enabled: false,
            transport,
            td: 0,
            tc: 0,
            rd: 0,
            rc: 0,
            write_idx: -2,
            write_len: 0,
            partial: Vec::new(),
            read_idx: -2,
            incoming: VecDeque::new(),
            synthetic: None,
            mouse_buttons: 0,
            mouse_dx: 0,
            mouse_dy: 0,
            protocol_errors: 0,
            reconnect_countdown: 0,
        }
    }

    /// Accumulate a pointer update for the next locally served poll.
    pub fn set_mouse(&mut self, buttons: u8, dx: i16, dy: i16) {
        self.mouse_buttons = buttons;
        self.mouse_dx = self.mouse_dx.saturating_add(dx);
        self.mouse_dy = self.mouse_dy.saturating_add(dy);
    }

    /// Handshake writes the driver presented that match no known state.
    #[must_use]
    pub fn protocol_errors(&self) -> u64 {
        self.protocol_errors
    }

    fn process_control(&mut self, control: u8) {
        if control == self.rc {
            // Already acknowledged; repeated polls of the same value.
            return;
        }
        if control == TSRSET {
            self.partial.clear();
            self.write_idx = -2;
            self.read_idx = -2;
            self.rc = control;
            return;
        }
        match control & 0xFE {
            TSWB => self.write_byte(control),
            TSRB => self.read_byte(control),
            _ => {
                // Handshake stalls until the driver presents a valid value.
                self.protocol_errors += 1;
            }
        }
    }

    fn write_byte(&mut self, control: u8) {
        match self.write_idx {
            -2 => self.write_len = usize::from(self.td) << 8,
            -1 => {
                self.write_len |= usize::from(self.td);
                self.partial = Vec::with_capacity(self.write_len);
                if self.write_len == 0 {
                    self.dispatch(Vec::new());
                    self.write_idx = -2;
                    self.rc = control;
                    return;
                }
            }
            _ => {
                self.partial.push(self.td);
                if self.partial.len() == self.write_len {
                    let message = std::mem::take(&mut self.partial);
                    self.dispatch(message);
                    self.write_idx = -2;
                    self.rc = control;
                    return;
                }
            }
        }
        self.write_idx += 1;
        self.rc = control;
    }

    fn dispatch(&mut self, message: Vec<u8>) {
        if message.len() == 1 && message[0] == MOUSE_SENTINEL {
            let dx = self.mouse_dx.clamp(-128, 127) as i8;
            let dy = self.mouse_dy.clamp(-128, 127) as i8;
            self.synthetic = Some(vec![self.mouse_buttons, dx as u8, dy as u8]);
            self.mouse_dx = 0;
            self.mouse_dy = 0;
            return;
        }
        self.transport.send(&message);
    }

    fn read_byte(&mut self, control: u8) {
        if self.read_idx == -2 {
            if let Some(synthetic) = self.synthetic.take() {
                self.incoming.push_front(synthetic);
            }
        }
        let Some(front) = self.incoming.front() else {
            // Empty queue: no acknowledgment, the driver polls again.
            return;
        };
        match self.read_idx {
            -2 => self.rd = (front.len() >> 8) as u8,
            -1 => {
                self.rd = front.len() as u8;
                if front.is_empty() {
                    self.incoming.pop_front();
                    self.read_idx = -2;
                    self.rc = control;
                    return;
                }
            }
            idx => {
                let idx = idx as usize;
                self.rd = front.get(idx).copied().unwrap_or(0);
                if idx + 1 >= front.len() {
                    self.incoming.pop_front();
                    self.read_idx = -2;
                    self.rc = control;
                    return;
                }
            }
        }
        self.read_idx += 1;
        self.rc = control;
    }
}

impl PeripheralCard for TipiCard {
    fn id(&self) -> &'static str {
        "TIPI"
    }

    fn cru_base(&self) -> u16 {
        Self::CRU_BASE
    }

    fn read_cru_bit(&mut self, bit: u16) -> bool {
        match bit {
            0 => self.rom_enabled,
            _ => false,
        }
    }

    fn write_cru_bit(&mut self, bit: u16, value: bool) {
        match bit {
            0 => self.rom_enabled = value,
            1 => {
                if value {
                    self.transport.signal_reset();
                }
            }
            _ => {}
        }
    }

    fn reset(&mut self) {
        self.rom_enabled = false;
        self.td = 0;
        self.tc = 0;
        self.rd = 0;
        self.rc = 0;
        self.write_idx = -2;
        self.write_len = 0;
        self.partial.clear();
        self.read_idx = -2;
        self.incoming.clear();
        self.synthetic = None;
        if self.transport.is_connected() {
            self.transport.signal_reset();
        } else {
            self.transport.connect();
        }
    }

    fn tick_scanline(&mut self) {
        if self.transport.is_connected() {
            self.reconnect_countdown = 0;
            while let Some(message) = self.transport.poll() {
                self.incoming.push_back(message);
            }
            return;
        }
        if self.reconnect_countdown == 0 {
            self.reconnect_countdown = RECONNECT_SCANLINES;
        } else {
            self.reconnect_countdown -= 1;
            if self.reconnect_countdown == 0 {
                self.transport.connect();
            }
        }
    }

    fn suspend_pending(&self) -> bool {
        !self.transport.is_connected()
    }
}

impl DsrCard for TipiCard {
    fn rom_enabled(&self) -> bool {
        self.rom_enabled
    }

    fn read_word(&mut self, addr: u16) -> u16 {
        match addr {
            RD_IN => u16::from(self.rd) << 8,
            RC_IN => u16::from(self.rc) << 8,
            _ => {
                let offset = usize::from(addr - 0x4000);
                let high = self.dsr.get(offset).copied().unwrap_or(0);
                let low = self.dsr.get(offset + 1).copied().unwrap_or(0);
                u16::from_be_bytes([high, low])
            }
        }
    }

    fn write_word(&mut self, addr: u16, value: u16) {
        let byte = (value >> 8) as u8;
        match addr {
            TD_OUT => self.td = byte,
            TC_OUT => {
                self.tc = byte;
                self.process_control(byte);
            }
            _ => {}
        }
    }
}

impl Stateful for TipiCard {
    // Session state is transport-bound and rebuilt by the driver's reset
    // handshake; only the registers are worth carrying.
    fn get_state(&self) -> Value {
        json!({
            "romEnabled": self.rom_enabled,
            "td": self.td,
            "tc": self.tc,
            "rd": self.rd,
            "rc": self.rc,
        })
    }

    fn restore_state(&mut self, state: &Value) {
        if let Some(enabled) = state.get("romEnabled").and_then(Value::as_bool) {
            self.rom_enabled = enabled;
        }
        if let Some(td) = state.get("td").and_then(Value::as_u64) {
            self.td = td as u8;
        }
        if let Some(tc) = state.get("tc").and_then(Value::as_u64) {
            self.tc = tc as u8;
        }
        if let Some(rd) = state.get("rd").and_then(Value::as_u64) {
            self.rd = rd as u8;
        }
        if let Some(rc) = state.get("rc").and_then(Value::as_u64) {
            self.rc = rc as u8;
        }
    }
}
