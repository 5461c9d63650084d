//! The console bus.
//!
//! A 16-bit address space with byte peripherals strapped to the high
//! byte of the word bus: console ROM at 0x0000, the DSR window at
//! 0x4000, cartridge ROM with write-switched banking at 0x6000, the
//! scratchpad and memory-mapped chip ports at 0x8000-0x9FFF, and the
//! optional 32K expansion split across 0x2000 and 0xA000. GROMs live in
//! their own flat 64K space behind an address-counter protocol on the
//! 0x9800/0x9C00 ports.
//!
//! CRU accesses below 0x400 hit the 9901; above that, bits are claimed
//! in 128-bit pages by whichever registered card owns the page.

use emu_core::{Bus, Stateful, state_bytes, state_get_bytes};
use serde_json::{Value, json};
use ti_sn76489::Sn76489;
use ti_tms9918::VideoProcessor;

use crate::cards::{CardSlot, TiFdc, TipiCard};
use crate::config::Ti99Config;
use crate::console::{AUDIO_SAMPLE_RATE, PSG_CLOCK};
use crate::cru::Cru;
use crate::speech::Tms5200;

// 3.58MHz PSG clock spread over 262 scanlines at 60Hz.
const PSG_CYCLES_PER_SCANLINE: u32 = 228;

const GROM_SPACE: usize = 0x1_0000;
const CARTRIDGE_GROM_BASE: usize = 0x6000;
const BANK_SIZE: usize = 0x2000;

struct Expansion {
    lo: Vec<u8>,
    hi: Vec<u8>,
}

/// The memory bus and everything hanging off it.
pub struct Memory {
    console_rom: Vec<u8>,
    scratchpad: [u8; 256],
    expansion: Option<Expansion>,
    cartridge_rom: Vec<u8>,
    cartridge_banks: usize,
    cartridge_bank: usize,
    grom: Vec<u8>,
    grom_address: u16,
    grom_prefetch: u8,
    grom_latch_low: bool,
    vdp: Box<dyn VideoProcessor>,
    psg: Sn76489,
    speech: Option<Tms5200>,
    cru: Cru,
    cards: Vec<CardSlot>,
}

fn rom_word(rom: &[u8], offset: usize) -> u16 {
    let high = rom.get(offset).copied().unwrap_or(0);
    let low = rom.get(offset + 1).copied().unwrap_or(0);
    u16::from_be_bytes([high, low])
}

fn ram_write(ram: &mut [u8], offset: usize, value: u16) {
    if offset + 1 < ram.len() {
        ram[offset] = (value >> 8) as u8;
        ram[offset + 1] = value as u8;
    }
}

impl Memory {
    #[must_use]
    pub fn new(config: &Ti99Config) -> Self {
        let mut grom = vec![0u8; GROM_SPACE];
        let console_len = config.grom.len().min(CARTRIDGE_GROM_BASE);
        grom[..console_len].copy_from_slice(&config.grom[..console_len]);
        if let Some(cartridge_grom) = &config.cartridge_grom {
            let len = cartridge_grom.len().min(GROM_SPACE - CARTRIDGE_GROM_BASE);
            grom[CARTRIDGE_GROM_BASE..CARTRIDGE_GROM_BASE + len]
                .copy_from_slice(&cartridge_grom[..len]);
        }
        let cartridge_rom = config.cartridge_rom.clone().unwrap_or_default();
        let cartridge_banks = (cartridge_rom.len() / BANK_SIZE).max(1);
        Self {
            console_rom: config.rom.clone(),
            scratchpad: [0; 256],
            expansion: config.ram_32k.then(|| Expansion {
                lo: vec![0; 0x2000],
                hi: vec![0; 0x6000],
            }),
            cartridge_rom,
            cartridge_banks,
            cartridge_bank: 0,
            grom,
            grom_address: 0,
            grom_prefetch: 0,
            grom_latch_low: false,
            vdp: config.vdp.create(config.flicker),
            psg: Sn76489::new(PSG_CLOCK, AUDIO_SAMPLE_RATE),
            speech: config.speech.then(Tms5200::new),
            cru: Cru::new(),
            cards: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.scratchpad = [0; 256];
        if let Some(expansion) = &mut self.expansion {
            expansion.lo.fill(0);
            expansion.hi.fill(0);
        }
        self.cartridge_bank = 0;
        self.grom_address = 0;
        self.grom_prefetch = self.grom[0];
        self.grom_address = grom_increment(0);
        self.grom_latch_low = false;
        self.vdp.reset();
        self.psg.reset();
        if let Some(speech) = &mut self.speech {
            speech.reset();
        }
        self.cru.reset();
        for card in &mut self.cards {
            card.as_dsr_mut().reset();
        }
    }

    /// Register a card. Fails if another card already claims the same
    /// CRU page; callers deregister the old card first.
    pub fn register_card(&mut self, slot: CardSlot) -> Result<(), String> {
        let base = slot.as_dsr().cru_base();
        if self
            .cards
            .iter()
            .any(|card| card.as_dsr().cru_base() == base)
        {
            return Err(format!("CRU base {base:#06X} is already claimed"));
        }
        self.cards.push(slot);
        Ok(())
    }

    /// Remove a card by id, returning it to the caller.
    pub fn deregister_card(&mut self, id: &str) -> Option<CardSlot> {
        let index = self
            .cards
            .iter()
            .position(|card| card.as_dsr().id() == id)?;
        Some(self.cards.remove(index))
    }

    #[must_use]
    pub fn fdc(&self) -> Option<&TiFdc> {
        self.cards.iter().find_map(|card| match card {
            CardSlot::Fdc(fdc) => Some(fdc),
            CardSlot::Bridge(_) => None,
        })
    }

    pub fn fdc_mut(&mut self) -> Option<&mut TiFdc> {
        self.cards.iter_mut().find_map(|card| match card {
            CardSlot::Fdc(fdc) => Some(fdc),
            CardSlot::Bridge(_) => None,
        })
    }

    #[must_use]
    pub fn bridge(&self) -> Option<&TipiCard> {
        self.cards.iter().find_map(|card| match card {
            CardSlot::Bridge(bridge) => Some(bridge),
            CardSlot::Fdc(_) => None,
        })
    }

    pub fn bridge_mut(&mut self) -> Option<&mut TipiCard> {
        self.cards.iter_mut().find_map(|card| match card {
            CardSlot::Bridge(bridge) => Some(bridge),
            CardSlot::Fdc(_) => None,
        })
    }

    #[must_use]
    pub fn vdp(&self) -> &dyn VideoProcessor {
        &*self.vdp
    }

    pub fn vdp_mut(&mut self) -> &mut dyn VideoProcessor {
        &mut *self.vdp
    }

    #[must_use]
    pub fn psg(&self) -> &Sn76489 {
        &self.psg
    }

    pub fn psg_mut(&mut self) -> &mut Sn76489 {
        &mut self.psg
    }

    #[must_use]
    pub fn speech(&self) -> Option<&Tms5200> {
        self.speech.as_ref()
    }

    pub fn speech_mut(&mut self) -> Option<&mut Tms5200> {
        self.speech.as_mut()
    }

    #[must_use]
    pub fn cru(&self) -> &Cru {
        &self.cru
    }

    pub fn cru_mut(&mut self) -> &mut Cru {
        &mut self.cru
    }

    #[must_use]
    pub fn cartridge_bank(&self) -> usize {
        self.cartridge_bank
    }

    #[must_use]
    pub fn grom_address(&self) -> u16 {
        self.grom_address
    }

    /// Advance everything on the bus by one scanline.
    pub fn tick_scanline(&mut self) {
        self.cru.tick_scanline();
        if let Some(speech) = &mut self.speech {
            speech.tick_scanline();
        }
        for card in &mut self.cards {
            card.as_dsr_mut().tick_scanline();
        }
        self.psg.run(PSG_CYCLES_PER_SCANLINE);
    }

    /// Side-effect-free read for debuggers. Memory-mapped chip ports
    /// read as zero rather than disturbing latches and prefetches.
    #[must_use]
    pub fn peek_word(&self, addr: u16) -> u16 {
        match addr & 0xE000 {
            0x0000 => rom_word(&self.console_rom, usize::from(addr)),
            0x2000 => self
                .expansion
                .as_ref()
                .map_or(0, |e| rom_word(&e.lo, usize::from(addr - 0x2000))),
            0x6000 => rom_word(
                &self.cartridge_rom,
                self.cartridge_bank * BANK_SIZE + usize::from(addr - 0x6000),
            ),
            0x8000 if addr & 0xFC00 == 0x8000 => {
                let index = usize::from(addr & 0xFE);
                u16::from_be_bytes([self.scratchpad[index], self.scratchpad[index + 1]])
            }
            0xA000 | 0xC000 | 0xE000 => self
                .expansion
                .as_ref()
                .map_or(0, |e| rom_word(&e.hi, usize::from(addr - 0xA000))),
            _ => 0,
        }
    }

    fn dsr_read(&mut self, addr: u16) -> u16 {
        for card in &mut self.cards {
            let card = card.as_dsr_mut();
            if card.rom_enabled() {
                return card.read_word(addr);
            }
        }
        0
    }

    fn dsr_write(&mut self, addr: u16, value: u16) {
        for card in &mut self.cards {
            let card = card.as_dsr_mut();
            if card.rom_enabled() {
                card.write_word(addr, value);
                return;
            }
        }
    }

    fn mmio_read(&mut self, addr: u16) -> u16 {
        match addr & 0xFC00 {
            0x8000 => {
                let index = usize::from(addr & 0xFE);
                u16::from_be_bytes([self.scratchpad[index], self.scratchpad[index + 1]])
            }
            0x8800 => {
                let byte = if addr & 2 == 0 {
                    self.vdp.read_data()
                } else {
                    self.vdp.read_status()
                };
                u16::from(byte) << 8
            }
            0x9000 => self
                .speech
                .as_mut()
                .map_or(0, |speech| u16::from(speech.read()) << 8),
            0x9800 => {
                let byte = if addr & 2 == 0 {
                    self.grom_read_data()
                } else {
                    self.grom_read_address()
                };
                u16::from(byte) << 8
            }
            _ => 0,
        }
    }

    fn mmio_write(&mut self, addr: u16, value: u16) {
        let byte = (value >> 8) as u8;
        match addr & 0xFC00 {
            0x8000 => {
                let index = usize::from(addr & 0xFE);
                self.scratchpad[index] = byte;
                self.scratchpad[index + 1] = value as u8;
            }
            0x8400 => self.psg.write_data(byte),
            0x8C00 => match addr & 6 {
                0 => self.vdp.write_data(byte),
                2 => self.vdp.write_address(byte),
                4 => self.vdp.write_palette_port(byte),
                _ => self.vdp.write_indirect_port(byte),
            },
            0x9400 => {
                if let Some(speech) = &mut self.speech {
                    speech.write_data(byte);
                }
            }
            0x9C00 => {
                if addr & 2 != 0 {
                    self.grom_write_address(byte);
                }
            }
            _ => {}
        }
    }

    fn grom_read_data(&mut self) -> u8 {
        let value = self.grom_prefetch;
        self.grom_prefetch = self.grom[usize::from(self.grom_address)];
        self.grom_address = grom_increment(self.grom_address);
        self.grom_latch_low = false;
        value
    }

    // Address readback serves the counter plus one, high byte first.
    fn grom_read_address(&mut self) -> u8 {
        let readback = self.grom_address.wrapping_add(1);
        if self.grom_latch_low {
            self.grom_latch_low = false;
            readback as u8
        } else {
            self.grom_latch_low = true;
            (readback >> 8) as u8
        }
    }

    fn grom_write_address(&mut self, byte: u8) {
        if self.grom_latch_low {
            self.grom_address = (self.grom_address & 0xFF00) | u16::from(byte);
            self.grom_latch_low = false;
            self.grom_prefetch = self.grom[usize::from(self.grom_address)];
            self.grom_address = grom_increment(self.grom_address);
        } else {
            self.grom_address = (self.grom_address & 0x00FF) | (u16::from(byte) << 8);
            self.grom_latch_low = true;
        }
    }
}

// The counter increments within an 8K GROM; the top bits stay put until
// a new address is written.
fn grom_increment(addr: u16) -> u16 {
    (addr & 0xE000) | (addr.wrapping_add(1) & 0x1FFF)
}

impl Bus for Memory {
    fn read_word(&mut self, addr: u16) -> u16 {
        match addr & 0xE000 {
            0x0000 => rom_word(&self.console_rom, usize::from(addr)),
            0x2000 => self
                .expansion
                .as_ref()
                .map_or(0, |e| rom_word(&e.lo, usize::from(addr - 0x2000))),
            0x4000 => self.dsr_read(addr),
            0x6000 => rom_word(
                &self.cartridge_rom,
                self.cartridge_bank * BANK_SIZE + usize::from(addr - 0x6000),
            ),
            0x8000 => self.mmio_read(addr),
            _ => self
                .expansion
                .as_ref()
                .map_or(0, |e| rom_word(&e.hi, usize::from(addr - 0xA000))),
        }
    }

    fn write_word(&mut self, addr: u16, value: u16) {
        match addr & 0xE000 {
            0x0000 => {}
            0x2000 => {
                if let Some(expansion) = &mut self.expansion {
                    ram_write(&mut expansion.lo, usize::from(addr - 0x2000), value);
                }
            }
            0x4000 => self.dsr_write(addr, value),
            0x6000 => {
                // Bank switch on write; the word offset selects the bank.
                self.cartridge_bank =
                    (usize::from(addr & 0x1FFF) >> 1) % self.cartridge_banks;
            }
            0x8000 => self.mmio_write(addr, value),
            _ => {
                if let Some(expansion) = &mut self.expansion {
                    ram_write(&mut expansion.hi, usize::from(addr - 0xA000), value);
                }
            }
        }
    }

    fn read_cru_bit(&mut self, bit: u16) -> bool {
        if bit < 0x400 {
            // The VDP interrupt line lands on pin 2, active low.
            if bit == 2 && !self.cru.timer_mode() {
                return !self.vdp.interrupt_pending();
            }
            return self.cru.read_bit(bit);
        }
        let base = (bit >> 7) << 8;
        for card in &mut self.cards {
            let card = card.as_dsr_mut();
            if card.cru_base() == base {
                return card.read_cru_bit(bit & 0x7F);
            }
        }
        true
    }

    fn write_cru_bit(&mut self, bit: u16, value: bool) {
        if bit < 0x400 {
            self.cru.write_bit(bit, value);
            return;
        }
        let base = (bit >> 7) << 8;
        for card in &mut self.cards {
            let card = card.as_dsr_mut();
            if card.cru_base() == base {
                card.write_cru_bit(bit & 0x7F, value);
                return;
            }
        }
    }

    fn interrupt_pending(&self) -> bool {
        self.cru.interrupt_pending(self.vdp.interrupt_pending())
    }

    fn suspend_pending(&self) -> bool {
        if self.speech.as_ref().is_some_and(|speech| !speech.ready()) {
            return true;
        }
        self.cards
            .iter()
            .any(|card| card.as_dsr().suspend_pending())
    }
}

impl Stateful for Memory {
    fn get_state(&self) -> Value {
        let mut state = json!({
            "scratchPad": state_bytes(&self.scratchpad),
            "cartridgeBank": self.cartridge_bank,
            "gromAddress": self.grom_address,
            "gromPrefetch": self.grom_prefetch,
            "gromLatchLow": self.grom_latch_low,
        });
        if let Some(expansion) = &self.expansion {
            state["expansionLo"] = state_bytes(&expansion.lo);
            state["expansionHi"] = state_bytes(&expansion.hi);
        }
        state
    }

    fn restore_state(&mut self, state: &Value) {
        if let Some(scratchpad) = state_get_bytes(state, "scratchPad") {
            if scratchpad.len() == self.scratchpad.len() {
                self.scratchpad.copy_from_slice(&scratchpad);
            }
        }
        if let Some(bank) = state.get("cartridgeBank").and_then(Value::as_u64) {
            self.cartridge_bank = (bank as usize) % self.cartridge_banks;
        }
        if let Some(addr) = state.get("gromAddress").and_then(Value::as_u64) {
            self.grom_address = addr as u16;
        }
        if let Some(prefetch) = state.get("gromPrefetch").and_then(Value::as_u64) {
            self.grom_prefetch = prefetch as u8;
        }
        if let Some(latch) = state.get("gromLatchLow").and_then(Value::as_bool) {
            self.grom_latch_low = latch;
        }
        if let Some(expansion) = &mut self.expansion {
            if let Some(lo) = state_get_bytes(state, "expansionLo") {
                if lo.len() == expansion.lo.len() {
                    expansion.lo = lo;
                }
            }
            if let Some(hi) = state_get_bytes(state, "expansionHi") {
                if hi.len() == expansion.hi.len() {
                    expansion.hi = hi;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::{DiskImage, SECTOR_SIZE};

    fn make_config() -> Ti99Config {
        let mut rom = vec![0u8; 0x2000];
        rom[0x100] = 0x12;
        rom[0x101] = 0x34;
        let mut grom = vec![0u8; 0x6000];
        for (i, byte) in grom.iter_mut().enumerate() {
            *byte = i as u8;
        }
        Ti99Config {
            rom,
            grom,
            ..Ti99Config::default()
        }
    }

    fn make_memory() -> Memory {
        Memory::new(&make_config())
    }

    #[test]
    fn console_rom_reads_words() {
        let mut memory = make_memory();
        assert_eq!(memory.read_word(0x0100), 0x1234);
        memory.write_word(0x0100, 0xFFFF);
        assert_eq!(memory.read_word(0x0100), 0x1234);
    }

    #[test]
    fn scratchpad_mirrors_through_the_whole_window() {
        let mut memory = make_memory();
        memory.write_word(0x8300, 0xBEEF);
        assert_eq!(memory.read_word(0x8300), 0xBEEF);
        assert_eq!(memory.read_word(0x8000), 0xBEEF);
        assert_eq!(memory.read_word(0x8200), 0xBEEF);
        assert_eq!(memory.peek_word(0x8100), 0xBEEF);
    }

    #[test]
    fn expansion_ram_covers_both_windows() {
        let mut memory = make_memory();
        memory.write_word(0x2000, 0xAAAA);
        memory.write_word(0xA000, 0x5555);
        memory.write_word(0xFFFE, 0x1234);
        assert_eq!(memory.read_word(0x2000), 0xAAAA);
        assert_eq!(memory.read_word(0xA000), 0x5555);
        assert_eq!(memory.read_word(0xFFFE), 0x1234);

        let config = Ti99Config {
            ram_32k: false,
            ..make_config()
        };
        let mut memory = Memory::new(&config);
        memory.write_word(0xA000, 0x5555);
        assert_eq!(memory.read_word(0xA000), 0);
    }

    #[test]
    fn cartridge_writes_switch_banks() {
        let mut cartridge = vec![0u8; 3 * 0x2000];
        cartridge[0] = 1;
        cartridge[0x2000] = 2;
        cartridge[0x4000] = 3;
        let config = Ti99Config {
            cartridge_rom: Some(cartridge),
            ..make_config()
        };
        let mut memory = Memory::new(&config);
        assert_eq!(memory.read_word(0x6000), 0x0100);

        memory.write_word(0x6002, 0);
        assert_eq!(memory.cartridge_bank(), 1);
        assert_eq!(memory.read_word(0x6000), 0x0200);

        memory.write_word(0x6004, 0);
        assert_eq!(memory.read_word(0x6000), 0x0300);

        // Bank count is not padded to a power of two; offsets wrap by modulo.
        memory.write_word(0x6006, 0);
        assert_eq!(memory.cartridge_bank(), 0);
    }

    #[test]
    fn grom_reads_follow_the_prefetch_protocol() {
        let mut memory = make_memory();
        memory.write_word(0x9C02, 0x0100);
        memory.write_word(0x9C02, 0x2000);
        assert_eq!(memory.read_word(0x9800) >> 8, 0x20);
        assert_eq!(memory.read_word(0x9800) >> 8, 0x21);
        assert_eq!(memory.read_word(0x9800) >> 8, 0x22);
    }

    #[test]
    fn grom_address_readback_serves_counter_plus_one() {
        let mut memory = make_memory();
        memory.write_word(0x9C02, 0x0100);
        memory.write_word(0x9C02, 0x2300);
        // Counter sits one past the prefetch; readback adds another one.
        assert_eq!(memory.read_word(0x9802) >> 8, 0x01);
        assert_eq!(memory.read_word(0x9802) >> 8, 0x25);
    }

    #[test]
    fn grom_counter_wraps_within_its_8k_bank() {
        let mut memory = make_memory();
        memory.write_word(0x9C02, 0x3F00);
        memory.write_word(0x9C02, 0xFF00);
        assert_eq!(memory.read_word(0x9800) >> 8, 0xFF);
        assert_eq!(memory.grom_address(), grom_increment(0x2000));
        assert_eq!(memory.read_word(0x9800) >> 8, 0x00);
    }

    #[test]
    fn vdp_ports_decode_by_address_bits() {
        let mut memory = make_memory();
        memory.write_word(0x8C02, 0x1000);
        memory.write_word(0x8C02, 0x4000);
        memory.write_word(0x8C00, 0xAB00);
        memory.write_word(0x8C00, 0xCD00);

        memory.write_word(0x8C02, 0x1000);
        memory.write_word(0x8C02, 0x0000);
        assert_eq!(memory.read_word(0x8800) >> 8, 0xAB);
        assert_eq!(memory.read_word(0x8800) >> 8, 0xCD);
    }

    #[test]
    fn vdp_interrupt_shows_on_cru_bit_2_active_low() {
        let mut memory = make_memory();
        assert!(memory.read_cru_bit(2));
        // Display + interrupts on, then run out the active area.
        memory.write_word(0x8C02, 0xE000);
        memory.write_word(0x8C02, 0x8100);
        memory.vdp_mut().init_frame();
        for y in 0..240 {
            memory.vdp_mut().draw_scanline(y);
        }
        assert!(!memory.read_cru_bit(2));
        assert!(!memory.interrupt_pending());
        memory.write_cru_bit(2, true);
        assert!(memory.interrupt_pending());
    }

    #[test]
    fn speech_fifo_overflow_suspends_the_bus() {
        let mut memory = make_memory();
        assert_eq!(memory.read_word(0x9000) >> 8, 0x60);
        memory.write_word(0x9400, 0x6000);
        for _ in 0..16 {
            memory.write_word(0x9400, 0x0000);
        }
        assert!(memory.suspend_pending());
        for _ in 0..16 {
            memory.tick_scanline();
        }
        assert!(!memory.suspend_pending());
    }

    #[test]
    fn cards_claim_cru_pages_and_the_dsr_window() {
        let mut memory = make_memory();
        let mut dsr = vec![0u8; 0x2000];
        dsr[0] = 0xAA;
        dsr[1] = 0x02;
        memory
            .register_card(CardSlot::Fdc(TiFdc::new(dsr)))
            .unwrap();

        assert_eq!(memory.read_word(0x4000), 0, "ROM disabled after insert");
        memory.write_cru_bit(0x880, true);
        assert_eq!(memory.read_word(0x4000), 0xAA02);
        assert!(memory.read_cru_bit(0x880));

        memory.write_cru_bit(0x880, false);
        assert_eq!(memory.read_word(0x4000), 0);
    }

    #[test]
    fn overlapping_cru_claims_are_rejected() {
        let mut memory = make_memory();
        memory
            .register_card(CardSlot::Fdc(TiFdc::new(Vec::new())))
            .unwrap();
        assert!(
            memory
                .register_card(CardSlot::Fdc(TiFdc::new(Vec::new())))
                .is_err()
        );
        assert!(memory.deregister_card("TIFDC").is_some());
        assert!(
            memory
                .register_card(CardSlot::Fdc(TiFdc::new(Vec::new())))
                .is_ok()
        );
    }

    #[test]
    fn fdc_sector_read_through_the_bus() {
        let mut memory = make_memory();
        memory
            .register_card(CardSlot::Fdc(TiFdc::new(vec![0; 0x2000])))
            .unwrap();
        let mut data = vec![0u8; 40 * 9 * SECTOR_SIZE];
        data[0] = 0x99;
        let image = DiskImage::single_sided(data).unwrap();
        memory.fdc_mut().unwrap().drive_mut(0).unwrap().insert(image);

        memory.write_cru_bit(0x880, true);
        memory.write_cru_bit(0x884, true);
        // Read sector 0: command register takes inverted bytes.
        memory.write_word(0x5FF8, u16::from(!0x80u8) << 8);
        let first = !(memory.read_word(0x5FF6) >> 8) as u8;
        assert_eq!(first, 0x99);
    }

    #[test]
    fn unclaimed_cru_bits_read_high() {
        let mut memory = make_memory();
        assert!(memory.read_cru_bit(0x700));
        memory.write_cru_bit(0x700, false);
        assert!(memory.read_cru_bit(0x700));
    }

    #[test]
    fn state_round_trips_ram_and_counters() {
        let mut memory = make_memory();
        memory.write_word(0x8300, 0xCAFE);
        memory.write_word(0x2000, 0x1111);
        memory.write_word(0x9C02, 0x0100);
        memory.write_word(0x9C02, 0x2000);

        let state = memory.get_state();
        let mut restored = make_memory();
        restored.restore_state(&state);
        assert_eq!(restored.read_word(0x8300), 0xCAFE);
        assert_eq!(restored.read_word(0x2000), 0x1111);
        assert_eq!(restored.grom_address(), memory.grom_address());
        assert_eq!(restored.read_word(0x9800), memory.read_word(0x9800));
    }
}
