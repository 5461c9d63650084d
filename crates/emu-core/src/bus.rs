//! Memory and CRU bus interface.

/// Memory and CRU bus interface.
///
/// The CPU sees a 16-bit word-oriented address space plus a separate
/// bit-serial CRU space. Byte instructions still perform full word
/// accesses on the hardware, so the bus only deals in words; the CPU
/// extracts and merges bytes itself.
pub trait Bus {
    /// Read a word. The low address bit is ignored by implementations.
    fn read_word(&mut self, addr: u16) -> u16;

    /// Write a word. The low address bit is ignored by implementations.
    fn write_word(&mut self, addr: u16, value: u16);

    /// Read a single CRU bit. `bit` is the bit address (R12 base / 2 plus
    /// displacement), not the R12 byte address.
    fn read_cru_bit(&mut self, bit: u16) -> bool;

    /// Write a single CRU bit.
    fn write_cru_bit(&mut self, bit: u16, value: bool);

    /// Level of the interrupt request line into the CPU.
    ///
    /// Sampled between instructions; the bus aggregates whatever sources
    /// it routes (video frame interrupt, timer, peripheral cards).
    fn interrupt_pending(&self) -> bool {
        false
    }

    /// True when a slow peripheral needs the processor held (speech FIFO
    /// full, serial bridge transport offline). Polled at instruction
    /// boundaries; the run loop stops early and the frame scheduler keeps
    /// rendering and accounting while the unit stays suspended.
    fn suspend_pending(&self) -> bool {
        false
    }
}
