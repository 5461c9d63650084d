//! Instruction decode and execution.
//!
//! Opcodes are decoded by range, widest formats first. Cycle costs are
//! the datasheet base counts; addressing-mode extras are added as each
//! general-address operand is resolved.

use emu_core::Bus;

use crate::cpu::Tms9900;
use crate::status::{
    LAE, ST_AGT, ST_C, ST_EQ, ST_INT_MASK, ST_LGT, ST_OP, ST_OV, ST_X, compare_byte,
    compare_word, lae_byte, lae_word, odd_parity,
};

impl Tms9900 {
    /// Fetch and run one instruction at PC.
    pub(crate) fn execute_instruction<B: Bus>(&mut self, bus: &mut B) {
        let opcode = self.fetch(bus);
        self.execute_opcode(bus, opcode);
    }

    fn fetch<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let word = bus.read_word(self.pc);
        self.pc = self.pc.wrapping_add(2);
        word
    }

    fn execute_opcode<B: Bus>(&mut self, bus: &mut B, opcode: u16) {
        if opcode >= 0x4000 {
            self.dual_operand(bus, opcode);
        } else if opcode >= 0x2000 {
            self.dual_operand_register(bus, opcode);
        } else if opcode >= 0x1000 {
            self.jump_or_cru_bit(bus, opcode);
        } else if opcode >= 0x0800 {
            self.shift(bus, opcode);
        } else if opcode >= 0x0400 {
            self.single_operand(bus, opcode);
        } else if opcode >= 0x0200 {
            self.immediate_or_control(bus, opcode);
        } else {
            self.count_illegal_op();
            self.add_cycles(6);
        }
    }

    // === Operand addressing ===

    /// Resolve a general-address operand (Ts/S or Td/D field pair) to an
    /// effective byte address, charging the addressing-mode extra cycles.
    fn resolve_ea<B: Bus>(&mut self, bus: &mut B, mode: u16, r: u16, byte: bool) -> u16 {
        match mode {
            0 => self.reg_addr(r),
            1 => {
                self.add_cycles(4);
                self.read_reg(bus, r)
            }
            2 => {
                self.add_cycles(8);
                let base = self.fetch(bus);
                if r == 0 {
                    base
                } else {
                    base.wrapping_add(self.read_reg(bus, r))
                }
            }
            _ => {
                // Auto-increment: EA is the pre-increment value; the
                // register steps by the operand size.
                self.add_cycles(if byte { 6 } else { 8 });
                let addr = self.read_reg(bus, r);
                let inc = if byte { 1 } else { 2 };
                self.write_reg(bus, r, addr.wrapping_add(inc));
                addr
            }
        }
    }

    /// Read one byte. The bus is word-wide; even addresses select the
    /// most significant byte.
    fn read_byte_at<B: Bus>(&mut self, bus: &mut B, addr: u16) -> u8 {
        let word = bus.read_word(addr);
        if addr & 1 == 0 {
            (word >> 8) as u8
        } else {
            (word & 0xFF) as u8
        }
    }

    /// Write one byte via a word read-modify-write, as the hardware does.
    fn write_byte_at<B: Bus>(&mut self, bus: &mut B, addr: u16, value: u8) {
        let word = bus.read_word(addr);
        let merged = if addr & 1 == 0 {
            (u16::from(value) << 8) | (word & 0x00FF)
        } else {
            (word & 0xFF00) | u16::from(value)
        };
        bus.write_word(addr, merged);
    }

    // === Flag arithmetic ===

    /// `a + b`, setting C on carry out and OV on signed overflow.
    fn add_word(&mut self, a: u16, b: u16) -> u16 {
        let (result, carry) = a.overflowing_add(b);
        self.st &= !(ST_C | ST_OV);
        if carry {
            self.st |= ST_C;
        }
        if !(a ^ b) & (a ^ result) & 0x8000 != 0 {
            self.st |= ST_OV;
        }
        result
    }

    /// `d - s` with the 9900's borrow convention: C set when no borrow
    /// (the carry out of `d + !s + 1`).
    fn sub_word(&mut self, s: u16, d: u16) -> u16 {
        let result = d.wrapping_sub(s);
        self.st &= !(ST_C | ST_OV);
        if d >= s {
            self.st |= ST_C;
        }
        if (d ^ s) & (d ^ result) & 0x8000 != 0 {
            self.st |= ST_OV;
        }
        result
    }

    fn add_byte(&mut self, a: u8, b: u8) -> u8 {
        let (result, carry) = a.overflowing_add(b);
        self.st &= !(ST_C | ST_OV);
        if carry {
            self.st |= ST_C;
        }
        if !(a ^ b) & (a ^ result) & 0x80 != 0 {
            self.st |= ST_OV;
        }
        result
    }

    fn sub_byte(&mut self, s: u8, d: u8) -> u8 {
        let result = d.wrapping_sub(s);
        self.st &= !(ST_C | ST_OV);
        if d >= s {
            self.st |= ST_C;
        }
        if (d ^ s) & (d ^ result) & 0x80 != 0 {
            self.st |= ST_OV;
        }
        result
    }

    /// CRU bit address: R12 is a byte base, so the bit base is R12/2.
    fn cru_bit_addr<B: Bus>(&mut self, bus: &mut B, disp: i8) -> u16 {
        let base = (self.read_reg(bus, 12) >> 1) & 0x0FFF;
        base.wrapping_add(i16::from(disp) as u16) & 0x0FFF
    }

    // === Format I: dual operand, general addressing both sides ===

    fn dual_operand<B: Bus>(&mut self, bus: &mut B, opcode: u16) {
        let byte = opcode & 0x1000 != 0;
        let ts = (opcode >> 4) & 3;
        let s = opcode & 0xF;
        let td = (opcode >> 10) & 3;
        let d = (opcode >> 6) & 0xF;
        let op = opcode >> 13;
        self.add_cycles(14);

        if byte {
            let src_addr = self.resolve_ea(bus, ts, s, true);
            let sv = self.read_byte_at(bus, src_addr);
            let dst_addr = self.resolve_ea(bus, td, d, true);
            match op {
                2 => {
                    // SZCB: clear the source's one bits in the destination
                    let dv = self.read_byte_at(bus, dst_addr);
                    let result = dv & !sv;
                    self.st = (self.st & !(LAE | ST_OP)) | lae_byte(result) | odd_parity(result);
                    self.write_byte_at(bus, dst_addr, result);
                }
                3 => {
                    // SB
                    let dv = self.read_byte_at(bus, dst_addr);
                    let result = self.sub_byte(sv, dv);
                    self.st = (self.st & !(LAE | ST_OP)) | lae_byte(result) | odd_parity(result);
                    self.write_byte_at(bus, dst_addr, result);
                }
                4 => {
                    // CB: parity from the source operand
                    let dv = self.read_byte_at(bus, dst_addr);
                    self.st = (self.st & !(LAE | ST_OP)) | compare_byte(sv, dv) | odd_parity(sv);
                }
                5 => {
                    // AB
                    let dv = self.read_byte_at(bus, dst_addr);
                    let result = self.add_byte(sv, dv);
                    self.st = (self.st & !(LAE | ST_OP)) | lae_byte(result) | odd_parity(result);
                    self.write_byte_at(bus, dst_addr, result);
                }
                6 => {
                    // MOVB
                    self.st = (self.st & !(LAE | ST_OP)) | lae_byte(sv) | odd_parity(sv);
                    self.write_byte_at(bus, dst_addr, sv);
                }
                _ => {
                    // SOCB: set the source's one bits in the destination
                    let dv = self.read_byte_at(bus, dst_addr);
                    let result = dv | sv;
                    self.st = (self.st & !(LAE | ST_OP)) | lae_byte(result) | odd_parity(result);
                    self.write_byte_at(bus, dst_addr, result);
                }
            }
        } else {
            let src_addr = self.resolve_ea(bus, ts, s, false);
            let sv = bus.read_word(src_addr);
            let dst_addr = self.resolve_ea(bus, td, d, false);
            match op {
                2 => {
                    // SZC
                    let dv = bus.read_word(dst_addr);
                    let result = dv & !sv;
                    self.st = (self.st & !LAE) | lae_word(result);
                    bus.write_word(dst_addr, result);
                }
                3 => {
                    // S
                    let dv = bus.read_word(dst_addr);
                    let result = self.sub_word(sv, dv);
                    self.st = (self.st & !LAE) | lae_word(result);
                    bus.write_word(dst_addr, result);
                }
                4 => {
                    // C
                    let dv = bus.read_word(dst_addr);
                    self.st = (self.st & !LAE) | compare_word(sv, dv);
                }
                5 => {
                    // A
                    let dv = bus.read_word(dst_addr);
                    let result = self.add_word(sv, dv);
                    self.st = (self.st & !LAE) | lae_word(result);
                    bus.write_word(dst_addr, result);
                }
                6 => {
                    // MOV
                    self.st = (self.st & !LAE) | lae_word(sv);
                    bus.write_word(dst_addr, sv);
                }
                _ => {
                    // SOC
                    let dv = bus.read_word(dst_addr);
                    let result = dv | sv;
                    self.st = (self.st & !LAE) | lae_word(result);
                    bus.write_word(dst_addr, result);
                }
            }
        }
    }

    // === Formats III, IV, IX: general source, register destination ===

    fn dual_operand_register<B: Bus>(&mut self, bus: &mut B, opcode: u16) {
        let sub = (opcode >> 10) & 7;
        let ts = (opcode >> 4) & 3;
        let s = opcode & 0xF;
        let d = (opcode >> 6) & 0xF;

        match sub {
            0 => {
                // COC: EQ when every one bit of the source is set in Rd
                self.add_cycles(14);
                let src_addr = self.resolve_ea(bus, ts, s, false);
                let sv = bus.read_word(src_addr);
                let dv = self.read_reg(bus, d);
                if sv & dv == sv {
                    self.st |= ST_EQ;
                } else {
                    self.st &= !ST_EQ;
                }
            }
            1 => {
                // CZC: EQ when every one bit of the source is clear in Rd
                self.add_cycles(14);
                let src_addr = self.resolve_ea(bus, ts, s, false);
                let sv = bus.read_word(src_addr);
                let dv = self.read_reg(bus, d);
                if sv & dv == 0 {
                    self.st |= ST_EQ;
                } else {
                    self.st &= !ST_EQ;
                }
            }
            2 => {
                // XOR
                self.add_cycles(14);
                let src_addr = self.resolve_ea(bus, ts, s, false);
                let sv = bus.read_word(src_addr);
                let result = self.read_reg(bus, d) ^ sv;
                self.st = (self.st & !LAE) | lae_word(result);
                self.write_reg(bus, d, result);
            }
            3 => {
                // XOP: context switch through vector 0x0040 + 4n with the
                // operand address handed to the new workspace in R11
                self.add_cycles(36);
                let src_addr = self.resolve_ea(bus, ts, s, false);
                self.context_switch(bus, 0x0040 + (d << 2));
                self.write_reg(bus, 11, src_addr);
                self.st |= ST_X;
            }
            4 => self.ldcr(bus, ts, s, d),
            5 => self.stcr(bus, ts, s, d),
            6 => {
                // MPY: unsigned 16x16 into the register pair d, d+1
                self.add_cycles(52);
                let src_addr = self.resolve_ea(bus, ts, s, false);
                let sv = bus.read_word(src_addr);
                let product = u32::from(sv) * u32::from(self.read_reg(bus, d));
                self.write_reg(bus, d, (product >> 16) as u16);
                self.write_reg(bus, d + 1, (product & 0xFFFF) as u16);
            }
            _ => {
                // DIV: 32/16 unsigned from the pair d, d+1; aborts with OV
                // when the quotient would not fit
                let src_addr = self.resolve_ea(bus, ts, s, false);
                let divisor = bus.read_word(src_addr);
                let hi = self.read_reg(bus, d);
                if divisor <= hi {
                    self.st |= ST_OV;
                    self.add_cycles(16);
                } else {
                    self.st &= !ST_OV;
                    let lo = self.read_reg(bus, d + 1);
                    let dividend = (u32::from(hi) << 16) | u32::from(lo);
                    self.write_reg(bus, d, (dividend / u32::from(divisor)) as u16);
                    self.write_reg(bus, d + 1, (dividend % u32::from(divisor)) as u16);
                    self.add_cycles(92);
                }
            }
        }
    }

    /// LDCR: serialise 1-16 bits of the operand onto the CRU, LSB first.
    fn ldcr<B: Bus>(&mut self, bus: &mut B, ts: u16, s: u16, count: u16) {
        let count = if count == 0 { 16 } else { count };
        self.add_cycles(20 + 2 * u64::from(count));
        let value = if count <= 8 {
            let src_addr = self.resolve_ea(bus, ts, s, true);
            let v = self.read_byte_at(bus, src_addr);
            self.st = (self.st & !(LAE | ST_OP)) | lae_byte(v) | odd_parity(v);
            u16::from(v)
        } else {
            let src_addr = self.resolve_ea(bus, ts, s, false);
            let v = bus.read_word(src_addr);
            self.st = (self.st & !LAE) | lae_word(v);
            v
        };
        let base = self.cru_bit_addr(bus, 0);
        for i in 0..count {
            bus.write_cru_bit(base.wrapping_add(i) & 0x0FFF, value >> i & 1 != 0);
        }
    }

    /// STCR: assemble 1-16 CRU bits into the operand, LSB first.
    fn stcr<B: Bus>(&mut self, bus: &mut B, ts: u16, s: u16, count: u16) {
        let count = if count == 0 { 16 } else { count };
        self.add_cycles(match count {
            8 => 44,
            16 => 60,
            c if c < 8 => 42,
            _ => 58,
        });
        let byte = count <= 8;
        let dst_addr = self.resolve_ea(bus, ts, s, byte);
        let base = self.cru_bit_addr(bus, 0);
        let mut value: u16 = 0;
        for i in 0..count {
            if bus.read_cru_bit(base.wrapping_add(i) & 0x0FFF) {
                value |= 1 << i;
            }
        }
        if byte {
            let v = value as u8;
            self.st = (self.st & !(LAE | ST_OP)) | lae_byte(v) | odd_parity(v);
            self.write_byte_at(bus, dst_addr, v);
        } else {
            self.st = (self.st & !LAE) | lae_word(value);
            bus.write_word(dst_addr, value);
        }
    }

    // === Format II: jumps and CRU single-bit ===

    fn jump_or_cru_bit<B: Bus>(&mut self, bus: &mut B, opcode: u16) {
        let sub = (opcode >> 8) & 0xF;
        let disp = (opcode & 0xFF) as i8;

        match sub {
            0xD => {
                // SBO
                self.add_cycles(12);
                let bit = self.cru_bit_addr(bus, disp);
                bus.write_cru_bit(bit, true);
            }
            0xE => {
                // SBZ
                self.add_cycles(12);
                let bit = self.cru_bit_addr(bus, disp);
                bus.write_cru_bit(bit, false);
            }
            0xF => {
                // TB
                self.add_cycles(12);
                let bit = self.cru_bit_addr(bus, disp);
                if bus.read_cru_bit(bit) {
                    self.st |= ST_EQ;
                } else {
                    self.st &= !ST_EQ;
                }
            }
            _ => {
                let take = match sub {
                    0x0 => true,                                            // JMP
                    0x1 => self.st & (ST_AGT | ST_EQ) == 0,                 // JLT
                    0x2 => self.st & ST_LGT == 0 || self.st & ST_EQ != 0,   // JLE
                    0x3 => self.st & ST_EQ != 0,                            // JEQ
                    0x4 => self.st & (ST_LGT | ST_EQ) != 0,                 // JHE
                    0x5 => self.st & ST_AGT != 0,                           // JGT
                    0x6 => self.st & ST_EQ == 0,                            // JNE
                    0x7 => self.st & ST_C == 0,                             // JNC
                    0x8 => self.st & ST_C != 0,                             // JOC
                    0x9 => self.st & ST_OV == 0,                            // JNO
                    0xA => self.st & (ST_LGT | ST_EQ) == 0,                 // JL
                    0xB => self.st & ST_LGT != 0 && self.st & ST_EQ == 0,   // JH
                    _ => self.st & ST_OP != 0,                              // JOP
                };
                if take {
                    self.pc = self.pc.wrapping_add((i16::from(disp) * 2) as u16);
                    self.add_cycles(10);
                } else {
                    self.add_cycles(8);
                }
            }
        }
    }

    // === Format V: shifts ===

    fn shift<B: Bus>(&mut self, bus: &mut B, opcode: u16) {
        let kind = (opcode >> 8) & 3;
        let r = opcode & 0xF;
        let mut count = (opcode >> 4) & 0xF;
        if count == 0 {
            // Count comes from R0; zero there means a full 16 bits
            self.add_cycles(8);
            count = self.read_reg(bus, 0) & 0xF;
            if count == 0 {
                count = 16;
            }
        }
        self.add_cycles(12 + 2 * u64::from(count));

        let value = self.read_reg(bus, r);
        let c = u32::from(count);

        let (result, carry) = match kind {
            0 => {
                // SRA: sign propagates in from the left
                let carry = (i32::from(value as i16) >> (c - 1)) & 1 != 0;
                (((i32::from(value as i16) >> c) & 0xFFFF) as u16, carry)
            }
            1 => {
                // SRL
                let carry = (u32::from(value) >> (c - 1)) & 1 != 0;
                ((u32::from(value) >> c) as u16, carry)
            }
            2 => {
                // SLA: OV when the sign bit changes during the shift
                let wide = u32::from(value) << c;
                let ov = if c == 16 {
                    value != 0
                } else {
                    let mask = 0xFFFF_u16 << (15 - c);
                    let top = value & mask;
                    top != 0 && top != mask
                };
                self.st &= !ST_OV;
                if ov {
                    self.st |= ST_OV;
                }
                ((wide & 0xFFFF) as u16, wide & 0x1_0000 != 0)
            }
            _ => {
                // SRC: rotate right
                (value.rotate_right(c), value >> (c - 1) & 1 != 0)
            }
        };

        self.st = (self.st & !(LAE | ST_C)) | lae_word(result);
        if carry {
            self.st |= ST_C;
        }
        self.write_reg(bus, r, result);
    }

    // === Format VI: single operand ===

    fn single_operand<B: Bus>(&mut self, bus: &mut B, opcode: u16) {
        let sub = (opcode >> 6) & 0xF;
        let ts = (opcode >> 4) & 3;
        let s = opcode & 0xF;

        match sub {
            0 => {
                // BLWP: the operand is a two-word transfer vector
                self.add_cycles(26);
                let ea = self.resolve_ea(bus, ts, s, false);
                self.context_switch(bus, ea);
            }
            1 => {
                // B
                self.add_cycles(8);
                let ea = self.resolve_ea(bus, ts, s, false);
                self.pc = ea & 0xFFFE;
            }
            2 => {
                // X: execute the word at the operand as an instruction;
                // its extension words come from the normal PC stream
                self.add_cycles(4);
                let ea = self.resolve_ea(bus, ts, s, false);
                let inner = bus.read_word(ea);
                self.execute_opcode(bus, inner);
            }
            3 => {
                // CLR (no status effect)
                self.add_cycles(10);
                let ea = self.resolve_ea(bus, ts, s, false);
                bus.write_word(ea, 0);
            }
            4 => {
                // NEG
                self.add_cycles(12);
                let ea = self.resolve_ea(bus, ts, s, false);
                let v = bus.read_word(ea);
                let result = self.sub_word(v, 0);
                self.st = (self.st & !LAE) | lae_word(result);
                bus.write_word(ea, result);
            }
            5 => {
                // INV
                self.add_cycles(10);
                let ea = self.resolve_ea(bus, ts, s, false);
                let result = !bus.read_word(ea);
                self.st = (self.st & !LAE) | lae_word(result);
                bus.write_word(ea, result);
            }
            6 => self.step_operand(bus, ts, s, 1),
            7 => self.step_operand(bus, ts, s, 2),
            8 => self.step_operand(bus, ts, s, 0xFFFF),
            9 => self.step_operand(bus, ts, s, 0xFFFE),
            10 => {
                // BL: return address in R11
                self.add_cycles(12);
                let ea = self.resolve_ea(bus, ts, s, false);
                self.write_reg(bus, 11, self.pc);
                self.pc = ea & 0xFFFE;
            }
            11 => {
                // SWPB (no status effect)
                self.add_cycles(10);
                let ea = self.resolve_ea(bus, ts, s, false);
                let v = bus.read_word(ea);
                bus.write_word(ea, v.rotate_left(8));
            }
            12 => {
                // SETO (no status effect)
                self.add_cycles(10);
                let ea = self.resolve_ea(bus, ts, s, false);
                bus.write_word(ea, 0xFFFF);
            }
            13 => {
                // ABS: status compares the original operand against zero;
                // the negate and write-back cost two extra cycles
                self.add_cycles(12);
                let ea = self.resolve_ea(bus, ts, s, false);
                let v = bus.read_word(ea);
                self.st = (self.st & !(LAE | ST_C | ST_OV)) | lae_word(v);
                if v == 0x8000 {
                    self.st |= ST_OV;
                }
                if v & 0x8000 != 0 {
                    self.add_cycles(2);
                    bus.write_word(ea, v.wrapping_neg());
                }
            }
            _ => {
                self.count_illegal_op();
                self.add_cycles(6);
            }
        }
    }

    /// INC/INCT/DEC/DECT share one add-and-write-back path.
    fn step_operand<B: Bus>(&mut self, bus: &mut B, ts: u16, s: u16, delta: u16) {
        self.add_cycles(10);
        let ea = self.resolve_ea(bus, ts, s, false);
        let v = bus.read_word(ea);
        let result = self.add_word(v, delta);
        self.st = (self.st & !LAE) | lae_word(result);
        bus.write_word(ea, result);
    }

    // === Formats VII, VIII: immediates and control ===

    fn immediate_or_control<B: Bus>(&mut self, bus: &mut B, opcode: u16) {
        let sub = (opcode >> 5) & 0xF;
        let r = opcode & 0xF;

        match sub {
            0 => {
                // LI
                self.add_cycles(12);
                let imm = self.fetch(bus);
                self.st = (self.st & !LAE) | lae_word(imm);
                self.write_reg(bus, r, imm);
            }
            1 => {
                // AI
                self.add_cycles(14);
                let imm = self.fetch(bus);
                let result = self.add_word(self.read_reg(bus, r), imm);
                self.st = (self.st & !LAE) | lae_word(result);
                self.write_reg(bus, r, result);
            }
            2 => {
                // ANDI
                self.add_cycles(14);
                let imm = self.fetch(bus);
                let result = self.read_reg(bus, r) & imm;
                self.st = (self.st & !LAE) | lae_word(result);
                self.write_reg(bus, r, result);
            }
            3 => {
                // ORI
                self.add_cycles(14);
                let imm = self.fetch(bus);
                let result = self.read_reg(bus, r) | imm;
                self.st = (self.st & !LAE) | lae_word(result);
                self.write_reg(bus, r, result);
            }
            4 => {
                // CI
                self.add_cycles(14);
                let imm = self.fetch(bus);
                let v = self.read_reg(bus, r);
                self.st = (self.st & !LAE) | compare_word(v, imm);
            }
            5 => {
                // STWP
                self.add_cycles(8);
                self.write_reg(bus, r, self.wp);
            }
            6 => {
                // STST
                self.add_cycles(8);
                self.write_reg(bus, r, self.st);
            }
            7 => {
                // LWPI
                self.add_cycles(10);
                self.wp = self.fetch(bus) & 0xFFFE;
            }
            8 => {
                // LIMI
                self.add_cycles(16);
                let imm = self.fetch(bus);
                self.st = (self.st & !ST_INT_MASK) | (imm & ST_INT_MASK);
            }
            10 => {
                // IDLE
                self.add_cycles(12);
                self.idle = true;
            }
            11 => {
                // RSET: drop the interrupt mask to zero
                self.add_cycles(12);
                self.st &= !ST_INT_MASK;
            }
            12 => {
                // RTWP: restore ST/PC/WP from the current workspace
                self.add_cycles(14);
                let st = self.read_reg(bus, 15);
                let pc = self.read_reg(bus, 14);
                let wp = self.read_reg(bus, 13);
                self.st = st;
                self.pc = pc & 0xFFFE;
                self.wp = wp & 0xFFFE;
            }
            13 | 14 | 15 => {
                // CKON/CKOF/LREX drive external control lines; nothing is
                // wired to them in this machine
                self.add_cycles(12);
            }
            _ => {
                self.count_illegal_op();
                self.add_cycles(6);
            }
        }
    }
}
