//! Unit tests for TMS9900 instruction behavior.

use emu_core::{Bus, ExecutionUnit, Stateful};
use ti_tms9900::{ST_AGT, ST_C, ST_EQ, ST_LGT, ST_OP, ST_OV, ST_X, Tms9900};

/// Flat 64 KiB of word-addressed RAM plus a 4096-bit CRU space.
struct RamBus {
    ram: Vec<u16>,
    cru: Vec<bool>,
    int_line: bool,
}

impl RamBus {
    fn new() -> Self {
        Self {
            ram: vec![0; 0x8000],
            cru: vec![false; 0x1000],
            int_line: false,
        }
    }

    /// Load words starting at an even address.
    fn load(&mut self, addr: u16, words: &[u16]) {
        for (i, &w) in words.iter().enumerate() {
            self.ram[usize::from(addr >> 1) + i] = w;
        }
    }

    fn word(&self, addr: u16) -> u16 {
        self.ram[usize::from(addr >> 1)]
    }
}

impl Bus for RamBus {
    fn read_word(&mut self, addr: u16) -> u16 {
        self.ram[usize::from(addr >> 1)]
    }

    fn write_word(&mut self, addr: u16, value: u16) {
        self.ram[usize::from(addr >> 1)] = value;
    }

    fn read_cru_bit(&mut self, bit: u16) -> bool {
        self.cru[usize::from(bit & 0x0FFF)]
    }

    fn write_cru_bit(&mut self, bit: u16, value: bool) {
        self.cru[usize::from(bit & 0x0FFF)] = value;
    }

    fn interrupt_pending(&self) -> bool {
        self.int_line
    }
}

const WP: u16 = 0x8300;
const ORG: u16 = 0x0100;

/// Place a program at 0x0100 with the workspace at 0x8300.
fn setup(bus: &mut RamBus, cpu: &mut Tms9900, program: &[u16]) {
    bus.load(ORG, program);
    cpu.set_wp(WP);
    cpu.set_pc(ORG);
}

fn reg(bus: &RamBus, r: u16) -> u16 {
    bus.word(WP + r * 2)
}

fn set_reg(bus: &mut RamBus, r: u16, value: u16) {
    bus.load(WP + r * 2, &[value]);
}

fn step_n(cpu: &mut Tms9900, bus: &mut RamBus, n: usize) {
    for _ in 0..n {
        cpu.step(bus);
    }
}

#[test]
fn test_li_sets_register_and_flags() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // LI R1,>1234; LI R2,>8000; LI R3,>0000
    let program = [0x0201, 0x1234, 0x0202, 0x8000, 0x0203, 0x0000];
    setup(&mut bus, &mut cpu, &program);

    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 1), 0x1234);
    assert_eq!(cpu.st() & (ST_LGT | ST_AGT | ST_EQ), ST_LGT | ST_AGT);

    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 2), 0x8000);
    assert_eq!(
        cpu.st() & (ST_LGT | ST_AGT | ST_EQ),
        ST_LGT,
        "negative value is logically but not arithmetically greater than zero"
    );

    cpu.step(&mut bus);
    assert_eq!(cpu.st() & (ST_LGT | ST_AGT | ST_EQ), ST_EQ);
}

#[test]
fn test_add_carry_and_overflow() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // A R1,R2 three times over different operand pairs
    let program = [0xA081, 0xA081, 0xA081];
    setup(&mut bus, &mut cpu, &program);

    // 0x7FFF + 1: signed overflow, no carry
    set_reg(&mut bus, 1, 0x0001);
    set_reg(&mut bus, 2, 0x7FFF);
    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 2), 0x8000);
    assert!(cpu.st() & ST_OV != 0, "positive + positive = negative sets OV");
    assert!(cpu.st() & ST_C == 0);

    // 0xFFFF + 1: carry out, result zero
    set_reg(&mut bus, 1, 0x0001);
    set_reg(&mut bus, 2, 0xFFFF);
    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 2), 0x0000);
    assert!(cpu.st() & ST_C != 0, "wrap past 0xFFFF sets carry");
    assert!(cpu.st() & ST_OV == 0);
    assert!(cpu.st() & ST_EQ != 0);

    // 0x8000 + 0x8000: both carry and overflow
    set_reg(&mut bus, 1, 0x8000);
    set_reg(&mut bus, 2, 0x8000);
    cpu.step(&mut bus);
    assert!(cpu.st() & ST_C != 0);
    assert!(cpu.st() & ST_OV != 0, "negative + negative = zero sets OV");
}

#[test]
fn test_subtract_borrow_convention() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // S R1,R2 twice
    let program = [0x6081, 0x6081];
    setup(&mut bus, &mut cpu, &program);

    // 5 - 3: no borrow, so carry is SET
    set_reg(&mut bus, 1, 3);
    set_reg(&mut bus, 2, 5);
    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 2), 2);
    assert!(cpu.st() & ST_C != 0, "no borrow sets carry");

    // 3 - 5: borrow, so carry is CLEAR
    set_reg(&mut bus, 1, 5);
    set_reg(&mut bus, 2, 3);
    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 2), 0xFFFE);
    assert!(cpu.st() & ST_C == 0, "borrow clears carry");
}

#[test]
fn test_compare_logical_vs_arithmetic() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // C R1,R2; CI R1,>FFFF
    let program = [0x8081, 0x0281, 0xFFFF];
    setup(&mut bus, &mut cpu, &program);

    // 0xFFFF vs 1: logically greater, arithmetically smaller (-1 < 1)
    set_reg(&mut bus, 1, 0xFFFF);
    set_reg(&mut bus, 2, 0x0001);
    cpu.step(&mut bus);
    assert!(cpu.st() & ST_LGT != 0);
    assert!(cpu.st() & ST_AGT == 0);
    assert!(cpu.st() & ST_EQ == 0);

    cpu.step(&mut bus);
    assert!(cpu.st() & ST_EQ != 0, "CI against the same value sets EQ");
}

#[test]
fn test_byte_ops_address_the_correct_half() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // MOVB @>0401,R2; SB @>0401,@>0403
    let program = [0xD0A0, 0x0401, 0x7820, 0x0401, 0x0403];
    setup(&mut bus, &mut cpu, &program);

    // 0x0400 holds 0x12 0x34; 0x0402 holds 0x56 0x78
    bus.load(0x0400, &[0x1234, 0x5678]);
    set_reg(&mut bus, 2, 0xFFFF);

    cpu.step(&mut bus);
    assert_eq!(
        reg(&bus, 2),
        0x34FF,
        "register byte destination is the high byte; low byte untouched"
    );
    assert!(
        cpu.st() & ST_OP != 0,
        "0x34 has three one bits, parity is odd"
    );

    cpu.step(&mut bus);
    assert_eq!(
        bus.word(0x0402),
        0x5644,
        "0x78 - 0x34 lands in the odd byte, even byte untouched"
    );
}

#[test]
fn test_cb_parity_comes_from_source() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // CB R1,R2
    let program = [0x9081];
    setup(&mut bus, &mut cpu, &program);

    // Source byte 0x01 (odd parity), destination byte 0x03 (even parity)
    set_reg(&mut bus, 1, 0x0100);
    set_reg(&mut bus, 2, 0x0300);
    cpu.step(&mut bus);
    assert!(cpu.st() & ST_OP != 0, "OP reflects the source operand");
}

#[test]
fn test_autoincrement_steps_by_operand_size() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // MOV *R1+,R2; MOVB *R1+,R3
    let program = [0xC0B1, 0xD0F1];
    setup(&mut bus, &mut cpu, &program);

    bus.load(0x0400, &[0xBEEF, 0xCA00]);
    set_reg(&mut bus, 1, 0x0400);

    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 2), 0xBEEF);
    assert_eq!(reg(&bus, 1), 0x0402, "word access increments by 2");

    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 3) >> 8, 0xCA);
    assert_eq!(reg(&bus, 1), 0x0403, "byte access increments by 1");
}

#[test]
fn test_symbolic_and_indexed_addressing() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // MOV @>0400,@>0002(R3)
    let program = [0xC8E0, 0x0400, 0x0002];
    setup(&mut bus, &mut cpu, &program);

    bus.load(0x0400, &[0x5A5A]);
    set_reg(&mut bus, 3, 0x0500);

    cpu.step(&mut bus);
    assert_eq!(bus.word(0x0502), 0x5A5A, "indexed destination is base + R3");
}

#[test]
fn test_jump_takes_and_falls_through() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    let program = [
        0x0201, 0x0000, // LI R1,>0000       @ 0x0100 (sets EQ)
        0x1302, //         JEQ >010A         @ 0x0104 (taken)
        0x0202, 0x00AA, // LI R2,>00AA       @ 0x0106 (skipped)
        0x0203, 0x0001, // LI R3,>0001       @ 0x010A (clears EQ)
        0x1302, //         JEQ >0114         @ 0x010E (not taken)
        0x0204, 0x00BB, // LI R4,>00BB       @ 0x0110
    ];
    setup(&mut bus, &mut cpu, &program);

    step_n(&mut cpu, &mut bus, 5);
    assert_eq!(reg(&bus, 2), 0, "taken jump skips the load");
    assert_eq!(reg(&bus, 4), 0x00BB, "untaken jump falls through");
}

#[test]
fn test_jump_displacement_is_words_from_next_instruction() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // JMP backward over itself: at 0x0100, JMP -1 loops forever
    let program = [0x10FF];
    setup(&mut bus, &mut cpu, &program);

    cpu.step(&mut bus);
    assert_eq!(cpu.pc(), ORG, "displacement -1 re-executes the jump");
}

#[test]
fn test_bl_records_return_address() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // BL @>0180; INC R1    subroutine at 0x0180: INC R2; B *R11
    let program = [0x06A0, 0x0180, 0x0581];
    setup(&mut bus, &mut cpu, &program);
    bus.load(0x0180, &[0x0582, 0x045B]);

    cpu.step(&mut bus);
    assert_eq!(cpu.pc(), 0x0180);
    assert_eq!(reg(&bus, 11), ORG + 4, "R11 holds the return address");

    step_n(&mut cpu, &mut bus, 3);
    assert_eq!(reg(&bus, 2), 1, "subroutine body ran");
    assert_eq!(reg(&bus, 1), 1, "B *R11 returned to the caller");
}

#[test]
fn test_blwp_rtwp_round_trip() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // BLWP @>0300; LI R1,>0042    vector: WP 0x8340, PC 0x0180
    let program = [0x0420, 0x0300, 0x0201, 0x0042];
    setup(&mut bus, &mut cpu, &program);
    bus.load(0x0300, &[0x8340, 0x0180]);
    bus.load(0x0180, &[0x0380]); // RTWP

    cpu.step(&mut bus);
    assert_eq!(cpu.wp(), 0x8340);
    assert_eq!(cpu.pc(), 0x0180);
    assert_eq!(bus.word(0x8340 + 26), WP, "old WP saved in new R13");
    assert_eq!(bus.word(0x8340 + 28), ORG + 4, "old PC saved in new R14");

    let saved_st = bus.word(0x8340 + 30);
    cpu.step(&mut bus); // RTWP
    assert_eq!(cpu.wp(), WP);
    assert_eq!(cpu.pc(), ORG + 4);
    assert_eq!(cpu.st(), saved_st, "RTWP restores the saved status");

    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 1), 0x0042, "execution continues after the call site");
}

#[test]
fn test_x_executes_the_operand_word() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // X R5 where R5 holds INC R3
    let program = [0x0485];
    setup(&mut bus, &mut cpu, &program);
    set_reg(&mut bus, 5, 0x0583);
    set_reg(&mut bus, 3, 7);

    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 3), 8, "the word in R5 ran as an instruction");
    assert_eq!(cpu.pc(), ORG + 2);
}

#[test]
fn test_shift_left_carry_and_overflow() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // SLA R1,1; SLA R2,1; SLA R3,4
    let program = [0x0A11, 0x0A12, 0x0A43];
    setup(&mut bus, &mut cpu, &program);

    set_reg(&mut bus, 1, 0x8000);
    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 1), 0);
    assert!(cpu.st() & ST_C != 0, "bit shifted out lands in carry");
    assert!(cpu.st() & ST_OV != 0, "sign changed during the shift");
    assert!(cpu.st() & ST_EQ != 0);

    set_reg(&mut bus, 2, 0x3000);
    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 2), 0x6000);
    assert!(cpu.st() & ST_C == 0);
    assert!(cpu.st() & ST_OV == 0, "sign stable, no overflow");

    set_reg(&mut bus, 3, 0x1000);
    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 3), 0);
    assert!(cpu.st() & ST_OV != 0, "a one bit passed through the sign position");
}

#[test]
fn test_shift_right_variants() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // SRA R1,1; SRL R2,1; SRC R3,4
    let program = [0x0811, 0x0912, 0x0B43];
    setup(&mut bus, &mut cpu, &program);

    set_reg(&mut bus, 1, 0x8001);
    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 1), 0xC000, "SRA propagates the sign");
    assert!(cpu.st() & ST_C != 0);

    set_reg(&mut bus, 2, 0x8001);
    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 2), 0x4000, "SRL shifts in zero");
    assert!(cpu.st() & ST_C != 0);

    set_reg(&mut bus, 3, 0x1234);
    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 3), 0x4123, "SRC wraps the low bits to the top");
}

#[test]
fn test_shift_count_from_r0() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // SLA R1,0 twice: count comes from R0
    let program = [0x0A01, 0x0A01];
    setup(&mut bus, &mut cpu, &program);

    set_reg(&mut bus, 0, 3);
    set_reg(&mut bus, 1, 0x0001);
    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 1), 0x0008);

    // R0 low nibble zero means a full 16-bit shift
    set_reg(&mut bus, 0, 0);
    set_reg(&mut bus, 1, 0x0001);
    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 1), 0, "count 0 in R0 shifts by 16");
    assert!(cpu.st() & ST_OV != 0);
    assert!(
        cpu.st() & ST_C != 0,
        "the original bit 0 is the last bit out of a 16-bit shift"
    );
}

#[test]
fn test_cru_single_bit_ops() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // SBO 3; TB 3; SBZ 3; TB 3
    let program = [0x1D03, 0x1F03, 0x1E03, 0x1F03];
    setup(&mut bus, &mut cpu, &program);
    set_reg(&mut bus, 12, 0x0040); // bit base 0x20

    cpu.step(&mut bus);
    assert!(bus.cru[0x23], "SBO sets base + displacement");

    cpu.step(&mut bus);
    assert!(cpu.st() & ST_EQ != 0, "TB copies the bit into EQ");

    step_n(&mut cpu, &mut bus, 2);
    assert!(!bus.cru[0x23]);
    assert!(cpu.st() & ST_EQ == 0);
}

#[test]
fn test_ldcr_serialises_lsb_first() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // LDCR R1,9 (word source since the count exceeds 8)
    let program = [0x3241];
    setup(&mut bus, &mut cpu, &program);
    set_reg(&mut bus, 12, 0x0040);
    set_reg(&mut bus, 1, 0x01A5);

    cpu.step(&mut bus);
    let got: Vec<bool> = (0..9).map(|i| bus.cru[0x20 + i]).collect();
    let want = [true, false, true, false, false, true, false, true, true];
    assert_eq!(got, want, "bit 0 of the operand goes to the base address");
    assert_eq!(cpu.st() & (ST_LGT | ST_AGT), ST_LGT | ST_AGT);
}

#[test]
fn test_stcr_assembles_a_byte() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // STCR R2,8
    let program = [0x3602];
    setup(&mut bus, &mut cpu, &program);
    set_reg(&mut bus, 12, 0x0040);
    set_reg(&mut bus, 2, 0x00FF);
    bus.cru[0x20] = true;
    bus.cru[0x22] = true;
    bus.cru[0x27] = true;

    cpu.step(&mut bus);
    assert_eq!(
        reg(&bus, 2),
        0x85FF,
        "eight bits land in the high byte, low byte untouched"
    );
}

#[test]
fn test_mpy_unsigned_product_in_register_pair() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // MPY R1,R2
    let program = [0x3881, 0x3881];
    setup(&mut bus, &mut cpu, &program);

    set_reg(&mut bus, 1, 300);
    set_reg(&mut bus, 2, 200);
    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 2), 0);
    assert_eq!(reg(&bus, 3), 60000);

    set_reg(&mut bus, 1, 0x8000);
    set_reg(&mut bus, 2, 4);
    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 2), 2, "high word of 0x20000");
    assert_eq!(reg(&bus, 3), 0);
}

#[test]
fn test_div_quotient_remainder_and_overflow() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // DIV R1,R2 twice
    let program = [0x3C81, 0x3C81];
    setup(&mut bus, &mut cpu, &program);

    // 0x0001_0000 / 3 = 0x5555 remainder 1
    set_reg(&mut bus, 1, 3);
    set_reg(&mut bus, 2, 1);
    set_reg(&mut bus, 3, 0);
    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 2), 0x5555);
    assert_eq!(reg(&bus, 3), 1);
    assert!(cpu.st() & ST_OV == 0);

    // Divisor not greater than the high word: quotient would not fit
    set_reg(&mut bus, 1, 5);
    set_reg(&mut bus, 2, 5);
    set_reg(&mut bus, 3, 0x1234);
    cpu.step(&mut bus);
    assert!(cpu.st() & ST_OV != 0, "overflow aborts the divide");
    assert_eq!(reg(&bus, 2), 5, "registers untouched on overflow");
    assert_eq!(reg(&bus, 3), 0x1234);
}

#[test]
fn test_xop_context_switch() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // XOP R1,2 vectors through 0x0048
    let program = [0x2C81];
    setup(&mut bus, &mut cpu, &program);
    bus.load(0x0048, &[0x8340, 0x0180]);

    cpu.step(&mut bus);
    assert_eq!(cpu.wp(), 0x8340);
    assert_eq!(cpu.pc(), 0x0180);
    assert_eq!(
        bus.word(0x8340 + 22),
        WP + 2,
        "new R11 holds the operand address"
    );
    assert!(cpu.st() & ST_X != 0);
}

#[test]
fn test_single_operand_flag_rules() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // NEG R1; ABS R2; ABS R3; INC R4; DEC R5
    let program = [0x0501, 0x0742, 0x0743, 0x0584, 0x0605];
    setup(&mut bus, &mut cpu, &program);

    set_reg(&mut bus, 1, 0);
    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 1), 0);
    assert!(cpu.st() & ST_C != 0, "NEG of zero is the only case that carries");

    set_reg(&mut bus, 2, 0xFFF0);
    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 2), 0x0010);
    assert_eq!(
        cpu.st() & (ST_LGT | ST_AGT | ST_EQ),
        ST_LGT,
        "ABS status reflects the original negative value"
    );
    assert!(cpu.st() & ST_C == 0);

    set_reg(&mut bus, 3, 0x8000);
    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 3), 0x8000, "most negative value has no positive form");
    assert!(cpu.st() & ST_OV != 0);

    set_reg(&mut bus, 4, 0xFFFF);
    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 4), 0);
    assert!(cpu.st() & ST_C != 0);
    assert!(cpu.st() & ST_EQ != 0);

    set_reg(&mut bus, 5, 0);
    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 5), 0xFFFF);
    assert!(cpu.st() & ST_C == 0, "decrement through zero borrows");
}

#[test]
fn test_swpb_and_clr_leave_status_alone() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // LI R1,>1234; SWPB R1; CLR R1
    let program = [0x0201, 0x1234, 0x06C1, 0x04C1];
    setup(&mut bus, &mut cpu, &program);

    cpu.step(&mut bus);
    let st_after_li = cpu.st();

    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 1), 0x3412);
    assert_eq!(cpu.st(), st_after_li, "SWPB affects no status bits");

    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 1), 0);
    assert_eq!(cpu.st(), st_after_li, "CLR affects no status bits");
}

#[test]
fn test_coc_czc_set_eq_only_on_match() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // COC R1,R2; CZC R1,R2
    let program = [0x2081, 0x2481];
    setup(&mut bus, &mut cpu, &program);

    // All source bits present in R2
    set_reg(&mut bus, 1, 0x00F0);
    set_reg(&mut bus, 2, 0x0FF0);
    cpu.step(&mut bus);
    assert!(cpu.st() & ST_EQ != 0, "every source one bit is set in R2");

    // 0x00F0 & 0x0FF0 != 0, so CZC fails
    cpu.step(&mut bus);
    assert!(cpu.st() & ST_EQ == 0, "source bits collide with R2");
}

#[test]
fn test_socb_szc_bit_masking() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // SOC R1,R2; SZC R1,R3
    let program = [0xE081, 0x40C1];
    setup(&mut bus, &mut cpu, &program);

    set_reg(&mut bus, 1, 0x0F0F);
    set_reg(&mut bus, 2, 0xF000);
    set_reg(&mut bus, 3, 0xFFFF);

    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 2), 0xFF0F, "SOC ors the source in");

    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 3), 0xF0F0, "SZC clears the source's one bits");
}

#[test]
fn test_andi_ori_stst_stwp() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // ANDI R2,>00FF; ORI R2,>4000; STWP R4; STST R5
    let program = [0x0242, 0x00FF, 0x0262, 0x4000, 0x02A4, 0x02C5];
    setup(&mut bus, &mut cpu, &program);

    set_reg(&mut bus, 2, 0x1234);
    step_n(&mut cpu, &mut bus, 2);
    assert_eq!(reg(&bus, 2), 0x4034);

    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 4), WP);

    cpu.step(&mut bus);
    assert_eq!(reg(&bus, 5), cpu.st());
}

#[test]
fn test_lwpi_moves_the_workspace() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // LWPI >8340; LI R1,>0007
    let program = [0x02E0, 0x8340, 0x0201, 0x0007];
    setup(&mut bus, &mut cpu, &program);

    step_n(&mut cpu, &mut bus, 2);
    assert_eq!(cpu.wp(), 0x8340);
    assert_eq!(bus.word(0x8340 + 2), 7, "R1 now lives in the new workspace");
    assert_eq!(reg(&bus, 1), 0, "old workspace untouched");
}

#[test]
fn test_idle_burns_budget_until_interrupt() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // LIMI 2; IDLE; (never reached) LI R1,>0001
    let program = [0x0300, 0x0002, 0x0340, 0x0201, 0x0001];
    setup(&mut bus, &mut cpu, &program);

    // Interrupt vector: WP 0x8340, handler at 0x0180 (INC R9; JMP $)
    bus.load(0x0004, &[0x8340, 0x0180]);
    bus.load(0x0180, &[0x0589, 0x10FF]);

    let overrun = cpu.run(&mut bus, 200, false);
    assert_eq!(overrun, 0, "idle consumes exactly the remaining budget");
    assert!(cpu.is_idle());
    assert_eq!(cpu.cycles().get(), 200);

    // Still idle on the next slice without an interrupt
    cpu.run(&mut bus, 100, false);
    assert!(cpu.is_idle());
    assert_eq!(reg(&bus, 1), 0);

    // Interrupt line wakes the core through the level-1 vector
    bus.int_line = true;
    cpu.run(&mut bus, 100, false);
    assert!(!cpu.is_idle());
    assert_eq!(cpu.wp(), 0x8340);
    assert_eq!(bus.word(0x8340 + 18), 1, "handler incremented its R9");
    assert_eq!(
        cpu.st() & 0x000F,
        0,
        "taking the interrupt cleared the mask"
    );
}

#[test]
fn test_interrupt_respects_mask() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // Mask stays 0: LI R1,>0001; JMP $
    let program = [0x0201, 0x0001, 0x10FF];
    setup(&mut bus, &mut cpu, &program);
    bus.load(0x0004, &[0x8340, 0x0180]);

    bus.int_line = true;
    cpu.run(&mut bus, 100, false);
    assert_eq!(cpu.wp(), WP, "masked interrupt is not taken");
    assert_eq!(reg(&bus, 1), 1);
}

#[test]
fn test_breakpoint_stops_and_resume_skips() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // LI R1,>0001; LI R2,>0002; LI R3,>0003
    let program = [0x0201, 0x0001, 0x0202, 0x0002, 0x0203, 0x0003];
    setup(&mut bus, &mut cpu, &program);

    cpu.set_breakpoint(Some(ORG + 8));
    let overrun = cpu.run(&mut bus, 1000, false);
    assert_eq!(overrun, 0);
    assert!(cpu.is_stopped_at_breakpoint());
    assert_eq!(cpu.pc(), ORG + 8);
    assert_eq!(reg(&bus, 2), 2, "instructions before the breakpoint ran");
    assert_eq!(reg(&bus, 3), 0, "instruction at the breakpoint did not run");

    // Resuming with the skip flag runs through the breakpoint address
    cpu.run(&mut bus, 12, true);
    assert!(!cpu.is_stopped_at_breakpoint());
    assert_eq!(reg(&bus, 3), 3);
}

#[test]
fn test_break_after_next_stops_after_one_instruction() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    let program = [0x0201, 0x0001, 0x0202, 0x0002];
    setup(&mut bus, &mut cpu, &program);

    cpu.break_after_next();
    cpu.run(&mut bus, 1000, true);
    assert!(cpu.is_stopped_at_breakpoint());
    assert_eq!(cpu.pc(), ORG + 4, "stopped after exactly one instruction");
    assert_eq!(reg(&bus, 2), 0);
}

#[test]
fn test_run_reports_cycle_overrun() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // LI R1,>0001 costs 12 cycles
    let program = [0x0201, 0x0001];
    setup(&mut bus, &mut cpu, &program);

    let overrun = cpu.run(&mut bus, 1, false);
    assert_eq!(overrun, 11, "final instruction ran past the budget");
    assert_eq!(cpu.cycles().get(), 12);
}

#[test]
fn test_instruction_cycle_counts() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    // MOV R1,R2; MOV *R1+,R2; JMP +1; CLR R2
    let program = [0xC081, 0xC0B1, 0x1000, 0x04C2];
    setup(&mut bus, &mut cpu, &program);
    set_reg(&mut bus, 1, 0x0400);

    let before = cpu.cycles().get();
    cpu.step(&mut bus);
    assert_eq!(cpu.cycles().get() - before, 14, "register-to-register move");

    let before = cpu.cycles().get();
    cpu.step(&mut bus);
    assert_eq!(cpu.cycles().get() - before, 22, "word auto-increment source adds 8");

    let before = cpu.cycles().get();
    cpu.step(&mut bus);
    assert_eq!(cpu.cycles().get() - before, 10, "taken jump");

    let before = cpu.cycles().get();
    cpu.step(&mut bus);
    assert_eq!(cpu.cycles().get() - before, 10, "clear");
}

#[test]
fn test_illegal_opcode_is_counted_and_costs_six() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    let program = [0x0000];
    setup(&mut bus, &mut cpu, &program);

    cpu.step(&mut bus);
    assert_eq!(cpu.illegal_ops(), 1);
    assert_eq!(cpu.cycles().get(), 6);
    assert_eq!(cpu.pc(), ORG + 2, "execution continues past the bad word");
}

#[test]
fn test_reset_loads_the_vector() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    bus.load(0x0000, &[0x83E0, 0x0100]);
    cpu.reset(&mut bus);
    assert_eq!(cpu.wp(), 0x83E0);
    assert_eq!(cpu.pc(), 0x0100);
    assert_eq!(cpu.st() & 0x000F, 0, "reset clears the interrupt mask");
    assert_eq!(cpu.cycles().get(), 26);
}

#[test]
fn test_state_round_trip() {
    let mut bus = RamBus::new();
    let mut cpu = Tms9900::new();

    let program = [0x0201, 0x8000, 0x0340];
    setup(&mut bus, &mut cpu, &program);
    step_n(&mut cpu, &mut bus, 2);

    let state = cpu.get_state();
    let mut other = Tms9900::new();
    other.restore_state(&state);

    assert_eq!(other.pc(), cpu.pc());
    assert_eq!(other.wp(), cpu.wp());
    assert_eq!(other.st(), cpu.st());
    assert_eq!(other.is_idle(), cpu.is_idle());
    assert_eq!(other.cycles().get(), cpu.cycles().get());
}
