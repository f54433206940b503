use super::bus::CpuBus;

pub(crate) const FLAG_CARRY: u8 = 0x01;
pub(crate) const FLAG_ZERO: u8 = 0x02;
pub(crate) const FLAG_INTERRUPT: u8 = 0x04;
pub(crate) const FLAG_DECIMAL: u8 = 0x08;
pub(crate) const FLAG_BREAK: u8 = 0x10;
pub(crate) const FLAG_UNUSED: u8 = 0x20;
pub(crate) const FLAG_OVERFLOW: u8 = 0x40;
pub(crate) const FLAG_NEGATIVE: u8 = 0x80;

pub const NMI_VECTOR: u16 = 0xFFFA;
pub const RESET_VECTOR: u16 = 0xFFFC;
pub const IRQ_VECTOR: u16 = 0xFFFE;

/// Addressing modes of the 6502. Each computes a payload (an operand value
/// for `Immediate`, an effective address otherwise) and whether the access
/// crossed a 256-byte page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Relative,
    IndirectX,
    IndirectY,
    Indirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    Adc,
    And,
    Asl,
    Bcc,
    Bcs,
    Beq,
    Bit,
    Bmi,
    Bne,
    Bpl,
    Brk,
    Bvc,
    Bvs,
    Clc,
    Cld,
    Cli,
    Clv,
    Cmp,
    Cpx,
    Cpy,
    Dec,
    Dex,
    Dey,
    Eor,
    Inc,
    Inx,
    Iny,
    Jmp,
    Jsr,
    Lda,
    Ldx,
    Ldy,
    Lsr,
    Nop,
    Ora,
    Pha,
    Php,
    Pla,
    Plp,
    Rol,
    Ror,
    Rti,
    Rts,
    Sbc,
    Sec,
    Sed,
    Sei,
    Sta,
    Stx,
    Sty,
    Tax,
    Tay,
    Tsx,
    Txa,
    Txs,
    Tya,
    // Unofficial opcodes. Several commercial games lean on these.
    Lax,
    Sax,
    Dcp,
    Isb,
    Slo,
    Rla,
    Sre,
    Rra,
    Anc,
    Alr,
    Arr,
    Axs,
    Las,
    Jam,
}

#[derive(Debug, Clone, Copy)]
pub struct Opcode {
    pub mnemonic: Mnemonic,
    pub mode: Mode,
    pub cycles: u32,
}

const fn op(mnemonic: Mnemonic, mode: Mode, cycles: u32) -> Opcode {
    Opcode {
        mnemonic,
        mode,
        cycles,
    }
}

use Mnemonic::*;
use Mode::*;

/// Full decode table keyed by the fetched opcode byte. Base cycle counts;
/// page-cross and branch penalties are added by the interpreter.
#[rustfmt::skip]
pub const OPCODE_TABLE: [Opcode; 256] = [
    // 0x00
    op(Brk, Implied, 7),     op(Ora, IndirectX, 6), op(Jam, Implied, 2),   op(Slo, IndirectX, 8),
    op(Nop, ZeroPage, 3),    op(Ora, ZeroPage, 3),  op(Asl, ZeroPage, 5),  op(Slo, ZeroPage, 5),
    op(Php, Implied, 3),     op(Ora, Immediate, 2), op(Asl, Accumulator, 2), op(Anc, Immediate, 2),
    op(Nop, Absolute, 4),    op(Ora, Absolute, 4),  op(Asl, Absolute, 6),  op(Slo, Absolute, 6),
    // 0x10
    op(Bpl, Relative, 2),    op(Ora, IndirectY, 5), op(Jam, Implied, 2),   op(Slo, IndirectY, 8),
    op(Nop, ZeroPageX, 4),   op(Ora, ZeroPageX, 4), op(Asl, ZeroPageX, 6), op(Slo, ZeroPageX, 6),
    op(Clc, Implied, 2),     op(Ora, AbsoluteY, 4), op(Nop, Implied, 2),   op(Slo, AbsoluteY, 7),
    op(Nop, AbsoluteX, 4),   op(Ora, AbsoluteX, 4), op(Asl, AbsoluteX, 7), op(Slo, AbsoluteX, 7),
    // 0x20
    op(Jsr, Absolute, 6),    op(And, IndirectX, 6), op(Jam, Implied, 2),   op(Rla, IndirectX, 8),
    op(Bit, ZeroPage, 3),    op(And, ZeroPage, 3),  op(Rol, ZeroPage, 5),  op(Rla, ZeroPage, 5),
    op(Plp, Implied, 4),     op(And, Immediate, 2), op(Rol, Accumulator, 2), op(Anc, Immediate, 2),
    op(Bit, Absolute, 4),    op(And, Absolute, 4),  op(Rol, Absolute, 6),  op(Rla, Absolute, 6),
    // 0x30
    op(Bmi, Relative, 2),    op(And, IndirectY, 5), op(Jam, Implied, 2),   op(Rla, IndirectY, 8),
    op(Nop, ZeroPageX, 4),   op(And, ZeroPageX, 4), op(Rol, ZeroPageX, 6), op(Rla, ZeroPageX, 6),
    op(Sec, Implied, 2),     op(And, AbsoluteY, 4), op(Nop, Implied, 2),   op(Rla, AbsoluteY, 7),
    op(Nop, AbsoluteX, 4),   op(And, AbsoluteX, 4), op(Rol, AbsoluteX, 7), op(Rla, AbsoluteX, 7),
    // 0x40
    op(Rti, Implied, 6),     op(Eor, IndirectX, 6), op(Jam, Implied, 2),   op(Sre, IndirectX, 8),
    op(Nop, ZeroPage, 3),    op(Eor, ZeroPage, 3),  op(Lsr, ZeroPage, 5),  op(Sre, ZeroPage, 5),
    op(Pha, Implied, 3),     op(Eor, Immediate, 2), op(Lsr, Accumulator, 2), op(Alr, Immediate, 2),
    op(Jmp, Absolute, 3),    op(Eor, Absolute, 4),  op(Lsr, Absolute, 6),  op(Sre, Absolute, 6),
    // 0x50
    op(Bvc, Relative, 2),    op(Eor, IndirectY, 5), op(Jam, Implied, 2),   op(Sre, IndirectY, 8),
    op(Nop, ZeroPageX, 4),   op(Eor, ZeroPageX, 4), op(Lsr, ZeroPageX, 6), op(Sre, ZeroPageX, 6),
    op(Cli, Implied, 2),     op(Eor, AbsoluteY, 4), op(Nop, Implied, 2),   op(Sre, AbsoluteY, 7),
    op(Nop, AbsoluteX, 4),   op(Eor, AbsoluteX, 4), op(Lsr, AbsoluteX, 7), op(Sre, AbsoluteX, 7),
    // 0x60
    op(Rts, Implied, 6),     op(Adc, IndirectX, 6), op(Jam, Implied, 2),   op(Rra, IndirectX, 8),
    op(Nop, ZeroPage, 3),    op(Adc, ZeroPage, 3),  op(Ror, ZeroPage, 5),  op(Rra, ZeroPage, 5),
    op(Pla, Implied, 4),     op(Adc, Immediate, 2), op(Ror, Accumulator, 2), op(Arr, Immediate, 2),
    op(Jmp, Indirect, 5),    op(Adc, Absolute, 4),  op(Ror, Absolute, 6),  op(Rra, Absolute, 6),
    // 0x70
    op(Bvs, Relative, 2),    op(Adc, IndirectY, 5), op(Jam, Implied, 2),   op(Rra, IndirectY, 8),
    op(Nop, ZeroPageX, 4),   op(Adc, ZeroPageX, 4), op(Ror, ZeroPageX, 6), op(Rra, ZeroPageX, 6),
    op(Sei, Implied, 2),     op(Adc, AbsoluteY, 4), op(Nop, Implied, 2),   op(Rra, AbsoluteY, 7),
    op(Nop, AbsoluteX, 4),   op(Adc, AbsoluteX, 4), op(Ror, AbsoluteX, 7), op(Rra, AbsoluteX, 7),
    // 0x80
    op(Nop, Immediate, 2),   op(Sta, IndirectX, 6), op(Nop, Immediate, 2), op(Sax, IndirectX, 6),
    op(Sty, ZeroPage, 3),    op(Sta, ZeroPage, 3),  op(Stx, ZeroPage, 3),  op(Sax, ZeroPage, 3),
    op(Dey, Implied, 2),     op(Nop, Immediate, 2), op(Txa, Implied, 2),   op(Nop, Immediate, 2),
    op(Sty, Absolute, 4),    op(Sta, Absolute, 4),  op(Stx, Absolute, 4),  op(Sax, Absolute, 4),
    // 0x90
    op(Bcc, Relative, 2),    op(Sta, IndirectY, 6), op(Jam, Implied, 2),   op(Nop, IndirectY, 6),
    op(Sty, ZeroPageX, 4),   op(Sta, ZeroPageX, 4), op(Stx, ZeroPageY, 4), op(Sax, ZeroPageY, 4),
    op(Tya, Implied, 2),     op(Sta, AbsoluteY, 5), op(Txs, Implied, 2),   op(Nop, AbsoluteY, 5),
    op(Nop, AbsoluteX, 5),   op(Sta, AbsoluteX, 5), op(Nop, AbsoluteY, 5), op(Nop, AbsoluteY, 5),
    // 0xA0
    op(Ldy, Immediate, 2),   op(Lda, IndirectX, 6), op(Ldx, Immediate, 2), op(Lax, IndirectX, 6),
    op(Ldy, ZeroPage, 3),    op(Lda, ZeroPage, 3),  op(Ldx, ZeroPage, 3),  op(Lax, ZeroPage, 3),
    op(Tay, Implied, 2),     op(Lda, Immediate, 2), op(Tax, Implied, 2),   op(Nop, Immediate, 2),
    op(Ldy, Absolute, 4),    op(Lda, Absolute, 4),  op(Ldx, Absolute, 4),  op(Lax, Absolute, 4),
    // 0xB0
    op(Bcs, Relative, 2),    op(Lda, IndirectY, 5), op(Jam, Implied, 2),   op(Lax, IndirectY, 5),
    op(Ldy, ZeroPageX, 4),   op(Lda, ZeroPageX, 4), op(Ldx, ZeroPageY, 4), op(Lax, ZeroPageY, 4),
    op(Clv, Implied, 2),     op(Lda, AbsoluteY, 4), op(Tsx, Implied, 2),   op(Las, AbsoluteY, 4),
    op(Ldy, AbsoluteX, 4),   op(Lda, AbsoluteX, 4), op(Ldx, AbsoluteY, 4), op(Lax, AbsoluteY, 4),
    // 0xC0
    op(Cpy, Immediate, 2),   op(Cmp, IndirectX, 6), op(Nop, Immediate, 2), op(Dcp, IndirectX, 8),
    op(Cpy, ZeroPage, 3),    op(Cmp, ZeroPage, 3),  op(Dec, ZeroPage, 5),  op(Dcp, ZeroPage, 5),
    op(Iny, Implied, 2),     op(Cmp, Immediate, 2), op(Dex, Implied, 2),   op(Axs, Immediate, 2),
    op(Cpy, Absolute, 4),    op(Cmp, Absolute, 4),  op(Dec, Absolute, 6),  op(Dcp, Absolute, 6),
    // 0xD0
    op(Bne, Relative, 2),    op(Cmp, IndirectY, 5), op(Jam, Implied, 2),   op(Dcp, IndirectY, 8),
    op(Nop, ZeroPageX, 4),   op(Cmp, ZeroPageX, 4), op(Dec, ZeroPageX, 6), op(Dcp, ZeroPageX, 6),
    op(Cld, Implied, 2),     op(Cmp, AbsoluteY, 4), op(Nop, Implied, 2),   op(Dcp, AbsoluteY, 7),
    op(Nop, AbsoluteX, 4),   op(Cmp, AbsoluteX, 4), op(Dec, AbsoluteX, 7), op(Dcp, AbsoluteX, 7),
    // 0xE0
    op(Cpx, Immediate, 2),   op(Sbc, IndirectX, 6), op(Nop, Immediate, 2), op(Isb, IndirectX, 8),
    op(Cpx, ZeroPage, 3),    op(Sbc, ZeroPage, 3),  op(Inc, ZeroPage, 5),  op(Isb, ZeroPage, 5),
    op(Inx, Implied, 2),     op(Sbc, Immediate, 2), op(Nop, Implied, 2),   op(Sbc, Immediate, 2),
    op(Cpx, Absolute, 4),    op(Sbc, Absolute, 4),  op(Inc, Absolute, 6),  op(Isb, Absolute, 6),
    // 0xF0
    op(Beq, Relative, 2),    op(Sbc, IndirectY, 5), op(Jam, Implied, 2),   op(Isb, IndirectY, 8),
    op(Nop, ZeroPageX, 4),   op(Sbc, ZeroPageX, 4), op(Inc, ZeroPageX, 6), op(Isb, ZeroPageX, 6),
    op(Sed, Implied, 2),     op(Sbc, AbsoluteY, 4), op(Nop, Implied, 2),   op(Isb, AbsoluteY, 7),
    op(Nop, AbsoluteX, 4),   op(Sbc, AbsoluteX, 4), op(Inc, AbsoluteX, 7), op(Isb, AbsoluteX, 7),
];

/// The 2A03's 6502 core (binary arithmetic only; the D flag is carried but
/// never honored). One `step` is one instruction, preceded by interrupt
/// dispatch when a line is asserted.
#[derive(Debug, Clone)]
pub struct Cpu {
    pub(crate) a: u8,
    pub(crate) x: u8,
    pub(crate) y: u8,
    pub(crate) p: u8,
    pub(crate) sp: u8,
    pub(crate) pc: u16,
    pub(crate) halted: bool,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            p: FLAG_INTERRUPT | FLAG_UNUSED | FLAG_BREAK,
            sp: 0xFD,
            pc: 0,
            halted: false,
        }
    }

    pub fn reset(&mut self, bus: &mut CpuBus) {
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.p = FLAG_INTERRUPT | FLAG_UNUSED | FLAG_BREAK;
        self.sp = 0xFD;
        self.halted = false;
        self.pc = self.read_word(bus, RESET_VECTOR);
    }

    /// Execute one instruction and return its cycle cost: base cycles plus
    /// the addressing-mode page-cross penalty plus one when a branch is
    /// taken. A pending interrupt is dispatched first.
    pub fn step(&mut self, bus: &mut CpuBus) -> u32 {
        self.dispatch_interrupt(bus);

        let opcode = self.fetch_byte(bus);
        let entry = OPCODE_TABLE[opcode as usize];
        let (payload, page_crossed) = self.fetch_operand(bus, entry.mode);
        let branched = self.execute(bus, entry.mnemonic, entry.mode, payload);

        entry.cycles + u32::from(page_crossed) + u32::from(branched)
    }

    fn dispatch_interrupt(&mut self, bus: &mut CpuBus) {
        if bus.interrupts.is_nmi_asserted() {
            bus.interrupts.deassert_nmi();
            self.interrupt_push_and_vector(bus, NMI_VECTOR);
        } else if bus.interrupts.is_irq_asserted() && !self.get_flag(FLAG_INTERRUPT) {
            bus.interrupts.deassert_irq();
            self.interrupt_push_and_vector(bus, IRQ_VECTOR);
        }
    }

    fn interrupt_push_and_vector(&mut self, bus: &mut CpuBus, vector: u16) {
        self.set_flag(FLAG_BREAK, false);
        self.push_word(bus, self.pc);
        self.push(bus, (self.p & !FLAG_BREAK) | FLAG_UNUSED);
        self.set_flag(FLAG_INTERRUPT, true);
        self.pc = self.read_word(bus, vector);
    }

    fn fetch_operand(&mut self, bus: &mut CpuBus, mode: Mode) -> (u16, bool) {
        match mode {
            Implied | Accumulator => (0, false),
            Immediate | ZeroPage => (u16::from(self.fetch_byte(bus)), false),
            ZeroPageX => (u16::from(self.fetch_byte(bus).wrapping_add(self.x)), false),
            ZeroPageY => (u16::from(self.fetch_byte(bus).wrapping_add(self.y)), false),
            Absolute => (self.fetch_word(bus), false),
            AbsoluteX => {
                let base = self.fetch_word(bus);
                let addr = base.wrapping_add(u16::from(self.x));
                (addr, page_crossed(base, addr))
            }
            AbsoluteY => {
                let base = self.fetch_word(bus);
                let addr = base.wrapping_add(u16::from(self.y));
                (addr, page_crossed(base, addr))
            }
            Relative => {
                let base = self.pc;
                let offset = self.fetch_byte(bus) as i8;
                let target = self.pc.wrapping_add(offset as i16 as u16);
                (target, page_crossed(base, target))
            }
            IndirectX => {
                let zp = self.fetch_byte(bus).wrapping_add(self.x);
                (self.read_zp_word(bus, zp), false)
            }
            IndirectY => {
                let zp = self.fetch_byte(bus);
                let base = self.read_zp_word(bus, zp);
                let addr = base.wrapping_add(u16::from(self.y));
                (addr, page_crossed(base, addr))
            }
            Indirect => {
                let ptr = self.fetch_word(bus);
                (self.read_word_bug(bus, ptr), false)
            }
        }
    }

    /// Mnemonic dispatch. Returns whether a branch was taken.
    fn execute(&mut self, bus: &mut CpuBus, mnemonic: Mnemonic, mode: Mode, payload: u16) -> bool {
        match mnemonic {
            Lda => {
                self.a = self.operand_value(bus, mode, payload);
                self.update_zn(self.a);
            }
            Ldx => {
                self.x = self.operand_value(bus, mode, payload);
                self.update_zn(self.x);
            }
            Ldy => {
                self.y = self.operand_value(bus, mode, payload);
                self.update_zn(self.y);
            }
            Sta => bus.write(payload, self.a),
            Stx => bus.write(payload, self.x),
            Sty => bus.write(payload, self.y),

            Tax => {
                self.x = self.a;
                self.update_zn(self.x);
            }
            Tay => {
                self.y = self.a;
                self.update_zn(self.y);
            }
            Tsx => {
                self.x = self.sp;
                self.update_zn(self.x);
            }
            Txa => {
                self.a = self.x;
                self.update_zn(self.a);
            }
            Txs => self.sp = self.x,
            Tya => {
                self.a = self.y;
                self.update_zn(self.a);
            }

            Adc => {
                let value = self.operand_value(bus, mode, payload);
                self.adc(value);
            }
            Sbc => {
                let value = self.operand_value(bus, mode, payload);
                self.sbc(value);
            }
            Cmp => {
                let value = self.operand_value(bus, mode, payload);
                self.compare(self.a, value);
            }
            Cpx => {
                let value = self.operand_value(bus, mode, payload);
                self.compare(self.x, value);
            }
            Cpy => {
                let value = self.operand_value(bus, mode, payload);
                self.compare(self.y, value);
            }

            And => {
                let value = self.operand_value(bus, mode, payload);
                self.a &= value;
                self.update_zn(self.a);
            }
            Ora => {
                let value = self.operand_value(bus, mode, payload);
                self.a |= value;
                self.update_zn(self.a);
            }
            Eor => {
                let value = self.operand_value(bus, mode, payload);
                self.a ^= value;
                self.update_zn(self.a);
            }
            Bit => {
                let value = bus.read(payload);
                self.set_flag(FLAG_ZERO, (self.a & value) == 0);
                self.set_flag(FLAG_NEGATIVE, (value & 0x80) != 0);
                self.set_flag(FLAG_OVERFLOW, (value & 0x40) != 0);
            }

            Asl => self.read_modify_write(bus, mode, payload, Self::asl),
            Lsr => self.read_modify_write(bus, mode, payload, Self::lsr),
            Rol => self.read_modify_write(bus, mode, payload, Self::rol),
            Ror => self.read_modify_write(bus, mode, payload, Self::ror),

            Inc => {
                let value = bus.read(payload).wrapping_add(1);
                bus.write(payload, value);
                self.update_zn(value);
            }
            Dec => {
                let value = bus.read(payload).wrapping_sub(1);
                bus.write(payload, value);
                self.update_zn(value);
            }
            Inx => {
                self.x = self.x.wrapping_add(1);
                self.update_zn(self.x);
            }
            Iny => {
                self.y = self.y.wrapping_add(1);
                self.update_zn(self.y);
            }
            Dex => {
                self.x = self.x.wrapping_sub(1);
                self.update_zn(self.x);
            }
            Dey => {
                self.y = self.y.wrapping_sub(1);
                self.update_zn(self.y);
            }

            Bcc => return self.branch_if(!self.get_flag(FLAG_CARRY), payload),
            Bcs => return self.branch_if(self.get_flag(FLAG_CARRY), payload),
            Bne => return self.branch_if(!self.get_flag(FLAG_ZERO), payload),
            Beq => return self.branch_if(self.get_flag(FLAG_ZERO), payload),
            Bpl => return self.branch_if(!self.get_flag(FLAG_NEGATIVE), payload),
            Bmi => return self.branch_if(self.get_flag(FLAG_NEGATIVE), payload),
            Bvc => return self.branch_if(!self.get_flag(FLAG_OVERFLOW), payload),
            Bvs => return self.branch_if(self.get_flag(FLAG_OVERFLOW), payload),

            Jmp => self.pc = payload,
            Jsr => {
                self.push_word(bus, self.pc.wrapping_sub(1));
                self.pc = payload;
            }
            Rts => self.pc = self.pop_word(bus).wrapping_add(1),
            Rti => {
                self.p = self.pop(bus) | FLAG_UNUSED;
                self.pc = self.pop_word(bus);
            }
            Brk => {
                self.pc = self.pc.wrapping_add(1);
                self.push_word(bus, self.pc);
                self.push(bus, self.p | FLAG_BREAK | FLAG_UNUSED);
                self.set_flag(FLAG_INTERRUPT, true);
                self.pc = self.read_word(bus, IRQ_VECTOR);
            }

            Pha => self.push(bus, self.a),
            Pla => {
                self.a = self.pop(bus);
                self.update_zn(self.a);
            }
            Php => self.push(bus, self.p | FLAG_BREAK | FLAG_UNUSED),
            Plp => self.p = self.pop(bus) | FLAG_UNUSED,

            Clc => self.set_flag(FLAG_CARRY, false),
            Sec => self.set_flag(FLAG_CARRY, true),
            Cli => self.set_flag(FLAG_INTERRUPT, false),
            Sei => self.set_flag(FLAG_INTERRUPT, true),
            Cld => self.set_flag(FLAG_DECIMAL, false),
            Sed => self.set_flag(FLAG_DECIMAL, true),
            Clv => self.set_flag(FLAG_OVERFLOW, false),

            Nop => {}

            Lax => {
                let value = self.operand_value(bus, mode, payload);
                self.a = value;
                self.x = value;
                self.update_zn(value);
            }
            Sax => bus.write(payload, self.a & self.x),
            Dcp => {
                let value = bus.read(payload).wrapping_sub(1);
                bus.write(payload, value);
                self.compare(self.a, value);
            }
            Isb => {
                let value = bus.read(payload).wrapping_add(1);
                bus.write(payload, value);
                self.sbc(value);
            }
            Slo => {
                let shifted = self.asl(bus.read(payload));
                bus.write(payload, shifted);
                self.a |= shifted;
                self.update_zn(self.a);
            }
            Rla => {
                let shifted = self.rol(bus.read(payload));
                bus.write(payload, shifted);
                self.a &= shifted;
                self.update_zn(self.a);
            }
            Sre => {
                let shifted = self.lsr(bus.read(payload));
                bus.write(payload, shifted);
                self.a ^= shifted;
                self.update_zn(self.a);
            }
            Rra => {
                let shifted = self.ror(bus.read(payload));
                bus.write(payload, shifted);
                self.adc(shifted);
            }
            Anc => {
                self.a &= payload as u8;
                self.update_zn(self.a);
                self.set_flag(FLAG_CARRY, (self.a & 0x80) != 0);
            }
            Alr => {
                self.a &= payload as u8;
                self.a = self.lsr(self.a);
            }
            Arr => {
                self.a &= payload as u8;
                let carry_in = if self.get_flag(FLAG_CARRY) { 0x80 } else { 0 };
                self.a = (self.a >> 1) | carry_in;
                self.update_zn(self.a);
                self.set_flag(FLAG_CARRY, (self.a & 0x40) != 0);
                self.set_flag(
                    FLAG_OVERFLOW,
                    (((self.a >> 6) & 0x01) ^ ((self.a >> 5) & 0x01)) != 0,
                );
            }
            Axs => {
                let in_ax = self.a & self.x;
                let value = payload as u8;
                self.set_flag(FLAG_CARRY, in_ax >= value);
                self.x = in_ax.wrapping_sub(value);
                self.update_zn(self.x);
            }
            Las => {
                let value = bus.read(payload) & self.sp;
                self.a = value;
                self.x = value;
                self.sp = value;
                self.update_zn(value);
            }
            Jam => self.halted = true,
        }

        false
    }

    /// Resolve the operand byte: the payload itself for immediate mode, a
    /// bus read at the effective address otherwise.
    fn operand_value(&mut self, bus: &mut CpuBus, mode: Mode, payload: u16) -> u8 {
        if mode == Immediate {
            payload as u8
        } else {
            bus.read(payload)
        }
    }

    fn read_modify_write(
        &mut self,
        bus: &mut CpuBus,
        mode: Mode,
        payload: u16,
        apply: fn(&mut Self, u8) -> u8,
    ) {
        if mode == Accumulator {
            let value = self.a;
            self.a = apply(self, value);
        } else {
            let value = bus.read(payload);
            let out = apply(self, value);
            bus.write(payload, out);
        }
    }

    fn branch_if(&mut self, condition: bool, target: u16) -> bool {
        if condition {
            self.pc = target;
        }
        condition
    }

    fn adc(&mut self, value: u8) {
        let carry_in = u16::from(self.get_flag(FLAG_CARRY));
        let result = u16::from(self.a) + u16::from(value) + carry_in;
        let out = result as u8;

        self.set_flag(FLAG_CARRY, result > 0xFF);
        self.set_flag(FLAG_OVERFLOW, ((self.a ^ out) & (value ^ out) & 0x80) != 0);

        self.a = out;
        self.update_zn(self.a);
    }

    fn sbc(&mut self, value: u8) {
        self.adc(value ^ 0xFF);
    }

    fn compare(&mut self, register: u8, value: u8) {
        let result = register.wrapping_sub(value);
        self.set_flag(FLAG_CARRY, register >= value);
        self.update_zn(result);
    }

    fn asl(&mut self, value: u8) -> u8 {
        self.set_flag(FLAG_CARRY, (value & 0x80) != 0);
        let result = value << 1;
        self.update_zn(result);
        result
    }

    fn lsr(&mut self, value: u8) -> u8 {
        self.set_flag(FLAG_CARRY, (value & 0x01) != 0);
        let result = value >> 1;
        self.update_zn(result);
        result
    }

    fn rol(&mut self, value: u8) -> u8 {
        let carry_in = u8::from(self.get_flag(FLAG_CARRY));
        self.set_flag(FLAG_CARRY, (value & 0x80) != 0);
        let result = (value << 1) | carry_in;
        self.update_zn(result);
        result
    }

    fn ror(&mut self, value: u8) -> u8 {
        let carry_in = if self.get_flag(FLAG_CARRY) { 0x80 } else { 0 };
        self.set_flag(FLAG_CARRY, (value & 0x01) != 0);
        let result = (value >> 1) | carry_in;
        self.update_zn(result);
        result
    }

    fn fetch_byte(&mut self, bus: &mut CpuBus) -> u8 {
        let byte = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        byte
    }

    fn fetch_word(&mut self, bus: &mut CpuBus) -> u16 {
        let lo = u16::from(self.fetch_byte(bus));
        let hi = u16::from(self.fetch_byte(bus));
        (hi << 8) | lo
    }

    fn read_word(&mut self, bus: &mut CpuBus, addr: u16) -> u16 {
        let lo = u16::from(bus.read(addr));
        let hi = u16::from(bus.read(addr.wrapping_add(1)));
        (hi << 8) | lo
    }

    /// 16-bit read with the 6502 indirect-jump quirk: the high byte comes
    /// from the start of the same page, not the following address.
    fn read_word_bug(&mut self, bus: &mut CpuBus, addr: u16) -> u16 {
        let lo = u16::from(bus.read(addr));
        let hi_addr = (addr & 0xFF00) | (addr.wrapping_add(1) & 0x00FF);
        let hi = u16::from(bus.read(hi_addr));
        (hi << 8) | lo
    }

    fn read_zp_word(&mut self, bus: &mut CpuBus, addr: u8) -> u16 {
        let lo = u16::from(bus.read(u16::from(addr)));
        let hi = u16::from(bus.read(u16::from(addr.wrapping_add(1))));
        (hi << 8) | lo
    }

    fn push(&mut self, bus: &mut CpuBus, value: u8) {
        bus.write(0x0100 | u16::from(self.sp), value);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn pop(&mut self, bus: &mut CpuBus) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        bus.read(0x0100 | u16::from(self.sp))
    }

    fn push_word(&mut self, bus: &mut CpuBus, value: u16) {
        self.push(bus, (value >> 8) as u8);
        self.push(bus, value as u8);
    }

    fn pop_word(&mut self, bus: &mut CpuBus) -> u16 {
        let lo = u16::from(self.pop(bus));
        let hi = u16::from(self.pop(bus));
        (hi << 8) | lo
    }

    pub(crate) fn set_flag(&mut self, flag: u8, value: bool) {
        if value {
            self.p |= flag;
        } else {
            self.p &= !flag;
        }
        self.p |= FLAG_UNUSED;
    }

    pub(crate) fn get_flag(&self, flag: u8) -> bool {
        (self.p & flag) != 0
    }

    fn update_zn(&mut self, value: u8) {
        self.set_flag(FLAG_ZERO, value == 0);
        self.set_flag(FLAG_NEGATIVE, (value & 0x80) != 0);
    }
}

fn page_crossed(a: u16, b: u16) -> bool {
    (a & 0xFF00) != (b & 0xFF00)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nes::cartridge::{Cartridge, Mirroring};

    fn bus_with_prg(prg: Vec<u8>) -> CpuBus {
        CpuBus::new(Cartridge {
            mapper_id: 0,
            mirroring: Mirroring::Horizontal,
            prg_rom: prg,
            chr: vec![0; 8 * 1024],
            chr_is_ram: true,
        })
    }

    /// 32 KiB PRG image with `code` at $8000 and the reset vector pointing
    /// at `entry`.
    fn prg_with_code(code: &[u8], entry: u16) -> Vec<u8> {
        let mut prg = vec![0xEA; 0x8000];
        prg[..code.len()].copy_from_slice(code);
        prg[0x7FFC] = entry as u8;
        prg[0x7FFD] = (entry >> 8) as u8;
        prg
    }

    fn cpu_at_entry(code: &[u8], entry: u16) -> (Cpu, CpuBus) {
        let mut bus = bus_with_prg(prg_with_code(code, entry));
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        (cpu, bus)
    }

    #[test]
    fn reset_reads_vector_and_nop_costs_two() {
        let (mut cpu, mut bus) = cpu_at_entry(&[0xEA], 0x8000);
        assert_eq!(cpu.pc, 0x8000);

        let cycles = cpu.step(&mut bus);
        assert_eq!(cpu.pc, 0x8001);
        assert_eq!(cycles, 2);
    }

    #[test]
    fn lda_immediate_then_sta_absolute() {
        let (mut cpu, mut bus) = cpu_at_entry(&[0xA9, 0x42, 0x8D, 0x00, 0x02], 0x8000);

        cpu.step(&mut bus);
        cpu.step(&mut bus);

        assert_eq!(bus.read(0x0200), 0x42);
        assert_eq!(cpu.a, 0x42);
        assert!(!cpu.get_flag(FLAG_ZERO));
        assert!(!cpu.get_flag(FLAG_NEGATIVE));
    }

    #[test]
    fn branch_taken_across_page_costs_four() {
        // LDA #$00 at $80FC sets Z, BEQ +4 at $80FE lands on $8104.
        let mut prg = prg_with_code(&[], 0x80FC);
        prg[0x00FC] = 0xA9;
        prg[0x00FD] = 0x00;
        prg[0x00FE] = 0xF0;
        prg[0x00FF] = 0x04;
        let mut bus = bus_with_prg(prg);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);

        cpu.step(&mut bus);
        let cycles = cpu.step(&mut bus);

        assert_eq!(cpu.pc, 0x8104);
        assert_eq!(cycles, 4);
    }

    #[test]
    fn branch_not_taken_costs_two() {
        // LDA #$01 clears Z so BEQ falls through.
        let (mut cpu, mut bus) = cpu_at_entry(&[0xA9, 0x01, 0xF0, 0x10], 0x8000);
        cpu.step(&mut bus);
        let cycles = cpu.step(&mut bus);
        assert_eq!(cycles, 2);
        assert_eq!(cpu.pc, 0x8004);
    }

    #[test]
    fn stack_round_trips_in_reverse_order() {
        let code = [
            0xA9, 0x11, 0x48, // LDA #$11 PHA
            0xA9, 0x22, 0x48, // LDA #$22 PHA
            0xA9, 0x33, 0x48, // LDA #$33 PHA
            0x68, 0x68, 0x68, // PLA PLA PLA
        ];
        let (mut cpu, mut bus) = cpu_at_entry(&code, 0x8000);
        let initial_sp = cpu.sp;

        for _ in 0..6 {
            cpu.step(&mut bus);
        }
        cpu.step(&mut bus);
        assert_eq!(cpu.a, 0x33);
        cpu.step(&mut bus);
        assert_eq!(cpu.a, 0x22);
        cpu.step(&mut bus);
        assert_eq!(cpu.a, 0x11);
        assert_eq!(cpu.sp, initial_sp);
    }

    #[test]
    fn status_round_trip_forces_reserved() {
        // SEC SED PHP CLC CLD PLP
        let code = [0x38, 0xF8, 0x08, 0x18, 0xD8, 0x28];
        let (mut cpu, mut bus) = cpu_at_entry(&code, 0x8000);

        for _ in 0..6 {
            cpu.step(&mut bus);
        }

        assert!(cpu.get_flag(FLAG_CARRY));
        assert!(cpu.get_flag(FLAG_DECIMAL));
        assert!(cpu.get_flag(FLAG_UNUSED));
    }

    #[test]
    fn adc_overflow_and_carry() {
        let (mut cpu, mut bus) = cpu_at_entry(&[0xA9, 0x50, 0x69, 0x50], 0x8000);
        cpu.step(&mut bus);
        cpu.step(&mut bus);
        assert_eq!(cpu.a, 0xA0);
        assert!(cpu.get_flag(FLAG_OVERFLOW));
        assert!(!cpu.get_flag(FLAG_CARRY));
        assert!(cpu.get_flag(FLAG_NEGATIVE));

        let (mut cpu, mut bus) = cpu_at_entry(&[0xA9, 0xFF, 0x69, 0x01], 0x8000);
        cpu.step(&mut bus);
        cpu.step(&mut bus);
        assert_eq!(cpu.a, 0x00);
        assert!(cpu.get_flag(FLAG_CARRY));
        assert!(cpu.get_flag(FLAG_ZERO));
        assert!(!cpu.get_flag(FLAG_OVERFLOW));
    }

    #[test]
    fn sbc_with_borrow_clear() {
        // SEC, LDA #$50, SBC #$20
        let (mut cpu, mut bus) = cpu_at_entry(&[0x38, 0xA9, 0x50, 0xE9, 0x20], 0x8000);
        for _ in 0..3 {
            cpu.step(&mut bus);
        }
        assert_eq!(cpu.a, 0x30);
        assert!(cpu.get_flag(FLAG_CARRY));
    }

    #[test]
    fn cmp_sets_carry_on_greater_or_equal() {
        let (mut cpu, mut bus) = cpu_at_entry(&[0xA9, 0x40, 0xC9, 0x40, 0xC9, 0x41], 0x8000);
        cpu.step(&mut bus);
        cpu.step(&mut bus);
        assert!(cpu.get_flag(FLAG_CARRY));
        assert!(cpu.get_flag(FLAG_ZERO));
        cpu.step(&mut bus);
        assert!(!cpu.get_flag(FLAG_CARRY));
        assert!(cpu.get_flag(FLAG_NEGATIVE));
    }

    #[test]
    fn jmp_indirect_page_wrap_bug() {
        // JMP ($02FF): high byte comes from $0200, not $0300.
        let (mut cpu, mut bus) = cpu_at_entry(&[0x6C, 0xFF, 0x02], 0x8000);
        bus.write(0x02FF, 0x34);
        bus.write(0x0200, 0x12);
        bus.write(0x0300, 0x99);

        cpu.step(&mut bus);
        assert_eq!(cpu.pc, 0x1234);
    }

    #[test]
    fn jsr_rts_round_trip() {
        // JSR $8005; (NOPs); target: RTS
        let code = [0x20, 0x05, 0x80, 0xEA, 0xEA, 0x60];
        let (mut cpu, mut bus) = cpu_at_entry(&code, 0x8000);

        cpu.step(&mut bus);
        assert_eq!(cpu.pc, 0x8005);
        cpu.step(&mut bus);
        assert_eq!(cpu.pc, 0x8003);
    }

    #[test]
    fn brk_vectors_through_fffe_and_rti_returns() {
        let mut prg = prg_with_code(&[0x00], 0x8000);
        // IRQ/BRK vector -> $9000, where an RTI sits.
        prg[0x7FFE] = 0x00;
        prg[0x7FFF] = 0x90;
        prg[0x1000] = 0x40;
        let mut bus = bus_with_prg(prg);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);

        cpu.step(&mut bus);
        assert_eq!(cpu.pc, 0x9000);
        assert!(cpu.get_flag(FLAG_INTERRUPT));
        // Pushed status carries B set.
        let pushed = bus.read(0x0100 | u16::from(cpu.sp.wrapping_add(1)));
        assert!((pushed & FLAG_BREAK) != 0);

        cpu.step(&mut bus);
        assert_eq!(cpu.pc, 0x8002);
    }

    #[test]
    fn nmi_dispatch_consumes_the_edge() {
        let mut prg = prg_with_code(&[0xEA], 0x8000);
        prg[0x7FFA] = 0x00;
        prg[0x7FFB] = 0x90;
        let mut bus = bus_with_prg(prg);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);

        bus.interrupts.assert_nmi();
        cpu.step(&mut bus);

        assert!(!bus.interrupts.is_nmi_asserted());
        assert!(cpu.get_flag(FLAG_INTERRUPT));
        // The vectored instruction ran: PC sits one past $9000's NOP.
        assert_eq!(cpu.pc, 0x9001);
    }

    #[test]
    fn irq_is_masked_by_interrupt_flag() {
        let mut prg = prg_with_code(&[0x58, 0xEA, 0xEA], 0x8000);
        prg[0x7FFE] = 0x00;
        prg[0x7FFF] = 0x90;
        let mut bus = bus_with_prg(prg);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);

        bus.interrupts.assert_irq();
        // I is set after reset, so the line stays asserted through a step.
        // (The first step also executes CLI.)
        cpu.step(&mut bus);
        assert!(bus.interrupts.is_irq_asserted());

        cpu.step(&mut bus);
        assert!(!bus.interrupts.is_irq_asserted());
        assert_eq!(cpu.pc, 0x9001);
    }

    #[test]
    fn indirect_y_page_cross_adds_a_cycle() {
        // LDA ($10),Y with Y pushing the address across a page.
        let (mut cpu, mut bus) = cpu_at_entry(&[0xA0, 0x01, 0xB1, 0x10], 0x8000);
        bus.write(0x0010, 0xFF);
        bus.write(0x0011, 0x02);
        bus.write(0x0300, 0x77);

        cpu.step(&mut bus);
        let cycles = cpu.step(&mut bus);

        assert_eq!(cpu.a, 0x77);
        assert_eq!(cycles, 6);
    }

    #[test]
    fn zero_page_x_wraps_in_zero_page() {
        // LDX #$10, LDA $F8,X -> reads $0008, not $0108.
        let (mut cpu, mut bus) = cpu_at_entry(&[0xA2, 0x10, 0xB5, 0xF8], 0x8000);
        bus.write(0x0008, 0x5A);

        cpu.step(&mut bus);
        cpu.step(&mut bus);
        assert_eq!(cpu.a, 0x5A);
    }

    #[test]
    fn lsr_accumulator_clears_negative() {
        let (mut cpu, mut bus) = cpu_at_entry(&[0xA9, 0x81, 0x4A], 0x8000);
        cpu.step(&mut bus);
        cpu.step(&mut bus);
        assert_eq!(cpu.a, 0x40);
        assert!(cpu.get_flag(FLAG_CARRY));
        assert!(!cpu.get_flag(FLAG_NEGATIVE));
    }

    #[test]
    fn rol_ror_rotate_through_carry() {
        // SEC, LDA #$40, ROL A -> $81 with carry clear.
        let (mut cpu, mut bus) = cpu_at_entry(&[0x38, 0xA9, 0x40, 0x2A, 0x6A], 0x8000);
        for _ in 0..4 {
            cpu.step(&mut bus);
        }
        assert_eq!(cpu.a, 0x81);
        assert!(!cpu.get_flag(FLAG_CARRY));
        cpu.step(&mut bus);
        assert_eq!(cpu.a, 0x40);
        assert!(cpu.get_flag(FLAG_CARRY));
    }

    #[test]
    fn lax_loads_both_registers() {
        let (mut cpu, mut bus) = cpu_at_entry(&[0xA7, 0x20], 0x8000);
        bus.write(0x0020, 0x9C);

        cpu.step(&mut bus);
        assert_eq!(cpu.a, 0x9C);
        assert_eq!(cpu.x, 0x9C);
        assert!(cpu.get_flag(FLAG_NEGATIVE));
    }

    #[test]
    fn sax_stores_a_and_x() {
        let (mut cpu, mut bus) = cpu_at_entry(&[0xA9, 0xF0, 0xA2, 0x3C, 0x87, 0x30], 0x8000);
        for _ in 0..3 {
            cpu.step(&mut bus);
        }
        assert_eq!(bus.read(0x0030), 0x30);
    }

    #[test]
    fn dcp_decrements_then_compares() {
        let (mut cpu, mut bus) = cpu_at_entry(&[0xA9, 0x41, 0xC7, 0x10], 0x8000);
        bus.write(0x0010, 0x42);

        cpu.step(&mut bus);
        cpu.step(&mut bus);
        assert_eq!(bus.read(0x0010), 0x41);
        assert!(cpu.get_flag(FLAG_ZERO));
        assert!(cpu.get_flag(FLAG_CARRY));
    }

    #[test]
    fn isb_increments_then_subtracts() {
        // SEC, LDA #$10, ISB $10 (mem $0F -> $10), A = $10 - $10 = 0.
        let (mut cpu, mut bus) = cpu_at_entry(&[0x38, 0xA9, 0x10, 0xE7, 0x10], 0x8000);
        bus.write(0x0010, 0x0F);

        for _ in 0..3 {
            cpu.step(&mut bus);
        }
        assert_eq!(bus.read(0x0010), 0x10);
        assert_eq!(cpu.a, 0x00);
        assert!(cpu.get_flag(FLAG_ZERO));
    }

    #[test]
    fn slo_shifts_memory_and_ors() {
        let (mut cpu, mut bus) = cpu_at_entry(&[0xA9, 0x01, 0x07, 0x10], 0x8000);
        bus.write(0x0010, 0x40);

        cpu.step(&mut bus);
        cpu.step(&mut bus);
        assert_eq!(bus.read(0x0010), 0x80);
        assert_eq!(cpu.a, 0x81);
    }

    #[test]
    fn every_opcode_has_a_cycle_floor_of_two() {
        for entry in OPCODE_TABLE.iter() {
            assert!(entry.cycles >= 2);
        }
    }

    #[test]
    fn jam_latches_halted() {
        let (mut cpu, mut bus) = cpu_at_entry(&[0x02], 0x8000);
        cpu.step(&mut bus);
        assert!(cpu.halted);
    }
}
