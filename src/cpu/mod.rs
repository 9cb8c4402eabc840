//! CPU step/decode/execute, as methods on [`GameBoy`]. Operand addressing
//! (`ByteSource`/`ByteTarget`/`Load`/...) lives in [`instruction`]; register
//! storage lives in [`registers`].

pub mod instruction;
pub mod registers;

use crate::constants::*;
use crate::utils;
use crate::GameBoy;
use instruction::{
    ByteSource, ByteTarget, Indirect, Instruction, JumpCondition, Load, Register, WordRegister,
};

impl GameBoy {
    /// Runs one fetch/decode/execute step. While halted, only a single
    /// M-cycle idle charge is applied. Unrecognized opcodes are a hard
    /// error: a well-formed ROM never produces one.
    pub fn step(&mut self) {
        self.cycles_to_wait = 0;

        if self.is_halted {
            self.cycles_to_wait += 1;
        } else {
            let opcode = self.read(self.pc);
            let (opcode, prefixed) = if opcode == 0xCB {
                (self.read(self.pc.wrapping_add(1)), true)
            } else {
                (opcode, false)
            };

            self.pc = match Instruction::from_byte(opcode, prefixed) {
                Some(instruction) => self.execute(instruction),
                None => {
                    let description = format!("{}{:02x}", if prefixed { "cb" } else { "" }, opcode);
                    log::error!("unresolved opcode 0x{description} at {:#06x}", self.pc);
                    panic!("unresolved opcode 0x{description} at {:#06x}", self.pc);
                }
            };
        }

        if self.need_to_do_interrupts {
            self.handle_interrupts();
        }
    }

    /// Drains the machine cycles charged by the last `step`, ticking the
    /// timer and PPU once per cycle so their counters stay in lock-step with
    /// the CPU's notion of time.
    pub fn wait(&mut self) {
        while self.cycles_to_wait > 0 {
            self.cycles_to_wait -= 1;
            self.tick_timer();
            self.tick_ppu();
        }
    }

    fn execute(&mut self, instruction: Instruction) -> u16 {
        match instruction {
            Instruction::LD(load) => self.handle_ld(load),
            Instruction::ADD(source) => self.handle_add(source),
            Instruction::ADDHL(source) => self.handle_add_hl(source),
            Instruction::ADDSP => self.handle_add_sp(),
            Instruction::ADC(source) => self.handle_adc(source),
            Instruction::SUB(source) => self.handle_sub(source),
            Instruction::SBC(source) => self.handle_sbc(source),
            Instruction::AND(source) => self.handle_and(source),
            Instruction::OR(source) => self.handle_or(source),
            Instruction::XOR(source) => self.handle_xor(source),
            Instruction::CP(source) => self.handle_cp(source),
            Instruction::INC(target) => self.handle_inc_byte(target),
            Instruction::DEC(target) => self.handle_dec_byte(target),
            Instruction::INC2(target) => self.handle_inc_word(target),
            Instruction::DEC2(target) => self.handle_dec_word(target),
            Instruction::RLCA => self.handle_rlca(),
            Instruction::RLA => self.handle_rla(),
            Instruction::RRCA => self.handle_rrca(),
            Instruction::RRA => self.handle_rra(),
            Instruction::RLC(target) => self.handle_rlc(target),
            Instruction::RRC(target) => self.handle_rrc(target),
            Instruction::RL(target) => self.handle_rl(target),
            Instruction::RR(target) => self.handle_rr(target),
            Instruction::SLA(target) => self.handle_sla(target),
            Instruction::SRA(target) => self.handle_sra(target),
            Instruction::SWAP(target) => self.handle_swap(target),
            Instruction::SRL(target) => self.handle_srl(target),
            Instruction::BIT(bit, target) => self.handle_bit(bit, target),
            Instruction::RES(bit, target) => self.handle_res(bit, target),
            Instruction::SET(bit, target) => self.handle_set(bit, target),
            Instruction::JP(test) => self.handle_jp(test),
            Instruction::JPHL => self.handle_jp_hl(),
            Instruction::JR(test) => self.handle_jr(test),
            Instruction::CALL(test) => self.handle_call(test),
            Instruction::RET(test) => self.handle_ret(test),
            Instruction::RETI => self.handle_reti(),
            Instruction::RST(code) => self.handle_rst(code),
            Instruction::PUSH(target) => self.handle_push(target),
            Instruction::POP(target) => self.handle_pop(target),
            Instruction::DAA => self.handle_daa(),
            Instruction::CPL => self.handle_cpl(),
            Instruction::NOP => self.handle_nop(),
            Instruction::CCF => self.handle_ccf(),
            Instruction::SCF => self.handle_scf(),
            Instruction::DI => self.handle_ime(false),
            Instruction::EI => self.handle_ime(true),
            Instruction::HALT => self.handle_halt(),
            Instruction::STOP => self.handle_stop(),
        }
    }

    /// Reads the byte after PC and advances PC past it.
    fn consume_byte(&mut self) -> u8 {
        self.pc = self.pc.wrapping_add(1);
        self.read(self.pc)
    }

    /// Reads the word after PC and advances PC past it.
    fn consume_word(&mut self) -> u16 {
        u16::from(self.consume_byte()) | (u16::from(self.consume_byte()) << 8)
    }

    fn push_stack(&mut self, value: u16) {
        self.sp = self.sp.wrapping_sub(1);
        self.write(self.sp, (value >> 8) as u8);
        self.sp = self.sp.wrapping_sub(1);
        self.write(self.sp, value as u8);
    }

    fn pop_stack(&mut self) -> u16 {
        let lsb = u16::from(self.read(self.sp));
        self.sp = self.sp.wrapping_add(1);
        let msb = u16::from(self.read(self.sp));
        self.sp = self.sp.wrapping_add(1);
        (msb << 8) | lsb
    }

    fn read_register(&self, register: Register) -> u8 {
        match register {
            Register::A => self.r.a,
            Register::B => self.r.b,
            Register::C => self.r.c,
            Register::D => self.r.d,
            Register::E => self.r.e,
            Register::H => self.r.h,
            Register::L => self.r.l,
        }
    }

    fn write_register(&mut self, register: Register, value: u8) {
        match register {
            Register::A => self.r.a = value,
            Register::B => self.r.b = value,
            Register::C => self.r.c = value,
            Register::D => self.r.d = value,
            Register::E => self.r.e = value,
            Register::H => self.r.h = value,
            Register::L => self.r.l = value,
        }
    }

    fn read_word_register(&self, register: WordRegister) -> u16 {
        match register {
            WordRegister::BC => self.r.get_bc(),
            WordRegister::DE => self.r.get_de(),
            WordRegister::HL => self.r.get_hl(),
            WordRegister::SP => self.sp,
            WordRegister::AF => self.r.get_af(),
        }
    }

    fn write_word_register(&mut self, register: WordRegister, value: u16) {
        match register {
            WordRegister::BC => self.r.set_bc(value),
            WordRegister::DE => self.r.set_de(value),
            WordRegister::HL => self.r.set_hl(value),
            WordRegister::SP => self.sp = value,
            WordRegister::AF => self.r.set_af(value),
        }
    }

    /// Reads a [`ByteSource`], consuming an immediate byte from the stream
    /// if that's what the source is.
    fn read_byte_source(&mut self, source: ByteSource) -> u8 {
        match source {
            ByteSource::Register(r) => self.read_register(r),
            ByteSource::HLIndirect => self.read(self.r.get_hl()),
            ByteSource::Immediate => self.consume_byte(),
        }
    }

    fn read_byte_target(&self, target: ByteTarget) -> u8 {
        match target {
            ByteTarget::Register(r) => self.read_register(r),
            ByteTarget::HLIndirect => self.read(self.r.get_hl()),
        }
    }

    fn write_byte_target(&mut self, target: ByteTarget, value: u8) {
        match target {
            ByteTarget::Register(r) => self.write_register(r, value),
            ByteTarget::HLIndirect => self.write(self.r.get_hl(), value),
        }
    }

    fn resolve_jump(&self, test: JumpCondition) -> bool {
        match test {
            JumpCondition::NotZero => !self.r.f.zero(),
            JumpCondition::Zero => self.r.f.zero(),
            JumpCondition::NotCarry => !self.r.f.carry(),
            JumpCondition::Carry => self.r.f.carry(),
            JumpCondition::Always => true,
        }
    }

    /// Charges `source.is_immediate_or_hl()`-style variable cost: register
    /// operands cost one cycle, `(HL)`/immediate operands cost two.
    fn charge_byte_source(&mut self, source: ByteSource) {
        match source {
            ByteSource::Register(_) => self.cycles_to_wait += 1,
            ByteSource::HLIndirect | ByteSource::Immediate => {
                self.cycles_to_wait += 2
            }
        }
    }

    fn charge_byte_target(&mut self, target: ByteTarget, register_cost: u32, hl_cost: u32) {
        match target {
            ByteTarget::Register(_) => self.cycles_to_wait += register_cost,
            ByteTarget::HLIndirect => self.cycles_to_wait += hl_cost,
        }
    }

    fn handle_add(&mut self, source: ByteSource) -> u16 {
        let value = self.read_byte_source(source);
        let (result, overflow) = self.r.a.overflowing_add(value);
        self.r
            .f
            .update(result == 0, false, utils::half_carry_add_u8(self.r.a, value), overflow);
        self.r.a = result;
        self.charge_byte_source(source);
        self.pc.wrapping_add(1)
    }

    fn handle_add_hl(&mut self, source: WordRegister) -> u16 {
        let hl = self.r.get_hl();
        let value = self.read_word_register(source);
        let (result, overflow) = hl.overflowing_add(value);
        let half_carry = (hl ^ value ^ result) & 0x1000 != 0;
        self.r.f.set(registers::FlagsRegister::SUBTRACTION, false);
        self.r.f.set(registers::FlagsRegister::HALF_CARRY, half_carry);
        self.r.f.set(registers::FlagsRegister::CARRY, overflow);
        self.r.set_hl(result);
        self.cycles_to_wait += 2;
        self.pc.wrapping_add(1)
    }

    fn handle_add_sp(&mut self) -> u16 {
        let sp = self.sp as i32;
        let offset = self.consume_byte() as i8 as i32;
        let result = sp.wrapping_add(offset);
        self.sp = result as u16;
        let half_carry = (sp ^ offset ^ result) & 0x10 != 0;
        let carry = (sp ^ offset ^ result) & 0x100 != 0;
        self.r.f.update(false, false, half_carry, carry);
        self.cycles_to_wait += 4;
        self.pc.wrapping_add(1)
    }

    fn handle_adc(&mut self, source: ByteSource) -> u16 {
        let value = self.read_byte_source(source);
        let carry_in = self.r.f.carry() as u8;
        let half_carry = ((self.r.a & 0x0F) + (value & 0x0F) + carry_in) > 0x0F;
        let (partial, overflow1) = self.r.a.overflowing_add(value);
        let (result, overflow2) = partial.overflowing_add(carry_in);
        self.r.f.update(result == 0, false, half_carry, overflow1 || overflow2);
        self.r.a = result;
        self.charge_byte_source(source);
        self.pc.wrapping_add(1)
    }

    fn handle_sub(&mut self, source: ByteSource) -> u16 {
        let value = self.read_byte_source(source);
        let a = u16::from(self.r.a);
        let v = u16::from(value);
        let result = a.wrapping_sub(v);
        let carry_bits = a ^ v ^ result;
        self.r
            .f
            .update(result as u8 == 0, true, carry_bits & 0x10 != 0, carry_bits & 0x100 != 0);
        self.r.a = result as u8;
        self.charge_byte_source(source);
        self.pc.wrapping_add(1)
    }

    fn handle_sbc(&mut self, source: ByteSource) -> u16 {
        let value = self.read_byte_source(source);
        let a = u32::from(self.r.a);
        let v = u32::from(value);
        let carry_in = u32::from(self.r.f.carry());
        let result = a.wrapping_sub(v).wrapping_sub(carry_in);
        self.r.f.update(
            result as u8 == 0,
            true,
            (a ^ v ^ result) & 0x10 != 0,
            result & 0x100 != 0,
        );
        self.r.a = result as u8;
        self.charge_byte_source(source);
        self.pc.wrapping_add(1)
    }

    fn handle_and(&mut self, source: ByteSource) -> u16 {
        let value = self.read_byte_source(source);
        self.r.a &= value;
        self.r.f.update(self.r.a == 0, false, true, false);
        self.charge_byte_source(source);
        self.pc.wrapping_add(1)
    }

    fn handle_or(&mut self, source: ByteSource) -> u16 {
        let value = self.read_byte_source(source);
        self.r.a |= value;
        self.r.f.update(self.r.a == 0, false, false, false);
        self.charge_byte_source(source);
        self.pc.wrapping_add(1)
    }

    fn handle_xor(&mut self, source: ByteSource) -> u16 {
        let value = self.read_byte_source(source);
        self.r.a ^= value;
        self.r.f.update(self.r.a == 0, false, false, false);
        self.charge_byte_source(source);
        self.pc.wrapping_add(1)
    }

    fn handle_cp(&mut self, source: ByteSource) -> u16 {
        let value = self.read_byte_source(source);
        let result = u32::from(self.r.a).wrapping_sub(u32::from(value));
        self.r.f.update(
            result as u8 == 0,
            true,
            (self.r.a ^ value ^ result as u8) & 0x10 != 0,
            result & 0x100 != 0,
        );
        self.charge_byte_source(source);
        self.pc.wrapping_add(1)
    }

    fn handle_inc_byte(&mut self, target: ByteTarget) -> u16 {
        let value = self.read_byte_target(target);
        let result = value.wrapping_add(1);
        self.write_byte_target(target, result);
        self.r.f.set(registers::FlagsRegister::HALF_CARRY, value & 0x0F == 0x0F);
        self.r.f.set(registers::FlagsRegister::ZERO, result == 0);
        self.r.f.set(registers::FlagsRegister::SUBTRACTION, false);
        self.charge_byte_target(target, 1, 3);
        self.pc.wrapping_add(1)
    }

    fn handle_dec_byte(&mut self, target: ByteTarget) -> u16 {
        let value = self.read_byte_target(target);
        let result = value.wrapping_sub(1);
        self.write_byte_target(target, result);
        self.r.f.set(registers::FlagsRegister::HALF_CARRY, value.trailing_zeros() >= 4);
        self.r.f.set(registers::FlagsRegister::ZERO, result == 0);
        self.r.f.set(registers::FlagsRegister::SUBTRACTION, true);
        self.charge_byte_target(target, 1, 3);
        self.pc.wrapping_add(1)
    }

    fn handle_inc_word(&mut self, target: WordRegister) -> u16 {
        let value = self.read_word_register(target);
        self.write_word_register(target, value.wrapping_add(1));
        self.cycles_to_wait += 2;
        self.pc.wrapping_add(1)
    }

    fn handle_dec_word(&mut self, target: WordRegister) -> u16 {
        let value = self.read_word_register(target);
        self.write_word_register(target, value.wrapping_sub(1));
        self.cycles_to_wait += 2;
        self.pc.wrapping_add(1)
    }

    fn handle_rlca(&mut self) -> u16 {
        let carry = self.r.a & 0x80 != 0;
        self.r.a = (self.r.a << 1) | carry as u8;
        self.r.f.update(false, false, false, carry);
        self.cycles_to_wait += 1;
        self.pc.wrapping_add(1)
    }

    fn handle_rla(&mut self) -> u16 {
        let carry = self.r.a & 0x80 != 0;
        self.r.a = (self.r.a << 1) | self.r.f.carry() as u8;
        self.r.f.update(false, false, false, carry);
        self.cycles_to_wait += 1;
        self.pc.wrapping_add(1)
    }

    fn handle_rrca(&mut self) -> u16 {
        let carry = self.r.a & 0x01 != 0;
        self.r.a = (self.r.a >> 1) | ((carry as u8) << 7);
        self.r.f.update(false, false, false, carry);
        self.cycles_to_wait += 1;
        self.pc.wrapping_add(1)
    }

    fn handle_rra(&mut self) -> u16 {
        let carry = self.r.a & 0x01 != 0;
        self.r.a = (self.r.a >> 1) | ((self.r.f.carry() as u8) << 7);
        self.r.f.update(false, false, false, carry);
        self.cycles_to_wait += 1;
        self.pc.wrapping_add(1)
    }

    fn handle_rlc(&mut self, target: ByteTarget) -> u16 {
        let value = self.read_byte_target(target);
        let carry = value & 0x80 != 0;
        let result = value.rotate_left(1);
        self.r.f.update(result == 0, false, false, carry);
        self.write_byte_target(target, result);
        self.charge_byte_target(target, 2, 4);
        self.pc.wrapping_add(2)
    }

    fn handle_rrc(&mut self, target: ByteTarget) -> u16 {
        let value = self.read_byte_target(target);
        let carry = value & 0x01 != 0;
        let result = value.rotate_right(1);
        self.r.f.update(result == 0, false, false, carry);
        self.write_byte_target(target, result);
        self.charge_byte_target(target, 2, 4);
        self.pc.wrapping_add(2)
    }

    fn handle_rl(&mut self, target: ByteTarget) -> u16 {
        let value = self.read_byte_target(target);
        let carry = value & 0x80 != 0;
        let result = (value << 1) | self.r.f.carry() as u8;
        self.r.f.update(result == 0, false, false, carry);
        self.write_byte_target(target, result);
        self.charge_byte_target(target, 2, 4);
        self.pc.wrapping_add(2)
    }

    fn handle_rr(&mut self, target: ByteTarget) -> u16 {
        let value = self.read_byte_target(target);
        let carry = value & 0x01 != 0;
        let result = (value >> 1) | ((self.r.f.carry() as u8) << 7);
        self.r.f.update(result == 0, false, false, carry);
        self.write_byte_target(target, result);
        self.charge_byte_target(target, 2, 4);
        self.pc.wrapping_add(2)
    }

    fn handle_sla(&mut self, target: ByteTarget) -> u16 {
        let value = self.read_byte_target(target);
        let carry = value & 0x80 != 0;
        let result = value << 1;
        self.r.f.update(result == 0, false, false, carry);
        self.write_byte_target(target, result);
        self.charge_byte_target(target, 2, 4);
        self.pc.wrapping_add(2)
    }

    fn handle_sra(&mut self, target: ByteTarget) -> u16 {
        let value = self.read_byte_target(target);
        let carry = value & 0x01 != 0;
        let result = (value >> 1) | (value & 0x80);
        self.r.f.update(result == 0, false, false, carry);
        self.write_byte_target(target, result);
        self.charge_byte_target(target, 2, 4);
        self.pc.wrapping_add(2)
    }

    fn handle_srl(&mut self, target: ByteTarget) -> u16 {
        let value = self.read_byte_target(target);
        let carry = value & 0x01 != 0;
        let result = value >> 1;
        self.r.f.update(result == 0, false, false, carry);
        self.write_byte_target(target, result);
        self.charge_byte_target(target, 2, 4);
        self.pc.wrapping_add(2)
    }

    fn handle_swap(&mut self, target: ByteTarget) -> u16 {
        let value = self.read_byte_target(target);
        self.r.f.update(value == 0, false, false, false);
        self.write_byte_target(target, value.rotate_right(4));
        self.charge_byte_target(target, 2, 4);
        self.pc.wrapping_add(2)
    }

    fn handle_bit(&mut self, bit: u8, target: ByteTarget) -> u16 {
        let value = self.read_byte_target(target);
        self.r.f.set(registers::FlagsRegister::ZERO, !utils::bit_at(value, bit));
        self.r.f.set(registers::FlagsRegister::SUBTRACTION, false);
        self.r.f.set(registers::FlagsRegister::HALF_CARRY, true);
        self.charge_byte_target(target, 2, 4);
        self.pc.wrapping_add(2)
    }

    fn handle_res(&mut self, bit: u8, target: ByteTarget) -> u16 {
        let value = self.read_byte_target(target);
        self.write_byte_target(target, utils::set_bit(value, bit, false));
        self.charge_byte_target(target, 2, 4);
        self.pc.wrapping_add(2)
    }

    fn handle_set(&mut self, bit: u8, target: ByteTarget) -> u16 {
        let value = self.read_byte_target(target);
        self.write_byte_target(target, utils::set_bit(value, bit, true));
        self.charge_byte_target(target, 2, 4);
        self.pc.wrapping_add(2)
    }

    fn handle_jp(&mut self, test: JumpCondition) -> u16 {
        let should_jump = self.resolve_jump(test);
        let target = self.consume_word();
        if should_jump {
            self.cycles_to_wait += 4;
            target
        } else {
            self.cycles_to_wait += 3;
            self.pc.wrapping_add(1)
        }
    }

    fn handle_jp_hl(&mut self) -> u16 {
        self.cycles_to_wait += 1;
        self.r.get_hl()
    }

    fn handle_jr(&mut self, test: JumpCondition) -> u16 {
        let should_jump = self.resolve_jump(test);
        let offset = self.consume_byte() as i8;
        if should_jump {
            self.cycles_to_wait += 3;
            (self.pc as i16).wrapping_add(1).wrapping_add(offset as i16) as u16
        } else {
            self.cycles_to_wait += 2;
            self.pc.wrapping_add(1)
        }
    }

    fn handle_call(&mut self, test: JumpCondition) -> u16 {
        let should_jump = self.resolve_jump(test);
        let target = self.consume_word();
        let next_pc = self.pc.wrapping_add(1);
        if should_jump {
            self.cycles_to_wait += 6;
            self.push_stack(next_pc);
            target
        } else {
            self.cycles_to_wait += 3;
            next_pc
        }
    }

    fn handle_ret(&mut self, test: JumpCondition) -> u16 {
        let should_jump = self.resolve_jump(test);
        let cycles = if test == JumpCondition::Always {
            4
        } else if should_jump {
            5
        } else {
            2
        };
        self.cycles_to_wait += cycles;
        if should_jump {
            self.pop_stack()
        } else {
            self.pc.wrapping_add(1)
        }
    }

    fn handle_reti(&mut self) -> u16 {
        self.cycles_to_wait += 4;
        self.ime = true;
        self.pop_stack()
    }

    fn handle_rst(&mut self, code: u8) -> u16 {
        self.cycles_to_wait += 4;
        self.push_stack(self.pc.wrapping_add(1));
        u16::from(code)
    }

    fn handle_push(&mut self, target: WordRegister) -> u16 {
        let value = self.read_word_register(target);
        self.push_stack(value);
        self.cycles_to_wait += 4;
        self.pc.wrapping_add(1)
    }

    fn handle_pop(&mut self, target: WordRegister) -> u16 {
        let value = self.pop_stack();
        self.write_word_register(target, value);
        self.cycles_to_wait += 3;
        self.pc.wrapping_add(1)
    }

    fn handle_daa(&mut self) -> u16 {
        if self.r.f.negative() {
            if self.r.f.carry() {
                self.r.a = self.r.a.wrapping_sub(0x60);
            }
            if self.r.f.half_carry() {
                self.r.a = self.r.a.wrapping_sub(0x06);
            }
        } else {
            if self.r.f.carry() || self.r.a > 0x99 {
                self.r.a = self.r.a.wrapping_add(0x60);
                self.r.f.set(registers::FlagsRegister::CARRY, true);
            }
            if self.r.f.half_carry() || (self.r.a & 0x0F) > 0x09 {
                self.r.a = self.r.a.wrapping_add(0x06);
            }
        }
        self.r.f.set(registers::FlagsRegister::ZERO, self.r.a == 0);
        self.r.f.set(registers::FlagsRegister::HALF_CARRY, false);
        self.cycles_to_wait += 1;
        self.pc.wrapping_add(1)
    }

    fn handle_cpl(&mut self) -> u16 {
        self.r.a = !self.r.a;
        self.r.f.set(registers::FlagsRegister::SUBTRACTION, true);
        self.r.f.set(registers::FlagsRegister::HALF_CARRY, true);
        self.cycles_to_wait += 1;
        self.pc.wrapping_add(1)
    }

    fn handle_nop(&mut self) -> u16 {
        self.cycles_to_wait += 1;
        self.pc.wrapping_add(1)
    }

    fn handle_ccf(&mut self) -> u16 {
        let carry = self.r.f.carry();
        self.r.f.update(self.r.f.zero(), false, false, !carry);
        self.cycles_to_wait += 1;
        self.pc.wrapping_add(1)
    }

    fn handle_scf(&mut self) -> u16 {
        self.r.f.update(self.r.f.zero(), false, false, true);
        self.cycles_to_wait += 1;
        self.pc.wrapping_add(1)
    }

    fn handle_ime(&mut self, enable: bool) -> u16 {
        self.ime = enable;
        self.cycles_to_wait += 1;
        self.pc.wrapping_add(1)
    }

    fn handle_halt(&mut self) -> u16 {
        self.is_halted = true;
        self.cycles_to_wait += 1;
        self.pc.wrapping_add(1)
    }

    /// STOP halts the CPU and resets DIV, same as a real DMG; the LCD-off
    /// requirement and speed-switch handling (CGB-only) are out of scope.
    fn handle_stop(&mut self) -> u16 {
        self.write(TIMER_DIVIDER, 0);
        self.is_halted = true;
        self.cycles_to_wait += 1;
        self.pc.wrapping_add(2)
    }

    fn handle_ld(&mut self, load: Load) -> u16 {
        match load {
            Load::Byte(target, source) => {
                let value = self.read_byte_source(source);
                self.write_byte_target(target, value);
                self.charge_byte_source(source);
                self.pc.wrapping_add(1)
            }
            Load::Word(target) => {
                let value = self.consume_word();
                self.write_word_register(target, value);
                self.cycles_to_wait += 3;
                self.pc.wrapping_add(1)
            }
            Load::IndirectFromSP => {
                let address = self.consume_word();
                self.write16(address, self.sp);
                self.cycles_to_wait += 5;
                self.pc.wrapping_add(1)
            }
            Load::SPFromHL => {
                self.sp = self.r.get_hl();
                self.cycles_to_wait += 2;
                self.pc.wrapping_add(1)
            }
            Load::HLFromSPi8 => {
                let sp = self.sp as i32;
                let offset = self.consume_byte() as i8 as i32;
                let result = sp.wrapping_add(offset);
                let half_carry = (sp ^ offset ^ result) & 0x10 != 0;
                let carry = (sp ^ offset ^ result) & 0x100 != 0;
                self.r.f.update(false, false, half_carry, carry);
                self.r.set_hl(result as u16);
                self.cycles_to_wait += 3;
                self.pc.wrapping_add(1)
            }
            Load::IndirectFromA(indirect) => {
                let address = match indirect {
                    Indirect::BC => self.r.get_bc(),
                    Indirect::DE => self.r.get_de(),
                };
                self.write(address, self.r.a);
                self.cycles_to_wait += 2;
                self.pc.wrapping_add(1)
            }
            Load::AFromIndirect(indirect) => {
                let address = match indirect {
                    Indirect::BC => self.r.get_bc(),
                    Indirect::DE => self.r.get_de(),
                };
                self.r.a = self.read(address);
                self.cycles_to_wait += 2;
                self.pc.wrapping_add(1)
            }
            Load::HLIFromAInc => {
                let hl = self.r.get_hl();
                self.write(hl, self.r.a);
                self.r.set_hl(hl.wrapping_add(1));
                self.cycles_to_wait += 2;
                self.pc.wrapping_add(1)
            }
            Load::HLIFromADec => {
                let hl = self.r.get_hl();
                self.write(hl, self.r.a);
                self.r.set_hl(hl.wrapping_sub(1));
                self.cycles_to_wait += 2;
                self.pc.wrapping_add(1)
            }
            Load::HLIToAInc => {
                let hl = self.r.get_hl();
                self.r.a = self.read(hl);
                self.r.set_hl(hl.wrapping_add(1));
                self.cycles_to_wait += 2;
                self.pc.wrapping_add(1)
            }
            Load::HLIToADec => {
                let hl = self.r.get_hl();
                self.r.a = self.read(hl);
                self.r.set_hl(hl.wrapping_sub(1));
                self.cycles_to_wait += 2;
                self.pc.wrapping_add(1)
            }
            Load::FF00CFromA => {
                self.write(0xFF00 | u16::from(self.r.c), self.r.a);
                self.cycles_to_wait += 2;
                self.pc.wrapping_add(1)
            }
            Load::AFromFF00C => {
                self.r.a = self.read(0xFF00 | u16::from(self.r.c));
                self.cycles_to_wait += 2;
                self.pc.wrapping_add(1)
            }
            Load::FF00a8FromA => {
                let offset = self.consume_byte();
                self.write(0xFF00 | u16::from(offset), self.r.a);
                self.cycles_to_wait += 3;
                self.pc.wrapping_add(1)
            }
            Load::AFromFF00a8 => {
                let offset = self.consume_byte();
                self.r.a = self.read(0xFF00 | u16::from(offset));
                self.cycles_to_wait += 3;
                self.pc.wrapping_add(1)
            }
            Load::A16FromA => {
                let address = self.consume_word();
                self.write(address, self.r.a);
                self.cycles_to_wait += 4;
                self.pc.wrapping_add(1)
            }
            Load::AFromA16 => {
                let address = self.consume_word();
                self.r.a = self.read(address);
                self.cycles_to_wait += 4;
                self.pc.wrapping_add(1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gb_at(pc: u16, program: &[u8]) -> GameBoy {
        let mut gb = GameBoy::new();
        gb.pc = pc;
        for (i, byte) in program.iter().enumerate() {
            gb.write_raw(pc + i as u16, *byte);
        }
        gb
    }

    #[test]
    fn nop_advances_pc_by_one() {
        let mut gb = gb_at(0x100, &[0x00]);
        gb.step();
        assert_eq!(gb.pc, 0x101);
    }

    #[test]
    fn ld_b_d8_loads_immediate_and_advances_two() {
        let mut gb = gb_at(0x100, &[0x06, 0x42]);
        gb.step();
        assert_eq!(gb.r.b, 0x42);
        assert_eq!(gb.pc, 0x102);
    }

    #[test]
    fn add_sets_carry_and_zero_correctly() {
        let mut gb = gb_at(0x100, &[0x80]); // ADD A, B
        gb.r.a = 0xFF;
        gb.r.b = 0x01;
        gb.step();
        assert_eq!(gb.r.a, 0);
        assert!(gb.r.f.zero());
        assert!(gb.r.f.carry());
        assert!(gb.r.f.half_carry());
    }

    #[test]
    fn jr_negative_offset_moves_pc_backward() {
        let mut gb = gb_at(0x100, &[0x18, 0xFE]); // JR -2
        gb.step();
        assert_eq!(gb.pc, 0x100);
        assert_eq!(gb.cycles_to_wait, 3);
    }

    #[test]
    fn add_flags_hold_over_the_full_byte_product() {
        for a in 0..=255u16 {
            for b in 0..=255u16 {
                let mut gb = gb_at(0x100, &[0x80]); // ADD A, B
                gb.r.a = a as u8;
                gb.r.b = b as u8;
                gb.step();

                let sum = a + b;
                assert_eq!(gb.r.a, (sum & 0xFF) as u8);
                assert_eq!(gb.r.f.zero(), (sum & 0xFF) == 0);
                assert_eq!(gb.r.f.half_carry(), (a & 0xF) + (b & 0xF) > 0xF);
                assert_eq!(gb.r.f.carry(), sum > 0xFF);
                assert!(!gb.r.f.negative());
            }
        }
    }

    #[test]
    fn daa_round_trips_bcd_addition_for_every_encodable_pair() {
        for a in 0..100u8 {
            for b in 0..100u8 {
                let a_bcd = (a / 10) << 4 | (a % 10);
                let b_bcd = (b / 10) << 4 | (b % 10);

                let mut gb = gb_at(0x100, &[0x80, 0x27]); // ADD A, B ; DAA
                gb.r.a = a_bcd;
                gb.r.b = b_bcd;
                gb.step();
                gb.step();

                let expected = (a as u16 + b as u16) % 100;
                let expected_bcd = ((expected / 10) << 4 | (expected % 10)) as u8;
                assert_eq!(gb.r.a, expected_bcd, "a={a} b={b}");
                assert_eq!(gb.r.f.carry(), (a as u16 + b as u16) >= 100, "a={a} b={b}");
            }
        }
    }

    #[test]
    fn call_and_ret_round_trip_through_the_stack() {
        let mut gb = gb_at(0x100, &[0xCD, 0x00, 0x02]); // CALL 0x0200
        gb.sp = 0xFFFE;
        gb.write_raw(0x0200, 0xC9); // RET
        gb.step();
        assert_eq!(gb.pc, 0x0200);
        gb.step();
        assert_eq!(gb.pc, 0x0103);
    }

    #[test]
    fn stop_halts_and_resets_divider() {
        let mut gb = gb_at(0x100, &[0x10, 0x00]);
        gb.write(TIMER_DIVIDER, 0x50);
        gb.step();
        assert!(gb.is_halted);
        assert_eq!(gb.read(TIMER_DIVIDER), 0);
        assert_eq!(gb.pc, 0x102);
    }

    #[test]
    fn daa_corrects_bcd_addition() {
        let mut gb = gb_at(0x100, &[0x27]); // DAA
        gb.r.a = 0x0A; // as if 5 + 5 overflowed the low nibble
        gb.r.f.update(false, false, true, false);
        gb.step();
        assert_eq!(gb.r.a, 0x10);
    }

    #[test]
    fn bit_sets_zero_flag_when_bit_clear() {
        let mut gb = gb_at(0x100, &[0xCB, 0x40]); // BIT 0, B
        gb.r.b = 0b1111_1110;
        gb.step();
        assert!(gb.r.f.zero());
        assert_eq!(gb.pc, 0x102);
    }

    #[test]
    fn halted_cpu_only_burns_one_cycle_group() {
        let mut gb = gb_at(0x100, &[0x00]);
        gb.is_halted = true;
        gb.step();
        assert_eq!(gb.pc, 0x100);
        assert_eq!(gb.cycles_to_wait, 1);
    }
}
