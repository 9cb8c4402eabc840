//! Opcode operand types and the `Instruction` decoder.
//!
//! Decoding partitions the 256-entry opcode table into families keyed by
//! bit-fields of the opcode byte (`upper_r`, `lower_r`, `dd`, `cc`, `b`);
//! irregular opcodes are matched literally. Immediate operands (d8/d16/a8/a16)
//! are not read during decode — handlers consume them from the bus as they
//! execute, advancing PC themselves.

use std::fmt;

/// An 8-bit architectural register. The `(HL)` indirect slot (bit pattern
/// 0b110) is never represented here; it is [`ByteTarget::HLIndirect`] /
/// [`ByteSource::HLIndirect`] instead.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Register {
    A,
    B,
    C,
    D,
    E,
    H,
    L,
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A 16-bit register pair. Which variants are reachable depends on whether
/// the opcode used the `dd` group (BC, DE, HL, SP) or the `qq` group
/// (BC, DE, HL, AF); the decoder never produces an invalid combination for a
/// given instruction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WordRegister {
    BC,
    DE,
    HL,
    SP,
    AF,
}

impl fmt::Display for WordRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Where an 8-bit value is read from for an ALU/load operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ByteSource {
    Register(Register),
    HLIndirect,
    Immediate,
}

/// Where an 8-bit value is written to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ByteTarget {
    Register(Register),
    HLIndirect,
}

/// One of the two 16-bit indirect addressing forms used by `LD (BC/DE),A`
/// and `LD A,(BC/DE)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Indirect {
    BC,
    DE,
}

/// The many shapes of the `LD` instruction family.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Load {
    /// `LD r, r'` / `LD r, d8` / `LD r, (HL)` / `LD (HL), r` / `LD (HL), d8`.
    Byte(ByteTarget, ByteSource),
    /// `LD dd, d16`.
    Word(WordRegister),
    /// `LD (a16), SP`.
    IndirectFromSP,
    /// `LD SP, HL`.
    SPFromHL,
    /// `LD HL, SP+r8` (signed displacement).
    HLFromSPi8,
    /// `LD (BC/DE), A`.
    IndirectFromA(Indirect),
    /// `LD A, (BC/DE)`.
    AFromIndirect(Indirect),
    /// `LD (HL+), A`.
    HLIFromAInc,
    /// `LD (HL-), A`.
    HLIFromADec,
    /// `LD A, (HL+)`.
    HLIToAInc,
    /// `LD A, (HL-)`.
    HLIToADec,
    /// `LD (C), A` (i.e. `(0xFF00+C)`).
    FF00CFromA,
    /// `LD A, (C)`.
    AFromFF00C,
    /// `LDH (a8), A`.
    FF00a8FromA,
    /// `LDH A, (a8)`.
    AFromFF00a8,
    /// `LD (a16), A`.
    A16FromA,
    /// `LD A, (a16)`.
    AFromA16,
}

/// A condition for a conditional jump/call/return.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum JumpCondition {
    NotZero,
    Zero,
    NotCarry,
    Carry,
    Always,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Instruction {
    LD(Load),
    ADD(ByteSource),
    ADDHL(WordRegister),
    ADDSP,
    ADC(ByteSource),
    SUB(ByteSource),
    SBC(ByteSource),
    AND(ByteSource),
    OR(ByteSource),
    XOR(ByteSource),
    CP(ByteSource),
    INC(ByteTarget),
    DEC(ByteTarget),
    INC2(WordRegister),
    DEC2(WordRegister),
    RLCA,
    RLA,
    RRCA,
    RRA,
    RLC(ByteTarget),
    RRC(ByteTarget),
    RL(ByteTarget),
    RR(ByteTarget),
    SLA(ByteTarget),
    SRA(ByteTarget),
    SWAP(ByteTarget),
    SRL(ByteTarget),
    BIT(u8, ByteTarget),
    RES(u8, ByteTarget),
    SET(u8, ByteTarget),
    JP(JumpCondition),
    JPHL,
    JR(JumpCondition),
    CALL(JumpCondition),
    RET(JumpCondition),
    RETI,
    RST(u8),
    PUSH(WordRegister),
    POP(WordRegister),
    DAA,
    CPL,
    NOP,
    CCF,
    SCF,
    DI,
    EI,
    HALT,
    STOP,
}

/// Maps the 3-bit `r` field to a [`Register`], or `None` for the reserved
/// `(HL)` indirect slot (0b110) — callers decide how to route that case.
fn register_from_bits(bits: u8) -> Option<Register> {
    match bits & 0b111 {
        0b000 => Some(Register::B),
        0b001 => Some(Register::C),
        0b010 => Some(Register::D),
        0b011 => Some(Register::E),
        0b100 => Some(Register::H),
        0b101 => Some(Register::L),
        0b110 => None,
        0b111 => Some(Register::A),
        _ => unreachable!(),
    }
}

fn byte_source_from_bits(bits: u8) -> ByteSource {
    match register_from_bits(bits) {
        Some(r) => ByteSource::Register(r),
        None => ByteSource::HLIndirect,
    }
}

fn byte_target_from_bits(bits: u8) -> ByteTarget {
    match register_from_bits(bits) {
        Some(r) => ByteTarget::Register(r),
        None => ByteTarget::HLIndirect,
    }
}

/// Maps the 2-bit `dd` field (opcode bits 5..4) to BC/DE/HL/SP.
fn word_register_dd(bits: u8) -> WordRegister {
    match bits & 0b11 {
        0b00 => WordRegister::BC,
        0b01 => WordRegister::DE,
        0b10 => WordRegister::HL,
        0b11 => WordRegister::SP,
        _ => unreachable!(),
    }
}

/// Maps the 2-bit `qq` field (opcode bits 5..4) to BC/DE/HL/AF.
fn word_register_qq(bits: u8) -> WordRegister {
    match bits & 0b11 {
        0b00 => WordRegister::BC,
        0b01 => WordRegister::DE,
        0b10 => WordRegister::HL,
        0b11 => WordRegister::AF,
        _ => unreachable!(),
    }
}

fn jump_condition(bits: u8) -> JumpCondition {
    match bits & 0b11 {
        0b00 => JumpCondition::NotZero,
        0b01 => JumpCondition::Zero,
        0b10 => JumpCondition::NotCarry,
        0b11 => JumpCondition::Carry,
        _ => unreachable!(),
    }
}

impl Instruction {
    pub fn from_byte(opcode: u8, prefixed: bool) -> Option<Instruction> {
        if prefixed {
            Some(Self::from_cb_byte(opcode))
        } else {
            Self::from_plain_byte(opcode)
        }
    }

    fn from_cb_byte(opcode: u8) -> Instruction {
        let target = byte_target_from_bits(opcode);
        let group = (opcode >> 6) & 0b11;
        let mid = (opcode >> 3) & 0b111;
        match group {
            0b00 => match mid {
                0 => Instruction::RLC(target),
                1 => Instruction::RRC(target),
                2 => Instruction::RL(target),
                3 => Instruction::RR(target),
                4 => Instruction::SLA(target),
                5 => Instruction::SRA(target),
                6 => Instruction::SWAP(target),
                7 => Instruction::SRL(target),
                _ => unreachable!(),
            },
            0b01 => Instruction::BIT(mid, target),
            0b10 => Instruction::RES(mid, target),
            0b11 => Instruction::SET(mid, target),
            _ => unreachable!(),
        }
    }

    fn from_plain_byte(opcode: u8) -> Option<Instruction> {
        // Irregular / uniquely-encoded opcodes first.
        let literal = match opcode {
            0x00 => Some(Instruction::NOP),
            0x07 => Some(Instruction::RLCA),
            0x08 => Some(Instruction::LD(Load::IndirectFromSP)),
            0x0F => Some(Instruction::RRCA),
            0x10 => Some(Instruction::STOP),
            0x17 => Some(Instruction::RLA),
            0x18 => Some(Instruction::JR(JumpCondition::Always)),
            0x1F => Some(Instruction::RRA),
            0x27 => Some(Instruction::DAA),
            0x2F => Some(Instruction::CPL),
            0x37 => Some(Instruction::SCF),
            0x3F => Some(Instruction::CCF),
            0x76 => Some(Instruction::HALT),
            0x02 => Some(Instruction::LD(Load::IndirectFromA(Indirect::BC))),
            0x12 => Some(Instruction::LD(Load::IndirectFromA(Indirect::DE))),
            0x0A => Some(Instruction::LD(Load::AFromIndirect(Indirect::BC))),
            0x1A => Some(Instruction::LD(Load::AFromIndirect(Indirect::DE))),
            0x22 => Some(Instruction::LD(Load::HLIFromAInc)),
            0x32 => Some(Instruction::LD(Load::HLIFromADec)),
            0x2A => Some(Instruction::LD(Load::HLIToAInc)),
            0x3A => Some(Instruction::LD(Load::HLIToADec)),
            0xC6 => Some(Instruction::ADD(ByteSource::Immediate)),
            0xCE => Some(Instruction::ADC(ByteSource::Immediate)),
            0xD6 => Some(Instruction::SUB(ByteSource::Immediate)),
            0xDE => Some(Instruction::SBC(ByteSource::Immediate)),
            0xE6 => Some(Instruction::AND(ByteSource::Immediate)),
            0xEE => Some(Instruction::XOR(ByteSource::Immediate)),
            0xF6 => Some(Instruction::OR(ByteSource::Immediate)),
            0xFE => Some(Instruction::CP(ByteSource::Immediate)),
            0xC3 => Some(Instruction::JP(JumpCondition::Always)),
            0xC9 => Some(Instruction::RET(JumpCondition::Always)),
            0xCD => Some(Instruction::CALL(JumpCondition::Always)),
            0xD9 => Some(Instruction::RETI),
            0xE9 => Some(Instruction::JPHL),
            0xE0 => Some(Instruction::LD(Load::FF00a8FromA)),
            0xF0 => Some(Instruction::LD(Load::AFromFF00a8)),
            0xE2 => Some(Instruction::LD(Load::FF00CFromA)),
            0xF2 => Some(Instruction::LD(Load::AFromFF00C)),
            0xEA => Some(Instruction::LD(Load::A16FromA)),
            0xFA => Some(Instruction::LD(Load::AFromA16)),
            0xE8 => Some(Instruction::ADDSP),
            0xF8 => Some(Instruction::LD(Load::HLFromSPi8)),
            0xF9 => Some(Instruction::LD(Load::SPFromHL)),
            0xF3 => Some(Instruction::DI),
            0xFB => Some(Instruction::EI),
            0xCB => unreachable!("CB prefix handled by the caller"),
            // Unused/illegal opcodes on the DMG.
            0xD3 | 0xDB | 0xDD | 0xE3 | 0xE4 | 0xEB | 0xEC | 0xED | 0xF4 | 0xFC | 0xFD => None,
            _ => None,
        };
        if let Some(instr) = literal {
            return Some(instr);
        }

        // Regular bit-field families.
        let upper_r = (opcode >> 3) & 0b111;
        let lower_r = opcode & 0b111;
        let dd = (opcode >> 4) & 0b11;

        if (0x40..=0x7F).contains(&opcode) {
            // 0x76 (HALT) was already matched above.
            return Some(Instruction::LD(Load::Byte(
                byte_target_from_bits(upper_r),
                byte_source_from_bits(lower_r),
            )));
        }
        if (0x80..=0xBF).contains(&opcode) {
            let source = byte_source_from_bits(lower_r);
            return Some(match upper_r {
                0 => Instruction::ADD(source),
                1 => Instruction::ADC(source),
                2 => Instruction::SUB(source),
                3 => Instruction::SBC(source),
                4 => Instruction::AND(source),
                5 => Instruction::XOR(source),
                6 => Instruction::OR(source),
                7 => Instruction::CP(source),
                _ => unreachable!(),
            });
        }
        if opcode & 0xC7 == 0x04 {
            return Some(Instruction::INC(byte_target_from_bits(upper_r)));
        }
        if opcode & 0xC7 == 0x05 {
            return Some(Instruction::DEC(byte_target_from_bits(upper_r)));
        }
        if opcode & 0xC7 == 0x06 {
            return Some(Instruction::LD(Load::Byte(
                byte_target_from_bits(upper_r),
                ByteSource::Immediate,
            )));
        }
        if opcode & 0xC7 == 0xC7 {
            return Some(Instruction::RST(opcode & 0x38));
        }
        if opcode & 0xCF == 0x01 {
            return Some(Instruction::LD(Load::Word(word_register_dd(dd))));
        }
        if opcode & 0xCF == 0x03 {
            return Some(Instruction::INC2(word_register_dd(dd)));
        }
        if opcode & 0xCF == 0x0B {
            return Some(Instruction::DEC2(word_register_dd(dd)));
        }
        if opcode & 0xCF == 0x09 {
            return Some(Instruction::ADDHL(word_register_dd(dd)));
        }
        if opcode & 0xCF == 0xC5 {
            return Some(Instruction::PUSH(word_register_qq(dd)));
        }
        if opcode & 0xCF == 0xC1 {
            return Some(Instruction::POP(word_register_qq(dd)));
        }
        if opcode & 0xE7 == 0x20 {
            return Some(Instruction::JR(jump_condition(dd & 0b11)));
        }
        if opcode & 0xE7 == 0xC2 {
            return Some(Instruction::JP(jump_condition(dd & 0b11)));
        }
        if opcode & 0xE7 == 0xC4 {
            return Some(Instruction::CALL(jump_condition(dd & 0b11)));
        }
        if opcode & 0xE7 == 0xC0 {
            return Some(Instruction::RET(jump_condition(dd & 0b11)));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_nop_and_halt() {
        assert_eq!(Instruction::from_byte(0x00, false), Some(Instruction::NOP));
        assert_eq!(
            Instruction::from_byte(0x76, false),
            Some(Instruction::HALT)
        );
    }

    #[test]
    fn decodes_ld_r_r_family() {
        // LD B, C = 0b01_000_001
        assert_eq!(
            Instruction::from_byte(0b0100_0001, false),
            Some(Instruction::LD(Load::Byte(
                ByteTarget::Register(Register::B),
                ByteSource::Register(Register::C)
            )))
        );
    }

    #[test]
    fn decodes_ld_hl_indirect_forms() {
        // LD (HL), B = 0b01110_000
        assert_eq!(
            Instruction::from_byte(0b0111_0000, false),
            Some(Instruction::LD(Load::Byte(
                ByteTarget::HLIndirect,
                ByteSource::Register(Register::B)
            )))
        );
    }

    #[test]
    fn decodes_arithmetic_family() {
        assert_eq!(
            Instruction::from_byte(0x80, false),
            Some(Instruction::ADD(ByteSource::Register(Register::B)))
        );
        assert_eq!(
            Instruction::from_byte(0xBF, false),
            Some(Instruction::CP(ByteSource::Register(Register::A)))
        );
    }

    #[test]
    fn decodes_push_pop_qq() {
        assert_eq!(
            Instruction::from_byte(0xF5, false),
            Some(Instruction::PUSH(WordRegister::AF))
        );
        assert_eq!(
            Instruction::from_byte(0xF1, false),
            Some(Instruction::POP(WordRegister::AF))
        );
    }

    #[test]
    fn decodes_conditional_control_transfer() {
        assert_eq!(
            Instruction::from_byte(0xC2, false),
            Some(Instruction::JP(JumpCondition::NotZero))
        );
        assert_eq!(
            Instruction::from_byte(0xCC, false),
            Some(Instruction::CALL(JumpCondition::Zero))
        );
        assert_eq!(
            Instruction::from_byte(0xD0, false),
            Some(Instruction::RET(JumpCondition::NotCarry))
        );
    }

    #[test]
    fn decodes_rst_vectors() {
        assert_eq!(Instruction::from_byte(0xC7, false), Some(Instruction::RST(0x00)));
        assert_eq!(Instruction::from_byte(0xFF, false), Some(Instruction::RST(0x38)));
    }

    #[test]
    fn rejects_unused_opcodes() {
        assert_eq!(Instruction::from_byte(0xD3, false), None);
        assert_eq!(Instruction::from_byte(0xFD, false), None);
    }

    #[test]
    fn decodes_cb_page() {
        // BIT 3, B = group 01, mid=3, low=000
        let opcode = 0b01_011_000;
        assert_eq!(
            Instruction::from_byte(opcode, true),
            Some(Instruction::BIT(3, ByteTarget::Register(Register::B)))
        );
        // SWAP (HL) = group 00, mid=6, low=110
        let opcode = 0b00_110_110;
        assert_eq!(
            Instruction::from_byte(opcode, true),
            Some(Instruction::SWAP(ByteTarget::HLIndirect))
        );
    }
}
