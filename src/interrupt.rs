//! Interrupt controller: priority-ordered dispatch against IF (0xFF0F) and
//! IE (0xFFFF), both of which live directly in the flat memory array.

use crate::constants::*;
use crate::GameBoy;

/// One interrupt source, ordered highest to lowest priority.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Source {
    VBlank,
    LcdStat,
    Timer,
    Serial,
    Joypad,
}

impl Source {
    const ALL: [Source; 5] = [
        Source::VBlank,
        Source::LcdStat,
        Source::Timer,
        Source::Serial,
        Source::Joypad,
    ];

    fn bit(self) -> u8 {
        match self {
            Source::VBlank => 0,
            Source::LcdStat => 1,
            Source::Timer => 2,
            Source::Serial => 3,
            Source::Joypad => 4,
        }
    }

    fn vector(self) -> u16 {
        match self {
            Source::VBlank => VBLANK_IRQ_ADDRESS,
            Source::LcdStat => LCD_IRQ_ADDRESS,
            Source::Timer => TIMER_IRQ_ADDRESS,
            Source::Serial => SERIAL_IRQ_ADDRESS,
            Source::Joypad => JOYPAD_IRQ_ADDRESS,
        }
    }
}

impl GameBoy {
    /// Raises `interrupt_flag`'s bit for a PPU/timer/serial source. Joypad
    /// presses set their bit directly in `press_button`.
    pub(crate) fn request_interrupt(&mut self, bit: u8) {
        let flags = self.read(INTERRUPT_FLAG);
        self.write(INTERRUPT_FLAG, flags | (1 << bit));
    }

    /// Services at most one pending interrupt per call, in priority order.
    /// HALT is released whenever any enabled source is pending, independent
    /// of IME; dispatch itself (push PC, vector, 5-cycle charge) only
    /// happens when IME is set.
    pub(crate) fn handle_interrupts(&mut self) {
        let pending = self.read(INTERRUPT_FLAG) & self.read(INTERRUPT_ENABLE);
        self.need_to_do_interrupts = false;

        if pending == 0 {
            return;
        }

        self.is_halted = false;

        if !self.ime {
            return;
        }

        for source in Source::ALL {
            if pending & (1 << source.bit()) == 0 {
                continue;
            }

            self.ime = false;
            let if_now = self.read(INTERRUPT_FLAG);
            self.write(INTERRUPT_FLAG, if_now & !(1 << source.bit()));

            self.sp = self.sp.wrapping_sub(2);
            self.write16(self.sp, self.pc);
            self.pc = source.vector();

            self.cycles_to_wait += 5;
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn services_only_the_highest_priority_source() {
        let mut gb = GameBoy::new();
        gb.ime = true;
        gb.pc = 0x1234;
        gb.sp = 0xFFFE;
        gb.write(INTERRUPT_ENABLE, 0xFF);
        gb.write(INTERRUPT_FLAG, 0b0000_0011); // VBlank + LcdStat both pending

        gb.handle_interrupts();

        assert_eq!(gb.pc, VBLANK_IRQ_ADDRESS);
        assert_eq!(gb.read(INTERRUPT_FLAG) & 0b1, 0);
        assert_eq!(gb.read(INTERRUPT_FLAG) & 0b10, 0b10, "LcdStat must remain pending");
        assert!(!gb.ime);
    }

    #[test]
    fn halt_clears_even_when_ime_is_disabled() {
        let mut gb = GameBoy::new();
        gb.ime = false;
        gb.is_halted = true;
        gb.write(INTERRUPT_ENABLE, 0xFF);
        gb.write(INTERRUPT_FLAG, 0b1);

        gb.handle_interrupts();

        assert!(!gb.is_halted);
        assert_eq!(gb.pc, 0, "dispatch must not happen while IME is false");
    }

    #[test]
    fn no_pending_source_is_a_no_op() {
        let mut gb = GameBoy::new();
        gb.ime = true;
        gb.write(INTERRUPT_ENABLE, 0xFF);
        gb.write(INTERRUPT_FLAG, 0);

        gb.handle_interrupts();
        assert_eq!(gb.pc, 0);
    }
}
