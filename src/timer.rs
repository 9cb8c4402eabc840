//! DIV/TIMA timer, ticked once per machine cycle drained off the CPU.

use crate::constants::*;
use crate::GameBoy;

/// Bit 2 of TAC; when clear the timer does not run at all.
const TAC_ENABLE: u8 = 0b100;

fn tima_period(tac: u8) -> u32 {
    match tac & 0b11 {
        0 => 256,
        1 => 4,
        2 => 16,
        3 => 64,
        _ => unreachable!(),
    }
}

impl GameBoy {
    /// Advances the timer by one machine cycle: DIV increments every 64
    /// cycles unconditionally; TIMA increments at the rate TAC selects, only
    /// while the timer is enabled, reloading from TMA and raising the timer
    /// interrupt on overflow.
    pub(crate) fn tick_timer(&mut self) {
        self.cycle_count += 1;

        if self.cycle_count % u64::from(CLOCKS_PER_DIVIDER_INCREMENT) == 0 {
            let div = self.read(TIMER_DIVIDER);
            self.write_raw(TIMER_DIVIDER, div.wrapping_add(1));
        }

        let tac = self.read(TIMER_CTRL);
        if tac & TAC_ENABLE == 0 {
            return;
        }

        let period = u64::from(tima_period(tac));
        if self.cycle_count % period != 0 {
            return;
        }

        let tima = self.read(TIMER_COUNTER);
        let (next, overflowed) = tima.overflowing_add(1);
        if overflowed {
            let tma = self.read(TIMER_MODULO);
            self.write_raw(TIMER_COUNTER, tma);
            self.request_interrupt(2);
        } else {
            self.write_raw(TIMER_COUNTER, next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn div_increments_every_64_cycles() {
        let mut gb = GameBoy::new();
        for _ in 0..63 {
            gb.tick_timer();
        }
        assert_eq!(gb.read(TIMER_DIVIDER), 0);
        gb.tick_timer();
        assert_eq!(gb.read(TIMER_DIVIDER), 1);
    }

    #[test]
    fn tima_overflow_reloads_from_tma_and_raises_irq() {
        let mut gb = GameBoy::new();
        gb.write(TIMER_CTRL, 0b101); // enabled, period 4
        gb.write(TIMER_MODULO, 0x42);
        gb.write(TIMER_COUNTER, 0xFF);
        for _ in 0..4 {
            gb.tick_timer();
        }
        assert_eq!(gb.read(TIMER_COUNTER), 0x42);
        assert_eq!(gb.read(INTERRUPT_FLAG) & 0b100, 0b100);
    }

    #[test]
    fn disabled_timer_never_advances_tima() {
        let mut gb = GameBoy::new();
        gb.write(TIMER_CTRL, 0b001); // period 4, disabled
        for _ in 0..100 {
            gb.tick_timer();
        }
        assert_eq!(gb.read(TIMER_COUNTER), 0);
    }
}
