//! The flat 64 KiB memory gateway: read/write dispatch, echo aliasing,
//! writability enforcement, and the memory-mapped I/O side effects.

use crate::constants::*;
use crate::serial;
use crate::GameBoy;

impl GameBoy {
    /// Reads a byte, honouring echo-RAM aliasing and the joypad port.
    pub fn read(&self, address: u16) -> u8 {
        let address = remap_echo(address);
        match address {
            JOYPAD_PORT => self.read_joypad_port(),
            UNUSED_BEGIN..=UNUSED_END => UNUSED_READ,
            _ => self.mem[address as usize],
        }
    }

    /// Reads a little-endian 16-bit value at `addr`/`addr+1`.
    pub fn read16(&self, addr: u16) -> u16 {
        u16::from(self.read(addr)) | (u16::from(self.read(addr.wrapping_add(1))) << 8)
    }

    /// Writes a byte, applying the side effects documented for the
    /// memory-mapped I/O registers; everything else is bound by the
    /// writable-band rule.
    pub fn write(&mut self, address: u16, value: u8) {
        let address = remap_echo(address);
        match address {
            TIMER_DIVIDER => self.mem[address as usize] = 0,
            SERIAL_DATA => serial::emit_byte(value),
            JOYPAD_PORT => self.write_joypad_port(value),
            INTERRUPT_FLAG | INTERRUPT_ENABLE => {
                self.mem[address as usize] = value;
                self.need_to_do_interrupts = true;
            }
            PPU_DMA => self.dma_transfer(value),
            _ if is_writable(address) => self.mem[address as usize] = value,
            ROM_BEGIN..=ROM_END => {
                log::warn!("attempted bank switch at {:#06x}, not implemented", address);
            }
            _ => {
                log::warn!(
                    "attempted illegal write of {:#04x} to {:#06x}",
                    value,
                    address
                );
            }
        }
    }

    /// Writes a little-endian 16-bit value at `addr`/`addr+1`.
    pub fn write16(&mut self, addr: u16, value: u16) {
        self.write(addr, value as u8);
        self.write(addr.wrapping_add(1), (value >> 8) as u8);
    }

    /// Writes directly into the backing array, bypassing the gateway's side
    /// effects. Used only for initial register setup and by internal
    /// controllers (PPU/timer/interrupt) that need to update a register
    /// without re-triggering its own write trap.
    pub(crate) fn write_raw(&mut self, address: u16, value: u8) {
        self.mem[address as usize] = value;
    }

    /// Initiates an OAM DMA transfer: copies 0xA0 bytes starting at
    /// `value << 8` into OAM, and charges 160 machine cycles.
    fn dma_transfer(&mut self, value: u8) {
        let source = u16::from(value) << 8;
        for offset in 0..OAM_SIZE as u16 {
            let byte = self.read(source.wrapping_add(offset));
            self.mem[(OAM_BEGIN + offset) as usize] = byte;
        }
        self.cycles_to_wait += DMA_CYCLE_COST;
    }
}

/// Remaps addresses in the echo band down into working RAM.
#[inline]
fn remap_echo(address: u16) -> u16 {
    match address {
        ECHO_BEGIN..=ECHO_END => address - ECHO_OFFSET,
        _ => address,
    }
}

/// The two writable bands: VRAM..ECHO_BEGIN (exclusive) and OAM..=INTERRUPT_ENABLE.
#[inline]
fn is_writable(address: u16) -> bool {
    (WRITABLE_LOW_BEGIN..WRITABLE_LOW_END).contains(&address)
        || (WRITABLE_HIGH_BEGIN..=WRITABLE_HIGH_END).contains(&address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Button;

    fn fresh() -> GameBoy {
        GameBoy::new()
    }

    #[test]
    fn echo_ram_mirrors_work_ram() {
        let mut gb = fresh();
        gb.write(WRAM_BEGIN, 0x42);
        assert_eq!(gb.read(WRAM_BEGIN + ECHO_OFFSET), 0x42);
        gb.write(ECHO_BEGIN + 5, 0x99);
        assert_eq!(gb.read(WRAM_BEGIN + 5), 0x99);
    }

    #[test]
    fn div_resets_to_zero_on_any_write() {
        let mut gb = fresh();
        gb.write(TIMER_DIVIDER, 0xAB);
        assert_eq!(gb.read(TIMER_DIVIDER), 0);
    }

    #[test]
    fn dma_copies_160_bytes_and_charges_cycles() {
        let mut gb = fresh();
        for i in 0..OAM_SIZE {
            gb.write_raw(0x8000 + i as u16, i as u8);
        }
        let before = gb.cycles_to_wait;
        gb.write(PPU_DMA, 0x80);
        for i in 0..OAM_SIZE {
            assert_eq!(gb.read(OAM_BEGIN + i as u16), i as u8);
        }
        assert_eq!(gb.cycles_to_wait - before, DMA_CYCLE_COST);
    }

    #[test]
    fn rom_band_write_is_a_diagnostic_not_a_mutation() {
        let mut gb = fresh();
        let before = gb.read(0x0100);
        gb.write(0x0100, 0xFF);
        assert_eq!(gb.read(0x0100), before);
    }

    #[test]
    fn joypad_port_reflects_live_button_state() {
        let mut gb = fresh();
        gb.write(JOYPAD_PORT, 0b0010_0000); // select directions
        gb.press_button(Button::Up);
        assert_eq!(gb.read(JOYPAD_PORT) & 0b0000_0100, 0);
    }
}
