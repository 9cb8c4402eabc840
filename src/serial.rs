//! Serial diagnostic sink. The link transport itself (SC clock source,
//! shift timing) is out of scope; SB is simply echoed to the logging facade
//! so Blargg-style test ROMs can self-report over the emulator's stdout/log.

/// Emits a byte written to SB (0xFF01) to the diagnostic channel.
pub fn emit_byte(byte: u8) {
    let ch = byte as char;
    if ch.is_ascii() {
        log::info!(target: "serial", "{}", ch);
    } else {
        log::info!(target: "serial", "<{:#04x}>", byte);
    }
}
