// Hex dump for postmortem traces of what went over the window
use log::debug;
use std::fmt::Write;

const BYTES_PER_LINE: usize = 16;

// dumps past this are noise in the log, report the length instead
pub const MAX_DUMP_LEN: usize = 400;

/// Classic offset / hex / ascii dump, 16 bytes per line:
/// `  0000  01 65 00 00  .e..`
pub fn hex_dump(desc: Option<&str>, data: &[u8]) -> String {
    let mut out = String::new();
    if let Some(desc) = desc {
        let _ = writeln!(out, "{}:", desc);
    }

    if data.is_empty() {
        out.push_str("  ZERO LENGTH\n");
        return out;
    }
    if data.len() > MAX_DUMP_LEN {
        let _ = writeln!(out, "  VERY LONG: {}", data.len());
        return out;
    }

    for (line, chunk) in data.chunks(BYTES_PER_LINE).enumerate() {
        let _ = write!(out, "  {:04x} ", line * BYTES_PER_LINE);
        for byte in chunk {
            let _ = write!(out, " {:02x}", byte);
        }
        // pad a short last line so the ascii column lines up
        for _ in chunk.len()..BYTES_PER_LINE {
            out.push_str("   ");
        }
        out.push_str("  ");
        for byte in chunk {
            if *byte < 0x20 || *byte > 0x7e {
                out.push('.');
            } else {
                out.push(*byte as char);
            }
        }
        out.push('\n');
    }
    return out;
}

pub fn log_dump(desc: &str, data: &[u8]) {
    debug!("{}", hex_dump(Some(desc), data));
}
