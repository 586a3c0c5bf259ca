//! RunLengthDecode (ISO 32000-1 Section 7.4.5)

use tracing::warn;

/// Decode run-length data. A stream cut short keeps what was decoded.
pub fn decode_run_length(data: &[u8]) -> Vec<u8> {
    let mut decoded = Vec::with_capacity(data.len() * 2);
    if decode_runs(data, &mut decoded).is_none() {
        warn!("run-length stream ended prematurely");
    }
    decoded
}

fn decode_runs(data: &[u8], decoded: &mut Vec<u8>) -> Option<()> {
    let mut pos = 0;
    loop {
        let length = *data.get(pos)?;
        pos += 1;
        match length {
            128 => return Some(()),
            0..=127 => {
                let literal = data.get(pos..pos + length as usize + 1)?;
                decoded.extend_from_slice(literal);
                pos += literal.len();
            }
            _ => {
                let byte = *data.get(pos)?;
                pos += 1;
                decoded.extend(std::iter::repeat(byte).take(257 - length as usize));
            }
        }
    }
}
