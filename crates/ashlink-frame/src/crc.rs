//! CRC-CCITT (polynomial 0x1021, initial value 0xFFFF, no final XOR).

/// Initial CRC register value.
pub const CRC_INIT: u16 = 0xFFFF;

const POLY: u16 = 0x1021;

/// Feed one byte into the CRC register.
pub fn crc_ccitt_update(crc: u16, byte: u8) -> u16 {
    let mut crc = crc ^ (u16::from(byte) << 8);
    for _ in 0..8 {
        crc = if crc & 0x8000 != 0 {
            (crc << 1) ^ POLY
        } else {
            crc << 1
        };
    }
    crc
}

/// CRC of a whole buffer.
pub fn crc_ccitt(data: &[u8]) -> u16 {
    data.iter().fold(CRC_INIT, |crc, &byte| crc_ccitt_update(crc, byte))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_value() {
        assert_eq!(crc_ccitt(b"123456789"), 0x29B1);
    }

    #[test]
    fn empty_input_is_initial_value() {
        assert_eq!(crc_ccitt(&[]), CRC_INIT);
    }

    #[test]
    fn appending_crc_leaves_zero_residue() {
        let mut frame = vec![0xC0];
        let crc = crc_ccitt(&frame);
        frame.extend_from_slice(&crc.to_be_bytes());
        assert_eq!(crc_ccitt(&frame), 0);
    }
}
