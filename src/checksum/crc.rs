//! Bitwise CRC implementations. One conventional variant per width:
//!  - CRC-8/SMBUS: poly 0x07, init 0x00, no reflection, no final xor
//!  - CRC-16/CCITT-FALSE: poly 0x1021, init 0xFFFF, no reflection, no final xor
//!  - CRC-32/ISO-HDLC: poly 0x04C11DB7 (reflected 0xEDB88320), init and final xor 0xFFFFFFFF

const CRC8_POLY: u8 = 0x07;
const CRC16_POLY: u16 = 0x1021;
const CRC32_POLY_REFLECTED: u32 = 0xEDB8_8320;

pub fn crc8_smbus(bytes: &[u8]) -> u8 {
    let mut crc: u8 = 0x00;
    for &b in bytes {
        crc ^= b;
        for _ in 0..8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ CRC8_POLY;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

pub fn crc16_ccitt_false(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &b in bytes {
        crc ^= (b as u16) << 8;
        for _ in 0..8 {
            if (crc & 0x8000) != 0 {
                crc = (crc << 1) ^ CRC16_POLY;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

pub fn crc32_iso_hdlc(bytes: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &b in bytes {
        crc ^= b as u32;
        for _ in 0..8 {
            if (crc & 1) != 0 {
                crc = (crc >> 1) ^ CRC32_POLY_REFLECTED;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}
