//! Helpers for computing cyclic redundancy checks.

/// Accumulate a slice of bytes into a cyclic redundancy check value.
pub fn compute_crc(init: u16, r: &[u8]) -> u16 {
    r.iter().fold(init, |acc, b| crc_byte(acc, *b))
}

/// Accumulate a single byte into a cyclic redundancy check value.
fn crc_byte(mut crc: u16, b: u8) -> u16 {
    const CRC_TABLE: [u16; 16] = [
        0x0000, 0xCC01, 0xD801, 0x1400, 0xF001, 0x3C00, 0x2800, 0xE401, 0xA001, 0x6C00, 0x7800,
        0xB401, 0x5000, 0x9C01, 0x8801, 0x4400,
    ];

    // Low nibble, then high nibble.
    for nibble in [b & 0xF, b >> 4] {
        let tmp = CRC_TABLE[(crc & 0xF) as usize];
        crc = (crc >> 4) & 0x0FFF;
        crc = crc ^ tmp ^ CRC_TABLE[nibble as usize];
    }

    crc
}

/// Running checksum over a document.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Checksum(u16);

impl Checksum {
    /// A checksum over no bytes.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Accumulate bytes into the checksum.
    pub fn update(&mut self, r: &[u8]) {
        self.0 = compute_crc(self.0, r);
    }

    /// The checksum over every byte accumulated so far.
    pub fn value(&self) -> u16 {
        self.0
    }

    /// The checksum as it is stored in a document trailer.
    pub fn finalize(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }
}
