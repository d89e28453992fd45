use crc::{Crc, Digest, CRC_16_MODBUS};

static CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// CRC-16/MODBUS over a single frame.
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Running CRC over every byte contributing to the current frame.
pub(crate) struct Accumulator {
    digest: Digest<'static, u16>,
    len: usize,
}

impl Accumulator {
    pub fn new() -> Self {
        Self {
            digest: CRC16.digest(),
            len: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
        self.len += bytes.len();
    }

    /// Number of bytes accumulated since the last reset.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns the checksum of the accumulated bytes and starts over.
    pub fn finalize(&mut self) -> u16 {
        core::mem::replace(self, Self::new()).digest.finalize()
    }
}

impl core::fmt::Debug for Accumulator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Accumulator").field("len", &self.len).finish()
    }
}
