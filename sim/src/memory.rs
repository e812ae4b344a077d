//! Byte-addressable little-endian data memory with fixed access latency.

use crate::error::SimError;

#[derive(Debug, Clone)]
pub struct DataMemory {
    bytes: Vec<u8>,
    latency: u32,
}

impl DataMemory {
    pub fn new(size: u32, latency: u32) -> Self {
        DataMemory {
            bytes: vec![0xFF; size as usize],
            latency,
        }
    }

    pub fn reset(&mut self) {
        self.bytes.iter_mut().for_each(|b| *b = 0xFF);
    }

    pub fn size(&self) -> u32 {
        self.bytes.len() as u32
    }

    pub fn latency(&self) -> u32 {
        self.latency
    }

    fn check_access(&self, address: u32) -> Result<(), SimError> {
        if address % 4 != 0 {
            return Err(SimError::MisalignedAccess { address });
        }
        if address.saturating_add(4) > self.size() {
            return Err(SimError::OutOfBoundsMemory {
                address,
                mem_size: self.size(),
            });
        }
        Ok(())
    }

    pub fn read_word(&self, address: u32) -> Result<u32, SimError> {
        self.check_access(address)?;
        let idx = address as usize;
        let bytes = [
            self.bytes[idx],
            self.bytes[idx + 1],
            self.bytes[idx + 2],
            self.bytes[idx + 3],
        ];
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn write_word(&mut self, address: u32, value: u32) -> Result<(), SimError> {
        self.check_access(address)?;
        let idx = address as usize;
        let bytes = value.to_le_bytes();
        self.bytes[idx..idx + 4].copy_from_slice(&bytes);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resets_to_0xff() {
        let mut mem = DataMemory::new(16, 0);
        mem.write_word(0, 0x1234_5678).unwrap();
        mem.reset();
        assert_eq!(mem.as_slice(), &[0xFF; 16]);
    }

    #[test]
    fn round_trips_little_endian() {
        let mut mem = DataMemory::new(16, 1);
        mem.write_word(4, 0xDEAD_BEEF).unwrap();
        assert_eq!(mem.read_word(4).unwrap(), 0xDEAD_BEEF);
        assert_eq!(&mem.as_slice()[4..8], &[0xEF, 0xBE, 0xAD, 0xDE]);
    }

    #[test]
    fn rejects_misaligned() {
        let mem = DataMemory::new(16, 0);
        assert_eq!(
            mem.read_word(2),
            Err(SimError::MisalignedAccess { address: 2 })
        );
    }

    #[test]
    fn rejects_out_of_bounds() {
        let mem = DataMemory::new(16, 0);
        assert_eq!(
            mem.read_word(16),
            Err(SimError::OutOfBoundsMemory {
                address: 16,
                mem_size: 16
            })
        );
    }
}
