/// Value reported for a checksum that must not be trusted (empty input).
pub const UNTRUSTED_CHECKSUM: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checksum {
    pub value: u32,
    pub safe: bool,
}

impl Checksum {
    pub fn trusted(self) -> Option<u32> {
        self.safe.then_some(self.value)
    }
}

/// Reflected CRC32 (polynomial 0xEDB88320, seeded and finalized with
/// 0xFFFFFFFF). An empty buffer yields the untrusted sentinel.
pub fn crc32(data: &[u8]) -> Checksum {
    if data.is_empty() {
        return Checksum {
            value: UNTRUSTED_CHECKSUM,
            safe: false,
        };
    }

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    Checksum {
        value: hasher.finalize(),
        safe: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bit_serial_crc32(data: &[u8]) -> u32 {
        let mut acc = 0xFFFF_FFFF_u32;
        for &byte in data {
            acc ^= u32::from(byte);
            for _ in 0..8 {
                if acc & 1 == 1 {
                    acc = (acc >> 1) ^ 0xEDB8_8320;
                } else {
                    acc >>= 1;
                }
            }
        }
        acc ^ 0xFFFF_FFFF
    }

    #[test]
    fn empty_input_is_untrusted() {
        let checksum = crc32(b"");
        assert_eq!(checksum.value, 0xFFFF_FFFF);
        assert!(!checksum.safe);
        assert_eq!(checksum.trusted(), None);
    }

    #[test]
    fn matches_reference_check_value() {
        assert_eq!(crc32(b"123456789").trusted(), Some(0xCBF4_3926));
    }

    #[test]
    fn single_byte_is_stable() {
        let first = crc32(b"A");
        let second = crc32(b"A");
        assert_eq!(first, second);
        assert!(first.safe);
        assert_eq!(first.value, 0xD3D9_9E8B);
    }

    #[test]
    fn agrees_with_bit_serial_definition() {
        let inputs: [&[u8]; 4] = [b"A", b"Hello", &[0_u8; 17], &[0xFF, 0x00, 0x7E, 0x81]];
        for input in inputs {
            assert_eq!(crc32(input).value, bit_serial_crc32(input));
        }
    }

    #[test]
    fn distinct_inputs_of_same_length_differ() {
        let a = crc32(b"tmp1").value;
        let b = crc32(b"tmp2").value;
        let c = crc32(b"1pmt").value;
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }
}
