//! 32-bit FNV-1 fingerprints rendered as lowercase hex.
//!
//! Collectors compare the hash they receive against their own FNV-1/32 of the
//! content, so this must stay FNV-1 (multiply, then xor). FNV-1a produces
//! different digests and would break every "not modified" comparison.

const FNV32_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

/// Raw FNV-1/32 digest of `data`.
pub fn fnv1_32(data: &[u8]) -> u32 {
    data.iter().fold(FNV32_OFFSET_BASIS, |hash, byte| {
        hash.wrapping_mul(FNV32_PRIME) ^ u32::from(*byte)
    })
}

/// Fingerprint of `data`: the FNV-1/32 digest as 8 lowercase hex digits.
pub fn fingerprint(data: impl AsRef<[u8]>) -> String {
    format!("{:08x}", fnv1_32(data.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_input_is_offset_basis() {
        assert_eq!(fingerprint(""), "811c9dc5");
    }

    #[test]
    fn test_known_vectors() {
        assert_eq!(fingerprint("a"), "050c5d7e");
        assert_eq!(fingerprint("abc"), "439c2f4b");
        assert_eq!(fingerprint("file://test"), "de524af9");
    }

    #[test]
    fn test_leading_zeros_are_kept() {
        // 0x050c5d7e must not render as "50c5d7e".
        let fp = fingerprint(b"a");
        assert_eq!(fp.len(), 8);
        assert!(fp.starts_with('0'));
    }

    #[test]
    fn test_not_fnv1a() {
        // FNV-1a("a") is e40c292c.
        assert_ne!(fingerprint("a"), "e40c292c");
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(fingerprint("foo bar"), fingerprint(String::from("foo bar")));
        assert_eq!(fingerprint("foo bar"), "6226d70c");
    }
}
