//! Firmware version reported in version status packets.

use core::fmt;

/// Semantic version plus a 32-bit build hash.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    pub hash: u32,
}

impl FirmwareVersion {
    #[must_use]
    pub const fn new(major: u8, minor: u8, patch: u8, hash: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            hash,
        }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "v{}.{}.{} ({:08x})",
            self.major, self.minor, self.patch, self.hash
        )
    }
}

/// Version of this build. The hash comes from `METER_BUILD_HASH` (hex) when set.
pub const FIRMWARE_VERSION: FirmwareVersion = FirmwareVersion::new(
    parse_decimal(env!("CARGO_PKG_VERSION_MAJOR")),
    parse_decimal(env!("CARGO_PKG_VERSION_MINOR")),
    parse_decimal(env!("CARGO_PKG_VERSION_PATCH")),
    match option_env!("METER_BUILD_HASH") {
        Some(hash) => parse_hex(hash),
        None => 0,
    },
);

/// Parses a decimal version component, saturating at `u8::MAX`.
const fn parse_decimal(text: &str) -> u8 {
    let bytes = text.as_bytes();
    let mut value: u32 = 0;
    let mut index = 0;
    while index < bytes.len() {
        let byte = bytes[index];
        if byte.is_ascii_digit() {
            value = value * 10 + (byte - b'0') as u32;
            if value > u8::MAX as u32 {
                return u8::MAX;
            }
        }
        index += 1;
    }
    value as u8
}

/// Parses up to eight hex digits; other characters are skipped.
const fn parse_hex(text: &str) -> u32 {
    let bytes = text.as_bytes();
    let mut value: u32 = 0;
    let mut digits = 0;
    let mut index = 0;
    while index < bytes.len() && digits < 8 {
        let nibble = match bytes[index] {
            b @ b'0'..=b'9' => Some(b - b'0'),
            b @ b'a'..=b'f' => Some(b - b'a' + 10),
            b @ b'A'..=b'F' => Some(b - b'A' + 10),
            _ => None,
        };
        if let Some(nibble) = nibble {
            value = (value << 4) | nibble as u32;
            digits += 1;
        }
        index += 1;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_components() {
        assert_eq!(parse_decimal("12"), 12);
        assert_eq!(parse_decimal("999"), u8::MAX);
        assert_eq!(parse_hex("1a2B3c4d"), 0x1A2B_3C4D);
        assert_eq!(parse_hex("deadbeefcafe"), 0xDEAD_BEEF);
    }

    #[test]
    fn display_matches_boot_banner_format() {
        let version = FirmwareVersion::new(1, 4, 2, 0x00ab_cdef);
        let mut text: heapless::String<32> = heapless::String::new();
        core::fmt::write(&mut text, format_args!("{version}")).unwrap();
        assert_eq!(text.as_str(), "v1.4.2 (00abcdef)");
    }

    #[test]
    fn build_version_tracks_package() {
        assert_eq!(
            FIRMWARE_VERSION.major,
            parse_decimal(env!("CARGO_PKG_VERSION_MAJOR"))
        );
    }
}
