//! Radio modem link.
//!
//! The modem on the serial port owns packet framing, encryption, and the
//! RF wake-up timer. Each request is a small frame:
//!
//! ```text
//! 0xA5 | kind | len | payload[len] | checksum
//! ```
//!
//! where `checksum` makes the byte sum of `kind..=checksum` zero. Multi-byte
//! fields are little-endian.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use heapless::Vec;
use meter_core::transport::{SensorStatus, Transport, VersionStatus};
use meter_core::wakeup::WakeIntervalCode;

/// Frame start marker.
pub const FRAME_SYNC: u8 = 0xA5;
/// Largest payload the modem accepts.
pub const MAX_PAYLOAD: usize = 16;
/// Sync, kind, length, and checksum bytes.
const FRAME_OVERHEAD: usize = 4;

/// Encoded frame ready for the UART.
pub type RadioFrame = Vec<u8, { MAX_PAYLOAD + FRAME_OVERHEAD }>;

/// Request discriminants understood by the modem firmware.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum FrameKind {
    SensorStatus = 0x01,
    VersionStatus = 0x02,
    WakeTimer = 0x10,
}

/// Byte sink the frames are written to.
pub trait FrameSink {
    type Error;

    fn write_frame(&mut self, frame: &[u8]) -> Result<(), Self::Error>;
}

/// Errors surfaced by [`Radio`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RadioError<E> {
    /// Payload did not fit the frame buffer.
    Oversized,
    /// Serial write failed.
    Other(E),
}

/// [`Transport`] implementation speaking the modem protocol.
pub struct Radio<K> {
    sink: K,
    frames_sent: u32,
}

impl<K: FrameSink> Radio<K> {
    pub const fn new(sink: K) -> Self {
        Self {
            sink,
            frames_sent: 0,
        }
    }

    /// Frames accepted by the sink since boot.
    pub fn frames_sent(&self) -> u32 {
        self.frames_sent
    }

    fn send(&mut self, kind: FrameKind, payload: &[u8]) -> Result<(), RadioError<K::Error>> {
        let frame = encode_frame(kind, payload).ok_or(RadioError::Oversized)?;
        self.sink.write_frame(&frame).map_err(RadioError::Other)?;
        self.frames_sent = self.frames_sent.wrapping_add(1);
        Ok(())
    }
}

impl<K: FrameSink> Transport for Radio<K> {
    type Error = RadioError<K::Error>;

    fn send_sensor_status(&mut self, status: &SensorStatus) -> Result<(), Self::Error> {
        let mut payload = [0u8; 10];
        payload[0..2].copy_from_slice(&status.device_id.to_le_bytes());
        payload[2..6].copy_from_slice(&status.sequence.to_le_bytes());
        payload[6..8].copy_from_slice(&status.normalized.to_le_bytes());
        payload[8..10].copy_from_slice(&status.temperature_centi.to_le_bytes());
        self.send(FrameKind::SensorStatus, &payload)
    }

    fn send_version_status(&mut self, status: &VersionStatus) -> Result<(), Self::Error> {
        let mut payload = [0u8; 13];
        payload[0..2].copy_from_slice(&status.device_id.to_le_bytes());
        payload[2..6].copy_from_slice(&status.sequence.to_le_bytes());
        payload[6] = status.version.major;
        payload[7] = status.version.minor;
        payload[8] = status.version.patch;
        payload[9..13].copy_from_slice(&status.version.hash.to_le_bytes());
        self.send(FrameKind::VersionStatus, &payload)
    }

    fn configure_wake_timer(&mut self, code: WakeIntervalCode) -> Result<(), Self::Error> {
        self.send(FrameKind::WakeTimer, &code.raw().to_le_bytes())
    }
}

/// Builds a complete frame, or `None` when the payload is too long.
pub fn encode_frame(kind: FrameKind, payload: &[u8]) -> Option<RadioFrame> {
    let len = u8::try_from(payload.len())
        .ok()
        .filter(|len| usize::from(*len) <= MAX_PAYLOAD)?;

    let mut frame = RadioFrame::new();
    frame.push(FRAME_SYNC).ok()?;
    frame.push(kind as u8).ok()?;
    frame.push(len).ok()?;
    frame.extend_from_slice(payload).ok()?;

    let sum = frame[1..]
        .iter()
        .fold(0u8, |acc, byte| acc.wrapping_add(*byte));
    frame.push(sum.wrapping_neg()).ok()?;
    Some(frame)
}

#[cfg(target_os = "none")]
mod uart {
    use embassy_stm32::mode::Blocking;
    use embassy_stm32::usart::{Error, Uart};

    use super::FrameSink;

    /// Blocking USART connected to the modem.
    pub struct UartSink<'d> {
        uart: Uart<'d, Blocking>,
    }

    impl<'d> UartSink<'d> {
        pub fn new(uart: Uart<'d, Blocking>) -> Self {
            Self { uart }
        }
    }

    impl FrameSink for UartSink<'_> {
        type Error = Error;

        fn write_frame(&mut self, frame: &[u8]) -> Result<(), Self::Error> {
            self.uart.blocking_write(frame)?;
            self.uart.blocking_flush()
        }
    }
}

#[cfg(target_os = "none")]
pub use uart::UartSink;

#[cfg(test)]
mod tests {
    use super::*;
    use meter_core::version::FirmwareVersion;

    #[derive(Default)]
    struct CaptureSink {
        frames: std::vec::Vec<std::vec::Vec<u8>>,
        fail: bool,
    }

    impl FrameSink for CaptureSink {
        type Error = &'static str;

        fn write_frame(&mut self, frame: &[u8]) -> Result<(), Self::Error> {
            if self.fail {
                return Err("uart");
            }
            self.frames.push(frame.to_vec());
            Ok(())
        }
    }

    fn checksum_ok(frame: &[u8]) -> bool {
        frame[1..]
            .iter()
            .fold(0u8, |acc, byte| acc.wrapping_add(*byte))
            == 0
    }

    #[test]
    fn sensor_frame_layout() {
        let mut radio = Radio::new(CaptureSink::default());
        radio
            .send_sensor_status(&SensorStatus {
                device_id: 0x0102,
                sequence: 0x0A0B_0C0D,
                normalized: 600,
                temperature_centi: -150,
            })
            .unwrap();

        let frame = &radio.sink.frames[0];
        assert_eq!(&frame[..3], &[FRAME_SYNC, 0x01, 10]);
        assert_eq!(&frame[3..5], &[0x02, 0x01]);
        assert_eq!(&frame[5..9], &[0x0D, 0x0C, 0x0B, 0x0A]);
        assert_eq!(&frame[9..11], &600u16.to_le_bytes());
        assert_eq!(&frame[11..13], &(-150i16).to_le_bytes());
        assert!(checksum_ok(frame));
        assert_eq!(radio.frames_sent(), 1);
    }

    #[test]
    fn version_and_wake_frames() {
        let mut radio = Radio::new(CaptureSink::default());
        radio
            .send_version_status(&VersionStatus {
                device_id: 7,
                sequence: 101,
                version: FirmwareVersion::new(1, 2, 3, 0xDEAD_BEEF),
            })
            .unwrap();
        radio
            .configure_wake_timer(WakeIntervalCode::from_parts(205, 9))
            .unwrap();

        let version = &radio.sink.frames[0];
        assert_eq!(version[1], FrameKind::VersionStatus as u8);
        assert_eq!(&version[9..12], &[1, 2, 3]);
        assert!(checksum_ok(version));

        let wake = &radio.sink.frames[1];
        assert_eq!(wake.as_slice()[1..5], [0x10, 2, 0xCD, 0x09]);
        assert!(checksum_ok(wake));
    }

    #[test]
    fn sink_failures_are_wrapped() {
        let mut radio = Radio::new(CaptureSink {
            fail: true,
            ..CaptureSink::default()
        });
        assert_eq!(
            radio.configure_wake_timer(WakeIntervalCode::default()),
            Err(RadioError::Other("uart"))
        );
        assert_eq!(radio.frames_sent(), 0);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        assert!(encode_frame(FrameKind::SensorStatus, &[0; MAX_PAYLOAD + 1]).is_none());
        assert!(encode_frame(FrameKind::SensorStatus, &[0; MAX_PAYLOAD]).is_some());
    }
}
