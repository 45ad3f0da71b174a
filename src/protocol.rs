use crate::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Message types understood by the P906.
pub const MSG_SETPOINT: u8 = 4;
pub const MSG_CALL_FOR_ID: u8 = 5;
pub const MSG_DISPATCH: u8 = 6;
pub const MSG_TELEMETRY: u8 = 7;
pub const MSG_REALTIME_ADC: u8 = 8;
pub const MSG_LED_COLOR: u8 = 9;

/// XOR checksum seed shared by every frame.
const CHECKSUM_SEED: u8 = 0x88;
/// A payload must fit into a single radio packet.
const MAX_PAYLOAD_LENGTH: usize = 29;
/// Type byte + length byte + trailing checksum.
const FRAME_OVERHEAD: usize = 3;

/// Radio channels accepted by the adapter and the device.
pub const MAX_CHANNEL: u8 = 78;
/// All-ones address the device listens on before it is dispatched.
pub const BROADCAST_ADDRESS: &str = "ffffffffff";
/// Channel the device listens on before it is dispatched.
pub const BROADCAST_CHANNEL: u8 = MAX_CHANNEL;

/// Factory LED color, doubles as the "fetch calibration" payload.
pub const DEFAULT_LED_COLOR: u16 = 0x3168;

fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(CHECKSUM_SEED, |r, b| r ^ b)
}

/// Builds the common frame envelope: type, length, payload, XOR checksum.
pub fn encode_frame(msg_type: u8, payload: &[u8]) -> Result<Vec<u8>, Error> {
    if payload.len() >= MAX_PAYLOAD_LENGTH {
        return Err(Error::PayloadTooLarge(payload.len()));
    }
    let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    frame.push(msg_type);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    frame.push(checksum(&frame));
    Ok(frame)
}

/// Truncates `raw` to its declared length and validates the checksum.
///
/// The radio link may pad or concatenate stray bytes, so nothing past the
/// declared `length + 3` boundary is ever trusted.
pub fn validate_frame(raw: &[u8]) -> Result<Vec<u8>, Error> {
    if raw.len() < FRAME_OVERHEAD {
        return Err(Error::MalformedResponse("frame shorter than envelope"));
    }
    let total = raw[1] as usize + FRAME_OVERHEAD;
    if raw.len() < total {
        return Err(Error::MalformedResponse("frame shorter than declared length"));
    }
    let frame = &raw[..total];
    let calculated = checksum(&frame[..total - 1]);
    let received = frame[total - 1];
    if calculated != received {
        log::warn!(
            "Invalid checksum - calculated={:#04x} received={:#04x} frame={:02X?}",
            calculated,
            received,
            frame
        );
        return Err(Error::ChecksumMismatch {
            calculated,
            received,
        });
    }
    Ok(frame.to_vec())
}

fn validate_type(frame: &[u8], expected: u8) -> Result<(), Error> {
    if frame[0] != expected {
        return Err(Error::UnexpectedType {
            expected,
            received: frame[0],
        });
    }
    Ok(())
}

// Numeric fields are decimal digit strings packed one digit per nibble,
// a quirk of the device firmware. A set value is rendered like "015.000"
// with the separator removed, giving 6 digits in 3 bytes.

fn encode_fixed(value: f64) -> [u8; 3] {
    let millis = (value * 1000.0).round() as u32;
    let digits = [
        millis / 100_000 % 10,
        millis / 10_000 % 10,
        millis / 1_000 % 10,
        millis / 100 % 10,
        millis / 10 % 10,
        millis % 10,
    ];
    [
        ((digits[0] << 4) | digits[1]) as u8,
        ((digits[2] << 4) | digits[3]) as u8,
        ((digits[4] << 4) | digits[5]) as u8,
    ]
}

/// Decodes a nibble-packed decimal field with 3 fractional digits.
fn decode_fixed(data: &[u8]) -> Result<f64, Error> {
    let mut value: u32 = 0;
    for byte in data {
        for nibble in [byte >> 4, byte & 0x0f] {
            if nibble > 9 {
                return Err(Error::MalformedResponse("non-decimal digit in fixed-point field"));
            }
            value = value * 10 + u32::from(nibble);
        }
    }
    Ok(f64::from(value) / 1000.0)
}

/// Splits 3 bytes into two 12-bit raw ADC codes (3 hex digits each).
fn decode_adc_pair(data: &[u8]) -> (u16, u16) {
    let voltage_code = (u16::from(data[0]) << 4) | u16::from(data[1] >> 4);
    let current_code = (u16::from(data[1] & 0x0f) << 8) | u16::from(data[2]);
    (voltage_code, current_code)
}

fn decode_identity(data: &[u8]) -> String {
    hex::encode(data)
}

pub(crate) fn identity_bytes(idcode: &str) -> Result<Vec<u8>, Error> {
    let bytes =
        hex::decode(idcode).map_err(|_| Error::InvalidParameter("identity code must be hex"))?;
    if bytes.len() != 4 {
        return Err(Error::InvalidParameter("identity code must be 8 hex digits"));
    }
    Ok(bytes)
}

/// Common prefix of every identity-addressed request: identity code,
/// output-channel selector, blink flag.
fn identity_header(idcode: &str, output_channel: u8, blink: bool) -> Result<Vec<u8>, Error> {
    let mut payload = identity_bytes(idcode)?;
    payload.push(output_channel);
    payload.push(u8::from(blink));
    Ok(payload)
}

/// Configured (not realtime) set-point, type 4.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Setpoint {
    pub current: f64,
    pub voltage: f64,
}

impl Setpoint {
    pub fn request() -> Result<Vec<u8>, Error> {
        encode_frame(MSG_SETPOINT, &[0x00])
    }

    pub fn decode(frame: &[u8]) -> Result<Self, Error> {
        validate_type(frame, MSG_SETPOINT)?;
        if frame[1] != 5 {
            return Err(Error::MalformedResponse("set-point response must carry 5 bytes"));
        }
        Ok(Self {
            current: decode_fixed(&frame[2..4])?,
            voltage: decode_fixed(&frame[4..7])?,
        })
    }
}

/// Broadcast "call for id", type 5. Decodes to the device identity code.
pub struct CallForId;

impl CallForId {
    pub fn request() -> Result<Vec<u8>, Error> {
        encode_frame(MSG_CALL_FOR_ID, &[0x4d])
    }

    pub fn decode(frame: &[u8]) -> Result<String, Error> {
        validate_type(frame, MSG_CALL_FOR_ID)?;
        if frame[1] != 4 {
            return Err(Error::MalformedResponse("identity response must carry 4 bytes"));
        }
        Ok(decode_identity(&frame[2..6]))
    }
}

/// Dispatches an identified device to a dedicated address and channel, type 6.
pub struct Dispatch;

impl Dispatch {
    /// `address` is the 10-hex-digit radio address; the device expects it in
    /// reversed byte order, followed by the channel byte.
    pub fn request(address: &str, channel: u8) -> Result<Vec<u8>, Error> {
        let mut payload = address_bytes(address)?;
        payload.reverse();
        if channel > MAX_CHANNEL {
            return Err(Error::InvalidParameter("channel must be within 0-78"));
        }
        payload.push(channel);
        encode_frame(MSG_DISPATCH, &payload)
    }

    /// The device acknowledges with a short echo payload.
    pub fn decode(frame: &[u8]) -> Result<Vec<u8>, Error> {
        validate_type(frame, MSG_DISPATCH)?;
        if frame[1] != 3 {
            return Err(Error::MalformedResponse("dispatch ack must carry 3 bytes"));
        }
        Ok(frame[2..5].to_vec())
    }
}

pub(crate) fn address_bytes(address: &str) -> Result<Vec<u8>, Error> {
    let bytes =
        hex::decode(address).map_err(|_| Error::InvalidParameter("radio address must be hex"))?;
    if bytes.len() != 5 {
        return Err(Error::InvalidParameter("radio address must be 10 hex digits"));
    }
    Ok(bytes)
}

/// Telemetry exchanged via type 7: a bare request reads the current state,
/// sub-encoded variants set voltage/current or toggle the output.
///
/// The device answers in one of two shapes: the long form (length 0x1C)
/// carries the set voltage/current, the short form (length 0x16) omits them.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Telemetry {
    pub error_flag: u8,
    pub input_voltage: f64,
    pub input_current: f64,
    /// Absent in the short (0x16) response shape.
    pub voltage: Option<f64>,
    /// Absent in the short (0x16) response shape.
    pub current: Option<f64>,
    /// Raw 12-bit (voltage-code, current-code) sample pairs.
    pub adc_samples: Vec<(u16, u16)>,
}

impl Telemetry {
    pub fn request(idcode: &str, output_channel: u8, blink: bool) -> Result<Vec<u8>, Error> {
        let payload = identity_header(idcode, output_channel, blink)?;
        encode_frame(MSG_TELEMETRY, &payload)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, Error> {
        validate_type(frame, MSG_TELEMETRY)?;
        let with_setpoint = match frame[1] {
            0x1c => true,
            0x16 => false,
            _ => return Err(Error::MalformedResponse("unknown telemetry response shape")),
        };
        // frame[3..7] are undocumented firmware fields, skipped.
        let mut adc_samples = Vec::with_capacity(4);
        for chunk in frame[12..24].chunks_exact(3) {
            adc_samples.push(decode_adc_pair(chunk));
        }
        let (voltage, current) = if with_setpoint {
            (
                Some(decode_fixed(&frame[24..27])?),
                Some(decode_fixed(&frame[27..30])?),
            )
        } else {
            (None, None)
        };
        Ok(Self {
            error_flag: frame[2],
            input_voltage: decode_fixed(&frame[7..10])?,
            input_current: decode_fixed(&frame[10..12])?,
            voltage,
            current,
            adc_samples,
        })
    }
}

/// Type-7 set-voltage request, subtype 0x03.
pub struct SetVoltage;

impl SetVoltage {
    pub fn request(
        idcode: &str,
        voltage: f64,
        output_channel: u8,
        blink: bool,
    ) -> Result<Vec<u8>, Error> {
        if !(0.0..=30.0).contains(&voltage) {
            return Err(Error::InvalidParameter("voltage must be within 0.0-30.0 V"));
        }
        let mut payload = identity_header(idcode, output_channel, blink)?;
        payload.extend_from_slice(&[0x03, 0x03]);
        payload.extend_from_slice(&encode_fixed(voltage));
        encode_frame(MSG_TELEMETRY, &payload)
    }
}

/// Type-7 set-current request, subtype 0x02.
pub struct SetCurrent;

impl SetCurrent {
    pub fn request(
        idcode: &str,
        current: f64,
        output_channel: u8,
        blink: bool,
    ) -> Result<Vec<u8>, Error> {
        if current <= 0.0 || current >= 10.0 {
            return Err(Error::InvalidParameter(
                "current must be within 0.0-10.0 A exclusive",
            ));
        }
        let mut payload = identity_header(idcode, output_channel, blink)?;
        payload.extend_from_slice(&[0x02, 0x03]);
        payload.extend_from_slice(&encode_fixed(current));
        encode_frame(MSG_TELEMETRY, &payload)
    }
}

/// Type-7 output on/off request, subtype 0x0C.
pub struct Switch;

impl Switch {
    pub fn request(
        idcode: &str,
        on: bool,
        output_channel: u8,
        blink: bool,
    ) -> Result<Vec<u8>, Error> {
        let mut payload = identity_header(idcode, output_channel, blink)?;
        payload.extend_from_slice(&[0x0c, 0x00, u8::from(on)]);
        encode_frame(MSG_TELEMETRY, &payload)
    }
}

/// Realtime raw ADC samples, type 8. The codes need calibration correction
/// before they mean anything, see [`crate::calibration`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RealtimeAdc {
    pub error_flag: u8,
    /// Up to 9 raw (voltage-code, current-code) pairs.
    pub samples: Vec<(u16, u16)>,
}

impl RealtimeAdc {
    pub fn request(idcode: &str, output_channel: u8, blink: bool) -> Result<Vec<u8>, Error> {
        let payload = identity_header(idcode, output_channel, blink)?;
        encode_frame(MSG_REALTIME_ADC, &payload)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, Error> {
        validate_type(frame, MSG_REALTIME_ADC)?;
        let len = frame[1] as usize;
        if len == 0 || len > 0x1c {
            return Err(Error::MalformedResponse("realtime ADC response too long"));
        }
        let pairs = (len - 1) / 3;
        let mut samples = Vec::with_capacity(pairs);
        for chunk in frame[3..3 + pairs * 3].chunks_exact(3) {
            samples.push(decode_adc_pair(chunk));
        }
        Ok(Self {
            error_flag: frame[2],
            samples,
        })
    }
}

/// Type-9 LED color request. The reply opportunistically carries the
/// per-device calibration constants, which is the only reason the session
/// ever sends it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Calibration {
    pub idcode: String,
    pub hv_zero: u16,
    pub hv_gain: u16,
    pub hc_zero: u16,
    pub hc_gain: u16,
}

impl Calibration {
    pub fn request(
        idcode: &str,
        led_color: u16,
        output_channel: u8,
        blink: bool,
    ) -> Result<Vec<u8>, Error> {
        let mut payload = identity_header(idcode, output_channel, blink)?;
        payload.extend_from_slice(&led_color.to_be_bytes());
        encode_frame(MSG_LED_COLOR, &payload)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, Error> {
        validate_type(frame, MSG_LED_COLOR)?;
        if frame[1] != 14 {
            return Err(Error::MalformedResponse("calibration response must carry 14 bytes"));
        }
        // frame[6] is an undocumented byte; the trailing marker has no known
        // meaning either but the firmware always sends 2.
        if frame[15] != 2 {
            return Err(Error::MalformedResponse("calibration marker byte must equal 2"));
        }
        Ok(Self {
            idcode: decode_identity(&frame[2..6]),
            hv_zero: u16::from_be_bytes([frame[7], frame[8]]),
            hv_gain: u16::from_be_bytes([frame[9], frame[10]]),
            hc_zero: u16::from_be_bytes([frame[11], frame[12]]),
            hc_gain: u16::from_be_bytes([frame[13], frame[14]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_for(msg_type: u8, payload: &[u8]) -> Vec<u8> {
        encode_frame(msg_type, payload).unwrap()
    }

    #[test]
    fn checksum_is_xor_fold_seeded_0x88() {
        assert_eq!(checksum(&[]), 0x88);
        assert_eq!(checksum(&[0x88]), 0x00);
        assert_eq!(checksum(&[0x05, 0x01, 0x4d]), 0x88 ^ 0x05 ^ 0x01 ^ 0x4d);
    }

    #[test]
    fn encode_validate_round_trip() {
        for len in 0..29usize {
            let payload: Vec<u8> = (0..len as u8).collect();
            let frame = frame_for(7, &payload);
            let validated = validate_frame(&frame).unwrap();
            assert_eq!(validated[0], 7);
            assert_eq!(validated[1] as usize, len);
            assert_eq!(&validated[2..2 + len], payload.as_slice());
        }
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let payload = [0u8; 29];
        assert!(matches!(
            encode_frame(7, &payload),
            Err(Error::PayloadTooLarge(29))
        ));
    }

    #[test]
    fn validate_rejects_any_single_corrupt_payload_byte() {
        let payload = [0x12, 0x34, 0x56, 0x78];
        let frame = frame_for(7, &payload);
        for i in 2..2 + payload.len() {
            let mut corrupt = frame.clone();
            corrupt[i] ^= 0x01;
            assert!(matches!(
                validate_frame(&corrupt),
                Err(Error::ChecksumMismatch { .. })
            ));
        }
    }

    #[test]
    fn validate_ignores_bytes_past_declared_length() {
        let mut frame = frame_for(5, &[0x4d]);
        let expected = frame.clone();
        frame.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(validate_frame(&frame).unwrap(), expected);
    }

    #[test]
    fn validate_rejects_truncated_frame() {
        let frame = frame_for(7, &[1, 2, 3, 4]);
        assert!(matches!(
            validate_frame(&frame[..frame.len() - 2]),
            Err(Error::MalformedResponse(_))
        ));
        assert!(matches!(
            validate_frame(&[7]),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn fixed_point_round_trip() {
        assert_eq!(encode_fixed(12.5), [0x01, 0x25, 0x00]);
        assert_eq!(decode_fixed(&[0x01, 0x25, 0x00]).unwrap(), 12.5);
        assert_eq!(encode_fixed(15.0), [0x01, 0x50, 0x00]);
        assert_eq!(encode_fixed(0.0), [0x00, 0x00, 0x00]);
        assert_eq!(decode_fixed(&[0x30, 0x00, 0x00]).unwrap(), 300.0);
    }

    #[test]
    fn fixed_point_rejects_hex_digits() {
        assert!(matches!(
            decode_fixed(&[0x0a, 0x00, 0x00]),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn adc_pair_splits_hex_digit_groups() {
        // hex digits "abc" and "def"
        assert_eq!(decode_adc_pair(&[0xab, 0xcd, 0xef]), (0xabc, 0xdef));
        assert_eq!(decode_adc_pair(&[0x00, 0x00, 0x00]), (0, 0));
    }

    #[test]
    fn set_voltage_request_matches_wire_format() {
        let frame = SetVoltage::request("deadbeef", 15.0, 0, true).unwrap();
        let payload = [
            0xde, 0xad, 0xbe, 0xef, 0x00, 0x01, 0x03, 0x03, 0x01, 0x50, 0x00,
        ];
        assert_eq!(frame[0], MSG_TELEMETRY);
        assert_eq!(frame[1] as usize, payload.len());
        assert_eq!(&frame[2..13], &payload);
        let expected_checksum = payload
            .iter()
            .fold(0x88 ^ MSG_TELEMETRY ^ payload.len() as u8, |r, b| r ^ b);
        assert_eq!(frame[13], expected_checksum);
    }

    #[test]
    fn set_voltage_rejects_out_of_range() {
        assert!(matches!(
            SetVoltage::request("deadbeef", 30.5, 0, true),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            SetVoltage::request("deadbeef", -0.1, 0, true),
            Err(Error::InvalidParameter(_))
        ));
        // bounds are inclusive
        assert!(SetVoltage::request("deadbeef", 0.0, 0, true).is_ok());
        assert!(SetVoltage::request("deadbeef", 30.0, 0, true).is_ok());
    }

    #[test]
    fn set_current_bounds_are_exclusive() {
        assert!(matches!(
            SetCurrent::request("deadbeef", 0.0, 0, true),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            SetCurrent::request("deadbeef", 10.0, 0, true),
            Err(Error::InvalidParameter(_))
        ));
        let frame = SetCurrent::request("deadbeef", 2.5, 0, true).unwrap();
        assert_eq!(&frame[8..13], &[0x02, 0x03, 0x00, 0x25, 0x00]);
    }

    #[test]
    fn switch_request_encodes_on_off() {
        let on = Switch::request("deadbeef", true, 0, true).unwrap();
        assert_eq!(&on[8..11], &[0x0c, 0x00, 0x01]);
        let off = Switch::request("deadbeef", false, 0, false).unwrap();
        assert_eq!(&off[6..11], &[0x00, 0x00, 0x0c, 0x00, 0x00]);
    }

    #[test]
    fn rejects_bad_identity_code() {
        assert!(matches!(
            Telemetry::request("nothex!!", 0, true),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            Telemetry::request("deadbeef00", 0, true),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn setpoint_decode() {
        // current 1.500 A, voltage 12.000 V
        let frame = frame_for(MSG_SETPOINT, &[0x15, 0x00, 0x01, 0x20, 0x00]);
        let setpoint = Setpoint::decode(&frame).unwrap();
        assert_eq!(setpoint.current, 1.5);
        assert_eq!(setpoint.voltage, 12.0);
    }

    #[test]
    fn call_for_id_decode() {
        let frame = frame_for(MSG_CALL_FOR_ID, &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(CallForId::decode(&frame).unwrap(), "deadbeef");
    }

    #[test]
    fn decode_asserts_leading_type_byte() {
        let frame = frame_for(MSG_REALTIME_ADC, &[0xde, 0xad, 0xbe, 0xef]);
        assert!(matches!(
            CallForId::decode(&frame),
            Err(Error::UnexpectedType {
                expected: MSG_CALL_FOR_ID,
                received: MSG_REALTIME_ADC
            })
        ));
    }

    #[test]
    fn dispatch_request_reverses_address() {
        let frame = Dispatch::request("153614fae1", 50).unwrap();
        assert_eq!(frame[0], MSG_DISPATCH);
        assert_eq!(&frame[2..8], &[0xe1, 0xfa, 0x14, 0x36, 0x15, 50]);
    }

    #[test]
    fn dispatch_rejects_bad_channel_and_address() {
        assert!(matches!(
            Dispatch::request("153614fae1", 79),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            Dispatch::request("153614", 50),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn dispatch_ack_decode() {
        let frame = frame_for(MSG_DISPATCH, &[0x01, 0x02, 0x03]);
        assert_eq!(Dispatch::decode(&frame).unwrap(), vec![0x01, 0x02, 0x03]);
        let wrong = frame_for(MSG_DISPATCH, &[0x01, 0x02]);
        assert!(matches!(
            Dispatch::decode(&wrong),
            Err(Error::MalformedResponse(_))
        ));
    }

    fn telemetry_payload_common() -> Vec<u8> {
        let mut payload = vec![
            0x00, // error flag
            0xaa, 0xbb, 0xcc, 0xdd, // undocumented fields
        ];
        payload.extend_from_slice(&[0x01, 0x19, 0x98]); // input voltage 11.998
        payload.extend_from_slice(&[0x00, 0x42]); // input current 0.042
        for _ in 0..4 {
            payload.extend_from_slice(&[0x7d, 0x01, 0x10]); // adc pair (0x7d0, 0x110)
        }
        payload
    }

    #[test]
    fn telemetry_long_shape_carries_setpoint() {
        let mut payload = telemetry_payload_common();
        payload.extend_from_slice(&[0x01, 0x25, 0x00]); // voltage 12.5
        payload.extend_from_slice(&[0x00, 0x31, 0x50]); // current 3.15
        assert_eq!(payload.len(), 0x1c);
        let frame = frame_for(MSG_TELEMETRY, &payload);
        let telemetry = Telemetry::decode(&frame).unwrap();
        assert_eq!(telemetry.error_flag, 0);
        assert_eq!(telemetry.input_voltage, 11.998);
        assert_eq!(telemetry.input_current, 0.042);
        assert_eq!(telemetry.voltage, Some(12.5));
        assert_eq!(telemetry.current, Some(3.15));
        assert_eq!(telemetry.adc_samples, vec![(0x7d0, 0x110); 4]);
    }

    #[test]
    fn telemetry_short_shape_has_absent_setpoint() {
        let payload = telemetry_payload_common();
        assert_eq!(payload.len(), 0x16);
        let frame = frame_for(MSG_TELEMETRY, &payload);
        let telemetry = Telemetry::decode(&frame).unwrap();
        assert_eq!(telemetry.voltage, None);
        assert_eq!(telemetry.current, None);
        assert_eq!(telemetry.adc_samples.len(), 4);
    }

    #[test]
    fn telemetry_rejects_unknown_shape() {
        let frame = frame_for(MSG_TELEMETRY, &[0u8; 0x10]);
        assert!(matches!(
            Telemetry::decode(&frame),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn realtime_adc_decode_derives_pair_count_from_length() {
        let mut payload = vec![0x01]; // error flag
        for _ in 0..9 {
            payload.extend_from_slice(&[0x12, 0x34, 0x56]);
        }
        let frame = frame_for(MSG_REALTIME_ADC, &payload);
        let adc = RealtimeAdc::decode(&frame).unwrap();
        assert_eq!(adc.error_flag, 1);
        assert_eq!(adc.samples, vec![(0x123, 0x456); 9]);

        let short = frame_for(MSG_REALTIME_ADC, &[0x00, 0x12, 0x34, 0x56]);
        assert_eq!(RealtimeAdc::decode(&short).unwrap().samples.len(), 1);
    }

    #[test]
    fn calibration_decode() {
        let mut payload = vec![0xde, 0xad, 0xbe, 0xef, 0x07];
        payload.extend_from_slice(&150u16.to_be_bytes());
        payload.extend_from_slice(&26500u16.to_be_bytes());
        payload.extend_from_slice(&20u16.to_be_bytes());
        payload.extend_from_slice(&13000u16.to_be_bytes());
        payload.push(2); // trailing marker
        let frame = frame_for(MSG_LED_COLOR, &payload);
        let calibration = Calibration::decode(&frame).unwrap();
        assert_eq!(calibration.idcode, "deadbeef");
        assert_eq!(calibration.hv_zero, 150);
        assert_eq!(calibration.hv_gain, 26500);
        assert_eq!(calibration.hc_zero, 20);
        assert_eq!(calibration.hc_gain, 13000);
    }

    #[test]
    fn calibration_rejects_bad_marker() {
        let mut payload = vec![0xde, 0xad, 0xbe, 0xef, 0x07];
        payload.extend_from_slice(&[0u8; 8]);
        payload.push(3);
        let frame = frame_for(MSG_LED_COLOR, &payload);
        assert!(matches!(
            Calibration::decode(&frame),
            Err(Error::MalformedResponse(_))
        ));
    }
}
