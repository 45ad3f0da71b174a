//! Synchronous request/response session with a single addressed P906.
//!
//! The session owns the transport, keeps exactly one request in flight and
//! caches the device status field-by-field as responses arrive. Receive-side
//! noise (corrupt or stray lines on the radio link) is handled by re-reading
//! the next line up to a retry budget; the request is never resent.

use crate::calibration::{correct_current, correct_voltage};
use crate::protocol::*;
use crate::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What the core requires from the serial-attached adapter: raw writes,
/// line-delimited reads and an outbound flush. AT-command session setup
/// (`AT+CFG`, `AT+LISTEN`, ...) is driven through these primitives.
///
/// `read_until` must return whatever has accumulated when the transport
/// timeout expires instead of failing; a short or empty line is ordinary
/// radio noise and handled by the session's retry loop.
pub trait Transport {
    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()>;
    fn read_until(&mut self, marker: &[u8]) -> std::io::Result<Vec<u8>>;
    fn flush(&mut self) -> std::io::Result<()>;
}

/// Default receive retry budget per exchange.
pub const DEFAULT_RETRIES: usize = 3;
/// Default number of broadcast call-for-id attempts during auto-match.
pub const DEFAULT_MATCH_RETRIES: usize = 320;

/// Per-device ADC correction constants, fetched once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalibrationConstants {
    pub hv_zero: u16,
    pub hv_gain: u16,
    pub hc_zero: u16,
    pub hc_gain: u16,
}

/// Last known device state, merged from whatever each response carries.
/// A failed exchange leaves prior values intact.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceStatus {
    pub error_flag: Option<u8>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub input_voltage: Option<f64>,
    pub input_current: Option<f64>,
    pub calibration: Option<CalibrationConstants>,
}

/// A realtime sample corrected to physical units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AdcReading {
    pub millivolts: i32,
    pub milliamps: i32,
}

/// A session with one P906 over a radio adapter.
#[derive(Debug)]
pub struct P906<T> {
    transport: T,
    idcode: Option<String>,
    address: String,
    channel: u8,
    output_channel: u8,
    led_color: u16,
    blink: bool,
    retries: usize,
    status: DeviceStatus,
}

impl<T: Transport> P906<T> {
    /// Creates a session bound to `address` (10 hex digits) and `channel`.
    /// The identity is either known from a previous auto-match or learned
    /// via [`P906::auto_match`].
    pub fn new(
        transport: T,
        address: &str,
        channel: u8,
        idcode: Option<&str>,
    ) -> Result<Self, Error> {
        address_bytes(address)?;
        if channel > MAX_CHANNEL {
            return Err(Error::InvalidParameter("channel must be within 0-78"));
        }
        if let Some(idcode) = idcode {
            identity_bytes(idcode)?;
        }
        Ok(Self {
            transport,
            idcode: idcode.map(str::to_ascii_lowercase),
            address: address.to_ascii_lowercase(),
            channel,
            output_channel: 0,
            led_color: DEFAULT_LED_COLOR,
            blink: true,
            retries: DEFAULT_RETRIES,
            status: DeviceStatus::default(),
        })
    }

    pub fn set_retries(&mut self, retries: usize) {
        self.retries = retries.max(1);
    }

    /// Selects which of the device's output channels type-7/8/9 requests target.
    pub fn set_output_channel(&mut self, output_channel: u8) {
        self.output_channel = output_channel;
    }

    pub fn idcode(&self) -> Option<&str> {
        self.idcode.as_deref()
    }

    pub fn status(&self) -> &DeviceStatus {
        &self.status
    }

    fn require_idcode(&self) -> Result<String, Error> {
        self.idcode.clone().ok_or(Error::NotConnected)
    }

    fn at_command(&mut self, command: &str) -> Result<(), Error> {
        self.transport.write_all(command.as_bytes())?;
        let reply = self.transport.read_until(b"OK\r\n")?;
        if !reply.ends_with(b"OK\r\n") {
            log::warn!("adapter did not acknowledge {:?}", command.trim_end());
        }
        Ok(())
    }

    fn configure_adapter_to(&mut self, address: &str, channel: u8) -> Result<(), Error> {
        self.at_command("\r\nAT+TEST\r\n")?;
        self.at_command(&format!("AT+CFG=5,{},3,1,2,1,32\r\n", channel))?;
        self.at_command(&format!("AT+RXADDR=1,{}\r\n", address))?;
        self.at_command(&format!("AT+TXADDR={}\r\n", address))?;
        self.at_command("AT+LISTEN=start\r\n")
    }

    /// Points the adapter at the session's own address/channel.
    pub fn configure_adapter(&mut self) -> Result<(), Error> {
        let address = self.address.clone();
        self.configure_adapter_to(&address, self.channel)
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), Error> {
        self.at_command(&format!("AT+TX={}\r\n", hex::encode(frame)))
    }

    /// Parses one `"<pipe id>,<hex frame>"` line and validates the frame.
    fn parse_line(line: &[u8]) -> Result<(u32, Vec<u8>), Error> {
        let text = std::str::from_utf8(line)
            .map_err(|_| Error::MalformedResponse("non-utf8 reply line"))?
            .trim_end_matches(['\r', '\n']);
        let (pipe, frame_hex) = text
            .split_once(',')
            .ok_or(Error::MalformedResponse("missing pipe separator"))?;
        let pipe: u32 = pipe
            .trim()
            .parse()
            .map_err(|_| Error::MalformedResponse("non-numeric pipe id"))?;
        let raw =
            hex::decode(frame_hex).map_err(|_| Error::MalformedResponse("non-hex frame body"))?;
        Ok((pipe, validate_frame(&raw)?))
    }

    /// Reads reply lines until one carries a valid frame. Retries target
    /// receive-side noise only, so a bad line is dropped and the next one
    /// read; the request is not resent.
    fn recv(&mut self) -> Result<(u32, Vec<u8>), Error> {
        for attempt in 1..=self.retries {
            let line = self.transport.read_until(b"\r\n")?;
            match Self::parse_line(&line) {
                Ok((pipe, frame)) => {
                    log::trace!("recv from pipe {}: {:02X?}", pipe, frame);
                    return Ok((pipe, frame));
                }
                Err(err) => {
                    log::debug!(
                        "discarding reply line (attempt {}/{}): {}",
                        attempt,
                        self.retries,
                        err
                    );
                }
            }
        }
        Err(Error::Recv(self.retries))
    }

    fn send_receive(&mut self, frame: &[u8]) -> Result<(u32, Vec<u8>), Error> {
        self.transport.flush()?;
        log::trace!("send: {:02X?}", frame);
        self.send(frame)?;
        self.recv()
    }

    fn apply_telemetry(&mut self, telemetry: &Telemetry) {
        self.status.error_flag = Some(telemetry.error_flag);
        self.status.input_voltage = Some(telemetry.input_voltage);
        self.status.input_current = Some(telemetry.input_current);
        if let Some(voltage) = telemetry.voltage {
            self.status.voltage = Some(voltage);
        }
        if let Some(current) = telemetry.current {
            self.status.current = Some(current);
        }
    }

    /// Runs one type-7 exchange and merges the reply into the status cache.
    ///
    /// `Ok(None)` means the device was momentarily unreachable: the retry
    /// budget ran out or the reply did not decode. The occasional stray
    /// non-type-7 reply (a late realtime frame, typically) is ignored too.
    fn exchange_telemetry(&mut self, request: &[u8]) -> Result<Option<Telemetry>, Error> {
        let frame = match self.send_receive(request) {
            Ok((_pipe, frame)) => frame,
            Err(Error::Recv(retries)) => {
                log::debug!("device unreachable after {} attempts", retries);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        if frame[0] != MSG_TELEMETRY {
            log::debug!("ignoring stray type-{} reply", frame[0]);
            return Ok(None);
        }
        match Telemetry::decode(&frame) {
            Ok(telemetry) => {
                self.apply_telemetry(&telemetry);
                Ok(Some(telemetry))
            }
            Err(err) => {
                log::debug!("undecodable telemetry reply: {}", err);
                Ok(None)
            }
        }
    }

    /// Reads the device's configured set values and input measurements.
    pub fn get_setpoint(&mut self) -> Result<Option<Telemetry>, Error> {
        let idcode = self.require_idcode()?;
        let request = Telemetry::request(&idcode, self.output_channel, self.blink)?;
        self.exchange_telemetry(&request)
    }

    /// Sets the output voltage in volts, domain `[0.0, 30.0]`.
    pub fn set_voltage(&mut self, voltage: f64) -> Result<Option<Telemetry>, Error> {
        let idcode = self.require_idcode()?;
        let request = SetVoltage::request(&idcode, voltage, self.output_channel, self.blink)?;
        self.exchange_telemetry(&request)
    }

    /// Sets the output current limit in amps, domain `(0.0, 10.0)`.
    pub fn set_current(&mut self, current: f64) -> Result<Option<Telemetry>, Error> {
        let idcode = self.require_idcode()?;
        let request = SetCurrent::request(&idcode, current, self.output_channel, self.blink)?;
        self.exchange_telemetry(&request)
    }

    /// Switches the output on or off.
    pub fn set_switch(&mut self, on: bool) -> Result<Option<Telemetry>, Error> {
        let idcode = self.require_idcode()?;
        let request = Switch::request(&idcode, on, self.output_channel, self.blink)?;
        self.exchange_telemetry(&request)
    }

    /// Fetches the device's calibration constants via a type-9 exchange.
    ///
    /// The constants are stored only when the identity echoed by the device
    /// matches this session's; a mismatch reports `Ok(None)` and leaves the
    /// cache untouched.
    pub fn fetch_calibration(&mut self) -> Result<Option<CalibrationConstants>, Error> {
        let idcode = self.require_idcode()?;
        let request =
            Calibration::request(&idcode, self.led_color, self.output_channel, self.blink)?;
        let (_pipe, frame) = self.send_receive(&request)?;
        let calibration = Calibration::decode(&frame)?;
        if calibration.idcode != idcode {
            log::warn!(
                "calibration reply for {} does not match session identity {}",
                calibration.idcode,
                idcode
            );
            return Ok(None);
        }
        let constants = CalibrationConstants {
            hv_zero: calibration.hv_zero,
            hv_gain: calibration.hv_gain,
            hc_zero: calibration.hc_zero,
            hc_gain: calibration.hc_gain,
        };
        self.status.calibration = Some(constants.clone());
        Ok(Some(constants))
    }

    /// Requests realtime ADC samples and corrects them to mV/mA using the
    /// fetched calibration constants. Fails with [`Error::NotConnected`] if
    /// [`P906::fetch_calibration`] has not populated the constants yet.
    pub fn get_realtime(&mut self) -> Result<Option<Vec<AdcReading>>, Error> {
        let idcode = self.require_idcode()?;
        let constants = self.status.calibration.clone().ok_or(Error::NotConnected)?;
        let request = RealtimeAdc::request(&idcode, self.output_channel, self.blink)?;
        let frame = match self.send_receive(&request) {
            Ok((_pipe, frame)) => frame,
            Err(Error::Recv(retries)) => {
                log::debug!("device unreachable after {} attempts", retries);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        let adc = match RealtimeAdc::decode(&frame) {
            Ok(adc) => adc,
            Err(err) => {
                log::debug!("undecodable realtime reply: {}", err);
                return Ok(None);
            }
        };
        self.status.error_flag = Some(adc.error_flag);
        let readings = adc
            .samples
            .iter()
            .map(|&(voltage_code, current_code)| AdcReading {
                millivolts: correct_voltage(voltage_code, constants.hv_gain, constants.hv_zero),
                milliamps: correct_current(current_code, constants.hc_gain, constants.hc_zero),
            })
            .collect();
        Ok(Some(readings))
    }

    /// Brings a session with a known identity up: adapter configuration,
    /// calibration fetch, initial set-point read.
    pub fn connect(&mut self) -> Result<(), Error> {
        self.require_idcode()?;
        self.configure_adapter()?;
        self.fetch_calibration()?;
        self.get_setpoint()?;
        Ok(())
    }

    /// Discovers an un-dispatched device and assigns it this session's
    /// address and channel.
    ///
    /// Listens broadcast-wide (address all-ones, channel 78) and calls for an
    /// identity up to `retries` times. If no device ever answers the identity
    /// stays unset and `Ok(None)` is returned without dispatching. Otherwise
    /// the device is dispatched to the session's address/channel and the
    /// adapter reconfigured point-to-point.
    ///
    /// Assumes at most one un-dispatched device is listening on the
    /// broadcast channel.
    pub fn auto_match(&mut self, retries: usize) -> Result<Option<String>, Error> {
        self.configure_adapter_to(BROADCAST_ADDRESS, BROADCAST_CHANNEL)?;
        let request = CallForId::request()?;
        let mut idcode = None;
        for attempt in 1..=retries {
            log::info!("calling for device identity (attempt {})", attempt);
            let frame = match self.send_receive(&request) {
                Ok((_pipe, frame)) => frame,
                Err(Error::Recv(_)) => continue,
                Err(err) => return Err(err),
            };
            match CallForId::decode(&frame) {
                Ok(id) => {
                    idcode = Some(id);
                    break;
                }
                Err(err) => {
                    log::debug!("undecodable identity reply: {}", err);
                }
            }
        }
        let Some(idcode) = idcode else {
            log::warn!("no device answered the broadcast call");
            return Ok(None);
        };
        log::info!(
            "device {} answered on channel {}, dispatching to addr {} channel {}",
            idcode,
            BROADCAST_CHANNEL,
            self.address,
            self.channel
        );
        let request = Dispatch::request(&self.address, self.channel)?;
        let (_pipe, frame) = self.send_receive(&request)?;
        Dispatch::decode(&frame)?;
        self.idcode = Some(idcode.clone());
        self.configure_adapter()?;
        Ok(Some(idcode))
    }
}
