use crate::error::{MartechError, Result};
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use serialport::{ClearBuffer, FlowControl, SerialPort};
use std::{io, time::Duration};
use strum_macros::{Display, EnumString, IntoStaticStr};

/// Longest time a settle loop will keep waiting on a buffer that is still
/// growing before giving up and reading what is there.
pub const STALL_GUARD: Duration = Duration::from_secs(30);

/// Default interval between buffer size checks when waiting on a reply.
pub const CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// The smallest set of operations a driver needs from a serial line. Real
/// ports are `Box<dyn SerialPort>`, tests use a scripted link. Pausing goes
/// through the link so that scripted links do not have to sleep.
pub trait SerialLink: Send {
    /// Write every byte to the line.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
    /// Read whatever is available into `buf`, `Ok(0)` when nothing is.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Number of bytes waiting in the input buffer.
    fn bytes_to_read(&mut self) -> Result<usize>;
    /// Discard both the input and output buffers.
    fn clear(&mut self) -> Result<()>;
    /// Wait for the given duration.
    fn pause(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl SerialLink for Box<dyn SerialPort> {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        io::Write::write_all(self, bytes)?;
        io::Write::flush(self)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(self, buf)
    }

    fn bytes_to_read(&mut self) -> Result<usize> {
        Ok(SerialPort::bytes_to_read(&**self)? as usize)
    }

    fn clear(&mut self) -> Result<()> {
        SerialPort::clear(&**self, ClearBuffer::All)?;
        Ok(())
    }
}

/// Sentence that ends a Thetis passthrough session.
pub const EXIT_PASSTHRU: &str = "$PWETQ";

/// Last capture of the first group of `pattern` in `text`.
///
/// * `pattern`: regular expression with one capture group.
/// * `text`: device response.
/// * `command`: command that produced the response, for the error.
pub fn last_capture(pattern: &str, text: &str, command: &str) -> Result<String> {
    let regex = Regex::new(pattern).map_err(|e| MartechError::InvalidArgument(e.to_string()))?;
    regex
        .captures_iter(text)
        .last()
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| MartechError::no_match(command, pattern, text))
}

/// Line ending appended to a command before it is written.
#[derive(EnumString, IntoStaticStr, Display, Copy, Clone, Debug, PartialEq, Eq)]
pub enum Eol {
    /// Carriage return, used by the ECO sensors.
    Cr,
    /// Carriage return and line feed, the default for most sensors.
    CrLf,
    /// Line feed, used by the Thetis controller.
    Lf,
    /// Nothing is appended.
    None,
}

impl Eol {
    /// The characters written for this line ending.
    pub fn as_str(&self) -> &'static str {
        match self {
            Eol::Cr => "\r",
            Eol::CrLf => "\r\n",
            Eol::Lf => "\n",
            Eol::None => "",
        }
    }
}

/// Parity setting as written in the config files.
#[derive(Deserialize, Serialize, Copy, Clone, Debug, PartialEq, Eq)]
pub enum Parity {
    /// No parity bit.
    N,
    /// Even parity.
    E,
    /// Odd parity.
    O,
}

impl From<Parity> for serialport::Parity {
    fn from(value: Parity) -> Self {
        match value {
            Parity::N => serialport::Parity::None,
            Parity::E => serialport::Parity::Even,
            Parity::O => serialport::Parity::Odd,
        }
    }
}

/// Serial line parameters for one device. Every device in this crate
/// defaults to 8N1 without flow control; only the port and the baud rate
/// change between them.
#[serde_as]
#[derive(Deserialize, Serialize, Clone, PartialEq, Eq, Debug)]
pub struct SerialConfig {
    /// System specific port name, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    /// Line speed in bits per second.
    pub baud_rate: u32,
    /// Data bits per character (5 - 8).
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Parity bit setting.
    #[serde(default = "default_parity")]
    pub parity: Parity,
    /// Stop bits (1 or 2).
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// Software (XON/XOFF) flow control.
    #[serde(default)]
    pub flow_control: bool,
    /// Read timeout for blocking reads.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> Parity {
    Parity::N
}

fn default_stop_bits() -> u8 {
    1
}

fn default_timeout() -> Duration {
    Duration::from_secs(3)
}

impl SerialConfig {
    /// 8N1 settings with a three second read timeout.
    ///
    /// * `port`: system specific port name.
    /// * `baud_rate`: line speed in bits per second.
    pub fn new<S: Into<String>>(port: S, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            data_bits: default_data_bits(),
            parity: default_parity(),
            stop_bits: default_stop_bits(),
            flow_control: false,
            timeout: default_timeout(),
        }
    }

    /// Replace the read timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn data_bits(&self) -> Result<serialport::DataBits> {
        match self.data_bits {
            5 => Ok(serialport::DataBits::Five),
            6 => Ok(serialport::DataBits::Six),
            7 => Ok(serialport::DataBits::Seven),
            8 => Ok(serialport::DataBits::Eight),
            other => Err(MartechError::InvalidArgument(format!(
                "{other} data bits is not supported"
            ))),
        }
    }

    fn stop_bits(&self) -> Result<serialport::StopBits> {
        match self.stop_bits {
            1 => Ok(serialport::StopBits::One),
            2 => Ok(serialport::StopBits::Two),
            other => Err(MartechError::InvalidArgument(format!(
                "{other} stop bits is not supported"
            ))),
        }
    }
}

/// A serial connection to one device. Wraps the link with the command
/// framing and the buffer settling that every driver relies on.
pub struct Sercom<L: SerialLink = Box<dyn SerialPort>> {
    /// Underlying serial line.
    link: L,
    /// Port name, only used for logging.
    name: String,
    /// Upper bound on any settle loop.
    stall_guard: Duration,
}

impl Sercom {
    /// Open and configure a serial port, then clear anything left in the
    /// buffers from a previous session.
    ///
    /// * `config`: line parameters for the device.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(config.data_bits()?)
            .parity(config.parity.into())
            .stop_bits(config.stop_bits()?)
            .flow_control(if config.flow_control {
                FlowControl::Software
            } else {
                FlowControl::None
            })
            .timeout(config.timeout)
            .open()?;
        debug!("opened {} at {} bps", config.port, config.baud_rate);
        let mut sercom = Self::new(port, &config.port);
        sercom.clear_buffers()?;
        Ok(sercom)
    }
}

impl<L: SerialLink> Sercom<L> {
    /// Wrap an already open link.
    ///
    /// * `link`: the serial line.
    /// * `name`: name used in log messages.
    pub fn new<S: Into<String>>(link: L, name: S) -> Self {
        Self {
            link,
            name: name.into(),
            stall_guard: STALL_GUARD,
        }
    }

    /// Port name the connection was opened with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Borrow the underlying link.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Mutably borrow the underlying link.
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Release the connection. The port closes when the link is dropped.
    pub fn close(self) -> L {
        debug!("closing {}", self.name);
        self.link
    }

    /// Override the stall guard, mostly useful for slow links.
    pub fn set_stall_guard(&mut self, stall_guard: Duration) {
        self.stall_guard = stall_guard;
    }

    /// Current stall guard.
    pub fn stall_guard(&self) -> Duration {
        self.stall_guard
    }

    /// Clear the input and output buffers.
    pub fn clear_buffers(&mut self) -> Result<()> {
        self.link.clear()
    }

    /// Wait on the link.
    pub fn pause(&mut self, duration: Duration) {
        self.link.pause(duration);
    }

    /// Bytes currently waiting in the input buffer.
    pub fn bytes_waiting(&mut self) -> Result<usize> {
        self.link.bytes_to_read()
    }

    /// Encode and send a command followed by the given line ending.
    ///
    /// * `command`: ASCII command.
    /// * `eol`: line ending to append.
    pub fn write_command(&mut self, command: &str, eol: Eol) -> Result<()> {
        debug!("{} <- {:?}", self.name, command);
        let mut bytes = Vec::with_capacity(command.len() + 2);
        bytes.extend_from_slice(command.as_bytes());
        bytes.extend_from_slice(eol.as_str().as_bytes());
        self.link.write_all(&bytes)?;
        Ok(())
    }

    /// Wait for the input buffer to stop growing, sampling its size every
    /// `check`, and return the settled size. Gives up after the stall guard
    /// and returns whatever was last seen.
    pub fn settle(&mut self, check: Duration) -> Result<usize> {
        let step = check.max(Duration::from_millis(1));
        let mut buffered = self.link.bytes_to_read()?;
        let mut waited = step;
        self.link.pause(check);
        loop {
            let incoming = self.link.bytes_to_read()?;
            if incoming == buffered {
                return Ok(incoming);
            }
            if waited > self.stall_guard {
                warn!("forced serial read timeout on {}", self.name);
                return Ok(incoming);
            }
            buffered = incoming;
            self.link.pause(check);
            waited += step;
        }
    }

    /// Read exactly the number of bytes waiting once the buffer has settled.
    ///
    /// * `check`: interval between buffer size samples.
    pub fn read_bytes(&mut self, check: Duration) -> Result<Vec<u8>> {
        let count = self.settle(check)?;
        let mut data = vec![0u8; count];
        let mut filled = 0;
        while filled < count {
            match self.link.read(&mut data[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }
        data.truncate(filled);
        debug!("{} -> {} bytes", self.name, data.len());
        Ok(data)
    }

    /// Read the settled buffer as text.
    ///
    /// * `check`: interval between buffer size samples.
    pub fn read_response(&mut self, check: Duration) -> Result<String> {
        let data = self.read_bytes(check)?;
        let response = String::from_utf8_lossy(&data).into_owned();
        debug!("{} -> {:?}", self.name, response);
        Ok(response)
    }

    /// Read byte by byte until the delimiter has been received or the line
    /// goes quiet. The delimiter is included in the result.
    ///
    /// * `delimiter`: byte sequence that ends the read.
    pub fn read_until(&mut self, delimiter: &[u8]) -> Result<String> {
        let mut data = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.link.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    data.push(byte[0]);
                    if data.ends_with(delimiter) {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }
        let response = String::from_utf8_lossy(&data).into_owned();
        debug!("{} -> {:?}", self.name, response);
        Ok(response)
    }

    /// Read up to and including the next line feed.
    pub fn read_line(&mut self) -> Result<String> {
        self.read_until(b"\n")
    }

    /// Leave a Thetis passthrough. True when the controller acknowledges.
    pub fn exit_passthru(&mut self) -> Result<bool> {
        self.write_command(EXIT_PASSTHRU, Eol::None)?;
        let response = self.read_response(CHECK_INTERVAL)?;
        Ok(response.contains("PWETA"))
    }

    /// Read every complete line currently waiting, after the buffer settles.
    pub fn read_lines(&mut self, check: Duration) -> Result<Vec<String>> {
        let response = self.read_response(check)?;
        Ok(response
            .split_inclusive('\n')
            .map(str::to_string)
            .collect())
    }
}
