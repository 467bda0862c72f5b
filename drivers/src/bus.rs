use std::io::Read;
use std::io::Write;
use std::os::unix::io::AsRawFd;

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("{operation} failed ({message})")]
    Io {
        operation: &'static str,
        message: String,
    },

    #[error("the parallel port is already claimed by another program")]
    Busy,
}

impl Error {
    fn io(operation: &'static str, error: std::io::Error) -> Self {
        if error.raw_os_error() == Some(libc::EBUSY) {
            return Self::Busy;
        }
        Self::Io {
            operation,
            message: error.to_string(),
        }
    }
}

/// Addressed byte transport between the host and the scanner ASIC.
///
/// Addresses are raw bus addresses: the ASIC layer folds its channel
/// numbers into them before calling the transport.
pub trait Bus: Send {
    fn write_byte(&mut self, address: u8, value: u8) -> Result<(), Error>;

    fn read_byte(&mut self, address: u8) -> Result<u8, Error>;

    fn read_block(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Error>;

    fn write_block(&mut self, address: u8, buffer: &[u8]) -> Result<(), Error>;
}

impl<B: Bus + ?Sized> Bus for Box<B> {
    fn write_byte(&mut self, address: u8, value: u8) -> Result<(), Error> {
        (**self).write_byte(address, value)
    }

    fn read_byte(&mut self, address: u8) -> Result<u8, Error> {
        (**self).read_byte(address)
    }

    fn read_block(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Error> {
        (**self).read_block(address, buffer)
    }

    fn write_block(&mut self, address: u8, buffer: &[u8]) -> Result<(), Error> {
        (**self).write_block(address, buffer)
    }
}

/// Blocks written to this address bypass the address phase, whatever the bus mode.
pub const PASSTHROUGH_ADDRESS: u8 = 0x00;

const SCANNER_SEQUENCE: [u8; 10] = [0x15, 0x95, 0x35, 0xB5, 0x55, 0xD5, 0x75, 0xF5, 0x01, 0x81];

const PRINTER_SEQUENCE: [u8; 10] = [0x15, 0x95, 0x35, 0xB5, 0x55, 0xD5, 0x75, 0xF5, 0x00, 0x80];

pub fn switch_to_scanner<B: Bus + ?Sized>(bus: &mut B) -> Result<(), Error> {
    bus.write_block(PASSTHROUGH_ADDRESS, &SCANNER_SEQUENCE)
}

pub fn switch_to_printer<B: Bus + ?Sized>(bus: &mut B) -> Result<(), Error> {
    bus.write_block(PASSTHROUGH_ADDRESS, &PRINTER_SEQUENCE)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Mode {
    /// Direct register mode, the address byte is not transmitted.
    Compatibility,

    /// Address phase followed by a data phase.
    Epp,
}

// linux/ppdev.h and linux/parport.h
const PPCLAIM: libc::c_ulong = 0x708b;
const PPRELEASE: libc::c_ulong = 0x708c;
const PPNEGOT: libc::c_ulong = 0x40047091;
const IEEE1284_MODE_COMPAT: libc::c_int = 1 << 8;
const IEEE1284_MODE_EPP: libc::c_int = 1 << 6;
const IEEE1284_ADDR: libc::c_int = 1 << 13;
const IEEE1284_DATA: libc::c_int = 0;

pub struct Parport {
    file: std::fs::File,
    mode: Mode,
}

impl Parport {
    pub fn open<P: AsRef<std::path::Path>>(path: P, mode: Mode) -> Result<Self, Error> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|error| Error::io("opening the parallel port", error))?;
        // unsafe: the descriptor stays valid for the lifetime of file
        if unsafe { libc::ioctl(file.as_raw_fd(), PPCLAIM as _) } < 0 {
            return Err(Error::io(
                "claiming the parallel port",
                std::io::Error::last_os_error(),
            ));
        }
        Ok(Self { file, mode })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    fn negotiate(&self, mode: libc::c_int) -> Result<(), Error> {
        let mut mode = mode;
        // unsafe: PPNEGOT reads a single c_int through the pointer
        if unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                PPNEGOT as _,
                &mut mode as *mut libc::c_int,
            )
        } < 0
        {
            return Err(Error::io(
                "negotiating the IEEE 1284 mode",
                std::io::Error::last_os_error(),
            ));
        }
        Ok(())
    }

    fn select(&mut self, address: u8) -> Result<(), Error> {
        match self.mode {
            Mode::Epp if address != PASSTHROUGH_ADDRESS => {
                self.negotiate(IEEE1284_MODE_EPP | IEEE1284_ADDR)?;
                self.file
                    .write_all(&[address])
                    .map_err(|error| Error::io("writing the address phase", error))?;
                self.negotiate(IEEE1284_MODE_EPP | IEEE1284_DATA)
            }
            _ => self.negotiate(IEEE1284_MODE_COMPAT),
        }
    }
}

impl Bus for Parport {
    fn write_byte(&mut self, address: u8, value: u8) -> Result<(), Error> {
        self.select(address)?;
        self.file
            .write_all(&[value])
            .map_err(|error| Error::io("writing to the parallel port", error))
    }

    fn read_byte(&mut self, address: u8) -> Result<u8, Error> {
        self.select(address)?;
        let mut buffer = [0u8; 1];
        self.file
            .read_exact(&mut buffer)
            .map_err(|error| Error::io("reading from the parallel port", error))?;
        Ok(buffer[0])
    }

    fn read_block(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Error> {
        self.select(address)?;
        self.file
            .read_exact(buffer)
            .map_err(|error| Error::io("reading a block from the parallel port", error))
    }

    fn write_block(&mut self, address: u8, buffer: &[u8]) -> Result<(), Error> {
        self.select(address)?;
        self.file
            .write_all(buffer)
            .map_err(|error| Error::io("writing a block to the parallel port", error))
    }
}

impl Drop for Parport {
    fn drop(&mut self) {
        // unsafe: the descriptor is still owned by self.file
        let _ = unsafe { libc::ioctl(self.file.as_raw_fd(), PPRELEASE as _) };
    }
}
