#![allow(dead_code)]

use flatbed_drivers::asic;
use flatbed_drivers::bus;
use flatbed_drivers::frontend;
use flatbed_drivers::registers;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Write(u8, u8),
    Read(u8),
    ReadBlock(u8, usize),
    WriteBlock(u8, Vec<u8>),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Status {
    Constant(u8),

    /// Alternates between 0x00 and 0xFF on every read.
    Toggling,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Lines {
    /// Pixel values given by `pixel`.
    Pattern,

    Constant(u8),

    /// Dark reference window followed by bright pixels.
    Calibration,

    /// Like `Calibration`, but the dark window reads
    /// `black - analog offset / 4 - digital offset` on the green channel,
    /// clamped to 0..=255.
    ClosedLoop { black: i32 },
}

pub fn pixel(line: usize, column: usize) -> u8 {
    ((line * 7 + column) % 251) as u8
}

pub fn calibration_pixel(column: usize) -> u8 {
    if column < 20 {
        0
    } else {
        200 + (column % 50) as u8
    }
}

#[derive(Debug)]
pub struct Inner {
    pub log: Vec<Access>,
    pub revision: u8,
    pub features: u8,
    pub status: Status,
    pub home_readings: std::collections::VecDeque<bool>,
    pub home_default: bool,
    pub lines: Lines,
    pub lines_read: usize,
    pub registers: [u8; 256],
    pga_magnitude: [u8; 3],
    pga_negative: [bool; 3],
    toggle: bool,
    pending_address: Option<u8>,
    serial_bits: Vec<u8>,
}

impl Inner {
    fn record_write(&mut self, address: u8, value: u8) {
        if address == write_address(asic::channel::ADDRESS) {
            self.pending_address = Some(value);
        } else if address == write_address(asic::channel::VALUE) {
            if let Some(register) = self.pending_address.take() {
                self.registers[register as usize] = value;
            }
        } else if address == write_address(asic::channel::SERIAL_DATA) {
            self.serial_bits.push(value);
            if self.serial_bits.len() == frontend::FRAME_BITS as usize {
                let frame = self
                    .serial_bits
                    .drain(..)
                    .fold(0u16, |frame, bit| (frame << 1) | bit as u16);
                self.record_frame((frame >> 8) as u8, (frame & 0xFF) as u8);
            }
        }
    }

    // PGA offset magnitude (0x20) and sign (0x24) frames, per channel field
    fn record_frame(&mut self, register: u8, value: u8) {
        let indices = match register & 0b11 {
            3 => 0..3,
            index => index as usize..index as usize + 1,
        };
        for index in indices {
            match register & !0b11 {
                0x20 => self.pga_magnitude[index] = value,
                0x24 => self.pga_negative[index] = value != 0,
                _ => (),
            }
        }
    }

    /// Last PGA offset programmed for a color index.
    pub fn pga_offset(&self, index: usize) -> i16 {
        let magnitude = self.pga_magnitude[index] as i16;
        if self.pga_negative[index] {
            -magnitude
        } else {
            magnitude
        }
    }

    pub fn black_level(&self, black: i32) -> u8 {
        let analog = self.pga_offset(1) as i32;
        let digital = self.registers[registers::slot::DIGITAL_OFFSET[1]] as i32;
        (black - analog / 4 - digital).clamp(0, 255) as u8
    }
}

#[derive(Debug, Clone)]
pub struct Stub(pub std::sync::Arc<std::sync::Mutex<Inner>>);

impl Stub {
    pub fn new() -> Self {
        Self(std::sync::Arc::new(std::sync::Mutex::new(Inner {
            log: Vec::new(),
            revision: 0xA2,
            features: 0x00,
            status: Status::Toggling,
            home_readings: std::collections::VecDeque::new(),
            home_default: true,
            lines: Lines::Pattern,
            lines_read: 0,
            registers: [0; 256],
            pga_magnitude: [0; 3],
            pga_negative: [false; 3],
            toggle: false,
            pending_address: None,
            serial_bits: Vec::new(),
        })))
    }

    pub fn with<Update>(self, update: Update) -> Self
    where
        Update: FnOnce(&mut Inner),
    {
        {
            let mut inner = self.0.lock().unwrap();
            update(&mut *inner);
        }
        self
    }

    pub fn log(&self) -> Vec<Access> {
        self.0.lock().unwrap().log.clone()
    }

    pub fn clear_log(&self) {
        self.0.lock().unwrap().log.clear();
    }

    pub fn log_len(&self) -> usize {
        self.0.lock().unwrap().log.len()
    }

    pub fn lines_read(&self) -> usize {
        self.0.lock().unwrap().lines_read
    }

    pub fn pga_offset(&self, channel: asic::Channel) -> i16 {
        self.0.lock().unwrap().pga_offset(channel.index().unwrap())
    }

    pub fn register(&self, address: usize) -> u8 {
        self.0.lock().unwrap().registers[address]
    }
}

pub fn write_address(channel: u8) -> u8 {
    channel | asic::channel::WRITE
}

pub fn read_address(channel: u8) -> u8 {
    channel | asic::channel::READ
}

/// (address, value) pairs of the register writes found in the log.
pub fn register_writes(log: &[Access]) -> Vec<(u8, u8)> {
    let address_channel = write_address(asic::channel::ADDRESS);
    let value_channel = write_address(asic::channel::VALUE);
    let mut result = Vec::new();
    let mut pending = None;
    for access in log {
        match access {
            Access::Write(channel, address) if *channel == address_channel => {
                pending = Some(*address)
            }
            Access::Write(channel, value) if *channel == value_channel => {
                if let Some(address) = pending.take() {
                    result.push((address, *value));
                }
            }
            _ => (),
        }
    }
    result
}

pub fn writes_to(log: &[Access], channel: u8) -> Vec<u8> {
    let address = write_address(channel);
    log.iter()
        .filter_map(|access| match access {
            Access::Write(target, value) if *target == address => Some(*value),
            _ => None,
        })
        .collect()
}

impl bus::Bus for Stub {
    fn write_byte(&mut self, address: u8, value: u8) -> Result<(), bus::Error> {
        let mut inner = self.0.lock().unwrap();
        inner.log.push(Access::Write(address, value));
        inner.record_write(address, value);
        Ok(())
    }

    fn read_byte(&mut self, address: u8) -> Result<u8, bus::Error> {
        let mut inner = self.0.lock().unwrap();
        inner.log.push(Access::Read(address));
        let value = if address == read_address(asic::channel::REVISION) {
            inner.revision
        } else if address == read_address(asic::channel::FEATURES) {
            inner.features
        } else if address == read_address(asic::channel::STATUS) {
            match inner.status {
                Status::Constant(status) => status,
                Status::Toggling => {
                    inner.toggle = !inner.toggle;
                    if inner.toggle {
                        0xFF
                    } else {
                        0x00
                    }
                }
            }
        } else if address == read_address(asic::channel::HOME_SENSOR) {
            let home = match inner.home_readings.pop_front() {
                Some(home) => home,
                None => inner.home_default,
            };
            home as u8
        } else {
            0
        };
        Ok(value)
    }

    fn read_block(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), bus::Error> {
        let mut inner = self.0.lock().unwrap();
        inner.log.push(Access::ReadBlock(address, buffer.len()));
        let line = inner.lines_read;
        for (column, value) in buffer.iter_mut().enumerate() {
            *value = match inner.lines {
                Lines::Pattern => pixel(line, column),
                Lines::Constant(constant) => constant,
                Lines::Calibration => calibration_pixel(column),
                Lines::ClosedLoop { black } if column < 20 => inner.black_level(black),
                Lines::ClosedLoop { .. } => calibration_pixel(column),
            };
        }
        inner.lines_read += 1;
        Ok(())
    }

    fn write_block(&mut self, address: u8, buffer: &[u8]) -> Result<(), bus::Error> {
        self.0
            .lock()
            .unwrap()
            .log
            .push(Access::WriteBlock(address, buffer.to_vec()));
        Ok(())
    }
}

pub fn asic(stub: &Stub) -> asic::Asic<Stub> {
    asic::Asic::new(stub.clone()).unwrap()
}
