use crate::asic;
use crate::bus;

pub const FRAME_BITS: u32 = 14;

const REGISTER_MASK: u8 = 0x2F;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OperationalMode {
    Color,
    Monochrome,
}

// (register, value) sequences, see the WM8144 datasheet for the field names
const COLOR: [(u8, u8); 6] = [
    (0x01, 0x1B), // ENADC, CDS, DEFPG, DEFPO
    (0x02, 0x04), // INVOP
    (0x03, 0xE2), // RLC = 2 (3.5 V clamp), CHAN = 3, CDSREF = 2
    (0x05, 0x10), // MODE12
    (0x2B, 0x02), // all PGA gains = 2
    (0x27, 0x00), // positive DAC sign
];

const MONOCHROME: [(u8, u8); 6] = [
    (0x01, 0x1F), // ENADC, CDS, DEFPG, DEFPO, MONO
    (0x02, 0x04), // INVOP
    (0x03, 0x62), // RLC = 2 (3.5 V clamp), CHAN = 1 (green), CDSREF = 2
    (0x05, 0x10), // MODE12
    (0x2B, 0x02), // all PGA gains = 2
    (0x27, 0x00), // positive DAC sign
];

mod register {
    pub const PGA_OFFSET: u8 = 0b100000;
    pub const PGA_OFFSET_SIGN: u8 = 0b100100;
    pub const PGA_GAIN: u8 = 0b101000;
    pub const PIXEL_OFFSET: u8 = 0b101100;
    pub const PIXEL_GAIN_HIGH: u8 = 0b110000;
    pub const PIXEL_GAIN_LOW: u8 = 0b110100;
}

pub fn field(channel: asic::Channel) -> u8 {
    match channel {
        asic::Channel::Red => 0,
        asic::Channel::Green => 1,
        asic::Channel::Blue => 2,
        asic::Channel::All => 3,
    }
}

/// Packs a front-end command into the 14-bit serial frame, sent MSB first.
pub fn frame(register: u8, value: u8) -> u16 {
    (((register & REGISTER_MASK) as u16) << 8) | value as u16
}

pub struct Wm8144<'a, B: bus::Bus> {
    asic: &'a mut asic::Asic<B>,
}

impl<'a, B: bus::Bus> Wm8144<'a, B> {
    pub fn new(asic: &'a mut asic::Asic<B>) -> Self {
        Self { asic }
    }

    pub fn write_register(&mut self, register: u8, value: u8) -> Result<(), asic::Error> {
        self.asic.enable_serial_interface()?;
        let frame = frame(register, value);
        for bit in (0..FRAME_BITS).rev() {
            self.asic.write_serial_bit(((frame >> bit) & 1) == 1)?;
        }
        log::trace!("front-end {register:#04x} <- {value:#04x}");
        self.asic.send_serial_clock()
    }

    fn write_all(&mut self, sequence: &[(u8, u8)]) -> Result<(), asic::Error> {
        for &(register, value) in sequence {
            self.write_register(register, value)?;
        }
        Ok(())
    }

    pub fn set_operational_mode(&mut self, mode: OperationalMode) -> Result<(), asic::Error> {
        match mode {
            OperationalMode::Color => self.write_all(&COLOR),
            OperationalMode::Monochrome => self.write_all(&MONOCHROME),
        }
    }

    pub fn set_pga_gain(&mut self, channel: asic::Channel, gain: u8) -> Result<(), asic::Error> {
        self.write_register(register::PGA_GAIN | field(channel), gain & 0x1F)
    }

    /// A zero or negative offset sets the sign register.
    pub fn set_pga_offset(
        &mut self,
        channel: asic::Channel,
        offset: i16,
    ) -> Result<(), asic::Error> {
        self.write_register(
            register::PGA_OFFSET | field(channel),
            (offset.unsigned_abs() & 0xFF) as u8,
        )?;
        self.write_register(
            register::PGA_OFFSET_SIGN | field(channel),
            if offset > 0 { 0 } else { 1 },
        )
    }

    pub fn set_pixel_offset(
        &mut self,
        channel: asic::Channel,
        offset: u8,
    ) -> Result<(), asic::Error> {
        self.write_register(register::PIXEL_OFFSET | field(channel), offset & 0x3F)
    }

    pub fn set_pixel_gain(&mut self, channel: asic::Channel, gain: u16) -> Result<(), asic::Error> {
        self.write_register(
            register::PIXEL_GAIN_HIGH | field(channel),
            ((gain >> 4) & 0xFF) as u8,
        )?;
        self.write_register(register::PIXEL_GAIN_LOW | field(channel), (gain & 0x0F) as u8)
    }
}
