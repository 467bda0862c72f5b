use crate::bus;
use crate::frontend;
use crate::registers;
use crate::registers::bits;
use crate::registers::features;
use crate::registers::slot;

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error(transparent)]
    Bus(#[from] bus::Error),

    #[error("unsupported ASIC revision {0} (expected {})", registers::Revision::SUPPORTED)]
    Revision(registers::Revision),

    #[error("{operation} requires a single color channel (got {channel:?})")]
    Channel {
        operation: &'static str,
        channel: Channel,
    },

    #[error("{operation} timed out after {budget:?} waiting for {expected} (last status {observed:#04x})")]
    Timeout {
        operation: &'static str,
        expected: &'static str,
        observed: u8,
        budget: std::time::Duration,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Channel {
    Red,
    Green,
    Blue,
    All,
}

impl Channel {
    pub const COLORS: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];

    pub fn index(self) -> Option<usize> {
        match self {
            Channel::Red => Some(0),
            Channel::Green => Some(1),
            Channel::Blue => Some(2),
            Channel::All => None,
        }
    }

    pub(crate) fn color_index(self, operation: &'static str) -> Result<usize, Error> {
        self.index().ok_or(Error::Channel {
            operation,
            channel: self,
        })
    }

    fn enable_mask(self) -> u8 {
        match self {
            Channel::Red => 0b100,
            Channel::Green => 0b010,
            Channel::Blue => 0b001,
            Channel::All => 0b111,
        }
    }

    fn select_mask(self) -> u8 {
        match self {
            Channel::Red => 0x02,
            Channel::Green => 0x04,
            Channel::Blue => 0x08,
            Channel::All => 0x0E,
        }
    }

    pub(crate) fn transfer_mask(self) -> Option<u8> {
        match self {
            Channel::Red => Some(0x40),
            Channel::Green => Some(0x20),
            Channel::Blue => Some(0x10),
            Channel::All => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AdcBitDepth {
    TwelveBits,
    TenBits,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

pub mod channel {
    pub const SERIAL_CONTROL: u8 = 0;
    pub const SERIAL_ENABLE: u8 = 1;
    pub const SERIAL_DATA: u8 = 2;
    pub const MOTOR: u8 = 4;
    pub const VALUE: u8 = 5;
    pub const ADDRESS: u8 = 6;

    pub const REVISION: u8 = 0;
    pub const FEATURES: u8 = 1;
    pub const ACQUISITION: u8 = 4;
    pub const STATUS: u8 = 6;
    pub const HOME_SENSOR: u8 = 7;

    pub const WRITE: u8 = 0x10;
    pub const READ: u8 = 0x98;
}

const SERIAL_ENABLE_VALUE: u8 = 0x34;
const MOTOR_MOVE: u8 = 0x01;
const HOME_SENSOR_MASK: u8 = 0x01;

pub fn detect_revision<B: bus::Bus + ?Sized>(bus: &mut B) -> Result<registers::Revision, Error> {
    let revision = registers::Revision(bus.read_byte(channel::REVISION | channel::READ)?);
    log::info!("ASIC revision {revision}");
    if revision.is_supported() {
        Ok(revision)
    } else {
        Err(Error::Revision(revision))
    }
}

macro_rules! flags {
    ($slot:expr => {$($name:ident: $mask:expr),+ $(,)?}) => {
        paste::paste! {
            $(
                pub fn [<set_ $name>](&mut self, enabled: bool) -> Result<(), Error> {
                    self.update_slot($slot, |value| {
                        if enabled {
                            value | $mask
                        } else {
                            value & !$mask
                        }
                    })
                }
            )+
        }
    };
}

pub struct Asic<B: bus::Bus> {
    bus: B,
    revision: registers::Revision,
    registers: registers::RegisterMap,
    features: u8,
    depth: AdcBitDepth,
    serial_enabled: bool,
}

impl<B: bus::Bus> Asic<B> {
    pub fn new(mut bus: B) -> Result<Self, Error> {
        let revision = detect_revision(&mut bus)?;
        let mut asic = Self {
            bus,
            revision,
            registers: registers::RegisterMap::new(revision.layout()),
            features: 0,
            depth: AdcBitDepth::TenBits,
            serial_enabled: false,
        };
        asic.upload_configuration()?;
        Ok(asic)
    }

    pub fn revision(&self) -> registers::Revision {
        self.revision
    }

    pub fn features(&self) -> u8 {
        self.features
    }

    pub fn adc_bit_depth(&self) -> AdcBitDepth {
        self.depth
    }

    pub fn registers(&self) -> &registers::RegisterMap {
        &self.registers
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn front_end(&mut self) -> frontend::Wm8144<'_, B> {
        frontend::Wm8144::new(self)
    }

    pub(crate) fn write_channel(&mut self, channel: u8, value: u8) -> Result<(), Error> {
        Ok(self.bus.write_byte(channel | channel::WRITE, value)?)
    }

    pub(crate) fn read_channel(&mut self, channel: u8) -> Result<u8, Error> {
        Ok(self.bus.read_byte(channel | channel::READ)?)
    }

    pub fn write_register(&mut self, address: u8, value: u8) -> Result<(), Error> {
        self.write_channel(channel::ADDRESS, address)?;
        self.write_channel(channel::VALUE, value)?;
        log::trace!("register {address:#04x} <- {value:#04x}");
        self.registers.store(address, value);
        Ok(())
    }

    pub fn apply_register_set(&mut self, pairs: &[(u8, u8)]) -> Result<(), Error> {
        for &(address, value) in pairs {
            self.write_register(address, value)?;
        }
        Ok(())
    }

    fn write_slot(&mut self, slot: usize) -> Result<(), Error> {
        let register = self.registers.get(slot);
        self.write_register(register.address, register.value)
    }

    fn update_slot<Update>(&mut self, slot: usize, update: Update) -> Result<(), Error>
    where
        Update: FnOnce(u8) -> u8,
    {
        self.registers.set(slot, update(self.registers.value(slot)));
        self.write_slot(slot)
    }

    fn write_bytes(&mut self, slots: &[usize], bytes: &[u8]) -> Result<(), Error> {
        for (&slot, &byte) in slots.iter().zip(bytes) {
            self.registers.set(slot, byte);
        }
        for &slot in slots {
            self.write_slot(slot)?;
        }
        Ok(())
    }

    pub fn upload_configuration(&mut self) -> Result<(), Error> {
        if !self.revision.is_supported() {
            return Err(Error::Revision(self.revision));
        }
        self.apply_register_set(&registers::BASELINE)?;
        self.update_slot(slot::CLOCK, |_| registers::CLOCK_VALUE)?;
        self.features = self.read_channel(channel::FEATURES)?;
        log::info!("hardware features {:#04x}", self.features);
        let wm8142 = (self.features & features::WM8142) != 0;
        if (self.features & features::FRONT_END) != 0 {
            if wm8142 {
                self.apply_register_set(&registers::FRONT_END_WM8142)?;
            } else {
                self.apply_register_set(&registers::FRONT_END_WM8144)?;
            }
        }
        match self.features & features::ANALOG_PATH {
            0b00 => {
                if wm8142 {
                    self.apply_register_set(&registers::ANALOG_PATH_WM8142)?;
                } else {
                    self.apply_register_set(&registers::ANALOG_PATH_DEFAULT)?;
                }
            }
            0b10 => self.apply_register_set(&registers::ANALOG_PATH_WM8142)?,
            _ => (),
        }
        self.set_adc_bit_depth(if (self.features & features::TWELVE_BITS) != 0 {
            AdcBitDepth::TwelveBits
        } else {
            AdcBitDepth::TenBits
        })?;
        self.set_led_blink(false)
    }

    pub fn set_lower_memory_limit(&mut self, limit: u32) -> Result<(), Error> {
        let [byte0, byte1, byte2, _] = limit.to_le_bytes();
        self.write_bytes(&slot::LOWER_MEMORY_LIMIT, &[byte0, byte1, byte2])
    }

    pub fn set_upper_memory_limit(&mut self, limit: u32) -> Result<(), Error> {
        let [byte0, byte1, byte2, _] = limit.to_le_bytes();
        self.write_bytes(&slot::UPPER_MEMORY_LIMIT, &[byte0, byte1, byte2])
    }

    pub fn set_adc_bit_depth(&mut self, depth: AdcBitDepth) -> Result<(), Error> {
        self.depth = depth;
        self.update_slot(slot::ADC, |value| match depth {
            AdcBitDepth::TwelveBits => value & !bits::ADC_TEN_BITS,
            AdcBitDepth::TenBits => value | bits::ADC_TEN_BITS,
        })
    }

    pub fn set_text_threshold(&mut self, threshold: u8) -> Result<(), Error> {
        self.update_slot(slot::TEXT_THRESHOLD, |_| threshold)
    }

    // the lamp input is low-active
    pub fn set_lamp(&mut self, enabled: bool) -> Result<(), Error> {
        self.update_slot(slot::CONTROL, |value| {
            if enabled {
                value & !bits::LAMP_OFF
            } else {
                value | bits::LAMP_OFF
            }
        })
    }

    flags! { slot::CONTROL => {
        data_request: bits::DATA_REQUEST,
        dma: bits::DMA,
        ccd_mode: bits::CCD_MODE,
        text_mode: bits::TEXT_MODE,
        calibration: bits::CALIBRATION,
    } }

    flags! { slot::MOTOR => {
        motor: bits::MOTOR_ENABLE,
        speed: bits::SPEED_ENABLE,
        sync: bits::SYNC_ENABLE,
    } }

    pub fn set_direction(&mut self, direction: Direction) -> Result<(), Error> {
        self.update_slot(slot::MOTOR, |value| match direction {
            Direction::Forward => value & !bits::MOTOR_BACKWARD,
            Direction::Backward => value | bits::MOTOR_BACKWARD,
        })
    }

    pub fn set_black_level(&mut self, odd: u16, even: u16, state: u8) -> Result<(), Error> {
        let slots = self.revision.black_level_slots();
        let [odd_low, odd_high] = odd.to_le_bytes();
        let [even_low, even_high] = even.to_le_bytes();
        self.write_bytes(
            &[
                slots.odd_high,
                slots.odd_low,
                slots.even_high,
                slots.even_low,
                slots.state,
            ],
            &[odd_high, odd_low, even_high, even_low, state],
        )
    }

    pub fn set_byte_count(&mut self, byte_count: u16) -> Result<(), Error> {
        let [low, high] = byte_count.to_le_bytes();
        self.write_bytes(&[slot::BYTE_COUNT_LOW, slot::BYTE_COUNT_HIGH], &[low, high])
    }

    pub fn reset_fifo(&mut self) -> Result<(), Error> {
        self.update_slot(slot::FIFO_CONTROL, |value| value | bits::FIFO_RESET)?;
        self.update_slot(slot::FIFO_CONTROL, |value| value & !bits::FIFO_RESET)
    }

    pub fn set_speed_counter(&mut self, counter: u16) -> Result<(), Error> {
        let [low, high] = counter.to_le_bytes();
        self.write_bytes(
            &[slot::SPEED_COUNTER_HIGH, slot::SPEED_COUNTER_LOW],
            &[high, low],
        )
    }

    pub fn set_exposure_level(&mut self, level: u16) -> Result<(), Error> {
        let [low, high] = level.to_le_bytes();
        for (low_slot, high_slot) in slot::EXPOSURE {
            self.write_bytes(&[low_slot, high_slot], &[low, high])?;
        }
        Ok(())
    }

    pub fn exposure_level(&self) -> u16 {
        let (low_slot, high_slot) = slot::EXPOSURE[0];
        u16::from_le_bytes([
            self.registers.value(low_slot),
            self.registers.value(high_slot),
        ])
    }

    pub fn set_digital_offset(&mut self, channel: Channel, offset: u8) -> Result<(), Error> {
        let index = channel.color_index("digital offset")?;
        self.update_slot(slot::DIGITAL_OFFSET[index], |_| offset)
    }

    // a set bit disables the channel
    pub fn enable_channel(&mut self, channel: Channel) -> Result<(), Error> {
        self.update_slot(slot::CHANNEL_ENABLE, |_| !channel.enable_mask() & 0b111)
    }

    pub fn select_ad_frequency(&mut self, nine_mhz: bool) -> Result<(), Error> {
        self.update_slot(slot::ADC, |value| {
            if nine_mhz {
                value | bits::AD_FREQUENCY_9_MHZ
            } else {
                value & !bits::AD_FREQUENCY_9_MHZ
            }
        })
    }

    pub fn set_led_blink(&mut self, six_hz: bool) -> Result<(), Error> {
        self.update_slot(slot::LED, |value| {
            if six_hz {
                value | bits::LED_BLINK
            } else {
                value & !bits::LED_BLINK
            }
        })
    }

    /// Pulses the serial clock bit, latching the shifted front-end frame.
    pub fn send_serial_clock(&mut self) -> Result<(), Error> {
        self.update_slot(slot::ADC, |value| value | bits::SERIAL_CLOCK)?;
        self.update_slot(slot::ADC, |value| value & !bits::SERIAL_CLOCK)
    }

    pub(crate) fn enable_serial_interface(&mut self) -> Result<(), Error> {
        if !self.serial_enabled {
            self.write_channel(channel::SERIAL_CONTROL, 0x00)?;
            self.write_channel(channel::SERIAL_ENABLE, SERIAL_ENABLE_VALUE)?;
            self.serial_enabled = true;
        }
        Ok(())
    }

    pub(crate) fn write_serial_bit(&mut self, bit: bool) -> Result<(), Error> {
        self.write_channel(channel::SERIAL_DATA, bit as u8)
    }

    pub fn set_move(&mut self, enabled: bool) -> Result<(), Error> {
        self.write_channel(channel::MOTOR, if enabled { MOTOR_MOVE } else { 0 })
    }

    /// Requests one line of the given channel from the CCD into the FIFO.
    pub fn send_channel_data(&mut self, channel: Channel) -> Result<(), Error> {
        self.write_channel(channel::MOTOR, channel.select_mask())
    }

    pub fn is_at_home_position(&mut self) -> Result<bool, Error> {
        Ok((self.read_channel(channel::HOME_SENSOR)? & HOME_SENSOR_MASK) != 0)
    }

    pub fn acquire_line(&mut self, buffer: &mut [u8]) -> Result<(), Error> {
        Ok(self
            .bus
            .read_block(channel::ACQUISITION | channel::READ, buffer)?)
    }
}
