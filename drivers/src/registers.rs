#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Register {
    pub address: u8,
    pub value: u8,
}

pub const SLOTS: usize = 64;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Revision(pub u8);

impl Revision {
    pub const LEGACY: Self = Self(0xA1);

    pub const SUPPORTED: Self = Self(0xA2);

    pub fn is_supported(self) -> bool {
        self == Self::SUPPORTED
    }

    pub fn layout(self) -> Layout {
        if self == Self::LEGACY {
            Layout::Striped
        } else {
            Layout::Direct
        }
    }

    pub fn black_level_slots(self) -> BlackLevelSlots {
        match self.0 {
            0xA2 | 0xA4 => BlackLevelSlots {
                odd_high: 51,
                odd_low: 50,
                even_high: 53,
                even_low: 52,
                state: 63,
            },
            _ => BlackLevelSlots {
                odd_high: 34,
                odd_low: 33,
                even_high: 20,
                even_low: 19,
                state: 21,
            },
        }
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{:#04x}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Layout {
    /// Sixteen rows of four registers at 0x10, 0x20, 0x40 and 0x80.
    Striped,

    /// Slot index and address are identical.
    Direct,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BlackLevelSlots {
    pub odd_high: usize,
    pub odd_low: usize,
    pub even_high: usize,
    pub even_low: usize,
    pub state: usize,
}

/// In-memory mirror of the ASIC registers, indexed by slot and by address.
///
/// The address index is built once from the layout. Values are only changed
/// through `set` (by slot) and `store` (by address), so both views always
/// describe the same registers.
#[derive(Debug, Clone)]
pub struct RegisterMap {
    layout: Layout,
    slots: [Register; SLOTS],
    by_address: [Option<u8>; 256],
}

impl RegisterMap {
    pub fn new(layout: Layout) -> Self {
        let mut slots = [Register {
            address: 0,
            value: 0,
        }; SLOTS];
        match layout {
            Layout::Striped => {
                for row in 0..0x10u8 {
                    for (column, base) in [0x10u8, 0x20, 0x40, 0x80].into_iter().enumerate() {
                        slots[row as usize * 4 + column].address = base + row;
                    }
                }
            }
            Layout::Direct => {
                for (index, register) in slots.iter_mut().enumerate() {
                    register.address = index as u8;
                }
            }
        }
        let mut by_address = [None; 256];
        for (index, register) in slots.iter().enumerate() {
            if by_address[register.address as usize].is_none() {
                by_address[register.address as usize] = Some(index as u8);
            }
        }
        Self {
            layout,
            slots,
            by_address,
        }
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn get(&self, slot: usize) -> Register {
        self.slots[slot]
    }

    pub fn value(&self, slot: usize) -> u8 {
        self.slots[slot].value
    }

    pub fn slot_of(&self, address: u8) -> Option<usize> {
        self.by_address[address as usize].map(|slot| slot as usize)
    }

    pub fn set(&mut self, slot: usize, value: u8) {
        self.slots[slot].value = value;
    }

    /// Returns the updated slot, or `None` if no slot maps to the address.
    pub fn store(&mut self, address: u8, value: u8) -> Option<usize> {
        let slot = self.slot_of(address)?;
        self.slots[slot].value = value;
        Some(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Register> {
        self.slots.iter()
    }
}

pub mod slot {
    pub const FIFO_CONTROL: usize = 1;
    pub const EXPOSURE: [(usize, usize); 3] = [(6, 7), (8, 9), (10, 11)];
    pub const LED: usize = 12;
    pub const TEXT_THRESHOLD: usize = 13;
    pub const CLOCK: usize = 14;
    pub const CONTROL: usize = 16;
    pub const MOTOR: usize = 17;
    pub const BYTE_COUNT_LOW: usize = 22;
    pub const BYTE_COUNT_HIGH: usize = 23;
    pub const SPEED_COUNTER_LOW: usize = 24;
    pub const SPEED_COUNTER_HIGH: usize = 25;
    pub const CHANNEL_ENABLE: usize = 26;
    pub const DIGITAL_OFFSET: [usize; 3] = [42, 43, 44];
    pub const ADC: usize = 49;
    pub const UPPER_MEMORY_LIMIT: [usize; 3] = [56, 57, 58];
    pub const LOWER_MEMORY_LIMIT: [usize; 3] = [59, 60, 61];
}

pub mod bits {
    pub const FIFO_RESET: u8 = 0x80;
    pub const LED_BLINK: u8 = 0x03;
    pub const LAMP_OFF: u8 = 0x02;
    pub const DATA_REQUEST: u8 = 0x04;
    pub const DMA: u8 = 0x08;
    pub const CCD_MODE: u8 = 0x10;
    pub const TEXT_MODE: u8 = 0x40;
    pub const CALIBRATION: u8 = 0x80;
    pub const MOTOR_ENABLE: u8 = 0x01;
    pub const SPEED_ENABLE: u8 = 0x02;
    pub const MOTOR_BACKWARD: u8 = 0x04;
    pub const SYNC_ENABLE: u8 = 0x08;
    pub const ADC_TEN_BITS: u8 = 0x80;
    pub const SERIAL_CLOCK: u8 = 0x40;
    pub const AD_FREQUENCY_9_MHZ: u8 = 0x02;
}

pub mod features {
    pub const FRONT_END: u8 = 0x18;
    pub const WM8142: u8 = 0x10;
    pub const TWELVE_BITS: u8 = 0x04;
    pub const ANALOG_PATH: u8 = 0x03;
}

/// Literal value forced into the clock slot once the baseline is applied.
pub const CLOCK_VALUE: u8 = 49;

pub const BASELINE: [(u8, u8); 37] = [
    (0x28, 0x00),
    (0x00, 0x50),
    (0x01, 0x28),
    (0x02, 0x05),
    (0x03, 0x18),
    (0x04, 0x20),
    (0x05, 0x31),
    (0x06, 0x10),
    (0x07, 0x27),
    (0x08, 0x10),
    (0x09, 0x27),
    (0x0A, 0x10),
    (0x0B, 0x27),
    (0x0C, 0x02),
    (0x0D, 0x90),
    (0x0E, 0x40),
    (0x10, 0x00),
    (0x11, 0x00),
    (0x12, 0x00),
    (0x16, 0x01),
    (0x17, 0x2C),
    (0x18, 0xF4),
    (0x19, 0x00),
    (0x1A, 0x05),
    (0x27, 0x00),
    (0x2A, 0x00),
    (0x2B, 0x00),
    (0x2C, 0x00),
    (0x2D, 0x00),
    (0x2E, 0x00),
    (0x2F, 0x00),
    (0x30, 0x00),
    (0x31, 0x00),
    (0x36, 0x04),
    (0x37, 0x0A),
    (0x3E, 0x04),
    (0x28, 0x01),
];

pub const FRONT_END_WM8142: [(u8, u8); 4] = [(0x01, 0x17), (0x02, 0x44), (0x36, 0x00), (0x37, 0x08)];

pub const FRONT_END_WM8144: [(u8, u8); 4] = [(0x01, 0x17), (0x02, 0x04), (0x36, 0x00), (0x37, 0x08)];

pub const ANALOG_PATH_WM8142: [(u8, u8); 3] = [(0x28, 0x00), (0x00, 0x5B), (0x28, 0x01)];

pub const ANALOG_PATH_DEFAULT: [(u8, u8); 3] = [(0x28, 0x00), (0x00, 0x10), (0x28, 0x01)];
