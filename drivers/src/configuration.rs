use crate::asic;

#[derive(Debug, Copy, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Length {
    Lines(u32),

    /// Converted to lines at the configured resolution.
    Centimeters(f64),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Configuration {
    pub resolution: u16,
    pub length: Length,
    pub channel: asic::Channel,

    /// Calibrates `calibration_channels` before acquiring.
    pub calibrate: bool,
    pub calibration_channels: std::borrow::Cow<'static, [asic::Channel]>,

    /// Rescales every line with the per-pixel gains of the last calibration.
    pub apply_calibration: bool,
    pub home: bool,
    pub move_to_start: bool,
    pub move_while_scanning: bool,

    /// Capacity of the output stream, in output lines.
    pub stream_lines: usize,
}

impl Configuration {
    pub fn deserialize_bincode(data: &[u8]) -> bincode::Result<Configuration> {
        bincode::deserialize(data)
    }

    pub fn serialize_bincode(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(self)
    }

    pub fn lines(&self, number_of_lines: impl Fn(f64) -> u32) -> u32 {
        match self.length {
            Length::Lines(lines) => lines,
            Length::Centimeters(centimeters) => number_of_lines(centimeters),
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        crate::properties::PROPERTIES.default_configuration
    }
}
