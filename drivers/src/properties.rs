use crate::asic;
use crate::configuration;
use crate::scanner;

#[derive(Debug, serde::Serialize)]
pub struct Scanner<Configuration> {
    pub name: &'static str,
    pub vendor: &'static str,
    pub native_width: usize,
    pub resolutions: [u16; 6],
    pub default_configuration: Configuration,
}

pub const PROPERTIES: Scanner<configuration::Configuration> = Scanner {
    name: "ScanExpress 12000P",
    vendor: "Mustek",
    native_width: scanner::NATIVE_WIDTH,
    resolutions: [600, 300, 200, 100, 50, 5],
    default_configuration: configuration::Configuration {
        resolution: 300,
        length: configuration::Length::Centimeters(29.7),
        channel: asic::Channel::Green,
        calibrate: true,
        calibration_channels: std::borrow::Cow::Borrowed(&[asic::Channel::Green]),
        apply_calibration: true,
        home: true,
        move_to_start: true,
        move_while_scanning: true,
        stream_lines: 64,
    },
};
