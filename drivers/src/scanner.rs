use crate::asic;
use crate::bus;
use crate::frontend;
use crate::stream;

pub const NATIVE_WIDTH: usize = 5300;

/// Lines transferred into the ASIC FIFO before they are drained.
pub const BATCH_LINES: u32 = 20;

pub const RESOLUTIONS: [(u16, usize); 6] = [(600, 1), (300, 2), (200, 3), (100, 6), (50, 12), (5, 120)];

const NATIVE_RESOLUTION: u16 = 600;
const BASE_SPEED: u16 = 32500;
const HOME_EXPOSURE: u16 = 10000;
const HOME_SPEED: u16 = 5000;
const FORWARD_PULSES: usize = 15;
const BACKWARD_PULSES: usize = 5;
const MAXIMUM_SEEK_STEPS: usize = 2000;
const START_SPEED: u16 = 8125;
const START_STEPS: usize = 64;
const LOWER_MEMORY_LIMIT: u32 = 100;

const DEFAULT_PGA_GAIN: u8 = 2;
const DEFAULT_PGA_OFFSET: i16 = 127;
const DEFAULT_PIXEL_GAIN: u16 = 2000;
const MAXIMUM_PGA_GAIN: u8 = 0x1F;
const INITIAL_DIGITAL_OFFSET: u8 = 4;
const DIGITAL_OFFSET_STEP: u8 = 4;
const MAXIMUM_DIGITAL_OFFSET: u8 = 252;

const BLACK_WINDOW: std::ops::Range<usize> = 0..20;
const BLACK_THRESHOLD: u32 = 10;
const BRIGHT_WINDOW: std::ops::Range<usize> = 1000..1200;
const BRIGHT_TARGET: u32 = 216 * 200;
const NONUNIFORMITY_LINES: usize = 4;
pub const MAXIMUM_PIXEL_GAIN: f64 = 2.0;

#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum State {
    Idle,
    Homing,
    Configuring,
    Calibrating,
    Positioning,
    Acquiring,
    Draining,
    Failed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Kind {
    Configuration,
    Timeout,
    Transport,
    Calibration,
    Stream,
    Busy,
    Worker,
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error(transparent)]
    Asic(#[from] asic::Error),

    #[error("resolution {0} dpi is not supported")]
    Resolution(u16),

    #[error("{phase} home seek did not reach the sensor after {steps} steps")]
    Seek { phase: &'static str, steps: usize },

    #[error("{operation} did not converge on {channel:?} (stopped at {value})")]
    Calibration {
        operation: &'static str,
        channel: asic::Channel,
        value: u32,
    },

    #[error(transparent)]
    Stream(#[from] stream::Error),
}

impl Error {
    pub fn kind(&self) -> Kind {
        match self {
            Error::Asic(asic::Error::Bus(_)) => Kind::Transport,
            Error::Asic(asic::Error::Timeout { .. }) | Error::Seek { .. } => Kind::Timeout,
            Error::Asic(asic::Error::Revision(_))
            | Error::Asic(asic::Error::Channel { .. })
            | Error::Resolution(_) => Kind::Configuration,
            Error::Calibration { .. } => Kind::Calibration,
            Error::Stream(_) => Kind::Stream,
        }
    }
}

/// Receives native-width lines from `Scanner::scan_lines_gray`.
///
/// Calibrated lines hold the rescaled pixels in their first
/// `Scanner::image_width` bytes.
pub trait Output {
    fn write_line(&mut self, line: &[u8]) -> Result<(), Error>;

    fn transition(&mut self, _state: State) {}
}

impl Output for Vec<u8> {
    fn write_line(&mut self, line: &[u8]) -> Result<(), Error> {
        self.extend_from_slice(line);
        Ok(())
    }
}

pub fn multiplier_for(dpi: u16) -> Option<usize> {
    RESOLUTIONS
        .iter()
        .find(|(resolution, _)| *resolution == dpi)
        .map(|(_, multiplier)| *multiplier)
}

pub fn black_total(line: &[u8]) -> u32 {
    line[BLACK_WINDOW].iter().map(|value| *value as u32).sum()
}

pub fn bright_sum(line: &[u8]) -> u32 {
    line[BRIGHT_WINDOW].iter().map(|value| *value as u32).sum()
}

/// Per-column gains bringing each column maximum to 255, at most `MAXIMUM_PIXEL_GAIN`.
pub fn pixel_gains(maxima: &[u8]) -> Vec<f64> {
    maxima
        .iter()
        .map(|maximum| (255.0 / (*maximum).max(1) as f64).min(MAXIMUM_PIXEL_GAIN))
        .collect()
}

pub struct Scanner<B: bus::Bus> {
    asic: asic::Asic<B>,
    multiplier: usize,
    motor_speed: u16,
    per_pixel_gain: [Vec<f64>; 3],
}

impl<B: bus::Bus> Scanner<B> {
    pub fn new(asic: asic::Asic<B>) -> Result<Self, Error> {
        let mut scanner = Self {
            asic,
            multiplier: 2,
            motor_speed: BASE_SPEED / 2,
            per_pixel_gain: [
                vec![1.0; NATIVE_WIDTH],
                vec![1.0; NATIVE_WIDTH],
                vec![1.0; NATIVE_WIDTH],
            ],
        };
        scanner.initial_setup()?;
        scanner.setup_resolution(300)?;
        Ok(scanner)
    }

    pub fn asic(&self) -> &asic::Asic<B> {
        &self.asic
    }

    pub fn asic_mut(&mut self) -> &mut asic::Asic<B> {
        &mut self.asic
    }

    fn reset_front_end(&mut self) -> Result<(), asic::Error> {
        let mut front_end = self.asic.front_end();
        front_end.set_pga_gain(asic::Channel::All, DEFAULT_PGA_GAIN)?;
        front_end.set_pga_offset(asic::Channel::All, DEFAULT_PGA_OFFSET)?;
        front_end.set_pixel_gain(asic::Channel::All, DEFAULT_PIXEL_GAIN)?;
        front_end.set_pixel_offset(asic::Channel::All, 0)
    }

    fn initial_setup(&mut self) -> Result<(), Error> {
        self.asic.set_ccd_mode(false)?;
        self.asic.set_dma(false)?;
        self.asic.set_sync(true)?;
        self.asic.reset_fifo()?;
        self.asic
            .front_end()
            .set_operational_mode(frontend::OperationalMode::Monochrome)?;
        self.reset_front_end()?;
        self.asic.enable_channel(asic::Channel::All)?;
        self.asic.select_ad_frequency(false)?;
        self.asic.set_byte_count(NATIVE_WIDTH as u16)?;
        self.asic.set_lower_memory_limit(LOWER_MEMORY_LIMIT)?;
        self.asic
            .set_upper_memory_limit(BATCH_LINES * NATIVE_WIDTH as u32)?;
        self.asic.set_exposure_level(HOME_EXPOSURE)?;
        Ok(())
    }

    fn step(&mut self, pulses: usize) -> Result<(), Error> {
        for _ in 0..pulses {
            self.asic.wait_for_clock_change()?;
            self.asic.set_move(true)?;
        }
        Ok(())
    }

    /// Leaves the home sensor forwards, then returns backwards until it triggers again.
    pub fn goto_home_position(&mut self) -> Result<(), Error> {
        self.asic.set_exposure_level(HOME_EXPOSURE)?;
        self.asic.set_speed_counter(HOME_SPEED)?;
        self.asic.set_direction(asic::Direction::Forward)?;
        self.asic.set_motor(true)?;
        self.asic.set_speed(true)?;
        self.asic.wait_for_clock_change()?;
        let mut steps = 0;
        while self.asic.is_at_home_position()? {
            if steps == MAXIMUM_SEEK_STEPS {
                return Err(Error::Seek {
                    phase: "forward",
                    steps,
                });
            }
            self.step(FORWARD_PULSES)?;
            steps += 1;
        }
        self.asic.set_move(false)?;
        self.asic.set_speed(false)?;
        self.asic.set_direction(asic::Direction::Backward)?;
        self.asic.set_motor(true)?;
        self.asic.set_speed(true)?;
        steps = 0;
        while !self.asic.is_at_home_position()? {
            if steps == MAXIMUM_SEEK_STEPS {
                return Err(Error::Seek {
                    phase: "backward",
                    steps,
                });
            }
            self.step(BACKWARD_PULSES)?;
            steps += 1;
        }
        self.asic.set_direction(asic::Direction::Forward)?;
        Ok(())
    }

    pub fn move_to_start_position(&mut self) -> Result<(), Error> {
        self.asic.set_speed_counter(START_SPEED)?;
        self.asic.set_direction(asic::Direction::Forward)?;
        self.step(START_STEPS)
    }

    pub fn setup_resolution(&mut self, dpi: u16) -> Result<(), Error> {
        let multiplier = multiplier_for(dpi).ok_or(Error::Resolution(dpi))?;
        self.multiplier = multiplier;
        self.motor_speed = BASE_SPEED / multiplier as u16;
        Ok(())
    }

    pub fn resolution(&self) -> u16 {
        NATIVE_RESOLUTION / self.multiplier as u16
    }

    pub fn multiplier(&self) -> usize {
        self.multiplier
    }

    pub fn motor_speed(&self) -> u16 {
        self.motor_speed
    }

    pub fn image_width(&self) -> usize {
        NATIVE_WIDTH / self.multiplier
    }

    pub fn number_of_lines(&self, centimeters: f64) -> u32 {
        (NATIVE_RESOLUTION as f64 * centimeters / 2.54 / self.multiplier as f64) as u32
    }

    pub fn per_pixel_gain(&self, channel: asic::Channel) -> Option<&[f64]> {
        channel
            .index()
            .map(|index| self.per_pixel_gain[index].as_slice())
    }

    fn sample_line(&mut self, channel: asic::Channel) -> Result<Vec<u8>, Error> {
        let mut line = Vec::with_capacity(NATIVE_WIDTH);
        self.scan_lines_gray(channel, 1, false, false, &mut line)?;
        Ok(line)
    }

    pub fn calibrate(&mut self, channels: &[asic::Channel]) -> Result<(), Error> {
        self.reset_front_end()?;
        self.asic.set_calibration(true)?;
        for channel in channels {
            self.adjust_offset(*channel)?;
            self.adjust_analog_gain(*channel)?;
            self.adjust_offset(*channel)?;
        }
        for channel in channels {
            self.compensate_pixel_nonuniformity(*channel)?;
        }
        self.asic.set_calibration(false)?;
        Ok(())
    }

    /// Searches the analog offset bit by bit, from the most significant bit.
    ///
    /// A candidate is kept when the black reference sum of its sample line is
    /// above the threshold. The front end is left programmed with the result.
    pub fn adjust_analog_offset(&mut self, channel: asic::Channel) -> Result<u8, Error> {
        let mut offset = 0u8;
        let mut minimum = u32::MAX;
        for bit in (0..8).rev() {
            let candidate = offset | (1 << bit);
            self.asic
                .front_end()
                .set_pga_offset(channel, candidate as i16)?;
            let total = black_total(&self.sample_line(channel)?);
            if total > BLACK_THRESHOLD {
                offset = candidate;
            }
            minimum = minimum.min(total);
        }
        self.asic.front_end().set_pga_offset(channel, offset as i16)?;
        log::debug!("{channel:?} analog offset {offset} (minimum black sum {minimum})");
        Ok(offset)
    }

    /// Returns the analog offset found with the final digital offset.
    pub fn adjust_offset(&mut self, channel: asic::Channel) -> Result<u8, Error> {
        let mut digital_offset = INITIAL_DIGITAL_OFFSET;
        loop {
            self.asic.set_digital_offset(channel, digital_offset)?;
            let analog_offset = self.adjust_analog_offset(channel)?;
            log::debug!("{channel:?} digital offset {digital_offset}");
            if analog_offset != u8::MAX {
                return Ok(analog_offset);
            }
            if digital_offset >= MAXIMUM_DIGITAL_OFFSET {
                return Err(Error::Calibration {
                    operation: "offset adjustment",
                    channel,
                    value: digital_offset as u32,
                });
            }
            digital_offset += DIGITAL_OFFSET_STEP;
        }
    }

    pub fn adjust_analog_gain(&mut self, channel: asic::Channel) -> Result<u8, Error> {
        let mut gain = DEFAULT_PGA_GAIN;
        loop {
            self.asic.front_end().set_pga_gain(channel, gain)?;
            if bright_sum(&self.sample_line(channel)?) >= BRIGHT_TARGET {
                log::debug!("{channel:?} PGA gain {gain}");
                return Ok(gain);
            }
            if gain >= MAXIMUM_PGA_GAIN {
                return Err(Error::Calibration {
                    operation: "analog gain adjustment",
                    channel,
                    value: gain as u32,
                });
            }
            gain += 1;
        }
    }

    pub fn compensate_pixel_nonuniformity(&mut self, channel: asic::Channel) -> Result<(), Error> {
        let index = channel.color_index("pixel non-uniformity compensation")?;
        let mut maxima = vec![1u8; NATIVE_WIDTH];
        for _ in 0..NONUNIFORMITY_LINES {
            let line = self.sample_line(channel)?;
            for (maximum, value) in maxima.iter_mut().zip(line.iter()) {
                *maximum = (*maximum).max(*value);
            }
        }
        self.per_pixel_gain[index] = pixel_gains(&maxima);
        Ok(())
    }

    fn rescale(&self, index: usize, line: &mut [u8]) {
        let gains = &self.per_pixel_gain[index];
        for column in 0..NATIVE_WIDTH / self.multiplier {
            let source = column * self.multiplier;
            line[column] = (line[source] as f64 * gains[source]).clamp(0.0, 255.0) as u8;
        }
    }

    /// Acquires `lines` lines in batches of `BATCH_LINES`.
    ///
    /// Each batch is transferred into the FIFO, then drained with the data
    /// request line asserted.
    pub fn scan_lines_gray<O>(
        &mut self,
        channel: asic::Channel,
        lines: u32,
        move_while_scanning: bool,
        calibrated: bool,
        output: &mut O,
    ) -> Result<(), Error>
    where
        O: Output + ?Sized,
    {
        let gains_index = if calibrated {
            Some(channel.color_index("calibrated acquisition")?)
        } else {
            None
        };
        self.asic.set_speed_counter(self.motor_speed)?;
        self.asic.reset_fifo()?;
        self.asic.set_ccd_mode(true)?;
        self.asic.set_dma(true)?;
        let mut line = vec![0u8; NATIVE_WIDTH];
        let mut scanned = 0;
        let mut read = 0;
        while scanned < lines {
            output.transition(State::Acquiring);
            loop {
                if move_while_scanning {
                    self.asic.wait_for_clock_change()?;
                }
                self.asic.send_channel_data(channel)?;
                if move_while_scanning {
                    self.asic.set_move(true)?;
                } else {
                    self.asic.wait_for_channel_transfer_to_fifo(channel)?;
                }
                scanned += 1;
                if scanned % BATCH_LINES == 0 || scanned >= lines {
                    break;
                }
            }
            if self.asic.is_above_upper_limit()? {
                log::warn!("FIFO above its upper limit after {scanned} lines");
            }
            output.transition(State::Draining);
            self.asic.set_data_request(true)?;
            while read < scanned {
                self.asic.acquire_line(&mut line)?;
                if let Some(index) = gains_index {
                    self.rescale(index, &mut line);
                }
                output.write_line(&line)?;
                read += 1;
            }
            self.asic.set_data_request(false)?;
        }
        self.asic.set_ccd_mode(false)?;
        self.asic.set_dma(false)?;
        Ok(())
    }
}
