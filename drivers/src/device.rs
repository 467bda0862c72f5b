use crate::asic;
use crate::bus;
use crate::configuration;
use crate::error;
use crate::properties;
use crate::scanner;
use crate::stream;

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error(transparent)]
    Bus(#[from] bus::Error),

    #[error(transparent)]
    Scanner(#[from] scanner::Error),

    #[error("the scanner is busy with another job")]
    Busy,

    #[error("the scan worker panicked")]
    Worker,
}

impl From<asic::Error> for Error {
    fn from(error: asic::Error) -> Self {
        Error::Scanner(error.into())
    }
}

impl Error {
    pub fn kind(&self) -> scanner::Kind {
        match self {
            Error::Bus(_) => scanner::Kind::Transport,
            Error::Scanner(error) => error.kind(),
            Error::Busy => scanner::Kind::Busy,
            Error::Worker => scanner::Kind::Worker,
        }
    }
}

struct Lines<'a> {
    writer: &'a mut stream::Writer,
    width: usize,
}

impl scanner::Output for Lines<'_> {
    fn write_line(&mut self, line: &[u8]) -> Result<(), scanner::Error> {
        Ok(self.writer.write(&line[..self.width])?)
    }

    fn transition(&mut self, state: scanner::State) {
        self.writer.set_state(state);
    }
}

fn run<B: bus::Bus>(
    scanner: &mut scanner::Scanner<B>,
    configuration: &configuration::Configuration,
    lines: u32,
    writer: &mut stream::Writer,
) -> Result<(), scanner::Error> {
    log::info!(
        "scan started ({} lines of {:?} at {} dpi)",
        lines,
        configuration.channel,
        configuration.resolution
    );
    if configuration.home {
        writer.set_state(scanner::State::Homing);
        scanner.goto_home_position()?;
    }
    writer.set_state(scanner::State::Configuring);
    scanner.setup_resolution(configuration.resolution)?;
    if configuration.calibrate {
        writer.set_state(scanner::State::Calibrating);
        scanner.calibrate(&configuration.calibration_channels)?;
    }
    if configuration.move_to_start {
        writer.set_state(scanner::State::Positioning);
        scanner.move_to_start_position()?;
    }
    let width = scanner.image_width();
    scanner.scan_lines_gray(
        configuration.channel,
        lines,
        configuration.move_while_scanning,
        configuration.apply_calibration,
        &mut Lines { writer, width },
    )?;
    log::info!("scan finished");
    Ok(())
}

pub struct Device<B: bus::Bus + 'static> {
    scanner: std::sync::Arc<std::sync::Mutex<scanner::Scanner<B>>>,
    scanning: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl<B: bus::Bus + 'static> Device<B> {
    pub const PROPERTIES: properties::Scanner<configuration::Configuration> =
        properties::PROPERTIES;

    pub fn open(mut bus: B) -> Result<Self, Error> {
        bus::switch_to_scanner(&mut bus)?;
        let scanner = scanner::Scanner::new(asic::Asic::new(bus)?)?;
        log::info!(
            "{} {} ready at {} dpi",
            Self::PROPERTIES.vendor,
            Self::PROPERTIES.name,
            scanner.resolution()
        );
        Ok(Self {
            scanner: std::sync::Arc::new(std::sync::Mutex::new(scanner)),
            scanning: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
        })
    }

    /// True while a scan job or a standalone calibration holds the scanner.
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(std::sync::atomic::Ordering::Acquire)
    }

    fn claim(&self) -> Result<(), Error> {
        self.scanning
            .compare_exchange(
                false,
                true,
                std::sync::atomic::Ordering::AcqRel,
                std::sync::atomic::Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|_| Error::Busy)
    }

    fn release(&self) {
        self.scanning
            .store(false, std::sync::atomic::Ordering::Release);
    }

    fn idle_scanner(&self) -> Result<std::sync::MutexGuard<'_, scanner::Scanner<B>>, Error> {
        if self.is_scanning() {
            return Err(Error::Busy);
        }
        // unwrap: mutex is not poisoned
        Ok(self.scanner.lock().unwrap())
    }

    pub fn setup_resolution(&self, dpi: u16) -> Result<(), Error> {
        Ok(self.idle_scanner()?.setup_resolution(dpi)?)
    }

    pub fn resolution(&self) -> Result<u16, Error> {
        Ok(self.idle_scanner()?.resolution())
    }

    pub fn image_width(&self) -> Result<usize, Error> {
        Ok(self.idle_scanner()?.image_width())
    }

    pub fn number_of_lines(&self, centimeters: f64) -> Result<u32, Error> {
        Ok(self.idle_scanner()?.number_of_lines(centimeters))
    }

    /// Calibrates on the caller's thread. Scans started meanwhile fail with `Error::Busy`.
    ///
    /// The gains are kept for later scans with `apply_calibration` set.
    pub fn calibrate(&self, channels: &[asic::Channel]) -> Result<(), Error> {
        self.claim()?;
        let result = {
            // unwrap: mutex is not poisoned
            let mut scanner = self.scanner.lock().unwrap();
            scanner.calibrate(channels)
        };
        self.release();
        Ok(result?)
    }

    // configuration errors are reported before the worker starts
    fn prepare(&self, configuration: &configuration::Configuration) -> Result<u32, Error> {
        if configuration.apply_calibration {
            configuration
                .channel
                .color_index("calibrated acquisition")?;
        }
        if configuration.calibrate {
            for channel in configuration.calibration_channels.iter() {
                channel.color_index("calibration")?;
            }
        }
        // unwrap: mutex is not poisoned
        let mut scanner = self.scanner.lock().unwrap();
        scanner.setup_resolution(configuration.resolution)?;
        Ok(configuration.lines(|centimeters| scanner.number_of_lines(centimeters)))
    }

    /// Runs a scan job on a dedicated worker and returns its output stream.
    ///
    /// Fails with `Error::Busy` while a previous job or a calibration is still running.
    pub fn start_scan(
        &self,
        configuration: &configuration::Configuration,
    ) -> Result<Stream, Error> {
        self.claim()?;
        let lines = match self.prepare(configuration) {
            Ok(lines) => lines,
            Err(error) => {
                self.release();
                return Err(error);
            }
        };
        let width = {
            // unwrap: mutex is not poisoned
            self.scanner.lock().unwrap().image_width()
        };
        let (mut writer, reader) = stream::pipe(configuration.stream_lines.max(1) * width);
        let error_flag = error::Flag::new();
        let thread_error_flag = error_flag.clone();
        let thread_scanner = self.scanner.clone();
        let thread_scanning = self.scanning.clone();
        let configuration = configuration.clone();
        Ok(Stream {
            reader,
            error_flag,
            thread: Some(std::thread::spawn(move || {
                {
                    // unwrap: mutex is not poisoned
                    let mut scanner = thread_scanner.lock().unwrap();
                    match run(&mut *scanner, &configuration, lines, &mut writer) {
                        Ok(()) => writer.set_state(scanner::State::Idle),
                        Err(error) => {
                            log::error!("scan failed: {error}");
                            writer.set_state(scanner::State::Failed);
                            thread_error_flag.store_error_if_not_set(error);
                        }
                    }
                }
                thread_scanning.store(false, std::sync::atomic::Ordering::Release);
                drop(writer);
            })),
        })
    }
}

impl<B: bus::Bus + 'static> Drop for Device<B> {
    fn drop(&mut self) {
        if self.is_scanning() {
            return;
        }
        if let Ok(mut scanner) = self.scanner.lock() {
            if let Err(error) = bus::switch_to_printer(scanner.asic_mut().bus_mut()) {
                log::warn!("switching back to the printer failed: {error}");
            }
        }
    }
}

/// Output of a single scan job.
///
/// Dropping the stream closes it and waits for the worker.
pub struct Stream {
    reader: stream::Reader,
    error_flag: error::Flag<Error>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl Stream {
    pub fn set_blocking(&self, blocking: bool) {
        self.reader.set_blocking(blocking);
    }

    pub fn status(&self) -> stream::Status {
        self.reader.status()
    }

    pub fn error(&self) -> Result<(), Error> {
        self.error_flag.load_error()
    }

    /// Returns `Ok(None)` at the end of a successful scan, or the worker's error.
    pub fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<Option<usize>, Error> {
        match self.reader.read(buffer) {
            Some(length) => Ok(Some(length)),
            None => self.error().map(|_| None),
        }
    }

    /// Closes the stream, waits for the worker and returns its error, if any.
    pub fn finish(mut self) -> Result<(), Error> {
        self.join()?;
        self.error()
    }

    fn join(&mut self) -> Result<(), Error> {
        self.reader.close();
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| Error::Worker),
            None => Ok(()),
        }
    }
}

impl std::io::Read for Stream {
    fn read(&mut self, buffer: &mut [u8]) -> std::io::Result<usize> {
        match self.read_bytes(buffer) {
            Ok(Some(0)) if !buffer.is_empty() => Err(std::io::ErrorKind::WouldBlock.into()),
            Ok(Some(length)) => Ok(length),
            Ok(None) => Ok(0),
            Err(error) => Err(std::io::Error::new(std::io::ErrorKind::Other, error)),
        }
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        let _ = self.join();
    }
}
