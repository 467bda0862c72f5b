use crate::scanner;

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("the reader closed the stream")]
    Closed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Status {
    pub state: scanner::State,
    pub finished: bool,
    pub produced: u64,
    pub consumed: u64,
}

struct Shared {
    buffer: std::collections::VecDeque<u8>,
    capacity: usize,
    produced: u64,
    consumed: u64,
    writer_open: bool,
    reader_open: bool,
    state: scanner::State,
}

struct Pipe {
    shared: std::sync::Mutex<Shared>,
    readable: std::sync::Condvar,
    writable: std::sync::Condvar,
}

/// Creates a bounded byte pipe holding at most `capacity` bytes.
pub fn pipe(capacity: usize) -> (Writer, Reader) {
    let pipe = std::sync::Arc::new(Pipe {
        shared: std::sync::Mutex::new(Shared {
            buffer: std::collections::VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            produced: 0,
            consumed: 0,
            writer_open: true,
            reader_open: true,
            state: scanner::State::Idle,
        }),
        readable: std::sync::Condvar::new(),
        writable: std::sync::Condvar::new(),
    });
    (
        Writer { pipe: pipe.clone() },
        Reader {
            pipe,
            blocking: std::sync::atomic::AtomicBool::new(true),
        },
    )
}

pub struct Writer {
    pipe: std::sync::Arc<Pipe>,
}

impl Writer {
    /// Blocks while the pipe is full, fails once the reader is gone.
    pub fn write(&mut self, mut bytes: &[u8]) -> Result<(), Error> {
        // unwrap: mutex is not poisoned
        let mut shared = self.pipe.shared.lock().unwrap();
        while !bytes.is_empty() {
            while shared.reader_open && shared.buffer.len() == shared.capacity {
                // unwrap: the condition variable is only used with this mutex
                shared = self.pipe.writable.wait(shared).unwrap();
            }
            if !shared.reader_open {
                return Err(Error::Closed);
            }
            let length = bytes.len().min(shared.capacity - shared.buffer.len());
            shared.buffer.extend(&bytes[..length]);
            shared.produced += length as u64;
            bytes = &bytes[length..];
            self.pipe.readable.notify_one();
        }
        Ok(())
    }

    pub fn set_state(&mut self, state: scanner::State) {
        // unwrap: mutex is not poisoned
        self.pipe.shared.lock().unwrap().state = state;
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        // unwrap: mutex is not poisoned
        self.pipe.shared.lock().unwrap().writer_open = false;
        self.pipe.readable.notify_all();
    }
}

pub struct Reader {
    pipe: std::sync::Arc<Pipe>,
    blocking: std::sync::atomic::AtomicBool,
}

impl Reader {
    pub fn set_blocking(&self, blocking: bool) {
        self.blocking
            .store(blocking, std::sync::atomic::Ordering::Release);
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Returns `None` at end of stream.
    ///
    /// A blocking reader waits for data, a non-blocking reader returns
    /// `Some(0)` when the pipe is empty but still open.
    pub fn read(&mut self, buffer: &mut [u8]) -> Option<usize> {
        // unwrap: mutex is not poisoned
        let mut shared = self.pipe.shared.lock().unwrap();
        loop {
            if !shared.buffer.is_empty() {
                let length = buffer.len().min(shared.buffer.len());
                for (target, source) in buffer.iter_mut().zip(shared.buffer.drain(..length)) {
                    *target = source;
                }
                shared.consumed += length as u64;
                self.pipe.writable.notify_one();
                return Some(length);
            }
            if !shared.writer_open {
                return None;
            }
            if buffer.is_empty() || !self.is_blocking() {
                return Some(0);
            }
            // unwrap: the condition variable is only used with this mutex
            shared = self.pipe.readable.wait(shared).unwrap();
        }
    }

    /// Discards buffered bytes, the next write fails with `Error::Closed`.
    pub fn close(&self) {
        // unwrap: mutex is not poisoned
        let mut shared = self.pipe.shared.lock().unwrap();
        shared.reader_open = false;
        shared.buffer.clear();
        self.pipe.writable.notify_all();
    }

    pub fn status(&self) -> Status {
        // unwrap: mutex is not poisoned
        let shared = self.pipe.shared.lock().unwrap();
        Status {
            state: shared.state,
            finished: !shared.writer_open,
            produced: shared.produced,
            consumed: shared.consumed,
        }
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.close();
    }
}

