pub mod asic;
pub mod bus;
pub mod configuration;
pub mod device;
pub mod error;
pub mod frontend;
pub mod properties;
pub mod registers;
pub mod scanner;
pub mod stream;
pub mod timing;

pub use crate::asic::Channel;
pub use crate::bus::Bus;
pub use crate::bus::Parport;
pub use crate::configuration::Configuration;
pub use crate::configuration::Length;
pub use crate::device::Device;
pub use crate::device::Error;
pub use crate::device::Stream;
pub use crate::scanner::Kind;
pub use crate::scanner::State;

pub use bincode;
pub use libc;
