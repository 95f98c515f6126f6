//! Per-connection terminal engine
//!
//! A connection starts with a handshake (one JSON text frame), then a
//! [`Pump`] relays wire messages between the transport and a [`Terminal`]
//! until one side ends.

mod engine;
mod handshake;
mod logs;
mod terminal;
mod title;
pub mod transport;

pub use engine::{CloseReason, DEFAULT_BUFFER_SIZE, Pump, PumpOptions};
pub use handshake::{InitMessage, read_init_message};
pub use logs::LogTerminal;
pub use terminal::Terminal;
pub use title::{DEFAULT_TITLE_FORMAT, render_title};
pub use transport::{Frame, FrameSink, FrameSource};
