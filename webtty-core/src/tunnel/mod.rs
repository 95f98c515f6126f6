//! Cross-process exec tunnel
//!
//! A frontend instance (the initiator) drives containers owned by another
//! instance (the responder). Each request opens one stream whose first frame
//! carries the shared secret and the request. Unary requests get a single
//! reply; exec and logs continue with I/O and resize frames until either side
//! closes, which exits the shell on the responder.

mod frame;
mod initiator;
mod responder;
mod retry;

pub use frame::{CmdFrame, TunnelFrame, TunnelReply, TunnelRequest, WindowSize};
pub use initiator::{TunnelClient, TunnelConnector, TunnelShell, TunnelStream};
pub use responder::TunnelResponder;
pub use retry::{RetryPolicy, resize_with_retry};
