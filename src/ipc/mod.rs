//! IPC module for daemon-client communication

mod protocol;
mod server;

pub use protocol::{
    DaemonStatus, Notification, Request, Response, ScreenFrame, MAX_MESSAGE_LEN,
};
pub use server::{Server, ServerContext};
