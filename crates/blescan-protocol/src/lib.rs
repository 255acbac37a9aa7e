//! # blescan-protocol
//!
//! Text command protocol spoken between remote clients and the controller.
//!
//! Requests are `\r\n`-terminated lines of space separated tokens:
//! `<command> <arg1> <arg2> ...`. Each request gets exactly one response
//! line, sent without a terminator; scan results are pushed as
//! `new-device` lines in between.

pub mod codec;
pub mod command;
pub mod framing;
pub mod response;

pub use codec::{decode_stored_devices, encode_stored_devices, CodecError};
pub use command::{validate_command_table, Command, CommandError, CommandKind};
pub use framing::LineFramer;
pub use response::Response;
