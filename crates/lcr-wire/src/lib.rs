// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lcr-wire: the length-delimited JSON frame protocol connections speak.
//!
//! This crate only knows about bytes and [`Message`] shapes; it has no idea
//! what a component, registry, or event is. Subsystem crates translate their
//! own errors into `error` frames using [`ErrorKind`] at their boundary.

mod framing;
mod message;

pub use framing::{decode, encode, read_frame, read_message, write_frame, write_message, ProtocolError, MAX_FRAME_SIZE};
pub use message::{error_payload, ErrorKind, Message, SYSTEM_COMPONENT_ID};
