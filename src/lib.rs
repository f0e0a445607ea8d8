#![deny(missing_debug_implementations)]
#![cfg_attr(test, deny(rust_2018_idioms))]

//! # magichttp1
//!
//! A sans-io HTTP/1.x message codec and connection state machine.
//!
//! This crate parses and composes HTTP/1.x messages and tracks the framing
//! and keep-alive state of a connection, but it never touches a socket
//! itself. Callers feed it bytes as they arrive on whatever transport they
//! own (TCP, TLS, an in-memory pipe, ...) via [`ConnectionDriver`], and it
//! hands back parsed request/response initials plus [`stream::Reader`] /
//! [`stream::Writer`] handles for the bodies.
//!
//! ## Features
//!
//! - `client`: enables `ConnectionDriver::write_request` and the
//!   client-role constructor.
//! - `server`: enables `ConnectionDriver::next_request` and the
//!   server-role constructor.
//!
//! Both are enabled by default; a build that only ever drives one role can
//! turn the other off to shed a little dead code.

pub use crate::error::{Error, Result};

#[macro_use]
mod cfg;

#[macro_use]
mod trace;

mod conn;
mod error;
mod headers;
mod method;
mod proto;
mod request;
mod response;
mod status;
pub mod stream;
mod transport;
mod version;

pub use crate::conn::ConnectionDriver;
pub use crate::error::RequestInitialError;
pub use crate::headers::{HeaderMap, HeaderName};
pub use crate::method::{InvalidMethod, Method};
pub use crate::request::RequestInitial;
pub use crate::response::ResponseInitial;
pub use crate::status::StatusCode;
pub use crate::stream::{Reader, Writer};
pub use crate::transport::Transport;
pub use crate::version::Version;
