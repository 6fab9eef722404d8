#![cfg_attr(test, deny(rust_2018_idioms))]

//! # embercore
//!
//! A single-process, event-driven application server core. One
//! non-blocking reactor terminates HTTP/1.1 and HTTP/2 (TLS-ALPN and h2c
//! cleartext-prior-knowledge) on one listening socket, dispatching
//! completed requests through a pattern-matched route table and
//! middleware chain. A second listener variant speaks the same dispatch
//! machinery over line-oriented SMTP and IMAP4rev1.
//!
//! ## Layout
//!
//! - [`wire`] / [`hpack`] / [`h2`] — HTTP/2 framing and header compression.
//! - [`http1`] — the incremental HTTP/1.1 request parser.
//! - [`mail`] — SMTP and IMAP command state machines.
//! - [`route`] / [`request`] / [`response`] — dispatch, request context,
//!   and response assembly.
//! - [`internal`] — bounded-recursion local re-dispatch.
//! - [`session`] / [`cache`] / [`timer`] — the process-wide stores the
//!   reactor and handlers share.
//! - [`reactor`] — the `mio`-based event loop tying everything together.
//! - [`config`] — typed, builder-constructed server configuration.
//!
//! This crate implements the core only; application handlers, multipart
//! parsing, cookie serialization, and MIME lookup are external
//! collaborators whose contracts are described on [`request::Request`]
//! and [`response::ResponseBuilder`].

pub use crate::error::{Error, Result};

mod error;
mod trace;

mod wire;
pub mod hpack;
pub mod h2;
pub mod http1;
pub mod mail;

pub mod request;
pub mod response;
pub mod route;
pub mod internal;

pub mod session;
pub mod cache;
pub mod timer;

pub mod reactor;

pub mod config;
