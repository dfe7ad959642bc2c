//! EchoRadar library: portable sweep-radar engine.
//!
//! An ultrasonic ranger on a servo sweeps a 180° arc. This crate contains
//! the parts of the device that have real logic in them: the distance
//! filter, the alarm evaluator, the scan state machine, the shared radar
//! state and the latest-value hand-off to consumers, and the parsing of
//! remote and local control input. None of it touches hardware; the sensor,
//! servo and annunciator are traits implemented by the firmware binary, so
//! everything here is testable on any host with `cargo test`.
//!
//! Data flows one way:
//! reading → [`filter`] → [`alarm`] → [`state`] → [`queue`] → consumers
//! ([`view`] for the display, [`comm`] for telemetry). Control flows the
//! other way through [`control`] into [`state`], which the
//! [`scanner`] observes every step.

#![cfg_attr(not(test), no_std)]

pub mod alarm;
pub mod board;
pub mod comm;
pub mod control;
pub mod defaults;
pub mod error;
pub mod filter;
pub mod protocol;
pub mod queue;
pub mod scanner;
pub mod state;
pub mod view;

pub use error::Error;
