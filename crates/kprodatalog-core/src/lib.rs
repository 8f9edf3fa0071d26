//! # KPro Datalog Core Library
//!
//! Capture, storage and replay of datalogs from the KPro ECU interface.
//!
//! This library provides:
//! - A fixed-layout little-endian record codec
//! - The KPro wire message catalog (Status, Datalog1/2/3)
//! - Raw value ↔ engineering unit conversions
//! - Capture and replay state machines over an abstract transport
//! - The KManager `.kdl` frame store format
//!
//! ## Example
//!
//! ```rust,ignore
//! use kprodatalog_core::protocol::{capture, SimulatedEcu};
//! use std::time::Duration;
//!
//! let mut file = std::fs::File::create("session.kdl")?;
//! let report = capture(SimulatedEcu::default(), &mut file, Duration::from_secs(10))?;
//! println!("{} frames", report.frames);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod codec;
pub mod config;
pub mod conversion;
pub mod frame;
pub mod message;
pub mod protocol;
pub mod store;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::codec::{Record, SchemaError};
    pub use crate::config::{CaptureConfig, DatalogConfig, ReplayConfig, SerialConfig};
    pub use crate::frame::DatalogFrame;
    pub use crate::message::{Message, MessageType, WireMessage};
    pub use crate::protocol::{
        CaptureSession, Packet, ProtocolError, ReplaySession, SimulatedEcu, Transport,
    };
    pub use crate::store::{read_frame_store, write_frame_store, DatalogHeader, StoreError};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
