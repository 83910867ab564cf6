//! # mavping
//!
//! MAVLink v2 ping responder and ping client with a self-contained frame codec.
//!
//! The responder answers unaddressed PING requests with a reply addressed to
//! the requester; the pinger measures round-trip times to a given system.
//!
//! ## Architecture
//!
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  CLI (serve / ping / config)                    │
//! ├────────────────────────────────┬────────────────────────────────┤
//! │        Ping Responder          │            Pinger              │
//! ├────────────────────────────────┴────────────────────────────────┤
//! │            MavConnection (buffer + codec + transport)           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   Frame Codec (CRC, signing, resync)  ◄──  Message Registry     │
//! ├─────────────────────────────────────────────────────────────────┤
//! │              Transport (UDP / TCP / serial)                     │
//! └─────────────────────────────────────────────────────────────────┘

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow stylistic lints that don't affect correctness
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]              // ASCII diagrams in docs
#![allow(clippy::unreadable_literal)]        // CRC seeds and timestamps
#![allow(clippy::cast_possible_truncation)]  // Wire fields are narrower than usize
#![allow(clippy::cast_precision_loss)]       // Acceptable for stats
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::option_if_let_else)]        // More readable in context
#![allow(clippy::use_self)]                  // Explicit type names in matches
#![allow(clippy::redundant_pub_crate)]       // Explicit visibility
#![allow(clippy::future_not_send)]           // Async internals
#![allow(clippy::struct_excessive_bools)]    // Boolean config fields are appropriate
#![allow(clippy::match_same_arms)]           // Explicit arm per variant is clearer
#![allow(clippy::ignored_unit_patterns)]     // Ok(_) vs Ok(()) is stylistic

pub mod config;
pub mod error;
pub mod pinger;
pub mod protocol;
pub mod responder;
pub mod signals;
pub mod transport;
pub mod types;

#[cfg(feature = "cli")]
pub mod cli;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default UDP port of MAVLink ground stations.
pub const DEFAULT_UDP_PORT: u16 = 14550;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::pinger::{PingEvent, PingSummary, Pinger, PingerConfig};
    pub use crate::protocol::{
        CodecConfig, Frame, FrameCodec, Inbound, MessageData, MessageRegistry, PingMessage,
    };
    pub use crate::responder::{PingResponder, ResponderService, ShutdownReason};
    pub use crate::signals::{SignalHandler, ShutdownSignal};
    pub use crate::transport::{MavConnection, Transport, TransportConfig};
    pub use crate::types::*;
}
