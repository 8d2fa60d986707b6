//! An asynchronous client implementation of the D-Bus wire protocol.
//!
//! The crate speaks the binary D-Bus protocol over a Unix stream socket:
//! it authenticates with the EXTERNAL mechanism, marshals and unmarshals
//! dynamically typed [`Value`]s against type signatures, and multiplexes
//! method calls, replies, errors and signals over a single connection.
//!
//! # Examples
//!
//! ```no_run
//! use minibus::{Client, Message};
//!
//! # #[tokio::main] async fn main() -> minibus::Result<()> {
//! let client = Client::session_bus().await?;
//!
//! let names = client.list_names().await?;
//! println!("{names:?}");
//!
//! let mut signals = client
//!     .signal_stream(None, Some("org.freedesktop.DBus"), Some("NameOwnerChanged"), None)
//!     .await?;
//!
//! while let Some(signal) = signals.next().await {
//!     println!("{:?}", signal.body);
//! }
//! # Ok(()) }
//! ```

#[doc(inline)]
pub use self::error::{Error, Result};
mod error;

#[doc(inline)]
pub use self::proto::{Endianness, Flags, MessageType};
mod proto;

pub use self::buf::{ByteReader, ByteWriter};
mod buf;

#[doc(inline)]
pub use self::signature::SignatureError;
mod signature;

#[doc(inline)]
pub use self::value::{Array, Value};
pub mod value;

pub use self::message::{Fields, Header, Message};
mod message;

mod sasl;

mod connection;

#[doc(inline)]
pub use self::client::{Client, MethodCallStream, Pattern, SignalStream};
mod client;

pub use self::match_rule::MatchRule;
mod match_rule;

pub mod org_freedesktop_dbus;

mod utils;
