//! Typed wrappers for the methods of the `org.freedesktop.DBus` interface.

use std::fmt;
use std::ops::BitOr;

use crate::client::Client;
use crate::error::{Error, ErrorKind, Result};
use crate::message::Message;
use crate::proto::format_flag_set;
use crate::value::Value;

/// Well known destination name.
pub const DESTINATION: &str = "org.freedesktop.DBus";

/// Well known interface name.
pub const INTERFACE: &str = "org.freedesktop.DBus";

/// Well known D-Bus path.
pub const PATH: &str = "/org/freedesktop/DBus";

/// The flags to a `RequestName` call.
#[derive(Default, Clone, Copy, PartialEq, Eq)]
pub struct NameFlag(u32);

impl NameFlag {
    /// An empty set of flags.
    pub const NONE: Self = Self(0);
    /// Allow another application specifying [`NameFlag::REPLACE_EXISTING`]
    /// to take the name over.
    pub const ALLOW_REPLACEMENT: Self = Self(1);
    /// Try to replace the current owner if there is one.
    pub const REPLACE_EXISTING: Self = Self(2);
    /// Fail the request instead of queueing when the name is already
    /// owned.
    pub const DO_NOT_QUEUE: Self = Self(4);

    /// Test if every flag in `other` is set in `self`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub(crate) fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for NameFlag {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for NameFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_flag_set(
            f,
            self.0,
            &[
                (1, "ALLOW_REPLACEMENT"),
                (2, "REPLACE_EXISTING"),
                (4, "DO_NOT_QUEUE"),
            ],
        )
    }
}

/// The reply to a `RequestName` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameReply {
    /// The caller is now the primary owner of the name.
    PrimaryOwner = 1,
    /// The name already had an owner and the caller has been queued for
    /// it.
    InQueue = 2,
    /// The name already has an owner and [`NameFlag::DO_NOT_QUEUE`] was
    /// specified.
    Exists = 3,
    /// The caller already owns the name.
    AlreadyOwner = 4,
}

impl NameReply {
    fn from_u32(value: u32) -> Result<Self> {
        match value {
            1 => Ok(Self::PrimaryOwner),
            2 => Ok(Self::InQueue),
            3 => Ok(Self::Exists),
            4 => Ok(Self::AlreadyOwner),
            _ => Err(Error::new(ErrorKind::InvalidReply)),
        }
    }
}

/// The reply to a `ReleaseName` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseNameReply {
    /// The caller has given up the name.
    Released = 1,
    /// The name does not exist on the bus.
    NonExistent = 2,
    /// The caller was not the owner and not waiting in the queue.
    NotOwner = 3,
}

impl ReleaseNameReply {
    fn from_u32(value: u32) -> Result<Self> {
        match value {
            1 => Ok(Self::Released),
            2 => Ok(Self::NonExistent),
            3 => Ok(Self::NotOwner),
            _ => Err(Error::new(ErrorKind::InvalidReply)),
        }
    }
}

/// The reply to a `StartServiceByName` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartServiceReply {
    /// The service was started.
    Success = 1,
    /// The service was already running.
    AlreadyRunning = 2,
}

impl StartServiceReply {
    fn from_u32(value: u32) -> Result<Self> {
        match value {
            1 => Ok(Self::Success),
            2 => Ok(Self::AlreadyRunning),
            _ => Err(Error::new(ErrorKind::InvalidReply)),
        }
    }
}

/// Typed wrappers around the bus daemon's own interface. Each is a method
/// call with `org.freedesktop.DBus` as destination, path and interface.
impl Client {
    /// Say `Hello` and obtain the unique connection name. The bus expects
    /// this as the first call of every session.
    pub(crate) async fn hello(&self) -> Result<String> {
        let reply = self.call_method(self.bus_call("Hello")).await?;
        expect_string(&reply)
    }

    /// Request ownership of a well-known name.
    pub async fn request_name(&self, name: &str, flags: NameFlag) -> Result<NameReply> {
        let call = self.bus_call("RequestName").with_body_values(vec![
            Value::String(name.to_owned()),
            Value::Uint32(flags.bits()),
        ]);

        let reply = self.call_method(call).await?;
        NameReply::from_u32(expect_u32(&reply)?)
    }

    /// Release ownership of a well-known name.
    pub async fn release_name(&self, name: &str) -> Result<ReleaseNameReply> {
        let call = self
            .bus_call("ReleaseName")
            .with_body(Value::String(name.to_owned()));

        let reply = self.call_method(call).await?;
        ReleaseNameReply::from_u32(expect_u32(&reply)?)
    }

    /// List every name currently owned on the bus.
    pub async fn list_names(&self) -> Result<Vec<String>> {
        let reply = self.call_method(self.bus_call("ListNames")).await?;
        expect_string_array(&reply)
    }

    /// List every name which can be activated on the bus.
    pub async fn list_activatable_names(&self) -> Result<Vec<String>> {
        let reply = self
            .call_method(self.bus_call("ListActivatableNames"))
            .await?;

        expect_string_array(&reply)
    }

    /// Test if a name currently has an owner.
    pub async fn name_has_owner(&self, name: &str) -> Result<bool> {
        let call = self
            .bus_call("NameHasOwner")
            .with_body(Value::String(name.to_owned()));

        let reply = self.call_method(call).await?;

        reply
            .body
            .first()
            .and_then(Value::as_bool)
            .ok_or_else(|| Error::new(ErrorKind::InvalidReply))
    }

    /// The unique name of the current owner of `name`.
    pub async fn get_name_owner(&self, name: &str) -> Result<String> {
        let call = self
            .bus_call("GetNameOwner")
            .with_body(Value::String(name.to_owned()));

        let reply = self.call_method(call).await?;
        expect_string(&reply)
    }

    /// Ask the bus to start the service owning `name`. The flags argument
    /// is reserved and must be zero.
    pub async fn start_service_by_name(
        &self,
        name: &str,
        flags: u32,
    ) -> Result<StartServiceReply> {
        let call = self.bus_call("StartServiceByName").with_body_values(vec![
            Value::String(name.to_owned()),
            Value::Uint32(flags),
        ]);

        let reply = self.call_method(call).await?;
        StartServiceReply::from_u32(expect_u32(&reply)?)
    }

    /// Register a match rule at the bus.
    pub async fn add_match(&self, rule: &str) -> Result<()> {
        let call = self
            .bus_call("AddMatch")
            .with_body(Value::String(rule.to_owned()));

        self.call_method(call).await?;
        Ok(())
    }

    /// Remove a previously registered match rule.
    pub async fn remove_match(&self, rule: &str) -> Result<()> {
        let call = self
            .bus_call("RemoveMatch")
            .with_body(Value::String(rule.to_owned()));

        self.call_method(call).await?;
        Ok(())
    }

    /// The globally unique ID of the bus.
    pub async fn get_id(&self) -> Result<String> {
        let reply = self.call_method(self.bus_call("GetId")).await?;
        expect_string(&reply)
    }

    fn bus_call(&self, member: &str) -> Message {
        Message::method_call(PATH, member)
            .with_interface(INTERFACE)
            .with_destination(DESTINATION)
    }
}

fn expect_string(reply: &Message) -> Result<String> {
    reply
        .body
        .first()
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| Error::new(ErrorKind::InvalidReply))
}

fn expect_u32(reply: &Message) -> Result<u32> {
    reply
        .body
        .first()
        .and_then(Value::as_u32)
        .ok_or_else(|| Error::new(ErrorKind::InvalidReply))
}

fn expect_string_array(reply: &Message) -> Result<Vec<String>> {
    let array = reply
        .body
        .first()
        .and_then(Value::as_array)
        .ok_or_else(|| Error::new(ErrorKind::InvalidReply))?;

    let mut names = Vec::with_capacity(array.len());

    for value in array.values() {
        match value {
            Value::String(name) => names.push(name.clone()),
            _ => return Err(Error::new(ErrorKind::InvalidReply)),
        }
    }

    Ok(names)
}
