use std::collections::BTreeMap;
use std::fmt;

use crate::message::Message;
use crate::proto::MessageType;
use crate::utils::{has_namespace, is_path_match};
use crate::value::Value;

/// A match rule: a filter over inbound messages and its canonical wire
/// string, as understood by the bus daemon's `AddMatch`.
///
/// Values are serialized without quote escaping, so values containing `'`
/// are not representable.
///
/// # Examples
///
/// ```
/// use minibus::{MatchRule, MessageType};
///
/// let rule = MatchRule::new()
///     .with_type(MessageType::Signal)
///     .with_interface("org.freedesktop.DBus")
///     .with_member("NameOwnerChanged");
///
/// assert_eq!(
///     rule.serialize(),
///     "type='signal',interface='org.freedesktop.DBus',member='NameOwnerChanged'"
/// );
/// ```
#[derive(Debug, Default, Clone)]
pub struct MatchRule {
    message_type: Option<MessageType>,
    sender: Option<String>,
    interface: Option<String>,
    member: Option<String>,
    path: Option<String>,
    path_namespace: Option<String>,
    destination: Option<String>,
    arg0_namespace: Option<String>,
    args: BTreeMap<u8, String>,
    arg_paths: BTreeMap<u8, String>,
}

impl MatchRule {
    /// Construct an empty rule which matches every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Match on the message type.
    pub fn with_type(mut self, message_type: MessageType) -> Self {
        self.message_type = Some(message_type);
        self
    }

    /// Match on the sender field.
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Match on the interface field.
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    /// Match on the member field.
    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }

    /// Match on the path field.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Match messages whose path is equal to or nested under the given
    /// path.
    pub fn with_path_namespace(mut self, path_namespace: impl Into<String>) -> Self {
        self.path_namespace = Some(path_namespace.into());
        self
    }

    /// Match on the destination field.
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Match messages whose first string argument is equal to or nested
    /// under the given dotted name.
    pub fn with_arg0_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.arg0_namespace = Some(namespace.into());
        self
    }

    /// Match on equality of the string argument at `index`.
    pub fn with_arg(mut self, index: u8, value: impl Into<String>) -> Self {
        self.args.insert(index, value.into());
        self
    }

    /// Match the argument at `index` as a path, where either side ending in
    /// `/` matches the other as a prefix.
    pub fn with_arg_path(mut self, index: u8, value: impl Into<String>) -> Self {
        self.arg_paths.insert(index, value.into());
        self
    }

    /// Serialize into the daemon's canonical `key='value'` form, omitting
    /// absent keys.
    pub fn serialize(&self) -> String {
        let mut out = String::new();

        if let Some(message_type) = self.message_type {
            push_pair(&mut out, "type", type_name(message_type));
        }

        if let Some(sender) = &self.sender {
            push_pair(&mut out, "sender", sender);
        }

        if let Some(interface) = &self.interface {
            push_pair(&mut out, "interface", interface);
        }

        if let Some(member) = &self.member {
            push_pair(&mut out, "member", member);
        }

        if let Some(path) = &self.path {
            push_pair(&mut out, "path", path);
        }

        if let Some(path_namespace) = &self.path_namespace {
            push_pair(&mut out, "path_namespace", path_namespace);
        }

        if let Some(destination) = &self.destination {
            push_pair(&mut out, "destination", destination);
        }

        if let Some(namespace) = &self.arg0_namespace {
            push_pair(&mut out, "arg0namespace", namespace);
        }

        for (index, value) in &self.args {
            push_pair(&mut out, &format!("arg{index}"), value);
        }

        for (index, value) in &self.arg_paths {
            push_pair(&mut out, &format!("arg{index}path"), value);
        }

        out
    }

    /// Test if `message` satisfies every element of the rule.
    pub fn is_match(&self, message: &Message) -> bool {
        let fields = &message.header.fields;

        if let Some(message_type) = self.message_type {
            if message.header.message_type != message_type {
                return false;
            }
        }

        if !field_eq(&self.sender, &fields.sender) {
            return false;
        }

        if !field_eq(&self.interface, &fields.interface) {
            return false;
        }

        if !field_eq(&self.member, &fields.member) {
            return false;
        }

        if !field_eq(&self.path, &fields.path) {
            return false;
        }

        if !field_eq(&self.destination, &fields.destination) {
            return false;
        }

        if let Some(namespace) = &self.path_namespace {
            match &fields.path {
                Some(path) if path_in_namespace(path, namespace) => {}
                _ => return false,
            }
        }

        if let Some(namespace) = &self.arg0_namespace {
            match string_arg(message, 0) {
                Some(arg) if has_namespace(arg, namespace) => {}
                _ => return false,
            }
        }

        for (index, value) in &self.args {
            match string_arg(message, *index) {
                Some(arg) if arg == value => {}
                _ => return false,
            }
        }

        for (index, value) in &self.arg_paths {
            match path_arg(message, *index) {
                Some(arg) if is_path_match(arg, value) => {}
                _ => return false,
            }
        }

        true
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

fn push_pair(out: &mut String, key: &str, value: &str) {
    if !out.is_empty() {
        out.push(',');
    }

    out.push_str(key);
    out.push_str("='");
    out.push_str(value);
    out.push('\'');
}

fn type_name(message_type: MessageType) -> &'static str {
    match message_type {
        MessageType::MethodCall => "method_call",
        MessageType::MethodReturn => "method_return",
        MessageType::Error => "error",
        MessageType::Signal => "signal",
    }
}

fn field_eq(rule: &Option<String>, field: &Option<String>) -> bool {
    match (rule, field) {
        (None, _) => true,
        (Some(rule), Some(field)) => rule == field,
        (Some(..), None) => false,
    }
}

/// The `index`-th body value, when it is a string.
fn string_arg(message: &Message, index: u8) -> Option<&str> {
    match message.body.get(usize::from(index)) {
        Some(Value::String(value)) => Some(value),
        _ => None,
    }
}

/// The `index`-th body value, when it is a string or an object path.
fn path_arg(message: &Message, index: u8) -> Option<&str> {
    match message.body.get(usize::from(index)) {
        Some(Value::String(value) | Value::ObjectPath(value)) => Some(value),
        _ => None,
    }
}

/// Test if `path` equals `namespace` or is nested below it.
fn path_in_namespace(path: &str, namespace: &str) -> bool {
    if namespace == "/" || path == namespace {
        return true;
    }

    path.len() > namespace.len()
        && path.starts_with(namespace)
        && path.as_bytes()[namespace.len()] == b'/'
}
