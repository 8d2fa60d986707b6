//! The client session: connection lifecycle, the inbound demultiplexer,
//! reply correlation and subscriptions.


use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock, Weak};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::buf::ByteReader;
use crate::connection;
use crate::error::{Error, ErrorKind, Result};
use crate::match_rule::MatchRule;
use crate::message::Message;
use crate::proto::{Endianness, Flags, MessageType};
use crate::sasl;
use crate::value::Value;

/// The default timeout applied to method calls.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(3);

/// The error name replied to method calls no subscription claims.
const UNKNOWN_METHOD: &str = "org.freedesktop.DBus.Error.UnknownMethod";

/// How many inbound messages the signal fan-out buffers per subscriber
/// before slow subscribers start losing messages.
const BROADCAST_CAPACITY: usize = 256;

/// A predicate over a single header field of an inbound method call.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// The field equals the string exactly.
    Exact(String),
    /// The field starts with the literal prefix.
    Prefix(String),
    /// The field matches the regular expression.
    Regex(regex::Regex),
}

impl Pattern {
    fn matches(&self, value: &str) -> bool {
        match self {
            Pattern::Exact(exact) => value == exact,
            Pattern::Prefix(prefix) => value.starts_with(prefix),
            Pattern::Regex(regex) => regex.is_match(value),
        }
    }
}

impl From<&str> for Pattern {
    #[inline]
    fn from(value: &str) -> Self {
        Pattern::Exact(value.to_owned())
    }
}

impl From<String> for Pattern {
    #[inline]
    fn from(value: String) -> Self {
        Pattern::Exact(value)
    }
}

/// An asynchronous D-Bus client.
///
/// The client is a cheap handle which can be cloned freely; clones share
/// one connection. A background task demultiplexes the inbound stream into
/// reply waiters, method-call subscriptions and signal subscriptions.
///
/// # Examples
///
/// ```no_run
/// use minibus::{Client, Message};
///
/// # #[tokio::main] async fn main() -> minibus::Result<()> {
/// let client = Client::session_bus().await?;
///
/// let reply = client
///     .call_method(
///         Message::method_call("/org/freedesktop/DBus", "GetId")
///             .with_interface("org.freedesktop.DBus")
///             .with_destination("org.freedesktop.DBus"),
///     )
///     .await?;
///
/// println!("bus id: {:?}", reply.body.first());
/// # Ok(()) }
/// ```
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

struct Shared {
    /// The GUID reported by the server during the handshake.
    guid: Box<str>,
    /// Set once the session is closing. Checked before every send.
    closing: AtomicBool,
    /// The next outbound serial. Zero is reserved, so allocation starts at
    /// one.
    serial: AtomicU32,
    /// Identifies method-call subscriptions so they can unregister.
    matcher_id: AtomicU64,
    /// The unique connection name replied to `Hello`.
    bus_name: OnceLock<Box<str>>,
    /// Write half of the socket. Sends serialize on this lock, preserving
    /// the caller's send order. `None` once closed.
    writer: Mutex<Option<OwnedWriteHalf>>,
    /// Reply waiters keyed by request serial.
    replies: StdMutex<HashMap<u32, oneshot::Sender<Message>>>,
    /// Active method-call subscriptions, in registration order.
    matchers: StdMutex<Vec<MethodCallMatcher>>,
    /// Fan-out of inbound signals. `None` once closed.
    signals: StdMutex<Option<broadcast::Sender<Arc<Message>>>>,
    /// Reference counts of registered match rules, keyed by their wire
    /// string.
    rules: StdMutex<HashMap<String, usize>>,
    /// The demultiplexer task.
    reader: StdMutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Connect to the session bus.
    pub async fn session_bus() -> Result<Self> {
        Self::connect(&connection::session_bus_address()).await
    }

    /// Connect to the system bus.
    pub async fn system_bus() -> Result<Self> {
        Self::connect(&connection::system_bus_address()).await
    }

    /// Connect to the bus at the given address. Only `unix:path=` addresses
    /// are supported.
    pub async fn connect(address: &str) -> Result<Self> {
        let stream = connection::connect(address).await?;
        Self::from_stream(stream).await
    }

    /// Run a session over an already opened stream: authenticate, start the
    /// demultiplexer and say `Hello` to the bus.
    pub async fn from_stream(mut stream: UnixStream) -> Result<Self> {
        let guid = sasl::authenticate(&mut stream, sasl::HANDSHAKE_TIMEOUT).await?;
        let (read_half, write_half) = stream.into_split();

        let (signals, _) = broadcast::channel(BROADCAST_CAPACITY);

        let shared = Arc::new(Shared {
            guid: guid.into(),
            closing: AtomicBool::new(false),
            serial: AtomicU32::new(1),
            matcher_id: AtomicU64::new(1),
            bus_name: OnceLock::new(),
            writer: Mutex::new(Some(write_half)),
            replies: StdMutex::new(HashMap::new()),
            matchers: StdMutex::new(Vec::new()),
            signals: StdMutex::new(Some(signals)),
            rules: StdMutex::new(HashMap::new()),
            reader: StdMutex::new(None),
        });

        let handle = tokio::spawn(read_task(Arc::downgrade(&shared), read_half));
        *shared.reader.lock().unwrap() = Some(handle);

        let client = Self { shared };

        match client.hello().await {
            Ok(name) => {
                let _ = client.shared.bus_name.set(name.into());
            }
            Err(error) => {
                client.close().await;
                return Err(error);
            }
        }

        debug!(guid = &*client.shared.guid, name = client.unique_name(), "connected");
        Ok(client)
    }

    /// The GUID reported by the server during the handshake.
    pub fn guid(&self) -> &str {
        &self.shared.guid
    }

    /// The unique connection name assigned by the bus.
    pub fn unique_name(&self) -> Option<&str> {
        self.shared.bus_name.get().map(|name| &**name)
    }

    /// Allocate the next outbound serial.
    pub fn next_serial(&self) -> u32 {
        self.shared.next_serial()
    }

    /// Send a message.
    ///
    /// A serial is allocated unless the message already carries one. Sends
    /// are ordered by the order callers reach this method.
    ///
    /// # Errors
    ///
    /// Errors with "Client is closed" once [`close()`] has been called.
    ///
    /// [`close()`]: Self::close
    pub async fn send_message(&self, message: Message) -> Result<u32> {
        self.shared.send(message).await
    }

    /// Call a method and wait for its reply, with the default 3 second
    /// timeout.
    ///
    /// An error reply is surfaced as an [`Error`] carrying the error name;
    /// see [`Error::error_name`].
    pub async fn call_method(&self, message: Message) -> Result<Message> {
        self.call_method_with_timeout(message, DEFAULT_CALL_TIMEOUT).await
    }

    /// Call a method and wait up to `duration` for its reply.
    pub async fn call_method_with_timeout(
        &self,
        mut message: Message,
        duration: Duration,
    ) -> Result<Message> {
        if message.header.serial == 0 {
            message.header.serial = self.shared.next_serial();
        }

        let serial = message.header.serial;
        let (tx, rx) = oneshot::channel();
        self.shared.replies.lock().unwrap().insert(serial, tx);

        if let Err(error) = self.shared.send(message).await {
            self.shared.replies.lock().unwrap().remove(&serial);
            return Err(error);
        }

        let reply = match timeout(duration, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(..)) => return Err(Error::new(ErrorKind::Disconnected)),
            Err(..) => {
                // Late replies find no waiter and are dropped by the
                // demultiplexer.
                self.shared.replies.lock().unwrap().remove(&serial);
                return Err(Error::new(ErrorKind::CallTimedOut));
            }
        };

        if reply.header.message_type == MessageType::Error {
            let name = reply.header.fields.error_name.clone().unwrap_or_default();
            let text = reply
                .body
                .first()
                .and_then(Value::as_str)
                .unwrap_or_default();

            return Err(Error::new(ErrorKind::ResponseError(
                name.into(),
                text.into(),
            )));
        }

        Ok(reply)
    }

    /// Reply to a received method call.
    ///
    /// The reply is addressed to the call's sender and carries the call's
    /// serial as its reply serial.
    pub async fn send_reply(&self, call: &Message, body: Vec<Value>) -> Result<()> {
        let mut reply = Message::method_return(call.header.serial).with_body_values(body);

        if let Some(sender) = &call.header.fields.sender {
            reply = reply.with_destination(sender.clone());
        }

        self.shared.send(reply).await?;
        Ok(())
    }

    /// Reply to a received method call with an error.
    pub async fn send_error_reply(
        &self,
        call: &Message,
        error_name: &str,
        text: &str,
    ) -> Result<()> {
        let mut reply = Message::error(error_name, call.header.serial);

        if !text.is_empty() {
            reply = reply.with_body(text);
        }

        if let Some(sender) = &call.header.fields.sender {
            reply = reply.with_destination(sender.clone());
        }

        self.shared.send(reply).await?;
        Ok(())
    }

    /// Subscribe to inbound method calls whose path, interface and member
    /// match the given patterns. Absent patterns match anything; a present
    /// pattern requires the field to be present.
    ///
    /// The subscriber owns the calls it receives and is responsible for
    /// replying, typically via [`send_reply()`]. Calls claimed by a
    /// subscription are not answered by the fallback `UnknownMethod`
    /// responder.
    ///
    /// [`send_reply()`]: Self::send_reply
    pub fn method_call_stream(
        &self,
        path: Option<Pattern>,
        interface: Option<Pattern>,
        member: Option<Pattern>,
    ) -> MethodCallStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.shared.matcher_id.fetch_add(1, Ordering::Relaxed);

        self.shared.matchers.lock().unwrap().push(MethodCallMatcher {
            id,
            path,
            interface,
            member,
            tx,
        });

        MethodCallStream {
            rx,
            shared: self.shared.clone(),
            id,
        }
    }

    /// Subscribe to signals matching the given path, interface, member and
    /// sender.
    ///
    /// The first subscriber for a rule registers it at the bus with
    /// `AddMatch`; dropping the last subscriber deregisters it with
    /// `RemoveMatch`.
    pub async fn signal_stream(
        &self,
        path: Option<&str>,
        interface: Option<&str>,
        member: Option<&str>,
        sender: Option<&str>,
    ) -> Result<SignalStream> {
        let mut rule = MatchRule::new().with_type(MessageType::Signal);

        if let Some(path) = path {
            rule = rule.with_path(path);
        }

        if let Some(interface) = interface {
            rule = rule.with_interface(interface);
        }

        if let Some(member) = member {
            rule = rule.with_member(member);
        }

        if let Some(sender) = sender {
            rule = rule.with_sender(sender);
        }

        self.subscribe_signals(rule).await
    }

    /// Subscribe to signals matching an arbitrary rule.
    pub async fn subscribe_signals(&self, rule: MatchRule) -> Result<SignalStream> {
        let key = rule.serialize();

        let rx = {
            let signals = self.shared.signals.lock().unwrap();

            match &*signals {
                Some(tx) => tx.subscribe(),
                None => return Err(Error::new(ErrorKind::Closed)),
            }
        };

        let attach = {
            let mut rules = self.shared.rules.lock().unwrap();
            let count = rules.entry(key.clone()).or_insert(0);
            *count += 1;
            *count == 1
        };

        if attach {
            if let Err(error) = self.add_match(&key).await {
                release_rule(&self.shared, &key);
                return Err(error);
            }
        }

        Ok(SignalStream {
            rx,
            rule,
            key,
            shared: self.shared.clone(),
        })
    }

    /// Close the session.
    ///
    /// Closing is idempotent: the demultiplexer is cancelled, the socket is
    /// destroyed, pending waiters complete with "Connection closed" and
    /// further sends fail with "Client is closed".
    pub async fn close(&self) {
        self.shared.closing.store(true, Ordering::SeqCst);

        let handle = self.shared.reader.lock().unwrap().take();

        if let Some(handle) = handle {
            handle.abort();
        }

        *self.shared.writer.lock().await = None;
        self.shared.teardown();
        debug!("client closed");
    }
}

impl Shared {
    fn next_serial(&self) -> u32 {
        self.serial.fetch_add(1, Ordering::Relaxed)
    }

    /// The single outbound path: every frame leaves through here.
    async fn send(&self, mut message: Message) -> Result<u32> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::Closed));
        }

        if message.header.serial == 0 {
            message.header.serial = self.next_serial();
        }

        let bytes = message.to_bytes()?;

        let mut writer = self.writer.lock().await;

        let Some(writer) = writer.as_mut() else {
            return Err(Error::new(ErrorKind::Closed));
        };

        writer.write_all(&bytes).await?;
        Ok(message.header.serial)
    }

    /// Complete every waiter and subscription. Dropping the reply senders
    /// completes pending calls with "Connection closed"; dropping the
    /// broadcast sender ends signal streams.
    fn teardown(&self) {
        self.replies.lock().unwrap().clear();
        self.matchers.lock().unwrap().clear();
        *self.signals.lock().unwrap() = None;
    }
}

struct MethodCallMatcher {
    id: u64,
    path: Option<Pattern>,
    interface: Option<Pattern>,
    member: Option<Pattern>,
    tx: mpsc::UnboundedSender<Message>,
}

impl MethodCallMatcher {
    fn is_match(&self, message: &Message) -> bool {
        let fields = &message.header.fields;

        pattern_match(&self.path, &fields.path)
            && pattern_match(&self.interface, &fields.interface)
            && pattern_match(&self.member, &fields.member)
    }
}

fn pattern_match(pattern: &Option<Pattern>, field: &Option<String>) -> bool {
    match (pattern, field) {
        (None, _) => true,
        (Some(pattern), Some(field)) => pattern.matches(field),
        (Some(..), None) => false,
    }
}

/// A stream of method calls claimed by a subscription.
pub struct MethodCallStream {
    rx: mpsc::UnboundedReceiver<Message>,
    shared: Arc<Shared>,
    id: u64,
}

impl MethodCallStream {
    /// The next method call, or `None` once the session has closed.
    pub async fn next(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}

impl Drop for MethodCallStream {
    fn drop(&mut self) {
        self.shared
            .matchers
            .lock()
            .unwrap()
            .retain(|matcher| matcher.id != self.id);
    }
}

/// A stream of signals matching one rule.
pub struct SignalStream {
    rx: broadcast::Receiver<Arc<Message>>,
    rule: MatchRule,
    key: String,
    shared: Arc<Shared>,
}

impl SignalStream {
    /// The rule this stream filters with.
    pub fn rule(&self) -> &MatchRule {
        &self.rule
    }

    /// The next matching signal, or `None` once the session has closed.
    pub async fn next(&mut self) -> Option<Arc<Message>> {
        loop {
            match self.rx.recv().await {
                Ok(message) => {
                    if self.rule.is_match(&message) {
                        return Some(message);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "slow signal subscriber, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for SignalStream {
    fn drop(&mut self) {
        if !release_rule(&self.shared, &self.key) {
            return;
        }

        if self.shared.closing.load(Ordering::SeqCst) {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let shared = self.shared.clone();
        let key = std::mem::take(&mut self.key);

        runtime.spawn(async move {
            let client = Client { shared };

            if let Err(error) = client.remove_match(&key).await {
                match error.kind() {
                    ErrorKind::Closed | ErrorKind::Disconnected => {}
                    _ => warn!(%error, rule = %key, "failed to remove match rule"),
                }
            }
        });
    }
}

/// Decrement the reference count of a rule, returning `true` when the last
/// subscriber detached.
fn release_rule(shared: &Shared, key: &str) -> bool {
    let mut rules = shared.rules.lock().unwrap();

    let Some(count) = rules.get_mut(key) else {
        return false;
    };

    *count -= 1;

    if *count > 0 {
        return false;
    }

    rules.remove(key);
    true
}

/// The demultiplexer: reads frames off the socket, decodes them and hands
/// each message to the dispatcher.
///
/// Holds only a weak reference to the session while waiting so an
/// abandoned session can be collected.
async fn read_task(shared: Weak<Shared>, mut stream: OwnedReadHalf) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    'outer: loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(error) => {
                warn!(%error, "bus connection read failed");
                break;
            }
        };

        buf.extend_from_slice(&chunk[..n]);

        // Decode as many complete messages as are buffered. A message
        // split across reads stays buffered until the rest arrives.
        loop {
            let total = match Message::frame_length(&buf) {
                Ok(Some(total)) => total,
                Ok(None) => break,
                Err(error) => {
                    warn!(%error, "invalid message framing, dropping connection");
                    break 'outer;
                }
            };

            if buf.len() < total {
                break;
            }

            let Some(shared) = shared.upgrade() else {
                return;
            };

            // Each frame gets its own reader, so alignment is measured
            // from the first byte of the message.
            let mut reader = ByteReader::new(&buf[..total], Endianness::NATIVE);

            match Message::unmarshal(&mut reader) {
                Ok(message) => dispatch(&shared, message),
                Err(error) => warn!(%error, "dropping undecodable message"),
            }

            buf.drain(..total);
        }
    }

    if let Some(shared) = shared.upgrade() {
        debug!("bus connection ended");
        shared.closing.store(true, Ordering::SeqCst);
        shared.teardown();
    }
}

fn dispatch(shared: &Arc<Shared>, message: Message) {
    match message.header.message_type {
        MessageType::MethodReturn | MessageType::Error => {
            let Some(serial) = message.reply_serial() else {
                debug!("dropping reply without a reply serial");
                return;
            };

            let waiter = shared.replies.lock().unwrap().remove(&serial);

            match waiter {
                Some(tx) => {
                    // The waiter may have timed out in the meantime.
                    let _ = tx.send(message);
                }
                None => debug!(serial, "dropping reply with no waiter"),
            }
        }
        MessageType::MethodCall => {
            {
                let mut matchers = shared.matchers.lock().unwrap();
                matchers.retain(|matcher| !matcher.tx.is_closed());

                if let Some(matcher) = matchers.iter().find(|m| m.is_match(&message)) {
                    let _ = matcher.tx.send(message);
                    return;
                }
            }

            if message.header.flags.contains(Flags::NO_REPLY_EXPECTED) {
                return;
            }

            let shared = shared.clone();

            tokio::spawn(async move {
                let mut reply = Message::error(UNKNOWN_METHOD, message.header.serial);

                if let Some(sender) = &message.header.fields.sender {
                    reply = reply.with_destination(sender.clone());
                }

                if let Err(error) = shared.send(reply).await {
                    debug!(%error, "failed to send fallback error reply");
                }
            });
        }
        MessageType::Signal => {
            let signals = shared.signals.lock().unwrap();

            if let Some(tx) = &*signals {
                // Sending fails when no subscriber is attached.
                let _ = tx.send(Arc::new(message));
            }
        }
    }
}
