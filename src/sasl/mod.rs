//! The SASL handshake which D-Bus performs before switching to the binary
//! protocol.
//!
//! Only the EXTERNAL mechanism is supported: the client announces its UID
//! and the server checks it against the socket's credentials.


use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::{Error, ErrorKind, Result};

/// The default timeout applied to each read of the handshake.
pub(crate) const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Authenticate as the current user and return the server GUID.
pub(crate) async fn authenticate<S>(stream: &mut S, deadline: Duration) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let uid = unsafe { libc::getuid() };
    authenticate_as(stream, uid, deadline).await
}

/// Drive the EXTERNAL handshake for the given UID.
///
/// The exchange is strictly ordered: a single NUL byte, `AUTH EXTERNAL`
/// with the hex-encoded UID, one `OK <guid>` response, then `BEGIN`. Any
/// other response fails the handshake.
pub(crate) async fn authenticate_as<S>(
    stream: &mut S,
    uid: u32,
    deadline: Duration,
) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(b"\0").await?;

    let auth = format!("AUTH EXTERNAL {}\r\n", external_payload(uid));
    stream.write_all(auth.as_bytes()).await?;
    stream.flush().await?;

    let line = read_line(stream, deadline).await?;
    let guid = parse_ok(&line)?;

    stream.write_all(b"BEGIN\r\n").await?;
    stream.flush().await?;
    Ok(guid.to_owned())
}

/// Hex-encode the ASCII decimal representation of `id`, as the EXTERNAL
/// mechanism requires.
pub(crate) fn external_payload(id: u32) -> String {
    const HEX: [u8; 16] = *b"0123456789abcdef";

    let mut out = String::new();

    for digit in id.to_string().into_bytes() {
        out.push(char::from(HEX[usize::from(digit >> 4)]));
        out.push(char::from(HEX[usize::from(digit & 0xf)]));
    }

    out
}

/// Match an `OK <guid>` response and capture the GUID.
fn parse_ok(line: &str) -> Result<&str> {
    let guid = match line.strip_prefix("OK ") {
        Some(guid) => guid,
        None => return Err(Error::new(ErrorKind::AuthRejected(line.into()))),
    };

    if guid.is_empty() || !guid.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::new(ErrorKind::AuthRejected(line.into())));
    }

    Ok(guid)
}

/// Read a single CRLF-terminated line.
///
/// Reads one byte at a time so nothing past the terminator is consumed,
/// since bytes after the handshake belong to the binary protocol.
async fn read_line<S>(stream: &mut S, deadline: Duration) -> Result<String>
where
    S: AsyncRead + Unpin,
{
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        let n = match timeout(deadline, stream.read(&mut byte)).await {
            Ok(n) => n?,
            Err(..) => return Err(Error::new(ErrorKind::AuthTimedOut)),
        };

        if n == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }

        if byte[0] == b'\n' {
            break;
        }

        line.push(byte[0]);
    }

    if line.last() == Some(&b'\r') {
        line.pop();
    }

    Ok(std::str::from_utf8(&line)?.to_owned())
}
