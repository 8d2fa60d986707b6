//! Resolving bus addresses and opening the transport.

use std::env;

use tokio::net::UnixStream;

use crate::error::{Error, ErrorKind, Result};

const ENV_SESSION_BUS: &str = "DBUS_SESSION_BUS_ADDRESS";
const ENV_SYSTEM_BUS: &str = "DBUS_SYSTEM_BUS_ADDRESS";
const ENV_RUNTIME_DIR: &str = "XDG_USER_DIR";
const DEFAULT_SYSTEM_BUS: &str = "unix:path=/run/dbus/system_bus_socket";

/// The address of the session bus.
///
/// Taken from `DBUS_SESSION_BUS_ADDRESS`, falling back to the `bus` socket
/// in the user's runtime directory.
pub(crate) fn session_bus_address() -> String {
    if let Ok(address) = env::var(ENV_SESSION_BUS) {
        return address;
    }

    let runtime_dir = match env::var(ENV_RUNTIME_DIR) {
        Ok(dir) => dir,
        Err(..) => format!("/run/user/{}", current_uid()),
    };

    format!("unix:path={runtime_dir}/bus")
}

/// The address of the system bus.
///
/// Taken from `DBUS_SYSTEM_BUS_ADDRESS`, falling back to the well-known
/// socket path.
pub(crate) fn system_bus_address() -> String {
    match env::var(ENV_SYSTEM_BUS) {
        Ok(address) => address,
        Err(..) => DEFAULT_SYSTEM_BUS.to_owned(),
    }
}

fn current_uid() -> u32 {
    if let Ok(uid) = env::var("UID") {
        if let Ok(uid) = uid.parse() {
            return uid;
        }
    }

    unsafe { libc::getuid() }
}

/// Extract the socket path from an address. Only `unix:path=` addresses are
/// supported.
pub(crate) fn parse_address(address: &str) -> Result<&str> {
    match address.strip_prefix("unix:path=") {
        Some(path) => Ok(path),
        None => Err(Error::new(ErrorKind::UnsupportedAddress)),
    }
}

/// Open the byte stream a bus address points at.
pub(crate) async fn connect(address: &str) -> Result<UnixStream> {
    let path = parse_address(address)?;
    Ok(UnixStream::connect(path).await?)
}

#[cfg(test)]
mod tests {
    use super::parse_address;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("unix:path=/run/user/1000/bus").unwrap(), "/run/user/1000/bus");
        assert!(parse_address("tcp:host=localhost,port=12345").is_err());
        assert!(parse_address("unix:abstract=/tmp/x").is_err());
        assert!(parse_address("/run/user/1000/bus").is_err());
    }
}
