#![forbid(unsafe_code)]

//! Local address lookup for the device telemetry.
//!
//! Connecting a UDP socket only selects a route; nothing is sent. The
//! socket's local address is then the interface the telemetry server would
//! see traffic from.

use std::net::{IpAddr, UdpSocket};

use sensflow_runtime::{ReadError, ReadInput};

use crate::settings::SystemSettings;

/// Looks up the outbound address towards `server` on every read.
#[derive(Debug, Clone)]
pub struct RoutedAddress {
    server: String,
}

impl RoutedAddress {
    #[must_use]
    pub fn new(server: impl Into<String>) -> Self {
        Self { server: server.into() }
    }

    fn lookup(&self) -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.connect(self.server.as_str())?;
        Ok(socket.local_addr()?.ip())
    }
}

impl ReadInput<String> for RoutedAddress {
    fn read(&mut self) -> Result<String, ReadError> {
        match self.lookup() {
            Ok(ip) if ip.is_unspecified() => Err(ReadError::Disconnected(format!("no route to {}", self.server))),
            Ok(ip) => Ok(ip.to_string()),
            Err(err) => Err(ReadError::Disconnected(format!("no route to {}: {err}", self.server))),
        }
    }
}

/// The configured address, or a routed lookup when none is set.
pub fn address_source(system: &SystemSettings) -> Box<dyn FnMut() -> Result<String, ReadError>> {
    match &system.ip_address {
        Some(fixed) => {
            let fixed = fixed.clone();
            Box::new(move || Ok(fixed.clone()))
        }
        None => {
            let mut routed = RoutedAddress::new(system.telemetry_server.as_str());
            Box::new(move || routed.read())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_server_routes_through_loopback() {
        let mut routed = RoutedAddress::new("127.0.0.1:3000");
        let address = routed.read().expect("loopback is always routable");
        assert_eq!(address, "127.0.0.1");
    }

    #[test]
    fn unresolvable_server_is_a_disconnect() {
        let mut routed = RoutedAddress::new("not an address");
        assert!(matches!(routed.read(), Err(ReadError::Disconnected(_))));
    }

    #[test]
    fn configured_address_skips_the_lookup() {
        let system = SystemSettings {
            ip_address: Some("192.168.0.50".to_owned()),
            telemetry_server: "not an address".to_owned(),
            ..SystemSettings::default()
        };
        let mut source = address_source(&system);
        assert_eq!(source().expect("fixed"), "192.168.0.50");
    }
}
