// SPDX-License-Identifier: GPL-3.0-or-later
//! The capability set this crate consumes from an MQTT transport.
//!
//! The core never implements the protocol itself; it publishes through whatever
//! [`MqttClient`] the device was handed. A rumqttc-backed implementation is
//! provided in [`rumqtt`], and tests substitute a recording stub.

mod rumqtt;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::error::TransportError;

pub use rumqtt::RumqttcClient;

/// MQTT delivery guarantees, by wire value.
#[derive(Clone, Copy, Debug, Deserialize_repr, Eq, PartialEq, Serialize_repr)]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

/// The CONNACK result the broker answered a connection attempt with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectReturnCode {
    Accepted,
    RefusedProtocolVersion,
    BadClientId,
    ServiceUnavailable,
    BadCredentials,
    NotAuthorized,
}

impl ConnectReturnCode {
    pub fn is_accepted(self) -> bool {
        self == ConnectReturnCode::Accepted
    }

    /// The broker's reason for refusing the connection, suitable for logging.
    pub fn reason(self) -> &'static str {
        match self {
            ConnectReturnCode::Accepted => "connection accepted",
            ConnectReturnCode::RefusedProtocolVersion => {
                "the broker does not support this protocol version"
            }
            ConnectReturnCode::BadClientId => "the broker rejected the client identifier",
            ConnectReturnCode::ServiceUnavailable => "the MQTT service is unavailable",
            ConnectReturnCode::BadCredentials => "bad user name or password",
            ConnectReturnCode::NotAuthorized => "the client is not authorized to connect",
        }
    }
}

impl fmt::Display for ConnectReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Callback invoked by the transport once a connection handshake completes.
///
/// The client is passed back in so the handler can publish without re-entering
/// whatever shared handle the transport lives behind.
pub type OnConnect = Box<dyn FnMut(&mut dyn MqttClient, ConnectReturnCode)>;

/// A transport client shared between a device and its entities.
///
/// Everything in this crate is single-threaded and callback-driven, so plain
/// `Rc<RefCell<_>>` sharing is sufficient; see the crate docs for the threading
/// contract.
pub type SharedClient = Rc<RefCell<dyn MqttClient>>;

/// The operations the lifecycle core needs from an MQTT transport.
pub trait MqttClient {
    /// Publish a payload. Errors here are broker or network level failures;
    /// the caller decides whether to propagate, log, or queue.
    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
        qos: QoS,
    ) -> Result<(), TransportError>;

    /// Whether the client currently holds an open session with a broker.
    fn is_connected(&self) -> bool;

    /// Register the last-will message the broker publishes if this client
    /// disappears uncleanly. Must be called before the client connects;
    /// registration after connect has no effect.
    fn will_set(&mut self, topic: &str, payload: &[u8], qos: QoS, retain: bool);

    /// Install the connection-complete callback.
    fn set_on_connect(&mut self, callback: OnConnect);
}


#[cfg(test)]
mod test {
    use super::{ConnectReturnCode, QoS};

    #[test]
    fn qos_wire_values() {
        assert_eq!(serde_json::to_string(&QoS::AtMostOnce).unwrap(), "0");
        assert_eq!(serde_json::to_string(&QoS::AtLeastOnce).unwrap(), "1");
        assert_eq!(serde_json::to_string(&QoS::ExactlyOnce).unwrap(), "2");
    }

    #[test]
    fn refusal_reasons_name_the_cause() {
        assert!(!ConnectReturnCode::BadCredentials.is_accepted());
        assert_eq!(
            ConnectReturnCode::BadCredentials.to_string(),
            "bad user name or password"
        );
        assert!(ConnectReturnCode::Accepted.is_accepted());
    }
}
