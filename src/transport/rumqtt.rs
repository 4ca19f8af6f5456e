// SPDX-License-Identifier: GPL-3.0-or-later
//! A synchronous rumqttc-backed [`MqttClient`].

use std::time::Duration;

use rumqttc::{Client, Connection, Event, LastWill, MqttOptions, Packet, Transport};
use tracing::{debug, warn};

use super::{ConnectReturnCode, MqttClient, OnConnect, QoS};
use crate::error::TransportError;
use crate::settings::MqttSettings;

/// How many requests the rumqttc client queues internally.
const REQUEST_CAPACITY: usize = 10;

/// An [`MqttClient`] built on rumqttc's synchronous client.
///
/// The client is created in a disconnected state so the device can register
/// its last-will message first; rumqttc only honors a last will that is part
/// of the connection options. Call [`connect`][RumqttcClient::connect] after
/// device construction, then drive the connection by calling
/// [`poll`][RumqttcClient::poll] from the application's main loop. `poll`
/// fires the registered on-connect callback when the broker acknowledges the
/// session, which is what triggers re-announcement of every entity.
pub struct RumqttcClient {
    options: MqttOptions,
    client: Option<Client>,
    connection: Option<Connection>,
    connected: bool,
    on_connect: Option<OnConnect>,
}

impl RumqttcClient {
    pub fn new<S: Into<String>>(client_id: S, host: S, port: u16) -> Self {
        Self {
            options: MqttOptions::new(client_id, host, port),
            client: None,
            connection: None,
            connected: false,
            on_connect: None,
        }
    }

    /// Build a client from parsed [`MqttSettings`].
    pub fn from_settings(settings: &MqttSettings) -> Self {
        let (host, port) = settings.server.host_port();
        let mut options = MqttOptions::new(settings.name.clone(), host.to_string(), port);
        if settings.server.is_tls() {
            options.set_transport(Transport::tls_with_default_config());
        }
        if let Some(username) = &settings.username {
            let password = settings
                .password
                .as_ref()
                .map_or_else(String::new, |p| p.as_str().to_string());
            options.set_credentials(username.clone(), password);
        }
        if let Some(keep_alive) = settings.keep_alive {
            options.set_keep_alive(Duration::from_secs(u64::from(keep_alive)));
        }
        Self {
            options,
            client: None,
            connection: None,
            connected: false,
            on_connect: None,
        }
    }

    /// Open the network connection.
    ///
    /// The last will and the on-connect callback must already be in place;
    /// both are wired up by device construction.
    pub fn connect(&mut self) {
        let (client, connection) = Client::new(self.options.clone(), REQUEST_CAPACITY);
        self.client = Some(client);
        self.connection = Some(connection);
    }

    /// Drive the connection forward by one event.
    ///
    /// Tracks the session state and dispatches the on-connect callback on
    /// CONNACK. Network errors are returned so the caller can decide whether
    /// to keep polling (rumqttc reconnects on the next iteration).
    pub fn poll(&mut self) -> Result<(), TransportError> {
        let mut connection = match self.connection.take() {
            Some(connection) => connection,
            None => return Err(TransportError::new("poll called before connect")),
        };
        let event = connection.iter().next();
        self.connection = Some(connection);
        match event {
            Some(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                let code = translate_code(ack.code);
                self.connected = code.is_accepted();
                debug!(code = %code, "received CONNACK");
                self.dispatch_on_connect(code);
                Ok(())
            }
            Some(Ok(Event::Incoming(Packet::Disconnect))) => {
                self.connected = false;
                Ok(())
            }
            Some(Ok(_)) | None => Ok(()),
            Some(Err(error)) => {
                self.connected = false;
                Err(TransportError::with_source("connection error", error))
            }
        }
    }

    fn dispatch_on_connect(&mut self, code: ConnectReturnCode) {
        // Taken out of self so the callback can borrow the client mutably.
        let mut callback = match self.on_connect.take() {
            Some(callback) => callback,
            None => return,
        };
        callback(self, code);
        self.on_connect = Some(callback);
    }
}

impl MqttClient for RumqttcClient {
    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
        qos: QoS,
    ) -> Result<(), TransportError> {
        match self.client.as_mut() {
            Some(client) => client
                .publish(topic, translate_qos(qos), retain, payload.to_vec())
                .map_err(|e| TransportError::with_source("publish failed", e)),
            None => Err(TransportError::new("publish before connect")),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn will_set(&mut self, topic: &str, payload: &[u8], qos: QoS, retain: bool) {
        if self.client.is_some() {
            warn!(topic = %topic, "last will registered after connect has no effect");
            return;
        }
        self.options.set_last_will(LastWill::new(
            topic,
            payload.to_vec(),
            translate_qos(qos),
            retain,
        ));
    }

    fn set_on_connect(&mut self, callback: OnConnect) {
        self.on_connect = Some(callback);
    }
}

fn translate_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

fn translate_code(code: rumqttc::ConnectReturnCode) -> ConnectReturnCode {
    use rumqttc::ConnectReturnCode::*;
    match code {
        Success => ConnectReturnCode::Accepted,
        RefusedProtocolVersion => ConnectReturnCode::RefusedProtocolVersion,
        BadClientId => ConnectReturnCode::BadClientId,
        ServiceUnavailable => ConnectReturnCode::ServiceUnavailable,
        BadUserNamePassword => ConnectReturnCode::BadCredentials,
        NotAuthorized => ConnectReturnCode::NotAuthorized,
    }
}
