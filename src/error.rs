// SPDX-License-Identifier: GPL-3.0-or-later
use std::error::Error as StdError;

use thiserror::Error;

/// The errors surfaced by this crate.
///
/// There are two families here. Construction and validation problems
/// ([`Configuration`][Error::Configuration], [`InvalidFormat`][Error::InvalidFormat],
/// [`InvalidValue`][Error::InvalidValue]) always propagate to the caller; an entity or
/// device that can't derive its identity must never silently exist. Connectivity
/// problems ([`Transport`][Error::Transport]) are treated as expected and transient:
/// the mutating entry points catch them, log them, and fall back to the queueing
/// policy, because the on-connect handler re-announces everything anyway.
#[derive(Debug, Error)]
pub enum Error {
    /// Required identity input is missing or contradictory.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Input that can't be normalized into the requested grammar.
    #[error("{input:?} cannot be normalized into a valid {target}")]
    InvalidFormat {
        input: String,
        target: &'static str,
    },

    /// A value outside the set a field accepts.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// A discovery or state document failed to serialize.
    #[error("unable to serialize payload")]
    Payload(#[from] serde_json::Error),

    /// A publish was requested but no MQTT client is configured.
    #[error("no MQTT client is configured")]
    NoClient,

    /// The MQTT client exists but reports it isn't connected to a broker.
    #[error("the MQTT client is not connected")]
    NotConnected,

    /// The transport client reported a broker or network level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A broker/network level failure reported by an [`MqttClient`][crate::MqttClient]
/// implementation.
#[derive(Debug, Error)]
#[error("transport failure: {message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl TransportError {
    pub fn new<M: Into<String>>(message: M) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source<M, E>(message: M, source: E) -> Self
    where
        M: Into<String>,
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
