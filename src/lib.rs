// SPDX-License-Identifier: GPL-3.0-or-later
//! Announce devices and entities to Home Assistant over MQTT discovery.
//!
//! A [`Device`] owns a set of entities and a transport client. Each entity
//! publishes a retained discovery document describing itself, then availability
//! and state updates on well-known topics; Home Assistant builds its UI from
//! those messages without any hub-side configuration.
//!
//! ```no_run
//! use minihass::{BinarySensorBuilder, Device, RumqttcClient, SharedClient};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! # fn main() -> Result<(), minihass::Error> {
//! let client = Rc::new(RefCell::new(RumqttcClient::new(
//!     "greenhouse",
//!     "broker.local",
//!     1883,
//! )));
//! let shared: SharedClient = client.clone();
//!
//! // Build the device before connecting: the last-will registration and the
//! // on-connect handler only take effect on a fresh session.
//! let door = BinarySensorBuilder::new()
//!     .name("Greenhouse Door")
//!     .device_class("door")
//!     .build()?
//!     .into_handle();
//! let device = Device::builder(shared)
//!     .name("Greenhouse")
//!     .entity(&door)
//!     .build()?;
//!
//! client.borrow_mut().connect();
//! loop {
//!     // Polling fires the on-connect handler, which re-announces every
//!     // entity and flushes queued states.
//!     if let Err(error) = client.borrow_mut().poll() {
//!         eprintln!("mqtt: {}", error);
//!     }
//!     door.borrow_mut().set_state(true);
//! #   break;
//! }
//! # let _ = device;
//! # Ok(())
//! # }
//! ```
//!
//! # Threading
//!
//! Everything here is single-threaded and callback-driven. Entities and
//! devices are shared through `Rc<RefCell<_>>`; all mutation happens
//! synchronously inside property setters, explicit method calls, or the
//! transport's on-connect callback. Nothing in this crate blocks except the
//! transport publish itself, and nothing retries in the background: a queued
//! state is a flag, flushed by [`Device::publish_state_queue`] or the
//! on-connect handler.
//!
//! # Failure policy
//!
//! Construction and validation errors always propagate; a misconfigured entity
//! never silently exists. Transient publish failures are logged and queued or
//! dropped per [`QueueMode`], and the boolean results of
//! [`Device::add_entity`], [`Device::delete_entity`] and
//! [`Device::publish_state_queue`] are the definitive success signals.
//!
//! Diagnostics go through [`tracing`]; install any subscriber (for example
//! `tracing_subscriber` filtered by `RUST_LOG`) to see them.

mod binary_sensor;
mod device;
mod discovery;
mod entity;
mod error;
mod identity;
mod sensor;
mod serialize;
mod settings;
pub mod topic;
mod transport;
pub mod validators;

pub use binary_sensor::BinarySensorBuilder;
pub use device::{Connection, Device, DeviceBuilder};
pub use entity::{Component, Entity, EntityCategory, EntityHandle, QueueMode};
pub use error::{Error, TransportError};
pub use identity::{ChipId, CHIP_ID_ENV};
pub use sensor::SensorBuilder;
pub use settings::{ExternalValue, MqttSettings, MqttUrl};
pub use transport::{ConnectReturnCode, MqttClient, OnConnect, QoS, RumqttcClient, SharedClient};
