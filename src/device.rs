// SPDX-License-Identifier: GPL-3.0-or-later
//! A device: the owner of entities and of the transport client.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use mac_address::MacAddress;
use serde::ser::SerializeTuple;
use serde::{Serialize, Serializer};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::entity::EntityHandle;
use crate::error::Error;
use crate::identity::ChipId;
use crate::topic;
use crate::transport::{ConnectReturnCode, MqttClient, QoS, SharedClient};
use crate::validators;

const DEFAULT_NAME: &str = "MQTT Device";

/// A connection a device has to the outside world, from the fixed set the
/// device registry understands. Serialized as a `(kind, address)` pair.
#[derive(Clone, Debug, PartialEq)]
pub enum Connection {
    Mac(MacAddress),
    Upnp(Uuid),
    Zigbee(String),
}

impl Connection {
    fn kind(&self) -> &'static str {
        match self {
            Connection::Mac(_) => "mac",
            Connection::Upnp(_) => "upnp",
            Connection::Zigbee(_) => "zigbee",
        }
    }
}

impl Serialize for Connection {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(self.kind())?;
        match self {
            Connection::Mac(mac) => tuple.serialize_element(mac)?,
            Connection::Upnp(uuid) => tuple.serialize_element(uuid)?,
            Connection::Zigbee(address) => tuple.serialize_element(address)?,
        }
        tuple.end()
    }
}

/// The `dev` block merged into every owned entity's discovery document.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct DeviceBlock {
    #[serde(rename = "mf", skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    #[serde(rename = "hw", skip_serializing_if = "Option::is_none")]
    pub hw_version: Option<String>,

    #[serde(rename = "ids")]
    pub identifiers: Vec<String>,

    #[serde(rename = "cns")]
    pub connections: Vec<Connection>,
}

pub(crate) struct DeviceInner {
    pub(crate) device_id: String,
    pub(crate) name: String,
    pub(crate) manufacturer: Option<String>,
    pub(crate) hw_version: Option<String>,
    pub(crate) connections: Vec<Connection>,
    pub(crate) available: bool,
    pub(crate) entities: Vec<EntityHandle>,
    pub(crate) client: SharedClient,
}

impl DeviceInner {
    pub(crate) fn block(&self) -> DeviceBlock {
        DeviceBlock {
            manufacturer: self.manufacturer.clone(),
            hw_version: self.hw_version.clone(),
            identifiers: vec![self.device_id.clone()],
            connections: self.connections.clone(),
        }
    }

    pub(crate) fn availability_topic(&self) -> String {
        topic::device_availability(&self.device_id)
    }

    pub(crate) fn state_topic(&self) -> String {
        topic::device_state(&self.device_id)
    }

    fn handles(&self) -> Vec<EntityHandle> {
        self.entities.clone()
    }
}

/// A Home Assistant device: aggregates entities and drives their lifecycle
/// over one shared transport client.
///
/// Construct devices over a client that has *not* connected yet. Construction
/// registers the last-will message and the on-connect handler, and neither
/// has any effect on a session that is already open.
pub struct Device {
    inner: Rc<RefCell<DeviceInner>>,
}

impl Device {
    pub fn builder(client: SharedClient) -> DeviceBuilder {
        DeviceBuilder::new(client)
    }

    pub fn device_id(&self) -> String {
        self.inner.borrow().device_id.clone()
    }

    pub fn name(&self) -> String {
        self.inner.borrow().name.clone()
    }

    pub fn availability(&self) -> bool {
        self.inner.borrow().available
    }

    /// A snapshot of the owned entities, in insertion order.
    pub fn entities(&self) -> Vec<EntityHandle> {
        self.inner.borrow().handles()
    }

    /// Take ownership of an entity and announce it.
    ///
    /// Adding a member twice is a no-op returning `false`. The immediate
    /// announcement is best-effort; before the first connect it fails quietly
    /// and the on-connect handler announces everything instead.
    pub fn add_entity(&self, entity: &EntityHandle) -> bool {
        if self.member_position(entity).is_some() {
            return false;
        }
        self.inner.borrow_mut().entities.push(Rc::clone(entity));
        entity.borrow_mut().attach(Rc::downgrade(&self.inner));
        if let Err(error) = entity.borrow_mut().announce() {
            debug!(error = %error, "initial announcement deferred");
        }
        true
    }

    /// Withdraw and detach an entity. Returns `false` for non-members, so
    /// repeated deletion is a no-op.
    pub fn delete_entity(&self, entity: &EntityHandle) -> bool {
        let position = match self.member_position(entity) {
            Some(position) => position,
            None => return false,
        };
        // Withdraw first, while the entity still resolves the device-scoped
        // discovery topic.
        if let Err(error) = entity.borrow_mut().withdraw() {
            warn!(error = %error, "unable to withdraw entity during removal");
        }
        self.inner.borrow_mut().entities.remove(position);
        entity.borrow_mut().detach();
        true
    }

    /// Re-announce every owned entity, in insertion order.
    pub fn announce(&self) -> Result<(), Error> {
        let client = self.client();
        let mut client = client.borrow_mut();
        if !client.is_connected() {
            return Err(Error::NotConnected);
        }
        announce_all(&self.inner, &mut *client);
        Ok(())
    }

    /// Update device availability and immediately try to publish it. Failures
    /// are logged, never propagated.
    pub fn set_availability(&self, available: bool) {
        self.inner.borrow_mut().available = available;
        if let Err(error) = self.publish_availability() {
            warn!(
                error = %error,
                device_id = %self.device_id(),
                "unable to publish device availability"
            );
        }
    }

    /// Explicitly publish the device's availability, propagating failures.
    pub fn publish_availability(&self) -> Result<(), Error> {
        let client = self.client();
        let mut client = client.borrow_mut();
        publish_device_availability(&self.inner, &mut *client)
    }

    /// Retry the state publish for every entity whose earlier publish was
    /// queued. Returns whether at least one publish was attempted.
    pub fn publish_state_queue(&self) -> bool {
        let client = self.client();
        let mut client = client.borrow_mut();
        flush_state_queue(&self.inner, &mut *client)
    }

    fn member_position(&self, entity: &EntityHandle) -> Option<usize> {
        self.inner
            .borrow()
            .entities
            .iter()
            .position(|member| Rc::ptr_eq(member, entity))
    }

    fn client(&self) -> SharedClient {
        Rc::clone(&self.inner.borrow().client)
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Device")
            .field("device_id", &inner.device_id)
            .field("name", &inner.name)
            .field("available", &inner.available)
            .field("entities", &inner.entities.len())
            .finish()
    }
}

/// Connection-complete handler.
///
/// On success the ordering is deliberate: discovery configs first so the hub
/// knows the topics, then queued states, then device availability last, so the
/// hub never sees an available device with undeclared entities. A refused
/// connection is logged and nothing more; reconnecting is the transport's job.
fn handle_connect(
    inner: &Rc<RefCell<DeviceInner>>,
    client: &mut dyn MqttClient,
    code: ConnectReturnCode,
) {
    if !code.is_accepted() {
        error!(code = ?code, "MQTT connection refused: {}", code.reason());
        return;
    }
    debug!(device_id = %inner.borrow().device_id, "connected, re-announcing");
    announce_all(inner, client);
    flush_state_queue(inner, client);
    inner.borrow_mut().available = true;
    if let Err(error) = publish_device_availability(inner, client) {
        warn!(error = %error, "unable to publish device availability");
    }
}

fn announce_all(inner: &Rc<RefCell<DeviceInner>>, client: &mut dyn MqttClient) {
    for handle in inner.borrow().handles() {
        let mut entity = handle.borrow_mut();
        if let Err(error) = entity.announce_to(client) {
            warn!(
                error = %error,
                object_id = %entity.object_id(),
                "unable to announce entity"
            );
        }
    }
}

fn flush_state_queue(inner: &Rc<RefCell<DeviceInner>>, client: &mut dyn MqttClient) -> bool {
    let mut attempted = false;
    for handle in inner.borrow().handles() {
        let mut entity = handle.borrow_mut();
        if !entity.has_state() || !entity.state_queued() {
            continue;
        }
        attempted = true;
        if let Err(error) = entity.publish_state_to(client) {
            warn!(
                error = %error,
                object_id = %entity.object_id(),
                "queued state publish failed"
            );
        }
    }
    attempted
}

fn publish_device_availability(
    inner: &Rc<RefCell<DeviceInner>>,
    client: &mut dyn MqttClient,
) -> Result<(), Error> {
    if !client.is_connected() {
        return Err(Error::NotConnected);
    }
    let (availability_topic, available) = {
        let inner = inner.borrow();
        (inner.availability_topic(), inner.available)
    };
    let payload = if available {
        topic::PAYLOAD_ONLINE
    } else {
        topic::PAYLOAD_OFFLINE
    };
    client.publish(
        &availability_topic,
        payload.as_bytes(),
        true,
        QoS::AtLeastOnce,
    )?;
    Ok(())
}

/// Builder for a [`Device`].
pub struct DeviceBuilder {
    client: SharedClient,
    name: Option<String>,
    device_id: Option<String>,
    manufacturer: Option<String>,
    hw_version: Option<String>,
    connections: Vec<Connection>,
    chip_id: Option<ChipId>,
    entities: Vec<EntityHandle>,
}

impl DeviceBuilder {
    fn new(client: SharedClient) -> Self {
        Self {
            client,
            name: None,
            device_id: None,
            manufacturer: None,
            hw_version: None,
            connections: Vec::new(),
            chip_id: None,
            entities: Vec::new(),
        }
    }

    /// Friendly device name. Defaults to `"MQTT Device"`.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Explicit device identifier, used as given (normalized, no chip suffix).
    pub fn device_id<S: Into<String>>(mut self, device_id: S) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn manufacturer<S: Into<String>>(mut self, manufacturer: S) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    pub fn hw_version<S: Into<String>>(mut self, hw_version: S) -> Self {
        self.hw_version = Some(hw_version.into());
        self
    }

    pub fn connection(mut self, connection: Connection) -> Self {
        self.connections.push(connection);
        self
    }

    /// Use an explicit chip id instead of detecting the ambient one.
    pub fn chip_id(mut self, chip_id: ChipId) -> Self {
        self.chip_id = Some(chip_id);
        self
    }

    /// An entity to add as soon as the device exists.
    pub fn entity(mut self, entity: &EntityHandle) -> Self {
        self.entities.push(Rc::clone(entity));
        self
    }

    /// Build the device: derive its identity, register the last will on the
    /// (not yet connected) client, install the on-connect handler, and attach
    /// any initial entities.
    pub fn build(self) -> Result<Device, Error> {
        let name = validators::non_empty(self.name.as_deref())
            .unwrap_or(DEFAULT_NAME)
            .to_string();
        let device_id = match validators::non_empty(self.device_id.as_deref()) {
            Some(device_id) => validators::normalize_identifier(device_id, false)?,
            None => {
                let chip_id = match self.chip_id {
                    Some(chip_id) => chip_id,
                    None => ChipId::detect()?,
                };
                format!(
                    "{}{}",
                    validators::normalize_identifier(&name, false)?,
                    chip_id
                )
            }
        };
        let inner = Rc::new(RefCell::new(DeviceInner {
            device_id,
            name,
            manufacturer: self.manufacturer,
            hw_version: self.hw_version,
            connections: self.connections,
            available: false,
            entities: Vec::new(),
            client: Rc::clone(&self.client),
        }));
        {
            let mut client = self.client.borrow_mut();
            let will_topic = inner.borrow().availability_topic();
            client.will_set(
                &will_topic,
                topic::PAYLOAD_OFFLINE.as_bytes(),
                QoS::AtLeastOnce,
                true,
            );
            let weak = Rc::downgrade(&inner);
            client.set_on_connect(Box::new(move |client, code| {
                if let Some(inner) = weak.upgrade() {
                    handle_connect(&inner, client, code);
                }
            }));
        }
        let device = Device { inner };
        for entity in &self.entities {
            device.add_entity(entity);
        }
        Ok(device)
    }
}
