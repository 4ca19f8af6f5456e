// SPDX-License-Identifier: GPL-3.0-or-later
//! The entity lifecycle core: identity, discovery, availability and state.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::binary_sensor::BinarySensorConfig;
use crate::device::DeviceInner;
use crate::discovery::{self, merge_fragment, AvailabilityTopic, CoreConfig, DeviceFragment};
use crate::error::Error;
use crate::identity::ChipId;
use crate::sensor::SensorConfig;
use crate::serialize;
use crate::topic;
use crate::transport::{MqttClient, QoS, SharedClient};
use crate::validators;

/// The Home Assistant component an entity shows up as.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Component {
    BinarySensor,
    Sensor,
}

impl Component {
    /// The component name used inside topic paths.
    pub fn name(self) -> &'static str {
        match self {
            Component::BinarySensor => "binary_sensor",
            Component::Sensor => "sensor",
        }
    }

    /// Whether this component carries a publishable state.
    pub(crate) fn has_state(self) -> bool {
        match self {
            Component::BinarySensor | Component::Sensor => true,
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where Home Assistant files the entity in its UI.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityCategory {
    Config,
    Diagnostic,
}

impl FromStr for EntityCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "config" => Ok(EntityCategory::Config),
            "diagnostic" => Ok(EntityCategory::Diagnostic),
            other => Err(Error::InvalidValue(format!(
                "invalid entity category {:?}, must be one of (diagnostic|config)",
                other
            ))),
        }
    }
}

/// Policy for state changes that can't be published immediately.
///
/// Queueing is not a background task; a queued state sits behind a flag until
/// something calls [`publish_state`][Entity::publish_state] or the owning
/// device flushes its queue, typically from the on-connect handler.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueueMode {
    /// Failed publishes are only logged.
    Never,
    /// A failed publish leaves the state queued for a later flush.
    OnDemand,
    /// Every state change is queued; nothing is published until a flush.
    Always,
}

impl Default for QueueMode {
    fn default() -> Self {
        QueueMode::OnDemand
    }
}

/// A shareable handle to an entity.
///
/// Everything here is single-threaded (see the crate docs), so entities are
/// shared between application code and their owning device with `Rc<RefCell>`.
pub type EntityHandle = Rc<RefCell<Entity>>;

/// Component-specific slice of the discovery document.
pub(crate) enum ComponentConfig {
    BinarySensor(BinarySensorConfig),
    Sensor(SensorConfig),
}

impl ComponentConfig {
    fn merge_into(&self, document: &mut Map<String, Value>) -> Result<(), Error> {
        match self {
            ComponentConfig::BinarySensor(config) => merge_fragment(document, config),
            ComponentConfig::Sensor(config) => merge_fragment(document, config),
        }
    }

    /// Translate a stored state into its wire representation.
    fn wire_state(&self, state: &Value) -> Value {
        match self {
            ComponentConfig::BinarySensor(config) => config.wire_state(state),
            ComponentConfig::Sensor(_) => state.clone(),
        }
    }
}

/// Common construction inputs collected by the component builders.
pub(crate) struct CoreSeed {
    pub name: Option<String>,
    pub object_id: Option<String>,
    pub chip_id: Option<ChipId>,
    pub entity_category: Option<EntityCategory>,
    pub device_class: Option<String>,
    pub icon: Option<String>,
    pub enabled_by_default: bool,
    pub queue_mode: QueueMode,
    pub client: Option<SharedClient>,
}

impl Default for CoreSeed {
    fn default() -> Self {
        Self {
            name: None,
            object_id: None,
            chip_id: None,
            entity_category: None,
            device_class: None,
            icon: None,
            enabled_by_default: true,
            queue_mode: QueueMode::default(),
            client: None,
        }
    }
}

/// Anything visible to Home Assistant: an identity plus the publish lifecycle.
///
/// There is no public constructor; entities are built through a component
/// builder such as [`BinarySensorBuilder`][crate::BinarySensorBuilder], which
/// is what makes a bare "abstract" entity unrepresentable. Identity fields are
/// immutable once built. Availability and state are mutable and publish
/// eagerly; transient transport failures never propagate out of their setters.
pub struct Entity {
    component: Component,
    name: Option<String>,
    object_id: String,
    entity_category: Option<EntityCategory>,
    device_class: Option<String>,
    icon: Option<String>,
    enabled_by_default: bool,
    component_config: ComponentConfig,
    queue_mode: QueueMode,

    available: bool,
    announced: bool,
    state: Value,
    state_queued: bool,

    // Only Device::add_entity and delete_entity touch these; ownership stays a
    // strict tree with the device holding the strong references.
    device: Option<Weak<RefCell<DeviceInner>>>,
    client: Option<SharedClient>,
}

impl Entity {
    pub(crate) fn assemble(
        component: Component,
        seed: CoreSeed,
        component_config: ComponentConfig,
    ) -> Result<Self, Error> {
        let name = validators::non_empty(seed.name.as_deref()).map(str::to_string);
        let basis = validators::non_empty(seed.object_id.as_deref())
            .or_else(|| name.as_deref())
            .ok_or_else(|| {
                Error::Configuration("an entity requires a name or an object id".to_string())
            })?;
        let chip_id = match seed.chip_id {
            Some(chip_id) => chip_id,
            None => ChipId::detect()?,
        };
        let object_id = format!(
            "{}{}",
            validators::normalize_identifier(basis, false)?,
            chip_id
        );
        Ok(Self {
            component,
            name,
            object_id,
            entity_category: seed.entity_category,
            device_class: seed.device_class,
            icon: seed.icon,
            enabled_by_default: seed.enabled_by_default,
            component_config,
            queue_mode: seed.queue_mode,
            available: false,
            announced: false,
            state: Value::Null,
            state_queued: false,
            device: None,
            client: seed.client,
        })
    }

    /// Wrap the entity for sharing with a [`Device`][crate::Device].
    pub fn into_handle(self) -> EntityHandle {
        Rc::new(RefCell::new(self))
    }

    pub fn component(&self) -> Component {
        self.component
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The stable machine identifier, `normalize(object_id or name) + chip id`.
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// The globally unique id advertised to the hub. Same as the object id.
    pub fn unique_id(&self) -> &str {
        &self.object_id
    }

    pub fn entity_category(&self) -> Option<EntityCategory> {
        self.entity_category
    }

    pub fn queue_mode(&self) -> QueueMode {
        self.queue_mode
    }

    /// Whether the most recent discovery publish for this entity succeeded
    /// more recently than any withdrawal.
    pub fn is_announced(&self) -> bool {
        self.announced
    }

    pub fn availability(&self) -> bool {
        self.available
    }

    /// Update availability and immediately try to publish it.
    ///
    /// Availability changes must never crash calling code, so every failure
    /// here is logged and swallowed.
    pub fn set_availability(&mut self, available: bool) {
        self.available = available;
        if let Err(error) = self.publish_availability() {
            warn!(
                error = %error,
                object_id = %self.object_id,
                "unable to publish entity availability"
            );
        }
    }

    /// Explicitly publish the entity's availability, propagating failures.
    pub fn publish_availability(&self) -> Result<(), Error> {
        let client = self.require_client()?;
        let mut client = client.borrow_mut();
        self.publish_availability_to(&mut *client)
    }

    fn publish_availability_to(&self, client: &mut dyn MqttClient) -> Result<(), Error> {
        if !client.is_connected() {
            return Err(Error::NotConnected);
        }
        let payload = if self.available {
            topic::PAYLOAD_ONLINE
        } else {
            topic::PAYLOAD_OFFLINE
        };
        client.publish(
            &topic::entity_availability(self.component, &self.object_id),
            payload.as_bytes(),
            true,
            QoS::AtLeastOnce,
        )?;
        Ok(())
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn state_queued(&self) -> bool {
        self.state_queued
    }

    /// Store a new state and publish it according to the queue mode.
    ///
    /// Never fails: under [`QueueMode::Always`] the state is queued untouched,
    /// otherwise a failed publish is logged and, unless queueing is disabled,
    /// held for the next flush.
    pub fn set_state<V: Into<Value>>(&mut self, value: V) {
        self.state = value.into();
        if self.queue_mode == QueueMode::Always {
            self.state_queued = true;
            return;
        }
        if let Err(error) = self.publish_state() {
            if self.queue_mode == QueueMode::Never {
                warn!(error = %error, object_id = %self.object_id, "state publish failed");
            } else {
                self.state_queued = true;
                warn!(
                    error = %error,
                    object_id = %self.object_id,
                    "state publish failed, queued for retry"
                );
            }
        }
    }

    /// Publish the current state to the effective state topic.
    ///
    /// Attached entities publish into the device's batched JSON state topic;
    /// detached entities publish a bare value on their own topic. A successful
    /// publish clears the queued flag.
    pub fn publish_state(&mut self) -> Result<(), Error> {
        let client = self.require_client()?;
        let mut client = client.borrow_mut();
        self.publish_state_to(&mut *client)
    }

    pub(crate) fn publish_state_to(&mut self, client: &mut dyn MqttClient) -> Result<(), Error> {
        if !client.is_connected() {
            return Err(Error::NotConnected);
        }
        let (state_topic, payload) = self.state_message();
        client.publish(&state_topic, &payload, true, QoS::AtLeastOnce)?;
        self.state_queued = false;
        Ok(())
    }

    /// Publish the retained discovery message describing this entity.
    ///
    /// Fails fast when no client is configured or the client is disconnected;
    /// a broker-level publish failure is logged and swallowed, since the next
    /// connect re-announces everything anyway.
    pub fn announce(&mut self) -> Result<(), Error> {
        let client = self.require_client()?;
        let mut client = client.borrow_mut();
        self.announce_to(&mut *client)
    }

    pub(crate) fn announce_to(&mut self, client: &mut dyn MqttClient) -> Result<(), Error> {
        if !client.is_connected() {
            return Err(Error::NotConnected);
        }
        let discovery_topic = self.discovery_topic();
        let document = self.discovery_document()?;
        match client.publish(
            &discovery_topic,
            document.to_string().as_bytes(),
            true,
            QoS::AtLeastOnce,
        ) {
            Ok(()) => {
                self.announced = true;
                debug!(topic = %discovery_topic, "announced entity");
                Ok(())
            }
            Err(error) => {
                warn!(error = %error, topic = %discovery_topic, "discovery publish failed");
                Ok(())
            }
        }
    }

    /// Publish an empty retained discovery message, telling the hub to forget
    /// this entity. Same fault policy as [`announce`][Entity::announce].
    pub fn withdraw(&mut self) -> Result<(), Error> {
        let client = self.require_client()?;
        let mut client = client.borrow_mut();
        self.withdraw_to(&mut *client)
    }

    fn withdraw_to(&mut self, client: &mut dyn MqttClient) -> Result<(), Error> {
        if !client.is_connected() {
            return Err(Error::NotConnected);
        }
        let discovery_topic = self.discovery_topic();
        match client.publish(&discovery_topic, b"", true, QoS::AtLeastOnce) {
            Ok(()) => {
                self.announced = false;
                debug!(topic = %discovery_topic, "withdrew entity");
                Ok(())
            }
            Err(error) => {
                warn!(error = %error, topic = %discovery_topic, "withdrawal publish failed");
                Ok(())
            }
        }
    }

    /// The discovery document for this entity, assembled from the base config,
    /// the owning device's fragment, and the component config, in that order
    /// of precedence.
    pub fn discovery_document(&self) -> Result<Value, Error> {
        let device = self.device();
        let mut availability = vec![AvailabilityTopic::new(topic::entity_availability(
            self.component,
            &self.object_id,
        ))];
        if let Some(device) = &device {
            availability.push(AvailabilityTopic::new(device.borrow().availability_topic()));
        }
        let core = CoreConfig {
            availability,
            device_class: self.device_class.clone(),
            enabled_by_default: self.enabled_by_default,
            entity_category: self.entity_category,
            icon: self.icon.clone(),
            name: self.name.clone(),
            state_topic: topic::entity_state(&self.object_id),
            unique_id: self.object_id.clone(),
            encoding: discovery::ENCODING,
        };
        let mut document = Map::new();
        merge_fragment(&mut document, &core)?;
        if let Some(device) = &device {
            let device = device.borrow();
            merge_fragment(
                &mut document,
                &DeviceFragment {
                    device: device.block(),
                    state_topic: device.state_topic(),
                    value_template: format!("{{{{ value_json.{} }}}}", self.object_id),
                },
            )?;
        }
        self.component_config.merge_into(&mut document)?;
        Ok(Value::Object(document))
    }

    /// Replace the entity-owned client. While attached to a device the
    /// device's client takes precedence over this one.
    pub fn set_client(&mut self, client: SharedClient) {
        self.client = Some(client);
    }

    pub(crate) fn attach(&mut self, device: Weak<RefCell<DeviceInner>>) {
        self.device = Some(device);
    }

    pub(crate) fn detach(&mut self) {
        self.device = None;
    }

    pub(crate) fn has_state(&self) -> bool {
        self.component.has_state()
    }

    fn device(&self) -> Option<Rc<RefCell<DeviceInner>>> {
        self.device.as_ref().and_then(Weak::upgrade)
    }

    fn require_client(&self) -> Result<SharedClient, Error> {
        if let Some(device) = self.device() {
            return Ok(Rc::clone(&device.borrow().client));
        }
        self.client.as_ref().map(Rc::clone).ok_or(Error::NoClient)
    }

    fn discovery_topic(&self) -> String {
        let device = self.device();
        let device_id = device.as_ref().map(|d| d.borrow().device_id.clone());
        topic::discovery(self.component, device_id.as_deref(), &self.object_id)
    }

    fn state_message(&self) -> (String, Vec<u8>) {
        let value = self.component_config.wire_state(&self.state);
        match self.device() {
            Some(device) => {
                let mut batched = Map::new();
                batched.insert(self.object_id.clone(), value);
                (
                    device.borrow().state_topic(),
                    Value::Object(batched).to_string().into_bytes(),
                )
            }
            None => (
                topic::entity_state(&self.object_id),
                serialize::state_payload(&value),
            ),
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("component", &self.component)
            .field("object_id", &self.object_id)
            .field("name", &self.name)
            .field("available", &self.available)
            .field("announced", &self.announced)
            .field("state", &self.state)
            .field("state_queued", &self.state_queued)
            .field("queue_mode", &self.queue_mode)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::{EntityCategory, QueueMode};
    use crate::binary_sensor::BinarySensorBuilder;
    use crate::error::Error;
    use crate::identity::ChipId;
    use crate::transport::testing::RecordingClient;
    use crate::transport::{QoS, SharedClient};

    fn chip() -> ChipId {
        ChipId::from_bytes(b"\x13\x37\xd0\x0d")
    }

    #[test]
    fn object_id_from_name() {
        let entity = BinarySensorBuilder::new()
            .name("foo")
            .chip_id(chip())
            .build()
            .unwrap();
        assert_eq!(entity.object_id(), "foo1337d00d");
        assert_eq!(entity.unique_id(), "foo1337d00d");
    }

    #[test]
    fn explicit_object_id_wins_over_name() {
        let entity = BinarySensorBuilder::new()
            .name("test")
            .object_id("foo")
            .chip_id(chip())
            .build()
            .unwrap();
        assert_eq!(entity.object_id(), "foo1337d00d");
        assert_eq!(entity.name(), Some("test"));
    }

    #[test]
    fn name_is_normalized_before_the_chip_id_is_appended() {
        let entity = BinarySensorBuilder::new()
            .name("Living Room Motion")
            .chip_id(chip())
            .build()
            .unwrap();
        assert_eq!(entity.object_id(), "living_room_motion1337d00d");
    }

    #[test]
    fn construction_requires_some_identity() {
        let result = BinarySensorBuilder::new().chip_id(chip()).build();
        match result {
            Err(Error::Configuration(_)) => {}
            other => panic!("expected a configuration error, got {:?}", other),
        }
    }

    #[test]
    fn availability_starts_false_and_publishes_on_change() {
        let recorder = RecordingClient::connected();
        let shared: SharedClient = recorder.clone();
        let mut entity = BinarySensorBuilder::new()
            .name("test")
            .chip_id(chip())
            .client(shared)
            .build()
            .unwrap();
        assert!(!entity.availability());

        entity.set_availability(true);
        assert!(entity.availability());
        let published = recorder.borrow().published.clone();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "binary_sensor/test1337d00d/availability");
        assert_eq!(published[0].payload_str(), "online");
        assert!(published[0].retain);
        assert_eq!(published[0].qos, QoS::AtLeastOnce);

        entity.set_availability(false);
        assert_eq!(
            recorder.borrow().published.last().unwrap().payload_str(),
            "offline"
        );
    }

    #[test]
    fn availability_setter_swallows_failures() {
        // No client at all; the setter must not panic or propagate.
        let mut entity = BinarySensorBuilder::new()
            .name("test")
            .chip_id(chip())
            .build()
            .unwrap();
        entity.set_availability(true);
        assert!(entity.availability());
    }

    #[test]
    fn announce_without_a_client() {
        let mut entity = BinarySensorBuilder::new()
            .name("test")
            .chip_id(chip())
            .build()
            .unwrap();
        match entity.announce() {
            Err(Error::NoClient) => {}
            other => panic!("expected NoClient, got {:?}", other),
        }
    }

    #[test]
    fn announce_while_disconnected() {
        let recorder = RecordingClient::disconnected();
        let shared: SharedClient = recorder.clone();
        let mut entity = BinarySensorBuilder::new()
            .name("test")
            .chip_id(chip())
            .client(shared)
            .build()
            .unwrap();
        match entity.announce() {
            Err(Error::NotConnected) => {}
            other => panic!("expected NotConnected, got {:?}", other),
        }
        assert!(!entity.is_announced());
    }

    #[test]
    fn announce_swallows_transport_failures() {
        let recorder = RecordingClient::connected();
        recorder.borrow_mut().fail_publishes = true;
        let shared: SharedClient = recorder.clone();
        let mut entity = BinarySensorBuilder::new()
            .name("test")
            .chip_id(chip())
            .client(shared)
            .build()
            .unwrap();
        assert!(entity.announce().is_ok());
        // The failed publish leaves the announce status unchanged.
        assert!(!entity.is_announced());
    }

    #[test]
    fn withdraw_then_announce_round_trips() {
        let recorder = RecordingClient::connected();
        let shared: SharedClient = recorder.clone();
        let mut entity = BinarySensorBuilder::new()
            .name("test")
            .chip_id(chip())
            .client(shared)
            .build()
            .unwrap();
        entity.announce().unwrap();
        assert!(entity.is_announced());
        entity.withdraw().unwrap();
        assert!(!entity.is_announced());
        entity.announce().unwrap();
        assert!(entity.is_announced());

        let published = recorder.borrow().published.clone();
        assert_eq!(published.len(), 3);
        assert_eq!(published[0].topic, published[1].topic);
        assert_eq!(published[1].topic, published[2].topic);
        assert!(published[1].payload.is_empty());
        // Identical configuration before and after the withdrawal.
        assert_eq!(published[0].payload, published[2].payload);
    }

    #[test]
    fn always_queue_mode_never_publishes_from_the_setter() {
        let recorder = RecordingClient::connected();
        let shared: SharedClient = recorder.clone();
        let mut entity = BinarySensorBuilder::new()
            .name("test")
            .chip_id(chip())
            .queue_mode(QueueMode::Always)
            .client(shared)
            .build()
            .unwrap();
        entity.set_state(true);
        assert!(entity.state_queued());
        assert!(recorder.borrow().published.is_empty());

        entity.publish_state().unwrap();
        assert!(!entity.state_queued());
        assert_eq!(recorder.borrow().published.len(), 1);
    }

    #[test]
    fn failed_state_publish_queues_on_demand() {
        let recorder = RecordingClient::connected();
        recorder.borrow_mut().fail_publishes = true;
        let shared: SharedClient = recorder.clone();
        let mut entity = BinarySensorBuilder::new()
            .name("test")
            .chip_id(chip())
            .client(shared)
            .build()
            .unwrap();
        entity.set_state(true);
        assert!(entity.state_queued());

        recorder.borrow_mut().fail_publishes = false;
        entity.publish_state().unwrap();
        assert!(!entity.state_queued());
    }

    #[test]
    fn failed_state_publish_is_dropped_when_queueing_is_disabled() {
        let recorder = RecordingClient::connected();
        recorder.borrow_mut().fail_publishes = true;
        let shared: SharedClient = recorder.clone();
        let mut entity = BinarySensorBuilder::new()
            .name("test")
            .chip_id(chip())
            .queue_mode(QueueMode::Never)
            .client(shared)
            .build()
            .unwrap();
        entity.set_state(true);
        assert!(!entity.state_queued());
    }

    #[test]
    fn entity_category_parsing() {
        assert_eq!(
            "config".parse::<EntityCategory>().unwrap(),
            EntityCategory::Config
        );
        assert_eq!(
            "diagnostic".parse::<EntityCategory>().unwrap(),
            EntityCategory::Diagnostic
        );
        assert!("invalid".parse::<EntityCategory>().is_err());
    }
}
