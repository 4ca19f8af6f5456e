// SPDX-License-Identifier: GPL-3.0-or-later
//! The `binary_sensor` component: an entity with an on/off state.

use serde::Serialize;
use serde_json::Value;

use crate::entity::{Component, ComponentConfig, CoreSeed, Entity, EntityCategory, QueueMode};
use crate::error::Error;
use crate::identity::ChipId;
use crate::transport::SharedClient;

/// The wire strings Home Assistant matches binary states against.
pub(crate) const PAYLOAD_ON: &str = "True";
pub(crate) const PAYLOAD_OFF: &str = "False";

/// Component-specific keys of a binary sensor's discovery document.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct BinarySensorConfig {
    pub force_update: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_after: Option<u32>,

    #[serde(rename = "pl_off")]
    pub payload_off: &'static str,

    #[serde(rename = "pl_on")]
    pub payload_on: &'static str,
}

impl BinarySensorConfig {
    /// Binary sensors publish exactly the strings advertised in `pl_on` and
    /// `pl_off`, coercing whatever was stored by truthiness.
    pub(crate) fn wire_state(&self, state: &Value) -> Value {
        let on = match state {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().map_or(false, |n| n != 0.0),
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        };
        Value::String(if on { self.payload_on } else { self.payload_off }.to_string())
    }
}

/// Builder for a binary sensor [`Entity`].
///
/// At least one of `name` and `object_id` is required; everything else has a
/// sensible default.
#[derive(Default)]
pub struct BinarySensorBuilder {
    seed: CoreSeed,
    force_update: bool,
    expire_after: Option<u32>,
}

impl BinarySensorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Friendly name shown in the Home Assistant UI.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.seed.name = Some(name.into());
        self
    }

    /// Basis for the machine identifier, overriding `name` for that purpose.
    pub fn object_id<S: Into<String>>(mut self, object_id: S) -> Self {
        self.seed.object_id = Some(object_id.into());
        self
    }

    pub fn entity_category(mut self, category: EntityCategory) -> Self {
        self.seed.entity_category = Some(category);
        self
    }

    pub fn device_class<S: Into<String>>(mut self, device_class: S) -> Self {
        self.seed.device_class = Some(device_class.into());
        self
    }

    pub fn icon<S: Into<String>>(mut self, icon: S) -> Self {
        self.seed.icon = Some(icon.into());
        self
    }

    pub fn enabled_by_default(mut self, enabled: bool) -> Self {
        self.seed.enabled_by_default = enabled;
        self
    }

    pub fn queue_mode(mut self, queue_mode: QueueMode) -> Self {
        self.seed.queue_mode = queue_mode;
        self
    }

    /// Use an explicit chip id instead of detecting the ambient one.
    pub fn chip_id(mut self, chip_id: ChipId) -> Self {
        self.seed.chip_id = Some(chip_id);
        self
    }

    /// Client used while the entity is not attached to a device.
    pub fn client(mut self, client: SharedClient) -> Self {
        self.seed.client = Some(client);
        self
    }

    /// Send update events even when the state hasn't changed.
    pub fn force_update(mut self, force_update: bool) -> Self {
        self.force_update = force_update;
        self
    }

    /// Seconds after which an unrefreshed state expires to unavailable.
    pub fn expire_after(mut self, seconds: u32) -> Self {
        self.expire_after = Some(seconds);
        self
    }

    pub fn build(self) -> Result<Entity, Error> {
        Entity::assemble(
            Component::BinarySensor,
            self.seed,
            ComponentConfig::BinarySensor(BinarySensorConfig {
                force_update: self.force_update,
                expire_after: self.expire_after,
                payload_off: PAYLOAD_OFF,
                payload_on: PAYLOAD_ON,
            }),
        )
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::BinarySensorBuilder;
    use crate::entity::EntityCategory;
    use crate::identity::ChipId;
    use crate::transport::testing::RecordingClient;
    use crate::transport::SharedClient;

    fn chip() -> ChipId {
        ChipId::from_bytes(b"\x13\x37\xd0\x0d")
    }

    #[test]
    fn discovery_document_for_a_detached_sensor() {
        let entity = BinarySensorBuilder::new()
            .name("test")
            .entity_category(EntityCategory::Config)
            .object_id("foo")
            .chip_id(chip())
            .build()
            .unwrap();
        let document = entity.discovery_document().unwrap();
        assert_eq!(
            document,
            json!({
                "avty": [{"t": "binary_sensor/foo1337d00d/availability"}],
                "en": true,
                "unique_id": "foo1337d00d",
                "e": "utf-8",
                "name": "test",
                "ent_cat": "config",
                "stat_t": "entity/foo1337d00d/state",
                "force_update": false,
                "pl_off": "False",
                "pl_on": "True",
            })
        );
    }

    #[test]
    fn optional_keys_appear_when_set() {
        let entity = BinarySensorBuilder::new()
            .name("test")
            .object_id("foo")
            .chip_id(chip())
            .device_class("motion")
            .icon("mdi:motion-sensor")
            .expire_after(30)
            .force_update(true)
            .build()
            .unwrap();
        let document = entity.discovery_document().unwrap();
        assert_eq!(document["dev_cla"], json!("motion"));
        assert_eq!(document["ic"], json!("mdi:motion-sensor"));
        assert_eq!(document["expire_after"], json!(30));
        assert_eq!(document["force_update"], json!(true));
    }

    #[test]
    fn states_are_published_as_payload_strings() {
        let recorder = RecordingClient::connected();
        let shared: SharedClient = recorder.clone();
        let mut entity = BinarySensorBuilder::new()
            .name("test")
            .object_id("foo")
            .chip_id(chip())
            .client(shared)
            .build()
            .unwrap();

        entity.set_state(true);
        entity.set_state(false);
        // Truthiness coercion, for callers storing raw values.
        entity.set_state("yes");
        entity.set_state(0);

        let published = recorder.borrow().published.clone();
        let payloads: Vec<&str> = published.iter().map(|p| p.payload_str()).collect();
        assert_eq!(payloads, vec!["True", "False", "True", "False"]);
        assert!(published
            .iter()
            .all(|p| p.topic == "entity/foo1337d00d/state"));
    }
}
