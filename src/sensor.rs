// SPDX-License-Identifier: GPL-3.0-or-later
//! The `sensor` component: an entity with an arbitrary measured value.

use serde::Serialize;

use crate::entity::{Component, ComponentConfig, CoreSeed, Entity, EntityCategory, QueueMode};
use crate::error::Error;
use crate::identity::ChipId;
use crate::transport::SharedClient;

/// Component-specific keys of a sensor's discovery document.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct SensorConfig {
    pub force_update: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_after: Option<u32>,

    #[serde(rename = "unit_of_meas", skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
}

/// Builder for a measurement [`Entity`]. Sensor states are published verbatim.
#[derive(Default)]
pub struct SensorBuilder {
    seed: CoreSeed,
    force_update: bool,
    expire_after: Option<u32>,
    unit_of_measurement: Option<String>,
}

impl SensorBuilder {
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

    /// Unit shown next to the value, e.g. `"°C"`.
    pub fn unit_of_measurement<S: Into<String>>(mut self, unit: S) -> Self {
        self.unit_of_measurement = Some(unit.into());
        self
    }

    pub fn build(self) -> Result<Entity, Error> {
        Entity::assemble(
            Component::Sensor,
            self.seed,
            ComponentConfig::Sensor(SensorConfig {
                force_update: self.force_update,
                expire_after: self.expire_after,
                unit_of_measurement: self.unit_of_measurement,
            }),
        )
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::SensorBuilder;
    use crate::identity::ChipId;
    use crate::transport::testing::RecordingClient;
    use crate::transport::SharedClient;

    fn chip() -> ChipId {
        ChipId::from_bytes(b"\x13\x37\xd0\x0d")
    }

    #[test]
    fn discovery_document_carries_the_unit() {
        let entity = SensorBuilder::new()
            .name("Water Temperature")
            .device_class("temperature")
            .unit_of_measurement("°C")
            .chip_id(chip())
            .build()
            .unwrap();
        let document = entity.discovery_document().unwrap();
        assert_eq!(document["unit_of_meas"], json!("°C"));
        assert_eq!(document["dev_cla"], json!("temperature"));
        assert_eq!(document["unique_id"], json!("water_temperature1337d00d"));
        assert_eq!(
            document["avty"],
            json!([{"t": "sensor/water_temperature1337d00d/availability"}])
        );
    }

    #[test]
    fn sensor_states_are_published_verbatim() {
        let recorder = RecordingClient::connected();
        let shared: SharedClient = recorder.clone();
        let mut entity = SensorBuilder::new()
            .name("temp")
            .chip_id(chip())
            .client(shared)
            .build()
            .unwrap();

        entity.set_state(21.5);
        let published = recorder.borrow().published.clone();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "entity/temp1337d00d/state");
        assert_eq!(published[0].payload_str(), "21.5");
    }
}
