// SPDX-License-Identifier: GPL-3.0-or-later
//! The fixed topic layout shared with the Home Assistant side.
//!
//! Discovery lives under [`DISCOVERY_PREFIX`]; availability and state topics
//! hang off the component name or the device id. These paths are a wire
//! contract: changing them orphans every retained message a hub already holds.

use crate::entity::Component;

/// The discovery namespace Home Assistant subscribes to by default.
pub const DISCOVERY_PREFIX: &str = "homeassistant";

pub const PAYLOAD_ONLINE: &str = "online";
pub const PAYLOAD_OFFLINE: &str = "offline";

/// Discovery config topic. The device segment is present only for entities
/// attached to a device.
pub fn discovery(component: Component, device_id: Option<&str>, object_id: &str) -> String {
    match device_id {
        Some(device_id) => format!(
            "{}/{}/{}/{}/config",
            DISCOVERY_PREFIX, component, device_id, object_id
        ),
        None => format!("{}/{}/{}/config", DISCOVERY_PREFIX, component, object_id),
    }
}

/// Per-entity availability topic.
pub fn entity_availability(component: Component, object_id: &str) -> String {
    format!("{}/{}/availability", component, object_id)
}

/// Device-level availability topic, also registered as the last-will topic.
pub fn device_availability(device_id: &str) -> String {
    format!("{}/device/{}/availability", DISCOVERY_PREFIX, device_id)
}

/// Batched state topic for every entity attached to a device.
pub fn device_state(device_id: &str) -> String {
    format!("{}/device/{}/state", DISCOVERY_PREFIX, device_id)
}

/// State topic for an entity not attached to any device.
pub fn entity_state(object_id: &str) -> String {
    format!("entity/{}/state", object_id)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn discovery_topic_with_and_without_a_device() {
        assert_eq!(
            discovery(Component::BinarySensor, None, "foo1337d00d"),
            "homeassistant/binary_sensor/foo1337d00d/config"
        );
        assert_eq!(
            discovery(
                Component::BinarySensor,
                Some("mqtt_device1337d00d"),
                "baz1337d00d"
            ),
            "homeassistant/binary_sensor/mqtt_device1337d00d/baz1337d00d/config"
        );
    }

    #[test]
    fn availability_and_state_topics() {
        assert_eq!(
            entity_availability(Component::Sensor, "foo1337d00d"),
            "sensor/foo1337d00d/availability"
        );
        assert_eq!(
            device_availability("mqtt_device1337d00d"),
            "homeassistant/device/mqtt_device1337d00d/availability"
        );
        assert_eq!(
            device_state("mqtt_device1337d00d"),
            "homeassistant/device/mqtt_device1337d00d/state"
        );
        assert_eq!(entity_state("foo1337d00d"), "entity/foo1337d00d/state");
    }
}
