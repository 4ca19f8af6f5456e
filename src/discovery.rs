// SPDX-License-Identifier: GPL-3.0-or-later
//! Discovery document fragments in Home Assistant's abbreviated wire format.
//!
//! A document is assembled by merging fragments in order of increasing
//! precedence: the entity's base config, then the owning device's fragment,
//! then the component-specific config. Later fragments override earlier keys
//! outright, which is how an attached entity's `stat_t` becomes the device's
//! batched state topic.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::device::DeviceBlock;
use crate::entity::EntityCategory;
use crate::error::Error;

/// Character encoding advertised for every payload this crate produces.
pub(crate) const ENCODING: &str = "utf-8";

/// One element of the `avty` list: a topic the hub checks for availability.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub(crate) struct AvailabilityTopic {
    #[serde(rename = "t")]
    pub topic: String,
}

impl AvailabilityTopic {
    pub(crate) fn new<S: Into<String>>(topic: S) -> Self {
        Self {
            topic: topic.into(),
        }
    }
}

/// The fields every entity publishes, regardless of component.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct CoreConfig {
    #[serde(rename = "avty")]
    pub availability: Vec<AvailabilityTopic>,

    #[serde(rename = "dev_cla", skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,

    #[serde(rename = "en")]
    pub enabled_by_default: bool,

    #[serde(rename = "ent_cat", skip_serializing_if = "Option::is_none")]
    pub entity_category: Option<EntityCategory>,

    #[serde(rename = "ic", skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "stat_t")]
    pub state_topic: String,

    pub unique_id: String,

    #[serde(rename = "e")]
    pub encoding: &'static str,
}

/// What membership in a device adds to an entity's document.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct DeviceFragment {
    #[serde(rename = "dev")]
    pub device: DeviceBlock,

    #[serde(rename = "stat_t")]
    pub state_topic: String,

    #[serde(rename = "val_tpl")]
    pub value_template: String,
}

/// Serialize `fragment` and fold its keys into `document`, overriding on
/// conflict.
pub(crate) fn merge_fragment<T: Serialize>(
    document: &mut Map<String, Value>,
    fragment: &T,
) -> Result<(), Error> {
    match serde_json::to_value(fragment)? {
        Value::Object(map) => {
            document.extend(map);
            Ok(())
        }
        other => Err(Error::InvalidValue(format!(
            "discovery fragments must be JSON objects, got {}",
            other
        ))),
    }
}
