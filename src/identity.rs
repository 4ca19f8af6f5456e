// SPDX-License-Identifier: GPL-3.0-or-later
//! The hardware identity every object id is anchored to.

use std::env;
use std::fmt;

use tracing::{debug, warn};

use crate::error::Error;

/// Environment variable consulted when no hardware identity is available, e.g.
/// on development hosts or in CI.
pub const CHIP_ID_ENV: &str = "MINIHASS_CHIP_ID";

/// A lowercase hex token uniquely identifying the hardware this process runs on.
///
/// Entity object ids and derived device ids have a chip id appended so that two
/// boards running the same firmware never collide in the broker's topic space.
/// [`ChipId::detect`] reads the ambient identity; constructors also accept an
/// explicit chip id so tests stay deterministic without touching global state.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChipId(String);

impl ChipId {
    /// Determine the chip id for this host.
    ///
    /// The OS machine id is used where one exists, reduced to its hex digits.
    /// When that fails the [`CHIP_ID_ENV`] environment variable is consulted.
    /// Neither being usable is a fatal configuration error.
    pub fn detect() -> Result<Self, Error> {
        match machine_uid::get() {
            Ok(machine_id) => {
                if let Ok(chip_id) = Self::from_hex(&filter_hex(&machine_id)) {
                    debug!(chip_id = %chip_id, "derived chip id from machine id");
                    return Ok(chip_id);
                }
                warn!("machine id contains no usable hex digits");
            }
            Err(error) => warn!(error = ?error, "unable to read a machine id"),
        }
        match env::var(CHIP_ID_ENV) {
            Ok(value) => Self::from_hex(&value),
            Err(_) => Err(Error::Configuration(format!(
                "no hardware id available and {} is not set",
                CHIP_ID_ENV
            ))),
        }
    }

    /// Build a chip id from a hex string, canonicalizing it to lowercase.
    pub fn from_hex(hex_digits: &str) -> Result<Self, Error> {
        let bytes = hex::decode(hex_digits).map_err(|_| Error::InvalidFormat {
            input: hex_digits.to_string(),
            target: "chip id",
        })?;
        if bytes.is_empty() {
            return Err(Error::InvalidFormat {
                input: hex_digits.to_string(),
                target: "chip id",
            });
        }
        Ok(Self(hex::encode(bytes)))
    }

    /// Build a chip id directly from the raw bytes of a hardware register.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn filter_hex(raw: &str) -> String {
    raw.to_ascii_lowercase()
        .matches(|c: char| c.is_ascii_hexdigit())
        .collect()
}
