// SPDX-License-Identifier: GPL-3.0-or-later
//! Broker connection settings, deserializable from TOML.

use std::convert::{TryFrom, TryInto};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::Error;

pub const DEFAULT_MQTT_PORT: u16 = 1883;
pub const DEFAULT_MQTTS_PORT: u16 = 8883;

/// Settings for connecting a device to an MQTT broker.
#[derive(Debug, Deserialize, PartialEq)]
pub struct MqttSettings {
    /// The name used as the MQTT client id, and as the default device name.
    pub name: String,

    /// Override the derived device identifier.
    ///
    /// When unset, the identifier is derived from `name` and the chip id.
    #[serde(default)]
    pub device_id: Option<String>,

    /// The broker to connect to. 'mqtt' and 'mqtts' schemes are accepted; the
    /// scheme's default port is filled in when none is given.
    pub server: MqttUrl,

    /// The broker username, if required.
    #[serde(default)]
    pub username: Option<String>,

    /// The broker password, if required.
    ///
    /// Accepts either a plain string or `{ file = "..." }`, in which case the
    /// password is read from that path. Prefer the file form; it keeps secrets
    /// out of the main configuration file.
    #[serde(default)]
    pub password: Option<ExternalValue>,

    /// Keep-alive interval in seconds. 0 or unset disables keep-alive pings.
    #[serde(default)]
    pub keep_alive: Option<u16>,
}

impl MqttSettings {
    /// Parse settings from a TOML document.
    pub fn from_toml(source: &str) -> Result<Self, Error> {
        toml::from_str(source)
            .map_err(|e| Error::Configuration(format!("unable to parse settings: {}", e)))
    }
}

/// A URL restricted to the MQTT schemes.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(try_from = "Url")]
pub struct MqttUrl(Url);

impl MqttUrl {
    /// The host and port to open a connection to.
    pub fn host_port(&self) -> (&str, u16) {
        (
            self.0
                .host_str()
                .expect("scheme validation requires a host"),
            self.0
                .port()
                .expect("scheme validation fills in the default port"),
        )
    }

    /// Whether the connection should be wrapped in TLS.
    pub fn is_tls(&self) -> bool {
        self.0.scheme() == "mqtts"
    }
}

impl TryFrom<Url> for MqttUrl {
    type Error = Error;

    fn try_from(mut url: Url) -> Result<Self, Error> {
        let default_port = match url.scheme() {
            "mqtt" => DEFAULT_MQTT_PORT,
            "mqtts" => DEFAULT_MQTTS_PORT,
            invalid => {
                return Err(Error::InvalidValue(format!(
                    "invalid MQTT URL scheme '{}'",
                    invalid
                )))
            }
        };
        if url.host_str().is_none() {
            return Err(Error::InvalidValue("the MQTT URL has no host".to_string()));
        }
        if url.port().is_none() {
            url.set_port(Some(default_port))
                .map_err(|_| Error::InvalidValue("unable to set the default port".to_string()))?;
        }
        Ok(Self(url))
    }
}

impl FromStr for MqttUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let url: Url = s
            .parse()
            .map_err(|e| Error::InvalidValue(format!("unparseable MQTT URL: {}", e)))?;
        url.try_into()
    }
}

/// A configuration value given either inline or as a path to a file holding it.
///
/// The file form exists for secrets. The resolved value is deliberately left
/// out of `Debug` output.
#[derive(Deserialize, PartialEq)]
#[serde(try_from = "ExternalValueSource")]
pub struct ExternalValue(String);

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExternalValueSource {
    File { file: PathBuf },
    Literal(String),
}

impl ExternalValue {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<ExternalValueSource> for ExternalValue {
    type Error = std::io::Error;

    fn try_from(source: ExternalValueSource) -> std::io::Result<Self> {
        match source {
            ExternalValueSource::File { file } => {
                debug!(path = ?file, "reading value from file");
                let contents = std::fs::read_to_string(file)?;
                Ok(Self(contents.trim_end_matches('\n').to_string()))
            }
            ExternalValueSource::Literal(value) => Ok(Self(value)),
        }
    }
}

impl fmt::Debug for ExternalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExternalValue(<redacted>)")
    }
}

#[cfg(test)]
mod test {
    use super::{MqttSettings, DEFAULT_MQTTS_PORT, DEFAULT_MQTT_PORT};

    #[test]
    fn defaults() {
        let parsed: MqttSettings = toml::from_str(
            r#"
        name = "example"
        server = "mqtt://127.0.0.1"
        "#,
        )
        .expect("minimal settings should parse");
        assert_eq!(parsed.name, "example");
        assert_eq!(parsed.device_id, None);
        assert_eq!(parsed.username, None);
        assert!(parsed.password.is_none());
        assert_eq!(parsed.keep_alive, None);
    }

    #[test]
    fn from_toml_reports_configuration_errors() {
        let parsed = MqttSettings::from_toml("server = \"mqtt://127.0.0.1\"");
        match parsed {
            Err(crate::error::Error::Configuration(message)) => {
                assert!(message.contains("unable to parse settings"))
            }
            other => panic!("expected a configuration error, got {:?}", other),
        }
        assert!(MqttSettings::from_toml(
            r#"
        name = "example"
        server = "mqtt://127.0.0.1"
        "#
        )
        .is_ok());
    }

    #[test]
    fn default_ports_follow_the_scheme() {
        let plain: MqttSettings = toml::from_str(
            r#"
        name = "example"
        server = "mqtt://broker.example.com"
        "#,
        )
        .unwrap();
        assert_eq!(
            plain.server.host_port(),
            ("broker.example.com", DEFAULT_MQTT_PORT)
        );
        assert!(!plain.server.is_tls());

        let tls: MqttSettings = toml::from_str(
            r#"
        name = "example"
        server = "mqtts://broker.example.com"
        "#,
        )
        .unwrap();
        assert_eq!(
            tls.server.host_port(),
            ("broker.example.com", DEFAULT_MQTTS_PORT)
        );
        assert!(tls.server.is_tls());
    }

    #[test]
    fn explicit_port_wins() {
        let parsed: MqttSettings = toml::from_str(
            r#"
        name = "example"
        server = "mqtts://broker.example.com:1337"
        "#,
        )
        .unwrap();
        assert_eq!(parsed.server.host_port().1, 1337);
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        // WebSockets are a standard MQTT transport, just not one this crate speaks.
        let parsed: Result<MqttSettings, _> = toml::from_str(
            r#"
        name = "example"
        server = "ws://broker.example.com"
        "#,
        );
        assert!(parsed.is_err());
    }
}

#[cfg(test)]
mod external_value_test {
    use std::io::Write;

    use serde::Deserialize;
    use tempfile::NamedTempFile;

    use super::ExternalValue;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Wrapper {
        field: ExternalValue,
    }

    #[test]
    fn plain_string() {
        let parsed: Wrapper = toml::from_str(
            r#"
        field = "hunter2"
        "#,
        )
        .expect("a literal value should parse");
        assert_eq!(parsed.field.as_str(), "hunter2");
    }

    #[test]
    fn from_file() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "hunter2").expect("writable temp file");
        let source = format!("field = {{ file = {:?} }}", file.path());
        let parsed: Wrapper = toml::from_str(&source).expect("a file value should parse");
        assert_eq!(parsed.field.as_str(), "hunter2");
    }

    #[test]
    fn missing_file() {
        let parsed: Result<Wrapper, _> = toml::from_str(
            r#"
        field = { file = "/not/a/real/path" }
        "#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn debug_redacts_the_value() {
        let parsed: Wrapper = toml::from_str(
            r#"
        field = "hunter2"
        "#,
        )
        .unwrap();
        assert!(!format!("{:?}", parsed).contains("hunter2"));
    }
}
