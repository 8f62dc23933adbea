// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Server configuration, deserialised from a TOML file.

use std::time::Duration;

use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, DurationSeconds};

use lorikeet_common::band::Band;
use lorikeet_common::gps;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    pub database: lorikeet_db_queries::db::Config,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Dispatcher loop tuning.
#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval of the dispatcher loop (seconds).
    #[serde_as(as = "DurationSeconds<u64>")]
    pub scheduler_interval: Duration,
    /// Maximum number of groups claimed per tick.
    pub batch_size: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            scheduler_interval: Duration::from_secs(1),
            batch_size: 100,
        }
    }
}

/// Radio-layer parameters.
#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Regional band the gateways operate in.
    #[serde_as(as = "DisplayFromStr")]
    pub band_name: Band,
    /// Downlink TX power in dBm; -1 means "use the band default".
    pub downlink_tx_power: i32,
    /// Offset between GPS time and UTC.
    pub gps_epoch_leap_seconds: i64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            band_name: Band::Eu868,
            downlink_tx_power: -1,
            gps_epoch_leap_seconds: gps::GPS_UTC_LEAP_SECONDS,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct BackendConfig {
    #[serde(default)]
    pub mqtt: MqttConfig,
}

/// MQTT gateway-backend settings.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct MqttConfig {
    pub server: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    /// Topic the downlink frame for a gateway is published on; `{mac}` is
    /// replaced with the hex gateway MAC.
    pub downlink_topic_template: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        MqttConfig {
            server: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            client_id: "lorikeet".to_string(),
            downlink_topic_template: "gateway/{mac}/tx".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level emitted: one of TRCE, DEBG, INFO, WARN, ERRO, CRIT
    /// (slog's level names, case-insensitive).
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
        }
    }
}
