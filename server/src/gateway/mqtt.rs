// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT gateway backend.
//!
//! Downlink frames are published as JSON to a per-gateway topic
//! (`gateway/{mac}/tx` by default), the contract spoken by the gateway
//! bridge sitting in front of the packet forwarders.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use serde::Serialize;
use slog::{info, o, warn, Logger};

use async_trait::async_trait;
use lorikeet_common::Error;

use crate::config::MqttConfig;
use crate::gateway::{GatewayBackend, TxInfo};

/// Wire form of one downlink frame hand-off.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DownlinkFrame<'a> {
    token: u16,
    tx_info: &'a TxInfo,
    /// Base64-encoded PHYPayload.
    phy_payload: String,
}

pub struct MqttBackend {
    log: Logger,
    client: AsyncClient,
    downlink_topic_template: String,
}

impl MqttBackend {
    /// Connect to the broker and keep the session alive on a background
    /// task.
    pub fn new(log: &Logger, config: &MqttConfig) -> MqttBackend {
        let log = log.new(o!("component" => "mqtt-backend"));

        let mut options = MqttOptions::new(
            config.client_id.clone(),
            config.server.clone(),
            config.port,
        );
        options.set_keep_alive(std::time::Duration::from_secs(30));
        if let (Some(username), Some(password)) =
            (&config.username, &config.password)
        {
            options.set_credentials(username.clone(), password.clone());
        }

        let (client, event_loop) = AsyncClient::new(options, 16);
        tokio::spawn(Self::run_event_loop(log.clone(), event_loop));

        info!(
            log, "connecting to MQTT broker";
            "server" => &config.server,
            "port" => config.port,
        );
        MqttBackend {
            log,
            client,
            downlink_topic_template: config.downlink_topic_template.clone(),
        }
    }

    /// Drive the MQTT session.  The client half queues publishes while
    /// the connection is re-established, so errors here are logged and
    /// retried rather than surfaced.
    async fn run_event_loop(log: Logger, mut event_loop: EventLoop) {
        loop {
            if let Err(e) = event_loop.poll().await {
                warn!(log, "MQTT connection error"; "error" => %e);
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }

    fn downlink_topic(&self, tx_info: &TxInfo) -> String {
        self.downlink_topic_template
            .replace("{mac}", &tx_info.mac.to_string())
    }
}

#[async_trait]
impl GatewayBackend for MqttBackend {
    async fn send_tx_packet(
        &self,
        token: u16,
        tx_info: &TxInfo,
        phy_payload: &[u8],
    ) -> Result<(), Error> {
        let frame = DownlinkFrame {
            token,
            tx_info,
            phy_payload: BASE64.encode(phy_payload),
        };
        let payload = serde_json::to_vec(&frame).map_err(|e| {
            Error::internal_error(&format!(
                "failed to serialize downlink frame: {}",
                e
            ))
        })?;

        let topic = self.downlink_topic(tx_info);
        self.client
            .publish(&topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| {
                Error::unavail(&format!(
                    "failed to publish downlink frame to {}: {}",
                    topic, e
                ))
            })?;

        info!(
            self.log, "downlink frame published";
            "topic" => topic,
            "token" => token,
        );
        Ok(())
    }
}
