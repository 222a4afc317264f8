//! MQTT implementation of [`Broker`] on top of `rumqttc`.

use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet,
};
use tokio::time::timeout;

use pimon_common::{MqttConfig, PublishMessage, QoS};

use crate::broker::{Broker, BrokerError};

/// Capacity of the request channel between the client handle and the event loop.
const REQUEST_CAPACITY: usize = 16;

struct Connection {
    client: AsyncClient,
    eventloop: EventLoop,
}

/// MQTT broker session.
///
/// The event loop is polled inline by each operation rather than by a
/// background task, so a `send` completes only after the broker has
/// acknowledged (QoS 1) or the packet has been written (QoS 0).
pub struct MqttBroker {
    options: MqttOptions,
    timeout: Duration,
    endpoint: String,
    connection: Option<Connection>,
}

impl MqttBroker {
    /// Create a broker session from configuration. Nothing is opened until
    /// [`Broker::connect`] is called.
    pub fn new(config: &MqttConfig, client_id: impl Into<String>) -> Self {
        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
        options.set_clean_session(true);

        if let Some(ref username) = config.username {
            options.set_credentials(
                username.clone(),
                config.password.clone().unwrap_or_default(),
            );
        }

        Self {
            options,
            timeout: Duration::from_secs(config.timeout_secs),
            endpoint: format!("{}:{}", config.host, config.port),
            connection: None,
        }
    }

    /// `host:port` this session connects to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}

impl Broker for MqttBroker {
    async fn connect(&mut self) -> Result<(), BrokerError> {
        if self.connection.is_some() {
            return Ok(());
        }

        tracing::info!(endpoint = %self.endpoint, "Connecting to MQTT broker");

        let (client, mut eventloop) = AsyncClient::new(self.options.clone(), REQUEST_CAPACITY);

        match timeout(self.timeout, wait_for_connack(&mut eventloop)).await {
            Ok(Ok(())) => {
                tracing::info!(endpoint = %self.endpoint, "Connected to MQTT broker");
                self.connection = Some(Connection { client, eventloop });
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(BrokerError::connect(format!(
                "no CONNACK from {} within {:?}",
                self.endpoint, self.timeout
            ))),
        }
    }

    async fn send(&mut self, message: &PublishMessage) -> Result<(), BrokerError> {
        let Some(conn) = self.connection.as_mut() else {
            return Err(BrokerError::send("not connected"));
        };

        conn.client
            .publish(
                message.topic.clone(),
                to_rumqttc_qos(message.qos),
                message.retain,
                message.payload.clone(),
            )
            .await
            .map_err(|e| BrokerError::send(format!("{}: {}", message.topic, e)))?;

        match timeout(
            self.timeout,
            wait_for_delivery(&mut conn.eventloop, message.qos),
        )
        .await
        {
            Ok(result) => result
                .map_err(|e| BrokerError::send(format!("{}: {}", message.topic, e.message))),
            Err(_) => Err(BrokerError::send(format!(
                "{}: not confirmed within {:?}",
                message.topic, self.timeout
            ))),
        }
    }

    async fn disconnect(&mut self) -> Result<(), BrokerError> {
        let Some(mut conn) = self.connection.take() else {
            return Ok(());
        };

        conn.client
            .disconnect()
            .await
            .map_err(|e| BrokerError::send(format!("disconnect: {}", e)))?;

        // Drive the loop until DISCONNECT is written or the socket closes.
        let flushed = timeout(self.timeout, async {
            loop {
                match conn.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;

        if flushed.is_err() {
            return Err(BrokerError::send(format!(
                "disconnect not flushed within {:?}",
                self.timeout
            )));
        }

        tracing::info!(endpoint = %self.endpoint, "Disconnected from MQTT broker");
        Ok(())
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), BrokerError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => return connack_result(ack.code),
            Ok(_) => {}
            Err(ConnectionError::ConnectionRefused(code)) => return connack_result(code),
            Err(e) => return Err(BrokerError::connect(e.to_string())),
        }
    }
}

async fn wait_for_delivery(eventloop: &mut EventLoop, qos: QoS) -> Result<(), BrokerError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Publish(_))) if qos == QoS::AtMostOnce => return Ok(()),
            Ok(Event::Incoming(Packet::PubAck(_))) if qos == QoS::AtLeastOnce => return Ok(()),
            Ok(_) => {}
            Err(e) => return Err(BrokerError::send(e.to_string())),
        }
    }
}

/// Map a CONNACK return code onto the failure taxonomy.
fn connack_result(code: ConnectReturnCode) -> Result<(), BrokerError> {
    match code {
        ConnectReturnCode::Success => Ok(()),
        ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized => {
            Err(BrokerError::auth(format!("broker refused credentials ({:?})", code)))
        }
        other => Err(BrokerError::connect(format!(
            "broker refused connection ({:?})",
            other
        ))),
    }
}

fn to_rumqttc_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
    }
}
