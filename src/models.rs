use rumqttc::QoS;

/// Where to connect, derived once from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
    pub use_encryption: bool,
}

/// One topic filter to subscribe to, re-issued verbatim after every connect.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRequest {
    pub topic_pattern: String,
    pub qos: QoS,
}

/// A publish received from the broker. Lives only for one render.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub qos: QoS,
    pub payload: Vec<u8>,
}

impl From<rumqttc::Publish> for InboundMessage {
    fn from(publish: rumqttc::Publish) -> Self {
        Self {
            topic: publish.topic,
            qos: publish.qos,
            payload: publish.payload.to_vec(),
        }
    }
}

/// Numeric level as shown on the console.
pub fn qos_level(qos: QoS) -> u8 {
    match qos {
        QoS::AtMostOnce => 0,
        QoS::AtLeastOnce => 1,
        QoS::ExactlyOnce => 2,
    }
}
