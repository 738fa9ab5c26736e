use crate::models::SubscriptionRequest;
use rumqttc::QoS;

pub const DEFAULT_BOAT_ID: &str = "sea_serpent_01";

const TOPIC_ROOT: &str = "boats";
const SINGLE_LEVEL_WILDCARD: &str = "+";
const CHANNELS: [&str; 3] = ["from_vehicle", "to_vehicle", "status"];

/// Which boats to listen to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoatSelection {
    Boat(String),
    AllBoats,
}

impl BoatSelection {
    /// `--wildcard` wins over `--boat-id` when both are given.
    pub fn from_flags(boat_id: &str, wildcard: bool) -> Self {
        if wildcard {
            Self::AllBoats
        } else {
            Self::Boat(boat_id.to_string())
        }
    }
}

fn topics_under(segment: &str) -> Vec<String> {
    CHANNELS
        .iter()
        .map(|channel| format!("{TOPIC_ROOT}/{segment}/{channel}"))
        .collect()
}

pub fn topics_for_boat(boat_id: &str) -> Vec<String> {
    topics_under(boat_id)
}

pub fn wildcard_topics() -> Vec<String> {
    topics_under(SINGLE_LEVEL_WILDCARD)
}

/// Build the subscription list for the session. Order is
/// from_vehicle, to_vehicle, status; every entry uses the same QoS.
pub fn plan_subscriptions(selection: &BoatSelection, qos: QoS) -> Vec<SubscriptionRequest> {
    let topics = match selection {
        BoatSelection::Boat(boat_id) => topics_for_boat(boat_id),
        BoatSelection::AllBoats => wildcard_topics(),
    };

    topics
        .into_iter()
        .map(|topic_pattern| SubscriptionRequest { topic_pattern, qos })
        .collect()
}
