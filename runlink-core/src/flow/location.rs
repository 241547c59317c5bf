use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};
use crate::flow::FlowTiming;
use crate::log::MessageLog;
use crate::message::{Affordance, Message, SenderType};

pub const FIELD_PICKUP_LOCATION: &str = "pickup_location";
pub const FIELD_PICKUP_PHONE: &str = "pickup_phone";
pub const FIELD_DELIVERY_LOCATION: &str = "delivery_location";
pub const FIELD_DROPOFF_PHONE: &str = "dropoff_phone";

/// What kind of errand is being placed. Pickups collect a contact phone at
/// each end; errands only need the two locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    PickUp,
    RunErrand,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceKind::PickUp => write!(f, "pick-up"),
            ServiceKind::RunErrand => write!(f, "run-errand"),
        }
    }
}

impl std::str::FromStr for ServiceKind {
    type Err = FlowError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pick-up" => Ok(ServiceKind::PickUp),
            "run-errand" => Ok(ServiceKind::RunErrand),
            _ => Err(FlowError::InvalidServiceKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationStep {
    AskPickupOrMarket,
    AskPickupPhone,
    AskDeliveryLocation,
    AskDropoffPhone,
    Complete,
}

impl LocationStep {
    fn key(&self) -> Option<&'static str> {
        match self {
            LocationStep::AskPickupOrMarket => Some(FIELD_PICKUP_LOCATION),
            LocationStep::AskPickupPhone => Some(FIELD_PICKUP_PHONE),
            LocationStep::AskDeliveryLocation => Some(FIELD_DELIVERY_LOCATION),
            LocationStep::AskDropoffPhone => Some(FIELD_DROPOFF_PHONE),
            LocationStep::Complete => None,
        }
    }

    fn prompt(&self) -> Option<&'static str> {
        match self {
            LocationStep::AskPickupOrMarket => {
                Some("Where should we pick up from, or which market?")
            }
            LocationStep::AskPickupPhone => {
                Some("What's the phone number at the pickup location?")
            }
            LocationStep::AskDeliveryLocation => Some("Where are we delivering to?"),
            LocationStep::AskDropoffPhone => {
                Some("What's the phone number at the drop-off location?")
            }
            LocationStep::Complete => None,
        }
    }

    fn next(&self, kind: ServiceKind) -> LocationStep {
        match (self, kind) {
            (LocationStep::AskPickupOrMarket, ServiceKind::PickUp) => LocationStep::AskPickupPhone,
            (LocationStep::AskPickupOrMarket, ServiceKind::RunErrand) => {
                LocationStep::AskDeliveryLocation
            }
            (LocationStep::AskPickupPhone, _) => LocationStep::AskDeliveryLocation,
            (LocationStep::AskDeliveryLocation, ServiceKind::PickUp) => {
                LocationStep::AskDropoffPhone
            }
            (LocationStep::AskDeliveryLocation, ServiceKind::RunErrand) => LocationStep::Complete,
            (LocationStep::AskDropoffPhone, _) => LocationStep::Complete,
            (LocationStep::Complete, _) => LocationStep::Complete,
        }
    }
}

/// Collects pickup and delivery details before a runner is matched.
pub struct LocationFlow {
    kind: ServiceKind,
    self_id: String,
    counterpart_id: String,
    step: LocationStep,
    collected: HashMap<String, String>,
    timing: FlowTiming,
}

impl LocationFlow {
    pub fn new(kind: ServiceKind, self_id: &str, counterpart_id: &str, timing: FlowTiming) -> Self {
        Self {
            kind,
            self_id: self_id.to_string(),
            counterpart_id: counterpart_id.to_string(),
            step: LocationStep::AskPickupOrMarket,
            collected: HashMap::new(),
            timing,
        }
    }

    pub fn step(&self) -> LocationStep {
        self.step
    }

    pub fn is_complete(&self) -> bool {
        self.step == LocationStep::Complete
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.collected.get(key).map(String::as_str)
    }

    pub fn collected(&self) -> &HashMap<String, String> {
        &self.collected
    }

    /// Ask the first question.
    pub fn start(&mut self, log: &mut MessageLog) {
        if let Some(prompt) = self.step.prompt() {
            log.append(Message::text(&self.counterpart_id, SenderType::Runner, prompt));
        }
    }

    /// Accept one answer. Whitespace-only input is a silent no-op; the step
    /// cursor only ever moves forward.
    pub async fn submit_answer(&mut self, log: &mut MessageLog, raw: &str) -> Result<()> {
        if self.step == LocationStep::Complete {
            return Err(FlowError::UnexpectedInput("complete".to_string()));
        }
        let answer = raw.trim();
        if answer.is_empty() {
            return Ok(());
        }

        log.append(Message::text(&self.self_id, SenderType::User, answer));
        if let Some(key) = self.step.key() {
            self.collected.insert(key.to_string(), answer.to_string());
        }

        self.step = self.step.next(self.kind);
        tokio::time::sleep(self.timing.prompt_delay).await;
        match self.step.prompt() {
            Some(prompt) => log.append(Message::text(
                &self.counterpart_id,
                SenderType::Runner,
                prompt,
            )),
            None => log.append(Message::text_with_affordance(
                &self.counterpart_id,
                SenderType::Runner,
                "Got it. Connecting you with a runner",
                Some(Affordance::ConnectRunner),
            )),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow(kind: ServiceKind) -> (LocationFlow, MessageLog) {
        let mut flow = LocationFlow::new(kind, "u1", "assistant", FlowTiming::immediate());
        let mut log = MessageLog::new();
        flow.start(&mut log);
        (flow, log)
    }

    #[test]
    fn test_service_kind_round_trips_through_str() {
        assert_eq!("pick-up".parse::<ServiceKind>().unwrap(), ServiceKind::PickUp);
        assert_eq!(
            "run-errand".parse::<ServiceKind>().unwrap(),
            ServiceKind::RunErrand
        );
        assert_eq!(ServiceKind::PickUp.to_string(), "pick-up");
        assert!("walk-dog".parse::<ServiceKind>().is_err());
    }

    #[tokio::test]
    async fn test_pickup_collects_two_locations_and_two_phones() {
        let (mut flow, mut log) = flow(ServiceKind::PickUp);

        flow.submit_answer(&mut log, "Balogun market").await.unwrap();
        assert_eq!(flow.step(), LocationStep::AskPickupPhone);
        flow.submit_answer(&mut log, "+234801").await.unwrap();
        flow.submit_answer(&mut log, "12 Marina road").await.unwrap();
        assert_eq!(flow.step(), LocationStep::AskDropoffPhone);
        flow.submit_answer(&mut log, "+234802").await.unwrap();

        assert!(flow.is_complete());
        assert_eq!(flow.value(FIELD_PICKUP_LOCATION), Some("Balogun market"));
        assert_eq!(flow.value(FIELD_PICKUP_PHONE), Some("+234801"));
        assert_eq!(flow.value(FIELD_DELIVERY_LOCATION), Some("12 Marina road"));
        assert_eq!(flow.value(FIELD_DROPOFF_PHONE), Some("+234802"));
    }

    #[tokio::test]
    async fn test_errand_skips_the_phone_questions() {
        let (mut flow, mut log) = flow(ServiceKind::RunErrand);

        flow.submit_answer(&mut log, "Balogun market").await.unwrap();
        assert_eq!(flow.step(), LocationStep::AskDeliveryLocation);
        flow.submit_answer(&mut log, "12 Marina road").await.unwrap();

        assert!(flow.is_complete());
        assert_eq!(flow.collected().len(), 2);
        assert!(flow.value(FIELD_PICKUP_PHONE).is_none());
        assert!(flow.value(FIELD_DROPOFF_PHONE).is_none());
    }

    #[tokio::test]
    async fn test_completion_offers_the_connect_runner_affordance() {
        let (mut flow, mut log) = flow(ServiceKind::RunErrand);
        flow.submit_answer(&mut log, "Balogun market").await.unwrap();
        flow.submit_answer(&mut log, "12 Marina road").await.unwrap();

        let last = log.messages().last().unwrap();
        match &last.body {
            crate::message::MessageBody::Text { affordance, .. } => {
                assert_eq!(*affordance, Some(Affordance::ConnectRunner));
            }
            other => panic!("expected text message, got {:?}", other),
        }

        // Answers after completion are a caller bug, not a silent drop.
        assert!(flow.submit_answer(&mut log, "more").await.is_err());
    }

    #[tokio::test]
    async fn test_empty_answer_does_not_advance() {
        let (mut flow, mut log) = flow(ServiceKind::PickUp);
        let before = log.len();
        flow.submit_answer(&mut log, "  ").await.unwrap();
        assert_eq!(flow.step(), LocationStep::AskPickupOrMarket);
        assert_eq!(log.len(), before);
    }
}
