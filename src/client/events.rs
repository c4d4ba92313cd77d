use serde::Serialize;

use crate::protocol::Origin;

/// An opcode identified by a matched scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discovery {
    pub name: String,
    pub origin: Origin,
    pub opcode: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
}

/// Wizard progress events
#[derive(Debug, Clone)]
pub enum WizardEvent {
    /// A step became active
    StepStarted {
        index: usize,
        name: String,
        tutorial: String,
    },

    /// The active scanner matched
    Matched(Discovery),

    /// Operator input could not be used
    ParameterRejected {
        name: String,
        error: String,
    },

    /// Step abandoned without a match
    Skipped {
        name: String,
        reason: SkipReason,
    },

    /// Every step has been handled
    Finished,
}

/// Why a step was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Requested,
    NoAnswers,
    BadParameters,
    Timeout,
}

/// Event handler trait
pub trait EventHandler {
    fn on_event(&mut self, event: WizardEvent);
}

/// Simple event collector
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<WizardEvent>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn drain(&mut self) -> Vec<WizardEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventHandler for EventCollector {
    fn on_event(&mut self, event: WizardEvent) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_collector() {
        let mut collector = EventCollector::new();
        assert!(collector.is_empty());

        collector.on_event(WizardEvent::Finished);
        collector.on_event(WizardEvent::Skipped {
            name: "ActorControl".into(),
            reason: SkipReason::Timeout,
        });

        assert!(!collector.is_empty());

        let events = collector.drain();
        assert_eq!(events.len(), 2);
        assert!(collector.is_empty());
    }

    #[test]
    fn test_discovery_json() {
        let discovery = Discovery {
            name: "PlayerSetup".into(),
            origin: Origin::Server,
            opcode: 0x0123,
            annotation: None,
        };
        let json = serde_json::to_string(&discovery).unwrap();
        assert_eq!(json, r#"{"name":"PlayerSetup","origin":"server","opcode":291}"#);
    }
}
