use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::client::events::{Discovery, EventCollector, EventHandler, SkipReason, WizardEvent};
use crate::error::{Error, Result};
use crate::protocol::IpcPacket;
use crate::scanner::{Scanner, ScannerRegistry};

/// Wizard configuration
#[derive(Debug, Clone)]
pub struct WizardConfig {
    /// How long one step may wait for its packet; `None` waits forever
    pub step_timeout: Option<Duration>,
    /// Skip steps whose prompts have no answers instead of failing
    pub skip_unanswered: bool,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            step_timeout: Some(Duration::from_secs(300)),
            skip_unanswered: true,
        }
    }
}

/// Builder for wizard sessions
pub struct WizardBuilder {
    registry: ScannerRegistry,
    config: WizardConfig,
}

impl WizardBuilder {
    pub fn new(registry: ScannerRegistry) -> Self {
        Self {
            registry,
            config: WizardConfig::default(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.step_timeout = Some(timeout);
        self
    }

    pub fn no_timeout(mut self) -> Self {
        self.config.step_timeout = None;
        self
    }

    pub fn skip_unanswered(mut self, skip: bool) -> Self {
        self.config.skip_unanswered = skip;
        self
    }

    pub fn build(self) -> Wizard {
        Wizard::new(self.registry, self.config)
    }
}

/// Supplies operator answers for a scanner's prompts
pub trait ParameterSource {
    /// Answers in prompt order, or `None` if the operator has none
    fn answers(&mut self, scanner: &Scanner) -> Option<Vec<String>>;
}

/// Pre-recorded answers keyed by scanner name, e.g. loaded from JSON
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct AnswerBook {
    answers: HashMap<String, Vec<String>>,
}

impl AnswerBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, scanner: impl Into<String>, answers: Vec<String>) {
        self.answers.insert(scanner.into(), answers);
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidCapture(format!("answers: {e}")))
    }
}

impl ParameterSource for AnswerBook {
    fn answers(&mut self, scanner: &Scanner) -> Option<Vec<String>> {
        self.answers.get(scanner.name()).cloned()
    }
}

/// Walks the registry one scanner at a time
pub struct Wizard {
    registry: ScannerRegistry,
    scanners: Vec<Arc<Scanner>>,
    config: WizardConfig,
    step: usize,
    announced: Option<usize>,
    discoveries: IndexMap<String, Discovery>,
    events: EventCollector,
}

impl Wizard {
    /// Start a fresh session; any previously captured cells are cleared
    pub fn new(registry: ScannerRegistry, config: WizardConfig) -> Self {
        registry.reset_session();
        let scanners = registry.as_list();
        Self {
            registry,
            scanners,
            config,
            step: 0,
            announced: None,
            discoveries: IndexMap::new(),
            events: EventCollector::new(),
        }
    }

    pub fn registry(&self) -> &ScannerRegistry {
        &self.registry
    }

    pub fn config(&self) -> &WizardConfig {
        &self.config
    }

    pub fn current(&self) -> Option<&Arc<Scanner>> {
        self.scanners.get(self.step)
    }

    pub fn step_index(&self) -> usize {
        self.step
    }

    pub fn is_finished(&self) -> bool {
        self.step >= self.scanners.len()
    }

    pub fn discoveries(&self) -> impl Iterator<Item = &Discovery> {
        self.discoveries.values()
    }

    pub fn discovery(&self, name: &str) -> Option<&Discovery> {
        self.discoveries.get(name)
    }

    pub fn drain_events(&mut self) -> Vec<WizardEvent> {
        self.events.drain()
    }

    fn announce(&mut self) {
        if self.announced == Some(self.step) {
            return;
        }
        if let Some(scanner) = self.scanners.get(self.step) {
            tracing::info!(step = self.step, scanner = scanner.name(), "step started");
            self.events.on_event(WizardEvent::StepStarted {
                index: self.step,
                name: scanner.name().to_string(),
                tutorial: scanner.tutorial().to_string(),
            });
            self.announced = Some(self.step);
        }
    }

    fn advance(&mut self) {
        self.step += 1;
        if self.is_finished() {
            tracing::info!(found = self.discoveries.len(), "wizard finished");
            self.events.on_event(WizardEvent::Finished);
        }
    }

    fn skip_with(&mut self, reason: SkipReason) {
        let Some(scanner) = self.current().cloned() else {
            return;
        };
        tracing::info!(scanner = scanner.name(), ?reason, "step skipped");
        self.events.on_event(WizardEvent::Skipped {
            name: scanner.name().to_string(),
            reason,
        });
        self.advance();
    }

    /// Abandon the active step
    pub fn skip(&mut self) {
        self.skip_with(SkipReason::Requested);
    }

    /// Offer one captured packet to the active scanner.
    ///
    /// Packets from the other side are ignored. A match records the packet's
    /// opcode and advances to the next step.
    pub fn feed(&mut self, packet: &IpcPacket, params: &[String]) -> Result<Option<Discovery>> {
        let Some(scanner) = self.current().cloned() else {
            return Ok(None);
        };
        self.announce();
        if packet.origin != scanner.origin() {
            return Ok(None);
        }

        match scanner.evaluate(packet, params) {
            Ok(true) => {
                let annotation = scanner.annotation();
                let discovery = Discovery {
                    name: scanner.name().to_string(),
                    origin: scanner.origin(),
                    opcode: packet.opcode,
                    annotation: (!annotation.is_empty()).then_some(annotation),
                };
                tracing::info!(
                    scanner = scanner.name(),
                    opcode = format_args!("{:#06x}", packet.opcode),
                    "opcode found"
                );
                self.discoveries
                    .insert(discovery.name.clone(), discovery.clone());
                self.events.on_event(WizardEvent::Matched(discovery.clone()));
                self.advance();
                Ok(Some(discovery))
            }
            Ok(false) => Ok(None),
            Err(e) => {
                if matches!(e, Error::ParameterParse { .. } | Error::ParameterCount { .. }) {
                    tracing::warn!(scanner = scanner.name(), error = %e, "parameter rejected");
                    self.events.on_event(WizardEvent::ParameterRejected {
                        name: scanner.name().to_string(),
                        error: e.to_string(),
                    });
                }
                Err(e)
            }
        }
    }

    /// Pull packets until the active scanner matches.
    ///
    /// Returns `Ok(None)` if the wizard is already finished.
    pub async fn run_step(
        &mut self,
        rx: &mut mpsc::Receiver<IpcPacket>,
        params: &[String],
    ) -> Result<Option<Discovery>> {
        let Some(scanner) = self.current().cloned() else {
            return Ok(None);
        };
        self.announce();
        let deadline = self.config.step_timeout.map(|t| Instant::now() + t);

        loop {
            let next = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, rx.recv())
                    .await
                    .map_err(|_| Error::ScanTimeout {
                        scanner: scanner.name().to_string(),
                    })?,
                None => rx.recv().await,
            };
            let packet = next.ok_or(Error::StreamClosed)?;
            if let Some(discovery) = self.feed(&packet, params)? {
                return Ok(Some(discovery));
            }
        }
    }

    /// Run every remaining step against `rx`.
    ///
    /// Steps without answers, with unusable answers, or that time out are
    /// skipped. Stops early when the stream closes.
    pub async fn run<P: ParameterSource>(
        &mut self,
        rx: &mut mpsc::Receiver<IpcPacket>,
        answers: &mut P,
    ) -> Result<Vec<Discovery>> {
        while let Some(scanner) = self.current().cloned() {
            let params = if scanner.prompts().is_empty() {
                Vec::new()
            } else {
                match answers.answers(&scanner) {
                    Some(params) => params,
                    None if self.config.skip_unanswered => {
                        self.skip_with(SkipReason::NoAnswers);
                        continue;
                    }
                    None => {
                        return Err(Error::ParameterCount {
                            scanner: scanner.name().to_string(),
                            expected: scanner.prompts().len(),
                            actual: 0,
                        })
                    }
                }
            };

            match self.run_step(rx, &params).await {
                Ok(_) => {}
                Err(Error::ScanTimeout { .. }) => self.skip_with(SkipReason::Timeout),
                Err(Error::ParameterParse { .. } | Error::ParameterCount { .. }) => {
                    self.skip_with(SkipReason::BadParameters)
                }
                Err(Error::StreamClosed) => break,
                Err(e) => return Err(e),
            }
        }

        Ok(self.discoveries.values().cloned().collect())
    }
}
