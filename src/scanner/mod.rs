//! Heuristic scanners.
//!
//! A [`Scanner`] recognises one protocol message by its byte layout and, where
//! needed, by values captured earlier in the session. Scanners are declared
//! with [`ScannerDef`] and collected by a [`ScannerRegistry`].

pub mod catalog;
pub mod registry;

use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::protocol::{IpcPacket, Origin};
use crate::state::{CellId, CellKey, CellKind, CellType, CellValue, SessionState};

pub use registry::{CellDependency, RegistryBuilder, ScannerRegistry};

pub(crate) type ScanFn =
    dyn Fn(&IpcPacket, &[String], &mut ScanContext<'_>) -> Result<bool> + Send + Sync;

fn erase<F>(f: F) -> Box<ScanFn>
where
    F: Fn(&IpcPacket, &[String], &mut ScanContext<'_>) -> Result<bool> + Send + Sync + 'static,
{
    Box::new(f)
}

/// Diagnostic text a scanner leaves for the operator on a match
#[derive(Debug, Default)]
pub struct Annotation {
    text: RwLock<String>,
}

impl Annotation {
    pub fn text(&self) -> String {
        self.text
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.text
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    fn set(&self, text: String) {
        *self.text.write().unwrap_or_else(PoisonError::into_inner) = text;
    }

    fn clear(&self) {
        self.text
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Declaration of a scanner, validated on registration
pub struct ScannerDef {
    pub(crate) name: String,
    pub(crate) tutorial: String,
    pub(crate) origin: Origin,
    pub(crate) prompts: Vec<String>,
    pub(crate) reads: Vec<CellId>,
    pub(crate) writes: Vec<CellId>,
    pub(crate) arity: usize,
    pub(crate) scan: Option<Box<ScanFn>>,
}

impl ScannerDef {
    /// `tutorial` is the operator action that provokes the packet. Leave it
    /// empty for a packet produced as a side effect of the previous step.
    pub fn new(name: impl Into<String>, tutorial: impl Into<String>, origin: Origin) -> Self {
        Self {
            name: name.into(),
            tutorial: tutorial.into(),
            origin,
            prompts: Vec::new(),
            reads: Vec::new(),
            writes: Vec::new(),
            arity: 0,
            scan: None,
        }
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompts.push(prompt.into());
        self
    }

    /// Declare a cell this scanner reads but does not own
    pub fn reads(mut self, cell: impl Into<CellId>) -> Self {
        self.reads.push(cell.into());
        self
    }

    /// Declare a cell this scanner writes
    pub fn writes(mut self, cell: impl Into<CellId>) -> Self {
        self.writes.push(cell.into());
        self
    }

    /// Scan function that needs no operator parameters
    pub fn scan<F>(mut self, f: F) -> Self
    where
        F: Fn(&IpcPacket, &mut ScanContext<'_>) -> Result<bool> + Send + Sync + 'static,
    {
        self.arity = 0;
        self.scan = Some(erase(move |packet, _, ctx| f(packet, ctx)));
        self
    }

    /// Scan function taking exactly `N` operator parameters, in prompt order
    pub fn scan_with<const N: usize, F>(mut self, f: F) -> Self
    where
        F: Fn(&IpcPacket, [&str; N], &mut ScanContext<'_>) -> Result<bool> + Send + Sync + 'static,
    {
        self.arity = N;
        self.scan = Some(erase(move |packet, params, ctx| {
            let args: [&str; N] = std::array::from_fn(|i| params[i].as_str());
            f(packet, args, ctx)
        }));
        self
    }
}

/// One registered heuristic
pub struct Scanner {
    name: String,
    tutorial: String,
    origin: Origin,
    prompts: Vec<String>,
    reads: Vec<CellId>,
    writes: Vec<CellId>,
    arity: usize,
    annotation: Annotation,
    scan: Box<ScanFn>,
    state: Arc<SessionState>,
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("prompts", &self.prompts)
            .field("reads", &self.reads)
            .field("writes", &self.writes)
            .finish_non_exhaustive()
    }
}

impl Scanner {
    pub(crate) fn from_def(def: ScannerDef, scan: Box<ScanFn>, state: Arc<SessionState>) -> Self {
        Self {
            name: def.name,
            tutorial: def.tutorial,
            origin: def.origin,
            prompts: def.prompts,
            reads: def.reads,
            writes: def.writes,
            arity: def.arity,
            annotation: Annotation::default(),
            scan,
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tutorial(&self) -> &str {
        &self.tutorial
    }

    /// True when the packet arrives as a side effect of the previous step
    pub fn is_follow_up(&self) -> bool {
        self.tutorial.is_empty()
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    pub fn reads(&self) -> &[CellId] {
        &self.reads
    }

    pub fn writes(&self) -> &[CellId] {
        &self.writes
    }

    /// Annotation left by the most recent match, empty if none
    pub fn annotation(&self) -> String {
        self.annotation.text()
    }

    pub(crate) fn clear_annotation(&self) {
        self.annotation.clear();
    }

    /// Test one packet against this heuristic.
    ///
    /// `params` are the operator's answers to [`Scanner::prompts`]. Packets
    /// from the other side, short reads and unset dependency cells all give
    /// `Ok(false)`. Parameter problems are returned as errors so the operator
    /// can be asked again. Annotation and correlation writes are committed
    /// only when this returns `Ok(true)`.
    pub fn evaluate(&self, packet: &IpcPacket, params: &[String]) -> Result<bool> {
        if packet.origin != self.origin {
            tracing::trace!(scanner = %self.name, origin = %packet.origin, "wrong origin");
            return Ok(false);
        }
        if params.len() != self.arity {
            return Err(Error::ParameterCount {
                scanner: self.name.clone(),
                expected: self.arity,
                actual: params.len(),
            });
        }

        let mut ctx = ScanContext::new(self);
        match (self.scan)(packet, params, &mut ctx) {
            Ok(true) => {
                let ScanContext { comment, records, .. } = ctx;
                for (name, value) in records {
                    self.state.store(name, value)?;
                }
                self.annotation.set(comment.unwrap_or_default());
                tracing::debug!(
                    scanner = %self.name,
                    opcode = format_args!("{:#06x}", packet.opcode),
                    size = packet.size(),
                    "matched"
                );
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e) if e.is_rejection() => {
                tracing::trace!(scanner = %self.name, reason = %e, "rejected");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

/// Per-evaluation access to session cells and the annotation slot.
///
/// Only cells the scanner declared are reachable. Calibration writes land
/// immediately; correlation records and the annotation are staged and
/// committed only if the scan returns a match.
pub struct ScanContext<'a> {
    scanner: &'a Scanner,
    comment: Option<String>,
    records: Vec<(&'static str, CellValue)>,
}

impl<'a> ScanContext<'a> {
    fn new(scanner: &'a Scanner) -> Self {
        Self {
            scanner,
            comment: None,
            records: Vec::new(),
        }
    }

    pub fn scanner(&self) -> &str {
        &self.scanner.name
    }

    fn check_write(&self, cell: CellId, kind: CellKind) -> Result<()> {
        if !self.scanner.writes.contains(&cell) {
            return Err(Error::UndeclaredCell {
                scanner: self.scanner.name.clone(),
                cell: cell.name,
            });
        }
        if cell.kind != kind {
            return Err(Error::CellKindMismatch {
                cell: cell.name,
                kind: cell.kind.as_str(),
            });
        }
        Ok(())
    }

    /// Parse operator parameter `index`
    pub fn parse_param<T: FromStr>(&self, index: usize, raw: &str) -> Result<T> {
        raw.trim().parse().map_err(|_| Error::ParameterParse {
            scanner: self.scanner.name.clone(),
            index,
            value: raw.to_string(),
            expected: std::any::type_name::<T>(),
        })
    }

    /// Value of a calibration cell, running `init` only if it is still unset
    pub fn calibrate<T: CellType>(
        &self,
        key: CellKey<T>,
        init: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        self.check_write(key.id(), CellKind::Calibration)?;
        self.scanner.state.get_or_calibrate(key, init)
    }

    /// Calibrate from a numeric operator parameter
    pub fn calibrate_parsed<T: CellType + FromStr>(
        &self,
        key: CellKey<T>,
        index: usize,
        raw: &str,
    ) -> Result<T> {
        self.calibrate(key, || self.parse_param(index, raw))
    }

    /// Calibrate from a text parameter, stored as its UTF-8 bytes
    pub fn calibrate_text(&self, key: CellKey<Bytes>, raw: &str) -> Result<Bytes> {
        self.calibrate(key, || Ok(Bytes::copy_from_slice(raw.as_bytes())))
    }

    /// Read a declared cell; unset cells reject the packet
    pub fn get<T: CellType>(&self, key: CellKey<T>) -> Result<T> {
        let id = key.id();
        if !self.scanner.reads.contains(&id) && !self.scanner.writes.contains(&id) {
            return Err(Error::UndeclaredCell {
                scanner: self.scanner.name.clone(),
                cell: id.name,
            });
        }
        self.scanner.state.load(key)
    }

    /// Stage a correlation value, stored if this evaluation matches
    pub fn record<T: CellType>(&mut self, key: CellKey<T>, value: T) -> Result<()> {
        self.check_write(key.id(), CellKind::Correlation)?;
        self.records.push((key.name(), value.into_value()));
        Ok(())
    }

    /// Stage annotation text, shown if this evaluation matches
    pub fn annotate(&mut self, text: impl Into<String>) {
        self.comment = Some(text.into());
    }
}
