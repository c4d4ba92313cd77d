use std::sync::Arc;

use ahash::AHashMap;
use indexmap::IndexMap;

use super::{catalog, ScanFn, Scanner, ScannerDef};
use crate::error::{Error, Result};
use crate::state::{CellId, CellKind, SessionState};

/// Collects scanner declarations in order, validating each as it arrives
#[derive(Default)]
pub struct RegistryBuilder {
    defs: Vec<(ScannerDef, Box<ScanFn>)>,
    names: AHashMap<String, usize>,
    cells: IndexMap<&'static str, CellId>,
    owners: AHashMap<&'static str, String>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a scanner.
    ///
    /// Fails on an empty or duplicate name, a prompt count that differs from
    /// the scan function's parameter count, a cell declared with two kinds,
    /// a second writer for a calibration cell, or a read of a cell that no
    /// earlier scanner (or this one) writes.
    pub fn register(&mut self, mut def: ScannerDef) -> Result<&mut Self> {
        if def.name.trim().is_empty() {
            return Err(Error::EmptyName);
        }
        if self.names.contains_key(&def.name) {
            return Err(Error::DuplicateScanner(def.name));
        }
        let scan = def.scan.take().ok_or_else(|| Error::MissingScan(def.name.clone()))?;
        if def.prompts.len() != def.arity {
            return Err(Error::PromptArity {
                scanner: def.name,
                prompts: def.prompts.len(),
                arity: def.arity,
            });
        }

        for cell in def.reads.iter().chain(&def.writes) {
            if let Some(known) = self.cells.get(cell.name) {
                if known != cell {
                    return Err(Error::CellConflict(cell.name));
                }
            }
        }

        for cell in &def.writes {
            if cell.kind == CellKind::Calibration {
                if let Some(owner) = self.owners.get(cell.name) {
                    return Err(Error::CellOwnership {
                        cell: cell.name,
                        owner: owner.clone(),
                        scanner: def.name,
                    });
                }
            }
        }

        for cell in &def.reads {
            let written = self.owners.contains_key(cell.name) || def.writes.contains(cell);
            if !written {
                return Err(Error::CellOrder {
                    scanner: def.name,
                    cell: cell.name,
                });
            }
        }

        for cell in def.reads.iter().chain(&def.writes) {
            self.cells.entry(cell.name).or_insert(*cell);
        }
        for cell in &def.writes {
            self.owners
                .entry(cell.name)
                .or_insert_with(|| def.name.clone());
        }

        tracing::debug!(
            scanner = %def.name,
            origin = %def.origin,
            prompts = def.prompts.len(),
            "registered scanner"
        );
        self.names.insert(def.name.clone(), self.defs.len());
        self.defs.push((def, scan));
        Ok(self)
    }

    pub fn build(self) -> ScannerRegistry {
        let state = Arc::new(SessionState::new(self.cells.values().copied()));
        let scanners = self
            .defs
            .into_iter()
            .map(|(def, scan)| {
                let scanner = Scanner::from_def(def, scan, Arc::clone(&state));
                (scanner.name().to_string(), Arc::new(scanner))
            })
            .collect();

        ScannerRegistry { scanners, state }
    }
}

/// Writers and readers of one cell, in registration order
#[derive(Debug, Clone)]
pub struct CellDependency {
    pub cell: CellId,
    pub writers: Vec<String>,
    pub readers: Vec<String>,
}

/// Ordered, fixed set of scanners sharing one session
pub struct ScannerRegistry {
    scanners: IndexMap<String, Arc<Scanner>>,
    state: Arc<SessionState>,
}

impl std::fmt::Debug for ScannerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerRegistry")
            .field("scanners", &self.scanners.len())
            .finish()
    }
}

impl ScannerRegistry {
    /// Registry holding the built-in catalog
    pub fn new() -> Result<Self> {
        let mut builder = RegistryBuilder::new();
        catalog::declare_scanners(&mut builder)?;
        let registry = builder.build();
        tracing::debug!(scanners = registry.len(), "scanner catalog ready");
        Ok(registry)
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Scanners in registration order.
    ///
    /// The returned list is a copy; only each scanner's annotation and the
    /// session cells change after construction.
    pub fn as_list(&self) -> Vec<Arc<Scanner>> {
        self.scanners.values().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Scanner>> {
        self.scanners.get(name).cloned()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.scanners.get_index_of(name)
    }

    pub fn len(&self) -> usize {
        self.scanners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scanners.is_empty()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Forget all captured cells and annotations
    pub fn reset_session(&self) {
        self.state.clear();
        for scanner in self.scanners.values() {
            scanner.clear_annotation();
        }
        tracing::debug!("session reset");
    }

    pub fn dependencies(&self) -> Vec<CellDependency> {
        let mut table: IndexMap<&'static str, CellDependency> = IndexMap::new();
        for scanner in self.scanners.values() {
            for cell in scanner.writes() {
                table
                    .entry(cell.name)
                    .or_insert_with(|| CellDependency {
                        cell: *cell,
                        writers: Vec::new(),
                        readers: Vec::new(),
                    })
                    .writers
                    .push(scanner.name().to_string());
            }
            for cell in scanner.reads() {
                table
                    .entry(cell.name)
                    .or_insert_with(|| CellDependency {
                        cell: *cell,
                        writers: Vec::new(),
                        readers: Vec::new(),
                    })
                    .readers
                    .push(scanner.name().to_string());
            }
        }
        table.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::codec::contains;
    use crate::protocol::{Origin, PacketBuilder};
    use crate::state::CellKey;

    const CALIB: CellKey<u32> = CellKey::calibration("calib");
    const TX_ID: CellKey<u32> = CellKey::correlation("tx_id");
    const LITERAL: CellKey<Bytes> = CellKey::calibration("literal");

    fn params(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn sized(size: usize) -> ScannerDef {
        ScannerDef::new("Sized", "Do the thing.", Origin::Server)
            .scan(move |packet, _| Ok(packet.size() == size))
    }

    #[test]
    fn test_rejects_empty_and_duplicate_names() {
        let mut builder = RegistryBuilder::new();
        let err = builder
            .register(ScannerDef::new("  ", "x", Origin::Client).scan(|_, _| Ok(true)))
            .err();
        assert!(matches!(err, Some(Error::EmptyName)));

        builder.register(sized(40)).unwrap();
        let err = builder.register(sized(48)).err();
        assert!(matches!(err, Some(Error::DuplicateScanner(name)) if name == "Sized"));
    }

    #[test]
    fn test_rejects_prompt_arity_mismatch() {
        let mut builder = RegistryBuilder::new();
        let def = ScannerDef::new("Chat", "Say something.", Origin::Client)
            .scan_with(|packet, [a, b], _| {
                Ok(contains(&packet.data, a.as_bytes()) && contains(&packet.data, b.as_bytes()))
            })
            .prompt("Only one prompt:");
        let err = builder.register(def).err();
        assert!(matches!(
            err,
            Some(Error::PromptArity { prompts: 1, arity: 2, .. })
        ));

        let def = ScannerDef::new("NoScan", "x", Origin::Client);
        assert!(matches!(
            builder.register(def).err(),
            Some(Error::MissingScan(_))
        ));
    }

    #[test]
    fn test_rejects_read_before_write() {
        let mut builder = RegistryBuilder::new();
        let reader = ScannerDef::new("Reader", "", Origin::Server)
            .reads(CALIB)
            .scan(|packet, ctx| Ok(packet.ipc_u32(0)? == ctx.get(CALIB)?));
        let err = builder.register(reader).err();
        assert!(matches!(err, Some(Error::CellOrder { cell: "calib", .. })));
    }

    #[test]
    fn test_rejects_second_calibration_owner_and_kind_conflict() {
        let mut builder = RegistryBuilder::new();
        let owner = |name: &str| {
            ScannerDef::new(name, "x", Origin::Server)
                .writes(CALIB)
                .prompt("Value:")
                .scan_with(|_, [raw], ctx| {
                    ctx.calibrate_parsed(CALIB, 0, raw)?;
                    Ok(false)
                })
        };
        builder.register(owner("First")).unwrap();
        assert!(matches!(
            builder.register(owner("Second")).err(),
            Some(Error::CellOwnership { cell: "calib", .. })
        ));

        const CLASH: CellKey<u32> = CellKey::correlation("calib");
        let clash = ScannerDef::new("Clash", "", Origin::Server)
            .reads(CLASH)
            .scan(|_, _| Ok(false));
        assert!(matches!(
            builder.register(clash).err(),
            Some(Error::CellConflict("calib"))
        ));
    }

    #[test]
    fn test_correlation_cells_allow_several_writers() {
        let mut builder = RegistryBuilder::new();
        for name in ["RequestA", "RequestB"] {
            builder
                .register(
                    ScannerDef::new(name, "x", Origin::Client)
                        .writes(TX_ID)
                        .scan(|_, _| Ok(false)),
                )
                .unwrap();
        }
        let registry = builder.build();
        let deps = registry.dependencies();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].writers, vec!["RequestA", "RequestB"]);
    }

    #[test]
    fn test_as_list_is_ordered_copy() {
        let mut builder = RegistryBuilder::new();
        builder.register(sized(40)).unwrap();
        builder
            .register(ScannerDef::new("Second", "", Origin::Client).scan(|_, _| Ok(false)))
            .unwrap();
        let registry = builder.build();

        let mut list = registry.as_list();
        assert_eq!(list[0].name(), "Sized");
        assert_eq!(list[1].name(), "Second");
        assert!(list[1].is_follow_up());
        list.clear();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.position("Second"), Some(1));
    }

    #[test]
    fn test_size_check_keeps_annotation_empty() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                ScannerDef::new("Exact", "x", Origin::Server).scan(|packet, ctx| {
                    if packet.size() != 64 {
                        return Ok(false);
                    }
                    ctx.annotate(format!("size {}", packet.size()));
                    Ok(true)
                }),
            )
            .unwrap();
        let registry = builder.build();
        let scanner = registry.get("Exact").unwrap();

        for size in (32..=128).filter(|&s| s != 64) {
            let packet = PacketBuilder::new(Origin::Server, size).build();
            assert!(!scanner.evaluate(&packet, &[]).unwrap());
            assert_eq!(scanner.annotation(), "");
        }
        let packet = PacketBuilder::new(Origin::Server, 64).build();
        assert!(scanner.evaluate(&packet, &[]).unwrap());
        assert_eq!(scanner.annotation(), "size 64");
    }

    #[test]
    fn test_failed_attempts_leave_no_annotation() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                ScannerDef::new("Noisy", "x", Origin::Server).scan(|packet, ctx| {
                    let value = packet.ipc_u32(0)?;
                    ctx.annotate(format!("saw {value}"));
                    Ok(value == 3)
                }),
            )
            .unwrap();
        let registry = builder.build();
        let scanner = registry.get("Noisy").unwrap();

        for value in [1, 2] {
            let packet = PacketBuilder::new(Origin::Server, 40).u32(0, value).build();
            assert!(!scanner.evaluate(&packet, &[]).unwrap());
        }
        assert_eq!(scanner.annotation(), "");

        let packet = PacketBuilder::new(Origin::Server, 40).u32(0, 3).build();
        assert!(scanner.evaluate(&packet, &[]).unwrap());
        assert_eq!(scanner.annotation(), "saw 3");

        registry.reset_session();
        assert_eq!(scanner.annotation(), "");
    }

    #[test]
    fn test_calibration_memoized_not_overwritten() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                ScannerDef::new("Calibrate", "x", Origin::Server)
                    .writes(CALIB)
                    .prompt("Enter a value:")
                    .scan_with(|packet, [raw], ctx| {
                        let value = ctx.calibrate_parsed(CALIB, 0, raw)?;
                        Ok(packet.ipc_u32(0)? == value)
                    }),
            )
            .unwrap();
        let registry = builder.build();
        let scanner = registry.get("Calibrate").unwrap();
        let packet = PacketBuilder::new(Origin::Server, 40).u32(0, 100).build();

        assert!(scanner.evaluate(&packet, &params(&["100"])).unwrap());
        assert!(scanner.evaluate(&packet, &params(&["999"])).unwrap());
        assert_eq!(registry.state().get(CALIB), Some(100));
    }

    #[test]
    fn test_calibration_captured_before_match_check() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                ScannerDef::new("Calibrate", "x", Origin::Server)
                    .writes(CALIB)
                    .prompt("Enter a value:")
                    .scan_with(|packet, [raw], ctx| {
                        let value = ctx.calibrate_parsed(CALIB, 0, raw)?;
                        Ok(packet.size() == 48 && packet.ipc_u32(0)? == value)
                    }),
            )
            .unwrap();
        let registry = builder.build();
        let scanner = registry.get("Calibrate").unwrap();

        // too short for the read, still captures the operator value
        let packet = PacketBuilder::new(Origin::Server, 32).build();
        assert!(!scanner.evaluate(&packet, &params(&["12"])).unwrap());
        assert_eq!(registry.state().get(CALIB), Some(12));
    }

    #[test]
    fn test_parameter_errors_are_surfaced() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                ScannerDef::new("Calibrate", "x", Origin::Server)
                    .writes(CALIB)
                    .prompt("Enter a value:")
                    .scan_with(|_, [raw], ctx| {
                        ctx.calibrate_parsed(CALIB, 0, raw)?;
                        Ok(false)
                    }),
            )
            .unwrap();
        let registry = builder.build();
        let scanner = registry.get("Calibrate").unwrap();
        let packet = PacketBuilder::new(Origin::Server, 40).build();

        let err = scanner.evaluate(&packet, &params(&["lots"])).unwrap_err();
        assert!(matches!(err, Error::ParameterParse { index: 0, .. }));
        assert!(!registry.state().is_set("calib"));

        let err = scanner.evaluate(&packet, &[]).unwrap_err();
        assert!(matches!(err, Error::ParameterCount { expected: 1, actual: 0, .. }));

        assert!(!scanner.evaluate(&packet, &params(&[" 5 "])).unwrap());
        assert_eq!(registry.state().get(CALIB), Some(5));
    }

    #[test]
    fn test_wrong_origin_never_evaluated() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(ScannerDef::new("Any", "x", Origin::Client).scan(|_, _| Ok(true)))
            .unwrap();
        let registry = builder.build();
        let scanner = registry.get("Any").unwrap();

        let server = PacketBuilder::new(Origin::Server, 40).build();
        let client = PacketBuilder::new(Origin::Client, 40).build();
        assert!(!scanner.evaluate(&server, &[]).unwrap());
        assert!(scanner.evaluate(&client, &[]).unwrap());
    }

    #[test]
    fn test_correlation_undefined_until_owner_matches() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                ScannerDef::new("Request", "Drop the item.", Origin::Client)
                    .writes(TX_ID)
                    .scan(|packet, ctx| {
                        if packet.size() != 48 || packet.ipc_u16(4)? != 2587 {
                            return Ok(false);
                        }
                        ctx.record(TX_ID, packet.ipc_u32(0)?)?;
                        Ok(true)
                    }),
            )
            .unwrap()
            .register(
                ScannerDef::new("Ack", "", Origin::Server)
                    .reads(TX_ID)
                    .scan(|packet, ctx| Ok(packet.size() == 40 && packet.ipc_u32(0)? == ctx.get(TX_ID)?)),
            )
            .unwrap();
        let registry = builder.build();
        let request = registry.get("Request").unwrap();
        let ack = registry.get("Ack").unwrap();

        let ack_42 = PacketBuilder::new(Origin::Server, 40).u32(0, 42).build();
        let ack_7 = PacketBuilder::new(Origin::Server, 40).u32(0, 7).build();
        let ack_0 = PacketBuilder::new(Origin::Server, 40).build();
        assert!(!ack.evaluate(&ack_42, &[]).unwrap());
        assert!(!ack.evaluate(&ack_0, &[]).unwrap());

        // non-matching request must not record its id
        let wrong = PacketBuilder::new(Origin::Client, 48).u32(0, 42).u16(4, 1).build();
        assert!(!request.evaluate(&wrong, &[]).unwrap());
        assert!(!ack.evaluate(&ack_42, &[]).unwrap());

        let req = PacketBuilder::new(Origin::Client, 48).u32(0, 42).u16(4, 2587).build();
        assert!(request.evaluate(&req, &[]).unwrap());
        assert!(ack.evaluate(&ack_42, &[]).unwrap());
        assert!(!ack.evaluate(&ack_7, &[]).unwrap());

        let req = PacketBuilder::new(Origin::Client, 48).u32(0, 7).u16(4, 2587).build();
        assert!(request.evaluate(&req, &[]).unwrap());
        assert!(ack.evaluate(&ack_7, &[]).unwrap());
        assert!(!ack.evaluate(&ack_42, &[]).unwrap());
    }

    #[test]
    fn test_undeclared_cell_access_is_an_error() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                ScannerDef::new("Sneaky", "x", Origin::Server)
                    .scan(|_, ctx| Ok(ctx.get(TX_ID)? == 1)),
            )
            .unwrap()
            .register(
                ScannerDef::new("WrongKind", "x", Origin::Server)
                    .writes(TX_ID)
                    .scan(|_, ctx| {
                        ctx.calibrate(TX_ID, || Ok(1))?;
                        Ok(true)
                    }),
            )
            .unwrap();
        let registry = builder.build();
        let packet = PacketBuilder::new(Origin::Server, 40).build();

        let err = registry.get("Sneaky").unwrap().evaluate(&packet, &[]).unwrap_err();
        assert!(matches!(err, Error::UndeclaredCell { cell: "tx_id", .. }));
        let err = registry.get("WrongKind").unwrap().evaluate(&packet, &[]).unwrap_err();
        assert!(matches!(err, Error::CellKindMismatch { cell: "tx_id", .. }));
    }

    #[test]
    fn test_offset_overrun_is_no_match() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                ScannerDef::new("FarRead", "x", Origin::Server)
                    .scan(|packet, _| Ok(packet.view().u32_at(50)? == 0)),
            )
            .unwrap();
        let registry = builder.build();
        let packet = PacketBuilder::new(Origin::Server, 40).build();
        assert!(!registry.get("FarRead").unwrap().evaluate(&packet, &[]).unwrap());
    }

    #[test]
    fn test_position_update_scenario() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                ScannerDef::new("PositionUpdate", "Move around.", Origin::Server).scan(
                    |packet, _| {
                        // a 40-byte segment carries only 8 bytes of IPC data, so
                        // this layout is addressed from the segment start
                        let view = packet.view();
                        Ok(packet.size() == 40
                            && view.u32_at(24)? == 0
                            && view.u64_at(28)? != 0
                            && view.trailing_u32()? == 0)
                    },
                ),
            )
            .unwrap();
        let registry = builder.build();
        let scanner = registry.get("PositionUpdate").unwrap();

        let position = 0x4120_0000_C2AA_0000u64.to_le_bytes();
        let packet = PacketBuilder::new(Origin::Server, 40).raw(28, &position).build();
        assert_eq!(packet.size(), 40);
        assert!(scanner.evaluate(&packet, &[]).unwrap());

        let trailing = PacketBuilder::new(Origin::Server, 40)
            .raw(28, &position)
            .raw(36, &[0, 0, 0, 1])
            .build();
        assert!(!scanner.evaluate(&trailing, &[]).unwrap());

        let stationary = PacketBuilder::new(Origin::Server, 40).build();
        assert!(!scanner.evaluate(&stationary, &[]).unwrap());

        let wider = PacketBuilder::new(Origin::Server, 48).raw(28, &position).build();
        assert!(!scanner.evaluate(&wider, &[]).unwrap());
    }

    #[test]
    fn test_calibration_feeds_later_scanner() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                ScannerDef::new("Owner", "Tell me a number.", Origin::Server)
                    .writes(CALIB)
                    .prompt("Enter the number:")
                    .scan_with(|packet, [raw], ctx| {
                        ctx.calibrate_parsed(CALIB, 0, raw)?;
                        Ok(packet.size() == 40)
                    }),
            )
            .unwrap()
            .register(
                ScannerDef::new("Dependent", "Look at it.", Origin::Server)
                    .reads(CALIB)
                    .scan(|packet, ctx| Ok(packet.ipc_u32(0)? == ctx.get(CALIB)?)),
            )
            .unwrap();
        let registry = builder.build();
        let owner = registry.get("Owner").unwrap();
        let dependent = registry.get("Dependent").unwrap();

        let seven = PacketBuilder::new(Origin::Server, 40).u32(0, 7).build();
        let eight = PacketBuilder::new(Origin::Server, 40).u32(0, 8).build();
        assert!(!dependent.evaluate(&seven, &[]).unwrap());

        assert!(owner.evaluate(&seven, &params(&["7"])).unwrap());
        assert!(dependent.evaluate(&seven, &[]).unwrap());
        assert!(!dependent.evaluate(&eight, &[]).unwrap());
    }

    #[test]
    fn test_literal_cell_never_matches_when_unset() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                ScannerDef::new("SetComment", "Type it.", Origin::Client)
                    .writes(LITERAL)
                    .prompt("Comment:")
                    .scan_with(|packet, [raw], ctx| {
                        let needle = ctx.calibrate_text(LITERAL, raw)?;
                        Ok(contains(&packet.data, &needle))
                    }),
            )
            .unwrap()
            .register(
                ScannerDef::new("Echo", "", Origin::Server)
                    .reads(LITERAL)
                    .scan(|packet, ctx| Ok(contains(&packet.data, &ctx.get(LITERAL)?))),
            )
            .unwrap();
        let registry = builder.build();
        let echo = registry.get("Echo").unwrap();
        let set = registry.get("SetComment").unwrap();

        let server = PacketBuilder::new(Origin::Server, 64).bytes(4, b"hello there").build();
        assert!(!echo.evaluate(&server, &[]).unwrap());

        let client = PacketBuilder::new(Origin::Client, 64).bytes(0, b"hello there").build();
        assert!(set.evaluate(&client, &params(&["hello there"])).unwrap());
        assert!(echo.evaluate(&server, &[]).unwrap());
    }
}
