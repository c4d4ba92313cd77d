//! Opcode Wizard
//!
//! Guided discovery of game network opcodes. Each scanner describes an
//! in-game action and a byte-level heuristic for the packet that action
//! produces; matching a captured packet reveals that packet's opcode.

pub mod codec;
pub mod error;
pub mod protocol;
pub mod state;
pub mod scanner;
pub mod client;

pub use error::{Error, Result};
pub use protocol::{IpcPacket, PacketBuilder, Origin, IPC_DATA};
pub use codec::{contains, ByteView};
pub use state::{CellKey, CellKind, SessionState};
pub use scanner::{
    Scanner, ScannerDef, ScanContext,
    ScannerRegistry, RegistryBuilder, CellDependency,
};
pub use client::{Wizard, WizardBuilder, WizardConfig, Discovery, WizardEvent, AnswerBook};
