pub mod cells;

pub use cells::{
    CellId, CellKey, CellKind, CellType, CellValue,
    SessionState, ValueKind,
};
