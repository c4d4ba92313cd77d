//! Session state cells.
//!
//! Values captured by one scanner and read by later ones: operator
//! calibration values (set once, on the owning scanner's first evaluation)
//! and correlation ids (overwritten each time the owning scanner matches).
//! Cells are addressed by typed [`CellKey`]s so the registry can check
//! declaration order statically.

use std::marker::PhantomData;
use std::sync::{PoisonError, RwLock};

use ahash::AHashMap;
use bytes::Bytes;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    /// Written once from operator input, immutable afterwards
    Calibration,
    /// Overwritten from the matched packet on every match
    Correlation,
}

impl CellKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calibration => "calibration",
            Self::Correlation => "correlation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    U32,
    I64,
    Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    U32(u32),
    I64(i64),
    Bytes(Bytes),
}

/// Rust types that can live in a cell
pub trait CellType: Sized {
    const VALUE: ValueKind;

    fn into_value(self) -> CellValue;
    fn from_value(value: &CellValue) -> Option<Self>;
}

impl CellType for u32 {
    const VALUE: ValueKind = ValueKind::U32;

    fn into_value(self) -> CellValue {
        CellValue::U32(self)
    }

    fn from_value(value: &CellValue) -> Option<Self> {
        match value {
            CellValue::U32(v) => Some(*v),
            _ => None,
        }
    }
}

impl CellType for i64 {
    const VALUE: ValueKind = ValueKind::I64;

    fn into_value(self) -> CellValue {
        CellValue::I64(self)
    }

    fn from_value(value: &CellValue) -> Option<Self> {
        match value {
            CellValue::I64(v) => Some(*v),
            _ => None,
        }
    }
}

impl CellType for Bytes {
    const VALUE: ValueKind = ValueKind::Bytes;

    fn into_value(self) -> CellValue {
        CellValue::Bytes(self)
    }

    fn from_value(value: &CellValue) -> Option<Self> {
        match value {
            CellValue::Bytes(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// Stable, typed name of a cell
pub struct CellKey<T> {
    name: &'static str,
    kind: CellKind,
    _ty: PhantomData<fn() -> T>,
}

impl<T> Clone for CellKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for CellKey<T> {}

impl<T> std::fmt::Debug for CellKey<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellKey")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

impl<T: CellType> CellKey<T> {
    pub const fn calibration(name: &'static str) -> Self {
        Self {
            name,
            kind: CellKind::Calibration,
            _ty: PhantomData,
        }
    }

    pub const fn correlation(name: &'static str) -> Self {
        Self {
            name,
            kind: CellKind::Correlation,
            _ty: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> CellKind {
        self.kind
    }

    pub fn id(&self) -> CellId {
        CellId {
            name: self.name,
            kind: self.kind,
            value: T::VALUE,
        }
    }
}

/// Type-erased cell identity, used in declarations and the dependency table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId {
    pub name: &'static str,
    pub kind: CellKind,
    pub value: ValueKind,
}

impl<T: CellType> From<CellKey<T>> for CellId {
    fn from(key: CellKey<T>) -> Self {
        key.id()
    }
}

#[derive(Debug)]
struct Slot {
    id: CellId,
    value: RwLock<Option<CellValue>>,
}

/// All cells of one wizard session.
///
/// The set of cells is fixed at registry construction; only their values
/// change. Every access takes the slot's lock, so a reader sees either the
/// old or the new value and calibration's check-then-set is atomic.
#[derive(Debug, Default)]
pub struct SessionState {
    slots: AHashMap<&'static str, Slot>,
}

impl SessionState {
    pub(crate) fn new(ids: impl IntoIterator<Item = CellId>) -> Self {
        let slots = ids
            .into_iter()
            .map(|id| {
                (
                    id.name,
                    Slot {
                        id,
                        value: RwLock::new(None),
                    },
                )
            })
            .collect();
        Self { slots }
    }

    fn slot(&self, name: &'static str) -> Result<&Slot> {
        self.slots.get(name).ok_or(Error::CellUnset(name))
    }

    /// Current value, if the cell has been captured
    pub fn get<T: CellType>(&self, key: CellKey<T>) -> Option<T> {
        self.load(key).ok()
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.slots.get(name).is_some_and(|slot| {
            slot.value
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some()
        })
    }

    pub fn cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.slots.values().map(|slot| slot.id)
    }

    pub(crate) fn load<T: CellType>(&self, key: CellKey<T>) -> Result<T> {
        let slot = self.slot(key.name)?;
        let guard = slot.value.read().unwrap_or_else(PoisonError::into_inner);
        let value = guard.as_ref().ok_or(Error::CellUnset(key.name))?;
        T::from_value(value).ok_or(Error::CellConflict(key.name))
    }

    /// Return the stored value, or run `init` and store its result.
    ///
    /// `init` runs under the slot's write lock. A failed `init` leaves the
    /// cell unset.
    pub(crate) fn get_or_calibrate<T: CellType>(
        &self,
        key: CellKey<T>,
        init: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let slot = self.slot(key.name)?;
        let mut guard = slot.value.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = guard.as_ref() {
            return T::from_value(value).ok_or(Error::CellConflict(key.name));
        }
        let value = init()?;
        *guard = Some(value.into_value());
        let stored = guard.as_ref().ok_or(Error::CellUnset(key.name))?;
        T::from_value(stored).ok_or(Error::CellConflict(key.name))
    }

    pub(crate) fn store(&self, name: &'static str, value: CellValue) -> Result<()> {
        let slot = self.slot(name)?;
        *slot.value.write().unwrap_or_else(PoisonError::into_inner) = Some(value);
        Ok(())
    }

    /// Forget every captured value
    pub fn clear(&self) {
        for slot in self.slots.values() {
            *slot.value.write().unwrap_or_else(PoisonError::into_inner) = None;
        }
    }
}
