//! Per-cell result storage.
//!
//! Two interchangeable backends keyed by cell coordinates:
//! - **packed**: `u64` keys from [`CellKeyCodec`], for up to four axes
//!   within the codec bounds
//! - **map**: coordinate vectors as keys, for everything else

use std::sync::Arc;

use rolap_common::CellValue;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::cell_key::CellKeyCodec;
use crate::format::ValueFormatter;

pub type Position = SmallVec<[usize; 4]>;

/// Mutable cell record filled in while a pass evaluates the cell.
#[derive(Clone, Default)]
pub struct CellInfoBuilder {
    pub ordinal: u64,
    pub value: CellValue,
    pub format_string: Option<Arc<str>>,
    pub formatter: Option<Arc<dyn ValueFormatter>>,
}

impl std::fmt::Debug for CellInfoBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellInfoBuilder")
            .field("ordinal", &self.ordinal)
            .field("value", &self.value)
            .field("format_string", &self.format_string)
            .finish_non_exhaustive()
    }
}

impl CellInfoBuilder {
    pub fn freeze(self) -> CellInfo {
        CellInfo {
            ordinal: self.ordinal,
            value: self.value,
            format_string: self.format_string,
            formatter: self.formatter,
        }
    }
}

/// Immutable cell record kept by a finished result.
#[derive(Clone, Default)]
pub struct CellInfo {
    ordinal: u64,
    value: CellValue,
    format_string: Option<Arc<str>>,
    formatter: Option<Arc<dyn ValueFormatter>>,
}

impl std::fmt::Debug for CellInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellInfo")
            .field("ordinal", &self.ordinal)
            .field("value", &self.value)
            .field("format_string", &self.format_string)
            .finish_non_exhaustive()
    }
}

impl CellInfo {
    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    pub fn value(&self) -> &CellValue {
        &self.value
    }

    pub fn format_string(&self) -> Option<&Arc<str>> {
        self.format_string.as_ref()
    }

    pub fn formatted_value(&self) -> String {
        match &self.formatter {
            Some(f) => f.format(&self.value),
            None => self.value.to_string(),
        }
    }
}

/// Operations both backends provide.
pub trait CellInfoContainer<T> {
    /// Insert a fresh entry at `pos`, replacing any previous one.
    fn create(&mut self, pos: &[usize]) -> &mut T;
    fn lookup(&self, pos: &[usize]) -> Option<&T>;
    fn clear(&mut self);
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn shrink_to_fit(&mut self);
    /// Entries in unspecified order.
    fn entries(&self) -> Vec<(Position, &T)>;
}

#[derive(Debug, Clone)]
pub struct PackedCellStore<T> {
    codec: CellKeyCodec,
    cells: FxHashMap<u64, T>,
}

impl<T> PackedCellStore<T> {
    pub fn new(codec: CellKeyCodec) -> Self {
        Self {
            codec,
            cells: FxHashMap::default(),
        }
    }

    pub fn codec(&self) -> CellKeyCodec {
        self.codec
    }
}

impl<T: Default> CellInfoContainer<T> for PackedCellStore<T> {
    fn create(&mut self, pos: &[usize]) -> &mut T {
        let key = self.codec.encode(pos);
        let slot = self.cells.entry(key).or_default();
        *slot = T::default();
        slot
    }

    fn lookup(&self, pos: &[usize]) -> Option<&T> {
        self.cells.get(&self.codec.encode(pos))
    }

    fn clear(&mut self) {
        self.cells.clear();
    }

    fn len(&self) -> usize {
        self.cells.len()
    }

    fn shrink_to_fit(&mut self) {
        self.cells.shrink_to_fit();
    }

    fn entries(&self) -> Vec<(Position, &T)> {
        self.cells
            .iter()
            .map(|(&k, v)| (self.codec.decode(k), v))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct MapCellStore<T> {
    cells: FxHashMap<Position, T>,
}

impl<T> Default for MapCellStore<T> {
    fn default() -> Self {
        Self {
            cells: FxHashMap::default(),
        }
    }
}

impl<T> MapCellStore<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Default> CellInfoContainer<T> for MapCellStore<T> {
    fn create(&mut self, pos: &[usize]) -> &mut T {
        let slot = self.cells.entry(Position::from_slice(pos)).or_default();
        *slot = T::default();
        slot
    }

    fn lookup(&self, pos: &[usize]) -> Option<&T> {
        self.cells.get(pos)
    }

    fn clear(&mut self) {
        self.cells.clear();
    }

    fn len(&self) -> usize {
        self.cells.len()
    }

    fn shrink_to_fit(&mut self) {
        self.cells.shrink_to_fit();
    }

    fn entries(&self) -> Vec<(Position, &T)> {
        self.cells.iter().map(|(k, v)| (k.clone(), v)).collect()
    }
}

/// Backend chosen from the axis lengths.
#[derive(Debug, Clone)]
pub enum CellStore<T> {
    Packed(PackedCellStore<T>),
    Map(MapCellStore<T>),
}

impl<T: Default> CellStore<T> {
    pub fn for_axes(lengths: &[usize]) -> Self {
        match CellKeyCodec::for_axes(lengths) {
            Some(codec) => Self::Packed(PackedCellStore::new(codec)),
            None => Self::Map(MapCellStore::new()),
        }
    }

    pub fn is_packed(&self) -> bool {
        matches!(self, Self::Packed(_))
    }

    fn inner(&self) -> &dyn CellInfoContainer<T> {
        match self {
            Self::Packed(s) => s,
            Self::Map(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn CellInfoContainer<T> {
        match self {
            Self::Packed(s) => s,
            Self::Map(s) => s,
        }
    }

    /// Convert every entry, keeping the backend.
    pub fn map_values<U: Default>(self, mut f: impl FnMut(T) -> U) -> CellStore<U> {
        match self {
            Self::Packed(s) => CellStore::Packed(PackedCellStore {
                codec: s.codec,
                cells: s.cells.into_iter().map(|(k, v)| (k, f(v))).collect(),
            }),
            Self::Map(s) => CellStore::Map(MapCellStore {
                cells: s.cells.into_iter().map(|(k, v)| (k, f(v))).collect(),
            }),
        }
    }
}

impl<T: Default> CellInfoContainer<T> for CellStore<T> {
    fn create(&mut self, pos: &[usize]) -> &mut T {
        self.inner_mut().create(pos)
    }

    fn lookup(&self, pos: &[usize]) -> Option<&T> {
        self.inner().lookup(pos)
    }

    fn clear(&mut self) {
        self.inner_mut().clear();
    }

    fn len(&self) -> usize {
        self.inner().len()
    }

    fn shrink_to_fit(&mut self) {
        self.inner_mut().shrink_to_fit();
    }

    fn entries(&self) -> Vec<(Position, &T)> {
        self.inner().entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn backend_selection() {
        assert!(CellStore::<CellInfoBuilder>::for_axes(&[3, 4]).is_packed());
        assert!(!CellStore::<CellInfoBuilder>::for_axes(&[1, 1, 1, 1, 1]).is_packed());
        assert!(!CellStore::<CellInfoBuilder>::for_axes(&[60_000, 1, 1, 1]).is_packed());
    }

    #[test]
    fn create_overwrites_and_freeze_keeps_values() {
        let mut store: CellStore<CellInfoBuilder> = CellStore::for_axes(&[2, 2]);
        store.create(&[1, 0]).value = CellValue::Int(1);
        store.create(&[1, 0]).value = CellValue::Int(2);
        assert_eq!(store.len(), 1);
        let frozen = store.map_values(CellInfoBuilder::freeze);
        assert_eq!(frozen.lookup(&[1, 0]).map(|c| c.value().clone()), Some(CellValue::Int(2)));
        assert!(frozen.lookup(&[0, 0]).is_none());
    }

    proptest! {
        #[test]
        fn both_backends_agree(
            positions in proptest::collection::vec(proptest::collection::vec(0usize..50, 3), 1..40)
        ) {
            let mut packed: CellStore<u64> = CellStore::for_axes(&[50, 50, 50]);
            let mut map: CellStore<u64> = CellStore::Map(MapCellStore::new());
            prop_assert!(packed.is_packed());
            for (i, p) in positions.iter().enumerate() {
                *packed.create(p) = i as u64;
                *map.create(p) = i as u64;
            }
            prop_assert_eq!(packed.len(), map.len());
            for p in &positions {
                prop_assert_eq!(packed.lookup(p), map.lookup(p));
            }
            let mut a: Vec<_> = packed.entries().into_iter().map(|(p, v)| (p.to_vec(), *v)).collect();
            let mut b: Vec<_> = map.entries().into_iter().map(|(p, v)| (p.to_vec(), *v)).collect();
            a.sort();
            b.sort();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn five_axes_use_map(positions in proptest::collection::vec(proptest::collection::vec(0usize..4, 5), 1..20)) {
            let mut store: CellStore<u8> = CellStore::for_axes(&[4; 5]);
            prop_assert!(!store.is_packed());
            for p in &positions {
                *store.create(p) = 1;
            }
            for p in &positions {
                prop_assert_eq!(store.lookup(p), Some(&1));
            }
        }
    }
}
