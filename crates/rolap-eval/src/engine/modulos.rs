use smallvec::SmallVec;

/// Converts between cell coordinates and cell ordinals.
///
/// `ordinal = Σ pos[i] * modulo[i]` with `modulo[0] = 1` and
/// `modulo[i] = modulo[i-1] * len(axis[i-1])`, so axis 0 varies fastest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modulos {
    modulos: SmallVec<[u64; 5]>,
    cell_count: u64,
}

impl Modulos {
    /// `None` if the cell count overflows `u64`.
    pub fn new(lengths: &[usize]) -> Option<Self> {
        let mut modulos = SmallVec::with_capacity(lengths.len());
        let mut acc: u64 = 1;
        for &len in lengths {
            modulos.push(acc);
            acc = acc.checked_mul(len as u64)?;
        }
        Some(Self {
            modulos,
            cell_count: acc,
        })
    }

    pub fn cell_count(&self) -> u64 {
        self.cell_count
    }

    pub fn cell_ordinal(&self, pos: &[usize]) -> u64 {
        pos.iter()
            .zip(&self.modulos)
            .map(|(&p, &m)| p as u64 * m)
            .sum()
    }

    pub fn cell_pos(&self, ordinal: u64) -> SmallVec<[usize; 4]> {
        let mut pos: SmallVec<[usize; 4]> = SmallVec::from_elem(0, self.modulos.len());
        let mut rest = ordinal;
        for i in (0..self.modulos.len()).rev() {
            let m = self.modulos[i];
            pos[i] = (rest / m) as usize;
            rest %= m;
        }
        pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn axis_zero_varies_fastest() {
        let m = Modulos::new(&[3, 4]).unwrap();
        assert_eq!(m.cell_count(), 12);
        assert_eq!(m.cell_ordinal(&[0, 0]), 0);
        assert_eq!(m.cell_ordinal(&[1, 0]), 1);
        assert_eq!(m.cell_ordinal(&[0, 1]), 3);
        assert_eq!(m.cell_ordinal(&[2, 3]), 11);
        assert_eq!(m.cell_pos(7).as_slice(), &[1, 2]);
    }

    #[test]
    fn zero_axes_have_one_cell() {
        let m = Modulos::new(&[]).unwrap();
        assert_eq!(m.cell_count(), 1);
        assert_eq!(m.cell_ordinal(&[]), 0);
        assert!(m.cell_pos(0).is_empty());
    }

    #[test]
    fn overflow_is_reported() {
        assert!(Modulos::new(&[usize::MAX, usize::MAX, 4]).is_none());
    }

    proptest! {
        #[test]
        fn ordinal_inverse(lengths in proptest::collection::vec(1usize..20, 0..6), seed in any::<u64>()) {
            let m = Modulos::new(&lengths).unwrap();
            let ordinal = seed % m.cell_count();
            let pos = m.cell_pos(ordinal);
            prop_assert!(pos.iter().zip(&lengths).all(|(p, l)| p < l));
            prop_assert_eq!(m.cell_ordinal(&pos), ordinal);
        }
    }
}
