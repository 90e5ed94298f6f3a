use smallvec::SmallVec;

/// Packs cell coordinates of up to four axes into one `u64`.
///
/// Coordinates are mixed-radix digits with a fixed radix per axis count:
/// `key = p0 + R*p1 + R^2*p2 + R^3*p3`. The radix is the largest axis
/// length that keeps every key below 2^63:
///
/// | axes | radix (max axis length) |
/// |------|-------------------------|
/// | 0    | n/a (single key 0)      |
/// | 1    | unbounded               |
/// | 2    | 2^31                    |
/// | 3    | 2,097,151               |
/// | 4    | 55,108                  |
///
/// Results with more axes, or with an axis longer than the radix, are
/// stored in the map-backed store instead.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CellKeyCodec {
    Zero,
    One,
    Two,
    Three,
    Four,
}

impl CellKeyCodec {
    pub const MAX_AXIS_2: u64 = 1 << 31;
    pub const MAX_AXIS_3: u64 = 2_097_151;
    pub const MAX_AXIS_4: u64 = 55_108;

    /// Codec for a result whose axes have the given lengths, if one fits.
    pub fn for_axes(lengths: &[usize]) -> Option<Self> {
        let codec = match lengths.len() {
            0 => Self::Zero,
            1 => Self::One,
            2 => Self::Two,
            3 => Self::Three,
            4 => Self::Four,
            _ => return None,
        };
        let fits = match codec.radix() {
            None => true,
            Some(r) => lengths.iter().all(|&l| l as u64 <= r),
        };
        fits.then_some(codec)
    }

    #[inline]
    pub fn axis_count(self) -> usize {
        match self {
            Self::Zero => 0,
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
        }
    }

    #[inline]
    pub fn radix(self) -> Option<u64> {
        match self {
            Self::Zero | Self::One => None,
            Self::Two => Some(Self::MAX_AXIS_2),
            Self::Three => Some(Self::MAX_AXIS_3),
            Self::Four => Some(Self::MAX_AXIS_4),
        }
    }

    #[inline]
    pub fn encode(self, pos: &[usize]) -> u64 {
        debug_assert_eq!(pos.len(), self.axis_count());
        match self.radix() {
            None => pos.first().map_or(0, |&p| p as u64),
            Some(r) => pos.iter().rev().fold(0u64, |acc, &p| acc * r + p as u64),
        }
    }

    pub fn decode(self, key: u64) -> SmallVec<[usize; 4]> {
        let mut out = SmallVec::new();
        match self.radix() {
            None => {
                if self == Self::One {
                    out.push(key as usize);
                }
            }
            Some(r) => {
                let mut k = key;
                for _ in 0..self.axis_count() {
                    out.push((k % r) as usize);
                    k /= r;
                }
            }
        }
        out
    }
}
