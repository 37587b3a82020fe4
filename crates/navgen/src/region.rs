bitflags::bitflags! {
    /// A region id in a [`CompactHeightfield`](crate::CompactHeightfield).
    ///
    /// Regions are numbered densely starting at 1. The high bit flags regions painted
    /// along the border of the heightfield.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    #[repr(transparent)]
    pub struct RegionId: u16 {
        /// The region of spans that are not part of any region, e.g. because they are not walkable.
        const NONE = 0;

        /// Heightfield border flag.
        /// If a heightfield region ID has this bit set, then the region is a border
        /// region and its spans are considered un-walkable.
        /// (Used during the region and contour build process.)
        const BORDER_REGION = 0x8000;

        /// The largest region id that can be used for a non-border region.
        const MAX = Self::BORDER_REGION.bits() - 1;
    }
}

impl From<u16> for RegionId {
    fn from(value: u16) -> Self {
        RegionId::from_bits_retain(value)
    }
}

impl From<RegionId> for u16 {
    fn from(value: RegionId) -> Self {
        value.bits()
    }
}

impl RegionId {
    /// Whether this region id is flagged as a border region.
    #[inline]
    pub fn is_border(self) -> bool {
        self.contains(Self::BORDER_REGION)
    }

    /// The next region id.
    #[inline]
    pub(crate) fn next(self) -> Self {
        Self::from_bits_retain(self.bits() + 1)
    }
}
