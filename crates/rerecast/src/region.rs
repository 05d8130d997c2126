bitflags::bitflags! {
    /// The id of a region in a [`CompactHeightfield`](crate::CompactHeightfield).
    ///
    /// The lower 15 bits are the actual id, the highest bit marks border regions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    #[repr(transparent)]
    pub struct RegionId: u16 {
        /// The default region, which is used for spans that are not in a region, i.e. not walkable.
        const NONE = 0;
        /// Heightfield border flag.
        /// If a heightfield region ID has this bit set, then the region is a border
        /// region and its spans are considered un-walkable.
        /// (Used during the region and contour build process.)
        const BORDER_REGION = 0x8000;
        /// All bits.
        const MAX = u16::MAX;
    }
}

impl From<u16> for RegionId {
    #[inline]
    fn from(value: u16) -> Self {
        Self::from_bits_retain(value)
    }
}

impl RegionId {
    /// Returns `true` if this is a border region.
    #[inline]
    pub fn is_border(self) -> bool {
        self.intersects(Self::BORDER_REGION)
    }

    /// Returns `true` if the id is neither [`RegionId::NONE`] nor a border region.
    #[inline]
    pub fn is_walkable_region(self) -> bool {
        self != Self::NONE && !self.is_border()
    }
}
