use crate::region::RegionId;

/// The open space above a walkable span in a [`CompactHeightfield`](crate::CompactHeightfield).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactSpan {
    /// The floor of the open space, in voxels from the heightfield's base.
    pub y: u16,
    /// The region the span belongs to, or [`RegionId::NONE`].
    pub region: RegionId,
    /// Four 6 bit layer indices, one per direction, starting at the lowest bits.
    connections: u32,
    height: u8,
}

impl Default for CompactSpan {
    fn default() -> Self {
        Self {
            y: 0,
            region: RegionId::NONE,
            connections: Self::ALL_DISCONNECTED,
            height: 0,
        }
    }
}

impl CompactSpan {
    pub(crate) const NOT_CONNECTED: u8 = 0x3f;
    const ALL_DISCONNECTED: u32 = 0x00ff_ffff;

    pub(crate) fn new(y: u16, height: u8) -> Self {
        Self {
            y,
            height,
            ..Default::default()
        }
    }

    #[inline]
    fn shift(direction: u8) -> u32 {
        debug_assert!(direction < 4);
        direction as u32 * 6
    }

    /// Links the span to the neighbor at layer `neighbor` in the given direction,
    /// or unlinks it for `None`.
    #[inline]
    pub fn set_con(&mut self, direction: u8, neighbor: impl Into<Option<u8>>) {
        let shift = Self::shift(direction);
        let layer = neighbor
            .into()
            .map_or(Self::NOT_CONNECTED, |layer| layer & Self::NOT_CONNECTED);
        self.connections &= !((Self::NOT_CONNECTED as u32) << shift);
        self.connections |= (layer as u32) << shift;
    }

    /// The layer index of the neighbor in the given direction, within the neighbor's column.
    /// `None` if the span has no neighbor there.
    #[inline]
    pub fn con(&self, direction: u8) -> Option<u8> {
        let layer = (self.connections >> Self::shift(direction)) as u8 & Self::NOT_CONNECTED;
        (layer != Self::NOT_CONNECTED).then_some(layer)
    }

    /// Height of the open space, in voxels.
    #[inline]
    pub fn height(&self) -> u8 {
        self.height
    }

    /// Sets the height of the open space, in voxels.
    #[inline]
    pub fn set_height(&mut self, height: u8) {
        self.height = height;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected() {
        let span = CompactSpan::default();
        assert!((0..4).all(|dir| span.con(dir).is_none()));
        assert_eq!(span.height(), 0);
    }

    #[test]
    fn directions_are_independent() {
        let mut span = CompactSpan::default();
        for (dir, layer) in [(0, 1_u8), (1, 3), (2, 5), (3, 62)] {
            span.set_con(dir, layer);
        }
        span.set_con(0, 2);
        span.set_con(2, None);
        assert_eq!(
            (0..4).map(|dir| span.con(dir)).collect::<Vec<_>>(),
            [Some(2), Some(3), None, Some(62)]
        );
    }

    #[test]
    fn height_does_not_clobber_connections() {
        let mut span = CompactSpan::default();
        span.set_con(3, Some(7));
        span.set_height(255);
        assert_eq!(span.con(3), Some(7));
        assert_eq!(span.height(), 255);
    }
}
