//! The heightfield module contains the types and functions for working with [`Heightfield`]s.
//!
//! A heightfield is a 3D grid of [`Span`]s, where each column contains 0, 1, or more spans.

use thiserror::Error;

use crate::{
    Aabb3d,
    span::{Span, SpanKey, Spans},
};

/// A dynamic voxel grid: every column holds a linked list of solid [`Span`]s.
///
/// Build with [`HeightfieldBuilder`].
#[derive(Debug, Clone)]
pub struct Heightfield {
    /// The width of the heightfield along the x-axis in cell units
    pub width: u16,
    /// The height of the heightfield along the z-axis in cell units
    pub height: u16,
    /// The AABB of the heightfield
    pub aabb: Aabb3d,
    /// The size of each cell on the xz-plane
    pub cell_size: f32,
    /// The size of each cell along the y-axis
    pub cell_height: f32,
    /// The indices to the spans in the heightfield in width*height order
    /// Each index corresponds to a column in the heightfield by pointing to the lowest span in the column
    pub spans: Vec<Option<SpanKey>>,
    /// All spans in the heightfield
    pub allocated_spans: Spans,
}

impl Heightfield {
    /// Inserts `span` into the column at `x`, `z`, merging it with every span it overlaps.
    ///
    /// When the merged ceiling is at most `flag_merge_threshold` above the existing span's ceiling,
    /// the higher area type wins. Otherwise the area of the new span is kept.
    pub(crate) fn add_span(
        &mut self,
        x: u16,
        z: u16,
        mut span: Span,
        flag_merge_threshold: u16,
    ) -> Result<(), SpanInsertionError> {
        let column = self.column_index(x, z);
        if column >= self.spans.len() {
            return Err(SpanInsertionError::ColumnIndexOutOfBounds { x, z });
        }

        // The span after which the new span is linked in. `None` means the column's head.
        let mut below: Option<SpanKey> = None;
        let mut cursor = self.spans[column];
        while let Some(key) = cursor {
            let existing = self.span(key).clone();
            cursor = existing.next();
            if existing.min() > span.max() {
                break;
            }
            if existing.max() < span.min() {
                below = Some(key);
                continue;
            }

            span.set_min(span.min().min(existing.min()));
            span.set_max(span.max().max(existing.max()));
            if span.max() - existing.max() <= flag_merge_threshold {
                span.set_area(span.area().max(existing.area()));
            }

            // The merged span replaces the existing one. Later spans may still overlap.
            self.allocated_spans.remove(key);
            self.link_after(below, column, existing.next());
        }

        let above = match below {
            Some(below) => self.span(below).next(),
            None => self.spans[column],
        };
        span.set_next(above);
        let key = self.allocated_spans.insert(span);
        self.link_after(below, column, Some(key));
        Ok(())
    }

    /// Points the span `below`, or the head of `column` if there is none, to `next`.
    fn link_after(&mut self, below: Option<SpanKey>, column: usize, next: Option<SpanKey>) {
        match below {
            Some(below) => self.span_mut(below).set_next(next),
            None => self.spans[column] = next,
        }
    }

    #[inline]
    pub(crate) fn column_index(&self, x: u16, z: u16) -> usize {
        x as usize + z as usize * self.width as usize
    }

    #[inline]
    pub(crate) fn contains(&self, x: i32, z: i32) -> bool {
        x >= 0 && x < self.width as i32 && z >= 0 && z < self.height as i32
    }

    /// Returns the key of the lowest span in the column at the given coordinates.
    /// `None` if either the index is out of bounds or there is no span in the column.
    #[inline]
    pub fn span_key_at(&self, x: u16, z: u16) -> Option<SpanKey> {
        let column_index = self.column_index(x, z);
        let Some(span_key) = self.spans.get(column_index) else {
            // Invalid coordinates
            return None;
        };
        *span_key
    }

    /// Returns the span at the given coordinates.
    /// `None` if either the index is out of bounds or there is no span in the column.
    #[inline]
    pub fn span_at(&self, x: u16, z: u16) -> Option<&Span> {
        let span_key = self.span_key_at(x, z)?;
        Some(self.span(span_key))
    }

    /// Iterates over the keys of all spans in a column, bottom to top.
    pub fn column_keys(&self, x: u16, z: u16) -> impl Iterator<Item = SpanKey> + '_ {
        std::iter::successors(self.span_key_at(x, z), |key| self.span(*key).next())
    }

    /// Returns a reference to the span with the given key.
    /// # Panics
    /// Panics if the key is not found.
    #[inline]
    pub fn span(&self, key: SpanKey) -> &Span {
        &self.allocated_spans[key]
    }

    /// Returns a mutable reference to the span with the given key.
    /// # Panics
    /// Panics if the key is not found.
    #[inline]
    pub fn span_mut(&mut self, key: SpanKey) -> &mut Span {
        &mut self.allocated_spans[key]
    }
}

/// A builder for [`Heightfield`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightfieldBuilder {
    /// The AABB of the heightfield
    pub aabb: Aabb3d,
    /// The size of each cell on the xz-plane
    pub cell_size: f32,
    /// The size of each cell along the y-axis
    pub cell_height: f32,
}

impl HeightfieldBuilder {
    /// Builds the heightfield.
    pub fn build(self) -> Result<Heightfield, HeightfieldBuilderError> {
        let width = (self.aabb.max.x - self.aabb.min.x) / self.cell_size + 0.5;
        let height = (self.aabb.max.z - self.aabb.min.z) / self.cell_size + 0.5;
        if !(width >= 0.0 && height >= 0.0)
            || width > u16::MAX as f32
            || height > u16::MAX as f32
        {
            return Err(HeightfieldBuilderError::ColumnCountTooLarge { width, height });
        }
        let width = width as u16;
        let height = height as u16;
        let column_count = width as usize * height as usize;
        Ok(Heightfield {
            width,
            height,
            aabb: self.aabb,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            spans: vec![None; column_count],
            allocated_spans: Spans::for_columns(column_count),
        })
    }
}

/// Errors that can occur when building a [`Heightfield`] with [`HeightfieldBuilder::build`].
#[derive(Error, Debug)]
pub enum HeightfieldBuilderError {
    /// Happens when the grid does not fit into 16 bit cell coordinates.
    #[error(
        "Heightfield grid of {width}x{height} cells does not fit into the max of {max}x{max}",
        max = u16::MAX
    )]
    ColumnCountTooLarge {
        /// The width of the heightfield along the x-axis in cell units
        width: f32,
        /// The height of the heightfield along the z-axis in cell units
        height: f32,
    },
}

/// Errors that can occur when inserting a span into a [`Heightfield`]
#[derive(Error, Debug)]
pub enum SpanInsertionError {
    /// Happens when the column index is out of bounds.
    #[error("column index out of bounds: x={x}, z={z}")]
    ColumnIndexOutOfBounds {
        /// The x-coordinate of the span
        x: u16,
        /// The z-coordinate of the span
        z: u16,
    },
}

#[cfg(test)]
mod tests {
    use glam::Vec3A;

    use crate::{Aabb3d, span::AreaType};

    use super::*;

    fn height_field() -> Heightfield {
        HeightfieldBuilder {
            aabb: Aabb3d::new(Vec3A::ZERO, [5.0, 5.0, 5.0]),
            cell_size: 1.0,
            cell_height: 1.0,
        }
        .build()
        .unwrap()
    }

    fn span_low() -> Span {
        Span::new(2, 4, AreaType(2))
    }

    fn span_mid() -> Span {
        Span::new(4, 7, AreaType(2))
    }

    fn span_high() -> Span {
        Span::new(7, 10, AreaType(2))
    }

    fn insert(heightfield: &mut Heightfield, x: u16, z: u16, span: Span) {
        heightfield
            .add_span(x, z, span, 0)
            .unwrap();
    }

    #[test]
    fn grid_size_follows_aabb() {
        let heightfield = height_field();
        assert_eq!(heightfield.width, 10);
        assert_eq!(heightfield.height, 10);
        assert_eq!(heightfield.spans.len(), 100);
    }

    #[test]
    fn can_add_span() {
        let mut heightfield = height_field();
        let expected_span = span_low();
        insert(&mut heightfield, 1, 3, expected_span.clone());
        let span = heightfield.span_at(1, 3).unwrap();
        assert_eq!(*span, expected_span);

        let empty_span = heightfield.span_at(3, 1);
        assert_eq!(empty_span, None);
    }

    #[test]
    fn rejects_out_of_bounds_column() {
        let mut heightfield = height_field();
        let result = heightfield.add_span(3, 10, span_low(), 0);
        assert!(result.is_err());
    }

    #[test]
    fn can_add_higher_span_in_same_column() {
        let mut heightfield = height_field();
        let span_low = span_low();
        insert(&mut heightfield, 1, 3, span_low.clone());
        let span_high = span_high();
        insert(&mut heightfield, 1, 3, span_high.clone());

        let keys: Vec<_> = heightfield.column_keys(1, 3).collect();
        assert_eq!(keys.len(), 2);
        assert_eq_without_next(heightfield.span(keys[0]), &span_low);
        assert_eq_without_next(heightfield.span(keys[1]), &span_high);
    }

    #[test]
    fn can_add_lower_span_in_same_column() {
        let mut heightfield = height_field();
        let span_high = span_high();
        insert(&mut heightfield, 1, 3, span_high.clone());
        let span_low = span_low();
        insert(&mut heightfield, 1, 3, span_low.clone());

        let keys: Vec<_> = heightfield.column_keys(1, 3).collect();
        assert_eq!(keys.len(), 2);
        assert_eq_without_next(heightfield.span(keys[0]), &span_low);
        assert_eq_without_next(heightfield.span(keys[1]), &span_high);
    }

    #[test]
    fn can_merge_spans() {
        let mut heightfield = height_field();
        let span_low = span_low();
        insert(&mut heightfield, 1, 3, span_low.clone());
        let span_mid: Span = span_mid();
        insert(&mut heightfield, 1, 3, span_mid.clone());

        let merged_span = Span::new(span_low.min(), span_mid.max(), span_mid.area());

        let span = heightfield.span_at(1, 3).unwrap();
        assert_eq!(*span, merged_span);
        assert_eq!(heightfield.allocated_spans.len(), 1);
    }

    #[test]
    fn merge_keeps_higher_area_within_threshold() {
        let mut heightfield = height_field();
        insert(&mut heightfield, 0, 0, Span::new(0, 5, AreaType(7)));
        heightfield
            .add_span(0, 0, Span::new(3, 6, AreaType(2)), 1)
            .unwrap();
        let span = heightfield.span_at(0, 0).unwrap();
        assert_eq!(span.min(), 0);
        assert_eq!(span.max(), 6);
        assert_eq!(span.area(), AreaType(7));
    }

    #[track_caller]
    fn assert_eq_without_next(span: &Span, expected_span: &Span) {
        assert_eq!(span.min(), expected_span.min(), "min is not equal");
        assert_eq!(span.max(), expected_span.max(), "max is not equal");
        assert_eq!(span.area(), expected_span.area(), "area is not equal");
    }
}
