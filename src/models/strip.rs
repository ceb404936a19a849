//! Triangle-strip to triangle-list conversion.
//!
//! A 3-wide window slides over the strip. Windows whose indices are not
//! pairwise distinct are degenerate (strip restarts) and produce nothing.
//! Windows at odd positions have their winding flipped so every emitted
//! triangle faces the same way.

use itertools::Itertools;

use crate::error::{DecodeError, DecodeResult};
use crate::models::vertex_format::{ShapeGeometry, Vertex};

/// One emitted triangle, vertices in output winding order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub vertices: [Vertex; 3],
}

/// A strip whose indices have been checked against the vertex count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriangleStrip {
    indices: Vec<u16>,
}

impl TriangleStrip {
    pub fn new(indices: Vec<u16>, vertex_count: usize) -> DecodeResult<Self> {
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(DecodeError::VertexIndexOutOfRange {
                index,
                vertex_count,
            });
        }
        Ok(Self { indices })
    }

    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    /// Surviving windows as index triples, in scan order.
    pub fn index_triangles(&self) -> StripWindows<'_> {
        StripWindows {
            indices: &self.indices,
            position: 0,
        }
    }

    /// Resolve every surviving window against `geometry`. Each call starts a
    /// fresh pass over the strip.
    pub fn triangles<'s, 'a>(&'s self, geometry: ShapeGeometry<'a>) -> Triangles<'s, 'a> {
        Triangles {
            windows: self.index_triangles(),
            geometry,
        }
    }
}

/// Iterator over the non-degenerate windows of a strip.
#[derive(Debug, Clone)]
pub struct StripWindows<'s> {
    indices: &'s [u16],
    position: usize,
}

impl Iterator for StripWindows<'_> {
    type Item = [u16; 3];

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(window) = self.indices.get(self.position..self.position + 3) {
            let position = self.position;
            self.position += 1;

            if !window.iter().all_unique() {
                continue;
            }

            let [a, b, c] = [window[0], window[1], window[2]];
            return Some(if position % 2 == 1 { [c, b, a] } else { [a, b, c] });
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .indices
            .len()
            .saturating_sub(2)
            .saturating_sub(self.position);
        (0, Some(remaining))
    }
}

/// Iterator over the triangles of one shape.
#[derive(Debug, Clone)]
pub struct Triangles<'s, 'a> {
    windows: StripWindows<'s>,
    geometry: ShapeGeometry<'a>,
}

impl Iterator for Triangles<'_, '_> {
    type Item = Triangle;

    fn next(&mut self) -> Option<Self::Item> {
        let [a, b, c] = self.windows.next()?;
        // Indices were validated in `TriangleStrip::new`.
        let vertices = [
            self.geometry.vertex(a as usize)?,
            self.geometry.vertex(b as usize)?,
            self.geometry.vertex(c as usize)?,
        ];
        Some(Triangle { vertices })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.windows.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::vertex_format::VertexLayout;

    /// Compact vertices whose x coordinate equals their index.
    fn indexed_vertices(count: usize) -> Vec<u8> {
        let mut data = Vec::new();
        for i in 0..count {
            for v in [i as f32, 0.0, 0.0, 0.0, 0.0] {
                data.extend_from_slice(&v.to_le_bytes());
            }
        }
        data
    }

    fn xs(triangle: &Triangle) -> [f32; 3] {
        triangle.vertices.map(|v| v.position[0])
    }

    #[test]
    fn four_index_strip_flips_second_triangle() {
        let strip = TriangleStrip::new(vec![0, 1, 2, 3], 4).unwrap();
        let windows: Vec<_> = strip.index_triangles().collect();
        assert_eq!(windows, vec![[0, 1, 2], [3, 2, 1]]);
    }

    #[test]
    fn repeated_index_window_is_skipped() {
        let strip = TriangleStrip::new(vec![0, 1, 1], 2).unwrap();
        assert_eq!(strip.index_triangles().count(), 0);
    }

    #[test]
    fn degenerate_windows_keep_original_parity() {
        // Window 1 (1, 2, 1) is degenerate; window 3 is odd and gets flipped.
        let strip = TriangleStrip::new(vec![0, 1, 2, 1, 3, 2], 4).unwrap();
        let windows: Vec<_> = strip.index_triangles().collect();
        assert_eq!(windows, vec![[0, 1, 2], [2, 1, 3], [2, 3, 1]]);
    }

    #[test]
    fn short_strips_emit_nothing() {
        for indices in [vec![], vec![0], vec![0, 1]] {
            let strip = TriangleStrip::new(indices, 2).unwrap();
            assert_eq!(strip.index_triangles().count(), 0);
        }
    }

    #[test]
    fn triangles_resolve_vertices_and_are_restartable() {
        let data = indexed_vertices(4);
        let geometry = ShapeGeometry::new(VertexLayout::Compact, &data);
        let strip = TriangleStrip::new(vec![0, 1, 2, 3], 4).unwrap();

        let first: Vec<_> = strip.triangles(geometry).collect();
        let second: Vec<_> = strip.triangles(geometry).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(xs(&first[0]), [0.0, 1.0, 2.0]);
        assert_eq!(xs(&first[1]), [3.0, 2.0, 1.0]);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        assert_eq!(
            TriangleStrip::new(vec![0, 1, 4], 4),
            Err(DecodeError::VertexIndexOutOfRange {
                index: 4,
                vertex_count: 4
            })
        );
    }
}
