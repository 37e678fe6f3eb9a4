//! Index generation for the terrain tile mesh. Vertex positions are
//! computed in the vertex shader from the tile bounds; only the triangle
//! strip indices live on the CPU. The strip covers a regular grid in
//! raster order (first row north) plus a curtain of skirt vertices along
//! the perimeter that hides cracks between neighbouring LODs.

/// Triangle strip over the surface grid. Degenerate triangles at row
/// turnarounds keep the strip running; they rasterize to nothing.
pub fn surface_quads(vertex_side_length: u32) -> Vec<u16> {
    assert!(vertex_side_length >= 2);
    let n = vertex_side_length;
    assert!(n * n + 4 * (n - 1) < u16::MAX as u32);
    let index_for = |row: u32, col: u32| -> u16 { (col + row * n) as u16 };

    let mut indices = Vec::with_capacity((2 * n * (n - 1) + 2 * (n - 1)) as usize);
    for row in 0..n - 1 {
        for col in 0..n {
            indices.push(index_for(row, col));
            indices.push(index_for(row + 1, col));
        }
        indices.push(index_for(row + 1, n - 1));
        indices.push(index_for(row + 1, 0));
    }
    indices.truncate(indices.len() - 2);
    indices
}

/// Surface strip continued around the perimeter with one extra skirt
/// vertex per edge vertex. Skirt vertices are indexed past the grid
/// (n*n ..) in the exact order this walk emits them: right edge bottom to
/// top, top edge right to left, left edge top to bottom, bottom edge left
/// to right.
pub fn surface_quads_with_curtains(vertex_side_length: u32) -> Vec<u16> {
    let n = vertex_side_length;
    let mut indices = surface_quads(vertex_side_length);
    let index_for = |row: u32, col: u32| -> u16 { (col + row * n) as u16 };

    let mut curtain_index = *indices.last().expect("surface strip is never empty") + 1;
    let first_curtain_index = curtain_index;

    for row in (1..n).rev() {
        indices.push(index_for(row, n - 1));
        indices.push(curtain_index);
        curtain_index += 1;
    }
    for col in (1..n).rev() {
        indices.push(index_for(0, col));
        indices.push(curtain_index);
        curtain_index += 1;
    }
    for row in 0..n - 1 {
        indices.push(index_for(row, 0));
        indices.push(curtain_index);
        curtain_index += 1;
    }
    for col in 0..n - 1 {
        indices.push(index_for(n - 1, col));
        indices.push(curtain_index);
        curtain_index += 1;
    }
    indices.push(index_for(n - 1, n - 1));
    indices.push(first_curtain_index);

    indices
}

/// Total vertex count the strip addresses: the grid plus its skirt ring.
pub fn vertex_count_with_curtains(vertex_side_length: u32) -> u32 {
    vertex_side_length * vertex_side_length + 4 * (vertex_side_length - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_quads_2x2() {
        assert_eq!(surface_quads(2), vec![0, 2, 1, 3]);
    }

    #[test]
    fn surface_quads_3x3() {
        assert_eq!(
            surface_quads(3),
            vec![0, 3, 1, 4, 2, 5, 5, 3, 3, 6, 4, 7, 5, 8]
        );
    }

    #[test]
    fn surface_quads_4x4() {
        assert_eq!(
            surface_quads(4),
            vec![
                0, 4, 1, 5, 2, 6, 3, 7, 7, 4, 4, 8, 5, 9, 6, 10, 7, 11, 11, 8, 8, 12, 9, 13, 10,
                14, 11, 15
            ]
        );
    }

    #[test]
    fn surface_quads_with_curtains_2x2() {
        assert_eq!(
            surface_quads_with_curtains(2),
            vec![0, 2, 1, 3, 3, 4, 1, 5, 0, 6, 2, 7, 3, 4]
        );
    }

    #[test]
    fn surface_quads_with_curtains_3x3() {
        assert_eq!(
            surface_quads_with_curtains(3),
            vec![
                0, 3, 1, 4, 2, 5, 5, 3, 3, 6, 4, 7, 5, 8, 8, 9, 5, 10, 2, 11, 1, 12, 0, 13, 3, 14,
                6, 15, 7, 16, 8, 9
            ]
        );
    }

    #[test]
    fn curtain_indices_stay_in_vertex_range() {
        for n in [2u32, 3, 17, 65] {
            let limit = vertex_count_with_curtains(n) as u16;
            let indices = surface_quads_with_curtains(n);
            assert!(indices.iter().all(|&i| i < limit), "n = {n}");
            // every skirt vertex is referenced exactly once
            let skirt_refs = indices
                .iter()
                .filter(|&&i| i >= (n * n) as u16)
                .collect::<std::collections::HashSet<_>>();
            assert_eq!(skirt_refs.len(), (4 * (n - 1)) as usize, "n = {n}");
        }
    }
}
