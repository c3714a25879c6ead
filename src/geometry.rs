// ============================================================================
// PLANE GEOMETRY — subdivided grid that the displacement map pushes around
// ============================================================================

use std::io::Write;

use bytemuck::{Pod, Zeroable};

/// Interleaved vertex as uploaded by the scene host.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct TerrainVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// Square plane in the XY plane, centered on the origin, facing +Z, with
/// `segments × segments` quads.
#[derive(Clone, Debug)]
pub struct PlaneGeometry {
    size: f32,
    segments: u32,
    vertices: Vec<TerrainVertex>,
    indices: Vec<u32>,
}

impl PlaneGeometry {
    pub fn new(size: f32, segments: u32) -> Self {
        let segments = segments.max(1);
        let row = segments + 1;
        let half = size * 0.5;
        let step = size / segments as f32;

        let mut vertices = Vec::with_capacity((row * row) as usize);
        for iy in 0..row {
            for ix in 0..row {
                let u = ix as f32 / segments as f32;
                let v = iy as f32 / segments as f32;
                vertices.push(TerrainVertex {
                    position: [ix as f32 * step - half, half - iy as f32 * step, 0.0],
                    normal: [0.0, 0.0, 1.0],
                    // Image row 0 sits at the top edge.
                    uv: [u, 1.0 - v],
                });
            }
        }

        let mut indices = Vec::with_capacity((segments * segments * 6) as usize);
        for iy in 0..segments {
            for ix in 0..segments {
                let a = iy * row + ix;
                let b = (iy + 1) * row + ix;
                let c = (iy + 1) * row + ix + 1;
                let d = iy * row + ix + 1;
                indices.extend_from_slice(&[a, b, d, b, c, d]);
            }
        }

        Self {
            size,
            segments,
            vertices,
            indices,
        }
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn segments(&self) -> u32 {
        self.segments
    }

    pub fn vertices(&self) -> &[TerrainVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Vertex positions after displacement: each vertex moves along its
    /// normal by `scale * h / 255`, with `h` sampled bilinearly from a
    /// `width × height` single-channel heightmap at the vertex UV.
    pub fn displaced_positions(&self, heights: &[u8], width: u32, height: u32, scale: f32) -> Vec<[f32; 3]> {
        if width == 0 || height == 0 || heights.len() < (width * height) as usize {
            return self.vertices.iter().map(|v| v.position).collect();
        }
        self.vertices
            .iter()
            .map(|v| {
                let h = sample_bilinear(heights, width, height, v.uv[0], 1.0 - v.uv[1]) / 255.0;
                let [x, y, z] = v.position;
                let [nx, ny, nz] = v.normal;
                [x + nx * h * scale, y + ny * h * scale, z + nz * h * scale]
            })
            .collect()
    }

    /// Wavefront OBJ of the mesh with the supplied positions.
    pub fn write_obj<W: Write>(&self, positions: &[[f32; 3]], out: &mut W) -> std::io::Result<()> {
        writeln!(out, "# ArtRelief terrain, {} segments", self.segments)?;
        for p in positions {
            writeln!(out, "v {:.6} {:.6} {:.6}", p[0], p[1], p[2])?;
        }
        for v in &self.vertices {
            writeln!(out, "vt {:.6} {:.6}", v.uv[0], v.uv[1])?;
        }
        for tri in self.indices.chunks_exact(3) {
            let (a, b, c) = (tri[0] + 1, tri[1] + 1, tri[2] + 1);
            writeln!(out, "f {a}/{a} {b}/{b} {c}/{c}")?;
        }
        Ok(())
    }
}

/// `u`, `v` in [0, 1] with `v = 0` at the top image row. Clamped at edges.
fn sample_bilinear(data: &[u8], width: u32, height: u32, u: f32, v: f32) -> f32 {
    let fx = (u.clamp(0.0, 1.0) * (width - 1) as f32).max(0.0);
    let fy = (v.clamp(0.0, 1.0) * (height - 1) as f32).max(0.0);
    let x0 = fx.floor() as u32;
    let y0 = fy.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let tx = fx - x0 as f32;
    let ty = fy - y0 as f32;
    let at = |x: u32, y: u32| data[(y * width + x) as usize] as f32;
    let top = at(x0, y0) * (1.0 - tx) + at(x1, y0) * tx;
    let bottom = at(x0, y1) * (1.0 - tx) + at(x1, y1) * tx;
    top * (1.0 - ty) + bottom * ty
}
