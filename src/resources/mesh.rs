//! Mesh data structures and generation
//!
//! Triangles wind clockwise when seen from outside, matching the left-handed
//! clockwise-front rasterizer state.

use glam::{Vec2, Vec3, Vec4};

use crate::backend::{BufferHandle, BufferUsage, GraphicsBackend, IndexFormat, Vertex};
use crate::context::RenderContext;
use crate::error::RendererResult;
use crate::shader::Shader;

/// CPU-side geometry, consumed when the GPU [`Mesh`] is built
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Create a unit cube centered at origin
    pub fn cube() -> Self {
        let mut mesh = MeshData::default();

        // Per face: normal, then the U and V axes of its texture space
        let faces = [
            (Vec3::Z, Vec3::NEG_X, Vec3::NEG_Y),
            (Vec3::NEG_Z, Vec3::X, Vec3::NEG_Y),
            (Vec3::X, Vec3::Z, Vec3::NEG_Y),
            (Vec3::NEG_X, Vec3::NEG_Z, Vec3::NEG_Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        ];

        for (normal, u_axis, v_axis) in faces {
            let base = mesh.vertices.len() as u32;
            for (u, v) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
                let position = normal * 0.5 + u_axis * (u - 0.5) + v_axis * (v - 0.5);
                mesh.vertices.push(Vertex {
                    position,
                    normal,
                    uv: Vec2::new(u, v),
                    tangent: Vec4::ZERO,
                });
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        mesh.generate_tangents();
        mesh
    }

    /// Create a UV sphere of diameter 1
    pub fn sphere(segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut mesh = MeshData::default();

        let segment_angle = 2.0 * std::f32::consts::PI / segments as f32;
        let ring_angle = std::f32::consts::PI / rings as f32;

        // Generate vertices
        for ring in 0..=rings {
            let phi = ring as f32 * ring_angle;
            let y = phi.cos();
            let ring_radius = phi.sin();

            for segment in 0..=segments {
                let theta = segment as f32 * segment_angle;
                let normal = Vec3::new(ring_radius * theta.cos(), y, ring_radius * theta.sin());

                mesh.vertices.push(Vertex {
                    position: normal * 0.5,
                    normal,
                    uv: Vec2::new(
                        segment as f32 / segments as f32,
                        ring as f32 / rings as f32,
                    ),
                    tangent: Vec4::ZERO,
                });
            }
        }

        // Generate indices
        for ring in 0..rings {
            for segment in 0..segments {
                let current = ring * (segments + 1) + segment;
                let next = current + segments + 1;

                mesh.indices.extend_from_slice(&[
                    current,
                    current + 1,
                    next,
                    current + 1,
                    next + 1,
                    next,
                ]);
            }
        }

        mesh.generate_tangents();
        mesh
    }

    /// Per-vertex tangents from triangle UV gradients.
    ///
    /// `w` holds the handedness such that `cross(tangent, normal) * w` points along +V.
    pub fn generate_tangents(&mut self) {
        let mut tangents = vec![Vec3::ZERO; self.vertices.len()];
        let mut bitangents = vec![Vec3::ZERO; self.vertices.len()];

        for triangle in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
            let (v0, v1, v2) = (&self.vertices[i0], &self.vertices[i1], &self.vertices[i2]);

            let edge1 = v1.position - v0.position;
            let edge2 = v2.position - v0.position;
            let duv1 = v1.uv - v0.uv;
            let duv2 = v2.uv - v0.uv;

            let determinant = duv1.x * duv2.y - duv2.x * duv1.y;
            if determinant.abs() < f32::EPSILON {
                continue;
            }
            let r = 1.0 / determinant;
            let tangent = (edge1 * duv2.y - edge2 * duv1.y) * r;
            let bitangent = (edge2 * duv1.x - edge1 * duv2.x) * r;

            for index in [i0, i1, i2] {
                tangents[index] += tangent;
                bitangents[index] += bitangent;
            }
        }

        for (i, vertex) in self.vertices.iter_mut().enumerate() {
            let n = vertex.normal;
            // Gram-Schmidt against the normal
            let mut t = (tangents[i] - n * n.dot(tangents[i])).normalize_or_zero();
            if t == Vec3::ZERO {
                t = n.any_orthonormal_vector();
            }
            let w = if t.cross(n).dot(bitangents[i]) < 0.0 { -1.0 } else { 1.0 };
            vertex.tangent = t.extend(w);
        }
    }
}

/// Immutable GPU geometry
#[derive(Debug)]
pub struct Mesh {
    name: String,
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    index_count: u32,
}

impl Mesh {
    pub fn new<B: GraphicsBackend>(
        ctx: &mut RenderContext<B>,
        name: &str,
        data: &MeshData,
    ) -> RendererResult<Self> {
        let vertex_buffer = ctx.create_buffer_init(
            &format!("{} Vertices", name),
            BufferUsage::VERTEX,
            bytemuck::cast_slice(&data.vertices),
        )?;
        let index_buffer = ctx.create_buffer_init(
            &format!("{} Indices", name),
            BufferUsage::INDEX,
            bytemuck::cast_slice(&data.indices),
        )?;
        log::debug!(
            "Mesh {}: {} vertices, {} triangles",
            name,
            data.vertices.len(),
            data.triangle_count()
        );

        Ok(Self {
            name: name.to_string(),
            vertex_buffer,
            index_buffer,
            index_count: data.indices.len() as u32,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn vertex_buffer(&self) -> BufferHandle {
        self.vertex_buffer
    }

    pub fn index_buffer(&self) -> BufferHandle {
        self.index_buffer
    }

    /// Bind the buffers and draw every index
    pub fn draw<B: GraphicsBackend>(
        &self,
        ctx: &mut RenderContext<B>,
        vs: &Shader,
        ps: &Shader,
    ) -> RendererResult<()> {
        ctx.set_vertex_buffer(self.vertex_buffer);
        ctx.set_index_buffer(self.index_buffer, IndexFormat::Uint32);
        ctx.draw_indexed(vs, ps, self.index_count)
    }

    /// Free the GPU buffers
    pub fn destroy<B: GraphicsBackend>(self, ctx: &mut RenderContext<B>) {
        ctx.destroy_buffer(self.vertex_buffer);
        ctx.destroy_buffer(self.index_buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_outward_clockwise(mesh: &MeshData) {
        for triangle in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [
                mesh.vertices[triangle[0] as usize].position,
                mesh.vertices[triangle[1] as usize].position,
                mesh.vertices[triangle[2] as usize].position,
            ];
            let face_normal = (b - a).cross(c - a);
            if face_normal.length_squared() < 1e-12 {
                continue;
            }
            let centroid = (a + b + c) / 3.0;
            assert!(face_normal.dot(centroid) > 0.0, "triangle {:?} faces inward", triangle);
        }
    }

    #[test]
    fn test_cube_counts() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.triangle_count(), 12);
    }

    #[test]
    fn test_cube_winding_faces_outward() {
        assert_outward_clockwise(&MeshData::cube());
    }

    #[test]
    fn test_sphere_winding_faces_outward() {
        assert_outward_clockwise(&MeshData::sphere(16, 8));
    }

    #[test]
    fn test_tangents_are_unit_and_orthogonal() {
        for mesh in [MeshData::cube(), MeshData::sphere(12, 6)] {
            for vertex in &mesh.vertices {
                let t = vertex.tangent.truncate();
                assert!((t.length() - 1.0).abs() < 1e-4);
                assert!(t.dot(vertex.normal).abs() < 1e-4);
                assert!(vertex.tangent.w.abs() == 1.0);
            }
        }
    }

    #[test]
    fn test_cube_tangent_follows_u() {
        let cube = MeshData::cube();
        let front = &cube.vertices[0];
        assert_eq!(front.normal, Vec3::Z);
        assert!(front.tangent.truncate().abs_diff_eq(Vec3::NEG_X, 1e-5));
    }
}
