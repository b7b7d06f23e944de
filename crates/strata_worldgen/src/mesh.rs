//! # Mesh Preparation
//!
//! Converts a snapshot of chunk columns into render-ready buffers.
//!
//! The input is a copy ([`ChunkMeshInput`]), so preparation can run on any
//! thread. The output carries the chunk's edit generation at snapshot time;
//! the chunk manager refuses to install a mesh built from an older snapshot.
//!
//! ## Geometry
//!
//! - one top quad per non-empty column, at the column height
//! - one side quad per face whose neighbour column is lower, spanning the gap
//!
//! Neighbour heights across the chunk border come from a one-cell padding
//! ring in the input, so border faces are correct without touching other
//! chunks.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::chunk::ChunkKey;

/// GPU vertex layout. 32 bytes, no padding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct MeshVertex {
    /// World position.
    pub position: [f32; 3],
    /// Face normal.
    pub normal: [f32; 3],
    /// Block kind tag of the column top.
    pub block: u32,
    /// Cap tag of the column top.
    pub cap: u32,
}

/// Visible surface of one column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceTag {
    /// Block kind tag, 0 for an empty column.
    pub block: u32,
    /// Cap tag.
    pub cap: u32,
}

/// Column data for one chunk, copied out of the chunk manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeshInput {
    /// Chunk being meshed.
    pub key: ChunkKey,
    /// Columns per side.
    pub chunk_size: usize,
    /// Chunk edit generation when the snapshot was taken.
    pub edit_generation: u64,
    /// Heights with a one-cell border, `(chunk_size + 2)^2`, x-major.
    pub heights: Vec<u16>,
    /// Surface of every column in the chunk, `chunk_size^2`, x-major.
    pub surfaces: Vec<SurfaceTag>,
}

impl ChunkMeshInput {
    /// Height at local `(lx, lz)`, where -1 and `chunk_size` address the border.
    #[inline]
    #[must_use]
    pub fn height(&self, lx: i32, lz: i32) -> u16 {
        let padded = self.chunk_size as i32 + 2;
        let (px, pz) = (lx + 1, lz + 1);
        if px < 0 || pz < 0 || px >= padded || pz >= padded {
            return 0;
        }
        self.heights
            .get((px * padded + pz) as usize)
            .copied()
            .unwrap_or(0)
    }
}

/// Render buffers of one chunk.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ChunkMesh {
    /// Chunk this mesh belongs to.
    pub key: ChunkKey,
    /// Edit generation of the snapshot it was built from.
    pub edit_generation: u64,
    /// Vertices.
    pub vertices: Vec<MeshVertex>,
    /// Triangle indices.
    pub indices: Vec<u32>,
    /// Non-empty blocks in the chunk.
    pub block_count: u64,
}

impl ChunkMesh {
    /// Number of quads.
    #[inline]
    #[must_use]
    pub fn quad_count(&self) -> usize {
        self.vertices.len() / 4
    }

    /// True when there is nothing to draw.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Vertex buffer as raw bytes for upload.
    #[inline]
    #[must_use]
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    fn push_quad(&mut self, corners: [[f32; 3]; 4], normal: [f32; 3], surface: SurfaceTag) {
        let base = self.vertices.len() as u32;
        for position in corners {
            self.vertices.push(MeshVertex {
                position,
                normal,
                block: surface.block,
                cap: surface.cap,
            });
        }
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
}

/// Builds the mesh for one chunk snapshot.
#[must_use]
pub fn prepare_chunk_mesh(input: &ChunkMeshInput) -> ChunkMesh {
    let size = input.chunk_size as i32;
    let mut mesh = ChunkMesh {
        key: input.key,
        edit_generation: input.edit_generation,
        ..ChunkMesh::default()
    };

    for lx in 0..size {
        for lz in 0..size {
            let h = input.height(lx, lz);
            if h == 0 {
                continue;
            }
            mesh.block_count += u64::from(h);
            let surface = input
                .surfaces
                .get((lx * size + lz) as usize)
                .copied()
                .unwrap_or_default();

            let x0 = (input.key.cx * size + lx) as f32;
            let z0 = (input.key.cz * size + lz) as f32;
            let (x1, z1) = (x0 + 1.0, z0 + 1.0);
            let top = f32::from(h);

            mesh.push_quad(
                [[x0, top, z0], [x0, top, z1], [x1, top, z1], [x1, top, z0]],
                [0.0, 1.0, 0.0],
                surface,
            );

            let faces: [(i32, i32, [f32; 3]); 4] = [
                (1, 0, [1.0, 0.0, 0.0]),
                (-1, 0, [-1.0, 0.0, 0.0]),
                (0, 1, [0.0, 0.0, 1.0]),
                (0, -1, [0.0, 0.0, -1.0]),
            ];
            for (dx, dz, normal) in faces {
                let neighbour = input.height(lx + dx, lz + dz);
                if neighbour >= h {
                    continue;
                }
                let bottom = f32::from(neighbour);
                let corners = match (dx, dz) {
                    (1, _) => [[x1, bottom, z0], [x1, bottom, z1], [x1, top, z1], [x1, top, z0]],
                    (-1, _) => [[x0, bottom, z1], [x0, bottom, z0], [x0, top, z0], [x0, top, z1]],
                    (_, 1) => [[x1, bottom, z1], [x0, bottom, z1], [x0, top, z1], [x1, top, z1]],
                    _ => [[x0, bottom, z0], [x1, bottom, z0], [x1, top, z0], [x0, top, z0]],
                };
                mesh.push_quad(corners, normal, surface);
            }
        }
    }
    mesh
}

/// Prepares several chunks in one go (one `mesh-preparation` message).
#[must_use]
pub fn prepare_mesh_batch(inputs: &[ChunkMeshInput]) -> Vec<ChunkMesh> {
    inputs.iter().map(prepare_chunk_mesh).collect()
}
