//! Static scene content: cube mesh, face normals and the block grid.

use glam::Vec3;
use grabxr_common::BlockGridConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::math::Pose;
use crate::types::{Block, HAND_JOINT_COUNT};

pub const CUBE_VERTEX_COUNT: usize = 36;
pub const CUBE_INDEX_COUNT: u32 = 36;

/// Floor, table and one controller indicator per hand.
pub const FIXED_DRAW_COUNT: usize = 4;

/// One per face, in mesh face order. Vertex `i` uses `FACE_NORMALS[i / 6]`.
pub const FACE_NORMALS: [[f32; 4]; 6] = [
    [1.0, 0.0, 0.0, 0.0],
    [-1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, -1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, -1.0, 0.0],
];

const CORNERS: [[f32; 4]; 8] = [
    [0.5, 0.5, 0.5, 1.0],
    [0.5, 0.5, -0.5, 1.0],
    [0.5, -0.5, 0.5, 1.0],
    [0.5, -0.5, -0.5, 1.0],
    [-0.5, 0.5, 0.5, 1.0],
    [-0.5, 0.5, -0.5, 1.0],
    [-0.5, -0.5, 0.5, 1.0],
    [-0.5, -0.5, -0.5, 1.0],
];

const FACES: [[usize; 6]; 6] = [
    [2, 1, 0, 2, 3, 1],
    [6, 4, 5, 6, 5, 7],
    [0, 1, 5, 0, 5, 4],
    [2, 6, 7, 2, 7, 3],
    [0, 4, 6, 0, 6, 2],
    [1, 3, 7, 1, 7, 5],
];

/// Unit cube centred on the origin, two triangles per face.
pub fn cube_vertices() -> [[f32; 4]; CUBE_VERTEX_COUNT] {
    let mut vertices = [[0.0; 4]; CUBE_VERTEX_COUNT];
    for (face, corners) in FACES.iter().enumerate() {
        for (slot, corner) in corners.iter().enumerate() {
            vertices[face * 6 + slot] = CORNERS[*corner];
        }
    }
    vertices
}

pub fn cube_indices() -> [u32; CUBE_INDEX_COUNT as usize] {
    std::array::from_fn(|i| i as u32)
}

/// Uniform slots needed per view: fixed props, every block, and every joint
/// of both hands.
pub fn draw_capacity(block_count: usize) -> usize {
    block_count + FIXED_DRAW_COUNT + 2 * HAND_JOINT_COUNT
}

/// Box drawn at a pose with a per-axis scale and flat colour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cuboid {
    pub pose: Pose,
    pub scale: Vec3,
    pub colour: Vec3,
}

pub fn floor(view_height_m: f32) -> Cuboid {
    Cuboid {
        pose: Pose::from_position(Vec3::new(0.0, -view_height_m, 0.0)),
        scale: Vec3::new(2.0, 0.1, 2.0),
        colour: Vec3::new(0.4, 0.5, 0.5),
    }
}

pub fn table(view_height_m: f32) -> Cuboid {
    Cuboid {
        pose: Pose::from_position(Vec3::new(0.0, -view_height_m + 0.9, -0.7)),
        scale: Vec3::new(1.0, 0.2, 1.0),
        colour: Vec3::splat(0.6),
    }
}

pub const HAND_INDICATOR_SCALE: Vec3 = Vec3::new(0.02, 0.04, 0.10);
pub const HAND_INDICATOR_COLOUR: Vec3 = Vec3::ONE;
pub const JOINT_SCALE: Vec3 = Vec3::new(1.5, 1.5, 2.5);
pub const JOINT_COLOUR: Vec3 = Vec3::new(1.0, 1.0, 0.0);

/// Lay out `per_axis³` blocks around the configured centre, x outermost.
pub fn block_grid(config: &BlockGridConfig) -> Vec<Block> {
    let mut rng = match config.colour_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    block_grid_with(config, &mut rng)
}

pub fn block_grid_with(config: &BlockGridConfig, rng: &mut impl Rng) -> Vec<Block> {
    let n = config.per_axis;
    let half = (n as f32 - 1.0) * 0.5;
    let centre = Vec3::from_array(config.centre);
    let offset = |i: u32| config.spacing * (i as f32 - half);

    let mut blocks = Vec::with_capacity(config.block_count());
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                let position = centre + Vec3::new(offset(i), offset(j), offset(k));
                let colour = Vec3::new(rng.gen(), rng.gen(), rng.gen());
                blocks.push(Block::at(position, config.size, colour));
            }
        }
    }
    blocks
}
