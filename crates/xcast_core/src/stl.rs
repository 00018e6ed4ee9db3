//! Binary STL specimen loading.
//!
//! Reads the common binary STL layout: an 80-byte header, a little-endian
//! `u32` triangle count, then 50-byte records of normal + three vertices +
//! a 2-byte attribute field. ASCII STL is not supported.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use thiserror::Error;
use xcast_math::Vec3;

use crate::mesh::Mesh;

/// Errors that can occur while loading an STL file.
#[derive(Error, Debug)]
pub enum StlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("truncated STL file: expected {expected} triangles, read {read}")]
    Truncated { expected: u32, read: u32 },

    #[error("STL file contains no triangles")]
    Empty,
}

/// Result type for STL loading.
pub type StlResult<T> = Result<T, StlError>;

fn read_f32_le(reader: &mut impl Read) -> std::io::Result<f32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn read_u32_le(reader: &mut impl Read) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_vec3_le(reader: &mut impl Read) -> std::io::Result<Vec3> {
    let x = read_f32_le(reader)?;
    let y = read_f32_le(reader)?;
    let z = read_f32_le(reader)?;
    Ok(Vec3::new(x, y, z))
}

/// Load a binary STL file into a [`Mesh`].
///
/// Vertices are emitted per-corner without deduplication, so the resulting
/// mesh has `3 * triangle_count` positions with sequential indices. Face
/// normals from the file are kept; degenerate triangles are left in place
/// for the scene builder to filter.
pub fn load_stl<P: AsRef<Path>>(path: P) -> StlResult<Mesh> {
    let file = File::open(path.as_ref())?;
    let mut reader = BufReader::new(file);

    // 80-byte header, ignored
    let mut header = [0u8; 80];
    reader.read_exact(&mut header)?;

    let triangle_count = read_u32_le(&mut reader)?;
    if triangle_count == 0 {
        return Err(StlError::Empty);
    }

    let mut positions = Vec::with_capacity(triangle_count as usize * 3);
    let mut normals = Vec::with_capacity(triangle_count as usize * 3);
    let mut indices = Vec::with_capacity(triangle_count as usize * 3);

    for i in 0..triangle_count {
        let normal = match read_vec3_le(&mut reader) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(StlError::Truncated {
                    expected: triangle_count,
                    read: i,
                });
            }
            Err(e) => return Err(e.into()),
        };

        for _ in 0..3 {
            let v = read_vec3_le(&mut reader).map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    StlError::Truncated {
                        expected: triangle_count,
                        read: i,
                    }
                } else {
                    StlError::Io(e)
                }
            })?;
            indices.push(positions.len() as u32);
            positions.push(v);
            normals.push(normal);
        }

        // 2-byte attribute count, ignored
        let mut attr = [0u8; 2];
        reader.read_exact(&mut attr).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                StlError::Truncated {
                    expected: triangle_count,
                    read: i,
                }
            } else {
                StlError::Io(e)
            }
        })?;
    }

    log::info!(
        "Loaded STL: {} triangles, {} vertices",
        triangle_count,
        positions.len()
    );

    Ok(Mesh::new(positions, indices, Some(normals)))
}
