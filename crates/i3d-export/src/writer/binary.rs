//! Binary `.shapes` subfile
//!
//! Little-endian layout:
//!
//! ```text
//! magic "I3DS" | version u16 | shape count u32
//! per shape:
//!   shape id u32 | name (u16 length + UTF-8) | vertex count u32 | index count u32
//!   stream flags u32 | vertex stride u32 | subset count u32
//!   subsets (material slot, first vertex, vertex count, first index, index count: u32 each)
//!   vertices (interleaved) | indices (u32)
//! crc32 of everything above
//! ```
//!
//! An interleaved vertex is `position f32x3`, then `normal f32x3`, `uv f32x2`,
//! `color f32x4` and `bone indices u8x4 + weights f32x4`, each present only
//! when its stream flag is set. Bone indices point into the shape's palette.

use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;
use tracing::{debug, trace};

use i3d_core::{Error, NodeId, Result};

use crate::geometry::{EncodedMesh, StreamFlags, Subset};

pub const SHAPES_MAGIC: [u8; 4] = *b"I3DS";
pub const SHAPES_VERSION: u16 = 1;

/// Problems in a `.shapes` file
#[derive(Error, Debug)]
pub enum ShapesFileError {
    #[error("not a shapes file (bad magic)")]
    BadMagic,

    #[error("unsupported shapes format version {0}")]
    UnsupportedVersion(u16),

    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("declared {declared} shapes, wrote {written}")]
    ShapeCount { declared: u32, written: u32 },

    #[error("shape name is not UTF-8")]
    InvalidName,

    #[error("truncated: {0}")]
    Truncated(#[from] io::Error),
}

impl From<ShapesFileError> for Error {
    fn from(err: ShapesFileError) -> Self {
        match err {
            ShapesFileError::ShapeCount { .. } => Error::internal(err.to_string()),
            other => Error::scene_format(format!("shapes file: {}", other)),
        }
    }
}

/// Bytes per interleaved vertex
pub fn vertex_stride(flags: StreamFlags) -> u32 {
    let mut stride = 12;
    if flags.normals {
        stride += 12;
    }
    if flags.uvs {
        stride += 8;
    }
    if flags.colors {
        stride += 16;
    }
    if flags.skin {
        stride += 4 + 16;
    }
    stride
}

/// One shape as handed to [`ShapesFileWriter`]
#[derive(Debug, Clone, Copy)]
pub struct ShapeRecord<'a> {
    pub shape_id: u32,
    pub name: &'a str,
    pub mesh: &'a EncodedMesh,
    /// Bone palette; vertex bone indices point into it
    pub palette: &'a [NodeId],
}

impl<'a> ShapeRecord<'a> {
    /// Name as stored: cut to the u16 length field on a char boundary
    pub fn stored_name(&self) -> &'a str {
        let mut end = self.name.len().min(u16::MAX as usize);
        while !self.name.is_char_boundary(end) {
            end -= 1;
        }
        &self.name[..end]
    }

    /// Encoded size in bytes
    pub fn byte_size(&self) -> usize {
        let header = 4 + 2 + self.stored_name().len() + 4 * 5 + self.mesh.subsets.len() * 20;
        header
            + self.mesh.vertex_count() * vertex_stride(self.mesh.streams()) as usize
            + self.mesh.indices.len() * 4
    }
}

/// Writer that feeds every byte into a CRC-32
struct HashingWriter<W> {
    inner: W,
    hasher: crc32fast::Hasher,
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Sequential writer of a shapes file
pub struct ShapesFileWriter<W: Write> {
    out: HashingWriter<W>,
    declared: u32,
    written: u32,
    stream_threshold: usize,
}

impl<W: Write> ShapesFileWriter<W> {
    /// Write the header for `shape_count` shapes.
    ///
    /// Records larger than `stream_threshold` bytes are written vertex by
    /// vertex; smaller ones are assembled in memory first.
    pub fn new(out: W, shape_count: u32, stream_threshold: usize) -> Result<Self> {
        let mut out = HashingWriter {
            inner: out,
            hasher: crc32fast::Hasher::new(),
        };
        out.write_all(&SHAPES_MAGIC)?;
        out.write_u16::<LittleEndian>(SHAPES_VERSION)?;
        out.write_u32::<LittleEndian>(shape_count)?;
        Ok(Self {
            out,
            declared: shape_count,
            written: 0,
            stream_threshold,
        })
    }

    pub fn write_shape(&mut self, record: &ShapeRecord<'_>) -> Result<()> {
        let size = record.byte_size();
        if size > self.stream_threshold {
            debug!(shape = %record.name, bytes = size, "Streaming shape");
            write_record(&mut self.out, record)?;
        } else {
            let mut buffer = Vec::with_capacity(size);
            write_record(&mut buffer, record)?;
            self.out.write_all(&buffer)?;
        }
        self.written += 1;
        trace!(shape = %record.name, id = record.shape_id, "Wrote shape record");
        Ok(())
    }

    /// Append the checksum and hand back the inner writer
    pub fn finish(self) -> Result<W> {
        if self.written != self.declared {
            return Err(ShapesFileError::ShapeCount {
                declared: self.declared,
                written: self.written,
            }
            .into());
        }
        let crc = self.out.hasher.clone().finalize();
        let mut inner = self.out.inner;
        inner.write_u32::<LittleEndian>(crc)?;
        inner.flush()?;
        Ok(inner)
    }
}

fn write_record<W: Write>(w: &mut W, record: &ShapeRecord<'_>) -> io::Result<()> {
    let mesh = record.mesh;
    let flags = mesh.streams();

    w.write_u32::<LittleEndian>(record.shape_id)?;
    let name = record.stored_name().as_bytes();
    w.write_u16::<LittleEndian>(name.len() as u16)?;
    w.write_all(name)?;
    w.write_u32::<LittleEndian>(mesh.vertex_count() as u32)?;
    w.write_u32::<LittleEndian>(mesh.indices.len() as u32)?;
    w.write_u32::<LittleEndian>(flags.bits())?;
    w.write_u32::<LittleEndian>(vertex_stride(flags))?;
    w.write_u32::<LittleEndian>(mesh.subsets.len() as u32)?;
    for subset in &mesh.subsets {
        w.write_u32::<LittleEndian>(subset.material_slot)?;
        w.write_u32::<LittleEndian>(subset.first_vertex)?;
        w.write_u32::<LittleEndian>(subset.vertex_count)?;
        w.write_u32::<LittleEndian>(subset.first_index)?;
        w.write_u32::<LittleEndian>(subset.index_count)?;
    }

    let palette: HashMap<NodeId, u8> = record
        .palette
        .iter()
        .enumerate()
        .map(|(i, bone)| (*bone, i as u8))
        .collect();

    for i in 0..mesh.vertex_count() {
        for c in mesh.positions[i] {
            w.write_f32::<LittleEndian>(c)?;
        }
        if let Some(normals) = &mesh.normals {
            for c in normals[i] {
                w.write_f32::<LittleEndian>(c)?;
            }
        }
        if let Some(uvs) = &mesh.uvs {
            for c in uvs[i] {
                w.write_f32::<LittleEndian>(c)?;
            }
        }
        if let Some(colors) = &mesh.colors {
            for c in colors[i] {
                w.write_f32::<LittleEndian>(c)?;
            }
        }
        if let Some(skin) = &mesh.skin {
            let (indices, weights) = pack_influences(&skin[i], &palette);
            w.write_all(&indices)?;
            for weight in weights {
                w.write_f32::<LittleEndian>(weight)?;
            }
        }
    }

    for index in &mesh.indices {
        w.write_u32::<LittleEndian>(*index)?;
    }
    Ok(())
}

/// Palette indices and weights of one vertex, padded to four entries
pub fn pack_influences(
    binding: &crate::skin::SkinBinding,
    palette: &HashMap<NodeId, u8>,
) -> ([u8; 4], [f32; 4]) {
    let mut indices = [0u8; 4];
    let mut weights = [0f32; 4];
    for (slot, influence) in binding.iter().take(4).enumerate() {
        indices[slot] = palette.get(&influence.bone).copied().unwrap_or(0);
        weights[slot] = influence.weight as f32;
    }
    (indices, weights)
}

/// A shape read back from a shapes file
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedShape {
    pub shape_id: u32,
    pub name: String,
    pub flags: StreamFlags,
    pub subsets: Vec<Subset>,
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub colors: Option<Vec<[f32; 4]>>,
    pub skin: Option<Vec<([u8; 4], [f32; 4])>>,
    pub indices: Vec<u32>,
}

fn read_f32s<const N: usize>(r: &mut Cursor<&[u8]>) -> io::Result<[f32; N]> {
    let mut out = [0f32; N];
    for c in &mut out {
        *c = r.read_f32::<LittleEndian>()?;
    }
    Ok(out)
}

/// Parse and checksum-verify a complete shapes file
pub fn read_shapes_file(bytes: &[u8]) -> Result<Vec<DecodedShape>> {
    Ok(read_shapes(bytes)?)
}

fn read_shapes(bytes: &[u8]) -> std::result::Result<Vec<DecodedShape>, ShapesFileError> {
    if bytes.len() < 4 {
        return Err(ShapesFileError::Truncated(io::ErrorKind::UnexpectedEof.into()));
    }
    let (body, tail) = bytes.split_at(bytes.len() - 4);
    let stored = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
    let computed = crc32fast::hash(body);
    if stored != computed {
        return Err(ShapesFileError::ChecksumMismatch { stored, computed });
    }

    let mut r = Cursor::new(body);
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if magic != SHAPES_MAGIC {
        return Err(ShapesFileError::BadMagic);
    }
    let version = r.read_u16::<LittleEndian>()?;
    if version != SHAPES_VERSION {
        return Err(ShapesFileError::UnsupportedVersion(version));
    }

    let count = r.read_u32::<LittleEndian>()?;
    let mut shapes = Vec::with_capacity(count.min(4096) as usize);
    for _ in 0..count {
        let shape_id = r.read_u32::<LittleEndian>()?;
        let name_len = r.read_u16::<LittleEndian>()? as usize;
        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name)?;
        let name = String::from_utf8(name).map_err(|_| ShapesFileError::InvalidName)?;
        let vertex_count = r.read_u32::<LittleEndian>()? as usize;
        let index_count = r.read_u32::<LittleEndian>()? as usize;
        let flags = StreamFlags::from_bits(r.read_u32::<LittleEndian>()?);
        let _stride = r.read_u32::<LittleEndian>()?;
        let subset_count = r.read_u32::<LittleEndian>()?;
        let mut subsets = Vec::new();
        for _ in 0..subset_count {
            subsets.push(Subset {
                material_slot: r.read_u32::<LittleEndian>()?,
                first_vertex: r.read_u32::<LittleEndian>()?,
                vertex_count: r.read_u32::<LittleEndian>()?,
                first_index: r.read_u32::<LittleEndian>()?,
                index_count: r.read_u32::<LittleEndian>()?,
            });
        }

        let mut shape = DecodedShape {
            shape_id,
            name,
            flags,
            subsets,
            positions: Vec::new(),
            normals: flags.normals.then(Vec::new),
            uvs: flags.uvs.then(Vec::new),
            colors: flags.colors.then(Vec::new),
            skin: flags.skin.then(Vec::new),
            indices: Vec::new(),
        };
        for _ in 0..vertex_count {
            shape.positions.push(read_f32s::<3>(&mut r)?);
            if let Some(normals) = &mut shape.normals {
                normals.push(read_f32s::<3>(&mut r)?);
            }
            if let Some(uvs) = &mut shape.uvs {
                uvs.push(read_f32s::<2>(&mut r)?);
            }
            if let Some(colors) = &mut shape.colors {
                colors.push(read_f32s::<4>(&mut r)?);
            }
            if let Some(skin) = &mut shape.skin {
                let mut indices = [0u8; 4];
                r.read_exact(&mut indices)?;
                skin.push((indices, read_f32s::<4>(&mut r)?));
            }
        }
        for _ in 0..index_count {
            shape.indices.push(r.read_u32::<LittleEndian>()?);
        }
        shapes.push(shape);
    }
    Ok(shapes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skin::{Influence, SkinBinding};
    use i3d_core::{BoundingBox, BoundingVolume};
    use smallvec::smallvec;

    fn triangle_mesh(skinned: bool) -> EncodedMesh {
        let skin: Option<Vec<SkinBinding>> = skinned.then(|| {
            vec![
                smallvec![Influence { bone: NodeId(7), weight: 1.0 }],
                smallvec![
                    Influence { bone: NodeId(9), weight: 0.75 },
                    Influence { bone: NodeId(7), weight: 0.25 }
                ],
                smallvec![Influence { bone: NodeId(9), weight: 1.0 }],
            ]
        });
        EncodedMesh {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: Some(vec![[0.0, 0.0, 1.0]; 3]),
            uvs: Some(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]),
            colors: None,
            skin,
            indices: vec![0, 1, 2],
            subsets: vec![Subset {
                material_slot: 0,
                first_vertex: 0,
                vertex_count: 3,
                first_index: 0,
                index_count: 3,
            }],
            bounding_volume: BoundingVolume::Box(BoundingBox::EMPTY),
            uv_density: vec![Some(1.0)],
        }
    }

    fn write(meshes: &[(&str, &EncodedMesh, Vec<NodeId>)], threshold: usize) -> Vec<u8> {
        let mut writer = ShapesFileWriter::new(Vec::new(), meshes.len() as u32, threshold).unwrap();
        for (i, (name, mesh, palette)) in meshes.iter().enumerate() {
            writer
                .write_shape(&ShapeRecord {
                    shape_id: i as u32 + 1,
                    name,
                    mesh,
                    palette,
                })
                .unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_layout_and_read_back() {
        let mesh = triangle_mesh(true);
        let palette = [NodeId(7), NodeId(9)];
        let bytes = write(&[("arm", &mesh, palette.to_vec())], usize::MAX);

        assert_eq!(&bytes[..4], b"I3DS");
        assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), SHAPES_VERSION);
        let record = ShapeRecord {
            shape_id: 1,
            name: "arm",
            mesh: &mesh,
            palette: &palette,
        };
        assert_eq!(bytes.len(), 4 + 2 + 4 + record.byte_size() + 4);

        let shapes = read_shapes_file(&bytes).unwrap();
        assert_eq!(shapes.len(), 1);
        let shape = &shapes[0];
        assert_eq!(shape.name, "arm");
        assert_eq!(shape.positions, mesh.positions);
        assert_eq!(shape.indices, vec![0, 1, 2]);
        assert!(shape.colors.is_none());
        let skin = shape.skin.as_ref().unwrap();
        assert_eq!(skin[1], ([1, 0, 0, 0], [0.75, 0.25, 0.0, 0.0]));
        assert_eq!(skin[0].0[0], 0);
    }

    #[test]
    fn test_long_name_cut_on_char_boundary() {
        let mesh = triangle_mesh(false);
        // 'é' is two bytes, so the odd u16 limit falls inside one
        let name = "é".repeat(u16::MAX as usize / 2 + 1);
        let record = ShapeRecord {
            shape_id: 1,
            name: &name,
            mesh: &mesh,
            palette: &[],
        };
        assert_eq!(record.stored_name().len(), u16::MAX as usize - 1);

        let bytes = write(&[(name.as_str(), &mesh, Vec::new())], usize::MAX);
        assert_eq!(bytes.len(), 4 + 2 + 4 + record.byte_size() + 4);
        let shapes = read_shapes_file(&bytes).unwrap();
        assert_eq!(shapes[0].name, record.stored_name());
        assert!(name.starts_with(&shapes[0].name));
    }

    #[test]
    fn test_streamed_bytes_match_buffered() {
        let mesh = triangle_mesh(false);
        assert_eq!(
            write(&[("a", &mesh, Vec::new())], 0),
            write(&[("a", &mesh, Vec::new())], usize::MAX)
        );
    }

    #[test]
    fn test_stride() {
        assert_eq!(vertex_stride(StreamFlags::default()), 12);
        let all = StreamFlags {
            normals: true,
            uvs: true,
            colors: true,
            skin: true,
        };
        assert_eq!(vertex_stride(all), 12 + 12 + 8 + 16 + 20);
    }

    #[test]
    fn test_corruption_detected() {
        let mesh = triangle_mesh(false);
        let mut bytes = write(&[("a", &mesh, Vec::new())], usize::MAX);
        bytes[12] ^= 0xff;
        assert!(read_shapes_file(&bytes).is_err());
    }

    #[test]
    fn test_shape_count_enforced() {
        let writer = ShapesFileWriter::new(Vec::new(), 2, 0).unwrap();
        assert!(writer.finish().is_err());
    }
}
