//! Dataspace message (type 0x0001).

use crate::bytes::{ensure_len, read_uint, write_uint};
use crate::error::FormatError;

/// Kind of dataspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceKind {
    /// A single element with no dimensions.
    Scalar,
    /// An N-dimensional array.
    Simple,
    /// No elements at all.
    Null,
}

/// Shape of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataspace {
    pub kind: SpaceKind,
    /// Current extents; empty for scalar and null spaces.
    pub dims: Vec<u64>,
    /// Maximum extents, `u64::MAX` meaning unlimited.
    pub max_dims: Option<Vec<u64>>,
}

impl Dataspace {
    /// Fixed-size simple dataspace.
    pub fn simple(dims: &[u64]) -> Dataspace {
        Dataspace {
            kind: SpaceKind::Simple,
            dims: dims.to_vec(),
            max_dims: None,
        }
    }

    pub fn scalar() -> Dataspace {
        Dataspace {
            kind: SpaceKind::Scalar,
            dims: Vec::new(),
            max_dims: None,
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Number of elements: 1 for scalar, 0 for null.
    pub fn element_count(&self) -> u64 {
        match self.kind {
            SpaceKind::Null => 0,
            SpaceKind::Scalar => 1,
            SpaceKind::Simple => self.dims.iter().product(),
        }
    }

    /// Parse a version 1 or 2 dataspace message.
    pub fn parse(data: &[u8], length_size: u8) -> Result<Dataspace, FormatError> {
        ensure_len(data, 0, 4)?;
        let version = data[0];
        let rank = data[1] as usize;
        let flags = data[2];

        let (kind, mut pos) = match version {
            1 => {
                ensure_len(data, 0, 8)?;
                let kind = if rank == 0 {
                    SpaceKind::Scalar
                } else {
                    SpaceKind::Simple
                };
                (kind, 8)
            }
            2 => {
                let kind = match data[3] {
                    0 => SpaceKind::Scalar,
                    1 => SpaceKind::Simple,
                    2 => SpaceKind::Null,
                    other => return Err(FormatError::InvalidDataspaceType(other)),
                };
                (kind, 4)
            }
            version => {
                return Err(FormatError::UnsupportedVersion {
                    structure: "dataspace",
                    version,
                })
            }
        };

        let ls = length_size as usize;
        let mut read_dims = |pos: &mut usize| -> Result<Vec<u64>, FormatError> {
            let mut out = Vec::with_capacity(rank);
            for _ in 0..rank {
                out.push(read_uint(data, *pos, ls)?);
                *pos += ls;
            }
            Ok(out)
        };
        let dims = read_dims(&mut pos)?;
        let max_dims = if flags & 0x01 != 0 {
            Some(read_dims(&mut pos)?)
        } else {
            None
        };

        Ok(Dataspace {
            kind,
            dims,
            max_dims,
        })
    }

    /// Serialise as a version 2 message.
    pub fn serialize(&self, length_size: u8) -> Vec<u8> {
        let ls = length_size as usize;
        let mut buf = vec![
            2,
            self.dims.len() as u8,
            u8::from(self.max_dims.is_some()),
            match self.kind {
                SpaceKind::Scalar => 0,
                SpaceKind::Simple => 1,
                SpaceKind::Null => 2,
            },
        ];
        for &d in &self.dims {
            write_uint(&mut buf, d, ls);
        }
        for &d in self.max_dims.iter().flatten() {
            write_uint(&mut buf, d, ls);
        }
        buf
    }
}
