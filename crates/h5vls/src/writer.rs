//! Building small HDF5 files: version 2 superblock and object headers,
//! compact-link groups, and contiguous or B-tree-chunked datasets.
//!
//! ```no_run
//! use h5vls::FileBuilder;
//!
//! let mut builder = FileBuilder::new();
//! builder.create_group("strings").create_dataset("heap").with_u8_data(b"foobar");
//! builder.write("fixture.h5").unwrap();
//! ```

use std::path::Path;

use h5vls_format::btree_v1::{build_chunk_tree, ChunkKey};
use h5vls_format::chunk_index::ChunkGrid;
use h5vls_format::data_layout::{ChunkIndex, DataLayout};
use h5vls_format::dataspace::Dataspace;
use h5vls_format::datatype::{CompoundMember, Datatype};
use h5vls_format::filter_pipeline::{Filter, FilterPipeline, FILTER_DEFLATE, FILTER_SHUFFLE};
use h5vls_format::filters::encode_chunk;
use h5vls_format::link::{Link, LinkInfo};
use h5vls_format::message_type::MessageType;
use h5vls_format::object_header_writer::ObjectHeaderWriter;
use h5vls_format::superblock::Superblock;

use crate::error::{Error, Result};

const OFFSET_SIZE: u8 = 8;
const LENGTH_SIZE: u8 = 8;

/// Message flag marking a message as constant.
const CONSTANT: u8 = 0x01;

/// Fill value message v3: late allocation, fill written if set, no value.
const FILL_VALUE: [u8; 2] = [3, 0x0a];

/// Builder for compound datatypes with members packed back to back.
#[derive(Debug, Default)]
pub struct CompoundTypeBuilder {
    fields: Vec<(String, Datatype)>,
}

impl CompoundTypeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, datatype: Datatype) -> Self {
        self.fields.push((name.to_owned(), datatype));
        self
    }

    pub fn build(self) -> Datatype {
        let mut offset = 0u64;
        let mut members = Vec::with_capacity(self.fields.len());
        for (name, datatype) in self.fields {
            let size = datatype.size();
            members.push(CompoundMember {
                name,
                byte_offset: offset,
                datatype,
            });
            offset += size;
        }
        Datatype::Compound {
            size: offset as u32,
            members,
        }
    }
}

/// Configuration and contents of one dataset.
#[derive(Debug, Clone)]
pub struct DatasetBuilder {
    datatype: Datatype,
    shape: Vec<u64>,
    data: Vec<u8>,
    chunks: Option<Vec<u64>>,
    filters: Vec<Filter>,
}

macro_rules! typed_data {
    ($($method:ident: $ty:ty => $dtype:expr;)*) => {
        $(
            pub fn $method(&mut self, values: &[$ty]) -> &mut Self {
                self.datatype = $dtype;
                self.shape = vec![values.len() as u64];
                self.data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
                self
            }
        )*
    };
}

impl DatasetBuilder {
    fn new() -> Self {
        Self {
            datatype: Datatype::unsigned(1),
            shape: vec![0],
            data: Vec::new(),
            chunks: None,
            filters: Vec::new(),
        }
    }

    typed_data! {
        with_u8_data: u8 => Datatype::unsigned(1);
        with_u16_data: u16 => Datatype::unsigned(2);
        with_u32_data: u32 => Datatype::unsigned(4);
        with_u64_data: u64 => Datatype::unsigned(8);
        with_i8_data: i8 => Datatype::signed(1);
        with_i32_data: i32 => Datatype::signed(4);
        with_i64_data: i64 => Datatype::signed(8);
        with_f64_data: f64 => Datatype::float(8);
    }

    /// Raw little-endian element bytes of any datatype, such as packed
    /// compound records. The shape defaults to one dimension.
    pub fn with_raw_data(&mut self, datatype: Datatype, data: Vec<u8>) -> &mut Self {
        let size = datatype.size().max(1);
        self.shape = vec![data.len() as u64 / size];
        self.datatype = datatype;
        self.data = data;
        self
    }

    /// Override the shape; an empty shape makes a scalar.
    pub fn with_shape(&mut self, shape: &[u64]) -> &mut Self {
        self.shape = shape.to_vec();
        self
    }

    pub fn with_chunks(&mut self, chunk_dims: &[u64]) -> &mut Self {
        self.chunks = Some(chunk_dims.to_vec());
        self
    }

    pub fn with_deflate(&mut self, level: u32) -> &mut Self {
        self.filters.retain(|f| f.id != FILTER_DEFLATE);
        self.filters.push(Filter::deflate(level));
        self
    }

    /// Shuffle always runs before deflate.
    pub fn with_shuffle(&mut self) -> &mut Self {
        if !self.filters.iter().any(|f| f.id == FILTER_SHUFFLE) {
            self.filters.insert(0, Filter::shuffle());
        }
        self
    }
}

#[derive(Debug, Clone)]
enum Member {
    Dataset(String, DatasetBuilder),
    Group(String, GroupBuilder),
}

/// A group and everything under it, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct GroupBuilder {
    members: Vec<Member>,
}

impl GroupBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_dataset(&mut self, name: &str) -> &mut DatasetBuilder {
        self.members.push(Member::Dataset(name.to_owned(), DatasetBuilder::new()));
        match self.members.last_mut() {
            Some(Member::Dataset(_, d)) => d,
            _ => unreachable!("dataset was just pushed"),
        }
    }

    pub fn create_group(&mut self, name: &str) -> &mut GroupBuilder {
        self.members.push(Member::Group(name.to_owned(), GroupBuilder::new()));
        match self.members.last_mut() {
            Some(Member::Group(_, g)) => g,
            _ => unreachable!("group was just pushed"),
        }
    }
}

/// Builder for a whole file.
#[derive(Debug, Clone, Default)]
pub struct FileBuilder {
    root: GroupBuilder,
}

impl FileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_dataset(&mut self, name: &str) -> &mut DatasetBuilder {
        self.root.create_dataset(name)
    }

    pub fn create_group(&mut self, name: &str) -> &mut GroupBuilder {
        self.root.create_group(name)
    }

    /// Serialise the file. Objects are written children first, so every
    /// address is known when its parent header is encoded.
    pub fn finish(self) -> Result<Vec<u8>> {
        let sb_len = Superblock::v2_size(OFFSET_SIZE);
        let mut out = Output { buf: vec![0u8; sb_len] };
        let root = out.group(&self.root, "/")?;
        let superblock = Superblock {
            version: 2,
            offset_size: OFFSET_SIZE,
            length_size: LENGTH_SIZE,
            base_address: 0,
            eof_address: out.buf.len() as u64,
            root_group_address: root,
            group_leaf_node_k: None,
            group_internal_node_k: None,
            extension_address: None,
        };
        out.buf[..sb_len].copy_from_slice(&superblock.serialize_v2());
        tracing::debug!(bytes = out.buf.len(), "serialised HDF5 file");
        Ok(out.buf)
    }

    pub fn write(self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.finish()?;
        std::fs::write(path, bytes).map_err(Error::Io)
    }
}

struct Output {
    buf: Vec<u8>,
}

impl Output {
    fn append(&mut self, bytes: &[u8]) -> u64 {
        let address = self.buf.len() as u64;
        self.buf.extend_from_slice(bytes);
        address
    }

    fn group(&mut self, group: &GroupBuilder, path: &str) -> Result<u64> {
        let mut links = Vec::with_capacity(group.members.len());
        for member in &group.members {
            let (name, address) = match member {
                Member::Dataset(name, ds) => (name, self.dataset(ds, &child_path(path, name))?),
                Member::Group(name, g) => (name, self.group(g, &child_path(path, name))?),
            };
            links.push(Link::hard(name, address));
        }
        let mut header = ObjectHeaderWriter::new().message(MessageType::LinkInfo, LinkInfo::compact().serialize(OFFSET_SIZE));
        for link in &links {
            header = header.message(MessageType::Link, link.serialize(OFFSET_SIZE)?);
        }
        Ok(self.append(&header.finish()))
    }

    fn dataset(&mut self, ds: &DatasetBuilder, path: &str) -> Result<u64> {
        let element_size = ds.datatype.size();
        let count: u64 = ds.shape.iter().product();
        if count.checked_mul(element_size) != Some(ds.data.len() as u64) {
            return Err(Error::schema(
                path,
                format!(
                    "dataset at '{path}' holds {} bytes but its shape {:?} needs {} bytes per element",
                    ds.data.len(),
                    ds.shape,
                    element_size
                ),
            ));
        }

        let layout = match &ds.chunks {
            None if !ds.filters.is_empty() => {
                return Err(Error::schema(path, format!("filters on '{path}' require chunked storage")))
            }
            None if ds.data.is_empty() => DataLayout::Contiguous { address: None, size: 0 },
            None => DataLayout::Contiguous {
                address: Some(self.append(&ds.data)),
                size: ds.data.len() as u64,
            },
            Some(chunk) => self.chunked(ds, chunk, path)?,
        };

        let dataspace = if ds.shape.is_empty() {
            Dataspace::scalar()
        } else {
            Dataspace::simple(&ds.shape)
        };
        let mut header = ObjectHeaderWriter::new()
            .message_with_flags(MessageType::Datatype, ds.datatype.serialize()?, CONSTANT)
            .message(MessageType::Dataspace, dataspace.serialize(LENGTH_SIZE))
            .message_with_flags(MessageType::FillValue, FILL_VALUE.to_vec(), CONSTANT)
            .message(MessageType::DataLayout, layout.serialize(OFFSET_SIZE, LENGTH_SIZE)?);
        if !ds.filters.is_empty() {
            let pipeline = FilterPipeline {
                filters: ds.filters.clone(),
            };
            header = header.message(MessageType::FilterPipeline, pipeline.serialize());
        }
        Ok(self.append(&header.finish()))
    }

    fn chunked(&mut self, ds: &DatasetBuilder, chunk: &[u64], path: &str) -> Result<DataLayout> {
        if chunk.len() != ds.shape.len() || chunk.is_empty() || chunk.contains(&0) {
            return Err(Error::schema(
                path,
                format!("chunk dimensions {chunk:?} do not fit the shape {:?} of '{path}'", ds.shape),
            ));
        }
        let element_size = ds.datatype.size() as usize;
        let pipeline = FilterPipeline {
            filters: ds.filters.clone(),
        };

        let mut entries = Vec::new();
        for offsets in ChunkGrid::new(&ds.shape, chunk) {
            let raw = gather_chunk(&ds.data, &ds.shape, &offsets, chunk, element_size);
            let stored = encode_chunk(&raw, &pipeline, element_size)?;
            let size = u32::try_from(stored.len())
                .map_err(|_| Error::schema(path, format!("a chunk of '{path}' exceeds 4 GiB")))?;
            let address = self.append(&stored);
            entries.push((
                ChunkKey {
                    size,
                    filter_mask: 0,
                    offsets,
                },
                address,
            ));
        }

        let upper = ChunkKey {
            size: 0,
            filter_mask: 0,
            offsets: ds.shape.iter().zip(chunk).map(|(&d, &c)| d.div_ceil(c).max(1) * c).collect(),
        };
        let base = self.buf.len() as u64;
        let (tree, root) = build_chunk_tree(&entries, chunk.len(), &upper, base);
        self.append(&tree);
        Ok(DataLayout::Chunked {
            chunk_dims: chunk.to_vec(),
            element_size: element_size as u64,
            index: ChunkIndex::BTreeV1,
            address: Some(root),
        })
    }
}

fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Copy the chunk at `offsets` out of row-major `data`, zero-padding the
/// parts that fall outside `shape`.
fn gather_chunk(data: &[u8], shape: &[u64], offsets: &[u64], chunk: &[u64], element_size: usize) -> Vec<u8> {
    let rank = shape.len();
    let chunk_elems: u64 = chunk.iter().product();
    let mut out = vec![0u8; chunk_elems as usize * element_size];
    let last = rank - 1;
    let run = (chunk[last].min(shape[last] - offsets[last])) as usize * element_size;
    let mut idx = vec![0u64; last];
    loop {
        let inside = (0..last).all(|d| offsets[d] + idx[d] < shape[d]);
        if inside {
            let mut src = 0u64;
            let mut dst = 0u64;
            for d in 0..rank {
                let i = idx.get(d).copied().unwrap_or(0);
                src = src * shape[d] + offsets[d] + i;
                dst = dst * chunk[d] + i;
            }
            let (src, dst) = (src as usize * element_size, dst as usize * element_size);
            out[dst..dst + run].copy_from_slice(&data[src..src + run]);
        }
        let mut d = last;
        loop {
            if d == 0 {
                return out;
            }
            d -= 1;
            idx[d] += 1;
            if idx[d] < chunk[d] {
                break;
            }
            idx[d] = 0;
        }
    }
}
