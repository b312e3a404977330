//! File, group and dataset handles.
//!
//! A [`File`] owns the file image (mapped when the `mmap` feature is on) and
//! is cheap to clone. [`Group`] and [`Dataset`] handles keep the file alive
//! and carry their absolute path, which every error message names.

use std::path::Path;
use std::sync::Arc;

use h5vls_format::chunk_index::ChunkTable;
use h5vls_format::data_layout::DataLayout;
use h5vls_format::data_read::Storage;
use h5vls_format::dataset::DatasetInfo;
use h5vls_format::dataspace::SpaceKind;
use h5vls_format::datatype::Datatype;
use h5vls_format::error::FormatError;
use h5vls_format::filter_pipeline::FilterPipeline;
use h5vls_format::group::{is_group, read_links};
use h5vls_format::link::LinkTarget;
use h5vls_format::object_header::ObjectHeader;
use h5vls_format::signature::find_signature;
use h5vls_format::superblock::Superblock;

use crate::error::{Error, Result};
use crate::storage::FileData;

/// Soft links followed before giving up.
const MAX_LINK_HOPS: usize = 16;

// ---------------------------------------------------------------------------
// File
// ---------------------------------------------------------------------------

struct FileInner {
    data: FileData,
    /// Offset of the base address within `data`.
    base: usize,
    superblock: Superblock,
}

/// An open HDF5 file for reading.
///
/// With the `mmap` feature (the default), [`File::open`] maps the file
/// read-only; otherwise the file is read into memory. [`File::from_bytes`]
/// wraps an image that is already in memory. Clones share the same bytes.
#[derive(Clone)]
pub struct File {
    inner: Arc<FileInner>,
}

impl File {
    /// Open the HDF5 file at `path`.
    ///
    /// Fails with [`Error::Open`] when nothing exists at `path` or when the
    /// bytes there do not start with a readable superblock.
    pub fn open(path: impl AsRef<Path>) -> Result<File> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        if !path.exists() {
            return Err(Error::Open {
                message: format!("no file is present at '{shown}'"),
                path: shown,
            });
        }
        let failed = |cause: String| Error::Open {
            message: format!("failed to open the HDF5 file at '{shown}'; {cause}"),
            path: shown.clone(),
        };
        let data = FileData::open(path).map_err(|e| failed(e.to_string()))?;
        let file = File::from_data(data).map_err(|e| failed(e.to_string()))?;
        tracing::debug!(path = %shown, mapped = file.is_mapped(), "opened HDF5 file");
        Ok(file)
    }

    /// Open an HDF5 file from an in-memory byte vector.
    ///
    /// A user block before the superblock is skipped.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<File> {
        Ok(File::from_data(FileData::Owned(bytes))?)
    }

    fn from_data(data: FileData) -> std::result::Result<File, FormatError> {
        let bytes = data.as_bytes();
        let signature = find_signature(bytes)?;
        let superblock = Superblock::parse(bytes, signature)?;
        let base = usize::try_from(superblock.base_address)
            .ok()
            .filter(|&b| b <= bytes.len())
            .ok_or(FormatError::SizeOverflow("base address"))?;
        Ok(File {
            inner: Arc::new(FileInner {
                data,
                base,
                superblock,
            }),
        })
    }

    /// Returns the parsed superblock.
    pub fn superblock(&self) -> &Superblock {
        &self.inner.superblock
    }

    /// Returns `true` when the file is backed by a memory map.
    pub fn is_mapped(&self) -> bool {
        self.inner.data.is_mapped()
    }

    /// File image starting at the base address; all file addresses are
    /// relative to it.
    pub fn as_bytes(&self) -> &[u8] {
        &self.inner.data.as_bytes()[self.inner.base..]
    }

    /// Returns a handle to the root group, named `/`.
    pub fn root(&self) -> Result<Group> {
        let header = self.header(self.inner.superblock.root_group_address)?;
        Ok(Group {
            file: self.clone(),
            path: "/".to_owned(),
            header,
        })
    }

    /// Resolve a path and return a [`Group`] handle.
    ///
    /// The path uses `/` separators (e.g. `"data/directions"`). A leading
    /// `/` is optional; `"/"` or `""` give the root group.
    pub fn group(&self, path: &str) -> Result<Group> {
        self.root()?.open_group(path)
    }

    /// Resolve a path and return a [`Dataset`] handle.
    ///
    /// The path uses `/` separators (e.g. `"names/pointers"`).
    pub fn dataset(&self, path: &str) -> Result<Dataset> {
        self.root()?.open_dataset(path)
    }

    fn header(&self, address: u64) -> std::result::Result<ObjectHeader, FormatError> {
        let address = usize::try_from(address).map_err(|_| FormatError::SizeOverflow("object header address"))?;
        ObjectHeader::parse(
            self.as_bytes(),
            address,
            self.inner.superblock.offset_size,
            self.inner.superblock.length_size,
        )
    }

    fn offset_size(&self) -> u8 {
        self.inner.superblock.offset_size
    }

    fn length_size(&self) -> u8 {
        self.inner.superblock.length_size
    }
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File")
            .field("size", &self.as_bytes().len())
            .field("superblock_version", &self.inner.superblock.version)
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Group handle
// ---------------------------------------------------------------------------

fn join(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// A lightweight handle to an HDF5 group.
///
/// Holds the group's object header and a clone of its [`File`], so it
/// stays valid on its own.
#[derive(Clone, Debug)]
pub struct Group {
    file: File,
    path: String,
    header: ObjectHeader,
}

impl Group {
    /// Absolute path of the group.
    pub fn name(&self) -> &str {
        &self.path
    }

    /// The file this group belongs to.
    pub fn file(&self) -> &File {
        &self.file
    }

    /// Names of the links in this group, in storage order.
    pub fn member_names(&self) -> Result<Vec<String>> {
        let links = read_links(self.file.as_bytes(), &self.header, self.file.offset_size(), self.file.length_size())?;
        Ok(links.into_iter().map(|l| l.name).collect())
    }

    /// Get a subgroup by name or relative path.
    ///
    /// Soft links are followed. Fails with [`Error::NotFound`] when the
    /// path is missing or names something other than a group.
    pub fn open_group(&self, name: &str) -> Result<Group> {
        let not_found = || Error::NotFound {
            path: name.to_owned(),
            expected: "group",
        };
        let (path, header) = self.resolve(name, 0)?.ok_or_else(not_found)?;
        if !is_group(&header) {
            return Err(not_found());
        }
        Ok(Group {
            file: self.file.clone(),
            path,
            header,
        })
    }

    /// Get a dataset by name or relative path.
    ///
    /// The chunk index is loaded here, once, and shared by every read
    /// through the returned handle. Fails with [`Error::NotFound`] when the
    /// path is missing or names something other than a dataset.
    pub fn open_dataset(&self, name: &str) -> Result<Dataset> {
        let not_found = || Error::NotFound {
            path: name.to_owned(),
            expected: "dataset",
        };
        let (path, header) = self.resolve(name, 0)?.ok_or_else(not_found)?;
        if !DatasetInfo::is_dataset(&header) {
            return Err(not_found());
        }
        Dataset::new(self.file.clone(), path, &header)
    }

    /// Follow `name` one component at a time. `None` when a component is
    /// missing or an intermediate object is not a group.
    fn resolve(&self, name: &str, hops: usize) -> Result<Option<(String, ObjectHeader)>> {
        let file = &self.file;
        let mut path = self.path.clone();
        let mut header = self.header.clone();
        for component in name.split('/').filter(|c| !c.is_empty() && *c != ".") {
            if !is_group(&header) {
                return Ok(None);
            }
            let links = read_links(file.as_bytes(), &header, file.offset_size(), file.length_size())?;
            let Some(link) = links.into_iter().find(|l| l.name == component) else {
                return Ok(None);
            };
            match link.target {
                LinkTarget::Hard(address) => {
                    path = join(&path, component);
                    header = file.header(address)?;
                }
                LinkTarget::Soft(target) => {
                    if hops >= MAX_LINK_HOPS {
                        return Err(FormatError::Unsupported(format!("soft link chain at '{}'", join(&path, component))).into());
                    }
                    let origin = if target.starts_with('/') {
                        file.root()?
                    } else {
                        Group {
                            file: file.clone(),
                            path: path.clone(),
                            header: header.clone(),
                        }
                    };
                    let Some((p, h)) = origin.resolve(&target, hops + 1)? else {
                        return Ok(None);
                    };
                    path = p;
                    header = h;
                }
                other => {
                    return Err(FormatError::Unsupported(format!("link {other:?} at '{}'", join(&path, component))).into())
                }
            }
        }
        Ok(Some((path, header)))
    }
}

// ---------------------------------------------------------------------------
// Dataset handle
// ---------------------------------------------------------------------------

/// A lightweight handle to an HDF5 dataset.
///
/// Datatype, dataspace, layout and filters are parsed when the handle is
/// opened; element data is only read by [`Dataset::read_hyperslab`] and
/// [`Dataset::read_raw`].
#[derive(Clone, Debug)]
pub struct Dataset {
    file: File,
    path: String,
    info: DatasetInfo,
    chunks: Arc<ChunkTable>,
}

impl Dataset {
    fn new(file: File, path: String, header: &ObjectHeader) -> Result<Dataset> {
        let info = DatasetInfo::from_header(header, file.offset_size(), file.length_size())?;
        let chunks = ChunkTable::load(
            file.as_bytes(),
            &info.layout,
            &info.dataspace.dims,
            file.offset_size(),
            file.length_size(),
        )?;
        tracing::debug!(path = %path, dims = ?info.dataspace.dims, chunks = chunks.len(), "opened dataset");
        Ok(Dataset {
            file,
            path,
            info,
            chunks: Arc::new(chunks),
        })
    }

    /// Absolute path of the dataset.
    pub fn name(&self) -> &str {
        &self.path
    }

    /// Extents; empty for scalar and null dataspaces.
    pub fn shape(&self) -> &[u64] {
        &self.info.dataspace.dims
    }

    /// Number of dimensions; 0 for scalars.
    pub fn rank(&self) -> usize {
        self.info.dataspace.rank()
    }

    /// Returns `true` for a scalar dataspace.
    pub fn is_scalar(&self) -> bool {
        self.info.dataspace.kind == SpaceKind::Scalar
    }

    /// The stored element type.
    pub fn datatype(&self) -> &Datatype {
        &self.info.datatype
    }

    /// Bytes per stored element.
    pub fn element_size(&self) -> usize {
        self.info.datatype.size() as usize
    }

    /// Chunk extents, or `None` for contiguous and compact storage.
    pub fn chunk_dimensions(&self) -> Option<&[u64]> {
        match &self.info.layout {
            DataLayout::Chunked { chunk_dims, .. } => Some(chunk_dims),
            _ => None,
        }
    }

    /// Filters applied to each chunk; empty when unfiltered.
    pub fn filters(&self) -> &FilterPipeline {
        &self.info.filters
    }

    /// Raw element bytes of the block `[start, start + count)`, row-major.
    ///
    /// Only the chunks the block intersects are decoded. Unallocated
    /// storage reads as zeros. A null dataspace yields no bytes.
    pub fn read_hyperslab(&self, start: &[u64], count: &[u64]) -> Result<Vec<u8>> {
        if self.info.dataspace.kind == SpaceKind::Null {
            return Ok(Vec::new());
        }
        let storage = Storage {
            file: self.file.as_bytes(),
            layout: &self.info.layout,
            filters: &self.info.filters,
            chunks: &self.chunks,
            dims: &self.info.dataspace.dims,
            element_size: self.element_size(),
        };
        Ok(storage.read_hyperslab(start, count)?)
    }

    /// Raw bytes of every element.
    pub fn read_raw(&self) -> Result<Vec<u8>> {
        let dims = self.shape().to_vec();
        self.read_hyperslab(&vec![0; dims.len()], &dims)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Length of a 1-dimensional dataset. Scalars give 0 when `allow_scalar`.
pub fn get_1d_length(dataset: &Dataset, allow_scalar: bool) -> Result<u64> {
    match dataset.shape() {
        [n] => Ok(*n),
        [] if allow_scalar => Ok(0),
        _ => Err(Error::schema(
            dataset.name(),
            format!("expected a 1-dimensional dataset at '{}'", dataset.name()),
        )),
    }
}
