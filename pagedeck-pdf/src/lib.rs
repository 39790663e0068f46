use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use lopdf::{Dictionary, Document, Object, ObjectId};
use pagedeck_core::{PageRef, PageSource, Rotation, SourceError};
use tempfile::TempPath;
use tracing::{debug, instrument, warn};

const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];
const MAX_TREE_DEPTH: usize = 64;

/// PDF page source backed by `lopdf`. Every edit is written out as a complete
/// new file in the scratch directory.
pub struct PdfPageSource {
    scratch_dir: PathBuf,
    compress: bool,
}

impl PdfPageSource {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Result<Self> {
        let scratch_dir = scratch_dir.into();
        fs::create_dir_all(&scratch_dir)
            .with_context(|| format!("failed to create scratch directory at {:?}", scratch_dir))?;
        Ok(Self {
            scratch_dir,
            compress: false,
        })
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }
}

pub struct PdfArtifact {
    document: Arc<Document>,
    pages: Vec<ObjectId>,
    path: PathBuf,
    scratch: Option<TempPath>,
}

impl PdfArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn is_scratch(&self) -> bool {
        self.scratch.is_some()
    }
}

impl fmt::Debug for PdfArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PdfArtifact")
            .field("path", &self.path)
            .field("pages", &self.pages.len())
            .field("scratch", &self.is_scratch())
            .finish()
    }
}

impl Drop for PdfArtifact {
    fn drop(&mut self) {
        if let Some(scratch) = self.scratch.take() {
            match scratch.close() {
                Ok(()) => debug!(path = %self.path.display(), "released scratch artifact"),
                Err(err) => {
                    warn!(?err, path = %self.path.display(), "failed to remove scratch artifact")
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct PdfPage {
    document: Arc<Document>,
    object_id: ObjectId,
}

impl PdfPage {
    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    pub fn content(&self) -> Result<Vec<u8>, SourceError> {
        self.document
            .get_page_content(self.object_id)
            .map_err(SourceError::backend)
    }
}

impl PartialEq for PdfPage {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.document, &other.document) && self.object_id == other.object_id
    }
}

impl fmt::Debug for PdfPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PdfPage({} {})", self.object_id.0, self.object_id.1)
    }
}

impl PageSource for PdfPageSource {
    type Document = PdfArtifact;
    type Page = PdfPage;

    #[instrument(skip(self))]
    fn open(&self, path: &Path) -> Result<PdfArtifact, SourceError> {
        let document = Document::load(path).map_err(SourceError::backend)?;
        let pages = document.get_pages().into_values().collect();
        Ok(PdfArtifact {
            document: Arc::new(document),
            pages,
            path: path.to_path_buf(),
            scratch: None,
        })
    }

    fn page_count(&self, document: &PdfArtifact) -> usize {
        document.pages.len()
    }

    fn page_at(
        &self,
        document: &PdfArtifact,
        index: usize,
    ) -> Result<PageRef<PdfPage>, SourceError> {
        let object_id = *document.pages.get(index).ok_or(SourceError::OutOfRange {
            index,
            page_count: document.pages.len(),
        })?;
        let rotation = inherited(&document.document, object_id, b"Rotate")
            .and_then(|value| value.as_i64().ok())
            .and_then(Rotation::from_degrees)
            .unwrap_or_default();

        Ok(PageRef::new(
            PdfPage {
                document: Arc::clone(&document.document),
                object_id,
            },
            rotation,
        ))
    }

    #[instrument(skip(self, pages), fields(pages = pages.len()))]
    fn materialize(&self, pages: &[PageRef<PdfPage>]) -> Result<PdfArtifact, SourceError> {
        let first = pages
            .first()
            .ok_or_else(|| invalid_input("cannot write a document without pages"))?;
        let origin = &first.page.document;
        if pages
            .iter()
            .any(|page| !Arc::ptr_eq(&page.page.document, origin))
        {
            return Err(invalid_input("pages must come from a single document"));
        }

        let mut document = Document::clone(origin);
        rebuild_page_tree(&mut document, pages)?;
        document.prune_objects();
        if self.compress {
            document.compress();
        }

        let mut file = tempfile::Builder::new()
            .prefix("pagedeck-")
            .suffix(".pdf")
            .tempfile_in(&self.scratch_dir)?;
        document.save_to(&mut file).map_err(SourceError::backend)?;
        file.flush()?;
        let scratch = file.into_temp_path();
        let path = scratch.to_path_buf();
        debug!(path = %path.display(), "wrote scratch artifact");

        let pages = document.get_pages().into_values().collect();
        Ok(PdfArtifact {
            document: Arc::new(document),
            pages,
            path,
            scratch: Some(scratch),
        })
    }

    fn check_available(&self, document: &PdfArtifact) -> Result<(), SourceError> {
        if document.path.exists() {
            Ok(())
        } else {
            Err(SourceError::Unavailable(document.path.display().to_string()))
        }
    }

    #[instrument(skip(self, document), fields(source = %document.path.display()))]
    fn save(&self, document: &PdfArtifact, dest: &Path) -> Result<(), SourceError> {
        // The backing file may be `dest` itself, already overwritten by an earlier save.
        let mut output = Document::clone(&document.document);
        let dir = dest
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut file = tempfile::Builder::new()
            .prefix(".pagedeck-")
            .suffix(".pdf.tmp")
            .tempfile_in(dir)?;
        output.save_to(&mut file).map_err(SourceError::backend)?;
        file.flush()?;
        file.persist(dest).map_err(io::Error::from)?;
        Ok(())
    }
}

fn invalid_input(message: &str) -> SourceError {
    SourceError::Io(io::Error::new(io::ErrorKind::InvalidInput, message.to_owned()))
}

/// Points the root `Pages` node straight at the requested pages. Pages used
/// more than once get a copy of their dictionary under a new object id.
fn rebuild_page_tree(
    document: &mut Document,
    pages: &[PageRef<PdfPage>],
) -> Result<(), SourceError> {
    let root_id = pages_root(document)?;
    let flattened = pages
        .iter()
        .map(|page| flattened_page(document, page.page.object_id))
        .collect::<Result<Vec<_>, _>>()?;

    let mut placed = HashSet::new();
    let mut kids = Vec::with_capacity(pages.len());
    for (page, mut dictionary) in pages.iter().zip(flattened) {
        dictionary.set("Parent", Object::Reference(root_id));
        dictionary.set("Rotate", Object::Integer(i64::from(page.rotation.degrees())));

        let source_id = page.page.object_id;
        let object_id = if placed.insert(source_id) {
            document
                .objects
                .insert(source_id, Object::Dictionary(dictionary));
            source_id
        } else {
            document.add_object(Object::Dictionary(dictionary))
        };
        kids.push(Object::Reference(object_id));
    }

    let root = document
        .get_object_mut(root_id)
        .and_then(|object| object.as_dict_mut())
        .map_err(SourceError::backend)?;
    root.set("Kids", Object::Array(kids));
    root.set("Count", Object::Integer(pages.len() as i64));
    Ok(())
}

fn pages_root(document: &Document) -> Result<ObjectId, SourceError> {
    let catalog_id = document
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(SourceError::backend)?;
    document
        .get_dictionary(catalog_id)
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(SourceError::backend)
}

fn flattened_page(document: &Document, page_id: ObjectId) -> Result<Dictionary, SourceError> {
    let mut dictionary = document
        .get_dictionary(page_id)
        .map_err(SourceError::backend)?
        .clone();
    for key in INHERITABLE {
        if !dictionary.has(key) {
            if let Some(value) = inherited(document, page_id, key) {
                dictionary.set(key, value.clone());
            }
        }
    }
    Ok(dictionary)
}

fn inherited<'a>(document: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = document.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = document.get_dictionary(parent).ok()?;
    }
    None
}
