//! Revocable display handles for rendered image bytes.
//!
//! A [`DisplayHandle`] is what the presentation layer holds on to: a URI plus
//! the pixel size of the encoded image. The bytes live in the
//! [`HandleRegistry`] until the handle is revoked; after that every lookup
//! fails, so nothing can keep drawing a released image by accident.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Cursor;
use std::rc::Rc;

use image::ImageReader;
use thiserror::Error;

/// URI scheme used for handle URIs.
pub const HANDLE_SCHEME: &str = "preview";

/// Errors from creating a display handle.
#[derive(Error, Debug)]
pub enum HandleError {
    #[error("Rendered payload is empty")]
    EmptyPayload,
}

/// Reference to one rendered image held by a [`HandleRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DisplayHandle {
    id: u64,
    uri: String,
    width: u32,
    height: u32,
}

impl DisplayHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Transient URI, e.g. `preview://12`.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Pixel width read from the image header, 0 if the format is unknown.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Pixel height read from the image header, 0 if the format is unknown.
    pub fn height(&self) -> u32 {
        self.height
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: u64,
    entries: HashMap<u64, Rc<[u8]>>,
}

/// Owner of the bytes behind live display handles.
///
/// Clones share the same storage: the preview controller creates and revokes
/// handles while the view layer resolves them.
#[derive(Debug, Clone, Default)]
pub struct HandleRegistry {
    inner: Rc<RefCell<RegistryInner>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of an encoded image and hand out a handle to it.
    pub fn create(&self, bytes: Vec<u8>) -> Result<DisplayHandle, HandleError> {
        if bytes.is_empty() {
            return Err(HandleError::EmptyPayload);
        }
        let (width, height) = probe_dimensions(&bytes);

        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.entries.insert(id, Rc::from(bytes));

        log::trace!("Created display handle {} ({}x{})", id, width, height);
        Ok(DisplayHandle {
            id,
            uri: format!("{HANDLE_SCHEME}://{id}"),
            width,
            height,
        })
    }

    /// Release the bytes behind `handle`. Returns false if already revoked.
    pub fn revoke(&self, handle: &DisplayHandle) -> bool {
        let removed = self.inner.borrow_mut().entries.remove(&handle.id).is_some();
        if removed {
            log::trace!("Revoked display handle {}", handle.id);
        }
        removed
    }

    /// Encoded bytes behind a live handle.
    pub fn bytes(&self, handle: &DisplayHandle) -> Option<Rc<[u8]>> {
        self.inner.borrow().entries.get(&handle.id).cloned()
    }

    /// Look up a live handle's bytes by URI.
    pub fn resolve(&self, uri: &str) -> Option<Rc<[u8]>> {
        let id = uri
            .strip_prefix(HANDLE_SCHEME)
            .and_then(|rest| rest.strip_prefix("://"))
            .and_then(|id| id.parse::<u64>().ok())?;
        self.inner.borrow().entries.get(&id).cloned()
    }

    pub fn is_live(&self, handle: &DisplayHandle) -> bool {
        self.inner.borrow().entries.contains_key(&handle.id)
    }

    pub fn live_count(&self) -> usize {
        self.inner.borrow().entries.len()
    }
}

/// Read width/height from the encoded header without decoding pixels.
fn probe_dimensions(bytes: &[u8]) -> (u32, u32) {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()
        .and_then(|reader| reader.into_dimensions().ok())
        .unwrap_or((0, 0))
}
