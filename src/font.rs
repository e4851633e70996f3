use crate::error::TextmojiError;
use std::path::Path;
use std::sync::Arc;

/// The face shipped with the crate. One typeface, read-only, shared by every
/// request in the process.
static BUNDLED_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

#[derive(Debug, Clone)]
pub(crate) struct Typeface {
    data: Arc<[u8]>,
}

impl Typeface {
    pub fn bundled() -> Result<Typeface, TextmojiError> {
        Typeface::from_bytes(Arc::from(BUNDLED_FONT))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Typeface, TextmojiError> {
        let bytes = std::fs::read(path.as_ref())?;
        Typeface::from_bytes(Arc::from(bytes.into_boxed_slice()))
    }

    fn from_bytes(data: Arc<[u8]>) -> Result<Typeface, TextmojiError> {
        // Parse once up front so a corrupt file fails at build time, not in
        // the middle of a generate call.
        ttf_parser::Face::parse(&data, 0)
            .map_err(|e| TextmojiError::Font(format!("unusable font data: {e}")))?;
        Ok(Typeface { data })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}
