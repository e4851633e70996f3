use crate::error::TextmojiError;

/// Output canvas edge length in pixels. Every generated image is exactly
/// this square, RGBA.
pub const CANVAS_SIZE: u32 = 128;

/// A single emoji generation request. Transient; nothing survives the call.
#[derive(Debug, Clone, Default)]
pub struct EmojiRequest {
    pub text: String,
    pub color: Option<String>,
    pub bg: Option<String>,
    pub font_size: Option<u32>,
}

impl EmojiRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: None,
            bg: None,
            font_size: None,
        }
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn bg(mut self, bg: impl Into<String>) -> Self {
        self.bg = Some(bg.into());
        self
    }

    pub fn font_size(mut self, font_size: u32) -> Self {
        self.font_size = Some(font_size);
        self
    }
}

/// Dimensions and channel count reported for an encoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterMeta {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

/// Registration names follow the common chat-platform rule: 2 to 32
/// characters, letters, digits, and underscore only.
pub fn validate_emoji_name(name: &str) -> Result<(), TextmojiError> {
    let mut count = 0usize;
    for ch in name.chars() {
        if !(ch.is_ascii_alphanumeric() || ch == '_') {
            return Err(TextmojiError::InvalidEmojiName);
        }
        count += 1;
    }
    if !(2..=32).contains(&count) {
        return Err(TextmojiError::InvalidEmojiName);
    }
    Ok(())
}
