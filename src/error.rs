use std::fmt;

/// Which request field failed the color grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorField {
    Foreground,
    Background,
}

impl ColorField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorField::Foreground => "color",
            ColorField::Background => "bg",
        }
    }
}

#[derive(Debug)]
pub enum TextmojiError {
    EmptyText,
    // Carries the field only. The rejected value never travels in the error,
    // so it cannot leak back into markup or logs.
    InvalidColor(ColorField),
    InvalidEmojiName,
    InvalidConfiguration(String),
    Font(String),
    Render(String),
    Encode(String),
    Io(std::io::Error),
}

impl fmt::Display for TextmojiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextmojiError::EmptyText => write!(f, "text must not be empty"),
            TextmojiError::InvalidColor(field) => {
                write!(f, "invalid color specification for {}", field.as_str())
            }
            TextmojiError::InvalidEmojiName => write!(
                f,
                "emoji name must be 2-32 characters of letters, digits, or underscore"
            ),
            TextmojiError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            TextmojiError::Font(message) => write!(f, "font error: {}", message),
            TextmojiError::Render(message) => write!(f, "render error: {}", message),
            TextmojiError::Encode(message) => write!(f, "encode error: {}", message),
            TextmojiError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for TextmojiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TextmojiError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TextmojiError {
    fn from(value: std::io::Error) -> Self {
        TextmojiError::Io(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_color_names_the_field_without_the_value() {
        let err = TextmojiError::InvalidColor(ColorField::Background);
        let text = err.to_string();
        assert!(text.contains("invalid color specification"));
        assert!(text.contains("bg"));
    }

    #[test]
    fn io_errors_expose_a_source() {
        use std::error::Error;
        let err = TextmojiError::from(std::io::Error::other("boom"));
        assert!(err.source().is_some());
        assert!(matches!(err, TextmojiError::Io(_)));
    }
}
