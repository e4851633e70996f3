use crate::error::TextmojiError;
use std::fmt;
use std::sync::Mutex;

/// Colors drawn from when a request supplies no foreground color. Every
/// entry must pass the attribute grammar; `Palette::new` enforces that at
/// construction so a bad palette fails the builder, not a request.
const DEFAULT_COLORS: &[&str] = &[
    "white", "red", "orange", "gold", "limegreen", "deepskyblue", "royalblue", "mediumorchid",
    "hotpink",
];

/// How the default color is chosen. Selection is injected so callers (and
/// tests) can pin it instead of reaching for a global random source.
pub enum Selector {
    /// fastrand's thread-local generator.
    ThreadRng,
    /// A deterministic sequence from a fixed seed.
    Seeded(Mutex<fastrand::Rng>),
    /// Always the same palette index.
    Fixed(usize),
    /// Any injected pure selector: receives the palette length, returns an
    /// index (taken modulo the length).
    Custom(Box<dyn Fn(usize) -> usize + Send + Sync>),
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::ThreadRng => write!(f, "ThreadRng"),
            Selector::Seeded(_) => write!(f, "Seeded"),
            Selector::Fixed(index) => write!(f, "Fixed({index})"),
            Selector::Custom(_) => write!(f, "Custom"),
        }
    }
}

#[derive(Debug)]
pub struct Palette {
    entries: Vec<String>,
    selector: Selector,
}

impl Default for Palette {
    fn default() -> Self {
        Palette {
            entries: DEFAULT_COLORS.iter().map(|s| s.to_string()).collect(),
            selector: Selector::ThreadRng,
        }
    }
}

impl Palette {
    /// A palette over `entries`. Entries must be non-empty and every entry
    /// must satisfy the color grammar.
    pub fn new(entries: Vec<String>, selector: Selector) -> Result<Palette, TextmojiError> {
        if entries.is_empty() {
            return Err(TextmojiError::InvalidConfiguration(
                "palette must not be empty".to_string(),
            ));
        }
        for entry in &entries {
            if crate::color::check_color(entry).is_err() {
                return Err(TextmojiError::InvalidConfiguration(
                    "palette entry fails the color grammar".to_string(),
                ));
            }
        }
        Ok(Palette { entries, selector })
    }

    pub fn seeded(seed: u64) -> Palette {
        Palette {
            entries: DEFAULT_COLORS.iter().map(|s| s.to_string()).collect(),
            selector: Selector::Seeded(Mutex::new(fastrand::Rng::with_seed(seed))),
        }
    }

    pub fn fixed(index: usize) -> Palette {
        Palette {
            entries: DEFAULT_COLORS.iter().map(|s| s.to_string()).collect(),
            selector: Selector::Fixed(index),
        }
    }

    pub(crate) fn pick(&self) -> &str {
        let len = self.entries.len();
        let index = match &self.selector {
            Selector::ThreadRng => fastrand::usize(..len),
            Selector::Seeded(rng) => match rng.lock() {
                Ok(mut rng) => rng.usize(..len),
                Err(_) => 0,
            },
            Selector::Fixed(index) => *index,
            Selector::Custom(select) => select(len),
        };
        &self.entries[index % len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::check_color;

    #[test]
    fn every_default_entry_passes_the_grammar() {
        for entry in DEFAULT_COLORS {
            assert!(check_color(entry).is_ok(), "bad palette entry {entry}");
        }
    }

    #[test]
    fn fixed_selector_pins_the_color() {
        let palette = Palette::fixed(1);
        assert_eq!(palette.pick(), "red");
        assert_eq!(palette.pick(), "red");
        // Out-of-range indices wrap instead of panicking.
        let palette = Palette::fixed(DEFAULT_COLORS.len());
        assert_eq!(palette.pick(), "white");
    }

    #[test]
    fn seeded_selector_is_deterministic() {
        let first: Vec<String> = {
            let palette = Palette::seeded(7);
            (0..8).map(|_| palette.pick().to_string()).collect()
        };
        let second: Vec<String> = {
            let palette = Palette::seeded(7);
            (0..8).map(|_| palette.pick().to_string()).collect()
        };
        assert_eq!(first, second);
    }

    #[test]
    fn custom_selector_is_used() {
        let palette = Palette::new(
            vec!["teal".to_string(), "navy".to_string()],
            Selector::Custom(Box::new(|len| len - 1)),
        )
        .unwrap();
        assert_eq!(palette.pick(), "navy");
    }

    #[test]
    fn invalid_palettes_are_rejected() {
        assert!(Palette::new(Vec::new(), Selector::ThreadRng).is_err());
        assert!(
            Palette::new(
                vec!["blue\" onload=\"alert(1)".to_string()],
                Selector::ThreadRng
            )
            .is_err()
        );
    }
}
