mod color;
mod debug;
mod error;
mod font;
mod layout;
mod metrics;
mod palette;
mod raster;
mod svg;
mod types;

pub use color::{ColorRejection, Rgba, SafeColor, TRANSPARENT, check_color};
pub use error::{ColorField, TextmojiError};
pub use layout::{Geometry, LayoutPolicy, TextLayout};
pub use metrics::GenerationMetrics;
pub use palette::{Palette, Selector};
pub use raster::{CompositeLayer, RasterBuffer, RasterEngine, SkiaRasterEngine};
pub use types::{CANVAS_SIZE, EmojiRequest, RasterMeta, validate_emoji_name};

use debug::{DebugLogger, Field};
use font::Typeface;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// The generation engine. Configure once, then call `generate` from any
/// number of threads; every request is an independent pipeline over shared
/// read-only state.
pub struct Textmoji {
    policy: LayoutPolicy,
    palette: Palette,
    raster: Arc<dyn RasterEngine>,
    debug: Option<Arc<DebugLogger>>,
}

impl std::fmt::Debug for Textmoji {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Textmoji")
            .field("policy", &self.policy)
            .field("palette", &self.palette)
            .field("debug", &self.debug.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct TextmojiBuilder {
    policy: LayoutPolicy,
    palette: Option<Palette>,
    font_file: Option<PathBuf>,
    raster: Option<Arc<dyn RasterEngine>>,
    debug_path: Option<PathBuf>,
}

impl TextmojiBuilder {
    pub fn new() -> TextmojiBuilder {
        TextmojiBuilder::default()
    }

    /// Line-splitting / font-sizing pairing. Defaults to
    /// `LayoutPolicy::WidthGreedy`.
    pub fn layout_policy(mut self, policy: LayoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the bundled typeface. Only meaningful for the built-in raster
    /// engine.
    pub fn font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_file = Some(path.into());
        self
    }

    /// Palette used when a request supplies no foreground color.
    pub fn palette(mut self, palette: Palette) -> Self {
        self.palette = Some(palette);
        self
    }

    /// Swap in a different rasterization capability.
    pub fn raster_engine(mut self, engine: Arc<dyn RasterEngine>) -> Self {
        self.raster = Some(engine);
        self
    }

    /// Write a JSONL log of pipeline events to `path`.
    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Textmoji, TextmojiError> {
        if let LayoutPolicy::CountBalanced { max_chars_per_line } = self.policy {
            if max_chars_per_line == 0 {
                return Err(TextmojiError::InvalidConfiguration(
                    "max_chars_per_line must be at least 1".to_string(),
                ));
            }
        }

        let raster: Arc<dyn RasterEngine> = match self.raster {
            Some(engine) => {
                if self.font_file.is_some() {
                    return Err(TextmojiError::InvalidConfiguration(
                        "font_file requires the built-in raster engine".to_string(),
                    ));
                }
                engine
            }
            None => {
                let typeface = match &self.font_file {
                    Some(path) => Typeface::from_file(path)?,
                    None => Typeface::bundled()?,
                };
                Arc::new(SkiaRasterEngine::new(typeface))
            }
        };

        let debug = match &self.debug_path {
            Some(path) => Some(Arc::new(DebugLogger::new(path)?)),
            None => None,
        };

        Ok(Textmoji {
            policy: self.policy,
            palette: self.palette.unwrap_or_default(),
            raster,
            debug,
        })
    }
}

impl Textmoji {
    /// An engine with all defaults: bundled typeface, width-greedy layout,
    /// random default color.
    pub fn new() -> Result<Textmoji, TextmojiError> {
        Textmoji::builder().build()
    }

    pub fn builder() -> TextmojiBuilder {
        TextmojiBuilder::new()
    }

    /// Render `request` to an encoded 128x128 RGBA PNG.
    pub fn generate(&self, request: &EmojiRequest) -> Result<Vec<u8>, TextmojiError> {
        self.run(request).map(|(bytes, _)| bytes)
    }

    /// Like `generate`, but also reports per-stage timings.
    pub fn generate_with_metrics(
        &self,
        request: &EmojiRequest,
    ) -> Result<(Vec<u8>, GenerationMetrics), TextmojiError> {
        self.run(request)
    }

    fn run(&self, request: &EmojiRequest) -> Result<(Vec<u8>, GenerationMetrics), TextmojiError> {
        let mut metrics = GenerationMetrics::default();

        if request.text.is_empty() {
            self.count("generate.rejected");
            return Err(TextmojiError::EmptyText);
        }

        // Gate every attribute-bound value before any markup exists. The
        // palette pick goes through the same gate as caller input.
        let color_raw: &str = match &request.color {
            Some(color) => color.as_str(),
            None => self.palette.pick(),
        };
        let color = check_color(color_raw).map_err(|_| {
            self.count("generate.rejected");
            TextmojiError::InvalidColor(ColorField::Foreground)
        })?;

        let bg_raw = request.bg.as_deref().unwrap_or(TRANSPARENT);
        let bg = if bg_raw == TRANSPARENT {
            None
        } else {
            Some(check_color(bg_raw).map_err(|_| {
                self.count("generate.rejected");
                TextmojiError::InvalidColor(ColorField::Background)
            })?)
        };

        let started = Instant::now();
        let layout = self.policy.layout(&request.text, request.font_size);
        let document = svg::build_document(&layout, color, bg);
        metrics.line_count = layout.line_count();
        metrics.font_size_px = layout.font_size;
        metrics.layout_ms = ms_since(started);
        self.log_event(
            "emoji.layout",
            &[
                ("lines", Field::Int(layout.line_count() as u64)),
                ("font_size", Field::Int(layout.font_size as u64)),
            ],
        );

        let started = Instant::now();
        let rendered = self.raster.render_document(&document)?;
        metrics.render_ms = ms_since(started);
        self.log_event(
            "emoji.render",
            &[
                ("width", Field::Int(rendered.width() as u64)),
                ("height", Field::Int(rendered.height() as u64)),
                ("ms", Field::Num(metrics.render_ms)),
            ],
        );

        let started = Instant::now();
        let finished = self.fit_to_canvas(rendered, bg.map(|safe| color::resolve(safe.as_str())))?;
        metrics.fit_ms = ms_since(started);

        let started = Instant::now();
        let bytes = self.raster.encode_png(&finished)?;
        metrics.encode_ms = ms_since(started);
        metrics.output_bytes = bytes.len();
        self.log_event(
            "emoji.encode",
            &[
                ("bytes", Field::Int(bytes.len() as u64)),
                ("ms", Field::Num(metrics.encode_ms)),
            ],
        );
        self.count("generate.ok");
        if let Some(logger) = self.debug.as_deref() {
            logger.emit_summary("generate");
            logger.flush();
        }

        Ok((bytes, metrics))
    }

    /// Downscale-only fit, centered composite onto a fresh transparent
    /// canvas, then an opaque-background flatten as the final step so the
    /// text is never occluded.
    fn fit_to_canvas(
        &self,
        rendered: RasterBuffer,
        background: Option<Rgba>,
    ) -> Result<RasterBuffer, TextmojiError> {
        let canvas_px = CANVAS_SIZE as f32;
        let scale = (canvas_px / rendered.width() as f32)
            .min(canvas_px / rendered.height() as f32)
            .min(1.0);

        let fitted = if scale < 1.0 {
            let width = ((rendered.width() as f32 * scale).round() as u32).max(1);
            let height = ((rendered.height() as f32 * scale).round() as u32).max(1);
            self.raster.resize(&rendered, width, height)?
        } else {
            rendered
        };

        let top = centered_offset(fitted.height());
        let left = centered_offset(fitted.width());
        let canvas = RasterBuffer::new(CANVAS_SIZE, CANVAS_SIZE)?;
        let composed = self.raster.composite(
            canvas,
            &[CompositeLayer {
                buffer: &fitted,
                top,
                left,
            }],
        )?;

        match background {
            Some(color) => self.raster.flatten(composed, color),
            None => Ok(composed),
        }
    }

    fn log_event(&self, kind: &str, fields: &[(&str, Field)]) {
        if let Some(logger) = self.debug.as_deref() {
            logger.event(kind, fields);
        }
    }

    fn count(&self, key: &str) {
        if let Some(logger) = self.debug.as_deref() {
            logger.increment(key, 1);
        }
    }
}

fn centered_offset(edge: u32) -> i32 {
    let free = CANVAS_SIZE as f32 - edge as f32;
    ((free / 2.0).round() as i32).max(0)
}

fn ms_since(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;
    use std::sync::Mutex;
    use std::time::{SystemTime, UNIX_EPOCH};

    const PNG_MAGIC: [u8; 4] = [0x89, 0x50, 0x4e, 0x47];

    fn engine() -> Textmoji {
        Textmoji::new().unwrap()
    }

    fn request(text: &str) -> EmojiRequest {
        EmojiRequest::new(text)
    }

    fn decode(bytes: &[u8]) -> image::DynamicImage {
        image::load_from_memory(bytes).unwrap()
    }

    #[test]
    fn returns_a_valid_png_buffer() {
        let bytes = engine().generate(&request("A")).unwrap();
        assert_eq!(&bytes[..4], &PNG_MAGIC);
    }

    #[test]
    fn produces_a_128x128_rgba_image() {
        let bytes = engine().generate(&request("Hi")).unwrap();
        let img = decode(&bytes);
        assert_eq!(img.dimensions(), (128, 128));
        assert_eq!(img.color().channel_count(), 4);
    }

    #[test]
    fn output_stays_under_256_kib() {
        let bytes = engine().generate(&request("テスト")).unwrap();
        assert!(bytes.len() < 256 * 1024);
        assert!(!bytes.is_empty());
    }

    #[test]
    fn accepts_single_character_and_long_text() {
        let eng = engine();
        assert!(!eng.generate(&request("X")).unwrap().is_empty());
        assert!(
            !eng.generate(&request("This is a long text string"))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn accepts_unicode_and_emoji_characters() {
        let eng = engine();
        assert!(!eng.generate(&request("日本語")).unwrap().is_empty());
        assert!(!eng.generate(&request("🎉")).unwrap().is_empty());
    }

    #[test]
    fn applies_color_bg_and_font_size_options() {
        let eng = engine();
        assert!(eng.generate(&request("A").color("red")).is_ok());
        assert!(eng.generate(&request("A").color("#ff0000")).is_ok());
        assert!(eng.generate(&request("A").bg("blue")).is_ok());
        assert!(eng.generate(&request("A").font_size(96)).is_ok());
    }

    #[test]
    fn explicit_font_size_changes_the_rendering() {
        let eng = Textmoji::builder().palette(Palette::fixed(0)).build().unwrap();
        let auto = eng.generate(&request("A")).unwrap();
        let (large, metrics) = eng
            .generate_with_metrics(&request("A").font_size(96))
            .unwrap();
        assert_eq!(metrics.font_size_px, 96);
        assert_ne!(auto, large);
        assert_eq!(decode(&large).dimensions(), (128, 128));
    }

    #[test]
    fn script_text_is_escaped_not_executed() {
        let bytes = engine()
            .generate(&request("<script>alert(\"xss\")</script>"))
            .unwrap();
        assert_eq!(&bytes[..4], &PNG_MAGIC);
    }

    #[test]
    fn breakout_color_is_rejected() {
        let err = engine()
            .generate(&request("A").color("\"><script>alert(1)</script>"))
            .unwrap_err();
        assert!(matches!(
            err,
            TextmojiError::InvalidColor(ColorField::Foreground)
        ));
        assert!(err.to_string().contains("invalid color specification"));
    }

    #[test]
    fn breakout_bg_is_rejected() {
        let err = engine()
            .generate(&request("A").bg("blue\" onload=\"alert(1)"))
            .unwrap_err();
        assert!(matches!(
            err,
            TextmojiError::InvalidColor(ColorField::Background)
        ));
    }

    #[test]
    fn empty_text_is_rejected_before_rendering() {
        let err = engine().generate(&request("")).unwrap_err();
        assert!(matches!(err, TextmojiError::EmptyText));
    }

    #[test]
    fn default_background_is_transparent() {
        let bytes = engine().generate(&request("A")).unwrap();
        let img = decode(&bytes).to_rgba8();
        // Corners are outside any glyph; with no background they stay clear.
        assert_eq!(img.get_pixel(0, 0).0[3], 0);
        assert_eq!(img.get_pixel(127, 127).0[3], 0);
    }

    #[test]
    fn opaque_background_covers_the_whole_canvas() {
        let bytes = engine().generate(&request("A").bg("blue")).unwrap();
        let img = decode(&bytes).to_rgba8();
        let corner = img.get_pixel(0, 0).0;
        assert_eq!(corner[3], 255);
        assert_eq!((corner[0], corner[1], corner[2]), (0, 0, 255));
    }

    #[test]
    fn pinned_palette_makes_output_deterministic() {
        let eng = Textmoji::builder().palette(Palette::fixed(2)).build().unwrap();
        let first = eng.generate(&request("Hi")).unwrap();
        let second = eng.generate(&request("Hi")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn balanced_policy_renders_too() {
        let eng = Textmoji::builder()
            .layout_policy(LayoutPolicy::count_balanced())
            .palette(Palette::seeded(42))
            .build()
            .unwrap();
        let bytes = eng.generate(&request("Hello")).unwrap();
        assert_eq!(decode(&bytes).dimensions(), (128, 128));
    }

    #[test]
    fn metrics_report_the_pipeline_shape() {
        let eng = engine();
        let (bytes, metrics) = eng.generate_with_metrics(&request("Hello")).unwrap();
        assert_eq!(metrics.output_bytes, bytes.len());
        // 5 code points: the length table picks 32px, and 6 chars fit per
        // line at that size, so the text stays on one line.
        assert_eq!(metrics.line_count, 1);
        assert_eq!(metrics.font_size_px, 32);
    }

    #[test]
    fn builder_rejects_conflicting_configuration() {
        let fake = Arc::new(FakeEngine::new(128, 128));
        let err = Textmoji::builder()
            .font_file("/tmp/whatever.ttf")
            .raster_engine(fake)
            .build()
            .unwrap_err();
        assert!(matches!(err, TextmojiError::InvalidConfiguration(_)));

        let err = Textmoji::builder()
            .layout_policy(LayoutPolicy::CountBalanced {
                max_chars_per_line: 0,
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, TextmojiError::InvalidConfiguration(_)));
    }

    #[test]
    fn debug_log_records_pipeline_events() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let path = std::env::temp_dir().join(format!(
            "textmoji_pipeline_{}_{}.jsonl",
            std::process::id(),
            nanos
        ));
        let eng = Textmoji::builder().debug_log(&path).build().unwrap();
        eng.generate(&request("Hi")).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"type\":\"emoji.layout\""));
        assert!(contents.contains("\"type\":\"emoji.render\""));
        assert!(contents.contains("\"type\":\"emoji.encode\""));
        let _ = std::fs::remove_file(&path);
    }

    // Scripted engine for observing orchestration order without real
    // rasterization.
    struct FakeEngine {
        intrinsic: (u32, u32),
        calls: Mutex<Vec<String>>,
    }

    impl FakeEngine {
        fn new(width: u32, height: u32) -> FakeEngine {
            FakeEngine {
                intrinsic: (width, height),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl RasterEngine for FakeEngine {
        fn render_document(&self, _document: &str) -> Result<RasterBuffer, TextmojiError> {
            self.record("render".to_string());
            RasterBuffer::new(self.intrinsic.0, self.intrinsic.1)
        }

        fn resize(
            &self,
            _buffer: &RasterBuffer,
            width: u32,
            height: u32,
        ) -> Result<RasterBuffer, TextmojiError> {
            self.record(format!("resize:{width}x{height}"));
            RasterBuffer::new(width, height)
        }

        fn composite(
            &self,
            canvas: RasterBuffer,
            layers: &[CompositeLayer<'_>],
        ) -> Result<RasterBuffer, TextmojiError> {
            for layer in layers {
                self.record(format!("composite:{},{}", layer.top, layer.left));
            }
            Ok(canvas)
        }

        fn flatten(
            &self,
            buffer: RasterBuffer,
            background: Rgba,
        ) -> Result<RasterBuffer, TextmojiError> {
            self.record(format!("flatten:{},{},{}", background.r, background.g, background.b));
            Ok(buffer)
        }

        fn encode_png(&self, _buffer: &RasterBuffer) -> Result<Vec<u8>, TextmojiError> {
            self.record("encode".to_string());
            Ok(vec![0x89, 0x50, 0x4e, 0x47])
        }

        fn metadata(&self, _bytes: &[u8]) -> Result<RasterMeta, TextmojiError> {
            Ok(RasterMeta {
                width: self.intrinsic.0,
                height: self.intrinsic.1,
                channels: 4,
            })
        }
    }

    fn engine_with_fake(fake: Arc<FakeEngine>) -> Textmoji {
        Textmoji::builder()
            .raster_engine(fake)
            .palette(Palette::fixed(0))
            .build()
            .unwrap()
    }

    #[test]
    fn fitting_buffer_skips_resize_and_flatten() {
        let fake = Arc::new(FakeEngine::new(128, 128));
        let eng = engine_with_fake(fake.clone());
        eng.generate(&request("A")).unwrap();
        assert_eq!(
            fake.calls(),
            vec!["render", "composite:0,0", "encode"]
        );
    }

    #[test]
    fn oversized_buffer_is_downscaled_proportionally_and_centered() {
        let fake = Arc::new(FakeEngine::new(256, 128));
        let eng = engine_with_fake(fake.clone());
        eng.generate(&request("A")).unwrap();
        assert_eq!(
            fake.calls(),
            vec!["render", "resize:128x64", "composite:32,0", "encode"]
        );
    }

    #[test]
    fn undersized_buffer_is_centered_without_upscaling() {
        let fake = Arc::new(FakeEngine::new(64, 64));
        let eng = engine_with_fake(fake.clone());
        eng.generate(&request("A")).unwrap();
        assert_eq!(
            fake.calls(),
            vec!["render", "composite:32,32", "encode"]
        );
    }

    #[test]
    fn flatten_runs_after_composite_for_opaque_backgrounds() {
        let fake = Arc::new(FakeEngine::new(128, 128));
        let eng = engine_with_fake(fake.clone());
        eng.generate(&request("A").bg("blue")).unwrap();
        assert_eq!(
            fake.calls(),
            vec!["render", "composite:0,0", "flatten:0,0,255", "encode"]
        );
    }

    #[test]
    fn invalid_color_aborts_before_any_engine_call() {
        let fake = Arc::new(FakeEngine::new(128, 128));
        let eng = engine_with_fake(fake.clone());
        let err = eng
            .generate(&request("A").color("rgb(0,0,0)"))
            .unwrap_err();
        assert!(matches!(err, TextmojiError::InvalidColor(_)));
        assert!(fake.calls().is_empty());
    }
}
