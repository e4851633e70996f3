use crate::color::{self, Rgba};
use crate::error::TextmojiError;
use crate::font::Typeface;
use crate::types::RasterMeta;
use rustybuzz::{Direction as HbDirection, Face as HbFace, UnicodeBuffer};
use tiny_skia::{
    FillRule, FilterQuality, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Rect, Transform,
};
use ttf_parser::{GlyphId, OutlineBuilder};

/// An in-memory RGBA pixel buffer (premultiplied alpha). The pipeline never
/// inspects pixels, only dimensions; tests may.
#[derive(Debug, Clone)]
pub struct RasterBuffer {
    pixmap: Pixmap,
}

impl RasterBuffer {
    pub fn new(width: u32, height: u32) -> Result<RasterBuffer, TextmojiError> {
        let pixmap = Pixmap::new(width, height).ok_or_else(|| {
            TextmojiError::Render(format!("invalid raster size {width}x{height}"))
        })?;
        Ok(RasterBuffer { pixmap })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn channels(&self) -> u8 {
        4
    }

    pub(crate) fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub(crate) fn pixmap_mut(&mut self) -> &mut Pixmap {
        &mut self.pixmap
    }
}

/// One overlay for `composite`, placed at a pixel offset on the canvas.
#[derive(Debug, Clone, Copy)]
pub struct CompositeLayer<'a> {
    pub buffer: &'a RasterBuffer,
    pub top: i32,
    pub left: i32,
}

/// The rasterization capability the pipeline consumes. Everything here is a
/// pure buffer-in/buffer-out operation; implementations hold no per-request
/// state, so one engine serves any number of concurrent generations.
pub trait RasterEngine: Send + Sync {
    /// Rasterize an SVG document at its intrinsic (declared) size.
    fn render_document(&self, document: &str) -> Result<RasterBuffer, TextmojiError>;

    /// Scale to exactly `width` x `height`. Callers decide the policy (this
    /// crate never asks for an upscale).
    fn resize(
        &self,
        buffer: &RasterBuffer,
        width: u32,
        height: u32,
    ) -> Result<RasterBuffer, TextmojiError>;

    /// Draw `layers` onto `canvas` in order at their offsets.
    fn composite(
        &self,
        canvas: RasterBuffer,
        layers: &[CompositeLayer<'_>],
    ) -> Result<RasterBuffer, TextmojiError>;

    /// Merge alpha onto an opaque background color.
    fn flatten(&self, buffer: RasterBuffer, background: Rgba)
    -> Result<RasterBuffer, TextmojiError>;

    /// Losslessly encode to PNG (RGBA, straight alpha).
    fn encode_png(&self, buffer: &RasterBuffer) -> Result<Vec<u8>, TextmojiError>;

    /// Report dimensions and channel count of an encoded image.
    fn metadata(&self, bytes: &[u8]) -> Result<RasterMeta, TextmojiError>;
}

/// The built-in engine: tiny-skia pixel work, rustybuzz shaping, ttf-parser
/// outlines, and the `image` codec for PNG. Understands exactly the SVG
/// subset `svg::build_document` emits (`rect`, `text`/`tspan`).
pub struct SkiaRasterEngine {
    typeface: Typeface,
}

impl SkiaRasterEngine {
    pub(crate) fn new(typeface: Typeface) -> SkiaRasterEngine {
        SkiaRasterEngine { typeface }
    }
}

impl RasterEngine for SkiaRasterEngine {
    fn render_document(&self, document: &str) -> Result<RasterBuffer, TextmojiError> {
        let doc = roxmltree::Document::parse(document)
            .map_err(|e| TextmojiError::Render(format!("unparseable document: {e}")))?;
        let root = doc.root_element();
        if root.tag_name().name() != "svg" {
            return Err(TextmojiError::Render("document root is not <svg>".into()));
        }

        let width = dimension_attr(root, "width")?;
        let height = dimension_attr(root, "height")?;
        let mut buffer = RasterBuffer::new(width, height)?;

        for node in root.children().filter(|n| n.is_element()) {
            match node.tag_name().name() {
                "rect" => draw_rect(buffer.pixmap_mut(), node),
                "text" => self.draw_text_element(buffer.pixmap_mut(), node)?,
                // Unknown elements cannot appear in our own output; skip
                // rather than fail so a permissive caller document degrades
                // to partial rendering instead of an error.
                _ => {}
            }
        }
        Ok(buffer)
    }

    fn resize(
        &self,
        buffer: &RasterBuffer,
        width: u32,
        height: u32,
    ) -> Result<RasterBuffer, TextmojiError> {
        if width == buffer.width() && height == buffer.height() {
            return Ok(buffer.clone());
        }
        let mut target = RasterBuffer::new(width, height)?;
        let sx = width as f32 / buffer.width() as f32;
        let sy = height as f32 / buffer.height() as f32;
        let mut paint = PixmapPaint::default();
        paint.quality = FilterQuality::Bilinear;
        target.pixmap_mut().draw_pixmap(
            0,
            0,
            buffer.pixmap().as_ref(),
            &paint,
            Transform::from_scale(sx, sy),
            None,
        );
        Ok(target)
    }

    fn composite(
        &self,
        mut canvas: RasterBuffer,
        layers: &[CompositeLayer<'_>],
    ) -> Result<RasterBuffer, TextmojiError> {
        for layer in layers {
            canvas.pixmap_mut().draw_pixmap(
                layer.left,
                layer.top,
                layer.buffer.pixmap().as_ref(),
                &PixmapPaint::default(),
                Transform::identity(),
                None,
            );
        }
        Ok(canvas)
    }

    fn flatten(
        &self,
        buffer: RasterBuffer,
        background: Rgba,
    ) -> Result<RasterBuffer, TextmojiError> {
        let mut flat = RasterBuffer::new(buffer.width(), buffer.height())?;
        flat.pixmap_mut().fill(tiny_skia::Color::from_rgba8(
            background.r,
            background.g,
            background.b,
            255,
        ));
        flat.pixmap_mut().draw_pixmap(
            0,
            0,
            buffer.pixmap().as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
        Ok(flat)
    }

    fn encode_png(&self, buffer: &RasterBuffer) -> Result<Vec<u8>, TextmojiError> {
        use image::ImageEncoder;
        use image::codecs::png::PngEncoder;

        // tiny-skia stores premultiplied color; PNG wants straight alpha.
        let mut rgba = Vec::with_capacity(buffer.pixmap().data().len());
        for pixel in buffer.pixmap().pixels() {
            let straight = pixel.demultiply();
            rgba.extend_from_slice(&[straight.red(), straight.green(), straight.blue(), straight.alpha()]);
        }

        let mut out = Vec::new();
        let encoder = PngEncoder::new(&mut out);
        encoder
            .write_image(
                &rgba,
                buffer.width(),
                buffer.height(),
                image::ColorType::Rgba8.into(),
            )
            .map_err(|e| TextmojiError::Encode(format!("png encode failed: {e}")))?;
        Ok(out)
    }

    fn metadata(&self, bytes: &[u8]) -> Result<RasterMeta, TextmojiError> {
        use image::GenericImageView;

        let decoded = image::load_from_memory(bytes)
            .map_err(|e| TextmojiError::Encode(format!("image decode failed: {e}")))?;
        let (width, height) = decoded.dimensions();
        Ok(RasterMeta {
            width,
            height,
            channels: decoded.color().channel_count(),
        })
    }
}

impl SkiaRasterEngine {
    fn draw_text_element(
        &self,
        pixmap: &mut Pixmap,
        node: roxmltree::Node<'_, '_>,
    ) -> Result<(), TextmojiError> {
        let anchor_x = float_attr(node, "x", 0.0);
        let base_y = float_attr(node, "y", 0.0);
        let font_size = float_attr(node, "font-size", 16.0);
        let fill = color::resolve(node.attribute("fill").unwrap_or("black"));
        let centered = node.attribute("text-anchor") == Some("middle");

        let mut baseline_y = base_y;
        let mut first = true;
        for child in node.children() {
            if child.is_element() && child.tag_name().name() == "tspan" {
                let x = float_attr(child, "x", anchor_x);
                let dy = float_attr(child, "dy", 0.0);
                baseline_y = if first { base_y + dy } else { baseline_y + dy };
                first = false;
                if let Some(text) = child.text() {
                    self.draw_line(pixmap, text, x, baseline_y, font_size, fill, centered)?;
                }
            } else if child.is_text() {
                let text = child.text().unwrap_or("");
                if !text.trim().is_empty() {
                    self.draw_line(pixmap, text, anchor_x, base_y, font_size, fill, centered)?;
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_line(
        &self,
        pixmap: &mut Pixmap,
        text: &str,
        x: f32,
        baseline_y: f32,
        font_size: f32,
        fill: Rgba,
        centered: bool,
    ) -> Result<(), TextmojiError> {
        if fill.a == 0 {
            return Ok(());
        }
        let placements = layout_line_glyphs(self.typeface.as_bytes(), text, font_size);
        if placements.glyphs.is_empty() {
            return Ok(());
        }
        let origin_x = if centered {
            x - placements.advance / 2.0
        } else {
            x
        };

        let face = ttf_parser::Face::parse(self.typeface.as_bytes(), 0)
            .map_err(|e| TextmojiError::Font(format!("unusable font data: {e}")))?;
        let paint = fill_paint(fill);
        for glyph in &placements.glyphs {
            let mut builder = GlyphPathBuilder::new(
                origin_x + glyph.offset_x,
                baseline_y - glyph.offset_y,
                glyph.scale,
            );
            if face
                .outline_glyph(GlyphId(glyph.glyph_id), &mut builder)
                .is_none()
            {
                continue;
            }
            if let Some(path) = builder.finish() {
                fill_glyph(pixmap, &path, &paint);
            }
        }
        Ok(())
    }
}

fn fill_glyph(pixmap: &mut Pixmap, path: &Path, paint: &Paint<'_>) {
    pixmap.fill_path(path, paint, FillRule::Winding, Transform::identity(), None);
}

fn draw_rect(pixmap: &mut Pixmap, node: roxmltree::Node<'_, '_>) {
    let x = float_attr(node, "x", 0.0);
    let y = float_attr(node, "y", 0.0);
    let width = float_attr(node, "width", 0.0);
    let height = float_attr(node, "height", 0.0);
    let fill = color::resolve(node.attribute("fill").unwrap_or("black"));
    if fill.a == 0 {
        return;
    }
    if let Some(rect) = Rect::from_xywh(x, y, width, height) {
        let path = PathBuilder::from_rect(rect);
        let paint = fill_paint(fill);
        pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }
}

fn fill_paint(color: Rgba) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(tiny_skia::Color::from_rgba8(
        color.r, color.g, color.b, color.a,
    ));
    paint.anti_alias = true;
    paint
}

fn float_attr(node: roxmltree::Node<'_, '_>, name: &str, default: f32) -> f32 {
    node.attribute(name)
        .and_then(|raw| raw.trim().parse::<f32>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

fn dimension_attr(node: roxmltree::Node<'_, '_>, name: &str) -> Result<u32, TextmojiError> {
    let raw = float_attr(node, name, 0.0);
    let px = raw.round();
    if !(1.0..=16384.0).contains(&px) {
        return Err(TextmojiError::Render(format!(
            "document {name} out of range"
        )));
    }
    Ok(px as u32)
}

#[derive(Clone, Copy)]
struct GlyphPlacement {
    glyph_id: u16,
    // Pen-relative, in pixels, y-up (font space).
    offset_x: f32,
    offset_y: f32,
    scale: f32,
}

struct ShapedLine {
    glyphs: Vec<GlyphPlacement>,
    advance: f32,
}

/// Shape one line with rustybuzz; fall back to naive per-character advances
/// if shaping is unavailable. Glyphs missing from the face advance the pen
/// without drawing.
fn layout_line_glyphs(font_data: &[u8], text: &str, font_size: f32) -> ShapedLine {
    let Some(face) = HbFace::from_slice(font_data, 0) else {
        return layout_line_glyphs_unshaped(font_data, text, font_size);
    };
    let units_per_em = face.units_per_em().max(1) as f32;
    let scale = font_size / units_per_em;

    let mut buffer = UnicodeBuffer::new();
    buffer.set_direction(detect_direction(text));
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let infos = output.glyph_infos();
    let positions = output.glyph_positions();
    if infos.is_empty() || infos.len() != positions.len() {
        return layout_line_glyphs_unshaped(font_data, text, font_size);
    }

    let mut glyphs = Vec::with_capacity(infos.len());
    let mut pen_x = 0.0f32;
    let mut pen_y = 0.0f32;
    for (info, pos) in infos.iter().zip(positions.iter()) {
        let gid = info.glyph_id as u16;
        if gid == 0 {
            pen_x += pos.x_advance as f32 * scale;
            pen_y += pos.y_advance as f32 * scale;
            continue;
        }
        glyphs.push(GlyphPlacement {
            glyph_id: gid,
            offset_x: pen_x + pos.x_offset as f32 * scale,
            offset_y: pen_y + pos.y_offset as f32 * scale,
            scale,
        });
        pen_x += pos.x_advance as f32 * scale;
        pen_y += pos.y_advance as f32 * scale;
    }
    ShapedLine {
        glyphs,
        advance: pen_x,
    }
}

fn layout_line_glyphs_unshaped(font_data: &[u8], text: &str, font_size: f32) -> ShapedLine {
    let Ok(face) = ttf_parser::Face::parse(font_data, 0) else {
        return ShapedLine {
            glyphs: Vec::new(),
            advance: 0.0,
        };
    };
    let units_per_em = face.units_per_em().max(1) as f32;
    let scale = font_size / units_per_em;

    let mut glyphs = Vec::new();
    let mut pen_x = 0.0f32;
    for ch in text.chars() {
        let gid = face.glyph_index(ch).map(|id| id.0).unwrap_or(0);
        if gid == 0 {
            pen_x += font_size * 0.5;
            continue;
        }
        glyphs.push(GlyphPlacement {
            glyph_id: gid,
            offset_x: pen_x,
            offset_y: 0.0,
            scale,
        });
        let advance_units = face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0) as f32;
        let mut advance = advance_units * scale;
        if advance <= 0.0 {
            advance = font_size * 0.5;
        }
        pen_x += advance;
    }
    ShapedLine {
        glyphs,
        advance: pen_x,
    }
}

fn detect_direction(text: &str) -> HbDirection {
    for ch in text.chars() {
        let code = ch as u32;
        let rtl = matches!(
            code,
            0x0590..=0x08FF | 0xFB1D..=0xFDFF | 0xFE70..=0xFEFF | 0x1EE00..=0x1EEFF
        );
        if rtl {
            return HbDirection::RightToLeft;
        }
    }
    HbDirection::LeftToRight
}

/// Routes ttf-parser outlines (y-up font units) into a tiny-skia path in
/// pixel space (y-down).
struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(origin_x: f32, origin_y: f32, scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            origin_y,
            scale,
        }
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        self.builder.move_to(
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.builder.line_to(
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.builder.quad_to(
            self.origin_x + x1 * self.scale,
            self.origin_y - y1 * self.scale,
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.builder.cubic_to(
            self.origin_x + x1 * self.scale,
            self.origin_y - y1 * self.scale,
            self.origin_x + x2 * self.scale,
            self.origin_y - y2 * self.scale,
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn close(&mut self) {
        self.builder.close();
    }
}
