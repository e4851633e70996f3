/// Timings and shape of one generation, reported by
/// `Textmoji::generate_with_metrics`.
#[derive(Debug, Clone, Default)]
pub struct GenerationMetrics {
    pub line_count: usize,
    pub font_size_px: u32,
    pub layout_ms: f64,
    pub render_ms: f64,
    pub fit_ms: f64,
    pub encode_ms: f64,
    pub output_bytes: usize,
}
