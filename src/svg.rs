use crate::color::SafeColor;
use crate::layout::TextLayout;
use crate::types::CANVAS_SIZE;

/// Escape the XML metacharacters for text-node content. Ampersand must go
/// first or the later replacements would be double-escaped.
pub(crate) fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Build the standalone 128x128 document: an optional full-canvas background
/// rect and one centered multi-line text block.
///
/// Free text is escaped here, unconditionally. Colors arrive as `SafeColor`
/// witnesses, so an ungated string cannot reach an attribute position; a
/// `None` background means the `transparent` sentinel and omits the rect.
pub(crate) fn build_document(
    layout: &TextLayout,
    color: SafeColor<'_>,
    bg: Option<SafeColor<'_>>,
) -> String {
    let geo = layout.geometry();
    let canvas = CANVAS_SIZE;

    let mut tspans = String::new();
    for (index, line) in layout.lines.iter().enumerate() {
        let dy = if index == 0 { 0.0 } else { geo.line_height };
        tspans.push_str(&format!(
            "<tspan x=\"{}\" dy=\"{}\">{}</tspan>",
            geo.anchor_x,
            dy,
            escape_xml(line)
        ));
    }

    let bg_rect = match bg {
        Some(safe) => format!(
            "<rect width=\"{canvas}\" height=\"{canvas}\" fill=\"{}\"/>",
            safe.as_str()
        ),
        None => String::new(),
    };

    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 {canvas} {canvas}\" width=\"{canvas}\" height=\"{canvas}\">\n\
         {bg_rect}\n\
         <text x=\"{}\" y=\"{}\" text-anchor=\"middle\" font-size=\"{}\" fill=\"{}\" font-family=\"sans-serif\">{tspans}</text>\n\
         </svg>",
        geo.anchor_x,
        geo.start_y,
        layout.font_size,
        color.as_str(),
    )
}
