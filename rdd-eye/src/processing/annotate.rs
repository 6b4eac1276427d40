//! Draw detections onto a copy of a frame

use crate::frame::Frame;
use crate::models::Detection;
use crate::processing::font::{self, GLYPH_HEIGHT, GLYPH_WIDTH};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use tracing::debug;

/// Box colour per damage class, indexed by class id
const CLASS_COLORS: &[Rgb<u8>] = &[
    Rgb([255, 56, 56]),  // Longitudinal Crack
    Rgb([255, 157, 151]), // Transverse Crack
    Rgb([255, 112, 31]), // Alligator Crack
    Rgb([72, 249, 10]),  // Potholes
];

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

pub fn class_color(class_id: usize) -> Rgb<u8> {
    CLASS_COLORS[class_id % CLASS_COLORS.len()]
}

/// Label drawn above each box
pub fn label_text(detection: &Detection) -> String {
    format!("{} {:.2}", detection.label, detection.score)
}

/// Stroke width scaled to frame size, at least 2px
fn line_width(width: u32, height: u32) -> u32 {
    (((width + height) as f32 / 2.0 * 0.003).round() as u32).max(2)
}

/// Return a new frame with one rectangle and one label per detection.
///
/// Detections are painted in slice order, so a later detection covers an
/// earlier one wherever they overlap. `frame` is left untouched.
pub fn annotate(frame: &Frame, detections: &[Detection]) -> Frame {
    let mut canvas = frame.to_image();
    let stroke = line_width(frame.width(), frame.height());
    let text_scale = (stroke / 2).max(1);

    for detection in detections {
        let color = class_color(detection.class_id);
        draw_box(&mut canvas, detection.bbox, stroke, color);
        draw_label(&mut canvas, &label_text(detection), detection.bbox, text_scale, color);
    }

    debug!("Annotated {} detections", detections.len());
    Frame::from_derived(canvas)
}

fn fill(canvas: &mut RgbImage, x: i32, y: i32, width: u32, height: u32, color: Rgb<u8>) {
    if width == 0 || height == 0 {
        return;
    }
    draw_filled_rect_mut(canvas, Rect::at(x, y).of_size(width, height), color);
}

/// Hollow rectangle whose stroke grows inward from the box edges
fn draw_box(canvas: &mut RgbImage, bbox: [u32; 4], stroke: u32, color: Rgb<u8>) {
    let [x0, y0, x1, y1] = bbox;
    let width = x1.saturating_sub(x0) + 1;
    let height = y1.saturating_sub(y0) + 1;

    for offset in 0..stroke {
        let w = width.saturating_sub(offset * 2);
        let h = height.saturating_sub(offset * 2);
        if w == 0 || h == 0 {
            break;
        }
        let rect = Rect::at((x0 + offset) as i32, (y0 + offset) as i32).of_size(w, h);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

/// Filled tab with the label text, above the box when it fits, else inside
fn draw_label(canvas: &mut RgbImage, text: &str, bbox: [u32; 4], scale: u32, background: Rgb<u8>) {
    let pad = scale;
    let advance = (GLYPH_WIDTH + 1) * scale;
    let tab_w = text.chars().count() as u32 * advance + pad * 2;
    let tab_h = GLYPH_HEIGHT * scale + pad * 2;

    let x = bbox[0] as i32;
    let y = (if bbox[1] >= tab_h { bbox[1] - tab_h } else { bbox[1] }) as i32;

    fill(canvas, x, y, tab_w, tab_h, background);

    for (i, ch) in text.chars().enumerate() {
        let gx = x + (pad + i as u32 * advance) as i32;
        let gy = y + pad as i32;
        for row in 0..GLYPH_HEIGHT {
            for col in 0..GLYPH_WIDTH {
                if font::is_set(ch, col, row) {
                    let px = gx + (col * scale) as i32;
                    let py = gy + (row * scale) as i32;
                    fill(canvas, px, py, scale, scale, TEXT_COLOR);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grey(width: u32, height: u32) -> Frame {
        Frame::new(RgbImage::from_pixel(width, height, Rgb([128, 128, 128]))).unwrap()
    }

    fn detection(class_id: usize, bbox: [u32; 4]) -> Detection {
        Detection {
            class_id,
            label: crate::labels::ROAD_DAMAGE_CLASSES[class_id].to_string(),
            score: 0.87,
            bbox,
        }
    }

    #[test]
    fn test_annotate_does_not_mutate_input() {
        let frame = grey(320, 240);
        let before = frame.to_image();
        let out = annotate(&frame, &[detection(0, [10, 40, 100, 120])]);

        assert_eq!(frame.as_image(), &before);
        assert!(!out.shares_buffer(&frame));
        assert_ne!(out.as_image(), &before);
    }

    #[test]
    fn test_annotate_without_detections_copies_frame() {
        let frame = grey(16, 16);
        let out = annotate(&frame, &[]);
        assert_eq!(out, frame);
    }

    #[test]
    fn test_box_edges_use_class_color() {
        let frame = grey(200, 200);
        let out = annotate(&frame, &[detection(3, [50, 100, 150, 180])]);
        // bottom-right corner is never covered by the label tab
        assert_eq!(out.as_image().get_pixel(150, 180), &class_color(3));
        assert_eq!(out.as_image().get_pixel(100, 150), &Rgb([128, 128, 128]));
    }

    #[test]
    fn test_later_detection_paints_over_earlier() {
        let frame = grey(200, 200);
        let first = detection(0, [20, 60, 120, 160]);
        let second = detection(3, [20, 60, 120, 160]);

        let out = annotate(&frame, &[first.clone(), second.clone()]);
        assert_eq!(out.as_image().get_pixel(120, 160), &class_color(3));

        let reversed = annotate(&frame, &[second, first]);
        assert_eq!(reversed.as_image().get_pixel(120, 160), &class_color(0));
    }

    #[test]
    fn test_box_at_frame_edge_is_clipped() {
        let frame = grey(64, 64);
        let out = annotate(&frame, &[detection(1, [0, 0, 63, 63])]);
        assert_eq!(out.dimensions(), (64, 64));
        assert_eq!(out.as_image().get_pixel(63, 63), &class_color(1));
    }

    #[test]
    fn test_stroke_grows_inward_only() {
        let frame = grey(2000, 2000);
        assert_eq!(line_width(2000, 2000), 6);
        let out = annotate(&frame, &[detection(2, [100, 100, 400, 400])]);
        let img = out.as_image();

        for x in 100..106 {
            assert_eq!(img.get_pixel(x, 300), &class_color(2));
        }
        assert_eq!(img.get_pixel(106, 300), &Rgb([128, 128, 128]));
        assert_eq!(img.get_pixel(99, 300), &Rgb([128, 128, 128]));
        assert_eq!(img.get_pixel(400, 400), &class_color(2));
        assert_eq!(img.get_pixel(401, 401), &Rgb([128, 128, 128]));
    }

    #[test]
    fn test_label_text_format() {
        assert_eq!(label_text(&detection(3, [0, 0, 1, 1])), "Potholes 0.87");
    }
}
