use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use shared::BBox;

/// Box/label color for disease detections (red, as in the original overlay).
const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const LABEL_SCALE: f32 = 18.0;

/// Burns detection boxes and labels into an image. Label text needs a TTF
/// file; when none is configured (or it fails to parse) annotation degrades
/// to boxes only.
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    pub fn new(font_path: Option<&str>) -> Self {
        let font = font_path.and_then(|path| match std::fs::read(path) {
            Ok(bytes) => match FontVec::try_from_vec(bytes) {
                Ok(font) => Some(font),
                Err(e) => {
                    log::warn!("label font '{}' is not a usable font: {}", path, e);
                    None
                }
            },
            Err(e) => {
                log::warn!("failed to read label font '{}': {}", path, e);
                None
            }
        });

        if font.is_none() {
            log::info!("no label font available; annotations will be box-only");
        }
        Self { font }
    }

    pub fn draw_detection(
        &self,
        image: &mut RgbImage,
        bbox: &BBox,
        label: &str,
        confidence: f32,
    ) {
        let width = bbox.width().max(1) as u32;
        let height = bbox.height().max(1) as u32;

        let outer = Rect::at(bbox.x1, bbox.y1).of_size(width, height);
        draw_hollow_rect_mut(image, outer, BOX_COLOR);
        if width > 2 && height > 2 {
            let inner = Rect::at(bbox.x1 + 1, bbox.y1 + 1).of_size(width - 2, height - 2);
            draw_hollow_rect_mut(image, inner, BOX_COLOR);
        }

        if let Some(font) = &self.font {
            let text = format!("{}: {:.2}", label, confidence);
            let text_y = (bbox.y1 - 10).max(15);
            draw_text_mut(
                image,
                BOX_COLOR,
                bbox.x1,
                text_y,
                PxScale::from(LABEL_SCALE),
                font,
                &text,
            );
        }
    }
}
