//! Pixel comparison between the previous and the new capture.

use image::{load_from_memory, DynamicImage, ImageOutputFormat, Rgba, RgbaImage};

use crate::errors::SnapshotError;

/// Inclusive bounding box of changed pixels, in the new image's coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiffBounds {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

#[derive(Clone, Debug)]
pub struct DiffReport {
    pub identical: bool,
    pub changed_pixels: u64,
    pub bounds: Option<DiffBounds>,
    /// Side-by-side previous|new|highlight PNG, when requested.
    pub render: Option<Vec<u8>>,
}

/// Compare two PNG buffers. Byte-identical inputs short-circuit without
/// decoding; differing dimensions count as a full-image change.
pub fn compute(old_png: &[u8], new_png: &[u8], render: bool) -> Result<DiffReport, SnapshotError> {
    if old_png == new_png {
        return Ok(DiffReport {
            identical: true,
            changed_pixels: 0,
            bounds: None,
            render: None,
        });
    }

    let old = load_from_memory(old_png)?.to_rgba8();
    let new = load_from_memory(new_png)?.to_rgba8();

    if old.dimensions() != new.dimensions() {
        let (width, height) = new.dimensions();
        let bounds = DiffBounds {
            min_x: 0,
            min_y: 0,
            max_x: width.saturating_sub(1),
            max_y: height.saturating_sub(1),
        };
        let render = render
            .then(|| render_side_by_side(&old, &new, |_, _| true))
            .transpose()?;
        return Ok(DiffReport {
            identical: false,
            changed_pixels: u64::from(width) * u64::from(height),
            bounds: Some(bounds),
            render,
        });
    }

    let (width, height) = new.dimensions();
    let mut changed = 0u64;
    let mut bounds: Option<DiffBounds> = None;
    for y in 0..height {
        for x in 0..width {
            if old.get_pixel(x, y) != new.get_pixel(x, y) {
                changed += 1;
                bounds = Some(match bounds {
                    None => DiffBounds {
                        min_x: x,
                        min_y: y,
                        max_x: x,
                        max_y: y,
                    },
                    Some(b) => DiffBounds {
                        min_x: b.min_x.min(x),
                        min_y: b.min_y.min(y),
                        max_x: b.max_x.max(x),
                        max_y: b.max_y.max(y),
                    },
                });
            }
        }
    }

    if changed == 0 {
        // Same pixels, different encodings.
        return Ok(DiffReport {
            identical: true,
            changed_pixels: 0,
            bounds: None,
            render: None,
        });
    }

    let render = render
        .then(|| render_side_by_side(&old, &new, |x, y| old.get_pixel(x, y) != new.get_pixel(x, y)))
        .transpose()?;
    Ok(DiffReport {
        identical: false,
        changed_pixels: changed,
        bounds,
        render,
    })
}

const GUTTER: u32 = 8;
const HIGHLIGHT: Rgba<u8> = Rgba([230, 40, 40, 255]);

/// Compose previous, new and a change-highlight panel into one PNG.
fn render_side_by_side(
    old: &RgbaImage,
    new: &RgbaImage,
    changed_at: impl Fn(u32, u32) -> bool,
) -> Result<Vec<u8>, SnapshotError> {
    let (ow, oh) = old.dimensions();
    let (nw, nh) = new.dimensions();
    let height = oh.max(nh);
    let width = ow + nw + nw + 2 * GUTTER;

    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    blit(&mut canvas, old, 0);
    blit(&mut canvas, new, ow + GUTTER);

    // Third panel: the new capture with changed pixels flooded in red. When
    // dimensions differ every in-range pixel counts as changed.
    let offset = ow + GUTTER + nw + GUTTER;
    for y in 0..nh {
        for x in 0..nw {
            let in_old = x < ow && y < oh;
            let pixel = if !in_old || changed_at(x, y) {
                HIGHLIGHT
            } else {
                let p = new.get_pixel(x, y);
                // Fade unchanged pixels so the highlight stands out.
                Rgba([
                    128 + p.0[0] / 2,
                    128 + p.0[1] / 2,
                    128 + p.0[2] / 2,
                    255,
                ])
            };
            canvas.put_pixel(offset + x, y, pixel);
        }
    }

    encode_png(&canvas)
}

fn blit(canvas: &mut RgbaImage, source: &RgbaImage, offset_x: u32) {
    for (x, y, pixel) in source.enumerate_pixels() {
        canvas.put_pixel(offset_x + x, y, *pixel);
    }
}

pub(crate) fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, SnapshotError> {
    let mut out = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image.clone()).write_to(&mut out, ImageOutputFormat::Png)?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba(color));
        encode_png(&img).unwrap()
    }

    #[test]
    fn identical_bytes_short_circuit() {
        let png = solid(4, 4, [10, 20, 30, 255]);
        let report = compute(&png, &png, true).unwrap();
        assert!(report.identical);
        assert_eq!(report.changed_pixels, 0);
        assert!(report.bounds.is_none());
        assert!(report.render.is_none());
    }

    #[test]
    fn single_changed_pixel_yields_tight_bounds() {
        let old = solid(8, 8, [0, 0, 0, 255]);
        let mut img = image::load_from_memory(&old).unwrap().to_rgba8();
        img.put_pixel(3, 5, Rgba([255, 255, 255, 255]));
        let new = encode_png(&img).unwrap();

        let report = compute(&old, &new, false).unwrap();
        assert!(!report.identical);
        assert_eq!(report.changed_pixels, 1);
        assert_eq!(
            report.bounds,
            Some(DiffBounds {
                min_x: 3,
                min_y: 5,
                max_x: 3,
                max_y: 5,
            })
        );
    }

    #[test]
    fn dimension_mismatch_is_a_full_change() {
        let old = solid(4, 4, [1, 2, 3, 255]);
        let new = solid(6, 3, [1, 2, 3, 255]);
        let report = compute(&old, &new, false).unwrap();
        assert!(!report.identical);
        assert_eq!(report.changed_pixels, 18);
        assert_eq!(
            report.bounds,
            Some(DiffBounds {
                min_x: 0,
                min_y: 0,
                max_x: 5,
                max_y: 2,
            })
        );
    }

    #[test]
    fn render_spans_three_panels() {
        let old = solid(4, 4, [0, 0, 0, 255]);
        let new = solid(4, 4, [255, 255, 255, 255]);
        let report = compute(&old, &new, true).unwrap();
        let render = report.render.expect("render requested");
        let img = image::load_from_memory(&render).unwrap();
        assert_eq!(img.width(), 4 + 4 + 4 + 2 * GUTTER);
        assert_eq!(img.height(), 4);
    }

    #[test]
    fn reencoded_identical_pixels_compare_equal() {
        let img = RgbaImage::from_pixel(5, 5, Rgba([9, 9, 9, 255]));
        let a = encode_png(&img).unwrap();
        // A second encode of the same pixels may differ byte-wise.
        let b = encode_png(&img).unwrap();
        let report = compute(&a, &b, false).unwrap();
        assert!(report.identical);
    }
}
