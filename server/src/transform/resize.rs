use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};

use super::params::FitMode;

const FILTER: FilterType = FilterType::Lanczos3;

/// Geometry decided for one image. Every variant stays within the source size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePlan {
    Keep,
    /// Resize to exactly these dimensions
    Scale { width: u32, height: u32 },
    /// Scale to cover then crop the centre to these dimensions
    Crop { width: u32, height: u32 },
    /// Scale to `inner` and centre it on a `width` × `height` canvas
    Pad {
        inner_width: u32,
        inner_height: u32,
        width: u32,
        height: u32,
    },
}

impl ResizePlan {
    /// Dimensions the plan produces for a source of `src_w` × `src_h`.
    #[must_use]
    pub fn output_size(&self, src_w: u32, src_h: u32) -> (u32, u32) {
        match *self {
            Self::Keep => (src_w, src_h),
            Self::Scale { width, height }
            | Self::Crop { width, height }
            | Self::Pad { width, height, .. } => (width, height),
        }
    }
}

/// Works out the resize for the requested box without ever enlarging.
#[must_use]
pub fn plan(
    src_w: u32,
    src_h: u32,
    target_w: Option<u32>,
    target_h: Option<u32>,
    fit: FitMode,
) -> ResizePlan {
    if src_w == 0 || src_h == 0 {
        return ResizePlan::Keep;
    }
    let scale_w = |w: u32| f64::from(w) / f64::from(src_w);
    let scale_h = |h: u32| f64::from(h) / f64::from(src_h);

    match (target_w, target_h) {
        (None, None) => ResizePlan::Keep,
        (Some(w), None) => scaled(src_w, src_h, scale_w(w)),
        (None, Some(h)) => scaled(src_w, src_h, scale_h(h)),
        (Some(w), Some(h)) => {
            let box_w = w.min(src_w);
            let box_h = h.min(src_h);
            match fit {
                FitMode::Inside => scaled(src_w, src_h, scale_w(w).min(scale_h(h))),
                FitMode::Outside => scaled(src_w, src_h, scale_w(w).max(scale_h(h))),
                FitMode::Fill if (box_w, box_h) == (src_w, src_h) => ResizePlan::Keep,
                FitMode::Fill => ResizePlan::Scale {
                    width: box_w,
                    height: box_h,
                },
                FitMode::Cover if (box_w, box_h) == (src_w, src_h) => ResizePlan::Keep,
                FitMode::Cover => ResizePlan::Crop {
                    width: box_w,
                    height: box_h,
                },
                FitMode::Contain => {
                    let (inner_w, inner_h) =
                        match scaled(src_w, src_h, scale_w(box_w).min(scale_h(box_h))) {
                            ResizePlan::Scale { width, height } => (width, height),
                            _ => (src_w, src_h),
                        };
                    let inner_w = inner_w.min(box_w);
                    let inner_h = inner_h.min(box_h);
                    if (inner_w, inner_h, box_w, box_h) == (src_w, src_h, src_w, src_h) {
                        ResizePlan::Keep
                    } else {
                        ResizePlan::Pad {
                            inner_width: inner_w,
                            inner_height: inner_h,
                            width: box_w,
                            height: box_h,
                        }
                    }
                }
            }
        }
    }
}

fn scaled(src_w: u32, src_h: u32, factor: f64) -> ResizePlan {
    let factor = factor.min(1.0);
    if factor >= 1.0 {
        return ResizePlan::Keep;
    }
    let width = scale_side(src_w, factor);
    let height = scale_side(src_h, factor);
    if (width, height) == (src_w, src_h) {
        ResizePlan::Keep
    } else {
        ResizePlan::Scale { width, height }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale_side(side: u32, factor: f64) -> u32 {
    let scaled = (f64::from(side) * factor).round() as u32;
    scaled.clamp(1, side)
}

/// Applies a plan produced by [`plan`].
#[must_use]
pub fn apply(img: DynamicImage, plan: ResizePlan) -> DynamicImage {
    match plan {
        ResizePlan::Keep => img,
        ResizePlan::Scale { width, height } => img.resize_exact(width, height, FILTER),
        ResizePlan::Crop { width, height } => img.resize_to_fill(width, height, FILTER),
        ResizePlan::Pad {
            inner_width,
            inner_height,
            width,
            height,
        } => {
            let inner = img.resize_exact(inner_width, inner_height, FILTER).to_rgba8();
            let mut canvas = RgbaImage::new(width, height);
            let x = i64::from((width - inner_width) / 2);
            let y = i64::from((height - inner_height) / 2);
            imageops::overlay(&mut canvas, &inner, x, y);
            DynamicImage::ImageRgba8(canvas)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const FITS: [FitMode; 5] = [
        FitMode::Cover,
        FitMode::Contain,
        FitMode::Fill,
        FitMode::Inside,
        FitMode::Outside,
    ];

    #[rstest]
    #[case(1000, 500, Some(400), None, (400, 200))]
    #[case(1000, 500, None, Some(250), (500, 250))]
    #[case(1920, 1080, None, Some(600), (1067, 600))]
    #[case(100, 50, Some(200), None, (100, 50))]
    #[case(100, 50, None, None, (100, 50))]
    #[trace]
    fn single_dimension_keeps_aspect(
        #[case] src_w: u32,
        #[case] src_h: u32,
        #[case] w: Option<u32>,
        #[case] h: Option<u32>,
        #[case] expected: (u32, u32),
    ) {
        for fit in FITS {
            // Act
            let plan = plan(src_w, src_h, w, h, fit);

            // Assert
            assert_eq!(plan.output_size(src_w, src_h), expected, "{fit:?}");
        }
    }

    #[rstest]
    #[case(FitMode::Cover, (800, 600))]
    #[case(FitMode::Contain, (800, 600))]
    #[case(FitMode::Fill, (800, 600))]
    #[case(FitMode::Inside, (800, 450))]
    #[case(FitMode::Outside, (1067, 600))]
    #[trace]
    fn box_per_fit(#[case] fit: FitMode, #[case] expected: (u32, u32)) {
        // Act
        let plan = plan(1920, 1080, Some(800), Some(600), fit);

        // Assert
        assert_eq!(plan.output_size(1920, 1080), expected);
    }

    #[test]
    fn contain_letterboxes() {
        // Act
        let plan = plan(1920, 1080, Some(800), Some(600), FitMode::Contain);

        // Assert
        assert_eq!(
            plan,
            ResizePlan::Pad {
                inner_width: 800,
                inner_height: 450,
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn upscaling_is_never_planned() {
        let sources = [(1, 1), (10, 10), (640, 480), (480, 640), (3000, 20)];
        let targets = [None, Some(1), Some(9), Some(100), Some(479), Some(5000)];
        for (src_w, src_h) in sources {
            for w in targets {
                for h in targets {
                    for fit in FITS {
                        // Act
                        let (out_w, out_h) = plan(src_w, src_h, w, h, fit).output_size(src_w, src_h);

                        // Assert
                        assert!(
                            out_w <= src_w && out_h <= src_h,
                            "{src_w}x{src_h} -> {w:?}x{h:?} {fit:?} gave {out_w}x{out_h}"
                        );
                        assert!(out_w >= 1 && out_h >= 1);
                    }
                }
            }
        }
    }

    #[test]
    fn larger_box_keeps_source() {
        // Act
        let plan = plan(100, 80, Some(200), Some(200), FitMode::Cover);

        // Assert
        assert_eq!(plan, ResizePlan::Keep);
    }

    #[rstest]
    #[case(FitMode::Cover)]
    #[case(FitMode::Contain)]
    #[case(FitMode::Fill)]
    #[case(FitMode::Inside)]
    #[case(FitMode::Outside)]
    #[trace]
    fn applied_size_matches_plan(#[case] fit: FitMode) {
        // Arrange
        let img = DynamicImage::new_rgb8(120, 80);
        let plan = plan(120, 80, Some(50), Some(50), fit);

        // Act
        let out = apply(img, plan);

        // Assert
        assert_eq!((out.width(), out.height()), plan.output_size(120, 80));
    }
}
