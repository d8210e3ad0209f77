//! Bounds normalization: absolute boxes → page-relative percentile boxes.
//!
//! The service reports `Bounds` as `[left, bottom, right, top]` with the
//! origin at the bottom-left of the page. Each element with `Bounds` gains a
//! `PercentileBounds` in top-left-origin fractions of its own page:
//!
//! ```text
//! left   = Bounds[0] / width
//! top    = (height - Bounds[3]) / height
//! right  = Bounds[2] / width
//! bottom = (height - Bounds[1]) / height
//! ```
//!
//! A `Page` value with no matching page size aborts the whole pass; nothing
//! is returned half-normalized.

use crate::config::{CharBoundsMode, PageNumbering, PipelineConfig};
use crate::error::DeckError;
use crate::model::{Bounds, Document, Element, PageSize, PercentileBounds};

/// Traversal and geometry rules for [`normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub char_bounds: CharBoundsMode,
    /// Levels of `Kids` below the top-level elements to visit; `None` visits all.
    pub kid_depth: Option<usize>,
    pub page_numbering: PageNumbering,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            char_bounds: CharBoundsMode::ElementBox,
            kid_depth: Some(1),
            page_numbering: PageNumbering::OneBased,
        }
    }
}

impl NormalizeOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            char_bounds: config.char_bounds,
            kid_depth: config.kid_depth,
            page_numbering: config.page_numbering,
        }
    }
}

/// Add percentile boxes to every reachable element of `document`.
pub fn normalize(
    mut document: Document,
    page_sizes: &[PageSize],
    opts: &NormalizeOptions,
) -> Result<Document, DeckError> {
    for element in &mut document.elements {
        normalize_element(element, page_sizes, opts, 0)?;
    }
    Ok(document)
}

fn normalize_element(
    element: &mut Element,
    page_sizes: &[PageSize],
    opts: &NormalizeOptions,
    depth: usize,
) -> Result<(), DeckError> {
    if let Some(bounds) = element.bounds {
        let page = element.page.ok_or_else(|| {
            DeckError::Schema("element has `Bounds` but no `Page`".to_string())
        })?;
        let size = page_size_for(page, page_sizes, opts.page_numbering)?;
        let pct = to_percentile(&bounds, size);
        element.percentile_bounds = Some(pct);

        if let Some(chars) = element.char_bounds.as_ref().filter(|c| !c.is_empty()) {
            element.percentile_char_bounds = Some(match opts.char_bounds {
                CharBoundsMode::ElementBox => vec![pct; chars.len()],
                CharBoundsMode::PerCharacter => {
                    chars.iter().map(|c| to_percentile(c, size)).collect()
                }
            });
        }
    }

    let descend = opts.kid_depth.map_or(true, |max| depth < max);
    if descend {
        if let Some(ref mut kids) = element.kids {
            for kid in kids {
                normalize_element(kid, page_sizes, opts, depth + 1)?;
            }
        }
    }
    Ok(())
}

/// Look up the size of the page an element's `Page` value points at.
pub fn page_size_for(
    page: i64,
    page_sizes: &[PageSize],
    numbering: PageNumbering,
) -> Result<PageSize, DeckError> {
    numbering
        .to_index(page)
        .and_then(|idx| page_sizes.get(idx))
        .copied()
        .ok_or(DeckError::PageSizeNotFound {
            page,
            available: page_sizes.len(),
        })
}

/// Convert one absolute box on a page of `size` to percentile coordinates.
pub fn to_percentile(bounds: &Bounds, size: PageSize) -> PercentileBounds {
    let (w, h) = (size.width, size.height);
    PercentileBounds {
        left: bounds[0] / w,
        top: (h - bounds[3]) / h,
        right: bounds[2] / w,
        bottom: (h - bounds[1]) / h,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(idx: usize, width: f64, height: f64) -> PageSize {
        PageSize {
            page_index: idx,
            width,
            height,
        }
    }

    fn boxed(page_no: i64, bounds: Bounds) -> Element {
        Element {
            page: Some(page_no),
            bounds: Some(bounds),
            ..Default::default()
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn reference_box() {
        let pct = to_percentile(&[100.0, 200.0, 300.0, 400.0], page(0, 500.0, 1000.0));
        assert!(approx(pct.left, 0.2));
        assert!(approx(pct.top, 0.6));
        assert!(approx(pct.right, 0.6));
        assert!(approx(pct.bottom, 0.8));
    }

    #[test]
    fn y_axis_is_flipped() {
        let size = page(0, 612.0, 792.0);
        for (bottom, top) in [(10.0, 50.0), (300.0, 301.0), (0.0, 792.0)] {
            let pct = to_percentile(&[5.0, bottom, 90.0, top], size);
            assert!(pct.top < pct.bottom);
            assert!(pct.left <= pct.right);
        }
    }

    #[test]
    fn boxes_outside_the_page_are_not_clamped() {
        let pct = to_percentile(&[-50.0, -10.0, 700.0, 900.0], page(0, 600.0, 800.0));
        assert!(pct.left < 0.0);
        assert!(pct.right > 1.0);
        assert!(pct.top < 0.0);
        assert!(pct.bottom > 1.0);
    }

    #[test]
    fn page_numbers_are_one_based_by_default() {
        let sizes = [page(0, 500.0, 1000.0), page(1, 1000.0, 500.0)];
        let doc = Document::new(vec![boxed(2, [100.0, 100.0, 500.0, 400.0])]);

        let out = normalize(doc, &sizes, &NormalizeOptions::default()).unwrap();
        let pct = out.elements[0].percentile_bounds.unwrap();
        assert!(approx(pct.left, 0.1));
        assert!(approx(pct.top, 0.2));
    }

    #[test]
    fn zero_based_numbering_is_opt_in() {
        let sizes = [page(0, 500.0, 1000.0)];
        let doc = Document::new(vec![boxed(0, [100.0, 200.0, 300.0, 400.0])]);
        let opts = NormalizeOptions {
            page_numbering: PageNumbering::ZeroBased,
            ..Default::default()
        };

        let out = normalize(doc, &sizes, &opts).unwrap();
        assert!(out.elements[0].percentile_bounds.is_some());
    }

    #[test]
    fn unknown_page_fails_the_pass() {
        let sizes = [page(0, 500.0, 1000.0)];
        let doc = Document::new(vec![
            boxed(1, [1.0, 1.0, 2.0, 2.0]),
            boxed(7, [1.0, 1.0, 2.0, 2.0]),
        ]);

        let err = normalize(doc, &sizes, &NormalizeOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            DeckError::PageSizeNotFound {
                page: 7,
                available: 1
            }
        ));
    }

    #[test]
    fn page_zero_is_not_found_when_one_based() {
        let err = page_size_for(0, &[page(0, 1.0, 1.0)], PageNumbering::OneBased).unwrap_err();
        assert!(matches!(err, DeckError::PageSizeNotFound { page: 0, .. }));
    }

    #[test]
    fn char_bounds_copy_the_element_box() {
        let mut el = boxed(1, [100.0, 200.0, 300.0, 400.0]);
        el.char_bounds = Some(vec![[100.0, 200.0, 110.0, 400.0], [110.0, 200.0, 120.0, 400.0]]);
        let doc = Document::new(vec![el]);

        let out = normalize(doc, &[page(0, 500.0, 1000.0)], &NormalizeOptions::default()).unwrap();
        let el = &out.elements[0];
        let chars = el.percentile_char_bounds.as_ref().unwrap();
        assert_eq!(chars.len(), 2);
        assert!(chars.iter().all(|c| Some(*c) == el.percentile_bounds));
    }

    #[test]
    fn per_character_mode_uses_each_box() {
        let mut el = boxed(1, [100.0, 200.0, 300.0, 400.0]);
        el.char_bounds = Some(vec![[100.0, 200.0, 110.0, 400.0], [250.0, 200.0, 300.0, 400.0]]);
        let opts = NormalizeOptions {
            char_bounds: CharBoundsMode::PerCharacter,
            ..Default::default()
        };

        let out = normalize(Document::new(vec![el]), &[page(0, 500.0, 1000.0)], &opts).unwrap();
        let chars = out.elements[0].percentile_char_bounds.as_ref().unwrap();
        assert!(approx(chars[0].right, 0.22));
        assert!(approx(chars[1].left, 0.5));
    }

    #[test]
    fn kids_use_their_own_page() {
        let sizes = [page(0, 500.0, 1000.0), page(1, 1000.0, 1000.0)];
        let mut parent = boxed(1, [0.0, 0.0, 500.0, 1000.0]);
        parent.kids = Some(vec![boxed(2, [500.0, 0.0, 1000.0, 1000.0]), Element::with_text("no box")]);

        let out = normalize(Document::new(vec![parent]), &sizes, &NormalizeOptions::default())
            .unwrap();
        let kids = out.elements[0].kids.as_ref().unwrap();
        assert!(approx(kids[0].percentile_bounds.unwrap().left, 0.5));
        assert!(kids[1].percentile_bounds.is_none());
    }

    #[test]
    fn depth_policy_limits_the_walk() {
        let sizes = [page(0, 100.0, 100.0)];
        let mut kid = boxed(1, [10.0, 10.0, 20.0, 20.0]);
        kid.kids = Some(vec![boxed(1, [30.0, 30.0, 40.0, 40.0])]);
        let mut root = boxed(1, [0.0, 0.0, 100.0, 100.0]);
        root.kids = Some(vec![kid]);
        let doc = Document::new(vec![root]);

        let one_level = normalize(doc.clone(), &sizes, &NormalizeOptions::default()).unwrap();
        let kid = &one_level.elements[0].kids.as_ref().unwrap()[0];
        assert!(kid.percentile_bounds.is_some());
        assert!(kid.kids.as_ref().unwrap()[0].percentile_bounds.is_none());

        let unlimited = NormalizeOptions {
            kid_depth: None,
            ..Default::default()
        };
        let all = normalize(doc, &sizes, &unlimited).unwrap();
        let grandkid = &all.elements[0].kids.as_ref().unwrap()[0].kids.as_ref().unwrap()[0];
        assert!(approx(grandkid.percentile_bounds.unwrap().left, 0.3));
    }

    #[test]
    fn bounds_without_page_is_a_schema_error() {
        let el = Element {
            bounds: Some([1.0, 1.0, 2.0, 2.0]),
            ..Default::default()
        };
        let err = normalize(
            Document::new(vec![el]),
            &[page(0, 1.0, 1.0)],
            &NormalizeOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DeckError::Schema(_)));
    }

    #[test]
    fn empty_char_bounds_add_nothing() {
        let mut el = boxed(1, [100.0, 200.0, 300.0, 400.0]);
        el.char_bounds = Some(Vec::new());
        let doc = Document::new(vec![el]);

        let out = normalize(doc, &[page(0, 500.0, 1000.0)], &NormalizeOptions::default()).unwrap();
        assert!(out.elements[0].percentile_bounds.is_some());
        assert_eq!(out.elements[0].percentile_char_bounds, None);
    }

    #[test]
    fn empty_bounds_are_skipped() {
        let json = br#"{"elements":[{"Page":7,"Bounds":[],"Text":"Team"},{"Page":1,"Bounds":[0,0,5,5]}]}"#;
        let doc = Document::from_slice(json).unwrap();
        let out = normalize(doc, &[page(0, 10.0, 10.0)], &NormalizeOptions::default()).unwrap();
        assert_eq!(out.elements[0].percentile_bounds, None);
        assert!(out.elements[1].percentile_bounds.is_some());
    }

    #[test]
    fn unrelated_attributes_survive() {
        let json = br#"{"elements":[{"Page":1,"Bounds":[0,0,10,10],"Font":{"family_name":"Inter"},"Path":"//Document/P"}]}"#;
        let doc = Document::from_slice(json).unwrap();
        let out = normalize(doc, &[page(0, 10.0, 10.0)], &NormalizeOptions::default()).unwrap();
        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["elements"][0]["Font"]["family_name"], "Inter");
        assert!(v["elements"][0]["PercentileBounds"].is_object());
    }
}
