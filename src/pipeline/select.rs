//! Page selection: cut the deck down to a head or tail window of pages.
//!
//! lopdf parses and rewrites the whole object graph synchronously, so both
//! entry points run on the blocking pool.
//!
//! Page sizes are read back from the *written* file rather than the source so
//! that the recorded indices are the indices the extraction service will see.

use crate::error::DeckError;
use crate::model::PageSize;
use lopdf::{Document, Object, ObjectId};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Which pages to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub max_pages: usize,
    /// Keep the last `max_pages` pages instead of the first.
    pub tail: bool,
}

impl PageWindow {
    pub fn head(max_pages: usize) -> Self {
        Self {
            max_pages,
            tail: false,
        }
    }

    pub fn tail(max_pages: usize) -> Self {
        Self {
            max_pages,
            tail: true,
        }
    }

    /// 0-based source indices kept by this window, ascending.
    ///
    /// A window larger than the document keeps every page.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let n = self.max_pages.min(total_pages);
        if self.tail {
            (total_pages - n..total_pages).collect()
        } else {
            (0..n).collect()
        }
    }
}

/// Result of page selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// The page-limited PDF.
    pub output_path: PathBuf,
    /// One entry per kept page, in order, indexed relative to the new file.
    pub page_sizes: Vec<PageSize>,
    /// Page count of the source document.
    pub source_pages: usize,
}

/// Write the pages selected by `window` from `input` to `output`.
pub async fn select_pages(
    input: &Path,
    output: &Path,
    window: PageWindow,
) -> Result<Selection, DeckError> {
    let input = input.to_path_buf();
    let output = output.to_path_buf();

    tokio::task::spawn_blocking(move || select_pages_blocking(&input, &output, window))
        .await
        .map_err(|e| DeckError::Internal(format!("Page selection task panicked: {}", e)))?
}

/// Blocking implementation of page selection.
pub fn select_pages_blocking(
    input: &Path,
    output: &Path,
    window: PageWindow,
) -> Result<Selection, DeckError> {
    let mut document = load(input)?;

    let pages = document.get_pages();
    let source_pages = pages.len();
    let keep: BTreeSet<u32> = window
        .to_indices(source_pages)
        .into_iter()
        .map(|idx| idx as u32 + 1)
        .collect();
    let drop: Vec<u32> = pages.keys().copied().filter(|n| !keep.contains(n)).collect();

    info!(
        "PDF loaded: {} pages, keeping {} ({})",
        source_pages,
        keep.len(),
        if window.tail { "tail" } else { "head" }
    );

    if !drop.is_empty() {
        document.delete_pages(&drop);
        document.prune_objects();
    }

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DeckError::OutputWriteFailed {
            path: output.to_path_buf(),
            source: e,
        })?;
    }
    document
        .save(output)
        .map_err(|e| DeckError::OutputWriteFailed {
            path: output.to_path_buf(),
            source: e,
        })?;
    debug!("Wrote page-limited PDF to {}", output.display());

    let written = load(output)?;
    let page_sizes = page_sizes(&written, output)?;

    Ok(Selection {
        output_path: output.to_path_buf(),
        page_sizes,
        source_pages,
    })
}

/// Page sizes of every page of the PDF at `path`, without writing anything.
pub async fn inspect_pages(path: &Path) -> Result<Vec<PageSize>, DeckError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let document = load(&path)?;
        page_sizes(&document, &path)
    })
    .await
    .map_err(|e| DeckError::Internal(format!("Inspect task panicked: {}", e)))?
}

fn load(path: &Path) -> Result<Document, DeckError> {
    Document::load(path).map_err(|e| DeckError::CorruptPdf {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Read each page's MediaBox, rounded to whole units.
fn page_sizes(document: &Document, path: &Path) -> Result<Vec<PageSize>, DeckError> {
    document
        .get_pages()
        .values()
        .enumerate()
        .map(|(page_index, &page_id)| {
            let (width, height) = media_box_size(document, page_id).map_err(|detail| {
                DeckError::InvalidPageBox {
                    path: path.to_path_buf(),
                    page: page_index + 1,
                    detail,
                }
            })?;
            Ok(PageSize {
                page_index,
                width,
                height,
            })
        })
        .collect()
}

fn media_box_size(document: &Document, page_id: ObjectId) -> Result<(f64, f64), String> {
    let media_box = resolve_inherited(document, page_id, b"MediaBox")?
        .ok_or_else(|| "MediaBox not found on page or ancestors".to_string())?;
    let array = deref(document, media_box)
        .as_array()
        .map_err(|e| format!("MediaBox is not an array: {e}"))?;
    if array.len() != 4 {
        return Err(format!("MediaBox has {} entries, expected 4", array.len()));
    }

    let mut coords = [0f64; 4];
    for (slot, obj) in coords.iter_mut().zip(array) {
        *slot = deref(document, obj)
            .as_float()
            .map_err(|e| format!("MediaBox entry is not a number: {e}"))? as f64;
    }

    let width = (coords[2] - coords[0]).abs().round();
    let height = (coords[3] - coords[1]).abs().round();
    if width <= 0.0 || height <= 0.0 {
        return Err(format!("degenerate MediaBox {:?}", coords));
    }
    Ok((width, height))
}

/// Look up `key` on the page, then on each `/Parent` up the page tree.
fn resolve_inherited<'a>(
    document: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<&'a Object>, String> {
    let mut current_id = page_id;
    let mut visited = BTreeSet::new();
    loop {
        if !visited.insert(current_id) {
            return Err(format!(
                "cyclic /Parent chain at object {} {}",
                current_id.0, current_id.1
            ));
        }
        let dict = document
            .get_object(current_id)
            .and_then(|o| o.as_dict())
            .map_err(|e| format!("failed to get page dictionary: {e}"))?;

        if let Ok(value) = dict.get(key) {
            return Ok(Some(value));
        }

        match dict.get(b"Parent") {
            Ok(parent) => {
                current_id = parent
                    .as_reference()
                    .map_err(|e| format!("invalid /Parent reference: {e}"))?;
            }
            Err(_) => return Ok(None),
        }
    }
}

fn deref<'a>(document: &'a Document, obj: &'a Object) -> &'a Object {
    match obj.as_reference() {
        Ok(id) => document.get_object(id).unwrap_or(obj),
        Err(_) => obj,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::dictionary;

    /// A PDF whose page `i` is `600 + i` units wide, so order is observable.
    pub(crate) fn write_test_pdf(path: &Path, page_count: usize) {
        let mut doc = Document::with_version("1.5");
        let pages_id: ObjectId = doc.new_object_id();

        let mut kids: Vec<Object> = Vec::new();
        for i in 0..page_count {
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), (600 + i as i64).into(), 800.into()],
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).expect("failed to save test PDF");
    }

    fn widths(selection: &Selection) -> Vec<f64> {
        selection.page_sizes.iter().map(|p| p.width).collect()
    }

    #[test]
    fn window_indices() {
        assert_eq!(PageWindow::head(3).to_indices(10), vec![0, 1, 2]);
        assert_eq!(PageWindow::tail(3).to_indices(10), vec![7, 8, 9]);
        assert_eq!(PageWindow::head(20).to_indices(4), vec![0, 1, 2, 3]);
        assert_eq!(PageWindow::tail(20).to_indices(4), vec![0, 1, 2, 3]);
        assert_eq!(PageWindow::head(5).to_indices(0), Vec::<usize>::new());
    }

    #[test]
    fn head_selection_keeps_first_pages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("deck.pdf");
        write_test_pdf(&src, 10);

        let out = dir.path().join("out/deck.pdf");
        let selection = select_pages_blocking(&src, &out, PageWindow::head(5)).unwrap();

        assert_eq!(selection.source_pages, 10);
        assert_eq!(selection.page_sizes.len(), 5);
        assert_eq!(widths(&selection), vec![600.0, 601.0, 602.0, 603.0, 604.0]);
        let indices: Vec<usize> = selection.page_sizes.iter().map(|p| p.page_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert!(out.exists());
    }

    #[test]
    fn reselection_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("deck.pdf");
        write_test_pdf(&src, 10);
        let out = dir.path().join("deck-limited.pdf");

        let first = select_pages_blocking(&src, &out, PageWindow::head(5)).unwrap();
        let second = select_pages_blocking(&src, &out, PageWindow::head(5)).unwrap();
        assert_eq!(first.page_sizes, second.page_sizes);
    }

    #[test]
    fn tail_selection_keeps_last_pages() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("deck.pdf");
        write_test_pdf(&src, 6);

        let out = dir.path().join("tail.pdf");
        let selection = select_pages_blocking(&src, &out, PageWindow::tail(2)).unwrap();
        assert_eq!(widths(&selection), vec![604.0, 605.0]);
        assert_eq!(selection.page_sizes[0].page_index, 0);
        assert_eq!(selection.page_sizes[1].height, 800.0);
    }

    #[test]
    fn overrun_keeps_every_page() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("short.pdf");
        write_test_pdf(&src, 3);

        let out = dir.path().join("short-out.pdf");
        let selection = select_pages_blocking(&src, &out, PageWindow::head(50)).unwrap();
        assert_eq!(selection.page_sizes.len(), 3);
    }

    #[test]
    fn inherited_fractional_media_box_is_rounded() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("inherit.pdf");

        let mut doc = Document::with_version("1.5");
        let pages_id: ObjectId = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::from(page_id)],
                "Count" => 1i64,
                "MediaBox" => vec![0.into(), 0.into(), Object::Real(595.6), Object::Real(841.9)],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(&src).unwrap();

        let out = dir.path().join("inherit-out.pdf");
        let selection = select_pages_blocking(&src, &out, PageWindow::head(1)).unwrap();
        assert_eq!(selection.page_sizes[0].width, 596.0);
        assert_eq!(selection.page_sizes[0].height, 842.0);
    }

    #[test]
    fn self_parented_page_is_invalid_page_box() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("cycle.pdf");

        let mut doc = Document::with_version("1.5");
        let pages_id: ObjectId = doc.new_object_id();
        let page_id: ObjectId = doc.new_object_id();
        doc.objects.insert(
            page_id,
            Object::Dictionary(dictionary! {
                "Type" => "Page",
                "Parent" => page_id,
            }),
        );
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::from(page_id)],
                "Count" => 1i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(&src).unwrap();

        let err = select_pages_blocking(&src, &dir.path().join("o.pdf"), PageWindow::head(1))
            .unwrap_err();
        match err {
            DeckError::InvalidPageBox { page, ref detail, .. } => {
                assert_eq!(page, 1);
                assert!(detail.contains("cyclic"), "detail: {detail}");
            }
            other => panic!("expected InvalidPageBox, got {other:?}"),
        }
    }

    #[test]
    fn garbage_input_is_corrupt_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("broken.pdf");
        std::fs::write(&src, b"%PDF-1.4\nthis is not a real pdf").unwrap();

        let err = select_pages_blocking(&src, &dir.path().join("o.pdf"), PageWindow::head(1))
            .unwrap_err();
        assert!(matches!(err, DeckError::CorruptPdf { .. }), "got: {err:?}");
        assert!(err.is_input_error());
    }

    #[tokio::test]
    async fn inspect_reports_all_pages() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("deck.pdf");
        write_test_pdf(&src, 4);

        let sizes = inspect_pages(&src).await.unwrap();
        assert_eq!(sizes.len(), 4);
        assert_eq!(sizes[3].width, 603.0);
    }
}
