use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;

use pdfkb_core::error::Error;
use pdfkb_extract::{Extractor, FakeCaptioner, TableStore};

const IMAGE_W: i64 = 64;
const IMAGE_H: i64 = 48;

#[derive(Default)]
struct PageLayout<'a> {
    lines: &'a [&'a str],
    /// Two-column rows drawn below the lines at x = 72 and x = 300.
    table: &'a [[&'a str; 2]],
    /// Draw a light gray RGB image.
    image: bool,
}

fn show(operations: &mut Vec<Operation>, x: i64, y: i64, text: &str) {
    operations.push(Operation::new("BT", vec![]));
    operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
    operations.push(Operation::new("Td", vec![x.into(), y.into()]));
    operations.push(Operation::new("Tj", vec![Object::string_literal(text)]));
    operations.push(Operation::new("ET", vec![]));
}

/// Single-page Courier document. Resources live on the page tree node so
/// pages have to inherit them.
fn write_pdf(path: &Path, layout: PageLayout) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => IMAGE_W,
            "Height" => IMAGE_H,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        vec![220u8; (IMAGE_W * IMAGE_H * 3) as usize],
    ));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
        "XObject" => dictionary! { "Im1" => image_id },
    });

    let mut operations = Vec::new();
    let mut y = 720;
    for line in layout.lines {
        show(&mut operations, 72, y, line);
        y -= 20;
    }
    for [left, right] in layout.table {
        show(&mut operations, 72, y, left);
        show(&mut operations, 300, y, right);
        y -= 16;
    }
    if layout.image {
        operations.push(Operation::new("q", vec![]));
        operations.push(Operation::new("cm", vec![IMAGE_W.into(), 0.into(), 0.into(), IMAGE_H.into(), 100.into(), 300.into()]));
        operations.push(Operation::new("Do", vec!["Im1".into()]));
        operations.push(Operation::new("Q", vec![]));
    }
    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

const CROPS: [[&str; 2]; 3] = [["Crop", "Days"], ["Kale", "55"], ["Beans", "60"]];

#[test]
fn extracts_text_and_page_count() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manual.pdf");
    write_pdf(&path, PageLayout { lines: &["Rainwater Harvesting", "Clean the gutters each spring"], ..PageLayout::default() });

    let doc = Extractor::text_only().extract(&path).unwrap();
    assert_eq!(doc.page_count, 1);
    assert!(doc.text.contains("Rainwater"), "got {:?}", doc.text);
    assert!(doc.text.contains("gutters"));
    assert!(doc.tables.is_empty());
    assert!(doc.image_captions.is_empty());
}

#[test]
fn tables_become_markers_and_stored_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("planting.pdf");
    write_pdf(&path, PageLayout { lines: &["Planting calendar"], table: &CROPS, ..PageLayout::default() });

    let store = TableStore::new(dir.path().join("tables.json"));
    let extractor = Extractor::new(None, 32, Some(store.clone()));
    let doc = extractor.extract(&path).unwrap();
    assert!(doc.text.contains("\n[TABLE_EXTRACTED_PAGE_1_ID_0]\n"), "got {:?}", doc.text);
    assert_eq!(doc.tables.len(), 1);
    assert_eq!(doc.tables[0].rows, vec![vec!["Crop", "Days"], vec!["Kale", "55"], vec!["Beans", "60"]]);

    assert_eq!(extractor.save_tables("planting.pdf", &doc).unwrap(), 1);
    let records = store.load().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!((records[0].page, records[0].table_index), (1, 0));
    assert_eq!(records[0].data[2], vec!["Beans", "60"]);
}

#[test]
fn text_only_extraction_has_no_markers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("planting.pdf");
    write_pdf(&path, PageLayout { lines: &["Planting calendar"], table: &CROPS, image: true });

    let doc = Extractor::text_only().extract(&path).unwrap();
    assert!(!doc.text.contains("[TABLE_EXTRACTED"));
    assert!(!doc.text.contains("[IMAGE_DESC:"));
    assert_eq!(Extractor::text_only().save_tables("planting.pdf", &doc).unwrap(), 0);
}

#[test]
fn images_are_described_after_the_text() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("barn.pdf");
    write_pdf(&path, PageLayout { lines: &["The red barn"], image: true, ..PageLayout::default() });

    let extractor = Extractor::new(Some(Box::new(FakeCaptioner)), 32, None);
    let doc = extractor.extract(&path).unwrap();
    assert_eq!(doc.image_captions, vec!["a light image of 64x48 pixels".to_string()]);
    let body = doc.text.find("barn").expect("body text");
    let caption = doc.text.find("\n[IMAGE_DESC: a light image of 64x48 pixels]\n").expect("caption line");
    assert!(body < caption);
}

#[test]
fn small_images_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("barn.pdf");
    write_pdf(&path, PageLayout { lines: &["The red barn"], image: true, ..PageLayout::default() });

    let extractor = Extractor::new(Some(Box::new(FakeCaptioner)), 49, None);
    let doc = extractor.extract(&path).unwrap();
    assert!(doc.image_captions.is_empty());
}

#[test]
fn captions_alone_make_a_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.pdf");
    write_pdf(&path, PageLayout { image: true, ..PageLayout::default() });

    assert!(matches!(Extractor::text_only().extract(&path), Err(Error::EmptyDocument(_))));
    let doc = Extractor::new(Some(Box::new(FakeCaptioner)), 32, None).extract(&path).unwrap();
    assert!(doc.text.trim().starts_with("[IMAGE_DESC:"));
}

#[test]
fn page_without_text_is_empty_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blank.pdf");
    write_pdf(&path, PageLayout::default());

    match Extractor::text_only().extract(&path) {
        Err(Error::EmptyDocument(name)) => assert!(name.ends_with("blank.pdf")),
        other => panic!("expected EmptyDocument, got {:?}", other),
    }
}

#[test]
fn non_pdf_is_extraction_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.pdf");
    std::fs::write(&path, "just some plain text").unwrap();
    assert!(matches!(Extractor::text_only().extract(&path), Err(Error::Extraction { .. })));
}

#[test]
fn missing_file_is_not_found() {
    match Extractor::text_only().extract(Path::new("/definitely/not/here.pdf")) {
        Err(Error::NotFound(name)) => assert!(name.ends_with("here.pdf")),
        other => panic!("expected NotFound, got {:?}", other),
    }
}
