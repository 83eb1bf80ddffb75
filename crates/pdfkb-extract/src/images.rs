use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

/// Page tree depth we are willing to walk when inheriting `Resources`.
const MAX_TREE_DEPTH: usize = 32;

#[derive(Debug, Clone)]
pub struct PageImage {
    pub name: String,
    pub image: DynamicImage,
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// `Resources` of a page, inherited from the nearest ancestor when absent.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_object(page_id).ok()?.as_dict().ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(resources) = node.get(b"Resources") {
            return resolve(doc, resources)?.as_dict().ok();
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_object(parent).ok()?.as_dict().ok()?;
    }
    None
}

/// Decodable image XObjects drawn on `page_id`, skipping anything whose
/// shorter side is below `min_side` (bullets, rules, spacer pixels).
pub fn page_images(doc: &Document, page_id: ObjectId, min_side: u32) -> Vec<PageImage> {
    let Some(xobjects) = page_resources(doc, page_id)
        .and_then(|r| r.get(b"XObject").ok())
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_dict().ok())
    else {
        return Vec::new();
    };

    let mut images = Vec::new();
    for (name, obj) in xobjects.iter() {
        let Some(Object::Stream(stream)) = resolve(doc, obj) else { continue };
        if name_of(&stream.dict, b"Subtype").as_deref() != Some(b"Image".as_slice()) { continue; }
        let name = String::from_utf8_lossy(name).into_owned();
        match decode_image(stream) {
            Some(image) if image.width().min(image.height()) >= min_side => images.push(PageImage { name, image }),
            Some(image) => debug!(name = %name, width = image.width(), height = image.height(), "image too small, skipped"),
            None => debug!(name = %name, "unsupported image encoding, skipped"),
        }
    }
    images
}

fn name_of(dict: &Dictionary, key: &[u8]) -> Option<Vec<u8>> {
    match dict.get(key) {
        Ok(Object::Name(n)) => Some(n.clone()),
        _ => None,
    }
}

fn integer_of(dict: &Dictionary, key: &[u8]) -> Option<i64> {
    match dict.get(key) {
        Ok(Object::Integer(i)) => Some(*i),
        _ => None,
    }
}

fn filters(dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter") {
        Ok(Object::Name(n)) => vec![n.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|o| match o {
                Object::Name(n) => Some(n.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// JPEG passthrough, or raw 8-bit gray/RGB samples (optionally Flate packed).
fn decode_image(stream: &Stream) -> Option<DynamicImage> {
    let filters = filters(&stream.dict);
    if filters.iter().any(|f| f.as_slice() == b"DCTDecode") {
        return image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg).ok();
    }
    if filters.iter().any(|f| f.as_slice() != b"FlateDecode") { return None; }

    let width = u32::try_from(integer_of(&stream.dict, b"Width")?).ok()?;
    let height = u32::try_from(integer_of(&stream.dict, b"Height")?).ok()?;
    if integer_of(&stream.dict, b"BitsPerComponent").unwrap_or(8) != 8 { return None; }

    let samples = if filters.is_empty() { stream.content.clone() } else { stream.decompressed_content().ok()? };
    let pixels = width as usize * height as usize;
    match name_of(&stream.dict, b"ColorSpace").as_deref() {
        Some(b"DeviceRGB") => RgbImage::from_raw(width, height, samples.get(..pixels * 3)?.to_vec()).map(DynamicImage::ImageRgb8),
        Some(b"DeviceGray") => GrayImage::from_raw(width, height, samples.get(..pixels)?.to_vec()).map(DynamicImage::ImageLuma8),
        _ => None,
    }
}
