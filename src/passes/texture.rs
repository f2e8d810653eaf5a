use fast_image_resize::{PixelType, Resizer, images::Image};
use gltf::json::image::MimeType;
use image::{
    DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat,
    codecs::{jpeg::JpegEncoder, png::PngEncoder, webp::WebPEncoder},
};
use ktx2_rw::{BasisCompressionParams, Ktx2Texture, VkFormat};
use log::{debug, info, warn};
use serde_json::json;

use super::Transform;
use crate::{
    buffer,
    config::TextureFormat,
    document::Document,
    error::{Error, Result},
};

const BASISU: &str = "KHR_texture_basisu";
const KTX2_MAGIC: &[u8] = &[0xAB, b'K', b'T', b'X', b' ', b'2', b'0', 0xBB];

/// Shrinks embedded images whose longer edge exceeds `max_size`.
///
/// Resized images keep their encoding. When `format` asks for KTX2, every
/// embedded PNG, JPEG or WebP image also gets a KTX2 copy appended to
/// `images`, and the textures using it reference the copy through
/// `KHR_texture_basisu`. Existing image indices never change.
pub struct TextureResize {
    pub max_size: u32,
    pub format: TextureFormat,
}

impl Transform for TextureResize {
    fn name(&self) -> &'static str {
        "textureResize"
    }

    fn apply(&self, doc: &mut Document) -> Result<()> {
        let mut resized = 0;
        let mut converted = Vec::new();

        for i in 0..doc.root.images.len() {
            let img = &doc.root.images[i];
            let Some(view) = img.buffer_view else {
                debug!("image {i}: not embedded, skipping");
                continue;
            };
            if img.mime_type.as_ref().is_some_and(|m| m.0 == "image/ktx2") {
                continue;
            }
            let Some(data) = buffer::view_bytes(&doc.root, &doc.blob, view) else {
                warn!("image {i}: buffer view lies outside the buffer, skipping");
                continue;
            };
            if data.starts_with(KTX2_MAGIC) {
                continue;
            }

            let format = match image::guess_format(data) {
                Ok(f @ (ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP)) => f,
                Ok(f) => {
                    warn!("image {i}: {f:?} is not supported, skipping");
                    continue;
                }
                Err(e) => {
                    warn!("image {i}: {e}, skipping");
                    continue;
                }
            };
            let (width, height) = match imagesize::blob_size(data) {
                Ok(size) => (size.width as u32, size.height as u32),
                Err(e) => {
                    warn!("image {i}: could not read dimensions: {e}, skipping");
                    continue;
                }
            };

            let ktx2 = self.format == TextureFormat::Ktx2;
            let target = fit(width, height, self.max_size);
            if target.is_none() && !ktx2 {
                continue;
            }
            let (n_width, n_height) = target.unwrap_or((width, height));

            let fallback = match target {
                Some(_) => Some(resize(i, data, format, n_width, n_height)?),
                None => None,
            };
            let basis = if ktx2 {
                Some(resize_to_ktx2(i, data, n_width, n_height)?)
            } else {
                None
            };
            debug!("image {i}: {width}x{height} -> {n_width}x{n_height}");

            if let Some(bytes) = fallback {
                let n_view = buffer::push_view(&mut doc.root, &mut doc.blob, &bytes, None);
                let img = &mut doc.root.images[i];
                img.buffer_view = Some(n_view);
                img.mime_type = Some(MimeType(mime_for(format).to_string()));
                resized += 1;
            }
            if let Some(bytes) = basis {
                let n_view = buffer::push_view(&mut doc.root, &mut doc.blob, &bytes, None);
                let mut img = doc.root.images[i].clone();
                img.buffer_view = Some(n_view);
                img.mime_type = Some(MimeType("image/ktx2".to_string()));
                img.uri = None;
                let n_image = doc.root.push(img);
                converted.push((i, n_image.value()));
            }
        }

        if !converted.is_empty() {
            tag_basisu(doc, &converted);
        }
        if resized > 0 || !converted.is_empty() {
            info!(
                "textureResize: resized {resized} images, converted {} to ktx2",
                converted.len()
            );
        }
        Ok(())
    }
}

/// Dimensions that fit inside `max` x `max` with the aspect ratio kept, or
/// `None` when the image already fits.
fn fit(width: u32, height: u32, max: u32) -> Option<(u32, u32)> {
    if max == 0 || (width <= max && height <= max) {
        return None;
    }
    let scale = max as f64 / width.max(height) as f64;
    let scaled = |v: u32| ((v as f64 * scale).round() as u32).clamp(1, max);
    Some((scaled(width), scaled(height)))
}

fn mime_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::WebP => "image/webp",
        _ => "image/png",
    }
}

/// Adds `KHR_texture_basisu` to every texture sampling a converted image.
/// `texture.source` keeps pointing at the original as the fallback for
/// viewers without Basis support, so the extension is only used, not
/// required.
fn tag_basisu(doc: &mut Document, converted: &[(usize, usize)]) {
    for t in 0..doc.root.textures.len() {
        let source = doc.root.textures[t].source.value();
        if let Some(&(_, ktx2)) = converted.iter().find(|(fallback, _)| *fallback == source) {
            doc.texture_extensions_mut(t)
                .insert(BASISU.into(), json!({ "source": ktx2 }));
        }
    }
}

fn decode(index: usize, data: &[u8], format: ImageFormat) -> Result<DynamicImage> {
    image::load_from_memory_with_format(data, format).map_err(|source| Error::Image { index, source })
}

fn resize_pixels(
    index: usize,
    pixels: Vec<u8>,
    (width, height): (u32, u32),
    (n_width, n_height): (u32, u32),
    pixel_type: PixelType,
) -> Result<Vec<u8>> {
    let fail = |reason: String| Error::Resize { index, reason };

    let src_img = Image::from_vec_u8(width, height, pixels, pixel_type).map_err(|e| fail(e.to_string()))?;
    let mut dst_img = Image::new(n_width, n_height, pixel_type);

    let mut resizer = Resizer::new();
    resizer
        .resize(&src_img, &mut dst_img, None)
        .map_err(|e| fail(e.to_string()))?;

    Ok(dst_img.into_vec())
}

/// Resizes and re-encodes in the source format. WebP is written lossless.
fn resize(index: usize, data: &[u8], format: ImageFormat, width: u32, height: u32) -> Result<Vec<u8>> {
    let img = decode(index, data, format)?;
    let alpha = img.color().has_alpha() && format != ImageFormat::Jpeg;

    let (pixels, pixel_type, color) = if alpha {
        (img.to_rgba8().into_raw(), PixelType::U8x4, ExtendedColorType::Rgba8)
    } else {
        (img.to_rgb8().into_raw(), PixelType::U8x3, ExtendedColorType::Rgb8)
    };
    let resized = resize_pixels(index, pixels, (img.width(), img.height()), (width, height), pixel_type)?;

    let mut buf = Vec::new();
    let written = match format {
        ImageFormat::Jpeg => JpegEncoder::new(&mut buf).write_image(&resized, width, height, color),
        ImageFormat::WebP => WebPEncoder::new_lossless(&mut buf).write_image(&resized, width, height, color),
        _ => PngEncoder::new(&mut buf).write_image(&resized, width, height, color),
    };
    written.map_err(|source| Error::Image { index, source })?;

    Ok(buf)
}

/// Resizes and converts to KTX2 with Basis Universal (ETC1S) compression.
fn resize_to_ktx2(index: usize, data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let fail = |reason: String| Error::Ktx2 { index, reason };

    let img = image::load_from_memory(data).map_err(|source| Error::Image { index, source })?;
    let rgba = resize_pixels(
        index,
        img.to_rgba8().into_raw(),
        (img.width(), img.height()),
        (width, height),
        PixelType::U8x4, // Always RGBA8
    )?;

    let mut ktx2_tex = Ktx2Texture::create(width, height, 1, 1, 1, 1, VkFormat::R8G8B8A8Unorm).map_err(|e| fail(e.to_string()))?;
    ktx2_tex
        .set_image_data(0, 0, 0, &rgba)
        .map_err(|e| fail(e.to_string()))?;
    ktx2_tex
        .set_metadata("Tool", b"vrm_opt")
        .map_err(|e| fail(e.to_string()))?;
    ktx2_tex
        .set_metadata("Dimensions", format!("{width}x{height}").as_bytes())
        .map_err(|e| fail(e.to_string()))?;

    let etc1s_params = BasisCompressionParams::builder()
        .uastc(false)
        .thread_count(num_cpus::get() as u32)
        .quality_level(224)
        .endpoint_rdo_threshold(1.25)
        .selector_rdo_threshold(1.25)
        .build();
    ktx2_tex
        .compress_basis(&etc1s_params)
        .map_err(|e| fail(e.to_string()))?;
    ktx2_tex
        .set_metadata("CompressionMode", b"ETC1S")
        .map_err(|e| fail(e.to_string()))?;

    ktx2_tex.write_to_memory().map_err(|e| fail(e.to_string()))
}
