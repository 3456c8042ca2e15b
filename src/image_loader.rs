use base64::Engine;
use std::io::Cursor;

/// Resolves `<image>` references to encoded bytes.
pub trait ImageLoader: Send + Sync + std::fmt::Debug {
    fn load(&self, href: &str) -> Result<Vec<u8>, String>;
}

/// Handles `data:` URIs only; every other reference fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataUriLoader;

impl ImageLoader for DataUriLoader {
    fn load(&self, href: &str) -> Result<Vec<u8>, String> {
        decode_data_uri(href)
    }
}

pub fn decode_data_uri(href: &str) -> Result<Vec<u8>, String> {
    let href = href.trim();
    let Some(rest) = href.strip_prefix("data:") else {
        return Err(format!("cannot load external image '{href}'"));
    };
    let Some((meta, payload)) = rest.split_once(',') else {
        return Err("malformed data URI".to_string());
    };
    if meta.ends_with(";base64") {
        let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|err| format!("invalid base64 image data: {err}"))
    } else {
        Ok(percent_decode(payload))
    }
}

fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
            if let Ok(value) = u8::from_str_radix(hex, 16) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

/// Decoded image ready for the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ImageData {
    /// Reads the natural size from the encoded header without decoding pixels.
    pub fn probe(bytes: Vec<u8>) -> Result<ImageData, String> {
        let (width, height) = image::ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|err| format!("unreadable image: {err}"))?
            .into_dimensions()
            .map_err(|err| format!("unsupported image: {err}"))?;
        Ok(ImageData {
            bytes,
            width,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageEncoder;
    use image::codecs::png::PngEncoder;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::new();
        let pixels = vec![255u8; (width * height * 4) as usize];
        PngEncoder::new(&mut out)
            .write_image(&pixels, width, height, image::ExtendedColorType::Rgba8)
            .expect("encode png");
        out
    }

    #[test]
    fn decodes_base64_data_uri() {
        let bytes = png(3, 2);
        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        );
        let loaded = DataUriLoader.load(&uri).expect("load");
        assert_eq!(loaded, bytes);
        let image = ImageData::probe(loaded).expect("probe");
        assert_eq!((image.width, image.height), (3, 2));
    }

    #[test]
    fn percent_encoded_and_external() {
        assert_eq!(decode_data_uri("data:text/plain,a%20b").expect("decode"), b"a b");
        assert!(DataUriLoader.load("http://example.com/a.png").is_err());
        assert!(ImageData::probe(vec![1, 2, 3]).is_err());
    }
}
