//! Synthetic image fixtures

use image::{DynamicImage, GrayImage, ImageOutputFormat};
use std::io::Cursor;

pub fn encode_png(image: GrayImage) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(image)
        .write_to(&mut buffer, ImageOutputFormat::Png)
        .expect("PNG encoding of a test image");
    buffer.into_inner()
}

/// Uniform gray PNG
pub fn gray_png(width: u32, height: u32, value: u8) -> Vec<u8> {
    encode_png(GrayImage::from_pixel(width, height, image::Luma([value])))
}

/// Frontal face caricature: light skin, dark eyes and mouth
pub fn synthetic_face_png(size: u32) -> Vec<u8> {
    let s = size as f32;
    encode_png(GrayImage::from_fn(size, size, |x, y| {
        let (fx, fy) = (x as f32 / s, y as f32 / s);
        let inside = |x0: f32, x1: f32, y0: f32, y1: f32| fx >= x0 && fx < x1 && fy >= y0 && fy < y1;
        if inside(0.16, 0.40, 0.27, 0.44) || inside(0.60, 0.84, 0.27, 0.44) {
            image::Luma([30])
        } else if inside(0.35, 0.65, 0.76, 0.84) {
            image::Luma([60])
        } else {
            image::Luma([185])
        }
    }))
}
