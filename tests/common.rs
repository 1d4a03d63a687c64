#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, ((x + y) % 256) as u8])
    })
}

/// Writes a real, decodable image of `format` at `dir/name`.
pub fn write_image(dir: &Path, name: &str, format: ImageFormat) -> PathBuf {
    let path = dir.join(name);
    let img = match format {
        ImageFormat::Gif => DynamicImage::ImageRgba8(RgbaImage::from_fn(48, 48, |x, y| {
            Rgba([(x * 5) as u8, (y * 5) as u8, 200, 255])
        })),
        _ => DynamicImage::ImageRgb8(gradient(64, 48)),
    };
    img.save_with_format(&path, format).unwrap();
    path
}

/// One file for every locally supported format, plus a text file.
pub fn create_test_image_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = vec![
        write_image(dir, "photo.jpg", ImageFormat::Jpeg),
        write_image(dir, "diagram.png", ImageFormat::Png),
        write_image(dir, "scan.bmp", ImageFormat::Bmp),
        write_image(dir, "print.tiff", ImageFormat::Tiff),
        write_image(dir, "anim.gif", ImageFormat::Gif),
    ];

    let txt_file = dir.join("notes.txt");
    File::create(&txt_file)
        .unwrap()
        .write_all(b"not an image")
        .unwrap();
    files.push(txt_file);

    files
}

pub fn create_corrupt_image(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    File::create(&path)
        .unwrap()
        .write_all(b"this is not image data")
        .unwrap();
    path
}

pub fn create_nested_directory_structure(dir: &Path) -> PathBuf {
    let subdir = dir.join("subdir");
    fs::create_dir(&subdir).unwrap();
    write_image(&subdir, "nested.png", ImageFormat::Png);
    subdir
}

pub fn create_temp_directory() -> TempDir {
    TempDir::new().unwrap()
}

pub fn is_empty_dir(dir: &Path) -> bool {
    fs::read_dir(dir).unwrap().next().is_none()
}
