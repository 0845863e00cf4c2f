//! Loader tests against synthesized files.

use super::*;
use crate::error::RenderError;
use std::io::Write;

fn write_tiff16(path: &std::path::Path, width: u32, height: u32, value: u16) {
    let file = std::fs::File::create(path).unwrap();
    let mut encoder = ::tiff::encoder::TiffEncoder::new(std::io::BufWriter::new(file)).unwrap();
    let data = vec![value; (width * height * 3) as usize];
    encoder
        .write_image::<::tiff::encoder::colortype::RGB16>(width, height, &data)
        .unwrap();
}

#[test]
fn test_tiff16_round_trip_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.tif");
    write_tiff16(&path, 8, 6, 32768);

    let loader = FileLoader;
    assert!(loader.supports(&path));
    let loaded = loader.load(&path).unwrap();
    assert_eq!(loaded.buffer.width, 8);
    assert_eq!(loaded.buffer.height, 6);
    let expected = 32768.0 / 65535.0;
    for &v in &loaded.buffer.data {
        assert!((v - expected).abs() < 1e-6);
    }
}

#[test]
fn test_unsupported_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.xyz");
    std::fs::write(&path, b"junk").unwrap();

    let loader = FileLoader;
    assert!(!loader.supports(&path));
    match loader.load(&path) {
        Err(RenderError::LoaderUnsupported(_)) => {}
        other => panic!("expected LoaderUnsupported, got {:?}", other.err()),
    }
}

#[test]
fn test_missing_file_is_path_not_found() {
    let loader = FileLoader;
    match loader.load(std::path::Path::new("/no/such/scan.tif")) {
        Err(RenderError::PathNotFound(_)) => {}
        other => panic!("expected PathNotFound, got {:?}", other.err()),
    }
}

#[test]
fn test_corrupt_tiff() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.tif");
    std::fs::write(&path, b"II*\0garbagegarbage").unwrap();

    let loader = FileLoader;
    match loader.load(&path) {
        Err(RenderError::LoaderCorrupt(_)) => {}
        other => panic!("expected LoaderCorrupt, got {:?}", other.err()),
    }
}

#[test]
fn test_planar_10bit_with_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.npx");
    std::fs::write(
        dir.path().join("scan.npx.json"),
        r#"{"width": 2, "height": 2, "bits": 10}"#,
    )
    .unwrap();

    // Four pixels, value 512 of 1023 on every channel, big-endian.
    let mut file = std::fs::File::create(&path).unwrap();
    for _ in 0..(2 * 2 * 3) {
        file.write_all(&512u16.to_be_bytes()).unwrap();
    }
    drop(file);

    let loaded = FileLoader.load(&path).unwrap();
    assert_eq!(loaded.buffer.width, 2);
    for &v in &loaded.buffer.data {
        assert!((v - 512.0 / 1023.0).abs() < 1e-6);
    }
}

#[test]
fn test_planar_missing_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.npx");
    std::fs::write(&path, [0u8; 24]).unwrap();

    match FileLoader.load(&path) {
        Err(RenderError::LoaderUnsupported(msg)) => assert!(msg.contains("sidecar")),
        other => panic!("expected LoaderUnsupported, got {:?}", other.err()),
    }
}

#[test]
fn test_planar_truncated_payload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.npx");
    std::fs::write(
        dir.path().join("scan.npx.json"),
        r#"{"width": 4, "height": 4, "bits": 14}"#,
    )
    .unwrap();
    std::fs::write(&path, [0u8; 10]).unwrap();

    match FileLoader.load(&path) {
        Err(RenderError::LoaderCorrupt(_)) => {}
        other => panic!("expected LoaderCorrupt, got {:?}", other.err()),
    }
}
