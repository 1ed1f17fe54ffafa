use super::*;

fn decode(bytes: &[u8]) -> image::RgbaImage {
    image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
        .expect("encoder output must decode")
        .to_rgba8()
}

#[test]
fn test_crc32_reference_vectors() {
    assert_eq!(crc32(b""), 0x0000_0000);
    assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    assert_eq!(crc32(b"IEND"), 0xAE42_6082);

    let mut streaming = Crc32::new();
    streaming.update(b"1234");
    streaming.update(b"56789");
    assert_eq!(streaming.finish(), 0xCBF4_3926);
}

#[test]
fn test_adler32_reference_vector() {
    assert_eq!(png::adler32(b"Wikipedia"), 0x11E6_0398);
    assert_eq!(png::adler32(b""), 1);
}

#[test]
fn test_png_header_layout() {
    let bytes = encode_rgba(&[0xFF00_00FF; 4], 2, 2, 2).unwrap();
    assert_eq!(&bytes[0..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    assert_eq!(&bytes[12..16], b"IHDR");
    assert_eq!(&bytes[16..20], &2u32.to_be_bytes());
    assert_eq!(&bytes[20..24], &2u32.to_be_bytes());
    assert_eq!(bytes[24], 8);
    assert_eq!(bytes[25], 6);
    assert_eq!(&bytes[bytes.len() - 8..bytes.len() - 4], b"IEND");
}

#[test]
fn test_round_trip_preserves_every_channel() {
    let (w, h) = (13u32, 7u32);
    let mut pixels = Vec::with_capacity((w * h) as usize);
    for y in 0..h {
        for x in 0..w {
            let a = ((x * 37 + y * 11) & 0xFF) as u32;
            let r = (x * 19) & 0xFF;
            let g = (y * 29) & 0xFF;
            let b = (x ^ y) * 7 & 0xFF;
            pixels.push(a << 24 | r << 16 | g << 8 | b);
        }
    }
    // a fully transparent pixel with non-zero color must keep its color bytes
    pixels[0] = 0x0012_3456;

    let img = decode(&encode_rgba(&pixels, w, h, w).unwrap());
    assert_eq!(img.dimensions(), (w, h));
    for y in 0..h {
        for x in 0..w {
            let p = img.get_pixel(x, y).0;
            let argb = (p[3] as u32) << 24 | (p[0] as u32) << 16 | (p[1] as u32) << 8 | p[2] as u32;
            assert_eq!(argb, pixels[(y * w + x) as usize], "pixel ({}, {})", x, y);
        }
    }
}

#[test]
fn test_pitch_skips_padding_columns() {
    // 2x2 image stored in a 3-wide buffer; the padding column must not leak
    let pixels = [0xFF11_1111, 0xFF22_2222, 0xDEAD_BEEF, 0xFF33_3333, 0xFF44_4444, 0xDEAD_BEEF];
    let img = decode(&encode_rgba(&pixels, 2, 2, 3).unwrap());
    assert_eq!(img.get_pixel(1, 0).0, [0x22, 0x22, 0x22, 0xFF]);
    assert_eq!(img.get_pixel(0, 1).0, [0x33, 0x33, 0x33, 0xFF]);
}

#[test]
fn test_large_image_spans_multiple_stored_blocks() {
    // 200x100 RGBA rows = 80_100 bytes, more than one 65_535-byte block
    let (w, h) = (200u32, 100u32);
    let pixels: Vec<u32> = (0..w * h).map(|i| 0x8000_0000 | i).collect();
    let img = decode(&encode_rgba(&pixels, w, h, w).unwrap());
    let last = img.get_pixel(w - 1, h - 1).0;
    let expect = pixels[(w * h - 1) as usize];
    assert_eq!(last, [(expect >> 16) as u8, (expect >> 8) as u8, expect as u8, 0x80]);
}

#[test]
fn test_rejects_bad_geometry() {
    assert!(encode_rgba(&[], 0, 4, 0).is_err());
    assert!(encode_rgba(&[0; 4], 4, 1, 2).is_err());
    assert!(encode_rgba(&[0; 7], 4, 2, 4).is_err());
}

#[test]
fn test_color15_expansion() {
    assert_eq!(color15_to_argb(0x0000), 0xFF00_0000);
    assert_eq!(color15_to_argb(0x7FFF), 0xFFFF_FFFF);
    // pure red lives in the low five bits
    assert_eq!(color15_to_argb(0x001F), 0xFFFF_0000);
    assert_eq!(color15_to_argb(0x7C00), 0xFF00_00FF);
    assert_eq!(rgb_to_color15(0xFF, 0x00, 0x00), 0x001F);
    assert_eq!(rgb_to_color15(0x08, 0x10, 0x18), 1 | 2 << 5 | 3 << 10);
}

#[test]
fn test_fs_art_store_reads_written_png() {
    let dir = std::env::temp_dir().join(format!("hdpack-art-{}-{}", std::process::id(), line!()));
    let pixels = vec![0xFF10_2030u32; 16 * 16];
    write_png(&dir.join("BG1_C0001.png"), &pixels, 16, 16, 16).unwrap();

    let store = FsArtStore::new(&dir);
    assert!(store.exists("BG1_C0001.png"));
    assert!(!store.exists("BG1_C0002.png"));
    let img = store.load("BG1_C0001.png").unwrap();
    assert_eq!(img.get_pixel(5, 5).0, [0x10, 0x20, 0x30, 0xFF]);
    assert!(store.load("BG1_C0002.png").is_err());

    let _ = std::fs::remove_dir_all(&dir);
}
