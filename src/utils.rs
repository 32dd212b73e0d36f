//! Utility functions

use crate::error::{CziError, Result};
use num_traits::Zero;

/// Pixel sample stored little-endian on disk
pub trait Sample: Copy + Zero + 'static {
    const SIZE: usize;

    fn from_le_slice(bytes: &[u8]) -> Self;

    fn write_le(&self, out: &mut Vec<u8>);
}

macro_rules! impl_sample {
    ($($t:ty),*) => {
        $(
            impl Sample for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn from_le_slice(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(bytes);
                    <$t>::from_le_bytes(raw)
                }

                fn write_le(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_sample!(u8, u16, i32, f32, f64);

/// Convert little-endian raw bytes to typed samples
pub fn decode_samples<T: Sample>(bytes: &[u8]) -> Result<Vec<T>> {
    if bytes.len() % T::SIZE != 0 {
        return Err(CziError::InvalidFormat(format!(
            "{} bytes is not a whole number of {}-byte samples",
            bytes.len(),
            T::SIZE
        )));
    }
    Ok(bytes.chunks_exact(T::SIZE).map(T::from_le_slice).collect())
}

/// Convert typed samples to little-endian raw bytes
pub fn encode_samples<T: Sample>(data: &[T]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(data.len() * T::SIZE);
    for sample in data {
        sample.write_le(&mut bytes);
    }
    bytes
}

/// Format byte size in human-readable form
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Make a name usable as a single path component
pub fn sanitize_file_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_conversion() {
        let data: Vec<u16> = vec![1, 256, 65535];
        let bytes = encode_samples(&data);
        assert_eq!(bytes, vec![1, 0, 0, 1, 255, 255]);

        let recovered: Vec<u16> = decode_samples(&bytes).unwrap();
        assert_eq!(data, recovered);

        let floats: Vec<f32> = decode_samples(&encode_samples(&[1.5f32, -2.0])).unwrap();
        assert_eq!(floats, vec![1.5, -2.0]);
    }

    #[test]
    fn test_misaligned_samples() {
        assert!(decode_samples::<u16>(&[1, 2, 3]).is_err());
        assert!(decode_samples::<f64>(&[0; 12]).is_err());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_sanitize_file_component() {
        assert_eq!(sanitize_file_component("AF488-T2"), "AF488-T2");
        assert_eq!(sanitize_file_component("EGFP/mCherry"), "EGFP_mCherry");
        assert_eq!(sanitize_file_component(".."), "_");
        assert_eq!(sanitize_file_component(""), "_");
    }
}
