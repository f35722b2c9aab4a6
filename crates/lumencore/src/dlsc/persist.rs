//! Persistent cache file for a built [`super::DirectLightSamplingCache`]:
//! `{magic, version}` header from [`crate::persist`] followed by a
//! `bincode`-free manual little-endian encoding of the entry list, so the
//! format stays stable across `Distribution1D`'s internal representation.
//!
//! A write failure during [`safe_save`] is reported as `false`, not a
//! [`crate::error::RenderError`]: a render session that can't refresh its
//! cache file should keep running on the cache already in memory rather
//! than abort, so the previous on-disk file is left untouched on failure.

use crate::distribution::Distribution1D;
use crate::math::Vec3;
use crate::persist::{atomic_write, FormatHeader, DLSC_MAGIC, DLSC_VERSION};
use std::io::{Read, Write};
use std::path::Path;

/// The plain-data form of a cache entry, independent of the live
/// [`super::DlscEntry`] (which borrows nothing and has no stable layout of
/// its own) so the on-disk format doesn't change shape if the in-memory
/// struct's field order ever does.
pub struct SerializedEntry {
    pub point: Vec3,
    pub normal: Vec3,
    pub is_volume: bool,
    pub radius: f32,
    pub weights: Vec<f32>,
}

fn write_f32(out: &mut Vec<u8>, v: f32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_vec3(out: &mut Vec<u8>, v: Vec3) {
    write_f32(out, v.x);
    write_f32(out, v.y);
    write_f32(out, v.z);
}

fn read_f32(input: &mut impl Read) -> std::io::Result<f32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn read_vec3(input: &mut impl Read) -> std::io::Result<Vec3> {
    Ok(Vec3::new(read_f32(input)?, read_f32(input)?, read_f32(input)?))
}

/// Encode `entries` (point, normal, is_volume, radius, per-light weights)
/// into a versioned byte buffer.
pub fn encode(entries: &[(Vec3, Vec3, bool, f32, &Distribution1D)]) -> Vec<u8> {
    let mut out = Vec::new();
    FormatHeader { magic: DLSC_MAGIC, version: DLSC_VERSION }.write(&mut out).expect("writing to a Vec never fails");
    out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for (point, normal, is_volume, radius, dist) in entries {
        write_vec3(&mut out, *point);
        write_vec3(&mut out, *normal);
        out.push(if *is_volume { 1 } else { 0 });
        write_f32(&mut out, *radius);
        out.extend_from_slice(&(dist.len() as u32).to_le_bytes());
        for i in 0..dist.len() {
            write_f32(&mut out, dist.weight(i));
        }
    }
    out
}

pub fn decode(bytes: &[u8]) -> std::io::Result<Vec<SerializedEntry>> {
    let mut cursor = bytes;
    FormatHeader::read(&mut cursor, DLSC_MAGIC, DLSC_VERSION)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    let mut count_buf = [0u8; 4];
    cursor.read_exact(&mut count_buf)?;
    let count = u32::from_le_bytes(count_buf) as usize;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let point = read_vec3(&mut cursor)?;
        let normal = read_vec3(&mut cursor)?;
        let mut flag = [0u8; 1];
        cursor.read_exact(&mut flag)?;
        let is_volume = flag[0] != 0;
        let radius = read_f32(&mut cursor)?;
        let mut n_buf = [0u8; 4];
        cursor.read_exact(&mut n_buf)?;
        let n = u32::from_le_bytes(n_buf) as usize;
        let mut weights = Vec::with_capacity(n);
        for _ in 0..n {
            weights.push(read_f32(&mut cursor)?);
        }
        entries.push(SerializedEntry { point, normal, is_volume, radius, weights });
    }
    Ok(entries)
}

/// Atomically write the encoded cache to `path`. Returns `false` (and
/// leaves any previous file in place) on I/O failure rather than
/// propagating an error, per the module doc comment.
pub fn safe_save(path: &Path, entries: &[(Vec3, Vec3, bool, f32, &Distribution1D)]) -> bool {
    let bytes = encode(entries);
    atomic_write(path, &bytes).is_ok()
}

pub fn load(path: &Path) -> std::io::Result<Vec<SerializedEntry>> {
    let mut file = std::fs::File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    decode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_entries_through_bytes() {
        let dist = Distribution1D::new(vec![1.0, 2.0, 0.0]);
        let entries = vec![(Vec3::new(1.0, 2.0, 3.0), Vec3::Y, false, 0.5, &dist)];
        let bytes = encode(&entries);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].point, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(decoded[0].weights, vec![1.0, 2.0, 0.0]);
        assert!(!decoded[0].is_volume);
    }

    #[test]
    fn safe_save_preserves_previous_file_when_target_dir_is_missing() {
        let dist = Distribution1D::uniform(2);
        let entries = vec![(Vec3::ZERO, Vec3::Y, false, 1.0, &dist)];
        let missing = Path::new("/nonexistent/dlsc.cache");
        assert!(!safe_save(missing, &entries));
    }

    #[test]
    fn safe_save_then_load_round_trips_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.dlsc");
        let dist = Distribution1D::new(vec![3.0, 1.0]);
        let entries = vec![(Vec3::new(4.0, 5.0, 6.0), Vec3::Z, true, 2.0, &dist)];
        assert!(safe_save(&path, &entries));
        let loaded = load(&path).unwrap();
        assert_eq!(loaded[0].weights, vec![3.0, 1.0]);
        assert!(loaded[0].is_volume);
    }
}
