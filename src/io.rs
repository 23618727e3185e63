//! `fvecs` corpus loading.
//!
//! One record per vector: `dim: i32 LE` followed by `dim` f32 LE values.
//! The vector count is deduced from the file size; every record must
//! carry the same dimension and the file size must be an exact multiple
//! of the record size.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::info;

use crate::error::{AnnError, Result};

/// A row-major corpus loaded from an fvecs file.
#[derive(Debug, Clone)]
pub struct Fvecs {
    pub data: Vec<f32>,
    pub n: usize,
    pub dim: usize,
}

impl Fvecs {
    #[inline]
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }
}

/// Load a whole fvecs file into memory.
pub fn load_fvecs<P: AsRef<Path>>(path: P) -> Result<Fvecs> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let file_size = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut dim_buf = [0u8; 4];
    reader.read_exact(&mut dim_buf).map_err(|_| {
        AnnError::InvalidArgument(format!("{}: empty fvecs file", path.display()))
    })?;
    let dim = i32::from_le_bytes(dim_buf);
    if dim <= 0 {
        return Err(AnnError::InvalidArgument(format!(
            "{}: non-positive dimension {dim}",
            path.display()
        )));
    }
    let dim = dim as usize;

    let record_size = 4 + 4 * dim as u64;
    if file_size % record_size != 0 {
        return Err(AnnError::InvalidArgument(format!(
            "{}: size {file_size} is not a multiple of the {record_size}-byte record",
            path.display()
        )));
    }
    let n = (file_size / record_size) as usize;

    let mut data = Vec::with_capacity(n * dim);
    let mut val_buf = [0u8; 4];
    for record in 0..n {
        if record > 0 {
            reader.read_exact(&mut dim_buf)?;
            let d = i32::from_le_bytes(dim_buf);
            if d as usize != dim {
                return Err(AnnError::InvalidArgument(format!(
                    "{}: record {record} has dimension {d}, expected {dim}",
                    path.display()
                )));
            }
        }
        for _ in 0..dim {
            reader.read_exact(&mut val_buf)?;
            data.push(f32::from_le_bytes(val_buf));
        }
    }

    info!("read {}: n = {n}, dim = {dim}", path.display());
    Ok(Fvecs { data, n, dim })
}

/// Load an fvecs-framed file of i32 records (the usual ground-truth
/// encoding: same layout, integer payload). Returns `(ids, n, dim)`.
pub fn load_ivecs<P: AsRef<Path>>(path: P) -> Result<(Vec<i32>, usize, usize)> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let file_size = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(|_| {
        AnnError::InvalidArgument(format!("{}: empty ivecs file", path.display()))
    })?;
    let dim = i32::from_le_bytes(buf);
    if dim <= 0 {
        return Err(AnnError::InvalidArgument(format!(
            "{}: non-positive dimension {dim}",
            path.display()
        )));
    }
    let dim = dim as usize;

    let record_size = 4 + 4 * dim as u64;
    if file_size % record_size != 0 {
        return Err(AnnError::InvalidArgument(format!(
            "{}: size {file_size} is not a multiple of the {record_size}-byte record",
            path.display()
        )));
    }
    let n = (file_size / record_size) as usize;

    let mut ids = Vec::with_capacity(n * dim);
    for record in 0..n {
        if record > 0 {
            reader.read_exact(&mut buf)?;
            let d = i32::from_le_bytes(buf);
            if d as usize != dim {
                return Err(AnnError::InvalidArgument(format!(
                    "{}: record {record} has dimension {d}, expected {dim}",
                    path.display()
                )));
            }
        }
        for _ in 0..dim {
            reader.read_exact(&mut buf)?;
            ids.push(i32::from_le_bytes(buf));
        }
    }

    info!("read {}: n = {n}, dim = {dim}", path.display());
    Ok((ids, n, dim))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fvecs(path: &Path, rows: &[Vec<f32>]) {
        let mut f = File::create(path).unwrap();
        for row in rows {
            f.write_all(&(row.len() as i32).to_le_bytes()).unwrap();
            for &x in row {
                f.write_all(&x.to_le_bytes()).unwrap();
            }
        }
    }

    #[test]
    fn roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("base.fvecs");
        write_fvecs(&path, &[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);

        let f = load_fvecs(&path).unwrap();
        assert_eq!((f.n, f.dim), (2, 3));
        assert_eq!(f.row(0), &[1.0, 2.0, 3.0]);
        assert_eq!(f.row(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.fvecs");
        let mut f = File::create(&path).unwrap();
        f.write_all(&3i32.to_le_bytes()).unwrap();
        f.write_all(&1.0f32.to_le_bytes()).unwrap();
        drop(f);
        assert!(load_fvecs(&path).is_err());
    }

    #[test]
    fn mixed_dimensions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.fvecs");
        // 2-dim record followed by a 2-dim-sized frame claiming dim 1:
        // total size stays a multiple of the first record size.
        let mut f = File::create(&path).unwrap();
        f.write_all(&2i32.to_le_bytes()).unwrap();
        f.write_all(&0.5f32.to_le_bytes()).unwrap();
        f.write_all(&0.5f32.to_le_bytes()).unwrap();
        f.write_all(&1i32.to_le_bytes()).unwrap();
        f.write_all(&0.5f32.to_le_bytes()).unwrap();
        f.write_all(&0.5f32.to_le_bytes()).unwrap();
        drop(f);
        assert!(load_fvecs(&path).is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            load_fvecs("/no/such/file.fvecs"),
            Err(AnnError::Io(_))
        ));
    }
}
