//! Minimal MRC2014 reader/writer for stacks of 2D images (`.mrc` / `.mrcs`).
//!
//! Only little-endian files are handled. Data are returned as `(nz, ny, nx)`
//! arrays, i.e. axis 0 indexes the images of the stack.

use log::debug;
use ndarray::{Array3, ArrayView3};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

const HEADER_LEN: usize = 1024;
const MAP_STAMP: &[u8; 4] = b"MAP ";
const MACHINE_STAMP_LE: [u8; 4] = [0x44, 0x44, 0x00, 0x00];
const MRC_VERSION: i32 = 20140;

// Word offsets (4 bytes each) into the main header.
const NX: usize = 0;
const NY: usize = 1;
const NZ: usize = 2;
const MODE: usize = 3;
const MX: usize = 7;
const MY: usize = 8;
const MZ: usize = 9;
const CELLA: usize = 10;
const CELLB: usize = 13;
const MAPC: usize = 16;
const DMIN: usize = 19;
const DMAX: usize = 20;
const DMEAN: usize = 21;
const NSYMBT: usize = 23;
const NVERSION: usize = 27;
const MAP: usize = 52;
const MACHST: usize = 53;
const RMS: usize = 54;

#[derive(Debug, Error)]
pub enum MrcError {
    #[error("MRC I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Header is missing the 'MAP ' identifier")]
    MissingMapStamp,

    #[error("Big-endian MRC files are not supported")]
    BigEndian,

    #[error("Unsupported MRC data mode {0}")]
    UnsupportedMode(i32),

    #[error("Invalid stack dimensions {nx}x{ny}x{nz}")]
    InvalidDimensions { nx: i64, ny: i64, nz: i64 },

    #[error("Invalid extended header length {0}")]
    InvalidExtendedHeader(i32),

    #[error("Stack shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Storage type of the voxel data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Int8,
    Int16,
    Float32,
    Uint16,
}

impl Mode {
    fn from_code(code: i32) -> Result<Self, MrcError> {
        match code {
            0 => Ok(Mode::Int8),
            1 => Ok(Mode::Int16),
            2 => Ok(Mode::Float32),
            6 => Ok(Mode::Uint16),
            _ => Err(MrcError::UnsupportedMode(code)),
        }
    }

    fn bytes(self) -> usize {
        match self {
            Mode::Int8 => 1,
            Mode::Int16 | Mode::Uint16 => 2,
            Mode::Float32 => 4,
        }
    }

    fn decode(self, raw: &[u8]) -> Vec<f64> {
        match self {
            Mode::Int8 => raw.iter().map(|&b| b as i8 as f64).collect(),
            Mode::Int16 => raw
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]]) as f64)
                .collect(),
            Mode::Uint16 => raw
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]) as f64)
                .collect(),
            Mode::Float32 => raw
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64)
                .collect(),
        }
    }
}

fn get_i32(header: &[u8; HEADER_LEN], word: usize) -> i32 {
    let i = word * 4;
    i32::from_le_bytes([header[i], header[i + 1], header[i + 2], header[i + 3]])
}

fn put_i32(header: &mut [u8; HEADER_LEN], word: usize, value: i32) {
    header[word * 4..word * 4 + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_f32(header: &mut [u8; HEADER_LEN], word: usize, value: f32) {
    header[word * 4..word * 4 + 4].copy_from_slice(&value.to_le_bytes());
}

/// Reads an image stack from an MRC file.
pub fn read_stack<P: AsRef<Path>>(path: P) -> Result<Array3<f64>, MrcError> {
    let file = File::open(path.as_ref())?;
    debug!("Reading MRC stack {:?}", path.as_ref());
    read_stack_from(BufReader::new(file))
}

/// Reads an image stack from any MRC-formatted byte source.
pub fn read_stack_from<R: Read>(mut reader: R) -> Result<Array3<f64>, MrcError> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header)?;

    if &header[MAP * 4..MAP * 4 + 4] != MAP_STAMP {
        return Err(MrcError::MissingMapStamp);
    }
    if header[MACHST * 4] == 0x11 {
        return Err(MrcError::BigEndian);
    }

    let (nx, ny, nz) = (get_i32(&header, NX), get_i32(&header, NY), get_i32(&header, NZ));
    if nx <= 0 || ny <= 0 || nz <= 0 {
        return Err(MrcError::InvalidDimensions {
            nx: nx.into(),
            ny: ny.into(),
            nz: nz.into(),
        });
    }
    let mode = Mode::from_code(get_i32(&header, MODE))?;

    let nsymbt = get_i32(&header, NSYMBT);
    if nsymbt < 0 {
        return Err(MrcError::InvalidExtendedHeader(nsymbt));
    }
    let skipped = io::copy(&mut reader.by_ref().take(nsymbt as u64), &mut io::sink())?;
    if skipped != nsymbt as u64 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated extended header").into());
    }

    let invalid = MrcError::InvalidDimensions {
        nx: nx.into(),
        ny: ny.into(),
        nz: nz.into(),
    };
    let (nx, ny, nz) = (nx as usize, ny as usize, nz as usize);
    let len = nx
        .checked_mul(ny)
        .and_then(|n| n.checked_mul(nz))
        .and_then(|n| n.checked_mul(mode.bytes()))
        .ok_or(invalid)?;

    // grows with the data actually present, not with what the header claims
    let mut raw = Vec::new();
    reader.take(len as u64).read_to_end(&mut raw)?;
    if raw.len() != len {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated image data").into());
    }

    debug!("MRC stack: {} images of {}x{}, mode {:?}", nz, ny, nx, mode);
    Ok(Array3::from_shape_vec((nz, ny, nx), mode.decode(&raw))?)
}

/// Writes an image stack as a mode 2 (float32) MRC file.
pub fn write_stack<P: AsRef<Path>>(path: P, stack: ArrayView3<f64>) -> Result<(), MrcError> {
    let file = File::create(path.as_ref())?;
    debug!("Writing MRC stack {:?}", path.as_ref());
    write_stack_to(BufWriter::new(file), stack)
}

/// Writes an image stack as mode 2 (float32) MRC data to any byte sink.
///
/// The header describes an image stack (space group 0) with 1 Å voxels.
pub fn write_stack_to<W: Write>(mut writer: W, stack: ArrayView3<f64>) -> Result<(), MrcError> {
    let (nz, ny, nx) = stack.dim();
    let dims = (i32::try_from(nx), i32::try_from(ny), i32::try_from(nz));
    let (nx, ny, nz) = match dims {
        (Ok(nx), Ok(ny), Ok(nz)) if nx > 0 && ny > 0 && nz > 0 => (nx, ny, nz),
        _ => {
            return Err(MrcError::InvalidDimensions {
                nx: nx as i64,
                ny: ny as i64,
                nz: nz as i64,
            })
        }
    };

    let count = stack.len() as f64;
    let min = stack.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = stack.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mean = stack.sum() / count;
    let rms = (stack.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / count).sqrt();

    let mut header = [0u8; HEADER_LEN];
    put_i32(&mut header, NX, nx);
    put_i32(&mut header, NY, ny);
    put_i32(&mut header, NZ, nz);
    put_i32(&mut header, MODE, 2);
    put_i32(&mut header, MX, nx);
    put_i32(&mut header, MY, ny);
    put_i32(&mut header, MZ, 1);
    put_f32(&mut header, CELLA, nx as f32);
    put_f32(&mut header, CELLA + 1, ny as f32);
    put_f32(&mut header, CELLA + 2, 1.0);
    for k in 0..3 {
        put_f32(&mut header, CELLB + k, 90.0);
        put_i32(&mut header, MAPC + k, k as i32 + 1);
    }
    put_f32(&mut header, DMIN, min as f32);
    put_f32(&mut header, DMAX, max as f32);
    put_f32(&mut header, DMEAN, mean as f32);
    put_i32(&mut header, NVERSION, MRC_VERSION);
    header[MAP * 4..MAP * 4 + 4].copy_from_slice(MAP_STAMP);
    header[MACHST * 4..MACHST * 4 + 4].copy_from_slice(&MACHINE_STAMP_LE);
    put_f32(&mut header, RMS, rms as f32);

    writer.write_all(&header)?;

    let mut data = Vec::with_capacity(stack.len() * 4);
    for &v in stack.iter() {
        data.extend_from_slice(&(v as f32).to_le_bytes());
    }
    writer.write_all(&data)?;
    writer.flush()?;
    Ok(())
}
