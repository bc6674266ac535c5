//! rRES resource container
//!
//! A packed little-endian archive:
//!
//! ```text
//! file header   id[4] = "rRES", version: u16, count: u16
//! per entry     id: u16, type: u8, comp: u8, size: u32, src_size: u32
//!               type parameters (length depends on type)
//!               size bytes of (possibly compressed) data
//! ```
//!
//! Sound parameters are `sample_rate: u16, bits: u16, channels: u8, reserved: u8`.

use std::io::{Cursor, Read, Write};
use std::path::Path;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use super::wave::Wave;

const RRES_MAGIC: &[u8; 4] = b"rRES";
const RRES_VERSION: u16 = 100;

/// Errors reading an rRES file
#[derive(Debug, thiserror::Error)]
pub enum RresError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not an rRES file")]
    BadMagic,
    #[error("file truncated inside {0}")]
    Truncated(&'static str),
    #[error("resource {0} not found")]
    NotFound(u16),
    #[error("resource {id} is {found:?}, expected {expected:?}")]
    WrongType {
        id: u16,
        found: ResourceType,
        expected: ResourceType,
    },
    #[error("unknown resource type {0}")]
    UnknownType(u8),
    #[error("unsupported compression {0}")]
    UnsupportedCompression(u8),
    #[error("resource {id} inflated to {actual} bytes, header says {expected}")]
    SizeMismatch { id: u16, expected: u32, actual: usize },
}

/// Resource type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Image,
    Sound,
    Model,
    Text,
    Raw,
}

impl ResourceType {
    pub fn from_u8(v: u8) -> Result<Self, RresError> {
        match v {
            0 => Ok(ResourceType::Image),
            1 => Ok(ResourceType::Sound),
            2 => Ok(ResourceType::Model),
            3 => Ok(ResourceType::Text),
            4 => Ok(ResourceType::Raw),
            _ => Err(RresError::UnknownType(v)),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            ResourceType::Image => 0,
            ResourceType::Sound => 1,
            ResourceType::Model => 2,
            ResourceType::Text => 3,
            ResourceType::Raw => 4,
        }
    }

    /// Size of the parameter block following the info header
    pub fn param_size(self) -> usize {
        match self {
            ResourceType::Image | ResourceType::Sound => 6,
            ResourceType::Model => 5,
            ResourceType::Text | ResourceType::Raw => 0,
        }
    }
}

/// Payload compression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Deflate,
}

impl Compression {
    pub fn from_u8(v: u8) -> Result<Self, RresError> {
        match v {
            0 => Ok(Compression::None),
            2 => Ok(Compression::Deflate),
            _ => Err(RresError::UnsupportedCompression(v)),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Deflate => 2,
        }
    }
}

/// One resource with its payload already inflated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RresEntry {
    pub id: u16,
    pub kind: ResourceType,
    pub params: Vec<u8>,
    pub data: Vec<u8>,
}

impl RresEntry {
    /// Sound parameters `(sample_rate, bits, channels)`
    pub fn sound_params(&self) -> Option<(u32, u16, u16)> {
        if self.kind != ResourceType::Sound || self.params.len() < 6 {
            return None;
        }
        let rate = u16::from_le_bytes([self.params[0], self.params[1]]);
        let bits = u16::from_le_bytes([self.params[2], self.params[3]]);
        Some((rate as u32, bits, self.params[4] as u16))
    }

    /// Build a sound entry from a wave. Sample rates above 65535 do not fit.
    pub fn sound(id: u16, wave: &Wave) -> Option<Self> {
        let rate = u16::try_from(wave.sample_rate).ok()?;
        let mut params = Vec::with_capacity(6);
        params.extend_from_slice(&rate.to_le_bytes());
        params.extend_from_slice(&wave.bits_per_sample.to_le_bytes());
        params.push(wave.channels as u8);
        params.push(0);
        Some(Self {
            id,
            kind: ResourceType::Sound,
            params,
            data: wave.data.clone(),
        })
    }

    pub fn to_wave(&self) -> Result<Wave, RresError> {
        let (rate, bits, channels) = self.sound_params().ok_or(RresError::WrongType {
            id: self.id,
            found: self.kind,
            expected: ResourceType::Sound,
        })?;
        Ok(Wave::new(self.data.clone(), rate, bits, channels))
    }
}

fn read_exact<R: Read>(r: &mut R, buf: &mut [u8], what: &'static str) -> Result<(), RresError> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => RresError::Truncated(what),
        _ => RresError::Io(e),
    })
}

fn read_u16<R: Read>(r: &mut R, what: &'static str) -> Result<u16, RresError> {
    let mut b = [0u8; 2];
    read_exact(r, &mut b, what)?;
    Ok(u16::from_le_bytes(b))
}

fn read_u32<R: Read>(r: &mut R, what: &'static str) -> Result<u32, RresError> {
    let mut b = [0u8; 4];
    read_exact(r, &mut b, what)?;
    Ok(u32::from_le_bytes(b))
}

/// Find resource `id` in an in-memory rRES image
pub fn find_resource(bytes: &[u8], id: u16) -> Result<RresEntry, RresError> {
    let mut cursor = Cursor::new(bytes);

    let mut magic = [0u8; 4];
    read_exact(&mut cursor, &mut magic, "file header").map_err(|_| RresError::BadMagic)?;
    if &magic != RRES_MAGIC {
        return Err(RresError::BadMagic);
    }
    let version = read_u16(&mut cursor, "file header")?;
    let count = read_u16(&mut cursor, "file header")?;
    log::debug!("rRES v{} with {} resources", version, count);

    for _ in 0..count {
        let entry_id = read_u16(&mut cursor, "info header")?;
        let mut tc = [0u8; 2];
        read_exact(&mut cursor, &mut tc, "info header")?;
        let size = read_u32(&mut cursor, "info header")?;
        let src_size = read_u32(&mut cursor, "info header")?;

        let kind = ResourceType::from_u8(tc[0])?;
        let mut params = vec![0u8; kind.param_size()];
        read_exact(&mut cursor, &mut params, "type parameters")?;

        let start = cursor.position() as usize;
        let end = start
            .checked_add(size as usize)
            .filter(|&end| end <= bytes.len())
            .ok_or(RresError::Truncated("resource data"))?;

        if entry_id != id {
            cursor.set_position(end as u64);
            continue;
        }

        let raw = &bytes[start..end];
        let data = match Compression::from_u8(tc[1])? {
            Compression::None => raw.to_vec(),
            Compression::Deflate => {
                // One byte past the header size is enough to detect a lie
                let mut out = Vec::new();
                ZlibDecoder::new(raw)
                    .take(u64::from(src_size) + 1)
                    .read_to_end(&mut out)?;
                if out.len() != src_size as usize {
                    return Err(RresError::SizeMismatch {
                        id,
                        expected: src_size,
                        actual: out.len(),
                    });
                }
                out
            }
        };

        return Ok(RresEntry {
            id,
            kind,
            params,
            data,
        });
    }

    Err(RresError::NotFound(id))
}

/// Load resource `id` from the rRES file at `path`
pub fn load_resource(path: &Path, id: u16) -> Result<RresEntry, RresError> {
    let bytes = std::fs::read(path)?;
    find_resource(&bytes, id)
}

/// Load a sound resource as a [`Wave`]
pub fn load_wave(path: &Path, id: u16) -> Result<Wave, RresError> {
    let entry = load_resource(path, id)?;
    if entry.kind != ResourceType::Sound {
        return Err(RresError::WrongType {
            id,
            found: entry.kind,
            expected: ResourceType::Sound,
        });
    }
    entry.to_wave()
}

/// Serialize entries into an rRES image
pub fn write_rres(entries: &[RresEntry], compression: Compression) -> Result<Vec<u8>, RresError> {
    let mut out = Vec::new();
    out.extend_from_slice(RRES_MAGIC);
    out.extend_from_slice(&RRES_VERSION.to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());

    for entry in entries {
        let payload = match compression {
            Compression::None => entry.data.clone(),
            Compression::Deflate => {
                let mut enc = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                enc.write_all(&entry.data)?;
                enc.finish()?
            }
        };

        out.extend_from_slice(&entry.id.to_le_bytes());
        out.push(entry.kind.to_u8());
        out.push(compression.to_u8());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());

        let mut params = entry.params.clone();
        params.resize(entry.kind.param_size(), 0);
        out.extend_from_slice(&params);
        out.extend_from_slice(&payload);
    }
    Ok(out)
}
