//! Versioned, chunked weight image.
//!
//! Layout: 8-byte magic, u32 version, then chunks. Every chunk is
//! `tag [u8;4] | len u32 | uncompressed_len u32 | lz4 block`. Unknown chunks are
//! skipped on load.
//!
//! Chunks:
//! - `LAYR` (once): layer names, unit counts and running pool averages.
//! - `WTS0` (one per projection): sender name, receiver name, weights.

use std::io::{self, Read, Write};

pub const MAGIC: &[u8; 8] = b"HIPWTS01";
pub const VERSION_V1: u32 = 1;
pub const VERSION_CURRENT: u32 = VERSION_V1;

const TAG_LAYERS: [u8; 4] = *b"LAYR";
const TAG_WEIGHTS: [u8; 4] = *b"WTS0";

pub fn compress_lz4(input: &[u8]) -> Vec<u8> {
    lz4_flex::compress(input)
}

pub fn decompress_lz4(input: &[u8], expected_size: usize) -> io::Result<Vec<u8>> {
    // Raw LZ4 block with external expected size.
    lz4_flex::decompress(input, expected_size)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "lz4 decompression failed"))
}

/// Sink that only counts bytes.
#[derive(Debug, Default)]
pub struct CountingWriter {
    written: usize,
}

impl CountingWriter {
    pub fn new() -> Self {
        Self { written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl Write for CountingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written = self.written.saturating_add(buf.len());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn write_u32_le<W: Write + ?Sized>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_f32_le<W: Write + ?Sized>(w: &mut W, v: f32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_len<W: Write + ?Sized>(w: &mut W, n: usize) -> io::Result<()> {
    let n = u32::try_from(n)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "length exceeds u32"))?;
    write_u32_le(w, n)
}

pub fn write_string<W: Write + ?Sized>(w: &mut W, s: &str) -> io::Result<()> {
    write_len(w, s.len())?;
    w.write_all(s.as_bytes())
}

pub fn write_f32s<W: Write + ?Sized>(w: &mut W, values: &[f32]) -> io::Result<()> {
    write_len(w, values.len())?;
    for &v in values {
        write_f32_le(w, v)?;
    }
    Ok(())
}

pub fn read_exact<const N: usize, R: Read + ?Sized>(r: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn read_u32_le<R: Read + ?Sized>(r: &mut R) -> io::Result<u32> {
    Ok(u32::from_le_bytes(read_exact::<4, _>(r)?))
}

pub fn read_f32_le<R: Read + ?Sized>(r: &mut R) -> io::Result<f32> {
    Ok(f32::from_le_bytes(read_exact::<4, _>(r)?))
}

pub fn read_string<R: Read + ?Sized>(r: &mut R) -> io::Result<String> {
    let n = read_u32_le(r)? as usize;
    let mut buf = vec![0u8; n];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid utf-8 string"))
}

pub fn read_f32s<R: Read + ?Sized>(r: &mut R) -> io::Result<Vec<f32>> {
    let n = read_u32_le(r)? as usize;
    let mut out = Vec::with_capacity(n.min(1 << 20));
    for _ in 0..n {
        out.push(read_f32_le(r)?);
    }
    Ok(out)
}

/// Payload is LZ4-compressed and preceded by its uncompressed length.
pub fn write_chunk_lz4<W: Write + ?Sized>(
    w: &mut W,
    tag: [u8; 4],
    payload: &[u8],
) -> io::Result<()> {
    let compressed = compress_lz4(payload);
    let uncompressed_len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "chunk too large"))?;
    let total_len = 4u32.saturating_add(
        u32::try_from(compressed.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "chunk too large"))?,
    );

    w.write_all(&tag)?;
    write_u32_le(w, total_len)?;
    write_u32_le(w, uncompressed_len)?;
    w.write_all(&compressed)
}

pub fn read_chunk_header<R: Read + ?Sized>(r: &mut R) -> io::Result<([u8; 4], u32)> {
    let tag = read_exact::<4, _>(r)?;
    let len = read_u32_le(r)?;
    Ok((tag, len))
}

fn invalid(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Learned state of one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerRecord {
    pub name: String,
    pub units: usize,
    pub pool_avg: Vec<f32>,
}

/// Weights of one projection, in the engine's connection order.
#[derive(Debug, Clone, PartialEq)]
pub struct PrjnRecord {
    pub send: String,
    pub recv: String,
    pub weights: Vec<f32>,
}

/// Everything learned by a network: the only state that crosses trials.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightImage {
    pub layers: Vec<LayerRecord>,
    pub prjns: Vec<PrjnRecord>,
}

impl WeightImage {
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(MAGIC)?;
        write_u32_le(w, VERSION_CURRENT)?;

        let mut payload = Vec::new();
        write_len(&mut payload, self.layers.len())?;
        for l in &self.layers {
            write_string(&mut payload, &l.name)?;
            write_len(&mut payload, l.units)?;
            write_f32s(&mut payload, &l.pool_avg)?;
        }
        write_chunk_lz4(w, TAG_LAYERS, &payload)?;

        for p in &self.prjns {
            payload.clear();
            write_string(&mut payload, &p.send)?;
            write_string(&mut payload, &p.recv)?;
            write_f32s(&mut payload, &p.weights)?;
            write_chunk_lz4(w, TAG_WEIGHTS, &payload)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read + ?Sized>(r: &mut R) -> io::Result<Self> {
        let magic = read_exact::<8, _>(r)?;
        if &magic != MAGIC {
            return Err(invalid("bad weight image magic"));
        }
        let version = read_u32_le(r)?;
        if version != VERSION_CURRENT {
            return Err(invalid("unsupported weight image version"));
        }

        let mut layers: Option<Vec<LayerRecord>> = None;
        let mut prjns = Vec::new();

        loop {
            let (tag, len) = match read_chunk_header(r) {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            };

            let payload = {
                let mut take = r.take(len as u64);
                let uncompressed_len = read_u32_le(&mut take)? as usize;
                let mut compressed = Vec::with_capacity((len as usize).saturating_sub(4));
                take.read_to_end(&mut compressed)?;
                decompress_lz4(&compressed, uncompressed_len)?
            };

            let mut cursor = io::Cursor::new(payload);
            match tag {
                TAG_LAYERS => {
                    let n = read_u32_le(&mut cursor)? as usize;
                    let mut out = Vec::with_capacity(n.min(1024));
                    for _ in 0..n {
                        out.push(LayerRecord {
                            name: read_string(&mut cursor)?,
                            units: read_u32_le(&mut cursor)? as usize,
                            pool_avg: read_f32s(&mut cursor)?,
                        });
                    }
                    layers = Some(out);
                }
                TAG_WEIGHTS => prjns.push(PrjnRecord {
                    send: read_string(&mut cursor)?,
                    recv: read_string(&mut cursor)?,
                    weights: read_f32s(&mut cursor)?,
                }),
                _ => {
                    // Unknown chunk: skipped.
                }
            }
        }

        let layers = layers.ok_or_else(|| invalid("missing LAYR chunk"))?;
        Ok(Self { layers, prjns })
    }

    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        Self::read_from(&mut io::Cursor::new(bytes))
    }

    /// Exact serialized size in bytes.
    pub fn size_bytes(&self) -> io::Result<usize> {
        let mut cw = CountingWriter::new();
        self.write_to(&mut cw)?;
        Ok(cw.written())
    }
}
