//! Little-endian primitive and array codec for the index container format
//!
//! All multi-byte values are little endian. Arrays are written as a u32
//! element count followed by the raw elements.

use std::io::{self, Read, Write};

use crc32fast::Hasher;

pub fn write_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

pub fn write_u16<W: Write>(w: &mut W, v: u16) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_u64<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_i64<W: Write>(w: &mut W, v: i64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_bool<W: Write>(w: &mut W, v: bool) -> io::Result<()> {
    write_u8(w, v as u8)
}

pub fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub fn read_u16<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

pub fn read_i64<R: Read>(r: &mut R) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

pub fn read_bool<R: Read>(r: &mut R) -> io::Result<bool> {
    Ok(read_u8(r)? != 0)
}

pub fn write_u8_array<W: Write>(w: &mut W, values: &[u8]) -> io::Result<()> {
    write_u32(w, values.len() as u32)?;
    w.write_all(values)
}

pub fn write_u16_array<W: Write>(w: &mut W, values: &[u16]) -> io::Result<()> {
    write_u32(w, values.len() as u32)?;
    for &v in values {
        write_u16(w, v)?;
    }
    Ok(())
}

pub fn write_u32_array<W: Write>(w: &mut W, values: &[u32]) -> io::Result<()> {
    write_u32(w, values.len() as u32)?;
    for &v in values {
        write_u32(w, v)?;
    }
    Ok(())
}

pub fn write_u64_array<W: Write>(w: &mut W, values: &[u64]) -> io::Result<()> {
    write_u32(w, values.len() as u32)?;
    for &v in values {
        write_u64(w, v)?;
    }
    Ok(())
}

pub fn read_u8_array<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
    let len = read_u32(r)? as usize;
    let mut values = vec![0u8; len];
    r.read_exact(&mut values)?;
    Ok(values)
}

pub fn read_u16_array<R: Read>(r: &mut R) -> io::Result<Vec<u16>> {
    let len = read_u32(r)? as usize;
    let mut values = Vec::with_capacity(len);
    for _ in 0..len {
        values.push(read_u16(r)?);
    }
    Ok(values)
}

pub fn read_u32_array<R: Read>(r: &mut R) -> io::Result<Vec<u32>> {
    let len = read_u32(r)? as usize;
    let mut values = Vec::with_capacity(len);
    for _ in 0..len {
        values.push(read_u32(r)?);
    }
    Ok(values)
}

pub fn read_u64_array<R: Read>(r: &mut R) -> io::Result<Vec<u64>> {
    let len = read_u32(r)? as usize;
    let mut values = Vec::with_capacity(len);
    for _ in 0..len {
        values.push(read_u64(r)?);
    }
    Ok(values)
}

/// Writer adapter that maintains a running CRC32 of everything written.
pub struct Crc32Writer<W> {
    inner: W,
    hasher: Hasher,
}

impl<W: Write> Crc32Writer<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
        }
    }

    /// Finish checksumming and return the inner writer plus the CRC.
    pub fn finalize(self) -> (W, u32) {
        (self.inner, self.hasher.finalize())
    }
}

impl<W: Write> Write for Crc32Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reader adapter that maintains a running CRC32 of everything read.
pub struct Crc32Reader<R> {
    inner: R,
    hasher: Hasher,
}

impl<R: Read> Crc32Reader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
        }
    }

    pub fn finalize(self) -> (R, u32) {
        (self.inner, self.hasher.finalize())
    }
}

impl<R: Read> Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_roundtrip() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 0xDEAD_BEEF).unwrap();
        write_i64(&mut buf, -42).unwrap();
        write_bool(&mut buf, true).unwrap();
        write_u16(&mut buf, 0xFFFF).unwrap();

        let mut cursor = &buf[..];
        assert_eq!(read_u32(&mut cursor).unwrap(), 0xDEAD_BEEF);
        assert_eq!(read_i64(&mut cursor).unwrap(), -42);
        assert!(read_bool(&mut cursor).unwrap());
        assert_eq!(read_u16(&mut cursor).unwrap(), 0xFFFF);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_array_roundtrip() {
        let mut buf = Vec::new();
        write_u32_array(&mut buf, &[1, 2, 3]).unwrap();
        write_u64_array(&mut buf, &[u64::MAX]).unwrap();
        write_u16_array(&mut buf, &[]).unwrap();

        let mut cursor = &buf[..];
        assert_eq!(read_u32_array(&mut cursor).unwrap(), vec![1, 2, 3]);
        assert_eq!(read_u64_array(&mut cursor).unwrap(), vec![u64::MAX]);
        assert!(read_u16_array(&mut cursor).unwrap().is_empty());
    }

    #[test]
    fn test_crc_writer_matches_reader() {
        let mut w = Crc32Writer::new(Vec::new());
        write_u32_array(&mut w, &[7, 8, 9]).unwrap();
        let (bytes, written_crc) = w.finalize();

        let mut r = Crc32Reader::new(&bytes[..]);
        read_u32_array(&mut r).unwrap();
        let (_, read_crc) = r.finalize();
        assert_eq!(written_crc, read_crc);
    }
}
