//! Little-endian binary codec for the persisted scene format.
//!
//! All cache, shader-graph and scene blobs are framed with the writers and
//! readers in this module. Layouts are fixed; see the serialization notes on
//! the individual types.

use byteorder::{ByteOrder, LittleEndian};

use crate::math::{Quat, Vec2, Vec3, Vec4};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Unexpected end of blob: needed {needed} more bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("Blob contains a non-UTF8 string")]
    InvalidString,

    #[error("Invalid enum discriminant {value} for {ty}")]
    InvalidDiscriminant { ty: &'static str, value: u32 },
}

/// Growable byte sink. `finish()` yields the raw blob.
#[derive(Debug, Default)]
pub struct BlobWriter {
    buf: Vec<u8>,
}

impl BlobWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        BlobWriter {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    /// `u32` length prefix followed by UTF-8 bytes.
    pub fn write_string(&mut self, v: &str) {
        self.write_u32(v.len() as u32);
        self.buf.extend_from_slice(v.as_bytes());
    }

    pub fn write_vec2(&mut self, v: Vec2) {
        self.write_f32(v.x);
        self.write_f32(v.y);
    }

    pub fn write_vec3(&mut self, v: Vec3) {
        self.write_f32(v.x);
        self.write_f32(v.y);
        self.write_f32(v.z);
    }

    pub fn write_vec4(&mut self, v: Vec4) {
        self.write_f32(v.x);
        self.write_f32(v.y);
        self.write_f32(v.z);
        self.write_f32(v.w);
    }

    pub fn write_quat(&mut self, v: Quat) {
        self.write_f32(v.x);
        self.write_f32(v.y);
        self.write_f32(v.z);
        self.write_f32(v.w);
    }

    pub fn write_f32_slice(&mut self, v: &[f32]) {
        self.write_u32(v.len() as u32);
        for &f in v {
            self.write_f32(f);
        }
    }

    pub fn write_vec2_slice(&mut self, v: &[Vec2]) {
        self.write_u32(v.len() as u32);
        for &e in v {
            self.write_vec2(e);
        }
    }

    pub fn write_vec3_slice(&mut self, v: &[Vec3]) {
        self.write_u32(v.len() as u32);
        for &e in v {
            self.write_vec3(e);
        }
    }

    pub fn write_vec4_slice(&mut self, v: &[Vec4]) {
        self.write_u32(v.len() as u32);
        for &e in v {
            self.write_vec4(e);
        }
    }

    pub fn write_u32_slice(&mut self, v: &[u32]) {
        self.write_u32(v.len() as u32);
        for &e in v {
            self.write_u32(e);
        }
    }

    pub fn write_i32_slice(&mut self, v: &[i32]) {
        self.write_u32(v.len() as u32);
        for &e in v {
            self.write_i32(e);
        }
    }

    pub fn write_u8_slice(&mut self, v: &[u8]) {
        self.write_u32(v.len() as u32);
        self.write_bytes(v);
    }
}

/// Cursor over a byte blob.
#[derive(Debug, Clone, Copy)]
pub struct BlobReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BlobReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BlobReader { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        self.take(n)
    }

    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidString)
    }

    pub fn read_vec2(&mut self) -> Result<Vec2, CodecError> {
        Ok(Vec2::new(self.read_f32()?, self.read_f32()?))
    }

    pub fn read_vec3(&mut self) -> Result<Vec3, CodecError> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    pub fn read_vec4(&mut self) -> Result<Vec4, CodecError> {
        Ok(Vec4::new(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    pub fn read_quat(&mut self) -> Result<Quat, CodecError> {
        Ok(Quat::from_xyzw(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    pub fn read_f32_vec(&mut self) -> Result<Vec<f32>, CodecError> {
        let n = self.read_u32()? as usize;
        let mut out = Vec::with_capacity(n.min(self.remaining() / 4 + 1));
        for _ in 0..n {
            out.push(self.read_f32()?);
        }
        Ok(out)
    }

    pub fn read_vec2_vec(&mut self) -> Result<Vec<Vec2>, CodecError> {
        let n = self.read_u32()? as usize;
        let mut out = Vec::with_capacity(n.min(self.remaining() / 8 + 1));
        for _ in 0..n {
            out.push(self.read_vec2()?);
        }
        Ok(out)
    }

    pub fn read_vec3_vec(&mut self) -> Result<Vec<Vec3>, CodecError> {
        let n = self.read_u32()? as usize;
        let mut out = Vec::with_capacity(n.min(self.remaining() / 12 + 1));
        for _ in 0..n {
            out.push(self.read_vec3()?);
        }
        Ok(out)
    }

    pub fn read_vec4_vec(&mut self) -> Result<Vec<Vec4>, CodecError> {
        let n = self.read_u32()? as usize;
        let mut out = Vec::with_capacity(n.min(self.remaining() / 16 + 1));
        for _ in 0..n {
            out.push(self.read_vec4()?);
        }
        Ok(out)
    }

    pub fn read_u32_vec(&mut self) -> Result<Vec<u32>, CodecError> {
        let n = self.read_u32()? as usize;
        let mut out = Vec::with_capacity(n.min(self.remaining() / 4 + 1));
        for _ in 0..n {
            out.push(self.read_u32()?);
        }
        Ok(out)
    }

    pub fn read_i32_vec(&mut self) -> Result<Vec<i32>, CodecError> {
        let n = self.read_u32()? as usize;
        let mut out = Vec::with_capacity(n.min(self.remaining() / 4 + 1));
        for _ in 0..n {
            out.push(self.read_i32()?);
        }
        Ok(out)
    }

    pub fn read_u8_vec(&mut self) -> Result<Vec<u8>, CodecError> {
        let n = self.read_u32()? as usize;
        Ok(self.take(n)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trip() {
        let mut w = BlobWriter::new();
        w.write_u8(7);
        w.write_bool(true);
        w.write_u16(0xbeef);
        w.write_u32(0xdead_beef);
        w.write_u64(0x0123_4567_89ab_cdef);
        w.write_i32(-42);
        w.write_f32(1.5);
        w.write_string("tiles");
        let blob = w.finish();

        let mut r = BlobReader::new(&blob);
        assert_eq!(r.read_u8().unwrap(), 7);
        assert!(r.read_bool().unwrap());
        assert_eq!(r.read_u16().unwrap(), 0xbeef);
        assert_eq!(r.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(r.read_u64().unwrap(), 0x0123_4567_89ab_cdef);
        assert_eq!(r.read_i32().unwrap(), -42);
        assert_eq!(r.read_f32().unwrap(), 1.5);
        assert_eq!(r.read_string().unwrap(), "tiles");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn eof_is_reported() {
        let mut r = BlobReader::new(&[1, 2]);
        assert!(matches!(
            r.read_u32(),
            Err(CodecError::UnexpectedEof { needed: 4, remaining: 2 })
        ));
    }

    #[test]
    fn slice_round_trip() {
        let mut w = BlobWriter::new();
        w.write_vec3_slice(&[Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO]);
        w.write_f32_slice(&[0.25, 0.5]);
        let blob = w.finish();
        let mut r = BlobReader::new(&blob);
        assert_eq!(
            r.read_vec3_vec().unwrap(),
            vec![Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO]
        );
        assert_eq!(r.read_f32_vec().unwrap(), vec![0.25, 0.5]);
    }
}
