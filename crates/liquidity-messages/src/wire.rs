//! Big-endian writer and bounds-checked reader shared by every message.

use alloy_primitives::{B256, U256};
use bytes::{Buf, BufMut, BytesMut};

use crate::MalformedMessage;

/// Appends wire fields to a growable buffer.
#[derive(Default)]
pub struct Writer {
	buf: BytesMut,
}

impl Writer {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn put_u8(&mut self, value: u8) {
		self.buf.put_u8(value);
	}

	pub fn put_u16(&mut self, value: u16) {
		self.buf.put_u16(value);
	}

	pub fn put_u32(&mut self, value: u32) {
		self.buf.put_u32(value);
	}

	pub fn put_u64(&mut self, value: u64) {
		self.buf.put_u64(value);
	}

	pub fn put_u256(&mut self, value: U256) {
		self.buf.put_slice(&value.to_be_bytes::<32>());
	}

	pub fn put_address(&mut self, value: &B256) {
		self.buf.put_slice(value.as_slice());
	}

	pub fn put_raw(&mut self, bytes: &[u8]) {
		self.buf.put_slice(bytes);
	}

	/// Writes `bytes` behind a 2-byte length. Callers bound the length by type.
	pub fn put_prefixed_u16(&mut self, bytes: &[u8]) {
		debug_assert!(bytes.len() <= u16::MAX as usize);
		self.buf.put_u16(bytes.len() as u16);
		self.buf.put_slice(bytes);
	}

	/// Writes `bytes` behind a 4-byte length.
	pub fn put_prefixed_u32(&mut self, bytes: &[u8]) {
		debug_assert!(bytes.len() <= u32::MAX as usize);
		self.buf.put_u32(bytes.len() as u32);
		self.buf.put_slice(bytes);
	}

	pub fn into_vec(self) -> Vec<u8> {
		self.buf.to_vec()
	}
}

/// Consumes wire fields from a byte slice, failing on any overrun.
pub struct Reader<'a> {
	buf: &'a [u8],
}

impl<'a> Reader<'a> {
	pub fn new(buf: &'a [u8]) -> Self {
		Self { buf }
	}

	pub fn remaining(&self) -> usize {
		self.buf.remaining()
	}

	fn ensure(&self, field: &'static str, needed: usize) -> Result<(), MalformedMessage> {
		if self.buf.remaining() < needed {
			return Err(MalformedMessage::Truncated {
				field,
				needed,
				remaining: self.buf.remaining(),
			});
		}
		Ok(())
	}

	pub fn read_u8(&mut self, field: &'static str) -> Result<u8, MalformedMessage> {
		self.ensure(field, 1)?;
		Ok(self.buf.get_u8())
	}

	pub fn read_u16(&mut self, field: &'static str) -> Result<u16, MalformedMessage> {
		self.ensure(field, 2)?;
		Ok(self.buf.get_u16())
	}

	pub fn read_u32(&mut self, field: &'static str) -> Result<u32, MalformedMessage> {
		self.ensure(field, 4)?;
		Ok(self.buf.get_u32())
	}

	pub fn read_u64(&mut self, field: &'static str) -> Result<u64, MalformedMessage> {
		self.ensure(field, 8)?;
		Ok(self.buf.get_u64())
	}

	pub fn read_u256(&mut self, field: &'static str) -> Result<U256, MalformedMessage> {
		let mut bytes = [0u8; 32];
		self.read_into(field, &mut bytes)?;
		Ok(U256::from_be_bytes(bytes))
	}

	pub fn read_address(&mut self, field: &'static str) -> Result<B256, MalformedMessage> {
		let mut bytes = [0u8; 32];
		self.read_into(field, &mut bytes)?;
		Ok(B256::from(bytes))
	}

	pub fn read_into(
		&mut self,
		field: &'static str,
		out: &mut [u8],
	) -> Result<(), MalformedMessage> {
		self.ensure(field, out.len())?;
		self.buf.copy_to_slice(out);
		Ok(())
	}

	pub fn read_bytes(
		&mut self,
		field: &'static str,
		len: usize,
	) -> Result<&'a [u8], MalformedMessage> {
		self.ensure(field, len)?;
		let (head, tail) = self.buf.split_at(len);
		self.buf = tail;
		Ok(head)
	}

	pub fn read_prefixed_u16(&mut self, field: &'static str) -> Result<&'a [u8], MalformedMessage> {
		let len = self.read_u16(field)? as usize;
		self.read_bytes(field, len)
	}

	pub fn read_prefixed_u32(&mut self, field: &'static str) -> Result<&'a [u8], MalformedMessage> {
		let len = self.read_u32(field)? as usize;
		self.read_bytes(field, len)
	}

	/// Everything not yet consumed.
	pub fn rest(&mut self) -> &'a [u8] {
		let rest = self.buf;
		self.buf = &[];
		rest
	}

	/// Fails if any bytes are left after the last declared field.
	pub fn finish(self, context: &'static str) -> Result<(), MalformedMessage> {
		match self.buf.remaining() {
			0 => Ok(()),
			count => Err(MalformedMessage::TrailingBytes { context, count }),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_fields_are_big_endian() {
		let mut writer = Writer::new();
		writer.put_u16(0x0102);
		writer.put_u32(0x03040506);
		writer.put_prefixed_u16(&[0xaa]);
		assert_eq!(
			writer.into_vec(),
			vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x00, 0x01, 0xaa]
		);
	}

	#[test]
	fn test_reader_rejects_overrun() {
		let bytes = [0x00, 0x05, 0x01, 0x02];
		let mut reader = Reader::new(&bytes);
		assert_eq!(
			reader.read_prefixed_u16("payload"),
			Err(MalformedMessage::Truncated {
				field: "payload",
				needed: 5,
				remaining: 2,
			})
		);
	}

	#[test]
	fn test_finish_reports_trailing_bytes() {
		let bytes = [0x01, 0x02, 0x03];
		let mut reader = Reader::new(&bytes);
		reader.read_u8("id").unwrap();
		assert_eq!(
			reader.finish("test"),
			Err(MalformedMessage::TrailingBytes {
				context: "test",
				count: 2,
			})
		);
	}
}
