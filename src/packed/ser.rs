use super::error::{Error, Result};
use serde::{
    ser::{self, Impossible, SerializeStruct, SerializeTuple, SerializeTupleStruct},
    Serialize,
};

/// Width of an `uint256`/`int256` in the packed encoding.
pub const WORD_SIZE: usize = 32;

pub trait Writer {
    fn write(&mut self, bytes: &[u8]);
}

#[cfg(test)]
impl Writer for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// Serializer producing the Solidity `abi.encodePacked` layout.
///
/// Unlike the regular ABI encoding there is no head/tail split and no padding
/// between values: every field is written directly after the previous one.
/// This makes the encoding ambiguous for dynamic types, which is why we only
/// use it on structs of statically sized fields.
///
/// Type mapping:
/// - all unsigned integers are widened to `uint256` (32 bytes, big endian),
///   as the contracts declare every number as `uint256`.
/// - signed integers are sign-extended to `int256`.
/// - `bool` is a single byte.
/// - `serialize_bytes` and `serialize_str` are written as-is, this is how
///   [Address](super::types::Address) (20 bytes) and `bytesN` values end up
///   in the output.
/// - structs and tuples are the concatenation of their fields.
///
/// Note that `[u8; N]` is a tuple of `u8` for serde and therefore encodes as
/// N words, not as `bytesN`. Wrap raw bytes in a type that calls
/// `serialize_bytes`.
pub struct Serializer<'a, W: Writer> {
    writer: &'a mut W,
}

impl<'a, W: Writer> Serializer<'a, W> {
    pub fn new(writer: &'a mut W) -> Self {
        Serializer { writer }
    }

    fn write_uint(&mut self, v: u128) {
        let mut word = [0u8; WORD_SIZE];
        word[WORD_SIZE - 16..].copy_from_slice(&v.to_be_bytes());
        self.writer.write(&word);
    }

    fn write_int(&mut self, v: i128) {
        let fill = if v < 0 { 0xff } else { 0x00 };
        let mut word = [fill; WORD_SIZE];
        word[WORD_SIZE - 16..].copy_from_slice(&v.to_be_bytes());
        self.writer.write(&word);
    }
}

pub fn to_writer<T, W>(value: &T, writer: &mut W) -> Result<()>
where
    T: Serialize + ?Sized,
    W: Writer,
{
    value.serialize(&mut Serializer::new(writer))
}

#[cfg(test)]
pub fn to_bytes<T>(value: &T) -> Result<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    let mut buf = Vec::new();
    to_writer(value, &mut buf)?;
    Ok(buf)
}

impl<'s, 'a, W: Writer> ser::Serializer for &'s mut Serializer<'a, W> {
    type Ok = ();
    type Error = Error;

    type SerializeSeq = Impossible<(), Error>;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Impossible<(), Error>;
    type SerializeMap = Impossible<(), Error>;
    type SerializeStruct = Self;
    type SerializeStructVariant = Impossible<(), Error>;

    fn is_human_readable(&self) -> bool {
        false
    }

    fn serialize_bool(self, v: bool) -> Result<()> {
        self.writer.write(&[v as u8]);
        Ok(())
    }

    fn serialize_i8(self, v: i8) -> Result<()> {
        self.write_int(v.into());
        Ok(())
    }

    fn serialize_i16(self, v: i16) -> Result<()> {
        self.write_int(v.into());
        Ok(())
    }

    fn serialize_i32(self, v: i32) -> Result<()> {
        self.write_int(v.into());
        Ok(())
    }

    fn serialize_i64(self, v: i64) -> Result<()> {
        self.write_int(v.into());
        Ok(())
    }

    fn serialize_i128(self, v: i128) -> Result<()> {
        self.write_int(v);
        Ok(())
    }

    fn serialize_u8(self, v: u8) -> Result<()> {
        self.write_uint(v.into());
        Ok(())
    }

    fn serialize_u16(self, v: u16) -> Result<()> {
        self.write_uint(v.into());
        Ok(())
    }

    fn serialize_u32(self, v: u32) -> Result<()> {
        self.write_uint(v.into());
        Ok(())
    }

    fn serialize_u64(self, v: u64) -> Result<()> {
        self.write_uint(v.into());
        Ok(())
    }

    fn serialize_u128(self, v: u128) -> Result<()> {
        self.write_uint(v);
        Ok(())
    }

    fn serialize_f32(self, _v: f32) -> Result<()> {
        Err(Error::TypeNotRepresentable("f32"))
    }

    fn serialize_f64(self, _v: f64) -> Result<()> {
        Err(Error::TypeNotRepresentable("f64"))
    }

    fn serialize_char(self, _v: char) -> Result<()> {
        Err(Error::TypeNotYetSupported("char"))
    }

    fn serialize_str(self, v: &str) -> Result<()> {
        self.writer.write(v.as_bytes());
        Ok(())
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        self.writer.write(v);
        Ok(())
    }

    fn serialize_none(self) -> Result<()> {
        Err(Error::TypeNotRepresentable("Option"))
    }

    fn serialize_some<T>(self, _value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        Err(Error::TypeNotRepresentable("Option"))
    }

    fn serialize_unit(self) -> Result<()> {
        Err(Error::TypeNotRepresentable("()"))
    }

    // Zero-sized marker structs contribute nothing.
    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
    ) -> Result<()> {
        Err(Error::TypeNotRepresentable("enum"))
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        Err(Error::TypeNotRepresentable("enum"))
    }

    // Packed arrays pad every element to a full word, which we have no use
    // for so far.
    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(Error::TypeNotYetSupported("array"))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(Error::TypeNotRepresentable("enum"))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(Error::TypeNotRepresentable("map"))
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(Error::TypeNotRepresentable("enum"))
    }
}

impl<'s, 'a, W: Writer> SerializeTuple for &'s mut Serializer<'a, W> {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<'s, 'a, W: Writer> SerializeTupleStruct for &'s mut Serializer<'a, W> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<'s, 'a, W: Writer> SerializeStruct for &'s mut Serializer<'a, W> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T>(&mut self, _key: &'static str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}
