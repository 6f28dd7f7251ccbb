//! Chunk decoder

use std::rc::Rc;

use super::*;

/// Decode a binary chunk into its main function prototype.
///
/// The header is validated field by field and decoding stops at the first
/// mismatch or short read.
pub fn undump(data: &[u8]) -> Result<Prototype, ChunkError> {
    let mut reader = Reader::new(data);
    reader.check_header()?;
    // Upvalue count of the main function, repeated in the prototype itself
    reader.read_byte()?;
    let proto = reader.read_proto("", 0)?;
    tracing::debug!(
        target: "luavm::chunk",
        source = %proto.source,
        instructions = proto.code.len(),
        protos = proto.protos.len(),
        "chunk decoded"
    );
    Ok(proto)
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ChunkError> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.data.len())
            .ok_or(ChunkError::UnexpectedEof(self.pos))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ChunkError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.read_bytes(N)?);
        Ok(buf)
    }

    fn read_byte(&mut self) -> Result<u8, ChunkError> {
        Ok(self.read_array::<1>()?[0])
    }

    fn read_u32(&mut self) -> Result<u32, ChunkError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    fn read_u64(&mut self) -> Result<u64, ChunkError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    fn read_lua_integer(&mut self) -> Result<i64, ChunkError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    fn read_lua_number(&mut self) -> Result<f64, ChunkError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    fn read_count(&mut self) -> Result<usize, ChunkError> {
        Ok(self.read_u32()? as usize)
    }

    /// Size byte (0 empty, 0xFF long form) then size - 1 bytes
    fn read_raw_string(&mut self) -> Result<&'a [u8], ChunkError> {
        let mut size = self.read_byte()? as u64;
        if size == 0 {
            return Ok(&[]);
        }
        if size == 0xFF {
            size = self.read_u64()?;
            if size == 0 {
                return Ok(&[]);
            }
        }
        let len = usize::try_from(size - 1).map_err(|_| ChunkError::LengthOverflow(size))?;
        self.read_bytes(len)
    }

    fn read_string(&mut self) -> Result<String, ChunkError> {
        Ok(String::from_utf8_lossy(self.read_raw_string()?).into_owned())
    }

    fn check_header(&mut self) -> Result<(), ChunkError> {
        if self.read_bytes(4).map_err(|_| ChunkError::NotAChunk)? != LUA_SIGNATURE {
            return Err(ChunkError::NotAChunk);
        }
        let version = self.read_byte()?;
        if version != LUAC_VERSION {
            return Err(ChunkError::VersionMismatch(version));
        }
        let format = self.read_byte()?;
        if format != LUAC_FORMAT {
            return Err(ChunkError::FormatMismatch(format));
        }
        if self.read_bytes(6)? != LUAC_DATA {
            return Err(ChunkError::Corrupted);
        }
        for (field, expected) in [
            ("int", CINT_SIZE),
            ("size_t", CSIZET_SIZE),
            ("Instruction", INSTRUCTION_SIZE),
            ("lua_Integer", LUA_INTEGER_SIZE),
            ("lua_Number", LUA_NUMBER_SIZE),
        ] {
            let got = self.read_byte()?;
            if got != expected {
                return Err(ChunkError::SizeMismatch { field, expected, got });
            }
        }
        if self.read_lua_integer()? != LUAC_INT {
            return Err(ChunkError::IntegerFormat);
        }
        if self.read_lua_number()? != LUAC_NUM {
            return Err(ChunkError::FloatFormat);
        }
        Ok(())
    }

    fn read_proto(&mut self, parent_source: &str, depth: usize) -> Result<Prototype, ChunkError> {
        if depth > MAX_PROTO_DEPTH {
            return Err(ChunkError::NestingTooDeep(MAX_PROTO_DEPTH));
        }
        let mut source = self.read_string()?;
        if source.is_empty() {
            source = parent_source.to_string();
        }
        let line_defined = self.read_u32()?;
        let last_line_defined = self.read_u32()?;
        let num_params = self.read_byte()?;
        let is_vararg = self.read_byte()? != 0;
        let max_stack_size = self.read_byte()?;
        let code = self.read_code()?;
        let constants = self.read_constants()?;
        let upvalues = self.read_upvalues()?;

        let n = self.read_count()?;
        let mut protos = Vec::with_capacity(n.min(self.remaining()));
        for _ in 0..n {
            protos.push(Rc::new(self.read_proto(&source, depth + 1)?));
        }

        let n = self.read_count()?;
        let mut line_info = Vec::with_capacity(n.min(self.remaining()));
        for _ in 0..n {
            line_info.push(self.read_u32()?);
        }

        let n = self.read_count()?;
        let mut loc_vars = Vec::with_capacity(n.min(self.remaining()));
        for _ in 0..n {
            loc_vars.push(LocVar {
                name: self.read_string()?,
                start_pc: self.read_u32()?,
                end_pc: self.read_u32()?,
            });
        }

        let n = self.read_count()?;
        let mut upvalue_names = Vec::with_capacity(n.min(self.remaining()));
        for _ in 0..n {
            upvalue_names.push(self.read_string()?);
        }

        Ok(Prototype {
            source,
            line_defined,
            last_line_defined,
            num_params,
            is_vararg,
            max_stack_size,
            code,
            constants,
            upvalues,
            protos,
            line_info,
            loc_vars,
            upvalue_names,
        })
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_code(&mut self) -> Result<Vec<u32>, ChunkError> {
        let n = self.read_count()?;
        let mut code = Vec::with_capacity(n.min(self.remaining() / 4));
        for _ in 0..n {
            code.push(self.read_u32()?);
        }
        Ok(code)
    }

    fn read_constants(&mut self) -> Result<Vec<Constant>, ChunkError> {
        let n = self.read_count()?;
        let mut constants = Vec::with_capacity(n.min(self.remaining()));
        for _ in 0..n {
            constants.push(self.read_constant()?);
        }
        Ok(constants)
    }

    fn read_constant(&mut self) -> Result<Constant, ChunkError> {
        let offset = self.pos;
        let constant = match self.read_byte()? {
            TAG_NIL => Constant::Nil,
            TAG_BOOLEAN => Constant::Boolean(self.read_byte()? != 0),
            TAG_INTEGER => Constant::Integer(self.read_lua_integer()?),
            TAG_NUMBER => Constant::Number(self.read_lua_number()?),
            TAG_SHORT_STR | TAG_LONG_STR => Constant::String(LuaString::from(self.read_raw_string()?)),
            tag => return Err(ChunkError::UnknownConstantTag { tag, offset }),
        };
        Ok(constant)
    }

    fn read_upvalues(&mut self) -> Result<Vec<UpvalueDesc>, ChunkError> {
        let n = self.read_count()?;
        let mut upvalues = Vec::with_capacity(n.min(self.remaining()));
        for _ in 0..n {
            upvalues.push(UpvalueDesc {
                in_stack: self.read_byte()? != 0,
                index: self.read_byte()?,
            });
        }
        Ok(upvalues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(LUA_SIGNATURE);
        bytes.push(LUAC_VERSION);
        bytes.push(LUAC_FORMAT);
        bytes.extend_from_slice(LUAC_DATA);
        bytes.extend_from_slice(&[4, 8, 4, 8, 8]);
        bytes.extend_from_slice(&LUAC_INT.to_le_bytes());
        bytes.extend_from_slice(&LUAC_NUM.to_le_bytes());
        bytes
    }

    #[test]
    fn test_rejects_bad_signature() {
        assert_eq!(undump(b"\x1bLuc"), Err(ChunkError::NotAChunk));
        assert_eq!(undump(b""), Err(ChunkError::NotAChunk));
    }

    #[test]
    fn test_rejects_version_and_sizes() {
        let mut bytes = header();
        bytes[4] = 0x51;
        assert_eq!(undump(&bytes), Err(ChunkError::VersionMismatch(0x51)));

        let mut bytes = header();
        bytes[13] = 4;
        assert_eq!(
            undump(&bytes),
            Err(ChunkError::SizeMismatch { field: "size_t", expected: 8, got: 4 })
        );

        let mut bytes = header();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert_eq!(undump(&bytes), Err(ChunkError::FloatFormat));
    }

    #[test]
    fn test_short_read_is_fatal() {
        let bytes = header();
        assert!(matches!(undump(&bytes), Err(ChunkError::UnexpectedEof(_))));
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        let mut bytes = header();
        bytes.push(0); // main upvalue count
        for _ in 0..=MAX_PROTO_DEPTH + 1 {
            bytes.push(0); // source
            bytes.extend_from_slice(&[0; 8]); // line range
            bytes.extend_from_slice(&[0, 0, 2]);
            bytes.extend_from_slice(&0u32.to_le_bytes()); // code
            bytes.extend_from_slice(&0u32.to_le_bytes()); // constants
            bytes.extend_from_slice(&0u32.to_le_bytes()); // upvalues
            bytes.extend_from_slice(&1u32.to_le_bytes()); // one nested function
        }
        assert_eq!(undump(&bytes), Err(ChunkError::NestingTooDeep(MAX_PROTO_DEPTH)));
    }

    #[test]
    fn test_unknown_constant_tag() {
        let mut bytes = header();
        bytes.push(0); // main upvalue count
        bytes.push(0); // source
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&[0, 1, 2]);
        bytes.extend_from_slice(&0u32.to_le_bytes()); // code
        bytes.extend_from_slice(&1u32.to_le_bytes()); // constants
        let offset = bytes.len();
        bytes.push(0x07);
        assert_eq!(undump(&bytes), Err(ChunkError::UnknownConstantTag { tag: 0x07, offset }));
    }

    #[test]
    fn test_long_string_form() {
        let mut reader_bytes = vec![0xFF];
        reader_bytes.extend_from_slice(&4u64.to_le_bytes());
        reader_bytes.extend_from_slice(b"abc");
        let mut reader = Reader::new(&reader_bytes);
        assert_eq!(reader.read_raw_string().unwrap(), b"abc");
    }
}
