//! Chunk encoder, the inverse of [`undump`](super::undump)

use super::*;

/// Encode a prototype tree as a binary chunk
pub fn dump(proto: &Prototype) -> Vec<u8> {
    let mut writer = Writer { buf: Vec::with_capacity(64 + proto.code.len() * 4) };
    writer.write_header();
    writer.write_byte(proto.upvalues.len() as u8);
    writer.write_proto(proto, None);
    writer.buf
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn write_byte(&mut self, b: u8) {
        self.buf.push(b);
    }

    fn write_u32(&mut self, n: u32) {
        self.buf.extend_from_slice(&n.to_le_bytes());
    }

    fn write_count(&mut self, n: usize) {
        self.write_u32(n as u32);
    }

    fn write_raw_string(&mut self, s: Option<&[u8]>) {
        let Some(bytes) = s else {
            self.write_byte(0);
            return;
        };
        let size = bytes.len() + 1;
        if size < 0xFF {
            self.write_byte(size as u8);
        } else {
            self.write_byte(0xFF);
            self.buf.extend_from_slice(&(size as u64).to_le_bytes());
        }
        self.buf.extend_from_slice(bytes);
    }

    fn write_header(&mut self) {
        self.buf.extend_from_slice(LUA_SIGNATURE);
        self.write_byte(LUAC_VERSION);
        self.write_byte(LUAC_FORMAT);
        self.buf.extend_from_slice(LUAC_DATA);
        self.write_byte(CINT_SIZE);
        self.write_byte(CSIZET_SIZE);
        self.write_byte(INSTRUCTION_SIZE);
        self.write_byte(LUA_INTEGER_SIZE);
        self.write_byte(LUA_NUMBER_SIZE);
        self.buf.extend_from_slice(&LUAC_INT.to_le_bytes());
        self.buf.extend_from_slice(&LUAC_NUM.to_le_bytes());
    }

    fn write_proto(&mut self, proto: &Prototype, parent_source: Option<&str>) {
        // Nested prototypes sharing the parent's source store none
        if parent_source == Some(proto.source.as_str()) {
            self.write_raw_string(None);
        } else {
            self.write_raw_string(Some(proto.source.as_bytes()));
        }
        self.write_u32(proto.line_defined);
        self.write_u32(proto.last_line_defined);
        self.write_byte(proto.num_params);
        self.write_byte(proto.is_vararg as u8);
        self.write_byte(proto.max_stack_size);

        self.write_count(proto.code.len());
        for &word in &proto.code {
            self.write_u32(word);
        }

        self.write_count(proto.constants.len());
        for constant in &proto.constants {
            match constant {
                Constant::Nil => self.write_byte(TAG_NIL),
                Constant::Boolean(b) => {
                    self.write_byte(TAG_BOOLEAN);
                    self.write_byte(*b as u8);
                }
                Constant::Integer(i) => {
                    self.write_byte(TAG_INTEGER);
                    self.buf.extend_from_slice(&i.to_le_bytes());
                }
                Constant::Number(n) => {
                    self.write_byte(TAG_NUMBER);
                    self.buf.extend_from_slice(&n.to_bits().to_le_bytes());
                }
                Constant::String(s) => {
                    // Lua 5.3 keeps strings up to 40 bytes short
                    self.write_byte(if s.len() <= 40 { TAG_SHORT_STR } else { TAG_LONG_STR });
                    self.write_raw_string(Some(s.as_bytes()));
                }
            }
        }

        self.write_count(proto.upvalues.len());
        for upvalue in &proto.upvalues {
            self.write_byte(upvalue.in_stack as u8);
            self.write_byte(upvalue.index);
        }

        self.write_count(proto.protos.len());
        for child in &proto.protos {
            self.write_proto(child, Some(&proto.source));
        }

        self.write_count(proto.line_info.len());
        for &line in &proto.line_info {
            self.write_u32(line);
        }

        self.write_count(proto.loc_vars.len());
        for var in &proto.loc_vars {
            self.write_raw_string(Some(var.name.as_bytes()));
            self.write_u32(var.start_pc);
            self.write_u32(var.end_pc);
        }

        self.write_count(proto.upvalue_names.len());
        for name in &proto.upvalue_names {
            self.write_raw_string(Some(name.as_bytes()));
        }
    }
}
