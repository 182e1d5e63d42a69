//! Minimal DER encoder for the handful of ASN.1 types a `TimeStampReq` uses.
//!
//! Values are built as a tree of [`Asn1Node`]s. Lengths are only computed on
//! encoding, children first, so a constructed node's length always matches
//! the bytes its children actually produce.

pub const TAG_BOOLEAN: u8 = 0x01;
pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_OID: u8 = 0x06;
pub const TAG_SEQUENCE: u8 = 0x30;

/// `id-sha256`, 2.16.840.1.101.3.4.2.1.
pub const OID_SHA256: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 1];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asn1Node {
    Primitive { tag: u8, content: Vec<u8> },
    Constructed { tag: u8, children: Vec<Asn1Node> },
}

impl Asn1Node {
    /// Length of the content octets, excluding tag and length prefix.
    pub fn content_len(&self) -> usize {
        match self {
            Asn1Node::Primitive { content, .. } => content.len(),
            Asn1Node::Constructed { children, .. } => {
                children.iter().map(Asn1Node::encoded_len).sum()
            }
        }
    }

    /// Full TLV length.
    pub fn encoded_len(&self) -> usize {
        let content_len = self.content_len();
        1 + length_octets(content_len) + content_len
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Asn1Node::Primitive { tag, content } => {
                out.push(*tag);
                write_length(out, content.len());
                out.extend_from_slice(content);
            }
            Asn1Node::Constructed { tag, children } => {
                out.push(*tag);
                write_length(out, self.content_len());
                for child in children {
                    child.encode_into(out);
                }
            }
        }
    }
}

fn length_octets(len: usize) -> usize {
    if len < 0x80 {
        1
    } else {
        1 + significant_bytes(len).len()
    }
}

fn significant_bytes(len: usize) -> Vec<u8> {
    let bytes = len.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    bytes[first..].to_vec()
}

/// Short form below 128, long form (`0x80 | n` followed by `n` bytes) above.
fn write_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = significant_bytes(len);
        out.push(0x80 | bytes.len() as u8);
        out.extend_from_slice(&bytes);
    }
}

pub fn sequence(children: Vec<Asn1Node>) -> Asn1Node {
    Asn1Node::Constructed {
        tag: TAG_SEQUENCE,
        children,
    }
}

pub fn small_integer(value: u64) -> Asn1Node {
    unsigned_integer(&value.to_be_bytes())
}

/// Non-negative INTEGER from big-endian magnitude bytes, in minimal form.
pub fn unsigned_integer(magnitude: &[u8]) -> Asn1Node {
    let first = magnitude
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(magnitude.len());
    let trimmed = &magnitude[first..];

    let mut content = Vec::with_capacity(trimmed.len() + 1);
    // A set high bit would read as negative.
    if trimmed.first().map_or(true, |b| b & 0x80 != 0) {
        content.push(0x00);
    }
    content.extend_from_slice(trimmed);

    Asn1Node::Primitive {
        tag: TAG_INTEGER,
        content,
    }
}

pub fn octet_string(bytes: &[u8]) -> Asn1Node {
    Asn1Node::Primitive {
        tag: TAG_OCTET_STRING,
        content: bytes.to_vec(),
    }
}

pub fn null() -> Asn1Node {
    Asn1Node::Primitive {
        tag: TAG_NULL,
        content: Vec::new(),
    }
}

pub fn boolean(value: bool) -> Asn1Node {
    Asn1Node::Primitive {
        tag: TAG_BOOLEAN,
        content: vec![if value { 0xff } else { 0x00 }],
    }
}

/// OBJECT IDENTIFIER from its arcs. Needs at least two arcs.
pub fn oid(arcs: &[u64]) -> Asn1Node {
    let mut content = Vec::new();
    if let [first, second, rest @ ..] = arcs {
        push_base128(&mut content, first * 40 + second);
        for arc in rest {
            push_base128(&mut content, *arc);
        }
    }
    Asn1Node::Primitive {
        tag: TAG_OID,
        content,
    }
}

fn push_base128(out: &mut Vec<u8>, mut value: u64) {
    let mut groups = vec![(value & 0x7f) as u8];
    value >>= 7;
    while value > 0 {
        groups.push((value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
    groups.reverse();
    out.extend_from_slice(&groups);
}
