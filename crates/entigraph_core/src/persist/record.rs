//! Log records and their framing.
//!
//! A log file starts with [`LOG_MAGIC`] and continues with frames:
//!
//! ```text
//! ┌──────────────┬──────────────┬─────────────────────┐
//! │ len (u32 LE) │ crc (u32 LE) │ payload (CBOR map)  │
//! └──────────────┴──────────────┴─────────────────────┘
//! ```
//!
//! Each payload is one [`LogRecord`], keyed by `"k"`. References inside
//! persisted objects are tag 29 over `[index, generation]` of the stored
//! handle.

use crate::copier::{plain_value_to_slot, slot_to_value, value_to_slot};
use crate::error::{CoreError, CoreResult};
use crate::graph::{Handle, Object, Slot};
use crate::types::TypeName;
use entigraph_codec::{from_cbor, to_canonical_cbor, Value};
use sha2::{Digest, Sha256};

/// Magic bytes at the start of every log file.
pub const LOG_MAGIC: [u8; 8] = *b"ENTIGRF1";

/// Size of a frame header (length + checksum).
pub const FRAME_HEADER_LEN: usize = 8;

/// Upper bound on a single payload; anything larger is treated as a torn frame.
pub const MAX_PAYLOAD_LEN: usize = 256 * 1024 * 1024;

/// One entry of the persistence log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// A collection was created.
    Collection {
        /// Entity type.
        type_name: TypeName,
    },
    /// A stored object was written (created or replaced).
    Object {
        /// Storage handle.
        handle: Handle,
        /// Full contents.
        object: Object,
    },
    /// A stored object was freed.
    Freed {
        /// The handle before freeing.
        handle: Handle,
    },
    /// A collection gained or lost a member.
    Member {
        /// Entity type.
        type_name: TypeName,
        /// The member.
        handle: Handle,
        /// True for admission, false for removal.
        present: bool,
    },
    /// A collection's generated-identifier cursor moved.
    Cursor {
        /// Entity type.
        type_name: TypeName,
        /// New cursor value.
        id: Option<Slot>,
    },
    /// Everything since the previous commit is one batch.
    Commit {
        /// Batch number, counting from 1.
        batch: u64,
    },
    /// Closes a checkpoint: digest over every payload before it.
    Seal {
        /// Number of records covered.
        records: u64,
        /// SHA-256 of the covered payloads, in order.
        digest: [u8; 32],
    },
}

const KIND: &str = "k";

fn malformed(message: &str) -> CoreError {
    CoreError::persistence(format!("malformed log record: {message}"))
}

fn handle_value(handle: Handle) -> Value {
    Value::Array(vec![
        Value::Integer(i64::from(handle.index)),
        Value::Integer(i64::from(handle.generation)),
    ])
}

fn value_handle(value: &Value) -> CoreResult<Handle> {
    match value.as_array() {
        Some([index, generation]) => {
            let index = index.as_integer().and_then(|i| u32::try_from(i).ok());
            let generation = generation.as_integer().and_then(|g| u32::try_from(g).ok());
            index
                .zip(generation)
                .map(|(i, g)| Handle::new(i, g))
                .ok_or_else(|| malformed("handle out of range"))
        }
        _ => Err(malformed("handle is not a pair")),
    }
}

fn text<'v>(record: &'v Value, key: &str) -> CoreResult<&'v str> {
    record
        .get(key)
        .and_then(Value::as_text)
        .ok_or_else(|| malformed(key))
}

fn unsigned(record: &Value, key: &str) -> CoreResult<u64> {
    record
        .get(key)
        .and_then(Value::as_integer)
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| malformed(key))
}

fn object_value(handle: Handle, object: &Object) -> CoreResult<Value> {
    let mut fields = Vec::with_capacity(object.field_count());
    for (name, slot) in object.fields() {
        let value = slot_to_value(slot, &mut |h| Ok(handle_value(h)))?;
        fields.push((Value::from(name), value));
    }
    Ok(Value::map(vec![
        (Value::from(KIND), Value::from("object")),
        (Value::from("h"), handle_value(handle)),
        (Value::from("t"), Value::from(object.type_name().as_str())),
        (Value::from("f"), Value::map(fields)),
    ]))
}

fn value_object(record: &Value) -> CoreResult<Object> {
    let mut object = Object::new(text(record, "t")?);
    let fields = record
        .get("f")
        .and_then(Value::as_map)
        .ok_or_else(|| malformed("f"))?;
    for (name, value) in fields {
        let name = name.as_text().ok_or_else(|| malformed("field name"))?;
        object.set(name, value_to_slot(value, &mut |v: &Value| value_handle(v))?);
    }
    Ok(object)
}

impl LogRecord {
    /// Short name of the record kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Collection { .. } => "collection",
            Self::Object { .. } => "object",
            Self::Freed { .. } => "freed",
            Self::Member { present: true, .. } => "member+",
            Self::Member { present: false, .. } => "member-",
            Self::Cursor { .. } => "cursor",
            Self::Commit { .. } => "commit",
            Self::Seal { .. } => "seal",
        }
    }

    /// Converts the record to a CBOR value.
    ///
    /// # Errors
    ///
    /// Codec errors from field conversion.
    pub fn to_value(&self) -> CoreResult<Value> {
        let kind = (Value::from(KIND), Value::from(self.kind()));
        Ok(match self {
            Self::Collection { type_name } => Value::map(vec![
                kind,
                (Value::from("t"), Value::from(type_name.as_str())),
            ]),
            Self::Object { handle, object } => object_value(*handle, object)?,
            Self::Freed { handle } => {
                Value::map(vec![kind, (Value::from("h"), handle_value(*handle))])
            }
            Self::Member {
                type_name, handle, ..
            } => Value::map(vec![
                kind,
                (Value::from("t"), Value::from(type_name.as_str())),
                (Value::from("h"), handle_value(*handle)),
            ]),
            Self::Cursor { type_name, id } => {
                let mut pairs = vec![kind, (Value::from("t"), Value::from(type_name.as_str()))];
                if let Some(id) = id {
                    pairs.push((
                        Value::from("id"),
                        slot_to_value(id, &mut |h| Ok(handle_value(h)))?,
                    ));
                }
                Value::map(pairs)
            }
            Self::Commit { batch } => Value::map(vec![
                kind,
                (Value::from("b"), Value::Integer(i64::try_from(*batch).unwrap_or(i64::MAX))),
            ]),
            Self::Seal { records, digest } => Value::map(vec![
                kind,
                (Value::from("n"), Value::Integer(i64::try_from(*records).unwrap_or(i64::MAX))),
                (Value::from("d"), Value::Bytes(digest.to_vec())),
            ]),
        })
    }

    /// Parses a record from a CBOR value.
    ///
    /// # Errors
    ///
    /// `Persistence` for an unknown kind or a missing field.
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        Ok(match text(value, KIND)? {
            "collection" => Self::Collection {
                type_name: TypeName::new(text(value, "t")?),
            },
            "object" => Self::Object {
                handle: value_handle(value.get("h").ok_or_else(|| malformed("h"))?)?,
                object: value_object(value)?,
            },
            "freed" => Self::Freed {
                handle: value_handle(value.get("h").ok_or_else(|| malformed("h"))?)?,
            },
            kind @ ("member+" | "member-") => Self::Member {
                type_name: TypeName::new(text(value, "t")?),
                handle: value_handle(value.get("h").ok_or_else(|| malformed("h"))?)?,
                present: kind == "member+",
            },
            "cursor" => Self::Cursor {
                type_name: TypeName::new(text(value, "t")?),
                id: value.get("id").map(plain_value_to_slot).transpose()?,
            },
            "commit" => Self::Commit {
                batch: unsigned(value, "b")?,
            },
            "seal" => Self::Seal {
                records: unsigned(value, "n")?,
                digest: value
                    .get("d")
                    .and_then(Value::as_bytes)
                    .and_then(|d| <[u8; 32]>::try_from(d).ok())
                    .ok_or_else(|| malformed("d"))?,
            },
            other => return Err(malformed(&format!("unknown kind {other}"))),
        })
    }

    /// Encodes the record as a canonical CBOR payload.
    ///
    /// # Errors
    ///
    /// As for [`LogRecord::to_value`].
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        Ok(to_canonical_cbor(&self.to_value()?))
    }

    /// Decodes a payload.
    ///
    /// # Errors
    ///
    /// Codec errors, or `Persistence` for a malformed record.
    pub fn decode(payload: &[u8]) -> CoreResult<Self> {
        Self::from_value(&from_cbor(payload)?)
    }
}

/// Appends one framed payload to `out`.
pub fn write_frame(payload: &[u8], out: &mut Vec<u8>) {
    let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&compute_crc32(payload).to_le_bytes());
    out.extend_from_slice(payload);
}

/// Encodes and frames `records`, appending to `out`.
///
/// # Errors
///
/// Encoding errors.
pub fn write_records(records: &[LogRecord], out: &mut Vec<u8>) -> CoreResult<()> {
    for record in records {
        write_frame(&record.encode()?, out);
    }
    Ok(())
}

/// Encodes `records` as a checkpoint: every record, then a seal over them.
///
/// # Errors
///
/// Encoding errors.
pub fn write_sealed(records: &[LogRecord], out: &mut Vec<u8>) -> CoreResult<()> {
    let mut hasher = Sha256::new();
    for record in records {
        let payload = record.encode()?;
        hasher.update(&payload);
        write_frame(&payload, out);
    }
    let seal = LogRecord::Seal {
        records: records.len() as u64,
        digest: hasher.finalize().into(),
    };
    write_frame(&seal.encode()?, out);
    Ok(())
}

/// Result of reading a log image.
#[derive(Debug, Clone, Default)]
pub struct LogScan {
    /// Committed records, in log order.
    pub records: Vec<LogRecord>,
    /// Records after the last commit, discarded.
    pub uncommitted: usize,
    /// Byte offset just past the last commit (or the magic).
    pub committed_len: u64,
    /// Byte offset just past the last intact frame.
    pub valid_bytes: u64,
    /// Length of the scanned image.
    pub total_bytes: u64,
    /// True if the image ends in a partial or corrupt frame.
    pub torn: bool,
    /// Number of the last committed batch.
    pub batches: u64,
    /// True if a checkpoint seal was found and matched.
    pub sealed: bool,
}

impl LogScan {
    /// Returns true if replaying would drop any bytes.
    #[must_use]
    pub fn needs_repair(&self) -> bool {
        self.committed_len < self.total_bytes
    }
}

/// Reads a log image.
///
/// An empty image is a fresh log. Scanning stops at the first partial frame
/// or checksum mismatch; records past the last commit are not returned.
///
/// # Errors
///
/// `Persistence` if the magic is wrong, a checksummed payload fails to
/// decode, or a checkpoint seal does not match its records.
pub fn scan_log(bytes: &[u8]) -> CoreResult<LogScan> {
    let mut scan = LogScan {
        total_bytes: bytes.len() as u64,
        ..LogScan::default()
    };
    if bytes.is_empty() {
        return Ok(scan);
    }
    if bytes.len() < LOG_MAGIC.len() || bytes[..LOG_MAGIC.len()] != LOG_MAGIC {
        return Err(CoreError::persistence("not an entigraph log"));
    }

    let mut pos = LOG_MAGIC.len();
    scan.committed_len = pos as u64;
    scan.valid_bytes = pos as u64;

    let mut pending = Vec::new();
    let mut hasher = Sha256::new();
    let mut hashed = 0u64;

    while pos < bytes.len() {
        let rest = &bytes[pos..];
        if rest.len() < FRAME_HEADER_LEN {
            scan.torn = true;
            break;
        }
        let len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        let crc = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]);
        if len > MAX_PAYLOAD_LEN || rest.len() < FRAME_HEADER_LEN + len {
            scan.torn = true;
            break;
        }
        let payload = &rest[FRAME_HEADER_LEN..FRAME_HEADER_LEN + len];
        if compute_crc32(payload) != crc {
            scan.torn = true;
            break;
        }

        let record = LogRecord::decode(payload)?;
        pos += FRAME_HEADER_LEN + len;
        scan.valid_bytes = pos as u64;

        match record {
            LogRecord::Seal { records, digest } => {
                let expected: [u8; 32] = hasher.clone().finalize().into();
                if records != hashed || digest != expected {
                    return Err(CoreError::persistence("checkpoint seal does not match"));
                }
                scan.sealed = true;
            }
            LogRecord::Commit { batch } => {
                hasher.update(payload);
                hashed += 1;
                pending.push(record);
                scan.records.append(&mut pending);
                scan.batches = batch;
                scan.committed_len = pos as u64;
            }
            record => {
                hasher.update(payload);
                hashed += 1;
                pending.push(record);
            }
        }
    }

    scan.uncommitted = pending.len();
    Ok(scan)
}

/// Computes a CRC32 checksum (IEEE polynomial).
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
