//! Binary changeset encoding.
//!
//! ```text
//! "RIFT" u8:version u32:table_count table*
//! table     = str:name u32:column_count column* u32:op_count op*
//! column    = str:name str:decl_type u32:key_position (0 = not part of the key)
//! op        = u8:1 row                 insert
//!           | u8:2 row:key u32:n cell*  update
//!           | u8:3 row                 delete
//! cell      = u32:column value:old value:new
//! row       = u32:n value*
//! value     = u8:0 | u8:1 i64 | u8:2 f64 | u8:3 u32:len bytes | u8:4 u32:len bytes
//! str       = u32:len utf8
//! ```
//! All integers are little endian.

use std::collections::HashSet;
use std::path::Path;

use nom::bytes::complete::{tag, take};
use nom::error::{ErrorKind, ParseError};
use nom::number::complete::{le_f64, le_i64, le_u32, le_u8};
use nom::IResult;

use rift_core::{
    CellChange, Changeset, Column, Error, Operation, Result, RowKey, TableChanges, TableSchema,
    Value,
};

pub const MAGIC: &[u8; 4] = b"RIFT";
pub const FORMAT_VERSION: u8 = 1;

const OP_INSERT: u8 = 1;
const OP_UPDATE: u8 = 2;
const OP_DELETE: u8 = 3;

const VALUE_NULL: u8 = 0;
const VALUE_INTEGER: u8 = 1;
const VALUE_REAL: u8 = 2;
const VALUE_TEXT: u8 = 3;
const VALUE_BLOB: u8 = 4;

/// Serialize a changeset. Deterministic: equal changesets give equal bytes.
pub fn encode(changeset: &Changeset) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.push(FORMAT_VERSION);
    put_len(&mut out, changeset.tables().len());

    for table in changeset.tables() {
        put_str(&mut out, &table.schema.name);
        put_len(&mut out, table.schema.columns.len());
        for column in &table.schema.columns {
            put_str(&mut out, &column.name);
            put_str(&mut out, &column.decl_type);
            put_len(&mut out, column.key_position.map_or(0, |p| p + 1));
        }

        put_len(&mut out, table.operations.len());
        for op in &table.operations {
            match op {
                Operation::Insert { values, .. } => {
                    out.push(OP_INSERT);
                    put_row(&mut out, values);
                }
                Operation::Update { key, cells } => {
                    out.push(OP_UPDATE);
                    put_row(&mut out, key.values());
                    put_len(&mut out, cells.len());
                    for cell in cells {
                        put_len(&mut out, cell.column);
                        put_value(&mut out, &cell.old);
                        put_value(&mut out, &cell.new);
                    }
                }
                Operation::Delete { values, .. } => {
                    out.push(OP_DELETE);
                    put_row(&mut out, values);
                }
            }
        }
    }
    out
}

// SQLite caps strings, blobs and column counts well below u32::MAX.
fn put_len(out: &mut Vec<u8>, len: usize) {
    out.extend_from_slice(&(len as u32).to_le_bytes());
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    put_len(out, s.len());
    out.extend_from_slice(s.as_bytes());
}

fn put_row(out: &mut Vec<u8>, values: &[Value]) {
    put_len(out, values.len());
    for value in values {
        put_value(out, value);
    }
}

fn put_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => out.push(VALUE_NULL),
        Value::Integer(v) => {
            out.push(VALUE_INTEGER);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::Real(v) => {
            out.push(VALUE_REAL);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::Text(v) => {
            out.push(VALUE_TEXT);
            put_len(out, v.len());
            out.extend_from_slice(v);
        }
        Value::Blob(v) => {
            out.push(VALUE_BLOB);
            put_len(out, v.len());
            out.extend_from_slice(v);
        }
    }
}

/// Parse error carrying the remaining input, so the byte offset can be reported.
#[derive(Debug)]
struct DecodeError<'a> {
    input: &'a [u8],
    reason: String,
}

impl<'a> ParseError<&'a [u8]> for DecodeError<'a> {
    fn from_error_kind(input: &'a [u8], kind: ErrorKind) -> Self {
        let reason = match kind {
            ErrorKind::Eof => "unexpected end of input".to_string(),
            ErrorKind::Tag => "bad magic header".to_string(),
            other => format!("malformed input ({:?})", other),
        };
        Self { input, reason }
    }

    fn append(_input: &'a [u8], _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

type Parsed<'a, T> = IResult<&'a [u8], T, DecodeError<'a>>;

fn fail<'a, T>(input: &'a [u8], reason: impl Into<String>) -> Parsed<'a, T> {
    Err(nom::Err::Failure(DecodeError {
        input,
        reason: reason.into(),
    }))
}

fn byte(input: &[u8]) -> Parsed<'_, u8> {
    le_u8(input)
}

fn uint(input: &[u8]) -> Parsed<'_, u32> {
    le_u32(input)
}

fn int(input: &[u8]) -> Parsed<'_, i64> {
    le_i64(input)
}

fn float(input: &[u8]) -> Parsed<'_, f64> {
    le_f64(input)
}

fn take_bytes(input: &[u8], len: u32) -> Parsed<'_, &[u8]> {
    take(len as usize)(input)
}

fn magic(input: &[u8]) -> Parsed<'_, &[u8]> {
    tag(&MAGIC[..])(input)
}

/// Parse a changeset, rejecting anything that is not exactly one valid
/// encoding (including trailing bytes).
pub fn decode(bytes: &[u8]) -> Result<Changeset> {
    match changeset(bytes) {
        Ok((_, changeset)) => Ok(changeset),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err(Error::corrupt(bytes.len() - e.input.len(), e.reason))
        }
        Err(nom::Err::Incomplete(_)) => {
            Err(Error::corrupt(bytes.len(), "unexpected end of input"))
        }
    }
}

fn changeset(input: &[u8]) -> Parsed<'_, Changeset> {
    let (input, _) = magic(input)?;
    let (rest, version) = byte(input)?;
    if version != FORMAT_VERSION {
        return fail(input, format!("unsupported format version {}", version));
    }
    let (mut input, table_count) = uint(rest)?;

    let mut seen = HashSet::new();
    let mut out = Changeset::new();
    for _ in 0..table_count {
        let start = input;
        let (rest, table) = table(input)?;
        if !seen.insert(table.schema.name.clone()) {
            return fail(start, format!("duplicate table '{}'", table.schema.name));
        }
        out.push_table(table);
        input = rest;
    }

    if !input.is_empty() {
        return fail(input, format!("{} trailing bytes", input.len()));
    }
    Ok((input, out))
}

fn table(input: &[u8]) -> Parsed<'_, TableChanges> {
    let (input, schema) = table_schema(input)?;
    let (mut input, op_count) = uint(input)?;
    if op_count == 0 {
        return fail(input, format!("table '{}' has no operations", schema.name));
    }

    let mut table = TableChanges::new(schema);
    for _ in 0..op_count {
        let start = input;
        let (rest, op) = operation(input, &table.schema)?;
        if let Some(last) = table.operations.last() {
            if last.key() >= op.key() {
                return fail(
                    start,
                    format!("keys of table '{}' are not strictly ascending", table.schema.name),
                );
            }
        }
        table.push(op);
        input = rest;
    }
    Ok((input, table))
}

fn table_schema(input: &[u8]) -> Parsed<'_, TableSchema> {
    let (input, name) = string(input)?;
    let (mut input, column_count) = uint(input)?;
    let header = input;

    let mut columns = Vec::new();
    for _ in 0..column_count {
        let (rest, column_name) = string(input)?;
        let (rest, decl_type) = string(rest)?;
        let (rest, position) = uint(rest)?;
        columns.push(Column {
            name: column_name,
            decl_type,
            key_position: position.checked_sub(1).map(|p| p as usize),
        });
        input = rest;
    }

    // Key positions must be exactly 0..k with k >= 1
    let mut positions: Vec<usize> = columns.iter().filter_map(|c| c.key_position).collect();
    positions.sort_unstable();
    if positions.is_empty() || positions.iter().enumerate().any(|(i, p)| i != *p) {
        return fail(header, format!("table '{}' has an invalid primary key", name));
    }
    Ok((input, TableSchema::new(name, columns)))
}

fn operation<'a>(input: &'a [u8], schema: &TableSchema) -> Parsed<'a, Operation> {
    let (rest, op_tag) = byte(input)?;
    match op_tag {
        OP_INSERT | OP_DELETE => {
            let (rest, values) = row(rest)?;
            if values.len() != schema.column_count() {
                return fail(
                    rest,
                    format!(
                        "row has {} values but table '{}' has {} columns",
                        values.len(),
                        schema.name,
                        schema.column_count()
                    ),
                );
            }
            let key = schema.key_of(&values);
            let op = if op_tag == OP_INSERT {
                Operation::Insert { key, values }
            } else {
                Operation::Delete { key, values }
            };
            Ok((rest, op))
        }
        OP_UPDATE => {
            let (rest, key) = row(rest)?;
            if key.len() != schema.key_columns().len() {
                return fail(
                    rest,
                    format!(
                        "key has {} values, expected {}",
                        key.len(),
                        schema.key_columns().len()
                    ),
                );
            }
            let (mut rest, cell_count) = uint(rest)?;
            if cell_count == 0 {
                return fail(rest, "update without changed columns");
            }
            let mut cells: Vec<CellChange> = Vec::new();
            for _ in 0..cell_count {
                let start = rest;
                let (r, column) = uint(rest)?;
                let column = column as usize;
                if column >= schema.column_count() || schema.is_key_column(column) {
                    return fail(start, format!("update names invalid column {}", column));
                }
                if cells.last().is_some_and(|c| c.column >= column) {
                    return fail(start, "update columns are not ascending");
                }
                let (r, old) = value(r)?;
                let (r, new) = value(r)?;
                cells.push(CellChange::new(column, old, new));
                rest = r;
            }
            Ok((
                rest,
                Operation::Update {
                    key: RowKey::new(key),
                    cells,
                },
            ))
        }
        other => fail(input, format!("unknown operation tag {}", other)),
    }
}

fn row(input: &[u8]) -> Parsed<'_, Vec<Value>> {
    let (mut input, count) = uint(input)?;
    // Every value takes at least one byte
    if count as usize > input.len() {
        return fail(input, format!("row length {} exceeds remaining input", count));
    }
    let mut values = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (rest, v) = value(input)?;
        values.push(v);
        input = rest;
    }
    Ok((input, values))
}

fn value(input: &[u8]) -> Parsed<'_, Value> {
    let (rest, value_tag) = byte(input)?;
    match value_tag {
        VALUE_NULL => Ok((rest, Value::Null)),
        VALUE_INTEGER => {
            let (rest, v) = int(rest)?;
            Ok((rest, Value::Integer(v)))
        }
        VALUE_REAL => {
            let (rest, v) = float(rest)?;
            Ok((rest, Value::Real(v)))
        }
        VALUE_TEXT => {
            let (rest, len) = uint(rest)?;
            let (rest, bytes) = take_bytes(rest, len)?;
            Ok((rest, Value::Text(bytes.to_vec())))
        }
        VALUE_BLOB => {
            let (rest, len) = uint(rest)?;
            let (rest, bytes) = take_bytes(rest, len)?;
            Ok((rest, Value::Blob(bytes.to_vec())))
        }
        other => fail(input, format!("unknown value tag {}", other)),
    }
}

fn string(input: &[u8]) -> Parsed<'_, String> {
    let (rest, len) = uint(input)?;
    let (rest, bytes) = take_bytes(rest, len)?;
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok((rest, s.to_string())),
        Err(_) => fail(input, "invalid UTF-8 in string"),
    }
}

/// Read and decode a changeset file.
pub fn read_file(path: &Path) -> Result<Changeset> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::Io(format!("cannot read changeset {}: {}", path.display(), e)))?;
    decode(&bytes)
}

/// Encode and write a changeset file.
pub fn write_file(path: &Path, changeset: &Changeset) -> Result<()> {
    std::fs::write(path, encode(changeset))
        .map_err(|e| Error::Io(format!("cannot write changeset {}: {}", path.display(), e)))
}
