//! Bitstream framer.
//!
//! Splits a raw compressed byte stream into discrete coded units and
//! classifies each one. Pure, stateless parsing: unit boundaries are
//! 3- or 4-byte start codes, the unit type is the low 5 bits of the
//! first byte after the start code.

use bytes::Bytes;

// ── UnitKind ─────────────────────────────────────────────────────

/// Classification of a coded unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Parameter set (type 7 or 8). Cached, not decoded directly.
    Config,
    /// Self-contained decodable picture (type 5).
    Key,
    /// Picture depending on prior decoder state (type 1).
    Delta,
    /// Anything else. Ignored by the engines.
    Other,
}

/// One delimited chunk of compressed bitstream, start code included.
#[derive(Debug, Clone)]
pub struct CodedUnit {
    pub kind: UnitKind,
    pub bytes: Bytes,
}

// ── Parsing ──────────────────────────────────────────────────────

/// Splits one arrival into classified coded units.
pub fn parse_units(data: &Bytes) -> Vec<CodedUnit> {
    split_units(data)
        .into_iter()
        .map(|bytes| CodedUnit {
            kind: classify(&bytes),
            bytes,
        })
        .collect()
}

/// Locates unit boundaries by scanning for start codes. Slices share
/// the arrival's backing storage, no copies.
///
/// Arrivals shorter than 5 bytes cannot hold a unit and yield nothing.
/// An arrival with no start codes at all is passed through as a single
/// unit so self-delimited payloads still flow.
pub fn split_units(data: &Bytes) -> Vec<Bytes> {
    if data.len() < 5 {
        return Vec::new();
    }

    let bytes = data.as_ref();
    let mut units = Vec::new();
    let mut current_start: Option<usize> = None;
    let mut index = 0;

    while index + 4 <= bytes.len() {
        let code_len = start_code_len(bytes, index);
        if code_len > 0 {
            if let Some(start) = current_start
                && index > start
            {
                units.push(data.slice(start..index));
            }
            current_start = Some(index);
            index += code_len;
            continue;
        }
        index += 1;
    }

    if let Some(start) = current_start {
        units.push(data.slice(start..));
    }

    if units.is_empty() {
        units.push(data.clone());
    }

    units
}

/// Length of the start code at `index`, or 0 if there is none.
fn start_code_len(bytes: &[u8], index: usize) -> usize {
    if bytes[index..].starts_with(&[0x00, 0x00, 0x00, 0x01]) {
        4
    } else if bytes[index..].starts_with(&[0x00, 0x00, 0x01]) {
        3
    } else {
        0
    }
}

/// Reads the unit type: low 5 bits of the first byte after the start
/// code. `None` for units too short to carry one.
pub fn unit_type(unit: &[u8]) -> Option<u8> {
    if unit.len() < 5 {
        return None;
    }
    let offset = start_code_len(unit, 0);
    if offset >= unit.len() {
        return None;
    }
    Some(unit[offset] & 0x1f)
}

/// Maps a raw unit type to its classification.
pub fn classify(unit: &[u8]) -> UnitKind {
    match unit_type(unit) {
        Some(5) => UnitKind::Key,
        Some(1) => UnitKind::Delta,
        Some(7) | Some(8) => UnitKind::Config,
        _ => UnitKind::Other,
    }
}

/// Whether any unit in the arrival is a key frame.
pub fn contains_key(data: &Bytes) -> bool {
    split_units(data)
        .iter()
        .any(|unit| classify(unit) == UnitKind::Key)
}
