// qti-session-core/src/codec.rs
// ============================================================================
// Module: Binary Snapshot Codec
// Description: Versioned, deterministic serialization of a Test Session to
//              and from an octet stream, indexing the AssessmentTest's
//              components by (class, index) rather than by name.
// Purpose: Give a `SessionStream` implementation something to persist and
//          restore without re-deriving a session through its lifecycle.
// Dependencies: crate::core, crate::driver, crate::item, crate::route,
//               crate::duration, crate::pending, crate::config
// ============================================================================

//! ## Overview
//! [`encode`] writes a [`TestSessionDriver`] to a compact byte stream;
//! [`decode`] reconstructs one from that stream plus a caller-supplied,
//! already-materialized [`Route`] over the same [`AssessmentTest`]. The
//! supplied Route is not rebuilt from the stream — the stream carries only
//! enough per-RouteItem identity (testPart, section chain, item reference,
//! occurrence) to cross-check it against what the caller handed in, raising
//! [`CodecError::RouteMismatch`] on any divergence. This keeps the codec
//! free of the index-into-branchRules/preConditions bookkeeping a full
//! from-scratch Route reconstruction would need, while still catching a
//! snapshot restored against the wrong model or the wrong Route.
//!
//! Beyond the normative stream layout (test session state, route cursor,
//! per-occurrence RouteItem/ItemSession pairs, global outcome values), the
//! stream also carries the duration store, pending response store,
//! last-occurrence-update map, visited-test-parts set, path, and time
//! reference — none of these are named by the literal field list, but all
//! of them are part of a TestSession's state (§3), and dropping them would
//! break `decode(encode(s)) == s` for any session that has accrued time,
//! queued simultaneous-mode responses, or tracked navigation history.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::core::hashing::hash_canonical_json;
use crate::core::hashing::HashAlgorithm;
use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::model::AssessmentItemRefDecl;
use crate::core::model::AssessmentTest;
use crate::core::model::BaseType;
use crate::core::model::Cardinality;
use crate::core::model::NavigationMode;
use crate::core::model::SubmissionMode;
use crate::core::time::Observation;
use crate::core::variable::QtiValue;
use crate::core::variable::SingleValue;
use crate::core::variable::State;
use crate::core::variable::Variable;
use crate::core::variable::VariableKind;
use crate::driver::TestSessionDriver;
use crate::duration::DurationStore;
use crate::interfaces::ExpressionEngine;
use crate::item::CompletionStatus;
use crate::item::ItemSession;
use crate::item::ItemSessionState;
use crate::item::ItemSessionStore;
use crate::pending::PendingResponseStore;
use crate::route::Route;
use crate::route::RouteItem;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised encoding or decoding a Test Session snapshot.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The stream ended before a required field could be read.
    #[error("unexpected end of snapshot stream")]
    UnexpectedEof,
    /// A varint continued past the widest value this codec writes.
    #[error("varint overflow while reading snapshot stream")]
    VarintOverflow,
    /// A tag byte did not name a known variant of the field named by
    /// `context`.
    #[error("invalid {context} tag: {tag}")]
    InvalidTag {
        /// The field being decoded.
        context: String,
        /// The unrecognized tag byte.
        tag: u8,
    },
    /// A length-prefixed string was not valid UTF-8.
    #[error("invalid utf-8 in snapshot stream: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    /// A count exceeded the single-byte width the stream format uses for it.
    #[error("{detail}")]
    CapacityExceeded {
        /// Description of the field and the value that overflowed it.
        detail: String,
    },
    /// The decoded `RouteItem` identity does not match the caller-supplied
    /// Route at the same position.
    #[error("route mismatch: {detail}")]
    RouteMismatch {
        /// Description of the mismatched field.
        detail: String,
    },
    /// A decoded response or outcome identifier is not declared on the item
    /// reference the Seeker resolved.
    #[error("unknown declaration: {detail}")]
    UnknownDeclaration {
        /// Description of the missing declaration.
        detail: String,
    },
    /// The snapshot's trailing `modelHash` does not match the supplied
    /// `AssessmentTest`'s fingerprint.
    #[error("model mismatch: {detail}")]
    ModelMismatch {
        /// Description of the mismatch.
        detail: String,
    },
    /// Computing the optional `modelHash` field failed.
    #[error("failed to hash model fingerprint: {0}")]
    Hash(#[from] HashError),
    /// Restoring the supplied Route's cursor position failed.
    #[error("failed to restore route cursor: {0}")]
    Route(#[from] crate::route::RouteError),
}

// ============================================================================
// SECTION: Byte Stream Primitives
// ============================================================================

/// Appends binary-encoded fields to a growable buffer.
#[derive(Debug, Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    const fn new() -> Self {
        Self {
            buf: Vec::new(),
        }
    }

    fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Writes `value` as a little-endian base-128 varint.
    fn write_varint(&mut self, mut value: u32) {
        loop {
            let low_bits = u8::try_from(value & 0x7f).unwrap_or(0);
            value >>= 7;
            if value == 0 {
                self.write_u8(low_bits);
                break;
            }
            self.write_u8(low_bits | 0x80);
        }
    }

    fn write_capped_u8(&mut self, value: usize, context: &str) -> Result<(), CodecError> {
        let byte = u8::try_from(value).map_err(|_| CodecError::CapacityExceeded {
            detail: format!("{context} value {value} does not fit in a single byte"),
        })?;
        self.write_u8(byte);
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_varint(u32::try_from(bytes.len()).unwrap_or(u32::MAX));
        self.buf.extend_from_slice(bytes);
    }

    fn write_string(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }

    fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads binary-encoded fields from a borrowed byte slice, advancing a
/// cursor.
#[derive(Debug)]
struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            position: 0,
        }
    }

    fn read_u8(&mut self) -> Result<u8, CodecError> {
        let byte = *self.bytes.get(self.position).ok_or(CodecError::UnexpectedEof)?;
        self.position += 1;
        Ok(byte)
    }

    fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_u8()? != 0)
    }

    fn read_n(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self.position.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        let slice = self.bytes.get(self.position..end).ok_or(CodecError::UnexpectedEof)?;
        self.position = end;
        Ok(slice)
    }

    fn read_i32(&mut self) -> Result<i32, CodecError> {
        let bytes: [u8; 4] = self.read_n(4)?.try_into().map_err(|_| CodecError::UnexpectedEof)?;
        Ok(i32::from_be_bytes(bytes))
    }

    fn read_f64(&mut self) -> Result<f64, CodecError> {
        let bytes: [u8; 8] = self.read_n(8)?.try_into().map_err(|_| CodecError::UnexpectedEof)?;
        Ok(f64::from_be_bytes(bytes))
    }

    fn read_i64(&mut self) -> Result<i64, CodecError> {
        let bytes: [u8; 8] = self.read_n(8)?.try_into().map_err(|_| CodecError::UnexpectedEof)?;
        Ok(i64::from_be_bytes(bytes))
    }

    fn read_varint(&mut self) -> Result<u32, CodecError> {
        let mut result: u32 = 0;
        let mut shift: u32 = 0;
        loop {
            let byte = self.read_u8()?;
            result |= u32::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
            if shift >= 35 {
                return Err(CodecError::VarintOverflow);
            }
        }
    }

    fn read_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = usize::try_from(self.read_varint()?).unwrap_or(usize::MAX);
        Ok(self.read_n(len)?.to_vec())
    }

    fn read_string(&mut self) -> Result<String, CodecError> {
        String::from_utf8(self.read_bytes()?).map_err(CodecError::from)
    }
}

// ============================================================================
// SECTION: Seeker
// ============================================================================

/// Indexes an [`AssessmentTest`]'s components by class so the stream can
/// refer to a testPart, section, or item reference by a compact integer
/// position instead of repeating its identifier string.
#[derive(Debug, Clone, Copy)]
struct Seeker<'a> {
    test: &'a AssessmentTest,
}

/// A minimal, serializable summary of a model's component identifiers, used
/// only to compute the optional `modelHash` field (§A2). Not persisted.
#[derive(Debug, Serialize)]
struct ModelFingerprint {
    test_parts: Vec<String>,
    sections: Vec<String>,
    item_refs: Vec<String>,
}

impl<'a> Seeker<'a> {
    const fn new(test: &'a AssessmentTest) -> Self {
        Self {
            test,
        }
    }

    fn test_part_index(&self, identifier: &str) -> Option<usize> {
        self.test.test_parts.iter().position(|part| part.identifier == identifier)
    }

    fn section_index(&self, identifier: &str) -> Option<usize> {
        self.test.sections.iter().position(|section| section.identifier == identifier)
    }

    fn item_ref_decl(&self, identifier: &str) -> Option<&'a AssessmentItemRefDecl> {
        self.test.item_ref(identifier)
    }

    /// Looks up the navigation/submission mode a RouteItem's item session
    /// inherits from its containing testPart.
    fn modes_for_test_part(&self, test_part_identifier: &str) -> Option<(NavigationMode, SubmissionMode)> {
        self.test.test_part(test_part_identifier).map(|part| (part.navigation_mode, part.submission_mode))
    }

    fn fingerprint(&self) -> ModelFingerprint {
        ModelFingerprint {
            test_parts: self.test.test_parts.iter().map(|part| part.identifier.clone()).collect(),
            sections: self.test.sections.iter().map(|section| section.identifier.clone()).collect(),
            item_refs: self.test.item_refs.iter().map(|item_ref| item_ref.identifier.clone()).collect(),
        }
    }

    fn fingerprint_hash(&self, algorithm: HashAlgorithm) -> Result<HashDigest, CodecError> {
        Ok(hash_canonical_json(algorithm, &self.fingerprint())?)
    }
}

// ============================================================================
// SECTION: Tag Mappings
// ============================================================================

const fn test_session_state_tag(state: crate::driver::TestSessionState) -> u8 {
    use crate::driver::TestSessionState;
    match state {
        TestSessionState::Initial => 1,
        TestSessionState::Interacting => 2,
        TestSessionState::Suspended => 3,
        TestSessionState::Closed => 4,
        TestSessionState::ModalFeedback => 5,
    }
}

fn test_session_state_from_tag(tag: u8) -> Result<crate::driver::TestSessionState, CodecError> {
    use crate::driver::TestSessionState;
    match tag {
        1 => Ok(TestSessionState::Initial),
        2 => Ok(TestSessionState::Interacting),
        3 => Ok(TestSessionState::Suspended),
        4 => Ok(TestSessionState::Closed),
        5 => Ok(TestSessionState::ModalFeedback),
        other => Err(CodecError::InvalidTag {
            context: "testSessionState".to_string(),
            tag: other,
        }),
    }
}

const fn item_session_state_tag(state: ItemSessionState) -> u8 {
    match state {
        ItemSessionState::NotSelected => 1,
        ItemSessionState::Initial => 2,
        ItemSessionState::Interacting => 3,
        ItemSessionState::Suspended => 4,
        ItemSessionState::Closed => 5,
        ItemSessionState::Solution => 6,
        ItemSessionState::Review => 7,
        ItemSessionState::ModalFeedback => 8,
    }
}

fn item_session_state_from_tag(tag: u8) -> Result<ItemSessionState, CodecError> {
    match tag {
        1 => Ok(ItemSessionState::NotSelected),
        2 => Ok(ItemSessionState::Initial),
        3 => Ok(ItemSessionState::Interacting),
        4 => Ok(ItemSessionState::Suspended),
        5 => Ok(ItemSessionState::Closed),
        6 => Ok(ItemSessionState::Solution),
        7 => Ok(ItemSessionState::Review),
        8 => Ok(ItemSessionState::ModalFeedback),
        other => Err(CodecError::InvalidTag {
            context: "itemSessionState".to_string(),
            tag: other,
        }),
    }
}

const fn completion_status_tag(status: CompletionStatus) -> u8 {
    match status {
        CompletionStatus::NotAttempted => 0,
        CompletionStatus::Unknown => 1,
        CompletionStatus::Completed => 2,
        CompletionStatus::Incomplete => 3,
    }
}

fn completion_status_from_tag(tag: u8) -> Result<CompletionStatus, CodecError> {
    match tag {
        0 => Ok(CompletionStatus::NotAttempted),
        1 => Ok(CompletionStatus::Unknown),
        2 => Ok(CompletionStatus::Completed),
        3 => Ok(CompletionStatus::Incomplete),
        other => Err(CodecError::InvalidTag {
            context: "completionStatus".to_string(),
            tag: other,
        }),
    }
}

const fn base_type_tag(base_type: BaseType) -> u8 {
    match base_type {
        BaseType::Identifier => 0,
        BaseType::Boolean => 1,
        BaseType::Integer => 2,
        BaseType::Float => 3,
        BaseType::String => 4,
        BaseType::Point => 5,
        BaseType::Pair => 6,
        BaseType::DirectedPair => 7,
        BaseType::Duration => 8,
        BaseType::File => 9,
        BaseType::Uri => 10,
    }
}

fn base_type_from_tag(tag: u8) -> Result<BaseType, CodecError> {
    match tag {
        0 => Ok(BaseType::Identifier),
        1 => Ok(BaseType::Boolean),
        2 => Ok(BaseType::Integer),
        3 => Ok(BaseType::Float),
        4 => Ok(BaseType::String),
        5 => Ok(BaseType::Point),
        6 => Ok(BaseType::Pair),
        7 => Ok(BaseType::DirectedPair),
        8 => Ok(BaseType::Duration),
        9 => Ok(BaseType::File),
        10 => Ok(BaseType::Uri),
        other => Err(CodecError::InvalidTag {
            context: "baseType".to_string(),
            tag: other,
        }),
    }
}

// ============================================================================
// SECTION: Value Encoding
// ============================================================================

/// A time interval stored in seconds is written as an ISO-8601 duration
/// string (`PTnS`); `f64::to_string` produces the shortest digit sequence
/// that round-trips through `str::parse`, so no precision is lost.
fn duration_to_iso8601(seconds: f64) -> String {
    format!("PT{seconds}S")
}

fn duration_from_iso8601(text: &str) -> Result<f64, CodecError> {
    let inner = text.strip_prefix("PT").and_then(|rest| rest.strip_suffix('S')).ok_or_else(|| {
        CodecError::InvalidTag {
            context: "duration (expected PTnS)".to_string(),
            tag: 0,
        }
    })?;
    inner.parse().map_err(|_| CodecError::InvalidTag {
        context: "duration seconds".to_string(),
        tag: 0,
    })
}

fn encode_single_value(writer: &mut Writer, value: &SingleValue) {
    match value {
        SingleValue::Identifier(text) | SingleValue::String(text) | SingleValue::Uri(text) => {
            writer.write_string(text);
        }
        SingleValue::Boolean(flag) => writer.write_bool(*flag),
        SingleValue::Integer(integer) => writer.write_i32(*integer),
        SingleValue::Float(float) => writer.write_f64(*float),
        SingleValue::Point {
            x,
            y,
        } => {
            writer.write_i32(*x);
            writer.write_i32(*y);
        }
        SingleValue::Pair(left, right) | SingleValue::DirectedPair(left, right) => {
            writer.write_string(left);
            writer.write_string(right);
        }
        SingleValue::Duration(seconds) => writer.write_string(&duration_to_iso8601(*seconds)),
        SingleValue::File {
            content_type,
            data,
        } => {
            writer.write_bool(content_type.is_some());
            if let Some(content_type) = content_type {
                writer.write_string(content_type);
            }
            writer.write_bytes(data);
        }
    }
}

fn decode_single_value(reader: &mut Reader<'_>, base_type: BaseType) -> Result<SingleValue, CodecError> {
    match base_type {
        BaseType::Identifier => Ok(SingleValue::Identifier(reader.read_string()?)),
        BaseType::String => Ok(SingleValue::String(reader.read_string()?)),
        BaseType::Uri => Ok(SingleValue::Uri(reader.read_string()?)),
        BaseType::Boolean => Ok(SingleValue::Boolean(reader.read_bool()?)),
        BaseType::Integer => Ok(SingleValue::Integer(reader.read_i32()?)),
        BaseType::Float => Ok(SingleValue::Float(reader.read_f64()?)),
        BaseType::Point => Ok(SingleValue::Point {
            x: reader.read_i32()?,
            y: reader.read_i32()?,
        }),
        BaseType::Pair => Ok(SingleValue::Pair(reader.read_string()?, reader.read_string()?)),
        BaseType::DirectedPair => Ok(SingleValue::DirectedPair(reader.read_string()?, reader.read_string()?)),
        BaseType::Duration => Ok(SingleValue::Duration(duration_from_iso8601(&reader.read_string()?)?)),
        BaseType::File => {
            let has_content_type = reader.read_bool()?;
            let content_type = has_content_type.then(|| reader.read_string()).transpose()?;
            let data = reader.read_bytes()?;
            Ok(SingleValue::File {
                content_type,
                data,
            })
        }
    }
}

/// Writes a null flag, then (if present) the value under its declared
/// cardinality. `Multiple`/`Ordered` elements share the declared base type
/// (§3's never-mixed-typed invariant), so no per-element type tag is
/// needed; `Record` fields are heterogeneous by definition and each carry
/// an explicit base-type tag.
fn encode_qti_value(writer: &mut Writer, value: Option<&QtiValue>) -> Result<(), CodecError> {
    writer.write_bool(value.is_some());
    let Some(value) = value else {
        return Ok(());
    };
    match value {
        QtiValue::Single(single) => encode_single_value(writer, single),
        QtiValue::Multiple(values) | QtiValue::Ordered(values) => {
            writer.write_capped_u8(values.len(), "container length")?;
            for single in values {
                encode_single_value(writer, single);
            }
        }
        QtiValue::Record(fields) => {
            writer.write_capped_u8(fields.len(), "record length")?;
            for (name, single) in fields {
                writer.write_string(name);
                writer.write_u8(base_type_tag(single.base_type()));
                encode_single_value(writer, single);
            }
        }
    }
    Ok(())
}

fn decode_qti_value(
    reader: &mut Reader<'_>,
    cardinality: Cardinality,
    base_type: BaseType,
) -> Result<Option<QtiValue>, CodecError> {
    if !reader.read_bool()? {
        return Ok(None);
    }
    let value = match cardinality {
        Cardinality::Single => QtiValue::Single(decode_single_value(reader, base_type)?),
        Cardinality::Multiple | Cardinality::Ordered => {
            let len = usize::from(reader.read_u8()?);
            let mut values = Vec::with_capacity(len);
            for _ in 0..len {
                values.push(decode_single_value(reader, base_type)?);
            }
            if cardinality == Cardinality::Multiple {
                QtiValue::Multiple(values)
            } else {
                QtiValue::Ordered(values)
            }
        }
        Cardinality::Record => {
            let len = usize::from(reader.read_u8()?);
            let mut fields = Vec::with_capacity(len);
            for _ in 0..len {
                let name = reader.read_string()?;
                let field_type = base_type_from_tag(reader.read_u8()?)?;
                fields.push((name, decode_single_value(reader, field_type)?));
            }
            QtiValue::Record(fields)
        }
    };
    Ok(Some(value))
}

// ============================================================================
// SECTION: RouteItem Identity
// ============================================================================

/// Writes just enough of a `RouteItem`'s identity to let `decode` cross-check
/// the caller-supplied Route at the same position, rather than rebuild the
/// RouteItem from the stream.
fn encode_route_item(writer: &mut Writer, seeker: &Seeker<'_>, route_item: &RouteItem) -> Result<(), CodecError> {
    let test_part_index = seeker.test_part_index(route_item.test_part_identifier()).ok_or_else(|| {
        CodecError::UnknownDeclaration {
            detail: format!("unknown test part {}", route_item.test_part_identifier()),
        }
    })?;
    writer.write_capped_u8(test_part_index, "testPart index")?;

    writer.write_capped_u8(route_item.section_chain().len(), "section chain length")?;
    for section_identifier in route_item.section_chain() {
        let section_index = seeker.section_index(section_identifier).ok_or_else(|| CodecError::UnknownDeclaration {
            detail: format!("unknown assessment section {section_identifier}"),
        })?;
        writer.write_capped_u8(section_index, "section index")?;
    }

    let item_ref_index = seeker.test.item_refs.iter().position(|decl| decl.identifier == route_item.item_ref());
    let item_ref_index = item_ref_index.ok_or_else(|| CodecError::UnknownDeclaration {
        detail: format!("unknown item reference {}", route_item.item_ref()),
    })?;
    writer.write_capped_u8(item_ref_index, "item reference index")?;
    writer.write_varint(route_item.occurrence());

    writer.write_capped_u8(route_item.effective_branch_rules().len(), "branch rule count")?;
    writer.write_capped_u8(route_item.effective_pre_conditions().len(), "precondition count")?;
    Ok(())
}

/// Reads one RouteItem's identity fields and verifies they describe the
/// same occurrence as `expected` (the caller-supplied Route at this
/// position).
fn decode_route_item_check(reader: &mut Reader<'_>, seeker: &Seeker<'_>, expected: &RouteItem) -> Result<(), CodecError> {
    let test_part_index = usize::from(reader.read_u8()?);
    let section_chain_len = usize::from(reader.read_u8()?);
    let mut section_indices = Vec::with_capacity(section_chain_len);
    for _ in 0..section_chain_len {
        section_indices.push(usize::from(reader.read_u8()?));
    }
    let item_ref_index = usize::from(reader.read_u8()?);
    let occurrence = reader.read_varint()?;
    let branch_rule_count = usize::from(reader.read_u8()?);
    let precondition_count = usize::from(reader.read_u8()?);

    if seeker.test_part_index(expected.test_part_identifier()) != Some(test_part_index) {
        return Err(CodecError::RouteMismatch {
            detail: format!("testPart index mismatch for item {}", expected.item_ref()),
        });
    }
    let expected_sections: Vec<usize> =
        expected.section_chain().iter().filter_map(|identifier| seeker.section_index(identifier)).collect();
    if expected_sections != section_indices {
        return Err(CodecError::RouteMismatch {
            detail: format!("section chain mismatch for item {}", expected.item_ref()),
        });
    }
    if seeker.test.item_refs.iter().position(|decl| decl.identifier == expected.item_ref()) != Some(item_ref_index) {
        return Err(CodecError::RouteMismatch {
            detail: format!("item reference index mismatch for {}", expected.item_ref()),
        });
    }
    if occurrence != expected.occurrence() {
        return Err(CodecError::RouteMismatch {
            detail: format!(
                "occurrence mismatch for item {}: snapshot has {occurrence}, route has {}",
                expected.item_ref(),
                expected.occurrence()
            ),
        });
    }
    if branch_rule_count != expected.effective_branch_rules().len()
        || precondition_count != expected.effective_pre_conditions().len()
    {
        return Err(CodecError::RouteMismatch {
            detail: format!("branch rule / precondition count mismatch for item {}", expected.item_ref()),
        });
    }
    Ok(())
}

// ============================================================================
// SECTION: ItemSession Encoding
// ============================================================================

fn declared_state(item_ref_decl: &AssessmentItemRefDecl) -> State {
    let mut state = State::new();
    for declaration in &item_ref_decl.response_declarations {
        state.declare(Variable::from_declaration(
            declaration.identifier.clone(),
            VariableKind::Response,
            declaration.cardinality,
            declaration.base_type,
            declaration.default_value.clone(),
        ));
    }
    for declaration in &item_ref_decl.outcome_declarations {
        state.declare(Variable::from_declaration(
            declaration.identifier.clone(),
            VariableKind::Outcome,
            declaration.cardinality,
            declaration.base_type,
            declaration.default_value.clone(),
        ));
    }
    for declaration in &item_ref_decl.template_declarations {
        state.declare(Variable::from_declaration(
            declaration.identifier.clone(),
            VariableKind::Template,
            declaration.cardinality,
            declaration.base_type,
            declaration.default_value.clone(),
        ));
    }
    state
}

fn encode_item_session(
    writer: &mut Writer,
    item_ref_decl: &AssessmentItemRefDecl,
    session: Option<&ItemSession>,
) -> Result<(), CodecError> {
    writer.write_bool(session.is_some());
    let Some(session) = session else {
        return Ok(());
    };
    writer.write_u8(item_session_state_tag(session.state()));
    writer.write_varint(session.num_attempts());
    writer.write_f64(session.duration());
    writer.write_u8(completion_status_tag(session.completion_status()));

    for declaration in &item_ref_decl.response_declarations {
        let variable = session.variables().get_variable(&declaration.identifier);
        encode_qti_value(writer, variable.and_then(|variable| variable.value.as_ref()))?;
    }
    for declaration in &item_ref_decl.outcome_declarations {
        let variable = session.variables().get_variable(&declaration.identifier);
        encode_qti_value(writer, variable.and_then(|variable| variable.value.as_ref()))?;
    }
    for declaration in &item_ref_decl.template_declarations {
        let variable = session.variables().get_variable(&declaration.identifier);
        encode_qti_value(writer, variable.and_then(|variable| variable.value.as_ref()))?;
    }
    Ok(())
}

#[allow(clippy::too_many_lines, reason = "one straight-line decode matching the single encode_item_session pass")]
fn decode_item_session(
    reader: &mut Reader<'_>,
    seeker: &Seeker<'_>,
    route_item: &RouteItem,
) -> Result<Option<ItemSession>, CodecError> {
    if !reader.read_bool()? {
        return Ok(None);
    }
    let item_ref_decl = seeker.item_ref_decl(route_item.item_ref()).ok_or_else(|| CodecError::UnknownDeclaration {
        detail: format!("unknown item reference {}", route_item.item_ref()),
    })?;

    let state = item_session_state_from_tag(reader.read_u8()?)?;
    let num_attempts = reader.read_varint()?;
    let duration = reader.read_f64()?;
    let completion_status = completion_status_from_tag(reader.read_u8()?)?;

    let mut variables = declared_state(item_ref_decl);
    for declaration in &item_ref_decl.response_declarations {
        let value = decode_qti_value(reader, declaration.cardinality, declaration.base_type)?;
        if let Some(value) = value {
            variables.set_variable(&declaration.identifier, value);
        }
    }
    for declaration in &item_ref_decl.outcome_declarations {
        let value = decode_qti_value(reader, declaration.cardinality, declaration.base_type)?;
        if let Some(value) = value {
            variables.set_variable(&declaration.identifier, value);
        }
    }
    for declaration in &item_ref_decl.template_declarations {
        let value = decode_qti_value(reader, declaration.cardinality, declaration.base_type)?;
        if let Some(value) = value {
            variables.set_variable(&declaration.identifier, value);
        }
    }

    let (navigation_mode, submission_mode) =
        seeker.modes_for_test_part(route_item.test_part_identifier()).ok_or_else(|| CodecError::UnknownDeclaration {
            detail: format!("unknown test part {}", route_item.test_part_identifier()),
        })?;

    Ok(Some(ItemSession::from_snapshot(
        route_item.item_ref().to_string(),
        route_item.occurrence(),
        state,
        variables,
        num_attempts,
        completion_status,
        duration,
        navigation_mode,
        submission_mode,
        route_item.effective_session_control(),
        route_item.effective_time_limits(),
    )))
}

// ============================================================================
// SECTION: Ambient State Encoding (durations, pending, path, history)
// ============================================================================

fn encode_durations(writer: &mut Writer, durations: &DurationStore) {
    let entries: Vec<(&str, f64)> = durations.iter().collect();
    writer.write_varint(u32::try_from(entries.len()).unwrap_or(u32::MAX));
    for (identifier, seconds) in entries {
        writer.write_string(identifier);
        writer.write_f64(seconds);
    }
}

fn decode_durations(reader: &mut Reader<'_>) -> Result<DurationStore, CodecError> {
    let mut durations = DurationStore::new();
    let count = reader.read_varint()?;
    for _ in 0..count {
        let identifier = reader.read_string()?;
        let seconds = reader.read_f64()?;
        durations.set(&identifier, seconds);
    }
    Ok(durations)
}

fn encode_last_occurrence_update(writer: &mut Writer, map: &BTreeMap<String, u32>) {
    writer.write_varint(u32::try_from(map.len()).unwrap_or(u32::MAX));
    for (item_ref, occurrence) in map {
        writer.write_string(item_ref);
        writer.write_varint(*occurrence);
    }
}

fn decode_last_occurrence_update(reader: &mut Reader<'_>) -> Result<BTreeMap<String, u32>, CodecError> {
    let mut map = BTreeMap::new();
    let count = reader.read_varint()?;
    for _ in 0..count {
        let item_ref = reader.read_string()?;
        let occurrence = reader.read_varint()?;
        map.insert(item_ref, occurrence);
    }
    Ok(map)
}

fn encode_visited_test_parts(writer: &mut Writer, set: &BTreeSet<String>) {
    writer.write_varint(u32::try_from(set.len()).unwrap_or(u32::MAX));
    for identifier in set {
        writer.write_string(identifier);
    }
}

fn decode_visited_test_parts(reader: &mut Reader<'_>) -> Result<BTreeSet<String>, CodecError> {
    let mut set = BTreeSet::new();
    let count = reader.read_varint()?;
    for _ in 0..count {
        set.insert(reader.read_string()?);
    }
    Ok(set)
}

fn encode_path(writer: &mut Writer, path: &[usize]) {
    writer.write_varint(u32::try_from(path.len()).unwrap_or(u32::MAX));
    for position in path {
        writer.write_varint(u32::try_from(*position).unwrap_or(u32::MAX));
    }
}

fn decode_path(reader: &mut Reader<'_>) -> Result<Vec<usize>, CodecError> {
    let count = reader.read_varint()?;
    let mut path = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
    for _ in 0..count {
        path.push(usize::try_from(reader.read_varint()?).unwrap_or(0));
    }
    Ok(path)
}

fn encode_pending(writer: &mut Writer, pending: &PendingResponseStore) -> Result<(), CodecError> {
    let entries: Vec<_> = pending.all().collect();
    writer.write_varint(u32::try_from(entries.len()).unwrap_or(u32::MAX));
    for entry in entries {
        writer.write_string(entry.item_ref());
        writer.write_varint(entry.occurrence());
        writer.write_varint(u32::try_from(entry.responses().len()).unwrap_or(u32::MAX));
        for (identifier, value) in entry.responses() {
            writer.write_string(identifier);
            writer.write_u8(base_type_tag(value_base_type(value)));
            writer.write_u8(cardinality_tag(value.cardinality()));
            encode_qti_value(writer, Some(value))?;
        }
    }
    Ok(())
}

fn value_base_type(value: &QtiValue) -> BaseType {
    match value {
        QtiValue::Single(single) => single.base_type(),
        QtiValue::Multiple(values) | QtiValue::Ordered(values) => {
            values.first().map_or(BaseType::Identifier, SingleValue::base_type)
        }
        QtiValue::Record(_) => BaseType::Identifier,
    }
}

const fn cardinality_tag(cardinality: Cardinality) -> u8 {
    match cardinality {
        Cardinality::Single => 0,
        Cardinality::Multiple => 1,
        Cardinality::Ordered => 2,
        Cardinality::Record => 3,
    }
}

fn cardinality_from_tag(tag: u8) -> Result<Cardinality, CodecError> {
    match tag {
        0 => Ok(Cardinality::Single),
        1 => Ok(Cardinality::Multiple),
        2 => Ok(Cardinality::Ordered),
        3 => Ok(Cardinality::Record),
        other => Err(CodecError::InvalidTag {
            context: "cardinality".to_string(),
            tag: other,
        }),
    }
}

fn decode_pending(reader: &mut Reader<'_>) -> Result<PendingResponseStore, CodecError> {
    let mut pending = PendingResponseStore::new();
    let count = reader.read_varint()?;
    for _ in 0..count {
        let item_ref = reader.read_string()?;
        let occurrence = reader.read_varint()?;
        let response_count = reader.read_varint()?;
        let mut responses = Vec::with_capacity(usize::try_from(response_count).unwrap_or(0));
        for _ in 0..response_count {
            let identifier = reader.read_string()?;
            let base_type = base_type_from_tag(reader.read_u8()?)?;
            let cardinality = cardinality_from_tag(reader.read_u8()?)?;
            let value = decode_qti_value(reader, cardinality, base_type)?.ok_or_else(|| CodecError::UnknownDeclaration {
                detail: format!("pending response {identifier} for {item_ref} was encoded null"),
            })?;
            responses.push((identifier, value));
        }
        pending.add_pending(&item_ref, occurrence, responses);
    }
    Ok(pending)
}

fn encode_time_reference(writer: &mut Writer, time_reference: Option<Observation>) {
    writer.write_bool(time_reference.is_some());
    if let Some(observation) = time_reference {
        writer.write_i64(observation.as_unix_millis());
    }
}

fn decode_time_reference(reader: &mut Reader<'_>) -> Result<Option<Observation>, CodecError> {
    if !reader.read_bool()? {
        return Ok(None);
    }
    Ok(Some(Observation::from_unix_millis(reader.read_i64()?)))
}

fn encode_hash_digest(writer: &mut Writer, digest: &HashDigest) {
    writer.write_u8(match digest.algorithm {
        HashAlgorithm::Sha256 => 0,
    });
    writer.write_string(&digest.value);
}

fn decode_hash_digest(reader: &mut Reader<'_>) -> Result<HashDigest, CodecError> {
    let algorithm = match reader.read_u8()? {
        0 => HashAlgorithm::Sha256,
        other => {
            return Err(CodecError::InvalidTag {
                context: "hashAlgorithm".to_string(),
                tag: other,
            })
        }
    };
    let value = reader.read_string()?;
    Ok(HashDigest {
        algorithm,
        value,
    })
}

// ============================================================================
// SECTION: Public Entry Points
// ============================================================================

/// Namespaces the codec's `encode`/`decode` entry points.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotCodec;

impl SnapshotCodec {
    /// Encodes a driver's full state to a byte stream.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the driver's Route references a testPart,
    /// section, or item reference absent from its own `AssessmentTest`
    /// (an internal invariant violation), a count exceeds this format's
    /// single-byte width, or computing the optional `modelHash` fails.
    pub fn encode<E: ExpressionEngine>(driver: &TestSessionDriver<E>) -> Result<Vec<u8>, CodecError> {
        let mut writer = Writer::new();
        let seeker = Seeker::new(driver.test());

        writer.write_u8(test_session_state_tag(driver.state()));
        writer.write_capped_u8(driver.route().position(), "route position")?;
        writer.write_capped_u8(driver.route().count(), "route count")?;

        for route_item in driver.route().items() {
            encode_route_item(&mut writer, &seeker, route_item)?;
            let item_ref_decl = seeker.item_ref_decl(route_item.item_ref()).ok_or_else(|| {
                CodecError::UnknownDeclaration {
                    detail: format!("unknown item reference {}", route_item.item_ref()),
                }
            })?;
            let session = driver.item_sessions().get_session(route_item.item_ref(), route_item.occurrence());
            encode_item_session(&mut writer, item_ref_decl, session)?;
        }

        for declaration in &driver.test().outcome_declarations {
            let variable = driver.global_outcomes().get_variable(&declaration.identifier);
            encode_qti_value(&mut writer, variable.and_then(|variable| variable.value.as_ref()))?;
        }

        encode_durations(&mut writer, driver.durations());
        encode_last_occurrence_update(&mut writer, driver.last_occurrence_update());
        encode_visited_test_parts(&mut writer, driver.visited_test_parts());
        encode_path(&mut writer, driver.path());
        encode_pending(&mut writer, driver.pending())?;
        encode_time_reference(&mut writer, driver.time_reference());

        if driver.config().write_model_hash {
            let digest = seeker.fingerprint_hash(driver.config().hash_algorithm)?;
            encode_hash_digest(&mut writer, &digest);
        }

        Ok(writer.into_vec())
    }

    /// Reconstructs a driver from a byte stream plus a caller-supplied
    /// Route already materialized over `test`.
    ///
    /// `route` is used both as the reconstruction target (its RouteItems
    /// back every restored `ItemSession`'s session control and time limits)
    /// and as an integrity check: the stream's per-RouteItem identity is
    /// compared against `route.items()` at the same position, and any
    /// divergence raises [`CodecError::RouteMismatch`] rather than silently
    /// restoring a session against a Route the snapshot was not taken from.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::RouteMismatch`] if `route`'s length or any
    /// RouteItem's identity disagrees with the stream, [`CodecError::UnexpectedEof`]
    /// if the stream ends early, [`CodecError::InvalidTag`] for an
    /// unrecognized discriminant byte, and [`CodecError::ModelMismatch`] if
    /// `config.write_model_hash` is set and the trailing hash does not
    /// match `test`'s fingerprint.
    pub fn decode<E: ExpressionEngine>(
        bytes: &[u8],
        session_id: String,
        test: Arc<AssessmentTest>,
        mut route: Route,
        expression_engine: E,
        config: EngineConfig,
    ) -> Result<TestSessionDriver<E>, CodecError> {
        let mut reader = Reader::new(bytes);
        let seeker = Seeker::new(&test);

        let state = test_session_state_from_tag(reader.read_u8()?)?;
        let position = usize::from(reader.read_u8()?);
        let count = usize::from(reader.read_u8()?);
        if count != route.count() {
            return Err(CodecError::RouteMismatch {
                detail: format!("snapshot routeCount {count} does not match supplied route length {}", route.count()),
            });
        }

        let mut item_sessions = ItemSessionStore::new();
        for route_item in route.items() {
            decode_route_item_check(&mut reader, &seeker, route_item)?;
            if let Some(session) = decode_item_session(&mut reader, &seeker, route_item)? {
                item_sessions.add_session(session);
            }
        }

        let mut global_outcomes = State::new();
        for declaration in &test.outcome_declarations {
            let value = decode_qti_value(&mut reader, declaration.cardinality, declaration.base_type)?;
            let mut variable = Variable::from_declaration(
                declaration.identifier.clone(),
                VariableKind::Outcome,
                declaration.cardinality,
                declaration.base_type,
                declaration.default_value.clone(),
            );
            variable.value = value;
            global_outcomes.declare(variable);
        }

        let durations = decode_durations(&mut reader)?;
        let last_occurrence_update = decode_last_occurrence_update(&mut reader)?;
        let visited_test_parts = decode_visited_test_parts(&mut reader)?;
        let path = decode_path(&mut reader)?;
        let pending = decode_pending(&mut reader)?;
        let time_reference = decode_time_reference(&mut reader)?;

        if config.write_model_hash {
            let digest = decode_hash_digest(&mut reader)?;
            let expected = seeker.fingerprint_hash(config.hash_algorithm)?;
            if digest != expected {
                return Err(CodecError::ModelMismatch {
                    detail: "snapshot modelHash does not match the supplied AssessmentTest".to_string(),
                });
            }
        }

        route.set_position(position)?;

        Ok(TestSessionDriver::from_parts(
            session_id,
            test,
            state,
            route,
            item_sessions,
            durations,
            pending,
            global_outcomes,
            last_occurrence_update,
            visited_test_parts,
            path,
            time_reference,
            config,
            expression_engine,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_round_trips_small_and_large_values() {
        for value in [0u32, 1, 127, 128, 300, 16_384, u32::MAX] {
            let mut writer = Writer::new();
            writer.write_varint(value);
            let bytes = writer.into_vec();
            let mut reader = Reader::new(&bytes);
            assert_eq!(reader.read_varint().expect("read varint"), value);
        }
    }

    #[test]
    fn string_round_trips_utf8() {
        let mut writer = Writer::new();
        writer.write_string("caf\u{e9} \u{1f600}");
        let bytes = writer.into_vec();
        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.read_string().expect("read string"), "caf\u{e9} \u{1f600}");
    }

    #[test]
    fn duration_round_trips_through_iso8601() {
        let encoded = duration_to_iso8601(12.5);
        assert_eq!(encoded, "PT12.5S");
        assert!((duration_from_iso8601(&encoded).expect("parse duration") - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn qti_value_null_flag_round_trips() {
        let mut writer = Writer::new();
        encode_qti_value(&mut writer, None).expect("encode null");
        let bytes = writer.into_vec();
        let mut reader = Reader::new(&bytes);
        assert_eq!(decode_qti_value(&mut reader, Cardinality::Single, BaseType::Integer).expect("decode null"), None);
    }

    #[test]
    fn qti_value_multiple_integers_round_trip() {
        let value = QtiValue::Multiple(vec![SingleValue::Integer(1), SingleValue::Integer(2), SingleValue::Integer(3)]);
        let mut writer = Writer::new();
        encode_qti_value(&mut writer, Some(&value)).expect("encode multiple");
        let bytes = writer.into_vec();
        let mut reader = Reader::new(&bytes);
        let decoded = decode_qti_value(&mut reader, Cardinality::Multiple, BaseType::Integer)
            .expect("decode multiple")
            .expect("value present");
        assert_eq!(decoded, value);
    }

    #[test]
    fn qti_value_record_round_trips_heterogeneous_fields() {
        let value = QtiValue::Record(vec![
            ("A".to_string(), SingleValue::Integer(7)),
            ("B".to_string(), SingleValue::Boolean(true)),
        ]);
        let mut writer = Writer::new();
        encode_qti_value(&mut writer, Some(&value)).expect("encode record");
        let bytes = writer.into_vec();
        let mut reader = Reader::new(&bytes);
        let decoded = decode_qti_value(&mut reader, Cardinality::Record, BaseType::Identifier)
            .expect("decode record")
            .expect("value present");
        assert_eq!(decoded, value);
    }
}
