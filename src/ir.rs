//! The IR (§3, §6.1): a flat stream of tagged records, not a paired
//! high-level enum. An [`OpCode`] record is followed, in the same [`Program`]
//! vector, by as many [`Record::Operand`]/[`Record::Dyad`] slots as that
//! opcode needs. The [`Engine`](crate::interpreter::Engine) walks this stream
//! by `pc`, never by index-into-a-separate-operand-table.

use serde::{Deserialize, Serialize};

/// The sixteen CISC opcodes folded out of the eight Brainfuck characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpCode {
    Incr,
    Decr,
    Add,
    AddOffset,
    XfrMultiple,
    SetZero,
    Left,
    Right,
    Move,
    SeekLeft,
    SeekRight,
    Open,
    Close,
    Get,
    Put,
    Halt,
}

impl OpCode {
    /// How many [`Record`] slots follow this opcode's own record in the
    /// stream. `Add`/`Move` take one scalar operand; `Open`/`Close` take
    /// one operand (the branch target); `AddOffset`/`XfrMultiple` take one
    /// dyad. `Incr`, `Decr`, `Left`, `Right`, `SeekLeft`, `SeekRight`,
    /// `SetZero`, `Get`, `Put`, `Halt` carry their whole meaning in the
    /// opcode itself and take no trailing slot.
    pub fn operand_slots(&self) -> usize {
        match self {
            OpCode::Add | OpCode::Move | OpCode::Open | OpCode::Close => 1,
            OpCode::AddOffset | OpCode::XfrMultiple => 1,
            OpCode::Incr
            | OpCode::Decr
            | OpCode::Left
            | OpCode::Right
            | OpCode::SeekLeft
            | OpCode::SeekRight
            | OpCode::SetZero
            | OpCode::Get
            | OpCode::Put
            | OpCode::Halt => 0,
        }
    }
}

/// One slot of the flat IR stream. Untagged on the wire: an opcode record
/// serializes as `{"OpCode": "..."}`, a scalar operand as `{"Operand": n}`,
/// and a two-field operand as `{"High": h, "Low": l}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
    Op {
        #[serde(rename = "OpCode")]
        code: OpCode,
        /// Present only on the discardable-set-zero hint; carries no
        /// runtime meaning and is never read back by the engine.
        #[serde(rename = "DiscardBeforeSetZero", skip_serializing_if = "Option::is_none", default)]
        discard_before_set_zero: Option<bool>,
    },
    Operand {
        #[serde(rename = "Operand")]
        value: i64,
    },
    Dyad {
        #[serde(rename = "High")]
        high: i64,
        #[serde(rename = "Low")]
        low: i64,
    },
}

impl Record {
    pub fn op(code: OpCode) -> Record {
        Record::Op { code, discard_before_set_zero: None }
    }

    pub fn op_with_hint(code: OpCode, discard_before_set_zero: bool) -> Record {
        Record::Op { code, discard_before_set_zero: Some(discard_before_set_zero) }
    }

    pub fn operand(value: i64) -> Record {
        Record::Operand { value }
    }

    pub fn dyad(high: i64, low: i64) -> Record {
        Record::Dyad { high, low }
    }

    pub fn as_opcode(&self) -> Option<OpCode> {
        match self {
            Record::Op { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn as_operand(&self) -> Option<i64> {
        match self {
            Record::Operand { value } => Some(*value),
            _ => None,
        }
    }

    pub fn as_dyad(&self) -> Option<(i64, i64)> {
        match self {
            Record::Dyad { high, low } => Some((*high, *low)),
            _ => None,
        }
    }
}

/// A lifted program: the flat record stream described above, addressed by
/// `pc` exactly as the engine will address it at run time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    records: Vec<Record>,
}

impl Program {
    pub fn new() -> Program {
        Program { records: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, pc: usize) -> Option<&Record> {
        self.records.get(pc)
    }

    pub fn push(&mut self, record: Record) -> usize {
        let idx = self.records.len();
        self.records.push(record);
        idx
    }

    /// Overwrites an already-emitted record, used for branch-target
    /// backpatching once a loop's matching bracket is known.
    pub fn patch(&mut self, idx: usize, record: Record) {
        self.records[idx] = record;
    }

    /// The opcode of the last-planted instruction, looking through any
    /// operand/dyad slots that trail it. Operand slots always immediately
    /// follow the op record that owns them, so walking backwards at most
    /// one extra slot always lands on an `Op`.
    pub fn last_opcode(&self) -> Option<OpCode> {
        for record in self.records.iter().rev() {
            if let Record::Op { code, .. } = record {
                return Some(*code);
            }
        }
        None
    }

    /// Index of the `Op` record belonging to the last-planted instruction.
    fn last_op_index(&self) -> Option<usize> {
        self.records.iter().rposition(|r| matches!(r, Record::Op { .. }))
    }

    /// Removes the last-planted instruction (its `Op` record and every
    /// operand/dyad slot that follows it). No-op on an empty program.
    pub fn pop_last_instruction(&mut self) {
        if let Some(idx) = self.last_op_index() {
            self.records.truncate(idx);
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.records)
    }

    pub fn from_json(text: &str) -> Result<Program, LoadError> {
        let records: Vec<Record> = serde_json::from_str(text)?;
        let program = Program { records };
        program.validate()?;
        Ok(program)
    }

    /// Structural validation of a freshly-deserialized program: every
    /// opcode's declared operand slots are present and of the right shape,
    /// `Open`/`Close` targets land in bounds, `ADD_OFFSET`/`XFR_MULTIPLE`
    /// carry a non-zero offset, and the stream ends in `Halt`.
    fn validate(&self) -> Result<(), LoadError> {
        let mut pc = 0;
        while pc < self.records.len() {
            let code = match &self.records[pc] {
                Record::Op { code, .. } => *code,
                other => return Err(LoadError::ExpectedOpCode { pc, found: format!("{other:?}") }),
            };

            let slots = code.operand_slots();
            if pc + slots > self.records.len() {
                return Err(LoadError::TruncatedOperands { pc, code });
            }

            match code {
                OpCode::Open | OpCode::Close => {
                    let target = self.records.get(pc + 1).and_then(Record::as_operand).ok_or(
                        LoadError::TruncatedOperands { pc, code },
                    )?;
                    if target < 0 || target as usize >= self.records.len() {
                        return Err(LoadError::BadBranchTarget { pc, target });
                    }
                }
                OpCode::AddOffset | OpCode::XfrMultiple => {
                    let (offset, _by) = self.records.get(pc + 1).and_then(Record::as_dyad).ok_or(
                        LoadError::TruncatedOperands { pc, code },
                    )?;
                    if offset == 0 {
                        return Err(LoadError::ZeroOffset { pc, code });
                    }
                }
                OpCode::Add | OpCode::Move => {
                    self.records.get(pc + 1).and_then(Record::as_operand).ok_or(
                        LoadError::TruncatedOperands { pc, code },
                    )?;
                }
                _ => {}
            }

            pc += 1 + slots;
        }

        match self.records.last().and_then(Record::as_opcode) {
            Some(OpCode::Halt) => Ok(()),
            _ => Err(LoadError::MissingHalt),
        }
    }
}

/// Errors raised while deserializing and structurally validating a
/// previously-compiled IR file.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("malformed IR JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected an opcode record at slot {pc}, found {found}")]
    ExpectedOpCode { pc: usize, found: String },
    #[error("{code:?} at slot {pc} is missing its operand")]
    TruncatedOperands { pc: usize, code: OpCode },
    #[error("{code:?} at slot {pc} carries a zero offset")]
    ZeroOffset { pc: usize, code: OpCode },
    #[error("branch target {target} at slot {pc} is out of bounds")]
    BadBranchTarget { pc: usize, target: i64 },
    #[error("program does not end in HALT")]
    MissingHalt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let mut p = Program::new();
        p.push(Record::op(OpCode::Add));
        p.push(Record::operand(5));
        p.push(Record::op(OpCode::Halt));

        let json = p.to_json().unwrap();
        let back = Program::from_json(&json).unwrap();
        assert_eq!(back.records(), p.records());
    }

    #[test]
    fn op_record_serializes_untagged() {
        let r = Record::op(OpCode::SetZero);
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"OpCode":"SetZero"}"#);
    }

    #[test]
    fn operand_record_serializes_untagged() {
        let r = Record::operand(3);
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"Operand":3}"#);
    }

    #[test]
    fn dyad_record_serializes_untagged() {
        let r = Record::dyad(2, -1);
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"High":2,"Low":-1}"#);
    }

    #[test]
    fn pop_last_instruction_removes_opcode_and_operand() {
        let mut p = Program::new();
        p.push(Record::op(OpCode::Add));
        p.push(Record::operand(5));
        assert_eq!(p.len(), 2);
        p.pop_last_instruction();
        assert_eq!(p.len(), 0);
    }

    #[test]
    fn last_opcode_sees_through_trailing_operand() {
        let mut p = Program::new();
        p.push(Record::op(OpCode::Move));
        p.push(Record::operand(-2));
        assert_eq!(p.last_opcode(), Some(OpCode::Move));
    }

    #[test]
    fn rejects_missing_halt() {
        let mut p = Program::new();
        p.push(Record::op(OpCode::SetZero));
        let json = p.to_json().unwrap();
        assert!(matches!(Program::from_json(&json), Err(LoadError::MissingHalt)));
    }

    #[test]
    fn rejects_zero_offset_add_offset() {
        let mut p = Program::new();
        p.push(Record::op(OpCode::AddOffset));
        p.push(Record::dyad(0, 5));
        p.push(Record::op(OpCode::Halt));
        let json = p.to_json().unwrap();
        assert!(matches!(Program::from_json(&json), Err(LoadError::ZeroOffset { .. })));
    }

    #[test]
    fn accepts_nonzero_offset_with_zero_by() {
        // offset=3 (the high field) is a perfectly valid non-zero offset;
        // a zero `by` (the low field) is a no-op add amount but not an
        // invariant violation.
        let mut p = Program::new();
        p.push(Record::op(OpCode::AddOffset));
        p.push(Record::dyad(3, 0));
        p.push(Record::op(OpCode::Halt));
        let json = p.to_json().unwrap();
        assert!(Program::from_json(&json).is_ok());
    }

    #[test]
    fn rejects_out_of_bounds_branch_target() {
        let mut p = Program::new();
        p.push(Record::op(OpCode::Open));
        p.push(Record::operand(999));
        p.push(Record::op(OpCode::Halt));
        let json = p.to_json().unwrap();
        assert!(matches!(Program::from_json(&json), Err(LoadError::BadBranchTarget { .. })));
    }
}
