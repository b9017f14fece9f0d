//! The lifter (§4.2): a single recursive-descent pass over a [`Scanner`]
//! that plants the CISC IR directly, recognising a handful of idioms along
//! the way (zero-set, seek, multiply-transfer) instead of emitting the
//! naive one-opcode-per-character stream and optimizing it afterwards.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::error::{Lint, SourcePos, ToolchainError};
use crate::ir::{OpCode, Program, Record};
use crate::source::Scanner;

/// Which idiom recognitions and peephole folds the lifter is allowed to
/// apply. Every field defaults on; `run`'s `--no-<feature>` flags turn
/// individual ones off, `--none` clears the lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifterFlags {
    /// Skip a loop's body entirely when the current cell is statically
    /// known to be zero already (the loop can never execute).
    pub deadcode: bool,
    /// Recognise `[<]`/`[>]` as `SEEK_LEFT`/`SEEK_RIGHT`.
    pub seekzero: bool,
    /// Never apply the seek idiom when the current cell is already known
    /// to be zero (the loop would never run, so it falls to `deadcode`
    /// instead of being misread as a seek).
    pub pruneiflociszero: bool,
    /// Recognise `[-<<+>>]`-shaped loops as `XFR_MULTIPLE` plus `SET_ZERO`.
    pub xfrmultiple: bool,
    /// Recognise `[-]`/`[+]` as `SET_ZERO`, and drop a value-setting
    /// instruction immediately superseded by it.
    pub superfluous: bool,
}

impl LifterFlags {
    /// Every optimization switched on. This is the default a bare
    /// `ciscfuck compile` runs with.
    pub fn all() -> LifterFlags {
        LifterFlags { deadcode: true, seekzero: true, pruneiflociszero: true, xfrmultiple: true, superfluous: true }
    }

    /// Every optimization switched off: a near-literal one-opcode-per-run
    /// lift, useful for comparing against the optimized output.
    pub fn none() -> LifterFlags {
        LifterFlags { deadcode: false, seekzero: false, pruneiflociszero: false, xfrmultiple: false, superfluous: false }
    }
}

impl Default for LifterFlags {
    fn default() -> LifterFlags {
        LifterFlags::all()
    }
}

/// Errors raised while lifting source into IR.
#[derive(Debug, Error)]
pub enum LiftError {
    #[error("'[' at {pos} has no matching ']'")]
    UnmatchedOpen { pos: SourcePos },
    #[error("')' at {pos} has no matching '['")]
    UnmatchedClose { pos: SourcePos },
}

impl ToolchainError for LiftError {
    fn lint(&self) -> Option<Lint> {
        match self {
            LiftError::UnmatchedOpen { pos } | LiftError::UnmatchedClose { pos } => Some(Lint::error_at(*pos)),
        }
    }
}

/// The net effect of a maximal run of `+`, `-`, `<`, `>` characters: a map
/// from relative pointer offset (0 is where the run started) to the net
/// add accumulated at that offset, plus the run's final offset.
#[derive(Debug, Clone, Default)]
struct Mam {
    deltas: BTreeMap<i64, i64>,
    final_offset: i64,
}

/// Scans (and consumes) a maximal run of move/add characters without
/// planting anything, so idiom detection can look ahead before committing.
fn scan_move_add_move(scanner: &mut Scanner<'_>) -> Mam {
    let mut mam = Mam::default();
    loop {
        match scanner.peek() {
            Some('+') => {
                *mam.deltas.entry(mam.final_offset).or_insert(0) += 1;
                scanner.pop();
            }
            Some('-') => {
                *mam.deltas.entry(mam.final_offset).or_insert(0) -= 1;
                scanner.pop();
            }
            Some('>') => {
                mam.final_offset += 1;
                scanner.pop();
            }
            Some('<') => {
                mam.final_offset -= 1;
                scanner.pop();
            }
            _ => break,
        }
    }
    mam
}

/// Consumes characters until the `]` matching the `[` already consumed by
/// the caller, without planting anything. Used when a loop body is known
/// to be unreachable.
fn skip_dead_loop(scanner: &mut Scanner<'_>, open_pos: SourcePos) -> Result<(), LiftError> {
    let mut depth = 1usize;
    loop {
        match scanner.pop() {
            Some('[') => depth += 1,
            Some(']') => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Some(_) => {}
            None => return Err(LiftError::UnmatchedOpen { pos: open_pos }),
        }
    }
}

/// Drives a [`Scanner`] into a [`Program`], one source pass, no separate
/// optimization phase over the result.
pub struct Lifter {
    program: Program,
    /// `true` only when the current cell is statically known to hold 0.
    /// `false` covers both "known nonzero" and "unknown" — this is a
    /// single-bit lattice, not three-valued.
    loc_is_zero: bool,
    /// Absolute index, in `program`, of each still-open `OPEN`'s operand
    /// slot, innermost last.
    open_indices: Vec<usize>,
    flags: LifterFlags,
}

impl Lifter {
    fn new(flags: LifterFlags) -> Lifter {
        Lifter { program: Program::new(), loc_is_zero: true, open_indices: Vec::new(), flags }
    }

    fn plant_add(&mut self, delta: i64) {
        if delta == 0 {
            return;
        }
        match delta {
            1 => {
                self.program.push(Record::op(OpCode::Incr));
            }
            -1 => {
                self.program.push(Record::op(OpCode::Decr));
            }
            _ => {
                self.program.push(Record::op(OpCode::Add));
                self.program.push(Record::operand(delta));
            }
        }
        self.loc_is_zero = self.loc_is_zero && delta.rem_euclid(256) == 0;
    }

    fn plant_move(&mut self, delta: i64) {
        match delta {
            0 => {}
            1 => {
                self.program.push(Record::op(OpCode::Right));
            }
            -1 => {
                self.program.push(Record::op(OpCode::Left));
            }
            _ => {
                self.program.push(Record::op(OpCode::Move));
                self.program.push(Record::operand(delta));
            }
        }
    }

    /// Plants a scanned move/add run iteratively: every non-home offset
    /// becomes a standalone `ADD_OFFSET`, the home offset (where the
    /// pointer ends up) becomes a normal add so `loc_is_zero` stays
    /// accurate, and the run closes with a single net pointer move.
    fn plant_move_add_move(&mut self, mam: &Mam) {
        for (&offset, &delta) in mam.deltas.iter() {
            if offset == mam.final_offset || delta == 0 {
                continue;
            }
            // Offset 0 is the pointer's starting cell, not a displaced
            // one: ADD_OFFSET requires a non-zero offset, so a run that
            // revisits its starting cell before moving elsewhere plants
            // a plain add there instead.
            if offset == 0 {
                self.plant_add(delta);
                continue;
            }
            self.program.push(Record::op(OpCode::AddOffset));
            self.program.push(Record::dyad(offset, delta));
        }

        match mam.deltas.get(&mam.final_offset).copied() {
            Some(delta) if delta != 0 => self.plant_add(delta),
            _ => {
                if mam.final_offset != 0 {
                    self.loc_is_zero = false;
                }
            }
        }

        self.plant_move(mam.final_offset);
    }

    fn plant_set_zero(&mut self) {
        if self.loc_is_zero {
            return;
        }
        let discard = self.flags.superfluous
            && matches!(self.program.last_opcode(), Some(OpCode::Add | OpCode::Incr | OpCode::Decr));
        if discard {
            self.program.pop_last_instruction();
        }
        self.program.push(Record::op_with_hint(OpCode::SetZero, discard));
        self.loc_is_zero = true;
    }

    fn plant_open(&mut self) {
        self.program.push(Record::op(OpCode::Open));
        let operand_idx = self.program.push(Record::operand(-1));
        self.open_indices.push(operand_idx);
    }

    fn plant_close(&mut self) {
        self.program.push(Record::op(OpCode::Close));
        let end = self.program.len();
        let start = self.open_indices.pop().expect("plant_close called outside an open loop");
        self.program.patch(start, Record::operand((end + 1) as i64));
        self.program.push(Record::operand((start + 1) as i64));
    }

    /// Speculatively probes for a `[-...]`-shaped multiply-transfer loop:
    /// a single move/add run with zero net pointer movement, a home delta
    /// of exactly -1, and exactly one other offset touched, followed
    /// immediately by the closing `]`. `XFR_MULTIPLE`'s semantics (§3)
    /// zero the home cell as part of a single instruction's execution, so
    /// a loop body touching more than one other offset can't be
    /// represented as a single `XFR_MULTIPLE` without either zeroing the
    /// source cell early (corrupting the later transfers) or not zeroing
    /// it at all (violating the opcode's own invariant) — such loops fall
    /// back to the general `OPEN`/`CLOSE` path instead. Leaves `scanner`
    /// untouched and returns `false` on any mismatch.
    fn try_plant_xfr_multiple(&mut self, scanner: &mut Scanner<'_>) -> bool {
        let mut probe = scanner.clone();
        let mam = scan_move_add_move(&mut probe);

        if mam.final_offset != 0 {
            return false;
        }
        if mam.deltas.get(&0).copied().unwrap_or(0) != -1 {
            return false;
        }
        if probe.peek() != Some(']') {
            return false;
        }

        let mut others = mam.deltas.iter().filter(|&(&offset, &factor)| offset != 0 && factor != 0);
        let single = match others.next() {
            Some((&offset, &factor)) => (offset, factor),
            None => return false,
        };
        if others.next().is_some() {
            return false;
        }

        probe.pop();
        *scanner = probe;

        let (offset, factor) = single;
        self.program.push(Record::op(OpCode::XfrMultiple));
        self.program.push(Record::dyad(offset, factor));
        self.plant_set_zero();
        true
    }

    /// Handles a loop whose `[` has already been consumed by the caller.
    fn plant_loop(&mut self, scanner: &mut Scanner<'_>, open_pos: SourcePos) -> Result<(), LiftError> {
        if self.flags.superfluous {
            if scanner.try_consume_sequence(&['-', ']']) || scanner.try_consume_sequence(&['+', ']']) {
                self.plant_set_zero();
                return Ok(());
            }
        }

        let seek_allowed = self.flags.seekzero && !(self.flags.pruneiflociszero && self.loc_is_zero);
        if seek_allowed {
            if scanner.try_consume_sequence(&['<', ']']) {
                self.program.push(Record::op(OpCode::SeekLeft));
                self.loc_is_zero = true;
                return Ok(());
            }
            if scanner.try_consume_sequence(&['>', ']']) {
                self.program.push(Record::op(OpCode::SeekRight));
                self.loc_is_zero = true;
                return Ok(());
            }
        }

        if self.flags.deadcode && self.loc_is_zero {
            skip_dead_loop(scanner, open_pos)?;
            return Ok(());
        }

        if self.flags.xfrmultiple && self.try_plant_xfr_multiple(scanner) {
            return Ok(());
        }

        self.plant_open();
        self.loc_is_zero = false;
        self.lift_statements(scanner, true)?;
        if !scanner.try_consume(']') {
            return Err(LiftError::UnmatchedOpen { pos: open_pos });
        }
        self.plant_close();
        self.loc_is_zero = true;
        Ok(())
    }

    /// Lifts statements until end of input (`in_loop == false`) or an
    /// unconsumed `]` is peeked (`in_loop == true`, left for the caller to
    /// consume).
    fn lift_statements(&mut self, scanner: &mut Scanner<'_>, in_loop: bool) -> Result<(), LiftError> {
        loop {
            match scanner.peek() {
                None => {
                    return if in_loop { Err(LiftError::UnmatchedOpen { pos: scanner.position() }) } else { Ok(()) };
                }
                Some(']') => {
                    return if in_loop {
                        Ok(())
                    } else {
                        Err(LiftError::UnmatchedClose { pos: scanner.position() })
                    };
                }
                Some('[') => {
                    let open_pos = scanner.position();
                    scanner.pop();
                    self.plant_loop(scanner, open_pos)?;
                }
                Some('.') => {
                    scanner.pop();
                    self.program.push(Record::op(OpCode::Put));
                }
                Some(',') => {
                    scanner.pop();
                    self.program.push(Record::op(OpCode::Get));
                    self.loc_is_zero = false;
                }
                Some(_) => {
                    let mam = scan_move_add_move(scanner);
                    self.plant_move_add_move(&mam);
                }
            }
        }
    }
}

/// Lifts Brainfuck source into IR under the given optimization flags.
pub fn lift(source: &str, flags: LifterFlags) -> Result<Program, LiftError> {
    let mut scanner = Scanner::new(source);
    let mut lifter = Lifter::new(flags);
    lifter.lift_statements(&mut scanner, false)?;
    lifter.program.push(Record::op(OpCode::Halt));
    Ok(lifter.program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Record;

    fn ops(program: &Program) -> Vec<OpCode> {
        program.records().iter().filter_map(Record::as_opcode).collect()
    }

    #[test]
    fn hello_world_fragment_lifts_to_adds_and_put() {
        let program = lift("+++++.", LifterFlags::all()).unwrap();
        assert_eq!(ops(&program), vec![OpCode::Add, OpCode::Put, OpCode::Halt]);
    }

    #[test]
    fn zeroing_idiom_becomes_set_zero() {
        let program = lift("+++[-]", LifterFlags::all()).unwrap();
        assert_eq!(ops(&program), vec![OpCode::SetZero, OpCode::Halt]);
    }

    #[test]
    fn zeroing_idiom_is_a_noop_when_already_zero() {
        let program = lift("[-]", LifterFlags::all()).unwrap();
        assert_eq!(ops(&program), vec![OpCode::Halt]);
    }

    #[test]
    fn seek_right_idiom_recognised() {
        let program = lift("+[>]", LifterFlags::all()).unwrap();
        assert_eq!(ops(&program), vec![OpCode::Incr, OpCode::SeekRight, OpCode::Halt]);
    }

    #[test]
    fn seek_idiom_disabled_falls_back_to_loop() {
        let mut flags = LifterFlags::all();
        flags.seekzero = false;
        let program = lift("+[>]", flags).unwrap();
        assert_eq!(ops(&program), vec![OpCode::Incr, OpCode::Open, OpCode::Right, OpCode::Close, OpCode::Halt]);
    }

    #[test]
    fn multiply_transfer_idiom_recognised() {
        let program = lift("+++[->++<]", LifterFlags::all()).unwrap();
        assert_eq!(ops(&program), vec![OpCode::Add, OpCode::XfrMultiple, OpCode::SetZero, OpCode::Halt]);
    }

    #[test]
    fn multiply_transfer_idiom_does_not_apply_to_multiple_offsets() {
        // [->+>+<<] touches two other cells; a single XFR_MULTIPLE can't
        // represent that without either corrupting the second transfer or
        // skipping the zero it owes its home cell, so this falls back to
        // a plain loop instead of being misrecognised.
        let program = lift("+++[->+>+<<]", LifterFlags::all()).unwrap();
        assert_eq!(
            ops(&program),
            vec![OpCode::Add, OpCode::Open, OpCode::AddOffset, OpCode::AddOffset, OpCode::Decr, OpCode::Close, OpCode::Halt]
        );
    }

    #[test]
    fn dead_loop_is_skipped_entirely() {
        let program = lift("[+++++++]", LifterFlags::all()).unwrap();
        assert_eq!(ops(&program), vec![OpCode::Halt]);
    }

    #[test]
    fn open_and_close_targets_agree() {
        let program = lift("+[-]", LifterFlags::none()).unwrap();
        let records = program.records();
        let open_idx = records.iter().position(|r| r.as_opcode() == Some(OpCode::Open)).unwrap();
        let close_idx = records.iter().position(|r| r.as_opcode() == Some(OpCode::Close)).unwrap();
        let open_target = records[open_idx + 1].as_operand().unwrap() as usize;
        let close_target = records[close_idx + 1].as_operand().unwrap() as usize;
        assert_eq!(open_target, close_idx + 2);
        assert_eq!(close_target, open_idx + 2);
    }

    #[test]
    fn naive_and_optimized_lifts_agree_on_shape_for_plain_adds() {
        let naive = lift("+++.", LifterFlags::none()).unwrap();
        let optimized = lift("+++.", LifterFlags::all()).unwrap();
        assert_eq!(ops(&naive), vec![OpCode::Add, OpCode::Put, OpCode::Halt]);
        assert_eq!(ops(&optimized), vec![OpCode::Add, OpCode::Put, OpCode::Halt]);
    }

    #[test]
    fn unmatched_open_is_an_error() {
        assert!(matches!(lift("[+", LifterFlags::all()), Err(LiftError::UnmatchedOpen { .. })));
    }

    #[test]
    fn unmatched_close_is_an_error() {
        assert!(matches!(lift("+]", LifterFlags::all()), Err(LiftError::UnmatchedClose { .. })));
    }

    #[test]
    fn wraparound_delta_is_still_a_single_add() {
        let source = "+".repeat(300);
        let program = lift(&source, LifterFlags::all()).unwrap();
        assert_eq!(ops(&program), vec![OpCode::Add, OpCode::Halt]);
    }

    #[test]
    fn revisiting_start_cell_before_a_net_move_never_emits_zero_offset() {
        // ">+<+>": touches offset 0 again after leaving it, but the run's
        // net displacement is +1, so offset 0 must plant as a bare add,
        // never as ADD_OFFSET(0, _).
        let program = lift(">+<+>", LifterFlags::none()).unwrap();
        for pair in program.records().windows(2) {
            if pair[0].as_opcode() == Some(OpCode::AddOffset) {
                let (offset, _) = pair[1].as_dyad().unwrap();
                assert_ne!(offset, 0);
            }
        }
        // round-trips through JSON validation, which rejects zero offsets.
        let json = program.to_json().unwrap();
        assert!(Program::from_json(&json).is_ok());
    }

    #[test]
    fn unplant_before_set_zero_drops_superseded_add() {
        let program = lift("+++++[-]", LifterFlags::all()).unwrap();
        assert_eq!(ops(&program), vec![OpCode::SetZero, OpCode::Halt]);
    }
}
