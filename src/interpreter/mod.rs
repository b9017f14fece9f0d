//! The engine (§4.3): a dispatch loop over a lifted [`Program`][crate::ir::Program].
//! Every record is visited exactly once per execution step; there is no
//! separate decode phase, matching the threaded-dispatch design spec'd for
//! this interpreter.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::ir::{OpCode, Program};

/// Default tape length (§6.4): large enough for the vast majority of
/// Brainfuck programs in the wild, overridable via [`EngineBuilder::tape_size`].
pub const DEFAULT_TAPE_SIZE: usize = 30_000;

/// Errors raised while executing a lifted program.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("tape pointer underflowed past cell 0")]
    PointerUnderflow,
    #[error("tape pointer overflowed past the last cell ({tape_size})")]
    PointerOverflow { tape_size: usize },
    #[error("I/O error talking to stdin/stdout: {0}")]
    Io(#[from] io::Error),
}

/// Builds an [`Engine`] over a program, defaulting the tape size and I/O
/// streams the way a one-off CLI invocation wants them.
pub struct EngineBuilder<'p> {
    program: &'p Program,
    tape_size: usize,
}

impl<'p> EngineBuilder<'p> {
    pub fn new(program: &'p Program) -> EngineBuilder<'p> {
        EngineBuilder { program, tape_size: DEFAULT_TAPE_SIZE }
    }

    pub fn tape_size(mut self, tape_size: usize) -> EngineBuilder<'p> {
        self.tape_size = tape_size;
        self
    }

    pub fn build<R: Read, W: Write>(self, input: R, output: W) -> Engine<'p, R, W> {
        Engine {
            program: self.program,
            tape: vec![0u8; self.tape_size],
            pointer: 0,
            pc: 0,
            input,
            output,
        }
    }
}

/// A single-threaded, synchronous execution of a [`Program`] against a
/// fixed-size wrapping tape of `u8` cells and a pair of blocking I/O
/// streams.
pub struct Engine<'p, R, W> {
    program: &'p Program,
    tape: Vec<u8>,
    pointer: usize,
    pc: usize,
    input: R,
    output: W,
}

impl<'p> Engine<'p, io::Stdin, io::Stdout> {
    /// Builds an engine wired to the process's stdin/stdout, the shape
    /// every `ciscfuck run` invocation actually uses.
    pub fn on_stdio(program: &'p Program) -> Engine<'p, io::Stdin, io::Stdout> {
        EngineBuilder::new(program).build(io::stdin(), io::stdout())
    }
}

impl<'p, R: Read, W: Write> Engine<'p, R, W> {
    pub fn builder(program: &'p Program) -> EngineBuilder<'p> {
        EngineBuilder::new(program)
    }

    fn cell(&self) -> u8 {
        self.tape[self.pointer]
    }

    fn add_at(&mut self, index: usize, delta: i64) {
        let current = self.tape[index] as i64;
        self.tape[index] = current.rem_euclid(256).wrapping_add(delta.rem_euclid(256)) as u8;
    }

    fn move_pointer(&mut self, delta: i64) -> Result<(), RuntimeError> {
        let target = self.pointer as i64 + delta;
        if target < 0 {
            return Err(RuntimeError::PointerUnderflow);
        }
        if target as usize >= self.tape.len() {
            return Err(RuntimeError::PointerOverflow { tape_size: self.tape.len() });
        }
        self.pointer = target as usize;
        Ok(())
    }

    fn offset_target(&self, offset: i64) -> Result<usize, RuntimeError> {
        let target = self.pointer as i64 + offset;
        if target < 0 {
            return Err(RuntimeError::PointerUnderflow);
        }
        if target as usize >= self.tape.len() {
            return Err(RuntimeError::PointerOverflow { tape_size: self.tape.len() });
        }
        Ok(target as usize)
    }

    fn operand_at(&self, slot: usize) -> i64 {
        self.program.get(slot).and_then(|r| r.as_operand()).expect("operand slot must hold an Operand record")
    }

    fn dyad_at(&self, slot: usize) -> (i64, i64) {
        self.program.get(slot).and_then(|r| r.as_dyad()).expect("operand slot must hold a Dyad record")
    }

    /// Runs the program to completion (`HALT`), or returns the first error.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            let code = self
                .program
                .get(self.pc)
                .and_then(|r| r.as_opcode())
                .expect("pc must always address an opcode record in a validated program");

            match code {
                OpCode::Halt => return Ok(()),

                OpCode::Incr => {
                    self.add_at(self.pointer, 1);
                    self.pc += 1;
                }
                OpCode::Decr => {
                    self.add_at(self.pointer, -1);
                    self.pc += 1;
                }
                OpCode::Add => {
                    let delta = self.operand_at(self.pc + 1);
                    self.add_at(self.pointer, delta);
                    self.pc += 2;
                }
                OpCode::AddOffset => {
                    let (offset, delta) = self.dyad_at(self.pc + 1);
                    let target = self.offset_target(offset)?;
                    self.add_at(target, delta);
                    self.pc += 2;
                }
                OpCode::XfrMultiple => {
                    let (offset, factor) = self.dyad_at(self.pc + 1);
                    let target = self.offset_target(offset)?;
                    let value = self.cell() as i64;
                    self.add_at(target, value * factor);
                    self.tape[self.pointer] = 0;
                    self.pc += 2;
                }
                OpCode::SetZero => {
                    self.tape[self.pointer] = 0;
                    self.pc += 1;
                }

                OpCode::Left => {
                    self.move_pointer(-1)?;
                    self.pc += 1;
                }
                OpCode::Right => {
                    self.move_pointer(1)?;
                    self.pc += 1;
                }
                OpCode::Move => {
                    let delta = self.operand_at(self.pc + 1);
                    self.move_pointer(delta)?;
                    self.pc += 2;
                }
                OpCode::SeekLeft => {
                    while self.cell() != 0 {
                        self.move_pointer(-1)?;
                    }
                    self.pc += 1;
                }
                OpCode::SeekRight => {
                    while self.cell() != 0 {
                        self.move_pointer(1)?;
                    }
                    self.pc += 1;
                }

                OpCode::Open => {
                    let target = self.operand_at(self.pc + 1);
                    if self.cell() == 0 {
                        self.pc = target as usize;
                    } else {
                        self.pc += 2;
                    }
                }
                OpCode::Close => {
                    let target = self.operand_at(self.pc + 1);
                    if self.cell() != 0 {
                        self.pc = target as usize;
                    } else {
                        self.pc += 2;
                    }
                }

                OpCode::Get => {
                    let mut byte = [0u8; 1];
                    // EOF is not an error (§7): the cell is simply left
                    // untouched when no byte is available.
                    if self.input.read(&mut byte)? == 1 {
                        self.tape[self.pointer] = byte[0];
                    }
                    self.pc += 1;
                }
                OpCode::Put => {
                    self.output.write_all(&[self.cell()])?;
                    self.pc += 1;
                }
            }
        }
    }
}
