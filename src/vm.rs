// src/vm.rs

use log::{info, trace};

use crate::error::VmError;
use crate::instruction::Instruction;
use crate::io::IoBridge;
use crate::memory::{SegmentStats, SegmentTable};
use crate::registers::RegisterFile;
use crate::Word;

/// Value IN leaves in its register once input is exhausted.
pub const END_OF_INPUT: Word = !0;

// --- Machine state ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineStatus {
    Running,
    /// Terminal: reached by HALT or by a fatal error.
    Halted,
}

/// Limits applied to a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VmConfig {
    /// Stop with [`VmError::StepLimitReached`] after this many instructions.
    pub max_steps: Option<u64>,
}

/// What a run did, reported after it ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub steps: u64,
    pub segments: SegmentStats,
}

// --- Virtual Machine ---

/// The fetch-decode-execute engine.
///
/// Owns the registers, the program counter and the segment table; `IO` carries
/// the bytes for IN and OUT.
#[derive(Debug)]
pub struct VirtualMachine<IO> {
    pub pc: Word,
    pub registers: RegisterFile,
    memory: SegmentTable,
    io: IO,
    status: MachineStatus,
    steps: u64,
    config: VmConfig,
}

impl<IO: IoBridge> VirtualMachine<IO> {
    /// Creates a machine with `program` installed as segment 0 and the program
    /// counter at its first word.
    pub fn new(program: Vec<Word>, io: IO) -> Self {
        Self::with_config(program, io, VmConfig::default())
    }

    pub fn with_config(program: Vec<Word>, io: IO, config: VmConfig) -> Self {
        VirtualMachine {
            pc: 0,
            registers: RegisterFile::new(),
            memory: SegmentTable::new(program),
            io,
            status: MachineStatus::Running,
            steps: 0,
            config,
        }
    }

    // --- Fetching ---

    #[inline]
    fn fetch_instruction(&mut self) -> Result<Instruction, VmError> {
        let word = self.memory.fetch(self.pc).ok_or(VmError::PcOutOfBounds {
            pc: self.pc,
            length: self.memory.program().len(),
        })?;
        let instruction = Instruction::decode(word);
        trace!("{:08x}: {}", self.pc, instruction);
        self.pc = self.pc.wrapping_add(1);
        Ok(instruction)
    }

    // --- Execution Loop ---

    /// Executes one instruction.
    ///
    /// Any error halts the machine; later calls do nothing and report
    /// [`MachineStatus::Halted`].
    pub fn step(&mut self) -> Result<MachineStatus, VmError> {
        if self.status == MachineStatus::Halted {
            return Ok(MachineStatus::Halted);
        }
        if let Err(e) = self.fetch_instruction().and_then(|inst| self.execute(inst)) {
            self.status = MachineStatus::Halted;
            return Err(e);
        }
        self.steps += 1;
        Ok(self.status)
    }

    /// Runs until HALT or the first error.
    pub fn run(&mut self) -> Result<RunStats, VmError> {
        while self.status == MachineStatus::Running {
            if let Some(limit) = self.config.max_steps {
                if self.steps >= limit {
                    self.status = MachineStatus::Halted;
                    return Err(VmError::StepLimitReached(limit));
                }
            }
            self.step()?;
        }
        let stats = self.stats();
        info!(
            "halted after {} instructions ({} maps, {} unmaps, peak {} live segments)",
            stats.steps, stats.segments.maps, stats.segments.unmaps, stats.segments.peak_live
        );
        Ok(stats)
    }

    #[inline]
    fn execute(&mut self, instruction: Instruction) -> Result<(), VmError> {
        let r = &mut self.registers;
        match instruction {
            Instruction::CMov { a, b, c } => {
                if r[c] != 0 {
                    r[a] = r[b];
                }
            }
            Instruction::SegLoad { a, b, c } => {
                r[a] = self.memory.load(r[b], r[c])?;
            }
            Instruction::SegStore { a, b, c } => {
                self.memory.store(r[a], r[b], r[c])?;
            }
            Instruction::Add { a, b, c } => r[a] = r[b].wrapping_add(r[c]),
            Instruction::Mul { a, b, c } => r[a] = r[b].wrapping_mul(r[c]),
            Instruction::Div { a, b, c } => {
                if r[c] == 0 {
                    return Err(VmError::DivisionByZero);
                }
                r[a] = r[b] / r[c];
            }
            Instruction::Nand { a, b, c } => r[a] = !(r[b] & r[c]),
            Instruction::Halt => self.status = MachineStatus::Halted,
            Instruction::MapSeg { b, c } => {
                r[b] = self.memory.map(r[c])?;
            }
            Instruction::UnmapSeg { c } => self.memory.unmap(r[c])?,
            Instruction::Out { c } => {
                let value = r[c];
                let byte = u8::try_from(value).map_err(|_| VmError::OutputOutOfRange(value))?;
                self.io.write_byte(byte)?;
            }
            Instruction::In { c } => {
                r[c] = match self.io.read_byte()? {
                    Some(byte) => byte as Word,
                    None => END_OF_INPUT,
                };
            }
            Instruction::LoadProg { b, c } => {
                let target = r[c];
                self.memory.install_program(r[b])?;
                self.pc = target;
            }
            Instruction::LoadVal { a, value } => r[a] = value,
            Instruction::Unknown(_) => {}
        }
        Ok(())
    }

    // --- Inspection ---

    pub fn status(&self) -> MachineStatus {
        self.status
    }

    pub fn is_halted(&self) -> bool {
        self.status == MachineStatus::Halted
    }

    pub fn memory(&self) -> &SegmentTable {
        &self.memory
    }

    pub fn io(&self) -> &IO {
        &self.io
    }

    pub fn into_io(self) -> IO {
        self.io
    }

    pub fn stats(&self) -> RunStats {
        RunStats {
            steps: self.steps,
            segments: self.memory.stats(),
        }
    }

    /// Prints the program counter and registers to stderr.
    pub fn dump_registers(&self) {
        eprintln!("--- VM State ---");
        eprintln!("PC: {:#010x} ({} words in program)", self.pc, self.memory.program().len());
        eprintln!("{}", self.registers);
    }
}
