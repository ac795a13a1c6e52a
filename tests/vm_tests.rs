// tests/vm_tests.rs

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor, Read};

    use um_vm::instruction::Instruction;
    use um_vm::io::StreamIo;
    use um_vm::registers::Register;
    use um_vm::vm::{MachineStatus, RunStats, END_OF_INPUT};
    use um_vm::{VirtualMachine, VmConfig, VmError, Word};

    type TestVm = VirtualMachine<StreamIo<Cursor<Vec<u8>>, Vec<u8>>>;

    fn r(n: u8) -> Register {
        Register::new(n)
    }

    fn assemble(code: &[Instruction]) -> Vec<Word> {
        code.iter().map(Instruction::encode).collect()
    }

    fn machine(code: &[Instruction], input: &[u8]) -> TestVm {
        let io = StreamIo::new(Cursor::new(input.to_vec()), Vec::new());
        VirtualMachine::new(assemble(code), io)
    }

    // Helper function to create and run VM with simple code
    fn run_vm_code(code: &[Instruction]) -> (TestVm, Result<RunStats, VmError>) {
        let mut vm = machine(code, &[]);
        let result = vm.run();
        (vm, result)
    }

    fn output(vm: &TestVm) -> &[u8] {
        vm.io().output()
    }

    /// Instructions leaving the full 32-bit `value` in `dst`, clobbering `scratch`.
    fn load_word(dst: Register, scratch: Register, value: Word) -> Vec<Instruction> {
        vec![
            Instruction::LoadVal { a: dst, value: value >> 16 },
            Instruction::LoadVal { a: scratch, value: 1 << 16 },
            Instruction::Mul { a: dst, b: dst, c: scratch },
            Instruction::LoadVal { a: scratch, value: value & 0xFFFF },
            Instruction::Add { a: dst, b: dst, c: scratch },
        ]
    }

    #[test]
    fn test_loadval_out_halt() {
        let code = [
            Instruction::LoadVal { a: r(0), value: 72 },
            Instruction::Out { c: r(0) },
            Instruction::Halt,
        ];
        let (vm, result) = run_vm_code(&code);
        assert_eq!(result.unwrap().steps, 3);
        assert_eq!(output(&vm), b"H");
        assert_eq!(vm.status(), MachineStatus::Halted);
    }

    #[test]
    fn test_add_wraps() {
        let code = [
            Instruction::Nand { a: r(1), b: r(0), c: r(0) }, // r1 = !0
            Instruction::LoadVal { a: r(2), value: 1 },
            Instruction::Add { a: r(3), b: r(1), c: r(2) },
            Instruction::Halt,
        ];
        let (vm, result) = run_vm_code(&code);
        assert!(result.is_ok());
        assert_eq!(vm.registers[r(1)], 0xFFFF_FFFF);
        assert_eq!(vm.registers[r(3)], 0);
    }

    #[test]
    fn test_mul_wraps() {
        let code = [
            Instruction::Nand { a: r(1), b: r(0), c: r(0) },
            Instruction::LoadVal { a: r(2), value: 2 },
            Instruction::Mul { a: r(3), b: r(1), c: r(2) },
            Instruction::Halt,
        ];
        let (vm, result) = run_vm_code(&code);
        assert!(result.is_ok());
        assert_eq!(vm.registers[r(3)], 0xFFFF_FFFE);
    }

    #[test]
    fn test_div_is_unsigned_integer_division() {
        let code = [
            Instruction::Nand { a: r(1), b: r(0), c: r(0) }, // 4294967295, not -1
            Instruction::LoadVal { a: r(2), value: 16 },
            Instruction::Div { a: r(3), b: r(1), c: r(2) },
            Instruction::LoadVal { a: r(4), value: 100 },
            Instruction::LoadVal { a: r(5), value: 7 },
            Instruction::Div { a: r(6), b: r(4), c: r(5) },
            Instruction::Halt,
        ];
        let (vm, result) = run_vm_code(&code);
        assert!(result.is_ok());
        assert_eq!(vm.registers[r(3)], 0x0FFF_FFFF);
        assert_eq!(vm.registers[r(6)], 14);
    }

    #[test]
    fn test_div_by_zero() {
        let code = [
            Instruction::LoadVal { a: r(1), value: 10 },
            Instruction::Div { a: r(2), b: r(1), c: r(0) }, // r0 is zero
            Instruction::Out { c: r(1) },                   // never reached
            Instruction::Halt,
        ];
        let (vm, result) = run_vm_code(&code);
        assert!(matches!(result, Err(VmError::DivisionByZero)));
        assert!(output(&vm).is_empty());
        assert!(vm.is_halted());
        assert_eq!(vm.pc, 2);
    }

    #[test]
    fn test_nand() {
        let code = [
            Instruction::LoadVal { a: r(1), value: 0b1100 },
            Instruction::LoadVal { a: r(2), value: 0b1010 },
            Instruction::Nand { a: r(3), b: r(1), c: r(2) },
            Instruction::Halt,
        ];
        let (vm, _) = run_vm_code(&code);
        assert_eq!(vm.registers[r(3)], !0b1000);
    }

    #[test]
    fn test_cmov_taken_and_not_taken() {
        let code = [
            Instruction::LoadVal { a: r(1), value: 5 },
            Instruction::LoadVal { a: r(2), value: 1 },
            Instruction::CMov { a: r(3), b: r(1), c: r(2) }, // r2 != 0: moves
            Instruction::CMov { a: r(4), b: r(1), c: r(0) }, // r0 == 0: no move
            Instruction::Halt,
        ];
        let (vm, _) = run_vm_code(&code);
        assert_eq!(vm.registers[r(3)], 5);
        assert_eq!(vm.registers[r(4)], 0);
    }

    #[test]
    fn test_out_rejects_values_above_255() {
        let code = [
            Instruction::LoadVal { a: r(1), value: 255 },
            Instruction::Out { c: r(1) },
            Instruction::LoadVal { a: r(1), value: 256 },
            Instruction::Out { c: r(1) },
            Instruction::Halt,
        ];
        let (vm, result) = run_vm_code(&code);
        assert!(matches!(result, Err(VmError::OutputOutOfRange(256))));
        assert_eq!(output(&vm), &[255u8]);
    }

    #[test]
    fn test_in_reads_bytes_then_end_of_input() {
        let code = [
            Instruction::In { c: r(1) },
            Instruction::In { c: r(2) },
            Instruction::In { c: r(3) },
            Instruction::Halt,
        ];
        let mut vm = machine(&code, b"ok");
        vm.run().unwrap();
        assert_eq!(vm.registers[r(1)], b'o' as Word);
        assert_eq!(vm.registers[r(2)], b'k' as Word);
        assert_eq!(vm.registers[r(3)], END_OF_INPUT);
        assert_eq!(END_OF_INPUT, 0xFFFF_FFFF);
    }

    /// Input whose every read fails, like a closed stdin.
    struct ClosedInput;

    impl Read for ClosedInput {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "stdin closed"))
        }
    }

    #[test]
    fn test_in_from_unreadable_input_gives_end_of_input() {
        let code = [
            Instruction::In { c: r(1) },
            Instruction::LoadVal { a: r(2), value: 7 }, // still running afterwards
            Instruction::Halt,
        ];
        let io = StreamIo::new(ClosedInput, Vec::new());
        let mut vm = VirtualMachine::new(assemble(&code), io);
        let result = vm.run();
        assert!(result.is_ok(), "IN on unreadable input failed: {:?}", result);
        assert_eq!(vm.registers[r(1)], END_OF_INPUT);
        assert_eq!(vm.registers[r(2)], 7);
    }

    #[test]
    fn test_map_store_load() {
        let code = [
            Instruction::LoadVal { a: r(0), value: 10 },
            Instruction::MapSeg { b: r(1), c: r(0) },
            Instruction::LoadVal { a: r(3), value: 99 },
            Instruction::SegStore { a: r(1), b: r(4), c: r(3) }, // r4 == 0
            Instruction::SegLoad { a: r(2), b: r(1), c: r(4) },
            Instruction::Halt,
        ];
        let (vm, result) = run_vm_code(&code);
        assert!(result.is_ok());
        assert_eq!(vm.registers[r(1)], 1);
        assert_eq!(vm.registers[r(2)], 99);
        assert_eq!(vm.memory().len(1).unwrap(), 10);
    }

    #[test]
    fn test_unmapped_id_is_reused() {
        let code = [
            Instruction::LoadVal { a: r(0), value: 4 },
            Instruction::MapSeg { b: r(1), c: r(0) },
            Instruction::UnmapSeg { c: r(1) },
            Instruction::MapSeg { b: r(2), c: r(0) },
            Instruction::Halt,
        ];
        let (vm, result) = run_vm_code(&code);
        assert!(result.is_ok());
        assert_eq!(vm.registers[r(1)], vm.registers[r(2)]);
    }

    #[test]
    fn test_segment_zero_is_readable() {
        let code = [
            Instruction::LoadVal { a: r(1), value: 3 },
            Instruction::SegLoad { a: r(2), b: r(0), c: r(1) }, // read the HALT word
            Instruction::Halt,
            Instruction::Halt,
        ];
        let (vm, result) = run_vm_code(&code);
        assert!(result.is_ok());
        assert_eq!(vm.registers[r(2)], Instruction::Halt.encode());
    }

    #[test]
    fn test_unmap_program_segment_fails() {
        let code = [Instruction::UnmapSeg { c: r(0) }, Instruction::Halt];
        let (_, result) = run_vm_code(&code);
        assert!(matches!(result, Err(VmError::UnmapProgramSegment)));
    }

    #[test]
    fn test_load_from_unmapped_segment_fails() {
        let code = [
            Instruction::LoadVal { a: r(1), value: 3 },
            Instruction::SegLoad { a: r(2), b: r(1), c: r(0) },
            Instruction::Halt,
        ];
        let (_, result) = run_vm_code(&code);
        assert!(matches!(result, Err(VmError::InvalidSegment(3))));
    }

    #[test]
    fn test_store_past_segment_end_fails() {
        let code = [
            Instruction::LoadVal { a: r(0), value: 2 },
            Instruction::MapSeg { b: r(1), c: r(0) },
            Instruction::SegStore { a: r(1), b: r(0), c: r(0) }, // offset 2 of 2
            Instruction::Halt,
        ];
        let (_, result) = run_vm_code(&code);
        assert!(matches!(
            result,
            Err(VmError::SegmentOutOfBounds { segment: 1, offset: 2, length: 2 })
        ));
    }

    #[test]
    fn test_loadprog_runs_copied_segment() {
        let loaded = [
            Instruction::LoadVal { a: r(2), value: 65 },
            Instruction::Out { c: r(2) },
            Instruction::Halt,
        ];

        let mut code = vec![
            Instruction::LoadVal { a: r(0), value: loaded.len() as Word },
            Instruction::MapSeg { b: r(1), c: r(0) },
        ];
        for (i, inst) in loaded.iter().enumerate() {
            code.extend(load_word(r(3), r(4), inst.encode()));
            code.push(Instruction::LoadVal { a: r(5), value: i as Word });
            code.push(Instruction::SegStore { a: r(1), b: r(5), c: r(3) });
        }
        code.push(Instruction::LoadVal { a: r(7), value: 0 });
        code.push(Instruction::LoadProg { b: r(1), c: r(7) });
        code.push(Instruction::Halt); // replaced before it can run

        let (vm, result) = run_vm_code(&code);
        assert!(result.is_ok());
        assert_eq!(output(&vm), b"A");
        assert_eq!(vm.memory().program(), assemble(&loaded).as_slice());
        assert_eq!(vm.memory().stats().program_loads, 1);
        // The source segment is still mapped and untouched.
        assert_eq!(vm.memory().load(1, 1).unwrap(), Instruction::Out { c: r(2) }.encode());
    }

    #[test]
    fn test_loadprog_segment_zero_only_jumps() {
        let code = [
            Instruction::LoadVal { a: r(1), value: 4 },
            Instruction::LoadVal { a: r(2), value: 300 },
            Instruction::LoadProg { b: r(0), c: r(1) },
            Instruction::Out { c: r(2) }, // skipped; would fail
            Instruction::Halt,
        ];
        let (vm, result) = run_vm_code(&code);
        assert!(result.is_ok());
        assert!(output(&vm).is_empty());
        assert_eq!(vm.memory().stats().program_loads, 0);
    }

    #[test]
    fn test_unknown_opcode_is_noop() {
        let mut vm = VirtualMachine::new(
            vec![0xE000_01FF, 0xF123_4567, Instruction::Halt.encode()],
            StreamIo::new(Cursor::new(Vec::new()), Vec::new()),
        );
        let stats = vm.run().unwrap();
        assert_eq!(stats.steps, 3);
        assert!(vm.registers.as_slice().iter().all(|&v| v == 0));
        assert_eq!(stats.segments.maps, 0);
    }

    #[test]
    fn test_running_off_the_end_fails() {
        let code = [Instruction::LoadVal { a: r(0), value: 1 }];
        let (_, result) = run_vm_code(&code);
        assert!(matches!(result, Err(VmError::PcOutOfBounds { pc: 1, length: 1 })));
    }

    #[test]
    fn test_empty_program_fails() {
        let (_, result) = run_vm_code(&[]);
        assert!(matches!(result, Err(VmError::PcOutOfBounds { pc: 0, length: 0 })));
    }

    #[test]
    fn test_step_limit() {
        // LOADPROG 0, r0 jumps back to itself forever.
        let code = [Instruction::LoadProg { b: r(0), c: r(0) }];
        let io = StreamIo::new(Cursor::new(Vec::new()), Vec::new());
        let config = VmConfig { max_steps: Some(100) };
        let mut vm = VirtualMachine::with_config(assemble(&code), io, config);
        assert!(matches!(vm.run(), Err(VmError::StepLimitReached(100))));
        assert_eq!(vm.stats().steps, 100);
        assert!(vm.is_halted());
    }

    #[test]
    fn test_step_after_halt_does_nothing() {
        let code = [
            Instruction::Halt,
            Instruction::LoadVal { a: r(0), value: 1 },
        ];
        let mut vm = machine(&code, &[]);
        assert_eq!(vm.step().unwrap(), MachineStatus::Halted);
        assert_eq!(vm.step().unwrap(), MachineStatus::Halted);
        assert_eq!(vm.registers[r(0)], 0);
        assert_eq!(vm.pc, 1);
        assert_eq!(vm.stats().steps, 1);
    }

    #[test]
    fn test_step_after_error_does_nothing() {
        let code = [
            Instruction::Div { a: r(0), b: r(0), c: r(0) },
            Instruction::LoadVal { a: r(1), value: 1 },
        ];
        let mut vm = machine(&code, &[]);
        assert!(matches!(vm.step(), Err(VmError::DivisionByZero)));
        assert_eq!(vm.step().unwrap(), MachineStatus::Halted);
        assert_eq!(vm.registers[r(1)], 0);
    }

    #[test]
    fn test_machines_are_independent() {
        let code = [
            Instruction::LoadVal { a: r(0), value: 1 },
            Instruction::MapSeg { b: r(1), c: r(0) },
            Instruction::Halt,
        ];
        let (first, _) = run_vm_code(&code);
        let (second, _) = run_vm_code(&code);
        assert_eq!(first.registers[r(1)], 1);
        assert_eq!(second.registers[r(1)], 1);
    }
}
