//! Interpreter for JVM bytecode.
//!
//! Execution runs on an explicit stack of frames rather than on the host
//! call stack: `invokestatic` pushes a frame for the callee and the dispatch
//! loop resumes the caller once the callee completes. This keeps recursion
//! depth bounded by `ExecutionConfig::max_call_depth` and lets the loop check
//! the instruction and time budgets in a single place.
use std::time::Instant;

use tracing::{debug, trace};

use crate::bytecode::{Instruction, OPCode, Operand};
use crate::config::ExecutionConfig;
use crate::descriptor::MethodDescriptor;
use crate::error::{Location, RuntimeError, RuntimeErrorKind};
use crate::jvm::{CodeAttribute, JVMClassFile, MethodInfo};
use crate::registry::ClassRegistry;
use crate::trace::{TraceEvent, TraceHook};

type Result<T> = std::result::Result<T, RuntimeError>;

/// Execution state of a single method activation.
#[derive(Debug)]
struct Frame<'a> {
    class: &'a JVMClassFile,
    method: &'a MethodInfo,
    code: CodeAttribute,
    pc: usize,
    stack: Vec<i32>,
    locals: Vec<i32>,
    return_value: i32,
    // Whether the caller expects the return value on its stack.
    returns_value: bool,
}

impl<'a> Frame<'a> {
    fn new(
        class: &'a JVMClassFile,
        method: &'a MethodInfo,
        mut args: Vec<i32>,
        returns_value: bool,
    ) -> std::result::Result<Self, RuntimeErrorKind> {
        let code = method.code(class.constant_pool())?;
        let slots = args.len().max(code.max_locals as usize);
        args.resize(slots, 0);
        Ok(Self {
            class,
            method,
            stack: Vec::with_capacity(code.max_stack as usize),
            code,
            pc: 0,
            locals: args,
            return_value: 0,
            returns_value,
        })
    }

    fn class_name(&self) -> &'a str {
        self.class.name().unwrap_or("<unknown>")
    }

    fn method_name(&self) -> &'a str {
        self.method
            .name(self.class.constant_pool())
            .unwrap_or("<unknown>")
    }

    fn location(&self, pc: usize, opcode: Option<u8>) -> Location {
        location(self.class, self.method, pc, opcode)
    }

    fn is_done(&self) -> bool {
        self.pc >= self.code.code.len()
    }

    // Force the frame to complete.
    fn finish(&mut self) {
        self.pc = self.code.code.len();
    }

    fn push(&mut self, value: i32) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> std::result::Result<i32, RuntimeErrorKind> {
        self.stack.pop().ok_or(RuntimeErrorKind::StackUnderflow)
    }

    fn local(&self, index: usize) -> std::result::Result<i32, RuntimeErrorKind> {
        self.locals
            .get(index)
            .copied()
            .ok_or(RuntimeErrorKind::LocalOutOfRange {
                index,
                size: self.locals.len(),
            })
    }

    /// Jump by `offset` relative to the current instruction. Targets at or
    /// past the end of the code complete the frame.
    fn branch(&mut self, offset: i16) -> std::result::Result<(), RuntimeErrorKind> {
        let target = self.pc as isize + offset as isize;
        if target < 0 {
            return Err(RuntimeErrorKind::BranchOutOfRange { target });
        }
        self.pc = target as usize;
        Ok(())
    }
}

fn location(class: &JVMClassFile, method: &MethodInfo, pc: usize, opcode: Option<u8>) -> Location {
    let pool = class.constant_pool();
    Location {
        class: class.name().unwrap_or("<unknown>").to_owned(),
        method: method.name(pool).unwrap_or("<unknown>").to_owned(),
        descriptor: method.descriptor(pool).unwrap_or("").to_owned(),
        pc,
        opcode,
    }
}

/// Outcome of executing one instruction.
enum Step<'a> {
    Continue,
    Invoke(Frame<'a>),
}

/// `Interpreter` for a stack based virtual machine for JVM bytecode.
pub struct Interpreter<'a> {
    // Classes reachable through `invokestatic`.
    registry: &'a ClassRegistry,
    config: ExecutionConfig,
    hook: &'a mut dyn TraceHook,
    // Instructions executed by the current `run`.
    executed: u64,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        registry: &'a ClassRegistry,
        config: ExecutionConfig,
        hook: &'a mut dyn TraceHook,
    ) -> Self {
        Self {
            registry,
            config,
            hook,
            executed: 0,
        }
    }

    /// Number of instructions executed by the last call to `run`.
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Run `method` of `class` with `args` seeded into its first local
    /// slots and return its result, 0 for `void` methods.
    pub fn run(
        &mut self,
        class: &'a JVMClassFile,
        method: &'a MethodInfo,
        args: &[i32],
    ) -> Result<i32> {
        self.executed = 0;
        let start = Instant::now();
        let entry = Frame::new(class, method, args.to_vec(), true)
            .map_err(|kind| RuntimeError::new(kind).at(location(class, method, 0, None)))?;
        debug!(
            "invoking {}.{} with {:?}",
            entry.class_name(),
            entry.method_name(),
            args
        );

        let mut frames = vec![entry];
        let mut result = 0;
        loop {
            let depth = frames.len();
            let Some(frame) = frames.last_mut() else {
                break;
            };

            if frame.is_done() {
                let Some(done) = frames.pop() else {
                    break;
                };
                debug!(
                    "{}.{} returned {}",
                    done.class_name(),
                    done.method_name(),
                    done.return_value
                );
                match frames.last_mut() {
                    Some(caller) if done.returns_value => caller.push(done.return_value),
                    Some(_) => (),
                    None => result = done.return_value,
                }
                continue;
            }

            let pc = frame.pc;
            let opcode = frame.code.code.get(pc).copied();
            let at = |frame: &Frame| frame.location(pc, opcode);

            self.check_budget(start).map_err(|kind| RuntimeError::new(kind).at(at(frame)))?;
            let instruction = Instruction::decode(&frame.code.code, pc)
                .map_err(|kind| RuntimeError::new(kind).at(at(frame)))?;
            self.executed += 1;

            let step = self
                .step(frame, instruction, depth)
                .map_err(|err| err.at(at(frame)))?;

            trace!(
                "{}.{} @{} {} stack {:?}",
                frame.class_name(),
                frame.method_name(),
                pc,
                instruction,
                frame.stack
            );
            if self.hook.enabled() {
                self.hook.on_instruction(&TraceEvent {
                    class: frame.class_name(),
                    method: frame.method_name(),
                    depth,
                    pc,
                    instruction,
                    stack: &frame.stack,
                });
            }

            if let Step::Invoke(callee) = step {
                frames.push(callee);
            }
        }
        Ok(result)
    }

    fn check_budget(&self, start: Instant) -> std::result::Result<(), RuntimeErrorKind> {
        if let Some(limit) = self.config.instruction_limit {
            if self.executed >= limit {
                return Err(RuntimeErrorKind::InstructionLimitExceeded(limit));
            }
        }
        if let Some(deadline) = self.config.deadline {
            if start.elapsed() > deadline {
                return Err(RuntimeErrorKind::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Execute `instruction`, the one at the frame's current pc.
    fn step(
        &mut self,
        frame: &mut Frame<'a>,
        instruction: Instruction,
        depth: usize,
    ) -> Result<Step<'a>> {
        match (instruction.mnemonic, instruction.operand) {
            (OPCode::Iconst1, _) => frame.push(1),
            (OPCode::Bipush, Operand::Immediate(value)) => frame.push(value),
            // Placeholders: the raw constant pool index stands in for the
            // constant or static field value.
            (OPCode::Ldc | OPCode::Getstatic, Operand::Index(index)) => frame.push(index as i32),
            (OPCode::Iload0, _) => {
                let value = frame.local(0)?;
                frame.push(value);
            }
            (OPCode::Pop, _) => {
                frame.pop()?;
            }
            (OPCode::Isub, _) => {
                let value2 = frame.pop()?;
                let value1 = frame.pop()?;
                frame.push(value1.wrapping_sub(value2));
            }
            (OPCode::Imul, _) => {
                let value2 = frame.pop()?;
                let value1 = frame.pop()?;
                frame.push(value1.wrapping_mul(value2));
            }
            (OPCode::IfIcmpne, Operand::Offset(offset)) => {
                let value2 = frame.pop()?;
                let value1 = frame.pop()?;
                if value1 != value2 {
                    frame.branch(offset)?;
                    return Ok(Step::Continue);
                }
            }
            (OPCode::Goto, Operand::Offset(offset)) => {
                frame.branch(offset)?;
                return Ok(Step::Continue);
            }
            (OPCode::Ireturn, _) => {
                frame.return_value = frame.pop()?;
                frame.finish();
                return Ok(Step::Continue);
            }
            (OPCode::Return, _) => {
                frame.return_value = 0;
                frame.finish();
                return Ok(Step::Continue);
            }
            (OPCode::Invokestatic, Operand::Index(index)) => {
                let callee = self.invoke_static(frame, index, depth)?;
                return Ok(Step::Invoke(callee));
            }
            (
                OPCode::Bipush
                | OPCode::Ldc
                | OPCode::Getstatic
                | OPCode::IfIcmpne
                | OPCode::Goto
                | OPCode::Invokestatic,
                operand,
            ) => {
                return Err(RuntimeErrorKind::MalformedOperand {
                    opcode: instruction.mnemonic.byte(),
                    operand,
                }
                .into())
            }
        }
        frame.pc += instruction.length();
        Ok(Step::Continue)
    }

    /// Resolve the method referenced by constant `index` and build its
    /// frame. Nothing in the caller changes unless the callee frame can be
    /// built.
    fn invoke_static(
        &mut self,
        frame: &mut Frame<'a>,
        index: u16,
        depth: usize,
    ) -> Result<Frame<'a>> {
        let registry: &'a ClassRegistry = self.registry;
        let caller: &'a JVMClassFile = frame.class;
        let target = caller.constant_pool().method_ref(index)?;
        let class = registry.find(target.class)?;
        let method = class
            .find_method(target.name, target.descriptor)
            .ok_or_else(|| RuntimeErrorKind::MethodNotFound {
                class: target.class.to_owned(),
                name: target.name.to_owned(),
                descriptor: target.descriptor.to_owned(),
            })?;
        let descriptor = MethodDescriptor::parse(target.descriptor)?;

        if depth >= self.config.max_call_depth {
            return Err(RuntimeErrorKind::CallDepthExceeded(self.config.max_call_depth).into());
        }
        let argc = descriptor.arity();
        if frame.stack.len() < argc {
            return Err(RuntimeErrorKind::StackUnderflow.into());
        }
        // The last argument is on top of the stack, slicing keeps
        // declaration order.
        let args = frame.stack[frame.stack.len() - argc..].to_vec();
        let callee = Frame::new(class, method, args, descriptor.returns_value())
            .map_err(|kind| RuntimeError::new(kind).at(location(class, method, 0, None)))?;

        debug!(
            "invokestatic {}.{}{} with {:?}",
            target.class, target.name, target.descriptor, callee.locals
        );
        frame.stack.truncate(frame.stack.len() - argc);
        frame.pc += OPCode::Invokestatic.length();
        Ok(callee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClassNotFound;
    use crate::jvm::JVMParser;
    use crate::testing::ClassBuilder;
    use crate::trace::{NoTrace, TraceRecorder};

    /// Build a registry holding the classes assembled by `builders`.
    fn registry(builders: &[&ClassBuilder]) -> ClassRegistry {
        let mut registry = ClassRegistry::new();
        for builder in builders {
            registry
                .register(JVMParser::parse(&builder.build()).unwrap())
                .unwrap();
        }
        registry
    }

    fn run_with(
        registry: &ClassRegistry,
        config: ExecutionConfig,
        hook: &mut dyn TraceHook,
        class: &str,
        name: &str,
        descriptor: &str,
        args: &[i32],
    ) -> Result<i32> {
        let class = registry.find(class).unwrap();
        let method = class.find_method(name, descriptor).unwrap();
        Interpreter::new(registry, config, hook).run(class, method, args)
    }

    fn run(registry: &ClassRegistry, class: &str, name: &str, descriptor: &str) -> Result<i32> {
        run_with(
            registry,
            ExecutionConfig::default(),
            &mut NoTrace,
            class,
            name,
            descriptor,
            &[],
        )
    }

    /// Class `Main` with a single static method `main` running `code`.
    fn single(descriptor: &str, max_locals: u16, code: &[u8]) -> ClassBuilder {
        let mut builder = ClassBuilder::new("Main");
        builder.method("main", descriptor, 4, max_locals, code);
        builder
    }

    #[test]
    fn subtracts_constants() {
        // bipush 5; bipush 3; isub; ireturn
        let main = single("(I)I", 1, &[0x10, 5, 0x10, 3, 0x64, 0xac]);
        assert_eq!(run(&registry(&[&main]), "Main", "main", "(I)I"), Ok(2));
    }

    #[test]
    fn multiplies_constants() {
        // iconst_1; bipush 10; imul; ireturn
        let main = single("()I", 0, &[0x04, 0x10, 10, 0x68, 0xac]);
        assert_eq!(run(&registry(&[&main]), "Main", "main", "()I"), Ok(10));
    }

    #[test]
    fn arithmetic_wraps_around() {
        let cases = [
            (0, 0),
            (1, -1),
            (i32::MAX, -1),
            (i32::MIN, 1),
            (i32::MIN, -1),
            (i32::MAX, i32::MAX),
            (123_456, -98_765),
        ];
        for (a, b) in cases {
            let frame_stack = |op: u8| {
                let main = single("(II)I", 2, &[op, 0xac]);
                let registry = registry(&[&main]);
                let class = registry.find("Main").unwrap();
                let method = class.find_method("main", "(II)I").unwrap();
                let mut frame = Frame::new(class, method, vec![], true).unwrap();
                frame.push(a);
                frame.push(b);
                let mut hook = NoTrace;
                let mut interpreter =
                    Interpreter::new(&registry, ExecutionConfig::default(), &mut hook);
                let instruction = Instruction::decode(&frame.code.code, 0).unwrap();
                assert!(matches!(
                    interpreter.step(&mut frame, instruction, 1),
                    Ok(Step::Continue)
                ));
                assert_eq!(frame.pc, 1);
                frame.stack.clone()
            };
            assert_eq!(frame_stack(0x64), vec![a.wrapping_sub(b)], "{a} - {b}");
            assert_eq!(frame_stack(0x68), vec![a.wrapping_mul(b)], "{a} * {b}");
        }
    }

    #[test]
    fn bipush_sign_extends() {
        // bipush -128; ireturn
        let main = single("()I", 0, &[0x10, 0x80, 0xac]);
        assert_eq!(run(&registry(&[&main]), "Main", "main", "()I"), Ok(-128));
    }

    #[test]
    fn goto_skips_dead_instructions() {
        // bipush 7; goto +5; pop; pop; ireturn
        let main = single("()I", 0, &[0x10, 7, 0xa7, 0x00, 0x05, 0x57, 0x57, 0xac]);
        let registry = registry(&[&main]);
        let mut recorder = TraceRecorder::new();
        let result = run_with(
            &registry,
            ExecutionConfig::default(),
            &mut recorder,
            "Main",
            "main",
            "()I",
            &[],
        );
        assert_eq!(result, Ok(7));
        assert_eq!(
            recorder.opcodes(),
            vec![OPCode::Bipush, OPCode::Goto, OPCode::Ireturn]
        );
        assert_eq!(recorder.entries()[2].pc, 7);
    }

    #[test]
    fn goto_branches_backwards() {
        // 0: goto +5; 3: iconst_1; 4: ireturn; 5: goto -2
        let main = single("()I", 0, &[0xa7, 0x00, 0x05, 0x04, 0xac, 0xa7, 0xff, 0xfe]);
        assert_eq!(run(&registry(&[&main]), "Main", "main", "()I"), Ok(1));
    }

    #[test]
    fn if_icmpne_branches_on_inequality() {
        // 0: iload_0; 1: iconst_1; 2: if_icmpne +6; 5: bipush 10; 7: ireturn;
        // 8: bipush 20; 10: ireturn
        let code = [
            0x1a, 0x04, 0xa0, 0x00, 0x06, 0x10, 10, 0xac, 0x10, 20, 0xac,
        ];
        let main = single("(I)I", 1, &code);
        let registry = registry(&[&main]);
        let call = |arg| {
            run_with(
                &registry,
                ExecutionConfig::default(),
                &mut NoTrace,
                "Main",
                "main",
                "(I)I",
                &[arg],
            )
        };
        assert_eq!(call(1), Ok(10));
        assert_eq!(call(2), Ok(20));
    }

    #[test]
    fn ldc_and_getstatic_push_the_pool_index() {
        // ldc #9; getstatic #300; isub; ireturn
        let main = single("()I", 0, &[0x12, 9, 0xb2, 0x01, 0x2c, 0x64, 0xac]);
        assert_eq!(run(&registry(&[&main]), "Main", "main", "()I"), Ok(9 - 300));
    }

    #[test]
    fn getstatic_pushes_the_fieldref_index() {
        let mut main = ClassBuilder::new("Main");
        main.field("counter", "I");
        let counter = main.field_ref("Main", "counter", "I");
        let [hi, lo] = counter.to_be_bytes();
        // getstatic Main.counter; ireturn
        main.method("main", "()I", 1, 0, &[0xb2, hi, lo, 0xac]);
        let registry = registry(&[&main]);
        let class = registry.find("Main").unwrap();
        let field = class.constant_pool().field_ref(counter).unwrap();
        assert_eq!((field.class, field.name, field.descriptor), ("Main", "counter", "I"));
        assert_eq!(run(&registry, "Main", "main", "()I"), Ok(i32::from(counter)));
    }

    #[test]
    fn operands_must_match_their_opcode() {
        let main = single("()I", 0, &[0xa7, 0x00, 0x00]);
        let registry = registry(&[&main]);
        let class = registry.find("Main").unwrap();
        let method = class.find_method("main", "()I").unwrap();
        let mut frame = Frame::new(class, method, vec![], true).unwrap();
        let mut hook = NoTrace;
        let mut interpreter = Interpreter::new(&registry, ExecutionConfig::default(), &mut hook);
        let goto_without_offset = Instruction {
            mnemonic: OPCode::Goto,
            operand: Operand::Immediate(3),
        };
        let err = match interpreter.step(&mut frame, goto_without_offset, 1) {
            Err(err) => err,
            Ok(_) => panic!("mismatched operand was executed"),
        };
        assert_eq!(
            err.kind(),
            &RuntimeErrorKind::MalformedOperand {
                opcode: 0xa7,
                operand: Operand::Immediate(3),
            }
        );
        assert_eq!(frame.pc, 0);
    }

    #[test]
    fn return_yields_zero() {
        // bipush 9; return
        let main = single("()V", 0, &[0x10, 9, 0xb1]);
        assert_eq!(run(&registry(&[&main]), "Main", "main", "()V"), Ok(0));
    }

    #[test]
    fn falls_off_the_end_of_the_code() {
        let main = single("()V", 0, &[0x04, 0x57]);
        assert_eq!(run(&registry(&[&main]), "Main", "main", "()V"), Ok(0));
    }

    #[test]
    fn invokestatic_passes_arguments_in_order() {
        let mut calc = ClassBuilder::new("Calc");
        // Returns its first declared argument.
        calc.method("first", "(II)I", 2, 2, &[0x1a, 0xac]);
        let mut main = ClassBuilder::new("Main");
        let first = main.method_ref("Calc", "first", "(II)I");
        let [hi, lo] = first.to_be_bytes();
        // bipush 9; bipush 4; invokestatic Calc.first; ireturn
        main.method("main", "()I", 2, 0, &[0x10, 9, 0x10, 4, 0xb8, hi, lo, 0xac]);
        assert_eq!(run(&registry(&[&main, &calc]), "Main", "main", "()I"), Ok(9));
    }

    #[test]
    fn invokestatic_has_net_zero_stack_effect_for_int_to_int() {
        let mut calc = ClassBuilder::new("Calc");
        // iload_0; iload_0; imul; ireturn
        calc.method("square", "(I)I", 2, 1, &[0x1a, 0x1a, 0x68, 0xac]);
        let mut main = ClassBuilder::new("Main");
        let square = main.method_ref("Calc", "square", "(I)I");
        let [hi, lo] = square.to_be_bytes();
        // bipush 1; bipush 6; invokestatic Calc.square; isub; ireturn
        main.method("main", "()I", 2, 0, &[0x10, 1, 0x10, 6, 0xb8, hi, lo, 0x64, 0xac]);
        let registry = registry(&[&main, &calc]);
        let mut recorder = TraceRecorder::new();
        let result = run_with(
            &registry,
            ExecutionConfig::default(),
            &mut recorder,
            "Main",
            "main",
            "()I",
            &[],
        );
        assert_eq!(result, Ok(1 - 36));

        let entries = recorder.entries();
        // Caller stack right before the call is [1, 6].
        assert_eq!(entries[1].stack, vec![1, 6]);
        // The invocation pops the single argument.
        assert_eq!(entries[2].inst.mnemonic, OPCode::Invokestatic);
        assert_eq!(entries[2].stack, vec![1]);
        // Callee runs one frame deeper.
        assert!(entries[3..7].iter().all(|e| e.depth == 2 && e.class == "Calc"));
        // Once the callee returns the caller holds [1, 36].
        let isub = &entries[7];
        assert_eq!((isub.depth, isub.inst.mnemonic), (1, OPCode::Isub));
        assert_eq!(isub.stack, vec![-35]);
    }

    #[test]
    fn void_callees_push_nothing() {
        let mut util = ClassBuilder::new("Util");
        util.method("noop", "(I)V", 1, 1, &[0xb1]);
        let mut main = ClassBuilder::new("Main");
        let noop = main.method_ref("Util", "noop", "(I)V");
        let [hi, lo] = noop.to_be_bytes();
        // bipush 3; bipush 4; invokestatic Util.noop; ireturn
        main.method("main", "()I", 2, 0, &[0x10, 3, 0x10, 4, 0xb8, hi, lo, 0xac]);
        assert_eq!(run(&registry(&[&main, &util]), "Main", "main", "()I"), Ok(3));
    }

    #[test]
    fn invoking_an_unregistered_class_fails_fast() {
        let mut main = ClassBuilder::new("Main");
        let missing = main.method_ref("Missing", "f", "()I");
        let [hi, lo] = missing.to_be_bytes();
        // bipush 1; invokestatic Missing.f; pop; ireturn
        main.method("main", "()I", 2, 0, &[0x10, 1, 0xb8, hi, lo, 0x57, 0xac]);
        let registry = registry(&[&main]);
        let mut recorder = TraceRecorder::new();
        let err = run_with(
            &registry,
            ExecutionConfig::default(),
            &mut recorder,
            "Main",
            "main",
            "()I",
            &[],
        )
        .unwrap_err();
        assert_eq!(
            err.kind(),
            &RuntimeErrorKind::ClassNotFound(ClassNotFound("Missing".to_owned()))
        );
        let location = err.location().unwrap();
        assert_eq!((location.class.as_str(), location.method.as_str()), ("Main", "main"));
        assert_eq!((location.pc, location.opcode), (2, Some(0xb8)));
        // Nothing after the failed call ran.
        assert_eq!(recorder.opcodes(), vec![OPCode::Bipush]);
    }

    #[test]
    fn invoking_a_missing_method_fails() {
        let calc = ClassBuilder::new("Calc");
        let mut main = ClassBuilder::new("Main");
        let absent = main.method_ref("Calc", "absent", "()I");
        let [hi, lo] = absent.to_be_bytes();
        main.method("main", "()I", 1, 0, &[0xb8, hi, lo, 0xac]);
        let err = run(&registry(&[&main, &calc]), "Main", "main", "()I").unwrap_err();
        assert!(matches!(
            err.kind(),
            RuntimeErrorKind::MethodNotFound { name, .. } if name == "absent"
        ));
    }

    #[test]
    fn invokestatic_rejects_unsupported_descriptors() {
        let mut calc = ClassBuilder::new("Calc");
        calc.method("wide", "(J)I", 2, 2, &[0x04, 0xac]);
        let mut main = ClassBuilder::new("Main");
        let wide = main.method_ref("Calc", "wide", "(J)I");
        let [hi, lo] = wide.to_be_bytes();
        main.method("main", "()I", 2, 0, &[0xb8, hi, lo, 0xac]);
        let err = run(&registry(&[&main, &calc]), "Main", "main", "()I").unwrap_err();
        assert!(matches!(err.kind(), RuntimeErrorKind::Descriptor(_)));
    }

    #[test]
    fn invokestatic_requires_a_method_ref() {
        let mut main = ClassBuilder::new("Main");
        let class = main.class("Main");
        let [hi, lo] = class.to_be_bytes();
        main.method("main", "()I", 1, 0, &[0xb8, hi, lo, 0xac]);
        let err = run(&registry(&[&main]), "Main", "main", "()I").unwrap_err();
        assert!(matches!(err.kind(), RuntimeErrorKind::Resolution(_)));
    }

    #[test]
    fn unsupported_instructions_are_fatal() {
        // iconst_1; iconst_1; iadd; ireturn
        let main = single("()I", 0, &[0x04, 0x04, 0x60, 0xac]);
        let err = run(&registry(&[&main]), "Main", "main", "()I").unwrap_err();
        assert_eq!(
            err.kind(),
            &RuntimeErrorKind::UnsupportedInstruction { opcode: 0x60 }
        );
        assert_eq!(err.location().unwrap().pc, 2);
        assert_eq!(
            err.to_string(),
            "unsupported instruction 0x60 in Main.main()I at pc 2 (0x60)"
        );
    }

    #[test]
    fn popping_an_empty_stack_underflows() {
        let main = single("()I", 0, &[0x57, 0xac]);
        let err = run(&registry(&[&main]), "Main", "main", "()I").unwrap_err();
        assert_eq!(err.kind(), &RuntimeErrorKind::StackUnderflow);
    }

    #[test]
    fn missing_locals_are_reported() {
        let main = single("()I", 0, &[0x1a, 0xac]);
        let err = run(&registry(&[&main]), "Main", "main", "()I").unwrap_err();
        assert_eq!(
            err.kind(),
            &RuntimeErrorKind::LocalOutOfRange { index: 0, size: 0 }
        );
    }

    #[test]
    fn branches_before_the_code_are_rejected() {
        let main = single("()I", 0, &[0xa7, 0xff, 0xf0]);
        let err = run(&registry(&[&main]), "Main", "main", "()I").unwrap_err();
        assert_eq!(
            err.kind(),
            &RuntimeErrorKind::BranchOutOfRange { target: -16 }
        );
    }

    #[test]
    fn instruction_budget_stops_infinite_loops() {
        // goto +0
        let main = single("()V", 0, &[0xa7, 0x00, 0x00]);
        let registry = registry(&[&main]);
        let err = run_with(
            &registry,
            ExecutionConfig::default().with_instruction_limit(1_000),
            &mut NoTrace,
            "Main",
            "main",
            "()V",
            &[],
        )
        .unwrap_err();
        assert_eq!(err.kind(), &RuntimeErrorKind::InstructionLimitExceeded(1_000));
    }

    #[test]
    fn deadline_stops_infinite_loops() {
        let main = single("()V", 0, &[0xa7, 0x00, 0x00]);
        let registry = registry(&[&main]);
        let err = run_with(
            &registry,
            ExecutionConfig::default().with_deadline(std::time::Duration::from_millis(10)),
            &mut NoTrace,
            "Main",
            "main",
            "()V",
            &[],
        )
        .unwrap_err();
        assert_eq!(err.kind(), &RuntimeErrorKind::DeadlineExceeded);
    }

    #[test]
    fn call_depth_is_bounded() {
        let mut main = ClassBuilder::new("Main");
        let recurse = main.method_ref("Main", "main", "()I");
        let [hi, lo] = recurse.to_be_bytes();
        main.method("main", "()I", 1, 0, &[0xb8, hi, lo, 0xac]);
        let registry = registry(&[&main]);
        let err = run_with(
            &registry,
            ExecutionConfig::default().with_max_call_depth(16),
            &mut NoTrace,
            "Main",
            "main",
            "()I",
            &[],
        )
        .unwrap_err();
        assert_eq!(err.kind(), &RuntimeErrorKind::CallDepthExceeded(16));
    }

    #[test]
    fn methods_without_code_cannot_run() {
        let mut main = ClassBuilder::new("Main");
        main.method_without_code("main", "()I");
        let err = run(&registry(&[&main]), "Main", "main", "()I").unwrap_err();
        assert!(matches!(err.kind(), RuntimeErrorKind::AttributeNotFound(_)));
        assert_eq!(err.location().unwrap().pc, 0);
    }
}
