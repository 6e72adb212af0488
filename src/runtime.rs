//! JVM runtime module responsible for creating a new runtime
//! environment and running programs.
use std::path::Path;

use tracing::info;

use crate::config::ExecutionConfig;
use crate::error::{ClassNotFound, VmError};
use crate::interpreter::Interpreter;
use crate::jvm::JVMClassFile;
use crate::registry::ClassRegistry;
use crate::trace::{NoTrace, TraceHook};

type Result<T> = std::result::Result<T, VmError>;

/// Name and descriptor of the program entry point.
pub const MAIN: (&str, &str) = ("main", "([Ljava/lang/String;)V");

/// `Vm` owns the class registry of a running machine, the execution budgets
/// and the trace hook every invocation reports to.
///
/// Loading goes through `&mut self` and hands the interpreter a shared view
/// of the registry, so classes are only ever added between invocations.
#[derive(Debug)]
pub struct Vm<H: TraceHook = NoTrace> {
    registry: ClassRegistry,
    config: ExecutionConfig,
    hook: H,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_hook(NoTrace)
    }
}

impl<H: TraceHook> Vm<H> {
    pub fn with_hook(hook: H) -> Self {
        Self {
            registry: ClassRegistry::new(),
            config: ExecutionConfig::default(),
            hook,
        }
    }

    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> ExecutionConfig {
        self.config
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    pub fn hook(&self) -> &H {
        &self.hook
    }

    pub fn hook_mut(&mut self) -> &mut H {
        &mut self.hook
    }

    pub fn into_hook(self) -> H {
        self.hook
    }

    pub fn find_class(&self, name: &str) -> std::result::Result<&JVMClassFile, ClassNotFound> {
        self.registry.find(name)
    }

    /// Load and initialize the class file at `path`.
    pub fn load_from_path(&mut self, path: &Path) -> Result<&JVMClassFile> {
        self.registry.load_from_path(path, self.config, &mut self.hook)
    }

    /// Load and initialize a class from its bytes.
    pub fn load_class_bytes(&mut self, bytes: &[u8]) -> Result<&JVMClassFile> {
        self.registry.load_bytes(bytes, self.config, &mut self.hook)
    }

    /// Run the static method `class.name` with `args`.
    pub fn invoke_static(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
        args: &[i32],
    ) -> Result<i32> {
        let class_file = self.registry.find(class)?;
        let method = class_file.find_method(name, descriptor).ok_or_else(|| {
            VmError::MethodNotFound {
                class: class.to_owned(),
                name: name.to_owned(),
                descriptor: descriptor.to_owned(),
            }
        })?;
        let mut interpreter = Interpreter::new(&self.registry, self.config, &mut self.hook);
        let value = interpreter.run(class_file, method, args)?;
        info!(
            "{class}.{name}{descriptor} returned {value} after {} instructions",
            interpreter.executed()
        );
        Ok(value)
    }

    /// Load the class file at `path` and run its `main` method without
    /// arguments.
    pub fn execute(&mut self, path: &Path) -> Result<i32> {
        let name = self.load_from_path(path)?.name()?.to_owned();
        let (main, descriptor) = MAIN;
        self.invoke_static(&name, main, descriptor, &[])
    }
}
