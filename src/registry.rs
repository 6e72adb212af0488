//! Name keyed store of loaded classes.
//!
//! The registry is the only state shared between invocations. Registering
//! requires `&mut ClassRegistry` while the interpreter only ever holds a
//! shared reference, so there is a single writer for the machine's lifetime
//! and no class is visible before it has been fully decoded.
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use crate::config::ExecutionConfig;
use crate::error::{ClassNotFound, VmError};
use crate::interpreter::Interpreter;
use crate::jvm::{read_class_file, JVMClassFile, JVMParser};
use crate::trace::TraceHook;

/// Name and descriptor of static initializers.
pub const CLINIT: (&str, &str) = ("<clinit>", "()V");

#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: HashMap<String, JVMClassFile>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Names of the loaded classes, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    /// Returns the class registered under `name`. There is no discovery,
    /// a class must have been loaded before.
    pub fn find(&self, name: &str) -> Result<&JVMClassFile, ClassNotFound> {
        self.classes
            .get(name)
            .ok_or_else(|| ClassNotFound(name.to_owned()))
    }

    /// Insert `class` under the name of its this-class entry unless a class
    /// with that name is already present.
    pub fn register(&mut self, class: JVMClassFile) -> Result<&JVMClassFile, VmError> {
        let name = class.name()?.to_owned();
        match self.classes.entry(name) {
            Entry::Occupied(entry) => Err(VmError::ClassAlreadyLoaded(entry.key().clone())),
            Entry::Vacant(entry) => {
                info!("registered class {}", entry.key());
                Ok(entry.insert(class))
            }
        }
    }

    /// Decode the class file at `path`, register it and run its static
    /// initializer.
    pub fn load_from_path(
        &mut self,
        path: &Path,
        config: ExecutionConfig,
        hook: &mut dyn TraceHook,
    ) -> Result<&JVMClassFile, VmError> {
        let bytes = read_class_file(path).map_err(|source| VmError::Io {
            path: path.to_owned(),
            source,
        })?;
        debug!("read {} bytes from {}", bytes.len(), path.display());
        self.load_bytes(&bytes, config, hook)
    }

    /// In-memory counterpart of `load_from_path`.
    pub fn load_bytes(
        &mut self,
        bytes: &[u8],
        config: ExecutionConfig,
        hook: &mut dyn TraceHook,
    ) -> Result<&JVMClassFile, VmError> {
        let class = JVMParser::parse(bytes)?;
        let name = self.register(class)?.name()?.to_owned();

        let registry: &Self = self;
        let class = registry.find(&name)?;
        let (clinit_name, clinit_descriptor) = CLINIT;
        if let Some(clinit) = class.find_method(clinit_name, clinit_descriptor) {
            debug!("running static initializer of {name}");
            Interpreter::new(registry, config, hook).run(class, clinit, &[])?;
        }
        Ok(class)
    }
}
