//! Code generation backends
//!
//! The dependency engine is backend-agnostic: it hands each reachable method
//! to a [`CompilationBackend`] and stores whatever body comes back. The
//! native backend delegates to a pluggable machine-code compiler and object
//! emitter; the portable backend lowers bodies to compilable C-like source
//! for targets without a native code generator.

use std::io::Write as _;
use std::path::Path;

use kiln_types::{IlOp, MethodId, PrimitiveKind, ResolutionError, TypeId, Universe, WellKnownType};

use crate::error::CompilationError;
use crate::rooting::RootingService;

/// Why a single method failed to compile.
#[derive(Debug, thiserror::Error)]
pub enum MethodCompileError {
    /// The body references an entity that does not resolve. Recoverable:
    /// the method is replaced by a throwing stub and compilation continues.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    /// The code generator itself failed. Not recoverable.
    #[error("{0}")]
    Internal(String),
}

/// Backend-specific compiled form of one method.
#[derive(Debug, Clone)]
pub enum MethodBodyContent {
    /// Machine code bytes.
    Native {
        /// Encoded instructions
        code: Vec<u8>,
    },
    /// Portable source text for one function.
    PortableSource {
        /// Function definition text
        text: String,
    },
}

/// A compiled method body plus its unwind/GC side tables.
#[derive(Debug, Clone)]
pub struct CompiledMethodBody {
    /// The code itself
    pub content: MethodBodyContent,
    /// GC reporting info, empty when the body keeps no live references
    pub gc_info: Vec<u8>,
    /// Exception handling clauses
    pub eh_info: Vec<u8>,
    /// Set when the body is a substitution stub that throws at run time
    pub throws: Option<ResolutionError>,
}

impl CompiledMethodBody {
    /// Byte length of the compiled content.
    pub fn len(&self) -> usize {
        match &self.content {
            MethodBodyContent::Native { code } => code.len(),
            MethodBodyContent::PortableSource { text } => text.len(),
        }
    }

    /// Whether the body is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Turns one method body into target code.
pub trait MethodCompiler: Sync {
    /// Compile `method`. Resolution failures in the body surface as
    /// [`MethodCompileError::Resolution`].
    fn compile(
        &self,
        universe: &Universe,
        method: MethodId,
    ) -> Result<CompiledMethodBody, MethodCompileError>;
}

/// Writes the final object file from compiled bodies.
pub trait ObjectEmitter: Sync {
    /// Write the object to `path`.
    fn emit(
        &self,
        universe: &Universe,
        bodies: &[(MethodId, CompiledMethodBody)],
        path: &Path,
    ) -> Result<(), CompilationError>;
}

/// The backend seam the engine drives.
pub trait CompilationBackend: Sync {
    /// Roots the backend itself requires before expansion starts.
    fn pre_root(&self, _rooting: &mut RootingService<'_>) -> Result<(), CompilationError> {
        Ok(())
    }

    /// Compile one method body.
    fn compile_method(
        &self,
        universe: &Universe,
        method: MethodId,
    ) -> Result<CompiledMethodBody, MethodCompileError>;

    /// Body that unconditionally throws the resolution failure when entered.
    /// The method keeps its node and its symbol; only the semantics change.
    fn throwing_stub(&self, universe: &Universe, error: ResolutionError) -> CompiledMethodBody;

    /// Write the final output to `path`.
    fn write_output(
        &self,
        universe: &Universe,
        bodies: &[(MethodId, CompiledMethodBody)],
        path: &Path,
    ) -> Result<(), CompilationError>;
}

/// Backend producing machine code through pluggable compiler and emitter
/// collaborators.
pub struct NativeBackend {
    method_compiler: Box<dyn MethodCompiler>,
    object_emitter: Box<dyn ObjectEmitter>,
}

impl NativeBackend {
    /// Backend over the given collaborators.
    pub fn new(
        method_compiler: Box<dyn MethodCompiler>,
        object_emitter: Box<dyn ObjectEmitter>,
    ) -> Self {
        Self {
            method_compiler,
            object_emitter,
        }
    }
}

impl CompilationBackend for NativeBackend {
    fn compile_method(
        &self,
        universe: &Universe,
        method: MethodId,
    ) -> Result<CompiledMethodBody, MethodCompileError> {
        self.method_compiler.compile(universe, method)
    }

    fn throwing_stub(&self, _universe: &Universe, error: ResolutionError) -> CompiledMethodBody {
        CompiledMethodBody {
            // int3; the runtime's type-load throw helper is patched over
            // this at link time via the extern symbol dependency.
            content: MethodBodyContent::Native { code: vec![0xCC] },
            gc_info: Vec::new(),
            eh_info: Vec::new(),
            throws: Some(error),
        }
    }

    fn write_output(
        &self,
        universe: &Universe,
        bodies: &[(MethodId, CompiledMethodBody)],
        path: &Path,
    ) -> Result<(), CompilationError> {
        self.object_emitter.emit(universe, bodies, path)
    }
}

/// Backend lowering method bodies to a single C-like source file. Every
/// primitive type is pre-rooted because the emitted prelude references all
/// of their type records unconditionally.
#[derive(Debug, Default)]
pub struct PortableSourceBackend;

impl PortableSourceBackend {
    fn function_name(universe: &Universe, method: MethodId) -> String {
        crate::emit::mangling::sanitize(&universe.method_display(method))
    }

    fn lower_op(universe: &Universe, op: &IlOp, out: &mut String) {
        match op {
            IlOp::Call(m) | IlOp::CallVirt(m) => {
                out.push_str(&format!(
                    "    {}();\n",
                    Self::function_name(universe, *m)
                ));
            }
            IlOp::NewObject(ctor) => {
                let owner = universe.method_owner(*ctor);
                out.push_str(&format!(
                    "    __allocate(&__type_{});\n    {}();\n",
                    crate::emit::mangling::sanitize(&universe.type_display(owner)),
                    Self::function_name(universe, *ctor)
                ));
            }
            IlOp::NewArray(element) => {
                out.push_str(&format!(
                    "    __allocate_array(&__type_{});\n",
                    crate::emit::mangling::sanitize(&universe.type_display(*element))
                ));
            }
            IlOp::LoadField(f) | IlOp::StoreField(f) => {
                let def = universe.field_def(*f);
                out.push_str(&format!("    /* field {} */\n", def.name));
            }
            IlOp::LoadStaticField(f) | IlOp::StoreStaticField(f) => {
                let def = universe.field_def(*f);
                out.push_str(&format!(
                    "    __statics_{}.{};\n",
                    crate::emit::mangling::sanitize(&universe.type_display(def.owner)),
                    crate::emit::mangling::sanitize(&def.name)
                ));
            }
            IlOp::LoadTypeToken(ty) => {
                out.push_str(&format!(
                    "    &__type_{};\n",
                    crate::emit::mangling::sanitize(&universe.type_display(*ty))
                ));
            }
            IlOp::Throw => out.push_str("    __throw();\n"),
            IlOp::Return => out.push_str("    return;\n"),
        }
    }

    fn primitive_types(universe: &Universe) -> Result<Vec<TypeId>, CompilationError> {
        PrimitiveKind::ALL
            .iter()
            .map(|p| {
                universe
                    .well_known(WellKnownType::Primitive(*p))
                    .map_err(CompilationError::from)
            })
            .collect()
    }
}

impl CompilationBackend for PortableSourceBackend {
    fn pre_root(&self, rooting: &mut RootingService<'_>) -> Result<(), CompilationError> {
        // The prelude emits every primitive's type record whether or not the
        // program mentions it.
        let primitives = Self::primitive_types(rooting.universe())?;
        for ty in primitives {
            rooting.add_compilation_root_type(ty, "portable prelude")?;
        }
        Ok(())
    }

    fn compile_method(
        &self,
        universe: &Universe,
        method: MethodId,
    ) -> Result<CompiledMethodBody, MethodCompileError> {
        let mut text = format!("void {}(void) {{\n", Self::function_name(universe, method));
        if let Some(body) = universe.method_body(method) {
            for op in &body.ops {
                Self::lower_op(universe, op, &mut text);
            }
        }
        text.push_str("}\n");
        Ok(CompiledMethodBody {
            content: MethodBodyContent::PortableSource { text },
            gc_info: Vec::new(),
            eh_info: Vec::new(),
            throws: None,
        })
    }

    fn throwing_stub(&self, _universe: &Universe, error: ResolutionError) -> CompiledMethodBody {
        let text = format!(
            "void __throw_stub(void) {{\n    __throw_type_load_exception(\"{}\");\n}}\n",
            error
        );
        CompiledMethodBody {
            content: MethodBodyContent::PortableSource { text },
            gc_info: Vec::new(),
            eh_info: Vec::new(),
            throws: Some(error),
        }
    }

    fn write_output(
        &self,
        universe: &Universe,
        bodies: &[(MethodId, CompiledMethodBody)],
        path: &Path,
    ) -> Result<(), CompilationError> {
        let mut file = std::fs::File::create(path)?;
        writeln!(file, "/* generated portable output */")?;
        writeln!(file, "#include \"runtime.h\"")?;
        writeln!(file)?;
        for (method, _) in bodies {
            writeln!(file, "void {}(void);", Self::function_name(universe, *method))?;
        }
        writeln!(file)?;
        for (_, body) in bodies {
            match &body.content {
                MethodBodyContent::PortableSource { text } => {
                    file.write_all(text.as_bytes())?;
                    writeln!(file)?;
                }
                MethodBodyContent::Native { .. } => {
                    return Err(CompilationError::InvalidConfiguration(
                        "native body handed to the portable writer".into(),
                    ))
                }
            }
        }
        Ok(())
    }
}
