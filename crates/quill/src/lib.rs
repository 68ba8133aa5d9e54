//! quill: a decompiler for GameMaker-style stack bytecode.
//!
//! [`decompile_unit`] runs one code unit through the whole pipeline and
//! always produces text: the decompiled source, or a best-effort rendering
//! of whatever was built before a fatal error.

use quill_ast::diag::{Diagnostics, Severity};
use quill_ast::error::DecompileError;
use quill_ast::label::LabelArena;
use quill_ast::node::Block;
use quill_ast::options::{DecompileOptions, Dialect, Stage};
use quill_ast::timing::{
    UnitTimings, PHASE_DECODE, PHASE_EMIT, PHASE_GOTOS, PHASE_LIFT, PHASE_OPTIMIZE,
    PHASE_STRUCTURE,
};
use quill_bytecode::error::DecodeError;
use quill_bytecode::module::BinaryModule;

pub use quill_ast::options;
pub use quill_ast::timing;
pub use quill_bytecode::module;

/// Everything produced for one unit.
#[derive(Debug)]
pub struct UnitOutput {
    pub name: String,
    pub text: String,
    pub diagnostics: Diagnostics,
    /// Tree dumps in pipeline order, when snapshots are enabled.
    pub snapshots: Vec<(Stage, String)>,
    pub timings: UnitTimings,
    /// The error that ended the unit early, if any. `text` then holds the
    /// best-effort output.
    pub error: Option<DecompileError>,
}

impl UnitOutput {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Decompile one code unit.
pub fn decompile_unit(
    name: &str,
    code: &[u8],
    module: &BinaryModule,
    options: &DecompileOptions,
) -> UnitOutput {
    let _span = tracing::debug_span!("unit", name).entered();
    let mut pipeline = Pipeline {
        module,
        options,
        labels: LabelArena::new(),
        diags: Diagnostics::new(name),
        snapshots: Vec::new(),
        timings: UnitTimings::new(name),
    };

    let (text, error) = match pipeline.run(code) {
        Ok(block) => {
            let labels = &pipeline.labels;
            let text = pipeline.timings.time(PHASE_EMIT, || {
                quill_emit::render(&block, labels, options.dialect)
            });
            (text, None)
        }
        Err(err) => {
            pipeline
                .diags
                .report(Severity::Fatal, err.to_string(), None);
            let text = best_effort(&err, code, module, &pipeline.labels, options.dialect);
            (text, Some(err))
        }
    };

    UnitOutput {
        name: name.to_string(),
        text,
        diagnostics: pipeline.diags,
        snapshots: pipeline.snapshots,
        timings: pipeline.timings,
        error,
    }
}

/// The instruction listing of one unit.
pub fn disassemble(code: &[u8], module: &BinaryModule) -> Result<String, DecodeError> {
    Ok(quill_bytecode::decode(code, module)?.disassemble(module))
}

/// Normalize Lua output with stylua, keeping the input when it does not parse.
pub fn format_lua(code: &str) -> String {
    let mut config = stylua_lib::Config::new();
    config.syntax = stylua_lib::LuaVersion::Lua53;
    config.indent_type = stylua_lib::IndentType::Spaces;
    config.indent_width = 4;
    config.column_width = 120;
    match stylua_lib::format_code(code, config, None, stylua_lib::OutputVerification::None) {
        Ok(formatted) => formatted,
        Err(err) => {
            tracing::debug!(%err, "lua output left unformatted");
            code.to_string()
        }
    }
}

struct Pipeline<'a> {
    module: &'a BinaryModule,
    options: &'a DecompileOptions,
    labels: LabelArena,
    diags: Diagnostics,
    snapshots: Vec<(Stage, String)>,
    timings: UnitTimings,
}

impl Pipeline<'_> {
    fn snapshot(&mut self, stage: Stage, dump: impl FnOnce(&LabelArena) -> String) {
        if self.options.snapshots {
            tracing::trace!(stage = stage.name(), "snapshot");
            let text = dump(&self.labels);
            self.snapshots.push((stage, text));
        }
    }

    fn run(&mut self, code: &[u8]) -> Result<Block, DecompileError> {
        let module = self.module;
        let max_sweeps = self.options.max_sweeps;

        let set = self
            .timings
            .time(PHASE_DECODE, || quill_bytecode::decode(code, module))?;
        self.labels = LabelArena::from_table(&set.labels);
        tracing::debug!(instructions = set.instructions.len(), "decoded");

        let nodes = self.timings.time(PHASE_LIFT, || quill_lift::lower(&set))?;
        self.snapshot(Stage::Raw, |labels| quill_emit::dump_nodes(&nodes, labels));

        let labels = &mut self.labels;
        let mut blocks = self
            .timings
            .time(PHASE_LIFT, || quill_lift::partition(nodes, labels))?;
        self.snapshot(Stage::Blocks, |labels| quill_emit::dump_blocks(&blocks, labels));

        let (labels, diags) = (&mut self.labels, &mut self.diags);
        self.timings.time(PHASE_OPTIMIZE, || {
            quill_optimize::optimize_raw(&mut blocks, labels, diags, max_sweeps)
        })?;
        self.snapshot(Stage::Idioms, |labels| quill_emit::dump_blocks(&blocks, labels));

        let labels = &self.labels;
        let mut blocks = self
            .timings
            .time(PHASE_LIFT, || quill_lift::simulate(blocks, module, labels))?;
        self.snapshot(Stage::Expressions, |labels| {
            quill_emit::dump_blocks(&blocks, labels)
        });

        let (labels, diags) = (&mut self.labels, &mut self.diags);
        let sweeps = self.timings.time(PHASE_OPTIMIZE, || {
            quill_optimize::optimize(&mut blocks, labels, diags, max_sweeps)
        })?;
        tracing::debug!(sweeps, blocks = blocks.len(), "optimized");
        self.snapshot(Stage::Optimized, |labels| {
            quill_emit::dump_blocks(&blocks, labels)
        });

        let mut block = quill_structure::into_block(blocks);
        let (labels, diags) = (&mut self.labels, &mut self.diags);
        self.timings.time(PHASE_STRUCTURE, || {
            quill_structure::find_loops(&mut block, labels, diags)
        })?;
        self.snapshot(Stage::Loops, |labels| quill_emit::dump(&block, labels));

        let (labels, diags) = (&mut self.labels, &mut self.diags);
        let mut block = self.timings.time(PHASE_STRUCTURE, || {
            quill_structure::find_conditions(&mut block, labels, diags)?;
            quill_structure::flatten(block)
        })?;
        self.snapshot(Stage::Flattened, |labels| quill_emit::dump(&block, labels));

        self.timings
            .time(PHASE_GOTOS, || quill_structure::simplify(&mut block));
        self.snapshot(Stage::Final, |labels| quill_emit::dump(&block, labels));
        tracing::debug!("structured");
        Ok(block)
    }
}

/// An error banner, then the statements built before the failure, or the
/// disassembly when there are none.
fn best_effort(
    err: &DecompileError,
    code: &[u8],
    module: &BinaryModule,
    labels: &LabelArena,
    dialect: Dialect,
) -> String {
    let comment = dialect.comment();
    let mut out = format!("{} decompilation failed: {}\n", comment, err);
    if let Some(partial) = err.partial() {
        let block = Block::new(None, partial.to_vec());
        out.push_str(&quill_emit::render(&block, labels, dialect));
    } else if let Ok(listing) = disassemble(code, module) {
        for line in listing.lines() {
            out.push_str(comment);
            out.push(' ');
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quill_bytecode::asm::Assembler;
    use quill_bytecode::opcode::OpCode;

    fn module(strings: &[&str]) -> BinaryModule {
        BinaryModule::new(strings.iter().map(|s| s.to_string()).collect(), vec![])
    }

    fn run(code: &[u8], strings: &[&str], options: &DecompileOptions) -> UnitOutput {
        decompile_unit("test", code, &module(strings), options)
    }

    #[test]
    fn test_simple_if() {
        let code = Assembler::new()
            .push_int(1)
            .push_int(2)
            .binary(OpCode::Seq)
            .branch(OpCode::Bt, "yes")
            .push_string(0)
            .branch(OpCode::B, "end")
            .label("yes")
            .push_string(1)
            .label("end")
            .op(OpCode::Popz)
            .op(OpCode::Exit)
            .finish();
        let out = run(&code, &["no", "yes"], &DecompileOptions::default());
        assert!(!out.failed());
        assert_eq!(
            out.text,
            "if (1 == 2) {\n    push(\"yes\");\n} else {\n    push(\"no\");\n}\nstack_0;\n"
        );
    }

    #[test]
    fn test_counted_loop() {
        let code = Assembler::new()
            .push_int(3)
            .dup(0)
            .push_int(0)
            .binary(OpCode::Sle)
            .branch(OpCode::Bt, "exit")
            .label("body")
            .push_int(1)
            .pop_var(-1, 0, false)
            .push_int(1)
            .binary(OpCode::Sub)
            .dup(0)
            .branch(OpCode::Bt, "body")
            .label("exit")
            .op(OpCode::Popz)
            .op(OpCode::Exit)
            .finish();
        let out = run(&code, &["a"], &DecompileOptions::default());
        assert!(out.text.starts_with("repeat_0 = 3;\nwhile (repeat_0 > 0) {\n    a = 1;\n"));
        assert!(!out.text.contains("goto"));
        assert!(!out.text.contains("push("));
    }

    #[test]
    fn test_unmatched_pushenv_keeps_partial_output() {
        let code = Assembler::new()
            .push_short(-2)
            .branch(OpCode::PushEnv, "end")
            .push_int(1)
            .pop_var(-1, 0, false)
            .label("end")
            .op(OpCode::Exit)
            .finish();
        let out = run(&code, &["x"], &DecompileOptions::default());
        assert!(matches!(
            out.error,
            Some(DecompileError::UnbalancedEnvironment { open: 1, .. })
        ));
        assert!(out
            .text
            .starts_with("// decompilation failed: unbalanced environment"));
        assert!(out.text.contains("x = 1;"));
        assert_eq!(out.diagnostics.count(Severity::Fatal), 1);
    }

    #[test]
    fn test_ternary_with_variable_arms_stays_a_condition() {
        // x = c ? a : b
        let code = Assembler::new()
            .push_var(-1, 0, false)
            .branch(OpCode::Bf, "else")
            .push_var(-1, 1, false)
            .branch(OpCode::B, "end")
            .label("else")
            .push_var(-1, 2, false)
            .label("end")
            .pop_var(-1, 3, false)
            .op(OpCode::Exit)
            .finish();
        let out = run(&code, &["c", "a", "b", "x"], &DecompileOptions::default());
        assert!(!out.failed());
        assert!(out.text.contains("if ("));
        assert!(out.text.contains("push(a);"));
        assert!(out.text.contains("push(b);"));
        assert!(out.text.ends_with("x = stack_0;\n"));
    }

    #[test]
    fn test_switch_in_both_dialects() {
        let code = Assembler::new()
            .push_var(-1, 0, false)
            .dup(0)
            .push_int(2)
            .binary(OpCode::Seq)
            .branch(OpCode::Bt, "two")
            .dup(0)
            .push_int(1)
            .binary(OpCode::Seq)
            .branch(OpCode::Bt, "one")
            .branch(OpCode::B, "default")
            .label("two")
            .push_int(2)
            .pop_var(-1, 1, false)
            .branch(OpCode::B, "end")
            .label("one")
            .push_int(1)
            .pop_var(-1, 1, false)
            .branch(OpCode::B, "end")
            .label("default")
            .push_int(0)
            .pop_var(-1, 1, false)
            .label("end")
            .op(OpCode::Popz)
            .op(OpCode::Exit)
            .finish();
        let c = run(&code, &["x", "y"], &DecompileOptions::default());
        assert_eq!(
            c.text,
            "switch (x) {\n    case 1:\n        y = 1;\n        break;\n    \
             case 2:\n        y = 2;\n        break;\n    \
             default:\n        y = 0;\n        break;\n}\n"
        );

        let lua = DecompileOptions {
            dialect: Dialect::Lua,
            ..DecompileOptions::default()
        };
        let out = run(&code, &["x", "y"], &lua);
        assert!(out.text.starts_with("repeat\n    local switch_value = x\n"));
        assert!(out.text.contains("elseif switch_value == 2 then"));
        assert!(out.text.ends_with("until true\n"));
    }

    #[test]
    fn test_carried_value_pushed_before_branch() {
        // switch (x) { case z: y = 2; break; default: y = 0 }
        let code = Assembler::new()
            .push_var(-1, 0, false)
            .dup(0)
            .push_var(-1, 2, false)
            .binary(OpCode::Seq)
            .branch(OpCode::Bt, "two")
            .branch(OpCode::B, "default")
            .label("two")
            .push_int(2)
            .pop_var(-1, 1, false)
            .branch(OpCode::B, "end")
            .label("default")
            .push_int(0)
            .pop_var(-1, 1, false)
            .label("end")
            .op(OpCode::Popz)
            .op(OpCode::Exit)
            .finish();
        let out = run(&code, &["x", "y", "z"], &DecompileOptions::default());
        assert!(!out.failed());
        assert!(!out.text.contains("goto"), "{}", out.text);
        assert_eq!(
            out.text,
            "push(x);\nif (x == z) {\n    y = 2;\n    push(stack_0);\n} else {\n    \
             y = 0;\n    push(stack_0);\n}\nstack_0;\n"
        );
    }

    #[test]
    fn test_fixpoint_overrun_is_reported() {
        let code = Assembler::new().push_int(1).op(OpCode::Popz).op(OpCode::Exit).finish();
        let options = DecompileOptions {
            max_sweeps: 0,
            ..DecompileOptions::default()
        };
        let out = run(&code, &[], &options);
        assert!(matches!(
            out.error,
            Some(DecompileError::FixpointExceeded { sweeps: 0 })
        ));
        // no partial statements: the banner is followed by the listing
        let mut lines = out.text.lines();
        assert_eq!(
            lines.next(),
            Some("// decompilation failed: optimizer did not settle after 0 sweeps")
        );
        assert!(lines.all(|l| l.starts_with("// ")));
    }

    #[test]
    fn test_snapshots_cover_every_stage() {
        let code = Assembler::new()
            .push_int(1)
            .pop_var(-1, 0, false)
            .op(OpCode::Exit)
            .finish();
        let options = DecompileOptions {
            snapshots: true,
            ..DecompileOptions::default()
        };
        let out = run(&code, &["a"], &options);
        let stages: Vec<Stage> = out.snapshots.iter().map(|(s, _)| *s).collect();
        assert_eq!(stages, Stage::ALL.to_vec());
        assert!(out.snapshots[0].1.contains("raw"));
        assert_eq!(out.text, "a = 1;\n");
        assert!(out.timings.phases.iter().any(|(p, _)| *p == PHASE_EMIT));
    }

    #[test]
    fn test_format_lua_falls_back_on_bad_input() {
        assert_eq!(format_lua("if then"), "if then");
        assert_eq!(format_lua("x   =  1\n"), "x = 1\n");
    }
}
