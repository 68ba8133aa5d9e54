/// Output language of the printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    C,
    Lua,
}

impl Dialect {
    /// Line comment prefix.
    pub fn comment(self) -> &'static str {
        match self {
            Dialect::C => "//",
            Dialect::Lua => "--",
        }
    }

    /// Output file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Dialect::C => "gml",
            Dialect::Lua => "lua",
        }
    }
}

pub const DEFAULT_MAX_SWEEPS: usize = 256;

#[derive(Debug, Clone)]
pub struct DecompileOptions {
    pub dialect: Dialect,
    /// Record the tree after every pipeline stage.
    pub snapshots: bool,
    /// Upper bound on optimizer fixpoint sweeps.
    pub max_sweeps: usize,
}

impl Default for DecompileOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::C,
            snapshots: false,
            max_sweeps: DEFAULT_MAX_SWEEPS,
        }
    }
}

/// Pipeline stages at which a snapshot can be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// One raw node per instruction, labels in place.
    Raw,
    /// Raw nodes split into basic blocks.
    Blocks,
    /// After the counted-loop and switch idioms.
    Idioms,
    /// After stack simulation.
    Expressions,
    /// After the optimizer fixpoint, before loop recovery.
    Optimized,
    /// After loop recovery, before condition recovery.
    Loops,
    /// After condition recovery and flattening, before goto removal.
    Flattened,
    Final,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Raw,
        Stage::Blocks,
        Stage::Idioms,
        Stage::Expressions,
        Stage::Optimized,
        Stage::Loops,
        Stage::Flattened,
        Stage::Final,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Raw => "raw",
            Stage::Blocks => "blocks",
            Stage::Idioms => "idioms",
            Stage::Expressions => "expressions",
            Stage::Optimized => "optimized",
            Stage::Loops => "loops",
            Stage::Flattened => "flattened",
            Stage::Final => "final",
        }
    }
}
