use quill_bytecode::label::{LabelId, LabelTable};
use rustc_hash::FxHashMap;

/// Names of every label in a unit: the decoded ones, then synthetic labels
/// minted by the rewrite and structuring passes.
///
/// Ids of decoded labels are the ids of the [`LabelTable`] they came from.
#[derive(Debug, Clone, Default)]
pub struct LabelArena {
    names: Vec<String>,
    counters: FxHashMap<&'static str, u32>,
}

impl LabelArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(table: &LabelTable) -> Self {
        Self {
            names: table.iter().map(|l| l.name.clone()).collect(),
            counters: FxHashMap::default(),
        }
    }

    /// Next sequence number for `prefix`.
    pub fn next_index(&mut self, prefix: &'static str) -> u32 {
        let counter = self.counters.entry(prefix).or_insert(0);
        let n = *counter;
        *counter += 1;
        n
    }

    /// Allocate a synthetic label named `{prefix}_{n}`.
    pub fn fresh(&mut self, prefix: &'static str) -> LabelId {
        let n = self.next_index(prefix);
        self.named(format!("{}_{}", prefix, n))
    }

    /// Allocate a label with an explicit name.
    pub fn named(&mut self, name: String) -> LabelId {
        let id = LabelId(self.names.len() as u32);
        self.names.push(name);
        id
    }

    pub fn name(&self, id: LabelId) -> &str {
        self.names
            .get(id.0 as usize)
            .map(String::as_str)
            .unwrap_or("<unknown>")
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
