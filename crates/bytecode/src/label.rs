use rustc_hash::FxHashMap;

/// Index of a label in a [`LabelTable`] (and in the AST's label arena,
/// which extends the table with synthetic labels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

/// A jump target bound to an instruction offset.
#[derive(Debug, Clone)]
pub struct Label {
    pub id: LabelId,
    pub offset: u32,
    pub name: String,
    /// Offsets of the branch instructions that target this label.
    pub callers: Vec<u32>,
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset
    }
}

impl Eq for Label {}

/// Canonical labels of one instruction stream, one per distinct target offset.
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    labels: Vec<Label>,
    by_offset: FxHashMap<u32, LabelId>,
}

impl LabelTable {
    /// Look up the label for `offset`, creating it on first use.
    pub fn get_or_create(&mut self, offset: u32) -> LabelId {
        if let Some(&id) = self.by_offset.get(&offset) {
            return id;
        }
        let id = LabelId(self.labels.len() as u32);
        self.labels.push(Label {
            id,
            offset,
            name: format!("L{}", offset),
            callers: Vec::new(),
        });
        self.by_offset.insert(offset, id);
        id
    }

    /// Record that the branch at `from` targets `offset`.
    pub fn add_caller(&mut self, offset: u32, from: u32) -> LabelId {
        let id = self.get_or_create(offset);
        self.labels[id.0 as usize].callers.push(from);
        id
    }

    pub fn get(&self, id: LabelId) -> &Label {
        &self.labels[id.0 as usize]
    }

    pub fn at_offset(&self, offset: u32) -> Option<LabelId> {
        self.by_offset.get(&offset).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
