/// Read-only lookup tables shared by every unit of a batch.
///
/// Holds the string table (variable, function and literal names) and the
/// object table used to name static instances.
#[derive(Debug, Clone, Default)]
pub struct BinaryModule {
    strings: Vec<String>,
    objects: Vec<String>,
}

impl BinaryModule {
    pub fn new(strings: Vec<String>, objects: Vec<String>) -> Self {
        Self { strings, objects }
    }

    pub fn string(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(String::as_str)
    }

    pub fn object(&self, index: u32) -> Option<&str> {
        self.objects.get(index as usize).map(String::as_str)
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    /// Name of an instance id as written in source.
    ///
    /// Negative ids are pseudo-instances; non-negative ids index the object
    /// table. An encoded instance field of 0 means "on the stack" and never
    /// reaches this lookup.
    pub fn instance_name(&self, id: i32) -> String {
        match id {
            -1 => "self".to_string(),
            -2 => "other".to_string(),
            -3 => "all".to_string(),
            -4 => "noone".to_string(),
            -5 => "global".to_string(),
            -6 => "builtin".to_string(),
            -7 => "local".to_string(),
            id if id >= 0 => match self.object(id as u32) {
                Some(name) => name.to_string(),
                None => format!("object_{}", id),
            },
            id => format!("instance_{}", -id),
        }
    }
}
