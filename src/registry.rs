use std::collections::HashSet;

/// Host-side catalog of object types that can be committed
pub trait ObjectRegistry {
    fn is_valid_type(&self, object_type: &str) -> bool;
}

impl<F> ObjectRegistry for F
where
    F: Fn(&str) -> bool,
{
    fn is_valid_type(&self, object_type: &str) -> bool {
        self(object_type)
    }
}

/// Fixed set of type names
#[derive(Debug, Clone, Default)]
pub struct StaticObjectRegistry {
    types: HashSet<String>,
}

impl StaticObjectRegistry {
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: types.into_iter().map(Into::into).collect(),
        }
    }

    pub fn register(&mut self, object_type: impl Into<String>) {
        self.types.insert(object_type.into());
    }
}

impl ObjectRegistry for StaticObjectRegistry {
    fn is_valid_type(&self, object_type: &str) -> bool {
        self.types.contains(object_type)
    }
}
