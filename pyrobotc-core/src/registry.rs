//! Names remembered for the whole run.
//!
//! Class names decide whether an annotated assignment from a call is a
//! constructor invocation. Return types are kept for bookkeeping so later
//! stages know every declared signature up front.

use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct Registry {
    class_names: Vec<String>,
    return_types: HashMap<String, String>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn register_class(&mut self, name: &str) {
        if !self.is_class(name) {
            self.class_names.push(name.to_string());
        }
    }

    pub fn is_class(&self, name: &str) -> bool {
        self.class_names.iter().any(|known| known == name)
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Later definitions of the same name overwrite earlier ones.
    pub fn register_function(&mut self, name: &str, return_type: impl Into<String>) {
        self.return_types.insert(name.to_string(), return_type.into());
    }

    pub fn return_type(&self, name: &str) -> Option<&str> {
        self.return_types.get(name).map(String::as_str)
    }
}
