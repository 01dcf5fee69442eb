//! Per-loop metadata exposed to templates as `loop`.

use super::Value;
use std::cell::Cell;
use std::rc::Rc;

/// Position of the running `for`/`while` iteration.
///
/// One context lives for the whole loop; the executor advances it before
/// each iteration. `parent` is the next-outer active loop, so a nested body
/// sees the outer loop's *current* position.
#[derive(Debug)]
pub struct LoopContext {
    index0: Cell<usize>,
    length: Option<usize>,
    parent: Option<Rc<LoopContext>>,
}

impl LoopContext {
    /// `length` is known for `for` loops and unknown for `while` loops.
    pub fn new(length: Option<usize>, parent: Option<Rc<LoopContext>>) -> Self {
        Self {
            index0: Cell::new(0),
            length,
            parent,
        }
    }

    pub fn set_index0(&self, index0: usize) {
        self.index0.set(index0);
    }

    pub fn index0(&self) -> usize {
        self.index0.get()
    }

    pub fn index(&self) -> usize {
        self.index0() + 1
    }

    /// Parity of the 1-based index.
    pub fn parity(&self) -> &'static str {
        if self.index() % 2 == 1 { "odd" } else { "even" }
    }

    pub fn parent(&self) -> Option<&Rc<LoopContext>> {
        self.parent.as_ref()
    }

    pub fn get_attr(&self, name: &str) -> Option<Value> {
        let value = match name {
            "index" => self.index().into(),
            "index0" => self.index0().into(),
            "parity" => self.parity().into(),
            "odd" => (self.index() % 2 == 1).into(),
            "even" => (self.index() % 2 == 0).into(),
            "first" => (self.index0() == 0).into(),
            "length" => self.length.into(),
            "last" => self.length.map(|len| self.index() == len).into(),
            "revindex" => self.length.map(|len| len - self.index0()).into(),
            "revindex0" => self.length.map(|len| len - self.index()).into(),
            "parent" => self.parent.clone().map_or(Value::None, Value::Loop),
            _ => return None,
        };
        Some(value)
    }
}
