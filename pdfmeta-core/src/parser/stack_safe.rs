//! Stack-safe traversal utilities
//!
//! Depth limits and cycle detection for walks over the object graph (reference
//! chains, the page tree) where a malicious file could otherwise recurse forever.

use super::objects::ObjectId;
use super::{ParseError, ParseResult};
use std::collections::HashSet;

/// Maximum array/dictionary nesting accepted by the object parser
pub const MAX_NESTING_DEPTH: usize = 64;

/// Maximum length of reference chains and depth of page-tree walks
pub const MAX_REFERENCE_DEPTH: usize = 32;

/// Traversal context carried through a graph walk
#[derive(Debug)]
pub struct StackSafeContext {
    /// Current depth
    pub depth: usize,
    /// Maximum allowed depth
    pub max_depth: usize,
    /// Objects on the current path
    pub visited_refs: HashSet<ObjectId>,
}

impl Default for StackSafeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl StackSafeContext {
    pub fn new() -> Self {
        Self::with_limit(MAX_REFERENCE_DEPTH)
    }

    pub fn with_limit(max_depth: usize) -> Self {
        Self {
            depth: 0,
            max_depth,
            visited_refs: HashSet::new(),
        }
    }

    /// Descend one level.
    pub fn enter(&mut self) -> ParseResult<()> {
        if self.depth + 1 > self.max_depth {
            return Err(ParseError::StructureTooDeep {
                position: 0,
                limit: self.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    pub fn exit(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Mark a reference as being on the current path; fails if it already is.
    pub fn visit_ref(&mut self, id: ObjectId) -> ParseResult<()> {
        if !self.visited_refs.insert(id) {
            return Err(ParseError::CircularReference(id.0, id.1));
        }
        Ok(())
    }

    pub fn unvisit_ref(&mut self, id: ObjectId) {
        self.visited_refs.remove(&id);
    }

    pub fn is_visited(&self, id: ObjectId) -> bool {
        self.visited_refs.contains(&id)
    }
}
