//! Forkable unique-name generator
//!
//! Auxiliary definitions (match functions, lifted proof obligations)
//! need names that cannot collide with anything on the current
//! branch, including names minted by concurrently-progressing forked
//! branches. The scheme: every generator carries its own counter plus
//! the chain of ancestor counters frozen at each fork, and every minted
//! name encodes the full chain. A branch therefore mints inside a
//! numeric namespace no relative can reach, provided `fork` was called
//! at the fork point.
//!
//! Uniqueness is guaranteed only within one fork lineage. Two generators
//! constructed independently (never related by `fork`) may still
//! collide; callers owning such generators must namespace their
//! prefixes apart.

use quill_kernel::{Environment, Name};
use smallvec::SmallVec;

/// Mints collision-free auxiliary names for one branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameGenerator {
    prefix: Name,
    /// Own counter, at least 1
    idx: u64,
    /// Ancestor counters, newest first
    parent_idxs: SmallVec<[u64; 4]>,
}

impl NameGenerator {
    pub fn new(prefix: Name) -> Self {
        NameGenerator {
            prefix,
            idx: 1,
            parent_idxs: SmallVec::new(),
        }
    }

    pub fn prefix(&self) -> &Name {
        &self.prefix
    }

    pub fn idx(&self) -> u64 {
        self.idx
    }

    pub fn parent_idxs(&self) -> &[u64] {
        &self.parent_idxs
    }

    /// The candidate the generator would mint next:
    /// `prefix ++ infix ++ ancestors (oldest first) ++ idx`.
    pub fn curr_name(&self, infix: &str) -> Name {
        let mut name = self.prefix.clone();
        if !infix.is_empty() {
            name = name.str(infix);
        }
        for &p in self.parent_idxs.iter().rev() {
            name = name.num(p);
        }
        name.num(self.idx)
    }

    /// Advance past the current candidate.
    pub fn next(&mut self) {
        self.idx += 1;
    }

    /// Split off a generator for a new branch.
    ///
    /// The child starts at `idx = 1` under the parent's frozen counter;
    /// the parent advances so its later mints (and later forks) cannot
    /// land in the child's namespace. Must be called before spawning any
    /// concurrently-progressing branch that mints names.
    #[must_use]
    pub fn fork(&mut self) -> NameGenerator {
        let mut parent_idxs = self.parent_idxs.clone();
        parent_idxs.insert(0, self.idx);
        let child = NameGenerator {
            prefix: self.prefix.clone(),
            idx: 1,
            parent_idxs,
        };
        self.idx += 1;
        child
    }

    /// Mint a name unused on the current branch, in both its public and
    /// private forms, and adjust it for the environment's export mode.
    ///
    /// Terminates because the index space is unbounded and every retry
    /// advances it.
    pub fn mk_unique_name(&mut self, env: &Environment, infix: &str) -> Name {
        loop {
            let candidate = self.curr_name(infix);
            let private = env
                .private_scope()
                .map(|scope| candidate.privatized(scope));
            let taken = env.contains_on_branch(&candidate)
                || private
                    .as_ref()
                    .is_some_and(|p| env.contains_on_branch(p));
            if taken {
                self.idx += 1;
                continue;
            }
            self.idx += 1;
            return private.unwrap_or(candidate);
        }
    }
}

impl Default for NameGenerator {
    fn default() -> Self {
        NameGenerator::new(Name::anon().str("_aux"))
    }
}
