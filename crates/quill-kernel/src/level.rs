//! Universe levels
//!
//! ```text
//! Level ::= zero | succ l | max l r | imax l r | param n
//! ```
//!
//! Constructors simplify eagerly: `imax l 0 = 0`, `imax l (succ r) =
//! max l (succ r)`, `max 0 l = l`, and so on. The session core memoizes
//! `instantiate` results per constant, so instantiation must be a pure
//! function of the level and the substitution.

use crate::name::Name;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A universe level in simplified form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    Zero,
    Succ(Arc<Level>),
    Max(Arc<Level>, Arc<Level>),
    IMax(Arc<Level>, Arc<Level>),
    Param(Name),
}

impl Level {
    pub fn zero() -> Level {
        Level::Zero
    }

    pub fn succ(l: Level) -> Level {
        Level::Succ(Arc::new(l))
    }

    pub fn param(n: Name) -> Level {
        Level::Param(n)
    }

    /// `max`, simplified: identity on zero and on equal arguments.
    pub fn max(l: Level, r: Level) -> Level {
        match (&l, &r) {
            (Level::Zero, _) => r,
            (_, Level::Zero) => l,
            _ if l == r => l,
            _ => Level::Max(Arc::new(l), Arc::new(r)),
        }
    }

    /// `imax`, simplified: `imax l 0 = 0` (Prop elimination) and
    /// `imax l (succ r) = max l (succ r)` since the right side is positive.
    pub fn imax(l: Level, r: Level) -> Level {
        match &r {
            Level::Zero => Level::Zero,
            Level::Succ(_) => Level::max(l, r),
            _ if l == r => l,
            _ => Level::IMax(Arc::new(l), Arc::new(r)),
        }
    }

    /// Literal level `n`.
    pub fn of_nat(n: u64) -> Level {
        let mut level = Level::Zero;
        for _ in 0..n {
            level = Level::succ(level);
        }
        level
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Level::Zero)
    }

    /// Split into base level and number of leading `succ`s.
    pub fn to_offset(&self) -> (&Level, u64) {
        let mut level = self;
        let mut offset = 0;
        while let Level::Succ(inner) = level {
            offset += 1;
            level = inner;
        }
        (level, offset)
    }

    /// Substitute parameter names, re-simplifying along the way.
    ///
    /// Parameters missing from the substitution are left in place.
    pub fn instantiate(&self, subst: &[(Name, Level)]) -> Level {
        match self {
            Level::Zero => Level::Zero,
            Level::Succ(l) => Level::succ(l.instantiate(subst)),
            Level::Max(l, r) => Level::max(l.instantiate(subst), r.instantiate(subst)),
            Level::IMax(l, r) => Level::imax(l.instantiate(subst), r.instantiate(subst)),
            Level::Param(n) => subst
                .iter()
                .find(|(p, _)| p == n)
                .map(|(_, l)| l.clone())
                .unwrap_or_else(|| self.clone()),
        }
    }

    /// Collect the parameter names occurring in the level.
    pub fn collect_params(&self, out: &mut Vec<Name>) {
        match self {
            Level::Zero => {}
            Level::Succ(l) => l.collect_params(out),
            Level::Max(l, r) | Level::IMax(l, r) => {
                l.collect_params(out);
                r.collect_params(out);
            }
            Level::Param(n) => {
                if !out.contains(n) {
                    out.push(n.clone());
                }
            }
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (base, offset) = self.to_offset();
        match base {
            Level::Zero => write!(f, "{offset}"),
            _ if offset > 0 => write!(f, "({base}+{offset})"),
            Level::Max(l, r) => write!(f, "(max {l} {r})"),
            Level::IMax(l, r) => write!(f, "(imax {l} {r})"),
            Level::Param(n) => write!(f, "{n}"),
            _ => unreachable!("to_offset strips all succ constructors"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Level {
        Level::param(Name::from(s))
    }

    #[test]
    fn test_max_zero_identities() {
        assert_eq!(Level::max(Level::zero(), p("u")), p("u"));
        assert_eq!(Level::max(p("u"), Level::zero()), p("u"));
        assert_eq!(Level::max(p("u"), p("u")), p("u"));
    }

    #[test]
    fn test_imax_zero_right_is_zero() {
        assert!(Level::imax(p("u"), Level::zero()).is_zero());
    }

    #[test]
    fn test_imax_succ_becomes_max() {
        let one = Level::of_nat(1);
        let level = Level::imax(p("u"), one.clone());
        assert_eq!(level, Level::max(p("u"), one));
        assert!(!matches!(level, Level::IMax(_, _)));
    }

    #[test]
    fn test_instantiate_param() {
        let level = Level::imax(p("u"), p("v"));
        // v := 0 collapses the whole imax
        let inst = level.instantiate(&[(Name::from("v"), Level::zero())]);
        assert!(inst.is_zero());
        // v := 1 turns it into a max
        let inst = level.instantiate(&[(Name::from("v"), Level::of_nat(1))]);
        assert_eq!(inst, Level::max(p("u"), Level::of_nat(1)));
    }

    #[test]
    fn test_instantiate_missing_param_is_noop() {
        let level = p("u");
        assert_eq!(level.instantiate(&[(Name::from("v"), Level::zero())]), level);
    }

    #[test]
    fn test_display_collapses_succ_chains() {
        assert_eq!(Level::of_nat(3).to_string(), "3");
        assert_eq!(Level::succ(p("u")).to_string(), "(u+1)");
        assert_eq!(Level::max(p("u"), p("v")).to_string(), "(max u v)");
    }

    #[test]
    fn test_collect_params_dedups() {
        let level = Level::max(p("u"), Level::imax(p("v"), p("u")));
        let mut params = Vec::new();
        level.collect_params(&mut params);
        assert_eq!(params, vec![Name::from("u"), Name::from("v")]);
    }

    mod proptest_levels {
        use super::*;
        use proptest::prelude::*;

        fn level_strategy(depth: u32) -> BoxedStrategy<Level> {
            if depth == 0 {
                prop_oneof![
                    Just(Level::zero()),
                    "[a-c]".prop_map(|s| Level::param(Name::from(s.as_str()))),
                ]
                .boxed()
            } else {
                prop_oneof![
                    Just(Level::zero()),
                    "[a-c]".prop_map(|s| Level::param(Name::from(s.as_str()))),
                    level_strategy(depth - 1).prop_map(Level::succ),
                    (level_strategy(depth - 1), level_strategy(depth - 1))
                        .prop_map(|(l, r)| Level::max(l, r)),
                    (level_strategy(depth - 1), level_strategy(depth - 1))
                        .prop_map(|(l, r)| Level::imax(l, r)),
                ]
                .boxed()
            }
        }

        proptest! {
            /// Smart constructors never leave an `imax _ 0` or `imax _ (succ _)` behind.
            #[test]
            fn prop_imax_simplified(l in level_strategy(3)) {
                fn check(l: &Level) -> bool {
                    match l {
                        Level::IMax(_, r) => {
                            !matches!(**r, Level::Zero | Level::Succ(_)) && check(r)
                        }
                        Level::Succ(l) => check(l),
                        Level::Max(l, r) => check(l) && check(r),
                        _ => true,
                    }
                }
                prop_assert!(check(&l));
            }

            /// Instantiating with an empty substitution is the identity.
            #[test]
            fn prop_empty_instantiate_identity(l in level_strategy(3)) {
                prop_assert_eq!(l.instantiate(&[]), l);
            }
        }
    }
}
