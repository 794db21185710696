//! Symbolic flag sets
//!
//! Hosts pass either one atom or a list of atoms where the native API wants
//! a bitmask (send/recv flags, poll events). Parsing fails on the first
//! unknown token without looking at the rest.

use crate::error::{BridgeError, BridgeResult};
use crate::term::Term;
use std::ops::BitOr;

/// Integer types usable as a flag mask
pub trait FlagBits: Copy + Default + PartialEq + BitOr<Output = Self> {
    fn intersects(self, other: Self) -> bool;
}

impl FlagBits for u16 {
    fn intersects(self, other: Self) -> bool {
        self & other != 0
    }
}

impl FlagBits for u32 {
    fn intersects(self, other: Self) -> bool {
        self & other != 0
    }
}

/// A declared name to bit table for one option family
#[derive(Debug)]
pub struct FlagTable<B: 'static> {
    family: &'static str,
    entries: &'static [(&'static str, B)],
}

impl<B: FlagBits> FlagTable<B> {
    pub const fn new(family: &'static str, entries: &'static [(&'static str, B)]) -> Self {
        Self { family, entries }
    }

    pub fn family(&self) -> &'static str {
        self.family
    }

    pub fn lookup(&self, name: &str) -> Option<B> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == name)
            .map(|(_, bit)| *bit)
    }

    /// Decode one atom or a list of atoms into a mask
    ///
    /// `position` is the argument index reported on failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use zbridge::tables::SEND_RECV_FLAGS;
    /// use zbridge::term::Term;
    ///
    /// let tokens = Term::list([Term::atom("sndmore"), Term::atom("dontwait")]);
    /// assert_eq!(SEND_RECV_FLAGS.parse(&tokens, 2).unwrap(), 3);
    /// assert_eq!(SEND_RECV_FLAGS.parse(&Term::atom("noblock"), 2).unwrap(), 1);
    /// ```
    pub fn parse(&self, tokens: &Term, position: usize) -> BridgeResult<B> {
        match tokens {
            Term::List(items) => items.iter().try_fold(B::default(), |mask, token| {
                Ok(mask | self.token(token, position)?)
            }),
            single => self.token(single, position),
        }
    }

    /// Decode already-split names
    pub fn parse_names<'n>(
        &self,
        names: impl IntoIterator<Item = &'n str>,
        position: usize,
    ) -> BridgeResult<B> {
        names.into_iter().try_fold(B::default(), |mask, name| {
            self.lookup(name)
                .map(|bit| mask | bit)
                .ok_or_else(|| self.invalid(position))
        })
    }

    /// Names of the bits set in `mask`, in table order
    pub fn names(&self, mask: B) -> Vec<&'static str> {
        let mut seen = B::default();
        let mut names = Vec::new();
        for (name, bit) in self.entries {
            // aliases share a bit
            if mask.intersects(*bit) && !seen.intersects(*bit) {
                names.push(*name);
                seen = seen | *bit;
            }
        }
        names
    }

    fn token(&self, token: &Term, position: usize) -> BridgeResult<B> {
        token
            .as_atom()
            .and_then(|name| self.lookup(name))
            .ok_or_else(|| self.invalid(position))
    }

    fn invalid(&self, position: usize) -> BridgeError {
        BridgeError::invalid_argument(position, format!("list of {}", self.family))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static COLOURS: FlagTable<u32> =
        FlagTable::new("colours", &[("red", 1), ("green", 2), ("blue", 4), ("crimson", 1)]);

    #[test]
    fn test_parse_empty_list_is_zero() {
        assert_eq!(COLOURS.parse(&Term::list([]), 0).unwrap(), 0);
    }

    #[test]
    fn test_parse_single_atom() {
        assert_eq!(COLOURS.parse(&Term::atom("blue"), 0).unwrap(), 4);
    }

    #[test]
    fn test_parse_list_ors_bits() {
        let tokens = Term::list([Term::atom("red"), Term::atom("blue"), Term::atom("crimson")]);
        assert_eq!(COLOURS.parse(&tokens, 0).unwrap(), 5);
    }

    #[test]
    fn test_parse_rejects_non_atom() {
        let err = COLOURS.parse(&Term::int(1), 3).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid argument at position 3: expected list of colours"
        );
    }

    #[test]
    fn test_unknown_token_mid_list_fails_whole_list() {
        let tokens = Term::list([
            Term::atom("sndmore"),
            Term::atom("bogus"),
            Term::atom("dontwait"),
        ]);
        let err = crate::tables::SEND_RECV_FLAGS.parse(&tokens, 2).unwrap_err();
        match err {
            BridgeError::InvalidArgument { position, expected } => {
                assert_eq!(position, 2);
                assert_eq!(expected, "list of send/recv options");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_non_atom_inside_list_is_rejected() {
        let tokens = Term::list([Term::atom("green"), Term::int(2)]);
        assert!(matches!(
            COLOURS.parse(&tokens, 1),
            Err(BridgeError::InvalidArgument { position: 1, .. })
        ));
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(COLOURS.parse_names(["green", "red"], 0).unwrap(), 3);
        assert!(COLOURS.parse_names(["green", "mauve"], 0).is_err());
    }

    #[test]
    fn test_names_skips_aliases() {
        assert_eq!(COLOURS.names(5), vec!["red", "blue"]);
        assert!(COLOURS.names(0).is_empty());
    }
}
