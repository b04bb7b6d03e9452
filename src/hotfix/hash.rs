//! Call-site token hashing.
//!
//! Every rewritten method calls the dispatch hook twice, each time with a 64-bit token that
//! identifies the call site. Tokens derive from the call-site identity
//! (`"<type id> <method signature>"`, the *main part*) followed by `head` or `tail`:
//!
//! ```text
//! "Game.Player Jump(System.Single) head"  ->  h
//! "Game.Player Jump(System.Single) tail"  -> -h
//! ```
//!
//! # Hash
//!
//! The base hash is FNV-1a over the UTF-16 code units of the main part, seeded with the
//! *critical index* (the position right after the first space, where the method signature
//! starts) and finished with the murmur3 avalanche step. The result lies in `1..=u32::MAX`.
//!
//! # Collisions
//!
//! If the base hash is taken by a different main part, the flag variants
//! `hash | (flag << 32)` for `flag` in `1..=3` are tried first, then `hash + 1, hash + 2, ..`
//! until a free value is found. Every resolved collision is recorded in the *designated*
//! table, which can be persisted and loaded back so later runs reproduce the same tokens
//! regardless of the order identities are seen in.
//!
//! # Examples
//!
//! ```rust
//! use dotpatch::hotfix::TokenHasher;
//!
//! let mut hasher = TokenHasher::new();
//! let head = hasher.token(Some("Game.Player Jump(System.Single) head"));
//! let tail = hasher.token(Some("Game.Player Jump(System.Single) tail"));
//! assert_eq!(head, -tail);
//! assert_eq!(hasher.token(None), 0);
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::Path,
};

use tracing::debug;

use crate::Result;

const FNV_OFFSET: u32 = 0x811C_9DC5;
const FNV_PRIME: u32 = 0x0100_0193;
const CRITICAL_SEED: u32 = 0x9E37_79B1;
const FLAG_VARIANTS: i64 = 3;

/// The persisted override table: main part to token.
pub type DesignatedTokens = BTreeMap<String, i64>;

fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85EB_CA6B);
    h ^= h >> 13;
    h = h.wrapping_mul(0xC2B2_AE35);
    h ^= h >> 16;
    h
}

/// Base hash of a main part, in `1..=u32::MAX`.
#[must_use]
pub fn base_hash(mainpart: &str) -> i64 {
    let units: Vec<u16> = mainpart.encode_utf16().collect();
    let critical = units
        .iter()
        .position(|unit| *unit == u16::from(b' '))
        .map_or(0, |index| index + 1);

    #[allow(clippy::cast_possible_truncation)]
    let mut hash = FNV_OFFSET ^ (critical as u32).wrapping_mul(CRITICAL_SEED);
    for (index, unit) in units.iter().enumerate() {
        let biased = if index >= critical {
            u32::from(*unit)
        } else {
            u32::from(*unit) << 8
        };
        hash ^= biased;
        hash = hash.wrapping_mul(FNV_PRIME);
    }

    match fmix32(hash) {
        0 => 1,
        value => i64::from(value),
    }
}

fn split_identity(identity: &str) -> (&str, bool) {
    if let Some(mainpart) = identity.strip_suffix(" tail") {
        (mainpart, true)
    } else if let Some(mainpart) = identity.strip_suffix(" head") {
        (mainpart, false)
    } else {
        (identity, false)
    }
}

/// Assigns stable, collision-free tokens to call-site identities.
#[derive(Debug, Default, Clone)]
pub struct TokenHasher {
    tokens: HashMap<String, i64>,
    owners: HashMap<i64, String>,
    designated: DesignatedTokens,
}

impl TokenHasher {
    /// Creates a hasher without designated tokens.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a hasher seeded with designated tokens.
    #[must_use]
    pub fn with_designated(designated: DesignatedTokens) -> Self {
        let mut hasher = Self::new();
        hasher.load_designated(Some(designated));
        hasher
    }

    /// Replaces the designated table.
    ///
    /// `None` forgets every assignment; `Some` forgets them and seeds the table.
    pub fn load_designated(&mut self, designated: Option<DesignatedTokens>) {
        self.tokens.clear();
        self.owners.clear();
        self.designated.clear();
        for (mainpart, token) in designated.into_iter().flatten() {
            self.tokens.insert(mainpart.clone(), token);
            self.owners.insert(token, mainpart.clone());
            self.designated.insert(mainpart, token);
        }
    }

    /// The designated table: every loaded entry plus every resolved collision.
    #[must_use]
    pub fn designated(&self) -> &DesignatedTokens {
        &self.designated
    }

    /// Number of main parts with an assigned token.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true if no token has been assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The main part a token was assigned to, looking through the sign of tail tokens.
    #[must_use]
    pub fn owner(&self, token: i64) -> Option<&str> {
        self.owners
            .get(&token)
            .or_else(|| token.checked_neg().and_then(|head| self.owners.get(&head)))
            .map(String::as_str)
    }

    /// Returns the token of an identity, assigning one on first sight.
    ///
    /// Identities ending in ` tail` receive the negated token of their main part.
    pub fn token(&mut self, identity: Option<&str>) -> i64 {
        let Some(identity) = identity else {
            return 0;
        };
        let (mainpart, tail) = split_identity(identity);
        let token = self.assign(mainpart);
        if tail {
            -token
        } else {
            token
        }
    }

    fn assign(&mut self, mainpart: &str) -> i64 {
        if let Some(token) = self.tokens.get(mainpart) {
            return *token;
        }

        let base = base_hash(mainpart);
        let free = |owners: &HashMap<i64, String>, candidate: i64| {
            owners.get(&candidate).map_or(true, |owner| owner == mainpart)
        };

        let mut token = base;
        if !free(&self.owners, token) {
            token = (1..=FLAG_VARIANTS)
                .map(|flag| base | (flag << 32))
                .find(|candidate| free(&self.owners, *candidate))
                .unwrap_or_else(|| {
                    let mut candidate = base;
                    while !free(&self.owners, candidate) {
                        candidate += 1;
                    }
                    candidate
                });
            debug!(identity = %mainpart, base, token, "token collision resolved");
            self.designated.insert(mainpart.to_string(), token);
        }

        self.tokens.insert(mainpart.to_string(), token);
        self.owners.insert(token, mainpart.to_string());
        token
    }

    /// Loads a designated table from a JSON object (`{ "<main part>": <token> }`).
    ///
    /// # Errors
    /// Returns [`crate::Error::Serialization`] for invalid JSON.
    pub fn load_json(&mut self, json: &str) -> Result<()> {
        let designated: DesignatedTokens = serde_json::from_str(json)?;
        self.load_designated(Some(designated));
        Ok(())
    }

    /// Serializes the designated table to JSON.
    ///
    /// # Errors
    /// Returns [`crate::Error::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.designated)?)
    }

    /// Loads the designated table from a file. A missing file clears the table.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file exists but cannot be read and
    /// [`crate::Error::Serialization`] for invalid JSON.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            self.load_designated(None);
            return Ok(());
        }
        self.load_json(&fs::read_to_string(path)?)
    }

    /// Saves the designated table, writing a temporary file and renaming it into place.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if writing or renaming fails.
    pub fn save_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut temp = path.as_os_str().to_owned();
        temp.push(".tmp");
        let temp = std::path::PathBuf::from(temp);

        fs::write(&temp, self.to_json()?)?;
        if let Err(error) = fs::rename(&temp, path) {
            let _ = fs::remove_file(&temp);
            return Err(error.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: &str = "Game.Player Jump(System.Single)";

    #[test]
    fn head_and_tail_are_negations() {
        let mut hasher = TokenHasher::new();
        let head = hasher.token(Some(&format!("{SITE} head")));
        let tail = hasher.token(Some(&format!("{SITE} tail")));
        assert!(head > 0);
        assert_eq!(tail, -head);
        assert_eq!(hasher.token(Some(SITE)), head);
        assert_eq!(hasher.len(), 1);
        assert_eq!(hasher.owner(tail), Some(SITE));
    }

    #[test]
    fn base_hash_is_deterministic_and_nonzero() {
        assert_eq!(base_hash(SITE), base_hash(SITE));
        assert_ne!(base_hash(SITE), base_hash("Game.Player Jump(System.Double)"));
        assert!(base_hash("") >= 1);
        assert!(base_hash(SITE) <= i64::from(u32::MAX));
    }

    #[test]
    fn collisions_use_flag_variants_then_probe() {
        let base = base_hash(SITE);
        let mut designated = DesignatedTokens::new();
        designated.insert("Other A()".into(), base);
        designated.insert("Other B()".into(), base | (1 << 32));
        let mut hasher = TokenHasher::with_designated(designated);

        let token = hasher.token(Some(SITE));
        assert_eq!(token, base | (2 << 32));
        assert_eq!(hasher.designated().get(SITE), Some(&token));

        let mut crowded = DesignatedTokens::new();
        crowded.insert("A()".into(), base);
        for flag in 1..=3i64 {
            crowded.insert(format!("F{flag}()"), base | (flag << 32));
        }
        crowded.insert("N()".into(), base + 1);
        let mut hasher = TokenHasher::with_designated(crowded);
        assert_eq!(hasher.token(Some(SITE)), base + 2);
    }

    #[test]
    fn designated_entries_win_and_none_clears() {
        let mut designated = DesignatedTokens::new();
        designated.insert(SITE.into(), 42);
        let mut hasher = TokenHasher::with_designated(designated);
        assert_eq!(hasher.token(Some(&format!("{SITE} tail"))), -42);

        hasher.load_designated(None);
        assert!(hasher.is_empty());
        assert_eq!(hasher.token(Some(SITE)), base_hash(SITE));
        assert!(hasher.designated().is_empty());
    }

    #[test]
    fn owners_of_negative_and_extreme_tokens() {
        let mut designated = DesignatedTokens::new();
        designated.insert(SITE.into(), -7);
        let mut hasher = TokenHasher::with_designated(designated);
        assert_eq!(hasher.owner(-7), Some(SITE));
        assert_eq!(hasher.owner(7), Some(SITE));
        assert_eq!(hasher.token(Some(&format!("{SITE} head"))), -7);
        assert_eq!(hasher.owner(i64::MIN), None);
        assert_eq!(hasher.owner(i64::MAX), None);
    }

    #[test]
    fn file_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        let mut designated = DesignatedTokens::new();
        designated.insert(SITE.into(), 7);
        TokenHasher::with_designated(designated).save_file(&path).unwrap();

        let mut hasher = TokenHasher::new();
        hasher.load_file(&path).unwrap();
        assert_eq!(hasher.token(Some(SITE)), 7);

        hasher.load_file(dir.path().join("missing.json")).unwrap();
        assert!(hasher.is_empty());
    }
}
