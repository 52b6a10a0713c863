//! # Browse Identifiers
//!
//! Every node of the catalog tree is addressed by a string of the form
//!
//! ```text
//! ROOT[/CATEGORY][|LEAF]
//! ```
//!
//! - `ROOT` is one of `MUSIC`, `ALBUMS`, `ARTISTS`, `PLAYLISTS`.
//! - `CATEGORY` is the id of an album, artist or playlist.
//! - `LEAF` is a track id.
//!
//! Components are plain non-negative decimal integers, so the delimiters can
//! never occur inside a value. Anything else is rejected with a
//! [`DecodeError`]; there is no escaping. `MUSIC` has no categories and
//! addresses its tracks directly (`MUSIC|1`); the other roots need a category
//! before a leaf (`ALBUMS/2|1`).
//!
//! ```
//! use muse_catalog::browse_id::{decode, encode, Root};
//!
//! let id = encode(Root::Albums, Some(2), Some(1));
//! assert_eq!(id, "ALBUMS/2|1");
//! let parsed = decode(&id)?;
//! assert_eq!(parsed.root, Root::Albums);
//! assert_eq!(parsed.category, Some(2));
//! assert_eq!(parsed.leaf, Some(1));
//! # Ok::<(), muse_catalog::browse_id::DecodeError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Separates the root from the category.
pub const CATEGORY_SEPARATOR: char = '/';
/// Separates the container from the leaf.
pub const LEAF_SEPARATOR: char = '|';

/// Top-level node of the catalog tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Root {
    Music,
    Albums,
    Artists,
    Playlists,
}

impl Root {
    pub const ALL: [Root; 4] = [Root::Music, Root::Albums, Root::Artists, Root::Playlists];

    pub fn token(self) -> &'static str {
        match self {
            Root::Music => "MUSIC",
            Root::Albums => "ALBUMS",
            Root::Artists => "ARTISTS",
            Root::Playlists => "PLAYLISTS",
        }
    }

    /// Whether this root groups its tracks under categories.
    pub fn has_categories(self) -> bool {
        !matches!(self, Root::Music)
    }

    /// Human readable title of the root node.
    pub fn title(self) -> &'static str {
        match self {
            Root::Music => "All tracks",
            Root::Albums => "Albums",
            Root::Artists => "Artists",
            Root::Playlists => "Playlists",
        }
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Root {
    type Err = DecodeError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Root::ALL
            .into_iter()
            .find(|root| root.token() == token)
            .ok_or_else(|| DecodeError::UnknownRoot(token.to_string()))
    }
}

/// Why an identifier could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty browse identifier")]
    Empty,
    #[error("unknown root `{0}`")]
    UnknownRoot(String),
    #[error("invalid {component} component `{value}`")]
    InvalidComponent {
        component: &'static str,
        value: String,
    },
    #[error("root {0} does not have categories")]
    UnexpectedCategory(Root),
    #[error("leaf under {0} requires a category")]
    MissingCategory(Root),
}

/// A parsed browse identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BrowseId {
    pub root: Root,
    pub category: Option<i64>,
    pub leaf: Option<i64>,
}

impl BrowseId {
    pub fn root(root: Root) -> Self {
        BrowseId {
            root,
            category: None,
            leaf: None,
        }
    }

    pub fn category(root: Root, category: i64) -> Self {
        BrowseId {
            root,
            category: Some(category),
            leaf: None,
        }
    }

    pub fn leaf(root: Root, category: Option<i64>, leaf: i64) -> Self {
        BrowseId {
            root,
            category,
            leaf: Some(leaf),
        }
    }

    /// Checks the structural rules that [`decode`] enforces.
    pub fn validate(&self) -> Result<(), DecodeError> {
        for value in [self.category, self.leaf].into_iter().flatten() {
            if value < 0 {
                return Err(DecodeError::InvalidComponent {
                    component: "id",
                    value: value.to_string(),
                });
            }
        }
        match (self.root.has_categories(), self.category, self.leaf) {
            (false, Some(_), _) => Err(DecodeError::UnexpectedCategory(self.root)),
            (true, None, Some(_)) => Err(DecodeError::MissingCategory(self.root)),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for BrowseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.root.token())?;
        if let Some(category) = self.category {
            write!(f, "{CATEGORY_SEPARATOR}{category}")?;
        }
        if let Some(leaf) = self.leaf {
            write!(f, "{LEAF_SEPARATOR}{leaf}")?;
        }
        Ok(())
    }
}

impl FromStr for BrowseId {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}

/// Encodes the given components. Decoding the result yields them back for
/// every combination that [`BrowseId::validate`] accepts.
pub fn encode(root: Root, category: Option<i64>, leaf: Option<i64>) -> String {
    BrowseId {
        root,
        category,
        leaf,
    }
    .to_string()
}

/// Parses an identifier. Malformed input never yields a partial result.
pub fn decode(input: &str) -> Result<BrowseId, DecodeError> {
    if input.is_empty() {
        return Err(DecodeError::Empty);
    }

    let (container, leaf) = match input.split_once(LEAF_SEPARATOR) {
        Some((container, leaf)) => (container, Some(parse_component("leaf", leaf)?)),
        None => (input, None),
    };
    let (root, category) = match container.split_once(CATEGORY_SEPARATOR) {
        Some((root, category)) => (root, Some(parse_component("category", category)?)),
        None => (container, None),
    };

    let id = BrowseId {
        root: root.parse()?,
        category,
        leaf,
    };
    id.validate()?;
    Ok(id)
}

/// Returns the root of an identifier without parsing the remainder.
pub fn root_of(input: &str) -> Result<Root, DecodeError> {
    let end = input
        .find(|c: char| c == CATEGORY_SEPARATOR || c == LEAF_SEPARATOR)
        .unwrap_or(input.len());
    match &input[..end] {
        "" => Err(DecodeError::Empty),
        token => token.parse(),
    }
}

fn parse_component(component: &'static str, value: &str) -> Result<i64, DecodeError> {
    let invalid = || DecodeError::InvalidComponent {
        component,
        value: value.to_string(),
    };
    // Digits only: rejects signs, whitespace and both delimiters.
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if value.len() > 1 && value.starts_with('0') {
        return Err(invalid());
    }
    value.parse().map_err(|_| invalid())
}
