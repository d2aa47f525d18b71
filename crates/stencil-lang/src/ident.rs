use std::sync::{LazyLock, RwLock};

use smol_str::SmolStr;
use string_interner::{DefaultBackend, DefaultSymbol, StringInterner};

static STRING_INTERNER: LazyLock<RwLock<StringInterner<DefaultBackend>>> =
    LazyLock::new(|| RwLock::new(StringInterner::default()));

/// An interned variable or parameter name.
///
/// Frames are keyed by `Ident` so that scope lookups hash a `u32` instead of
/// a string. Interning is process-wide; trees built on different threads
/// agree on the symbol for a given name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(DefaultSymbol);

impl Ident {
    pub fn new(s: &str) -> Self {
        if let Some(symbol) = STRING_INTERNER
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(s)
        {
            return Self(symbol);
        }

        Self(
            STRING_INTERNER
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .get_or_intern(s),
        )
    }

    pub fn as_str(&self) -> SmolStr {
        self.resolve_with(|s| SmolStr::new(s))
    }

    pub fn resolve_with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        let interner = STRING_INTERNER.read().unwrap_or_else(|e| e.into_inner());
        f(interner.resolve(self.0).unwrap_or_default())
    }

    /// Name of the auxiliary loop variable `<name><suffix>`, e.g. `item_index`.
    pub fn with_suffix(&self, suffix: &str) -> Self {
        self.resolve_with(|s| Ident::new(&format!("{s}{suffix}")))
    }
}

impl Default for Ident {
    fn default() -> Self {
        Ident::new("")
    }
}

impl From<&str> for Ident {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Ident {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl From<&SmolStr> for Ident {
    fn from(s: &SmolStr) -> Self {
        Self::new(s.as_str())
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.resolve_with(|s| write!(f, "{}", s))
    }
}

#[cfg(feature = "ast-json")]
impl serde::Serialize for Ident {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.resolve_with(|s| serializer.serialize_str(s))
    }
}

#[cfg(feature = "ast-json")]
impl<'de> serde::Deserialize<'de> for Ident {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Ident::new(&s))
    }
}
