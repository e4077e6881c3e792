use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use board::Die;
use dashmap::DashMap;
use tracing::{info, warn};

/// Name of the dice set that ships with the server.
pub const DEFAULT_DICE_CONFIG: &str = "International";

const BUILTIN_DICE: &str = include_str!("../data/international.dice");

/// Named dice sets, read once at startup.
///
/// A dice file holds one or more blocks: a name line, then one die per line
/// as space-separated face labels, terminated by a blank line. Entries from
/// the configured directory are merged over the built-in set, so the default
/// config is always available.
pub struct DiceConfigs {
    configs: HashMap<String, Arc<Vec<Die>>>,
}

impl DiceConfigs {
    pub fn builtin() -> Self {
        let mut configs = HashMap::new();
        for (name, dice) in parse_dice_file(BUILTIN_DICE) {
            configs.insert(name, Arc::new(dice));
        }
        Self { configs }
    }

    pub fn load(dir: &Path) -> Self {
        let mut out = Self::builtin();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "dice directory unreadable, using built-in set");
                return out;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    for (name, dice) in parse_dice_file(&content) {
                        info!(config = %name, file = %path.display(), "loaded dice config");
                        out.configs.insert(name, Arc::new(dice));
                    }
                }
                Err(e) => warn!(file = %path.display(), error = %e, "failed to read dice file"),
            }
        }
        out
    }

    /// Assemble a dice set from in-memory entries, on top of the built-in
    /// set.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<Die>)>,
    {
        let mut out = Self::builtin();
        for (name, dice) in entries {
            out.configs.insert(name, Arc::new(dice));
        }
        out
    }

    pub fn get(&self, name: &str) -> Option<Arc<Vec<Die>>> {
        self.configs.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.configs.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.keys().cloned().collect();
        names.sort();
        names
    }
}

fn parse_dice_file(content: &str) -> Vec<(String, Vec<Die>)> {
    let mut out = Vec::new();
    let mut lines = content.lines().peekable();
    while let Some(name) = lines.next() {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let mut dice: Vec<Die> = Vec::new();
        let mut valid = true;
        while let Some(line) = lines.peek() {
            let line = line.trim();
            if line.is_empty() {
                break;
            }
            let die: Vec<char> = line
                .split_whitespace()
                .filter_map(|face| {
                    let mut chars = face.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => Some(c.to_ascii_uppercase()),
                        _ => {
                            valid = false;
                            None
                        }
                    }
                })
                .collect();
            dice.push(die);
            lines.next();
        }
        // the dice must fill a square board
        let square = dice.len().isqrt().pow(2) == dice.len();
        if valid && square && !dice.is_empty() && dice.iter().all(|d| !d.is_empty()) {
            out.push((name.to_owned(), dice));
        } else {
            warn!(config = %name, "skipping malformed dice config");
        }
    }
    out
}

/// Dictionary files named `<name>.dic`, one word per line.
///
/// Names are discovered up front; the word sets themselves are read lazily on
/// first use and cached for the lifetime of the process, so worker processes
/// pay the parse cost once.
pub struct Dictionaries {
    dir: PathBuf,
    names: Vec<String>,
    cache: DashMap<String, Arc<HashSet<String>>>,
}

#[derive(Debug)]
pub enum DictionaryError {
    Unknown(String),
    Io(String, std::io::Error),
}

impl std::fmt::Display for DictionaryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DictionaryError::Unknown(name) => write!(f, "no dictionary named {:?}", name),
            DictionaryError::Io(name, e) => {
                write!(f, "failed to read dictionary {:?}: {}", name, e)
            }
        }
    }
}

impl std::error::Error for DictionaryError {}

impl Dictionaries {
    /// Scan a directory for `*.dic` files without importing them.
    pub fn discover(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let mut names = Vec::new();
        match std::fs::read_dir(&dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.extension().is_some_and(|ext| ext == "dic")
                        && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                    {
                        names.push(stem.to_owned());
                    }
                }
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "dictionary directory unreadable");
            }
        }
        names.sort();
        Self {
            dir,
            names,
            cache: DashMap::new(),
        }
    }

    /// Build a dictionary set from in-memory word lists.
    pub fn from_entries<I, W>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, W)>,
        W: IntoIterator<Item = String>,
    {
        let cache = DashMap::new();
        let mut names = Vec::new();
        for (name, entry_words) in entries {
            let cleaned: HashSet<String> = entry_words
                .into_iter()
                .map(|w| words::fold(&w))
                .filter(|w| !w.is_empty())
                .collect();
            names.push(name.clone());
            cache.insert(name, Arc::new(cleaned));
        }
        names.sort();
        Self {
            dir: PathBuf::new(),
            names,
            cache,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// The dictionary sessions fall back to when none is requested: the sole
    /// available one, if there is exactly one.
    pub fn default_name(&self) -> Option<&str> {
        match self.names.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    pub fn load(&self, name: &str) -> Result<Arc<HashSet<String>>, DictionaryError> {
        if let Some(cached) = self.cache.get(name) {
            return Ok(cached.clone());
        }
        if !self.contains(name) {
            return Err(DictionaryError::Unknown(name.to_owned()));
        }
        let path = self.dir.join(format!("{}.dic", name));
        info!(dictionary = %name, file = %path.display(), "importing dictionary");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| DictionaryError::Io(name.to_owned(), e))?;
        let entry_words: HashSet<String> = content
            .lines()
            .map(words::fold)
            .filter(|w| !w.is_empty())
            .collect();
        let entry_words = Arc::new(entry_words);
        self.cache.insert(name.to_owned(), entry_words.clone());
        Ok(entry_words)
    }
}
