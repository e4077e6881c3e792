use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// A word as submitted by a player, carrying its two canonical spellings.
///
/// The *display* form is the folded, uppercased spelling that gets stored and
/// echoed back to clients. The *equality* form additionally collapses `QU`
/// into `Q`, because a die face labelled `Q` stands for `QU`; equality and
/// hashing go through that form so that `QULGE` and `QLGE` count as the same
/// submission.
///
/// Scoring length is taken from the display form (`AQULGE` is six letters),
/// while path lookup on the board uses the equality form (five cells).
#[derive(Debug, Clone)]
pub struct BoggleWord {
    display: String,
    equality: String,
}

impl BoggleWord {
    pub fn new(raw: &str) -> Self {
        let display = fold(raw);
        let equality = display.replace("QU", "Q");
        Self { display, equality }
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn equality(&self) -> &str {
        &self.equality
    }

    /// Length that counts for scoring purposes.
    pub fn len(&self) -> usize {
        self.display.len()
    }

    pub fn is_empty(&self) -> bool {
        self.display.is_empty()
    }
}

impl std::fmt::Display for BoggleWord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display)
    }
}

impl std::cmp::PartialEq for BoggleWord {
    fn eq(&self, other: &Self) -> bool {
        self.equality == other.equality
    }
}

impl std::cmp::Eq for BoggleWord {}

impl std::hash::Hash for BoggleWord {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.equality.hash(state)
    }
}

/// Normalise a raw spelling to the display form: decompose, drop combining
/// marks, keep ASCII letters only, uppercase.
pub fn fold(raw: &str) -> String {
    raw.nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Drop words that collapse to an equality form already present earlier in
/// the list. Which display form survives a `QU`/`Q` collision is deliberately
/// unspecified; this implementation keeps the first occurrence.
pub fn dedup<I>(words: I) -> Vec<BoggleWord>
where
    I: IntoIterator<Item = BoggleWord>,
{
    let mut seen = std::collections::HashSet::new();
    words
        .into_iter()
        .filter(|w| seen.insert(w.equality.clone()))
        .collect()
}
