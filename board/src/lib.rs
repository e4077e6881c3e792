use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// A die is the multiset of face labels it can land on.
pub type Die = Vec<char>;

/// A grid coordinate as (row, col).
pub type Cell = (usize, usize);

/// Words outside this length range never trace on a board.
const MIN_WORD_LEN: usize = 3;
const MAX_WORD_LEN: usize = 16;

/// The grid of faces drawn for one round, laid out row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    rows: usize,
    cols: usize,
    cells: Vec<char>,
}

impl Board {
    pub fn from_rows(rows: Vec<Vec<char>>) -> Result<Self, RollError> {
        let row_count = rows.len();
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        if row_count == 0 || cols == 0 || rows.iter().any(|r| r.len() != cols) {
            return Err(RollError::BadDims {
                rows: row_count,
                cols,
            });
        }
        Ok(Self {
            rows: row_count,
            cols,
            cells: rows.into_iter().flatten().collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, cell: Cell) -> char {
        self.cells[cell.0 * self.cols + cell.1]
    }

    fn cells_matching(&self, label: char) -> impl Iterator<Item = Cell> {
        let cols = self.cols;
        self.cells
            .iter()
            .enumerate()
            .filter(move |(_, c)| **c == label)
            .map(move |(idx, _)| (idx / cols, idx % cols))
    }

    fn neighbours(&self, (i, j): Cell) -> impl Iterator<Item = Cell> {
        let (rows, cols) = (self.rows, self.cols);
        (-1i64..=1)
            .flat_map(|di| (-1i64..=1).map(move |dj| (di, dj)))
            .filter(|(di, dj)| *di != 0 || *dj != 0)
            .filter_map(move |(di, dj)| {
                let ni = i as i64 + di;
                let nj = j as i64 + dj;
                ((0..rows as i64).contains(&ni) && (0..cols as i64).contains(&nj))
                    .then_some((ni as usize, nj as usize))
            })
    }
}

// Wire shape is {rows, cols, dice} with the grid as nested arrays.
impl Serialize for Board {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let grid: Vec<&[char]> = self.cells.chunks(self.cols).collect();
        let mut s = serializer.serialize_struct("Board", 3)?;
        s.serialize_field("rows", &self.rows)?;
        s.serialize_field("cols", &self.cols)?;
        s.serialize_field("dice", &grid)?;
        s.end()
    }
}

#[derive(Debug)]
pub enum RollError {
    /// Dice count is not a perfect square and no dims were given.
    NotSquare { count: usize },
    /// Requested dims don't cover the dice set exactly.
    BadDims { rows: usize, cols: usize },
}

impl std::fmt::Display for RollError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RollError::NotSquare { count } => {
                write!(f, "{} dice cannot fill a square board", count)
            }
            RollError::BadDims { rows, cols } => {
                write!(f, "bad board dimensions {}x{}", rows, cols)
            }
        }
    }
}

impl std::error::Error for RollError {}

/// Roll a board from a seed: permute the dice uniformly, then draw one face
/// per die, row-major. The same (seed, dice, dims) always yields the same
/// board; the seed is what binds a board to one session round.
pub fn roll(seed: [u8; 32], dice: &[Die], dims: Option<(usize, usize)>) -> Result<Board, RollError> {
    let (rows, cols) = match dims {
        Some(dims) => dims,
        None => {
            let side = dice.len().isqrt();
            if side * side != dice.len() {
                return Err(RollError::NotSquare { count: dice.len() });
            }
            (side, side)
        }
    };
    if rows == 0 || cols == 0 || rows * cols != dice.len() {
        return Err(RollError::BadDims { rows, cols });
    }

    let mut rng = StdRng::from_seed(seed);
    let mut order: Vec<usize> = (0..dice.len()).collect();
    order.shuffle(&mut rng);
    let cells = order
        .into_iter()
        .map(|idx| {
            let die = &dice[idx];
            die[rng.random_range(0..die.len())]
        })
        .collect();
    Ok(Board { rows, cols, cells })
}

/// Path solver for one board.
///
/// Yields every path tracing a word under Boggle adjacency: consecutive cells
/// are 8-neighbours and no cell repeats. Callers that only care whether a
/// word is tracable should take the first path and drop the iterator.
pub struct Pathfinder<'a> {
    board: &'a Board,
}

impl<'a> Pathfinder<'a> {
    pub fn new(board: &'a Board) -> Self {
        Self { board }
    }

    /// Lazily enumerate paths for a word given in equality form.
    pub fn paths(&self, word: &str) -> Paths<'a> {
        let letters: Vec<char> = word.chars().collect();
        let mut stack = Vec::new();
        if (MIN_WORD_LEN..=MAX_WORD_LEN).contains(&letters.len()) {
            stack.extend(self.board.cells_matching(letters[0]).map(|c| (c, 0usize)));
        }
        Paths {
            board: self.board,
            letters,
            stack,
            path: Vec::new(),
        }
    }

    pub fn first_path(&self, word: &str) -> Option<Vec<Cell>> {
        self.paths(word).next()
    }
}

/// Backtracking DFS over the grid. The candidate stack carries the depth each
/// cell applies at; the current path doubles as the visited set, truncated on
/// backtrack.
pub struct Paths<'a> {
    board: &'a Board,
    letters: Vec<char>,
    stack: Vec<(Cell, usize)>,
    path: Vec<Cell>,
}

impl<'a> Iterator for Paths<'a> {
    type Item = Vec<Cell>;

    fn next(&mut self) -> Option<Vec<Cell>> {
        while let Some((cell, depth)) = self.stack.pop() {
            self.path.truncate(depth);
            self.path.push(cell);
            if self.path.len() == self.letters.len() {
                return Some(self.path.clone());
            }
            let next_letter = self.letters[self.path.len()];
            for n in self.board.neighbours(cell) {
                if self.board.get(n) == next_letter && !self.path.contains(&n) {
                    self.stack.push((n, self.path.len()));
                }
            }
        }
        None
    }
}
