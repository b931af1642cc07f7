//! Precomputed DTMF sample tables.
//!
//! A DTMF symbol is the sum of one row and one column tone from the
//! telephony frequency grid. Tables are built lazily on first use, one
//! second of samples each, and live for the process lifetime.

use std::f64::consts::TAU;
use std::sync::OnceLock;

use tracing::warn;

/// Row tones of the DTMF grid, in Hz.
pub const ROW_FREQS: [f64; 4] = [697.0, 770.0, 852.0, 941.0];
/// Column tones of the DTMF grid, in Hz.
pub const COL_FREQS: [f64; 4] = [1209.0, 1336.0, 1477.0, 1633.0];

/// The twelve dialable DTMF symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DtmfSymbol {
    /// Keypad digit 0.
    D0,
    /// Keypad digit 1.
    D1,
    /// Keypad digit 2.
    D2,
    /// Keypad digit 3.
    D3,
    /// Keypad digit 4.
    D4,
    /// Keypad digit 5.
    D5,
    /// Keypad digit 6.
    D6,
    /// Keypad digit 7.
    D7,
    /// Keypad digit 8.
    D8,
    /// Keypad digit 9.
    D9,
    /// Keypad star (`*`).
    Star,
    /// Keypad hash (`#`).
    Hash,
}

impl DtmfSymbol {
    /// All symbols in keypad order (1..9, *, 0, #).
    pub const ALL: [DtmfSymbol; 12] = [
        Self::D1,
        Self::D2,
        Self::D3,
        Self::D4,
        Self::D5,
        Self::D6,
        Self::D7,
        Self::D8,
        Self::D9,
        Self::Star,
        Self::D0,
        Self::Hash,
    ];

    /// Parses a keypad character.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(Self::D0),
            '1' => Some(Self::D1),
            '2' => Some(Self::D2),
            '3' => Some(Self::D3),
            '4' => Some(Self::D4),
            '5' => Some(Self::D5),
            '6' => Some(Self::D6),
            '7' => Some(Self::D7),
            '8' => Some(Self::D8),
            '9' => Some(Self::D9),
            '*' => Some(Self::Star),
            '#' => Some(Self::Hash),
            _ => None,
        }
    }

    /// Keypad character for this symbol.
    pub fn as_char(self) -> char {
        match self {
            Self::D0 => '0',
            Self::D1 => '1',
            Self::D2 => '2',
            Self::D3 => '3',
            Self::D4 => '4',
            Self::D5 => '5',
            Self::D6 => '6',
            Self::D7 => '7',
            Self::D8 => '8',
            Self::D9 => '9',
            Self::Star => '*',
            Self::Hash => '#',
        }
    }

    /// Keypad position as (row, column) into the frequency grid.
    pub fn grid(self) -> (usize, usize) {
        match self {
            Self::D1 => (0, 0),
            Self::D2 => (0, 1),
            Self::D3 => (0, 2),
            Self::D4 => (1, 0),
            Self::D5 => (1, 1),
            Self::D6 => (1, 2),
            Self::D7 => (2, 0),
            Self::D8 => (2, 1),
            Self::D9 => (2, 2),
            Self::Star => (3, 0),
            Self::D0 => (3, 1),
            Self::Hash => (3, 2),
        }
    }

    fn table_index(self) -> usize {
        let (row, col) = self.grid();
        row * 3 + col
    }
}

impl std::fmt::Display for DtmfSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

struct ToneTables {
    rate: u32,
    symbols: Vec<Vec<i16>>,
}

static TABLES: OnceLock<ToneTables> = OnceLock::new();

/// One second of a unit-amplitude sine at `freq`.
fn base_sine(freq: f64, rate: u32) -> Vec<f64> {
    (0..rate as usize)
        .map(|n| (TAU * freq * n as f64 / rate as f64).sin())
        .collect()
}

fn build(rate: u32) -> ToneTables {
    let rows: Vec<Vec<f64>> = ROW_FREQS.iter().map(|&f| base_sine(f, rate)).collect();
    let cols: Vec<Vec<f64>> = COL_FREQS.iter().map(|&f| base_sine(f, rate)).collect();

    let mut symbols = vec![Vec::new(); 12];
    for symbol in DtmfSymbol::ALL {
        let (r, c) = symbol.grid();
        symbols[symbol.table_index()] = rows[r]
            .iter()
            .zip(&cols[c])
            .map(|(a, b)| ((a + b) * 0.5 * f64::from(i16::MAX)) as i16)
            .collect();
    }
    ToneTables { rate, symbols }
}

/// Returns the precomputed table for a symbol, building all tables on
/// first call. The first caller's sample rate wins.
pub fn symbol_table(symbol: DtmfSymbol, rate: u32) -> &'static [i16] {
    let tables = TABLES.get_or_init(|| build(rate));
    if tables.rate != rate {
        warn!(
            requested = rate,
            built = tables.rate,
            "tone tables already built at a different rate"
        );
    }
    &tables.symbols[symbol.table_index()]
}
