//! Token model (spec §3 "Token", §4.1 Scanner).

use crate::position::Range;
use crate::types::Type;
use std::rc::Rc;

/// Placeholder metadata attached to an `ALIAS_PARAMETER` token (`<name>`)
/// inside an alias-declaration pattern. Filled in by the parser once it
/// knows the declared parameter list of the function the alias names
/// (spec §4.1 "Alias mode").
#[derive(Debug, Clone, PartialEq)]
pub struct AliasParamInfo {
    pub name: String,
    pub param_type: Option<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Int(i64),
    Float(f64),
    Bool(bool),
    Char(char),
    String(String),

    // Identifier / keyword
    Ident,
    Keyword(Keyword),

    // An `<name>` placeholder inside an alias pattern.
    AliasParameter(AliasParamInfo),

    // Punctuation that isn't naturally a "word"
    Dot,
    Comma,
    Colon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Semicolon,

    Comment,
    Illegal,
    Eof,
}

/// Keywords recognized by the scanner. German surface forms are attached in
/// `Keyword::surface`/`Keyword::lookup` rather than duplicated as separate
/// enum variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    // Declarations
    Die, Der, Das, Ist, Sind, Wert, Funktion, Gibt, Zurueck, Mit, Extern,
    // Types
    Zahl, Kommazahl, Boolean, Buchstabe, Text, Liste, Von,
    // Statements
    Wenn, Dann, Sonst, Solange, Mache, Wiederhole, Mal, Fuer, Jede, Jeden,
    Bis, Schritt, In, Rueckgabe,
    // Operators (word-form); two-word phrases (`logisch und`, `ist
    // gleich`, `größer als`) are assembled by the parser from these
    // single-word tokens rather than pre-combined by the scanner.
    Plus, Minus, Durch, Modulo, Hoch, Logarithmus,
    Und, Oder, Logisch, Kontra, Links, Rechts, Nicht,
    Betrag, Negiere, Laenge, Groesse, Verkettet,
    Gleich, Ungleich, Groesser, Kleiner, Als,
    // Casting / size / default-value type ops
    Standardwert,
    // I/O & include
    Schreibe, Binde, Ein,
    // Boolean literals
    Wahr, Falsch,
    // Assignment & alias declaration
    Setze, Auf, Alias,
}

impl Keyword {
    /// Exact-case lookup first, then lowercase fallback (spec §4.1
    /// "Identifiers"). Multi-word keyword phrases (`logisch und`, `logisch
    /// nicht`) are assembled by the scanner from single-word keyword
    /// tokens; this table only covers individual words.
    pub fn lookup(word: &str) -> Option<Keyword> {
        Self::lookup_exact(word).or_else(|| Self::lookup_exact(&word.to_lowercase()))
    }

    fn lookup_exact(word: &str) -> Option<Keyword> {
        use Keyword::*;
        Some(match word {
            "Die" => Die,
            "Der" => Der,
            "Das" => Das,
            "ist" => Ist,
            "sind" => Sind,
            "Wert" => Wert,
            "Funktion" => Funktion,
            "gibt" => Gibt,
            "zurück" | "zurueck" => Zurueck,
            "mit" => Mit,
            "extern" => Extern,
            "Zahl" => Zahl,
            "Kommazahl" => Kommazahl,
            "Boolean" => Boolean,
            "Buchstabe" => Buchstabe,
            "Text" => Text,
            "Liste" => Liste,
            "von" => Von,
            "wenn" => Wenn,
            "dann" => Dann,
            "sonst" => Sonst,
            "solange" => Solange,
            "mache" => Mache,
            "wiederhole" => Wiederhole,
            "mal" => Mal,
            "für" | "fuer" => Fuer,
            "jede" => Jede,
            "jeden" => Jeden,
            "bis" => Bis,
            "Schritt" => Schritt,
            "in" => In,
            "Rückgabe" | "Rueckgabe" => Rueckgabe,
            "plus" => Plus,
            "minus" => Minus,
            "verkettet" => Verkettet,
            "durch" => Durch,
            "modulo" => Modulo,
            "hoch" => Hoch,
            "Logarithmus" => Logarithmus,
            "und" => Und,
            "oder" => Oder,
            "logisch" => Logisch,
            "kontra" => Kontra,
            "links" => Links,
            "rechts" => Rechts,
            "nicht" => Nicht,
            "Betrag" => Betrag,
            "Negiere" => Negiere,
            "Länge" | "Laenge" => Laenge,
            "Größe" | "Groesse" => Groesse,
            "gleich" => Gleich,
            "ungleich" => Ungleich,
            "größer" | "groesser" => Groesser,
            "kleiner" => Kleiner,
            "als" => Als,
            "Standardwert" => Standardwert,
            "Schreibe" => Schreibe,
            "Binde" => Binde,
            "ein" => Ein,
            "wahr" => Wahr,
            "falsch" => Falsch,
            "setze" => Setze,
            "auf" => Auf,
            "Alias" => Alias,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub literal_text: String,
    /// Advisory indentation level of the token's line (count of four-space
    /// groups or tabs at line start). Not structurally enforced.
    pub indent_level: u32,
    pub file: Rc<str>,
    pub range: Range,
}

impl Token {
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}
