//! Code pages for label and metadata strings

use encoding_rs::{Encoding, SHIFT_JIS, WINDOWS_1252};
use serde::{Deserialize, Serialize};

/// Target game of the data being converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Game {
    Sa1,
    Sadx,
    Sa2,
    Sa2b,
    Sa2Pc,
}

/// Release language of the target executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    Japanese,
    English,
    French,
    Spanish,
    German,
}

/// Text encoding for strings embedded in binary data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextEncoding {
    #[default]
    ShiftJis,
    Windows1252,
}

impl TextEncoding {
    /// Chooses the code page a given release stores its strings in.
    ///
    /// Dreamcast releases use Shift-JIS in every region; the western PC and
    /// GameCube releases use Windows-1252.
    pub fn for_target(game: Game, language: Language) -> Self {
        match (game, language) {
            (_, Language::Japanese) | (Game::Sa1 | Game::Sa2, _) => TextEncoding::ShiftJis,
            (Game::Sadx | Game::Sa2b | Game::Sa2Pc, _) => TextEncoding::Windows1252,
        }
    }

    fn encoding(self) -> &'static Encoding {
        match self {
            TextEncoding::ShiftJis => SHIFT_JIS,
            TextEncoding::Windows1252 => WINDOWS_1252,
        }
    }

    pub fn decode(self, bytes: &[u8]) -> String {
        let (decoded, _, _) = self.encoding().decode(bytes);
        decoded.into_owned()
    }

    pub fn encode(self, text: &str) -> Vec<u8> {
        let (encoded, _, _) = self.encoding().encode(text);
        encoded.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_encoding() {
        assert_eq!(TextEncoding::for_target(Game::Sadx, Language::Japanese), TextEncoding::ShiftJis);
        assert_eq!(TextEncoding::for_target(Game::Sadx, Language::English), TextEncoding::Windows1252);
        assert_eq!(TextEncoding::for_target(Game::Sa1, Language::English), TextEncoding::ShiftJis);
    }

    #[test]
    fn test_windows_1252_round_trip() {
        let bytes = TextEncoding::Windows1252.encode("café");
        assert_eq!(bytes, vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(TextEncoding::Windows1252.decode(&bytes), "café");
    }
}
