//! Structs for handling encrypted memos.
//!
//! A memo is an optional note of at most 512 bytes attached to a shielded output. The wallet
//! only ever produces and displays text memos, so [`Memo`] holds UTF-8 text.

use core::fmt;
use core::ops::Deref;
use core::str::FromStr;

/// The maximum size of a memo field, in bytes.
pub const MAX_MEMO_LEN: usize = 512;

/// Errors that may result from attempting to construct an invalid memo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The text would not fit in a memo field. Carries the encoded length.
    TooLong(usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TooLong(n) => write!(f, "Memo is {n} bytes; the maximum is {MAX_MEMO_LEN}"),
        }
    }
}

impl std::error::Error for Error {}

/// A text memo of at most [`MAX_MEMO_LEN`] bytes.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Memo(String);

impl Memo {
    /// Constructs a memo from user-supplied text.
    ///
    /// Returns `Ok(None)` when the text is empty, since an empty memo field means no memo.
    pub fn from_text(text: &str) -> Result<Option<Memo>, Error> {
        if text.is_empty() {
            Ok(None)
        } else {
            Memo::try_from(text.to_string()).map(Some)
        }
    }

    /// Returns the memo text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for Memo {
    type Error = Error;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        if text.len() > MAX_MEMO_LEN {
            Err(Error::TooLong(text.len()))
        } else {
            Ok(Memo(text))
        }
    }
}

impl From<Memo> for String {
    fn from(memo: Memo) -> String {
        memo.0
    }
}

impl FromStr for Memo {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Memo::try_from(s.to_string())
    }
}

impl Deref for Memo {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Memo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(any(test, feature = "test-dependencies"))]
pub mod testing {
    use proptest::prelude::prop_compose;

    use super::Memo;

    prop_compose! {
        pub fn arb_memo()(text in "\\PC{1,120}") -> Memo {
            Memo::try_from(text).unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, Memo, MAX_MEMO_LEN};

    #[test]
    fn empty_text_is_no_memo() {
        assert_eq!(Memo::from_text(""), Ok(None));
    }

    #[test]
    fn length_is_measured_in_bytes() {
        let max = "a".repeat(MAX_MEMO_LEN);
        assert!(Memo::from_text(&max).unwrap().is_some());

        // 171 three-byte characters encode to 513 bytes.
        let wide = "\u{2728}".repeat(171);
        assert_eq!(Memo::from_text(&wide), Err(Error::TooLong(513)));
    }

    #[test]
    fn unicode_memo_survives() {
        let memo: Memo = "Thanks for lunch \u{1F35C}".parse().unwrap();
        assert_eq!(memo.as_str(), "Thanks for lunch \u{1F35C}");
    }
}
