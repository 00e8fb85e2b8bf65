use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// "Frank Herbert - Dune", "Herbert, Frank - Dune Messiah"
regex!(AUTHOR_TITLE_REGEX, r"^\s*(?P<author>[^-]+?)\s+-\s+(?P<title>.+?)\s*$");
// Anything that looks like markup inside an OPF description.
regex!(MARKUP_REGEX, r"<[^>]*>");
regex!(WHITESPACE_REGEX, r"\s+");
