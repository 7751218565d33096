/// One input line, classified for dispatch.
///
/// The only syntax a menu line has is the `?` help shorthand; everything after
/// the first word is handed to the command untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed<'a> {
    /// Blank line.
    Empty,
    /// A lone `?`: show the node summary.
    Summary,
    /// `? word`, `?word` or `word?`: show help for `word`.
    Help(String),
    /// Run `word` with the raw remainder of the line.
    Invoke { word: &'a str, rest: &'a str },
}

/// Classify `line`.
///
/// A `?` only means help in two shapes: leading the line, or anywhere in a
/// line made of a single word. In any other position it is passed through as
/// part of the arguments.
pub fn parse_line(line: &str) -> Parsed<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Parsed::Empty;
    }
    if let Some(topic) = line.strip_prefix('?') {
        return match topic.split_whitespace().next() {
            Some(word) => Parsed::Help(word.replace('?', "")),
            None => Parsed::Summary,
        };
    }
    let (word, rest) = split_word(line);
    if rest.is_empty() && word.contains('?') {
        let word = word.replace('?', "");
        return if word.is_empty() {
            Parsed::Summary
        } else {
            Parsed::Help(word)
        };
    }
    Parsed::Invoke { word, rest }
}

/// Split off the first whitespace-delimited word; the rest is trimmed.
pub fn split_word(line: &str) -> (&str, &str) {
    let line = line.trim();
    match line.find(char::is_whitespace) {
        Some(idx) => (&line[..idx], line[idx..].trim()),
        None => (line, ""),
    }
}
