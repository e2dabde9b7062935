/// A parsed `/todo` invocation.
///
/// The command text is split on `|`; the first piece selects the command and
/// the remaining pieces are its arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// No or unusable arguments: print the help text.
    Usage,
    /// `list`
    List,
    /// `add | TASK [| DESCRIPTION]`
    Add {
        title: String,
        description: Option<String>,
    },
    /// `key | KEY`; `None` when the key is missing.
    Key(Option<String>),
    /// Any other word, looked up as a numeric id.
    Detail(String),
}

impl Command {
    pub fn parse(text: &str) -> Self {
        let mut pieces = text.trim().split('|');
        let name = pieces.next().unwrap_or_default().trim();

        match name {
            "" => Self::Usage,
            "list" => Self::List,
            "add" => {
                let title = pieces.next().map(str::trim).unwrap_or_default();
                if title.is_empty() {
                    return Self::Usage;
                }
                Self::Add {
                    title: title.to_owned(),
                    description: pieces.next().map(str::to_owned),
                }
            }
            "key" => Self::Key(
                pieces
                    .next()
                    .map(str::trim)
                    .filter(|key| !key.is_empty())
                    .map(str::to_owned),
            ),
            other => Self::Detail(other.to_owned()),
        }
    }

    /// Short label for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Usage => "usage",
            Self::List => "list",
            Self::Add { .. } => "add",
            Self::Key(_) => "key",
            Self::Detail(_) => "detail",
        }
    }
}

/// Parses a todo id typed by a user.
///
/// The leading decimal digits are the id and anything after them is ignored,
/// so `3abc` is task 3. Text without leading digits, or a negative number,
/// is not an id.
pub fn parse_id(raw: &str) -> Option<u64> {
    let raw = raw.trim_start();
    let raw = raw.strip_prefix('+').unwrap_or(raw);
    let end = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    raw[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_prints_usage() {
        assert_eq!(Command::parse(""), Command::Usage);
        assert_eq!(Command::parse("   "), Command::Usage);
        assert_eq!(Command::parse(" | list"), Command::Usage);
    }

    #[test]
    fn list_ignores_padding() {
        assert_eq!(Command::parse("  list "), Command::List);
        assert_eq!(Command::parse("list | extra"), Command::List);
    }

    #[test]
    fn add_with_and_without_description() {
        assert_eq!(
            Command::parse("add | Buy milk | two litres"),
            Command::Add {
                title: "Buy milk".into(),
                description: Some(" two litres".into()),
            }
        );
        assert_eq!(
            Command::parse("add|Buy milk"),
            Command::Add {
                title: "Buy milk".into(),
                description: None,
            }
        );
    }

    #[test]
    fn add_without_title_prints_usage() {
        assert_eq!(Command::parse("add"), Command::Usage);
        assert_eq!(Command::parse("add |   | desc"), Command::Usage);
    }

    #[test]
    fn key_lookup() {
        assert_eq!(
            Command::parse("key | 01HX3 "),
            Command::Key(Some("01HX3".into()))
        );
        assert_eq!(Command::parse("key"), Command::Key(None));
        assert_eq!(Command::parse("key |  "), Command::Key(None));
    }

    #[test]
    fn anything_else_is_a_detail_lookup() {
        assert_eq!(Command::parse("12"), Command::Detail("12".into()));
        assert_eq!(Command::parse("lists"), Command::Detail("lists".into()));
    }

    #[test]
    fn ids_are_leading_digits() {
        assert_eq!(parse_id("12"), Some(12));
        assert_eq!(parse_id(" 7 "), Some(7));
        assert_eq!(parse_id("+4"), Some(4));
        assert_eq!(parse_id("3abc"), Some(3));
        assert_eq!(parse_id("12.5"), Some(12));
        assert_eq!(parse_id("abc3"), None);
        assert_eq!(parse_id("-1"), None);
        assert_eq!(parse_id(""), None);
        assert_eq!(parse_id("99999999999999999999999"), None);
    }
}
