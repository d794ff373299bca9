//! Word wrapping for fixed-width receipt text

/// Columns per line at normal size
pub const NORMAL_COLUMNS: usize = 25;
/// Columns per line at double size
pub const DOUBLE_COLUMNS: usize = 15;

/// Wrap `s` on word boundaries.
///
/// Explicit newlines are kept as line breaks; runs of whitespace collapse.
/// A single word longer than the line is left on its own line unbroken.
pub fn wrap(s: &str, double_size: bool) -> String {
    let limit = if double_size {
        DOUBLE_COLUMNS
    } else {
        NORMAL_COLUMNS
    };
    let mut lines: Vec<String> = Vec::new();

    for input_line in s.split('\n') {
        let mut current = String::new();
        for word in input_line.split_whitespace() {
            if current.is_empty() {
                current.push_str(word);
            } else if current.len() + word.len() + 1 <= limit {
                current.push(' ');
                current.push_str(word);
            } else {
                lines.push(std::mem::take(&mut current));
                current.push_str(word);
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wraps_at_word_boundary() {
        let out = wrap("Park fact: Channel Islands has ten percent", false);
        for line in out.lines() {
            assert!(line.len() <= NORMAL_COLUMNS, "{line:?}");
        }
        assert_eq!(out, "Park fact: Channel\nIslands has ten percent");
    }

    #[test]
    fn test_double_size_is_narrower() {
        assert_eq!(wrap("Order #: Debug Order", true), "Order #: Debug\nOrder");
    }

    #[test]
    fn test_keeps_explicit_newlines() {
        let out = wrap("6 Tender Combo - $12.99\nJust Fries - $2.99", false);
        assert_eq!(out, "6 Tender Combo - $12.99\nJust Fries - $2.99");
    }

    #[test]
    fn test_long_word_not_split() {
        assert_eq!(wrap("abcdefghijklmnopqrstuvwxyz0", true), "abcdefghijklmnopqrstuvwxyz0");
    }
}
