//! Graphviz label escaping.
//!
//! Control flow graphs are dumped with one box per block, labelled with the
//! block address and its statement listing. Listings are left-aligned, so line
//! breaks become `\l` rather than centered `\n`.

/// Escapes a block label for use inside a quoted DOT string.
///
/// Quotes, backslashes and angle brackets are escaped, carriage returns are
/// dropped and each line break ends a left-aligned line.
///
/// # Examples
///
/// ```rust
/// use decompcore::utils::escape_dot;
///
/// let label = escape_dot("0x1000:\nif (a_1 < b_1) goto 0x1010;");
/// assert_eq!(label, "0x1000:\\lif (a_1 \\< b_1) goto 0x1010;");
/// ```
#[must_use]
pub fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\r', "")
        .replace('\n', "\\l")
        .replace('<', "\\<")
        .replace('>', "\\>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_dot_address() {
        assert_eq!(escape_dot("0x401000"), "0x401000");
    }

    #[test]
    fn test_escape_dot_listing_is_left_aligned() {
        assert_eq!(
            escape_dot("0x10:\r\nesp_1 = esp_0 - 4;\nreturn 6;"),
            "0x10:\\lesp_1 = esp_0 - 4;\\lreturn 6;"
        );
    }

    #[test]
    fn test_escape_dot_comparisons() {
        assert_eq!(escape_dot("while (i_2 <= n_0)"), "while (i_2 \\<= n_0)");
        assert_eq!(escape_dot("x_1 >> 4"), "x_1 \\>\\> 4");
    }

    #[test]
    fn test_escape_dot_quotes_and_backslashes() {
        assert_eq!(
            escape_dot("puts(\"a\\b\");"),
            "puts(\\\"a\\\\b\\\");"
        );
    }
}
